//! Plan executor for server action plans.
//!
//! Actions run one after another. The first failure stops the run and
//! nothing already applied is undone; running the same plan again after
//! fixing the cause converges.

use tracing::{error, info};

use crate::api::{ServerAction, ServerActions};
use crate::error::{IaasError, Result};

use super::plan::ActionPlan;

/// Executor for action plans.
#[derive(Debug)]
pub struct PlanExecutor<'a> {
    /// Client the actions go through.
    actions: &'a ServerActions,
}

/// Result of executing a single action.
#[derive(Debug)]
pub struct ActionResult {
    /// Position in the plan.
    pub index: usize,
    /// Action that was executed.
    pub action: ServerAction,
    /// Error message (if failed).
    pub error: Option<String>,
}

/// Result of executing a whole plan.
#[derive(Debug)]
pub struct ExecutionResult {
    /// Results of the actions that ran, in order.
    pub results: Vec<ActionResult>,
    /// Number of actions in the plan.
    pub planned: usize,
    /// The error that stopped the run.
    pub error: Option<IaasError>,
}

impl<'a> PlanExecutor<'a> {
    /// Creates a new plan executor.
    #[must_use]
    pub const fn new(actions: &'a ServerActions) -> Self {
        Self { actions }
    }

    /// Executes a plan, stopping at the first failure.
    pub async fn execute(&self, plan: &ActionPlan) -> ExecutionResult {
        info!(
            "Executing {} actions on server {}",
            plan.actions.len(),
            plan.server_id
        );

        let mut results = Vec::with_capacity(plan.actions.len());

        for (index, action) in plan.actions.iter().enumerate() {
            match self.actions.perform(&plan.region, &plan.server_id, action).await {
                Ok(()) => results.push(ActionResult {
                    index,
                    action: action.clone(),
                    error: None,
                }),
                Err(e) => {
                    error!(
                        "Action {index} ({action}) on server {} failed: {e}",
                        plan.server_id
                    );
                    results.push(ActionResult {
                        index,
                        action: action.clone(),
                        error: Some(e.to_string()),
                    });
                    return ExecutionResult {
                        results,
                        planned: plan.actions.len(),
                        error: Some(e),
                    };
                }
            }
        }

        ExecutionResult {
            results,
            planned: plan.actions.len(),
            error: None,
        }
    }
}

impl ExecutionResult {
    /// Number of actions that succeeded.
    #[must_use]
    pub fn successful(&self) -> usize {
        self.results.iter().filter(|r| r.error.is_none()).count()
    }

    /// Number of actions never attempted.
    #[must_use]
    pub fn skipped(&self) -> usize {
        self.planned - self.results.len()
    }

    /// Returns true if every planned action succeeded.
    #[must_use]
    pub const fn is_success(&self) -> bool {
        self.error.is_none()
    }

    /// Converts into the first error, if any.
    ///
    /// # Errors
    ///
    /// Returns the error that stopped the run.
    pub fn into_result(self) -> Result<usize> {
        match self.error {
            None => Ok(self.results.len()),
            Some(e) => Err(e),
        }
    }
}

impl std::fmt::Display for ExecutionResult {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "Executed {} of {} actions: {} successful, {} skipped",
            self.results.len(),
            self.planned,
            self.successful(),
            self.skipped()
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::{MockRequester, RawResponse, RegionSet};
    use crate::error::ErrorKind;
    use std::sync::Arc;

    fn plan(actions: Vec<ServerAction>) -> ActionPlan {
        ActionPlan {
            region: String::from("nl-ams-1"),
            server_id: String::from("srv-1"),
            actions,
        }
    }

    #[tokio::test]
    async fn test_runs_in_order() {
        let mut seq = mockall::Sequence::new();
        let mut mock = MockRequester::new();
        for segment in ["rename", "power-off"] {
            mock.expect_issue()
                .withf(move |req| req.endpoint.ends_with(segment))
                .times(1)
                .in_sequence(&mut seq)
                .returning(|_| {
                    Ok(RawResponse {
                        status: 200,
                        body: String::new(),
                    })
                });
        }

        let actions = ServerActions::new(Arc::new(mock), Arc::new(RegionSet::default()));
        let result = PlanExecutor::new(&actions)
            .execute(&plan(vec![
                ServerAction::Rename {
                    name: String::from("web"),
                },
                ServerAction::PowerOff,
            ]))
            .await;

        assert!(result.is_success());
        assert_eq!(result.successful(), 2);
        assert_eq!(result.into_result().unwrap(), 2);
    }

    #[tokio::test]
    async fn test_stops_at_first_error_without_rollback() {
        let mut mock = MockRequester::new();
        mock.expect_issue()
            .withf(|req| req.endpoint.ends_with("/rename"))
            .times(1)
            .returning(|_| {
                Ok(RawResponse {
                    status: 200,
                    body: String::new(),
                })
            });
        mock.expect_issue()
            .withf(|req| req.endpoint.ends_with("/add-security-group"))
            .times(1)
            .returning(|_| {
                Ok(RawResponse {
                    status: 409,
                    body: String::from(r#"{"message":"server is busy"}"#),
                })
            });

        let actions = ServerActions::new(Arc::new(mock), Arc::new(RegionSet::default()));
        let result = PlanExecutor::new(&actions)
            .execute(&plan(vec![
                ServerAction::Rename {
                    name: String::from("web"),
                },
                ServerAction::AddSecurityGroup {
                    security_group_id: String::from("sg-1"),
                },
                ServerAction::PowerOn,
            ]))
            .await;

        assert_eq!(result.successful(), 1);
        assert_eq!(result.skipped(), 1);
        assert_eq!(
            result.to_string(),
            "Executed 2 of 3 actions: 1 successful, 1 skipped"
        );
        let err = result.into_result().unwrap_err();
        assert_eq!(err.kind(), ErrorKind::RemoteRejected);
    }
}
