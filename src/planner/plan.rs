//! Action plans.
//!
//! An [`ActionPlan`] is the ordered list of server actions that takes a
//! server from its last applied config to the desired one. A
//! [`ChangePlan`] is what `plan` shows for a whole manifest.

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::api::ServerAction;
use crate::config::{PowerState, ServerConfig};

use super::diff::ResourceDiff;

/// Ordered actions for one server.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ActionPlan {
    /// Region of the server.
    pub region: String,
    /// Target server.
    pub server_id: String,
    /// Actions in execution order.
    pub actions: Vec<ServerAction>,
}

impl ActionPlan {
    /// Builds the plan between a prior config and a desired one.
    ///
    /// Only fields the desired config manages produce actions, and only when
    /// they differ from the prior value. Without a prior config every managed
    /// field is applied, except the image: a rebuild needs a known image to
    /// move away from. An adopted server is taken to be powered on and out of
    /// rescue, so `power: on` and `rescue: false` issue nothing on adoption.
    #[must_use]
    pub fn for_server(
        prior: Option<&ServerConfig>,
        prior_image: Option<&str>,
        desired: &ServerConfig,
        desired_image: Option<&str>,
    ) -> Self {
        let mut actions = Vec::new();

        if let Some(name) = changed(prior.and_then(|p| p.name.as_ref()), desired.name.as_ref()) {
            actions.push(ServerAction::Rename { name: name.clone() });
        }

        if let Some(groups) = &desired.security_groups {
            let current = prior.and_then(|p| p.security_groups.as_ref());
            if let Some(current) = current {
                for removed in current.difference(groups) {
                    actions.push(ServerAction::RemoveSecurityGroup {
                        security_group_id: removed.clone(),
                    });
                }
            }
            for added in groups.iter().filter(|g| current.is_none_or(|c| !c.contains(*g))) {
                actions.push(ServerAction::AddSecurityGroup {
                    security_group_id: added.clone(),
                });
            }
        }

        let prior_rescue = prior.map_or(Some(&false), |p| p.rescue.as_ref());
        let rescue = changed(prior_rescue, desired.rescue.as_ref()).copied();
        if rescue == Some(false) {
            actions.push(ServerAction::Unrescue);
        }

        if let (Some(from), Some(to)) = (prior_image, desired_image) {
            if from != to {
                actions.push(ServerAction::Rebuild {
                    image_id: to.to_string(),
                });
            }
        }

        if let Some(flavor) = changed(prior.and_then(|p| p.flavor_id.as_ref()), desired.flavor_id.as_ref()) {
            actions.push(ServerAction::ChangeFlavor {
                flavor_id: flavor.clone(),
            });
        }
        if let Some(size) = changed(prior.and_then(|p| p.disk_size.as_ref()), desired.disk_size.as_ref()) {
            actions.push(ServerAction::ChangeDiskSize { new_size: *size });
        }

        if rescue == Some(true) {
            actions.push(ServerAction::Rescue);
        }

        let prior_power = prior.map_or(Some(&PowerState::On), |p| p.power.as_ref());
        match changed(prior_power, desired.power.as_ref()) {
            Some(PowerState::Off) => actions.push(ServerAction::PowerOff),
            Some(PowerState::On) => actions.push(ServerAction::PowerOn),
            None => {}
        }

        Self {
            region: desired.region.clone(),
            server_id: desired.id.clone(),
            actions,
        }
    }

    /// Returns true if there is nothing to do.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.actions.is_empty()
    }

    /// Number of actions.
    #[must_use]
    pub fn len(&self) -> usize {
        self.actions.len()
    }
}

/// The desired value when it is managed and differs from the prior one.
fn changed<'a, T: PartialEq>(prior: Option<&T>, desired: Option<&'a T>) -> Option<&'a T> {
    desired.filter(|d| prior != Some(*d))
}

/// Every change a manifest implies.
#[derive(Debug, Serialize)]
pub struct ChangePlan {
    /// When the plan was computed.
    pub created_at: DateTime<Utc>,
    /// Hash of the manifest the plan is based on.
    pub manifest_hash: String,
    /// Per-resource changes, in apply order.
    pub changes: Vec<PlannedChange>,
}

/// One resource in a [`ChangePlan`].
#[derive(Debug, Serialize)]
pub struct PlannedChange {
    /// The diff for the resource.
    pub diff: ResourceDiff,
    /// Remote calls the change will issue, in order.
    pub calls: Vec<String>,
}

impl ChangePlan {
    /// Creates an empty plan.
    #[must_use]
    pub fn new(manifest_hash: impl Into<String>) -> Self {
        Self {
            created_at: Utc::now(),
            manifest_hash: manifest_hash.into(),
            changes: vec![],
        }
    }

    /// Adds a change unless the diff is a no-op.
    pub fn push(&mut self, diff: ResourceDiff, calls: Vec<String>) {
        if diff.has_changes() {
            self.changes.push(PlannedChange { diff, calls });
        }
    }

    /// Returns true if the plan is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.changes.is_empty()
    }

    /// Total number of remote calls the plan will issue.
    #[must_use]
    pub fn call_count(&self) -> usize {
        self.changes.iter().map(|c| c.calls.len()).sum()
    }
}

impl std::fmt::Display for ChangePlan {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.changes.is_empty() {
            return write!(f, "No changes required");
        }

        writeln!(
            f,
            "Plan ({} resources, {} calls):",
            self.changes.len(),
            self.call_count()
        )?;
        for change in &self.changes {
            writeln!(f, "  {}", change.diff)?;
            for call in &change.calls {
                writeln!(f, "    - {call}")?;
            }
        }
        Ok(())
    }
}
