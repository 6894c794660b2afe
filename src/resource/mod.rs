//! Declarative resource lifecycle.
//!
//! A driver hands each resource its typed config wrapped in
//! [`ResourceData`] and calls the [`Lifecycle`] operations. Every operation
//! reports through [`Diagnostics`]; an empty list means success.

mod attachment;
mod image;
mod server;

pub use attachment::{AttachmentReconciler, AttachmentState};
pub use image::ImageDataSource;
pub use server::{ServerData, ServerReconciler};

use async_trait::async_trait;
use serde::Serialize;

use crate::config::ValidationResult;
use crate::error::{ApiError, IaasError};

/// Severity of a diagnostic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    /// The operation failed.
    Error,
    /// The operation succeeded with a caveat.
    Warning,
}

/// One structured message returned by a lifecycle operation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Diagnostic {
    /// Severity.
    pub severity: Severity,
    /// One-line summary.
    pub summary: String,
    /// Additional detail.
    pub detail: String,
}

/// Ordered diagnostics of one operation.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct Diagnostics(Vec<Diagnostic>);

impl Diagnostics {
    /// Creates an empty list.
    #[must_use]
    pub const fn new() -> Self {
        Self(Vec::new())
    }

    /// Records an error.
    pub fn push_error(&mut self, err: &IaasError) {
        self.0.push(Diagnostic {
            severity: Severity::Error,
            summary: err.to_string(),
            detail: err.kind().to_string(),
        });
    }

    /// Records a warning.
    pub fn push_warning(&mut self, summary: impl Into<String>, detail: impl Into<String>) {
        self.0.push(Diagnostic {
            severity: Severity::Warning,
            summary: summary.into(),
            detail: detail.into(),
        });
    }

    /// Returns true if any diagnostic is an error.
    #[must_use]
    pub fn has_errors(&self) -> bool {
        self.0.iter().any(|d| d.severity == Severity::Error)
    }

    /// Returns true if there is nothing to report.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Iterates over the diagnostics.
    pub fn iter(&self) -> impl Iterator<Item = &Diagnostic> {
        self.0.iter()
    }
}

impl From<IaasError> for Diagnostics {
    fn from(err: IaasError) -> Self {
        let mut diags = Self::new();
        diags.push_error(&err);
        diags
    }
}

impl From<&ValidationResult> for Diagnostics {
    fn from(result: &ValidationResult) -> Self {
        let mut diags = Self::new();
        for error in &result.errors {
            diags.push_error(&ApiError::validation(&error.field, &error.message).into());
        }
        for warning in &result.warnings {
            diags.push_warning(warning, "validation");
        }
        diags
    }
}

impl std::fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let level = match self.severity {
            Severity::Error => "error",
            Severity::Warning => "warning",
        };
        write!(f, "{level}: {} ({})", self.summary, self.detail)
    }
}

/// A resource as the driver tracks it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ResourceData<C> {
    /// Tracked identifier; `None` until created or imported.
    pub id: Option<String>,
    /// Typed configuration.
    pub config: C,
}

impl<C> ResourceData<C> {
    /// Wraps a config that is not tracked yet.
    pub const fn new(config: C) -> Self {
        Self { id: None, config }
    }
}

/// Create/read/update/delete/import operations of a managed resource.
#[async_trait]
pub trait Lifecycle: Send + Sync {
    /// Typed configuration of the resource.
    type Config: Send + Sync;

    /// Creates the resource and sets its identifier.
    async fn create(&self, data: &mut ResourceData<Self::Config>) -> Diagnostics;

    /// Refreshes the tracked data.
    async fn read(&self, data: &mut ResourceData<Self::Config>) -> Diagnostics;

    /// Moves the resource from `prior` to the desired `data`.
    async fn update(
        &self,
        prior: &ResourceData<Self::Config>,
        data: &mut ResourceData<Self::Config>,
    ) -> Diagnostics;

    /// Deletes the resource and clears its identifier.
    async fn delete(&self, data: &mut ResourceData<Self::Config>) -> Diagnostics;

    /// Starts tracking an existing resource by identifier.
    fn import(&self, id: &str, data: &mut ResourceData<Self::Config>) -> Diagnostics {
        if id.trim().is_empty() {
            let err = ApiError::validation("id", "import requires a non-empty identifier");
            return IaasError::from(err).into();
        }
        data.id = Some(id.to_string());
        Diagnostics::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;

    #[test]
    fn test_diagnostics_from_error() {
        let diags = Diagnostics::from(IaasError::from(ApiError::rejected(409, "busy")));
        assert!(diags.has_errors());

        let first = diags.iter().next().unwrap();
        assert_eq!(first.detail, ErrorKind::RemoteRejected.to_string());
        assert!(first.summary.contains("busy"));
    }

    #[test]
    fn test_diagnostics_from_validation() {
        let mut result = ValidationResult::default();
        result.error("servers[0].id", "bad");
        result.warnings.push(String::from("nothing managed"));

        let diags = Diagnostics::from(&result);
        let severities: Vec<Severity> = diags.iter().map(|d| d.severity).collect();
        assert_eq!(severities, vec![Severity::Error, Severity::Warning]);
        assert_eq!(
            diags.iter().next().unwrap().to_string(),
            "error: API error: Invalid servers[0].id: bad (validation)"
        );
    }

    #[test]
    fn test_warnings_are_not_errors() {
        let mut diags = Diagnostics::new();
        diags.push_warning("heads up", "detail");
        assert!(!diags.is_empty());
        assert!(!diags.has_errors());
    }
}
