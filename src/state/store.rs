//! State store trait definition.
//!
//! This module defines the common interface for state storage backends.

use async_trait::async_trait;

use super::types::ProviderState;
use crate::error::Result;

/// Trait for state storage backends.
#[async_trait]
pub trait StateStore: Send + Sync {
    /// Loads the state.
    ///
    /// Returns `None` if no state exists yet.
    async fn load(&self) -> Result<Option<ProviderState>>;

    /// Saves the state.
    async fn save(&self, state: &ProviderState) -> Result<()>;

    /// Deletes the state.
    async fn delete(&self) -> Result<()>;

    /// Checks if state exists.
    async fn exists(&self) -> Result<bool>;

    /// Gets the backend type name.
    fn backend_type(&self) -> &'static str;
}

#[async_trait]
impl StateStore for Box<dyn StateStore> {
    async fn load(&self) -> Result<Option<ProviderState>> {
        (**self).load().await
    }

    async fn save(&self, state: &ProviderState) -> Result<()> {
        (**self).save(state).await
    }

    async fn delete(&self) -> Result<()> {
        (**self).delete().await
    }

    async fn exists(&self) -> Result<bool> {
        (**self).exists().await
    }

    fn backend_type(&self) -> &'static str {
        (**self).backend_type()
    }
}
