//! Local file-based state storage backend.

use async_trait::async_trait;
use std::path::{Path, PathBuf};
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tracing::{debug, info};

use crate::error::{IaasError, Result, StateError};

use super::store::StateStore;
use super::types::{ProviderState, STATE_VERSION};

/// Default state directory name.
pub const STATE_DIR: &str = ".arvan-iaas";

/// State file name.
const STATE_FILE: &str = "state.json";

/// Local file-based state store.
#[derive(Debug)]
pub struct LocalStateStore {
    /// Directory holding the state file.
    base_dir: PathBuf,
    /// Path to the state file.
    state_path: PathBuf,
}

impl LocalStateStore {
    /// Creates a store with a custom base directory.
    #[must_use]
    pub fn with_base_dir(base_dir: impl Into<PathBuf>) -> Self {
        let base_dir = base_dir.into();
        let state_path = base_dir.join(STATE_FILE);
        Self { base_dir, state_path }
    }

    /// Creates a store from a custom state file path.
    #[must_use]
    pub fn with_state_path(state_path: impl Into<PathBuf>) -> Self {
        let state_path = state_path.into();
        let base_dir = state_path
            .parent()
            .map_or_else(|| PathBuf::from("."), Path::to_path_buf);
        Self { base_dir, state_path }
    }

    /// Path of the state file.
    #[must_use]
    pub fn state_path(&self) -> &Path {
        &self.state_path
    }

    async fn ensure_dir(&self) -> Result<()> {
        if !self.base_dir.exists() {
            debug!("Creating state directory: {}", self.base_dir.display());
            fs::create_dir_all(&self.base_dir)
                .await
                .map_err(|e| write_failed("create state directory", &e))?;
        }
        Ok(())
    }
}

fn write_failed(what: &str, e: &std::io::Error) -> IaasError {
    IaasError::State(StateError::WriteFailed {
        message: format!("Failed to {what}: {e}"),
    })
}

#[async_trait]
impl StateStore for LocalStateStore {
    async fn load(&self) -> Result<Option<ProviderState>> {
        if !self.state_path.exists() {
            debug!("State file does not exist: {}", self.state_path.display());
            return Ok(None);
        }

        info!("Loading state from: {}", self.state_path.display());

        let content = fs::read_to_string(&self.state_path).await.map_err(|e| {
            IaasError::State(StateError::Corrupted {
                message: format!("Failed to read state file: {e}"),
            })
        })?;

        let state: ProviderState = serde_json::from_str(&content).map_err(|e| {
            IaasError::State(StateError::Corrupted {
                message: format!("Failed to parse state file: {e}"),
            })
        })?;

        if state.version != STATE_VERSION {
            return Err(IaasError::State(StateError::VersionMismatch {
                expected: STATE_VERSION.to_string(),
                found: state.version,
            }));
        }

        Ok(Some(state))
    }

    async fn save(&self, state: &ProviderState) -> Result<()> {
        self.ensure_dir().await?;

        info!("Saving state to: {}", self.state_path.display());

        let content = serde_json::to_string_pretty(state)
            .map_err(|e| StateError::serialization(format!("Failed to serialize state: {e}")))?;

        // write a sibling then rename over the old file
        let temp_path = self.state_path.with_extension("tmp");

        let mut file = fs::File::create(&temp_path)
            .await
            .map_err(|e| write_failed("create temp state file", &e))?;
        file.write_all(content.as_bytes())
            .await
            .map_err(|e| write_failed("write state file", &e))?;
        file.sync_all()
            .await
            .map_err(|e| write_failed("sync state file", &e))?;

        fs::rename(&temp_path, &self.state_path)
            .await
            .map_err(|e| write_failed("rename state file", &e))?;

        debug!("State saved successfully");
        Ok(())
    }

    async fn delete(&self) -> Result<()> {
        if self.state_path.exists() {
            info!("Deleting state file: {}", self.state_path.display());
            fs::remove_file(&self.state_path)
                .await
                .map_err(|e| write_failed("delete state file", &e))?;
        }
        Ok(())
    }

    async fn exists(&self) -> Result<bool> {
        Ok(self.state_path.exists())
    }

    fn backend_type(&self) -> &'static str {
        "local"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ServerConfig;
    use tempfile::TempDir;

    fn create_test_store() -> (LocalStateStore, TempDir) {
        let temp_dir = TempDir::new().expect("Failed to create temp dir");
        let store = LocalStateStore::with_base_dir(temp_dir.path().join(STATE_DIR));
        (store, temp_dir)
    }

    #[tokio::test]
    async fn test_save_and_load() {
        let (store, _temp) = create_test_store();

        let mut state = ProviderState::new();
        state.record_server(ServerConfig::new("srv", "nl-ams-1"), String::from("abc"), None);
        store.save(&state).await.expect("Failed to save state");

        let loaded = store
            .load()
            .await
            .expect("Failed to load state")
            .expect("State should exist");

        assert_eq!(loaded.servers["srv"].config_hash, "abc");
        assert_eq!(loaded.version, STATE_VERSION);
    }

    #[tokio::test]
    async fn test_load_nonexistent() {
        let (store, _temp) = create_test_store();

        let result = store.load().await.expect("Load should not fail");
        assert!(result.is_none());
    }

    #[tokio::test]
    async fn test_exists_and_delete() {
        let (store, _temp) = create_test_store();

        assert!(!store.exists().await.expect("exists check failed"));
        store.save(&ProviderState::new()).await.expect("Failed to save state");
        assert!(store.exists().await.expect("exists check failed"));

        store.delete().await.expect("Failed to delete state");
        assert!(!store.exists().await.expect("exists check failed"));
    }

    #[tokio::test]
    async fn test_corrupted_and_wrong_version() {
        let temp_dir = TempDir::new().expect("Failed to create temp dir");
        let path = temp_dir.path().join("state.json");
        let store = LocalStateStore::with_state_path(&path);

        std::fs::write(&path, "{not json").expect("write");
        assert!(matches!(
            store.load().await,
            Err(IaasError::State(StateError::Corrupted { .. }))
        ));

        let mut state = ProviderState::new();
        state.version = String::from("0.1");
        std::fs::write(&path, serde_json::to_string(&state).expect("json")).expect("write");
        assert!(matches!(
            store.load().await,
            Err(IaasError::State(StateError::VersionMismatch { .. }))
        ));
    }
}
