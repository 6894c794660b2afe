//! Manifest-level reconciler.
//!
//! Drives every resource of a manifest through its lifecycle, holding the
//! last applied state on behalf of the resources. Apply order is image
//! lookups, attachments to remove, servers, then attachments to add, so a
//! volume moving between servers is detached before it is attached again.

use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet};
use tracing::{debug, error, info, warn};

use crate::api::IaasClient;
use crate::config::{ConfigHasher, ConfigValidator, Manifest, VolumeAttachmentConfig};
use crate::error::{ConfigError, Result};
use crate::planner::{ChangePlan, DiffDetail, DiffEngine, DiffType, ResourceDiff};
use crate::resource::{
    AttachmentReconciler, Diagnostics, ImageDataSource, Lifecycle, ResourceData, ServerData,
    ServerReconciler,
};
use crate::state::{ProviderState, StateStore};

/// Reconciler for a manifest.
pub struct Reconciler<'a, S: StateStore> {
    /// State store.
    state_store: &'a S,
    /// Server lifecycle.
    servers: ServerReconciler,
    /// Attachment lifecycle.
    attachments: AttachmentReconciler,
    /// Image lookups.
    images: ImageDataSource,
    /// Diff engine.
    diff_engine: DiffEngine,
    /// Configuration hasher.
    hasher: ConfigHasher,
}

/// Outcome of one resource during apply or destroy.
#[derive(Debug, Serialize)]
pub struct ResourceOutcome {
    /// Resource address.
    pub address: String,
    /// What was attempted.
    pub operation: DiffType,
    /// Diagnostics of the lifecycle call; empty on success.
    pub diagnostics: Diagnostics,
}

/// Result of an apply or destroy run.
#[derive(Debug, Default, Serialize)]
pub struct ApplyReport {
    /// Per-resource outcomes, in execution order.
    pub outcomes: Vec<ResourceOutcome>,
}

impl<'a, S: StateStore> Reconciler<'a, S> {
    /// Creates a new reconciler.
    #[must_use]
    pub fn new(client: &IaasClient, state_store: &'a S) -> Self {
        Self {
            state_store,
            servers: ServerReconciler::new(client.servers.clone(), client.images.clone()),
            attachments: AttachmentReconciler::new(client.volumes.clone()),
            images: ImageDataSource::new(client.images.clone()),
            diff_engine: DiffEngine::new(),
            hasher: ConfigHasher::new(),
        }
    }

    async fn load_state(&self) -> Result<ProviderState> {
        Ok(self.state_store.load().await?.unwrap_or_default())
    }

    /// Computes what `apply` would do.
    ///
    /// No remote call is made, except image listings for servers whose
    /// image reference changed to a name lookup.
    ///
    /// # Errors
    ///
    /// Returns an error if the manifest is invalid, the state cannot be
    /// loaded, or an image lookup fails.
    pub async fn plan(&self, manifest: &Manifest) -> Result<ChangePlan> {
        validate(manifest)?;
        let state = self.load_state().await?;
        let mut plan = ChangePlan::new(self.hasher.hash_manifest(manifest));

        for selector in &manifest.images {
            if !state.images.contains_key(&selector.key()) {
                plan.push(image_diff(&selector.key()), vec![format!("list {} images", selector.image_type)]);
            }
        }

        let desired_attachments = attachments_by_volume(manifest);
        for (id, record) in &state.attachments {
            let diff = self
                .diff_engine
                .diff_attachment(Some(record), desired_attachments.get(id.as_str()).copied());
            let calls = match diff.diff_type {
                DiffType::Delete => vec![String::from("detach")],
                DiffType::Replace => vec![String::from("detach"), String::from("attach")],
                _ => vec![],
            };
            plan.push(diff, calls);
        }

        for (id, server) in &state.servers {
            if !manifest.servers.iter().any(|s| &s.id == id) {
                plan.push(self.diff_engine.diff_server(Some(server), None), vec![]);
            }
        }
        for config in &manifest.servers {
            let prior = state.servers.get(&config.id);
            let diff = self.diff_engine.diff_server(prior, Some(config));
            let calls = match diff.diff_type {
                DiffType::Create | DiffType::Update => {
                    let prior = prior.map(|p| ServerData {
                        config: p.config.clone(),
                        image_id: p.image_id.clone(),
                    });
                    let (actions, _) = self.servers.plan(prior.as_ref(), config).await?;
                    actions.actions.iter().map(ToString::to_string).collect()
                }
                _ => vec![],
            };
            plan.push(diff, calls);
        }

        for (volume_id, config) in &desired_attachments {
            if !state.attachments.contains_key(*volume_id) {
                plan.push(self.diff_engine.diff_attachment(None, Some(*config)), vec![String::from("attach")]);
            }
        }

        debug!("Planned {} changes", plan.changes.len());
        Ok(plan)
    }

    /// Applies a manifest.
    ///
    /// A failing resource does not stop the others. State is only updated
    /// for resources whose lifecycle call succeeded and is saved at the end.
    ///
    /// # Errors
    ///
    /// Returns an error if the manifest is invalid or the state cannot be
    /// loaded or saved. Per-resource failures are in the report.
    pub async fn apply(&self, manifest: &Manifest) -> Result<ApplyReport> {
        validate(manifest)?;
        let mut state = self.load_state().await?;
        let mut report = ApplyReport::default();

        info!(
            "Applying manifest ({} servers, {} attachments, {} images)",
            manifest.servers.len(),
            manifest.volume_attachments.len(),
            manifest.images.len()
        );

        for selector in &manifest.images {
            let mut data = ResourceData::new(selector.clone());
            let diagnostics = self.images.read(&mut data).await;
            if let Some(id) = data.id {
                state.record_image(selector.key(), id);
            }
            if !diagnostics.is_empty() {
                report.record(format!("image.{}", selector.key()), DiffType::Create, diagnostics);
            }
        }

        let desired_attachments = attachments_by_volume(manifest);
        let mut still_attached = BTreeSet::new();
        let tracked: Vec<_> = state
            .attachments
            .iter()
            .map(|(id, record)| (id.clone(), record.clone()))
            .collect();
        for (id, record) in tracked {
            let diff = self
                .diff_engine
                .diff_attachment(Some(&record), desired_attachments.get(id.as_str()).copied());
            if !matches!(diff.diff_type, DiffType::Delete | DiffType::Replace) {
                continue;
            }

            let mut data = ResourceData {
                id: Some(id.clone()),
                config: record.to_config(),
            };
            let diagnostics = self.attachments.delete(&mut data).await;
            if data.id.is_none() {
                state.remove_attachment(&id);
            } else {
                still_attached.insert(id);
            }
            report.record(diff.address, DiffType::Delete, diagnostics);
        }

        let tracked_servers: Vec<String> = state.servers.keys().cloned().collect();
        for id in tracked_servers {
            if manifest.servers.iter().any(|s| s.id == id) {
                continue;
            }
            let Some(server) = state.servers.get(&id) else {
                continue;
            };
            let mut data = ResourceData {
                id: Some(id.clone()),
                config: ServerData {
                    config: server.config.clone(),
                    image_id: server.image_id.clone(),
                },
            };
            let address = server.config.address();
            let diagnostics = self.servers.delete(&mut data).await;
            if data.id.is_none() {
                state.remove_server(&id);
            }
            report.record(address, DiffType::Delete, diagnostics);
        }

        for config in &manifest.servers {
            let prior = state.servers.get(&config.id);
            let diff = self.diff_engine.diff_server(prior, Some(config));
            if !diff.has_changes() {
                continue;
            }

            let mut data = ResourceData::new(ServerData::new(config.clone()));
            let diagnostics = match prior {
                Some(applied) => {
                    let prior_data = ResourceData {
                        id: Some(applied.config.id.clone()),
                        config: ServerData {
                            config: applied.config.clone(),
                            image_id: applied.image_id.clone(),
                        },
                    };
                    data.id.clone_from(&prior_data.id);
                    self.servers.update(&prior_data, &mut data).await
                }
                None => self.servers.create(&mut data).await,
            };

            if diagnostics.has_errors() {
                error!("{} failed", diff.address);
            } else {
                let hash = diff.new_hash.clone().unwrap_or_default();
                state.record_server(data.config.config, hash, data.config.image_id);
            }
            report.record(diff.address, diff.diff_type, diagnostics);
        }

        for (volume_id, config) in desired_attachments {
            if state.attachments.contains_key(volume_id) {
                continue;
            }
            if still_attached.contains(volume_id) {
                warn!("Volume {volume_id} could not be detached, not attaching it again");
                continue;
            }

            let mut data = ResourceData::new(config.clone());
            let diagnostics = self.attachments.create(&mut data).await;
            if let Some(id) = data.id {
                state.record_attachment(id, config);
            }
            report.record(config.address(), DiffType::Create, diagnostics);
        }

        self.state_store.save(&state).await?;
        info!("{report}");
        Ok(report)
    }

    /// Detaches every tracked attachment and forgets every tracked server.
    ///
    /// # Errors
    ///
    /// Returns an error if the state cannot be loaded or saved.
    pub async fn destroy(&self) -> Result<ApplyReport> {
        let mut state = self.load_state().await?;
        let mut report = ApplyReport::default();

        let tracked: Vec<_> = state
            .attachments
            .iter()
            .map(|(id, record)| (id.clone(), record.to_config()))
            .collect();
        for (id, config) in tracked {
            let address = config.address();
            let mut data = ResourceData {
                id: Some(id.clone()),
                config,
            };
            let diagnostics = self.attachments.delete(&mut data).await;
            if data.id.is_none() {
                state.remove_attachment(&id);
            }
            report.record(address, DiffType::Delete, diagnostics);
        }

        let servers: Vec<_> = state.servers.values().cloned().collect();
        for server in servers {
            let address = server.config.address();
            let mut data = ResourceData {
                id: Some(server.config.id.clone()),
                config: ServerData {
                    config: server.config,
                    image_id: server.image_id,
                },
            };
            let diagnostics = self.servers.delete(&mut data).await;
            if data.id.is_none() {
                state.remove_server(&data.config.config.id);
            }
            report.record(address, DiffType::Delete, diagnostics);
        }

        state.images.clear();
        self.state_store.save(&state).await?;
        info!("{report}");
        Ok(report)
    }

    /// Starts tracking an attachment that already exists.
    ///
    /// The attachment must be declared in the manifest under the given
    /// volume id.
    ///
    /// # Errors
    ///
    /// Returns an error if the manifest does not declare it, or the state
    /// cannot be loaded or saved.
    pub async fn import_attachment(&self, manifest: &Manifest, id: &str) -> Result<ResourceOutcome> {
        let config = manifest
            .volume_attachments
            .iter()
            .find(|a| a.volume_id == id)
            .ok_or_else(|| {
                ConfigError::validation(
                    format!("No volume attachment for volume {id} in the manifest"),
                    "volume_attachments",
                )
            })?;

        let mut state = self.load_state().await?;
        let mut data = ResourceData::new(config.clone());
        let diagnostics = self.attachments.import(id, &mut data);
        if let Some(tracked) = data.id {
            state.record_attachment(tracked, config);
            self.state_store.save(&state).await?;
        }

        Ok(ResourceOutcome {
            address: config.address(),
            operation: DiffType::Create,
            diagnostics,
        })
    }
}

fn validate(manifest: &Manifest) -> Result<()> {
    let result = ConfigValidator::new(manifest.provider.region_set()).validate(manifest)?;
    for warning in &result.warnings {
        warn!("{warning}");
    }
    Ok(())
}

fn attachments_by_volume(manifest: &Manifest) -> BTreeMap<&str, &VolumeAttachmentConfig> {
    manifest
        .volume_attachments
        .iter()
        .map(|a| (a.volume_id.as_str(), a))
        .collect()
}

fn image_diff(key: &str) -> ResourceDiff {
    ResourceDiff {
        address: format!("image.{key}"),
        diff_type: DiffType::Create,
        details: vec![DiffDetail {
            field: String::from("id"),
            old_value: None,
            new_value: None,
        }],
        old_hash: None,
        new_hash: None,
    }
}

impl ApplyReport {
    fn record(&mut self, address: String, operation: DiffType, diagnostics: Diagnostics) {
        self.outcomes.push(ResourceOutcome {
            address,
            operation,
            diagnostics,
        });
    }

    /// Returns true if no resource failed.
    #[must_use]
    pub fn is_success(&self) -> bool {
        self.outcomes.iter().all(|o| !o.diagnostics.has_errors())
    }

    /// Number of resources that failed.
    #[must_use]
    pub fn failed(&self) -> usize {
        self.outcomes.iter().filter(|o| o.diagnostics.has_errors()).count()
    }
}

impl std::fmt::Display for ApplyReport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.outcomes.is_empty() {
            return write!(f, "No changes applied");
        }
        let status = if self.is_success() { "succeeded" } else { "failed" };
        write!(
            f,
            "Apply {status}: {} resources, {} failed",
            self.outcomes.len(),
            self.failed()
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::{MockRequester, RawResponse, RegionSet};
    use crate::config::ServerConfig;
    use crate::state::LocalStateStore;
    use std::sync::Arc;
    use tempfile::TempDir;

    const SERVER: &str = "6b1c2b0e-3f43-4a4c-9d86-1f0c6f6b9a11";
    const OTHER_SERVER: &str = "9e2a7c41-0d5b-4f3e-a1b2-c3d4e5f60718";
    const VOLUME: &str = "0f5d6a3e-2b1c-4d7e-8f90-123456789abc";

    fn client(mock: MockRequester) -> IaasClient {
        IaasClient::new(Arc::new(mock), RegionSet::default())
    }

    fn ok() -> RawResponse {
        RawResponse {
            status: 200,
            body: String::new(),
        }
    }

    fn manifest(server_name: &str, attach_to: Option<&str>) -> Manifest {
        let mut server = ServerConfig::new(SERVER, "nl-ams-1");
        server.name = Some(server_name.to_string());

        Manifest {
            servers: vec![server],
            volume_attachments: attach_to
                .map(|server_id| VolumeAttachmentConfig {
                    region: String::from("nl-ams-1"),
                    server_id: server_id.to_string(),
                    volume_id: VOLUME.to_string(),
                })
                .into_iter()
                .collect(),
            ..Manifest::default()
        }
    }

    fn expect(mock: &mut MockRequester, suffix: &'static str, times: usize) {
        mock.expect_issue()
            .withf(move |req| req.endpoint.ends_with(suffix))
            .times(times)
            .returning(|_| Ok(ok()));
    }

    #[tokio::test]
    async fn test_apply_then_reapply_is_noop() {
        let temp = TempDir::new().expect("temp dir");
        let store = LocalStateStore::with_base_dir(temp.path());
        let desired = manifest("web-01", Some(SERVER));

        let mut mock = MockRequester::new();
        expect(&mut mock, "/rename", 1);
        expect(&mut mock, "/volumes/attach", 1);
        let report = Reconciler::new(&client(mock), &store).apply(&desired).await.unwrap();
        assert!(report.is_success());
        assert_eq!(report.outcomes.len(), 2);

        let state = store.load().await.unwrap().unwrap();
        assert!(state.servers.contains_key(SERVER));
        assert_eq!(state.attachments[VOLUME].server_id, SERVER);

        let mut mock = MockRequester::new();
        mock.expect_issue().never();
        let report = Reconciler::new(&client(mock), &store).apply(&desired).await.unwrap();
        assert!(report.outcomes.is_empty());
    }

    #[tokio::test]
    async fn test_plan_issues_no_calls() {
        let temp = TempDir::new().expect("temp dir");
        let store = LocalStateStore::with_base_dir(temp.path());

        let mut mock = MockRequester::new();
        mock.expect_issue().never();
        let plan = Reconciler::new(&client(mock), &store)
            .plan(&manifest("web-01", Some(SERVER)))
            .await
            .unwrap();

        assert_eq!(plan.changes.len(), 2);
        assert_eq!(plan.changes[0].calls, vec![String::from("rename to 'web-01'")]);
        assert_eq!(plan.changes[1].calls, vec![String::from("attach")]);
        assert!(!store.exists().await.unwrap());
    }

    #[tokio::test]
    async fn test_moved_volume_detaches_before_attaching() {
        let temp = TempDir::new().expect("temp dir");
        let store = LocalStateStore::with_base_dir(temp.path());

        let mut mock = MockRequester::new();
        expect(&mut mock, "/rename", 1);
        expect(&mut mock, "/volumes/attach", 1);
        Reconciler::new(&client(mock), &store)
            .apply(&manifest("web-01", Some(SERVER)))
            .await
            .unwrap();

        let mut seq = mockall::Sequence::new();
        let mut mock = MockRequester::new();
        for suffix in ["/volumes/detach", "/volumes/attach"] {
            mock.expect_issue()
                .withf(move |req| req.endpoint.ends_with(suffix))
                .times(1)
                .in_sequence(&mut seq)
                .returning(|_| Ok(ok()));
        }
        let report = Reconciler::new(&client(mock), &store)
            .apply(&manifest("web-01", Some(OTHER_SERVER)))
            .await
            .unwrap();

        assert!(report.is_success());
        let state = store.load().await.unwrap().unwrap();
        assert_eq!(state.attachments[VOLUME].server_id, OTHER_SERVER);
    }

    #[tokio::test]
    async fn test_failing_server_does_not_stop_attachments() {
        let temp = TempDir::new().expect("temp dir");
        let store = LocalStateStore::with_base_dir(temp.path());

        let mut mock = MockRequester::new();
        mock.expect_issue()
            .withf(|req| req.endpoint.ends_with("/rename"))
            .times(1)
            .returning(|_| {
                Ok(RawResponse {
                    status: 500,
                    body: String::from(r#"{"message":"internal"}"#),
                })
            });
        expect(&mut mock, "/volumes/attach", 1);

        let report = Reconciler::new(&client(mock), &store)
            .apply(&manifest("web-01", Some(SERVER)))
            .await
            .unwrap();

        assert!(!report.is_success());
        assert_eq!(report.failed(), 1);
        let state = store.load().await.unwrap().unwrap();
        assert!(state.servers.is_empty());
        assert!(state.attachments.contains_key(VOLUME));
    }

    #[tokio::test]
    async fn test_destroy_detaches_and_forgets() {
        let temp = TempDir::new().expect("temp dir");
        let store = LocalStateStore::with_base_dir(temp.path());

        let mut mock = MockRequester::new();
        expect(&mut mock, "/rename", 1);
        expect(&mut mock, "/volumes/attach", 1);
        Reconciler::new(&client(mock), &store)
            .apply(&manifest("web-01", Some(SERVER)))
            .await
            .unwrap();

        let mut mock = MockRequester::new();
        expect(&mut mock, "/volumes/detach", 1);
        let report = Reconciler::new(&client(mock), &store).destroy().await.unwrap();

        assert_eq!(report.outcomes.len(), 2);
        assert!(store.load().await.unwrap().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_import_attachment() {
        let temp = TempDir::new().expect("temp dir");
        let store = LocalStateStore::with_base_dir(temp.path());
        let mut mock = MockRequester::new();
        mock.expect_issue().never();
        let reconciler_client = client(mock);
        let reconciler = Reconciler::new(&reconciler_client, &store);

        let desired = manifest("web-01", Some(SERVER));
        let outcome = reconciler.import_attachment(&desired, VOLUME).await.unwrap();
        assert!(outcome.diagnostics.is_empty());
        assert!(store.load().await.unwrap().unwrap().attachments.contains_key(VOLUME));

        assert!(reconciler.import_attachment(&desired, "unknown").await.is_err());
    }
}
