//! Volume attachment resource.
//!
//! An attachment has no identity of its own at the provider. It is tracked
//! under the volume id, which is enough because a volume attaches to at
//! most one server. Nothing can be read back remotely, so `read` and
//! `update` leave the tracked data as it is.

use async_trait::async_trait;
use tracing::{debug, info};

use crate::api::VolumeClient;
use crate::config::VolumeAttachmentConfig;

use super::{Diagnostics, Lifecycle, ResourceData};

/// Where an attachment is in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttachmentState {
    /// Not tracked; the initial state.
    Detached,
    /// Attached and tracked under the volume id.
    Attached,
}

impl AttachmentState {
    /// State implied by the tracked data.
    #[must_use]
    pub const fn of(data: &ResourceData<VolumeAttachmentConfig>) -> Self {
        if data.id.is_some() {
            Self::Attached
        } else {
            Self::Detached
        }
    }
}

impl std::fmt::Display for AttachmentState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Detached => f.write_str("detached"),
            Self::Attached => f.write_str("attached"),
        }
    }
}

/// Lifecycle of volume attachments.
#[derive(Debug, Clone)]
pub struct AttachmentReconciler {
    volumes: VolumeClient,
}

impl AttachmentReconciler {
    /// Creates a reconciler over a volume client.
    #[must_use]
    pub const fn new(volumes: VolumeClient) -> Self {
        Self { volumes }
    }
}

#[async_trait]
impl Lifecycle for AttachmentReconciler {
    type Config = VolumeAttachmentConfig;

    /// Attaches the volume. The remote state is not checked first; callers
    /// avoid duplicate attaches by diffing against what they track.
    async fn create(&self, data: &mut ResourceData<VolumeAttachmentConfig>) -> Diagnostics {
        let config = &data.config;
        debug!("{}: {} -> attached", config.address(), AttachmentState::of(data));

        match self.volumes.attach(&config.region, &config.to_attachment()).await {
            Ok(()) => {
                data.id = Some(config.volume_id.clone());
                Diagnostics::new()
            }
            Err(e) => e.into(),
        }
    }

    async fn read(&self, _data: &mut ResourceData<VolumeAttachmentConfig>) -> Diagnostics {
        Diagnostics::new()
    }

    async fn update(
        &self,
        _prior: &ResourceData<VolumeAttachmentConfig>,
        _data: &mut ResourceData<VolumeAttachmentConfig>,
    ) -> Diagnostics {
        Diagnostics::new()
    }

    /// Detaches the volume. A failed detach is reported and the id kept.
    async fn delete(&self, data: &mut ResourceData<VolumeAttachmentConfig>) -> Diagnostics {
        let config = &data.config;
        debug!("{}: {} -> detached", config.address(), AttachmentState::of(data));

        match self.volumes.detach(&config.region, &config.to_attachment()).await {
            Ok(()) => {
                info!("Stopped tracking {}", config.address());
                data.id = None;
                Diagnostics::new()
            }
            Err(e) => e.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::{MockRequester, RawResponse, RegionSet};
    use crate::error::ApiError;
    use std::sync::Arc;

    fn data(server: &str, volume: &str) -> ResourceData<VolumeAttachmentConfig> {
        ResourceData::new(VolumeAttachmentConfig {
            region: String::from("nl-ams-1"),
            server_id: server.to_string(),
            volume_id: volume.to_string(),
        })
    }

    fn reconciler(mock: MockRequester) -> AttachmentReconciler {
        AttachmentReconciler::new(VolumeClient::new(
            Arc::new(mock),
            Arc::new(RegionSet::default()),
        ))
    }

    fn status(status: u16) -> RawResponse {
        RawResponse {
            status,
            body: String::new(),
        }
    }

    #[tokio::test]
    async fn test_create_then_delete_issues_two_calls() {
        let mut seq = mockall::Sequence::new();
        let mut mock = MockRequester::new();
        mock.expect_issue()
            .withf(|req| {
                req.endpoint == "/ecc/v1/regions/nl-ams-1/volumes/attach"
                    && req.body == Some(serde_json::json!({"server_id": "srv-1", "volume_id": "vol-9"}))
            })
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_| Ok(status(200)));
        mock.expect_issue()
            .withf(|req| req.endpoint == "/ecc/v1/regions/nl-ams-1/volumes/detach")
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_| Ok(status(200)));

        let reconciler = reconciler(mock);
        let mut data = data("srv-1", "vol-9");

        assert!(reconciler.create(&mut data).await.is_empty());
        assert_eq!(data.id.as_deref(), Some("vol-9"));
        assert_eq!(AttachmentState::of(&data), AttachmentState::Attached);

        assert!(reconciler.delete(&mut data).await.is_empty());
        assert_eq!(AttachmentState::of(&data), AttachmentState::Detached);
    }

    #[tokio::test]
    async fn test_read_and_update_issue_nothing() {
        let mut mock = MockRequester::new();
        mock.expect_issue().never();
        let reconciler = reconciler(mock);

        let prior = data("srv-1", "vol-9");
        let mut current = prior.clone();
        current.id = Some(String::from("vol-9"));

        assert!(reconciler.read(&mut current).await.is_empty());
        assert!(reconciler.update(&prior, &mut current).await.is_empty());
        assert_eq!(current.id.as_deref(), Some("vol-9"));
    }

    #[tokio::test]
    async fn test_detach_failure_is_surfaced() {
        let mut mock = MockRequester::new();
        mock.expect_issue().times(1).returning(|_| Ok(status(404)));

        let reconciler = reconciler(mock);
        let mut data = data("srv-1", "vol-9");
        data.id = Some(String::from("vol-9"));

        let diags = reconciler.delete(&mut data).await;
        assert!(diags.has_errors());
        assert_eq!(data.id.as_deref(), Some("vol-9"));
    }

    #[tokio::test]
    async fn test_attach_failure_leaves_untracked() {
        let mut mock = MockRequester::new();
        mock.expect_issue()
            .times(1)
            .returning(|_| Err(ApiError::transport("connection refused").into()));

        let reconciler = reconciler(mock);
        let mut data = data("srv-1", "vol-9");

        let diags = reconciler.create(&mut data).await;
        assert_eq!(diags.iter().next().unwrap().detail, "transport");
        assert!(data.id.is_none());
    }

    #[test]
    fn test_import_passthrough() {
        let reconciler = reconciler(MockRequester::new());
        let mut data = data("srv-1", "vol-9");

        assert!(reconciler.import("vol-9", &mut data).is_empty());
        assert_eq!(data.id.as_deref(), Some("vol-9"));

        let mut untouched = self::data("srv-1", "vol-9");
        assert!(reconciler.import(" ", &mut untouched).has_errors());
        assert!(untouched.id.is_none());
    }
}
