//! Volume attach and detach.

use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::info;

use crate::error::Result;

use super::region::{Region, RegionSet};
use super::requester::{ApiRequest, Requester};
use super::{check_segment, ECC_SERVICE, ECC_VERSION};

/// The pair a volume attachment relates.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VolumeAttachment {
    /// Server the volume is attached to.
    pub server_id: String,
    /// Attached volume.
    pub volume_id: String,
}

impl VolumeAttachment {
    /// Creates an attachment pair.
    #[must_use]
    pub fn new(server_id: impl Into<String>, volume_id: impl Into<String>) -> Self {
        Self {
            server_id: server_id.into(),
            volume_id: volume_id.into(),
        }
    }

    fn validate(&self) -> Result<()> {
        check_segment("server_id", &self.server_id)?;
        check_segment("volume_id", &self.volume_id)
    }

    /// Builds the attach or detach request.
    #[must_use]
    pub fn to_request(&self, region: &Region, operation: &str) -> ApiRequest {
        ApiRequest::post(
            format!("/{ECC_SERVICE}/{ECC_VERSION}/regions/{region}/volumes/{operation}"),
            Some(serde_json::json!({
                "server_id": self.server_id,
                "volume_id": self.volume_id,
            })),
        )
    }
}

/// Client for volume operations.
#[derive(Clone)]
pub struct VolumeClient {
    requester: Arc<dyn Requester>,
    regions: Arc<RegionSet>,
}

impl std::fmt::Debug for VolumeClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VolumeClient")
            .field("regions", &self.regions)
            .finish_non_exhaustive()
    }
}

impl VolumeClient {
    /// Creates a new volume client.
    #[must_use]
    pub fn new(requester: Arc<dyn Requester>, regions: Arc<RegionSet>) -> Self {
        Self { requester, regions }
    }

    /// Attaches a volume to a server.
    ///
    /// # Errors
    ///
    /// Returns a validation error for an unknown region or malformed ids, a
    /// transport error if the call fails, `RemoteRejected` otherwise.
    pub async fn attach(&self, region: &str, attachment: &VolumeAttachment) -> Result<()> {
        self.send(region, attachment, "attach").await?;
        info!(
            "Attached volume {} to server {} in {region}",
            attachment.volume_id, attachment.server_id
        );
        Ok(())
    }

    /// Detaches a volume from a server.
    ///
    /// # Errors
    ///
    /// Same as [`VolumeClient::attach`]. A volume that is already detached
    /// surfaces whatever the provider answers.
    pub async fn detach(&self, region: &str, attachment: &VolumeAttachment) -> Result<()> {
        self.send(region, attachment, "detach").await?;
        info!(
            "Detached volume {} from server {} in {region}",
            attachment.volume_id, attachment.server_id
        );
        Ok(())
    }

    async fn send(&self, region: &str, attachment: &VolumeAttachment, operation: &str) -> Result<()> {
        let region = self.regions.validate(region)?;
        attachment.validate()?;

        self.requester
            .issue(attachment.to_request(&region, operation))
            .await?
            .into_success()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::requester::{MockRequester, RawResponse};
    use crate::error::ErrorKind;

    #[tokio::test]
    async fn test_attach_request_shape() {
        let mut mock = MockRequester::new();
        mock.expect_issue()
            .withf(|req| {
                req.endpoint == "/ecc/v1/regions/nl-ams-1/volumes/attach"
                    && req.body
                        == Some(serde_json::json!({ "server_id": "srv-1", "volume_id": "vol-9" }))
            })
            .times(1)
            .returning(|_| {
                Ok(RawResponse {
                    status: 202,
                    body: String::new(),
                })
            });

        let client = VolumeClient::new(Arc::new(mock), Arc::new(RegionSet::default()));
        client
            .attach("nl-ams-1", &VolumeAttachment::new("srv-1", "vol-9"))
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_detach_failure_is_surfaced() {
        let mut mock = MockRequester::new();
        mock.expect_issue()
            .withf(|req| req.endpoint.ends_with("/volumes/detach"))
            .times(1)
            .returning(|_| {
                Ok(RawResponse {
                    status: 404,
                    body: String::from(r#"{"message":"volume is not attached"}"#),
                })
            });

        let client = VolumeClient::new(Arc::new(mock), Arc::new(RegionSet::default()));
        let err = client
            .detach("nl-ams-1", &VolumeAttachment::new("srv-1", "vol-9"))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::RemoteRejected);
    }

    #[tokio::test]
    async fn test_blank_ids_rejected_locally() {
        let mut mock = MockRequester::new();
        mock.expect_issue().never();

        let client = VolumeClient::new(Arc::new(mock), Arc::new(RegionSet::default()));
        let err = client
            .attach("nl-ams-1", &VolumeAttachment::new("srv-1", ""))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Validation);

        let err = client
            .detach("nl-ams-1", &VolumeAttachment::new("../servers/srv-1", "vol-9"))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Validation);
    }
}
