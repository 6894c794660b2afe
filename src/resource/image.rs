//! Image data source.

use tracing::debug;

use crate::api::ImageClient;
use crate::config::ImageSelector;

use super::{Diagnostics, ResourceData};

/// Read-only resource resolving an image selector to its id.
#[derive(Debug, Clone)]
pub struct ImageDataSource {
    images: ImageClient,
}

impl ImageDataSource {
    /// Creates a data source over an image client.
    #[must_use]
    pub const fn new(images: ImageClient) -> Self {
        Self { images }
    }

    /// Resolves the selector and sets the id to the first matching image.
    pub async fn read(&self, data: &mut ResourceData<ImageSelector>) -> Diagnostics {
        let selector = &data.config;
        match self
            .images
            .find_image_id(&selector.region, &selector.name, &selector.image_type)
            .await
        {
            Ok(id) => {
                debug!("Image {} resolved to {id}", selector.key());
                data.id = Some(id);
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
    use std::sync::Arc;

    #[tokio::test]
    async fn test_read_sets_id() {
        let mut mock = MockRequester::new();
        mock.expect_issue().times(1).returning(|_| {
            Ok(RawResponse {
                status: 200,
                body: String::from(r#"{"data":[{"id":"img-7","name":"alpine","type":"distributions"}]}"#),
            })
        });
        let source = ImageDataSource::new(ImageClient::new(Arc::new(mock), Arc::new(RegionSet::default())));

        let mut data = ResourceData::new(ImageSelector::new("nl-ams-1", "alpine", "distributions"));
        assert!(source.read(&mut data).await.is_empty());
        assert_eq!(data.id.as_deref(), Some("img-7"));
    }

    #[tokio::test]
    async fn test_read_not_found() {
        let mut mock = MockRequester::new();
        mock.expect_issue().times(1).returning(|_| {
            Ok(RawResponse {
                status: 200,
                body: String::from(r#"{"data":[]}"#),
            })
        });
        let source = ImageDataSource::new(ImageClient::new(Arc::new(mock), Arc::new(RegionSet::default())));

        let mut data = ResourceData::new(ImageSelector::new("nl-ams-1", "alpine", "distributions"));
        let diags = source.read(&mut data).await;
        assert_eq!(diags.iter().next().unwrap().detail, "not_found");
        assert!(data.id.is_none());
    }
}
