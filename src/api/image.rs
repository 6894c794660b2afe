//! Image listing and name-to-id lookup.

use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, warn};

use crate::error::{ApiError, Result};

use super::region::{Region, RegionSet};
use super::requester::{ApiRequest, Requester};
use super::{check_segment, ECC_SERVICE, ECC_VERSION};

/// An image as listed by the provider.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Image {
    /// Provider identifier.
    pub id: String,
    /// Image name, e.g. `ubuntu-22.04`.
    pub name: String,
    /// Image type, e.g. `distributions`. Absent when the listing is already
    /// filtered by type.
    #[serde(rename = "type", default)]
    pub image_type: Option<String>,
}

/// Listing envelope.
#[derive(Debug, Deserialize)]
struct ImageList {
    #[serde(default)]
    data: Vec<Image>,
}

/// Returns the first image, in listing order, matching both name and type.
///
/// An image without a type inherits `image_type`, the type the listing was
/// requested with.
#[must_use]
pub fn first_matching_image<'a>(
    images: &'a [Image],
    name: &str,
    image_type: &str,
) -> Option<&'a Image> {
    images.iter().find(|image| matches_selector(image, name, image_type))
}

fn matches_selector(image: &Image, name: &str, image_type: &str) -> bool {
    image.name == name && image.image_type.as_deref().is_none_or(|t| t == image_type)
}

/// Client for image queries.
#[derive(Clone)]
pub struct ImageClient {
    requester: Arc<dyn Requester>,
    regions: Arc<RegionSet>,
}

impl std::fmt::Debug for ImageClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ImageClient")
            .field("regions", &self.regions)
            .finish_non_exhaustive()
    }
}

impl ImageClient {
    /// Creates a new image client.
    #[must_use]
    pub fn new(requester: Arc<dyn Requester>, regions: Arc<RegionSet>) -> Self {
        Self { requester, regions }
    }

    /// Lists a region's images of one type, in provider order.
    ///
    /// # Errors
    ///
    /// Returns a validation error for an unknown region or a type that is
    /// not a plain identifier,
    /// otherwise whatever the call itself fails with.
    pub async fn list_images(&self, region: &str, image_type: &str) -> Result<Vec<Image>> {
        let region = self.regions.validate(region)?;
        check_segment("type", image_type)?;

        let request = ApiRequest::get(images_endpoint(&region, image_type));
        let response = self.requester.issue(request).await?.into_success()?;
        let list: ImageList = response.json()?;

        debug!("Listed {} {image_type} images in {region}", list.data.len());
        Ok(list.data)
    }

    /// Resolves an image name and type to the provider identifier.
    ///
    /// When several images share the pair, the first one in provider order
    /// wins.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` when nothing matches, or any error from
    /// [`ImageClient::list_images`].
    pub async fn find_image_id(&self, region: &str, name: &str, image_type: &str) -> Result<String> {
        let images = self.list_images(region, image_type).await?;

        let mut matching = images.iter().filter(|i| matches_selector(i, name, image_type));
        let Some(first) = matching.next() else {
            return Err(ApiError::not_found("image", format!("{name} ({image_type}) in {region}")).into());
        };

        let others = matching.count();
        if others > 0 {
            warn!("{} {image_type} images named '{name}' in {region}, using the first", others + 1);
        }
        Ok(first.id.clone())
    }
}

fn images_endpoint(region: &Region, image_type: &str) -> String {
    format!("/{ECC_SERVICE}/{ECC_VERSION}/regions/{region}/images?type={image_type}")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::requester::{MockRequester, RawResponse};
    use crate::error::ErrorKind;

    fn image(id: &str, name: &str, image_type: Option<&str>) -> Image {
        Image {
            id: id.to_string(),
            name: name.to_string(),
            image_type: image_type.map(String::from),
        }
    }

    fn client_returning(body: &'static str) -> ImageClient {
        let mut mock = MockRequester::new();
        mock.expect_issue()
            .withf(|req| {
                req.method == reqwest::Method::GET
                    && req.endpoint == "/ecc/v1/regions/nl-ams-1/images?type=distributions"
            })
            .times(1)
            .returning(move |_| {
                Ok(RawResponse {
                    status: 200,
                    body: body.to_string(),
                })
            });
        ImageClient::new(Arc::new(mock), Arc::new(RegionSet::default()))
    }

    #[test]
    fn test_first_match_wins() {
        let images = vec![
            image("a", "debian-12", Some("distributions")),
            image("b", "ubuntu-22.04", Some("distributions")),
            image("c", "ubuntu-22.04", Some("distributions")),
        ];
        assert_eq!(first_matching_image(&images, "ubuntu-22.04", "distributions").unwrap().id, "b");
    }

    #[test]
    fn test_type_must_match_when_present() {
        let images = vec![
            image("snap", "ubuntu-22.04", Some("private")),
            image("dist", "ubuntu-22.04", None),
        ];
        assert_eq!(first_matching_image(&images, "ubuntu-22.04", "distributions").unwrap().id, "dist");
        assert!(first_matching_image(&images, "ubuntu", "distributions").is_none());
    }

    #[tokio::test]
    async fn test_find_image_id_returns_first_fixture_entry() {
        let client = client_returning(
            r#"{"data":[
                {"id":"img-1","name":"ubuntu-22.04","type":"distributions"},
                {"id":"img-2","name":"ubuntu-22.04","type":"distributions"}
            ]}"#,
        );

        let id = client
            .find_image_id("nl-ams-1", "ubuntu-22.04", "distributions")
            .await
            .unwrap();
        assert_eq!(id, "img-1");
    }

    #[tokio::test]
    async fn test_find_image_id_not_found() {
        let client = client_returning(r#"{"data":[{"id":"img-1","name":"debian-12"}]}"#);

        let err = client
            .find_image_id("nl-ams-1", "ubuntu-22.04", "distributions")
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);
    }

    #[tokio::test]
    async fn test_find_image_id_empty_listing() {
        let client = client_returning("{}");

        let err = client
            .find_image_id("nl-ams-1", "ubuntu-22.04", "distributions")
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);
    }

    #[tokio::test]
    async fn test_garbled_listing_is_transport_error() {
        let client = client_returning("<html>");

        let err = client
            .list_images("nl-ams-1", "distributions")
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Transport);
    }

    #[tokio::test]
    async fn test_malformed_type_rejected_locally() {
        let mut mock = MockRequester::new();
        mock.expect_issue().never();
        let client = ImageClient::new(Arc::new(mock), Arc::new(RegionSet::default()));

        let err = client
            .list_images("nl-ams-1", "distributions&type=private")
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Validation);
    }

    #[tokio::test]
    async fn test_unknown_region_rejected_locally() {
        let mut mock = MockRequester::new();
        mock.expect_issue().never();
        let client = ImageClient::new(Arc::new(mock), Arc::new(RegionSet::default()));

        let err = client.find_image_id("moon-1", "x", "distributions").await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Validation);
    }
}
