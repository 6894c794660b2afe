//! IaaS API integration module.
//!
//! This module turns logical operations into correctly shaped calls against
//! the provider: server actions, image lookup and volume attachment, all
//! issued through one shared [`Requester`].

mod actions;
mod image;
mod region;
mod requester;
mod volume;

use std::sync::Arc;

use crate::error::{ApiError, Result};

pub use actions::{action_endpoint, ServerAction, ServerActions};
pub use image::{first_matching_image, Image, ImageClient};
pub use region::{Region, RegionSet, DEFAULT_REGIONS};
pub use requester::{
    ApiRequest, HttpRequester, RawResponse, Requester, DEFAULT_API_URL, DEFAULT_TIMEOUT_SECS,
};
pub use volume::{VolumeAttachment, VolumeClient};

#[cfg(test)]
pub use requester::MockRequester;

/// Service segment of every endpoint.
pub const ECC_SERVICE: &str = "ecc";

/// API version segment of every endpoint.
pub const ECC_VERSION: &str = "v1";

/// Checks a value that is placed into an endpoint as a single path or
/// query segment.
///
/// Only ASCII letters, digits, `-`, `_` and `.` are accepted, and the value
/// may not consist of dots alone. Anything else could change which endpoint
/// the call reaches.
///
/// # Errors
///
/// Returns a validation error naming `field` otherwise.
pub fn check_segment(field: &str, value: &str) -> Result<()> {
    if value.trim().is_empty() {
        return Err(ApiError::validation(field, "must not be empty").into());
    }
    if !value
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'))
    {
        return Err(ApiError::validation(field, format!("'{value}' is not a valid identifier")).into());
    }
    if value.chars().all(|c| c == '.') {
        return Err(ApiError::validation(field, "must not be a relative path").into());
    }
    Ok(())
}

/// All IaaS clients sharing one requester and one region set.
#[derive(Debug, Clone)]
pub struct IaasClient {
    /// Server actions.
    pub servers: ServerActions,
    /// Image queries.
    pub images: ImageClient,
    /// Volume attach/detach.
    pub volumes: VolumeClient,
}

impl IaasClient {
    /// Creates the clients over a shared requester.
    #[must_use]
    pub fn new(requester: Arc<dyn Requester>, regions: RegionSet) -> Self {
        let regions = Arc::new(regions);
        Self {
            servers: ServerActions::new(Arc::clone(&requester), Arc::clone(&regions)),
            images: ImageClient::new(Arc::clone(&requester), Arc::clone(&regions)),
            volumes: VolumeClient::new(requester, regions),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;

    #[test]
    fn test_check_segment_accepts_identifiers() {
        for value in ["6b1c2b0e-3f43-4a4c-9d86-1f0c6f6b9a11", "srv-1", "distributions", "vol_9.a"] {
            assert!(check_segment("id", value).is_ok(), "{value}");
        }
    }

    #[test]
    fn test_check_segment_rejects_url_syntax() {
        for value in ["", "  ", "x/../../volumes/attach?", "a/b", "a?b", "a#b", "a%2Fb", "a b", "..", ".", "a&type=private"] {
            let err = check_segment("id", value).unwrap_err();
            assert_eq!(err.kind(), ErrorKind::Validation, "{value:?}");
        }
    }
}
