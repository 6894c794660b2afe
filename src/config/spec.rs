//! Manifest types.
//!
//! These structs map one-to-one onto `arvan-iaas.yaml` and are the typed
//! property bags of each declarative resource. Nothing downstream sees an
//! untyped map.

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

use crate::api::{RegionSet, VolumeAttachment, DEFAULT_API_URL, DEFAULT_TIMEOUT_SECS};

/// The root of a manifest.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct Manifest {
    /// Provider connection settings.
    #[serde(default)]
    pub provider: ProviderConfig,
    /// Where last-applied state is kept.
    #[serde(default)]
    pub state: StateConfig,
    /// Servers under management.
    #[serde(default)]
    pub servers: Vec<ServerConfig>,
    /// Volume attachments under management.
    #[serde(default)]
    pub volume_attachments: Vec<VolumeAttachmentConfig>,
    /// Images to resolve by name.
    #[serde(default)]
    pub images: Vec<ImageSelector>,
}

/// Provider connection settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ProviderConfig {
    /// API base URL.
    #[serde(default = "default_api_url")]
    pub api_url: String,
    /// Request timeout in seconds.
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    /// Accepted region codes. The built-in list is used when absent.
    #[serde(default)]
    pub regions: Option<Vec<String>>,
}

/// State storage settings.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct StateConfig {
    /// Path of the state file.
    #[serde(default)]
    pub path: Option<String>,
}

/// Desired configuration of an existing server.
///
/// Every optional field left out is not managed: no action is ever issued
/// for it.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ServerConfig {
    /// Provider-issued server id.
    pub id: String,
    /// Region the server lives in.
    pub region: String,
    /// Desired server name.
    #[serde(default)]
    pub name: Option<String>,
    /// Desired power state. A newly adopted server is assumed to be on.
    #[serde(default)]
    pub power: Option<PowerState>,
    /// Whether the server should be in rescue mode. A newly adopted server
    /// is assumed not to be.
    #[serde(default)]
    pub rescue: Option<bool>,
    /// Desired flavor.
    #[serde(default)]
    pub flavor_id: Option<String>,
    /// Desired root disk size.
    #[serde(default)]
    pub disk_size: Option<u32>,
    /// Image the server should run.
    #[serde(default)]
    pub image: Option<ImageRef>,
    /// Exact set of security groups the server should belong to.
    #[serde(default)]
    pub security_groups: Option<BTreeSet<String>>,
}

/// Power state of a server.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum PowerState {
    /// Powered on.
    On,
    /// Powered off.
    Off,
}

/// Reference to an image, either resolved or by name.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(untagged)]
pub enum ImageRef {
    /// Provider identifier.
    Id {
        /// Image id.
        id: String,
    },
    /// Name and type, resolved in the server's region.
    Lookup {
        /// Image name.
        name: String,
        /// Image type.
        #[serde(rename = "type")]
        image_type: String,
    },
}

/// A volume attached to a server.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct VolumeAttachmentConfig {
    /// Region of both the server and the volume.
    pub region: String,
    /// Server id.
    #[serde(alias = "abrak_uuid")]
    pub server_id: String,
    /// Volume id.
    #[serde(alias = "volume_uuid")]
    pub volume_id: String,
}

/// An image looked up by name.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ImageSelector {
    /// Region to search.
    pub region: String,
    /// Exact image name.
    pub name: String,
    /// Image type, e.g. `distributions`.
    #[serde(rename = "type")]
    pub image_type: String,
}

fn default_api_url() -> String {
    DEFAULT_API_URL.to_string()
}

const fn default_timeout_secs() -> u64 {
    DEFAULT_TIMEOUT_SECS
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            api_url: default_api_url(),
            timeout_secs: DEFAULT_TIMEOUT_SECS,
            regions: None,
        }
    }
}

impl ProviderConfig {
    /// Returns the configured region set.
    #[must_use]
    pub fn region_set(&self) -> RegionSet {
        self.regions
            .as_ref()
            .map_or_else(RegionSet::default, RegionSet::new)
    }
}

impl ServerConfig {
    /// Creates a config that manages nothing but identity.
    #[must_use]
    pub fn new(id: impl Into<String>, region: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            region: region.into(),
            name: None,
            power: None,
            rescue: None,
            flavor_id: None,
            disk_size: None,
            image: None,
            security_groups: None,
        }
    }

    /// Resource address used in logs and state.
    #[must_use]
    pub fn address(&self) -> String {
        format!("server.{}", self.id)
    }

    /// Returns true if no field beyond identity is managed.
    #[must_use]
    pub const fn manages_nothing(&self) -> bool {
        self.name.is_none()
            && self.power.is_none()
            && self.rescue.is_none()
            && self.flavor_id.is_none()
            && self.disk_size.is_none()
            && self.image.is_none()
            && self.security_groups.is_none()
    }
}

impl VolumeAttachmentConfig {
    /// Resource address used in logs and state.
    #[must_use]
    pub fn address(&self) -> String {
        format!("volume_attachment.{}", self.volume_id)
    }

    /// The attachment pair.
    #[must_use]
    pub fn to_attachment(&self) -> VolumeAttachment {
        VolumeAttachment::new(&self.server_id, &self.volume_id)
    }
}

impl ImageSelector {
    /// Creates a selector.
    #[must_use]
    pub fn new(region: impl Into<String>, name: impl Into<String>, image_type: impl Into<String>) -> Self {
        Self {
            region: region.into(),
            name: name.into(),
            image_type: image_type.into(),
        }
    }

    /// Key under which the resolved id is stored.
    #[must_use]
    pub fn key(&self) -> String {
        format!("{}/{}/{}", self.region, self.image_type, self.name)
    }
}

impl std::fmt::Display for PowerState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::On => f.write_str("on"),
            Self::Off => f.write_str("off"),
        }
    }
}

impl std::fmt::Display for ImageRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Id { id } => f.write_str(id),
            Self::Lookup { name, image_type } => write!(f, "{name} ({image_type})"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_image_ref_untagged_forms() {
        let by_id: ImageRef = serde_yaml::from_str("id: img-1").unwrap();
        assert_eq!(by_id, ImageRef::Id { id: String::from("img-1") });

        let by_name: ImageRef = serde_yaml::from_str("name: ubuntu-22.04\ntype: distributions").unwrap();
        assert_eq!(
            by_name,
            ImageRef::Lookup {
                name: String::from("ubuntu-22.04"),
                image_type: String::from("distributions"),
            }
        );
    }

    #[test]
    fn test_attachment_accepts_legacy_field_names() {
        let yaml = "region: nl-ams-1\nabrak_uuid: srv\nvolume_uuid: vol\n";
        let config: VolumeAttachmentConfig = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(config.server_id, "srv");
        assert_eq!(config.volume_id, "vol");
        assert_eq!(config.address(), "volume_attachment.vol");
    }

    #[test]
    fn test_region_set_defaults() {
        let provider = ProviderConfig::default();
        assert!(provider.region_set().contains("nl-ams-1"));

        let custom = ProviderConfig {
            regions: Some(vec![String::from("de-fra-1")]),
            ..ProviderConfig::default()
        };
        assert!(!custom.region_set().contains("nl-ams-1"));
    }

    #[test]
    fn test_manages_nothing() {
        let mut server = ServerConfig::new("id", "nl-ams-1");
        assert!(server.manages_nothing());
        server.power = Some(PowerState::Off);
        assert!(!server.manages_nothing());
    }
}
