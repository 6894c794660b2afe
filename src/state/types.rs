//! State types.
//!
//! The state records what was last applied for each resource. It is the
//! driver's memory: no read primitive exists for most of these resources,
//! so this is the only baseline diffs are computed against.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::config::{ServerConfig, VolumeAttachmentConfig};

/// Current version of the state format.
pub const STATE_VERSION: &str = "1.0";

/// Last-applied state of every tracked resource.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderState {
    /// State format version.
    pub version: String,
    /// Servers keyed by server id.
    #[serde(default)]
    pub servers: BTreeMap<String, ServerState>,
    /// Attachments keyed by their tracked id (the volume id).
    #[serde(default)]
    pub attachments: BTreeMap<String, AttachmentRecord>,
    /// Resolved image ids keyed by selector key.
    #[serde(default)]
    pub images: BTreeMap<String, String>,
    /// When the state was last updated.
    pub last_updated: DateTime<Utc>,
}

/// Last-applied state of a server.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerState {
    /// Config as last applied.
    pub config: ServerConfig,
    /// Hash of that config.
    pub config_hash: String,
    /// Image id the config's image reference resolved to.
    #[serde(default)]
    pub image_id: Option<String>,
    /// When it was applied.
    pub applied_at: DateTime<Utc>,
}

/// A tracked volume attachment.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AttachmentRecord {
    /// Region of the attachment.
    pub region: String,
    /// Server the volume is attached to.
    pub server_id: String,
    /// Attached volume.
    pub volume_id: String,
    /// When it was attached.
    pub attached_at: DateTime<Utc>,
}

impl Default for ProviderState {
    fn default() -> Self {
        Self::new()
    }
}

impl ProviderState {
    /// Creates an empty state.
    #[must_use]
    pub fn new() -> Self {
        Self {
            version: STATE_VERSION.to_string(),
            servers: BTreeMap::new(),
            attachments: BTreeMap::new(),
            images: BTreeMap::new(),
            last_updated: Utc::now(),
        }
    }

    /// Records an applied server config.
    pub fn record_server(&mut self, config: ServerConfig, config_hash: String, image_id: Option<String>) {
        self.servers.insert(
            config.id.clone(),
            ServerState {
                config,
                config_hash,
                image_id,
                applied_at: Utc::now(),
            },
        );
        self.touch();
    }

    /// Forgets a server.
    pub fn remove_server(&mut self, id: &str) -> Option<ServerState> {
        let removed = self.servers.remove(id);
        self.touch();
        removed
    }

    /// Records an attachment under its tracked id.
    pub fn record_attachment(&mut self, id: String, config: &VolumeAttachmentConfig) {
        self.attachments.insert(
            id,
            AttachmentRecord {
                region: config.region.clone(),
                server_id: config.server_id.clone(),
                volume_id: config.volume_id.clone(),
                attached_at: Utc::now(),
            },
        );
        self.touch();
    }

    /// Forgets an attachment.
    pub fn remove_attachment(&mut self, id: &str) -> Option<AttachmentRecord> {
        let removed = self.attachments.remove(id);
        self.touch();
        removed
    }

    /// Records a resolved image id.
    pub fn record_image(&mut self, key: String, id: String) {
        self.images.insert(key, id);
        self.touch();
    }

    /// Returns true if nothing is tracked.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.servers.is_empty() && self.attachments.is_empty() && self.images.is_empty()
    }

    fn touch(&mut self) {
        self.last_updated = Utc::now();
    }
}

impl AttachmentRecord {
    /// Rebuilds the attachment config this record was created from.
    #[must_use]
    pub fn to_config(&self) -> VolumeAttachmentConfig {
        VolumeAttachmentConfig {
            region: self.region.clone(),
            server_id: self.server_id.clone(),
            volume_id: self.volume_id.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_and_remove() {
        let mut state = ProviderState::new();
        assert!(state.is_empty());

        state.record_server(ServerConfig::new("srv", "nl-ams-1"), String::from("h"), None);
        let attachment = VolumeAttachmentConfig {
            region: String::from("nl-ams-1"),
            server_id: String::from("srv"),
            volume_id: String::from("vol"),
        };
        state.record_attachment(String::from("vol"), &attachment);

        assert_eq!(state.attachments["vol"].to_config(), attachment);
        assert!(state.remove_server("srv").is_some());
        assert!(state.remove_attachment("vol").is_some());
        assert!(state.is_empty());
    }
}
