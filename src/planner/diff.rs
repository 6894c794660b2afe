//! Diff engine for comparing desired vs last-applied state.
//!
//! There is no way to observe a server or an attachment remotely, so the
//! only baseline is what the state file says was last applied.

use tracing::debug;

use crate::config::{ConfigHasher, ServerConfig, VolumeAttachmentConfig};
use crate::state::{AttachmentRecord, ServerState};

/// Engine for computing diffs.
#[derive(Debug, Default)]
pub struct DiffEngine {
    /// Configuration hasher.
    hasher: ConfigHasher,
}

/// Difference for a single resource.
#[derive(Debug, Clone, serde::Serialize)]
pub struct ResourceDiff {
    /// Resource address.
    pub address: String,
    /// Type of difference.
    pub diff_type: DiffType,
    /// Field-level details.
    pub details: Vec<DiffDetail>,
    /// Last applied hash (if any).
    pub old_hash: Option<String>,
    /// Desired hash (if any).
    pub new_hash: Option<String>,
}

/// Type of difference detected.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DiffType {
    /// Resource is not tracked yet.
    Create,
    /// Resource changes in place.
    Update,
    /// Resource has to be removed and created again.
    Replace,
    /// Resource is tracked but no longer desired.
    Delete,
    /// Resource is unchanged.
    NoChange,
}

/// Detail about a specific difference.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
pub struct DiffDetail {
    /// Field that differs.
    pub field: String,
    /// Old value.
    pub old_value: Option<String>,
    /// New value.
    pub new_value: Option<String>,
}

impl DiffEngine {
    /// Creates a new diff engine.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            hasher: ConfigHasher::new(),
        }
    }

    /// Diffs one server.
    #[must_use]
    pub fn diff_server(&self, prior: Option<&ServerState>, desired: Option<&ServerConfig>) -> ResourceDiff {
        match (prior, desired) {
            (None, None) => ResourceDiff::unchanged(String::new()),
            (None, Some(config)) => ResourceDiff {
                address: config.address(),
                diff_type: DiffType::Create,
                details: server_details(None, config),
                old_hash: None,
                new_hash: Some(self.hasher.hash_server(config)),
            },
            (Some(state), None) => ResourceDiff {
                address: state.config.address(),
                diff_type: DiffType::Delete,
                details: vec![],
                old_hash: Some(state.config_hash.clone()),
                new_hash: None,
            },
            (Some(state), Some(config)) => {
                let new_hash = self.hasher.hash_server(config);
                let diff_type = if state.config_hash == new_hash {
                    DiffType::NoChange
                } else if state.config.region == config.region && state.config.id == config.id {
                    DiffType::Update
                } else {
                    DiffType::Replace
                };
                debug!("{}: {diff_type}", config.address());

                ResourceDiff {
                    address: config.address(),
                    diff_type,
                    details: if diff_type == DiffType::NoChange {
                        vec![]
                    } else {
                        server_details(Some(&state.config), config)
                    },
                    old_hash: Some(state.config_hash.clone()),
                    new_hash: Some(new_hash),
                }
            }
        }
    }

    /// Diffs one attachment.
    ///
    /// Attachments cannot change in place: a different pair is a replacement.
    #[must_use]
    pub fn diff_attachment(
        &self,
        prior: Option<&AttachmentRecord>,
        desired: Option<&VolumeAttachmentConfig>,
    ) -> ResourceDiff {
        let detail = |field: &str, old: Option<&str>, new: Option<&str>| DiffDetail {
            field: field.to_string(),
            old_value: old.map(String::from),
            new_value: new.map(String::from),
        };

        match (prior, desired) {
            (None, None) => ResourceDiff::unchanged(String::new()),
            (None, Some(config)) => ResourceDiff {
                address: config.address(),
                diff_type: DiffType::Create,
                details: vec![detail("server_id", None, Some(&config.server_id))],
                old_hash: None,
                new_hash: None,
            },
            (Some(record), None) => ResourceDiff {
                address: record.to_config().address(),
                diff_type: DiffType::Delete,
                details: vec![detail("server_id", Some(&record.server_id), None)],
                old_hash: None,
                new_hash: None,
            },
            (Some(record), Some(config)) => {
                let mut details = Vec::new();
                if record.server_id != config.server_id {
                    details.push(detail("server_id", Some(&record.server_id), Some(&config.server_id)));
                }
                if record.region != config.region {
                    details.push(detail("region", Some(&record.region), Some(&config.region)));
                }

                ResourceDiff {
                    address: config.address(),
                    diff_type: if details.is_empty() {
                        DiffType::NoChange
                    } else {
                        DiffType::Replace
                    },
                    details,
                    old_hash: None,
                    new_hash: None,
                }
            }
        }
    }
}

/// Field-level changes of the managed server fields.
fn server_details(prior: Option<&ServerConfig>, desired: &ServerConfig) -> Vec<DiffDetail> {
    let mut details = Vec::new();
    let mut compare = |field: &str, old: Option<String>, new: Option<String>| {
        if new.is_some() && old != new {
            details.push(DiffDetail {
                field: field.to_string(),
                old_value: old,
                new_value: new,
            });
        }
    };

    compare(
        "region",
        prior.map(|p| p.region.clone()),
        Some(desired.region.clone()).filter(|_| prior.is_some()),
    );
    compare("name", prior.and_then(|p| p.name.clone()), desired.name.clone());
    compare(
        "security_groups",
        prior.and_then(|p| p.security_groups.as_ref()).map(join),
        desired.security_groups.as_ref().map(join),
    );
    compare(
        "rescue",
        prior.and_then(|p| p.rescue).map(|r| r.to_string()),
        desired.rescue.map(|r| r.to_string()),
    );
    compare(
        "image",
        prior.and_then(|p| p.image.as_ref()).map(ToString::to_string),
        desired.image.as_ref().map(ToString::to_string),
    );
    compare(
        "flavor_id",
        prior.and_then(|p| p.flavor_id.clone()),
        desired.flavor_id.clone(),
    );
    compare(
        "disk_size",
        prior.and_then(|p| p.disk_size).map(|d| d.to_string()),
        desired.disk_size.map(|d| d.to_string()),
    );
    compare(
        "power",
        prior.and_then(|p| p.power).map(|p| p.to_string()),
        desired.power.map(|p| p.to_string()),
    );

    details
}

fn join(groups: &std::collections::BTreeSet<String>) -> String {
    groups.iter().map(String::as_str).collect::<Vec<_>>().join(",")
}

impl ResourceDiff {
    fn unchanged(address: String) -> Self {
        Self {
            address,
            diff_type: DiffType::NoChange,
            details: vec![],
            old_hash: None,
            new_hash: None,
        }
    }

    /// Returns true if anything has to happen for this resource.
    #[must_use]
    pub fn has_changes(&self) -> bool {
        self.diff_type != DiffType::NoChange
    }
}

impl std::fmt::Display for DiffType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Create => "create",
            Self::Update => "update",
            Self::Replace => "replace",
            Self::Delete => "delete",
            Self::NoChange => "no change",
        };
        write!(f, "{s}")
    }
}

impl std::fmt::Display for ResourceDiff {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.address, self.diff_type)?;
        if !self.details.is_empty() {
            write!(f, " (")?;
            for (i, detail) in self.details.iter().enumerate() {
                if i > 0 {
                    write!(f, ", ")?;
                }
                write!(f, "{}", detail.field)?;
            }
            write!(f, ")")?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::PowerState;
    use chrono::Utc;

    const SERVER: &str = "6b1c2b0e-3f43-4a4c-9d86-1f0c6f6b9a11";

    fn applied(config: ServerConfig) -> ServerState {
        ServerState {
            config_hash: ConfigHasher::new().hash_server(&config),
            config,
            image_id: None,
            applied_at: Utc::now(),
        }
    }

    #[test]
    fn test_server_create_lists_managed_fields() {
        let mut config = ServerConfig::new(SERVER, "nl-ams-1");
        config.name = Some(String::from("web"));
        config.power = Some(PowerState::On);

        let diff = DiffEngine::new().diff_server(None, Some(&config));
        assert_eq!(diff.diff_type, DiffType::Create);
        let fields: Vec<&str> = diff.details.iter().map(|d| d.field.as_str()).collect();
        assert_eq!(fields, vec!["name", "power"]);
    }

    #[test]
    fn test_server_unchanged_by_hash() {
        let mut config = ServerConfig::new(SERVER, "nl-ams-1");
        config.flavor_id = Some(String::from("g1-2-1"));
        let state = applied(config.clone());

        let diff = DiffEngine::new().diff_server(Some(&state), Some(&config));
        assert!(!diff.has_changes());
    }

    #[test]
    fn test_server_update_and_replace() {
        let engine = DiffEngine::new();
        let state = applied(ServerConfig::new(SERVER, "nl-ams-1"));

        let mut renamed = ServerConfig::new(SERVER, "nl-ams-1");
        renamed.name = Some(String::from("api"));
        let diff = engine.diff_server(Some(&state), Some(&renamed));
        assert_eq!(diff.diff_type, DiffType::Update);
        assert_eq!(diff.details[0].new_value.as_deref(), Some("api"));

        let moved = ServerConfig::new(SERVER, "de-fra-1");
        let diff = engine.diff_server(Some(&state), Some(&moved));
        assert_eq!(diff.diff_type, DiffType::Replace);
        assert_eq!(diff.details[0].field, "region");
    }

    #[test]
    fn test_attachment_diffs() {
        let engine = DiffEngine::new();
        let config = VolumeAttachmentConfig {
            region: String::from("nl-ams-1"),
            server_id: String::from("srv-1"),
            volume_id: String::from("vol-9"),
        };
        let record = AttachmentRecord {
            region: config.region.clone(),
            server_id: config.server_id.clone(),
            volume_id: config.volume_id.clone(),
            attached_at: Utc::now(),
        };

        assert_eq!(engine.diff_attachment(None, Some(&config)).diff_type, DiffType::Create);
        assert_eq!(engine.diff_attachment(Some(&record), None).diff_type, DiffType::Delete);
        assert_eq!(
            engine.diff_attachment(Some(&record), Some(&config)).diff_type,
            DiffType::NoChange
        );

        let mut moved = config;
        moved.server_id = String::from("srv-2");
        let diff = engine.diff_attachment(Some(&record), Some(&moved));
        assert_eq!(diff.diff_type, DiffType::Replace);
        assert_eq!(diff.to_string(), "volume_attachment.vol-9: replace (server_id)");
    }
}
