//! Manifest validation.
//!
//! Everything checked here is checked once, at the boundary, so the
//! reconcilers only ever see well-formed typed configs.

use crate::api::RegionSet;
use crate::error::{ConfigError, IaasError, Result};
use std::collections::{HashMap, HashSet};
use tracing::debug;
use uuid::Uuid;

use super::spec::{ImageRef, ImageSelector, Manifest, ServerConfig, VolumeAttachmentConfig};

/// Validator for manifests.
#[derive(Debug, Default)]
pub struct ConfigValidator {
    /// Accepted region codes.
    regions: RegionSet,
}

/// Validation result containing all errors found.
#[derive(Debug, Default)]
pub struct ValidationResult {
    /// List of validation errors.
    pub errors: Vec<ValidationError>,
    /// List of warnings (non-fatal issues).
    pub warnings: Vec<String>,
}

/// A single validation error.
#[derive(Debug)]
pub struct ValidationError {
    /// The field path that failed validation.
    pub field: String,
    /// The error message.
    pub message: String,
}

impl ConfigValidator {
    /// Creates a validator over the given region set.
    #[must_use]
    pub const fn new(regions: RegionSet) -> Self {
        Self { regions }
    }

    /// Validates a manifest, collecting every problem.
    #[must_use]
    pub fn check(&self, manifest: &Manifest) -> ValidationResult {
        let mut result = ValidationResult::default();

        self.validate_servers(&manifest.servers, &mut result);
        self.validate_attachments(&manifest.volume_attachments, &mut result);
        self.validate_images(&manifest.images, &mut result);

        result
    }

    /// Validates a manifest.
    ///
    /// # Errors
    ///
    /// Returns the first validation error if there is any.
    pub fn validate(&self, manifest: &Manifest) -> Result<ValidationResult> {
        let result = self.check(manifest);

        match result.errors.first() {
            None => {
                debug!("Manifest validation passed");
                Ok(result)
            }
            Some(first) => Err(IaasError::Config(ConfigError::ValidationError {
                message: first.message.clone(),
                field: Some(first.field.clone()),
            })),
        }
    }

    /// Validates one server config.
    pub fn validate_server(&self, field: &str, server: &ServerConfig, result: &mut ValidationResult) {
        self.check_region(&format!("{field}.region"), &server.region, result);
        check_uuid(&format!("{field}.id"), &server.id, result);

        if let Some(name) = &server.name {
            check_not_blank(&format!("{field}.name"), name, result);
        }
        if let Some(flavor) = &server.flavor_id {
            check_not_blank(&format!("{field}.flavor_id"), flavor, result);
        }
        if server.disk_size == Some(0) {
            result.error(&format!("{field}.disk_size"), "Disk size must be positive");
        }

        match &server.image {
            Some(ImageRef::Id { id }) => check_not_blank(&format!("{field}.image.id"), id, result),
            Some(ImageRef::Lookup { name, image_type }) => {
                check_not_blank(&format!("{field}.image.name"), name, result);
                check_not_blank(&format!("{field}.image.type"), image_type, result);
            }
            None => {}
        }

        if let Some(groups) = &server.security_groups {
            for group in groups {
                check_not_blank(&format!("{field}.security_groups"), group, result);
            }
        }

        if server.manages_nothing() {
            result
                .warnings
                .push(format!("{field}: server {} has no managed fields", server.id));
        }
    }

    /// Validates one attachment config.
    pub fn validate_attachment(
        &self,
        field: &str,
        attachment: &VolumeAttachmentConfig,
        result: &mut ValidationResult,
    ) {
        self.check_region(&format!("{field}.region"), &attachment.region, result);
        check_uuid(&format!("{field}.server_id"), &attachment.server_id, result);
        check_uuid(&format!("{field}.volume_id"), &attachment.volume_id, result);
    }

    fn validate_servers(&self, servers: &[ServerConfig], result: &mut ValidationResult) {
        let mut seen = HashSet::new();
        for (i, server) in servers.iter().enumerate() {
            let field = format!("servers[{i}]");
            self.validate_server(&field, server, result);

            if !seen.insert(server.id.as_str()) {
                result.error(&format!("{field}.id"), &format!("Duplicate server id: {}", server.id));
            }
        }
    }

    fn validate_attachments(&self, attachments: &[VolumeAttachmentConfig], result: &mut ValidationResult) {
        let mut owners: HashMap<&str, &str> = HashMap::new();
        for (i, attachment) in attachments.iter().enumerate() {
            let field = format!("volume_attachments[{i}]");
            self.validate_attachment(&field, attachment, result);

            if let Some(owner) = owners.insert(&attachment.volume_id, &attachment.server_id) {
                result.error(
                    &format!("{field}.volume_id"),
                    &format!(
                        "Volume {} is already attached to server {owner}; a volume attaches to one server",
                        attachment.volume_id
                    ),
                );
            }
        }
    }

    fn validate_images(&self, images: &[ImageSelector], result: &mut ValidationResult) {
        for (i, image) in images.iter().enumerate() {
            let field = format!("images[{i}]");
            self.check_region(&format!("{field}.region"), &image.region, result);
            check_not_blank(&format!("{field}.name"), &image.name, result);
            check_not_blank(&format!("{field}.type"), &image.image_type, result);
        }
    }

    fn check_region(&self, field: &str, region: &str, result: &mut ValidationResult) {
        if !self.regions.contains(region) {
            result.error(field, &format!("Unknown region '{region}'"));
        }
    }
}

fn check_uuid(field: &str, value: &str, result: &mut ValidationResult) {
    if Uuid::parse_str(value).is_err() {
        result.error(field, &format!("'{value}' is not a valid UUID"));
    }
}

fn check_not_blank(field: &str, value: &str, result: &mut ValidationResult) {
    if value.trim().is_empty() {
        result.error(field, "Must not be empty");
    }
}

impl ValidationResult {
    /// Returns true if there are no errors.
    #[must_use]
    pub fn is_valid(&self) -> bool {
        self.errors.is_empty()
    }

    /// Records an error.
    pub fn error(&mut self, field: &str, message: &str) {
        self.errors.push(ValidationError {
            field: field.to_string(),
            message: message.to_string(),
        });
    }
}

impl std::fmt::Display for ValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::spec::PowerState;

    const SERVER: &str = "6b1c2b0e-3f43-4a4c-9d86-1f0c6f6b9a11";
    const OTHER_SERVER: &str = "9e2a7c41-0d5b-4f3e-a1b2-c3d4e5f60718";
    const VOLUME: &str = "0f5d6a3e-2b1c-4d7e-8f90-123456789abc";

    fn attachment(server: &str, volume: &str) -> VolumeAttachmentConfig {
        VolumeAttachmentConfig {
            region: String::from("nl-ams-1"),
            server_id: server.to_string(),
            volume_id: volume.to_string(),
        }
    }

    #[test]
    fn test_valid_manifest() {
        let mut server = ServerConfig::new(SERVER, "nl-ams-1");
        server.power = Some(PowerState::On);

        let manifest = Manifest {
            servers: vec![server],
            volume_attachments: vec![attachment(SERVER, VOLUME)],
            images: vec![ImageSelector::new("nl-ams-1", "ubuntu-22.04", "distributions")],
            ..Manifest::default()
        };

        let result = ConfigValidator::default().validate(&manifest).unwrap();
        assert!(result.is_valid());
        assert!(result.warnings.is_empty());
    }

    #[test]
    fn test_unknown_region_and_bad_uuid() {
        let manifest = Manifest {
            volume_attachments: vec![VolumeAttachmentConfig {
                region: String::from("mars-1"),
                server_id: String::from("srv-1"),
                volume_id: VOLUME.to_string(),
            }],
            ..Manifest::default()
        };

        let result = ConfigValidator::default().check(&manifest);
        let fields: Vec<&str> = result.errors.iter().map(|e| e.field.as_str()).collect();
        assert_eq!(
            fields,
            vec!["volume_attachments[0].region", "volume_attachments[0].server_id"]
        );
    }

    #[test]
    fn test_volume_attached_twice() {
        let manifest = Manifest {
            volume_attachments: vec![attachment(SERVER, VOLUME), attachment(OTHER_SERVER, VOLUME)],
            ..Manifest::default()
        };

        let err = ConfigValidator::default().validate(&manifest).unwrap_err();
        assert!(err.to_string().contains("already attached"));
    }

    #[test]
    fn test_zero_disk_and_duplicate_servers() {
        let mut server = ServerConfig::new(SERVER, "nl-ams-1");
        server.disk_size = Some(0);

        let manifest = Manifest {
            servers: vec![server.clone(), server],
            ..Manifest::default()
        };

        let result = ConfigValidator::default().check(&manifest);
        assert!(result.errors.iter().any(|e| e.field == "servers[0].disk_size"));
        assert!(result.errors.iter().any(|e| e.message.starts_with("Duplicate server id")));
    }

    #[test]
    fn test_unmanaged_server_warns() {
        let manifest = Manifest {
            servers: vec![ServerConfig::new(SERVER, "nl-ams-1")],
            ..Manifest::default()
        };

        let result = ConfigValidator::default().validate(&manifest).unwrap();
        assert_eq!(result.warnings.len(), 1);
    }

    #[test]
    fn test_custom_region_set() {
        let validator = ConfigValidator::new(RegionSet::new(["lab-1"]));
        let manifest = Manifest {
            images: vec![ImageSelector::new("lab-1", "alpine", "distributions")],
            ..Manifest::default()
        };
        assert!(validator.validate(&manifest).is_ok());
    }
}
