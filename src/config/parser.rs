//! Manifest parser.
//!
//! Loads the manifest from YAML, applies environment overrides and reads
//! the `.env` file sitting next to it.

use crate::api::RegionSet;
use crate::error::{ConfigError, IaasError, Result};
use std::path::{Path, PathBuf};
use tracing::{debug, info};

use super::spec::Manifest;

/// Default manifest file names, in lookup order.
pub const DEFAULT_CONFIG_FILES: &[&str] = &["arvan-iaas.yaml", "arvan-iaas.yml"];

/// Environment variable holding the API key.
pub const API_KEY_VAR: &str = "ARVAN_API_KEY";

/// Parser for manifests.
#[derive(Debug, Default)]
pub struct ConfigParser {
    /// Base path for resolving relative paths.
    base_path: Option<PathBuf>,
}

impl ConfigParser {
    /// Creates a new parser.
    #[must_use]
    pub const fn new() -> Self {
        Self { base_path: None }
    }

    /// Sets the base path used to find `.env`.
    #[must_use]
    pub fn with_base_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.base_path = Some(path.into());
        self
    }

    /// Loads a manifest from a YAML file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn load_file(&self, path: impl AsRef<Path>) -> Result<Manifest> {
        let path = path.as_ref();
        info!("Loading manifest from: {}", path.display());

        if !path.exists() {
            return Err(IaasError::Config(ConfigError::FileNotFound {
                path: path.to_path_buf(),
            }));
        }

        let content = std::fs::read_to_string(path).map_err(|e| {
            IaasError::Config(ConfigError::ParseError {
                message: format!("Failed to read file: {e}"),
                location: Some(path.display().to_string()),
            })
        })?;

        self.parse_yaml(&content, Some(path))
    }

    /// Parses a manifest from a YAML string.
    ///
    /// # Errors
    ///
    /// Returns an error if the YAML is invalid.
    pub fn parse_yaml(&self, content: &str, source: Option<&Path>) -> Result<Manifest> {
        debug!("Parsing YAML manifest");

        let manifest: Manifest = serde_yaml::from_str(content).map_err(|e| {
            IaasError::Config(ConfigError::ParseError {
                message: format!("YAML parse error: {e}"),
                location: source.map(|p| p.display().to_string()),
            })
        })?;

        debug!(
            "Parsed {} servers, {} attachments, {} images",
            manifest.servers.len(),
            manifest.volume_attachments.len(),
            manifest.images.len()
        );
        Ok(manifest)
    }

    /// Loads a manifest and applies overrides from the process environment.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn load_with_env(&self, path: impl AsRef<Path>) -> Result<Manifest> {
        let mut manifest = self.load_file(path)?;
        Self::apply_env_overrides(&mut manifest, |name| std::env::var(name).ok());
        Ok(manifest)
    }

    /// Applies overrides looked up through `lookup`.
    ///
    /// Recognised variables: `ARVAN_API_URL`, `ARVAN_REGIONS`
    /// (comma-separated), `ARVAN_STATE_PATH`.
    pub fn apply_env_overrides(manifest: &mut Manifest, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(url) = lookup("ARVAN_API_URL") {
            debug!("Overriding provider.api_url from environment");
            manifest.provider.api_url = url;
        }

        if let Some(regions) = lookup("ARVAN_REGIONS") {
            debug!("Overriding provider.regions from environment");
            let set = RegionSet::from_csv(&regions);
            manifest.provider.regions = Some(set.iter().map(String::from).collect());
        }

        if let Some(path) = lookup("ARVAN_STATE_PATH") {
            debug!("Overriding state.path from environment");
            manifest.state.path = Some(path);
        }
    }

    /// Loads the .env file if present.
    ///
    /// # Errors
    ///
    /// Returns an error if the .env file exists but cannot be loaded.
    pub fn load_dotenv(&self) -> Result<()> {
        let env_path = self
            .base_path
            .as_ref()
            .map_or_else(|| PathBuf::from(".env"), |p| p.join(".env"));

        if env_path.exists() {
            info!("Loading environment from: {}", env_path.display());
            dotenvy::from_path(&env_path).map_err(|e| {
                IaasError::Config(ConfigError::ParseError {
                    message: format!("Failed to load .env file: {e}"),
                    location: Some(env_path.display().to_string()),
                })
            })?;
        } else {
            debug!(".env file not found at: {}", env_path.display());
        }

        Ok(())
    }

    /// Reads the API key from the environment.
    ///
    /// # Errors
    ///
    /// Returns an error if `ARVAN_API_KEY` is unset or blank.
    pub fn api_key() -> Result<String> {
        std::env::var(API_KEY_VAR)
            .ok()
            .filter(|k| !k.trim().is_empty())
            .ok_or_else(|| {
                IaasError::Config(ConfigError::MissingEnvVar {
                    name: API_KEY_VAR.to_string(),
                })
            })
    }
}

/// Finds a manifest by walking up from `start`.
///
/// # Errors
///
/// Returns an error if no manifest is found.
pub fn find_config_file(start: impl AsRef<Path>) -> Result<PathBuf> {
    let start = start.as_ref();
    let mut current = Some(start);

    while let Some(dir) = current {
        for name in DEFAULT_CONFIG_FILES {
            let candidate = dir.join(name);
            if candidate.is_file() {
                debug!("Found manifest: {}", candidate.display());
                return Ok(candidate);
            }
        }
        current = dir.parent();
    }

    Err(IaasError::Config(ConfigError::FileNotFound {
        path: start.join(DEFAULT_CONFIG_FILES[0]),
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::spec::{ImageRef, PowerState};
    use std::collections::HashMap;

    #[test]
    fn test_parse_minimal_manifest() {
        let parser = ConfigParser::new();
        let manifest = parser.parse_yaml("{}", None).unwrap();

        assert!(manifest.servers.is_empty());
        assert_eq!(manifest.provider.api_url, "https://napi.arvancloud.ir");
        assert_eq!(manifest.provider.timeout_secs, 30);
    }

    #[test]
    fn test_parse_full_manifest() {
        let yaml = r"
provider:
  api_url: https://example.test
  regions: [nl-ams-1, ir-thr-c2]

state:
  path: .state/iaas.json

servers:
  - id: 6b1c2b0e-3f43-4a4c-9d86-1f0c6f6b9a11
    region: nl-ams-1
    name: web-01
    power: on
    flavor_id: g2-4-2-0
    disk_size: 50
    image:
      name: ubuntu-22.04
      type: distributions
    security_groups: [sg-web, sg-ssh]

volume_attachments:
  - region: nl-ams-1
    abrak_uuid: 6b1c2b0e-3f43-4a4c-9d86-1f0c6f6b9a11
    volume_uuid: 0f5d6a3e-2b1c-4d7e-8f90-123456789abc

images:
  - region: nl-ams-1
    name: debian-12
    type: distributions
";
        let manifest = ConfigParser::new().parse_yaml(yaml, None).unwrap();

        assert_eq!(manifest.provider.region_set().len(), 2);
        assert_eq!(manifest.state.path.as_deref(), Some(".state/iaas.json"));

        let server = &manifest.servers[0];
        assert_eq!(server.name.as_deref(), Some("web-01"));
        assert_eq!(server.power, Some(PowerState::On));
        assert_eq!(server.disk_size, Some(50));
        assert!(matches!(server.image, Some(ImageRef::Lookup { .. })));
        assert_eq!(server.security_groups.as_ref().map(std::collections::BTreeSet::len), Some(2));

        assert_eq!(manifest.volume_attachments.len(), 1);
        assert_eq!(manifest.images[0].key(), "nl-ams-1/distributions/debian-12");
    }

    #[test]
    fn test_parse_error_carries_location() {
        let err = ConfigParser::new()
            .parse_yaml("servers: 3", Some(Path::new("bad.yaml")))
            .unwrap_err();
        match err {
            IaasError::Config(ConfigError::ParseError { location, .. }) => {
                assert_eq!(location.as_deref(), Some("bad.yaml"));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_env_overrides() {
        let vars: HashMap<&str, &str> = HashMap::from([
            ("ARVAN_API_URL", "http://localhost:8080"),
            ("ARVAN_REGIONS", "de-fra-1, nl-ams-1"),
            ("ARVAN_STATE_PATH", "/tmp/state.json"),
        ]);

        let mut manifest = Manifest::default();
        ConfigParser::apply_env_overrides(&mut manifest, |k| vars.get(k).map(|v| (*v).to_string()));

        assert_eq!(manifest.provider.api_url, "http://localhost:8080");
        assert_eq!(
            manifest.provider.regions,
            Some(vec![String::from("de-fra-1"), String::from("nl-ams-1")])
        );
        assert_eq!(manifest.state.path.as_deref(), Some("/tmp/state.json"));
    }

    #[test]
    fn test_find_config_file_walks_up() {
        let dir = tempfile::TempDir::new().unwrap();
        let nested = dir.path().join("a/b");
        std::fs::create_dir_all(&nested).unwrap();
        std::fs::write(dir.path().join("arvan-iaas.yaml"), "{}").unwrap();

        let found = find_config_file(&nested).unwrap();
        assert_eq!(found, dir.path().join("arvan-iaas.yaml"));
    }
}
