//! Configuration module.
//!
//! This module handles all manifest-related functionality:
//! - Parsing and deserializing `arvan-iaas.yaml`
//! - Validation of regions, ids and desired values
//! - Computing configuration hashes for change detection

mod hash;
mod parser;
mod spec;
mod validator;

pub use hash::ConfigHasher;
pub use parser::{find_config_file, ConfigParser, API_KEY_VAR, DEFAULT_CONFIG_FILES};
pub use spec::{
    ImageRef, ImageSelector, Manifest, PowerState, ProviderConfig, ServerConfig, StateConfig,
    VolumeAttachmentConfig,
};
pub use validator::{ConfigValidator, ValidationError, ValidationResult};
