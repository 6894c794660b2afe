//! State management module.
//!
//! Persists the last-applied configuration of every tracked resource so
//! later runs can diff against it.

mod local;
mod store;
mod types;

pub use local::{LocalStateStore, STATE_DIR};
pub use store::StateStore;
pub use types::{AttachmentRecord, ProviderState, ServerState, STATE_VERSION};
