//! CLI module for the arvan-iaas tool.
//!
//! This module provides the command-line interface for managing
//! `ArvanCloud` servers and volume attachments.

mod commands;
mod output;

pub use commands::{
    AttachmentCommands, Cli, Commands, ImageCommands, OutputFormat, ServerCommands, ServerTarget,
    StateCommands,
};
pub use output::OutputFormatter;
