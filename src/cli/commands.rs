//! CLI command definitions.
//!
//! This module defines all CLI commands and their arguments using clap.

use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

use crate::api::ServerAction;

/// arvan-iaas - Declarative `ArvanCloud` IaaS manager.
#[derive(Parser, Debug)]
#[command(name = "arvan-iaas")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Path to the manifest file.
    #[arg(short, long, global = true, env = "ARVAN_IAAS_CONFIG")]
    pub config: Option<PathBuf>,

    /// Enable verbose output.
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Output format (text, json).
    #[arg(long, global = true, default_value = "text")]
    pub output: OutputFormat,

    /// Emit logs as JSON lines.
    #[arg(long, global = true)]
    pub log_json: bool,

    /// Subcommand to execute.
    #[command(subcommand)]
    pub command: Commands,
}

/// Available CLI commands.
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Validate the manifest.
    Validate {
        /// Show all warnings, not just errors.
        #[arg(short, long)]
        warnings: bool,
    },

    /// Show what apply would change.
    Plan,

    /// Bring servers and attachments to the manifest.
    Apply {
        /// Skip confirmation prompt.
        #[arg(short, long)]
        yes: bool,
    },

    /// Detach every tracked volume and forget every tracked server.
    Destroy {
        /// Skip confirmation prompt.
        #[arg(short, long)]
        yes: bool,
    },

    /// Run a single action against a server.
    Server {
        /// Action to run.
        #[command(subcommand)]
        command: ServerCommands,
    },

    /// Query images.
    Image {
        /// Image subcommand.
        #[command(subcommand)]
        command: ImageCommands,
    },

    /// Manage volume attachments.
    Attachment {
        /// Attachment subcommand.
        #[command(subcommand)]
        command: AttachmentCommands,
    },

    /// Inspect tracked state.
    State {
        /// State subcommand.
        #[command(subcommand)]
        command: StateCommands,
    },
}

/// Server an action is aimed at.
#[derive(Args, Debug, Clone)]
pub struct ServerTarget {
    /// Region code, e.g. `ir-thr-c2`.
    #[arg(long)]
    pub region: String,

    /// Server UUID.
    #[arg(long)]
    pub id: String,
}

/// One-off server actions.
#[derive(Subcommand, Debug)]
pub enum ServerCommands {
    /// Rename the server.
    Rename {
        #[command(flatten)]
        #[allow(missing_docs)]
        target: ServerTarget,
        /// New name.
        #[arg(long)]
        name: String,
    },
    /// Power the server off.
    PowerOff(ServerTarget),
    /// Power the server on.
    PowerOn(ServerTarget),
    /// Graceful reboot.
    Reboot(ServerTarget),
    /// Forced reboot.
    HardReboot(ServerTarget),
    /// Boot into rescue mode.
    Rescue(ServerTarget),
    /// Leave rescue mode.
    Unrescue(ServerTarget),
    /// Reinstall from an image.
    Rebuild {
        #[command(flatten)]
        #[allow(missing_docs)]
        target: ServerTarget,
        /// Image id.
        #[arg(long)]
        image_id: String,
    },
    /// Change the flavor.
    Resize {
        #[command(flatten)]
        #[allow(missing_docs)]
        target: ServerTarget,
        /// Flavor id.
        #[arg(long)]
        flavor_id: String,
    },
    /// Grow the root disk.
    ResizeRoot {
        #[command(flatten)]
        #[allow(missing_docs)]
        target: ServerTarget,
        /// New disk size.
        #[arg(long)]
        size: u32,
    },
    /// Snapshot the server.
    Snapshot {
        #[command(flatten)]
        #[allow(missing_docs)]
        target: ServerTarget,
        /// Snapshot name.
        #[arg(long)]
        name: String,
    },
    /// Add a security group.
    AddSecurityGroup {
        #[command(flatten)]
        #[allow(missing_docs)]
        target: ServerTarget,
        /// Security group id.
        #[arg(long)]
        security_group_id: String,
    },
    /// Remove a security group.
    RemoveSecurityGroup {
        #[command(flatten)]
        #[allow(missing_docs)]
        target: ServerTarget,
        /// Security group id.
        #[arg(long)]
        security_group_id: String,
    },
    /// Swap the public IP.
    ChangePublicIp(ServerTarget),
    /// Reset the root password.
    ResetRootPassword(ServerTarget),
}

impl ServerCommands {
    /// Splits the command into its target and the action to perform.
    #[must_use]
    pub fn into_action(self) -> (ServerTarget, ServerAction) {
        match self {
            Self::Rename { target, name } => (target, ServerAction::Rename { name }),
            Self::PowerOff(target) => (target, ServerAction::PowerOff),
            Self::PowerOn(target) => (target, ServerAction::PowerOn),
            Self::Reboot(target) => (target, ServerAction::SoftReboot),
            Self::HardReboot(target) => (target, ServerAction::HardReboot),
            Self::Rescue(target) => (target, ServerAction::Rescue),
            Self::Unrescue(target) => (target, ServerAction::Unrescue),
            Self::Rebuild { target, image_id } => (target, ServerAction::Rebuild { image_id }),
            Self::Resize { target, flavor_id } => (target, ServerAction::ChangeFlavor { flavor_id }),
            Self::ResizeRoot { target, size } => {
                (target, ServerAction::ChangeDiskSize { new_size: size })
            }
            Self::Snapshot { target, name } => (target, ServerAction::Snapshot { name }),
            Self::AddSecurityGroup {
                target,
                security_group_id,
            } => (target, ServerAction::AddSecurityGroup { security_group_id }),
            Self::RemoveSecurityGroup {
                target,
                security_group_id,
            } => (target, ServerAction::RemoveSecurityGroup { security_group_id }),
            Self::ChangePublicIp(target) => (target, ServerAction::ChangePublicIp),
            Self::ResetRootPassword(target) => (target, ServerAction::ResetRootPassword),
        }
    }
}

/// Image subcommands.
#[derive(Subcommand, Debug)]
pub enum ImageCommands {
    /// List images of one type in a region.
    List {
        /// Region code.
        #[arg(long)]
        region: String,
        /// Image type, e.g. `distributions`.
        #[arg(long = "type", default_value = "distributions")]
        image_type: String,
    },
    /// Resolve an image name to its id.
    Find {
        /// Region code.
        #[arg(long)]
        region: String,
        /// Image name.
        #[arg(long)]
        name: String,
        /// Image type.
        #[arg(long = "type", default_value = "distributions")]
        image_type: String,
    },
}

/// Attachment subcommands.
#[derive(Subcommand, Debug)]
pub enum AttachmentCommands {
    /// Start tracking an attachment that already exists.
    Import {
        /// Volume id of the attachment.
        id: String,
    },
}

/// State subcommands.
#[derive(Subcommand, Debug)]
pub enum StateCommands {
    /// Show current state.
    Show,
}

/// Output format options.
#[derive(Debug, Clone, Copy, Default, clap::ValueEnum)]
pub enum OutputFormat {
    /// Human-readable text output.
    #[default]
    Text,
    /// JSON output for scripting.
    Json,
}
