//! Server actions.
//!
//! Each state-mutating operation on a server is one [`ServerAction`]
//! variant carrying exactly the fields its remote call needs. Every variant
//! maps to a single `POST /ecc/v1/regions/{region}/servers/{id}/{segment}`.
//! [`ServerActions`] validates the inputs, issues the call once and
//! classifies the answer. It keeps no state between calls.

use serde_json::json;
use std::sync::Arc;
use tracing::{debug, info};

use crate::error::{ApiError, Result};

use super::region::{Region, RegionSet};
use super::requester::{ApiRequest, Requester};
use super::{check_segment, ECC_SERVICE, ECC_VERSION};

/// One remote action on a server.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ServerAction {
    /// Change the server name.
    Rename {
        /// New server name.
        name: String,
    },
    /// Power the server off.
    PowerOff,
    /// Power the server on.
    PowerOn,
    /// Graceful reboot.
    SoftReboot,
    /// Forced reboot.
    HardReboot,
    /// Boot into rescue mode.
    Rescue,
    /// Leave rescue mode.
    Unrescue,
    /// Reinstall the server from an image.
    Rebuild {
        /// Provider identifier of the image.
        image_id: String,
    },
    /// Change the compute flavor.
    ChangeFlavor {
        /// Provider identifier of the flavor.
        flavor_id: String,
    },
    /// Grow the root disk.
    ChangeDiskSize {
        /// New size in the provider's storage unit.
        new_size: u32,
    },
    /// Take a point-in-time image of the server.
    Snapshot {
        /// Name of the snapshot image.
        name: String,
    },
    /// Put the server into a security group.
    AddSecurityGroup {
        /// Provider identifier of the security group.
        security_group_id: String,
    },
    /// Take the server out of a security group.
    RemoveSecurityGroup {
        /// Provider identifier of the security group.
        security_group_id: String,
    },
    /// Swap the public IP address.
    ChangePublicIp,
    /// Reset the root password.
    ResetRootPassword,
}

impl ServerAction {
    /// Last path segment of the endpoint.
    #[must_use]
    pub const fn segment(&self) -> &'static str {
        match self {
            Self::Rename { .. } => "rename",
            Self::PowerOff => "power-off",
            Self::PowerOn => "power-on",
            Self::SoftReboot => "reboot",
            Self::HardReboot => "hard-reboot",
            Self::Rescue => "rescue",
            Self::Unrescue => "unrescue",
            Self::Rebuild { .. } => "rebuild",
            Self::ChangeFlavor { .. } => "resize",
            Self::ChangeDiskSize { .. } => "resizeRoot",
            Self::Snapshot { .. } => "snapshot",
            Self::AddSecurityGroup { .. } => "add-security-group",
            Self::RemoveSecurityGroup { .. } => "remove-security-group",
            Self::ChangePublicIp => "change-public-ip",
            Self::ResetRootPassword => "reset-root-password",
        }
    }

    /// JSON body of the call, if the action takes one.
    #[must_use]
    pub fn body(&self) -> Option<serde_json::Value> {
        match self {
            Self::Rename { name } | Self::Snapshot { name } => Some(json!({ "name": name })),
            Self::Rebuild { image_id } => Some(json!({ "image_id": image_id })),
            Self::ChangeFlavor { flavor_id } => Some(json!({ "flavor_id": flavor_id })),
            Self::ChangeDiskSize { new_size } => Some(json!({ "new_size": new_size })),
            Self::AddSecurityGroup { security_group_id }
            | Self::RemoveSecurityGroup { security_group_id } => {
                Some(json!({ "security_group_id": security_group_id }))
            }
            Self::PowerOff
            | Self::PowerOn
            | Self::SoftReboot
            | Self::HardReboot
            | Self::Rescue
            | Self::Unrescue
            | Self::ChangePublicIp
            | Self::ResetRootPassword => None,
        }
    }

    /// Checks the action's own parameters.
    ///
    /// # Errors
    ///
    /// Returns a validation error for blank names or identifiers and for a
    /// zero disk size.
    pub fn validate(&self) -> Result<()> {
        match self {
            Self::Rename { name } | Self::Snapshot { name } => non_blank("name", name),
            Self::Rebuild { image_id } => non_blank("image_id", image_id),
            Self::ChangeFlavor { flavor_id } => non_blank("flavor_id", flavor_id),
            Self::ChangeDiskSize { new_size } => {
                if *new_size == 0 {
                    Err(ApiError::validation("new_size", "must be a positive size").into())
                } else {
                    Ok(())
                }
            }
            Self::AddSecurityGroup { security_group_id }
            | Self::RemoveSecurityGroup { security_group_id } => {
                non_blank("security_group_id", security_group_id)
            }
            _ => Ok(()),
        }
    }

    /// Builds the request for this action against one server.
    #[must_use]
    pub fn to_request(&self, region: &Region, server_id: &str) -> ApiRequest {
        ApiRequest::post(action_endpoint(region, server_id, self.segment()), self.body())
    }
}

impl std::fmt::Display for ServerAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Rename { name } => write!(f, "rename to '{name}'"),
            Self::Rebuild { image_id } => write!(f, "rebuild from image {image_id}"),
            Self::ChangeFlavor { flavor_id } => write!(f, "resize to flavor {flavor_id}"),
            Self::ChangeDiskSize { new_size } => write!(f, "resize root disk to {new_size}"),
            Self::Snapshot { name } => write!(f, "snapshot '{name}'"),
            Self::AddSecurityGroup { security_group_id } => {
                write!(f, "add security group {security_group_id}")
            }
            Self::RemoveSecurityGroup { security_group_id } => {
                write!(f, "remove security group {security_group_id}")
            }
            other => f.write_str(other.segment()),
        }
    }
}

/// Endpoint of a server action.
#[must_use]
pub fn action_endpoint(region: &Region, server_id: &str, segment: &str) -> String {
    format!("/{ECC_SERVICE}/{ECC_VERSION}/regions/{region}/servers/{server_id}/{segment}")
}

fn non_blank(field: &str, value: &str) -> Result<()> {
    if value.trim().is_empty() {
        Err(ApiError::validation(field, "must not be empty").into())
    } else {
        Ok(())
    }
}

/// Client for server actions.
#[derive(Clone)]
pub struct ServerActions {
    requester: Arc<dyn Requester>,
    regions: Arc<RegionSet>,
}

impl std::fmt::Debug for ServerActions {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServerActions")
            .field("regions", &self.regions)
            .finish_non_exhaustive()
    }
}

impl ServerActions {
    /// Creates a new server actions client.
    #[must_use]
    pub fn new(requester: Arc<dyn Requester>, regions: Arc<RegionSet>) -> Self {
        Self { requester, regions }
    }

    /// Validates the inputs and issues one action.
    ///
    /// # Errors
    ///
    /// Returns a validation error before any call is made for an unknown
    /// region, a server id that is not a plain identifier or invalid action
    /// parameters; a transport
    /// error if the call fails; `RemoteRejected` on a non-success status.
    pub async fn perform(&self, region: &str, id: &str, action: &ServerAction) -> Result<()> {
        let region = self.regions.validate(region)?;
        check_segment("server_id", id)?;
        action.validate()?;

        let request = action.to_request(&region, id);
        debug!("Dispatching {} to {}", action.segment(), request.endpoint);

        self.requester.issue(request).await?.into_success()?;

        info!("Server {id} ({region}): {action}");
        Ok(())
    }

    /// Renames a server.
    ///
    /// # Errors
    ///
    /// See [`ServerActions::perform`].
    pub async fn rename(&self, region: &str, id: &str, new_name: &str) -> Result<()> {
        self.perform(region, id, &ServerAction::Rename { name: new_name.to_string() })
            .await
    }

    /// Powers a server off.
    ///
    /// # Errors
    ///
    /// See [`ServerActions::perform`].
    pub async fn shut_down(&self, region: &str, id: &str) -> Result<()> {
        self.perform(region, id, &ServerAction::PowerOff).await
    }

    /// Powers a server on.
    ///
    /// # Errors
    ///
    /// See [`ServerActions::perform`].
    pub async fn turn_on(&self, region: &str, id: &str) -> Result<()> {
        self.perform(region, id, &ServerAction::PowerOn).await
    }

    /// Reboots a server gracefully.
    ///
    /// # Errors
    ///
    /// See [`ServerActions::perform`].
    pub async fn soft_reboot(&self, region: &str, id: &str) -> Result<()> {
        self.perform(region, id, &ServerAction::SoftReboot).await
    }

    /// Forces a server reboot.
    ///
    /// # Errors
    ///
    /// See [`ServerActions::perform`].
    pub async fn hard_reboot(&self, region: &str, id: &str) -> Result<()> {
        self.perform(region, id, &ServerAction::HardReboot).await
    }

    /// Boots a server into rescue mode.
    ///
    /// # Errors
    ///
    /// See [`ServerActions::perform`].
    pub async fn rescue(&self, region: &str, id: &str) -> Result<()> {
        self.perform(region, id, &ServerAction::Rescue).await
    }

    /// Takes a server out of rescue mode.
    ///
    /// # Errors
    ///
    /// See [`ServerActions::perform`].
    pub async fn unrescue(&self, region: &str, id: &str) -> Result<()> {
        self.perform(region, id, &ServerAction::Unrescue).await
    }

    /// Rebuilds a server from an already resolved image id.
    ///
    /// # Errors
    ///
    /// See [`ServerActions::perform`].
    pub async fn rebuild(&self, region: &str, id: &str, image_id: &str) -> Result<()> {
        self.perform(region, id, &ServerAction::Rebuild { image_id: image_id.to_string() })
            .await
    }

    /// Changes a server's flavor. Does not wait for the resize to finish.
    ///
    /// # Errors
    ///
    /// See [`ServerActions::perform`].
    pub async fn change_flavor(&self, region: &str, id: &str, flavor_id: &str) -> Result<()> {
        self.perform(
            region,
            id,
            &ServerAction::ChangeFlavor { flavor_id: flavor_id.to_string() },
        )
        .await
    }

    /// Resizes a server's root disk. Bounds are enforced by the provider.
    ///
    /// # Errors
    ///
    /// See [`ServerActions::perform`]. A zero size is a validation error.
    pub async fn change_disk_size(&self, region: &str, id: &str, size: u32) -> Result<()> {
        self.perform(region, id, &ServerAction::ChangeDiskSize { new_size: size })
            .await
    }

    /// Snapshots a server. The new image id is not returned; look it up by name.
    ///
    /// # Errors
    ///
    /// See [`ServerActions::perform`].
    pub async fn snapshot(&self, region: &str, id: &str, name: &str) -> Result<()> {
        self.perform(region, id, &ServerAction::Snapshot { name: name.to_string() })
            .await
    }

    /// Adds a server to a security group.
    ///
    /// # Errors
    ///
    /// See [`ServerActions::perform`].
    pub async fn add_security_group(
        &self,
        region: &str,
        id: &str,
        security_group_id: &str,
    ) -> Result<()> {
        self.perform(
            region,
            id,
            &ServerAction::AddSecurityGroup {
                security_group_id: security_group_id.to_string(),
            },
        )
        .await
    }

    /// Removes a server from a security group.
    ///
    /// # Errors
    ///
    /// See [`ServerActions::perform`].
    pub async fn remove_security_group(
        &self,
        region: &str,
        id: &str,
        security_group_id: &str,
    ) -> Result<()> {
        self.perform(
            region,
            id,
            &ServerAction::RemoveSecurityGroup {
                security_group_id: security_group_id.to_string(),
            },
        )
        .await
    }

    /// Assigns a new public IP to a server.
    ///
    /// # Errors
    ///
    /// See [`ServerActions::perform`].
    pub async fn change_public_ip(&self, region: &str, id: &str) -> Result<()> {
        self.perform(region, id, &ServerAction::ChangePublicIp).await
    }

    /// Resets a server's root password.
    ///
    /// # Errors
    ///
    /// See [`ServerActions::perform`].
    pub async fn reset_root_password(&self, region: &str, id: &str) -> Result<()> {
        self.perform(region, id, &ServerAction::ResetRootPassword).await
    }
}
