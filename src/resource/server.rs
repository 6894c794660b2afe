//! Server lifecycle.
//!
//! Servers are provisioned elsewhere; this resource adopts an existing
//! server by id and drives its mutable fields through server actions. The
//! work is a diff between the last applied config and the desired one,
//! turned into an ordered [`ActionPlan`] and executed until the first error.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::api::{ImageClient, ServerActions};
use crate::config::{ConfigHasher, ImageRef, ServerConfig};
use crate::error::{IaasError, ReconcileError, Result};
use crate::planner::{ActionPlan, PlanExecutor};

use super::{Diagnostics, Lifecycle, ResourceData};

/// Tracked data of a server.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServerData {
    /// Desired configuration.
    pub config: ServerConfig,
    /// Image id the config's image reference resolved to.
    pub image_id: Option<String>,
}

impl ServerData {
    /// Wraps a config whose image is not resolved yet.
    #[must_use]
    pub const fn new(config: ServerConfig) -> Self {
        Self { config, image_id: None }
    }
}

/// Lifecycle of servers.
#[derive(Debug, Clone)]
pub struct ServerReconciler {
    actions: ServerActions,
    images: ImageClient,
    hasher: ConfigHasher,
}

impl ServerReconciler {
    /// Creates a reconciler.
    #[must_use]
    pub const fn new(actions: ServerActions, images: ImageClient) -> Self {
        Self {
            actions,
            images,
            hasher: ConfigHasher::new(),
        }
    }

    /// Resolves the image a config refers to.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` when a looked-up image does not exist, or any
    /// error of the listing call.
    pub async fn resolve_image(&self, config: &ServerConfig) -> Result<Option<String>> {
        match &config.image {
            None => Ok(None),
            Some(ImageRef::Id { id }) => Ok(Some(id.clone())),
            Some(ImageRef::Lookup { name, image_type }) => self
                .images
                .find_image_id(&config.region, name, image_type)
                .await
                .map(Some),
        }
    }

    /// Computes the actions that move a server from `prior` to `desired`.
    ///
    /// Returns the plan together with the image id the desired config
    /// resolves to.
    ///
    /// # Errors
    ///
    /// Returns `ReplacementRequired` when the region or id changes, or an
    /// image resolution error.
    pub async fn plan(
        &self,
        prior: Option<&ServerData>,
        desired: &ServerConfig,
    ) -> Result<(ActionPlan, Option<String>)> {
        if let Some(prior) = prior {
            check_immutable(&prior.config, desired)?;

            if self.hasher.hash_server(&prior.config) == self.hasher.hash_server(desired) {
                debug!("{} unchanged", desired.address());
                let plan = ActionPlan {
                    region: desired.region.clone(),
                    server_id: desired.id.clone(),
                    actions: vec![],
                };
                return Ok((plan, prior.image_id.clone()));
            }
        }

        let image_id = match prior {
            Some(prior) if prior.config.image == desired.image => prior.image_id.clone(),
            _ => self.resolve_image(desired).await?,
        };

        let plan = ActionPlan::for_server(
            prior.map(|p| &p.config),
            prior.and_then(|p| p.image_id.as_deref()),
            desired,
            image_id.as_deref(),
        );
        debug!("{}: {} actions planned", desired.address(), plan.len());

        Ok((plan, image_id))
    }

    async fn converge(&self, prior: Option<&ServerData>, data: &mut ResourceData<ServerData>) -> Diagnostics {
        let (plan, image_id) = match self.plan(prior, &data.config.config).await {
            Ok(planned) => planned,
            Err(e) => return e.into(),
        };

        let result = PlanExecutor::new(&self.actions).execute(&plan).await;
        debug!("{}: {result}", data.config.config.address());
        if let Err(e) = result.into_result() {
            return e.into();
        }

        data.id = Some(data.config.config.id.clone());
        data.config.image_id = image_id;
        Diagnostics::new()
    }
}

fn check_immutable(prior: &ServerConfig, desired: &ServerConfig) -> Result<()> {
    let replacement = |field: &str, from: &str, to: &str| ReconcileError::ReplacementRequired {
        resource: prior.address(),
        field: field.to_string(),
        from: from.to_string(),
        to: to.to_string(),
    };

    if prior.region != desired.region {
        return Err(replacement("region", &prior.region, &desired.region).into());
    }
    if prior.id != desired.id {
        return Err(replacement("id", &prior.id, &desired.id).into());
    }
    Ok(())
}

#[async_trait]
impl Lifecycle for ServerReconciler {
    type Config = ServerData;

    /// Adopts the server named by the config and applies its managed
    /// fields. The image is recorded as the baseline, never rebuilt.
    async fn create(&self, data: &mut ResourceData<ServerData>) -> Diagnostics {
        info!("Adopting {}", data.config.config.address());
        self.converge(None, data).await
    }

    async fn read(&self, _data: &mut ResourceData<ServerData>) -> Diagnostics {
        Diagnostics::new()
    }

    async fn update(&self, prior: &ResourceData<ServerData>, data: &mut ResourceData<ServerData>) -> Diagnostics {
        if prior.id.is_none() {
            return IaasError::from(ReconcileError::MissingId {
                resource: prior.config.config.address(),
            })
            .into();
        }
        self.converge(Some(&prior.config), data).await
    }

    /// Stops tracking the server. The server itself is left running.
    async fn delete(&self, data: &mut ResourceData<ServerData>) -> Diagnostics {
        info!("Forgetting {}", data.config.config.address());
        data.id = None;
        Diagnostics::new()
    }
}
