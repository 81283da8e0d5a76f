//! Transactional group deployment.
//!
//! Services start one at a time in dependency order. After a service's
//! container is up, the conditions on its dependencies are probed, then its
//! own readiness condition. A condition
//! that does not hold within the budget removes that service's container and
//! aborts the batch; services started earlier keep running.

use crate::dependency::{order, DependencyEdge, ServiceDefinition};
use crate::error::{Error, Result};
use crate::probe::{Prober, ReadinessCondition};
use crate::runtime::{ensure_image, RunSpec, RuntimeGateway};
use serde::Serialize;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tracing::Instrument;

/// Result of a successful group deployment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct GroupDeployment {
    /// Service names in the order they were started.
    pub order: Vec<String>,
    /// Service name to container id.
    pub deployed_services: BTreeMap<String, String>,
}

#[derive(Clone)]
pub struct GroupDeployer {
    runtime: Arc<dyn RuntimeGateway>,
    prober: Prober,
    probe_timeout: Duration,
    base_dir: PathBuf,
}

impl GroupDeployer {
    pub fn new(
        runtime: Arc<dyn RuntimeGateway>,
        prober: Prober,
        probe_timeout: Duration,
        base_dir: impl Into<PathBuf>,
    ) -> Self {
        Self {
            runtime,
            prober,
            probe_timeout,
            base_dir: base_dir.into(),
        }
    }

    /// Validate and order the batch without touching the runtime.
    pub fn plan(&self, definitions: &[ServiceDefinition]) -> Result<Vec<ServiceDefinition>> {
        for def in definitions {
            def.validate()?;
        }
        order(definitions)
    }

    pub async fn deploy(&self, definitions: &[ServiceDefinition]) -> Result<GroupDeployment> {
        let ordered = self.plan(definitions)?;
        tracing::info!(
            "Deploying {} service(s): {}",
            ordered.len(),
            ordered
                .iter()
                .map(|d| d.name.as_str())
                .collect::<Vec<_>>()
                .join(" -> ")
        );

        let mut deployment = GroupDeployment {
            order: Vec::with_capacity(ordered.len()),
            deployed_services: BTreeMap::new(),
        };
        for def in &ordered {
            let id = self
                .deploy_one(def, &deployment.deployed_services)
                .instrument(tracing::info_span!("deploy", service = %def.name))
                .await?;
            deployment.order.push(def.name.clone());
            deployment.deployed_services.insert(def.name.clone(), id);
        }

        tracing::info!("Deployed {} service(s)", deployment.order.len());
        Ok(deployment)
    }

    /// Start one service outside a batch. Its conditions are probed as in a
    /// group, with dependency targets addressed by name.
    pub async fn deploy_service(&self, def: &ServiceDefinition) -> Result<String> {
        def.validate()?;
        self.deploy_one(def, &BTreeMap::new())
            .instrument(tracing::info_span!("deploy", service = %def.name))
            .await
    }

    async fn deploy_one(
        &self,
        def: &ServiceDefinition,
        deployed: &BTreeMap<String, String>,
    ) -> Result<String> {
        let image = self.resolve_image(def).await?;
        let spec = RunSpec::new(image)
            .name(&def.name)
            .ports(&def.ports)
            .env(&def.env_vars);
        let id = self.runtime.create_and_start(&spec).await?;
        tracing::info!("Started container {}", short_id(&id));

        let gates = def
            .dependencies
            .edges()
            .iter()
            .filter_map(|edge| {
                edge.condition
                    .as_ref()
                    .map(|condition| bind_condition(edge, condition, deployed))
            })
            .chain(
                def.readiness
                    .as_ref()
                    .map(|condition| bind_own_condition(def, &id, condition, deployed)),
            )
            .collect::<Vec<_>>();

        for bound in gates {
            tracing::debug!("Waiting for {} (budget {:?})", bound, self.probe_timeout);

            let failure = match self.prober.wait(&bound, self.probe_timeout).await {
                Ok(true) => continue,
                Ok(false) => bound.to_string(),
                Err(e) => format!("{} ({})", bound, e),
            };
            tracing::warn!("Readiness condition not met: {}", failure);
            self.rollback(&id).await;
            return Err(Error::DependencyNotMet {
                service: def.name.clone(),
                condition: failure,
            });
        }

        Ok(id)
    }

    /// Build local build contexts as `<name>:latest`; pull anything else
    /// that is not present.
    async fn resolve_image(&self, def: &ServiceDefinition) -> Result<String> {
        if is_local_path(&def.image) {
            let context = self.base_dir.join(&def.image);
            let tag = format!("{}:latest", def.name);
            tracing::info!("Building {} from {}", tag, context.display());
            self.runtime.build_image(&context, &tag).await?;
            return Ok(tag);
        }
        ensure_image(self.runtime.as_ref(), &def.image).await?;
        Ok(def.image.clone())
    }

    /// Stop and remove the container of the service that failed its probes.
    async fn rollback(&self, id: &str) {
        if let Err(e) = self.runtime.stop(id).await {
            tracing::warn!("Failed to stop {} during rollback: {}", short_id(id), e);
        }
        match self.runtime.remove(id).await {
            Ok(()) => tracing::info!("Rolled back container {}", short_id(id)),
            Err(e) => tracing::warn!("Failed to remove {} during rollback: {}", short_id(id), e),
        }
    }
}

/// Fill a condition's missing target from the batch.
///
/// A TCP condition without a host targets the depended-on service by name.
/// A log condition without a container, or naming a service of the batch,
/// targets that service's container id.
pub fn bind_condition(
    edge: &DependencyEdge,
    condition: &ReadinessCondition,
    deployed: &BTreeMap<String, String>,
) -> ReadinessCondition {
    match condition {
        ReadinessCondition::Tcp { host: None, port } => {
            ReadinessCondition::tcp(edge.service.clone(), *port)
        }
        ReadinessCondition::LogPattern { container, pattern } => {
            let target = container.as_deref().unwrap_or(&edge.service);
            let resolved = deployed
                .get(target)
                .cloned()
                .unwrap_or_else(|| target.to_string());
            ReadinessCondition::log(resolved, pattern.clone())
        }
        other => other.clone(),
    }
}

/// Fill a service's own readiness condition once its container `id` is up.
///
/// A TCP condition without a host targets the service by name. A log
/// condition without a container, or naming the service itself, reads the
/// new container's logs; one naming another service of the batch reads
/// that service's container.
pub fn bind_own_condition(
    def: &ServiceDefinition,
    id: &str,
    condition: &ReadinessCondition,
    deployed: &BTreeMap<String, String>,
) -> ReadinessCondition {
    match condition {
        ReadinessCondition::Tcp { host: None, port } => {
            ReadinessCondition::tcp(def.name.clone(), *port)
        }
        ReadinessCondition::LogPattern { container, pattern } => {
            let resolved = match container.as_deref() {
                None => id.to_string(),
                Some(name) if name == def.name => id.to_string(),
                Some(name) => deployed
                    .get(name)
                    .cloned()
                    .unwrap_or_else(|| name.to_string()),
            };
            ReadinessCondition::log(resolved, pattern.clone())
        }
        other => other.clone(),
    }
}

/// `.`, `./app`, `../app` and absolute paths are build contexts.
pub fn is_local_path(image: &str) -> bool {
    image == "."
        || image == ".."
        || image.starts_with("./")
        || image.starts_with("../")
        || Path::new(image).is_absolute()
}

fn short_id(id: &str) -> &str {
    id.get(..12).unwrap_or(id)
}
