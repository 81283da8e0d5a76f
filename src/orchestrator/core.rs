use super::builder::ConductorBuilder;
use super::deploy::{GroupDeployer, GroupDeployment};
use crate::config::Config;
use crate::dependency::{DependencyRecord, DependencyRegistry, ServiceDefinition};
use crate::error::{EntityKind, Error, Result};
use crate::health::{HealthCheck, HealthEndpoint, HealthSupervisor};
use crate::probe::{Prober, ReadinessCondition};
use crate::runtime::{ensure_image, ContainerInfo, RuntimeGateway};
use crate::snapshot::{RestoreReport, Snapshot, SnapshotDiff, SnapshotEngine, SnapshotSummary};
use crate::templates::{Template, TemplateOverrides, TemplateSpec, TemplateStore};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

/// One dependency edge as reported by [`Conductor::get_dependency_status`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DependencyEdgeStatus {
    pub service: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub condition_type: Option<&'static str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub condition: Option<ReadinessCondition>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DependencyStatus {
    pub service: String,
    pub depends_on: Vec<DependencyEdgeStatus>,
    pub created_at: DateTime<Utc>,
    /// Whether a running container is named after the service.
    pub container_running: bool,
}

/// A container started from a template.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TemplateRun {
    pub template: String,
    pub container_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub container_name: Option<String>,
    pub image: String,
    pub ports: BTreeMap<String, String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub health_check: Option<HealthCheck>,
}

/// Entry point for every caller-facing operation.
///
/// Each component owns its state behind its own lock, so operations on
/// different components never contend.
pub struct Conductor {
    pub(super) config: Config,
    pub(super) runtime: Arc<dyn RuntimeGateway>,
    pub(super) prober: Prober,
    pub(super) registry: DependencyRegistry,
    pub(super) deployer: GroupDeployer,
    pub(super) health: HealthSupervisor,
    pub(super) snapshots: SnapshotEngine,
    pub(super) templates: TemplateStore,
}

impl Conductor {
    pub fn builder() -> ConductorBuilder {
        ConductorBuilder::new()
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn runtime(&self) -> &Arc<dyn RuntimeGateway> {
        &self.runtime
    }

    pub fn health(&self) -> &HealthSupervisor {
        &self.health
    }

    // Dependencies and group deployment

    pub fn define_dependency(
        &self,
        service: &str,
        depends_on: &str,
        condition: Option<ReadinessCondition>,
    ) -> Result<DependencyRecord> {
        self.registry.define(service, depends_on, condition)
    }

    /// All registered dependency records, sorted by service.
    pub fn list_dependencies(&self) -> Vec<DependencyRecord> {
        self.registry.list()
    }

    pub fn remove_dependency(&self, service: &str) -> Result<DependencyRecord> {
        self.registry.remove(service)
    }

    /// Deploy a batch. Definitions without inline dependencies pick up the
    /// ones registered with [`define_dependency`](Self::define_dependency).
    pub async fn deploy_group(&self, definitions: &[ServiceDefinition]) -> Result<GroupDeployment> {
        let definitions = self.registry.apply(definitions);
        self.deployer.deploy(&definitions).await
    }

    /// Deployment order for a batch, without side effects.
    pub fn plan_group(&self, definitions: &[ServiceDefinition]) -> Result<Vec<String>> {
        let definitions = self.registry.apply(definitions);
        Ok(self
            .deployer
            .plan(&definitions)?
            .into_iter()
            .map(|d| d.name)
            .collect())
    }

    pub async fn get_dependency_status(&self, service: &str) -> Result<DependencyStatus> {
        let record = self
            .registry
            .get(service)
            .ok_or_else(|| Error::not_found(EntityKind::Dependency, service))?;
        let container_running = self
            .runtime
            .list_containers(false)
            .await?
            .iter()
            .any(|c| c.running && c.name == service);

        Ok(DependencyStatus {
            service: record.service.clone(),
            depends_on: record
                .dependencies
                .edges()
                .iter()
                .map(|edge| DependencyEdgeStatus {
                    service: edge.service.clone(),
                    condition_type: edge.condition.as_ref().map(ReadinessCondition::kind),
                    condition: edge.condition.clone(),
                })
                .collect(),
            created_at: record.created_at,
            container_running,
        })
    }

    // Single containers

    /// Containers known to the runtime. `all` includes stopped ones.
    pub async fn list_services(&self, all: bool) -> Result<Vec<ContainerInfo>> {
        let mut containers = self.runtime.list_containers(all).await?;
        containers.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(containers)
    }

    /// Start one service: build or pull its image, start it and wait for its
    /// readiness condition. Returns the container id.
    pub async fn deploy_service(&self, definition: &ServiceDefinition) -> Result<String> {
        self.deployer.deploy_service(definition).await
    }

    /// Last `tail` log lines of a container given by name, id or id prefix.
    pub async fn get_service_logs(&self, container: &str, tail: usize) -> Result<String> {
        let info = self.lookup_container(container).await?;
        Ok(self.runtime.logs(&info.id, tail).await?)
    }

    /// Stop and remove a container given by name, id or id prefix.
    pub async fn stop_service(&self, container: &str) -> Result<ContainerInfo> {
        let info = self.lookup_container(container).await?;
        self.runtime.stop(&info.id).await?;
        self.runtime.remove(&info.id).await?;
        tracing::info!("Stopped and removed {}", info.name);
        Ok(info)
    }

    async fn lookup_container(&self, container: &str) -> Result<ContainerInfo> {
        self.runtime
            .find_container(container)
            .await?
            .ok_or_else(|| Error::not_found(EntityKind::Container, container))
    }

    /// Wait for an ad-hoc readiness condition.
    pub async fn wait_for(&self, condition: &ReadinessCondition, timeout: Duration) -> Result<bool> {
        self.prober.wait(condition, timeout).await
    }

    // Templates

    pub fn create_template(&self, spec: TemplateSpec) -> Result<Template> {
        self.templates.create(spec)
    }

    pub fn update_template(&self, spec: TemplateSpec) -> Result<Template> {
        self.templates.update(spec)
    }

    /// Start a container from a template, registering its health check.
    pub async fn run_from_template(
        &self,
        name: &str,
        overrides: &TemplateOverrides,
    ) -> Result<TemplateRun> {
        let rendered = self.templates.render(name, overrides)?;
        ensure_image(self.runtime.as_ref(), &rendered.spec.image).await?;
        let container_id = self.runtime.create_and_start(&rendered.spec).await?;
        tracing::info!(
            "Started {} from template {}",
            rendered.spec.name.as_deref().unwrap_or(&container_id),
            name
        );

        let health_check = match &rendered.health {
            None => None,
            Some(hc) => {
                let key = rendered.spec.name.as_deref().unwrap_or(&container_id);
                let mut record = self.health.add(key, hc.endpoint.clone(), Some(hc.interval))?;
                if hc.auto_restart {
                    record = self.health.enable_auto_restart(key)?;
                }
                Some(record)
            }
        };

        Ok(TemplateRun {
            template: rendered.template,
            container_id,
            container_name: rendered.spec.name.clone(),
            image: rendered.spec.image.clone(),
            ports: rendered.ports,
            health_check,
        })
    }

    pub fn list_templates(&self) -> Vec<Template> {
        self.templates.list()
    }

    pub fn get_template(&self, name: &str) -> Result<Template> {
        self.templates
            .get(name)
            .ok_or_else(|| Error::not_found(EntityKind::Template, name))
    }

    pub fn delete_template(&self, name: &str) -> Result<Template> {
        self.templates.delete(name)
    }

    // Health

    /// `endpoint` is `host:port` or an http(s) URL.
    pub fn add_health_check(
        &self,
        container: &str,
        endpoint: &str,
        interval: Option<Duration>,
    ) -> Result<HealthCheck> {
        let endpoint: HealthEndpoint = endpoint.parse()?;
        self.health.add(container, endpoint, interval)
    }

    /// Probe once and return the updated record.
    pub async fn get_service_health(&self, container: &str) -> Result<HealthCheck> {
        self.health.check(container).await
    }

    pub fn enable_auto_restart(&self, container: &str) -> Result<HealthCheck> {
        self.health.enable_auto_restart(container)
    }

    pub fn disable_auto_restart(&self, container: &str) -> Result<HealthCheck> {
        self.health.disable_auto_restart(container)
    }

    pub fn remove_health_check(&self, container: &str) -> Result<HealthCheck> {
        self.health.remove(container)
    }

    pub fn list_health_checks(&self) -> Vec<HealthCheck> {
        self.health.list()
    }

    // Snapshots

    pub async fn snapshot_env(&self, name: &str) -> Result<Snapshot> {
        self.snapshots.capture(name).await
    }

    pub async fn restore_env(&self, name: &str) -> Result<RestoreReport> {
        self.snapshots.restore(name).await
    }

    pub fn list_snapshots(&self) -> Vec<SnapshotSummary> {
        self.snapshots.list()
    }

    pub fn get_snapshot(&self, name: &str) -> Result<Snapshot> {
        self.snapshots
            .get(name)
            .ok_or_else(|| Error::not_found(EntityKind::Snapshot, name))
    }

    pub fn delete_snapshot(&self, name: &str) -> Result<Snapshot> {
        self.snapshots.delete(name)
    }

    pub fn compare_snapshots(&self, name1: &str, name2: &str) -> Result<SnapshotDiff> {
        self.snapshots.compare(name1, name2)
    }

    /// Stop every supervision loop.
    pub async fn shutdown(&self) {
        self.health.shutdown().await;
    }
}
