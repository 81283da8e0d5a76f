use super::deploy::GroupDeployer;
use super::Conductor;
use crate::config::Config;
use crate::dependency::DependencyRegistry;
use crate::error::Result;
use crate::health::HealthSupervisor;
use crate::probe::Prober;
use crate::runtime::{DockerCli, RuntimeGateway};
use crate::snapshot::SnapshotEngine;
use crate::store::JsonStore;
use crate::templates::TemplateStore;
use std::path::PathBuf;
use std::sync::Arc;

/// Builder for a [`Conductor`].
///
/// # Example
///
/// ```no_run
/// use service_conductor::{Conductor, Config};
///
/// # fn example() -> Result<(), service_conductor::Error> {
/// let conductor = Conductor::builder()
///     .config(Config::default())
///     .persistent(true)
///     .build()?;
/// # Ok(())
/// # }
/// ```
pub struct ConductorBuilder {
    config: Option<Config>,
    runtime: Option<Arc<dyn RuntimeGateway>>,
    base_dir: Option<PathBuf>,
    state_dir: Option<PathBuf>,
    persistent: bool,
}

impl ConductorBuilder {
    pub fn new() -> Self {
        Self {
            config: None,
            runtime: None,
            base_dir: None,
            state_dir: None,
            persistent: false,
        }
    }

    /// Defaults to [`Config::default`].
    pub fn config(mut self, config: Config) -> Self {
        self.config = Some(config);
        self
    }

    /// Container runtime to use. Defaults to the `docker` CLI from the config.
    pub fn runtime(mut self, runtime: Arc<dyn RuntimeGateway>) -> Self {
        self.runtime = Some(runtime);
        self
    }

    /// Directory that relative build contexts in group files resolve against.
    ///
    /// Defaults to the current directory.
    pub fn base_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.base_dir = Some(dir.into());
        self
    }

    /// Persist dependencies, snapshots and templates under the config's
    /// `state_dir`.
    pub fn persistent(mut self, persistent: bool) -> Self {
        self.persistent = persistent;
        self
    }

    /// Persist dependencies, snapshots and templates under `dir`. Implies
    /// `persistent(true)`.
    pub fn state_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.state_dir = Some(dir.into());
        self.persistent = true;
        self
    }

    pub fn build(self) -> Result<Conductor> {
        let config = self.config.unwrap_or_default();
        config.validate()?;

        let runtime = self.runtime.unwrap_or_else(|| {
            Arc::new(DockerCli::new(
                config.runtime.binary.clone(),
                config.runtime.command_timeout,
            ))
        });
        let prober = Prober::new(config.probe.clone()).with_runtime(Arc::clone(&runtime));
        let deployer = GroupDeployer::new(
            Arc::clone(&runtime),
            prober.clone(),
            config.deploy.probe_timeout,
            self.base_dir.unwrap_or_else(|| PathBuf::from(".")),
        );
        let health = HealthSupervisor::with_default_interval(
            Arc::clone(&runtime),
            prober.clone(),
            config.health.default_interval,
        );

        let (registry, snapshots, templates) = if self.persistent {
            let state_dir = self.state_dir.unwrap_or_else(|| config.state_dir());
            tracing::debug!("Persisting state under {}", state_dir.display());
            (
                DependencyRegistry::with_store(JsonStore::open(state_dir.join("dependencies"))?)?,
                SnapshotEngine::with_store(
                    Arc::clone(&runtime),
                    JsonStore::open(state_dir.join("snapshots"))?,
                )?,
                TemplateStore::with_store(JsonStore::open(state_dir.join("templates"))?)?,
            )
        } else {
            (
                DependencyRegistry::new(),
                SnapshotEngine::new(Arc::clone(&runtime)),
                TemplateStore::new(),
            )
        };

        Ok(Conductor {
            config,
            runtime,
            prober,
            registry,
            deployer,
            health,
            snapshots,
            templates,
        })
    }
}

impl Default for ConductorBuilder {
    fn default() -> Self {
        Self::new()
    }
}
