#![allow(unused_assignments)]

//! # Service Conductor
//!
//! Dependency-aware deployment and supervision of container groups on a
//! single host.
//!
//! ## Features
//!
//! - **Group deployment**: Start a batch of services in dependency order,
//!   gating each on TCP, HTTP or log-pattern readiness conditions
//! - **Rollback**: A service whose readiness condition fails is removed and
//!   the batch stops there
//! - **Health supervision**: Periodic health checks with cancellable
//!   auto-restart loops
//! - **Snapshots**: Capture the running environment and restore it later
//! - **Templates**: Reusable service definitions with per-run overrides
//!
//! ## Quick Start
//!
//! ```no_run
//! use service_conductor::{Conductor, Parser};
//!
//! # async fn example() -> Result<(), service_conductor::Error> {
//! let parser = Parser::new();
//! let config = parser.load_or_default(None)?;
//! let conductor = Conductor::builder().config(config).build()?;
//!
//! let services = parser.load_group("group.yaml")?;
//! let deployment = conductor.deploy_group(&services).await?;
//! println!("{:?}", deployment.deployed_services);
//!
//! conductor.shutdown().await;
//! # Ok(())
//! # }
//! ```
//!
//! ## Concurrency Model
//!
//! - Every operation takes `&self`
//! - The dependency registry, health map, template store and snapshot store
//!   each sit behind their own lock, never held across a runtime call
//! - Supervision loops are tokio tasks stopped through `CancellationToken`s

pub mod config;
pub mod dependency;
pub mod error;
pub mod health;
pub mod orchestrator;
pub mod probe;
pub mod runtime;
pub mod snapshot;
pub mod store;
pub mod templates;

// Re-export commonly used types
pub use config::{Config, Parser};
pub use dependency::{Dependencies, DependencyEdge, ServiceDefinition};
pub use error::{EntityKind, Error, ErrorKind, ErrorReport, Result};
pub use health::{HealthCheck, HealthEndpoint, HealthStatus, HealthSupervisor};
pub use orchestrator::{Conductor, ConductorBuilder, GroupDeployment};
pub use probe::{Prober, ReadinessCondition};
pub use runtime::{DockerCli, InMemoryRuntime, RuntimeGateway};
pub use snapshot::{RestoreReport, Snapshot, SnapshotDiff};
pub use templates::{Template, TemplateOverrides, TemplateSpec};
