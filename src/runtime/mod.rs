//! Narrow interface to the container runtime.
//!
//! Everything the engine does to containers goes through [`RuntimeGateway`].
//! [`DockerCli`] shells out to the `docker` binary; [`InMemoryRuntime`] keeps
//! containers in a map for tests and dry runs.

pub mod docker;
pub mod error;
pub mod memory;
pub mod types;

pub use docker::DockerCli;
pub use error::RuntimeError;
pub use memory::{InMemoryRuntime, RuntimeCall};
pub use types::{host_port_for, ContainerInfo, Mount, PortBinding, RestartPolicy, RunSpec};

use async_trait::async_trait;
use std::path::Path;

pub type RuntimeResult<T> = std::result::Result<T, RuntimeError>;

#[async_trait]
pub trait RuntimeGateway: Send + Sync {
    /// List containers. `all` includes stopped ones.
    async fn list_containers(&self, all: bool) -> RuntimeResult<Vec<ContainerInfo>>;

    /// Create and start a container, returning its id.
    async fn create_and_start(&self, spec: &RunSpec) -> RuntimeResult<String>;

    async fn stop(&self, id: &str) -> RuntimeResult<()>;

    /// Remove a container. Removing a missing container is not an error.
    async fn remove(&self, id: &str) -> RuntimeResult<()>;

    async fn restart(&self, id: &str) -> RuntimeResult<()>;

    /// Last `tail` lines of combined stdout/stderr.
    async fn logs(&self, id: &str, tail: usize) -> RuntimeResult<String>;

    async fn image_exists(&self, image: &str) -> RuntimeResult<bool>;

    async fn pull_image(&self, image: &str) -> RuntimeResult<()>;

    async fn build_image(&self, context: &Path, tag: &str) -> RuntimeResult<()>;

    /// Find a container by id, id prefix, or name.
    async fn find_container(&self, name_or_id: &str) -> RuntimeResult<Option<ContainerInfo>> {
        let wanted = name_or_id.trim_start_matches('/');
        if wanted.is_empty() {
            return Ok(None);
        }
        let containers = self.list_containers(true).await?;
        Ok(containers
            .into_iter()
            .find(|c| c.name == wanted || c.id == wanted || c.id.starts_with(wanted)))
    }
}

/// Pull `image` unless it is already present locally.
pub async fn ensure_image(gateway: &dyn RuntimeGateway, image: &str) -> RuntimeResult<()> {
    if gateway.image_exists(image).await? {
        tracing::debug!("Image {} already present", image);
        return Ok(());
    }
    tracing::info!("Pulling image {}", image);
    gateway.pull_image(image).await
}
