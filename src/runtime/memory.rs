//! In-process [`RuntimeGateway`] used by tests and `--dry-run`.
//!
//! Containers, images and logs live in a map. Every call is recorded so tests
//! can assert on the exact sequence of runtime operations, and individual
//! operations can be made to fail.

use super::{ContainerInfo, RunSpec, RuntimeError, RuntimeGateway, RuntimeResult};
use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};

/// One recorded gateway call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RuntimeCall {
    List { all: bool },
    CreateAndStart { name: Option<String>, image: String },
    Stop(String),
    Remove(String),
    Restart(String),
    Logs(String),
    ImageExists(String),
    Pull(String),
    Build { context: PathBuf, tag: String },
}

#[derive(Default)]
struct State {
    containers: Vec<ContainerInfo>,
    images: HashSet<String>,
    logs: HashMap<String, Vec<String>>,
    calls: Vec<RuntimeCall>,
    failing_creates: HashSet<String>,
    unpullable: HashSet<String>,
    fail_restarts: bool,
    unavailable: bool,
    next_id: u64,
}

#[derive(Default)]
pub struct InMemoryRuntime {
    state: Mutex<State>,
}

impl InMemoryRuntime {
    pub fn new() -> Self {
        Self::default()
    }

    /// Mark an image as already present locally.
    pub fn with_image(self, image: impl Into<String>) -> Self {
        self.state.lock().images.insert(image.into());
        self
    }

    /// Insert a container as if it had been started outside the engine.
    pub fn insert_container(&self, mut info: ContainerInfo) -> String {
        let mut state = self.state.lock();
        if info.id.is_empty() {
            info.id = next_id(&mut state);
        }
        state.images.insert(info.image.clone());
        let id = info.id.clone();
        state.containers.push(info);
        id
    }

    /// Append a line to a container's log output.
    pub fn push_log(&self, id: &str, line: impl Into<String>) {
        self.state
            .lock()
            .logs
            .entry(id.to_string())
            .or_default()
            .push(line.into());
    }

    /// Make `create_and_start` fail for containers with this name.
    pub fn fail_create(&self, name: impl Into<String>) {
        self.state.lock().failing_creates.insert(name.into());
    }

    /// Make `pull_image` fail for this image.
    pub fn fail_pull(&self, image: impl Into<String>) {
        self.state.lock().unpullable.insert(image.into());
    }

    pub fn fail_restarts(&self, fail: bool) {
        self.state.lock().fail_restarts = fail;
    }

    /// Simulate a stopped daemon: every call fails with `DaemonUnavailable`.
    pub fn set_unavailable(&self, unavailable: bool) {
        self.state.lock().unavailable = unavailable;
    }

    pub fn calls(&self) -> Vec<RuntimeCall> {
        self.state.lock().calls.clone()
    }

    pub fn containers(&self) -> Vec<ContainerInfo> {
        self.state.lock().containers.clone()
    }

    pub fn container(&self, name_or_id: &str) -> Option<ContainerInfo> {
        self.state
            .lock()
            .containers
            .iter()
            .find(|c| c.id == name_or_id || c.name == name_or_id)
            .cloned()
    }

    pub fn restart_count(&self, id: &str) -> usize {
        self.state
            .lock()
            .calls
            .iter()
            .filter(|c| matches!(c, RuntimeCall::Restart(target) if target == id))
            .count()
    }

    fn begin(&self, call: RuntimeCall) -> RuntimeResult<parking_lot::MutexGuard<'_, State>> {
        let mut state = self.state.lock();
        state.calls.push(call);
        if state.unavailable {
            return Err(RuntimeError::DaemonUnavailable);
        }
        Ok(state)
    }
}

fn next_id(state: &mut State) -> String {
    state.next_id += 1;
    format!("{:064x}", state.next_id)
}

fn position(state: &State, id: &str) -> Option<usize> {
    state
        .containers
        .iter()
        .position(|c| c.id == id || c.name == id || (id.len() >= 12 && c.id.starts_with(id)))
}

#[async_trait]
impl RuntimeGateway for InMemoryRuntime {
    async fn list_containers(&self, all: bool) -> RuntimeResult<Vec<ContainerInfo>> {
        let state = self.begin(RuntimeCall::List { all })?;
        Ok(state
            .containers
            .iter()
            .filter(|c| all || c.running)
            .cloned()
            .collect())
    }

    async fn create_and_start(&self, spec: &RunSpec) -> RuntimeResult<String> {
        let mut state = self.begin(RuntimeCall::CreateAndStart {
            name: spec.name.clone(),
            image: spec.image.clone(),
        })?;

        if let Some(name) = &spec.name {
            if state.failing_creates.contains(name) {
                return Err(RuntimeError::cmd_failed(
                    format!("run --name {}", name),
                    "injected failure",
                    Some(125),
                ));
            }
            if state.containers.iter().any(|c| &c.name == name) {
                return Err(RuntimeError::cmd_failed(
                    format!("run --name {}", name),
                    format!("Conflict. The container name \"/{}\" is already in use", name),
                    Some(125),
                ));
            }
        }
        if !state.images.contains(&spec.image) {
            return Err(RuntimeError::cmd_failed(
                format!("run {}", spec.image),
                format!("Unable to find image '{}' locally", spec.image),
                Some(125),
            ));
        }

        let id = next_id(&mut state);
        let name = spec
            .name
            .clone()
            .unwrap_or_else(|| format!("container_{}", state.next_id));
        state.containers.push(ContainerInfo {
            id: id.clone(),
            name,
            image: spec.image.clone(),
            running: true,
            port_bindings: spec.port_bindings.clone(),
            env_vars: spec.env.clone(),
            labels: spec.labels.clone(),
            restart_policy: spec.restart_policy.clone().unwrap_or_default(),
            network_mode: spec.network_mode.clone(),
            volume_mounts: spec.mounts.clone(),
        });
        Ok(id)
    }

    async fn stop(&self, id: &str) -> RuntimeResult<()> {
        let mut state = self.begin(RuntimeCall::Stop(id.to_string()))?;
        let idx = position(&state, id).ok_or_else(|| RuntimeError::not_found(id))?;
        state.containers[idx].running = false;
        Ok(())
    }

    async fn remove(&self, id: &str) -> RuntimeResult<()> {
        let mut state = self.begin(RuntimeCall::Remove(id.to_string()))?;
        if let Some(idx) = position(&state, id) {
            let removed = state.containers.remove(idx);
            state.logs.remove(&removed.id);
        }
        Ok(())
    }

    async fn restart(&self, id: &str) -> RuntimeResult<()> {
        let mut state = self.begin(RuntimeCall::Restart(id.to_string()))?;
        if state.fail_restarts {
            return Err(RuntimeError::cmd_failed(
                format!("restart {}", id),
                "injected failure",
                Some(1),
            ));
        }
        let idx = position(&state, id).ok_or_else(|| RuntimeError::not_found(id))?;
        state.containers[idx].running = true;
        Ok(())
    }

    async fn logs(&self, id: &str, tail: usize) -> RuntimeResult<String> {
        let state = self.begin(RuntimeCall::Logs(id.to_string()))?;
        let idx = position(&state, id).ok_or_else(|| RuntimeError::not_found(id))?;
        let lines = match state.logs.get(&state.containers[idx].id) {
            Some(lines) => lines,
            None => return Ok(String::new()),
        };
        let start = lines.len().saturating_sub(tail);
        Ok(lines[start..].join("\n"))
    }

    async fn image_exists(&self, image: &str) -> RuntimeResult<bool> {
        let state = self.begin(RuntimeCall::ImageExists(image.to_string()))?;
        Ok(state.images.contains(image))
    }

    async fn pull_image(&self, image: &str) -> RuntimeResult<()> {
        let mut state = self.begin(RuntimeCall::Pull(image.to_string()))?;
        if state.unpullable.contains(image) {
            return Err(RuntimeError::cmd_failed(
                format!("pull {}", image),
                "manifest unknown",
                Some(1),
            ));
        }
        state.images.insert(image.to_string());
        Ok(())
    }

    async fn build_image(&self, context: &Path, tag: &str) -> RuntimeResult<()> {
        let mut state = self.begin(RuntimeCall::Build {
            context: context.to_path_buf(),
            tag: tag.to_string(),
        })?;
        state.images.insert(tag.to_string());
        Ok(())
    }
}
