//! Named, immutable captures of the running environment.
//!
//! `capture` records every running container's configuration as reported by
//! the runtime. `restore` replays those records one by one through the same
//! runtime; a failing container is reported and does not stop the rest.

use crate::error::{EntityKind, Error, Result};
use crate::runtime::{
    ensure_image, ContainerInfo, Mount, PortBinding, RestartPolicy, RunSpec, RuntimeGateway,
};
use crate::store::{validate_name, JsonStore};
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

/// Configuration of one container at capture time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContainerRecord {
    pub id: String,
    pub name: String,
    pub image: String,
    #[serde(default)]
    pub port_bindings: BTreeMap<String, Vec<PortBinding>>,
    #[serde(default)]
    pub env_vars: BTreeMap<String, String>,
    #[serde(default)]
    pub labels: BTreeMap<String, String>,
    #[serde(default)]
    pub restart_policy: RestartPolicy,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub network_mode: Option<String>,
    #[serde(default)]
    pub volume_mounts: Vec<Mount>,
}

impl From<ContainerInfo> for ContainerRecord {
    fn from(info: ContainerInfo) -> Self {
        Self {
            id: info.id,
            name: info.name,
            image: info.image,
            port_bindings: info.port_bindings,
            env_vars: info.env_vars,
            labels: info.labels,
            restart_policy: info.restart_policy,
            network_mode: info.network_mode,
            volume_mounts: info.volume_mounts,
        }
    }
}

impl ContainerRecord {
    /// The run spec that recreates this container under its original name.
    pub fn run_spec(&self) -> RunSpec {
        // Only the first binding per port is replayed.
        let port_bindings = self
            .port_bindings
            .iter()
            .filter_map(|(port, bindings)| {
                bindings
                    .first()
                    .filter(|b| !b.host_port.is_empty())
                    .map(|b| (port.clone(), vec![b.clone()]))
            })
            .collect();

        RunSpec {
            name: Some(self.name.clone()),
            image: self.image.clone(),
            port_bindings,
            env: self.env_vars.clone(),
            labels: self.labels.clone(),
            restart_policy: Some(self.restart_policy.clone()).filter(|p| !p.is_default()),
            network_mode: self.network_mode.clone(),
            mounts: self.volume_mounts.clone(),
        }
    }

    /// Same configuration, ignoring the container id.
    fn same_config(&self, other: &ContainerRecord) -> bool {
        ContainerRecord {
            id: String::new(),
            ..self.clone()
        } == ContainerRecord {
            id: String::new(),
            ..other.clone()
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Snapshot {
    pub name: String,
    pub created_at: DateTime<Utc>,
    /// Sorted by container name.
    pub containers: Vec<ContainerRecord>,
}

impl Snapshot {
    pub fn summary(&self) -> SnapshotSummary {
        SnapshotSummary {
            name: self.name.clone(),
            created_at: self.created_at,
            container_count: self.containers.len(),
            containers: self.containers.iter().map(|c| c.name.clone()).collect(),
        }
    }

    /// True when both snapshots describe the same containers with the same
    /// configuration. Names, ids and timestamps are ignored.
    pub fn same_environment(&self, other: &Snapshot) -> bool {
        self.containers.len() == other.containers.len()
            && self
                .containers
                .iter()
                .zip(&other.containers)
                .all(|(a, b)| a.same_config(b))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SnapshotSummary {
    pub name: String,
    pub created_at: DateTime<Utc>,
    pub container_count: usize,
    pub containers: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RestoredContainer {
    pub original_id: String,
    pub new_id: String,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FailedContainer {
    pub name: String,
    pub image: String,
    pub error: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RestoreReport {
    pub snapshot: String,
    pub restored_containers: Vec<RestoredContainer>,
    pub failed_containers: Vec<FailedContainer>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ChangedContainer {
    pub name: String,
    pub old_image: String,
    pub new_image: String,
    pub old_ports: BTreeMap<String, Vec<PortBinding>>,
    pub new_ports: BTreeMap<String, Vec<PortBinding>>,
}

/// What changed between two snapshots, keyed by container name.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SnapshotDiff {
    pub snapshot1: String,
    pub snapshot2: String,
    pub added: Vec<String>,
    pub removed: Vec<String>,
    pub changed: Vec<ChangedContainer>,
}

impl SnapshotDiff {
    pub fn is_empty(&self) -> bool {
        self.added.is_empty() && self.removed.is_empty() && self.changed.is_empty()
    }
}

pub struct SnapshotEngine {
    runtime: Arc<dyn RuntimeGateway>,
    snapshots: RwLock<BTreeMap<String, Snapshot>>,
    store: Option<JsonStore>,
}

impl SnapshotEngine {
    /// In-memory engine.
    pub fn new(runtime: Arc<dyn RuntimeGateway>) -> Self {
        Self {
            runtime,
            snapshots: RwLock::new(BTreeMap::new()),
            store: None,
        }
    }

    /// Engine that writes every snapshot through to `store`, starting from
    /// the snapshots already in it.
    pub fn with_store(runtime: Arc<dyn RuntimeGateway>, store: JsonStore) -> Result<Self> {
        let snapshots: BTreeMap<String, Snapshot> = store
            .load_all::<Snapshot>()?
            .into_iter()
            .map(|s| (s.name.clone(), s))
            .collect();
        tracing::debug!(
            "Loaded {} snapshot(s) from {}",
            snapshots.len(),
            store.dir().display()
        );
        Ok(Self {
            runtime,
            snapshots: RwLock::new(snapshots),
            store: Some(store),
        })
    }

    /// Record every running container under `name`.
    pub async fn capture(&self, name: &str) -> Result<Snapshot> {
        validate_name(EntityKind::Snapshot, name)?;
        if self.snapshots.read().contains_key(name) {
            return Err(Error::already_exists(EntityKind::Snapshot, name));
        }

        let mut containers: Vec<ContainerRecord> = self
            .runtime
            .list_containers(false)
            .await?
            .into_iter()
            .filter(|c| c.running)
            .map(ContainerRecord::from)
            .collect();
        containers.sort_by(|a, b| a.name.cmp(&b.name));

        let snapshot = Snapshot {
            name: name.to_string(),
            created_at: Utc::now(),
            containers,
        };

        {
            let mut snapshots = self.snapshots.write();
            // another capture may have claimed the name while listing
            if snapshots.contains_key(name) {
                return Err(Error::already_exists(EntityKind::Snapshot, name));
            }
            snapshots.insert(name.to_string(), snapshot.clone());
        }
        if let Some(store) = &self.store {
            if let Err(e) = store.save(name, &snapshot) {
                self.snapshots.write().remove(name);
                return Err(e);
            }
        }

        tracing::info!(
            "Captured snapshot {} with {} container(s)",
            name,
            snapshot.containers.len()
        );
        Ok(snapshot)
    }

    /// Recreate every container in the snapshot, best effort.
    pub async fn restore(&self, name: &str) -> Result<RestoreReport> {
        let snapshot = self
            .get(name)
            .ok_or_else(|| Error::not_found(EntityKind::Snapshot, name))?;

        let mut report = RestoreReport {
            snapshot: name.to_string(),
            restored_containers: Vec::new(),
            failed_containers: Vec::new(),
        };

        for record in &snapshot.containers {
            match self.restore_one(record).await {
                Ok(new_id) => {
                    tracing::info!("Restored {} as {}", record.name, short_id(&new_id));
                    report.restored_containers.push(RestoredContainer {
                        original_id: record.id.clone(),
                        new_id,
                        name: record.name.clone(),
                    });
                }
                Err(e) => {
                    tracing::warn!("Failed to restore {}: {}", record.name, e);
                    report.failed_containers.push(FailedContainer {
                        name: record.name.clone(),
                        image: record.image.clone(),
                        error: e.to_string(),
                    });
                }
            }
        }

        tracing::info!(
            "Restored snapshot {}: {} restored, {} failed",
            name,
            report.restored_containers.len(),
            report.failed_containers.len()
        );
        Ok(report)
    }

    async fn restore_one(&self, record: &ContainerRecord) -> Result<String> {
        if !record.image.is_empty() && record.image != "unknown" {
            ensure_image(self.runtime.as_ref(), &record.image).await?;
        }
        Ok(self.runtime.create_and_start(&record.run_spec()).await?)
    }

    /// Summaries sorted by name.
    pub fn list(&self) -> Vec<SnapshotSummary> {
        self.snapshots.read().values().map(Snapshot::summary).collect()
    }

    pub fn get(&self, name: &str) -> Option<Snapshot> {
        self.snapshots.read().get(name).cloned()
    }

    pub fn delete(&self, name: &str) -> Result<Snapshot> {
        let removed = self
            .snapshots
            .write()
            .remove(name)
            .ok_or_else(|| Error::not_found(EntityKind::Snapshot, name))?;
        if let Some(store) = &self.store {
            store.delete(name)?;
        }
        tracing::info!("Deleted snapshot {}", name);
        Ok(removed)
    }

    /// Containers added, removed, or changed (image or ports) from `name1` to `name2`.
    pub fn compare(&self, name1: &str, name2: &str) -> Result<SnapshotDiff> {
        let snapshots = self.snapshots.read();
        let first = snapshots
            .get(name1)
            .ok_or_else(|| Error::not_found(EntityKind::Snapshot, name1))?;
        let second = snapshots
            .get(name2)
            .ok_or_else(|| Error::not_found(EntityKind::Snapshot, name2))?;

        let before: BTreeMap<&str, &ContainerRecord> =
            first.containers.iter().map(|c| (c.name.as_str(), c)).collect();
        let after: BTreeMap<&str, &ContainerRecord> =
            second.containers.iter().map(|c| (c.name.as_str(), c)).collect();
        let before_names: BTreeSet<&str> = before.keys().copied().collect();
        let after_names: BTreeSet<&str> = after.keys().copied().collect();

        let changed = before_names
            .intersection(&after_names)
            .filter_map(|name| {
                let (old, new) = (before[name], after[name]);
                if old.image == new.image && old.port_bindings == new.port_bindings {
                    return None;
                }
                Some(ChangedContainer {
                    name: name.to_string(),
                    old_image: old.image.clone(),
                    new_image: new.image.clone(),
                    old_ports: old.port_bindings.clone(),
                    new_ports: new.port_bindings.clone(),
                })
            })
            .collect();

        Ok(SnapshotDiff {
            snapshot1: name1.to_string(),
            snapshot2: name2.to_string(),
            added: after_names
                .difference(&before_names)
                .map(|s| s.to_string())
                .collect(),
            removed: before_names
                .difference(&after_names)
                .map(|s| s.to_string())
                .collect(),
            changed,
        })
    }
}

fn short_id(id: &str) -> &str {
    id.get(..12).unwrap_or(id)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runtime::InMemoryRuntime;

    fn container(name: &str, image: &str, host_port: &str) -> ContainerInfo {
        ContainerInfo {
            id: String::new(),
            name: name.to_string(),
            image: image.to_string(),
            running: true,
            port_bindings: BTreeMap::from([(
                "80/tcp".to_string(),
                vec![PortBinding::host_port(host_port)],
            )]),
            env_vars: BTreeMap::from([("MODE".to_string(), "test".to_string())]),
            labels: BTreeMap::from([("team".to_string(), "core".to_string())]),
            restart_policy: RestartPolicy {
                name: "on-failure".into(),
                maximum_retry_count: 3,
            },
            network_mode: Some("bridge".into()),
            volume_mounts: vec![Mount {
                source: "/srv/data".into(),
                destination: "/data".into(),
                mode: String::new(),
                read_write: true,
            }],
        }
    }

    #[tokio::test]
    async fn test_capture_records_running_containers() {
        let runtime = Arc::new(InMemoryRuntime::new());
        runtime.insert_container(container("web", "nginx:1.25", "8080"));
        runtime.insert_container(container("api", "api:2", "9000"));
        runtime.insert_container(ContainerInfo {
            running: false,
            ..container("old", "busybox", "7000")
        });
        let engine = SnapshotEngine::new(runtime.clone());

        let snapshot = engine.capture("baseline").await.unwrap();
        let names: Vec<_> = snapshot.containers.iter().map(|c| c.name.as_str()).collect();
        assert_eq!(names, vec!["api", "web"]);
        assert_eq!(snapshot.containers[1].restart_policy.to_string(), "on-failure:3");
        assert_eq!(snapshot.containers[1].volume_mounts.len(), 1);

        assert!(matches!(
            engine.capture("baseline").await,
            Err(Error::AlreadyExists { .. })
        ));
        assert!(matches!(
            engine.capture("../etc").await,
            Err(Error::InvalidName { .. })
        ));
    }

    #[tokio::test]
    async fn test_unchanged_environment_captures_equal() {
        let runtime = Arc::new(InMemoryRuntime::new());
        runtime.insert_container(container("web", "nginx:1.25", "8080"));
        let engine = SnapshotEngine::new(runtime);

        let first = engine.capture("one").await.unwrap();
        let second = engine.capture("two").await.unwrap();
        assert!(first.same_environment(&second));
        assert!(engine.compare("one", "two").unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_restore_recreates_with_original_config() {
        let runtime = Arc::new(InMemoryRuntime::new());
        let original = runtime.insert_container(container("web", "nginx:1.25", "8080"));
        let engine = SnapshotEngine::new(runtime.clone());
        engine.capture("snap").await.unwrap();

        runtime.remove(&original).await.unwrap();
        let report = engine.restore("snap").await.unwrap();
        assert_eq!(report.restored_containers.len(), 1);
        assert!(report.failed_containers.is_empty());
        assert_eq!(report.restored_containers[0].original_id, original);

        let restored = runtime.container("web").unwrap();
        assert_ne!(restored.id, original);
        assert_eq!(restored.env_vars["MODE"], "test");
        assert_eq!(restored.labels["team"], "core");
        assert_eq!(restored.network_mode.as_deref(), Some("bridge"));
        assert_eq!(restored.restart_policy.maximum_retry_count, 3);
    }

    #[tokio::test]
    async fn test_restore_isolates_failures() {
        let runtime = Arc::new(InMemoryRuntime::new());
        let web = runtime.insert_container(container("web", "nginx:1.25", "8080"));
        runtime.insert_container(container("api", "api:2", "9000"));
        let engine = SnapshotEngine::new(runtime.clone());
        engine.capture("snap").await.unwrap();

        // api still exists, so recreating it conflicts on the name
        runtime.remove(&web).await.unwrap();
        let report = engine.restore("snap").await.unwrap();
        assert_eq!(report.restored_containers.len(), 1);
        assert_eq!(report.restored_containers[0].name, "web");
        assert_eq!(report.failed_containers.len(), 1);
        assert_eq!(report.failed_containers[0].name, "api");
        assert!(report.failed_containers[0].error.contains("already in use"));

        assert!(matches!(
            engine.restore("missing").await,
            Err(Error::NotFound { .. })
        ));
    }

    #[tokio::test]
    async fn test_compare_and_delete() {
        let runtime = Arc::new(InMemoryRuntime::new());
        let web = runtime.insert_container(container("web", "nginx:1.25", "8080"));
        let cache = runtime.insert_container(container("cache", "redis:7", "6379"));
        let engine = SnapshotEngine::new(runtime.clone());
        engine.capture("before").await.unwrap();

        runtime.remove(&web).await.unwrap();
        runtime.remove(&cache).await.unwrap();
        runtime.insert_container(container("web", "nginx:1.27", "8080"));
        runtime.insert_container(container("api", "api:2", "9000"));
        engine.capture("after").await.unwrap();

        let diff = engine.compare("before", "after").unwrap();
        assert_eq!(diff.added, vec!["api"]);
        assert_eq!(diff.removed, vec!["cache"]);
        assert_eq!(diff.changed.len(), 1);
        assert_eq!(diff.changed[0].old_image, "nginx:1.25");
        assert_eq!(diff.changed[0].new_image, "nginx:1.27");

        assert_eq!(engine.list().len(), 2);
        engine.delete("before").unwrap();
        assert!(engine.get("before").is_none());
        assert!(engine.compare("before", "after").is_err());
        assert!(matches!(
            engine.delete("before"),
            Err(Error::NotFound { .. })
        ));
    }
}
