//! Per-container health checks and auto-restart supervision.
//!
//! The supervisor owns one record per container. `check` runs a single probe
//! and updates the record; `enable_auto_restart` starts a background loop
//! that probes on an interval and restarts the container when unhealthy.
//!
//! # Locking
//!
//! Records live in one `parking_lot::Mutex`. The lock is only held to read
//! or write records, never across a probe or runtime call.

mod endpoint;
mod monitoring;

pub use endpoint::{infer_endpoint, HealthEndpoint};

use crate::config::{serde_duration, DEFAULT_HEALTH_INTERVAL};
use crate::error::{EntityKind, Error, Result};
use crate::probe::Prober;
use crate::runtime::RuntimeGateway;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::Serialize;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum HealthStatus {
    Unknown,
    Healthy,
    Unhealthy,
}

/// Health check record for one container.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct HealthCheck {
    pub container: String,
    pub endpoint: HealthEndpoint,
    #[serde(with = "serde_duration")]
    pub interval: Duration,
    pub status: HealthStatus,
    pub last_check: Option<DateTime<Utc>>,
    pub auto_restart: bool,
    pub restart_count: u32,
    pub created_at: DateTime<Utc>,
}

struct Monitor {
    token: CancellationToken,
    generation: u64,
    handle: Option<JoinHandle<()>>,
}

impl Monitor {
    fn stop(self) {
        self.token.cancel();
    }
}

struct Entry {
    record: HealthCheck,
    monitor: Option<Monitor>,
}

struct Inner {
    entries: Mutex<HashMap<String, Entry>>,
    runtime: Arc<dyn RuntimeGateway>,
    prober: Prober,
    default_interval: Duration,
    next_generation: AtomicU64,
    shutdown: CancellationToken,
}

/// Cloneable handle to the health check registry and its supervision loops.
#[derive(Clone)]
pub struct HealthSupervisor {
    inner: Arc<Inner>,
}

impl HealthSupervisor {
    pub fn new(runtime: Arc<dyn RuntimeGateway>, prober: Prober) -> Self {
        Self::with_default_interval(runtime, prober, DEFAULT_HEALTH_INTERVAL)
    }

    /// `default_interval` applies when `add` is given no interval.
    pub fn with_default_interval(
        runtime: Arc<dyn RuntimeGateway>,
        prober: Prober,
        default_interval: Duration,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                entries: Mutex::new(HashMap::new()),
                runtime,
                prober,
                default_interval,
                next_generation: AtomicU64::new(1),
                shutdown: CancellationToken::new(),
            }),
        }
    }

    /// Register a health check in `unknown` state. No monitoring starts.
    ///
    /// Re-adding a container replaces its record and stops its loop.
    pub fn add(
        &self,
        container: &str,
        endpoint: HealthEndpoint,
        interval: Option<Duration>,
    ) -> Result<HealthCheck> {
        let interval = interval.unwrap_or(self.inner.default_interval);
        if interval.is_zero() {
            return Err(Error::Config(
                "health check interval must be greater than zero".to_string(),
            ));
        }
        if container.trim().is_empty() {
            return Err(Error::InvalidEndpoint(format!(
                "{} (no container given)",
                endpoint
            )));
        }

        let record = HealthCheck {
            container: container.to_string(),
            endpoint,
            interval,
            status: HealthStatus::Unknown,
            last_check: None,
            auto_restart: false,
            restart_count: 0,
            created_at: Utc::now(),
        };

        let previous = self.inner.entries.lock().insert(
            container.to_string(),
            Entry {
                record: record.clone(),
                monitor: None,
            },
        );
        if let Some(monitor) = previous.and_then(|e| e.monitor) {
            monitor.stop();
        }
        tracing::info!(
            "Added health check for {} on {} every {:?}",
            container,
            record.endpoint,
            interval
        );
        Ok(record)
    }

    /// Probe once and update the record.
    pub async fn check(&self, container: &str) -> Result<HealthCheck> {
        let endpoint = self.endpoint_of(container)?;
        let healthy = self.inner.probe(&endpoint).await;
        self.inner
            .record_result(container, healthy, None)
            .ok_or_else(|| Error::not_found(EntityKind::HealthCheck, container))
    }

    /// Current record without probing.
    pub fn get(&self, container: &str) -> Option<HealthCheck> {
        self.inner
            .entries
            .lock()
            .get(container)
            .map(|e| e.record.clone())
    }

    /// Start (or restart) the supervision loop for `container`.
    ///
    /// Must be called from within a tokio runtime.
    pub fn enable_auto_restart(&self, container: &str) -> Result<HealthCheck> {
        let handle = tokio::runtime::Handle::try_current().map_err(|_| {
            Error::Config("auto-restart needs a running tokio runtime".to_string())
        })?;

        let mut entries = self.inner.entries.lock();
        let entry = entries
            .get_mut(container)
            .ok_or_else(|| Error::not_found(EntityKind::HealthCheck, container))?;

        if let Some(previous) = entry.monitor.take() {
            tracing::debug!("Replacing supervision loop for {}", container);
            previous.stop();
        }

        let generation = self.inner.next_generation.fetch_add(1, Ordering::Relaxed);
        let token = self.inner.shutdown.child_token();
        let task = handle.spawn(monitoring::run_supervision(
            Arc::clone(&self.inner),
            container.to_string(),
            generation,
            token.clone(),
        ));

        entry.record.auto_restart = true;
        entry.monitor = Some(Monitor {
            token,
            generation,
            handle: Some(task),
        });
        tracing::info!("Auto-restart enabled for {}", container);
        Ok(entry.record.clone())
    }

    /// Stop the supervision loop. It exits at its next wake-up at the latest.
    pub fn disable_auto_restart(&self, container: &str) -> Result<HealthCheck> {
        let mut entries = self.inner.entries.lock();
        let entry = entries
            .get_mut(container)
            .ok_or_else(|| Error::not_found(EntityKind::HealthCheck, container))?;
        if let Some(monitor) = entry.monitor.take() {
            monitor.stop();
            tracing::info!("Auto-restart disabled for {}", container);
        }
        entry.record.auto_restart = false;
        Ok(entry.record.clone())
    }

    /// Remove the record and stop its loop.
    pub fn remove(&self, container: &str) -> Result<HealthCheck> {
        let entry = self
            .inner
            .entries
            .lock()
            .remove(container)
            .ok_or_else(|| Error::not_found(EntityKind::HealthCheck, container))?;
        if let Some(monitor) = entry.monitor {
            monitor.stop();
        }
        tracing::info!("Removed health check for {}", container);
        Ok(entry.record)
    }

    /// All records, sorted by container.
    pub fn list(&self) -> Vec<HealthCheck> {
        let mut records: Vec<HealthCheck> = self
            .inner
            .entries
            .lock()
            .values()
            .map(|e| e.record.clone())
            .collect();
        records.sort_by(|a, b| a.container.cmp(&b.container));
        records
    }

    /// Cancel every loop and wait for them to exit.
    pub async fn shutdown(&self) {
        self.inner.shutdown.cancel();
        let handles: Vec<JoinHandle<()>> = self
            .inner
            .entries
            .lock()
            .values_mut()
            .filter_map(|e| e.monitor.as_mut().and_then(|m| m.handle.take()))
            .collect();
        for result in futures::future::join_all(handles).await {
            if let Err(e) = result {
                tracing::warn!("Supervision task ended abnormally: {}", e);
            }
        }
    }

    fn endpoint_of(&self, container: &str) -> Result<HealthEndpoint> {
        self.inner
            .entries
            .lock()
            .get(container)
            .map(|e| e.record.endpoint.clone())
            .ok_or_else(|| Error::not_found(EntityKind::HealthCheck, container))
    }
}

impl Inner {
    async fn probe(&self, endpoint: &HealthEndpoint) -> bool {
        match self.prober.checker(&endpoint.as_condition()) {
            Ok(check) => check.check().await,
            Err(e) => {
                tracing::warn!("Cannot probe {}: {}", endpoint, e);
                false
            }
        }
    }

    /// Store a probe result. With `generation` set, the write is skipped if
    /// the entry is no longer owned by that supervision loop.
    fn record_result(
        &self,
        container: &str,
        healthy: bool,
        generation: Option<u64>,
    ) -> Option<HealthCheck> {
        let mut entries = self.entries.lock();
        let entry = entries.get_mut(container)?;
        if let Some(generation) = generation {
            if entry.monitor.as_ref().map(|m| m.generation) != Some(generation) {
                return None;
            }
        }

        let now = Utc::now();
        entry.record.last_check = Some(match entry.record.last_check {
            Some(prev) if prev > now => prev,
            _ => now,
        });
        let status = if healthy {
            HealthStatus::Healthy
        } else {
            HealthStatus::Unhealthy
        };
        if status != entry.record.status && status == HealthStatus::Unhealthy {
            tracing::warn!("{} is unhealthy ({})", container, entry.record.endpoint);
        }
        entry.record.status = status;
        Some(entry.record.clone())
    }

    /// Endpoint and interval, if `generation` still owns the entry.
    fn supervision_target(
        &self,
        container: &str,
        generation: u64,
    ) -> Option<(HealthEndpoint, Duration)> {
        let entries = self.entries.lock();
        let entry = entries.get(container)?;
        match &entry.monitor {
            Some(m) if m.generation == generation => {
                Some((entry.record.endpoint.clone(), entry.record.interval))
            }
            _ => None,
        }
    }

    fn note_restart(&self, container: &str, generation: u64) {
        let mut entries = self.entries.lock();
        if let Some(entry) = entries.get_mut(container) {
            if entry.monitor.as_ref().map(|m| m.generation) == Some(generation) {
                entry.record.restart_count += 1;
            }
        }
    }

    /// A failed restart ends supervision for good.
    fn abandon(&self, container: &str, generation: u64) {
        let mut entries = self.entries.lock();
        if let Some(entry) = entries.get_mut(container) {
            if entry.monitor.as_ref().map(|m| m.generation) == Some(generation) {
                entry.monitor = None;
                entry.record.auto_restart = false;
            }
        }
    }
}
