//! Readiness probing.
//!
//! A [`ReadinessCondition`] is turned into a [`ReadinessCheck`] (one attempt)
//! and polled by [`Prober::wait`] with a fixed delay between attempts. The
//! whole wait runs under a hard wall-clock bound.

mod condition;
mod http;
mod log;
mod tcp;

pub use condition::ReadinessCondition;
pub use http::HttpCheck;
pub use log::LogPatternCheck;
pub use tcp::TcpCheck;

use crate::config::ProbeConfig;
use crate::error::{Error, Result};
use crate::runtime::RuntimeGateway;
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use tokio::runtime::{Handle, RuntimeFlavor};

/// One probe attempt.
#[async_trait]
pub trait ReadinessCheck: Send + Sync {
    /// Run one attempt. Transport and lookup errors count as `false`.
    async fn check(&self) -> bool;

    fn describe(&self) -> String;
}

/// Poll `check` every `interval` until it succeeds or `timeout` elapses.
pub async fn poll_until<C: ReadinessCheck + ?Sized>(
    check: &C,
    timeout: Duration,
    interval: Duration,
) -> bool {
    if timeout.is_zero() {
        return false;
    }

    let attempts = async {
        let mut attempt: u32 = 0;
        loop {
            attempt += 1;
            if check.check().await {
                tracing::debug!("{} ready after {} attempt(s)", check.describe(), attempt);
                return;
            }
            tracing::debug!("{} not ready (attempt {})", check.describe(), attempt);
            tokio::time::sleep(interval).await;
        }
    };

    match tokio::time::timeout(timeout, attempts).await {
        Ok(()) => true,
        Err(_) => {
            tracing::warn!("{} not ready within {:?}", check.describe(), timeout);
            false
        }
    }
}

/// Stateless readiness prober. Cheap to clone and safe to share.
#[derive(Clone)]
pub struct Prober {
    config: ProbeConfig,
    runtime: Option<Arc<dyn RuntimeGateway>>,
}

impl Prober {
    pub fn new(config: ProbeConfig) -> Self {
        Self {
            config,
            runtime: None,
        }
    }

    /// Attach the runtime used for log-pattern probes.
    pub fn with_runtime(mut self, runtime: Arc<dyn RuntimeGateway>) -> Self {
        self.runtime = Some(runtime);
        self
    }

    pub fn config(&self) -> &ProbeConfig {
        &self.config
    }

    /// Build the single-attempt check for a fully specified condition.
    pub fn checker(&self, condition: &ReadinessCondition) -> Result<Box<dyn ReadinessCheck>> {
        condition.validate()?;
        match condition {
            ReadinessCondition::Tcp {
                host: Some(host),
                port,
            } => Ok(Box::new(TcpCheck::new(
                host.clone(),
                *port,
                self.config.tcp_connect_timeout,
            ))),
            ReadinessCondition::Http { url } => {
                Ok(Box::new(HttpCheck::new(url.clone(), self.config.http_timeout)?))
            }
            ReadinessCondition::LogPattern {
                container: Some(container),
                pattern,
            } => {
                let runtime = self.runtime.clone().ok_or_else(|| {
                    Error::InvalidCondition(
                        "log pattern probes need a container runtime".to_string(),
                    )
                })?;
                Ok(Box::new(LogPatternCheck::new(
                    runtime,
                    container.clone(),
                    pattern,
                    self.config.log_tail_lines,
                )?))
            }
            // validate() rejects conditions without a target
            _ => Err(Error::InvalidCondition(condition.to_string())),
        }
    }

    /// Run a single attempt.
    pub async fn evaluate(&self, condition: &ReadinessCondition) -> Result<bool> {
        let check = self.checker(condition)?;
        Ok(check.check().await)
    }

    /// Wait until `condition` holds or `timeout` elapses.
    ///
    /// Returns `Ok(false)` on timeout and `Err` only for malformed
    /// conditions, before any attempt is made.
    pub async fn wait(&self, condition: &ReadinessCondition, timeout: Duration) -> Result<bool> {
        let check = self.checker(condition)?;
        Ok(poll_until(check.as_ref(), timeout, self.config.poll_interval).await)
    }

    /// Blocking form of [`wait`](Self::wait) for synchronous callers.
    ///
    /// Inside a multi-thread runtime the current worker is handed off with
    /// `block_in_place`. A current-thread runtime cannot be blocked on, so
    /// that case is an error. Outside any runtime a private one is started.
    pub fn wait_blocking(&self, condition: &ReadinessCondition, timeout: Duration) -> Result<bool> {
        match Handle::try_current() {
            Ok(handle) => match handle.runtime_flavor() {
                RuntimeFlavor::MultiThread => tokio::task::block_in_place(|| {
                    handle.block_on(self.wait(condition, timeout))
                }),
                _ => Err(Error::Config(
                    "wait_blocking cannot run on a current-thread runtime; await wait() instead"
                        .to_string(),
                )),
            },
            Err(_) => {
                let runtime = tokio::runtime::Builder::new_current_thread()
                    .enable_all()
                    .build()?;
                runtime.block_on(self.wait(condition, timeout))
            }
        }
    }
}

impl Default for Prober {
    fn default() -> Self {
        Self::new(ProbeConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use tokio::net::TcpListener;

    struct CountingCheck {
        succeed_on: u32,
        calls: AtomicU32,
    }

    #[async_trait]
    impl ReadinessCheck for CountingCheck {
        async fn check(&self) -> bool {
            self.calls.fetch_add(1, Ordering::SeqCst) + 1 >= self.succeed_on
        }

        fn describe(&self) -> String {
            "counting".to_string()
        }
    }

    fn fast_prober() -> Prober {
        Prober::new(ProbeConfig {
            poll_interval: Duration::from_millis(20),
            tcp_connect_timeout: Duration::from_millis(200),
            ..ProbeConfig::default()
        })
    }

    #[tokio::test]
    async fn test_poll_until_retries_with_delay() {
        let check = CountingCheck {
            succeed_on: 3,
            calls: AtomicU32::new(0),
        };
        assert!(poll_until(&check, Duration::from_secs(2), Duration::from_millis(10)).await);
        assert_eq!(check.calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_zero_timeout_never_probes() {
        let check = CountingCheck {
            succeed_on: 1,
            calls: AtomicU32::new(0),
        };
        assert!(!poll_until(&check, Duration::ZERO, Duration::from_millis(10)).await);
        assert_eq!(check.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeout_is_a_hard_bound() {
        let check = CountingCheck {
            succeed_on: u32::MAX,
            calls: AtomicU32::new(0),
        };
        let start = tokio::time::Instant::now();
        assert!(!poll_until(&check, Duration::from_secs(5), Duration::from_secs(2)).await);
        assert_eq!(start.elapsed(), Duration::from_secs(5));
        // attempts at t=0, 2s and 4s
        assert_eq!(check.calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_wait_rejects_malformed_condition() {
        let prober = fast_prober();
        let err = prober
            .wait(&ReadinessCondition::tcp("localhost", 0), Duration::from_secs(1))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::InvalidCondition(_)));

        let err = prober
            .wait(&ReadinessCondition::log("db", "ready"), Duration::from_secs(1))
            .await
            .unwrap_err();
        assert!(err.to_string().contains("container runtime"));
    }

    #[tokio::test]
    async fn test_wait_tcp_listener() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        let prober = fast_prober();
        let cond = ReadinessCondition::tcp("127.0.0.1", port);
        assert!(prober.wait(&cond, Duration::from_secs(2)).await.unwrap());

        drop(listener);
        assert!(!prober.wait(&cond, Duration::from_millis(100)).await.unwrap());
    }

    #[test]
    fn test_wait_blocking_outside_runtime() {
        let prober = fast_prober();
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();
        let cond = ReadinessCondition::tcp("127.0.0.1", port);
        assert!(prober.wait_blocking(&cond, Duration::from_secs(2)).unwrap());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_wait_blocking_inside_multi_thread_runtime() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        let prober = fast_prober();
        let cond = ReadinessCondition::tcp("127.0.0.1", port);
        assert!(prober.wait_blocking(&cond, Duration::from_secs(2)).unwrap());
    }

    #[tokio::test]
    async fn test_wait_blocking_on_current_thread_runtime_errors() {
        let prober = fast_prober();
        let cond = ReadinessCondition::tcp("127.0.0.1", 1);
        assert!(prober.wait_blocking(&cond, Duration::from_millis(10)).is_err());
    }
}
