use super::condition::compile_pattern;
use super::ReadinessCheck;
use crate::error::Result;
use crate::runtime::RuntimeGateway;
use async_trait::async_trait;
use regex::Regex;
use std::sync::Arc;

/// Succeeds when the container's recent output matches a pattern.
pub struct LogPatternCheck {
    runtime: Arc<dyn RuntimeGateway>,
    container: String,
    pattern: Regex,
    tail: usize,
}

impl LogPatternCheck {
    pub fn new(
        runtime: Arc<dyn RuntimeGateway>,
        container: impl Into<String>,
        pattern: &str,
        tail: usize,
    ) -> Result<Self> {
        Ok(Self {
            runtime,
            container: container.into(),
            pattern: compile_pattern(pattern)?,
            tail,
        })
    }
}

#[async_trait]
impl ReadinessCheck for LogPatternCheck {
    async fn check(&self) -> bool {
        match self.runtime.logs(&self.container, self.tail).await {
            Ok(output) => self.pattern.is_match(&output),
            Err(e) => {
                tracing::debug!("logs for {} unavailable: {}", self.container, e);
                false
            }
        }
    }

    fn describe(&self) -> String {
        format!("log /{}/ in {}", self.pattern.as_str(), self.container)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runtime::{InMemoryRuntime, RunSpec};

    #[tokio::test]
    async fn test_matches_only_recent_lines() {
        let runtime = Arc::new(InMemoryRuntime::new().with_image("postgres:15"));
        let id = runtime
            .create_and_start(&RunSpec::new("postgres:15").name("db"))
            .await
            .unwrap();
        runtime.push_log(&id, "database system is ready to accept connections");
        for i in 0..3 {
            runtime.push_log(&id, format!("checkpoint {}", i));
        }

        let check = LogPatternCheck::new(runtime.clone(), "db", "READY to accept", 4).unwrap();
        assert!(check.check().await);

        let check = LogPatternCheck::new(runtime, "db", "ready to accept", 3).unwrap();
        assert!(!check.check().await);
    }

    #[tokio::test]
    async fn test_missing_container_is_failed_attempt() {
        let runtime = Arc::new(InMemoryRuntime::new());
        let check = LogPatternCheck::new(runtime, "ghost", "ready", 50).unwrap();
        assert!(!check.check().await);
    }
}
