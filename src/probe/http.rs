use super::condition::validate_url;
use super::ReadinessCheck;
use crate::error::Result;
use async_trait::async_trait;
use reqwest::Client;
use std::sync::OnceLock;
use std::time::Duration;

/// Global shared HTTP client for probes and health checks.
///
/// Sharing one pooled client keeps file descriptor use flat when many
/// containers are probed. Requests set their own timeout.
static SHARED_HTTP_CLIENT: OnceLock<Client> = OnceLock::new();

pub(crate) fn shared_client() -> &'static Client {
    SHARED_HTTP_CLIENT.get_or_init(|| {
        Client::builder()
            .timeout(Duration::from_secs(30))
            .pool_max_idle_per_host(10)
            .build()
            .unwrap_or_else(|e| {
                tracing::warn!("Falling back to default HTTP client: {}", e);
                Client::new()
            })
    })
}

/// Succeeds when a GET on `url` returns a status below 400.
pub struct HttpCheck {
    url: String,
    client: Client,
    timeout: Duration,
}

impl HttpCheck {
    /// Create a check on the shared client.
    ///
    /// # Errors
    ///
    /// Returns `InvalidCondition` if the URL is malformed or not http(s).
    pub fn new(url: impl Into<String>, timeout: Duration) -> Result<Self> {
        let url = url.into();
        validate_url(&url)?;
        Ok(Self {
            url,
            client: shared_client().clone(),
            timeout,
        })
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }
}

#[async_trait]
impl ReadinessCheck for HttpCheck {
    async fn check(&self) -> bool {
        match self
            .client
            .get(&self.url)
            .timeout(self.timeout)
            .send()
            .await
        {
            Ok(response) => {
                let status = response.status();
                if status.as_u16() < 400 {
                    true
                } else {
                    tracing::debug!("GET {} returned {}", self.url, status);
                    false
                }
            }
            Err(e) => {
                tracing::debug!("GET {} failed: {}", self.url, e);
                false
            }
        }
    }

    fn describe(&self) -> String {
        format!("http {}", self.url)
    }
}
