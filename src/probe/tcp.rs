use super::ReadinessCheck;
use async_trait::async_trait;
use std::time::Duration;
use tokio::net::TcpStream;

/// Succeeds once a TCP connection to `host:port` is established.
pub struct TcpCheck {
    host: String,
    port: u16,
    connect_timeout: Duration,
}

impl TcpCheck {
    pub fn new(host: impl Into<String>, port: u16, connect_timeout: Duration) -> Self {
        Self {
            host: host.into(),
            port,
            connect_timeout,
        }
    }
}

#[async_trait]
impl ReadinessCheck for TcpCheck {
    async fn check(&self) -> bool {
        let connect = TcpStream::connect((self.host.as_str(), self.port));
        match tokio::time::timeout(self.connect_timeout, connect).await {
            // Dropping the stream closes it.
            Ok(Ok(_stream)) => true,
            Ok(Err(e)) => {
                tracing::debug!("tcp {}:{} not reachable: {}", self.host, self.port, e);
                false
            }
            Err(_) => {
                tracing::debug!("tcp {}:{} connect timed out", self.host, self.port);
                false
            }
        }
    }

    fn describe(&self) -> String {
        format!("tcp {}:{}", self.host, self.port)
    }
}
