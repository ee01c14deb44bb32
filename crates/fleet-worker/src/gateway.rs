//! Gateway session check
//!
//! The worker treats the gateway as usable once an authenticated request to
//! the bot-info endpoint succeeds. The round-trip time of the latest check is
//! reported as the worker's gateway latency.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use reqwest::header::AUTHORIZATION;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::error::WorkerError;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(15);
const NO_LATENCY: u64 = u64::MAX;

/// Checks the gateway and remembers the last measured latency
pub struct GatewayClient {
    client: reqwest::Client,
    url: String,
    token: String,
    latency_ms: AtomicU64,
}

impl GatewayClient {
    pub fn new(api_base: &str, token: &str) -> Result<Self, WorkerError> {
        let client = reqwest::Client::builder().timeout(REQUEST_TIMEOUT).build()?;
        Ok(Self {
            client,
            url: format!("{}/gateway/bot", api_base.trim_end_matches('/')),
            token: token.to_string(),
            latency_ms: AtomicU64::new(NO_LATENCY),
        })
    }

    /// Latency of the last successful check
    pub fn latency(&self) -> Option<Duration> {
        match self.latency_ms.load(Ordering::Relaxed) {
            NO_LATENCY => None,
            ms => Some(Duration::from_millis(ms)),
        }
    }

    /// One authenticated round trip
    pub async fn check(&self) -> Result<Duration, WorkerError> {
        let started = Instant::now();
        let response = self
            .client
            .get(&self.url)
            .header(AUTHORIZATION, format!("Bot {}", self.token))
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(WorkerError::GatewayStatus(status.as_u16()));
        }

        let rtt = started.elapsed();
        self.latency_ms.store(rtt.as_millis() as u64, Ordering::Relaxed);
        Ok(rtt)
    }

    /// Check until the gateway answers, backing off between attempts
    pub async fn wait_ready(&self, initial_backoff: Duration, max_backoff: Duration) {
        let mut delay = initial_backoff;
        loop {
            match self.check().await {
                Ok(rtt) => {
                    info!(latency_ms = rtt.as_millis() as u64, "Gateway ready");
                    return;
                }
                Err(e) => {
                    warn!(retry_in_ms = delay.as_millis() as u64, "Gateway not ready: {}", e);
                    tokio::time::sleep(delay).await;
                    delay = (delay * 2).min(max_backoff);
                }
            }
        }
    }

    /// Keep the latency fresh in the background
    pub fn spawn_heartbeat(self: &Arc<Self>, every: Duration) -> JoinHandle<()> {
        let gateway = Arc::clone(self);
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(every);
            interval.tick().await;
            loop {
                interval.tick().await;
                if let Err(e) = gateway.check().await {
                    debug!("Heartbeat check failed: {}", e);
                }
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_latency_unknown_before_check() {
        let gateway = GatewayClient::new("http://127.0.0.1:9/api/", "t").unwrap();
        assert_eq!(gateway.latency(), None);
        assert_eq!(gateway.url, "http://127.0.0.1:9/api/gateway/bot");
    }

    #[tokio::test]
    async fn test_unreachable_gateway_fails() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let base = format!("http://{}", listener.local_addr().unwrap());
        drop(listener);

        let gateway = GatewayClient::new(&base, "t").unwrap();
        assert!(matches!(gateway.check().await, Err(WorkerError::Http(_))));
        assert_eq!(gateway.latency(), None);
    }
}
