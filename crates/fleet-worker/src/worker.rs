//! Worker lifecycle
//!
//! The worker:
//! - Waits for the gateway to become usable
//! - Signals readiness to its launcher exactly once
//! - Joins the control-plane hub and answers commands
//! - Keeps serving shards when the hub is missing or drops it

use std::future::Future;
use std::io::Write;
use std::sync::Arc;
use std::time::Duration;

use libfleet_core::format_shard_ids;
use libfleet_ipc::{IpcClient, IpcError};
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

use crate::error::WorkerError;
use crate::eval::DiagnosticEvaluator;
use crate::gateway::GatewayClient;
use crate::readiness::ReadinessSender;
use crate::state::{StateCell, WorkerState};

/// Everything a worker needs to run
#[derive(Debug, Clone)]
pub struct WorkerOptions {
    pub cluster_name: String,
    pub shard_ids: Vec<u32>,
    pub shard_count: u32,
    pub api_base: String,
    pub token: String,
    pub hub_url: String,
    pub allow_eval: bool,
    /// Limit on dialing the hub and receiving its handshake ack
    pub ipc_timeout: Duration,
    pub heartbeat: Duration,
    pub retry_backoff: Duration,
    pub max_retry_backoff: Duration,
}

pub struct Worker {
    options: WorkerOptions,
    state: Arc<StateCell>,
    gateway: Arc<GatewayClient>,
}

impl Worker {
    pub fn new(options: WorkerOptions) -> Result<Self, WorkerError> {
        let gateway = GatewayClient::new(&options.api_base, &options.token)?;
        Ok(Self {
            options,
            state: Arc::new(StateCell::new()),
            gateway: Arc::new(gateway),
        })
    }

    /// Shared view of the lifecycle state
    pub fn state(&self) -> Arc<StateCell> {
        Arc::clone(&self.state)
    }

    /// Run until `shutdown` resolves
    pub async fn run<W, F>(self, ready: ReadinessSender<W>, shutdown: F) -> Result<(), WorkerError>
    where
        W: Write,
        F: Future<Output = ()>,
    {
        tokio::pin!(shutdown);

        info!(
            cluster = %self.options.cluster_name,
            shards = %format_shard_ids(&self.options.shard_ids),
            total = self.options.shard_count,
            "Worker booting"
        );

        tokio::select! {
            _ = self.gateway.wait_ready(self.options.retry_backoff, self.options.max_retry_backoff) => {}
            _ = &mut shutdown => {
                info!("Shutdown before gateway became ready");
                return Ok(());
            }
        }

        self.state.advance(WorkerState::Booting, WorkerState::GatewayReady)?;
        ready.signal()?;

        let heartbeat = self.gateway.spawn_heartbeat(self.options.heartbeat);
        let ipc = tokio::select! {
            ipc = self.connect_ipc() => ipc?,
            _ = &mut shutdown => {
                info!("Shutdown while joining the hub");
                heartbeat.abort();
                return Ok(());
            }
        };

        shutdown.await;
        info!(cluster = %self.options.cluster_name, "Worker shutting down");

        heartbeat.abort();
        if let Some(ipc) = ipc {
            ipc.abort();
        }
        Ok(())
    }

    /// Join the hub. A missing hub disables the control plane for the rest
    /// of the worker's life.
    async fn connect_ipc(&self) -> Result<Option<JoinHandle<()>>, WorkerError> {
        self.state
            .advance(WorkerState::GatewayReady, WorkerState::IpcConnecting)?;

        let hub = &self.options.hub_url;
        let connect = IpcClient::connect(hub, &self.options.cluster_name);
        let client = match tokio::time::timeout(self.options.ipc_timeout, connect).await {
            Ok(Ok(client)) => client,
            Ok(Err(e)) => {
                if e.is_hub_unavailable() {
                    warn!(hub = %hub, "Hub not running, control plane disabled");
                } else {
                    error!(hub = %hub, "Hub handshake failed, control plane disabled: {}", e);
                }
                self.state
                    .advance(WorkerState::IpcConnecting, WorkerState::IpcDisabled)?;
                return Ok(None);
            }
            Err(_) => {
                warn!(
                    hub = %hub,
                    timeout_ms = self.options.ipc_timeout.as_millis() as u64,
                    "Hub did not acknowledge in time, control plane disabled"
                );
                self.state
                    .advance(WorkerState::IpcConnecting, WorkerState::IpcDisabled)?;
                return Ok(None);
            }
        };

        self.state
            .advance(WorkerState::IpcConnecting, WorkerState::IpcActive)?;

        let handler = Arc::new(DiagnosticEvaluator::new(
            self.options.cluster_name.clone(),
            self.options.shard_ids.clone(),
            self.options.shard_count,
            self.options.allow_eval,
            Arc::clone(&self.state),
            Arc::clone(&self.gateway),
        ));
        let state = Arc::clone(&self.state);

        let task = tokio::spawn(async move {
            match client.serve(handler).await {
                Ok(()) => info!("Hub closed the connection"),
                Err(IpcError::AbnormalClose { code, reason }) => {
                    error!(code, reason = %reason, "Hub connection closed abnormally")
                }
                Err(e) => error!("Hub connection failed: {}", e),
            }
            let _ = state.advance(WorkerState::IpcActive, WorkerState::IpcDisabled);
        });

        Ok(Some(task))
    }
}
