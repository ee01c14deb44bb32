//! Hub listener and per-connection tasks

use std::future::Future;
use std::net::SocketAddr;
use std::time::Duration;

use futures::{SinkExt, StreamExt};
use libfleet_ipc::{CLOSE_ALREADY_CONNECTED, HANDSHAKE_ACK};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{accept_async, WebSocketStream};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::error::HubError;
use crate::registry::{Registry, RegistryHandle};

/// Default time a new connection gets to send its name
pub const DEFAULT_HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(10);

/// Per-connection outbound queue depth
const PEER_QUEUE: usize = 64;

/// The control-plane broadcast hub
pub struct Hub {
    listener: TcpListener,
    registry: RegistryHandle,
    handshake_timeout: Duration,
}

impl Hub {
    /// Bind the hub to `addr`
    pub async fn bind(addr: &str) -> Result<Self, HubError> {
        let listener = TcpListener::bind(addr).await.map_err(|e| HubError::BindFailed {
            addr: addr.to_string(),
            reason: e.to_string(),
        })?;

        Ok(Self {
            listener,
            registry: Registry::new().spawn(),
            handshake_timeout: DEFAULT_HANDSHAKE_TIMEOUT,
        })
    }

    pub fn with_handshake_timeout(mut self, timeout: Duration) -> Self {
        self.handshake_timeout = timeout;
        self
    }

    pub fn local_addr(&self) -> Result<SocketAddr, HubError> {
        Ok(self.listener.local_addr()?)
    }

    /// Handle to the registry, for inspection
    pub fn registry(&self) -> RegistryHandle {
        self.registry.clone()
    }

    /// Accept connections until `shutdown` resolves, then close every peer
    pub async fn run<F>(self, shutdown: F) -> Result<(), HubError>
    where
        F: Future<Output = ()>,
    {
        info!(addr = %self.local_addr()?, "Hub listening");
        tokio::pin!(shutdown);

        loop {
            tokio::select! {
                _ = &mut shutdown => {
                    info!("Hub shutting down");
                    break;
                }
                accepted = self.listener.accept() => {
                    match accepted {
                        Ok((stream, peer_addr)) => {
                            let registry = self.registry.clone();
                            let timeout = self.handshake_timeout;
                            tokio::spawn(async move {
                                if let Err(e) = handle_connection(stream, registry, timeout).await {
                                    debug!(peer = %peer_addr, "Connection ended with error: {}", e);
                                }
                            });
                        }
                        Err(e) => warn!("Accept error: {}", e),
                    }
                }
            }
        }

        self.registry.close_all().await?;

        // Give connection tasks time to flush their close frames
        tokio::time::sleep(Duration::from_millis(500)).await;
        Ok(())
    }
}

async fn handle_connection(
    stream: TcpStream,
    registry: RegistryHandle,
    handshake_timeout: Duration,
) -> Result<(), HubError> {
    let mut ws = accept_async(stream).await?;

    let name = match tokio::time::timeout(handshake_timeout, read_handshake(&mut ws)).await {
        Ok(Some(name)) if !name.is_empty() => name,
        Ok(_) => {
            close(&mut ws, CloseCode::Policy, "invalid handshake").await;
            return Ok(());
        }
        Err(_) => {
            close(&mut ws, CloseCode::Policy, "handshake timed out").await;
            return Ok(());
        }
    };

    let conn_id = Uuid::new_v4();
    let (tx, mut rx) = mpsc::channel::<Message>(PEER_QUEUE);

    if !registry.register(&name, conn_id, tx).await? {
        close(&mut ws, CloseCode::from(CLOSE_ALREADY_CONNECTED), "already connected").await;
        return Ok(());
    }

    if let Err(e) = ws.send(Message::text(HANDSHAKE_ACK)).await {
        registry.unregister(&name, conn_id).await?;
        return Err(e.into());
    }

    let (mut sink, mut stream) = ws.split();

    let writer = tokio::spawn(async move {
        while let Some(msg) = rx.recv().await {
            let closing = matches!(msg, Message::Close(_));
            if sink.send(msg).await.is_err() || closing {
                break;
            }
        }
    });

    while let Some(msg) = stream.next().await {
        match msg {
            Ok(msg @ Message::Text(_)) | Ok(msg @ Message::Binary(_)) => {
                registry.broadcast(&name, msg).await?;
            }
            Ok(Message::Close(frame)) => {
                debug!(name = %name, frame = ?frame, "Peer closed");
                break;
            }
            Ok(_) => {}
            Err(e) => {
                debug!(name = %name, "Read error: {}", e);
                break;
            }
        }
    }

    registry.unregister(&name, conn_id).await?;
    // Let a queued close frame from shutdown go out before dropping the sink
    let _ = tokio::time::timeout(Duration::from_millis(100), writer).await;
    Ok(())
}

/// Read the first data frame as the worker name
async fn read_handshake(ws: &mut WebSocketStream<TcpStream>) -> Option<String> {
    while let Some(msg) = ws.next().await {
        match msg {
            Ok(Message::Text(text)) => return Some(text.as_str().trim().to_string()),
            Ok(Message::Binary(bytes)) => {
                return String::from_utf8(bytes.to_vec()).ok().map(|s| s.trim().to_string())
            }
            Ok(Message::Ping(_)) | Ok(Message::Pong(_)) => continue,
            _ => return None,
        }
    }
    None
}

async fn close(ws: &mut WebSocketStream<TcpStream>, code: CloseCode, reason: &str) {
    let frame = CloseFrame {
        code,
        reason: reason.into(),
    };
    if ws.close(Some(frame)).await.is_ok() {
        // Drain until the peer acknowledges the close
        let _ = tokio::time::timeout(Duration::from_secs(1), async {
            while let Some(Ok(_)) = ws.next().await {}
        })
        .await;
    }
}
