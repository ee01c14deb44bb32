//! Hub client for workers and operators
//!
//! A client dials the hub, sends its name as the handshake and waits for a
//! single acknowledgement. After that it serves commands from other peers
//! and, through an [`IpcHandle`], can broadcast its own commands and collect
//! the replies that arrive within a bounded window.

use std::sync::Arc;
use std::time::Duration;

use futures::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use tracing::{debug, info, warn};

use crate::error::IpcError;
use crate::handler::{respond, ControlHandler};
use crate::messages::{ControlMessage, ControlReply, HubMessage};
use crate::CLOSE_NORMAL;

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// A connected, acknowledged hub client
pub struct IpcClient {
    name: String,
    ws: WsStream,
}

impl IpcClient {
    /// Dial the hub and complete the name handshake
    pub async fn connect(url: &str, name: &str) -> Result<Self, IpcError> {
        let (mut ws, _) = connect_async(url).await.map_err(IpcError::from)?;

        ws.send(Message::text(name)).await?;

        loop {
            match ws.next().await {
                Some(Ok(Message::Text(ack))) if !ack.is_empty() => break,
                Some(Ok(Message::Binary(ack))) if !ack.is_empty() => break,
                Some(Ok(Message::Ping(_))) | Some(Ok(Message::Pong(_))) => continue,
                Some(Ok(Message::Close(frame))) => {
                    let (code, reason) = close_parts(frame.as_ref());
                    return Err(IpcError::HandshakeRejected { code, reason });
                }
                Some(Ok(_)) => {
                    return Err(IpcError::HandshakeFailed(
                        "empty acknowledgement".to_string(),
                    ))
                }
                Some(Err(e)) => return Err(e.into()),
                None => {
                    return Err(IpcError::HandshakeFailed(
                        "connection closed before acknowledgement".to_string(),
                    ))
                }
            }
        }

        info!(name = %name, url = %url, "Connected to hub");

        Ok(Self {
            name: name.to_string(),
            ws,
        })
    }

    /// Name announced in the handshake
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Start the receive loop on its own task.
    ///
    /// The returned task resolves when the connection ends: `Ok` for a
    /// normal closure, `Err` for anything else.
    pub fn spawn<H: ControlHandler>(self, handler: Arc<H>) -> (IpcHandle, JoinHandle<Result<(), IpcError>>) {
        let (outbound_tx, outbound_rx) = mpsc::channel(256);
        let (replies_tx, _) = broadcast::channel(256);

        let handle = IpcHandle {
            name: self.name.clone(),
            outbound: outbound_tx.clone(),
            replies: replies_tx.clone(),
        };

        let task = tokio::spawn(run(
            self.ws,
            self.name,
            handler,
            outbound_tx,
            outbound_rx,
            replies_tx,
        ));

        (handle, task)
    }

    /// Serve commands until the connection ends
    pub async fn serve<H: ControlHandler>(self, handler: Arc<H>) -> Result<(), IpcError> {
        let (_handle, task) = self.spawn(handler);
        task.await
            .map_err(|e| IpcError::WebSocket(format!("receive loop aborted: {}", e)))?
    }
}

/// Cloneable handle to a running client
#[derive(Clone)]
pub struct IpcHandle {
    name: String,
    outbound: mpsc::Sender<Message>,
    replies: broadcast::Sender<ControlReply>,
}

impl IpcHandle {
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Broadcast a command and collect the replies that arrive within `window`.
    ///
    /// Replies arriving after the window are discarded. Workers that are down
    /// or slow are simply absent from the result.
    pub async fn broadcast(
        &self,
        command: &ControlMessage,
        window: Duration,
    ) -> Result<Vec<ControlReply>, IpcError> {
        // Subscribe before sending so no early reply is missed
        let mut replies = self.replies.subscribe();

        self.outbound
            .send(Message::text(command.to_json()?))
            .await
            .map_err(|_| IpcError::ClientClosed)?;

        let deadline = Instant::now() + window;
        let mut collected = Vec::new();

        loop {
            match tokio::time::timeout_at(deadline, replies.recv()).await {
                Ok(Ok(reply)) => collected.push(reply),
                Ok(Err(broadcast::error::RecvError::Lagged(skipped))) => {
                    warn!(skipped, "Reply collector lagged");
                }
                Ok(Err(broadcast::error::RecvError::Closed)) => break,
                Err(_) => break,
            }
        }

        debug!(
            command = command.command_name(),
            replies = collected.len(),
            "Collected broadcast replies"
        );
        Ok(collected)
    }

    /// Close the connection with the normal close code
    pub async fn close(&self) -> Result<(), IpcError> {
        let frame = CloseFrame {
            code: CloseCode::Normal,
            reason: "closing".into(),
        };
        self.outbound
            .send(Message::Close(Some(frame)))
            .await
            .map_err(|_| IpcError::ClientClosed)
    }
}

async fn run<H: ControlHandler>(
    ws: WsStream,
    name: String,
    handler: Arc<H>,
    outbound_tx: mpsc::Sender<Message>,
    mut outbound_rx: mpsc::Receiver<Message>,
    replies_tx: broadcast::Sender<ControlReply>,
) -> Result<(), IpcError> {
    let (mut sink, mut stream) = ws.split();

    let writer = tokio::spawn(async move {
        while let Some(msg) = outbound_rx.recv().await {
            let closing = matches!(msg, Message::Close(_));
            if let Err(e) = sink.send(msg).await {
                debug!("Send to hub failed: {}", e);
                break;
            }
            if closing {
                break;
            }
        }
    });

    let result = loop {
        let text = match stream.next().await {
            Some(Ok(Message::Text(text))) => text.as_str().to_owned(),
            Some(Ok(Message::Binary(bytes))) => match String::from_utf8(bytes.to_vec()) {
                Ok(text) => text,
                Err(_) => {
                    warn!("Ignoring non UTF-8 frame from hub");
                    continue;
                }
            },
            Some(Ok(Message::Close(frame))) => {
                let (code, reason) = close_parts(frame.as_ref());
                if code == CLOSE_NORMAL {
                    info!(name = %name, "Hub connection closed");
                    break Ok(());
                }
                break Err(IpcError::AbnormalClose { code, reason });
            }
            Some(Ok(_)) => continue,
            Some(Err(e)) => break Err(e.into()),
            None => break Err(IpcError::ConnectionLost),
        };

        match HubMessage::parse(&text) {
            Ok(HubMessage::Command(command)) => {
                let response = respond(handler.as_ref(), &command);
                let reply = ControlReply::new(response, name.clone());
                debug!(command = command.command_name(), "Answering command");
                match reply.to_json() {
                    Ok(json) => {
                        if outbound_tx.send(Message::text(json)).await.is_err() {
                            break Err(IpcError::ClientClosed);
                        }
                    }
                    Err(e) => warn!("Failed to encode reply: {}", e),
                }
            }
            Ok(HubMessage::Reply(reply)) => {
                // No collector listening is fine
                let _ = replies_tx.send(reply);
            }
            Err(e) => warn!("Ignoring malformed control message: {}", e),
        }
    };

    writer.abort();
    result
}

fn close_parts(frame: Option<&CloseFrame>) -> (u16, String) {
    match frame {
        Some(frame) => (u16::from(frame.code), frame.reason.as_str().to_string()),
        None => (u16::from(CloseCode::Status), String::new()),
    }
}
