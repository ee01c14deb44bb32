//! Connection registry
//!
//! The registry maps a worker name to the outbound queue of its connection.
//! It is owned by a single task and only changed through [`RegistryCommand`]s,
//! so connection tasks never share the map.

use std::collections::HashMap;

use tokio::sync::{mpsc, oneshot};
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::tungstenite::Message;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::error::HubError;

/// Outbound side of one registered connection
struct Peer {
    conn_id: Uuid,
    tx: mpsc::Sender<Message>,
}

/// Requests handled by the registry task
pub enum RegistryCommand {
    /// Register a connection under a name; replies `false` if the name is taken
    Register {
        name: String,
        conn_id: Uuid,
        tx: mpsc::Sender<Message>,
        reply: oneshot::Sender<bool>,
    },
    /// Deliver a payload to everyone except the sender
    Broadcast { from: String, payload: Message },
    /// Remove a connection, if it still owns the name
    Unregister { name: String, conn_id: Uuid },
    /// List registered names
    Names { reply: oneshot::Sender<Vec<String>> },
    /// Close every connection normally
    CloseAll,
}

/// Name → connection map
#[derive(Default)]
pub struct Registry {
    peers: HashMap<String, Peer>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `name`; the first connection under a name wins
    pub fn register(&mut self, name: &str, conn_id: Uuid, tx: mpsc::Sender<Message>) -> bool {
        if self.peers.contains_key(name) {
            return false;
        }
        self.peers.insert(name.to_string(), Peer { conn_id, tx });
        true
    }

    /// Remove `name` if it is still held by `conn_id`
    pub fn unregister(&mut self, name: &str, conn_id: Uuid) -> bool {
        match self.peers.get(name) {
            Some(peer) if peer.conn_id == conn_id => {
                self.peers.remove(name);
                true
            }
            _ => false,
        }
    }

    /// Send `payload` to every peer but `from`. Returns the number of peers
    /// the payload was queued for; a failed peer does not stop the rest.
    pub fn broadcast(&self, from: &str, payload: &Message) -> usize {
        let mut delivered = 0;
        for (name, peer) in &self.peers {
            if name == from {
                continue;
            }
            match peer.tx.try_send(payload.clone()) {
                Ok(()) => delivered += 1,
                Err(e) => warn!(to = %name, "Dropping broadcast: {}", e),
            }
        }
        delivered
    }

    pub fn len(&self) -> usize {
        self.peers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.peers.is_empty()
    }

    /// Registered names, sorted
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.peers.keys().cloned().collect();
        names.sort();
        names
    }

    fn close_all(&mut self) {
        for (name, peer) in self.peers.drain() {
            let frame = CloseFrame {
                code: CloseCode::Normal,
                reason: "hub shutting down".into(),
            };
            if peer.tx.try_send(Message::Close(Some(frame))).is_err() {
                debug!(name = %name, "Peer already gone at shutdown");
            }
        }
    }

    /// Serve registry commands until every handle is dropped
    pub async fn run(mut self, mut rx: mpsc::Receiver<RegistryCommand>) {
        while let Some(cmd) = rx.recv().await {
            match cmd {
                RegistryCommand::Register {
                    name,
                    conn_id,
                    tx,
                    reply,
                } => {
                    let accepted = self.register(&name, conn_id, tx);
                    if accepted {
                        info!(name = %name, peers = self.len(), "Worker registered");
                    } else {
                        warn!(name = %name, "Rejecting duplicate handshake");
                    }
                    let _ = reply.send(accepted);
                }
                RegistryCommand::Broadcast { from, payload } => {
                    let delivered = self.broadcast(&from, &payload);
                    debug!(from = %from, delivered, "Broadcast");
                }
                RegistryCommand::Unregister { name, conn_id } => {
                    if self.unregister(&name, conn_id) {
                        info!(name = %name, peers = self.len(), "Worker disconnected");
                    }
                }
                RegistryCommand::Names { reply } => {
                    let _ = reply.send(self.names());
                }
                RegistryCommand::CloseAll => self.close_all(),
            }
        }
    }

    /// Spawn the registry task and return a handle to it
    pub fn spawn(self) -> RegistryHandle {
        let (tx, rx) = mpsc::channel(1024);
        tokio::spawn(self.run(rx));
        RegistryHandle { tx }
    }
}

/// Cloneable handle used by connection tasks
#[derive(Clone)]
pub struct RegistryHandle {
    tx: mpsc::Sender<RegistryCommand>,
}

impl RegistryHandle {
    pub async fn register(&self, name: &str, conn_id: Uuid, tx: mpsc::Sender<Message>) -> Result<bool, HubError> {
        let (reply, rx) = oneshot::channel();
        self.send(RegistryCommand::Register {
            name: name.to_string(),
            conn_id,
            tx,
            reply,
        })
        .await?;
        rx.await.map_err(|_| HubError::RegistryClosed)
    }

    pub async fn broadcast(&self, from: &str, payload: Message) -> Result<(), HubError> {
        self.send(RegistryCommand::Broadcast {
            from: from.to_string(),
            payload,
        })
        .await
    }

    pub async fn unregister(&self, name: &str, conn_id: Uuid) -> Result<(), HubError> {
        self.send(RegistryCommand::Unregister {
            name: name.to_string(),
            conn_id,
        })
        .await
    }

    pub async fn names(&self) -> Result<Vec<String>, HubError> {
        let (reply, rx) = oneshot::channel();
        self.send(RegistryCommand::Names { reply }).await?;
        rx.await.map_err(|_| HubError::RegistryClosed)
    }

    pub async fn close_all(&self) -> Result<(), HubError> {
        self.send(RegistryCommand::CloseAll).await
    }

    async fn send(&self, cmd: RegistryCommand) -> Result<(), HubError> {
        self.tx.send(cmd).await.map_err(|_| HubError::RegistryClosed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn peer() -> (mpsc::Sender<Message>, mpsc::Receiver<Message>) {
        mpsc::channel(8)
    }

    #[test]
    fn test_first_registration_wins() {
        let mut registry = Registry::new();
        let (tx1, _rx1) = peer();
        let (tx2, _rx2) = peer();
        let first = Uuid::new_v4();

        assert!(registry.register("Alpha", first, tx1));
        assert!(!registry.register("Alpha", Uuid::new_v4(), tx2));
        assert_eq!(registry.len(), 1);

        // The rejected connection cannot remove the original
        assert!(!registry.unregister("Alpha", Uuid::new_v4()));
        assert_eq!(registry.names(), vec!["Alpha".to_string()]);
        assert!(registry.unregister("Alpha", first));
        assert!(registry.is_empty());
    }

    #[test]
    fn test_broadcast_skips_sender() {
        let mut registry = Registry::new();
        let (tx_a, mut rx_a) = peer();
        let (tx_b, mut rx_b) = peer();
        let (tx_c, mut rx_c) = peer();
        registry.register("Alpha", Uuid::new_v4(), tx_a);
        registry.register("Beta", Uuid::new_v4(), tx_b);
        registry.register("Charlie", Uuid::new_v4(), tx_c);

        let payload = Message::text(r#"{"command":"ping"}"#);
        assert_eq!(registry.broadcast("Alpha", &payload), 2);

        assert!(rx_a.try_recv().is_err());
        assert_eq!(rx_b.try_recv().unwrap(), payload);
        assert_eq!(rx_c.try_recv().unwrap(), payload);
    }

    #[test]
    fn test_broadcast_survives_dead_peer() {
        let mut registry = Registry::new();
        let (tx_a, _rx_a) = peer();
        let (tx_b, rx_b) = peer();
        let (tx_c, mut rx_c) = peer();
        registry.register("Alpha", Uuid::new_v4(), tx_a);
        registry.register("Beta", Uuid::new_v4(), tx_b);
        registry.register("Charlie", Uuid::new_v4(), tx_c);
        drop(rx_b);

        let payload = Message::text("hello");
        assert_eq!(registry.broadcast("Alpha", &payload), 1);
        assert_eq!(rx_c.try_recv().unwrap(), payload);
    }

    #[test]
    fn test_close_all_sends_normal_close() {
        let mut registry = Registry::new();
        let (tx, mut rx) = peer();
        registry.register("Alpha", Uuid::new_v4(), tx);
        registry.close_all();

        assert!(registry.is_empty());
        match rx.try_recv().unwrap() {
            Message::Close(Some(frame)) => assert_eq!(frame.code, CloseCode::Normal),
            other => panic!("expected close frame, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_handle_round_trip() {
        let handle = Registry::new().spawn();
        let (tx, _rx) = peer();
        let id = Uuid::new_v4();

        assert!(handle.register("Alpha", id, tx.clone()).await.unwrap());
        assert!(!handle.register("Alpha", Uuid::new_v4(), tx).await.unwrap());
        assert_eq!(handle.names().await.unwrap(), vec!["Alpha".to_string()]);

        handle.unregister("Alpha", id).await.unwrap();
        assert!(handle.names().await.unwrap().is_empty());
    }
}
