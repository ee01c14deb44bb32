//! One-shot readiness signal from a worker to the launcher
//!
//! The worker's stdout is the readiness pipe. The first non-whitespace byte
//! decides the outcome: `1` means ready, anything else or end of stream means
//! the worker failed to become ready. The result is delivered exactly once;
//! whatever the worker prints afterwards is forwarded to the log.

use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncReadExt, BufReader};
use tokio::sync::oneshot::{self, error::TryRecvError};
use tracing::debug;

/// Byte a worker writes once it is serving
pub const READY_BYTE: u8 = b'1';

/// Pending readiness of one spawned worker
#[derive(Debug)]
pub struct ReadinessWait {
    rx: oneshot::Receiver<bool>,
}

impl ReadinessWait {
    /// Watch `pipe` for the readiness byte
    pub fn watch<R>(cluster: &str, pipe: R) -> Self
    where
        R: AsyncRead + Unpin + Send + 'static,
    {
        let (tx, rx) = oneshot::channel();
        let cluster = cluster.to_string();

        tokio::spawn(async move {
            let mut reader = BufReader::new(pipe);
            let ready = loop {
                match reader.read_u8().await {
                    Ok(b) if b.is_ascii_whitespace() => continue,
                    Ok(b) => break b == READY_BYTE,
                    Err(_) => break false,
                }
            };
            let _ = tx.send(ready);

            let mut lines = reader.lines();
            while let Ok(Some(line)) = lines.next_line().await {
                debug!(cluster = %cluster, "{}", line);
            }
        });

        Self { rx }
    }

    /// Resolve once: `true` if the worker signalled readiness
    pub async fn wait(self) -> bool {
        self.rx.await.unwrap_or(false)
    }

    /// Non-blocking check; `None` while the worker has not decided yet
    pub fn try_resolve(&mut self) -> Option<bool> {
        match self.rx.try_recv() {
            Ok(ready) => Some(ready),
            Err(TryRecvError::Empty) => None,
            Err(TryRecvError::Closed) => Some(false),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::AsyncWriteExt;

    #[tokio::test]
    async fn test_ready_byte() {
        let (mut child_end, parent_end) = tokio::io::duplex(64);
        let wait = ReadinessWait::watch("Alpha", parent_end);
        child_end.write_all(b"1").await.unwrap();
        assert!(wait.wait().await);
    }

    #[tokio::test]
    async fn test_leading_whitespace_ignored() {
        let (mut child_end, parent_end) = tokio::io::duplex(64);
        let wait = ReadinessWait::watch("Alpha", parent_end);
        child_end.write_all(b"\n 1\nafter ready\n").await.unwrap();
        assert!(wait.wait().await);
    }

    #[tokio::test]
    async fn test_close_without_value_is_failure() {
        let (child_end, parent_end) = tokio::io::duplex(64);
        let wait = ReadinessWait::watch("Alpha", parent_end);
        drop(child_end);
        assert!(!wait.wait().await);
    }

    #[tokio::test]
    async fn test_try_resolve_pending_then_ready() {
        let (mut child_end, parent_end) = tokio::io::duplex(64);
        let mut wait = ReadinessWait::watch("Alpha", parent_end);
        assert_eq!(wait.try_resolve(), None);

        child_end.write_all(b"1").await.unwrap();
        let mut resolved = None;
        for _ in 0..50 {
            resolved = wait.try_resolve();
            if resolved.is_some() {
                break;
            }
            tokio::time::sleep(std::time::Duration::from_millis(10)).await;
        }
        assert_eq!(resolved, Some(true));
    }

    #[tokio::test]
    async fn test_other_value_is_failure() {
        let (mut child_end, parent_end) = tokio::io::duplex(64);
        let wait = ReadinessWait::watch("Alpha", parent_end);
        child_end.write_all(b"0").await.unwrap();
        assert!(!wait.wait().await);
    }
}
