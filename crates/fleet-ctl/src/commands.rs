//! Broadcast a command through the hub and collect replies

use std::sync::Arc;
use std::time::Duration;

use libfleet_ipc::{ControlHandler, ControlMessage, ControlReply, IpcClient};
use tracing::debug;
use uuid::Uuid;

use crate::cli::{Cli, Command};
use crate::error::CtlError;
use crate::output::BroadcastResult;

/// Name prefix of operator connections
pub const OPERATOR_PREFIX: &str = "operator-";

/// Operator consoles answer commands from other consoles but carry no data
struct Console;

impl ControlHandler for Console {
    fn latency(&self) -> Option<Duration> {
        None
    }

    fn eval(&self, _content: &str) -> Result<String, String> {
        Err("operator console".to_string())
    }
}

pub fn message_for(command: &Command) -> ControlMessage {
    match command {
        Command::Ping => ControlMessage::Ping,
        Command::Eval { expr } => ControlMessage::eval(expr.clone()),
    }
}

pub async fn run(cli: &Cli) -> Result<BroadcastResult, CtlError> {
    let message = message_for(&cli.command);
    let name = format!("{}{}", OPERATOR_PREFIX, Uuid::new_v4());

    let client = IpcClient::connect(&cli.hub_url(), &name).await?;
    let (handle, task) = client.spawn(Arc::new(Console));

    let replies = handle
        .broadcast(&message, Duration::from_millis(cli.timeout))
        .await?;

    if let Err(e) = handle.close().await {
        debug!("Close failed: {}", e);
    }
    let _ = tokio::time::timeout(Duration::from_secs(1), task).await;

    Ok(BroadcastResult {
        command: message.command_name(),
        timeout_ms: cli.timeout,
        replies: worker_replies(replies),
    })
}

/// Drop replies from other operator consoles and order by cluster
pub fn worker_replies(mut replies: Vec<ControlReply>) -> Vec<ControlReply> {
    replies.retain(|r| !r.author.starts_with(OPERATOR_PREFIX));
    replies.sort_by(|a, b| a.author.cmp(&b.author));
    replies
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_worker_replies_filters_and_sorts() {
        let replies = worker_replies(vec![
            ControlReply::new("9ms", "Charlie"),
            ControlReply::new("n/a", "operator-1234"),
            ControlReply::new("3ms", "Alpha"),
        ]);
        let authors: Vec<&str> = replies.iter().map(|r| r.author.as_str()).collect();
        assert_eq!(authors, vec!["Alpha", "Charlie"]);
    }

    #[test]
    fn test_message_for() {
        assert_eq!(message_for(&Command::Ping), ControlMessage::Ping);
        assert_eq!(
            message_for(&Command::Eval {
                expr: "uptime".to_string()
            }),
            ControlMessage::eval("uptime")
        );
    }
}
