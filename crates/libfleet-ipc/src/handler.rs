//! Worker-side command dispatch

use std::panic::{catch_unwind, AssertUnwindSafe};
use std::time::Duration;

use crate::messages::ControlMessage;
use crate::UNKNOWN_COMMAND_REPLY;

/// What a worker exposes to the control plane
pub trait ControlHandler: Send + Sync + 'static {
    /// Current gateway latency, if one has been measured
    fn latency(&self) -> Option<Duration>;

    /// Evaluate a diagnostic expression
    fn eval(&self, content: &str) -> Result<String, String>;
}

/// Produce the reply payload for a command.
///
/// Never fails: evaluation errors and panics become the reply text.
pub fn respond<H: ControlHandler + ?Sized>(handler: &H, message: &ControlMessage) -> String {
    match message {
        ControlMessage::Ping => match handler.latency() {
            Some(latency) => format!("{}ms", latency.as_millis()),
            None => "n/a".to_string(),
        },
        ControlMessage::Eval { content } => {
            match catch_unwind(AssertUnwindSafe(|| handler.eval(content))) {
                Ok(Ok(output)) => output,
                Ok(Err(e)) => format!("error: {}", e),
                Err(_) => "error: evaluation panicked".to_string(),
            }
        }
        ControlMessage::Unknown => UNKNOWN_COMMAND_REPLY.to_string(),
    }
}
