//! Fleet control - operator console for a running shardfleet
//!
//! Joins the hub under a unique operator name, broadcasts one command and
//! prints whatever replies arrive within the timeout.

mod cli;
mod commands;
mod error;
mod output;

use clap::Parser;
use cli::Cli;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&cli.log_level))
        .unwrap_or_else(|_| EnvFilter::new("warn"));

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let result = match commands::run(&cli).await {
        Ok(result) => output::output_result(&cli, &result),
        Err(e) => Err(e),
    };

    if let Err(e) = result {
        output::output_error(&cli, &e);
        std::process::exit(e.exit_code());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cli::Command;

    #[test]
    fn test_parse_eval() {
        let cli = Cli::try_parse_from(["fleet-ctl", "--json", "--timeout", "500", "eval", "shards"]).unwrap();
        assert!(cli.json);
        assert_eq!(cli.timeout, 500);
        assert!(matches!(cli.command, Command::Eval { ref expr } if expr == "shards"));
    }

    #[test]
    fn test_hub_url() {
        let cli = Cli::try_parse_from(["fleet-ctl", "--hub", "127.0.0.1:9000", "ping"]).unwrap();
        assert_eq!(cli.hub_url(), "ws://127.0.0.1:9000");
        let cli = Cli::try_parse_from(["fleet-ctl", "--hub", "ws://hub:1", "ping"]).unwrap();
        assert_eq!(cli.hub_url(), "ws://hub:1");
    }
}
