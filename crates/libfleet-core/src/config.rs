//! Fleet configuration read from the environment
//!
//! Only a handful of values are needed by the core: the bot credentials,
//! the development flag, the shard-group size and the addresses of the
//! gateway API and the IPC hub. Binaries layer process-local flags on top.

use serde::Serialize;

use crate::error::FleetError;
use crate::DEFAULT_SHARDS_PER_CLUSTER;

pub const ENV_TOKEN: &str = "FLEET_TOKEN";
pub const ENV_DEV_TOKEN: &str = "FLEET_DEV_TOKEN";
pub const ENV_DEVELOPMENT: &str = "FLEET_DEVELOPMENT";
pub const ENV_SHARDS_PER_CLUSTER: &str = "FLEET_SHARDS_PER_CLUSTER";
pub const ENV_API_BASE: &str = "FLEET_API_BASE";
pub const ENV_HUB_ADDR: &str = "FLEET_HUB_ADDR";
pub const ENV_ALLOW_EVAL: &str = "FLEET_ALLOW_EVAL";

pub const DEFAULT_API_BASE: &str = "https://discord.com/api/v10";
pub const DEFAULT_HUB_ADDR: &str = "127.0.0.1:13254";

/// Environment-provided fleet configuration
#[derive(Clone, Serialize)]
pub struct FleetConfig {
    #[serde(skip)]
    token: Option<String>,
    #[serde(skip)]
    dev_token: Option<String>,
    /// Development mode switches the credential and the command prefix
    pub development: bool,
    /// Shard-group size
    pub shards_per_cluster: u32,
    /// Gateway REST base URL
    pub api_base: String,
    /// IPC hub address (`host:port`)
    pub hub_addr: String,
    /// Whether workers answer `eval` commands
    pub allow_eval: bool,
}

impl std::fmt::Debug for FleetConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FleetConfig")
            .field("development", &self.development)
            .field("shards_per_cluster", &self.shards_per_cluster)
            .field("api_base", &self.api_base)
            .field("hub_addr", &self.hub_addr)
            .field("allow_eval", &self.allow_eval)
            .finish_non_exhaustive()
    }
}

impl FleetConfig {
    /// Load configuration from the process environment
    pub fn from_env() -> Result<Self, FleetError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load configuration through an arbitrary key lookup
    pub fn from_lookup<F>(lookup: F) -> Result<Self, FleetError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let development = lookup(ENV_DEVELOPMENT)
            .map(|v| parse_flag(&v))
            .unwrap_or(false);

        let shards_per_cluster = match lookup(ENV_SHARDS_PER_CLUSTER) {
            Some(raw) => {
                let value: u32 = raw.trim().parse().map_err(|_| {
                    FleetError::Config(format!("{} must be a positive integer, got '{}'", ENV_SHARDS_PER_CLUSTER, raw))
                })?;
                if value == 0 {
                    return Err(FleetError::Config(format!(
                        "{} must be at least 1",
                        ENV_SHARDS_PER_CLUSTER
                    )));
                }
                value
            }
            None => DEFAULT_SHARDS_PER_CLUSTER,
        };

        let config = Self {
            token: lookup(ENV_TOKEN).filter(|s| !s.is_empty()),
            dev_token: lookup(ENV_DEV_TOKEN).filter(|s| !s.is_empty()),
            development,
            shards_per_cluster,
            api_base: lookup(ENV_API_BASE)
                .map(|s| s.trim_end_matches('/').to_string())
                .unwrap_or_else(|| DEFAULT_API_BASE.to_string()),
            hub_addr: lookup(ENV_HUB_ADDR).unwrap_or_else(|| DEFAULT_HUB_ADDR.to_string()),
            allow_eval: lookup(ENV_ALLOW_EVAL).map(|v| parse_flag(&v)).unwrap_or(false),
        };

        // Fail early rather than at the first gateway call
        config.token()?;
        Ok(config)
    }

    /// Credential for the current mode
    pub fn token(&self) -> Result<&str, FleetError> {
        if self.development {
            self.dev_token.as_deref().ok_or(FleetError::MissingEnv(ENV_DEV_TOKEN))
        } else {
            self.token.as_deref().ok_or(FleetError::MissingEnv(ENV_TOKEN))
        }
    }

    /// Chat command prefix for the current mode
    pub fn command_prefix(&self) -> &'static str {
        if self.development {
            "?"
        } else {
            "!"
        }
    }

    /// WebSocket URL of the IPC hub
    pub fn hub_url(&self) -> String {
        format!("ws://{}", self.hub_addr)
    }
}

fn parse_flag(raw: &str) -> bool {
    matches!(raw.trim().to_ascii_lowercase().as_str(), "1" | "true" | "yes" | "on")
}
