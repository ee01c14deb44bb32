//! Shard-count query against the gateway's bot-info endpoint

use std::time::Duration;

use reqwest::header::AUTHORIZATION;
use serde::Deserialize;
use tracing::info;

use crate::error::LauncherError;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Subset of the bot-info response the launcher needs
#[derive(Debug, Deserialize)]
pub struct GatewayBot {
    /// Recommended number of shards
    pub shards: u32,
    #[serde(default)]
    pub url: Option<String>,
}

/// Fetch the recommended total shard count.
///
/// Any non-2xx answer is an error; callers treat it as fatal.
pub async fn fetch_shard_count(api_base: &str, token: &str) -> Result<u32, LauncherError> {
    let url = format!("{}/gateway/bot", api_base.trim_end_matches('/'));

    let client = reqwest::Client::builder().timeout(REQUEST_TIMEOUT).build()?;
    let response = client
        .get(&url)
        .header(AUTHORIZATION, format!("Bot {}", token))
        .send()
        .await?;

    let status = response.status();
    if !status.is_success() {
        let body = response.text().await.unwrap_or_default();
        return Err(LauncherError::ShardCount {
            status: status.as_u16(),
            body,
        });
    }

    let bot: GatewayBot = response.json().await?;
    info!(shards = bot.shards, "Fetched shard count");
    Ok(bot.shards)
}
