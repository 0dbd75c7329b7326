use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;
use tracing::warn;

/// Pluggable webhook delivery backend. Any 2xx counts as delivered.
#[async_trait]
pub trait WebhookSink: Send + Sync {
    async fn post(&self, webhook_url: &str, payload: &Value) -> anyhow::Result<()>;
}

/// Discord-compatible webhook backend.
pub struct DiscordWebhook {
    http: reqwest::Client,
}

impl DiscordWebhook {
    pub fn new() -> Self {
        Self {
            http: reqwest::Client::builder()
                .timeout(Duration::from_secs(30))
                .build()
                .expect("Failed to build HTTP client"),
        }
    }
}

impl Default for DiscordWebhook {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl WebhookSink for DiscordWebhook {
    async fn post(&self, webhook_url: &str, payload: &Value) -> anyhow::Result<()> {
        let resp = self.http.post(webhook_url).json(payload).send().await?;

        if !resp.status().is_success() {
            let status = resp.status();
            let body = resp.text().await.unwrap_or_default();
            warn!(status = %status, body = %body, "Webhook returned non-success");
            anyhow::bail!("webhook returned {status}");
        }
        Ok(())
    }
}
