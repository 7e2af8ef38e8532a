//! Generic HTTP webhook: POST the alert as JSON.

use async_trait::async_trait;
use esalert_core::{AlertError, AlertMethod, Record, Result};
use serde::Deserialize;
use std::collections::BTreeMap;
use std::time::Duration;

use super::{AlertPayload, default_http_timeout_secs};

#[derive(Debug, Clone, Deserialize)]
pub struct WebhookConfig {
    pub url: String,
    /// Extra request headers, e.g. an auth token.
    #[serde(default)]
    pub headers: BTreeMap<String, String>,
    #[serde(default = "default_http_timeout_secs")]
    pub timeout_secs: u64,
}

pub struct WebhookMethod {
    client: reqwest::Client,
    config: WebhookConfig,
}

impl WebhookMethod {
    pub fn new(config: WebhookConfig) -> Result<Self> {
        if config.url.is_empty() {
            return Err(AlertError::Config("webhook output needs a 'url'".into()));
        }
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| AlertError::Config(format!("webhook client: {e}")))?;
        Ok(Self { client, config })
    }
}

#[async_trait]
impl AlertMethod for WebhookMethod {
    fn name(&self) -> &str {
        "webhook"
    }

    async fn write(&self, rule_name: &str, records: &[Record]) -> Result<()> {
        let mut req = self
            .client
            .post(&self.config.url)
            .json(&AlertPayload::new(rule_name, records));
        for (key, value) in &self.config.headers {
            req = req.header(key.as_str(), value.as_str());
        }

        let resp = req
            .send()
            .await
            .map_err(|e| AlertError::delivery("webhook", format!("send failed: {e}")))?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(AlertError::delivery("webhook", format!("{status}: {body}")));
        }
        tracing::debug!("🌐 Webhook delivered to {} for '{}'", self.config.url, rule_name);
        Ok(())
    }
}
