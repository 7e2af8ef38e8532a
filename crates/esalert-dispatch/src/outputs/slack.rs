//! Slack incoming-webhook output. One attachment per record.

use async_trait::async_trait;
use esalert_core::{AlertError, AlertMethod, Record, Result};
use serde::Deserialize;
use serde_json::{Value, json};
use std::time::Duration;

use super::default_http_timeout_secs;

const ATTACHMENT_COLOR: &str = "#d32f2f";

#[derive(Debug, Clone, Deserialize)]
pub struct SlackConfig {
    /// Incoming webhook URL.
    pub webhook: String,
    #[serde(default)]
    pub channel: Option<String>,
    #[serde(default)]
    pub username: Option<String>,
    /// Message text; defaults to a line naming the rule.
    #[serde(default)]
    pub text: Option<String>,
    #[serde(default = "default_http_timeout_secs")]
    pub timeout_secs: u64,
}

pub struct SlackMethod {
    client: reqwest::Client,
    config: SlackConfig,
}

impl SlackMethod {
    pub fn new(config: SlackConfig) -> Result<Self> {
        if config.webhook.is_empty() {
            return Err(AlertError::Config("slack output needs a 'webhook'".into()));
        }
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| AlertError::Config(format!("slack client: {e}")))?;
        Ok(Self { client, config })
    }

    fn payload(&self, rule_name: &str, records: &[Record]) -> Value {
        let text = self
            .config
            .text
            .clone()
            .unwrap_or_else(|| format!(":rotating_light: Elasticsearch alert: *{rule_name}*"));

        let mut payload = json!({
            "text": text,
            "attachments": records.iter().map(attachment).collect::<Vec<_>>(),
        });
        if let Some(channel) = &self.config.channel {
            payload["channel"] = json!(channel);
        }
        if let Some(username) = &self.config.username {
            payload["username"] = json!(username);
        }
        payload
    }
}

fn attachment(record: &Record) -> Value {
    match record {
        Record::Fields { filter, fields } => json!({
            "color": ATTACHMENT_COLOR,
            "title": filter,
            "fields": fields
                .iter()
                .map(|f| json!({"title": f.key, "value": f.count.to_string(), "short": true}))
                .collect::<Vec<_>>(),
        }),
        Record::Body { filter, text } => json!({
            "color": ATTACHMENT_COLOR,
            "title": filter,
            "text": format!("```\n{text}\n```"),
        }),
    }
}

#[async_trait]
impl AlertMethod for SlackMethod {
    fn name(&self) -> &str {
        "slack"
    }

    async fn write(&self, rule_name: &str, records: &[Record]) -> Result<()> {
        self.client
            .post(&self.config.webhook)
            .json(&self.payload(rule_name, records))
            .send()
            .await
            .map_err(|e| AlertError::delivery("slack", e))?
            .error_for_status()
            .map_err(|e| AlertError::delivery("slack", e))?;
        tracing::debug!("💬 Slack message posted for '{}'", rule_name);
        Ok(())
    }
}
