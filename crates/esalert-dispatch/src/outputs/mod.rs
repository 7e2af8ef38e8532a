//! Concrete delivery methods, built from a rule's `outputs` entries.
//! Supports: file (JSON lines), webhook (HTTP POST), slack (incoming webhook), email (SMTP).

pub mod email;
pub mod file;
pub mod slack;
pub mod webhook;

use esalert_core::{AlertError, AlertMethod, OutputConfig, Record, Result};
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::sync::Arc;

pub use email::EmailMethod;
pub use file::FileMethod;
pub use slack::SlackMethod;
pub use webhook::WebhookMethod;

/// Build the method described by one output entry.
pub fn build_method(output: &OutputConfig) -> Result<Arc<dyn AlertMethod>> {
    let config = Value::Object(output.config.clone());
    let method: Arc<dyn AlertMethod> = match output.output_type.as_str() {
        "file" => Arc::new(FileMethod::new(parse_config("file", config)?)),
        "webhook" => Arc::new(WebhookMethod::new(parse_config("webhook", config)?)?),
        "slack" => Arc::new(SlackMethod::new(parse_config("slack", config)?)?),
        "email" => Arc::new(EmailMethod::new(parse_config("email", config)?)?),
        other => {
            return Err(AlertError::Config(format!("unknown output type '{other}'")));
        }
    };
    tracing::debug!("🔌 Built {} output", method.name());
    Ok(method)
}

/// Build every output of a rule, in order.
pub fn build_methods(outputs: &[OutputConfig]) -> Result<Vec<Arc<dyn AlertMethod>>> {
    outputs.iter().map(build_method).collect()
}

fn parse_config<T: DeserializeOwned>(kind: &str, config: Value) -> Result<T> {
    serde_json::from_value(config)
        .map_err(|e| AlertError::Config(format!("invalid {kind} output config: {e}")))
}

/// JSON document written by the file and webhook outputs.
#[derive(Debug, Serialize)]
pub struct AlertPayload<'a> {
    pub rule_name: &'a str,
    pub timestamp: String,
    pub records: &'a [Record],
}

impl<'a> AlertPayload<'a> {
    pub fn new(rule_name: &'a str, records: &'a [Record]) -> Self {
        Self {
            rule_name,
            timestamp: chrono::Utc::now().to_rfc3339(),
            records,
        }
    }
}

fn default_http_timeout_secs() -> u64 { 10 }
