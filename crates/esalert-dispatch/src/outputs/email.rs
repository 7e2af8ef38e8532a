//! Email output via SMTP (async lettre, STARTTLS).

use async_trait::async_trait;
use esalert_core::{AlertError, AlertMethod, Record, Result};
use lettre::message::Mailbox;
use lettre::message::header::ContentType;
use lettre::transport::smtp::authentication::Credentials;
use lettre::{AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor};
use serde::Deserialize;
use std::fmt::Write as _;

#[derive(Debug, Clone, Deserialize)]
pub struct EmailConfig {
    pub host: String,
    #[serde(default = "default_smtp_port")]
    pub port: u16,
    pub from: String,
    pub to: Vec<String>,
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub password: String,
    /// Subject line; defaults to one naming the rule.
    #[serde(default)]
    pub subject: Option<String>,
}

fn default_smtp_port() -> u16 { 587 }

pub struct EmailMethod {
    mailer: AsyncSmtpTransport<Tokio1Executor>,
    from: Mailbox,
    to: Vec<Mailbox>,
    subject: Option<String>,
}

impl EmailMethod {
    pub fn new(config: EmailConfig) -> Result<Self> {
        let from: Mailbox = config
            .from
            .parse()
            .map_err(|e| AlertError::Config(format!("Invalid from: {e}")))?;
        if config.to.is_empty() {
            return Err(AlertError::Config("email output needs at least one 'to' address".into()));
        }
        let to = config
            .to
            .iter()
            .map(|addr| {
                addr.parse::<Mailbox>()
                    .map_err(|e| AlertError::Config(format!("Invalid to '{addr}': {e}")))
            })
            .collect::<Result<Vec<_>>>()?;

        let mut builder = AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(&config.host)
            .map_err(|e| AlertError::Config(format!("SMTP relay: {e}")))?
            .port(config.port);
        if !config.username.is_empty() {
            builder = builder.credentials(Credentials::new(config.username, config.password));
        }

        Ok(Self {
            mailer: builder.build(),
            from,
            to,
            subject: config.subject,
        })
    }

    fn build_message(&self, rule_name: &str, records: &[Record]) -> Result<Message> {
        let subject = self
            .subject
            .clone()
            .unwrap_or_else(|| format!("Elasticsearch alert: {rule_name}"));

        let mut builder = Message::builder()
            .from(self.from.clone())
            .subject(subject)
            .header(ContentType::TEXT_PLAIN);
        for to in &self.to {
            builder = builder.to(to.clone());
        }
        builder
            .body(render_text(rule_name, records))
            .map_err(|e| AlertError::delivery("email", format!("Build email: {e}")))
    }
}

/// Plain-text rendering of every record.
pub fn render_text(rule_name: &str, records: &[Record]) -> String {
    let mut out = format!("Rule: {rule_name}\n");
    for record in records {
        let _ = write!(out, "\nFilter path: {}\n", record.filter());
        match record {
            Record::Fields { fields, .. } => {
                for field in fields {
                    let _ = writeln!(out, "  - {}: {}", field.key, field.count);
                }
            }
            Record::Body { text, .. } => {
                let _ = writeln!(out, "{text}");
            }
        }
    }
    out
}

#[async_trait]
impl AlertMethod for EmailMethod {
    fn name(&self) -> &str {
        "email"
    }

    async fn write(&self, rule_name: &str, records: &[Record]) -> Result<()> {
        let email = self.build_message(rule_name, records)?;
        self.mailer
            .send(email)
            .await
            .map_err(|e| AlertError::delivery("email", format!("SMTP send: {e}")))?;
        tracing::info!("📤 Alert email for '{}' sent to {} recipient(s)", rule_name, self.to.len());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use esalert_core::Field;

    fn config() -> EmailConfig {
        EmailConfig {
            host: "smtp.example.com".into(),
            port: 587,
            from: "esalert <alerts@example.com>".into(),
            to: vec!["ops@example.com".into(), "oncall@example.com".into()],
            username: String::new(),
            password: String::new(),
            subject: None,
        }
    }

    #[test]
    fn test_render_text() {
        let records = vec![
            Record::Fields {
                filter: "agg.buckets".into(),
                fields: vec![Field { key: "web-1".into(), count: 3 }],
            },
            Record::Body {
                filter: "hits.hits._source".into(),
                text: "{\n    \"a\": 1\n}".into(),
            },
        ];
        let text = render_text("errors", &records);
        assert!(text.starts_with("Rule: errors\n"));
        assert!(text.contains("Filter path: agg.buckets\n  - web-1: 3\n"));
        assert!(text.contains("Filter path: hits.hits._source\n{\n    \"a\": 1\n}\n"));
    }

    #[tokio::test]
    async fn test_message_has_all_recipients() {
        let method = EmailMethod::new(config()).unwrap();
        let msg = method.build_message("errors", &[]).unwrap();
        let raw = String::from_utf8(msg.formatted()).unwrap();
        assert!(raw.contains("ops@example.com"));
        assert!(raw.contains("oncall@example.com"));
        assert!(raw.contains("Subject: Elasticsearch alert: errors"));
    }

    #[test]
    fn test_bad_addresses_rejected() {
        let mut cfg = config();
        cfg.from = "not an address".into();
        assert!(EmailMethod::new(cfg).is_err());

        let mut cfg = config();
        cfg.to.clear();
        assert!(EmailMethod::new(cfg).is_err());

        let mut cfg = config();
        cfg.to = vec!["nope".into()];
        assert!(EmailMethod::new(cfg).is_err());
    }
}
