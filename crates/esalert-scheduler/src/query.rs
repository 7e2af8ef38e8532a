//! Query runner: one per rule, fires on the rule's schedule.

use chrono::Utc;
use esalert_core::{Alert, AlertError, AlertMethod, Condition, Result, RuleConfig};
use serde_json::{Map, Value};
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::client::SearchBackend;
use crate::cron::Schedule;
use crate::transform::process;

/// Everything a [`QueryHandler`] needs, assembled by the caller.
pub struct QueryHandlerConfig {
    pub name: String,
    pub methods: Vec<Arc<dyn AlertMethod>>,
    pub backend: Arc<dyn SearchBackend>,
    pub index: String,
    pub body: Map<String, Value>,
    pub schedule: String,
    pub body_field: Option<String>,
    pub filters: Vec<String>,
    pub conditions: Vec<Condition>,
}

impl QueryHandlerConfig {
    /// Combine a parsed rule with its built methods and a search backend.
    pub fn from_rule(
        rule: &RuleConfig,
        backend: Arc<dyn SearchBackend>,
        methods: Vec<Arc<dyn AlertMethod>>,
    ) -> Self {
        Self {
            name: rule.name.clone(),
            methods,
            backend,
            index: rule.index.clone(),
            body: rule.body.clone(),
            schedule: rule.schedule.clone(),
            body_field: rule.body_field.clone(),
            filters: rule.filters.clone(),
            conditions: rule.conditions.clone(),
        }
    }

    fn validate(&self) -> Result<()> {
        let mut errors = Vec::new();
        if self.name.is_empty() {
            errors.push("no rule name provided");
        }
        if self.index.is_empty() {
            errors.push("no Elasticsearch index provided");
        }
        if self.methods.is_empty() {
            errors.push("at least one alert method must be specified");
        }
        if self.body.is_empty() {
            errors.push("no query body provided");
        }
        if errors.is_empty() {
            Ok(())
        } else {
            Err(AlertError::Config(errors.join("; ")))
        }
    }
}

/// Runs one rule's query on schedule and turns hits into alerts.
pub struct QueryHandler {
    name: String,
    hostname: String,
    methods: Vec<Arc<dyn AlertMethod>>,
    backend: Arc<dyn SearchBackend>,
    index: String,
    body: Map<String, Value>,
    schedule: Schedule,
    body_field: Option<String>,
    filters: Vec<String>,
    conditions: Vec<Condition>,
}

impl QueryHandler {
    pub fn new(config: QueryHandlerConfig) -> Result<Self> {
        config.validate()?;

        let hostname = hostname::get()
            .map_err(|e| AlertError::Config(format!("error getting hostname: {e}")))?
            .to_string_lossy()
            .into_owned();

        let schedule = Schedule::parse(&config.schedule)?;

        Ok(Self {
            name: config.name,
            hostname,
            methods: config.methods,
            backend: config.backend,
            index: config.index,
            body: config.body,
            schedule,
            body_field: config.body_field,
            filters: config.filters,
            conditions: config.conditions,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Loop until `cancel` fires, pushing one alert per productive cycle.
    ///
    /// A full `alerts` channel makes this wait; a slow dispatcher can make a
    /// rule miss its next window.
    pub async fn run(self, alerts: mpsc::Sender<Alert>, cancel: CancellationToken) {
        tracing::info!(rule = %self.name, host = %self.hostname, "⏰ Query runner started");
        loop {
            let now = Utc::now();
            let Some(next) = self.schedule.next_after(now) else {
                tracing::warn!(rule = %self.name, "⏰ Schedule has no upcoming run, stopping");
                return;
            };
            let wait = (next - now).to_std().unwrap_or_default();

            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = tokio::time::sleep(wait) => {}
            }

            let alert = match self.run_once().await {
                Ok(Some(alert)) => alert,
                Ok(None) => continue,
                Err(e) => {
                    tracing::error!(rule = %self.name, "❌ Query cycle failed: {e}");
                    continue;
                }
            };

            tokio::select! {
                _ = cancel.cancelled() => break,
                sent = alerts.send(alert) => {
                    if sent.is_err() {
                        tracing::warn!(rule = %self.name, "Alert intake closed, stopping");
                        return;
                    }
                }
            }
        }
        tracing::info!(rule = %self.name, "🛑 Query runner stopped");
    }

    /// Run one search and build the alert, if any.
    pub async fn run_once(&self) -> Result<Option<Alert>> {
        let response = self.backend.search(&self.index, &self.body).await?;
        let out = process(
            &response,
            &self.filters,
            self.body_field.as_deref(),
            &self.conditions,
        )?;

        if out.is_empty() {
            tracing::debug!(rule = %self.name, "No matches this cycle");
            return Ok(None);
        }

        let alert = Alert {
            id: uuid::Uuid::new_v4().to_string(),
            rule_name: self.name.clone(),
            methods: self.methods.clone(),
            records: out.records,
        };
        tracing::info!(
            rule = %self.name,
            alert_id = %alert.id,
            records = alert.records.len(),
            hits = out.hits.len(),
            "🔔 Rule fired"
        );
        Ok(Some(alert))
    }
}
