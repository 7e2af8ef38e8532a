//! esalert configuration system.
//!
//! The main config is TOML (`~/.esalert/config.toml`); rules are JSON files
//! in the rules directory because their query bodies are Elasticsearch JSON.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::path::{Path, PathBuf};

use crate::condition::Condition;
use crate::error::{AlertError, Result};

/// Overrides the main config path.
pub const ENV_CONFIG_FILE: &str = "ESALERT_CONFIG_FILE";
/// Overrides the rules directory.
pub const ENV_RULES_DIR: &str = "ESALERT_RULES_DIR";

/// Root configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AlertConfig {
    pub elasticsearch: ElasticsearchConfig,
    #[serde(default = "default_rules_dir")]
    pub rules_dir: String,
    #[serde(default)]
    pub dispatch: DispatchConfig,
}

fn default_rules_dir() -> String { "~/.esalert/rules".into() }

impl AlertConfig {
    /// Load config from `$ESALERT_CONFIG_FILE`, or the default path.
    pub fn load() -> Result<Self> {
        let path = std::env::var(ENV_CONFIG_FILE)
            .map(|p| PathBuf::from(expand_path(&p)))
            .unwrap_or_else(|_| Self::default_path());
        Self::load_from(&path)
    }

    /// Load config from a specific path.
    pub fn load_from(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            AlertError::Config(format!("Failed to read config {}: {e}", path.display()))
        })?;
        let config = Self::from_toml(&content)
            .map_err(|e| AlertError::Config(format!("error in main configuration file {}: {e}", path.display())))?;
        Ok(config)
    }

    /// Parse and validate config from TOML text.
    pub fn from_toml(content: &str) -> Result<Self> {
        let mut config: Self = toml::from_str(content)
            .map_err(|e| AlertError::Config(format!("Failed to parse config: {e}")))?;
        config.elasticsearch.validate()?;
        config.dispatch.validate()?;
        config.elasticsearch.server.url = config.elasticsearch.server.url.trim_end_matches('/').to_string();
        Ok(config)
    }

    /// Rules directory, honoring `$ESALERT_RULES_DIR`.
    pub fn rules_path(&self) -> PathBuf {
        let dir = std::env::var(ENV_RULES_DIR).unwrap_or_else(|_| self.rules_dir.clone());
        PathBuf::from(expand_path(&dir))
    }

    /// Get the default config path.
    pub fn default_path() -> PathBuf {
        Self::home_dir().join("config.toml")
    }

    /// Get the esalert home directory.
    pub fn home_dir() -> PathBuf {
        dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(".esalert")
    }
}

/// Expand `~` and environment variables in a path.
pub fn expand_path(p: &str) -> String {
    shellexpand::full(p)
        .map(|s| s.to_string())
        .unwrap_or_else(|_| shellexpand::tilde(p).to_string())
}

/// Where and how to reach Elasticsearch.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ElasticsearchConfig {
    pub server: ServerConfig,
    #[serde(default)]
    pub client: ClientConfig,
}

impl ElasticsearchConfig {
    fn validate(&self) -> Result<()> {
        if self.server.url.trim().is_empty() {
            return Err(AlertError::Config("no 'elasticsearch.server.url' field found".into()));
        }
        self.client.validate()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Base URL of the cluster, e.g. `https://es.internal:9200`.
    pub url: String,
}

/// HTTP client settings: TLS material, credentials and timeout.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClientConfig {
    #[serde(default)]
    pub tls_enabled: bool,
    #[serde(default)]
    pub ca_cert: String,
    #[serde(default)]
    pub client_cert: String,
    #[serde(default)]
    pub client_key: String,
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub password: String,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

fn default_timeout_secs() -> u64 { 30 }

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            tls_enabled: false,
            ca_cert: String::new(),
            client_cert: String::new(),
            client_key: String::new(),
            username: String::new(),
            password: String::new(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

impl ClientConfig {
    fn validate(&self) -> Result<()> {
        if !self.tls_enabled {
            return Ok(());
        }
        if self.ca_cert.is_empty() {
            return Err(AlertError::Config("no path to CA certificate".into()));
        }
        if self.client_cert.is_empty() {
            return Err(AlertError::Config("no path to client certificate".into()));
        }
        if self.client_key.is_empty() {
            return Err(AlertError::Config("no path to client key".into()));
        }
        Ok(())
    }
}

/// Dispatch engine tuning.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DispatchConfig {
    /// Delivery attempts per (alert, method) pair.
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    /// Capacity of the retry-ready queue. Writers block when it is full.
    #[serde(default = "default_retry_queue_capacity")]
    pub retry_queue_capacity: usize,
    /// Capacity of the channel query runners push alerts into.
    #[serde(default = "default_intake_capacity")]
    pub intake_capacity: usize,
    /// Backoff unit; a failed delivery waits between 1 and 3 units.
    #[serde(default = "default_backoff_unit_ms")]
    pub backoff_unit_ms: u64,
}

fn default_max_attempts() -> u32 { 3 }
fn default_retry_queue_capacity() -> usize { 8 }
fn default_intake_capacity() -> usize { 1024 }
fn default_backoff_unit_ms() -> u64 { 1000 }

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            retry_queue_capacity: default_retry_queue_capacity(),
            intake_capacity: default_intake_capacity(),
            backoff_unit_ms: default_backoff_unit_ms(),
        }
    }
}

impl DispatchConfig {
    fn validate(&self) -> Result<()> {
        if self.max_attempts == 0 {
            return Err(AlertError::Config("'dispatch.max_attempts' must be at least 1".into()));
        }
        if self.retry_queue_capacity == 0 || self.intake_capacity == 0 {
            return Err(AlertError::Config("dispatch queue capacities must be at least 1".into()));
        }
        Ok(())
    }
}

/// One alerting rule, as written in a rules file.
#[derive(Debug, Clone, Deserialize)]
pub struct RuleConfig {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub schedule: String,
    #[serde(default)]
    pub index: String,
    /// Query body; either a JSON object or a string holding one.
    #[serde(default, deserialize_with = "deserialize_body")]
    pub body: Map<String, Value>,
    #[serde(default)]
    pub filters: Vec<String>,
    #[serde(default)]
    pub body_field: Option<String>,
    #[serde(default)]
    pub outputs: Vec<OutputConfig>,
    /// Conditions as written in the rule file.
    #[serde(default, rename = "conditions")]
    pub raw_conditions: Vec<Map<String, Value>>,
    /// Typed conditions, resolved by [`RuleConfig::validate`].
    #[serde(skip)]
    pub conditions: Vec<Condition>,
}

impl RuleConfig {
    /// Parse and validate one rule from JSON text.
    pub fn from_json(content: &str) -> Result<Self> {
        let mut rule: Self = serde_json::from_str(content)?;
        rule.validate()?;
        Ok(rule)
    }

    /// Check required fields and outputs, then resolve the raw conditions.
    pub fn validate(&mut self) -> Result<()> {
        if self.name.is_empty() {
            return Err(AlertError::Config("no 'name' field found".into()));
        }
        if self.index.is_empty() {
            return Err(AlertError::Config("no 'index' field found".into()));
        }
        if self.schedule.is_empty() {
            return Err(AlertError::Config("no 'schedule' field found".into()));
        }
        if self.outputs.is_empty() {
            return Err(AlertError::Config(
                "at least one output must be specified ('outputs')".into(),
            ));
        }
        for (i, output) in self.outputs.iter().enumerate() {
            output.validate().map_err(|e| {
                AlertError::Config(format!("error in output {} of rule {}: {e}", i + 1, self.name))
            })?;
        }
        let mut conditions = Vec::with_capacity(self.raw_conditions.len());
        for (i, raw) in self.raw_conditions.iter().enumerate() {
            let condition = Condition::try_from(raw.clone()).map_err(|e| {
                AlertError::Config(format!("error in condition {} of rule {}: {e}", i + 1, self.name))
            })?;
            conditions.push(condition);
        }
        self.conditions = conditions;
        Ok(())
    }
}

fn deserialize_body<'de, D>(deserializer: D) -> std::result::Result<Map<String, Value>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    use serde::de::Error;

    match Value::deserialize(deserializer)? {
        Value::Object(map) => Ok(map),
        Value::String(s) => match serde_json::from_str::<Value>(&s) {
            Ok(Value::Object(map)) => Ok(map),
            Ok(_) => Err(D::Error::custom("'body' field must be a JSON object")),
            Err(e) => Err(D::Error::custom(format!("error JSON-decoding 'body' field: {e}"))),
        },
        Value::Null => Ok(Map::new()),
        _ => Err(D::Error::custom("'body' field must be valid JSON")),
    }
}

/// One delivery method attached to a rule.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutputConfig {
    #[serde(rename = "type", default)]
    pub output_type: String,
    #[serde(default)]
    pub config: Map<String, Value>,
}

impl OutputConfig {
    fn validate(&self) -> Result<()> {
        if self.output_type.is_empty() {
            return Err(AlertError::Config(
                "all outputs must have a type specified ('output.type')".into(),
            ));
        }
        if self.config.is_empty() {
            return Err(AlertError::Config(
                "all outputs must have a config field ('output.config')".into(),
            ));
        }
        Ok(())
    }
}

/// Load every `*.json` rule in `dir`, sorted by file name.
pub fn load_rules(dir: &Path) -> Result<Vec<RuleConfig>> {
    let entries = std::fs::read_dir(dir).map_err(|e| {
        AlertError::Config(format!("error reading rules dir {}: {e}", dir.display()))
    })?;

    let mut files: Vec<PathBuf> = entries
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter(|p| p.is_file() && p.extension().is_some_and(|ext| ext == "json"))
        .collect();
    files.sort();

    let mut rules = Vec::with_capacity(files.len());
    for file in files {
        let content = match std::fs::read_to_string(&file) {
            Ok(c) => c,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => continue,
            Err(e) => {
                return Err(AlertError::Config(format!(
                    "error opening file {}: {e}",
                    file.display()
                )));
            }
        };
        let rule = RuleConfig::from_json(&content).map_err(|e| {
            AlertError::Config(format!("error in rule file {}: {e}", file.display()))
        })?;
        tracing::debug!("📄 Loaded rule '{}' from {}", rule.name, file.display());
        rules.push(rule);
    }
    Ok(rules)
}
