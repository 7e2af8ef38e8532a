//! Error types shared across esalert crates.

/// Everything that can go wrong between loading a rule and delivering an alert.
#[derive(Debug, thiserror::Error)]
pub enum AlertError {
    /// Malformed main configuration or rule file. Fatal at load time.
    #[error("config: {0}")]
    Config(String),

    /// A condition failed validation.
    #[error("condition: {0}")]
    Condition(String),

    /// A cron expression could not be parsed.
    #[error("schedule: {0}")]
    Schedule(String),

    /// The search request failed or returned an error status.
    #[error("query: {0}")]
    Query(String),

    /// Hits could not be rendered into a body record.
    #[error("render: {0}")]
    Render(String),

    /// A delivery method failed to write an alert.
    #[error("delivery via {method}: {reason}")]
    Delivery { method: String, reason: String },

    #[error("io: {0}")]
    Io(#[from] std::io::Error),

    #[error("json: {0}")]
    Json(#[from] serde_json::Error),

    #[error("http: {0}")]
    Http(String),
}

impl AlertError {
    /// Shorthand for a delivery failure.
    pub fn delivery(method: &str, reason: impl std::fmt::Display) -> Self {
        Self::Delivery {
            method: method.to_string(),
            reason: reason.to_string(),
        }
    }
}

pub type Result<T> = std::result::Result<T, AlertError>;
