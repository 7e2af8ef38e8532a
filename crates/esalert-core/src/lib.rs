//! # esalert core
//!
//! Types shared by the query side and the dispatch side:
//! configuration, rule conditions, alert payloads, the delivery trait and
//! the common error type.

pub mod condition;
pub mod config;
pub mod error;
pub mod traits;
pub mod types;

pub use condition::{Condition, Operand, Quantifier};
pub use config::{AlertConfig, ClientConfig, DispatchConfig, ElasticsearchConfig, OutputConfig, RuleConfig};
pub use error::{AlertError, Result};
pub use traits::AlertMethod;
pub use types::{Alert, Field, Record};
