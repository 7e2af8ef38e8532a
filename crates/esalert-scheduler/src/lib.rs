//! # esalert scheduler
//!
//! The query side of the pipeline: cron schedules, the search client, response
//! flattening, condition checks and record building.
//!
//! ## Architecture
//! ```text
//! QueryHandler (one per rule)
//!   ├── Schedule: "*/5 * * * *" → next fire time
//!   ├── SearchBackend: POST {index}/_search
//!   └── transform::process
//!         ├── conditions_met (any / all / none)
//!         ├── filters → field records
//!         └── body field → body record
//!   → Alert → dispatch intake
//! ```

pub mod client;
pub mod conditions;
pub mod cron;
pub mod query;
pub mod transform;
pub mod traverse;

pub use client::{EsClient, SearchBackend};
pub use conditions::{condition_met, conditions_met};
pub use cron::Schedule;
pub use query::{QueryHandler, QueryHandlerConfig};
pub use transform::{HITS_DELIMITER, Transformed, process};
pub use traverse::flatten;
