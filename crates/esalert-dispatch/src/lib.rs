//! # esalert dispatch
//!
//! Delivery side of the pipeline: the dispatch engine, the per-delivery retry
//! inventory and the concrete outputs.
//!
//! ## Architecture
//! ```text
//! Alert ──► DispatchEngine
//!             ├── Inventory: "0|<alert id>" → attempts left
//!             ├── retry queue (bounded, 8 by default)
//!             └── AlertMethod::write
//!                   ├── file    (JSON lines)
//!                   ├── webhook (HTTP POST)
//!                   ├── slack   (incoming webhook)
//!                   └── email   (SMTP)
//! ```

pub mod engine;
pub mod inventory;
pub mod outputs;

pub use engine::{Backoff, DispatchEngine, DispatchHandle};
pub use inventory::{DEFAULT_BUDGET, DeliveryId, Inventory};
pub use outputs::{build_method, build_methods};
