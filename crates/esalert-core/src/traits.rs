//! The delivery capability every output implements.

use async_trait::async_trait;

use crate::error::Result;
use crate::types::Record;

/// Writes an alert's records somewhere and reports success or failure.
///
/// Retries replay the exact same arguments, so implementations must be safe
/// to call repeatedly with identical input.
#[async_trait]
pub trait AlertMethod: Send + Sync {
    /// Short name used in logs ("file", "slack", ...).
    fn name(&self) -> &str;

    async fn write(&self, rule_name: &str, records: &[Record]) -> Result<()>;
}
