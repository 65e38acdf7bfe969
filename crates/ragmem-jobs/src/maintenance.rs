//! Periodic maintenance run by the ingestion worker between documents.

use async_trait::async_trait;

use ragmem_core::Result;

/// A task the worker runs on a fixed interval, such as the memory expiry sweep.
#[async_trait]
pub trait PeriodicTask: Send + Sync {
    /// Short label for logs and events.
    fn name(&self) -> &'static str;

    /// Run once, returning how many items were affected.
    async fn run(&self) -> Result<u64>;
}
