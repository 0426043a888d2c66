//! Progress reporting for batch enrichment.
//!
//! The pipeline reports through [`ProgressCallback`] and never renders
//! anything itself; the CLI supplies an `indicatif` implementation.

use std::sync::Arc;

/// Receives progress updates from a batch run.
///
/// Implementations must be `Send + Sync`: listings are enriched
/// concurrently and all of them report into one shared callback.
pub trait ProgressCallback: Send + Sync {
    /// Sets the total number of listings.
    fn set_total(&self, total: u64);

    /// Advances by `delta` listings.
    fn inc(&self, delta: u64);

    /// Updates the status message.
    fn set_message(&self, msg: String);

    /// Marks the run complete with a final message.
    fn finish(&self, msg: String);
}

/// Discards all progress updates.
pub struct NullProgress;

impl ProgressCallback for NullProgress {
    fn set_total(&self, _total: u64) {}
    fn inc(&self, _delta: u64) {}
    fn set_message(&self, _msg: String) {}
    fn finish(&self, _msg: String) {}
}

/// Returns a shared [`NullProgress`].
#[must_use]
pub fn null_progress() -> Arc<dyn ProgressCallback> {
    Arc::new(NullProgress)
}
