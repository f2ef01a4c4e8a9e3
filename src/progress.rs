//! Progress-callback trait for pipeline events.
//!
//! Inject an [`Arc<dyn PipelineProgressCallback>`] via
//! [`crate::config::PipelineConfigBuilder::progress_callback`] to observe a
//! run: every state transition of the orchestrator, the stored object once
//! the upload lands, and every manifest query while the job is translating.
//!
//! # Example
//!
//! ```rust
//! use forge2view::{PipelineConfig, PipelineProgressCallback, PipelineState};
//! use std::sync::{Arc, atomic::{AtomicU32, Ordering}};
//!
//! struct PollCounter {
//!     polls: AtomicU32,
//! }
//!
//! impl PipelineProgressCallback for PollCounter {
//!     fn on_poll(&self, attempt: u32, progress: &str) {
//!         self.polls.store(attempt, Ordering::SeqCst);
//!         eprintln!("poll #{attempt}: {progress}");
//!     }
//! }
//!
//! let config = PipelineConfig::builder()
//!     .progress_callback(Arc::new(PollCounter { polls: AtomicU32::new(0) }))
//!     .build()
//!     .unwrap();
//! ```

use crate::orchestrator::PipelineState;
use crate::types::{StoredObject, ViewableReference};
use std::sync::Arc;

/// Called by the orchestrator as a run advances.
///
/// All methods have default no-op implementations so callers only override
/// what they care about. Implementations must be `Send + Sync`: a session
/// may be shared across tasks, each running its own upload.
pub trait PipelineProgressCallback: Send + Sync {
    /// Called on every transition, including the final `Resolved` or `Failed`.
    fn on_state_change(&self, state: &PipelineState) {
        let _ = state;
    }

    /// Called once the object is stored.
    fn on_upload_complete(&self, object: &StoredObject) {
        let _ = object;
    }

    /// Called after each manifest query.
    ///
    /// # Arguments
    /// * `attempt`: 1-indexed query number
    /// * `progress`: raw `progress` field, e.g. `"25% complete"`
    fn on_poll(&self, attempt: u32, progress: &str) {
        let _ = (attempt, progress);
    }

    /// Called once with the reference handed to the presentation layer.
    fn on_resolved(&self, viewable: &ViewableReference) {
        let _ = viewable;
    }

    /// Called once when the run fails.
    ///
    /// # Arguments
    /// * `kind`: [`crate::ForgeError::kind`] of the triggering error
    /// * `message`: human-readable error description
    fn on_failed(&self, kind: &str, message: &str) {
        let _ = (kind, message);
    }
}

/// A no-op implementation for callers that don't need progress events.
pub struct NoopProgressCallback;

impl PipelineProgressCallback for NoopProgressCallback {}

/// Convenience alias matching the type stored in [`crate::config::PipelineConfig`].
pub type ProgressCallback = Arc<dyn PipelineProgressCallback>;
