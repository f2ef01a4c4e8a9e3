//! # forge2view
//!
//! Upload a design file to Autodesk's cloud, translate it into a viewable
//! derivative, and hand back what an embedded viewer needs to display it.
//!
//! ## Why this crate?
//!
//! Getting a CAD file in front of a browser viewer takes five remote calls
//! across three services, an opaque id format, and a job that finishes
//! whenever it finishes. This crate runs that flow as one typed pipeline and
//! ships the small CORS relay the browser needs for the one call it cannot
//! make directly.
//!
//! ## Pipeline Overview
//!
//! ```text
//! file
//!  │
//!  ├─ 1. Auth     client-credentials exchange → bearer token (once per session)
//!  ├─ 2. Storage  create transient container (409 = already ours), PUT bytes
//!  ├─ 3. Encode   objectId → base64url urn
//!  ├─ 4. Submit   POST job through the relay
//!  ├─ 5. Poll     manifest every interval until progress == "complete"
//!  └─ 6. Resolve  {derivedId, urn, credential} for the viewer
//! ```
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use forge2view::{translate_file, PipelineConfig};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     // FORGE_CLIENT_ID / FORGE_CLIENT_SECRET, optional FORGE_API_URL / FORGE_RELAY_URL
//!     let config = PipelineConfig::from_env()?;
//!     let output = translate_file("drawing.dwg", &config).await?;
//!     println!("{}", serde_json::to_string_pretty(&output.viewable)?);
//!     eprintln!("{} polls, {}ms", output.stats.poll_count, output.stats.total_ms);
//!     Ok(())
//! }
//! ```
//!
//! Several uploads can share one credential through a [`Session`]:
//!
//! ```rust,no_run
//! use forge2view::{CancelToken, PipelineConfig, Session, UploadRequest};
//!
//! # async fn run() -> Result<(), forge2view::ForgeError> {
//! let session = Session::open(PipelineConfig::from_env()?).await?;
//! let (handle, token) = CancelToken::pair();
//! let upload = UploadRequest::from_path("site-plan.dwg").await?;
//! let output = session.translate(upload, &token).await?;
//! # drop(handle);
//! # let _ = output;
//! # Ok(())
//! # }
//! ```
//!
//! ## Feature Flags
//!
//! | Feature | Default | Description |
//! |---------|---------|-------------|
//! | `cli`   | on      | Enables the `forge2view` and `forge-relay` binaries (clap + anyhow + tracing-subscriber + indicatif) |
//!
//! Disable `cli` when using only the library:
//! ```toml
//! forge2view = { version = "0.1", default-features = false }
//! ```

// ── Modules ──────────────────────────────────────────────────────────────

pub mod cancel;
pub mod config;
pub mod error;
pub mod orchestrator;
pub mod pipeline;
pub mod progress;
pub mod relay;
pub mod types;

// ── Re-exports ───────────────────────────────────────────────────────────

pub use cancel::{CancelHandle, CancelToken};
pub use config::{PipelineConfig, PipelineConfigBuilder, PollPolicy};
pub use error::ForgeError;
pub use orchestrator::{translate_bytes, translate_file, PipelineState, Session, UploadRequest};
pub use progress::{NoopProgressCallback, PipelineProgressCallback, ProgressCallback};
pub use relay::RelayConfig;
pub use types::{
    BucketPolicy, ContainerStatus, Credential, JobDescriptor, JobStatus, OutputFormat,
    PipelineStats, StoredObject, TranslationJob, TranslationOutput, ViewableReference,
};
