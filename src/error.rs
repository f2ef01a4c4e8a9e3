//! Error type for the forge2view library.
//!
//! Every pipeline stage surfaces exactly one [`ForgeError`] to its caller and
//! the orchestrator never catches and continues: the first failure ends the
//! run for that upload. Variants are grouped by the stage that raises them so
//! a caller can tell whether the whole session is unusable
//! ([`ForgeError::is_session_fatal`]) or only the current upload failed.
//!
//! HTTP failures keep the upstream status code and response body because the
//! derivative and storage services put the useful diagnosis in the body
//! (`{"reason": "...", "diagnostic": "..."}`), not in the status line.

use std::path::PathBuf;
use thiserror::Error;

/// All errors returned by the forge2view library.
#[derive(Debug, Error)]
pub enum ForgeError {
    // ── Session errors ────────────────────────────────────────────────────
    /// Missing or invalid configuration, detected before any network call.
    #[error("Invalid configuration: {0}")]
    Configuration(String),

    /// The credential exchange was rejected or returned no token.
    #[error(
        "Authentication failed{}: {detail}\nCheck FORGE_CLIENT_ID / FORGE_CLIENT_SECRET and the requested scope.",
        fmt_status(.status)
    )]
    Authentication { status: Option<u16>, detail: String },

    // ── Storage errors ────────────────────────────────────────────────────
    /// Container creation failed for a reason other than "already exists".
    #[error("Failed to create bucket '{bucket_key}'{}: {detail}", fmt_status(.status))]
    Storage {
        bucket_key: String,
        status: Option<u16>,
        detail: String,
    },

    /// The object PUT was rejected or its response could not be read.
    #[error("Failed to upload '{object_name}'{}: {detail}", fmt_status(.status))]
    Upload {
        object_name: String,
        status: Option<u16>,
        detail: String,
    },

    // ── Translation errors ────────────────────────────────────────────────
    /// The relay or the derivative service refused the translation job.
    #[error("Translation job submission failed{}: {detail}", fmt_status(.status))]
    Submission { status: Option<u16>, detail: String },

    /// A manifest query failed; the remote job may still be running.
    #[error("Polling job '{job_id}' failed: {detail}\nThe remote job may still be running.")]
    Polling { job_id: String, detail: String },

    /// The poll policy bound was exceeded before the job finished.
    #[error("Job '{job_id}' still running after {attempts} polls ({elapsed_ms}ms)\nIncrease --max-polls or --poll-timeout.")]
    PollingTimeout {
        job_id: String,
        attempts: u32,
        elapsed_ms: u64,
    },

    /// The caller cancelled the run. `target` is the bucket, object or job
    /// the interrupted stage was working on.
    #[error("Run cancelled during {stage} of '{target}'")]
    Cancelled { stage: &'static str, target: String },

    /// The job reached its terminal state without producing derivatives.
    #[error("Translation of job '{job_id}' ended with status '{status}'")]
    TranslationFailed { job_id: String, status: String },

    /// The object id does not have the `urn:<ns>:os.object:<bucket>/<name>` shape.
    #[error("Unexpected object id '{object_id}': expected urn:<namespace>:os.object:<bucket>/<object>")]
    InvalidObjectId { object_id: String },

    // ── I/O errors ────────────────────────────────────────────────────────
    /// Could not read the local input file.
    #[error("Failed to read input file '{path}': {source}")]
    FileRead {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    // ── Catch-all ─────────────────────────────────────────────────────────
    /// Unexpected internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl ForgeError {
    /// Stable name of the error kind, suitable for logs and JSON reports.
    pub fn kind(&self) -> &'static str {
        match self {
            ForgeError::Configuration(_) => "ConfigurationError",
            ForgeError::Authentication { .. } => "AuthenticationError",
            ForgeError::Storage { .. } => "StorageError",
            ForgeError::Upload { .. } => "UploadError",
            ForgeError::Submission { .. } => "SubmissionError",
            ForgeError::Polling { .. } => "PollingError",
            ForgeError::PollingTimeout { .. } => "PollingTimeoutError",
            ForgeError::Cancelled { .. } => "CancelledError",
            ForgeError::TranslationFailed { .. } => "TranslationFailedError",
            ForgeError::InvalidObjectId { .. } => "InvalidObjectIdError",
            ForgeError::FileRead { .. } => "FileReadError",
            ForgeError::Internal(_) => "InternalError",
        }
    }

    /// `true` when the session itself is unusable and every later upload
    /// would fail the same way.
    pub fn is_session_fatal(&self) -> bool {
        matches!(
            self,
            ForgeError::Configuration(_) | ForgeError::Authentication { .. }
        )
    }

    /// Upstream HTTP status, when the failure came from a remote response.
    pub fn status(&self) -> Option<u16> {
        match self {
            ForgeError::Authentication { status, .. }
            | ForgeError::Storage { status, .. }
            | ForgeError::Upload { status, .. }
            | ForgeError::Submission { status, .. } => *status,
            _ => None,
        }
    }
}

fn fmt_status(status: &Option<u16>) -> String {
    status.map(|s| format!(" (HTTP {s})")).unwrap_or_default()
}
