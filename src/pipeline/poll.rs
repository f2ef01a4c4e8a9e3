//! Status polling: query the job manifest until the job finishes.
//!
//! The manifest's `progress` field reads `"0% complete"`, `"25% complete"`,
//! … and finally the sentinel `"complete"`. Only the sentinel ends the loop;
//! the manifest `status` then tells success (`"success"`) from failure
//! (`"failed"` / `"timeout"`).
//!
//! ## Loop shape
//!
//! ```text
//! query ─▶ complete? ──yes──▶ return
//!            │ no
//!            ├─ bound exceeded? ──▶ PollingTimeout
//!            └─ sleep(interval) ─▶ query …
//! ```
//!
//! The sleep sits between the end of one query and the start of the next, so
//! N queries cost N−1 intervals. A failed query aborts the loop; it is not
//! retried. With [`PollPolicy::unbounded`] a job that never completes is
//! polled forever; the default policy caps the attempts.

use crate::cancel::CancelToken;
use crate::config::PollPolicy;
use crate::error::ForgeError;
use crate::progress::ProgressCallback;
use crate::types::{Credential, JobStatus, TranslationJob};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Instant;
use tokio::time::sleep;
use tracing::{debug, info};

/// Value of `progress` once the job has finished, successfully or not.
pub const COMPLETION_SENTINEL: &str = "complete";

/// The subset of a job manifest the poller reads.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Manifest {
    #[serde(default)]
    pub status: String,
    #[serde(default)]
    pub progress: String,
}

impl Manifest {
    pub fn new(status: impl Into<String>, progress: impl Into<String>) -> Self {
        Self {
            status: status.into(),
            progress: progress.into(),
        }
    }

    pub fn is_complete(&self) -> bool {
        self.progress == COMPLETION_SENTINEL
    }

    pub fn job_status(&self) -> JobStatus {
        if self.is_complete() {
            return match self.status.as_str() {
                "failed" | "timeout" => JobStatus::Failed,
                _ => JobStatus::Complete,
            };
        }
        match self.status.as_str() {
            "pending" | "" if self.progress_percent() == 0 => JobStatus::Pending,
            _ => JobStatus::InProgress,
        }
    }

    /// `"complete"` → 100, `"42% complete"` → 42, anything else → 0.
    pub fn progress_percent(&self) -> u8 {
        if self.is_complete() {
            return 100;
        }
        self.progress
            .split('%')
            .next()
            .and_then(|n| n.trim().parse::<u8>().ok())
            .map(|n| n.min(100))
            .unwrap_or(0)
    }
}

/// Where manifests come from. The HTTP implementation is
/// [`HttpManifestSource`]; tests substitute scripted sequences.
#[async_trait]
pub trait ManifestSource: Send + Sync {
    /// Fetch the current manifest, or a human-readable failure.
    async fn fetch_manifest(&self, credential: &Credential, job_id: &str)
        -> Result<Manifest, String>;
}

/// Reads `GET {api_url}/modelderivative/v2/designdata/{job_id}/manifest`.
#[derive(Debug, Clone)]
pub struct HttpManifestSource {
    client: reqwest::Client,
    api_url: String,
}

impl HttpManifestSource {
    pub fn new(client: reqwest::Client, api_url: impl Into<String>) -> Self {
        Self {
            client,
            api_url: api_url.into(),
        }
    }
}

#[async_trait]
impl ManifestSource for HttpManifestSource {
    async fn fetch_manifest(
        &self,
        credential: &Credential,
        job_id: &str,
    ) -> Result<Manifest, String> {
        let url = format!(
            "{}/modelderivative/v2/designdata/{}/manifest",
            self.api_url, job_id
        );
        let response = self
            .client
            .get(&url)
            .bearer_auth(&credential.token)
            .send()
            .await
            .map_err(|e| e.to_string())?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(format!("HTTP {}: {}", status.as_u16(), body));
        }
        response
            .json::<Manifest>()
            .await
            .map_err(|e| format!("Unreadable manifest: {e}"))
    }
}

/// A job that reached a terminal state, and how many queries it took.
#[derive(Debug, Clone)]
pub struct Completion {
    pub job: TranslationJob,
    pub attempts: u32,
}

/// Poll until `job` reaches a terminal state.
///
/// Returns `Ok` for both terminal states; callers must check
/// `completion.job.status` before treating the job as translated.
///
/// # Errors
/// - [`ForgeError::Polling`] when a query fails (loop aborted).
/// - [`ForgeError::PollingTimeout`] when `policy` bounds are exceeded.
/// - [`ForgeError::Cancelled`] when `cancel` fires.
pub async fn await_completion(
    source: &dyn ManifestSource,
    credential: &Credential,
    mut job: TranslationJob,
    policy: &PollPolicy,
    cancel: &CancelToken,
    progress: Option<&ProgressCallback>,
) -> Result<Completion, ForgeError> {
    let start = Instant::now();
    let mut attempts: u32 = 0;
    let cancelled = |job: &TranslationJob| ForgeError::Cancelled {
        stage: "polling",
        target: job.job_id.clone(),
    };

    loop {
        if cancel.is_cancelled() {
            return Err(cancelled(&job));
        }

        attempts += 1;
        let fetched = tokio::select! {
            r = source.fetch_manifest(credential, &job.job_id) => r,
            _ = cancel.cancelled() => return Err(cancelled(&job)),
        };
        let manifest = fetched.map_err(|detail| ForgeError::Polling {
            job_id: job.job_id.clone(),
            detail,
        })?;

        if let Some(cb) = progress {
            cb.on_poll(attempts, &manifest.progress);
        }

        job.status = manifest.job_status();
        job.progress_percent = manifest.progress_percent();
        debug!(
            "Poll {}: job {} is {} ({})",
            attempts, job.job_id, job.status, manifest.progress
        );

        if manifest.is_complete() {
            info!(
                "Job {} finished as {} after {} polls",
                job.job_id, job.status, attempts
            );
            return Ok(Completion { job, attempts });
        }

        let elapsed = start.elapsed();
        let attempts_exhausted = policy.max_attempts.is_some_and(|max| attempts >= max);
        let time_exhausted = policy.timeout.is_some_and(|t| elapsed >= t);
        if attempts_exhausted || time_exhausted {
            return Err(ForgeError::PollingTimeout {
                job_id: job.job_id.clone(),
                attempts,
                elapsed_ms: elapsed.as_millis() as u64,
            });
        }

        let delay = match policy.timeout {
            Some(t) => policy.interval.min(t.saturating_sub(elapsed)),
            None => policy.interval,
        };
        tokio::select! {
            _ = sleep(delay) => {}
            _ = cancel.cancelled() => return Err(cancelled(&job)),
        }
    }
}
