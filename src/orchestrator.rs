//! Pipeline orchestration: one session, one credential, many uploads.
//!
//! A [`Session`] owns everything that lives as long as the credential: the
//! configuration, the HTTP client, and the token itself. Each call to
//! [`Session::translate`] runs one upload through the state machine below
//! with its own run-scoped state, so several uploads can share a session
//! without sharing any mutable state.
//!
//! ```text
//! Idle ─▶ TokenAcquired ─▶ Uploaded ─▶ JobSubmitted ─▶ Polling ─▶ Resolved
//!   └──────────┴──────────────┴────────────┴─────────────┴──────▶ Failed(reason)
//! ```
//!
//! Any stage error moves the run to `Failed` and is returned as-is. Nothing
//! is retried. Cancellation is honoured before and during every remote call,
//! not only while polling. When [`PipelineConfig::cleanup_on_failure`] is set, a
//! container this run created is deleted on the way out; submitted jobs are
//! left alone because the derivative service has no cancel call.

use crate::cancel::CancelToken;
use crate::config::PipelineConfig;
use crate::error::ForgeError;
use crate::pipeline::poll::HttpManifestSource;
use crate::pipeline::{auth, encode, poll, storage, submit};
use crate::progress::ProgressCallback;
use crate::types::{
    ContainerStatus, Credential, JobStatus, PipelineStats, TranslationJob, TranslationOutput,
    ViewableReference,
};
use std::fmt;
use std::future::Future;
use std::path::Path;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// Content type used when the caller does not know one.
pub const DEFAULT_CONTENT_TYPE: &str = "application/octet-stream";

/// Where a run currently is.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PipelineState {
    Idle,
    TokenAcquired,
    Uploaded,
    JobSubmitted,
    Polling,
    Resolved,
    Failed(String),
}

impl PipelineState {
    pub fn name(&self) -> &'static str {
        match self {
            PipelineState::Idle => "Idle",
            PipelineState::TokenAcquired => "TokenAcquired",
            PipelineState::Uploaded => "Uploaded",
            PipelineState::JobSubmitted => "JobSubmitted",
            PipelineState::Polling => "Polling",
            PipelineState::Resolved => "Resolved",
            PipelineState::Failed(_) => "Failed",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, PipelineState::Resolved | PipelineState::Failed(_))
    }
}

impl fmt::Display for PipelineState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PipelineState::Failed(reason) => write!(f, "Failed({reason})"),
            other => f.write_str(other.name()),
        }
    }
}

/// One file to translate.
#[derive(Clone)]
pub struct UploadRequest {
    /// Object name in the container, usually the file name.
    pub object_name: String,
    pub payload: Vec<u8>,
    /// Falls back to [`DEFAULT_CONTENT_TYPE`].
    pub content_type: Option<String>,
}

impl fmt::Debug for UploadRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("UploadRequest")
            .field("object_name", &self.object_name)
            .field("payload", &format_args!("<{} bytes>", self.payload.len()))
            .field("content_type", &self.content_type)
            .finish()
    }
}

impl UploadRequest {
    pub fn new(object_name: impl Into<String>, payload: Vec<u8>) -> Self {
        Self {
            object_name: object_name.into(),
            payload,
            content_type: None,
        }
    }

    pub fn with_content_type(mut self, content_type: impl Into<String>) -> Self {
        self.content_type = Some(content_type.into());
        self
    }

    /// Read a local file; the object name is the file name.
    pub async fn from_path(path: impl AsRef<Path>) -> Result<Self, ForgeError> {
        let path = path.as_ref();
        let object_name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .filter(|n| !n.is_empty())
            .ok_or_else(|| {
                ForgeError::Configuration(format!("'{}' has no file name", path.display()))
            })?;
        let payload = tokio::fs::read(path)
            .await
            .map_err(|e| ForgeError::FileRead {
                path: path.to_path_buf(),
                source: e,
            })?;
        Ok(Self::new(object_name, payload))
    }

    fn content_type(&self) -> &str {
        self.content_type
            .as_deref()
            .filter(|c| !c.is_empty())
            .unwrap_or(DEFAULT_CONTENT_TYPE)
    }
}

/// A credential plus everything needed to run uploads with it.
pub struct Session {
    config: PipelineConfig,
    client: reqwest::Client,
    credential: Credential,
    manifests: HttpManifestSource,
}

impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("config", &self.config)
            .field("credential", &self.credential)
            .finish_non_exhaustive()
    }
}

impl Session {
    /// Acquire the session credential.
    ///
    /// # Errors
    /// [`ForgeError::Configuration`] for missing credentials (no request is
    /// sent) and [`ForgeError::Authentication`] when the exchange fails.
    pub async fn open(config: PipelineConfig) -> Result<Self, ForgeError> {
        notify_state(config.progress_callback.as_ref(), &PipelineState::Idle);

        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .build()
            .map_err(|e| ForgeError::Internal(format!("Failed to build HTTP client: {e}")))?;

        let token = auth::acquire_token(
            &client,
            &config.token_url(),
            &config.client_id,
            &config.client_secret,
            &config.scope,
        )
        .await;
        let credential = match token {
            Ok(c) => c,
            Err(e) => {
                notify_state(
                    config.progress_callback.as_ref(),
                    &PipelineState::Failed(e.to_string()),
                );
                notify_failed(config.progress_callback.as_ref(), &e);
                return Err(e);
            }
        };

        notify_state(
            config.progress_callback.as_ref(),
            &PipelineState::TokenAcquired,
        );
        let manifests = HttpManifestSource::new(client.clone(), config.api_url.clone());

        Ok(Self {
            config,
            client,
            credential,
            manifests,
        })
    }

    pub fn credential(&self) -> &Credential {
        &self.credential
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Run one upload to completion.
    ///
    /// # Returns
    /// The viewable reference for the presentation layer, plus the stored
    /// object, the terminal job and timing stats.
    ///
    /// # Errors
    /// The first stage error, unchanged. A job that ends `failed` yields
    /// [`ForgeError::TranslationFailed`]; no viewable reference is produced.
    pub async fn translate(
        &self,
        upload: UploadRequest,
        cancel: &CancelToken,
    ) -> Result<TranslationOutput, ForgeError> {
        let mut run = Run::new(self.config.progress_callback.clone());
        info!("Starting translation: {}", upload.object_name);

        let result = self.run_steps(&mut run, upload, cancel).await;
        if let Err(ref e) = result {
            run.fail(e);
            self.cleanup(&run).await;
        }
        result
    }

    async fn run_steps(
        &self,
        run: &mut Run,
        upload: UploadRequest,
        cancel: &CancelToken,
    ) -> Result<TranslationOutput, ForgeError> {
        let total_start = Instant::now();
        let cfg = &self.config;

        // ── Step 1: Container + upload ───────────────────────────────────
        let upload_start = Instant::now();
        let bucket_key = storage::generate_bucket_key();
        let container = unless_cancelled(
            cancel,
            "container creation",
            &bucket_key,
            storage::ensure_container(
                &self.client,
                &cfg.api_url,
                &self.credential,
                &bucket_key,
                cfg.bucket_policy,
            ),
        )
        .await?;
        if container == ContainerStatus::Created {
            run.created_bucket = Some(bucket_key.clone());
        }

        let content_type = upload.content_type().to_string();
        let object_name = upload.object_name;
        let object = unless_cancelled(
            cancel,
            "upload",
            &object_name,
            storage::upload_object(
                &self.client,
                &cfg.api_url,
                &self.credential,
                &bucket_key,
                &object_name,
                upload.payload,
                &content_type,
            ),
        )
        .await?;

        let parts = encode::parse_object_id(&object.object_id)?;
        if parts.bucket_key != bucket_key {
            warn!(
                "Object id names bucket '{}', expected '{}'",
                parts.bucket_key, bucket_key
            );
        }
        let upload_ms = upload_start.elapsed().as_millis() as u64;
        run.advance(PipelineState::Uploaded);
        if let Some(cb) = run.progress.as_ref() {
            cb.on_upload_complete(&object);
        }

        // ── Step 2: Submit through the relay ─────────────────────────────
        let translate_start = Instant::now();
        let relay_job_url = cfg.relay_job_url();
        let descriptor = unless_cancelled(
            cancel,
            "job submission",
            &object.object_id,
            submit::submit_translation(
                &self.client,
                &relay_job_url,
                &self.credential,
                &object.object_id,
                &cfg.output_formats,
            ),
        )
        .await?;
        run.advance(PipelineState::JobSubmitted);

        // ── Step 3: Poll to a terminal state ─────────────────────────────
        let job = TranslationJob {
            job_id: descriptor.urn.clone(),
            input_object_id: object.object_id.clone(),
            requested_formats: cfg.output_formats.clone(),
            status: JobStatus::Pending,
            progress_percent: 0,
        };
        run.advance(PipelineState::Polling);
        let completion = poll::await_completion(
            &self.manifests,
            &self.credential,
            job,
            &cfg.poll,
            cancel,
            run.progress.as_ref(),
        )
        .await?;

        if completion.job.status != JobStatus::Complete {
            return Err(ForgeError::TranslationFailed {
                job_id: completion.job.job_id.clone(),
                status: completion.job.status.to_string(),
            });
        }
        let translate_ms = translate_start.elapsed().as_millis() as u64;

        // ── Step 4: Resolve the viewable ─────────────────────────────────
        let viewable = ViewableReference {
            derived_id: encode::derive_viewable_id(&object.object_id)?,
            urn: encode::encode_urn(&object.object_id),
            credential: self.credential.token.clone(),
        };
        run.advance(PipelineState::Resolved);
        if let Some(cb) = run.progress.as_ref() {
            cb.on_resolved(&viewable);
        }

        let stats = PipelineStats {
            poll_count: completion.attempts,
            upload_ms,
            translate_ms,
            total_ms: total_start.elapsed().as_millis() as u64,
        };
        info!(
            "Translation resolved: {} ({} polls, {}ms total)",
            viewable.derived_id, stats.poll_count, stats.total_ms
        );

        Ok(TranslationOutput {
            viewable,
            object,
            job: completion.job,
            stats,
        })
    }

    /// Delete the container this run created, if configured. Errors are
    /// logged and dropped so the original failure is what the caller sees.
    async fn cleanup(&self, run: &Run) {
        if !self.config.cleanup_on_failure {
            return;
        }
        let Some(ref bucket_key) = run.created_bucket else {
            debug!("No container created by this run; nothing to clean up");
            return;
        };
        if let Err(e) = storage::delete_container(
            &self.client,
            &self.config.api_url,
            &self.credential,
            bucket_key,
        )
        .await
        {
            warn!("Cleanup of bucket '{}' failed: {}", bucket_key, e);
        }
    }
}

/// Per-upload state, never shared between runs.
struct Run {
    state: PipelineState,
    created_bucket: Option<String>,
    progress: Option<ProgressCallback>,
}

impl Run {
    fn new(progress: Option<ProgressCallback>) -> Self {
        Self {
            state: PipelineState::TokenAcquired,
            created_bucket: None,
            progress,
        }
    }

    fn advance(&mut self, next: PipelineState) {
        debug!("{} → {}", self.state, next);
        self.state = next;
        notify_state(self.progress.as_ref(), &self.state);
    }

    fn fail(&mut self, error: &ForgeError) {
        warn!("Translation failed in state {}: {}", self.state, error);
        self.advance(PipelineState::Failed(error.to_string()));
        notify_failed(self.progress.as_ref(), error);
    }
}

/// Run `step` unless `cancel` fires first; an in-flight request is dropped.
async fn unless_cancelled<T, F>(
    cancel: &CancelToken,
    stage: &'static str,
    target: &str,
    step: F,
) -> Result<T, ForgeError>
where
    F: Future<Output = Result<T, ForgeError>>,
{
    let cancelled = || ForgeError::Cancelled {
        stage,
        target: target.to_string(),
    };
    if cancel.is_cancelled() {
        return Err(cancelled());
    }
    tokio::select! {
        biased;
        _ = cancel.cancelled() => Err(cancelled()),
        r = step => r,
    }
}

fn notify_state(progress: Option<&ProgressCallback>, state: &PipelineState) {
    if let Some(cb) = progress {
        cb.on_state_change(state);
    }
}

fn notify_failed(progress: Option<&ProgressCallback>, error: &ForgeError) {
    if let Some(cb) = progress {
        cb.on_failed(error.kind(), &error.to_string());
    }
}

/// Open a session and translate one local file.
pub async fn translate_file(
    path: impl AsRef<Path>,
    config: &PipelineConfig,
) -> Result<TranslationOutput, ForgeError> {
    let upload = UploadRequest::from_path(path).await?;
    let session = Session::open(config.clone()).await?;
    session.translate(upload, &CancelToken::never()).await
}

/// Open a session and translate an in-memory payload.
pub async fn translate_bytes(
    object_name: impl Into<String>,
    bytes: Vec<u8>,
    content_type: Option<&str>,
    config: &PipelineConfig,
) -> Result<TranslationOutput, ForgeError> {
    let mut upload = UploadRequest::new(object_name, bytes);
    if let Some(ct) = content_type {
        upload = upload.with_content_type(ct);
    }
    let session = Session::open(config.clone()).await?;
    session.translate(upload, &CancelToken::never()).await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn state_names_and_terminality() {
        assert_eq!(PipelineState::JobSubmitted.name(), "JobSubmitted");
        assert!(PipelineState::Resolved.is_terminal());
        assert!(PipelineState::Failed("x".into()).is_terminal());
        assert!(!PipelineState::Polling.is_terminal());
        assert_eq!(
            PipelineState::Failed("HTTP 500".into()).to_string(),
            "Failed(HTTP 500)"
        );
    }

    #[test]
    fn upload_request_defaults_content_type() {
        let u = UploadRequest::new("drawing.dwg", vec![0; 10]);
        assert_eq!(u.content_type(), DEFAULT_CONTENT_TYPE);
        let u = u.with_content_type("image/vnd.dwg");
        assert_eq!(u.content_type(), "image/vnd.dwg");
        assert!(format!("{u:?}").contains("<10 bytes>"));
    }

    #[tokio::test]
    async fn upload_request_from_missing_path_is_file_read_error() {
        let err = UploadRequest::from_path("/definitely/not/here.dwg")
            .await
            .unwrap_err();
        assert!(matches!(err, ForgeError::FileRead { .. }), "got: {err:?}");
    }

    #[tokio::test]
    async fn upload_request_from_path_uses_file_name() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("drawing.dwg");
        std::fs::write(&path, b"0123456789").unwrap();
        let u = UploadRequest::from_path(&path).await.unwrap();
        assert_eq!(u.object_name, "drawing.dwg");
        assert_eq!(u.payload.len(), 10);
    }

    #[tokio::test]
    async fn cancelled_token_skips_the_step() {
        let (handle, token) = CancelToken::pair();
        handle.cancel();
        let ran = std::sync::atomic::AtomicBool::new(false);
        let err = unless_cancelled(&token, "upload", "drawing.dwg", async {
            ran.store(true, std::sync::atomic::Ordering::SeqCst);
            Ok::<_, ForgeError>(())
        })
        .await
        .unwrap_err();
        assert!(
            matches!(err, ForgeError::Cancelled { stage: "upload", ref target } if target == "drawing.dwg"),
            "got: {err:?}"
        );
        assert!(!ran.load(std::sync::atomic::Ordering::SeqCst));
    }

    #[tokio::test]
    async fn cancel_interrupts_an_in_flight_step() {
        let (handle, token) = CancelToken::pair();
        let canceller = tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(50)).await;
            handle.cancel();
        });
        let err = tokio::time::timeout(
            Duration::from_secs(2),
            unless_cancelled(
                &token,
                "job submission",
                "urn:adsk.objects:os.object:b/a.dwg",
                std::future::pending::<Result<(), ForgeError>>(),
            ),
        )
        .await
        .expect("cancel must interrupt the step")
        .unwrap_err();
        canceller.await.unwrap();
        assert!(matches!(err, ForgeError::Cancelled { stage: "job submission", .. }));
    }

    #[tokio::test]
    async fn open_without_credentials_fails_before_network() {
        let config = PipelineConfig::builder()
            .api_url("http://127.0.0.1:9")
            .build()
            .unwrap();
        let err = Session::open(config).await.unwrap_err();
        assert!(matches!(err, ForgeError::Configuration(_)), "got: {err:?}");
        assert!(err.is_session_fatal());
    }
}
