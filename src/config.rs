//! Configuration types for the translation pipeline.
//!
//! Everything a run needs that is not the file itself lives in
//! [`PipelineConfig`], built via [`PipelineConfigBuilder`] or loaded with
//! [`PipelineConfig::from_env`]. Endpoints are configurable as base URLs so
//! the same code talks to the production service, a regional gateway, or an
//! in-process mock in tests.

use crate::error::ForgeError;
use crate::progress::ProgressCallback;
use crate::types::{BucketPolicy, OutputFormat};
use std::fmt;
use std::time::Duration;

/// Production API host.
pub const DEFAULT_API_URL: &str = "https://developer.api.autodesk.com";

/// Default relay address, matching `forge-relay --bind`.
pub const DEFAULT_RELAY_URL: &str = "http://localhost:3001";

/// Scope requested by the credential exchange.
pub const DEFAULT_SCOPE: &str =
    "data:read data:write data:create bucket:read bucket:create bucket:delete";

/// How the status poller waits for a job.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollPolicy {
    /// Delay between the end of one manifest query and the start of the next.
    pub interval: Duration,
    /// Give up after this many queries. `None` = no limit.
    pub max_attempts: Option<u32>,
    /// Give up after this much wall-clock time. `None` = no limit.
    pub timeout: Option<Duration>,
}

impl PollPolicy {
    /// Poll forever at `interval` until the job finishes or a query fails.
    pub fn unbounded(interval: Duration) -> Self {
        Self {
            interval,
            max_attempts: None,
            timeout: None,
        }
    }

    pub fn is_bounded(&self) -> bool {
        self.max_attempts.is_some() || self.timeout.is_some()
    }
}

impl Default for PollPolicy {
    /// 5 s interval, at most 720 queries (one hour).
    fn default() -> Self {
        Self {
            interval: Duration::from_millis(5000),
            max_attempts: Some(720),
            timeout: None,
        }
    }
}

/// Configuration for a translation session.
///
/// # Example
/// ```rust
/// use forge2view::PipelineConfig;
///
/// let config = PipelineConfig::builder()
///     .client_id("my-client-id")
///     .client_secret("my-client-secret")
///     .poll_interval_ms(2000)
///     .build()
///     .unwrap();
/// ```
#[derive(Clone)]
pub struct PipelineConfig {
    pub client_id: String,
    pub client_secret: String,

    /// Space-separated permission set requested for the token.
    pub scope: String,

    /// Base URL of the storage and derivative APIs. Default: [`DEFAULT_API_URL`].
    pub api_url: String,

    /// Token endpoint. If None, `{api_url}/authentication/v2/token`.
    pub auth_url: Option<String>,

    /// Base URL of the job relay. Default: [`DEFAULT_RELAY_URL`].
    pub relay_url: String,

    /// Policy for newly created containers. Default: transient.
    pub bucket_policy: BucketPolicy,

    /// Requested derivatives, in order. Default: svf2 with 2d + 3d views.
    pub output_formats: Vec<OutputFormat>,

    pub poll: PollPolicy,

    /// Per-request HTTP timeout in seconds. Default: 120.
    ///
    /// Applies to each call separately; uploads of large drawings are the
    /// slowest request in the pipeline.
    pub request_timeout_secs: u64,

    /// Delete the container this run created when a later step fails. Default: false.
    pub cleanup_on_failure: bool,

    /// Optional observer for state transitions and poll results.
    pub progress_callback: Option<ProgressCallback>,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            client_id: String::new(),
            client_secret: String::new(),
            scope: DEFAULT_SCOPE.to_string(),
            api_url: DEFAULT_API_URL.to_string(),
            auth_url: None,
            relay_url: DEFAULT_RELAY_URL.to_string(),
            bucket_policy: BucketPolicy::default(),
            output_formats: vec![OutputFormat::default()],
            poll: PollPolicy::default(),
            request_timeout_secs: 120,
            cleanup_on_failure: false,
            progress_callback: None,
        }
    }
}

impl fmt::Debug for PipelineConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PipelineConfig")
            .field("client_id", &self.client_id)
            .field("client_secret", &"<redacted>")
            .field("scope", &self.scope)
            .field("api_url", &self.api_url)
            .field("auth_url", &self.auth_url)
            .field("relay_url", &self.relay_url)
            .field("bucket_policy", &self.bucket_policy)
            .field("output_formats", &self.output_formats)
            .field("poll", &self.poll)
            .field("request_timeout_secs", &self.request_timeout_secs)
            .field("cleanup_on_failure", &self.cleanup_on_failure)
            .field(
                "progress_callback",
                &self
                    .progress_callback
                    .as_ref()
                    .map(|_| "<dyn PipelineProgressCallback>"),
            )
            .finish()
    }
}

impl PipelineConfig {
    /// Create a new builder for `PipelineConfig`.
    pub fn builder() -> PipelineConfigBuilder {
        PipelineConfigBuilder {
            config: Self::default(),
        }
    }

    /// Read credentials and endpoints from the environment.
    ///
    /// | Variable | Field |
    /// |----------|-------|
    /// | `FORGE_CLIENT_ID` | `client_id` |
    /// | `FORGE_CLIENT_SECRET` | `client_secret` |
    /// | `FORGE_API_URL` | `api_url` |
    /// | `FORGE_RELAY_URL` | `relay_url` |
    /// | `FORGE_SCOPE` | `scope` |
    ///
    /// Missing credentials are not an error here; the credential exchange
    /// reports them as [`ForgeError::Configuration`].
    pub fn from_env() -> Result<Self, ForgeError> {
        let mut builder = Self::builder();
        if let Some(v) = env_non_empty("FORGE_CLIENT_ID") {
            builder = builder.client_id(v);
        }
        if let Some(v) = env_non_empty("FORGE_CLIENT_SECRET") {
            builder = builder.client_secret(v);
        }
        if let Some(v) = env_non_empty("FORGE_API_URL") {
            builder = builder.api_url(v);
        }
        if let Some(v) = env_non_empty("FORGE_RELAY_URL") {
            builder = builder.relay_url(v);
        }
        if let Some(v) = env_non_empty("FORGE_SCOPE") {
            builder = builder.scope(v);
        }
        builder.build()
    }

    /// Token endpoint, derived from `api_url` unless overridden.
    pub fn token_url(&self) -> String {
        self.auth_url
            .clone()
            .unwrap_or_else(|| format!("{}/authentication/v2/token", self.api_url))
    }

    /// Relay route that forwards translation jobs.
    pub fn relay_job_url(&self) -> String {
        format!("{}/proxy/modelderivative/job", self.relay_url)
    }
}

fn env_non_empty(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.trim().is_empty())
}

/// Builder for [`PipelineConfig`].
#[derive(Debug)]
pub struct PipelineConfigBuilder {
    config: PipelineConfig,
}

impl PipelineConfigBuilder {
    pub fn client_id(mut self, id: impl Into<String>) -> Self {
        self.config.client_id = id.into();
        self
    }

    pub fn client_secret(mut self, secret: impl Into<String>) -> Self {
        self.config.client_secret = secret.into();
        self
    }

    pub fn scope(mut self, scope: impl Into<String>) -> Self {
        self.config.scope = scope.into();
        self
    }

    pub fn api_url(mut self, url: impl Into<String>) -> Self {
        self.config.api_url = trim_base(url.into());
        self
    }

    pub fn auth_url(mut self, url: impl Into<String>) -> Self {
        self.config.auth_url = Some(url.into());
        self
    }

    pub fn relay_url(mut self, url: impl Into<String>) -> Self {
        self.config.relay_url = trim_base(url.into());
        self
    }

    pub fn bucket_policy(mut self, policy: BucketPolicy) -> Self {
        self.config.bucket_policy = policy;
        self
    }

    pub fn output_formats(mut self, formats: Vec<OutputFormat>) -> Self {
        self.config.output_formats = formats;
        self
    }

    pub fn poll_interval_ms(mut self, ms: u64) -> Self {
        self.config.poll.interval = Duration::from_millis(ms);
        self
    }

    pub fn max_poll_attempts(mut self, n: Option<u32>) -> Self {
        self.config.poll.max_attempts = n.map(|n| n.max(1));
        self
    }

    pub fn poll_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.config.poll.timeout = timeout;
        self
    }

    pub fn poll_policy(mut self, policy: PollPolicy) -> Self {
        self.config.poll = policy;
        self
    }

    pub fn request_timeout_secs(mut self, secs: u64) -> Self {
        self.config.request_timeout_secs = secs.max(1);
        self
    }

    pub fn cleanup_on_failure(mut self, v: bool) -> Self {
        self.config.cleanup_on_failure = v;
        self
    }

    pub fn progress_callback(mut self, cb: ProgressCallback) -> Self {
        self.config.progress_callback = Some(cb);
        self
    }

    /// Build the configuration, validating constraints.
    pub fn build(self) -> Result<PipelineConfig, ForgeError> {
        let c = &self.config;
        let urls = [
            ("api_url", Some(&c.api_url)),
            ("relay_url", Some(&c.relay_url)),
            ("auth_url", c.auth_url.as_ref()),
        ];
        for (name, url) in urls {
            let Some(url) = url else { continue };
            if reqwest::Url::parse(url).is_err() {
                return Err(ForgeError::Configuration(format!(
                    "{name} is not a valid URL: '{url}'"
                )));
            }
        }
        if c.output_formats.is_empty() {
            return Err(ForgeError::Configuration(
                "At least one output format is required".into(),
            ));
        }
        if c.scope.trim().is_empty() {
            return Err(ForgeError::Configuration("Scope must not be empty".into()));
        }
        Ok(self.config)
    }
}

fn trim_base(url: String) -> String {
    url.trim_end_matches('/').to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_baseline() {
        let c = PipelineConfig::default();
        assert_eq!(c.poll.interval, Duration::from_millis(5000));
        assert_eq!(c.bucket_policy, BucketPolicy::Transient);
        assert_eq!(c.scope, DEFAULT_SCOPE);
        assert!(!c.cleanup_on_failure);
        assert_eq!(c.output_formats, vec![OutputFormat::default()]);
    }

    #[test]
    fn builder_trims_trailing_slashes() {
        let c = PipelineConfig::builder()
            .api_url("http://127.0.0.1:9000/")
            .relay_url("http://127.0.0.1:3001//")
            .build()
            .unwrap();
        assert_eq!(
            c.token_url(),
            "http://127.0.0.1:9000/authentication/v2/token"
        );
        assert_eq!(
            c.relay_job_url(),
            "http://127.0.0.1:3001/proxy/modelderivative/job"
        );
    }

    #[test]
    fn explicit_auth_url_wins() {
        let c = PipelineConfig::builder()
            .auth_url("http://auth.local/token")
            .build()
            .unwrap();
        assert_eq!(c.token_url(), "http://auth.local/token");
    }

    #[test]
    fn build_rejects_bad_url() {
        let err = PipelineConfig::builder()
            .relay_url("not a url")
            .build()
            .unwrap_err();
        assert!(matches!(err, ForgeError::Configuration(_)));
        assert!(err.to_string().contains("relay_url"));
    }

    #[test]
    fn build_rejects_bad_auth_url() {
        let err = PipelineConfig::builder()
            .auth_url("::no-scheme::")
            .build()
            .unwrap_err();
        assert!(
            matches!(err, ForgeError::Configuration(ref m) if m.contains("auth_url")),
            "got: {err:?}"
        );
    }

    #[test]
    fn build_rejects_empty_formats() {
        let err = PipelineConfig::builder()
            .output_formats(vec![])
            .build()
            .unwrap_err();
        assert!(matches!(err, ForgeError::Configuration(_)));
    }

    #[test]
    fn max_attempts_is_at_least_one() {
        let c = PipelineConfig::builder()
            .max_poll_attempts(Some(0))
            .build()
            .unwrap();
        assert_eq!(c.poll.max_attempts, Some(1));
    }

    #[test]
    fn unbounded_policy_has_no_limits() {
        let p = PollPolicy::unbounded(Duration::from_millis(10));
        assert!(!p.is_bounded());
        assert!(PollPolicy::default().is_bounded());
    }

    #[test]
    fn debug_redacts_secret() {
        let c = PipelineConfig::builder()
            .client_id("id")
            .client_secret("hunter2")
            .build()
            .unwrap();
        assert!(!format!("{c:?}").contains("hunter2"));
    }
}
