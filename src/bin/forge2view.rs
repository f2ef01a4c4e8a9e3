//! CLI binary for forge2view.
//!
//! A thin shim over the library crate that maps CLI flags to
//! `PipelineConfig`, runs one upload, and prints the viewer payload.

use anyhow::{Context, Result};
use clap::Parser;
use forge2view::{
    BucketPolicy, CancelToken, OutputFormat, PipelineConfig, PipelineProgressCallback,
    PipelineState, ProgressCallback, Session, StoredObject, UploadRequest, ViewableReference,
};
use indicatif::{ProgressBar, ProgressStyle};
use std::io;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

// ── ANSI colour helpers (no extra deps) ──────────────────────────────────────

fn green(s: &str) -> String {
    format!("\x1b[32m{s}\x1b[0m")
}
fn red(s: &str) -> String {
    format!("\x1b[31m{s}\x1b[0m")
}
fn dim(s: &str) -> String {
    format!("\x1b[2m{s}\x1b[0m")
}
fn bold(s: &str) -> String {
    format!("\x1b[1m{s}\x1b[0m")
}

// ── CLI progress callback using indicatif ────────────────────────────────────

/// Spinner whose prefix follows the pipeline state and whose message shows
/// the latest manifest progress.
struct CliProgressCallback {
    bar: ProgressBar,
}

impl CliProgressCallback {
    fn new() -> Arc<Self> {
        let bar = ProgressBar::new_spinner();
        let style = ProgressStyle::with_template(
            "{spinner:.cyan} {prefix:.bold}  {msg}  {elapsed_precise:.dim}",
        )
        .unwrap_or_else(|_| ProgressStyle::default_spinner())
        .tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏", "⠿"]);

        bar.set_style(style);
        bar.set_prefix("Idle");
        bar.set_message("Authenticating…");
        bar.enable_steady_tick(Duration::from_millis(80));
        Arc::new(Self { bar })
    }
}

impl PipelineProgressCallback for CliProgressCallback {
    fn on_state_change(&self, state: &PipelineState) {
        if state.is_terminal() {
            return;
        }
        self.bar.set_prefix(state.name());
        let msg = match state {
            PipelineState::TokenAcquired => "uploading…",
            PipelineState::Uploaded => "submitting job…",
            PipelineState::JobSubmitted | PipelineState::Polling => "waiting for translation…",
            _ => "",
        };
        self.bar.set_message(msg);
    }

    fn on_upload_complete(&self, object: &StoredObject) {
        self.bar.println(format!(
            "  {} Uploaded {}  {}",
            green("✓"),
            bold(&object.object_name),
            dim(&format!("{} bytes → {}", object.size, object.bucket_key)),
        ));
    }

    fn on_poll(&self, attempt: u32, progress: &str) {
        self.bar.set_message(format!("poll #{attempt}: {progress}"));
    }

    fn on_resolved(&self, viewable: &ViewableReference) {
        self.bar.finish_and_clear();
        eprintln!(
            "{} Viewable ready: {}",
            green("✔"),
            bold(&viewable.derived_id)
        );
    }

    fn on_failed(&self, kind: &str, message: &str) {
        self.bar.finish_and_clear();
        let msg = if message.len() > 120 {
            format!("{}\u{2026}", message.chars().take(119).collect::<String>())
        } else {
            message.to_string()
        };
        eprintln!("{} {}: {}", red("✘"), kind, red(&msg));
    }
}

const AFTER_HELP: &str = r#"EXAMPLES:
  # Translate a drawing and print the viewer payload
  forge2view drawing.dwg

  # Point at a relay running elsewhere
  forge2view --relay-url http://relay.internal:3001 model.rvt

  # Full result (object, job, timings) as JSON
  forge2view --json drawing.dwg > result.json

  # Give up after ten minutes and remove the container on failure
  forge2view --poll-timeout 600 --cleanup-on-failure drawing.dwg

ENVIRONMENT VARIABLES:
  FORGE_CLIENT_ID       Application client id
  FORGE_CLIENT_SECRET   Application client secret
  FORGE_API_URL         API base (default https://developer.api.autodesk.com)
  FORGE_RELAY_URL       Job relay base (default http://localhost:3001)
  FORGE_SCOPE           Requested token scope

The relay is a separate process: run `forge-relay` first.
"#;

/// Upload a design file and translate it into a viewable derivative.
#[derive(Parser, Debug)]
#[command(
    name = "forge2view",
    version,
    about = "Upload a design file and translate it into a viewable derivative",
    arg_required_else_help = true,
    color = clap::ColorChoice::Auto,
    after_long_help = AFTER_HELP
)]
struct Cli {
    /// Local design file (dwg, rvt, ifc, …).
    input: PathBuf,

    /// Application client id.
    #[arg(long, env = "FORGE_CLIENT_ID", hide_env_values = true)]
    client_id: Option<String>,

    /// Application client secret.
    #[arg(long, env = "FORGE_CLIENT_SECRET", hide_env_values = true)]
    client_secret: Option<String>,

    /// Requested token scope.
    #[arg(long, env = "FORGE_SCOPE")]
    scope: Option<String>,

    /// API base URL.
    #[arg(long, env = "FORGE_API_URL")]
    api_url: Option<String>,

    /// Job relay base URL.
    #[arg(long, env = "FORGE_RELAY_URL")]
    relay_url: Option<String>,

    /// Container retention policy.
    #[arg(long, value_enum, default_value = "transient")]
    policy: PolicyArg,

    /// Derivative format.
    #[arg(long, default_value = "svf2")]
    format: String,

    /// Comma-separated views for the format.
    #[arg(long, default_value = "2d,3d")]
    views: String,

    /// Content type sent with the upload.
    #[arg(long)]
    content_type: Option<String>,

    /// Delay between manifest queries, in milliseconds.
    #[arg(long, default_value_t = 5000)]
    poll_interval_ms: u64,

    /// Maximum manifest queries; 0 = no limit.
    #[arg(long, default_value_t = 720)]
    max_polls: u32,

    /// Give up polling after this many seconds.
    #[arg(long)]
    poll_timeout: Option<u64>,

    /// Per-request HTTP timeout in seconds.
    #[arg(long, default_value_t = 120)]
    request_timeout: u64,

    /// Delete the container this run created if the run fails.
    #[arg(long)]
    cleanup_on_failure: bool,

    /// Print the full TranslationOutput instead of the viewer payload.
    #[arg(long)]
    json: bool,

    /// Disable the spinner.
    #[arg(long)]
    no_progress: bool,

    /// Enable DEBUG-level tracing logs.
    #[arg(short, long)]
    verbose: bool,

    /// Suppress all output except errors and the result.
    #[arg(short, long)]
    quiet: bool,
}

#[derive(clap::ValueEnum, Clone, Debug)]
enum PolicyArg {
    Transient,
    Persistent,
}

impl From<PolicyArg> for BucketPolicy {
    fn from(v: PolicyArg) -> Self {
        match v {
            PolicyArg::Transient => BucketPolicy::Transient,
            PolicyArg::Persistent => BucketPolicy::Persistent,
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // ── Logging setup ────────────────────────────────────────────────────
    // The spinner replaces INFO logs; --verbose brings everything back.
    let show_progress = !cli.quiet && !cli.no_progress;
    let filter = if cli.verbose {
        "debug"
    } else if cli.quiet || show_progress {
        "error"
    } else {
        "info"
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)),
        )
        .with_writer(io::stderr)
        .init();

    let progress_cb: Option<ProgressCallback> = if show_progress {
        Some(CliProgressCallback::new() as Arc<dyn PipelineProgressCallback>)
    } else {
        None
    };

    let config = build_config(&cli, progress_cb)?;

    let mut upload = UploadRequest::from_path(&cli.input)
        .await
        .context("Failed to read input")?;
    if let Some(ref ct) = cli.content_type {
        upload = upload.with_content_type(ct.clone());
    }

    // ── Run ──────────────────────────────────────────────────────────────
    let session = Session::open(config)
        .await
        .context("Authentication failed")?;

    // First Ctrl-C cancels the run at its current step; a second one exits.
    let (handle, token) = CancelToken::pair();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            handle.cancel();
            if tokio::signal::ctrl_c().await.is_ok() {
                std::process::exit(130);
            }
        }
    });

    let output = session
        .translate(upload, &token)
        .await
        .context("Translation failed")?;

    let json = if cli.json {
        serde_json::to_string_pretty(&output)
    } else {
        serde_json::to_string_pretty(&output.viewable)
    }
    .context("Failed to serialise output")?;
    println!("{json}");

    if !cli.quiet {
        eprintln!(
            "   {} polls  /  upload {}ms  /  translate {}ms  /  {}ms total",
            dim(&output.stats.poll_count.to_string()),
            output.stats.upload_ms,
            output.stats.translate_ms,
            output.stats.total_ms,
        );
    }

    Ok(())
}

/// Map CLI args to `PipelineConfig`.
fn build_config(cli: &Cli, progress: Option<ProgressCallback>) -> Result<PipelineConfig> {
    let views: Vec<&str> = cli
        .views
        .split(',')
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .collect();

    let mut builder = PipelineConfig::builder()
        .bucket_policy(cli.policy.clone().into())
        .output_formats(vec![OutputFormat::new(cli.format.trim(), &views)])
        .poll_interval_ms(cli.poll_interval_ms)
        .max_poll_attempts((cli.max_polls > 0).then_some(cli.max_polls))
        .poll_timeout(cli.poll_timeout.map(Duration::from_secs))
        .request_timeout_secs(cli.request_timeout)
        .cleanup_on_failure(cli.cleanup_on_failure);

    if let Some(ref v) = cli.client_id {
        builder = builder.client_id(v.clone());
    }
    if let Some(ref v) = cli.client_secret {
        builder = builder.client_secret(v.clone());
    }
    if let Some(ref v) = cli.scope {
        builder = builder.scope(v.clone());
    }
    if let Some(ref v) = cli.api_url {
        builder = builder.api_url(v.clone());
    }
    if let Some(ref v) = cli.relay_url {
        builder = builder.relay_url(v.clone());
    }
    if let Some(cb) = progress {
        builder = builder.progress_callback(cb);
    }

    builder.build().context("Invalid configuration")
}
