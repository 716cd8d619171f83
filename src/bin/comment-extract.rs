//! CLI binary for comment-extract.
//!
//! A thin shim over the library crate: `extract` maps flags to an
//! `ExtractionConfig` and writes CSV/JSON, `serve` starts the upload service.

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand, ValueEnum};
use comment_extract::{
    export, extract_paths, extract_to_file, ExportFormat, ExtractionConfig,
    ExtractionProgressCallback, ProgressCallback,
};
use indicatif::{ProgressBar, ProgressStyle};
use std::io::{self, Write};
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
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
fn cyan(s: &str) -> String {
    format!("\x1b[36m{s}\x1b[0m")
}

const TICKS: &[&str] = &["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏", "⠿"];

// ── CLI progress callback using indicatif ────────────────────────────────────

/// Terminal progress callback: one bar over files, one log line per page.
struct CliProgressCallback {
    bar: ProgressBar,
    comments: AtomicUsize,
}

impl CliProgressCallback {
    fn new() -> Arc<Self> {
        let bar = ProgressBar::new(0);
        let spinner_style = ProgressStyle::with_template("{spinner:.cyan} {prefix:.bold}  {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner())
            .tick_strings(TICKS);

        bar.set_style(spinner_style);
        bar.set_prefix("Preparing");
        bar.set_message("Loading inputs…");
        bar.enable_steady_tick(Duration::from_millis(80));

        Arc::new(Self {
            bar,
            comments: AtomicUsize::new(0),
        })
    }

    fn activate_bar(&self, total_files: usize) {
        let progress_style = ProgressStyle::with_template(
            "{spinner:.cyan} {prefix:.bold}  \
             [{bar:42.green/238}] {pos:>3}/{len} files  \
             ⏱ {elapsed_precise}  {msg}",
        )
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("█▉▊▋▌▍▎▏  ")
        .tick_strings(TICKS);

        self.bar.set_length(total_files as u64);
        self.bar.set_style(progress_style);
        self.bar.set_prefix("Extracting");
        self.bar.reset_eta();
    }
}

impl ExtractionProgressCallback for CliProgressCallback {
    fn on_batch_start(&self, total_files: usize) {
        self.activate_bar(total_files);
        self.bar.println(format!(
            "{} {}",
            cyan("◆"),
            bold(&format!("Extracting comments from {total_files} file(s)…"))
        ));
    }

    fn on_file_start(&self, _file_index: usize, _total_files: usize, name: &str) {
        self.bar.set_message(name.to_string());
    }

    fn on_page_complete(&self, display_name: &str, comment_count: usize) {
        self.comments.fetch_add(comment_count, Ordering::SeqCst);
        self.bar.println(format!(
            "  {} {:<40}  {}",
            green("✓"),
            display_name,
            dim(&format!("{comment_count:>4} comments")),
        ));
    }

    fn on_page_error(&self, display_name: &str, error: &str) {
        let first_line = error.lines().next().unwrap_or_default();
        let msg = if first_line.chars().count() > 80 {
            format!("{}\u{2026}", first_line.chars().take(79).collect::<String>())
        } else {
            first_line.to_string()
        };
        self.bar
            .println(format!("  {} {:<40}  {}", red("✗"), display_name, red(&msg)));
    }

    fn on_file_complete(&self, _file_index: usize, _total_files: usize, _page_count: usize) {
        self.bar.inc(1);
    }

    fn on_batch_complete(&self, total_pages: usize, degraded_pages: usize) {
        self.bar.finish_and_clear();
        let comments = self.comments.load(Ordering::SeqCst);

        if degraded_pages == 0 {
            eprintln!(
                "{} {} comments from {} page(s)",
                green("✔"),
                bold(&comments.to_string()),
                total_pages
            );
        } else {
            eprintln!(
                "{} {} comments from {} page(s)  ({} degraded)",
                if degraded_pages == total_pages {
                    red("✘")
                } else {
                    cyan("⚠")
                },
                bold(&comments.to_string()),
                total_pages,
                red(&degraded_pages.to_string()),
            );
        }
    }
}

const AFTER_HELP: &str = r#"EXAMPLES:
  # CSV to stdout
  comment-extract extract thread.png

  # Several screenshots and a PDF export into one CSV
  comment-extract extract shot1.png shot2.jpg export.pdf -o comments.csv

  # Full batch result (raw responses, stats) as JSON
  comment-extract extract export.pdf -o comments.json

  # Use an edgequake-llm provider instead of Gemini
  comment-extract extract --provider openai --model gpt-4.1 thread.png

  # Run the upload service
  comment-extract serve --bind 0.0.0.0:8080

ENVIRONMENT VARIABLES:
  GEMINI_API_KEY            Gemini API key (extract)
  COMMENT_EXTRACT_MODEL     Model id (default: gemini-2.0-flash)
  COMMENT_EXTRACT_PROVIDER  edgequake-llm provider name (openai, anthropic, ollama, ...)
  PDFIUM_LIB_PATH           Path to libpdfium (file or directory)
  COMMENT_EXTRACT_BIND      Listen address for `serve`
  RUST_LOG                  Log filter, overrides -v / -q

  Variables may also be set in a `.env` file in the working directory.
"#;

/// Extract comments from social-media screenshots and PDFs.
#[derive(Parser, Debug)]
#[command(
    name = "comment-extract",
    version,
    about = "Extract comments from social-media screenshots and PDFs using vision models",
    arg_required_else_help = true,
    color = clap::ColorChoice::Auto,
    after_long_help = AFTER_HELP
)]
struct Cli {
    /// Enable DEBUG-level tracing logs.
    #[arg(short, long, global = true, env = "COMMENT_EXTRACT_VERBOSE")]
    verbose: bool,

    /// Suppress all output except errors.
    #[arg(short, long, global = true, env = "COMMENT_EXTRACT_QUIET")]
    quiet: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Extract comments from files and URLs into CSV or JSON.
    Extract(ExtractArgs),
    /// Serve the multipart upload API.
    #[cfg(feature = "server")]
    Serve(ServeArgs),
}

/// Rendering and model options shared by both subcommands.
#[derive(Args, Debug)]
struct ModelArgs {
    /// Model id (default: gemini-2.0-flash, or gpt-4.1-nano with --provider).
    #[arg(long, env = "COMMENT_EXTRACT_MODEL")]
    model: Option<String>,

    /// PDF page upscaling factor (2.0–4.0).
    #[arg(long, env = "COMMENT_EXTRACT_SCALE", default_value_t = 2.0)]
    scale: f32,

    /// Max model output tokens per page.
    #[arg(long, env = "COMMENT_EXTRACT_MAX_TOKENS", default_value_t = 4096)]
    max_tokens: usize,

    /// Model temperature (0.0–2.0).
    #[arg(long, env = "COMMENT_EXTRACT_TEMPERATURE", default_value_t = 0.1)]
    temperature: f32,

    /// Characters of raw text kept when no structure can be recovered.
    #[arg(long, env = "COMMENT_EXTRACT_FALLBACK_CHARS", default_value_t = 500)]
    fallback_chars: usize,

    /// Path to the pdfium shared library (file or directory).
    #[arg(long, env = "PDFIUM_LIB_PATH")]
    pdfium_lib: Option<PathBuf>,
}

#[derive(Args, Debug)]
struct ExtractArgs {
    /// Image / PDF paths or HTTP(S) URLs, processed in this order.
    #[arg(required = true)]
    inputs: Vec<String>,

    /// Write the export to this file instead of stdout.
    #[arg(short, long, env = "COMMENT_EXTRACT_OUTPUT")]
    output: Option<PathBuf>,

    /// Export format. Defaults to the output file's extension, else CSV.
    #[arg(short, long, value_enum)]
    format: Option<FormatArg>,

    /// Gemini API key.
    #[arg(long, env = "GEMINI_API_KEY", hide_env_values = true)]
    api_key: Option<String>,

    /// Use an edgequake-llm provider (openai, anthropic, ollama, ...) instead
    /// of Gemini. The provider reads its own key from the environment.
    #[arg(long, env = "COMMENT_EXTRACT_PROVIDER")]
    provider: Option<String>,

    /// PDF user password for encrypted documents.
    #[arg(long, env = "COMMENT_EXTRACT_PASSWORD", hide_env_values = true)]
    password: Option<String>,

    /// HTTP download timeout in seconds.
    #[arg(long, env = "COMMENT_EXTRACT_DOWNLOAD_TIMEOUT", default_value_t = 120)]
    download_timeout: u64,

    /// Disable the progress bar.
    #[arg(long, env = "COMMENT_EXTRACT_NO_PROGRESS")]
    no_progress: bool,

    #[command(flatten)]
    model: ModelArgs,
}

#[cfg(feature = "server")]
#[derive(Args, Debug)]
struct ServeArgs {
    /// Listen address.
    #[arg(long, env = "COMMENT_EXTRACT_BIND", default_value = "127.0.0.1:8080")]
    bind: String,

    /// Maximum request body size in megabytes.
    #[arg(long, env = "COMMENT_EXTRACT_MAX_UPLOAD_MB", default_value_t = 50)]
    max_upload_mb: usize,

    #[command(flatten)]
    model: ModelArgs,
}

#[derive(ValueEnum, Clone, Copy, Debug)]
enum FormatArg {
    Csv,
    Json,
}

impl From<FormatArg> for ExportFormat {
    fn from(v: FormatArg) -> Self {
        match v {
            FormatArg::Csv => ExportFormat::Csv,
            FormatArg::Json => ExportFormat::Json,
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    // ── Logging setup ────────────────────────────────────────────────────
    // The progress bar gives all the feedback that matters during `extract`,
    // so library INFO logs are muted while it is shown.
    let show_progress = match &cli.command {
        Command::Extract(args) => !cli.quiet && !args.no_progress,
        #[cfg(feature = "server")]
        Command::Serve(_) => false,
    };
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

    match cli.command {
        Command::Extract(args) => run_extract(args, cli.quiet, show_progress).await,
        #[cfg(feature = "server")]
        Command::Serve(args) => run_serve(args).await,
    }
}

async fn run_extract(args: ExtractArgs, quiet: bool, show_progress: bool) -> Result<()> {
    let progress_cb: Option<ProgressCallback> = if show_progress {
        Some(CliProgressCallback::new() as Arc<dyn ExtractionProgressCallback>)
    } else {
        None
    };

    let mut builder = apply_model_args(ExtractionConfig::builder(), &args.model)
        .download_timeout_secs(args.download_timeout);
    if let Some(ref key) = args.api_key {
        builder = builder.api_key(key);
    }
    if let Some(ref provider) = args.provider {
        builder = builder.provider_name(provider);
    }
    if let Some(ref pwd) = args.password {
        builder = builder.password(pwd);
    }
    if let Some(cb) = progress_cb {
        builder = builder.progress_callback(cb);
    }
    let config = builder.build().context("Invalid configuration")?;

    let format = args.format.map(ExportFormat::from);

    if let Some(ref output_path) = args.output {
        let stats = extract_to_file(&args.inputs, output_path, format, &config)
            .await
            .context("Extraction failed")?;

        if !quiet {
            eprintln!(
                "{}  {} comments  {}/{} pages  {}ms  →  {}",
                if stats.degraded_pages == 0 {
                    green("✔")
                } else {
                    cyan("⚠")
                },
                stats.total_comments,
                stats.total_pages - stats.degraded_pages,
                stats.total_pages,
                stats.total_duration_ms,
                bold(&output_path.display().to_string()),
            );
        }
    } else {
        let batch = extract_paths(&args.inputs, &config)
            .await
            .context("Extraction failed")?;

        let body = export::render(&batch, format.unwrap_or_default())
            .context("Failed to render export")?;
        io::stdout()
            .lock()
            .write_all(body.as_bytes())
            .context("Failed to write to stdout")?;

        if !quiet && !show_progress {
            eprintln!(
                "Extracted {} comments from {} page(s) in {}ms",
                batch.stats.total_comments, batch.stats.total_pages, batch.stats.total_duration_ms
            );
            if batch.stats.degraded_pages > 0 {
                eprintln!("  {} page(s) degraded", batch.stats.degraded_pages);
            }
            if batch.stats.fallback_pages > 0 {
                eprintln!(
                    "  {}",
                    dim(&format!(
                        "{} page(s) recovered from non-JSON replies",
                        batch.stats.fallback_pages
                    ))
                );
            }
        }
    }

    Ok(())
}

#[cfg(feature = "server")]
async fn run_serve(args: ServeArgs) -> Result<()> {
    use comment_extract::server::{start_server, AppState};

    let config = apply_model_args(ExtractionConfig::builder(), &args.model)
        .build()
        .context("Invalid configuration")?;
    let max_upload_bytes = args.max_upload_mb.saturating_mul(1024 * 1024);

    start_server(&args.bind, AppState::new(config), max_upload_bytes)
        .await
        .with_context(|| format!("Server on {} failed", args.bind))
}

/// Map the shared rendering / model flags onto a config builder.
fn apply_model_args(
    mut builder: comment_extract::ExtractionConfigBuilder,
    args: &ModelArgs,
) -> comment_extract::ExtractionConfigBuilder {
    builder = builder
        .render_scale(args.scale)
        .max_tokens(args.max_tokens)
        .temperature(args.temperature)
        .max_fallback_chars(args.fallback_chars);
    if let Some(ref model) = args.model {
        builder = builder.model(model);
    }
    if let Some(ref path) = args.pdfium_lib {
        builder = builder.pdfium_lib_path(path);
    }
    builder
}
