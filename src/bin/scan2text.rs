//! CLI binary for scan2text.
//!
//! A thin shim over the library crate that maps CLI flags to `BatchConfig`,
//! wires Ctrl-C to a `StopHandle`, and prints the batch report.

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use indicatif::{ProgressBar, ProgressStyle};
use scan2text::{
    consolidate, run_until_stopped, BatchConfig, BatchProgressCallback, BatchReport, DocumentId,
    DocumentReport, DocumentStatus, PartialPolicy, ProgressCallback, PromptStyle, StopHandle,
};
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
fn yellow(s: &str) -> String {
    format!("\x1b[33m{s}\x1b[0m")
}
fn dim(s: &str) -> String {
    format!("\x1b[2m{s}\x1b[0m")
}
fn bold(s: &str) -> String {
    format!("\x1b[1m{s}\x1b[0m")
}

// ── CLI progress callback using indicatif ────────────────────────────────────

/// Terminal progress: one bar counting pages across the whole batch, plus a
/// line per finished document. The bar grows as documents are opened, since
/// page counts are only known after rendering.
struct CliProgressCallback {
    bar: ProgressBar,
}

impl CliProgressCallback {
    fn new() -> Arc<Self> {
        let bar = ProgressBar::new(0);
        let style = ProgressStyle::with_template(
            "{spinner:.cyan} {prefix:.bold}  \
             [{bar:42.green/238}] {pos:>4}/{len} pages  \
             ⏱ {elapsed_precise}  {msg}",
        )
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("█▉▊▋▌▍▎▏  ")
        .tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏", "⠿"]);

        bar.set_style(style);
        bar.set_prefix("Scanning");
        bar.enable_steady_tick(Duration::from_millis(80));
        Arc::new(Self { bar })
    }
}

impl BatchProgressCallback for CliProgressCallback {
    fn on_batch_start(&self, total_documents: usize) {
        self.bar.set_prefix("OCR");
        self.bar.println(format!(
            "{} {}",
            bold("◆"),
            bold(&format!("{total_documents} documents found"))
        ));
    }

    fn on_document_start(&self, document: &DocumentId, total_pages: usize) {
        self.bar.inc_length(total_pages as u64);
        self.bar.set_message(document.to_string());
    }

    fn on_page_complete(&self, _document: &DocumentId, _page_num: usize, _text_len: usize) {
        self.bar.inc(1);
    }

    fn on_page_error(&self, document: &DocumentId, page_num: usize, error: &str) {
        let msg = if error.chars().count() > 80 {
            format!("{}\u{2026}", error.chars().take(79).collect::<String>())
        } else {
            error.to_string()
        };
        self.bar.println(format!(
            "  {} {} page {}  {}",
            red("✗"),
            document,
            page_num,
            red(&msg)
        ));
        self.bar.inc(1);
    }

    fn on_document_complete(&self, report: &DocumentReport) {
        let mark = match report.status {
            DocumentStatus::Success => green("✓"),
            DocumentStatus::Partial { .. } | DocumentStatus::Interrupted => yellow("⚠"),
            DocumentStatus::HardFailure { .. } => red("✗"),
            DocumentStatus::Skipped => dim("·"),
        };
        let pages = report
            .pages
            .map(|n| dim(&format!("{n:>4} pages")))
            .unwrap_or_default();
        self.bar.println(format!("  {mark} {report}  {pages}"));
    }

    fn on_batch_complete(&self, _report: &BatchReport) {
        self.bar.finish_and_clear();
    }
}

const AFTER_HELP: &str = r#"EXAMPLES:
  # OCR a corpus with a local OpenAI-compatible vision server
  scan2text run scans/ text/

  # Point at another server and model
  scan2text run --endpoint http://gpu-box:8000/v1 --model rolmocr scans/ text/

  # Hosted provider instead of a local server
  scan2text run --provider openai --model gpt-4.1-mini scans/ text/

  # Markdown output, accept documents with failed pages as final
  scan2text run --prompt-style markdown --accept-partial scans/ text/

  # Machine-readable report
  scan2text run --json scans/ text/ > report.json

  # Flatten a nested export, dropping identical duplicates
  scan2text consolidate export/ flat/ -r

RESUMING:
  Re-running over the same directories skips documents whose artifact
  exists. Documents with failed pages are kept as NAME.partial and only
  their failed pages are sent again on the next run (unless --accept-partial).
  Ctrl-C stops dispatching new pages; in-flight calls finish and unfinished
  documents are reported as interrupted.

ENVIRONMENT VARIABLES:
  SCAN2TEXT_ENDPOINT      OpenAI-compatible base URL (default http://localhost:5551/v1)
  SCAN2TEXT_MODEL         Model name sent with each request
  SCAN2TEXT_API_KEY       Bearer token for the endpoint
  OPENAI_API_KEY etc.     Credentials for --provider
  PDFIUM_LIB_PATH         Path to libpdfium
  RUST_LOG                Overrides the log filter
"#;

/// Batch OCR for scanned document corpora using vision models.
#[derive(Parser, Debug)]
#[command(
    name = "scan2text",
    version,
    about = "Batch OCR for scanned document corpora using vision models",
    arg_required_else_help = true,
    color = clap::ColorChoice::Auto,
    after_long_help = AFTER_HELP
)]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Enable DEBUG-level tracing logs.
    #[arg(short, long, global = true, env = "SCAN2TEXT_VERBOSE")]
    verbose: bool,

    /// Suppress all output except errors and the report.
    #[arg(short, long, global = true, env = "SCAN2TEXT_QUIET")]
    quiet: bool,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// OCR every document under INPUT into one text file per document in OUTPUT.
    Run(RunArgs),
    /// Copy all files under INPUT into the root of OUTPUT, skipping identical duplicates.
    Consolidate(ConsolidateArgs),
}

#[derive(Args, Debug)]
struct RunArgs {
    /// Directory containing PDF, DOCX and image documents.
    input: PathBuf,

    /// Directory for text artifacts (created if missing).
    output: PathBuf,

    /// OpenAI-compatible base URL.
    #[arg(long, env = "SCAN2TEXT_ENDPOINT", default_value = scan2text::config::DEFAULT_ENDPOINT)]
    endpoint: String,

    /// Vision model name.
    #[arg(long, env = "SCAN2TEXT_MODEL", default_value = scan2text::config::DEFAULT_MODEL)]
    model: String,

    /// Bearer token for the endpoint.
    #[arg(long, env = "SCAN2TEXT_API_KEY", hide_env_values = true)]
    api_key: Option<String>,

    /// Use an edgequake-llm provider (openai, anthropic, gemini, ...) instead of --endpoint.
    #[arg(long, env = "SCAN2TEXT_PROVIDER")]
    provider: Option<String>,

    /// Maximum OCR calls in flight across the whole run.
    #[arg(short, long, env = "SCAN2TEXT_CONCURRENCY", default_value_t = 5)]
    concurrency: usize,

    /// Documents prepared and dispatched at the same time.
    #[arg(long, env = "SCAN2TEXT_DOCUMENTS_IN_FLIGHT", default_value_t = 2)]
    documents_in_flight: usize,

    /// Retries per page after the first failed attempt.
    #[arg(long, env = "SCAN2TEXT_MAX_RETRIES", default_value_t = 2)]
    max_retries: u32,

    /// Per-call timeout in seconds.
    #[arg(long, env = "SCAN2TEXT_TIMEOUT", default_value_t = 60)]
    timeout: u64,

    /// Initial retry backoff in milliseconds (doubles each retry).
    #[arg(long, env = "SCAN2TEXT_RETRY_BACKOFF_MS", default_value_t = 500)]
    retry_backoff_ms: u64,

    /// Only process documents directly inside INPUT.
    #[arg(long)]
    no_recursive: bool,

    /// Commit documents with failed pages as final instead of retrying them next run.
    #[arg(long, env = "SCAN2TEXT_ACCEPT_PARTIAL")]
    accept_partial: bool,

    /// Built-in prompt.
    #[arg(long, env = "SCAN2TEXT_PROMPT_STYLE", value_enum, default_value = "plain-text")]
    prompt_style: PromptStyleArg,

    /// Path to a text file containing a custom system prompt.
    #[arg(long, env = "SCAN2TEXT_SYSTEM_PROMPT")]
    system_prompt: Option<PathBuf>,

    /// Sampling temperature.
    #[arg(long, env = "SCAN2TEXT_TEMPERATURE", default_value_t = 0.2)]
    temperature: f32,

    /// Max output tokens per page.
    #[arg(long, env = "SCAN2TEXT_MAX_TOKENS", default_value_t = 4096)]
    max_tokens: usize,

    /// Longest edge, in pixels, of rendered PDF pages.
    #[arg(long, env = "SCAN2TEXT_MAX_PIXELS", default_value_t = 2000)]
    max_pixels: u32,

    /// Rotate rendered PDF/DOCX pages upright with tesseract OSD before OCR.
    #[arg(long, env = "SCAN2TEXT_CORRECT_ORIENTATION")]
    correct_orientation: bool,

    /// Let reasoning models emit thinking traces (stripped from the output anyway).
    #[arg(long)]
    allow_thinking: bool,

    /// Print the report as JSON on stdout.
    #[arg(long)]
    json: bool,

    /// Also write the JSON report to this file.
    #[arg(long)]
    report: Option<PathBuf>,

    /// Disable the progress bar.
    #[arg(long, env = "SCAN2TEXT_NO_PROGRESS")]
    no_progress: bool,
}

#[derive(Args, Debug)]
struct ConsolidateArgs {
    /// Source directory.
    input: PathBuf,

    /// Destination directory (created if missing).
    output: PathBuf,

    /// Include files from sub-directories.
    #[arg(short, long)]
    recursive: bool,
}

#[derive(clap::ValueEnum, Clone, Copy, Debug)]
enum PromptStyleArg {
    PlainText,
    Markdown,
    GraphProse,
}

impl From<PromptStyleArg> for PromptStyle {
    fn from(v: PromptStyleArg) -> Self {
        match v {
            PromptStyleArg::PlainText => PromptStyle::PlainText,
            PromptStyleArg::Markdown => PromptStyle::Markdown,
            PromptStyleArg::GraphProse => PromptStyle::GraphProse,
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // ── Logging setup ────────────────────────────────────────────────────
    // The progress bar replaces INFO logs; verbose always wins.
    let show_progress = match cli.command {
        Command::Run(ref args) => !cli.quiet && !args.no_progress && !args.json,
        Command::Consolidate(_) => false,
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
        Command::Run(ref args) => run_batch(args, cli.quiet, show_progress).await,
        Command::Consolidate(ref args) => run_consolidate(args, cli.quiet).await,
    }
}

async fn run_batch(args: &RunArgs, quiet: bool, show_progress: bool) -> Result<()> {
    let progress_cb: Option<ProgressCallback> = if show_progress {
        Some(CliProgressCallback::new() as Arc<dyn BatchProgressCallback>)
    } else {
        None
    };
    let config = build_config(args, progress_cb).await?;

    // ── Ctrl-C → graceful stop ───────────────────────────────────────────
    let stop = StopHandle::new();
    {
        let stop = stop.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                eprintln!("{} stopping: waiting for in-flight pages…", yellow("⚠"));
                stop.stop();
            }
        });
    }

    let report = run_until_stopped(&args.input, &args.output, &config, stop)
        .await
        .context("Batch failed")?;

    if let Some(ref path) = args.report {
        let json = serde_json::to_string_pretty(&report).context("Failed to serialise report")?;
        tokio::fs::write(path, json)
            .await
            .with_context(|| format!("Failed to write report to {}", path.display()))?;
    }

    if args.json {
        println!(
            "{}",
            serde_json::to_string_pretty(&report).context("Failed to serialise report")?
        );
    } else {
        // With the bar active, per-document lines were already printed.
        if !show_progress {
            print!("{report}");
        }
        if !quiet {
            eprintln!(
                "{}  {} ok  {} partial  {} failed  {} skipped  {} interrupted  {}  {}",
                if report.is_clean() { green("✔") } else { yellow("⚠") },
                report.succeeded(),
                report.partial(),
                report.hard_failures(),
                report.skipped(),
                report.interrupted(),
                dim(&format!("{} OCR calls", report.ocr_calls)),
                dim(&format!("{:.1}s", report.duration_ms as f64 / 1000.0)),
            );
        }
    }

    if !report.is_clean() {
        std::process::exit(if report.stopped { 130 } else { 1 });
    }
    Ok(())
}

async fn run_consolidate(args: &ConsolidateArgs, quiet: bool) -> Result<()> {
    let input = args.input.clone();
    let output = args.output.clone();
    let recursive = args.recursive;
    let summary = tokio::task::spawn_blocking(move || consolidate(input, output, recursive))
        .await
        .context("Consolidation task panicked")?
        .context("Consolidation failed")?;

    if !quiet {
        eprintln!(
            "{}  {} copied  {} renamed  {} duplicates skipped  →  {}",
            green("✔"),
            summary.copied,
            summary.conflicts_resolved,
            summary.skipped_duplicates,
            bold(&args.output.display().to_string()),
        );
    }
    Ok(())
}

/// Map CLI args to `BatchConfig`.
async fn build_config(args: &RunArgs, progress: Option<ProgressCallback>) -> Result<BatchConfig> {
    let mut builder = BatchConfig::builder()
        .endpoint(args.endpoint.as_str())
        .model(args.model.as_str())
        .max_concurrency(args.concurrency)
        .documents_in_flight(args.documents_in_flight)
        .max_retries(args.max_retries)
        .timeout_secs(args.timeout)
        .retry_backoff_ms(args.retry_backoff_ms)
        .recursive(!args.no_recursive)
        .partial_policy(if args.accept_partial {
            PartialPolicy::Accept
        } else {
            PartialPolicy::Retry
        })
        .prompt_style(args.prompt_style.into())
        .temperature(args.temperature)
        .max_tokens(args.max_tokens)
        .max_rendered_pixels(args.max_pixels)
        .correct_orientation(args.correct_orientation)
        .disable_thinking(!args.allow_thinking);

    if let Some(ref path) = args.system_prompt {
        let prompt = tokio::fs::read_to_string(path)
            .await
            .with_context(|| format!("Failed to read system prompt from {}", path.display()))?;
        builder = builder.system_prompt(prompt);
    }
    if let Some(ref key) = args.api_key {
        builder = builder.api_key(key.as_str());
    }
    if let Some(ref provider) = args.provider {
        builder = builder.provider_name(provider.as_str());
    }
    if let Some(cb) = progress {
        builder = builder.progress_callback(cb);
    }

    builder.build().context("Invalid configuration")
}
