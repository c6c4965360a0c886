//! CLI binary for taxdoc-extract.
//!
//! A thin shim over the library crate that maps CLI flags to
//! `ExtractionConfig`, prints the JSON blob and a per-page summary.

use anyhow::{Context, Result};
use clap::Parser;
use indicatif::{ProgressBar, ProgressStyle};
use std::collections::HashMap;
use std::io::{self, Write};
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use taxdoc_extract::{
    extract_document, extract_to_file, DocumentExtraction, ExtractionConfig,
    ExtractionProgressCallback, ExtractionSummary, ProgressCallback, SPECIALIZED_TYPES,
};
use tracing_subscriber::EnvFilter;

// ── ANSI colour helpers ──────────────────────────────────────────────────────

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

/// Live progress bar plus one log line per finished page. Pages may finish
/// out of order when `--concurrency` is above 1.
struct CliProgressCallback {
    bar: ProgressBar,
    start_times: Mutex<HashMap<usize, Instant>>,
}

impl CliProgressCallback {
    /// Spinner until `on_extraction_start` reports the page count.
    fn new_dynamic() -> Arc<Self> {
        let bar = ProgressBar::new(0);
        let spinner_style = ProgressStyle::with_template("{spinner:.cyan} {prefix:.bold}  {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner())
            .tick_strings(TICKS);

        bar.set_style(spinner_style);
        bar.set_prefix("Preparing");
        bar.set_message("Rasterizing PDF…");
        bar.enable_steady_tick(Duration::from_millis(80));

        Arc::new(Self {
            bar,
            start_times: Mutex::new(HashMap::new()),
        })
    }

    fn activate_bar(&self, total: usize) {
        let progress_style = ProgressStyle::with_template(
            "{spinner:.cyan} {prefix:.bold}  \
             [{bar:42.green/238}] {pos:>3}/{len} pages  \
             ⏱ {elapsed_precise}  ETA {eta_precise}",
        )
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("█▉▊▋▌▍▎▏  ")
        .tick_strings(TICKS);

        self.bar.set_length(total as u64);
        self.bar.set_style(progress_style);
        self.bar.set_prefix("Extracting");
        self.bar.reset_eta();
    }

    fn elapsed_secs(&self, page_num: usize) -> f64 {
        self.start_times
            .lock()
            .ok()
            .and_then(|mut m| m.remove(&page_num))
            .map(|t| t.elapsed().as_secs_f64())
            .unwrap_or(0.0)
    }
}

impl ExtractionProgressCallback for CliProgressCallback {
    fn on_extraction_start(&self, total_pages: usize) {
        self.activate_bar(total_pages);
        self.bar.println(format!(
            "{} {}",
            cyan("◆"),
            bold(&format!("Extracting {total_pages} pages…"))
        ));
    }

    fn on_page_start(&self, page_num: usize, _total: usize) {
        if let Ok(mut m) = self.start_times.lock() {
            m.insert(page_num, Instant::now());
        }
        self.bar.set_message(format!("page {page_num}"));
    }

    fn on_page_complete(&self, page_num: usize, total: usize, field_count: usize) {
        let secs = self.elapsed_secs(page_num);
        self.bar.println(format!(
            "  {} Page {:>3}/{:<3}  {:<10}  {}",
            green("✓"),
            page_num,
            total,
            dim(&format!("{field_count:>3} fields")),
            dim(&format!("{secs:.1}s")),
        ));
        self.bar.inc(1);
    }

    fn on_page_error(&self, page_num: usize, total: usize, error: &str) {
        let secs = self.elapsed_secs(page_num);
        let msg = match error.char_indices().nth(79) {
            Some((cut, _)) => format!("{}\u{2026}", &error[..cut]),
            None => error.to_string(),
        };
        self.bar.println(format!(
            "  {} Page {:>3}/{:<3}  {}  {}",
            red("✗"),
            page_num,
            total,
            red(&msg),
            dim(&format!("{secs:.1}s")),
        ));
        self.bar.inc(1);
    }

    fn on_extraction_complete(&self, _total_pages: usize, _success_count: usize) {
        self.bar.finish_and_clear();
    }
}

const AFTER_HELP: &str = r#"EXAMPLES:
  # Extract a W-2 to stdout
  taxdoc w2_2024.pdf --doc-type W-2

  # Write the JSON blob to a file
  taxdoc statement.pdf --doc-type "Profit and Loss Statement" -o pnl.json

  # Any other label uses the generic template
  taxdoc k1.pdf --doc-type "Schedule K-1"

  # Use OpenAI through edgequake-llm instead of Gemini
  taxdoc invoice.pdf --doc-type Invoice --provider openai --model gpt-4.1-mini

  # List the document types with dedicated templates
  taxdoc --list-types

ENVIRONMENT VARIABLES:
  GEMINI_API_KEY          Google Gemini API key (native backend)
  OPENAI_API_KEY          OpenAI API key
  ANTHROPIC_API_KEY       Anthropic API key
  EDGEQUAKE_LLM_PROVIDER  Provider used when no key/provider is given
  EDGEQUAKE_MODEL         Model used with EDGEQUAKE_LLM_PROVIDER
  PDFIUM_LIB_PATH         Path to libpdfium (file or directory)
  RUST_LOG                Override the log filter
"#;

/// Extract structured fields from tax and financial PDFs using Vision LLMs.
#[derive(Parser, Debug)]
#[command(
    name = "taxdoc",
    version,
    about = "Extract structured fields from tax and financial PDFs using Vision LLMs",
    long_about = "Rasterize every page of a tax or financial document and ask a Vision \
Language Model for the fields of that document type. Prints one JSON record per page, \
keyed page_1, page_2, …. Supports Google Gemini natively and OpenAI, Anthropic, Azure \
and Ollama through edgequake-llm.",
    arg_required_else_help = true,
    color = clap::ColorChoice::Auto,
    after_long_help = AFTER_HELP
)]
struct Cli {
    /// Local PDF file path.
    #[arg(required_unless_present = "list_types")]
    input: Option<PathBuf>,

    /// Document type label, e.g. W-2, 1099-NEC, Invoice, Other.
    #[arg(short = 't', long, env = "TAXDOC_DOC_TYPE", required_unless_present = "list_types")]
    doc_type: Option<String>,

    /// Write the JSON blob to this file instead of stdout.
    #[arg(short, long, env = "TAXDOC_OUTPUT")]
    output: Option<PathBuf>,

    /// Backend: gemini (native) or any edgequake-llm provider (openai, anthropic, ollama, azure).
    #[arg(long, env = "TAXDOC_PROVIDER")]
    provider: Option<String>,

    /// Model ID (e.g. gemini-2.5-flash, gpt-4.1-nano).
    #[arg(long, env = "TAXDOC_MODEL")]
    model: Option<String>,

    /// Gemini API key (defaults to GEMINI_API_KEY).
    #[arg(long, env = "TAXDOC_API_KEY", hide_env_values = true)]
    api_key: Option<String>,

    /// Pages in flight at once.
    #[arg(short, long, env = "TAXDOC_CONCURRENCY", default_value_t = 1,
          value_parser = clap::value_parser!(u16).range(1..))]
    concurrency: u16,

    /// Retries per page on transient model failures.
    #[arg(long, env = "TAXDOC_MAX_RETRIES", default_value_t = 3)]
    max_retries: u32,

    /// Per-call model timeout in seconds.
    #[arg(long, env = "TAXDOC_API_TIMEOUT", default_value_t = 120)]
    api_timeout: u64,

    /// Longest rendered page edge in pixels.
    #[arg(long, env = "TAXDOC_MAX_PIXELS", default_value_t = 2000,
          value_parser = clap::value_parser!(u32).range(100..))]
    max_pixels: u32,

    /// Max model output tokens per page.
    #[arg(long, env = "TAXDOC_MAX_TOKENS", default_value_t = 4096)]
    max_tokens: usize,

    /// PDF user password for encrypted documents.
    #[arg(long, env = "TAXDOC_PASSWORD", hide_env_values = true)]
    password: Option<String>,

    /// Disable progress bar.
    #[arg(long, env = "TAXDOC_NO_PROGRESS")]
    no_progress: bool,

    /// Print the document types that have dedicated templates and exit.
    #[arg(long)]
    list_types: bool,

    /// Enable DEBUG-level tracing logs.
    #[arg(short, long, env = "TAXDOC_VERBOSE")]
    verbose: bool,

    /// Suppress all output except errors.
    #[arg(short, long, env = "TAXDOC_QUIET")]
    quiet: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    if cli.list_types {
        for (label, _) in SPECIALIZED_TYPES {
            println!("{label}");
        }
        println!("{} {}", taxdoc_extract::OTHER_DOCUMENT_TYPE, dim("(generic template)"));
        return Ok(());
    }

    // ── Logging setup ────────────────────────────────────────────────────
    // The progress bar replaces INFO logs unless --verbose is given.
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

    let input = cli.input.clone().context("missing INPUT")?;
    let doc_type = cli.doc_type.clone().context("missing --doc-type")?;

    let progress = show_progress.then(CliProgressCallback::new_dynamic);
    let config = build_config(
        &cli,
        progress
            .clone()
            .map(|p| p as Arc<dyn ExtractionProgressCallback>),
    )?;

    // ── Run extraction ───────────────────────────────────────────────────
    let start = Instant::now();
    let extraction = match cli.output {
        Some(ref path) => extract_to_file(&input, &doc_type, path, &config)
            .await
            .inspect_err(|_| clear_progress(progress.as_deref()))
            .with_context(|| format!("Failed to write {}", path.display()))?,
        None => {
            let extraction =
                DocumentExtraction::from(extract_document(&input, &doc_type, &config).await);
            let json = extraction
                .to_json_pretty()
                .context("Failed to serialise result")?;
            let stdout = io::stdout();
            let mut handle = stdout.lock();
            writeln!(handle, "{json}").context("Failed to write to stdout")?;
            extraction
        }
    };
    let failed = extraction.error().is_some();

    // ── Summary ──────────────────────────────────────────────────────────
    match extraction {
        DocumentExtraction::Pages(ref pages) => {
            let summary = ExtractionSummary::from_pages(pages);
            if !cli.quiet {
                eprintln!("{summary}");
                eprintln!(
                    "{}  {}/{} pages  {}ms{}",
                    if summary.has_errors() { cyan("⚠") } else { green("✔") },
                    summary.success_count,
                    summary.pages.len(),
                    start.elapsed().as_millis(),
                    cli.output
                        .as_ref()
                        .map(|p| format!("  →  {}", bold(&p.display().to_string())))
                        .unwrap_or_default(),
                );
            }
        }
        DocumentExtraction::Failed { ref error } => {
            clear_progress(progress.as_deref());
            eprintln!("{} {}", red("✘"), error);
        }
    }

    if failed {
        std::process::exit(1);
    }
    Ok(())
}

/// Stop the spinner when extraction ends without `on_extraction_complete`.
fn clear_progress(progress: Option<&CliProgressCallback>) {
    if let Some(p) = progress {
        p.bar.finish_and_clear();
    }
}

/// Map CLI args to `ExtractionConfig`.
fn build_config(cli: &Cli, progress: Option<ProgressCallback>) -> Result<ExtractionConfig> {
    let mut builder = ExtractionConfig::builder()
        .concurrency(cli.concurrency as usize)
        .max_retries(cli.max_retries)
        .api_timeout_secs(cli.api_timeout)
        .max_rendered_pixels(cli.max_pixels)
        .max_tokens(cli.max_tokens);

    if let Some(ref p) = cli.provider {
        builder = builder.provider_name(p);
    }
    if let Some(ref m) = cli.model {
        builder = builder.model(m);
    }
    if let Some(ref k) = cli.api_key {
        builder = builder.api_key(k);
    }
    if let Some(ref pwd) = cli.password {
        builder = builder.password(pwd);
    }
    if let Some(cb) = progress {
        builder = builder.progress_callback(cb);
    }

    builder.build().context("Invalid configuration")
}
