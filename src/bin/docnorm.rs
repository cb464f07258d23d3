//! CLI binary for docnorm.
//!
//! A thin shim over the library crate that maps CLI flags
//! to `ProcessorConfig` and prints results.

use anyhow::{bail, Context, Result};
use clap::Parser;
use docnorm::{ApiMode, Document, DocumentProcessor, ProcessorConfig};
use futures::stream::{self, StreamExt};
use indicatif::{ProgressBar, ProgressStyle};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};
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

const AFTER_HELP: &str = r#"EXAMPLES:
  # Local extraction, print text
  docnorm report.pdf

  # Full Document records as JSON
  docnorm --json report.pdf > report.json

  # Many files, one JSON per file, 8 at a time
  docnorm -o out/ --concurrency 8 scans/*.pdf

  # Cloud OCR with local fallback
  AWS_TEXTRACT_ENABLED=true AWS_REGION=eu-west-1 docnorm invoice.png

  # Show the effective routing mode and exit
  docnorm --show-config

ENVIRONMENT VARIABLES:
  AWS_TEXTRACT_ENABLED       Enable cloud OCR (default: false)
  AWS_REGION                 Cloud region (default: us-east-1)
  AWS_ACCESS_KEY_ID          Access key for request signing
  AWS_SECRET_ACCESS_KEY      Secret key for request signing
  AWS_SESSION_TOKEN          Session token for temporary credentials
  TEXTRACT_ENDPOINT          Endpoint override
  TEXTRACT_API_MODE          detect | analyze (default: analyze)
  TEXTRACT_MAX_FILE_SIZE_MB  Cloud size limit in MB (default: 10)
  TEXTRACT_MAX_PAGES         Cloud page limit (default: 100)
  USE_LOCAL_FALLBACK         Use local extraction (default: true)
  ENABLE_TABLE_EXTRACTOR     Run the grid table reader (default: true)
  CHUNK_SIZE                 Chunk threshold in characters (default: 1500)
  LOG_PROCESSOR_SELECTION    Log the backend picked per file (default: true)
  PDFIUM_LIB_PATH            libpdfium file or directory (default: system library)
"#;

/// Extract text and tables from documents into chunked JSON records.
#[derive(Parser, Debug)]
#[command(
    name = "docnorm",
    version,
    about = "Extract text and tables from documents into chunked JSON records",
    long_about = "Extract text and tables from PDFs, images and markdown files. Documents go to \
AWS Textract when it is enabled and the file is within its limits, and to a local pdfium \
extractor otherwise or when the cloud call fails.",
    arg_required_else_help = true,
    color = clap::ColorChoice::Auto,
    after_long_help = AFTER_HELP
)]
struct Cli {
    /// Files to process.
    #[arg(required_unless_present = "show_config")]
    files: Vec<PathBuf>,

    /// Write one `<name>.json` per input into this directory.
    #[arg(short, long, env = "DOCNORM_OUTPUT_DIR")]
    output_dir: Option<PathBuf>,

    /// Content type for every input, overriding extension detection.
    #[arg(long)]
    content_type: Option<String>,

    /// Print full Document JSON instead of text.
    #[arg(long, env = "DOCNORM_JSON")]
    json: bool,

    /// Number of documents processed at once.
    #[arg(short, long, env = "DOCNORM_CONCURRENCY", default_value_t = 4,
          value_parser = clap::value_parser!(u16).range(1..=64))]
    concurrency: u16,

    /// Print the effective configuration and exit.
    #[arg(long)]
    show_config: bool,

    // ── Cloud ────────────────────────────────────────────────────────────
    /// Send eligible documents to the cloud OCR service.
    #[arg(long, env = "AWS_TEXTRACT_ENABLED")]
    cloud: bool,

    #[arg(long, env = "AWS_REGION", default_value = docnorm::config::DEFAULT_REGION)]
    region: String,

    #[arg(long, env = "AWS_ACCESS_KEY_ID", hide_env_values = true)]
    access_key_id: Option<String>,

    #[arg(long, env = "AWS_SECRET_ACCESS_KEY", hide_env_values = true)]
    secret_access_key: Option<String>,

    #[arg(long, env = "AWS_SESSION_TOKEN", hide_env_values = true)]
    session_token: Option<String>,

    /// Endpoint override, e.g. a local mock.
    #[arg(long, env = "TEXTRACT_ENDPOINT")]
    endpoint: Option<String>,

    /// detect (text only) or analyze (text + tables + forms).
    #[arg(long, env = "TEXTRACT_API_MODE", default_value = "analyze")]
    api_mode: ApiMode,

    #[arg(long, env = "TEXTRACT_MAX_FILE_SIZE_MB", default_value_t = 10)]
    max_file_size_mb: u64,

    #[arg(long, env = "TEXTRACT_MAX_PAGES", default_value_t = 100)]
    max_pages: usize,

    /// Cloud call timeout in seconds.
    #[arg(long, env = "TEXTRACT_API_TIMEOUT", default_value_t = 60)]
    api_timeout: u64,

    // ── Local ────────────────────────────────────────────────────────────
    /// Use the local extractor (alone, or after a failed cloud call).
    #[arg(long, env = "USE_LOCAL_FALLBACK", default_value_t = true,
          action = clap::ArgAction::Set)]
    local_fallback: bool,

    /// Run the positional grid table reader.
    #[arg(long, env = "ENABLE_TABLE_EXTRACTOR", default_value_t = true,
          action = clap::ArgAction::Set)]
    table_extractor: bool,

    #[arg(long, env = "PDFIUM_LIB_PATH")]
    pdfium_lib_path: Option<PathBuf>,

    // ── Output ───────────────────────────────────────────────────────────
    /// Chunk threshold in characters.
    #[arg(long, env = "CHUNK_SIZE", default_value_t = 1500)]
    chunk_size: usize,

    /// Log which backend handles each file.
    #[arg(long, env = "LOG_PROCESSOR_SELECTION", default_value_t = true,
          action = clap::ArgAction::Set)]
    log_selection: bool,

    /// Disable progress bar.
    #[arg(long, env = "DOCNORM_NO_PROGRESS")]
    no_progress: bool,

    /// Enable DEBUG-level tracing logs.
    #[arg(short, long, env = "DOCNORM_VERBOSE")]
    verbose: bool,

    /// Suppress all output except errors.
    #[arg(short, long, env = "DOCNORM_QUIET")]
    quiet: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // ── Logging setup ────────────────────────────────────────────────────
    // INFO logs would tear through the progress bar; keep them for
    // single-file and no-progress runs.
    let show_progress = !cli.quiet && !cli.no_progress && !cli.json && cli.files.len() > 1;
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

    let config = build_config(&cli)?;

    if cli.show_config {
        println!("Mode:    {}", config.processor_mode());
        println!("{:#?}", config);
        return Ok(());
    }

    let processor = DocumentProcessor::new(config);

    if let Some(ref dir) = cli.output_dir {
        tokio::fs::create_dir_all(dir)
            .await
            .with_context(|| format!("Failed to create output directory {}", dir.display()))?;
    }

    // ── Progress bar ─────────────────────────────────────────────────────
    let bar = if show_progress {
        let bar = ProgressBar::new(cli.files.len() as u64);
        bar.set_style(
            ProgressStyle::with_template(
                "{spinner:.cyan} {prefix:.bold}  \
                 [{bar:42.green/238}] {pos:>3}/{len} files  \
                 ⏱ {elapsed_precise}  ETA {eta_precise}",
            )
            .unwrap_or_else(|_| ProgressStyle::default_bar())
            .progress_chars("█▉▊▋▌▍▎▏  ")
            .tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏", "⠿"]),
        );
        bar.set_prefix("Processing");
        bar.enable_steady_tick(Duration::from_millis(80));
        Some(bar)
    } else {
        None
    };

    // ── Run ──────────────────────────────────────────────────────────────
    let start = Instant::now();
    let processor = &processor;
    let content_type = cli.content_type.as_deref();
    let output_dir = cli.output_dir.as_deref();
    let bar_ref = bar.as_ref();

    let mut results: Vec<(usize, Result<Document>)> = stream::iter(cli.files.iter().enumerate())
        .map(|(i, path)| async move {
            let result = match output_dir {
                Some(dir) => processor
                    .process_to_file(path, content_type, output_path(dir, path))
                    .await
                    .with_context(|| format!("Failed to write output for {}", path.display())),
                None => Ok(processor.process(path, content_type).await),
            };
            if let Some(bar) = bar_ref {
                if let Ok(ref doc) = result {
                    bar.println(file_line(doc));
                }
                bar.inc(1);
            }
            (i, result)
        })
        .buffer_unordered(cli.concurrency as usize)
        .collect()
        .await;

    if let Some(bar) = bar {
        bar.finish_and_clear();
    }
    results.sort_by_key(|(i, _)| *i);

    let mut documents = Vec::with_capacity(results.len());
    for (_, result) in results {
        documents.push(result?);
    }

    // ── Print ────────────────────────────────────────────────────────────
    if output_dir.is_none() {
        print_documents(&documents, cli.json)?;
    }

    let failed = documents.iter().filter(|d| !d.success).count();
    if !cli.quiet && !cli.json {
        eprintln!(
            "{}  {}/{} documents  {}ms",
            if failed == 0 { green("✔") } else { red("✘") },
            documents.len() - failed,
            documents.len(),
            start.elapsed().as_millis(),
        );
        for doc in documents.iter().filter(|d| !d.success) {
            eprintln!(
                "   {} {}",
                red(&doc.file_name),
                dim(doc.error.as_deref().unwrap_or_default())
            );
        }
    }

    if failed > 0 {
        bail!("{} of {} documents failed", failed, documents.len());
    }
    Ok(())
}

/// Map CLI args to `ProcessorConfig`.
fn build_config(cli: &Cli) -> Result<ProcessorConfig> {
    let mut builder = ProcessorConfig::builder()
        .cloud_enabled(cli.cloud)
        .region(cli.region.clone())
        .api_mode(cli.api_mode)
        .max_file_size_mb(cli.max_file_size_mb)
        .max_pages(cli.max_pages)
        .api_timeout_secs(cli.api_timeout)
        .local_fallback(cli.local_fallback)
        .table_extractor_enabled(cli.table_extractor)
        .chunk_size(cli.chunk_size)
        .log_processor_selection(cli.log_selection);

    if let (Some(id), Some(secret)) = (&cli.access_key_id, &cli.secret_access_key) {
        builder = builder.credentials(id.clone(), secret.clone());
    }
    if let Some(ref token) = cli.session_token {
        builder = builder.session_token(token.clone());
    }
    if let Some(ref endpoint) = cli.endpoint {
        builder = builder.endpoint(endpoint.clone());
    }
    if let Some(ref path) = cli.pdfium_lib_path {
        builder = builder.pdfium_lib_path(path.clone());
    }

    builder.build().context("Invalid configuration")
}

fn output_path(dir: &Path, input: &Path) -> PathBuf {
    let stem = input
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "document".to_string());
    dir.join(format!("{stem}.json"))
}

fn file_line(doc: &Document) -> String {
    if doc.success {
        format!(
            "  {} {:<32}  {}",
            green("✓"),
            doc.file_name,
            dim(&format!(
                "{} · {} pages · {} chunks · {} tables",
                doc.processor,
                doc.metadata.page_count,
                doc.chunks.len(),
                doc.tables.len()
            )),
        )
    } else {
        format!("  {} {:<32}  {}", red("✗"), doc.file_name, red("failed"))
    }
}

fn print_documents(documents: &[Document], json: bool) -> Result<()> {
    let stdout = io::stdout();
    let mut handle = stdout.lock();

    if json {
        let out = match documents {
            [single] => serde_json::to_string_pretty(single),
            many => serde_json::to_string_pretty(many),
        }
        .context("Failed to serialise output")?;
        writeln!(handle, "{out}").context("Failed to write to stdout")?;
        return Ok(());
    }

    for doc in documents {
        if documents.len() > 1 {
            writeln!(handle, "{}", bold(&format!("==> {} <==", doc.file_name)))
                .context("Failed to write to stdout")?;
        }
        if doc.success {
            handle
                .write_all(doc.content.as_bytes())
                .context("Failed to write to stdout")?;
            // Ensure a trailing newline on stdout.
            if !doc.content.ends_with('\n') {
                handle.write_all(b"\n").ok();
            }
        }
    }
    Ok(())
}
