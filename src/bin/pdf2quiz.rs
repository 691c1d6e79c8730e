//! CLI binary for pdf2quiz.
//!
//! A thin shim over the library crate. Two modes:
//!
//! * local (default): extract, generate, render, write the quiz PDF to a
//!   file — no storage or email credentials needed beyond the LLM key
//! * deliver (`--email`): the full pipeline including upload and
//!   notification, wired from `STORAGE_*` and `BREVO_*` env vars

use anyhow::{Context, Result};
use clap::Parser;
use pdf2quiz::notify::BrevoNotifier;
use pdf2quiz::pipeline::extract::{PdfiumExtractor, TextExtractor};
use pdf2quiz::pipeline::generate::LlmQuizGenerator;
use pdf2quiz::pipeline::{batch, pool, render};
use pdf2quiz::storage::S3CompatibleStore;
use pdf2quiz::{Collaborators, IngestionTask, PipelineConfig, QuizError};
use std::io::{self, Read};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::watch;
use tracing_subscriber::EnvFilter;

const AFTER_HELP: &str = r#"EXAMPLES:
  # Generate a quiz PDF from a local document
  pdf2quiz lecture.pdf -o lecture_quiz.pdf

  # Use a specific model
  pdf2quiz --model gpt-4.1-mini lecture.pdf

  # Full delivery: upload the quiz and email a download link
  pdf2quiz lecture.pdf --email student@example.com

ENVIRONMENT VARIABLES:
  OPENAI_API_KEY          OpenAI API key
  ANTHROPIC_API_KEY       Anthropic API key
  GEMINI_API_KEY          Google Gemini API key
  STORAGE_ENDPOINT        S3-compatible endpoint (delivery mode)
  STORAGE_BUCKET          Bucket name (delivery mode)
  STORAGE_PUBLIC_URL      Public base URL for stored objects (delivery mode)
  STORAGE_API_TOKEN       Bearer token for the storage endpoint (delivery mode)
  BREVO_API_KEY           Brevo transactional-email key (delivery mode)
  BREVO_FROM_NAME         Sender display name (optional)
  BREVO_FROM_EMAIL        Sender address (optional)

SETUP:
  1. Set API key:     export OPENAI_API_KEY=sk-...
  2. Generate:        pdf2quiz lecture.pdf -o quiz.pdf
"#;

/// Generate multiple-choice quiz PDFs from PDF documents using LLMs.
#[derive(Parser, Debug)]
#[command(
    name = "pdf2quiz",
    version,
    about = "Generate multiple-choice quiz PDFs from PDF documents using LLMs",
    arg_required_else_help = true,
    after_long_help = AFTER_HELP
)]
struct Cli {
    /// Local PDF file path.
    input: PathBuf,

    /// Write the rendered quiz PDF here (local mode).
    #[arg(short, long, default_value = "quiz.pdf")]
    output: PathBuf,

    /// Deliver instead: upload the quiz and email this address a link.
    #[arg(long)]
    email: Option<String>,

    /// LLM model ID (e.g. gpt-4.1-nano, claude-sonnet-4-20250514).
    #[arg(long, env = "EDGEQUAKE_MODEL")]
    model: Option<String>,

    /// LLM provider: openai, anthropic, gemini, ollama.
    #[arg(long, env = "EDGEQUAKE_PROVIDER")]
    provider: Option<String>,

    /// Number of concurrent generation workers.
    #[arg(short, long, default_value_t = 3)]
    workers: usize,

    /// Pages per generation batch.
    #[arg(long, default_value_t = 10)]
    batch_size: usize,

    /// Maximum page count before the document is rejected.
    #[arg(long, default_value_t = 300)]
    max_pages: usize,

    /// Enable DEBUG-level tracing logs.
    #[arg(short, long)]
    verbose: bool,

    /// Suppress all output except errors.
    #[arg(short, long)]
    quiet: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let filter = if cli.quiet {
        "error"
    } else if cli.verbose {
        "debug"
    } else {
        "info"
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)),
        )
        .with_writer(io::stderr)
        .init();

    validate_pdf_input(&cli.input)?;

    let mut builder = PipelineConfig::builder()
        .workers(cli.workers)
        .batch_capacity(cli.batch_size)
        .max_pages(cli.max_pages);
    if let Some(ref model) = cli.model {
        builder = builder.model(model.clone());
    }
    if let Some(ref provider) = cli.provider {
        builder = builder.provider_name(provider.clone());
    }
    let config = builder.build().context("Invalid configuration")?;

    match cli.email {
        Some(ref email) => run_deliver(&cli, email, config).await,
        None => run_local(&cli, config).await,
    }
}

/// Reject inputs that are not PDFs before any expensive work: the file must
/// carry a `.pdf` extension and start with the `%PDF` magic bytes.
fn validate_pdf_input(input: &Path) -> Result<()> {
    let is_pdf_ext = input
        .extension()
        .map(|e| e.eq_ignore_ascii_case("pdf"))
        .unwrap_or(false);
    if !is_pdf_ext {
        return Err(QuizError::NotAPdf {
            input: input.display().to_string(),
        }
        .into());
    }

    let mut magic = [0u8; 4];
    let mut file = std::fs::File::open(input)
        .with_context(|| format!("Failed to open {}", input.display()))?;
    file.read_exact(&mut magic)
        .with_context(|| format!("Failed to read {}", input.display()))?;
    if &magic != b"%PDF" {
        return Err(QuizError::NotAPdf {
            input: input.display().to_string(),
        }
        .into());
    }
    Ok(())
}

/// Local mode: run extraction through rendering and write the PDF to disk.
async fn run_local(cli: &Cli, config: PipelineConfig) -> Result<()> {
    let extractor = PdfiumExtractor::new(config.clone());
    let generator: Arc<dyn pdf2quiz::QuizGenerator> =
        Arc::new(LlmQuizGenerator::from_config(&config)?);

    let extraction = extractor
        .extract(&cli.input)
        .await
        .context("Extraction failed")?;
    let pages = extraction.into_pages();
    if pages.len() > config.max_pages {
        return Err(QuizError::TooManyPages {
            pages: pages.len(),
            limit: config.max_pages,
        }
        .into());
    }

    let batches = batch::partition(&pages, config.batch_capacity);
    let total = batches.len();
    let (_cancel_tx, cancel_rx) = watch::channel(false);
    let per_worker = pool::run_pool(generator, batches, &config, cancel_rx).await;
    let (questions, results) = pool::merge(per_worker);
    let failed = results.iter().filter(|r| r.error.is_some()).count();

    let pdf = render::render_pdf(&questions).context("Rendering failed")?;
    std::fs::write(&cli.output, &pdf)
        .with_context(|| format!("Failed to write {}", cli.output.display()))?;

    if !cli.quiet {
        eprintln!(
            "{} question(s) from {}/{} batch(es) → {}",
            questions.len(),
            total - failed,
            total,
            cli.output.display()
        );
    }
    Ok(())
}

/// Delivery mode: full pipeline with upload and email notification.
async fn run_deliver(cli: &Cli, email: &str, config: PipelineConfig) -> Result<()> {
    let deps = Collaborators {
        store: Arc::new(S3CompatibleStore::from_env().context("Storage is not configured")?),
        extractor: Arc::new(PdfiumExtractor::new(config.clone())),
        generator: Arc::new(LlmQuizGenerator::from_config(&config)?),
        notifier: Arc::new(BrevoNotifier::from_env().context("Brevo is not configured")?),
    };
    let task = IngestionTask::new(deps, config);
    let report = task
        .run_local(&cli.input, email)
        .await
        .context("Pipeline failed")?;

    if !cli.quiet {
        eprintln!(
            "{} question(s) from {}/{} batch(es)",
            report.questions,
            report.total_batches - report.failed_batches,
            report.total_batches,
        );
        match report.delivery.location {
            Some(ref loc) => eprintln!("Stored at {}", loc),
            None => eprintln!("Stored"),
        }
        if report.delivery.notified {
            eprintln!("Notification sent to {}", email);
        } else {
            eprintln!("Notification to {} failed; the quiz is still stored", email);
        }
    }
    Ok(())
}
