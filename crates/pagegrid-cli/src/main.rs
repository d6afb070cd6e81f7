use std::io::{IsTerminal, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use clap::{Parser, Subcommand};
use indicatif::{ProgressBar, ProgressStyle};
use pagegrid_core::{ExtractError, ExtractMode, PdfBackend, PdfKind, ProgressEvent};
use pagegrid_ocr_tesseract::TesseractEngine;
use pagegrid_pdf_mupdf::MupdfBackend;
use pagegrid_reporting::ExportFormat;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

mod output;
mod settings;

use output::ColorMode;
use settings::{ExtractFlags, output_target, resolve};

/// Extract tables and text from PDFs into spreadsheets, using OCR for scanned documents
#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
struct Cli {
    /// Write logs to this file instead of stderr
    #[arg(long, global = true)]
    log_file: Option<PathBuf>,

    /// Disable colored output
    #[arg(long, global = true)]
    no_color: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Extract a PDF into a spreadsheet
    Extract {
        /// Path to the PDF file
        file_path: PathBuf,

        /// Output file (default: <input>.csv next to the input)
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Output format: csv, json, md or txt (default: from the output extension)
        #[arg(long)]
        format: Option<ExportFormat>,

        /// Extraction path: auto, text or ocr
        #[arg(long)]
        mode: Option<ExtractMode>,

        /// Maximum number of OCR workers
        #[arg(long)]
        workers: Option<usize>,

        /// Pages per OCR batch
        #[arg(long)]
        batch_size: Option<u32>,

        /// Rasterization resolution for OCR
        #[arg(long)]
        dpi: Option<u32>,

        /// Tesseract language, e.g. "eng" or "eng+deu"
        #[arg(long)]
        lang: Option<String>,

        /// Directory containing Tesseract traineddata files
        #[arg(long)]
        tessdata: Option<String>,

        /// Drop OCR lines below this confidence (0-100)
        #[arg(long)]
        min_confidence: Option<f32>,

        /// Number of rows to preview after extraction (0 to disable)
        #[arg(long)]
        preview: Option<usize>,

        /// Hide the progress bar
        #[arg(short, long)]
        quiet: bool,
    },

    /// Report whether a PDF has a text layer or needs OCR
    Detect {
        /// Path to the PDF file
        file_path: PathBuf,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();
    let _log_guard = init_tracing(cli.log_file.as_deref())?;

    let color = ColorMode(!cli.no_color && std::io::stdout().is_terminal());

    match cli.command {
        Command::Detect { file_path } => detect(file_path, color).await,
        Command::Extract {
            file_path,
            output,
            format,
            mode,
            workers,
            batch_size,
            dpi,
            lang,
            tessdata,
            min_confidence,
            preview,
            quiet,
        } => {
            let flags = ExtractFlags {
                mode,
                workers,
                batch_size,
                dpi,
                lang,
                tessdata,
                min_confidence,
                format,
                preview,
            };
            extract(file_path, output, flags, quiet, color).await
        }
    }
}

/// Install the tracing subscriber. `RUST_LOG` overrides the default `warn`
/// level. The returned guard flushes the log file on drop.
fn init_tracing(
    log_file: Option<&Path>,
) -> anyhow::Result<Option<tracing_appender::non_blocking::WorkerGuard>> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    match log_file {
        Some(path) => {
            let file = std::fs::File::create(path)?;
            let (writer, guard) = tracing_appender::non_blocking(file);
            tracing_subscriber::fmt()
                .with_env_filter(filter)
                .with_writer(writer)
                .with_ansi(false)
                .init();
            Ok(Some(guard))
        }
        None => {
            tracing_subscriber::fmt()
                .with_env_filter(filter)
                .with_writer(std::io::stderr)
                .init();
            Ok(None)
        }
    }
}

fn display_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_else(|| path.display().to_string())
}

async fn detect(file_path: PathBuf, color: ColorMode) -> anyhow::Result<()> {
    if !file_path.exists() {
        anyhow::bail!("File not found: {}", file_path.display());
    }

    let file_config = pagegrid_core::config_file::load_config();
    let mut config = pagegrid_core::Config::default();
    file_config.apply_to(&mut config);

    let path = file_path.clone();
    let (kind, page_count) = tokio::task::spawn_blocking(move || {
        let backend = MupdfBackend::new();
        let kind = pagegrid_core::detect_kind(
            &backend,
            &path,
            config.check_pages,
            config.min_text_chars,
        );
        backend.page_count(&path).map(|count| (kind, count))
    })
    .await??;

    let mut stdout = std::io::stdout();
    output::print_detection(&mut stdout, &display_name(&file_path), kind, page_count, color)?;
    Ok(())
}

fn progress_bar(quiet: bool) -> ProgressBar {
    if quiet {
        return ProgressBar::hidden();
    }
    let bar = ProgressBar::new(0);
    bar.set_style(
        ProgressStyle::with_template("{spinner:.green} {msg} [{bar:40.green/dim}] {pos}/{len} pages (eta {eta})")
            .unwrap()
            .progress_chars("=> "),
    );
    bar.set_message("Detecting PDF type...");
    bar.enable_steady_tick(Duration::from_millis(120));
    bar
}

async fn extract(
    file_path: PathBuf,
    output: Option<PathBuf>,
    flags: ExtractFlags,
    quiet: bool,
    color: ColorMode,
) -> anyhow::Result<()> {
    if !file_path.exists() {
        anyhow::bail!("File not found: {}", file_path.display());
    }

    let file_config = pagegrid_core::config_file::load_config();
    let settings = resolve(&flags, &|key: &str| std::env::var(key).ok(), &file_config);
    let (output_path, format) = output_target(
        &file_path,
        output.as_deref(),
        settings.format,
        settings.default_format,
    );

    tracing::info!(
        input = %file_path.display(),
        output = %output_path.display(),
        ?format,
        workers = settings.config.max_workers,
        batch_size = settings.config.batch_size,
        lang = %settings.language,
        "starting extraction"
    );

    let backend = Arc::new(MupdfBackend::new());
    let engine = Arc::new(
        TesseractEngine::new(settings.language.clone())
            .with_datapath(settings.tessdata.clone())
            .with_dpi(settings.config.dpi),
    );

    let bar = progress_bar(quiet);
    let progress_cb = {
        let bar = bar.clone();
        move |event: ProgressEvent| match event {
            ProgressEvent::Detected { kind, page_count } => {
                bar.set_length(page_count as u64);
                bar.set_message(match kind {
                    PdfKind::Native => "Reading text layer",
                    PdfKind::Scanned => "Running OCR",
                });
            }
            ProgressEvent::PageScanned { .. } => bar.inc(1),
            ProgressEvent::BatchComplete { batch, .. } => bar.inc(batch.len() as u64),
            ProgressEvent::BatchStarted { .. } => {}
            ProgressEvent::Finished { .. } => bar.finish_and_clear(),
        }
    };

    let cancel = CancellationToken::new();

    // Set up Ctrl+C handler
    let cancel_clone = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            cancel_clone.cancel();
        }
    });

    let result = pagegrid_core::extract_pdf(
        &file_path,
        backend,
        engine,
        settings.config.clone(),
        progress_cb,
        cancel,
    )
    .await;
    bar.finish_and_clear();

    let extraction = match result {
        Ok(extraction) => extraction,
        Err(ExtractError::Cancelled) => anyhow::bail!("Extraction cancelled"),
        Err(e) => return Err(e.into()),
    };

    pagegrid_reporting::export_sheet(&extraction.sheet, format, &output_path)?;

    let mut stdout = std::io::stdout();
    output::print_summary(&mut stdout, &extraction, &output_path, color)?;
    if settings.preview_rows > 0 {
        let preview = pagegrid_reporting::preview(&extraction.sheet, settings.preview_rows);
        output::print_preview(&mut stdout, &preview, settings.preview_rows, color)?;
    }
    stdout.flush()?;
    Ok(())
}
