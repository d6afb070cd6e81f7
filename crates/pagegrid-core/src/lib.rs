use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;
use tokio_util::sync::CancellationToken;

pub mod backend;
pub mod batch;
pub mod config_file;
pub mod detect;
pub mod engine;
pub mod pool;
pub mod sheet;
pub mod tables;

// Re-export for convenience
pub use backend::{BackendError, OcrEngine, OcrError, OcrLine, PageImage, PdfBackend, Word};
pub use batch::{PageBatch, default_max_workers, plan_batches, worker_count};
pub use detect::{PdfKind, detect_kind};
pub use sheet::Sheet;
pub use tables::{Table, TableSettings};

/// Default number of leading pages inspected when deciding whether a PDF is scanned.
pub const DEFAULT_CHECK_PAGES: u32 = 3;
/// A page whose trimmed text is longer than this counts as having a text layer.
pub const DEFAULT_MIN_TEXT_CHARS: usize = 20;
/// Pages rasterized and recognized together by one worker.
pub const DEFAULT_BATCH_SIZE: u32 = 8;
/// Upper bound on OCR workers regardless of core count.
pub const MAX_WORKERS_CAP: usize = 6;
/// Rasterization resolution for OCR.
pub const DEFAULT_DPI: u32 = 200;

/// Which extraction path to take.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ExtractMode {
    /// Detect the PDF kind and pick the matching path.
    #[default]
    Auto,
    /// Always parse the text layer.
    Text,
    /// Always rasterize and OCR.
    Ocr,
}

impl std::str::FromStr for ExtractMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "auto" => Ok(Self::Auto),
            "text" => Ok(Self::Text),
            "ocr" => Ok(Self::Ocr),
            other => Err(format!("unknown extraction mode: {other}")),
        }
    }
}

#[derive(Error, Debug)]
pub enum ExtractError {
    #[error("PDF backend error: {0}")]
    Backend(#[from] BackendError),
    #[error("OCR error: {0}")]
    Ocr(#[from] OcrError),
    #[error("file not found: {}", .0.display())]
    NotFound(PathBuf),
    #[error("extraction cancelled")]
    Cancelled,
    #[error("worker failed: {0}")]
    Worker(String),
}

/// Progress events emitted during extraction.
#[derive(Debug, Clone)]
pub enum ProgressEvent {
    Detected {
        kind: PdfKind,
        page_count: u32,
    },
    /// A page of a native-text PDF was scanned for tables.
    PageScanned {
        page: u32,
        total: u32,
        tables: usize,
    },
    BatchStarted {
        batch: PageBatch,
        total_batches: usize,
    },
    BatchComplete {
        batch: PageBatch,
        total_batches: usize,
        lines: usize,
        elapsed: Duration,
    },
    Finished {
        rows: usize,
        elapsed: Duration,
    },
}

/// Shared progress callback type.
pub type ProgressFn = Arc<dyn Fn(ProgressEvent) + Send + Sync>;

/// Configuration for an extraction run.
#[derive(Debug, Clone)]
pub struct Config {
    pub mode: ExtractMode,
    pub check_pages: u32,
    pub min_text_chars: usize,
    pub batch_size: u32,
    pub max_workers: usize,
    pub dpi: u32,
    /// OCR lines below this confidence (0-100) are dropped. `None` keeps all.
    pub min_confidence: Option<f32>,
    pub tables: TableSettings,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            mode: ExtractMode::Auto,
            check_pages: DEFAULT_CHECK_PAGES,
            min_text_chars: DEFAULT_MIN_TEXT_CHARS,
            batch_size: DEFAULT_BATCH_SIZE,
            max_workers: default_max_workers(),
            dpi: DEFAULT_DPI,
            min_confidence: None,
            tables: TableSettings::default(),
        }
    }
}

/// The outcome of a complete extraction run.
#[derive(Debug, Clone)]
pub struct Extraction {
    pub kind: PdfKind,
    pub page_count: u32,
    /// Number of tables found (native-text path only).
    pub tables: usize,
    pub sheet: Sheet,
    pub elapsed: Duration,
}

/// Extract tabular content from a PDF into a single sheet.
///
/// Native-text PDFs go through table detection on the text layer; scanned
/// PDFs are rasterized in page batches and fanned out to OCR workers.
/// Progress events are emitted via the callback and the run can be
/// cancelled via the CancellationToken.
pub async fn extract_pdf(
    path: &Path,
    backend: Arc<dyn PdfBackend>,
    ocr: Arc<dyn OcrEngine>,
    config: Config,
    progress: impl Fn(ProgressEvent) + Send + Sync + 'static,
    cancel: CancellationToken,
) -> Result<Extraction, ExtractError> {
    engine::extract_pdf(path, backend, ocr, config, Arc::new(progress), cancel).await
}

impl From<tokio::task::JoinError> for ExtractError {
    fn from(err: tokio::task::JoinError) -> Self {
        ExtractError::Worker(err.to_string())
    }
}
