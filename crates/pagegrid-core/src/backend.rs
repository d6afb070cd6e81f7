use std::path::Path;

use thiserror::Error;

/// In-memory fakes for tests; not part of the supported API.
#[doc(hidden)]
pub mod mock;

#[derive(Error, Debug)]
pub enum BackendError {
    #[error("failed to open PDF: {0}")]
    OpenError(String),
    #[error("failed to extract text: {0}")]
    ExtractionError(String),
    #[error("failed to render page: {0}")]
    RenderError(String),
    #[error("page {page} out of range (document has {page_count} pages)")]
    PageOutOfRange { page: u32, page_count: u32 },
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

#[derive(Error, Debug)]
pub enum OcrError {
    #[error("failed to initialize OCR engine: {0}")]
    Init(String),
    #[error("recognition failed on page {page}: {message}")]
    Recognition { page: u32, message: String },
    #[error("unreadable OCR output: {0}")]
    Output(String),
}

/// A word on a page with its bounding box in PDF points.
///
/// The y axis grows downward, so `y0` is the top edge.
#[derive(Debug, Clone, PartialEq)]
pub struct Word {
    pub text: String,
    pub x0: f32,
    pub y0: f32,
    pub x1: f32,
    pub y1: f32,
}

impl Word {
    pub fn new(text: impl Into<String>, x0: f32, y0: f32, x1: f32, y1: f32) -> Self {
        Self {
            text: text.into(),
            x0,
            y0,
            x1,
            y1,
        }
    }

    pub fn height(&self) -> f32 {
        (self.y1 - self.y0).max(0.0)
    }

    pub fn center_x(&self) -> f32 {
        (self.x0 + self.x1) / 2.0
    }

    pub fn center_y(&self) -> f32 {
        (self.y0 + self.y1) / 2.0
    }
}

/// A rasterized page, PNG encoded.
#[derive(Debug, Clone)]
pub struct PageImage {
    /// 1-based page number.
    pub page: u32,
    pub width: u32,
    pub height: u32,
    pub png: Vec<u8>,
}

/// One line of recognized text.
#[derive(Debug, Clone, PartialEq)]
pub struct OcrLine {
    pub page: u32,
    pub text: String,
    /// Mean word confidence on a 0-100 scale, when the engine reports one.
    pub confidence: Option<f32>,
}

/// Trait for PDF access backends.
///
/// Pages are 1-based. Implementations may open the document on every call;
/// callers batch work ([`render_pages`](PdfBackend::render_pages)) where
/// that cost matters.
pub trait PdfBackend: Send + Sync {
    /// Number of pages in the document.
    fn page_count(&self, path: &Path) -> Result<u32, BackendError>;

    /// Plain text of the page's text layer.
    fn page_text(&self, path: &Path, page: u32) -> Result<String, BackendError>;

    /// Positioned words of the page's text layer.
    fn page_words(&self, path: &Path, page: u32) -> Result<Vec<Word>, BackendError>;

    /// Rasterize the inclusive page range `first..=last` at `dpi`.
    fn render_pages(
        &self,
        path: &Path,
        first: u32,
        last: u32,
        dpi: u32,
    ) -> Result<Vec<PageImage>, BackendError>;
}

/// Trait for OCR engines.
pub trait OcrEngine: Send + Sync {
    /// Recognize the text lines of one page image.
    fn recognize(&self, image: &PageImage) -> Result<Vec<OcrLine>, OcrError>;

    /// Recognize several page images, one result per image in input order.
    ///
    /// Engines with expensive session setup override this to reuse a
    /// single session across the batch.
    fn recognize_batch(&self, images: &[PageImage]) -> Result<Vec<Vec<OcrLine>>, OcrError> {
        images.iter().map(|image| self.recognize(image)).collect()
    }
}
