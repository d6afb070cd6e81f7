//! In-memory PDF backend and OCR engine for testing.

use std::collections::HashSet;
use std::path::Path;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use super::{BackendError, OcrEngine, OcrError, OcrLine, PageImage, PdfBackend, Word};

/// Contents of one page of a [`MockPdf`].
#[derive(Debug, Clone, Default)]
pub struct MockPage {
    pub text: String,
    pub words: Vec<Word>,
}

impl MockPage {
    /// A page with a text layer built from `words`.
    pub fn with_words(words: Vec<Word>) -> Self {
        let text = words
            .iter()
            .map(|w| w.text.as_str())
            .collect::<Vec<_>>()
            .join(" ");
        Self { text, words }
    }

    /// A page with no text layer at all, as produced by a scanner.
    pub fn scanned() -> Self {
        Self::default()
    }
}

/// A hand-rolled mock implementing [`PdfBackend`] over in-memory pages.
///
/// Rendered images carry the page number in `page` and an empty PNG
/// payload; pair with [`MockOcr`] which keys its output off the page number.
pub struct MockPdf {
    pages: Vec<MockPage>,
    /// Pages whose text extraction fails.
    broken_pages: HashSet<u32>,
    /// Pages whose rendering fails.
    unrenderable_pages: HashSet<u32>,
    fail_open: bool,
    render_calls: AtomicUsize,
}

impl MockPdf {
    pub fn new(pages: Vec<MockPage>) -> Self {
        Self {
            pages,
            broken_pages: HashSet::new(),
            unrenderable_pages: HashSet::new(),
            fail_open: false,
            render_calls: AtomicUsize::new(0),
        }
    }

    /// A document of `count` scanned pages.
    pub fn scanned(count: usize) -> Self {
        Self::new(vec![MockPage::scanned(); count])
    }

    /// Make every call fail as if the file could not be opened.
    pub fn failing_open(mut self) -> Self {
        self.fail_open = true;
        self
    }

    /// Make text extraction fail on `page`.
    pub fn with_broken_page(mut self, page: u32) -> Self {
        self.broken_pages.insert(page);
        self
    }

    /// Make rendering fail on any batch containing `page`.
    pub fn with_unrenderable_page(mut self, page: u32) -> Self {
        self.unrenderable_pages.insert(page);
        self
    }

    /// How many times `render_pages()` has been called.
    pub fn render_calls(&self) -> usize {
        self.render_calls.load(Ordering::SeqCst)
    }

    fn check_open(&self) -> Result<(), BackendError> {
        if self.fail_open {
            Err(BackendError::OpenError("mock: cannot open".into()))
        } else {
            Ok(())
        }
    }

    fn page(&self, page: u32) -> Result<&MockPage, BackendError> {
        self.check_open()?;
        if self.broken_pages.contains(&page) {
            return Err(BackendError::ExtractionError(format!(
                "mock: page {page} is broken"
            )));
        }
        page.checked_sub(1)
            .and_then(|i| self.pages.get(i as usize))
            .ok_or(BackendError::PageOutOfRange {
                page,
                page_count: self.pages.len() as u32,
            })
    }
}

impl PdfBackend for MockPdf {
    fn page_count(&self, _path: &Path) -> Result<u32, BackendError> {
        self.check_open()?;
        Ok(self.pages.len() as u32)
    }

    fn page_text(&self, _path: &Path, page: u32) -> Result<String, BackendError> {
        Ok(self.page(page)?.text.clone())
    }

    fn page_words(&self, _path: &Path, page: u32) -> Result<Vec<Word>, BackendError> {
        Ok(self.page(page)?.words.clone())
    }

    fn render_pages(
        &self,
        _path: &Path,
        first: u32,
        last: u32,
        _dpi: u32,
    ) -> Result<Vec<PageImage>, BackendError> {
        self.check_open()?;
        self.render_calls.fetch_add(1, Ordering::SeqCst);
        let page_count = self.pages.len() as u32;
        if first == 0 || last > page_count {
            return Err(BackendError::PageOutOfRange {
                page: last,
                page_count,
            });
        }
        if let Some(bad) = (first..=last).find(|p| self.unrenderable_pages.contains(p)) {
            return Err(BackendError::RenderError(format!(
                "mock: page {bad} cannot be rendered"
            )));
        }
        Ok((first..=last)
            .map(|page| PageImage {
                page,
                width: 0,
                height: 0,
                png: Vec::new(),
            })
            .collect())
    }
}

/// A hand-rolled mock implementing [`OcrEngine`].
///
/// Each page yields `lines_per_page` lines of the form `"page {n} line {i}"`
/// with confidence `90.0`, except pages listed as blank (no lines) or
/// failing (recognition error).
pub struct MockOcr {
    lines_per_page: usize,
    blank_pages: HashSet<u32>,
    failing_pages: HashSet<u32>,
    delay: Option<Duration>,
    pages_seen: Mutex<Vec<u32>>,
}

impl MockOcr {
    pub fn new(lines_per_page: usize) -> Self {
        Self {
            lines_per_page,
            blank_pages: HashSet::new(),
            failing_pages: HashSet::new(),
            delay: None,
            pages_seen: Mutex::new(Vec::new()),
        }
    }

    pub fn with_blank_page(mut self, page: u32) -> Self {
        self.blank_pages.insert(page);
        self
    }

    pub fn with_failing_page(mut self, page: u32) -> Self {
        self.failing_pages.insert(page);
        self
    }

    /// Set simulated inference latency per page.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Pages recognized so far, in call order.
    pub fn pages_seen(&self) -> Vec<u32> {
        self.pages_seen
            .lock()
            .map(|seen| seen.clone())
            .unwrap_or_default()
    }
}

impl OcrEngine for MockOcr {
    fn recognize(&self, image: &PageImage) -> Result<Vec<OcrLine>, OcrError> {
        if let Some(d) = self.delay {
            std::thread::sleep(d);
        }
        if let Ok(mut seen) = self.pages_seen.lock() {
            seen.push(image.page);
        }
        if self.failing_pages.contains(&image.page) {
            return Err(OcrError::Recognition {
                page: image.page,
                message: "mock: recognition failed".into(),
            });
        }
        if self.blank_pages.contains(&image.page) {
            return Ok(Vec::new());
        }
        Ok((0..self.lines_per_page)
            .map(|i| OcrLine {
                page: image.page,
                text: format!("page {} line {}", image.page, i),
                confidence: Some(90.0),
            })
            .collect())
    }
}
