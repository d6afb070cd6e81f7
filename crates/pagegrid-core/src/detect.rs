use std::path::Path;

use crate::backend::{BackendError, PdfBackend};

/// Whether a PDF carries a usable text layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PdfKind {
    /// Pages have extractable text.
    Native,
    /// Pages are images and need OCR.
    Scanned,
}

impl PdfKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            PdfKind::Native => "native-text",
            PdfKind::Scanned => "scanned",
        }
    }
}

impl std::fmt::Display for PdfKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Decide whether `path` is a native-text or scanned PDF.
///
/// Looks at the first `check_pages` pages; the document is native as soon
/// as one of them has more than `min_text_chars` characters of trimmed text.
/// Backend failures are treated as "scanned" so the OCR path gets a chance.
pub fn detect_kind(
    backend: &dyn PdfBackend,
    path: &Path,
    check_pages: u32,
    min_text_chars: usize,
) -> PdfKind {
    match probe_text_layer(backend, path, check_pages, min_text_chars) {
        Ok(true) => PdfKind::Native,
        Ok(false) => PdfKind::Scanned,
        Err(e) => {
            tracing::warn!(path = %path.display(), error = %e, "text layer probe failed, assuming scanned");
            PdfKind::Scanned
        }
    }
}

fn probe_text_layer(
    backend: &dyn PdfBackend,
    path: &Path,
    check_pages: u32,
    min_text_chars: usize,
) -> Result<bool, BackendError> {
    let page_count = backend.page_count(path)?;
    for page in 1..=check_pages.min(page_count) {
        let text = backend.page_text(path, page)?;
        let chars = text.trim().chars().count();
        tracing::debug!(page, chars, "probed text layer");
        if chars > min_text_chars {
            return Ok(true);
        }
    }
    Ok(false)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::Word;
    use crate::backend::mock::{MockPage, MockPdf};

    fn text_page(text: &str) -> MockPage {
        MockPage {
            text: text.to_string(),
            words: vec![Word::new(text, 0.0, 0.0, 10.0, 10.0)],
        }
    }

    fn detect(pdf: &MockPdf) -> PdfKind {
        detect_kind(pdf, Path::new("mock.pdf"), 3, 20)
    }

    #[test]
    fn text_on_first_page_is_native() {
        let pdf = MockPdf::new(vec![text_page("Quarterly revenue by region and product")]);
        assert_eq!(detect(&pdf), PdfKind::Native);
    }

    #[test]
    fn text_on_third_page_is_native() {
        let pdf = MockPdf::new(vec![
            MockPage::scanned(),
            MockPage::scanned(),
            text_page("This page has a real text layer on it"),
        ]);
        assert_eq!(detect(&pdf), PdfKind::Native);
    }

    #[test]
    fn text_beyond_checked_pages_is_ignored() {
        let pdf = MockPdf::new(vec![
            MockPage::scanned(),
            MockPage::scanned(),
            MockPage::scanned(),
            text_page("Too late to count for detection purposes"),
        ]);
        assert_eq!(detect(&pdf), PdfKind::Scanned);
    }

    #[test]
    fn exactly_threshold_chars_is_not_enough() {
        // 20 characters after trimming: must be strictly more.
        let pdf = MockPdf::new(vec![text_page("   abcdefghijklmnopqrst   ")]);
        assert_eq!(detect(&pdf), PdfKind::Scanned);

        let pdf = MockPdf::new(vec![text_page("abcdefghijklmnopqrstu")]);
        assert_eq!(detect(&pdf), PdfKind::Native);
    }

    #[test]
    fn empty_document_is_scanned() {
        let pdf = MockPdf::new(vec![]);
        assert_eq!(detect(&pdf), PdfKind::Scanned);
    }

    #[test]
    fn open_failure_is_scanned() {
        let pdf = MockPdf::new(vec![text_page("plenty of text but the file is broken")]).failing_open();
        assert_eq!(detect(&pdf), PdfKind::Scanned);
    }

    #[test]
    fn page_failure_is_scanned() {
        let pdf = MockPdf::new(vec![
            MockPage::scanned(),
            text_page("readable text that comes after a bad page"),
        ])
        .with_broken_page(1);
        assert_eq!(detect(&pdf), PdfKind::Scanned);
    }
}
