//! End-to-end pipeline tests over the mock backend.

use std::sync::{Arc, Mutex};

use pagegrid_core::backend::mock::{MockOcr, MockPage, MockPdf};
use pagegrid_core::{
    Config, ExtractError, ExtractMode, PdfKind, ProgressEvent, Word, extract_pdf,
};
use tokio_util::sync::CancellationToken;

/// The engine checks the input exists, so tests hand it a real (empty) file.
fn input_file() -> tempfile::NamedTempFile {
    tempfile::Builder::new()
        .suffix(".pdf")
        .tempfile()
        .expect("temp file")
}

fn word(text: &str, x: f32, y: f32) -> Word {
    Word::new(text, x, y, x + 6.0 * text.len() as f32, y + 10.0)
}

fn invoice_page() -> MockPage {
    let mut words = vec![word("Invoice", 10.0, 20.0)];
    for (i, (item, amount)) in [("Description", "Amount"), ("Consulting", "1200.00"), ("Travel", "310.50")]
        .iter()
        .enumerate()
    {
        let y = 60.0 + 20.0 * i as f32;
        words.push(word(item, 10.0, y));
        words.push(word(amount, 200.0, y));
    }
    MockPage::with_words(words)
}

#[tokio::test]
async fn native_pdf_goes_through_tables() {
    let file = input_file();
    let engine = Arc::new(MockOcr::new(1));
    let extraction = extract_pdf(
        file.path(),
        Arc::new(MockPdf::new(vec![invoice_page(), invoice_page()])),
        engine.clone(),
        Config::default(),
        |_| {},
        CancellationToken::new(),
    )
    .await
    .unwrap();

    assert_eq!(extraction.kind, PdfKind::Native);
    assert_eq!(extraction.page_count, 2);
    assert_eq!(extraction.tables, 2);
    assert!(engine.pages_seen().is_empty(), "OCR must not run on native PDFs");

    let sheet = &extraction.sheet;
    assert_eq!(sheet.columns(), ["0", "1", "Page", "Source"]);
    assert_eq!(sheet.len(), 6);
    assert_eq!(sheet.rows()[1], ["Consulting", "1200.00", "1", "Text"]);
    assert_eq!(sheet.rows()[5], ["Travel", "310.50", "2", "Text"]);
}

#[tokio::test]
async fn scanned_pdf_goes_through_ocr() {
    let file = input_file();
    let extraction = extract_pdf(
        file.path(),
        Arc::new(MockPdf::scanned(12)),
        Arc::new(MockOcr::new(2)),
        Config {
            batch_size: 5,
            max_workers: 2,
            ..Config::default()
        },
        |_| {},
        CancellationToken::new(),
    )
    .await
    .unwrap();

    assert_eq!(extraction.kind, PdfKind::Scanned);
    assert_eq!(extraction.page_count, 12);
    assert_eq!(extraction.tables, 0);

    let sheet = &extraction.sheet;
    assert_eq!(sheet.columns(), ["Text", "Page", "Source", "Confidence"]);
    assert_eq!(sheet.len(), 24);
    assert_eq!(sheet.rows()[0], ["page 1 line 0", "1", "OCR", "90.0"]);
    assert_eq!(sheet.rows()[23][1], "12");
}

#[tokio::test]
async fn forced_ocr_skips_detection() {
    let file = input_file();
    let engine = Arc::new(MockOcr::new(1));
    let extraction = extract_pdf(
        file.path(),
        Arc::new(MockPdf::new(vec![invoice_page()])),
        engine.clone(),
        Config {
            mode: ExtractMode::Ocr,
            ..Config::default()
        },
        |_| {},
        CancellationToken::new(),
    )
    .await
    .unwrap();

    assert_eq!(extraction.kind, PdfKind::Scanned);
    assert_eq!(engine.pages_seen(), vec![1]);
}

#[tokio::test]
async fn forced_text_on_scanned_pdf_is_empty() {
    let file = input_file();
    let extraction = extract_pdf(
        file.path(),
        Arc::new(MockPdf::scanned(3)),
        Arc::new(MockOcr::new(1)),
        Config {
            mode: ExtractMode::Text,
            ..Config::default()
        },
        |_| {},
        CancellationToken::new(),
    )
    .await
    .unwrap();

    assert_eq!(extraction.kind, PdfKind::Native);
    assert!(extraction.sheet.is_empty());
    assert!(extraction.sheet.columns().is_empty());
}

#[tokio::test]
async fn missing_file_is_reported() {
    let err = extract_pdf(
        std::path::Path::new("/no/such/dir/report.pdf"),
        Arc::new(MockPdf::scanned(1)),
        Arc::new(MockOcr::new(1)),
        Config::default(),
        |_| {},
        CancellationToken::new(),
    )
    .await
    .unwrap_err();

    assert!(matches!(err, ExtractError::NotFound(_)));
}

#[tokio::test]
async fn events_in_pipeline_order() {
    let file = input_file();
    let events: Arc<Mutex<Vec<&'static str>>> = Arc::new(Mutex::new(Vec::new()));
    let sink = events.clone();
    extract_pdf(
        file.path(),
        Arc::new(MockPdf::scanned(2)),
        Arc::new(MockOcr::new(1)),
        Config::default(),
        move |e: ProgressEvent| {
            let name = match e {
                ProgressEvent::Detected { .. } => "detected",
                ProgressEvent::PageScanned { .. } => "page",
                ProgressEvent::BatchStarted { .. } => "started",
                ProgressEvent::BatchComplete { .. } => "complete",
                ProgressEvent::Finished { .. } => "finished",
            };
            sink.lock().unwrap().push(name);
        },
        CancellationToken::new(),
    )
    .await
    .unwrap();

    assert_eq!(
        *events.lock().unwrap(),
        vec!["detected", "started", "complete", "finished"]
    );
}

#[tokio::test]
async fn ocr_failure_surfaces() {
    let file = input_file();
    let err = extract_pdf(
        file.path(),
        Arc::new(MockPdf::scanned(9)),
        Arc::new(MockOcr::new(1).with_failing_page(9)),
        Config {
            batch_size: 8,
            ..Config::default()
        },
        |_| {},
        CancellationToken::new(),
    )
    .await
    .unwrap_err();

    assert!(matches!(err, ExtractError::Ocr(_)));
}
