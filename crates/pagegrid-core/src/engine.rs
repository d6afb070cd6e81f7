use std::path::Path;
use std::sync::Arc;
use std::time::Instant;

use tokio_util::sync::CancellationToken;

use crate::backend::{OcrEngine, PdfBackend};
use crate::detect::{PdfKind, detect_kind};
use crate::pool::run_ocr;
use crate::sheet::Sheet;
use crate::tables::extract_text_tables;
use crate::{Config, ExtractError, ExtractMode, Extraction, ProgressEvent, ProgressFn};

/// Run the full pipeline: detect, extract through the matching path, and
/// assemble one sheet.
pub async fn extract_pdf(
    path: &Path,
    backend: Arc<dyn PdfBackend>,
    ocr: Arc<dyn OcrEngine>,
    config: Config,
    progress: ProgressFn,
    cancel: CancellationToken,
) -> Result<Extraction, ExtractError> {
    let started = Instant::now();
    if !path.exists() {
        return Err(ExtractError::NotFound(path.to_path_buf()));
    }

    let config = Arc::new(config);
    let (kind, page_count) = {
        let backend = backend.clone();
        let path = path.to_path_buf();
        let config = config.clone();
        tokio::task::spawn_blocking(move || {
            let kind = match config.mode {
                ExtractMode::Auto => detect_kind(
                    backend.as_ref(),
                    &path,
                    config.check_pages,
                    config.min_text_chars,
                ),
                ExtractMode::Text => PdfKind::Native,
                ExtractMode::Ocr => PdfKind::Scanned,
            };
            // A scanned verdict may come from an unreadable file; let the OCR
            // path surface the real error.
            let page_count = backend.page_count(&path).unwrap_or(0);
            (kind, page_count)
        })
        .await?
    };

    tracing::info!(path = %path.display(), %kind, pages = page_count, mode = ?config.mode, "detected PDF kind");
    progress(ProgressEvent::Detected { kind, page_count });

    let (sheet, tables, page_count) = match kind {
        PdfKind::Native => {
            let tables = {
                let backend = backend.clone();
                let path = path.to_path_buf();
                let config = config.clone();
                let progress = progress.clone();
                let cancel = cancel.clone();
                tokio::task::spawn_blocking(move || {
                    extract_text_tables(
                        backend.as_ref(),
                        &path,
                        &config.tables,
                        progress.as_ref(),
                        &cancel,
                    )
                })
                .await??
            };
            let sheets: Vec<Sheet> = tables.iter().map(Sheet::from_table).collect();
            (Sheet::concat(&sheets), tables.len(), page_count)
        }
        PdfKind::Scanned => {
            let run = run_ocr(path, backend, ocr, config, progress.clone(), cancel).await?;
            (Sheet::from_ocr_lines(&run.lines), 0, run.page_count)
        }
    };

    if sheet.is_empty() {
        tracing::warn!(path = %path.display(), %kind, "no content extracted");
    }

    let elapsed = started.elapsed();
    progress(ProgressEvent::Finished {
        rows: sheet.len(),
        elapsed,
    });

    Ok(Extraction {
        kind,
        page_count,
        tables,
        sheet,
        elapsed,
    })
}
