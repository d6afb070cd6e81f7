use std::io::Write;
use std::path::Path;
use std::time::Duration;

use owo_colors::OwoColorize;
use pagegrid_core::{Extraction, PdfKind};

/// Whether to use colored output.
#[derive(Debug, Clone, Copy)]
pub struct ColorMode(pub bool);

impl ColorMode {
    pub fn enabled(&self) -> bool {
        self.0
    }
}

fn kind_label(kind: PdfKind, color: ColorMode) -> String {
    if !color.enabled() {
        return kind.to_string();
    }
    match kind {
        PdfKind::Native => kind.green().to_string(),
        PdfKind::Scanned => kind.yellow().to_string(),
    }
}

/// Print the result of `pagegrid detect`.
pub fn print_detection(
    w: &mut dyn Write,
    pdf_name: &str,
    kind: PdfKind,
    page_count: u32,
    color: ColorMode,
) -> std::io::Result<()> {
    writeln!(w, "{}: {} ({} pages)", pdf_name, kind_label(kind, color), page_count)
}

/// Print the summary after an extraction run.
pub fn print_summary(
    w: &mut dyn Write,
    extraction: &Extraction,
    output: &Path,
    color: ColorMode,
) -> std::io::Result<()> {
    writeln!(
        w,
        "Detected {} PDF with {} pages",
        kind_label(extraction.kind, color),
        extraction.page_count
    )?;
    if extraction.kind == PdfKind::Native {
        writeln!(w, "Found {} tables", extraction.tables)?;
    }

    let completed = format!("Completed in {}", format_elapsed(extraction.elapsed));
    if color.enabled() {
        writeln!(w, "{}", completed.bold())?;
    } else {
        writeln!(w, "{}", completed)?;
    }

    let rows = extraction.sheet.len();
    if rows == 0 {
        let msg = "No rows extracted";
        if color.enabled() {
            writeln!(w, "{}", msg.yellow())?;
        } else {
            writeln!(w, "{}", msg)?;
        }
    } else {
        writeln!(w, "Extracted {} rows", rows)?;
    }
    writeln!(w, "Saved to {}", output.display())?;
    Ok(())
}

/// Print the preview block with a dimmed heading.
pub fn print_preview(
    w: &mut dyn Write,
    preview: &str,
    rows: usize,
    color: ColorMode,
) -> std::io::Result<()> {
    if preview.is_empty() {
        return Ok(());
    }
    writeln!(w)?;
    let heading = format!("Preview (first {} rows):", rows);
    if color.enabled() {
        writeln!(w, "{}", heading.dimmed())?;
    } else {
        writeln!(w, "{}", heading)?;
    }
    write!(w, "{}", preview)?;
    Ok(())
}

pub fn format_elapsed(elapsed: Duration) -> String {
    format!("{:.2}s", elapsed.as_secs_f64())
}
