use std::path::Path;
use std::str::FromStr;

use pagegrid_core::Sheet;
use serde::ser::{Serialize, SerializeMap, Serializer};
use thiserror::Error;

/// Widest a column gets in text rendering before cells are cut.
const MAX_TEXT_WIDTH: usize = 40;

#[derive(Debug, Error)]
pub enum ExportError {
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("failed to write {path}: {source}")]
    Write {
        path: String,
        source: std::io::Error,
    },
}

/// Output formats for an extracted sheet.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ExportFormat {
    #[default]
    Csv,
    Json,
    Markdown,
    Text,
}

impl ExportFormat {
    pub fn all() -> &'static [ExportFormat] {
        &[
            ExportFormat::Csv,
            ExportFormat::Json,
            ExportFormat::Markdown,
            ExportFormat::Text,
        ]
    }

    pub fn extension(self) -> &'static str {
        match self {
            Self::Csv => "csv",
            Self::Json => "json",
            Self::Markdown => "md",
            Self::Text => "txt",
        }
    }

    /// Infer the format from a file extension. Unknown or missing
    /// extensions yield `None`.
    pub fn from_path(path: &Path) -> Option<Self> {
        let ext = path.extension()?.to_str()?.to_ascii_lowercase();
        match ext.as_str() {
            "csv" => Some(Self::Csv),
            "json" => Some(Self::Json),
            "md" | "markdown" => Some(Self::Markdown),
            "txt" => Some(Self::Text),
            _ => None,
        }
    }
}

impl FromStr for ExportFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "csv" => Ok(Self::Csv),
            "json" => Ok(Self::Json),
            "md" | "markdown" => Ok(Self::Markdown),
            "txt" | "text" => Ok(Self::Text),
            other => Err(format!("unknown export format: {other}")),
        }
    }
}

/// Render a sheet in the given format.
pub fn render_sheet(sheet: &Sheet, format: ExportFormat) -> Result<String, ExportError> {
    match format {
        ExportFormat::Csv => render_csv(sheet),
        ExportFormat::Json => render_json(sheet),
        ExportFormat::Markdown => Ok(render_markdown(sheet)),
        ExportFormat::Text => Ok(render_text(sheet)),
    }
}

/// Write a sheet to `path` in the given format.
pub fn export_sheet(sheet: &Sheet, format: ExportFormat, path: &Path) -> Result<(), ExportError> {
    let content = render_sheet(sheet, format)?;
    std::fs::write(path, content).map_err(|source| ExportError::Write {
        path: path.display().to_string(),
        source,
    })
}

/// Text rendering of the first `rows` rows, with a trailer when rows were cut.
pub fn preview(sheet: &Sheet, rows: usize) -> String {
    let mut out = render_text(&sheet.head(rows));
    if sheet.len() > rows {
        out.push_str(&format!("... ({} more rows)\n", sheet.len() - rows));
    }
    out
}

fn render_csv(sheet: &Sheet) -> Result<String, ExportError> {
    if sheet.columns().is_empty() {
        return Ok(String::new());
    }
    let mut writer = csv::Writer::from_writer(Vec::new());
    writer.write_record(sheet.columns())?;
    for row in sheet.rows() {
        writer.write_record(row)?;
    }
    let bytes = writer
        .into_inner()
        .map_err(|e| ExportError::Csv(e.into_error().into()))?;
    Ok(String::from_utf8_lossy(&bytes).into_owned())
}

/// One row serialized as an object in column order.
struct JsonRow<'a> {
    columns: &'a [String],
    values: &'a [String],
}

impl Serialize for JsonRow<'_> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.columns.len()))?;
        for (column, value) in self.columns.iter().zip(self.values) {
            map.serialize_entry(column, value)?;
        }
        map.end()
    }
}

fn render_json(sheet: &Sheet) -> Result<String, ExportError> {
    let rows: Vec<JsonRow<'_>> = sheet
        .rows()
        .iter()
        .map(|values| JsonRow {
            columns: sheet.columns(),
            values,
        })
        .collect();
    Ok(serde_json::to_string_pretty(&rows)?)
}

fn md_escape(s: &str) -> String {
    s.replace('|', "\\|").replace('\n', " ")
}

fn render_markdown(sheet: &Sheet) -> String {
    if sheet.columns().is_empty() {
        return String::new();
    }
    let mut out = String::new();
    let header: Vec<String> = sheet.columns().iter().map(|c| md_escape(c)).collect();
    out.push_str(&format!("| {} |\n", header.join(" | ")));
    out.push_str(&format!("|{}\n", "---|".repeat(header.len())));
    for row in sheet.rows() {
        let cells: Vec<String> = row.iter().map(|c| md_escape(c)).collect();
        out.push_str(&format!("| {} |\n", cells.join(" | ")));
    }
    out
}

fn clip(s: &str, width: usize) -> String {
    let flat = s.replace('\n', " ");
    if flat.chars().count() <= width {
        flat
    } else {
        let kept: String = flat.chars().take(width.saturating_sub(3)).collect();
        format!("{kept}...")
    }
}

fn render_text(sheet: &Sheet) -> String {
    if sheet.columns().is_empty() {
        return String::new();
    }
    let mut widths: Vec<usize> = sheet
        .columns()
        .iter()
        .map(|c| c.chars().count())
        .collect();
    for row in sheet.rows() {
        for (w, cell) in widths.iter_mut().zip(row) {
            *w = (*w).max(cell.chars().count());
        }
    }
    for w in &mut widths {
        *w = (*w).min(MAX_TEXT_WIDTH);
    }

    let line = |cells: &[String]| -> String {
        let padded: Vec<String> = cells
            .iter()
            .zip(&widths)
            .map(|(cell, &w)| format!("{:<w$}", clip(cell, w)))
            .collect();
        format!("{}\n", padded.join("  ").trim_end())
    };

    let mut out = line(sheet.columns());
    let rule: Vec<String> = widths.iter().map(|&w| "-".repeat(w)).collect();
    out.push_str(&format!("{}\n", rule.join("  ")));
    for row in sheet.rows() {
        out.push_str(&line(row));
    }
    out
}
