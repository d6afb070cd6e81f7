//! Whitespace-driven table detection over the text layer.
//!
//! Words are grouped into rows by vertical position, rows are split into
//! cells at wide horizontal gaps, and runs of consecutive multi-cell rows
//! become tables. Columns are the union of cell extents within a table, so
//! ragged rows and empty cells still line up.

use std::path::Path;

use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;

use crate::backend::{PdfBackend, Word};
use crate::{ExtractError, ProgressEvent};

/// Tuning knobs for [`detect_tables`].
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TableSettings {
    /// Max distance between a word's vertical center and its row's center,
    /// as a fraction of the row's mean word height.
    pub row_tolerance: f32,
    /// Horizontal gap, as a fraction of word height, above which a new cell starts.
    pub column_gap_ratio: f32,
    /// Minimum consecutive rows for a region to count as a table.
    pub min_rows: usize,
    /// Minimum cells in a row for it to be part of a table.
    pub min_columns: usize,
}

impl Default for TableSettings {
    fn default() -> Self {
        Self {
            row_tolerance: 0.5,
            column_gap_ratio: 0.6,
            min_rows: 2,
            min_columns: 2,
        }
    }
}

/// A run of adjacent words within a row.
#[derive(Debug, Clone, PartialEq)]
pub struct Cell {
    pub text: String,
    pub x0: f32,
    pub x1: f32,
}

impl Cell {
    fn center_x(&self) -> f32 {
        (self.x0 + self.x1) / 2.0
    }
}

/// A table detected on one page.
#[derive(Debug, Clone, PartialEq)]
pub struct Table {
    /// 1-based page number.
    pub page: u32,
    /// Position of the table on its page, top to bottom.
    pub index: usize,
    /// Rows of cell text; every row has [`columns()`](Table::columns) entries.
    pub rows: Vec<Vec<String>>,
}

impl Table {
    pub fn columns(&self) -> usize {
        self.rows.first().map_or(0, |r| r.len())
    }
}

struct RowAcc {
    words: Vec<Word>,
    center_sum: f32,
    height_sum: f32,
}

impl RowAcc {
    fn center(&self) -> f32 {
        self.center_sum / self.words.len() as f32
    }

    fn mean_height(&self) -> f32 {
        self.height_sum / self.words.len() as f32
    }

    fn push(&mut self, word: Word) {
        self.center_sum += word.center_y();
        self.height_sum += word.height();
        self.words.push(word);
    }
}

/// Group words into rows, top to bottom, each row sorted left to right.
pub fn group_rows(words: &[Word], row_tolerance: f32) -> Vec<Vec<Word>> {
    let mut sorted: Vec<&Word> = words.iter().filter(|w| !w.text.trim().is_empty()).collect();
    sorted.sort_by(|a, b| {
        a.center_y()
            .total_cmp(&b.center_y())
            .then(a.x0.total_cmp(&b.x0))
    });

    let mut rows: Vec<RowAcc> = Vec::new();
    for word in sorted {
        if let Some(row) = rows.last_mut() {
            // Zero-height glyph boxes still need some slack.
            let slack = row_tolerance * row.mean_height().max(1.0);
            if (word.center_y() - row.center()).abs() <= slack {
                row.push(word.clone());
                continue;
            }
        }
        let mut row = RowAcc {
            words: Vec::new(),
            center_sum: 0.0,
            height_sum: 0.0,
        };
        row.push(word.clone());
        rows.push(row);
    }

    rows.into_iter()
        .map(|row| {
            let mut words = row.words;
            words.sort_by(|a, b| a.x0.total_cmp(&b.x0));
            words
        })
        .collect()
}

/// Split a left-to-right sorted row into cells at wide gaps.
pub fn split_cells(row: &[Word], column_gap_ratio: f32) -> Vec<Cell> {
    let mut cells: Vec<Cell> = Vec::new();
    let mut prev_height = 0.0_f32;
    for word in row {
        let text = word.text.trim();
        if let Some(cell) = cells.last_mut() {
            let gap = word.x0 - cell.x1;
            if gap <= column_gap_ratio * prev_height.max(word.height()) {
                cell.text.push(' ');
                cell.text.push_str(text);
                cell.x1 = cell.x1.max(word.x1);
                prev_height = word.height();
                continue;
            }
        }
        cells.push(Cell {
            text: text.to_string(),
            x0: word.x0,
            x1: word.x1,
        });
        prev_height = word.height();
    }
    cells
}

/// Detect the tables on one page.
pub fn detect_tables(page: u32, words: &[Word], settings: &TableSettings) -> Vec<Table> {
    let rows: Vec<Vec<Cell>> = group_rows(words, settings.row_tolerance)
        .iter()
        .map(|row| split_cells(row, settings.column_gap_ratio))
        .collect();

    let min_columns = settings.min_columns.max(1);
    let min_rows = settings.min_rows.max(1);
    let mut tables = Vec::new();
    let mut start = 0;

    // Regions are maximal runs of rows with enough cells.
    while start < rows.len() {
        if rows[start].len() < min_columns {
            start += 1;
            continue;
        }
        let end = rows[start..]
            .iter()
            .position(|r| r.len() < min_columns)
            .map_or(rows.len(), |n| start + n);
        if end - start >= min_rows
            && let Some(grid) = layout_region(&rows[start..end], min_columns)
        {
            tables.push(Table {
                page,
                index: tables.len(),
                rows: grid,
            });
        }
        start = end;
    }
    tables
}

/// Assign the cells of a region to column bands.
///
/// Returns `None` when the bands collapse below `min_columns`, which
/// happens when cells of different rows overlap across the page.
fn layout_region(region: &[Vec<Cell>], min_columns: usize) -> Option<Vec<Vec<String>>> {
    let mut extents: Vec<(f32, f32)> = region
        .iter()
        .flat_map(|row| row.iter().map(|c| (c.x0, c.x1)))
        .collect();
    extents.sort_by(|a, b| a.0.total_cmp(&b.0));

    let mut bands: Vec<(f32, f32)> = Vec::new();
    for (x0, x1) in extents {
        match bands.last_mut() {
            Some(band) if x0 <= band.1 => band.1 = band.1.max(x1),
            _ => bands.push((x0, x1)),
        }
    }
    if bands.len() < min_columns {
        return None;
    }

    let grid = region
        .iter()
        .map(|row| {
            let mut out = vec![String::new(); bands.len()];
            for cell in row.iter() {
                let slot = &mut out[band_for(&bands, cell.center_x())];
                if !slot.is_empty() {
                    slot.push(' ');
                }
                slot.push_str(&cell.text);
            }
            out
        })
        .collect();
    Some(grid)
}

fn band_for(bands: &[(f32, f32)], x: f32) -> usize {
    bands
        .iter()
        .position(|&(x0, x1)| x0 <= x && x <= x1)
        .unwrap_or_else(|| {
            bands
                .iter()
                .enumerate()
                .min_by(|(_, a), (_, b)| {
                    let da = (a.0 - x).abs().min((a.1 - x).abs());
                    let db = (b.0 - x).abs().min((b.1 - x).abs());
                    da.total_cmp(&db)
                })
                .map_or(0, |(i, _)| i)
        })
}

/// Run table detection over every page of a native-text PDF.
///
/// Blocking; call from a blocking context. Cancellation is checked
/// between pages.
pub fn extract_text_tables(
    backend: &dyn PdfBackend,
    path: &Path,
    settings: &TableSettings,
    progress: &(dyn Fn(ProgressEvent) + Send + Sync),
    cancel: &CancellationToken,
) -> Result<Vec<Table>, ExtractError> {
    let total = backend.page_count(path)?;
    let mut tables = Vec::new();

    for page in 1..=total {
        if cancel.is_cancelled() {
            return Err(ExtractError::Cancelled);
        }
        let words = backend.page_words(path, page)?;
        let found = detect_tables(page, &words, settings);
        tracing::debug!(page, words = words.len(), tables = found.len(), "scanned page for tables");
        progress(ProgressEvent::PageScanned {
            page,
            total,
            tables: found.len(),
        });
        tables.extend(found);
    }

    tracing::info!(path = %path.display(), pages = total, tables = tables.len(), "text table extraction complete");
    Ok(tables)
}
