use crate::backend::OcrLine;
use crate::tables::Table;

pub const PAGE_COLUMN: &str = "Page";
pub const SOURCE_COLUMN: &str = "Source";
pub const TEXT_COLUMN: &str = "Text";
pub const CONFIDENCE_COLUMN: &str = "Confidence";

/// `Source` value for rows read from the text layer.
pub const SOURCE_TEXT: &str = "Text";
/// `Source` value for rows produced by OCR.
pub const SOURCE_OCR: &str = "OCR";

/// A rectangular grid of string cells with named columns.
///
/// Every row holds exactly `columns.len()` cells.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Sheet {
    columns: Vec<String>,
    rows: Vec<Vec<String>>,
}

impl Sheet {
    pub fn new(columns: Vec<String>) -> Self {
        Self {
            columns,
            rows: Vec::new(),
        }
    }

    /// Append a row, padding or truncating it to the column count.
    pub fn push_row(&mut self, mut row: Vec<String>) {
        row.resize(self.columns.len(), String::new());
        self.rows.push(row);
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn rows(&self) -> &[Vec<String>] {
        &self.rows
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c == name)
    }

    /// A copy holding only the first `n` rows.
    pub fn head(&self, n: usize) -> Sheet {
        Sheet {
            columns: self.columns.clone(),
            rows: self.rows.iter().take(n).cloned().collect(),
        }
    }

    /// One sheet per detected table: numbered columns, then `Page` and `Source`.
    pub fn from_table(table: &Table) -> Sheet {
        let mut columns: Vec<String> = (0..table.columns()).map(|i| i.to_string()).collect();
        columns.push(PAGE_COLUMN.to_string());
        columns.push(SOURCE_COLUMN.to_string());

        let page = table.page.to_string();
        let mut sheet = Sheet::new(columns);
        for row in &table.rows {
            let mut cells = row.clone();
            cells.push(page.clone());
            cells.push(SOURCE_TEXT.to_string());
            sheet.push_row(cells);
        }
        sheet
    }

    /// OCR lines as `Text`, `Page`, `Source`, `Confidence` rows.
    pub fn from_ocr_lines(lines: &[OcrLine]) -> Sheet {
        let mut sheet = Sheet::new(
            [TEXT_COLUMN, PAGE_COLUMN, SOURCE_COLUMN, CONFIDENCE_COLUMN]
                .map(String::from)
                .to_vec(),
        );
        for line in lines {
            sheet.push_row(vec![
                line.text.clone(),
                line.page.to_string(),
                SOURCE_OCR.to_string(),
                line.confidence
                    .map(|c| format!("{c:.1}"))
                    .unwrap_or_default(),
            ]);
        }
        sheet
    }

    /// Stack sheets vertically.
    ///
    /// The result has the union of all columns in first-seen order; cells
    /// for columns a sheet lacks are left blank.
    pub fn concat<'a>(sheets: impl IntoIterator<Item = &'a Sheet>) -> Sheet {
        let sheets: Vec<&Sheet> = sheets.into_iter().collect();

        let mut columns: Vec<String> = Vec::new();
        for sheet in &sheets {
            for col in &sheet.columns {
                if !columns.contains(col) {
                    columns.push(col.clone());
                }
            }
        }

        let mut out = Sheet::new(columns);
        for sheet in sheets {
            let mapping: Vec<usize> = sheet
                .columns
                .iter()
                .filter_map(|c| out.column_index(c))
                .collect();
            for row in &sheet.rows {
                let mut cells = vec![String::new(); out.columns.len()];
                for (value, &target) in row.iter().zip(&mapping) {
                    cells[target] = value.clone();
                }
                out.rows.push(cells);
            }
        }
        out
    }
}
