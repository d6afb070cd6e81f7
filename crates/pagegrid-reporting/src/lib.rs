mod export;

pub use export::{ExportError, ExportFormat, export_sheet, preview, render_sheet};
