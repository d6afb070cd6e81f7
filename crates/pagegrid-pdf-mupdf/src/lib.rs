use std::io::Cursor;
use std::path::Path;

use image::{DynamicImage, GrayImage};
use mupdf::{Colorspace, Document, Matrix, Page, TextPageFlags};

use pagegrid_core::{BackendError, PageImage, PdfBackend, Word};

/// PDF user space is 72 units per inch.
const POINTS_PER_INCH: f32 = 72.0;

/// MuPDF-based implementation of [`PdfBackend`].
///
/// This crate is the sole AGPL island: it isolates the mupdf dependency
/// (which is AGPL-3.0) from the rest of the pipeline.
///
/// A document handle is opened per call since MuPDF documents cannot be
/// shared across threads; [`render_pages`](PdfBackend::render_pages) opens
/// once for the whole range.
///
/// Pages are rendered in grayscale, which is all OCR needs.
#[derive(Debug, Default, Clone)]
pub struct MupdfBackend;

impl MupdfBackend {
    pub fn new() -> Self {
        Self
    }
}

fn open(path: &Path) -> Result<Document, BackendError> {
    let path_str = path
        .to_str()
        .ok_or_else(|| BackendError::OpenError("invalid path encoding".into()))?;
    Document::open(path_str).map_err(|e| BackendError::OpenError(e.to_string()))
}

fn page_total(document: &Document) -> Result<u32, BackendError> {
    let count = document
        .page_count()
        .map_err(|e| BackendError::OpenError(e.to_string()))?;
    Ok(count.max(0) as u32)
}

fn load_page(document: &Document, page: u32) -> Result<Page, BackendError> {
    let page_count = page_total(document)?;
    if page == 0 || page > page_count {
        return Err(BackendError::PageOutOfRange { page, page_count });
    }
    document
        .load_page(page as i32 - 1)
        .map_err(|e| BackendError::ExtractionError(e.to_string()))
}

/// Grow a word's box by one glyph quad.
fn extend_box(word: &mut Word, quad: &mupdf::Quad) {
    word.x0 = word.x0.min(quad.ul.x.min(quad.ll.x));
    word.x1 = word.x1.max(quad.ur.x.max(quad.lr.x));
    word.y0 = word.y0.min(quad.ul.y.min(quad.ur.y));
    word.y1 = word.y1.max(quad.ll.y.max(quad.lr.y));
}

fn empty_word() -> Word {
    Word::new(String::new(), f32::MAX, f32::MAX, f32::MIN, f32::MIN)
}

fn encode_gray_png(pixmap: &mupdf::Pixmap) -> Result<(Vec<u8>, u32, u32), BackendError> {
    let width = pixmap.width() as u32;
    let height = pixmap.height() as u32;
    let samples = pixmap.samples();
    let n = (pixmap.n() as usize).max(1);

    // Take the first channel of each pixel; for gray pixmaps that is the value.
    let mut luma = Vec::with_capacity((width * height) as usize);
    for y in 0..height as usize {
        for x in 0..width as usize {
            let offset = (y * width as usize + x) * n;
            let value = if n >= 3 {
                let r = samples.get(offset).copied().unwrap_or(255) as u16;
                let g = samples.get(offset + 1).copied().unwrap_or(255) as u16;
                let b = samples.get(offset + 2).copied().unwrap_or(255) as u16;
                ((r + g + b) / 3) as u8
            } else {
                samples.get(offset).copied().unwrap_or(255)
            };
            luma.push(value);
        }
    }

    let img = GrayImage::from_raw(width, height, luma)
        .ok_or_else(|| BackendError::RenderError("failed to create image buffer".into()))?;
    let mut png = Vec::new();
    DynamicImage::ImageLuma8(img)
        .write_to(&mut Cursor::new(&mut png), image::ImageFormat::Png)
        .map_err(|e| BackendError::RenderError(e.to_string()))?;
    Ok((png, width, height))
}

impl PdfBackend for MupdfBackend {
    fn page_count(&self, path: &Path) -> Result<u32, BackendError> {
        page_total(&open(path)?)
    }

    fn page_text(&self, path: &Path, page: u32) -> Result<String, BackendError> {
        let document = open(path)?;
        let page = load_page(&document, page)?;
        let text_page = page
            .to_text_page(TextPageFlags::empty())
            .map_err(|e| BackendError::ExtractionError(e.to_string()))?;

        let mut text = String::new();
        for block in text_page.blocks() {
            for line in block.lines() {
                text.extend(line.chars().map(|c| c.char().unwrap_or('\u{FFFD}')));
                text.push('\n');
            }
        }
        Ok(text)
    }

    fn page_words(&self, path: &Path, page: u32) -> Result<Vec<Word>, BackendError> {
        let document = open(path)?;
        let page = load_page(&document, page)?;
        let text_page = page
            .to_text_page(TextPageFlags::empty())
            .map_err(|e| BackendError::ExtractionError(e.to_string()))?;

        let mut words = Vec::new();
        for block in text_page.blocks() {
            for line in block.lines() {
                let mut current = empty_word();
                for ch in line.chars() {
                    let Some(c) = ch.char() else { continue };
                    if c.is_whitespace() {
                        if !current.text.is_empty() {
                            words.push(std::mem::replace(&mut current, empty_word()));
                        }
                        continue;
                    }
                    current.text.push(c);
                    extend_box(&mut current, &ch.quad());
                }
                // Words never span lines
                if !current.text.is_empty() {
                    words.push(current);
                }
            }
        }
        Ok(words)
    }

    fn render_pages(
        &self,
        path: &Path,
        first: u32,
        last: u32,
        dpi: u32,
    ) -> Result<Vec<PageImage>, BackendError> {
        let document = open(path)?;
        let scale = dpi as f32 / POINTS_PER_INCH;
        let matrix = Matrix::new_scale(scale, scale);
        let colorspace = Colorspace::device_gray();

        let mut images = Vec::with_capacity((last.saturating_sub(first) + 1) as usize);
        for number in first..=last {
            let page = load_page(&document, number)?;
            let pixmap = page
                .to_pixmap(&matrix, &colorspace, false, false)
                .map_err(|e| BackendError::RenderError(e.to_string()))?;
            let (png, width, height) = encode_gray_png(&pixmap)?;
            tracing::trace!(page = number, width, height, bytes = png.len(), "rendered page");
            images.push(PageImage {
                page: number,
                width,
                height,
                png,
            });
        }
        Ok(images)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_file_is_open_error() {
        let backend = MupdfBackend::new();
        let err = backend
            .page_count(Path::new("/definitely/not/here.pdf"))
            .unwrap_err();
        assert!(matches!(err, BackendError::OpenError(_)));
    }

    #[test]
    fn extend_box_unions_quads() {
        let mut word = empty_word();
        let quad = |x0: f32, y0: f32, x1: f32, y1: f32| mupdf::Quad {
            ul: mupdf::Point { x: x0, y: y0 },
            ur: mupdf::Point { x: x1, y: y0 },
            ll: mupdf::Point { x: x0, y: y1 },
            lr: mupdf::Point { x: x1, y: y1 },
        };
        extend_box(&mut word, &quad(10.0, 5.0, 16.0, 15.0));
        extend_box(&mut word, &quad(16.0, 4.0, 22.0, 15.5));
        assert_eq!((word.x0, word.y0, word.x1, word.y1), (10.0, 4.0, 22.0, 15.5));
    }
}
