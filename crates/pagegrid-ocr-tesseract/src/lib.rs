use pagegrid_core::{OcrEngine, OcrError, OcrLine, PageImage};
use tesseract::Tesseract;

/// TSV level of word rows; block, paragraph and line rows carry no text.
const WORD_LEVEL: u32 = 5;

/// Tesseract-based implementation of [`OcrEngine`].
///
/// A fresh Tesseract handle is initialized per [`recognize`](OcrEngine::recognize)
/// call; [`recognize_batch`](OcrEngine::recognize_batch) reuses one handle for
/// every image of the batch.
#[derive(Debug, Clone)]
pub struct TesseractEngine {
    language: String,
    datapath: Option<String>,
    dpi: Option<u32>,
}

impl Default for TesseractEngine {
    fn default() -> Self {
        Self {
            language: "eng".to_string(),
            datapath: None,
            dpi: None,
        }
    }
}

impl TesseractEngine {
    pub fn new(language: impl Into<String>) -> Self {
        Self {
            language: language.into(),
            ..Self::default()
        }
    }

    /// Directory containing `<lang>.traineddata`. Falls back to
    /// `TESSDATA_PREFIX` / the system default when unset.
    pub fn with_datapath(mut self, datapath: Option<String>) -> Self {
        self.datapath = datapath;
        self
    }

    /// Resolution the page images were rendered at. PNGs carry no DPI, so
    /// without this Tesseract guesses and warns.
    pub fn with_dpi(mut self, dpi: u32) -> Self {
        self.dpi = Some(dpi);
        self
    }

    pub fn language(&self) -> &str {
        &self.language
    }

    fn init(&self) -> Result<Tesseract, OcrError> {
        let mut tess = Tesseract::new(self.datapath.as_deref(), Some(self.language.as_str()))
            .map_err(|e| OcrError::Init(e.to_string()))?;
        if let Some(dpi) = self.dpi {
            tess = tess
                .set_variable("user_defined_dpi", &dpi.to_string())
                .map_err(|e| OcrError::Init(e.to_string()))?;
        }
        Ok(tess)
    }

    /// Run one image through an initialized handle, handing the handle back
    /// for reuse.
    fn run(tess: Tesseract, image: &PageImage) -> Result<(Tesseract, Vec<OcrLine>), OcrError> {
        let recognition = |message: String| OcrError::Recognition {
            page: image.page,
            message,
        };
        let mut tess = tess
            .set_image_from_mem(&image.png)
            .map_err(|e| recognition(e.to_string()))?
            .recognize()
            .map_err(|e| recognition(e.to_string()))?;
        let tsv = tess
            .get_tsv_text(0)
            .map_err(|e| OcrError::Output(e.to_string()))?;
        let lines = parse_tsv(image.page, &tsv);
        tracing::debug!(page = image.page, lines = lines.len(), "recognized page");
        Ok((tess, lines))
    }
}

impl OcrEngine for TesseractEngine {
    fn recognize(&self, image: &PageImage) -> Result<Vec<OcrLine>, OcrError> {
        let (_, lines) = Self::run(self.init()?, image)?;
        Ok(lines)
    }

    fn recognize_batch(&self, images: &[PageImage]) -> Result<Vec<Vec<OcrLine>>, OcrError> {
        let mut tess = self.init()?;
        let mut pages = Vec::with_capacity(images.len());
        for image in images {
            let (next, lines) = Self::run(tess, image)?;
            tess = next;
            pages.push(lines);
        }
        Ok(pages)
    }
}

/// Group Tesseract TSV word rows into text lines.
///
/// Lines are keyed by `(block, paragraph, line)` and keep their reading order.
/// Line confidence is the mean of its word confidences; Tesseract reports
/// `-1` for rows without a score, and those are left out of the mean.
pub fn parse_tsv(page: u32, tsv: &str) -> Vec<OcrLine> {
    fn close(lines: &mut [OcrLine], sum: f32, count: u32) {
        if let Some(last) = lines.last_mut() {
            last.confidence = (count > 0).then(|| sum / count as f32);
        }
    }

    let mut lines: Vec<OcrLine> = Vec::new();
    let mut current_key: Option<(u32, u32, u32)> = None;
    let mut conf_sum = 0.0f32;
    let mut conf_count = 0u32;

    for row in tsv.lines() {
        let fields: Vec<&str> = row.split('\t').collect();
        if fields.len() < 12 {
            continue;
        }
        // Header and non-word rows
        let Ok(level) = fields[0].parse::<u32>() else {
            continue;
        };
        if level != WORD_LEVEL {
            continue;
        }
        let text = fields[11..].join("\t");
        let text = text.trim();
        if text.is_empty() {
            continue;
        }
        let key = (
            fields[2].parse().unwrap_or(0),
            fields[3].parse().unwrap_or(0),
            fields[4].parse().unwrap_or(0),
        );
        let conf = fields[10].parse::<f32>().ok().filter(|c| *c >= 0.0);

        if current_key != Some(key) {
            close(&mut lines, conf_sum, conf_count);
            lines.push(OcrLine {
                page,
                text: text.to_string(),
                confidence: None,
            });
            current_key = Some(key);
            conf_sum = 0.0;
            conf_count = 0;
        } else if let Some(last) = lines.last_mut() {
            last.text.push(' ');
            last.text.push_str(text);
        }
        if let Some(c) = conf {
            conf_sum += c;
            conf_count += 1;
        }
    }
    close(&mut lines, conf_sum, conf_count);
    lines
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(level: u32, block: u32, par: u32, line: u32, word: u32, conf: &str, text: &str) -> String {
        format!("{level}\t1\t{block}\t{par}\t{line}\t{word}\t0\t0\t10\t10\t{conf}\t{text}")
    }

    #[test]
    fn words_grouped_into_lines() {
        let tsv = [
            row(1, 0, 0, 0, 0, "-1", ""),
            row(4, 1, 1, 1, 0, "-1", ""),
            row(5, 1, 1, 1, 1, "90", "Total"),
            row(5, 1, 1, 1, 2, "80", "due"),
            row(4, 1, 1, 2, 0, "-1", ""),
            row(5, 1, 1, 2, 1, "70", "42.00"),
        ]
        .join("\n");

        let lines = parse_tsv(3, &tsv);
        assert_eq!(lines.len(), 2);
        assert_eq!(lines[0].text, "Total due");
        assert_eq!(lines[0].confidence, Some(85.0));
        assert_eq!(lines[0].page, 3);
        assert_eq!(lines[1].text, "42.00");
        assert_eq!(lines[1].confidence, Some(70.0));
    }

    #[test]
    fn header_and_blank_words_skipped() {
        let tsv = format!(
            "level\tpage_num\tblock_num\tpar_num\tline_num\tword_num\tleft\ttop\twidth\theight\tconf\ttext\n{}\n{}",
            row(5, 1, 1, 1, 1, "95", "  "),
            row(5, 1, 1, 1, 2, "95", "Name"),
        );
        let lines = parse_tsv(1, &tsv);
        assert_eq!(lines.len(), 1);
        assert_eq!(lines[0].text, "Name");
    }

    #[test]
    fn unscored_words_left_out_of_mean() {
        let tsv = [
            row(5, 2, 1, 1, 1, "-1", "Qty"),
            row(5, 2, 1, 1, 2, "60", "12"),
        ]
        .join("\n");
        let lines = parse_tsv(1, &tsv);
        assert_eq!(lines[0].confidence, Some(60.0));

        let lines = parse_tsv(1, &row(5, 1, 1, 1, 1, "-1", "x"));
        assert_eq!(lines[0].confidence, None);
    }

    #[test]
    fn same_line_number_in_new_block_is_new_line() {
        let tsv = [
            row(5, 1, 1, 1, 1, "90", "left"),
            row(5, 2, 1, 1, 1, "90", "right"),
        ]
        .join("\n");
        let lines = parse_tsv(1, &tsv);
        assert_eq!(lines.len(), 2);
    }

    #[test]
    fn empty_output_has_no_lines() {
        assert!(parse_tsv(1, "").is_empty());
    }
}
