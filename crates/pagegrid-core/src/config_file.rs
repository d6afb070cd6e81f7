use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::{Config, ExtractMode};

/// On-disk TOML configuration structure.
/// All fields are optional so partial configs work (merge with defaults).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ConfigFile {
    pub detection: Option<DetectionConfig>,
    pub ocr: Option<OcrConfig>,
    pub tables: Option<TablesConfig>,
    pub output: Option<OutputConfig>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DetectionConfig {
    /// "auto", "text" or "ocr".
    pub mode: Option<String>,
    pub check_pages: Option<u32>,
    pub min_text_chars: Option<usize>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct OcrConfig {
    pub batch_size: Option<u32>,
    pub max_workers: Option<usize>,
    pub dpi: Option<u32>,
    pub language: Option<String>,
    pub tessdata_path: Option<String>,
    pub min_confidence: Option<f32>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TablesConfig {
    pub row_tolerance: Option<f32>,
    pub column_gap_ratio: Option<f32>,
    pub min_rows: Option<usize>,
    pub min_columns: Option<usize>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct OutputConfig {
    pub format: Option<String>,
    pub preview_rows: Option<usize>,
}

/// Platform config directory path: `<config_dir>/pagegrid/config.toml`.
pub fn config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|d| d.join("pagegrid").join("config.toml"))
}

/// Load config by cascading CWD `.pagegrid.toml` over platform config.
/// CWD values override platform values.
pub fn load_config() -> ConfigFile {
    let platform = config_path().and_then(|p| load_from_path(&p));
    let cwd = load_from_path(Path::new(".pagegrid.toml"));

    match (platform, cwd) {
        (None, None) => ConfigFile::default(),
        (Some(p), None) => p,
        (None, Some(c)) => c,
        (Some(p), Some(c)) => merge(p, c),
    }
}

/// Load a config from a specific path. Returns `None` if the file doesn't
/// exist; a file that exists but fails to parse is logged and ignored.
pub fn load_from_path(path: &Path) -> Option<ConfigFile> {
    let content = std::fs::read_to_string(path).ok()?;
    match toml::from_str(&content) {
        Ok(config) => {
            tracing::debug!(path = %path.display(), "loaded config file");
            Some(config)
        }
        Err(e) => {
            tracing::warn!(path = %path.display(), error = %e, "ignoring unparsable config file");
            None
        }
    }
}

/// Pick the overlay's value for a field if present, else the base's.
macro_rules! pick {
    ($base:expr, $overlay:expr, $section:ident . $field:ident) => {
        $overlay
            .$section
            .as_ref()
            .and_then(|s| s.$field.clone())
            .or_else(|| $base.$section.as_ref().and_then(|s| s.$field.clone()))
    };
}

/// Merge two configs: `overlay` values take precedence over `base`.
pub fn merge(base: ConfigFile, overlay: ConfigFile) -> ConfigFile {
    ConfigFile {
        detection: Some(DetectionConfig {
            mode: pick!(base, overlay, detection.mode),
            check_pages: pick!(base, overlay, detection.check_pages),
            min_text_chars: pick!(base, overlay, detection.min_text_chars),
        }),
        ocr: Some(OcrConfig {
            batch_size: pick!(base, overlay, ocr.batch_size),
            max_workers: pick!(base, overlay, ocr.max_workers),
            dpi: pick!(base, overlay, ocr.dpi),
            language: pick!(base, overlay, ocr.language),
            tessdata_path: pick!(base, overlay, ocr.tessdata_path),
            min_confidence: pick!(base, overlay, ocr.min_confidence),
        }),
        tables: Some(TablesConfig {
            row_tolerance: pick!(base, overlay, tables.row_tolerance),
            column_gap_ratio: pick!(base, overlay, tables.column_gap_ratio),
            min_rows: pick!(base, overlay, tables.min_rows),
            min_columns: pick!(base, overlay, tables.min_columns),
        }),
        output: Some(OutputConfig {
            format: pick!(base, overlay, output.format),
            preview_rows: pick!(base, overlay, output.preview_rows),
        }),
    }
}

impl ConfigFile {
    /// Overlay the file's settings onto `config`. Unset fields keep their value.
    ///
    /// An unrecognized `mode` is logged and ignored.
    pub fn apply_to(&self, config: &mut Config) {
        if let Some(d) = &self.detection {
            if let Some(mode) = &d.mode {
                match mode.parse::<ExtractMode>() {
                    Ok(m) => config.mode = m,
                    Err(e) => tracing::warn!(error = %e, "ignoring detection.mode"),
                }
            }
            if let Some(v) = d.check_pages {
                config.check_pages = v;
            }
            if let Some(v) = d.min_text_chars {
                config.min_text_chars = v;
            }
        }
        if let Some(o) = &self.ocr {
            if let Some(v) = o.batch_size {
                config.batch_size = v;
            }
            if let Some(v) = o.max_workers {
                config.max_workers = v;
            }
            if let Some(v) = o.dpi {
                config.dpi = v;
            }
            if o.min_confidence.is_some() {
                config.min_confidence = o.min_confidence;
            }
        }
        if let Some(t) = &self.tables {
            if let Some(v) = t.row_tolerance {
                config.tables.row_tolerance = v;
            }
            if let Some(v) = t.column_gap_ratio {
                config.tables.column_gap_ratio = v;
            }
            if let Some(v) = t.min_rows {
                config.tables.min_rows = v;
            }
            if let Some(v) = t.min_columns {
                config.tables.min_columns = v;
            }
        }
    }

    pub fn ocr_language(&self) -> Option<&str> {
        self.ocr.as_ref().and_then(|o| o.language.as_deref())
    }

    pub fn tessdata_path(&self) -> Option<&str> {
        self.ocr.as_ref().and_then(|o| o.tessdata_path.as_deref())
    }

    pub fn output_format(&self) -> Option<&str> {
        self.output.as_ref().and_then(|o| o.format.as_deref())
    }

    pub fn preview_rows(&self) -> Option<usize> {
        self.output.as_ref().and_then(|o| o.preview_rows)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_file_parses() {
        let toml_str = "[ocr]\nbatch_size = 4\nlanguage = \"deu\"\n";
        let parsed: ConfigFile = toml::from_str(toml_str).unwrap();
        let ocr = parsed.ocr.as_ref().unwrap();
        assert_eq!(ocr.batch_size, Some(4));
        assert!(ocr.dpi.is_none());
        assert!(parsed.detection.is_none());
        assert_eq!(parsed.ocr_language(), Some("deu"));
    }

    #[test]
    fn round_trip_toml() {
        let config = ConfigFile {
            tables: Some(TablesConfig {
                min_rows: Some(3),
                ..Default::default()
            }),
            ..Default::default()
        };
        let toml_str = toml::to_string_pretty(&config).unwrap();
        let parsed: ConfigFile = toml::from_str(&toml_str).unwrap();
        assert_eq!(parsed.tables.unwrap().min_rows, Some(3));
    }

    #[test]
    fn merge_overlay_wins() {
        let base = ConfigFile {
            ocr: Some(OcrConfig {
                dpi: Some(150),
                batch_size: Some(4),
                ..Default::default()
            }),
            ..Default::default()
        };
        let overlay = ConfigFile {
            ocr: Some(OcrConfig {
                dpi: Some(300),
                ..Default::default()
            }),
            ..Default::default()
        };
        let merged = merge(base, overlay);
        let ocr = merged.ocr.unwrap();
        assert_eq!(ocr.dpi, Some(300));
        assert_eq!(ocr.batch_size, Some(4));
    }

    #[test]
    fn merge_base_preserved_when_overlay_absent() {
        let base = ConfigFile {
            output: Some(OutputConfig {
                preview_rows: Some(10),
                ..Default::default()
            }),
            ..Default::default()
        };
        let merged = merge(base, ConfigFile::default());
        assert_eq!(merged.preview_rows(), Some(10));
    }

    #[test]
    fn apply_overrides_only_set_fields() {
        let file = ConfigFile {
            detection: Some(DetectionConfig {
                mode: Some("ocr".into()),
                ..Default::default()
            }),
            ocr: Some(OcrConfig {
                batch_size: Some(16),
                min_confidence: Some(60.0),
                ..Default::default()
            }),
            tables: Some(TablesConfig {
                min_columns: Some(3),
                ..Default::default()
            }),
            ..Default::default()
        };
        let mut config = Config::default();
        let dpi_before = config.dpi;
        file.apply_to(&mut config);

        assert_eq!(config.mode, ExtractMode::Ocr);
        assert_eq!(config.batch_size, 16);
        assert_eq!(config.min_confidence, Some(60.0));
        assert_eq!(config.tables.min_columns, 3);
        assert_eq!(config.tables.min_rows, 2);
        assert_eq!(config.dpi, dpi_before);
    }

    #[test]
    fn apply_ignores_bad_mode() {
        let file = ConfigFile {
            detection: Some(DetectionConfig {
                mode: Some("magic".into()),
                ..Default::default()
            }),
            ..Default::default()
        };
        let mut config = Config::default();
        file.apply_to(&mut config);
        assert_eq!(config.mode, ExtractMode::Auto);
    }

    #[test]
    fn missing_file_is_none() {
        assert!(load_from_path(Path::new("/definitely/not/here/.pagegrid.toml")).is_none());
    }
}
