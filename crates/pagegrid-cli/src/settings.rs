use std::path::{Path, PathBuf};

use pagegrid_core::config_file::ConfigFile;
use pagegrid_core::{Config, ExtractMode};
use pagegrid_reporting::ExportFormat;

/// Rows shown in the terminal preview when nothing else is configured.
pub const DEFAULT_PREVIEW_ROWS: usize = 50;

const DEFAULT_LANGUAGE: &str = "eng";

/// Extraction flags as given on the command line. `None` means "not given".
#[derive(Debug, Default, Clone)]
pub struct ExtractFlags {
    pub mode: Option<ExtractMode>,
    pub workers: Option<usize>,
    pub batch_size: Option<u32>,
    pub dpi: Option<u32>,
    pub lang: Option<String>,
    pub tessdata: Option<String>,
    pub min_confidence: Option<f32>,
    pub format: Option<ExportFormat>,
    pub preview: Option<usize>,
}

/// Fully resolved settings for one extraction run.
#[derive(Debug, Clone)]
pub struct Settings {
    pub config: Config,
    pub language: String,
    pub tessdata: Option<String>,
    /// Format given on the command line; beats the output extension.
    pub format: Option<ExportFormat>,
    /// Format from the config file; used when neither flag nor extension decides.
    pub default_format: Option<ExportFormat>,
    pub preview_rows: usize,
}

fn env_parse<T: std::str::FromStr>(env: &dyn Fn(&str) -> Option<String>, key: &str) -> Option<T> {
    let raw = env(key)?;
    match raw.trim().parse() {
        Ok(v) => Some(v),
        Err(_) => {
            tracing::warn!(key, value = %raw, "ignoring unparsable environment variable");
            None
        }
    }
}

/// Resolve configuration: CLI flags > env vars > config file > defaults.
pub fn resolve(
    flags: &ExtractFlags,
    env: &dyn Fn(&str) -> Option<String>,
    file: &ConfigFile,
) -> Settings {
    let mut config = Config::default();
    file.apply_to(&mut config);

    if let Some(v) = env_parse(env, "PAGEGRID_WORKERS") {
        config.max_workers = v;
    }
    if let Some(v) = env_parse(env, "PAGEGRID_BATCH_SIZE") {
        config.batch_size = v;
    }
    if let Some(v) = env_parse(env, "PAGEGRID_DPI") {
        config.dpi = v;
    }

    if let Some(v) = flags.mode {
        config.mode = v;
    }
    if let Some(v) = flags.workers {
        config.max_workers = v;
    }
    if let Some(v) = flags.batch_size {
        config.batch_size = v;
    }
    if let Some(v) = flags.dpi {
        config.dpi = v;
    }
    if flags.min_confidence.is_some() {
        config.min_confidence = flags.min_confidence;
    }
    config.max_workers = config.max_workers.max(1);
    config.batch_size = config.batch_size.max(1);

    let language = flags
        .lang
        .clone()
        .or_else(|| env("PAGEGRID_LANG"))
        .or_else(|| file.ocr_language().map(String::from))
        .unwrap_or_else(|| DEFAULT_LANGUAGE.to_string());
    let tessdata = flags
        .tessdata
        .clone()
        .or_else(|| env("TESSDATA_PREFIX"))
        .or_else(|| file.tessdata_path().map(String::from));

    let default_format = file
        .output_format()
        .and_then(|f| match f.parse::<ExportFormat>() {
            Ok(format) => Some(format),
            Err(e) => {
                tracing::warn!(error = %e, "ignoring output.format");
                None
            }
        });
    let preview_rows = flags
        .preview
        .or_else(|| file.preview_rows())
        .unwrap_or(DEFAULT_PREVIEW_ROWS);

    Settings {
        config,
        language,
        tessdata,
        format: flags.format,
        default_format,
        preview_rows,
    }
}

/// Pick the output path and format.
///
/// The format is the explicit one, else the output path's extension, else
/// `fallback`, else CSV. Without an output path the sheet lands next to the
/// input as `<stem>.<ext>`.
pub fn output_target(
    input: &Path,
    output: Option<&Path>,
    explicit: Option<ExportFormat>,
    fallback: Option<ExportFormat>,
) -> (PathBuf, ExportFormat) {
    match output {
        Some(path) => {
            let format = explicit
                .or_else(|| ExportFormat::from_path(path))
                .or(fallback)
                .unwrap_or_default();
            (path.to_path_buf(), format)
        }
        None => {
            let format = explicit.or(fallback).unwrap_or_default();
            (input.with_extension(format.extension()), format)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pagegrid_core::config_file::OcrConfig;

    fn no_env(_: &str) -> Option<String> {
        None
    }

    #[test]
    fn defaults_when_nothing_set() {
        let s = resolve(&ExtractFlags::default(), &no_env, &ConfigFile::default());
        assert_eq!(s.config.mode, ExtractMode::Auto);
        assert_eq!(s.config.batch_size, pagegrid_core::DEFAULT_BATCH_SIZE);
        assert_eq!(s.language, "eng");
        assert!(s.tessdata.is_none());
        assert!(s.format.is_none());
        assert!(s.default_format.is_none());
        assert_eq!(s.preview_rows, DEFAULT_PREVIEW_ROWS);
    }

    #[test]
    fn flags_beat_env_beat_file() {
        let file = ConfigFile {
            ocr: Some(OcrConfig {
                dpi: Some(150),
                batch_size: Some(4),
                max_workers: Some(2),
                language: Some("fra".into()),
                ..Default::default()
            }),
            ..Default::default()
        };
        let env = |key: &str| match key {
            "PAGEGRID_DPI" => Some("300".to_string()),
            "PAGEGRID_BATCH_SIZE" => Some("6".to_string()),
            "PAGEGRID_LANG" => Some("deu".to_string()),
            _ => None,
        };
        let flags = ExtractFlags {
            batch_size: Some(10),
            ..Default::default()
        };

        let s = resolve(&flags, &env, &file);
        assert_eq!(s.config.batch_size, 10);
        assert_eq!(s.config.dpi, 300);
        assert_eq!(s.config.max_workers, 2);
        assert_eq!(s.language, "deu");
    }

    #[test]
    fn bad_env_value_ignored() {
        let env = |key: &str| (key == "PAGEGRID_WORKERS").then(|| "many".to_string());
        let s = resolve(&ExtractFlags::default(), &env, &ConfigFile::default());
        assert_eq!(s.config.max_workers, pagegrid_core::default_max_workers());
    }

    #[test]
    fn zero_workers_and_batch_clamped() {
        let flags = ExtractFlags {
            workers: Some(0),
            batch_size: Some(0),
            ..Default::default()
        };
        let s = resolve(&flags, &no_env, &ConfigFile::default());
        assert_eq!(s.config.max_workers, 1);
        assert_eq!(s.config.batch_size, 1);
    }

    #[test]
    fn tessdata_from_env() {
        let env = |key: &str| (key == "TESSDATA_PREFIX").then(|| "/opt/tessdata".to_string());
        let s = resolve(&ExtractFlags::default(), &env, &ConfigFile::default());
        assert_eq!(s.tessdata.as_deref(), Some("/opt/tessdata"));
    }

    #[test]
    fn default_output_next_to_input() {
        let (path, format) = output_target(Path::new("scans/invoice.pdf"), None, None, None);
        assert_eq!(path, PathBuf::from("scans/invoice.csv"));
        assert_eq!(format, ExportFormat::Csv);

        let (path, _) = output_target(Path::new("invoice.pdf"), None, Some(ExportFormat::Json), None);
        assert_eq!(path, PathBuf::from("invoice.json"));

        let (path, _) = output_target(Path::new("invoice.pdf"), None, None, Some(ExportFormat::Markdown));
        assert_eq!(path, PathBuf::from("invoice.md"));
    }

    #[test]
    fn output_extension_picks_format() {
        let out = Some(Path::new("out.md"));
        let (_, format) = output_target(Path::new("a.pdf"), out, None, Some(ExportFormat::Json));
        assert_eq!(format, ExportFormat::Markdown);

        let (_, format) = output_target(Path::new("a.pdf"), out, Some(ExportFormat::Text), None);
        assert_eq!(format, ExportFormat::Text);

        let unknown = Some(Path::new("out.xlsx"));
        let (_, format) = output_target(Path::new("a.pdf"), unknown, None, None);
        assert_eq!(format, ExportFormat::Csv);

        let (_, format) = output_target(Path::new("a.pdf"), unknown, None, Some(ExportFormat::Json));
        assert_eq!(format, ExportFormat::Json);
    }
}
