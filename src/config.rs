use crate::engine::PageSegMode;
use crate::preprocessing::{PipelineConfig, ThresholdMode};
use crate::roi::Roi;
use crate::Args;
use std::path::PathBuf;
use std::time::Duration;

/// Application configuration
#[derive(Debug, Clone)]
pub struct Config {
    pub source: Option<PathBuf>,
    pub roi: Option<Roi>,
    pub engine: Option<String>,
    pub tesseract_bin: String,
    pub tessdata_path: Option<String>,
    pub language: String,
    /// Initial enhancement parameters; the operator adjusts them at runtime
    pub pipeline: PipelineConfig,
    pub psm: PageSegMode,
    pub saving: bool,
    pub save_interval_secs: f64,
    pub log_file: PathBuf,
    pub frame_interval: Duration,
    pub ocr_interval: Duration,
    pub recognition_timeout: Duration,
    pub max_cycles: Option<u64>,
    pub debug_image: Option<PathBuf>,
    pub json: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            source: None,
            roi: None,
            engine: None,
            tesseract_bin: "tesseract".to_string(),
            tessdata_path: None,
            language: "eng".to_string(),
            pipeline: PipelineConfig::default(),
            psm: PageSegMode::default(),
            saving: false,
            save_interval_secs: 5.0,
            log_file: PathBuf::from("measurements.csv"),
            frame_interval: Duration::from_millis(33),
            ocr_interval: Duration::from_millis(200),
            recognition_timeout: Duration::from_millis(2000),
            max_cycles: None,
            debug_image: None,
            json: false,
        }
    }
}

impl From<Args> for Config {
    fn from(args: Args) -> Self {
        let mode = ThresholdMode::from_number(args.mode).unwrap_or_default();
        let pipeline = PipelineConfig::new(mode, args.scale, args.threshold)
            .with_equalize(!args.no_clahe)
            .with_dilate(args.morphology);

        Self {
            source: args.source,
            roi: args.roi,
            engine: args.engine,
            tesseract_bin: args.tesseract_bin,
            tessdata_path: args.tessdata_path,
            language: args.language,
            pipeline,
            psm: PageSegMode(args.psm),
            saving: args.save,
            save_interval_secs: args.save_interval,
            log_file: args.log_file,
            frame_interval: Duration::from_millis(args.frame_interval_ms),
            ocr_interval: Duration::from_millis(args.ocr_interval_ms),
            recognition_timeout: Duration::from_millis(args.recognition_timeout_ms),
            max_cycles: args.max_cycles,
            debug_image: args.debug_image,
            json: args.json,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;

    #[test]
    fn test_defaults_from_command_line() {
        let args = Args::try_parse_from(["roi-ocr-reader", "--source", "frame.png"]).unwrap();
        let config = Config::from(args);

        assert_eq!(config.pipeline, PipelineConfig::default());
        assert_eq!(config.psm, PageSegMode(7));
        assert!(!config.saving);
        assert_eq!(config.ocr_interval, Duration::from_millis(200));
        assert_eq!(config.log_file, PathBuf::from("measurements.csv"));
    }

    #[test]
    fn test_pipeline_options_are_applied() {
        let args = Args::try_parse_from([
            "roi-ocr-reader",
            "--source",
            "frames",
            "--roi",
            "5,6,70,30",
            "--mode",
            "5",
            "--scale",
            "20",
            "--threshold",
            "140",
            "--no-clahe",
            "--morphology",
        ])
        .unwrap();
        let config = Config::from(args);

        assert_eq!(config.pipeline.mode, ThresholdMode::Manual);
        assert_eq!(config.pipeline.scale, 8.0);
        assert_eq!(config.pipeline.simple_threshold, 140);
        assert!(!config.pipeline.equalize);
        assert!(config.pipeline.dilate);
        assert_eq!(config.roi, Some(Roi::new(5, 6, 70, 30).unwrap()));
    }

    #[test]
    fn test_invalid_mode_is_rejected() {
        let result = Args::try_parse_from(["roi-ocr-reader", "--source", "a.png", "--mode", "6"]);
        assert!(result.is_err());
    }
}
