use clap::Parser;
use std::path::PathBuf;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod capture;
mod config;
mod controls;
mod engine;
mod engines;
mod error;
mod measurements;
mod preprocessing;
mod recognition;
mod roi;
mod session;

#[derive(Parser, Debug)]
#[command(name = "roi-ocr-reader")]
#[command(about = "Reads a numeric value from a region of a live image with Tesseract OCR")]
#[command(version)]
pub struct Args {
    /// Image file (repeated every tick) or directory of frames
    #[arg(long, env = "OCR_SOURCE", required_unless_present = "list_engines")]
    pub source: Option<PathBuf>,

    /// Region of interest as x,y,width,height (can also be set at runtime with `s`)
    #[arg(long, env = "OCR_ROI")]
    pub roi: Option<roi::Roi>,

    /// OCR engine to use (defaults to the first available)
    #[arg(long, env = "OCR_ENGINE")]
    pub engine: Option<String>,

    /// List available OCR engines and exit
    #[arg(long)]
    pub list_engines: bool,

    /// Tesseract executable used by the command-line engine
    #[arg(long, env = "TESSERACT_BIN", default_value = "tesseract")]
    pub tesseract_bin: String,

    /// Path to tessdata directory (uses TESSDATA_PREFIX env var if not set)
    #[arg(long, env = "TESSDATA_PREFIX")]
    pub tessdata_path: Option<String>,

    /// Recognition language
    #[arg(long, env = "OCR_LANGUAGE", default_value = "eng")]
    pub language: String,

    /// Threshold mode: 1 Otsu, 2 Otsu inverted, 3 adaptive, 4 adaptive inverted, 5 manual
    #[arg(long, env = "OCR_MODE", default_value = "1", value_parser = clap::value_parser!(u8).range(1..=5))]
    pub mode: u8,

    /// Upscale factor applied to the ROI (1.0 - 8.0)
    #[arg(long, env = "OCR_SCALE", default_value = "2.5")]
    pub scale: f32,

    /// Manual threshold level used by mode 5
    #[arg(long, env = "OCR_THRESHOLD", default_value = "100")]
    pub threshold: u8,

    /// Disable contrast-limited histogram equalization
    #[arg(long)]
    pub no_clahe: bool,

    /// Enable 3x3 dilation of the binary image
    #[arg(long)]
    pub morphology: bool,

    /// Preferred Tesseract page segmentation mode
    #[arg(long, env = "OCR_PSM", default_value = "7")]
    pub psm: u8,

    /// Append readings to the measurement log from the start
    #[arg(long)]
    pub save: bool,

    /// Minimum seconds between two logged readings
    #[arg(long, env = "OCR_SAVE_INTERVAL", default_value = "5.0")]
    pub save_interval: f64,

    /// Measurement log (CSV)
    #[arg(long, env = "OCR_LOG_FILE", default_value = "measurements.csv")]
    pub log_file: PathBuf,

    /// Milliseconds between frames
    #[arg(long, env = "OCR_FRAME_INTERVAL_MS", default_value = "33")]
    pub frame_interval_ms: u64,

    /// Milliseconds between recognition attempts
    #[arg(long, env = "OCR_INTERVAL_MS", default_value = "200")]
    pub ocr_interval_ms: u64,

    /// Give up on a recognition attempt after this many milliseconds
    #[arg(long, env = "OCR_RECOGNITION_TIMEOUT_MS", default_value = "2000")]
    pub recognition_timeout_ms: u64,

    /// Stop after this many frames
    #[arg(long)]
    pub max_cycles: Option<u64>,

    /// Write the latest binary image here after every frame
    #[arg(long)]
    pub debug_image: Option<PathBuf>,

    /// Print every reading to stdout as a JSON line
    #[arg(long)]
    pub json: bool,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, env = "RUST_LOG", default_value = "info")]
    pub log_level: String,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    // Logs go to stderr so stdout stays clean for --json readings
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| args.log_level.clone().into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let list_engines = args.list_engines;
    let config = config::Config::from(args);

    tracing::info!("Starting roi-ocr-reader v{}", env!("CARGO_PKG_VERSION"));

    let registry = engines::EngineRegistry::new(&config)?;
    if list_engines {
        for info in registry.info() {
            println!("{:<10} {}", info.name, info.description);
        }
        return Ok(());
    }

    session::run(config, registry).await
}
