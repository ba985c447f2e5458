//! Driving loop
//!
//! Reads a frame per tick, runs the enhancement pipeline on the ROI and, at
//! the OCR cadence, hands an owned copy of the binary image to the voter on
//! a blocking thread. At most one recognition is in flight; results that
//! belong to an older ROI or parameter set are dropped.

use crate::capture::{FrameSource, ImageSource};
use crate::config::Config;
use crate::controls::{Command, Controls};
use crate::engine::PageSegMode;
use crate::engines::EngineRegistry;
use crate::measurements::MeasurementLog;
use crate::preprocessing::Pipeline;
use crate::recognition::{Recognition, Voter};
use crate::roi::{Roi, RoiState};
use anyhow::Context;
use chrono::Local;
use image::RgbImage;
use serde::Serialize;
use std::future::Future;
use std::io::BufRead;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

/// Build the session from the configuration and run it until it stops
pub async fn run(config: Config, registry: EngineRegistry) -> anyhow::Result<()> {
    let source_path = config
        .source
        .clone()
        .context("--source is required")?;
    let source = ImageSource::open(&source_path)?;

    let voter = Voter::new(registry.select(config.engine.as_deref())?);
    tracing::info!("Using {} engine", voter.recognizer_name());

    let mut session = Session::new(&config, voter);
    session.run(source, spawn_console()).await
}

/// Read operator commands from stdin on a dedicated thread
fn spawn_console() -> mpsc::UnboundedReceiver<String> {
    let (tx, rx) = mpsc::unbounded_channel();
    std::thread::spawn(move || {
        for line in std::io::stdin().lock().lines() {
            let Ok(line) = line else { break };
            if tx.send(line).is_err() {
                break;
            }
        }
    });
    rx
}

/// Window over which the frame rate is averaged
const FPS_WINDOW: Duration = Duration::from_secs(1);

/// A reading as printed with `--json`
#[derive(Debug, Serialize)]
struct Reading<'a> {
    timestamp: String,
    value: Option<&'a str>,
    raw: Option<&'a str>,
    roi: Option<Roi>,
    psm: PageSegMode,
}

/// Recognition running on the blocking pool
struct InFlight {
    /// Session generation the job was started under
    generation: u64,
    started: Instant,
    /// Already reported as timed out; its output will be discarded
    expired: bool,
    handle: JoinHandle<Recognition>,
}

/// Frames per second, averaged over [`FPS_WINDOW`]
#[derive(Debug)]
struct FrameRate {
    window_start: Instant,
    frames: u32,
    fps: f64,
}

impl FrameRate {
    fn new(now: Instant) -> Self {
        Self {
            window_start: now,
            frames: 0,
            fps: 0.0,
        }
    }

    /// Count a frame. Returns `true` when the window closed and `fps` was updated.
    fn tick(&mut self, now: Instant) -> bool {
        self.frames += 1;
        let elapsed = now.saturating_duration_since(self.window_start);
        if elapsed < FPS_WINDOW {
            return false;
        }
        self.fps = f64::from(self.frames) / elapsed.as_secs_f64();
        self.frames = 0;
        self.window_start = now;
        true
    }
}

/// Fixed loop timing and output settings
#[derive(Debug, Clone)]
struct SessionConfig {
    frame_interval: Duration,
    ocr_interval: Duration,
    recognition_timeout: Duration,
    max_cycles: Option<u64>,
    debug_image: Option<PathBuf>,
    json: bool,
    log_file: PathBuf,
}

pub struct Session {
    controls: Controls,
    roi: Option<Roi>,
    state: RoiState,
    voter: Arc<Voter>,
    settings: SessionConfig,
    log: Option<MeasurementLog>,
    /// Bumped whenever the ROI or recognition parameters change
    generation: u64,
    in_flight: Option<InFlight>,
    last_ocr: Option<Instant>,
    last_save: Option<Instant>,
    frame_rate: FrameRate,
}

impl Session {
    pub fn new(config: &Config, voter: Voter) -> Self {
        Self {
            controls: Controls::new(
                config.pipeline,
                config.psm,
                config.saving,
                config.save_interval_secs,
            ),
            roi: config.roi,
            state: RoiState::default(),
            voter: Arc::new(voter),
            settings: SessionConfig {
                frame_interval: config.frame_interval.max(Duration::from_millis(1)),
                ocr_interval: config.ocr_interval,
                recognition_timeout: config.recognition_timeout,
                max_cycles: config.max_cycles,
                debug_image: config.debug_image.clone(),
                json: config.json,
                log_file: config.log_file.clone(),
            },
            log: None,
            generation: 0,
            in_flight: None,
            last_ocr: None,
            last_save: None,
            frame_rate: FrameRate::new(Instant::now()),
        }
    }

    fn status_line(&self) -> String {
        self.controls.status_line(self.frame_rate.fps)
    }

    /// Run until quit, source exhaustion, `max_cycles` or Ctrl-C
    pub async fn run<S: FrameSource>(
        &mut self,
        source: S,
        commands: mpsc::UnboundedReceiver<String>,
    ) -> anyhow::Result<()> {
        self.run_until(source, commands, tokio::signal::ctrl_c()).await
    }

    /// Run until quit, source exhaustion, `max_cycles` or `shutdown` completes.
    ///
    /// `shutdown` is polled for the whole run, so a signal delivered while a
    /// frame is being processed is picked up at the next tick.
    pub async fn run_until<S, F>(
        &mut self,
        mut source: S,
        mut commands: mpsc::UnboundedReceiver<String>,
        shutdown: F,
    ) -> anyhow::Result<()>
    where
        S: FrameSource,
        F: Future,
    {
        tokio::pin!(shutdown);
        let mut ticker = tokio::time::interval(self.settings.frame_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut cycles: u64 = 0;

        tracing::info!("{}", self.status_line());
        if self.roi.is_none() {
            tracing::info!("No ROI selected yet. Type 's x,y,width,height' to select one");
        }

        'frames: loop {
            tokio::select! {
                biased;
                _ = &mut shutdown => {
                    tracing::info!("Interrupted");
                    break;
                }
                _ = ticker.tick() => {}
            }

            while let Ok(line) = commands.try_recv() {
                if !self.handle_command(&line) {
                    break 'frames;
                }
            }

            let frame = match source.next_frame() {
                Ok(Some(frame)) => frame,
                Ok(None) => {
                    tracing::info!("Frame source exhausted after {} frames", cycles);
                    break;
                }
                Err(e) if e.is_recoverable() => {
                    tracing::warn!("Skipping frame: {}", e);
                    continue;
                }
                Err(e) => return Err(e.into()),
            };

            self.process_frame(&frame);
            self.poll_recognition().await;

            if self.frame_rate.tick(Instant::now()) {
                tracing::debug!("{}", self.status_line());
            }

            cycles += 1;
            if self.settings.max_cycles.is_some_and(|max| cycles >= max) {
                tracing::info!("Reached {} frames", cycles);
                break;
            }
        }

        self.drain().await;
        Ok(())
    }

    /// Apply one operator command. Returns `false` when the loop should stop.
    fn handle_command(&mut self, line: &str) -> bool {
        match self.controls.apply(line) {
            Some(Command::Quit) => return false,
            Some(Command::SelectRoi(roi)) => {
                tracing::info!("ROI set to {}", roi);
                self.roi = Some(roi);
                self.state.clear();
                self.generation += 1;
            }
            Some(Command::Reconfigured) => {
                self.generation += 1;
                tracing::info!("{}", self.status_line());
            }
            Some(Command::SavingChanged) => {
                self.last_save = None;
                tracing::info!("{}", self.status_line());
            }
            None => tracing::debug!("Ignoring command {:?}", line),
        }
        true
    }

    /// Crop, enhance and, if due, start recognizing the current frame
    fn process_frame(&mut self, frame: &RgbImage) {
        let Some(roi) = self.roi else {
            return;
        };

        let cropped = roi.crop(frame);
        let processed = Pipeline::new(self.controls.pipeline).process(&cropped);
        self.state.cropped = Some(cropped);

        let Some(processed) = processed else {
            tracing::debug!(
                "ROI {} has no overlap with the {}x{} frame",
                roi,
                frame.width(),
                frame.height()
            );
            self.state.binary = None;
            return;
        };

        tracing::trace!(
            "Enhanced ROI in {}ms ({} steps)",
            processed.total_time_ms,
            processed.steps.len()
        );

        if let Some(path) = &self.settings.debug_image {
            if let Err(e) = processed.image.save(path) {
                tracing::warn!("Failed to write debug image {}: {}", path.display(), e);
            }
        }
        self.state.binary = Some(processed.image);

        if self.recognition_due() {
            self.start_recognition();
        }
    }

    fn recognition_due(&self) -> bool {
        self.in_flight.is_none()
            && self
                .last_ocr
                .map_or(true, |last| last.elapsed() >= self.settings.ocr_interval)
    }

    fn start_recognition(&mut self) {
        let Some(binary) = self.state.binary.clone() else {
            return;
        };
        let voter = Arc::clone(&self.voter);
        let psm = self.controls.psm;

        let handle = tokio::task::spawn_blocking(move || voter.vote(Some(&binary), psm));
        let now = Instant::now();
        self.in_flight = Some(InFlight {
            generation: self.generation,
            started: now,
            expired: false,
            handle,
        });
        self.last_ocr = Some(now);
    }

    /// Collect a finished recognition, or flag one that ran past the timeout
    async fn poll_recognition(&mut self) {
        let finished = match self.in_flight.as_mut() {
            None => return,
            Some(job) if job.handle.is_finished() => true,
            Some(job) => {
                if !job.expired && job.started.elapsed() >= self.settings.recognition_timeout {
                    job.expired = true;
                    tracing::warn!(
                        "Recognition exceeded {}ms, no reading this cycle",
                        self.settings.recognition_timeout.as_millis()
                    );
                    self.state.last_text = None;
                    self.state.raw_text = None;
                }
                false
            }
        };

        if finished {
            if let Some(job) = self.in_flight.take() {
                let outcome = job.handle.await;
                self.finish(job.generation, job.expired, outcome);
            }
        }
    }

    /// Wait for the in-flight recognition, bounded by the timeout
    async fn drain(&mut self) {
        let Some(InFlight {
            generation,
            started,
            expired,
            handle,
        }) = self.in_flight.take()
        else {
            return;
        };

        let remaining = self
            .settings
            .recognition_timeout
            .saturating_sub(started.elapsed());
        match tokio::time::timeout(remaining, handle).await {
            Ok(outcome) => self.finish(generation, expired, outcome),
            Err(_) => tracing::warn!("Abandoning recognition still running at shutdown"),
        }
    }

    fn finish(
        &mut self,
        generation: u64,
        expired: bool,
        outcome: Result<Recognition, tokio::task::JoinError>,
    ) {
        match outcome {
            Err(e) => tracing::error!("Recognition task failed: {}", e),
            Ok(_) if expired => tracing::debug!("Discarding recognition that timed out"),
            Ok(_) if generation != self.generation => {
                tracing::debug!("Discarding recognition for previous ROI or parameters")
            }
            Ok(recognition) => self.apply_recognition(recognition),
        }
    }

    fn apply_recognition(&mut self, recognition: Recognition) {
        if recognition.number != self.state.last_text {
            tracing::info!(
                "OCR: {} (raw {:?})",
                recognition.number.as_deref().unwrap_or("(empty)"),
                recognition.raw.as_deref().unwrap_or("")
            );
        }

        if self.settings.json {
            let reading = Reading {
                timestamp: Local::now().format("%Y-%m-%d %H:%M:%S").to_string(),
                value: recognition.number.as_deref(),
                raw: recognition.raw.as_deref(),
                roi: self.roi,
                psm: self.controls.psm,
            };
            match serde_json::to_string(&reading) {
                Ok(line) => println!("{}", line),
                Err(e) => tracing::warn!("Failed to serialize reading: {}", e),
            }
        }

        if let Some(number) = &recognition.number {
            self.maybe_save(number);
        }

        self.state.last_text = recognition.number;
        self.state.raw_text = recognition.raw;
    }

    /// Append the reading to the log if saving is on and the interval has passed
    fn maybe_save(&mut self, number: &str) {
        if !self.controls.saving {
            return;
        }
        if self
            .last_save
            .is_some_and(|last| last.elapsed() < self.controls.save_interval())
        {
            return;
        }

        if self.log.is_none() {
            match MeasurementLog::open(&self.settings.log_file) {
                Ok(log) => {
                    tracing::info!("Logging readings to {}", log.path().display());
                    self.log = Some(log);
                }
                Err(e) => {
                    tracing::error!("{}", e);
                    return;
                }
            }
        }
        let Some(log) = &self.log else {
            return;
        };

        match log.append(number, Local::now()) {
            Ok(_) => self.last_save = Some(Instant::now()),
            Err(e) => tracing::warn!("Reading not saved: {}", e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::{RecognitionConfig, Recognizer};
    use crate::error::OcrError;
    use image::{GrayImage, Rgb};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tempfile::tempdir;

    /// Always answers the same text, optionally after a delay
    struct FixedRecognizer {
        text: &'static str,
        delay: Duration,
        calls: AtomicUsize,
    }

    impl FixedRecognizer {
        fn new(text: &'static str, delay: Duration) -> Arc<Self> {
            Arc::new(Self {
                text,
                delay,
                calls: AtomicUsize::new(0),
            })
        }
    }

    impl Recognizer for FixedRecognizer {
        fn name(&self) -> &'static str {
            "fixed"
        }

        fn description(&self) -> &'static str {
            "Always returns the same text"
        }

        fn recognize(&self, _: &GrayImage, _: &RecognitionConfig) -> Result<String, OcrError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            std::thread::sleep(self.delay);
            Ok(self.text.to_string())
        }
    }

    struct VecSource(Vec<RgbImage>);

    impl FrameSource for VecSource {
        fn next_frame(&mut self) -> Result<Option<RgbImage>, OcrError> {
            Ok(if self.0.is_empty() {
                None
            } else {
                Some(self.0.remove(0))
            })
        }
    }

    fn frame() -> RgbImage {
        RgbImage::from_fn(40, 30, |x, _| {
            if (12..15).contains(&x) {
                Rgb([20, 20, 20])
            } else {
                Rgb([220, 220, 220])
            }
        })
    }

    fn config(log_file: PathBuf) -> Config {
        Config {
            roi: Some(Roi::new(5, 5, 20, 12).unwrap()),
            pipeline: crate::preprocessing::PipelineConfig::default().with_equalize(false),
            frame_interval: Duration::from_millis(1),
            ocr_interval: Duration::ZERO,
            recognition_timeout: Duration::from_millis(500),
            log_file,
            ..Config::default()
        }
    }

    fn no_commands() -> mpsc::UnboundedReceiver<String> {
        let (_tx, rx) = mpsc::unbounded_channel();
        rx
    }

    #[tokio::test]
    async fn test_readings_are_saved_once_per_interval() {
        let dir = tempdir().unwrap();
        let log_file = dir.path().join("measurements.csv");
        let recognizer = FixedRecognizer::new("12.5 cm", Duration::ZERO);

        let mut config = config(log_file.clone());
        config.saving = true;
        config.save_interval_secs = 60.0;
        let mut session = Session::new(&config, Voter::new(recognizer.clone()));

        session
            .run_until(
                VecSource(vec![frame(), frame(), frame()]),
                no_commands(),
                std::future::pending::<()>(),
            )
            .await
            .unwrap();

        assert_eq!(session.state.last_text.as_deref(), Some("12.5"));
        assert_eq!(session.state.raw_text.as_deref(), Some("12.5 cm"));
        assert!(recognizer.calls.load(Ordering::SeqCst) >= 3);

        let content = std::fs::read_to_string(&log_file).unwrap();
        let lines: Vec<&str> = content.lines().collect();
        assert_eq!(lines.len(), 2);
        assert_eq!(lines[0], "Timestamp,Value");
        assert!(lines[1].ends_with(",12.5"));
    }

    #[tokio::test]
    async fn test_nothing_is_saved_while_saving_is_off() {
        let dir = tempdir().unwrap();
        let log_file = dir.path().join("measurements.csv");
        let recognizer = FixedRecognizer::new("3", Duration::ZERO);
        let mut session = Session::new(&config(log_file.clone()), Voter::new(recognizer));

        session
            .run_until(VecSource(vec![frame()]), no_commands(), std::future::pending::<()>())
            .await
            .unwrap();

        assert_eq!(session.state.last_text.as_deref(), Some("3"));
        assert!(!log_file.exists());
    }

    #[tokio::test]
    async fn test_quit_command_stops_before_first_frame() {
        let dir = tempdir().unwrap();
        let recognizer = FixedRecognizer::new("1", Duration::ZERO);
        let mut session = Session::new(&config(dir.path().join("m.csv")), Voter::new(recognizer.clone()));

        let (tx, rx) = mpsc::unbounded_channel();
        tx.send("q".to_string()).unwrap();
        session
            .run_until(VecSource(vec![frame()]), rx, std::future::pending::<()>())
            .await
            .unwrap();

        assert_eq!(recognizer.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_result_for_previous_parameters_is_discarded() {
        let dir = tempdir().unwrap();
        let recognizer = FixedRecognizer::new("42", Duration::from_millis(20));
        let mut session = Session::new(&config(dir.path().join("m.csv")), Voter::new(recognizer));

        session.process_frame(&frame());
        assert!(session.in_flight.is_some());
        assert!(session.handle_command("m"));
        session.drain().await;

        assert_eq!(session.state.last_text, None);
    }

    #[tokio::test]
    async fn test_result_for_current_parameters_is_applied() {
        let dir = tempdir().unwrap();
        let recognizer = FixedRecognizer::new("-3,2", Duration::from_millis(20));
        let mut session = Session::new(&config(dir.path().join("m.csv")), Voter::new(recognizer));

        session.process_frame(&frame());
        session.drain().await;

        assert_eq!(session.state.last_text.as_deref(), Some("-3.2"));
    }

    #[tokio::test]
    async fn test_slow_recognition_times_out_without_overlap() {
        let dir = tempdir().unwrap();
        let recognizer = FixedRecognizer::new("9", Duration::from_millis(150));
        let mut config = config(dir.path().join("m.csv"));
        config.recognition_timeout = Duration::from_millis(30);
        let mut session = Session::new(&config, Voter::new(recognizer.clone()));

        session.process_frame(&frame());
        tokio::time::sleep(Duration::from_millis(50)).await;
        session.poll_recognition().await;
        assert!(session.in_flight.as_ref().is_some_and(|job| job.expired));

        // A new frame must not start a second recognition while the first runs
        session.process_frame(&frame());
        assert_eq!(recognizer.calls.load(Ordering::SeqCst), 1);

        // Three page segmentation modes at 150ms each
        tokio::time::sleep(Duration::from_millis(600)).await;
        session.poll_recognition().await;
        assert!(session.in_flight.is_none());
        assert_eq!(session.state.last_text, None);
    }

    #[tokio::test]
    async fn test_roi_outside_frame_skips_recognition() {
        let dir = tempdir().unwrap();
        let recognizer = FixedRecognizer::new("1", Duration::ZERO);
        let mut config = config(dir.path().join("m.csv"));
        config.roi = Some(Roi::new(100, 100, 10, 10).unwrap());
        let mut session = Session::new(&config, Voter::new(recognizer.clone()));

        session.process_frame(&frame());

        assert!(session.in_flight.is_none());
        assert!(session.state.binary.is_none());
        assert_eq!(recognizer.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_selecting_roi_resets_state() {
        let dir = tempdir().unwrap();
        let recognizer = FixedRecognizer::new("5", Duration::ZERO);
        let mut session = Session::new(&config(dir.path().join("m.csv")), Voter::new(recognizer));

        session.process_frame(&frame());
        session.drain().await;
        assert_eq!(session.state.last_text.as_deref(), Some("5"));

        assert!(session.handle_command("s 0,0,10,10"));
        assert_eq!(session.roi, Some(Roi::new(0, 0, 10, 10).unwrap()));
        assert_eq!(session.state.last_text, None);
        assert_eq!(session.generation, 1);
    }
    /// Endless source whose frames take a while to acquire
    struct SlowStill {
        delay: Duration,
        served: Arc<AtomicUsize>,
    }

    impl FrameSource for SlowStill {
        fn next_frame(&mut self) -> Result<Option<RgbImage>, OcrError> {
            std::thread::sleep(self.delay);
            self.served.fetch_add(1, Ordering::SeqCst);
            Ok(Some(frame()))
        }
    }

    #[tokio::test]
    async fn test_shutdown_during_frame_processing_stops_the_loop() {
        let dir = tempdir().unwrap();
        let recognizer = FixedRecognizer::new("1", Duration::ZERO);
        let mut session = Session::new(&config(dir.path().join("m.csv")), Voter::new(recognizer));

        let served = Arc::new(AtomicUsize::new(0));
        let source = SlowStill {
            delay: Duration::from_millis(40),
            served: Arc::clone(&served),
        };

        // Fire from another thread while the loop is blocked acquiring a frame
        let (tx, rx) = tokio::sync::oneshot::channel::<()>();
        std::thread::spawn(move || {
            std::thread::sleep(Duration::from_millis(60));
            let _ = tx.send(());
        });

        tokio::time::timeout(
            Duration::from_secs(5),
            session.run_until(source, no_commands(), rx),
        )
        .await
        .expect("loop kept running after shutdown")
        .unwrap();

        assert!(served.load(Ordering::SeqCst) < 10);
    }

    #[tokio::test]
    async fn test_pending_shutdown_stops_before_first_frame() {
        let dir = tempdir().unwrap();
        let recognizer = FixedRecognizer::new("1", Duration::ZERO);
        let mut session = Session::new(&config(dir.path().join("m.csv")), Voter::new(recognizer));

        let served = Arc::new(AtomicUsize::new(0));
        let source = SlowStill {
            delay: Duration::ZERO,
            served: Arc::clone(&served),
        };

        session
            .run_until(source, no_commands(), std::future::ready(()))
            .await
            .unwrap();

        assert_eq!(served.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_frame_rate_is_averaged_over_window() {
        let start = Instant::now();
        let mut rate = FrameRate::new(start);

        for i in 1..10 {
            assert!(!rate.tick(start + Duration::from_millis(i * 100)));
        }
        assert_eq!(rate.fps, 0.0);

        assert!(rate.tick(start + Duration::from_millis(1000)));
        assert!((rate.fps - 10.0).abs() < 1e-9);

        // Next window starts from the last tick
        assert!(!rate.tick(start + Duration::from_millis(1500)));
        assert!(rate.tick(start + Duration::from_millis(2000)));
        assert!((rate.fps - 2.0).abs() < 1e-9);
    }
}
