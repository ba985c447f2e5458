//! Operator parameter controls
//!
//! A flat set of bounded knobs driven by single-key commands. `s` takes the
//! ROI as an argument (`s x,y,w,h`) since there is no mouse gesture here.

use crate::engine::PageSegMode;
use crate::preprocessing::pipeline::clamp_scale;
use crate::preprocessing::{PipelineConfig, ThresholdMode};
use crate::roi::Roi;
use std::time::Duration;

const THRESHOLD_STEP: u8 = 5;
const SCALE_STEP: f32 = 0.5;
const SAVE_INTERVAL_STEP: f64 = 0.5;
const MIN_SAVE_INTERVAL: f64 = 0.5;
const MAX_SAVE_INTERVAL: f64 = 3600.0;
const DEFAULT_SAVE_INTERVAL: f64 = 5.0;

/// Clamp a save interval to its bounds; non-finite values fall back to the default
fn clamp_save_interval(secs: f64) -> f64 {
    if secs.is_nan() {
        return DEFAULT_SAVE_INTERVAL;
    }
    secs.clamp(MIN_SAVE_INTERVAL, MAX_SAVE_INTERVAL)
}

/// What the driving loop has to do after a key
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    Quit,
    SelectRoi(Roi),
    /// Enhancement or recognition parameters changed
    Reconfigured,
    /// Saving toggled or save interval changed
    SavingChanged,
}

/// Current operator-controlled parameters
#[derive(Debug, Clone, PartialEq)]
pub struct Controls {
    pub pipeline: PipelineConfig,
    pub psm: PageSegMode,
    pub saving: bool,
    pub save_interval_secs: f64,
}

impl Controls {
    pub fn new(pipeline: PipelineConfig, psm: PageSegMode, saving: bool, save_interval_secs: f64) -> Self {
        Self {
            pipeline,
            psm,
            saving,
            save_interval_secs: clamp_save_interval(save_interval_secs),
        }
    }

    pub fn save_interval(&self) -> Duration {
        Duration::from_secs_f64(self.save_interval_secs)
    }

    /// Apply one console line. The first character is the key; anything
    /// after it is the argument (only used by `s`).
    pub fn apply(&mut self, line: &str) -> Option<Command> {
        let line = line.trim();
        let mut chars = line.chars();
        let key = chars.next()?;
        let argument = chars.as_str().trim();

        let command = match key {
            'q' => Command::Quit,
            's' => match argument.parse::<Roi>() {
                Ok(roi) => Command::SelectRoi(roi),
                Err(e) => {
                    tracing::warn!("Ignoring ROI selection: {}", e);
                    return None;
                }
            },
            '1'..='5' => {
                let number = key.to_digit(10)? as u8;
                self.pipeline.mode = ThresholdMode::from_number(number)?;
                Command::Reconfigured
            }
            '[' => {
                self.pipeline.simple_threshold =
                    self.pipeline.simple_threshold.saturating_sub(THRESHOLD_STEP);
                Command::Reconfigured
            }
            ']' => {
                self.pipeline.simple_threshold =
                    self.pipeline.simple_threshold.saturating_add(THRESHOLD_STEP);
                Command::Reconfigured
            }
            'c' => {
                self.pipeline.equalize = !self.pipeline.equalize;
                Command::Reconfigured
            }
            'm' => {
                self.pipeline.dilate = !self.pipeline.dilate;
                Command::Reconfigured
            }
            '+' | '=' => {
                self.pipeline.scale = clamp_scale(self.pipeline.scale + SCALE_STEP);
                tracing::info!("Scale set to: {}", self.pipeline.scale);
                Command::Reconfigured
            }
            '-' | '_' => {
                self.pipeline.scale = clamp_scale(self.pipeline.scale - SCALE_STEP);
                tracing::info!("Scale set to: {}", self.pipeline.scale);
                Command::Reconfigured
            }
            'p' => {
                self.psm = self.psm.next();
                tracing::info!("PSM set to: {}", self.psm);
                Command::Reconfigured
            }
            'w' => {
                self.saving = !self.saving;
                tracing::info!("Saving toggled {}", if self.saving { "ON" } else { "OFF" });
                Command::SavingChanged
            }
            ',' => {
                self.save_interval_secs =
                    (self.save_interval_secs - SAVE_INTERVAL_STEP).max(MIN_SAVE_INTERVAL);
                tracing::info!("Save interval set to: {}s", self.save_interval_secs);
                Command::SavingChanged
            }
            '.' => {
                self.save_interval_secs =
                    (self.save_interval_secs + SAVE_INTERVAL_STEP).min(MAX_SAVE_INTERVAL);
                tracing::info!("Save interval set to: {}s", self.save_interval_secs);
                Command::SavingChanged
            }
            _ => return None,
        };

        Some(command)
    }

    /// One-line summary of the current parameters and frame rate
    pub fn status_line(&self, fps: f64) -> String {
        let threshold = if self.pipeline.mode == ThresholdMode::Manual {
            self.pipeline.simple_threshold.to_string()
        } else {
            "-".to_string()
        };
        let save_status = if self.saving {
            format!("SAVING ({}s)", self.save_interval_secs)
        } else {
            "IDLE".to_string()
        };

        format!(
            "Mode:{} PSM: {} Thr:{} Scale:{} CLAHE:{} Morph:{} FPS:{:.1} | {}",
            self.pipeline.mode,
            self.psm,
            threshold,
            self.pipeline.scale,
            if self.pipeline.equalize { "on" } else { "off" },
            if self.pipeline.dilate { "on" } else { "off" },
            fps,
            save_status
        )
    }
}

impl Default for Controls {
    fn default() -> Self {
        Self::new(
            PipelineConfig::default(),
            PageSegMode::default(),
            false,
            DEFAULT_SAVE_INTERVAL,
        )
    }
}
