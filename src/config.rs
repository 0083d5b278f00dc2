//! Command-line options and the validated `ControlConfig` the loop runs on.

use std::{path::PathBuf, time::Duration};

use clap::Parser;
use thiserror::Error;

use crate::{
    audio::MixerDriver,
    gesture::{
        distance::{DEFAULT_DELAY, DEFAULT_THRESHOLD},
        smoother::DEFAULT_HISTORY_LENGTH,
    },
};

pub const KEYPOINT_MODEL_FILENAME: &str = "keypoint_classifier.onnx";
pub const KEYPOINT_LABELS_FILENAME: &str = "keypoint_classifier_label.csv";
pub const POINT_HISTORY_MODEL_FILENAME: &str = "point_history_classifier.onnx";
pub const POINT_HISTORY_LABELS_FILENAME: &str = "point_history_classifier_label.csv";

#[derive(Debug, Error, PartialEq)]
pub enum ConfigError {
    #[error("{name} must be within [0, 1], got {value}")]
    Confidence { name: &'static str, value: f32 },
    #[error("capture size must be positive, got {width}x{height}")]
    FrameSize { width: u32, height: u32 },
    #[error("{name} must be a finite non-negative number, got {value}")]
    Negative { name: &'static str, value: f64 },
    #[error("delay of {0} seconds is too large")]
    DelayTooLarge(f64),
    #[error("max hands must be 1 or 2, got {0}")]
    MaxHands(usize),
    #[error("history length must be at least 1")]
    HistoryLength,
}

/// Gesture audio control: webcam hand gestures to media and volume actions.
#[derive(Debug, Parser)]
#[command(version, about, long_about = None)]
pub struct CliArgs {
    /// Camera index; a negative value picks the first camera found.
    #[arg(long, default_value_t = -1, allow_negative_numbers = true)]
    pub device: i32,
    /// Requested capture width in pixels.
    #[arg(long, default_value_t = 960)]
    pub width: u32,
    /// Requested capture height in pixels.
    #[arg(long, default_value_t = 540)]
    pub height: u32,
    /// Minimum palm detection score.
    #[arg(long, default_value_t = 0.7)]
    pub min_detection_confidence: f32,
    /// Minimum hand landmark confidence.
    #[arg(long, default_value_t = 0.5)]
    pub min_tracking_confidence: f32,
    /// Seconds a two-hand pinch must be held before the volume follows it.
    #[arg(long, default_value_t = DEFAULT_DELAY.as_secs_f64())]
    pub delay: f64,
    /// Minimum relative pinch change before a new volume is applied.
    #[arg(long, default_value_t = DEFAULT_THRESHOLD)]
    pub threshold: f32,
    /// Do not draw the terminal volume meter.
    #[arg(long)]
    pub headless: bool,
    /// Mixer driver: `alsa` or `pulse`.
    #[arg(long, default_value = "alsa")]
    pub driver: MixerDriver,
    /// Log audio actions instead of running them.
    #[arg(long)]
    pub dry_run: bool,
    /// Hands tracked per frame; 1 disables two-hand volume control.
    #[arg(long, default_value_t = 2)]
    pub max_hands: usize,
    /// Frames of fingertip trajectory fed to the finger-gesture classifier.
    #[arg(long, default_value_t = DEFAULT_HISTORY_LENGTH)]
    pub history_length: usize,
    /// Directory holding the ONNX models and label files.
    #[arg(long, default_value = "models")]
    pub model_dir: PathBuf,
    /// Read frames from a directory of images instead of a camera.
    #[arg(long, value_name = "DIR")]
    pub replay: Option<PathBuf>,
}

#[derive(Clone, Debug)]
pub struct ControlConfig {
    pub device: i32,
    pub width: u32,
    pub height: u32,
    pub min_detection_confidence: f32,
    pub min_tracking_confidence: f32,
    pub delay: Duration,
    pub threshold: f32,
    pub headless: bool,
    pub driver: MixerDriver,
    pub dry_run: bool,
    pub max_hands: usize,
    pub history_length: usize,
    pub model_dir: PathBuf,
    pub replay: Option<PathBuf>,
}

impl Default for ControlConfig {
    fn default() -> Self {
        Self {
            device: -1,
            width: 960,
            height: 540,
            min_detection_confidence: 0.7,
            min_tracking_confidence: 0.5,
            delay: DEFAULT_DELAY,
            threshold: DEFAULT_THRESHOLD,
            headless: false,
            driver: MixerDriver::Alsa,
            dry_run: false,
            max_hands: 2,
            history_length: DEFAULT_HISTORY_LENGTH,
            model_dir: PathBuf::from("models"),
            replay: None,
        }
    }
}

impl ControlConfig {
    pub fn from_args(args: CliArgs) -> Result<Self, ConfigError> {
        if !args.delay.is_finite() || args.delay < 0.0 {
            return Err(ConfigError::Negative {
                name: "delay",
                value: args.delay,
            });
        }
        let delay = Duration::try_from_secs_f64(args.delay)
            .map_err(|_| ConfigError::DelayTooLarge(args.delay))?;

        let config = Self {
            device: args.device,
            width: args.width,
            height: args.height,
            min_detection_confidence: args.min_detection_confidence,
            min_tracking_confidence: args.min_tracking_confidence,
            delay,
            threshold: args.threshold,
            headless: args.headless,
            driver: args.driver,
            dry_run: args.dry_run,
            max_hands: args.max_hands,
            history_length: args.history_length,
            model_dir: args.model_dir,
            replay: args.replay,
        };
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        for (name, value) in [
            ("min_detection_confidence", self.min_detection_confidence),
            ("min_tracking_confidence", self.min_tracking_confidence),
        ] {
            if !(0.0..=1.0).contains(&value) {
                return Err(ConfigError::Confidence { name, value });
            }
        }
        if self.width == 0 || self.height == 0 {
            return Err(ConfigError::FrameSize {
                width: self.width,
                height: self.height,
            });
        }
        if !self.threshold.is_finite() || self.threshold < 0.0 {
            return Err(ConfigError::Negative {
                name: "threshold",
                value: self.threshold as f64,
            });
        }
        if !(1..=2).contains(&self.max_hands) {
            return Err(ConfigError::MaxHands(self.max_hands));
        }
        if self.history_length == 0 {
            return Err(ConfigError::HistoryLength);
        }
        Ok(())
    }

    pub fn keypoint_model_path(&self) -> PathBuf {
        self.model_dir.join(KEYPOINT_MODEL_FILENAME)
    }

    pub fn keypoint_labels_path(&self) -> PathBuf {
        self.model_dir.join(KEYPOINT_LABELS_FILENAME)
    }

    pub fn point_history_model_path(&self) -> PathBuf {
        self.model_dir.join(POINT_HISTORY_MODEL_FILENAME)
    }

    pub fn point_history_labels_path(&self) -> PathBuf {
        self.model_dir.join(POINT_HISTORY_LABELS_FILENAME)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(argv: &[&str]) -> Result<ControlConfig, ConfigError> {
        let args = CliArgs::try_parse_from(std::iter::once("gesture-audio").chain(argv.iter().copied()))
            .expect("arguments parse");
        ControlConfig::from_args(args)
    }

    #[test]
    fn test_defaults() {
        let config = parse(&[]).unwrap();
        assert_eq!(config.device, -1);
        assert_eq!((config.width, config.height), (960, 540));
        assert_eq!(config.min_detection_confidence, 0.7);
        assert_eq!(config.min_tracking_confidence, 0.5);
        assert_eq!(config.delay, Duration::from_millis(400));
        assert_eq!(config.threshold, 0.012);
        assert!(!config.headless);
        assert_eq!(config.driver, MixerDriver::Alsa);
        assert_eq!(config.max_hands, 2);
        assert_eq!(config.history_length, 16);
    }

    #[test]
    fn test_overrides() {
        let config = parse(&[
            "--device",
            "2",
            "--delay",
            "1.5",
            "--threshold",
            "0.05",
            "--headless",
            "--driver",
            "pulse",
            "--max-hands",
            "1",
        ])
        .unwrap();
        assert_eq!(config.device, 2);
        assert_eq!(config.delay, Duration::from_millis(1_500));
        assert_eq!(config.threshold, 0.05);
        assert!(config.headless);
        assert_eq!(config.driver, MixerDriver::Pulse);
        assert_eq!(config.max_hands, 1);
    }

    #[test]
    fn test_negative_device_accepted() {
        assert_eq!(parse(&["--device", "-1"]).unwrap().device, -1);
    }

    #[test]
    fn test_rejects_out_of_range_values() {
        assert!(matches!(
            parse(&["--min-detection-confidence", "1.5"]),
            Err(ConfigError::Confidence { .. })
        ));
        assert_eq!(parse(&["--max-hands", "3"]).unwrap_err(), ConfigError::MaxHands(3));
        assert_eq!(
            parse(&["--history-length", "0"]).unwrap_err(),
            ConfigError::HistoryLength
        );
        assert!(matches!(
            parse(&["--width", "0"]),
            Err(ConfigError::FrameSize { .. })
        ));
    }

    #[test]
    fn test_rejects_unrepresentable_delay() {
        assert_eq!(
            parse(&["--delay", "1e30"]).unwrap_err(),
            ConfigError::DelayTooLarge(1e30)
        );
        assert!(matches!(
            parse(&["--delay", "inf"]),
            Err(ConfigError::Negative { name: "delay", .. })
        ));
        assert_eq!(parse(&["--delay", "2.5"]).unwrap().delay, Duration::from_millis(2_500));
    }

    #[test]
    fn test_unknown_flag_rejected() {
        assert!(CliArgs::try_parse_from(["gesture-audio", "--use-magic"]).is_err());
        assert!(CliArgs::try_parse_from(["gesture-audio", "--driver", "oss"]).is_err());
    }

    #[test]
    fn test_model_paths() {
        let config = ControlConfig {
            model_dir: PathBuf::from("/opt/models"),
            ..ControlConfig::default()
        };
        assert_eq!(
            config.keypoint_labels_path(),
            PathBuf::from("/opt/models/keypoint_classifier_label.csv")
        );
        assert_eq!(
            config.point_history_model_path(),
            PathBuf::from("/opt/models/point_history_classifier.onnx")
        );
    }
}
