//! Hand landmark detection: palm regions from a first model, then 21
//! landmarks per region from a rotated crop fed to the handpose model.

pub mod common;
pub mod palm;

use std::path::Path;

use anyhow::{Context, Result, anyhow};
use ort::session::{Session, builder::GraphOptimizationLevel};
use ort::value::Tensor;

use crate::{
    model_download::{ModelKind, ensure_model},
    types::{DetectedHand, Frame, Handedness},
};
use palm::{PalmDetector, crop_from_palm};

pub trait HandDetector {
    /// Hands visible in the frame, most confident first.
    fn detect(&mut self, frame: &Frame) -> Result<Vec<DetectedHand>>;
}

pub struct OrtHandDetector {
    handpose: Session,
    palm_detector: PalmDetector,
    max_hands: usize,
    min_tracking_confidence: f32,
}

impl OrtHandDetector {
    pub fn new(
        model_dir: &Path,
        max_hands: usize,
        min_detection_confidence: f32,
        min_tracking_confidence: f32,
    ) -> Result<Self> {
        let palm_path = ensure_model(ModelKind::PalmDetector, model_dir)?;
        let handpose_path = ensure_model(ModelKind::HandposeEstimator, model_dir)?;

        let handpose = Session::builder()?
            .with_optimization_level(GraphOptimizationLevel::Level3)?
            .with_intra_threads(2)?
            .commit_from_file(&handpose_path)
            .with_context(|| {
                format!("failed to load ORT session from {}", handpose_path.display())
            })?;
        let palm_detector = PalmDetector::new(&palm_path, min_detection_confidence)?;

        log::info!(
            "hand detector ready using {} and palm detector {}",
            handpose_path.display(),
            palm_path.display()
        );

        Ok(Self {
            handpose,
            palm_detector,
            max_hands,
            min_tracking_confidence,
        })
    }

    fn estimate(&mut self, frame: &Frame, region: &palm::PalmRegion) -> Result<Option<DetectedHand>> {
        let (center, side, angle) = crop_from_palm(region);
        let (input, transform) = common::prepare_rotated_crop(
            frame,
            center,
            side,
            angle,
            common::HANDPOSE_INPUT_SIZE,
        )?;
        let tensor = Tensor::from_array(input)?;
        let outputs = self
            .handpose
            .run(ort::inputs![tensor])
            .context("failed to run ORT session")?;

        if outputs.len() < 1 {
            return Err(anyhow!("handpose model returned no outputs"));
        }

        let flat: Vec<f32> = outputs[0].try_extract_array::<f32>()?.iter().copied().collect();
        let landmarks = common::decode_landmarks(&flat)?;

        let first_scalar = |idx: usize| -> f32 {
            if idx >= outputs.len() {
                return 0.0;
            }
            outputs[idx]
                .try_extract_array::<f32>()
                .ok()
                .and_then(|arr| arr.iter().next().copied())
                .unwrap_or(0.0)
        };
        let score = (first_scalar(1) * region.score).clamp(0.0, 1.0);
        if score < self.min_tracking_confidence {
            log::trace!("dropping hand with score {score:.2}");
            return Ok(None);
        }
        let handedness = Handedness::from_score(first_scalar(2));
        log::trace!("{} hand with score {score:.2}", handedness.label());

        let normalized = transform.normalize(&landmarks);
        let world_landmarks = if outputs.len() > 3 {
            let flat: Vec<f32> = outputs[3].try_extract_array::<f32>()?.iter().copied().collect();
            common::decode_landmarks(&flat)?
        } else {
            normalized.clone()
        };

        Ok(Some(DetectedHand {
            landmarks: normalized,
            world_landmarks,
            handedness,
            score,
        }))
    }
}

impl HandDetector for OrtHandDetector {
    fn detect(&mut self, frame: &Frame) -> Result<Vec<DetectedHand>> {
        let regions = self.palm_detector.detect(frame, self.max_hands)?;

        let mut hands = Vec::with_capacity(regions.len());
        for region in &regions {
            if let Some(hand) = self.estimate(frame, region)? {
                hands.push(hand);
            }
        }
        Ok(hands)
    }
}
