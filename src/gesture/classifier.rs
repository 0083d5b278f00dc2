use std::{cmp::Ordering, path::Path};

use anyhow::{Context, Result};
use ndarray::Array2;
use ort::session::{Session, builder::GraphOptimizationLevel};
use ort::value::Tensor;
use thiserror::Error;

use crate::types::NUM_LANDMARKS;

/// Flattened `[x, y]` landmark vector expected by the keypoint model.
pub const KEYPOINT_INPUT_LEN: usize = NUM_LANDMARKS * 2;
/// Point-history predictions below this score fall back to the neutral id.
pub const POINT_HISTORY_SCORE_THRESHOLD: f32 = 0.5;
pub const NEUTRAL_GESTURE_ID: usize = 0;

#[derive(Debug, Error)]
pub enum ClassifierError {
    #[error("{model} expects {expected} inputs, got {actual}")]
    InputLength {
        model: &'static str,
        expected: usize,
        actual: usize,
    },
    #[error("{0} produced no scores")]
    EmptyOutput(&'static str),
}

/// Opaque vector classifier returning a class id.
pub trait Classifier {
    fn classify(&mut self, input: &[f32]) -> Result<usize>;
}

/// ONNX classifier with a fixed input width and an argmax head.
pub struct OrtClassifier {
    name: &'static str,
    session: Session,
    input_len: usize,
    score_threshold: Option<f32>,
}

impl OrtClassifier {
    /// Hand-sign model over the 42-value normalized landmark vector.
    pub fn keypoint(model_path: &Path) -> Result<Self> {
        Self::load("keypoint classifier", model_path, KEYPOINT_INPUT_LEN, None)
    }

    /// Finger-gesture model over a `2 * history_length` trajectory vector.
    pub fn point_history(model_path: &Path, history_length: usize) -> Result<Self> {
        Self::load(
            "point history classifier",
            model_path,
            history_length * 2,
            Some(POINT_HISTORY_SCORE_THRESHOLD),
        )
    }

    fn load(
        name: &'static str,
        model_path: &Path,
        input_len: usize,
        score_threshold: Option<f32>,
    ) -> Result<Self> {
        let session = Session::builder()?
            .with_optimization_level(GraphOptimizationLevel::Level3)?
            .with_intra_threads(1)?
            .commit_from_file(model_path)
            .with_context(|| format!("failed to load {name} from {}", model_path.display()))?;

        log::info!("loaded {name} from {}", model_path.display());

        Ok(Self {
            name,
            session,
            input_len,
            score_threshold,
        })
    }
}

impl Classifier for OrtClassifier {
    fn classify(&mut self, input: &[f32]) -> Result<usize> {
        if input.len() != self.input_len {
            return Err(ClassifierError::InputLength {
                model: self.name,
                expected: self.input_len,
                actual: input.len(),
            }
            .into());
        }

        let input_array = Array2::from_shape_vec((1, self.input_len), input.to_vec())
            .with_context(|| format!("failed to shape {} input", self.name))?;
        let tensor = Tensor::from_array(input_array)?;

        let outputs = self
            .session
            .run(ort::inputs![tensor])
            .with_context(|| format!("{} inference failed", self.name))?;
        let scores = outputs[0].try_extract_array::<f32>()?;
        let scores: Vec<f32> = scores.iter().copied().collect();

        let (id, score) = argmax(&scores).ok_or(ClassifierError::EmptyOutput(self.name))?;
        match self.score_threshold {
            Some(threshold) if score < threshold => Ok(NEUTRAL_GESTURE_ID),
            _ => Ok(id),
        }
    }
}

/// Index and value of the highest score; the first index wins on a tie.
pub fn argmax(scores: &[f32]) -> Option<(usize, f32)> {
    scores
        .iter()
        .copied()
        .enumerate()
        .fold(None, |best, (idx, value)| match best {
            Some((_, best_value))
                if value.partial_cmp(&best_value).unwrap_or(Ordering::Less)
                    != Ordering::Greater =>
            {
                best
            }
            _ => Some((idx, value)),
        })
}
