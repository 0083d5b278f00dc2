use std::{cmp::Ordering, f32::consts::PI, path::Path};

use anyhow::{Context, Result, anyhow};
use ort::session::{Session, builder::GraphOptimizationLevel};
use ort::value::Tensor;

use super::common::{LetterboxInfo, PALM_INPUT_SIZE, prepare_letterboxed};
use crate::types::Frame;

const PALM_LANDMARKS: usize = 7;
const NMS_THRESHOLD: f32 = 0.3;
/// Feature maps of the 192x192 palm model: (grid size, anchors per cell).
const FEATURE_MAPS: [(usize, usize); 2] = [(24, 2), (12, 6)];

#[derive(Clone, Debug)]
pub struct PalmRegion {
    pub bbox: [f32; 4],
    pub landmarks: Vec<(f32, f32)>,
    pub score: f32,
}

/// SSD anchor centers for the palm model, unit width and height.
pub fn generate_anchors() -> Vec<[f32; 2]> {
    let mut anchors = Vec::with_capacity(2016);
    for (grid, per_cell) in FEATURE_MAPS {
        for y in 0..grid {
            for x in 0..grid {
                let center = [
                    (x as f32 + 0.5) / grid as f32,
                    (y as f32 + 0.5) / grid as f32,
                ];
                anchors.extend(std::iter::repeat_n(center, per_cell));
            }
        }
    }
    anchors
}

pub struct PalmDetector {
    session: Session,
    anchors: Vec<[f32; 2]>,
    score_threshold: f32,
}

impl PalmDetector {
    pub fn new(model_path: &Path, score_threshold: f32) -> Result<Self> {
        let session = Session::builder()?
            .with_optimization_level(GraphOptimizationLevel::Level3)?
            .with_intra_threads(2)?
            .commit_from_file(model_path)
            .with_context(|| {
                format!("failed to load palm detector from {}", model_path.display())
            })?;

        Ok(Self {
            session,
            anchors: generate_anchors(),
            score_threshold,
        })
    }

    /// Palm regions in frame pixels, best score first, at most `max_regions`.
    pub fn detect(&mut self, frame: &Frame, max_regions: usize) -> Result<Vec<PalmRegion>> {
        let (input, letterbox) = prepare_letterboxed(frame, PALM_INPUT_SIZE)?;
        let tensor = Tensor::from_array(input)?;

        let outputs = self
            .session
            .run(ort::inputs![tensor])
            .context("failed to run palm detector session")?;

        if outputs.len() < 2 {
            return Err(anyhow!(
                "palm detector returned {} outputs, expected at least 2",
                outputs.len()
            ));
        }

        let boxes = outputs[0].try_extract_array::<f32>()?;
        let scores = outputs[1].try_extract_array::<f32>()?;
        let box_shape = boxes.shape().to_vec();
        let score_shape = scores.shape().to_vec();
        let boxes: Vec<f32> = boxes.iter().copied().collect();
        let scores: Vec<f32> = scores.iter().copied().collect();

        decode_palm_outputs(
            &boxes,
            &box_shape,
            &scores,
            &score_shape,
            &self.anchors,
            &letterbox,
            self.score_threshold,
            max_regions,
        )
    }
}

#[allow(clippy::too_many_arguments)]
fn decode_palm_outputs(
    box_landmark: &[f32],
    box_shape: &[usize],
    scores: &[f32],
    score_shape: &[usize],
    anchors: &[[f32; 2]],
    letterbox: &LetterboxInfo,
    score_threshold: f32,
    max_regions: usize,
) -> Result<Vec<PalmRegion>> {
    let (&feature_dim, &anchor_dim) = match box_shape {
        [.., n, f] => (f, n),
        _ => return Err(anyhow!("unexpected palm box shape {box_shape:?}")),
    };
    let (&score_dim, &score_anchor_dim) = match score_shape {
        [.., n, f] => (f, n),
        _ => return Err(anyhow!("unexpected palm score shape {score_shape:?}")),
    };

    if feature_dim < 4 + PALM_LANDMARKS * 2 {
        return Err(anyhow!("palm box feature dimension too small: {feature_dim}"));
    }
    if anchor_dim != score_anchor_dim {
        return Err(anyhow!(
            "anchor dimension mismatch between boxes ({anchor_dim}) and scores ({score_anchor_dim})"
        ));
    }
    if box_landmark.len() < anchor_dim * feature_dim || scores.len() < anchor_dim * score_dim {
        return Err(anyhow!("palm outputs shorter than their shapes"));
    }

    let pad_bias_x = letterbox.pad_x / letterbox.scale;
    let pad_bias_y = letterbox.pad_y / letterbox.scale;
    let scale = letterbox.orig_w.max(letterbox.orig_h) as f32;
    let input = PALM_INPUT_SIZE as f32;
    let to_frame = |v: f32, anchor: f32, bias: f32| (v / input + anchor) * scale - bias;

    let mut candidates = Vec::new();
    for (idx, anchor) in anchors.iter().take(anchor_dim).enumerate() {
        let score = sigmoid(scores[idx * score_dim]);
        if score < score_threshold {
            continue;
        }

        let f = &box_landmark[idx * feature_dim..(idx + 1) * feature_dim];
        let cx = f[0] / input + anchor[0];
        let cy = f[1] / input + anchor[1];
        let hw = f[2] / input / 2.0;
        let hh = f[3] / input / 2.0;
        if hw <= 0.0 || hh <= 0.0 {
            continue;
        }

        let max_w = letterbox.orig_w.saturating_sub(1) as f32;
        let max_h = letterbox.orig_h.saturating_sub(1) as f32;
        let bbox = [
            ((cx - hw) * scale - pad_bias_x).clamp(0.0, max_w),
            ((cy - hh) * scale - pad_bias_y).clamp(0.0, max_h),
            ((cx + hw) * scale - pad_bias_x).clamp(0.0, max_w),
            ((cy + hh) * scale - pad_bias_y).clamp(0.0, max_h),
        ];

        let landmarks = f[4..4 + PALM_LANDMARKS * 2]
            .chunks_exact(2)
            .map(|p| {
                (
                    to_frame(p[0], anchor[0], pad_bias_x),
                    to_frame(p[1], anchor[1], pad_bias_y),
                )
            })
            .collect();

        candidates.push(PalmRegion {
            bbox,
            landmarks,
            score,
        });
    }

    let kept = nms(&candidates, NMS_THRESHOLD, max_regions);
    Ok(kept.into_iter().map(|idx| candidates[idx].clone()).collect())
}

/// Square crop around the palm, wide enough for the whole hand: (center, side, angle).
pub fn crop_from_palm(region: &PalmRegion) -> ((f32, f32), f32, f32) {
    let center = if region.landmarks.is_empty() {
        (
            (region.bbox[0] + region.bbox[2]) * 0.5,
            (region.bbox[1] + region.bbox[3]) * 0.5,
        )
    } else {
        let n = region.landmarks.len() as f32;
        let (sx, sy) = region
            .landmarks
            .iter()
            .fold((0.0_f32, 0.0_f32), |acc, p| (acc.0 + p.0, acc.1 + p.1));
        (sx / n, sy / n)
    };

    let base_w = (region.bbox[2] - region.bbox[0]).abs();
    let base_h = (region.bbox[3] - region.bbox[1]).abs();
    let landmark_span = region
        .landmarks
        .iter()
        .fold(None, |acc: Option<(f32, f32, f32, f32)>, &(x, y)| {
            Some(match acc {
                None => (x, x, y, y),
                Some((x0, x1, y0, y1)) => (x0.min(x), x1.max(x), y0.min(y), y1.max(y)),
            })
        })
        .map_or(0.0, |(x0, x1, y0, y1)| (x1 - x0).max(y1 - y0));
    let side = base_w.max(base_h).max(landmark_span).max(80.0) * 2.4;

    (center, side, estimate_orientation(region))
}

/// Rotation that turns the palm's principal axis upright.
pub fn estimate_orientation(region: &PalmRegion) -> f32 {
    if region.landmarks.len() < 2 {
        return 0.0;
    }

    let n = region.landmarks.len() as f32;
    let (sx, sy) = region
        .landmarks
        .iter()
        .fold((0.0_f32, 0.0_f32), |acc, (x, y)| (acc.0 + x, acc.1 + y));
    let mean = (sx / n, sy / n);

    let (mut cov_xx, mut cov_xy, mut cov_yy) = (0.0, 0.0, 0.0);
    for (x, y) in &region.landmarks {
        let dx = x - mean.0;
        let dy = y - mean.1;
        cov_xx += dx * dx;
        cov_xy += dx * dy;
        cov_yy += dy * dy;
    }
    cov_xx /= n;
    cov_xy /= n;
    cov_yy /= n;

    let trace = cov_xx + cov_yy;
    let det = cov_xx * cov_yy - cov_xy * cov_xy;
    let lambda1 = (trace * 0.5 + ((trace * 0.5).powi(2) - det).max(0.0).sqrt()).max(1e-6);
    let (vx, vy) = if cov_xy.abs() > 1e-6 {
        (lambda1 - cov_yy, cov_xy)
    } else if cov_xx >= cov_yy {
        (1.0, 0.0)
    } else {
        (0.0, 1.0)
    };

    vy.atan2(vx) - PI * 0.5
}

fn nms(candidates: &[PalmRegion], threshold: f32, top_k: usize) -> Vec<usize> {
    let mut order: Vec<usize> = (0..candidates.len()).collect();
    order.sort_by(|a, b| {
        candidates[*b]
            .score
            .partial_cmp(&candidates[*a].score)
            .unwrap_or(Ordering::Equal)
    });

    let mut keep: Vec<usize> = Vec::new();
    for idx in order {
        if keep.len() >= top_k {
            break;
        }
        if keep
            .iter()
            .all(|&k| iou(&candidates[idx].bbox, &candidates[k].bbox) < threshold)
        {
            keep.push(idx);
        }
    }
    keep
}

fn iou(a: &[f32; 4], b: &[f32; 4]) -> f32 {
    let inter_w = (a[2].min(b[2]) - a[0].max(b[0])).max(0.0);
    let inter_h = (a[3].min(b[3]) - a[1].max(b[1])).max(0.0);
    let inter = inter_w * inter_h;
    if inter <= 0.0 {
        return 0.0;
    }

    let area = |r: &[f32; 4]| (r[2] - r[0]).max(0.0) * (r[3] - r[1]).max(0.0);
    let union = area(a) + area(b) - inter;
    if union <= 0.0 { 0.0 } else { inter / union }
}

fn sigmoid(x: f32) -> f32 {
    1.0 / (1.0 + (-x).exp())
}
