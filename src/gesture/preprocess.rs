//! Landmark and trajectory normalization for the two classifiers.
//!
//! Both transforms anchor on the first point so the classifiers see shapes,
//! not positions in the frame.

use crate::types::{DetectedHand, PixelPoint};

/// Scale normalized detector landmarks to pixel coordinates, clamped to the frame.
pub fn calc_landmark_list(hand: &DetectedHand, width: u32, height: u32) -> Vec<PixelPoint> {
    let max_x = width.saturating_sub(1) as i32;
    let max_y = height.saturating_sub(1) as i32;
    hand.landmarks
        .iter()
        .map(|[x, y, _z]| {
            let px = ((x * width as f32) as i32).min(max_x);
            let py = ((y * height as f32) as i32).min(max_y);
            PixelPoint::new(px, py)
        })
        .collect()
}

/// Translate to the first landmark, flatten to `[x0, y0, x1, y1, ...]` and
/// divide by the largest absolute coordinate.
///
/// A hand collapsed onto its anchor has nothing to scale by and yields an
/// all-zero vector.
pub fn pre_process_landmark(points: &[PixelPoint]) -> Vec<f32> {
    let Some(base) = points.first().copied() else {
        return Vec::new();
    };

    let flat: Vec<f32> = points
        .iter()
        .flat_map(|p| [(p.x - base.x) as f32, (p.y - base.y) as f32])
        .collect();

    let max_value = flat.iter().fold(0.0_f32, |acc, v| acc.max(v.abs()));
    if max_value == 0.0 {
        return vec![0.0; flat.len()];
    }

    flat.into_iter().map(|v| v / max_value).collect()
}

/// Translate a trajectory to its first point and scale x by the frame width
/// and y by the frame height.
pub fn pre_process_point_history(history: &[PixelPoint], width: u32, height: u32) -> Vec<f32> {
    let Some(base) = history.first().copied() else {
        return Vec::new();
    };
    let w = width.max(1) as f32;
    let h = height.max(1) as f32;

    history
        .iter()
        .flat_map(|p| [(p.x - base.x) as f32 / w, (p.y - base.y) as f32 / h])
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{Handedness, NUM_LANDMARKS};
    use proptest::prelude::*;

    fn hand_from(points: &[(f32, f32)]) -> DetectedHand {
        DetectedHand {
            landmarks: points.iter().map(|&(x, y)| [x, y, 0.0]).collect(),
            world_landmarks: Vec::new(),
            handedness: Handedness::Right,
            score: 1.0,
        }
    }

    #[test]
    fn test_calc_landmark_list_clamps_to_frame() {
        let hand = hand_from(&[(0.5, 0.5), (1.0, 1.0), (0.0, 0.0)]);
        let points = calc_landmark_list(&hand, 640, 480);
        assert_eq!(points[0], PixelPoint::new(320, 240));
        assert_eq!(points[1], PixelPoint::new(639, 479));
        assert_eq!(points[2], PixelPoint::new(0, 0));
    }

    #[test]
    fn test_landmark_normalization_known_values() {
        let points = [
            PixelPoint::new(10, 10),
            PixelPoint::new(20, 10),
            PixelPoint::new(10, 5),
        ];
        let out = pre_process_landmark(&points);
        assert_eq!(out, vec![0.0, 0.0, 1.0, 0.0, 0.0, -0.5]);
    }

    #[test]
    fn test_landmark_normalization_degenerate_hand() {
        let points = vec![PixelPoint::new(7, 7); NUM_LANDMARKS];
        let out = pre_process_landmark(&points);
        assert_eq!(out.len(), NUM_LANDMARKS * 2);
        assert!(out.iter().all(|v| *v == 0.0));
    }

    #[test]
    fn test_point_history_scales_per_axis() {
        let history = [
            PixelPoint::new(100, 100),
            PixelPoint::new(196, 154),
            PixelPoint::new(4, 46),
        ];
        let out = pre_process_point_history(&history, 960, 540);
        assert_eq!(out.len(), 6);
        assert_eq!(out[0], 0.0);
        assert_eq!(out[1], 0.0);
        assert!((out[2] - 0.1).abs() < 1e-6);
        assert!((out[3] - 0.1).abs() < 1e-6);
        assert!((out[4] + 0.1).abs() < 1e-6);
        assert!((out[5] + 0.1).abs() < 1e-6);
    }

    #[test]
    fn test_empty_inputs() {
        assert!(pre_process_landmark(&[]).is_empty());
        assert!(pre_process_point_history(&[], 10, 10).is_empty());
    }

    fn hand_points() -> impl Strategy<Value = Vec<PixelPoint>> {
        prop::collection::vec((-2000i32..2000, -2000i32..2000), NUM_LANDMARKS)
            .prop_map(|v| v.into_iter().map(|(x, y)| PixelPoint::new(x, y)).collect())
    }

    proptest! {
        #[test]
        fn prop_landmark_components_bounded(points in hand_points()) {
            let out = pre_process_landmark(&points);
            prop_assert_eq!(out.len(), NUM_LANDMARKS * 2);
            for v in &out {
                prop_assert!(v.abs() <= 1.0);
            }
        }

        #[test]
        fn prop_landmark_translation_invariant(
            points in hand_points(),
            dx in -500i32..500,
            dy in -500i32..500,
        ) {
            let shifted: Vec<PixelPoint> = points
                .iter()
                .map(|p| PixelPoint::new(p.x + dx, p.y + dy))
                .collect();
            prop_assert_eq!(pre_process_landmark(&points), pre_process_landmark(&shifted));
        }

        #[test]
        fn prop_point_history_length(
            history in prop::collection::vec((0i32..960, 0i32..540), 16),
        ) {
            let history: Vec<PixelPoint> =
                history.into_iter().map(|(x, y)| PixelPoint::new(x, y)).collect();
            prop_assert_eq!(pre_process_point_history(&history, 960, 540).len(), 32);
        }
    }
}
