use anyhow::Result;

use super::{
    classifier::{Classifier, NEUTRAL_GESTURE_ID},
    history::{SlidingWindow, most_common},
    preprocess::pre_process_point_history,
};
use crate::types::PixelPoint;

pub const DEFAULT_HISTORY_LENGTH: usize = 16;

/// Fingertip trajectory and finger-gesture vote windows.
pub struct TemporalSmoother {
    history_length: usize,
    point_history: SlidingWindow<PixelPoint>,
    finger_gesture_history: SlidingWindow<usize>,
}

impl TemporalSmoother {
    pub fn new(history_length: usize) -> Self {
        Self {
            history_length,
            point_history: SlidingWindow::new(history_length),
            finger_gesture_history: SlidingWindow::new(history_length),
        }
    }

    /// Record one single-hand frame and return the majority-voted finger-gesture id.
    ///
    /// The finger-gesture classifier only runs once the point history holds a
    /// full trajectory; until then the frame votes for the neutral id.
    pub fn observe_hand(
        &mut self,
        is_pointing: bool,
        fingertip: PixelPoint,
        frame_size: (u32, u32),
        classifier: &mut dyn Classifier,
    ) -> Result<usize> {
        self.point_history.push(if is_pointing {
            fingertip
        } else {
            PixelPoint::SENTINEL
        });

        let trajectory = pre_process_point_history(
            &self.point_history.to_vec(),
            frame_size.0,
            frame_size.1,
        );
        let finger_gesture_id = if trajectory.len() == self.history_length * 2 {
            classifier.classify(&trajectory)?
        } else {
            NEUTRAL_GESTURE_ID
        };

        self.finger_gesture_history.push(finger_gesture_id);
        Ok(self.smoothed_finger_gesture())
    }

    /// Keep the trajectory aligned in time on frames without a tracked hand.
    pub fn observe_no_hand(&mut self) {
        self.point_history.push(PixelPoint::SENTINEL);
    }

    pub fn smoothed_finger_gesture(&self) -> usize {
        most_common(self.finger_gesture_history.iter()).unwrap_or(NEUTRAL_GESTURE_ID)
    }

    pub fn point_history(&self) -> &SlidingWindow<PixelPoint> {
        &self.point_history
    }

    pub fn finger_gesture_history(&self) -> &SlidingWindow<usize> {
        &self.finger_gesture_history
    }
}
