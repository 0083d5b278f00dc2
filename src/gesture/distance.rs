use std::time::{Duration, Instant};

use crate::types::{DetectedHand, Handedness, INDEX_FINGER_TIP, THUMB_TIP};

/// Thumb-to-index distance (metres) mapped to a full-scale reading.
pub const PINCH_SPAN: f32 = 0.13;
pub const DEFAULT_DELAY: Duration = Duration::from_millis(400);
pub const DEFAULT_THRESHOLD: f32 = 0.012;

/// Two-hand volume control: the right hand's pinch width sets the volume.
///
/// A detection is armed on the first qualifying frame and only acted on once
/// `delay` has passed; a new reading is committed only when it leaves the
/// `threshold` band around the last committed one.
pub struct DistanceVolume {
    delay: Duration,
    threshold: f32,
    detected_at: Option<Instant>,
    previous_distance: f32,
}

impl DistanceVolume {
    pub fn new(delay: Duration, threshold: f32) -> Self {
        Self {
            delay,
            threshold,
            detected_at: None,
            previous_distance: 0.0,
        }
    }

    /// Feed one frame's hands; returns the percentage to apply, if any.
    pub fn update(&mut self, hands: &[DetectedHand], now: Instant) -> Option<u8> {
        let Some(distance) = qualifying_distance(hands) else {
            self.reset();
            return None;
        };

        let Some(detected_at) = self.detected_at else {
            log::debug!("pinch detected, arming volume control");
            self.detected_at = Some(now);
            return None;
        };

        if now.saturating_duration_since(detected_at) < self.delay {
            return None;
        }

        let below = distance < self.previous_distance - self.threshold;
        let above = distance > self.previous_distance + self.threshold;
        if !(below || above) {
            return None;
        }

        self.previous_distance = distance;
        let percentage = if distance > 0.0 {
            (100.0 * distance.min(1.0)).round() as u8
        } else {
            0
        };
        log::debug!("pinch distance {distance:.2} -> volume {percentage}%");
        Some(percentage)
    }

    /// Disarm; the next qualifying frame starts a fresh delay.
    pub fn reset(&mut self) {
        if self.detected_at.take().is_some() {
            log::debug!("pinch lost, volume control disarmed");
        }
    }

    pub fn is_armed(&self) -> bool {
        self.detected_at.is_some()
    }

    pub fn previous_distance(&self) -> f32 {
        self.previous_distance
    }
}

/// Only frames with exactly two hands count; the left hand is ignored.
/// When both hands are reported as right, the more confident one is used.
fn qualifying_distance(hands: &[DetectedHand]) -> Option<f32> {
    if hands.len() != 2 {
        return None;
    }
    let right = hands
        .iter()
        .filter(|hand| hand.handedness == Handedness::Right)
        .reduce(|best, hand| if hand.score > best.score { hand } else { best })?;
    log::trace!("measuring pinch on right hand with score {:.2}", right.score);
    pinch_distance(right)
}

/// Normalized thumb-tip to index-tip distance, rounded to two decimals.
pub fn pinch_distance(hand: &DetectedHand) -> Option<f32> {
    let thumb = hand.world_landmarks.get(THUMB_TIP)?;
    let index = hand.world_landmarks.get(INDEX_FINGER_TIP)?;
    let dist = ((thumb[0] - index[0]).powi(2)
        + (thumb[1] - index[1]).powi(2)
        + (thumb[2] - index[2]).powi(2))
    .sqrt();
    Some((dist / PINCH_SPAN * 100.0).round() / 100.0)
}
