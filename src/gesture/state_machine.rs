//! Turns the per-frame hand state into audio actions.
//!
//! Volume steps are level-triggered while pointing; play/pause are
//! edge-triggered on hand-state changes.

use crate::{
    audio::AudioAction,
    types::{FingerGesture, HandState},
};

pub const MAX_VOLUME: u8 = 100;

/// Volume percentage, always within `0..=100`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct VolumeLevel(u8);

impl VolumeLevel {
    pub fn new(percentage: u8) -> Self {
        Self(percentage.min(MAX_VOLUME))
    }

    pub fn percentage(&self) -> u8 {
        self.0
    }

    /// Raise by one; returns false at the upper bound.
    pub fn step_up(&mut self) -> bool {
        if self.0 >= MAX_VOLUME {
            return false;
        }
        self.0 += 1;
        true
    }

    /// Lower by one; returns false at zero.
    pub fn step_down(&mut self) -> bool {
        if self.0 == 0 {
            return false;
        }
        self.0 -= 1;
        true
    }

    pub fn set(&mut self, percentage: u8) {
        self.0 = percentage.min(MAX_VOLUME);
    }
}

impl Default for VolumeLevel {
    fn default() -> Self {
        Self(50)
    }
}

pub struct GestureStateMachine {
    previous_hand_state: HandState,
}

impl GestureStateMachine {
    pub fn new() -> Self {
        Self {
            previous_hand_state: HandState::Other,
        }
    }

    pub fn previous_hand_state(&self) -> HandState {
        self.previous_hand_state
    }

    pub fn update(
        &mut self,
        hand_state: HandState,
        finger_gesture: FingerGesture,
        volume: &mut VolumeLevel,
    ) -> Vec<AudioAction> {
        let mut actions = Vec::new();

        if hand_state == HandState::Pointer {
            match finger_gesture {
                FingerGesture::Clockwise if volume.step_up() => actions.push(AudioAction::Up),
                FingerGesture::CounterClockwise if volume.step_down() => {
                    actions.push(AudioAction::Down)
                }
                _ => {}
            }
        }

        if hand_state != self.previous_hand_state {
            log::debug!(
                "hand state {} -> {}",
                self.previous_hand_state.label(),
                hand_state.label()
            );
            match hand_state {
                HandState::Open | HandState::Pointer => actions.push(AudioAction::Play),
                HandState::Close => actions.push(AudioAction::Pause),
                HandState::Other => {}
            }
        }

        self.previous_hand_state = hand_state;
        actions
    }
}
