use std::time::Instant;

pub const NUM_LANDMARKS: usize = 21;
pub const THUMB_TIP: usize = 4;
pub const INDEX_FINGER_TIP: usize = 8;

#[derive(Clone, Debug)]
pub struct Frame {
    pub rgba: Vec<u8>,
    pub width: u32,
    pub height: u32,
    pub timestamp: Instant,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub struct PixelPoint {
    pub x: i32,
    pub y: i32,
}

impl PixelPoint {
    /// Pushed into the point history when no fingertip is being tracked.
    pub const SENTINEL: PixelPoint = PixelPoint { x: 0, y: 0 };

    pub const fn new(x: i32, y: i32) -> Self {
        Self { x, y }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Handedness {
    Left,
    Right,
    Unknown,
}

impl Handedness {
    pub fn from_score(score: f32) -> Self {
        if score >= 0.5 {
            Handedness::Right
        } else if score > 0.0 {
            Handedness::Left
        } else {
            Handedness::Unknown
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Handedness::Left => "Left",
            Handedness::Right => "Right",
            Handedness::Unknown => "Unknown",
        }
    }
}

/// One hand reported by the detector for a single frame.
#[derive(Clone, Debug)]
pub struct DetectedHand {
    /// Image landmarks, x and y normalized to `[0, 1]` by the frame size.
    pub landmarks: Vec<[f32; 3]>,
    /// Metric landmarks centred on the hand, used for distance measurements.
    pub world_landmarks: Vec<[f32; 3]>,
    pub handedness: Handedness,
    pub score: f32,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum HandState {
    Open,
    Close,
    Pointer,
    Other,
}

impl HandState {
    pub fn from_label(label: &str) -> Self {
        match label.trim() {
            "Open" => HandState::Open,
            "Close" => HandState::Close,
            "Pointer" => HandState::Pointer,
            _ => HandState::Other,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            HandState::Open => "Open",
            HandState::Close => "Close",
            HandState::Pointer => "Pointer",
            HandState::Other => "Other",
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FingerGesture {
    Clockwise,
    CounterClockwise,
    Other,
}

impl FingerGesture {
    pub fn from_label(label: &str) -> Self {
        match label.trim() {
            "Clockwise" => FingerGesture::Clockwise,
            "Counter Clockwise" | "Counter-Clockwise" | "CounterClockwise" => {
                FingerGesture::CounterClockwise
            }
            _ => FingerGesture::Other,
        }
    }
}
