pub mod camera;
pub mod detector;
pub mod rgba_converter;

pub use camera::{FrameSource, ImageSequenceSource};
#[cfg(feature = "camera-nokhwa")]
pub use camera::CameraSource;
pub use detector::{HandDetector, OrtHandDetector};
