use std::{
    path::{Path, PathBuf},
    time::Instant,
};

use anyhow::{Context, Result};

use super::rgba_converter::mirror_horizontal;
use crate::types::Frame;

pub trait FrameSource {
    /// Next mirrored frame, or `None` once the stream is exhausted.
    fn read(&mut self) -> Result<Option<Frame>>;
}

fn mirrored_frame(mut rgba: Vec<u8>, width: u32, height: u32) -> Frame {
    mirror_horizontal(&mut rgba, width);
    Frame {
        rgba,
        width,
        height,
        timestamp: Instant::now(),
    }
}

/// Replays a directory of PNG/JPEG images in file-name order.
pub struct ImageSequenceSource {
    paths: std::vec::IntoIter<PathBuf>,
}

impl ImageSequenceSource {
    pub fn open(dir: &Path) -> Result<Self> {
        let mut paths = Vec::new();
        for entry in std::fs::read_dir(dir)
            .with_context(|| format!("failed to read replay directory {}", dir.display()))?
        {
            let path = entry?.path();
            let is_image = path
                .extension()
                .and_then(|ext| ext.to_str())
                .is_some_and(|ext| {
                    matches!(ext.to_ascii_lowercase().as_str(), "png" | "jpg" | "jpeg")
                });
            if is_image {
                paths.push(path);
            }
        }
        paths.sort();
        log::info!("replaying {} images from {}", paths.len(), dir.display());

        Ok(Self {
            paths: paths.into_iter(),
        })
    }
}

impl FrameSource for ImageSequenceSource {
    fn read(&mut self) -> Result<Option<Frame>> {
        let Some(path) = self.paths.next() else {
            return Ok(None);
        };
        let image = image::open(&path)
            .with_context(|| format!("failed to decode {}", path.display()))?
            .to_rgba8();
        let (width, height) = image.dimensions();
        Ok(Some(mirrored_frame(image.into_raw(), width, height)))
    }
}

#[cfg(feature = "camera-nokhwa")]
pub use webcam::CameraSource;

#[cfg(feature = "camera-nokhwa")]
mod webcam {
    use anyhow::{Context, Result, anyhow};
    use nokhwa::{
        Camera,
        pixel_format::RgbFormat,
        query,
        utils::{
            ApiBackend, CameraFormat, CameraIndex, FrameFormat, RequestedFormat,
            RequestedFormatType, Resolution,
        },
    };

    use super::{FrameSource, mirrored_frame};
    use crate::{pipeline::rgba_converter, types::Frame};

    // Built-in macOS cameras often reject YUYV even though Nokhwa reports it.
    const PREFERRED_PIXEL_FORMATS: &[FrameFormat] = &[
        FrameFormat::RAWRGB,
        FrameFormat::RAWBGR,
        FrameFormat::GRAY,
        FrameFormat::YUYV,
        FrameFormat::NV12,
        FrameFormat::MJPEG,
    ];

    fn requested_formats(width: u32, height: u32) -> [RequestedFormat<'static>; 4] {
        let wanted = CameraFormat::new(Resolution::new(width, height), FrameFormat::MJPEG, 30);
        [
            RequestedFormat::with_formats(
                RequestedFormatType::Closest(wanted),
                PREFERRED_PIXEL_FORMATS,
            ),
            RequestedFormat::with_formats(
                RequestedFormatType::AbsoluteHighestFrameRate,
                PREFERRED_PIXEL_FORMATS,
            ),
            RequestedFormat::new::<RgbFormat>(RequestedFormatType::AbsoluteHighestFrameRate),
            RequestedFormat::new::<RgbFormat>(RequestedFormatType::None),
        ]
    }

    pub struct CameraSource {
        camera: Camera,
    }

    impl CameraSource {
        /// Opens camera `device`, or the first one found when it is negative.
        pub fn open(device: i32, width: u32, height: u32) -> Result<Self> {
            let index = match u32::try_from(device) {
                Ok(index) => CameraIndex::Index(index),
                Err(_) => query(ApiBackend::Auto)?
                    .into_iter()
                    .next()
                    .map(|info| info.index().clone())
                    .ok_or_else(|| anyhow!("no camera found"))?,
            };

            let mut last_err = None;
            for requested in requested_formats(width, height) {
                match Camera::new(index.clone(), requested) {
                    Ok(mut camera) => match camera.open_stream() {
                        Ok(()) => {
                            log::info!(
                                "camera {index} opened at {}",
                                camera.camera_format()
                            );
                            return Ok(Self { camera });
                        }
                        Err(err) => last_err = Some(err.into()),
                    },
                    Err(err) => last_err = Some(err.into()),
                }
            }

            Err(last_err
                .unwrap_or_else(|| anyhow!("failed to open camera with any supported format")))
        }
    }

    impl FrameSource for CameraSource {
        fn read(&mut self) -> Result<Option<Frame>> {
            let buffer = self.camera.frame().context("camera frame read failed")?;
            let (rgba, width, height) = rgba_converter::convert_camera_frame(&buffer)
                .context("failed to decode camera frame")?;
            Ok(Some(mirrored_frame(rgba, width, height)))
        }
    }

    impl Drop for CameraSource {
        fn drop(&mut self) {
            if let Err(err) = self.camera.stop_stream() {
                log::debug!("failed to stop camera stream: {err:?}");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_replay_reads_images_in_order_and_mirrors() {
        let dir = tempfile::tempdir().unwrap();
        let mut first = image::RgbaImage::new(2, 1);
        first.put_pixel(0, 0, image::Rgba([255, 0, 0, 255]));
        first.put_pixel(1, 0, image::Rgba([0, 0, 255, 255]));
        first.save(dir.path().join("000.png")).unwrap();
        image::RgbaImage::new(3, 2)
            .save(dir.path().join("001.png"))
            .unwrap();
        std::fs::write(dir.path().join("notes.txt"), "skip me").unwrap();

        let mut source = ImageSequenceSource::open(dir.path()).unwrap();

        let frame = source.read().unwrap().unwrap();
        assert_eq!((frame.width, frame.height), (2, 1));
        assert_eq!(frame.rgba, vec![0, 0, 255, 255, 255, 0, 0, 255]);

        let frame = source.read().unwrap().unwrap();
        assert_eq!((frame.width, frame.height), (3, 2));

        assert!(source.read().unwrap().is_none());
    }

    #[test]
    fn test_missing_replay_directory() {
        assert!(ImageSequenceSource::open(Path::new("/nonexistent/replay")).is_err());
    }
}
