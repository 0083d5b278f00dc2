//! Camera buffers of any supported pixel layout into mirrored RGBA frames.

use anyhow::{Result, anyhow};
use rayon::prelude::*;
use yuv::{
    YuvBiPlanarImage, YuvConversionMode, YuvPackedImage, YuvRange, YuvStandardMatrix,
    yuv_nv12_to_rgba, yuyv422_to_rgba,
};
use zune_jpeg::{
    JpegDecoder,
    zune_core::{bytestream::ZCursor, colorspace::ColorSpace, options::DecoderOptions},
};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SourceFormat {
    Nv12,
    Yuyv,
    Mjpeg,
    Rgb,
    Bgr,
    Gray,
}

#[cfg(feature = "camera-nokhwa")]
impl From<nokhwa::utils::FrameFormat> for SourceFormat {
    fn from(format: nokhwa::utils::FrameFormat) -> Self {
        use nokhwa::utils::FrameFormat;
        match format {
            FrameFormat::NV12 => SourceFormat::Nv12,
            FrameFormat::YUYV => SourceFormat::Yuyv,
            FrameFormat::MJPEG => SourceFormat::Mjpeg,
            FrameFormat::RAWRGB => SourceFormat::Rgb,
            FrameFormat::RAWBGR => SourceFormat::Bgr,
            FrameFormat::GRAY => SourceFormat::Gray,
        }
    }
}

#[cfg(feature = "camera-nokhwa")]
pub fn convert_camera_frame(frame: &nokhwa::Buffer) -> Result<(Vec<u8>, u32, u32)> {
    let resolution = frame.resolution();
    let (width, height) = (resolution.width_x, resolution.height_y);
    let rgba = to_rgba(frame.source_frame_format().into(), frame.buffer(), width, height)?;
    Ok((rgba, width, height))
}

pub fn to_rgba(format: SourceFormat, data: &[u8], width: u32, height: u32) -> Result<Vec<u8>> {
    let pixels = width as usize * height as usize;
    let needed = match format {
        SourceFormat::Nv12 => pixels + pixels / 2,
        SourceFormat::Yuyv => pixels * 2,
        SourceFormat::Rgb | SourceFormat::Bgr => pixels * 3,
        SourceFormat::Gray => pixels,
        SourceFormat::Mjpeg => 0,
    };
    if data.len() < needed {
        return Err(anyhow!(
            "{format:?} buffer too small: got {}, expected {needed}",
            data.len()
        ));
    }

    match format {
        SourceFormat::Nv12 => nv12_to_rgba(data, width, height),
        SourceFormat::Yuyv => yuyv_to_rgba(data, width, height),
        SourceFormat::Mjpeg => mjpeg_to_rgba(data, pixels),
        SourceFormat::Rgb => Ok(expand_channels(data, pixels, 3, [0, 1, 2])),
        SourceFormat::Bgr => Ok(expand_channels(data, pixels, 3, [2, 1, 0])),
        SourceFormat::Gray => Ok(expand_channels(data, pixels, 1, [0, 0, 0])),
    }
}

/// Flips an RGBA image left to right in place.
pub fn mirror_horizontal(rgba: &mut [u8], width: u32) {
    let stride = width as usize * 4;
    if stride == 0 {
        return;
    }
    rgba.par_chunks_exact_mut(stride).for_each(|row| {
        let half = width as usize / 2;
        for x in 0..half {
            let mirrored = width as usize - 1 - x;
            for c in 0..4 {
                row.swap(x * 4 + c, mirrored * 4 + c);
            }
        }
    });
}

fn nv12_to_rgba(data: &[u8], width: u32, height: u32) -> Result<Vec<u8>> {
    let y_plane_len = width as usize * height as usize;
    let mut rgba = vec![0u8; y_plane_len * 4];

    let image = YuvBiPlanarImage {
        y_plane: &data[..y_plane_len],
        y_stride: width,
        uv_plane: &data[y_plane_len..y_plane_len + y_plane_len / 2],
        uv_stride: width,
        width,
        height,
    };
    yuv_nv12_to_rgba(
        &image,
        &mut rgba,
        width * 4,
        YuvRange::Full,
        YuvStandardMatrix::Bt709,
        YuvConversionMode::Balanced,
    )
    .map_err(|err| anyhow!("NV12 to RGBA failed: {err:?}"))?;

    Ok(rgba)
}

fn yuyv_to_rgba(data: &[u8], width: u32, height: u32) -> Result<Vec<u8>> {
    let mut rgba = vec![0u8; width as usize * height as usize * 4];
    let packed = YuvPackedImage {
        yuy: data,
        yuy_stride: width * 2,
        width,
        height,
    };
    yuyv422_to_rgba(
        &packed,
        &mut rgba,
        width * 4,
        YuvRange::Full,
        YuvStandardMatrix::Bt709,
    )
    .map_err(|err| anyhow!("YUYV422 to RGBA failed: {err:?}"))?;

    Ok(rgba)
}

fn mjpeg_to_rgba(data: &[u8], pixels: usize) -> Result<Vec<u8>> {
    let options = DecoderOptions::default().jpeg_set_out_colorspace(ColorSpace::RGBA);
    let mut decoder = JpegDecoder::new_with_options(ZCursor::new(data), options);
    let rgba = decoder
        .decode()
        .map_err(|err| anyhow!("MJPEG decode failed: {err:?}"))?;

    if rgba.len() < pixels * 4 {
        return Err(anyhow!(
            "MJPEG decode produced too few bytes: got {}, expected {}",
            rgba.len(),
            pixels * 4
        ));
    }
    Ok(rgba)
}

/// Packs `channels`-byte pixels into RGBA, reading R, G and B from `order`.
fn expand_channels(data: &[u8], pixels: usize, channels: usize, order: [usize; 3]) -> Vec<u8> {
    let mut rgba = vec![0u8; pixels * 4];
    rgba.par_chunks_mut(4)
        .zip(data.par_chunks_exact(channels))
        .for_each(|(dst, src)| {
            dst[0] = src[order[0]];
            dst[1] = src[order[1]];
            dst[2] = src[order[2]];
            dst[3] = 255;
        });
    rgba
}
