use bytes::Bytes;
use image::{DynamicImage, RgbImage};
use std::sync::Arc;

use crate::common::frame::{Frame, FrameMetadata, Rotation};

/// What a detector is asked to look at.
#[derive(Debug, Clone)]
pub enum InputImage {
    /// A live preview frame, still on loan from the camera buffer pool.
    Camera(Frame),
    /// A decoded still photo.
    Still(Arc<DynamicImage>),
}

impl InputImage {
    /// Upright width and height.
    pub fn dimensions(&self) -> (u32, u32) {
        match self {
            InputImage::Camera(frame) => frame.metadata().upright_size(),
            InputImage::Still(image) => (image.width(), image.height()),
        }
    }

    /// Pixel source that stays valid after the camera buffer is recycled.
    pub fn source(&self) -> ImageSource {
        match self {
            InputImage::Camera(frame) => frame.snapshot(),
            InputImage::Still(image) => ImageSource::Bitmap(image.clone()),
        }
    }
}

/// Owned pixels an object crop can be produced from.
#[derive(Debug, Clone)]
pub enum ImageSource {
    Nv21 {
        pixels: Bytes,
        metadata: FrameMetadata,
    },
    Bitmap(Arc<DynamicImage>),
}

impl ImageSource {
    pub fn upright_size(&self) -> (u32, u32) {
        match self {
            ImageSource::Nv21 { metadata, .. } => metadata.upright_size(),
            ImageSource::Bitmap(image) => (image.width(), image.height()),
        }
    }

    /// Decodes to an upright RGB image.
    pub fn to_rgb(&self) -> Option<RgbImage> {
        match self {
            ImageSource::Nv21 { pixels, metadata } => {
                let rgb = nv21_to_rgb(pixels, metadata.width, metadata.height)?;
                Some(rotate(rgb, metadata.rotation))
            }
            ImageSource::Bitmap(image) => Some(image.to_rgb8()),
        }
    }
}

/// Converts an NV21 (Y plane followed by interleaved V/U at quarter resolution) buffer to RGB.
pub fn nv21_to_rgb(data: &[u8], width: u32, height: u32) -> Option<RgbImage> {
    let (w, h) = (width as usize, height as usize);
    let uv_row = w.div_ceil(2) * 2;
    let required = w * h + uv_row * h.div_ceil(2);
    if w == 0 || h == 0 || data.len() < required {
        return None;
    }

    let (luma, chroma) = data.split_at(w * h);
    let mut rgb = RgbImage::new(width, height);
    for (x, y, pixel) in rgb.enumerate_pixels_mut() {
        let (x, y) = (x as usize, y as usize);
        let luma = luma[y * w + x] as f32;
        let uv = (y / 2) * uv_row + (x / 2) * 2;
        let v = chroma[uv] as f32 - 128.0;
        let u = chroma[uv + 1] as f32 - 128.0;

        let r = luma + 1.402 * v;
        let g = luma - 0.344_136 * u - 0.714_136 * v;
        let b = luma + 1.772 * u;
        pixel.0 = [clamp_channel(r), clamp_channel(g), clamp_channel(b)];
    }
    Some(rgb)
}

fn clamp_channel(value: f32) -> u8 {
    value.round().clamp(0.0, 255.0) as u8
}

fn rotate(image: RgbImage, rotation: Rotation) -> RgbImage {
    match rotation {
        Rotation::Deg0 => image,
        Rotation::Deg90 => image::imageops::rotate90(&image),
        Rotation::Deg180 => image::imageops::rotate180(&image),
        Rotation::Deg270 => image::imageops::rotate270(&image),
    }
}
