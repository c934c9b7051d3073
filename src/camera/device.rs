use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::camera::buffer_pool::FrameBufferPool;
use crate::camera::frame_source::FrameSink;
use crate::common::Rotation;
use crate::error::CameraError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Size {
    pub width: u32,
    pub height: u32,
}

impl Size {
    pub fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    pub fn aspect_ratio(&self) -> f32 {
        self.width as f32 / self.height as f32
    }
}

impl fmt::Display for Size {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}x{}", self.width, self.height)
    }
}

impl FromStr for Size {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (width, height) = s
            .split_once(['x', '*'])
            .ok_or_else(|| format!("invalid size '{}'", s))?;
        let width = width
            .trim()
            .parse()
            .map_err(|_| format!("invalid width in '{}'", s))?;
        let height = height
            .trim()
            .parse()
            .map_err(|_| format!("invalid height in '{}'", s))?;
        Ok(Size::new(width, height))
    }
}

/// A preview size plus the still-picture size sharing its aspect ratio, if the camera has one.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SizePair {
    pub preview: Size,
    pub picture: Option<Size>,
}

impl SizePair {
    pub fn new(preview: Size, picture: Option<Size>) -> Self {
        Self { preview, picture }
    }
}

/// Preview frame-rate range, scaled by 1000 like the camera driver reports it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FpsRange {
    pub min: u32,
    pub max: u32,
}

impl FpsRange {
    pub fn new(min: u32, max: u32) -> Self {
        Self { min, max }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FlashMode {
    #[default]
    Off,
    Torch,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FocusMode {
    Auto,
    ContinuousVideo,
    Fixed,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CameraCapabilities {
    pub preview_sizes: Vec<Size>,
    pub picture_sizes: Vec<Size>,
    pub preview_fps_ranges: Vec<FpsRange>,
    pub focus_modes: Vec<FocusMode>,
    pub sensor_orientation: u32,
}

/// Everything the frame source settles on before starting the preview.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CameraParameters {
    pub preview_size: Size,
    pub picture_size: Option<Size>,
    pub fps_range: FpsRange,
    pub rotation: Rotation,
    pub focus_mode: Option<FocusMode>,
    pub flash_mode: FlashMode,
}

/// Where the preview is shown. Only its geometry matters to the camera setup.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PreviewSurface {
    pub width: u32,
    pub height: u32,
    /// Display rotation in degrees (0, 90, 180, 270).
    pub device_rotation: u32,
}

impl PreviewSurface {
    pub fn new(width: u32, height: u32, device_rotation: u32) -> Self {
        Self {
            width,
            height,
            device_rotation,
        }
    }

    pub fn is_portrait(&self) -> bool {
        self.height > self.width
    }

    /// Camera sizes are always reported in landscape.
    pub fn aspect_ratio_in_landscape(&self) -> f32 {
        if self.is_portrait() {
            self.height as f32 / self.width as f32
        } else {
            self.width as f32 / self.height as f32
        }
    }
}

/// An opened camera. Implementations push filled pool buffers into the [`FrameSink`] from
/// their own capture context until `stop_preview` returns.
pub trait CameraDevice: Send {
    fn capabilities(&self) -> CameraCapabilities;

    fn configure(&mut self, parameters: &CameraParameters) -> Result<(), CameraError>;

    fn set_flash_mode(&mut self, mode: FlashMode) -> Result<(), CameraError>;

    fn start_preview(
        &mut self,
        surface: &PreviewSurface,
        pool: FrameBufferPool,
        sink: FrameSink,
    ) -> Result<(), CameraError>;

    /// Must not deliver any more frames once this returns.
    fn stop_preview(&mut self);
}

pub trait CameraProvider: Send + Sync {
    /// Opens the back-facing camera.
    fn open(&self) -> Result<Box<dyn CameraDevice>, CameraError>;
}
