use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

use crate::camera::buffer_pool::{FrameBufferPool, PooledBuffer};
use crate::camera::device::{
    CameraCapabilities, CameraDevice, CameraParameters, CameraProvider, FlashMode, FocusMode,
    FpsRange, PreviewSurface, Size,
};
use crate::camera::frame_source::FrameSink;
use crate::common::RectF;
use crate::error::CameraError;

const BACKGROUND_LUMA: u8 = 16;
const OBJECT_LUMA: u8 = 235;
const NEUTRAL_CHROMA: u8 = 128;

/// What the synthetic camera films: at most one bright object, placed in normalised sensor
/// coordinates (0.0..=1.0 on both axes).
#[derive(Clone, Default)]
pub struct SyntheticScene {
    object: Arc<Mutex<Option<RectF>>>,
}

impl SyntheticScene {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn place(&self, object: RectF) {
        *self.object.lock() = Some(object);
    }

    pub fn clear(&self) {
        self.object.lock().take();
    }

    pub fn object(&self) -> Option<RectF> {
        *self.object.lock()
    }

    /// Fills `data` with an NV21 image of the scene.
    pub fn render(&self, data: &mut [u8], size: Size) {
        let (width, height) = (size.width as usize, size.height as usize);
        let luma_len = (width * height).min(data.len());
        let (luma, chroma) = data.split_at_mut(luma_len);
        luma.fill(BACKGROUND_LUMA);
        chroma.fill(NEUTRAL_CHROMA);

        if let Some(object) = self.object() {
            let left = (object.left.clamp(0.0, 1.0) * width as f32) as usize;
            let right = (object.right.clamp(0.0, 1.0) * width as f32) as usize;
            let top = (object.top.clamp(0.0, 1.0) * height as f32) as usize;
            let bottom = (object.bottom.clamp(0.0, 1.0) * height as f32) as usize;
            for row in luma.chunks_mut(width).take(bottom).skip(top) {
                row[left..right.max(left)].fill(OBJECT_LUMA);
            }
        }
    }
}

/// Software back camera used by the demo binary and the integration tests.
pub struct SyntheticCameraProvider {
    scene: SyntheticScene,
    capabilities: CameraCapabilities,
    available: bool,
}

impl SyntheticCameraProvider {
    pub fn new(scene: SyntheticScene) -> Self {
        Self {
            scene,
            capabilities: Self::default_capabilities(),
            available: true,
        }
    }

    pub fn with_capabilities(scene: SyntheticScene, capabilities: CameraCapabilities) -> Self {
        Self {
            scene,
            capabilities,
            available: true,
        }
    }

    /// A device without a back camera.
    pub fn unavailable() -> Self {
        Self {
            scene: SyntheticScene::new(),
            capabilities: Self::default_capabilities(),
            available: false,
        }
    }

    pub fn default_capabilities() -> CameraCapabilities {
        CameraCapabilities {
            preview_sizes: vec![Size::new(640, 480), Size::new(1280, 720), Size::new(1920, 1080)],
            picture_sizes: vec![Size::new(2560, 1920), Size::new(1920, 1080)],
            preview_fps_ranges: vec![FpsRange::new(15_000, 30_000), FpsRange::new(30_000, 30_000)],
            focus_modes: vec![FocusMode::Auto, FocusMode::ContinuousVideo],
            sensor_orientation: 90,
        }
    }
}

impl CameraProvider for SyntheticCameraProvider {
    fn open(&self) -> Result<Box<dyn CameraDevice>, CameraError> {
        if !self.available {
            return Err(CameraError::no_camera());
        }
        Ok(Box::new(SyntheticCamera {
            scene: self.scene.clone(),
            capabilities: self.capabilities.clone(),
            parameters: None,
            cancel_token: CancellationToken::new(),
            capture_thread: None,
        }))
    }
}

pub struct SyntheticCamera {
    scene: SyntheticScene,
    capabilities: CameraCapabilities,
    parameters: Option<CameraParameters>,
    cancel_token: CancellationToken,
    capture_thread: Option<std::thread::JoinHandle<()>>,
}

impl CameraDevice for SyntheticCamera {
    fn capabilities(&self) -> CameraCapabilities {
        self.capabilities.clone()
    }

    fn configure(&mut self, parameters: &CameraParameters) -> Result<(), CameraError> {
        if !self.capabilities.preview_sizes.contains(&parameters.preview_size) {
            return Err(CameraError::Device(format!(
                "unsupported preview size {}",
                parameters.preview_size
            )));
        }
        self.parameters = Some(parameters.clone());
        Ok(())
    }

    fn set_flash_mode(&mut self, mode: FlashMode) -> Result<(), CameraError> {
        match self.parameters.as_mut() {
            Some(parameters) => {
                parameters.flash_mode = mode;
                Ok(())
            }
            None => Err(CameraError::Device("camera is not configured".to_string())),
        }
    }

    fn start_preview(
        &mut self,
        _surface: &PreviewSurface,
        pool: FrameBufferPool,
        sink: FrameSink,
    ) -> Result<(), CameraError> {
        let parameters = self
            .parameters
            .clone()
            .ok_or_else(|| CameraError::Device("camera is not configured".to_string()))?;
        if self.capture_thread.is_some() {
            return Ok(());
        }

        let fps = (parameters.fps_range.max / 1000).max(1);
        let interval = Duration::from_millis(1000 / fps as u64);
        let scene = self.scene.clone();
        let cancel_token = self.cancel_token.clone();
        let thread = std::thread::Builder::new()
            .name("synthetic-camera".to_string())
            .spawn(move || {
                capture_loop(scene, pool, sink, parameters.preview_size, interval, cancel_token)
            })
            .map_err(|e| CameraError::Device(format!("failed to start capture: {}", e)))?;
        self.capture_thread = Some(thread);
        Ok(())
    }

    fn stop_preview(&mut self) {
        self.cancel_token.cancel();
        if let Some(thread) = self.capture_thread.take() {
            if thread.join().is_err() {
                tracing::error!("Synthetic capture thread panicked");
            }
        }
        self.cancel_token = CancellationToken::new();
    }
}

impl Drop for SyntheticCamera {
    fn drop(&mut self) {
        self.stop_preview();
    }
}

fn capture_loop(
    scene: SyntheticScene,
    pool: FrameBufferPool,
    sink: FrameSink,
    size: Size,
    interval: Duration,
    cancel_token: CancellationToken,
) {
    tracing::debug!("Synthetic camera capturing {} every {:?}", size, interval);
    while !cancel_token.is_cancelled() {
        match pool.acquire() {
            Some(buffer) => {
                if !deliver(&scene, &sink, buffer, size) {
                    tracing::debug!("Frame sink closed, stopping synthetic capture");
                    break;
                }
            }
            None => tracing::trace!("All preview buffers in use, skipping frame"),
        }
        std::thread::sleep(interval);
    }
}

fn deliver(scene: &SyntheticScene, sink: &FrameSink, mut buffer: PooledBuffer, size: Size) -> bool {
    scene.render(buffer.as_mut_slice(), size);
    sink.deliver(buffer)
}
