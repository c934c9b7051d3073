use parking_lot::{Condvar, Mutex};
use std::sync::{Arc, Weak};
use std::thread::JoinHandle;

use crate::camera::buffer_pool::{FrameBufferPool, PooledBuffer};
use crate::camera::device::{
    CameraCapabilities, CameraDevice, CameraParameters, CameraProvider, FlashMode, FocusMode,
    PreviewSurface, Size, SizePair,
};
use crate::camera::preferences::{PreferenceStore, PICTURE_SIZE_KEY, PREVIEW_SIZE_KEY};
use crate::camera::size_selection::{
    make_valid_size_pairs, select_preview_fps_range, select_size_pair,
};
use crate::common::{Frame, FrameMetadata, Rotation};
use crate::config::CameraConfig;
use crate::error::CameraError;
use crate::pipeline::processor::FrameProcessor;

type SharedProcessor = Arc<Mutex<Option<Box<dyn FrameProcessor>>>>;

/// Single-slot handoff between the camera's capture context and the producer thread.
pub struct FrameMailbox {
    pool: FrameBufferPool,
    state: Mutex<MailboxState>,
    ready: Condvar,
}

struct MailboxState {
    active: bool,
    pending: Option<PooledBuffer>,
    dropped: u64,
}

impl FrameMailbox {
    fn new(pool: FrameBufferPool) -> Self {
        Self {
            pool,
            state: Mutex::new(MailboxState {
                active: true,
                pending: None,
                dropped: 0,
            }),
            ready: Condvar::new(),
        }
    }

    /// Parks `buffer` as the next frame. A frame still waiting is dropped and its buffer goes
    /// straight back to the pool.
    fn put(&self, buffer: PooledBuffer) -> bool {
        if !self.pool.owns(&buffer) {
            tracing::warn!("Ignoring buffer {} from another camera session", buffer.index());
            return false;
        }
        let replaced = {
            let mut state = self.state.lock();
            if !state.active {
                return false;
            }
            let replaced = state.pending.replace(buffer);
            if replaced.is_some() {
                state.dropped += 1;
            }
            replaced
        };
        self.ready.notify_one();
        if let Some(stale) = replaced {
            tracing::trace!("Dropped pending frame in buffer {}", stale.index());
        }
        true
    }

    /// Blocks until a frame is pending or the mailbox is closed.
    fn take_next(&self) -> Option<PooledBuffer> {
        let mut state = self.state.lock();
        loop {
            if !state.active {
                return None;
            }
            if let Some(buffer) = state.pending.take() {
                return Some(buffer);
            }
            self.ready.wait(&mut state);
        }
    }

    fn close(&self) {
        let stale = {
            let mut state = self.state.lock();
            state.active = false;
            state.pending.take()
        };
        self.ready.notify_all();
        drop(stale);
    }

    pub fn dropped_frames(&self) -> u64 {
        self.state.lock().dropped
    }
}

/// Handle a camera device uses to push filled buffers to the frame source.
#[derive(Clone)]
pub struct FrameSink {
    mailbox: Weak<FrameMailbox>,
}

impl FrameSink {
    fn new(mailbox: &Arc<FrameMailbox>) -> Self {
        Self {
            mailbox: Arc::downgrade(mailbox),
        }
    }

    #[cfg(test)]
    pub(crate) fn detached() -> Self {
        Self { mailbox: Weak::new() }
    }

    /// Returns false once the session is gone; the buffer is recycled either way.
    pub fn deliver(&self, buffer: PooledBuffer) -> bool {
        match self.mailbox.upgrade() {
            Some(mailbox) => mailbox.put(buffer),
            None => false,
        }
    }
}

struct CameraSession {
    device: Box<dyn CameraDevice>,
    mailbox: Arc<FrameMailbox>,
    producer: Option<JoinHandle<()>>,
    parameters: CameraParameters,
}

impl CameraSession {
    fn shutdown(&mut self) {
        self.mailbox.close();
        self.device.stop_preview();
        if let Some(producer) = self.producer.take() {
            if producer.join().is_err() {
                tracing::error!("Frame producer thread panicked");
            }
        }
        tracing::info!(
            "Camera session stopped, {} frames dropped before processing",
            self.mailbox.dropped_frames()
        );
    }
}

/// Owns the camera session and runs the producer thread that feeds the attached
/// [`FrameProcessor`].
pub struct FrameSource {
    provider: Arc<dyn CameraProvider>,
    config: CameraConfig,
    preferences: Arc<dyn PreferenceStore>,
    session: Mutex<Option<CameraSession>>,
    processor: SharedProcessor,
    flash_mode: Mutex<FlashMode>,
}

impl FrameSource {
    pub fn new(
        provider: Arc<dyn CameraProvider>,
        config: CameraConfig,
        preferences: Arc<dyn PreferenceStore>,
    ) -> Self {
        Self {
            provider,
            config,
            preferences,
            session: Mutex::new(None),
            processor: Arc::new(Mutex::new(None)),
            flash_mode: Mutex::new(FlashMode::Off),
        }
    }

    /// Opens the camera and starts streaming frames. Does nothing when already running. On
    /// failure nothing of the session is kept.
    pub fn start(&self, surface: &PreviewSurface) -> Result<(), CameraError> {
        let mut session = self.session.lock();
        if session.is_some() {
            return Ok(());
        }

        let mut device = self.provider.open()?;
        let parameters = self.select_parameters(&device.capabilities(), surface)?;
        device.configure(&parameters)?;

        let preview = parameters.preview_size;
        let pool = FrameBufferPool::for_preview(preview, self.config.buffer_pool_size)?;
        let mailbox = Arc::new(FrameMailbox::new(pool.clone()));
        device.start_preview(surface, pool, FrameSink::new(&mailbox))?;

        let metadata = FrameMetadata::new(preview.width, preview.height, parameters.rotation);
        let producer = {
            let mailbox = mailbox.clone();
            let processor = self.processor.clone();
            std::thread::Builder::new()
                .name("frame-producer".to_string())
                .spawn(move || run_producer(mailbox, processor, metadata))
        };
        let producer = match producer {
            Ok(handle) => handle,
            Err(e) => {
                mailbox.close();
                device.stop_preview();
                return Err(CameraError::Device(format!(
                    "failed to spawn frame producer: {}",
                    e
                )));
            }
        };

        tracing::info!(
            "Camera started: preview {}, rotation {}, fps {}-{}",
            preview,
            parameters.rotation.degrees(),
            parameters.fps_range.min,
            parameters.fps_range.max
        );
        *session = Some(CameraSession {
            device,
            mailbox,
            producer: Some(producer),
            parameters,
        });
        Ok(())
    }

    /// Stops the preview and joins the producer thread. No frame reaches the processor after
    /// this returns.
    pub fn stop(&self) {
        let session = self.session.lock().take();
        if let Some(mut session) = session {
            session.shutdown();
        }
    }

    /// Stops the camera and tears down the attached processor.
    pub fn release(&self) {
        self.stop();
        let mut processor = self.processor.lock();
        if let Some(mut processor) = processor.take() {
            processor.stop();
        }
    }

    /// Replaces the processor, stopping the previous one under the same lock the producer
    /// holds while delivering a frame.
    pub fn set_frame_processor(&self, processor: Box<dyn FrameProcessor>) {
        let mut current = self.processor.lock();
        if let Some(mut previous) = current.take() {
            previous.stop();
        }
        *current = Some(processor);
        tracing::debug!("Frame processor replaced");
    }

    pub fn update_flash_mode(&self, mode: FlashMode) -> Result<(), CameraError> {
        *self.flash_mode.lock() = mode;
        let mut session = self.session.lock();
        if let Some(session) = session.as_mut() {
            session.device.set_flash_mode(mode)?;
            session.parameters.flash_mode = mode;
        }
        Ok(())
    }

    pub fn flash_mode(&self) -> FlashMode {
        *self.flash_mode.lock()
    }

    pub fn preview_size(&self) -> Option<Size> {
        self.session
            .lock()
            .as_ref()
            .map(|session| session.parameters.preview_size)
    }

    pub fn parameters(&self) -> Option<CameraParameters> {
        self.session
            .lock()
            .as_ref()
            .map(|session| session.parameters.clone())
    }

    pub fn is_running(&self) -> bool {
        self.session.lock().is_some()
    }

    fn select_parameters(
        &self,
        capabilities: &CameraCapabilities,
        surface: &PreviewSurface,
    ) -> Result<CameraParameters, CameraError> {
        let pair = match self.stored_size_pair(capabilities) {
            Some(pair) => pair,
            None => {
                let pairs = make_valid_size_pairs(
                    &capabilities.preview_sizes,
                    &capabilities.picture_sizes,
                    self.config.aspect_ratio_tolerance,
                );
                let pair = select_size_pair(
                    &pairs,
                    surface.aspect_ratio_in_landscape(),
                    &self.config,
                )
                .ok_or_else(CameraError::no_preview_size)?;
                self.store_size_pair(&pair);
                pair
            }
        };

        let fps_range = select_preview_fps_range(
            &capabilities.preview_fps_ranges,
            self.config.requested_fps,
        )
        .ok_or_else(CameraError::no_fps_range)?;

        let focus_mode = capabilities
            .focus_modes
            .contains(&FocusMode::ContinuousVideo)
            .then_some(FocusMode::ContinuousVideo);
        if focus_mode.is_none() {
            tracing::info!("Camera auto focus is not supported on this device");
        }

        Ok(CameraParameters {
            preview_size: pair.preview,
            picture_size: pair.picture,
            fps_range,
            rotation: Rotation::for_camera(
                capabilities.sensor_orientation,
                surface.device_rotation,
            ),
            focus_mode,
            flash_mode: *self.flash_mode.lock(),
        })
    }

    fn stored_size_pair(&self, capabilities: &CameraCapabilities) -> Option<SizePair> {
        let preview: Size = self.preferences.get(PREVIEW_SIZE_KEY)?.parse().ok()?;
        if !capabilities.preview_sizes.contains(&preview) {
            tracing::debug!("Stored preview size {} is no longer supported", preview);
            return None;
        }
        let picture = self
            .preferences
            .get(PICTURE_SIZE_KEY)
            .and_then(|value| value.parse::<Size>().ok())
            .filter(|picture| capabilities.picture_sizes.contains(picture));
        Some(SizePair::new(preview, picture))
    }

    fn store_size_pair(&self, pair: &SizePair) {
        let mut result = self
            .preferences
            .put(PREVIEW_SIZE_KEY, &pair.preview.to_string());
        if let (Ok(()), Some(picture)) = (&result, pair.picture) {
            result = self.preferences.put(PICTURE_SIZE_KEY, &picture.to_string());
        }
        if let Err(e) = result {
            tracing::warn!("Failed to persist camera size selection: {}", e);
        }
    }
}

impl Drop for FrameSource {
    fn drop(&mut self) {
        self.release();
    }
}

fn run_producer(mailbox: Arc<FrameMailbox>, processor: SharedProcessor, metadata: FrameMetadata) {
    tracing::debug!("Frame producer running");
    let mut next_id: u64 = 0;
    while let Some(buffer) = mailbox.take_next() {
        let frame = Frame::new(next_id, buffer, metadata);
        next_id += 1;

        let mut processor = processor.lock();
        match processor.as_mut() {
            Some(processor) => processor.process(frame),
            None => tracing::trace!("No processor attached, recycling frame {}", frame.id()),
        }
    }
    tracing::debug!("Frame producer exiting after {} frames", next_id);
}
