use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::runtime::Handle;
use tokio::task::AbortHandle;

use crate::common::{DetectedObject, Frame, InputImage};
use crate::error::DetectionError;
use crate::pipeline::detector::DetectorService;
use crate::pipeline::processor::FrameProcessor;

/// Reacts to the outcome of one detection. Callbacks never run concurrently with each other.
pub trait DetectionHandler: Send + 'static {
    fn on_success(&mut self, image: &InputImage, objects: Vec<DetectedObject>);

    fn on_failure(&mut self, image: &InputImage, error: DetectionError);
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ProcessorStats {
    pub processed: u64,
    pub dropped: u64,
}

/// Runs at most one detection at a time, always on the newest frame. Frames that arrive while
/// a detection is in flight replace each other in a single pending slot; when the detection
/// completes only the last of them is processed.
pub struct LatestFrameProcessor<H: DetectionHandler> {
    shared: Arc<Shared<H>>,
}

struct Shared<H> {
    slots: Mutex<FrameSlots>,
    handler: Mutex<H>,
    stopped: AtomicBool,
    detector: DetectorService,
    runtime: Handle,
}

#[derive(Default)]
struct FrameSlots {
    pending: Option<Frame>,
    /// Detection is in flight exactly while this is set.
    active: Option<Frame>,
    task: Option<AbortHandle>,
    stats: ProcessorStats,
}

impl<H: DetectionHandler> LatestFrameProcessor<H> {
    pub fn new(detector: DetectorService, handler: H, runtime: Handle) -> Self {
        Self {
            shared: Arc::new(Shared {
                slots: Mutex::new(FrameSlots::default()),
                handler: Mutex::new(handler),
                stopped: AtomicBool::new(false),
                detector,
                runtime,
            }),
        }
    }

    pub fn submit(&self, frame: Frame) {
        self.shared.submit(frame);
    }

    /// Discards pending work and suppresses the callbacks of a detection still in flight. Waits
    /// for a callback that is already running, so it must not be called from a handler.
    pub fn stop(&self) {
        if self.shared.stopped.swap(true, Ordering::SeqCst) {
            return;
        }
        let (pending, active, task) = {
            let mut slots = self.shared.slots.lock();
            (slots.pending.take(), slots.active.take(), slots.task.take())
        };
        if let Some(task) = task {
            task.abort();
        }
        drop((pending, active));
        drop(self.shared.handler.lock());
        tracing::debug!("Frame processor stopped");
    }

    pub fn is_detecting(&self) -> bool {
        self.shared.slots.lock().active.is_some()
    }

    pub fn is_stopped(&self) -> bool {
        self.shared.stopped.load(Ordering::SeqCst)
    }

    pub fn stats(&self) -> ProcessorStats {
        self.shared.slots.lock().stats
    }
}

impl<H: DetectionHandler> Shared<H> {
    fn submit(self: &Arc<Self>, frame: Frame) {
        if self.stopped.load(Ordering::SeqCst) {
            return;
        }
        let mut slots = self.slots.lock();
        if let Some(stale) = slots.pending.replace(frame) {
            slots.stats.dropped += 1;
            tracing::trace!("Frame {} superseded before detection", stale.id());
        }
        if slots.active.is_none() {
            self.promote_pending(&mut slots);
        }
    }

    fn promote_pending(self: &Arc<Self>, slots: &mut FrameSlots) {
        let Some(frame) = slots.pending.take() else {
            return;
        };
        slots.active = Some(frame.clone());

        let shared = self.clone();
        let task = self.runtime.spawn(async move {
            let image = InputImage::Camera(frame);
            let result = shared.detector.detect(image.clone()).await;
            shared.complete(image, result);
        });
        slots.task = Some(task.abort_handle());
    }

    fn complete(self: &Arc<Self>, image: InputImage, result: Result<Vec<DetectedObject>, DetectionError>) {
        {
            let mut handler = self.handler.lock();
            if self.stopped.load(Ordering::SeqCst) {
                tracing::debug!("Discarding detection result of a stopped processor");
                return;
            }
            match result {
                Ok(objects) => handler.on_success(&image, objects),
                Err(error) => {
                    tracing::warn!("Object detection failed: {}", error);
                    handler.on_failure(&image, error);
                }
            }
        }
        drop(image);

        let mut slots = self.slots.lock();
        slots.active = None;
        slots.task = None;
        slots.stats.processed += 1;
        if !self.stopped.load(Ordering::SeqCst) {
            self.promote_pending(&mut slots);
        }
    }
}

impl<H: DetectionHandler> FrameProcessor for LatestFrameProcessor<H> {
    fn process(&mut self, frame: Frame) {
        self.submit(frame);
    }

    fn stop(&mut self) {
        LatestFrameProcessor::stop(self);
    }
}

impl<H: DetectionHandler> Drop for LatestFrameProcessor<H> {
    fn drop(&mut self) {
        LatestFrameProcessor::stop(self);
    }
}
