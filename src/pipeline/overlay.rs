use std::sync::Arc;
use tokio::sync::broadcast;

use crate::common::RectF;
use crate::workflow::DetectedInfo;

const DEFAULT_CAPACITY: usize = 10;

/// One object the user can tap in multi-object mode, in view coordinates.
#[derive(Debug, Clone)]
pub struct ObjectCandidate {
    pub bounding_box: RectF,
    pub object: Arc<DetectedInfo>,
}

/// What the preview overlay should draw after a detection.
#[derive(Debug, Clone)]
pub enum OverlayFrame {
    /// Nothing qualifying in view, just the idle reticle.
    Reticle,
    Prominent {
        bounding_box: RectF,
        progress: f32,
        /// The box sits on the reticle and the dwell timer is running.
        confirming: bool,
    },
    Objects { candidates: Vec<ObjectCandidate> },
}

#[derive(Clone)]
pub struct OverlayPublisher {
    overlay_tx: broadcast::Sender<OverlayFrame>,
}

impl OverlayPublisher {
    pub fn new() -> (Self, broadcast::Receiver<OverlayFrame>) {
        Self::with_capacity(DEFAULT_CAPACITY)
    }

    pub fn with_capacity(capacity: usize) -> (Self, broadcast::Receiver<OverlayFrame>) {
        let (overlay_tx, overlay_rx) = broadcast::channel(capacity);
        (Self { overlay_tx }, overlay_rx)
    }

    pub fn subscribe(&self) -> broadcast::Receiver<OverlayFrame> {
        self.overlay_tx.subscribe()
    }

    /// Lagging or absent viewers never hold up detection.
    pub fn publish(&self, frame: OverlayFrame) {
        let _ = self.overlay_tx.send(frame);
    }
}
