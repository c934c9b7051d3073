use std::sync::Arc;

use crate::common::{DetectedObject, InputImage};
use crate::config::{DetectionConfig, ProcessingModeKind};
use crate::error::DetectionError;
use crate::pipeline::confirmation::ConfirmationController;
use crate::pipeline::latest_frame::DetectionHandler;
use crate::pipeline::multi_object::MultiObjectHandler;
use crate::pipeline::overlay::OverlayPublisher;
use crate::pipeline::prominent::ProminentObjectHandler;
use crate::pipeline::reticle::Reticle;
use crate::workflow::WorkflowModel;
use std::time::Duration;

/// How live detections are turned into workflow transitions, picked once per processor.
pub enum ProcessingMode {
    Prominent(ProminentObjectHandler),
    MultiObject(MultiObjectHandler),
}

impl ProcessingMode {
    pub fn from_config(
        config: &DetectionConfig,
        dwell: Duration,
        workflow: Arc<WorkflowModel>,
        overlay: OverlayPublisher,
    ) -> Self {
        match config.mode {
            ProcessingModeKind::Prominent => ProcessingMode::Prominent(ProminentObjectHandler::new(
                workflow,
                ConfirmationController::new(dwell),
                Reticle::from_config(config),
                overlay,
                config.require_labels,
            )),
            ProcessingModeKind::MultiObject => ProcessingMode::MultiObject(MultiObjectHandler::new(
                workflow,
                overlay,
                (config.view_width, config.view_height),
                config.min_object_area_ratio,
                config.require_labels,
            )),
        }
    }

    pub fn kind(&self) -> ProcessingModeKind {
        match self {
            ProcessingMode::Prominent(_) => ProcessingModeKind::Prominent,
            ProcessingMode::MultiObject(_) => ProcessingModeKind::MultiObject,
        }
    }
}

impl DetectionHandler for ProcessingMode {
    fn on_success(&mut self, image: &InputImage, objects: Vec<DetectedObject>) {
        match self {
            ProcessingMode::Prominent(handler) => handler.on_success(image, objects),
            ProcessingMode::MultiObject(handler) => handler.on_success(image, objects),
        }
    }

    fn on_failure(&mut self, image: &InputImage, error: DetectionError) {
        match self {
            ProcessingMode::Prominent(handler) => handler.on_failure(image, error),
            ProcessingMode::MultiObject(handler) => handler.on_failure(image, error),
        }
    }
}
