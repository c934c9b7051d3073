use std::sync::Arc;

use crate::common::{DetectedObject, InputImage};
use crate::error::DetectionError;
use crate::pipeline::confirmation::ConfirmationController;
use crate::pipeline::latest_frame::DetectionHandler;
use crate::pipeline::overlay::{OverlayFrame, OverlayPublisher};
use crate::pipeline::reticle::{OverlayTransform, Reticle};
use crate::workflow::{DetectedInfo, WorkflowModel, WorkflowState};

/// Follows the single most prominent object and confirms it once it has been held over the
/// reticle for the dwell time.
pub struct ProminentObjectHandler {
    workflow: Arc<WorkflowModel>,
    confirmation: ConfirmationController,
    reticle: Reticle,
    overlay: OverlayPublisher,
    require_labels: bool,
}

impl ProminentObjectHandler {
    pub fn new(
        workflow: Arc<WorkflowModel>,
        confirmation: ConfirmationController,
        reticle: Reticle,
        overlay: OverlayPublisher,
        require_labels: bool,
    ) -> Self {
        Self {
            workflow,
            confirmation,
            reticle,
            overlay,
            require_labels,
        }
    }

    fn qualifies(&self, object: &DetectedObject) -> bool {
        !self.require_labels || object.has_valid_labels()
    }
}

impl DetectionHandler for ProminentObjectHandler {
    fn on_success(&mut self, image: &InputImage, objects: Vec<DetectedObject>) {
        if !self.workflow.is_camera_live() {
            return;
        }

        let Some(object) = objects.into_iter().next().filter(|o| self.qualifies(o)) else {
            self.confirmation.reset();
            self.workflow.change_state(WorkflowState::Detecting);
            self.overlay.publish(OverlayFrame::Reticle);
            return;
        };

        let image_size = image.dimensions();
        let (view_width, view_height) = self.reticle.view_size();
        let view_box = OverlayTransform::for_image(image_size.0, image_size.1, view_width, view_height)
            .translate_rect(&object.bounding_box);

        let confirmable = object.tracking_id.filter(|_| {
            self.reticle.overlaps(&object.bounding_box, image_size)
        });
        match confirmable {
            Some(tracking_id) => {
                self.confirmation.confirming(tracking_id);
                let progress = self.confirmation.progress();
                if progress == 1.0 {
                    // Only the frame that completes the dwell is kept for the search.
                    let info = Arc::new(DetectedInfo::new(object, 0, image.source()));
                    self.workflow.confirming_object(info, progress);
                } else {
                    self.workflow.change_state(WorkflowState::Confirming);
                }
                self.overlay.publish(OverlayFrame::Prominent {
                    bounding_box: view_box,
                    progress,
                    confirming: true,
                });
            }
            None => {
                self.confirmation.reset();
                self.workflow.change_state(WorkflowState::Detected);
                self.overlay.publish(OverlayFrame::Prominent {
                    bounding_box: view_box,
                    progress: 0.0,
                    confirming: false,
                });
            }
        }
    }

    fn on_failure(&mut self, _image: &InputImage, error: DetectionError) {
        tracing::debug!("Prominent object detection skipped a frame: {}", error);
    }
}
