use std::sync::Arc;

use crate::common::{DetectedObject, InputImage};
use crate::error::DetectionError;
use crate::pipeline::latest_frame::DetectionHandler;
use crate::pipeline::overlay::{ObjectCandidate, OverlayFrame, OverlayPublisher};
use crate::pipeline::reticle::OverlayTransform;
use crate::workflow::{DetectedInfo, WorkflowModel, WorkflowState};

/// Shows every large enough object and leaves the choice to the user, who confirms one
/// through [`WorkflowModel::select_object`].
pub struct MultiObjectHandler {
    workflow: Arc<WorkflowModel>,
    overlay: OverlayPublisher,
    view_size: (u32, u32),
    min_object_area_ratio: f32,
    require_labels: bool,
}

impl MultiObjectHandler {
    pub fn new(
        workflow: Arc<WorkflowModel>,
        overlay: OverlayPublisher,
        view_size: (u32, u32),
        min_object_area_ratio: f32,
        require_labels: bool,
    ) -> Self {
        Self {
            workflow,
            overlay,
            view_size,
            min_object_area_ratio,
            require_labels,
        }
    }
}

impl DetectionHandler for MultiObjectHandler {
    fn on_success(&mut self, image: &InputImage, objects: Vec<DetectedObject>) {
        if !self.workflow.is_camera_live() {
            return;
        }

        let (width, height) = image.dimensions();
        let min_area = (width as f64 * height as f64 * self.min_object_area_ratio as f64) as i64;
        let qualified: Vec<DetectedObject> = objects
            .into_iter()
            .filter(|object| !self.require_labels || object.has_valid_labels())
            .filter(|object| object.bounding_box.area() >= min_area)
            .collect();

        if qualified.is_empty() {
            self.workflow.change_state(WorkflowState::Detecting);
            self.overlay.publish(OverlayFrame::Reticle);
            return;
        }

        let transform = OverlayTransform::for_image(width, height, self.view_size.0, self.view_size.1);
        let source = image.source();
        let candidates = qualified
            .into_iter()
            .enumerate()
            .map(|(index, object)| ObjectCandidate {
                bounding_box: transform.translate_rect(&object.bounding_box),
                object: Arc::new(DetectedInfo::new(object, index, source.clone())),
            })
            .collect();

        self.workflow.change_state(WorkflowState::Detected);
        self.overlay.publish(OverlayFrame::Objects { candidates });
    }

    fn on_failure(&mut self, _image: &InputImage, error: DetectionError) {
        tracing::debug!("Multi-object detection skipped a frame: {}", error);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::Rect;
    use image::DynamicImage;

    #[test]
    fn small_objects_are_filtered_and_the_rest_offered() {
        let (workflow, mut requests) = WorkflowModel::new();
        workflow.mark_camera_live();
        let (publisher, mut overlay) = OverlayPublisher::new();
        let mut handler = MultiObjectHandler::new(workflow.clone(), publisher, (100, 100), 0.01, false);
        let image = InputImage::Still(Arc::new(DynamicImage::new_rgb8(100, 100)));

        handler.on_success(
            &image,
            vec![
                DetectedObject::new(Rect::new(0, 0, 5, 5), Some(1)),
                DetectedObject::new(Rect::new(10, 10, 40, 40), Some(2)),
                DetectedObject::new(Rect::new(50, 50, 90, 70), Some(3)),
            ],
        );
        assert_eq!(workflow.state(), WorkflowState::Detected);

        let Ok(OverlayFrame::Objects { candidates }) = overlay.try_recv() else {
            panic!("expected object candidates");
        };
        let ids: Vec<_> = candidates.iter().map(|c| c.object.object_id()).collect();
        assert_eq!(ids, vec![Some(2), Some(3)]);
        assert_eq!(candidates[1].object.object_index(), 1);

        workflow.select_object(candidates[1].object.clone());
        assert_eq!(workflow.state(), WorkflowState::Searching);
        assert_eq!(requests.try_recv().unwrap().object_id(), Some(3));
    }

    #[test]
    fn nothing_left_means_detecting() {
        let (workflow, _requests) = WorkflowModel::new();
        workflow.mark_camera_live();
        let (publisher, _overlay) = OverlayPublisher::new();
        let mut handler = MultiObjectHandler::new(workflow.clone(), publisher, (100, 100), 0.5, false);
        let image = InputImage::Still(Arc::new(DynamicImage::new_rgb8(100, 100)));

        handler.on_success(&image, vec![DetectedObject::new(Rect::new(0, 0, 10, 10), Some(1))]);
        assert_eq!(workflow.state(), WorkflowState::Detecting);
    }
}
