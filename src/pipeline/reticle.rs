use crate::common::{Rect, RectF};
use crate::config::DetectionConfig;

/// Maps upright image coordinates onto the preview view.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct OverlayTransform {
    scale_x: f32,
    scale_y: f32,
}

impl OverlayTransform {
    pub fn for_image(image_width: u32, image_height: u32, view_width: u32, view_height: u32) -> Self {
        Self {
            scale_x: view_width as f32 / image_width.max(1) as f32,
            scale_y: view_height as f32 / image_height.max(1) as f32,
        }
    }

    pub fn translate_rect(&self, rect: &Rect) -> RectF {
        RectF::new(
            rect.left as f32 * self.scale_x,
            rect.top as f32 * self.scale_y,
            rect.right as f32 * self.scale_x,
            rect.bottom as f32 * self.scale_y,
        )
    }
}

/// The on-screen target in the middle of the preview.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Reticle {
    view_width: u32,
    view_height: u32,
    outer_ring_radius: f32,
}

impl Reticle {
    pub fn new(view_width: u32, view_height: u32, outer_ring_radius: f32) -> Self {
        Self {
            view_width,
            view_height,
            outer_ring_radius,
        }
    }

    pub fn from_config(config: &DetectionConfig) -> Self {
        Self::new(
            config.view_width,
            config.view_height,
            config.reticle_outer_ring_radius,
        )
    }

    pub fn view_size(&self) -> (u32, u32) {
        (self.view_width, self.view_height)
    }

    pub fn rect(&self) -> RectF {
        RectF::centered(
            self.view_width as f32 / 2.0,
            self.view_height as f32 / 2.0,
            self.outer_ring_radius,
        )
    }

    /// Whether an object's bounding box, given in `image_size` upright coordinates, touches
    /// the reticle.
    pub fn overlaps(&self, bounding_box: &Rect, image_size: (u32, u32)) -> bool {
        let transform =
            OverlayTransform::for_image(image_size.0, image_size.1, self.view_width, self.view_height);
        transform.translate_rect(bounding_box).intersects(&self.rect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn image_boxes_scale_into_view() {
        let transform = OverlayTransform::for_image(480, 640, 1080, 1440);
        let rect = transform.translate_rect(&Rect::new(0, 0, 240, 320));
        assert_eq!(rect, RectF::new(0.0, 0.0, 540.0, 720.0));
    }

    #[test]
    fn centred_object_overlaps_reticle() {
        let reticle = Reticle::new(1080, 1920, 56.0);
        assert!(reticle.overlaps(&Rect::new(200, 300, 280, 340), (480, 640)));
    }

    #[test]
    fn corner_object_misses_reticle() {
        let reticle = Reticle::new(1080, 1920, 56.0);
        assert!(!reticle.overlaps(&Rect::new(0, 0, 50, 50), (480, 640)));
    }
}
