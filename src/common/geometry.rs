use serde::{Deserialize, Serialize};

use crate::common::frame::Rotation;

/// Integer rectangle in image pixel coordinates, right/bottom exclusive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Rect {
    pub left: i32,
    pub top: i32,
    pub right: i32,
    pub bottom: i32,
}

impl Rect {
    pub fn new(left: i32, top: i32, right: i32, bottom: i32) -> Self {
        Self {
            left,
            top,
            right,
            bottom,
        }
    }

    pub fn width(&self) -> i32 {
        self.right - self.left
    }

    pub fn height(&self) -> i32 {
        self.bottom - self.top
    }

    pub fn is_empty(&self) -> bool {
        self.width() <= 0 || self.height() <= 0
    }

    pub fn area(&self) -> i64 {
        if self.is_empty() {
            0
        } else {
            self.width() as i64 * self.height() as i64
        }
    }

    pub fn intersection(&self, other: &Rect) -> Option<Rect> {
        let rect = Rect::new(
            self.left.max(other.left),
            self.top.max(other.top),
            self.right.min(other.right),
            self.bottom.min(other.bottom),
        );
        if rect.is_empty() { None } else { Some(rect) }
    }

    /// Intersection over union, 0.0 for disjoint or empty boxes.
    pub fn iou(&self, other: &Rect) -> f32 {
        let intersection = match self.intersection(other) {
            Some(rect) => rect.area(),
            None => return 0.0,
        };
        let union = self.area() + other.area() - intersection;
        if union <= 0 {
            0.0
        } else {
            intersection as f32 / union as f32
        }
    }

    /// Clamps the rectangle into a `width` x `height` image.
    pub fn clamp_to(&self, width: u32, height: u32) -> Rect {
        let (width, height) = (width as i32, height as i32);
        Rect::new(
            self.left.clamp(0, width),
            self.top.clamp(0, height),
            self.right.clamp(0, width),
            self.bottom.clamp(0, height),
        )
    }

    /// Maps a rectangle from a raw sensor image of `width` x `height` into the upright image
    /// obtained by rotating it clockwise by `rotation`.
    pub fn rotate(&self, rotation: Rotation, width: u32, height: u32) -> Rect {
        let (w, h) = (width as i32, height as i32);
        match rotation {
            Rotation::Deg0 => *self,
            Rotation::Deg90 => Rect::new(h - self.bottom, self.left, h - self.top, self.right),
            Rotation::Deg180 => Rect::new(w - self.right, h - self.bottom, w - self.left, h - self.top),
            Rotation::Deg270 => Rect::new(self.top, w - self.right, self.bottom, w - self.left),
        }
    }
}

/// Floating point rectangle in view coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RectF {
    pub left: f32,
    pub top: f32,
    pub right: f32,
    pub bottom: f32,
}

impl RectF {
    pub fn new(left: f32, top: f32, right: f32, bottom: f32) -> Self {
        Self {
            left,
            top,
            right,
            bottom,
        }
    }

    pub fn centered(center_x: f32, center_y: f32, half_extent: f32) -> Self {
        Self::new(
            center_x - half_extent,
            center_y - half_extent,
            center_x + half_extent,
            center_y + half_extent,
        )
    }

    /// True when the two rectangles share a region of non-zero area.
    pub fn intersects(&self, other: &RectF) -> bool {
        self.left < other.right
            && other.left < self.right
            && self.top < other.bottom
            && other.top < self.bottom
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn iou_of_identical_boxes_is_one() {
        let rect = Rect::new(10, 10, 50, 30);
        assert_eq!(rect.iou(&rect), 1.0);
    }

    #[test]
    fn iou_of_disjoint_boxes_is_zero() {
        let a = Rect::new(0, 0, 10, 10);
        let b = Rect::new(10, 0, 20, 10);
        assert_eq!(a.iou(&b), 0.0);
    }

    #[test]
    fn iou_of_half_overlap() {
        let a = Rect::new(0, 0, 10, 10);
        let b = Rect::new(5, 0, 15, 10);
        assert!((a.iou(&b) - 50.0 / 150.0).abs() < 1e-6);
    }

    #[test]
    fn rotation_by_90_moves_top_left_corner_to_top_right() {
        // 100x50 sensor image, box in the top-left corner.
        let rect = Rect::new(0, 0, 10, 5);
        let rotated = rect.rotate(Rotation::Deg90, 100, 50);
        assert_eq!(rotated, Rect::new(45, 0, 50, 10));
    }

    #[test]
    fn rotation_round_trips_through_full_turn() {
        let rect = Rect::new(3, 7, 20, 15);
        let once = rect.rotate(Rotation::Deg90, 40, 30);
        let twice = once.rotate(Rotation::Deg270, 30, 40);
        assert_eq!(twice, rect);
        assert_eq!(
            rect.rotate(Rotation::Deg180, 40, 30),
            Rect::new(20, 15, 37, 23)
        );
    }

    #[test]
    fn touching_float_rects_do_not_intersect() {
        let a = RectF::new(0.0, 0.0, 10.0, 10.0);
        let b = RectF::new(10.0, 0.0, 20.0, 10.0);
        assert!(!a.intersects(&b));
        assert!(a.intersects(&RectF::centered(9.0, 5.0, 2.0)));
    }
}
