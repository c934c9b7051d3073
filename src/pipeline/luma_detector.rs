use async_trait::async_trait;
use parking_lot::Mutex;

use crate::common::{DetectedObject, InputImage, Label, Rect};
use crate::error::DetectionError;
use crate::pipeline::detector::{DetectorMode, ObjectDetector};

const DEFAULT_THRESHOLD: u8 = 128;
const DEFAULT_MIN_PIXELS: usize = 16;
const SAME_OBJECT_IOU: f32 = 0.5;
const LABEL: &str = "Bright object";

/// Finds the bounding box of bright pixels. Pairs with the synthetic camera, which films a
/// bright square on a dark background.
pub struct LumaObjectDetector {
    threshold: u8,
    min_pixels: usize,
    tracker: Mutex<Tracker>,
}

#[derive(Default)]
struct Tracker {
    last: Option<(Rect, u32)>,
    next_id: u32,
}

impl Tracker {
    /// Keeps the previous id while the box mostly overlaps the previous one.
    fn track(&mut self, rect: Rect) -> u32 {
        let id = match self.last {
            Some((previous, id)) if previous.iou(&rect) >= SAME_OBJECT_IOU => id,
            _ => {
                let id = self.next_id;
                self.next_id = self.next_id.wrapping_add(1);
                id
            }
        };
        self.last = Some((rect, id));
        id
    }
}

impl LumaObjectDetector {
    pub fn new() -> Self {
        Self::with_threshold(DEFAULT_THRESHOLD)
    }

    pub fn with_threshold(threshold: u8) -> Self {
        Self {
            threshold,
            min_pixels: DEFAULT_MIN_PIXELS,
            tracker: Mutex::new(Tracker::default()),
        }
    }

    pub fn with_min_pixels(mut self, min_pixels: usize) -> Self {
        self.min_pixels = min_pixels;
        self
    }
}

impl Default for LumaObjectDetector {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ObjectDetector for LumaObjectDetector {
    async fn detect(
        &self,
        image: &InputImage,
        mode: DetectorMode,
    ) -> Result<Vec<DetectedObject>, DetectionError> {
        let image = image.clone();
        let (threshold, min_pixels) = (self.threshold, self.min_pixels);
        let found = tokio::task::spawn_blocking(move || bright_region(&image, threshold, min_pixels))
            .await
            .map_err(|e| DetectionError::Failed(e.to_string()))?;

        let Some((bounding_box, coverage)) = found else {
            if mode == DetectorMode::Stream {
                self.tracker.lock().last = None;
            }
            return Ok(Vec::new());
        };
        let tracking_id = match mode {
            DetectorMode::Stream => Some(self.tracker.lock().track(bounding_box)),
            DetectorMode::SingleImage => None,
        };
        Ok(vec![DetectedObject::new(bounding_box, tracking_id)
            .with_labels(vec![Label::new(LABEL, coverage, 0)])])
    }
}

/// Upright bounding box of the bright pixels and the share of the box they fill.
fn bright_region(image: &InputImage, threshold: u8, min_pixels: usize) -> Option<(Rect, f32)> {
    match image {
        InputImage::Camera(frame) => {
            let metadata = frame.metadata();
            let (rect, coverage) =
                scan(frame.luma(), metadata.width, metadata.height, threshold, min_pixels)?;
            let upright = rect.rotate(metadata.rotation, metadata.width, metadata.height);
            Some((upright, coverage))
        }
        InputImage::Still(image) => {
            let luma = image.to_luma8();
            scan(luma.as_raw(), luma.width(), luma.height(), threshold, min_pixels)
        }
    }
}

fn scan(luma: &[u8], width: u32, height: u32, threshold: u8, min_pixels: usize) -> Option<(Rect, f32)> {
    let width = width as usize;
    if width == 0 {
        return None;
    }
    let mut bounds: Option<Rect> = None;
    let mut count = 0usize;
    for (y, row) in luma.chunks(width).take(height as usize).enumerate() {
        for (x, &value) in row.iter().enumerate() {
            if value < threshold {
                continue;
            }
            count += 1;
            let (x, y) = (x as i32, y as i32);
            bounds = Some(match bounds {
                None => Rect::new(x, y, x + 1, y + 1),
                Some(b) => Rect::new(b.left.min(x), b.top.min(y), b.right.max(x + 1), b.bottom.max(y + 1)),
            });
        }
    }
    let rect = bounds?;
    if count < min_pixels {
        return None;
    }
    Some((rect, count as f32 / rect.area() as f32))
}
