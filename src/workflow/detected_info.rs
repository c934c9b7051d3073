use bytes::Bytes;
use image::codecs::jpeg::JpegEncoder;
use image::imageops::FilterType;
use image::RgbImage;
use std::sync::{Arc, OnceLock};
use uuid::Uuid;

use crate::common::{DetectedObject, ImageSource, Product, Rect};
use crate::error::SearchError;

/// Crops wider than this are scaled down before being sent to the search service.
const MAX_IMAGE_WIDTH: u32 = 640;
const JPEG_QUALITY: u8 = 100;

/// A detected object together with the pixels it was found in. Two infos are equal only when
/// they are the same detection, even if they carry the same tracking id.
pub struct DetectedInfo {
    instance: Uuid,
    object: DetectedObject,
    object_index: usize,
    source: ImageSource,
    bitmap: OnceLock<Option<Arc<RgbImage>>>,
    jpeg: OnceLock<Bytes>,
}

impl DetectedInfo {
    pub fn new(object: DetectedObject, object_index: usize, source: ImageSource) -> Self {
        Self {
            instance: Uuid::new_v4(),
            object,
            object_index,
            source,
            bitmap: OnceLock::new(),
            jpeg: OnceLock::new(),
        }
    }

    pub fn object_id(&self) -> Option<u32> {
        self.object.tracking_id
    }

    pub fn object_index(&self) -> usize {
        self.object_index
    }

    pub fn object(&self) -> &DetectedObject {
        &self.object
    }

    pub fn bounding_box(&self) -> Rect {
        self.object.bounding_box
    }

    /// The upright object crop, at most 640 pixels wide. `None` when the box lies outside the
    /// image or the pixels cannot be decoded.
    pub fn bitmap(&self) -> Option<Arc<RgbImage>> {
        self.bitmap.get_or_init(|| self.crop().map(Arc::new)).clone()
    }

    /// JPEG bytes of [`bitmap`](Self::bitmap), encoded once and cached.
    pub fn image_data(&self) -> Result<Bytes, SearchError> {
        if let Some(jpeg) = self.jpeg.get() {
            return Ok(jpeg.clone());
        }
        let bitmap = self
            .bitmap()
            .ok_or_else(|| SearchError::Encode("object has no visible pixels".to_string()))?;
        let mut encoded = Vec::new();
        JpegEncoder::new_with_quality(&mut encoded, JPEG_QUALITY)
            .encode_image(bitmap.as_ref())
            .map_err(|e| SearchError::Encode(e.to_string()))?;
        let jpeg = Bytes::from(encoded);
        let _ = self.jpeg.set(jpeg.clone());
        Ok(jpeg)
    }

    fn crop(&self) -> Option<RgbImage> {
        let image = self.source.to_rgb()?;
        let rect = self.object.bounding_box.clamp_to(image.width(), image.height());
        if rect.is_empty() {
            return None;
        }
        let crop = image::imageops::crop_imm(
            &image,
            rect.left as u32,
            rect.top as u32,
            rect.width() as u32,
            rect.height() as u32,
        )
        .to_image();

        if crop.width() <= MAX_IMAGE_WIDTH {
            return Some(crop);
        }
        let height = (crop.height() as u64 * MAX_IMAGE_WIDTH as u64 / crop.width() as u64).max(1);
        Some(image::imageops::resize(
            &crop,
            MAX_IMAGE_WIDTH,
            height as u32,
            FilterType::Nearest,
        ))
    }
}

impl PartialEq for DetectedInfo {
    fn eq(&self, other: &Self) -> bool {
        self.instance == other.instance
    }
}

impl Eq for DetectedInfo {}

impl std::fmt::Debug for DetectedInfo {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DetectedInfo")
            .field("object_id", &self.object.tracking_id)
            .field("object_index", &self.object_index)
            .field("bounding_box", &self.object.bounding_box)
            .finish()
    }
}

/// A confirmed object and the products found for it.
#[derive(Debug, Clone)]
pub struct SearchedObject {
    object: Arc<DetectedInfo>,
    products: Vec<Product>,
}

impl SearchedObject {
    pub fn new(object: Arc<DetectedInfo>, products: Vec<Product>) -> Self {
        Self { object, products }
    }

    pub fn object(&self) -> &Arc<DetectedInfo> {
        &self.object
    }

    pub fn object_index(&self) -> usize {
        self.object.object_index()
    }

    pub fn bounding_box(&self) -> Rect {
        self.object.bounding_box()
    }

    pub fn products(&self) -> &[Product] {
        &self.products
    }

    pub fn thumbnail(&self) -> Option<Arc<RgbImage>> {
        self.object.bitmap()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{DynamicImage, Rgb};

    fn still(width: u32, height: u32) -> ImageSource {
        let mut image = RgbImage::from_pixel(width, height, Rgb([10, 10, 10]));
        image.put_pixel(width - 1, height - 1, Rgb([250, 0, 0]));
        ImageSource::Bitmap(Arc::new(DynamicImage::ImageRgb8(image)))
    }

    #[test]
    fn crop_is_clamped_to_the_image() {
        let info = DetectedInfo::new(
            DetectedObject::new(Rect::new(-10, -10, 20, 30), Some(1)),
            0,
            still(40, 40),
        );
        let bitmap = info.bitmap().unwrap();
        assert_eq!(bitmap.dimensions(), (20, 30));
    }

    #[test]
    fn wide_crop_is_downscaled_to_640() {
        let info = DetectedInfo::new(
            DetectedObject::new(Rect::new(0, 0, 1280, 400), None),
            0,
            still(1280, 400),
        );
        assert_eq!(info.bitmap().unwrap().dimensions(), (640, 200));
    }

    #[test]
    fn box_outside_image_has_no_pixels() {
        let info = DetectedInfo::new(
            DetectedObject::new(Rect::new(50, 50, 60, 60), Some(2)),
            0,
            still(40, 40),
        );
        assert!(info.bitmap().is_none());
        assert!(matches!(info.image_data(), Err(SearchError::Encode(_))));
    }

    #[test]
    fn jpeg_is_encoded_once() {
        let info = DetectedInfo::new(
            DetectedObject::new(Rect::new(0, 0, 16, 16), Some(3)),
            1,
            still(32, 32),
        );
        let first = info.image_data().unwrap();
        let second = info.image_data().unwrap();
        assert_eq!(&first[..2], &[0xFF, 0xD8]);
        assert_eq!(first.as_ptr(), second.as_ptr());
    }

    #[test]
    fn equality_is_per_detection() {
        let object = DetectedObject::new(Rect::new(0, 0, 4, 4), Some(7));
        let first = DetectedInfo::new(object.clone(), 0, still(8, 8));
        let second = DetectedInfo::new(object, 0, still(8, 8));
        assert_eq!(first, first);
        assert_ne!(first, second);
        assert_eq!(first.object_id(), second.object_id());
    }
}
