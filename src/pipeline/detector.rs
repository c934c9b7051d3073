use async_trait::async_trait;
use futures::future::BoxFuture;
use parking_lot::Mutex;
use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::Duration;
use tower::timeout::error::Elapsed;
use tower::timeout::TimeoutLayer;
use tower::util::BoxCloneService;
use tower::{BoxError, Service, ServiceBuilder, ServiceExt};

use crate::common::{DetectedObject, InputImage};
use crate::error::DetectionError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DetectorMode {
    /// Repeated calls on consecutive preview frames; tracking ids stay stable between calls.
    Stream,
    /// One-off detection on a still photo.
    SingleImage,
}

/// The object detection model.
#[async_trait]
pub trait ObjectDetector: Send + Sync {
    async fn detect(
        &self,
        image: &InputImage,
        mode: DetectorMode,
    ) -> Result<Vec<DetectedObject>, DetectionError>;
}

/// Adapts an [`ObjectDetector`] to a tower service running in a fixed mode.
#[derive(Clone)]
pub struct ObjectDetectorService {
    detector: Arc<dyn ObjectDetector>,
    mode: DetectorMode,
}

impl ObjectDetectorService {
    pub fn new(detector: Arc<dyn ObjectDetector>, mode: DetectorMode) -> Self {
        Self { detector, mode }
    }
}

impl Service<InputImage> for ObjectDetectorService {
    type Response = Vec<DetectedObject>;
    type Error = BoxError;
    type Future = BoxFuture<'static, Result<Self::Response, Self::Error>>;

    fn poll_ready(&mut self, _cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        Poll::Ready(Ok(()))
    }

    fn call(&mut self, image: InputImage) -> Self::Future {
        let detector = self.detector.clone();
        let mode = self.mode;
        Box::pin(async move {
            let objects = detector.detect(&image, mode).await?;
            Ok::<_, BoxError>(objects)
        })
    }
}

/// Detector call stack shared by the frame scheduler and the still-image search.
#[derive(Clone)]
pub struct DetectorService {
    service: Arc<Mutex<BoxCloneService<InputImage, Vec<DetectedObject>, BoxError>>>,
    mode: DetectorMode,
}

impl DetectorService {
    pub fn build(
        detector: Arc<dyn ObjectDetector>,
        mode: DetectorMode,
        timeout: Option<Duration>,
    ) -> Self {
        let service = ServiceBuilder::new()
            .option_layer(timeout.map(TimeoutLayer::new))
            .service(ObjectDetectorService::new(detector, mode));
        Self {
            service: Arc::new(Mutex::new(BoxCloneService::new(service))),
            mode,
        }
    }

    pub fn mode(&self) -> DetectorMode {
        self.mode
    }

    pub async fn detect(&self, image: InputImage) -> Result<Vec<DetectedObject>, DetectionError> {
        let service = self.service.lock().clone();
        service.oneshot(image).await.map_err(into_detection_error)
    }
}

fn into_detection_error(error: BoxError) -> DetectionError {
    if error.is::<Elapsed>() {
        return DetectionError::Timeout;
    }
    match error.downcast::<DetectionError>() {
        Ok(error) => *error,
        Err(error) => DetectionError::Failed(error.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::Rect;
    use image::DynamicImage;

    struct FixedDetector {
        result: Result<Vec<DetectedObject>, DetectionError>,
        delay: Duration,
    }

    #[async_trait]
    impl ObjectDetector for FixedDetector {
        async fn detect(
            &self,
            _image: &InputImage,
            _mode: DetectorMode,
        ) -> Result<Vec<DetectedObject>, DetectionError> {
            tokio::time::sleep(self.delay).await;
            self.result.clone()
        }
    }

    fn still() -> InputImage {
        InputImage::Still(Arc::new(DynamicImage::new_rgb8(4, 4)))
    }

    #[tokio::test]
    async fn detector_results_pass_through() {
        let object = DetectedObject::new(Rect::new(0, 0, 2, 2), Some(3));
        let service = DetectorService::build(
            Arc::new(FixedDetector {
                result: Ok(vec![object.clone()]),
                delay: Duration::ZERO,
            }),
            DetectorMode::Stream,
            None,
        );
        assert_eq!(service.detect(still()).await.unwrap(), vec![object]);
    }

    #[tokio::test]
    async fn detector_errors_keep_their_kind() {
        let service = DetectorService::build(
            Arc::new(FixedDetector {
                result: Err(DetectionError::Failed("model crashed".to_string())),
                delay: Duration::ZERO,
            }),
            DetectorMode::SingleImage,
            None,
        );
        assert_eq!(
            service.detect(still()).await,
            Err(DetectionError::Failed("model crashed".to_string()))
        );
    }

    #[tokio::test(start_paused = true)]
    async fn slow_detector_times_out() {
        let service = DetectorService::build(
            Arc::new(FixedDetector {
                result: Ok(Vec::new()),
                delay: Duration::from_secs(5),
            }),
            DetectorMode::Stream,
            Some(Duration::from_millis(100)),
        );
        assert_eq!(service.detect(still()).await, Err(DetectionError::Timeout));
    }
}
