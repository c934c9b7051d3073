use futures::future::join_all;
use image::DynamicImage;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use crate::common::InputImage;
use crate::error::AppError;
use crate::pipeline::detector::{DetectorMode, DetectorService, ObjectDetector};
use crate::search::engine::{search_object, SearchEngine};
use crate::workflow::{DetectedInfo, SearchedObject};

/// Detects every object in a still photo and searches them all at once.
pub struct StaticImageSearch {
    detector: DetectorService,
    engine: Arc<dyn SearchEngine>,
}

impl StaticImageSearch {
    pub fn new(
        detector: Arc<dyn ObjectDetector>,
        engine: Arc<dyn SearchEngine>,
        detector_timeout: Option<Duration>,
    ) -> Self {
        Self {
            detector: DetectorService::build(detector, DetectorMode::SingleImage, detector_timeout),
            engine,
        }
    }

    /// Objects found in the photo, in detector order. A failed detection finds nothing.
    pub async fn detect(&self, image: Arc<DynamicImage>) -> Vec<Arc<DetectedInfo>> {
        let input = InputImage::Still(image);
        let objects = match self.detector.detect(input.clone()).await {
            Ok(objects) => objects,
            Err(e) => {
                tracing::warn!("Object detection on photo failed: {}", e);
                return Vec::new();
            }
        };
        let source = input.source();
        objects
            .into_iter()
            .enumerate()
            .map(|(index, object)| Arc::new(DetectedInfo::new(object, index, source.clone())))
            .collect()
    }

    /// Searches every detected object concurrently and returns the results ordered by object
    /// index once all of them are in.
    pub async fn search(&self, image: Arc<DynamicImage>) -> Vec<SearchedObject> {
        let objects = self.detect(image).await;
        tracing::info!("Searching {} objects found in photo", objects.len());

        let searches = objects.into_iter().map(|object| async move {
            let products = search_object(self.engine.as_ref(), &object).await;
            SearchedObject::new(object, products)
        });
        let mut searched = join_all(searches).await;
        searched.sort_by_key(|object| object.object_index());
        searched
    }

    pub async fn search_file(&self, path: impl AsRef<Path>) -> Result<Vec<SearchedObject>, AppError> {
        let path = path.as_ref().to_path_buf();
        let image = tokio::task::spawn_blocking(move || image::open(path))
            .await
            .map_err(|e| AppError::Pipeline(e.to_string()))??;
        Ok(self.search(Arc::new(image)).await)
    }
}
