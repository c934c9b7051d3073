use async_trait::async_trait;
use bytes::Bytes;
use std::sync::Arc;

use crate::common::Product;
use crate::error::SearchError;
use crate::workflow::DetectedInfo;

/// Remote visual search: object image in, similar products out.
#[async_trait]
pub trait SearchEngine: Send + Sync {
    async fn search(&self, image_jpeg: Bytes) -> Result<Vec<Product>, SearchError>;
}

/// Searches for one detected object. Cropping and encoding happen on the blocking pool; any
/// failure yields an empty product list.
pub async fn search_object(engine: &dyn SearchEngine, object: &Arc<DetectedInfo>) -> Vec<Product> {
    let encoding = {
        let object = object.clone();
        tokio::task::spawn_blocking(move || object.image_data())
    };
    let image_jpeg = match encoding.await {
        Ok(Ok(image_jpeg)) => image_jpeg,
        Ok(Err(e)) => {
            tracing::warn!("Could not prepare image of {:?}: {}", object, e);
            return Vec::new();
        }
        Err(e) => {
            tracing::error!("Image encoding task failed: {}", e);
            return Vec::new();
        }
    };

    match engine.search(image_jpeg).await {
        Ok(products) => products,
        Err(e) => {
            tracing::warn!("Product search for {:?} failed: {}", object, e);
            Vec::new()
        }
    }
}
