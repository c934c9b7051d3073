use async_trait::async_trait;
use bytes::Bytes;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::runtime::Handle;

use visual_search::camera::{
    FrameSource, MemoryPreferences, PreviewSurface, SyntheticCameraProvider, SyntheticScene,
};
use visual_search::common::{DetectedObject, InputImage, Product, RectF};
use visual_search::config::{CameraConfig, Configuration, ProcessingModeKind};
use visual_search::coordinator::CoordinatorBuilder;
use visual_search::error::{DetectionError, SearchError};
use visual_search::pipeline::{
    DetectionHandler, DetectorMode, DetectorService, LatestFrameProcessor, LumaObjectDetector,
    ObjectDetector, OverlayFrame,
};
use visual_search::search::SearchEngine;
use visual_search::workflow::WorkflowState;

const WAIT: Duration = Duration::from_secs(10);

struct CountingEngine {
    calls: AtomicUsize,
}

impl CountingEngine {
    fn new() -> Arc<Self> {
        Arc::new(Self {
            calls: AtomicUsize::new(0),
        })
    }
}

#[async_trait]
impl SearchEngine for CountingEngine {
    async fn search(&self, image_jpeg: Bytes) -> Result<Vec<Product>, SearchError> {
        assert!(!image_jpeg.is_empty());
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(vec![Product::new(
            "https://example.com/lamp.jpg",
            "Desk lamp",
            "Lighting",
        )])
    }
}

fn centred_scene() -> SyntheticScene {
    let scene = SyntheticScene::new();
    scene.place(RectF::new(0.4, 0.4, 0.6, 0.6));
    scene
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn object_under_reticle_is_confirmed_and_searched() {
    let engine = CountingEngine::new();
    let coordinator = CoordinatorBuilder::new(Configuration::default())
        .camera_provider(Arc::new(SyntheticCameraProvider::new(centred_scene())))
        .detector(Arc::new(LumaObjectDetector::new()))
        .search_engine(engine.clone())
        .dwell(Duration::from_millis(300))
        .build()
        .unwrap();

    let mut searched = coordinator.subscribe_searched();
    coordinator.resume();

    let result = tokio::time::timeout(WAIT, searched.wait_for(|s| s.is_some()))
        .await
        .unwrap()
        .unwrap()
        .clone()
        .unwrap();
    assert_eq!(result.products().len(), 1);
    assert_eq!(result.products()[0].title, "Desk lamp");
    assert!(result.object().object_id().is_some());
    assert!(result.thumbnail().is_some());
    assert_eq!(coordinator.workflow().state(), WorkflowState::Searched);
    assert_eq!(engine.calls.load(Ordering::SeqCst), 1);

    // The preview freezes while the result is shown.
    tokio::time::timeout(WAIT, async {
        while coordinator.frame_source().is_running() {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .unwrap();
    assert!(!coordinator.workflow().is_camera_live());

    // Back to detecting: the camera restarts and the same object is searched again.
    coordinator.dismiss_result();
    tokio::time::timeout(WAIT, async {
        while engine.calls.load(Ordering::SeqCst) < 2 {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .unwrap();

    assert!(coordinator.last_error().is_none());
    coordinator.shutdown().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn multi_object_mode_waits_for_a_selection() {
    let engine = CountingEngine::new();
    let coordinator = CoordinatorBuilder::new(Configuration::default())
        .camera_provider(Arc::new(SyntheticCameraProvider::new(centred_scene())))
        .detector(Arc::new(LumaObjectDetector::new()))
        .search_engine(engine.clone())
        .processing_mode(ProcessingModeKind::MultiObject)
        .build()
        .unwrap();

    let mut overlay = coordinator.subscribe_overlay();
    coordinator.resume();

    let candidate = tokio::time::timeout(WAIT, async {
        loop {
            if let Ok(OverlayFrame::Objects { candidates }) = overlay.recv().await {
                if let Some(candidate) = candidates.into_iter().next() {
                    return candidate;
                }
            }
        }
    })
    .await
    .unwrap();
    assert_eq!(coordinator.workflow().state(), WorkflowState::Detected);
    assert_eq!(engine.calls.load(Ordering::SeqCst), 0);

    let mut searched = coordinator.subscribe_searched();
    coordinator.select_object(candidate.object.clone());
    let result = tokio::time::timeout(WAIT, searched.wait_for(|s| s.is_some()))
        .await
        .unwrap()
        .unwrap()
        .clone()
        .unwrap();
    assert_eq!(result.object(), &candidate.object);
    assert_eq!(engine.calls.load(Ordering::SeqCst), 1);

    coordinator.shutdown().await;
}

/// Sleeps through every detection and records how many run at once.
struct SlowDetector {
    running: AtomicUsize,
    max_running: AtomicUsize,
}

#[async_trait]
impl ObjectDetector for SlowDetector {
    async fn detect(
        &self,
        _image: &InputImage,
        _mode: DetectorMode,
    ) -> Result<Vec<DetectedObject>, DetectionError> {
        let now = self.running.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_running.fetch_max(now, Ordering::SeqCst);
        tokio::time::sleep(Duration::from_millis(100)).await;
        self.running.fetch_sub(1, Ordering::SeqCst);
        Ok(Vec::new())
    }
}

struct FrameLog(Arc<Mutex<Vec<u64>>>);

impl DetectionHandler for FrameLog {
    fn on_success(&mut self, image: &InputImage, _objects: Vec<DetectedObject>) {
        if let InputImage::Camera(frame) = image {
            self.0.lock().push(frame.id());
        }
    }

    fn on_failure(&mut self, _image: &InputImage, _error: DetectionError) {}
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn slow_detector_only_sees_the_newest_frames() {
    let detector = Arc::new(SlowDetector {
        running: AtomicUsize::new(0),
        max_running: AtomicUsize::new(0),
    });
    let seen = Arc::new(Mutex::new(Vec::new()));
    let source = Arc::new(FrameSource::new(
        Arc::new(SyntheticCameraProvider::new(centred_scene())),
        CameraConfig::default(),
        Arc::new(MemoryPreferences::default()),
    ));
    source.set_frame_processor(Box::new(LatestFrameProcessor::new(
        DetectorService::build(detector.clone(), DetectorMode::Stream, None),
        FrameLog(seen.clone()),
        Handle::current(),
    )));

    let starter = source.clone();
    tokio::task::spawn_blocking(move || starter.start(&PreviewSurface::new(1080, 1920, 0)))
        .await
        .unwrap()
        .unwrap();
    tokio::time::sleep(Duration::from_millis(800)).await;
    let stopper = source.clone();
    tokio::task::spawn_blocking(move || stopper.release())
        .await
        .unwrap();

    let seen = seen.lock().clone();
    assert!(seen.len() >= 2, "only {} detections completed", seen.len());
    assert!(seen.windows(2).all(|pair| pair[0] < pair[1]));
    // At 30 fps a 100 ms detector cannot keep up, so frames must have been skipped.
    assert!(seen.windows(2).any(|pair| pair[1] - pair[0] > 1));
    assert_eq!(detector.max_running.load(Ordering::SeqCst), 1);
}
