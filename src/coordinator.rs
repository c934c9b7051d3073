use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;
use tokio::runtime::Handle;
use tokio::sync::{broadcast, watch};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::camera::{
    CameraProvider, FlashMode, FrameSource, JsonFilePreferences, MemoryPreferences,
    PreferenceStore, PreviewSurface,
};
use crate::config::{Configuration, ProcessingModeKind};
use crate::error::{AppError, CameraError};
use crate::pipeline::{
    DetectorMode, DetectorService, LatestFrameProcessor, ObjectDetector, OverlayFrame,
    OverlayPublisher, ProcessingMode,
};
use crate::search::{SearchCoordinator, SearchEngine};
use crate::workflow::{DetectedInfo, SearchedObject, WorkflowModel, WorkflowState};

/// Drives one live visual search session: camera, detection, confirmation and search.
///
/// Dropping the coordinator joins the camera threads on the dropping thread. From async code,
/// end the session with [`Coordinator::shutdown`] instead.
pub struct Coordinator {
    frame_source: Arc<FrameSource>,
    workflow: Arc<WorkflowModel>,
    detector: DetectorService,
    overlay: OverlayPublisher,
    configuration: Configuration,
    runtime: Handle,
    camera: CameraControl,
    cancel_token: CancellationToken,
    search_task: JoinHandle<()>,
    state_task: JoinHandle<()>,
}

/// Starts and stops the preview as the workflow moves between live and frozen states.
#[derive(Clone)]
struct CameraControl {
    frame_source: Arc<FrameSource>,
    workflow: Arc<WorkflowModel>,
    surface: PreviewSurface,
    last_handled: Arc<Mutex<Option<WorkflowState>>>,
    last_error: Arc<Mutex<Option<CameraError>>>,
    cancel_token: CancellationToken,
}

impl Coordinator {
    /// Attaches a fresh processor and starts detecting. The camera itself is started by the
    /// state observer once DETECTING is seen.
    pub fn resume(&self) {
        self.workflow.mark_camera_frozen();
        self.camera.forget_last_state();

        let handler = ProcessingMode::from_config(
            &self.configuration.detection,
            self.configuration.confirmation.dwell(),
            self.workflow.clone(),
            self.overlay.clone(),
        );
        let processor =
            LatestFrameProcessor::new(self.detector.clone(), handler, self.runtime.clone());
        self.frame_source.set_frame_processor(Box::new(processor));
        self.workflow.change_state(WorkflowState::Detecting);
    }

    /// Stops the preview; `resume` picks the session up again.
    pub async fn pause(&self) {
        self.camera.forget_last_state();
        self.workflow.mark_camera_frozen();
        let frame_source = self.frame_source.clone();
        if let Err(e) = tokio::task::spawn_blocking(move || frame_source.stop()).await {
            tracing::error!("Failed to stop camera preview: {}", e);
        }
    }

    /// The user closed the search result; go back to looking for objects.
    pub fn dismiss_result(&self) {
        self.workflow.change_state(WorkflowState::Detecting);
    }

    pub fn select_object(&self, object: Arc<DetectedInfo>) {
        self.workflow.select_object(object);
    }

    pub fn set_flash(&self, enabled: bool) -> Result<(), CameraError> {
        let mode = if enabled {
            FlashMode::Torch
        } else {
            FlashMode::Off
        };
        self.frame_source.update_flash_mode(mode)
    }

    pub fn workflow(&self) -> &Arc<WorkflowModel> {
        &self.workflow
    }

    pub fn frame_source(&self) -> &Arc<FrameSource> {
        &self.frame_source
    }

    pub fn subscribe_state(&self) -> watch::Receiver<WorkflowState> {
        self.workflow.subscribe_state()
    }

    pub fn subscribe_searched(&self) -> watch::Receiver<Option<Arc<SearchedObject>>> {
        self.workflow.subscribe_searched()
    }

    pub fn subscribe_overlay(&self) -> broadcast::Receiver<OverlayFrame> {
        self.overlay.subscribe()
    }

    /// The camera failure that ended the session, if any.
    pub fn last_error(&self) -> Option<CameraError> {
        self.camera.last_error.lock().clone()
    }

    pub fn is_stopped(&self) -> bool {
        self.cancel_token.is_cancelled()
    }

    pub fn stop(&self) {
        self.cancel_token.cancel();
        self.state_task.abort();
        self.search_task.abort();
        self.frame_source.release();
    }

    /// Like `stop`, but waits for the background tasks and releases the camera off the
    /// async workers.
    pub async fn shutdown(mut self) {
        self.cancel_token.cancel();
        self.state_task.abort();
        if let Err(e) = (&mut self.state_task).await {
            if !e.is_cancelled() {
                tracing::error!("Workflow state observer failed: {}", e);
            }
        }
        if let Err(e) = (&mut self.search_task).await {
            if !e.is_cancelled() {
                tracing::error!("Search coordinator failed: {}", e);
            }
        }
        let frame_source = self.frame_source.clone();
        if let Err(e) = tokio::task::spawn_blocking(move || frame_source.release()).await {
            tracing::error!("Failed to release camera: {}", e);
        }
        tracing::info!("Live session shut down");
    }
}

impl Drop for Coordinator {
    fn drop(&mut self) {
        self.stop();
    }
}

impl CameraControl {
    fn forget_last_state(&self) {
        self.last_handled.lock().take();
    }

    fn spawn(self, mut states: watch::Receiver<WorkflowState>, runtime: &Handle) -> JoinHandle<()> {
        runtime.spawn(async move {
            loop {
                tokio::select! {
                    _ = self.cancel_token.cancelled() => break,
                    changed = states.changed() => {
                        if changed.is_err() {
                            break;
                        }
                    }
                }
                let state = *states.borrow_and_update();
                {
                    let mut last = self.last_handled.lock();
                    if *last == Some(state) {
                        continue;
                    }
                    *last = Some(state);
                }

                if state.needs_live_camera() {
                    self.start_preview().await;
                } else if state.holds_confirmed_object() {
                    self.stop_preview().await;
                }
            }
            tracing::debug!("Workflow state observer stopped");
        })
    }

    async fn start_preview(&self) {
        if self.workflow.is_camera_live() {
            return;
        }
        let frame_source = self.frame_source.clone();
        let surface = self.surface;
        let started = tokio::task::spawn_blocking(move || frame_source.start(&surface)).await;
        let error = match started {
            Ok(Ok(())) => {
                if self.workflow.state().needs_live_camera() {
                    self.workflow.mark_camera_live();
                }
                return;
            }
            Ok(Err(e)) => e,
            Err(e) => CameraError::Device(e.to_string()),
        };

        tracing::error!("Failed to start camera preview: {}", error);
        let frame_source = self.frame_source.clone();
        if let Err(e) = tokio::task::spawn_blocking(move || frame_source.release()).await {
            tracing::error!("Failed to release camera: {}", e);
        }
        *self.last_error.lock() = Some(error);
        self.cancel_token.cancel();
    }

    /// The workflow freezes the camera itself when it confirms an object, so this only checks
    /// whether the device is still streaming.
    async fn stop_preview(&self) {
        self.workflow.mark_camera_frozen();
        if !self.frame_source.is_running() {
            return;
        }
        let frame_source = self.frame_source.clone();
        if let Err(e) = tokio::task::spawn_blocking(move || frame_source.stop()).await {
            tracing::error!("Failed to stop camera preview: {}", e);
        }
    }
}

pub struct CoordinatorBuilder {
    configuration: Configuration,
    camera_provider: Option<Arc<dyn CameraProvider>>,
    detector: Option<Arc<dyn ObjectDetector>>,
    search_engine: Option<Arc<dyn SearchEngine>>,
    preferences: Option<Arc<dyn PreferenceStore>>,
    surface: Option<PreviewSurface>,
}

impl CoordinatorBuilder {
    pub fn new(configuration: Configuration) -> Self {
        Self {
            configuration,
            camera_provider: None,
            detector: None,
            search_engine: None,
            preferences: None,
            surface: None,
        }
    }

    pub fn camera_provider(mut self, camera_provider: Arc<dyn CameraProvider>) -> Self {
        self.camera_provider = Some(camera_provider);
        self
    }

    pub fn detector(mut self, detector: Arc<dyn ObjectDetector>) -> Self {
        self.detector = Some(detector);
        self
    }

    pub fn search_engine(mut self, search_engine: Arc<dyn SearchEngine>) -> Self {
        self.search_engine = Some(search_engine);
        self
    }

    pub fn preferences(mut self, preferences: Arc<dyn PreferenceStore>) -> Self {
        self.preferences = Some(preferences);
        self
    }

    // Defaults to the configured view size in its natural orientation.
    pub fn surface(mut self, surface: PreviewSurface) -> Self {
        self.surface = Some(surface);
        self
    }

    // Overrides the configured number of preview buffers.
    pub fn buffer_pool_size(mut self, buffer_pool_size: usize) -> Self {
        self.configuration.camera.buffer_pool_size = buffer_pool_size;
        self
    }

    // Overrides the configured confirmation dwell.
    pub fn dwell(mut self, dwell: Duration) -> Self {
        self.configuration.confirmation.dwell_ms = dwell.as_millis() as u64;
        self
    }

    pub fn processing_mode(mut self, mode: ProcessingModeKind) -> Self {
        self.configuration.detection.mode = mode;
        self
    }

    pub fn detector_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.configuration.detection.detector_timeout_ms = timeout.map(|t| t.as_millis() as u64);
        self
    }

    pub fn build(self) -> Result<Coordinator, AppError> {
        self.configuration.validate()?;
        let runtime = Handle::try_current()
            .map_err(|e| AppError::Pipeline(format!("Coordinator needs a tokio runtime: {}", e)))?;
        let camera_provider = self
            .camera_provider
            .ok_or(AppError::Pipeline("Camera provider not set".to_string()))?;
        let detector = self
            .detector
            .ok_or(AppError::Pipeline("Detector not set".to_string()))?;
        let search_engine = self
            .search_engine
            .ok_or(AppError::Pipeline("Search engine not set".to_string()))?;
        let preferences: Arc<dyn PreferenceStore> = match (self.preferences, &self.configuration.preferences_path) {
            (Some(preferences), _) => preferences,
            (None, Some(path)) => Arc::new(JsonFilePreferences::open(path)?),
            (None, None) => Arc::new(MemoryPreferences::default()),
        };

        let configuration = self.configuration;
        let detection = &configuration.detection;
        let surface = self
            .surface
            .unwrap_or_else(|| PreviewSurface::new(detection.view_width, detection.view_height, 0));
        let frame_source = Arc::new(FrameSource::new(
            camera_provider,
            configuration.camera.clone(),
            preferences,
        ));
        let detector = DetectorService::build(detector, DetectorMode::Stream, detection.detector_timeout());
        let (workflow, search_requests) = WorkflowModel::new();
        let (overlay, _) = OverlayPublisher::new();
        let cancel_token = CancellationToken::new();

        let search_task = {
            let _guard = runtime.enter();
            SearchCoordinator::new(search_engine, workflow.clone())
                .spawn(search_requests, cancel_token.clone())
        };
        let camera = CameraControl {
            frame_source: frame_source.clone(),
            workflow: workflow.clone(),
            surface,
            last_handled: Arc::new(Mutex::new(None)),
            last_error: Arc::new(Mutex::new(None)),
            cancel_token: cancel_token.clone(),
        };
        let state_task = camera.clone().spawn(workflow.subscribe_state(), &runtime);

        tracing::info!(
            "Live session ready: {:?} mode, dwell {:?}",
            configuration.detection.mode,
            configuration.confirmation.dwell()
        );
        Ok(Coordinator {
            frame_source,
            workflow,
            detector,
            overlay,
            configuration,
            runtime,
            camera,
            cancel_token,
            search_task,
            state_task,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::camera::{SyntheticCameraProvider, SyntheticScene};
    use crate::common::{DetectedObject, ImageSource, Product, Rect};
    use crate::error::SearchError;
    use crate::pipeline::LumaObjectDetector;
    use async_trait::async_trait;
    use bytes::Bytes;
    use image::DynamicImage;

    struct NoProducts;

    #[async_trait]
    impl SearchEngine for NoProducts {
        async fn search(&self, _image_jpeg: Bytes) -> Result<Vec<Product>, SearchError> {
            Ok(Vec::new())
        }
    }

    #[tokio::test]
    async fn builder_requires_collaborators() {
        let result = CoordinatorBuilder::new(Configuration::default())
            .detector(Arc::new(LumaObjectDetector::new()))
            .search_engine(Arc::new(NoProducts))
            .build();
        assert!(matches!(result, Err(AppError::Pipeline(_))));
    }

    #[tokio::test]
    async fn builder_rejects_invalid_overrides() {
        let result = CoordinatorBuilder::new(Configuration::default())
            .buffer_pool_size(0)
            .build();
        assert!(matches!(result, Err(AppError::Config(_))));
    }

    /// Never answers, so a search stays in flight until it is aborted.
    struct Hanging {
        started: Arc<tokio::sync::Notify>,
    }

    #[async_trait]
    impl SearchEngine for Hanging {
        async fn search(&self, _image_jpeg: Bytes) -> Result<Vec<Product>, SearchError> {
            self.started.notify_one();
            std::future::pending().await
        }
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn shutdown_waits_for_outstanding_searches_to_be_cancelled() {
        let started = Arc::new(tokio::sync::Notify::new());
        let coordinator = CoordinatorBuilder::new(Configuration::default())
            .camera_provider(Arc::new(SyntheticCameraProvider::new(SyntheticScene::new())))
            .detector(Arc::new(LumaObjectDetector::new()))
            .search_engine(Arc::new(Hanging {
                started: started.clone(),
            }))
            .build()
            .unwrap();

        let object = Arc::new(DetectedInfo::new(
            DetectedObject::new(Rect::new(0, 0, 4, 4), Some(1)),
            0,
            ImageSource::Bitmap(Arc::new(DynamicImage::new_rgb8(8, 8))),
        ));
        coordinator.select_object(object);
        tokio::time::timeout(Duration::from_secs(5), started.notified())
            .await
            .unwrap();
        assert_eq!(coordinator.workflow().state(), WorkflowState::Searching);

        tokio::time::timeout(Duration::from_secs(5), coordinator.shutdown())
            .await
            .unwrap();
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn missing_camera_ends_the_session() {
        let coordinator = CoordinatorBuilder::new(Configuration::default())
            .camera_provider(Arc::new(SyntheticCameraProvider::unavailable()))
            .detector(Arc::new(LumaObjectDetector::new()))
            .search_engine(Arc::new(NoProducts))
            .build()
            .unwrap();

        coordinator.resume();
        tokio::time::timeout(Duration::from_secs(5), coordinator.cancel_token.cancelled())
            .await
            .unwrap();
        assert_eq!(coordinator.last_error(), Some(CameraError::no_camera()));
        assert!(!coordinator.frame_source().is_running());
        assert!(!coordinator.workflow().is_camera_live());
        coordinator.shutdown().await;
    }
}
