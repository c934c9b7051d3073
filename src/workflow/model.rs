use parking_lot::Mutex;
use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::{mpsc, watch};

use crate::common::Product;
use crate::workflow::detected_info::{DetectedInfo, SearchedObject};
use crate::workflow::state::WorkflowState;

/// A confirmed object waiting for product search.
#[derive(Debug, Clone)]
pub struct SearchRequest {
    pub object: Arc<DetectedInfo>,
}

impl SearchRequest {
    pub fn object_id(&self) -> Option<u32> {
        self.object.object_id()
    }
}

struct WorkflowInner {
    confirmed_object: Option<Arc<DetectedInfo>>,
    object_ids_to_search: HashSet<u32>,
}

/// Single owner of the workflow state. Every mutation goes through the transition methods;
/// everybody else observes through the watch channels.
pub struct WorkflowModel {
    inner: Mutex<WorkflowInner>,
    camera_live: AtomicBool,
    state_tx: watch::Sender<WorkflowState>,
    searched_tx: watch::Sender<Option<Arc<SearchedObject>>>,
    search_tx: mpsc::UnboundedSender<SearchRequest>,
}

impl WorkflowModel {
    /// Returns the model and the queue of search requests it dispatches.
    pub fn new() -> (Arc<Self>, mpsc::UnboundedReceiver<SearchRequest>) {
        let (state_tx, _) = watch::channel(WorkflowState::NotStarted);
        let (searched_tx, _) = watch::channel(None);
        let (search_tx, search_rx) = mpsc::unbounded_channel();
        let model = Self {
            inner: Mutex::new(WorkflowInner {
                confirmed_object: None,
                object_ids_to_search: HashSet::new(),
            }),
            camera_live: AtomicBool::new(false),
            state_tx,
            searched_tx,
            search_tx,
        };
        (Arc::new(model), search_rx)
    }

    pub fn change_state(&self, state: WorkflowState) {
        let mut inner = self.inner.lock();
        self.set_state(&mut inner, state);
    }

    /// Reports the object held over the reticle. At full progress it becomes the confirmed
    /// object and a search is dispatched for it, unless one is already running for its id.
    pub fn confirming_object(&self, object: Arc<DetectedInfo>, progress: f32) {
        let mut inner = self.inner.lock();
        if progress != 1.0 {
            self.set_state(&mut inner, WorkflowState::Confirming);
            return;
        }

        if let (Some(id), Some(confirmed)) = (object.object_id(), &inner.confirmed_object) {
            if confirmed.object_id() == Some(id) && inner.object_ids_to_search.contains(&id) {
                tracing::debug!("Search for object {} already in flight", id);
                return;
            }
        }

        inner.confirmed_object = Some(object.clone());
        self.set_state(&mut inner, WorkflowState::Confirmed);
        self.start_search(&mut inner, object);
        // Detections still in flight must not replace the confirmed object.
        self.camera_live.store(false, Ordering::SeqCst);
        self.set_state(&mut inner, WorkflowState::Searching);
    }

    /// The user picked one of several detected objects.
    pub fn select_object(&self, object: Arc<DetectedInfo>) {
        self.confirming_object(object, 1.0);
    }

    /// A new camera session starts; searches from the previous one no longer count as in flight.
    pub fn mark_camera_live(&self) {
        let mut inner = self.inner.lock();
        self.camera_live.store(true, Ordering::SeqCst);
        inner.object_ids_to_search.clear();
    }

    pub fn mark_camera_frozen(&self) {
        self.camera_live.store(false, Ordering::SeqCst);
    }

    pub fn is_camera_live(&self) -> bool {
        self.camera_live.load(Ordering::SeqCst)
    }

    /// Accepts the products for `object` if it is still the confirmed object. Returns false
    /// for stale results, which leave the workflow untouched.
    pub fn on_search_completed(&self, object: &Arc<DetectedInfo>, products: Vec<Product>) -> bool {
        let mut inner = self.inner.lock();
        let is_current = inner
            .confirmed_object
            .as_ref()
            .is_some_and(|confirmed| confirmed == object);
        if !is_current {
            tracing::debug!("Dropping stale search result for {:?}", object);
            return false;
        }

        if let Some(id) = object.object_id() {
            inner.object_ids_to_search.remove(&id);
        }
        tracing::info!(
            "Search for object {:?} returned {} products",
            object.object_id(),
            products.len()
        );
        self.searched_tx
            .send_replace(Some(Arc::new(SearchedObject::new(object.clone(), products))));
        self.set_state(&mut inner, WorkflowState::Searched);
        true
    }

    pub fn state(&self) -> WorkflowState {
        *self.state_tx.borrow()
    }

    pub fn subscribe_state(&self) -> watch::Receiver<WorkflowState> {
        self.state_tx.subscribe()
    }

    pub fn subscribe_searched(&self) -> watch::Receiver<Option<Arc<SearchedObject>>> {
        self.searched_tx.subscribe()
    }

    pub fn searched_object(&self) -> Option<Arc<SearchedObject>> {
        self.searched_tx.borrow().clone()
    }

    pub fn confirmed_object(&self) -> Option<Arc<DetectedInfo>> {
        self.inner.lock().confirmed_object.clone()
    }

    pub fn searches_in_flight(&self) -> usize {
        self.inner.lock().object_ids_to_search.len()
    }

    fn set_state(&self, inner: &mut WorkflowInner, state: WorkflowState) {
        if !state.holds_confirmed_object() {
            inner.confirmed_object = None;
        }
        let previous = self.state_tx.send_replace(state);
        if previous != state {
            tracing::debug!("Workflow state {} -> {}", previous, state);
        }
    }

    fn start_search(&self, inner: &mut WorkflowInner, object: Arc<DetectedInfo>) {
        match object.object_id() {
            Some(id) => {
                if !inner.object_ids_to_search.insert(id) {
                    tracing::debug!("Search for object {} already requested", id);
                    return;
                }
                tracing::info!("Requesting product search for object {}", id);
            }
            None => tracing::info!("Requesting product search for untracked object"),
        }
        if self.search_tx.send(SearchRequest { object }).is_err() {
            tracing::warn!("Search queue closed, request dropped");
        }
    }
}
