use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::{JoinHandle, JoinSet};
use tokio_util::sync::CancellationToken;

use crate::common::Product;
use crate::search::engine::{search_object, SearchEngine};
use crate::workflow::{DetectedInfo, SearchRequest, WorkflowModel};

/// Runs the searches the workflow dispatches and reports every outcome back to it.
#[derive(Clone)]
pub struct SearchCoordinator {
    engine: Arc<dyn SearchEngine>,
    workflow: Arc<WorkflowModel>,
}

impl SearchCoordinator {
    pub fn new(engine: Arc<dyn SearchEngine>, workflow: Arc<WorkflowModel>) -> Self {
        Self { engine, workflow }
    }

    pub async fn search(&self, object: &Arc<DetectedInfo>) -> Vec<Product> {
        search_object(self.engine.as_ref(), object).await
    }

    /// Searches and hands the result to the workflow, which drops it if the object is no
    /// longer the confirmed one.
    pub async fn complete(&self, object: Arc<DetectedInfo>) -> bool {
        let products = self.search(&object).await;
        self.workflow.on_search_completed(&object, products)
    }

    /// Serves requests until the queue closes or `cancel_token` fires. Cancelling aborts the
    /// searches still outstanding.
    pub fn spawn(
        self,
        mut requests: mpsc::UnboundedReceiver<SearchRequest>,
        cancel_token: CancellationToken,
    ) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut searches = JoinSet::new();
            loop {
                tokio::select! {
                    _ = cancel_token.cancelled() => {
                        searches.abort_all();
                        tracing::info!("Search coordinator cancelled");
                        break;
                    }
                    request = requests.recv() => {
                        let Some(request) = request else {
                            break;
                        };
                        let coordinator = self.clone();
                        searches.spawn(async move {
                            if !coordinator.complete(request.object).await {
                                tracing::debug!("Search result arrived after the object changed");
                            }
                        });
                    }
                    Some(finished) = searches.join_next(), if !searches.is_empty() => {
                        if let Err(e) = finished {
                            if !e.is_cancelled() {
                                tracing::error!("Search task failed: {}", e);
                            }
                        }
                    }
                }
            }
            while searches.join_next().await.is_some() {}
        })
    }
}
