pub mod detected_info;
pub mod model;
pub mod state;

pub use detected_info::{DetectedInfo, SearchedObject};
pub use model::{SearchRequest, WorkflowModel};
pub use state::WorkflowState;
