pub mod camera;
pub mod common;
pub mod config;
pub mod coordinator;
pub mod error;
pub mod pipeline;
pub mod search;
pub mod workflow;

pub use error::{AppError, CameraError, ConfigError, DetectionError, SearchError};

pub use config::Configuration;
pub use coordinator::{Coordinator, CoordinatorBuilder};
pub use workflow::{WorkflowModel, WorkflowState};
