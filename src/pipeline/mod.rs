pub mod confirmation;
pub mod detector;
pub mod latest_frame;
pub mod luma_detector;
pub mod mode;
pub mod multi_object;
pub mod overlay;
pub mod processor;
pub mod prominent;
pub mod reticle;

pub use confirmation::{ConfirmationController, ConfirmationState};
pub use detector::{DetectorMode, DetectorService, ObjectDetector};
pub use latest_frame::{DetectionHandler, LatestFrameProcessor, ProcessorStats};
pub use luma_detector::LumaObjectDetector;
pub use mode::ProcessingMode;
pub use overlay::{ObjectCandidate, OverlayFrame, OverlayPublisher};
pub use processor::FrameProcessor;
pub use reticle::{OverlayTransform, Reticle};
