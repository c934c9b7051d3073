pub mod frame;
pub mod geometry;
pub mod input;
pub mod object;
pub mod product;

pub use frame::{Frame, FrameMetadata, Rotation};
pub use geometry::{Rect, RectF};
pub use input::{ImageSource, InputImage};
pub use object::{DetectedObject, Label};
pub use product::Product;
