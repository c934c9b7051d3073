pub mod buffer_pool;
pub mod device;
pub mod frame_source;
pub mod preferences;
pub mod size_selection;
pub mod synthetic;

pub use buffer_pool::{FrameBufferPool, PooledBuffer};
pub use device::{
    CameraCapabilities, CameraDevice, CameraParameters, CameraProvider, FlashMode, FocusMode,
    FpsRange, PreviewSurface, Size, SizePair,
};
pub use frame_source::{FrameSink, FrameSource};
pub use preferences::{JsonFilePreferences, MemoryPreferences, PreferenceStore};
pub use synthetic::{SyntheticCameraProvider, SyntheticScene};
