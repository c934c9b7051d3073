use thiserror::Error;

// Main Application Error Type

#[derive(Error, Debug)]
pub enum AppError {
    #[error("Camera Error: {0}")]
    Camera(#[from] CameraError),
    #[error("Detection Error: {0}")]
    Detection(#[from] DetectionError),
    #[error("Search Error: {0}")]
    Search(#[from] SearchError),
    #[error("Configuration Error: {0}")]
    Config(#[from] ConfigError),
    #[error("IO Error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Image Error: {0}")]
    Image(#[from] image::ImageError),
    #[error("Pipeline Error: {0}")]
    Pipeline(String),
}

// Camera Error Type
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CameraError {
    #[error("Camera unavailable: {0}")]
    Unavailable(String),
    #[error("Camera device failure: {0}")]
    Device(String),
    #[error("Failed to create a valid frame buffer of {0} bytes")]
    BufferSize(usize),
}

impl CameraError {
    pub fn no_camera() -> Self {
        CameraError::Unavailable("there is no back-facing camera".to_string())
    }

    pub fn no_preview_size() -> Self {
        CameraError::Unavailable("could not find a suitable preview size".to_string())
    }

    pub fn no_fps_range() -> Self {
        CameraError::Unavailable(
            "could not find a suitable preview frames per second range".to_string(),
        )
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DetectionError {
    #[error("Detector failed: {0}")]
    Failed(String),
    #[error("Detector timed out")]
    Timeout,
    #[error("Detector has been stopped")]
    Stopped,
}

#[derive(Error, Debug)]
pub enum SearchError {
    #[error("Failed to encode object image: {0}")]
    Encode(String),
    #[error("Search request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("Search service answered with status {0}")]
    Status(u16),
    #[error("Malformed search response: {0}")]
    MalformedResponse(String),
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to load configuration: {0}")]
    Load(#[from] config::ConfigError),
    #[error("Invalid configuration: {0}")]
    Invalid(String),
    #[error("Preference store failure: {0}")]
    Preferences(String),
}
