use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;

use crate::error::ConfigError;

const ENV_PREFIX: &str = "VISUAL_SEARCH";

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Configuration {
    pub camera: CameraConfig,
    pub detection: DetectionConfig,
    pub confirmation: ConfirmationConfig,
    pub search: SearchConfig,
    pub logging: LoggingConfig,
    pub preferences_path: Option<PathBuf>,
}

impl Default for Configuration {
    fn default() -> Self {
        Self {
            camera: CameraConfig::default(),
            detection: DetectionConfig::default(),
            confirmation: ConfirmationConfig::default(),
            search: SearchConfig::default(),
            logging: LoggingConfig::default(),
            preferences_path: None,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CameraConfig {
    /// Number of preview buffers handed to the camera driver.
    pub buffer_pool_size: usize,
    pub requested_fps: f32,
    pub min_preview_width: u32,
    pub max_preview_width: u32,
    pub default_preview_width: u32,
    pub default_preview_height: u32,
    pub aspect_ratio_tolerance: f32,
}

impl Default for CameraConfig {
    fn default() -> Self {
        Self {
            buffer_pool_size: 4,
            requested_fps: 30.0,
            min_preview_width: 400,
            max_preview_width: 1300,
            default_preview_width: 640,
            default_preview_height: 360,
            aspect_ratio_tolerance: 0.01,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProcessingModeKind {
    Prominent,
    MultiObject,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct DetectionConfig {
    pub mode: ProcessingModeKind,
    /// Upper bound on one detector call; unset means wait indefinitely.
    pub detector_timeout_ms: Option<u64>,
    /// Custom models must produce at least one meaningful label per object.
    pub require_labels: bool,
    pub reticle_outer_ring_radius: f32,
    pub view_width: u32,
    pub view_height: u32,
    pub portrait: bool,
    /// Minimum share of the frame an object must cover in multi-object mode.
    pub min_object_area_ratio: f32,
}

impl Default for DetectionConfig {
    fn default() -> Self {
        Self {
            mode: ProcessingModeKind::Prominent,
            detector_timeout_ms: Some(2_000),
            require_labels: false,
            reticle_outer_ring_radius: 56.0,
            view_width: 1080,
            view_height: 1920,
            portrait: true,
            min_object_area_ratio: 0.01,
        }
    }
}

impl DetectionConfig {
    pub fn detector_timeout(&self) -> Option<Duration> {
        self.detector_timeout_ms.map(Duration::from_millis)
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ConfirmationConfig {
    pub dwell_ms: u64,
}

impl Default for ConfirmationConfig {
    fn default() -> Self {
        Self { dwell_ms: 3_000 }
    }
}

impl ConfirmationConfig {
    pub fn dwell(&self) -> Duration {
        Duration::from_millis(self.dwell_ms)
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SearchConfig {
    pub endpoint: String,
    pub api_key: String,
    pub project_id: String,
    pub location_id: String,
    pub product_set_id: String,
    pub product_categories: Vec<String>,
    pub max_results: u32,
    pub request_timeout_ms: u64,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            endpoint: "https://us-central1-odml-codelabs.cloudfunctions.net/productSearch"
                .to_string(),
            api_key: String::new(),
            project_id: "odml-codelabs".to_string(),
            location_id: "us-east1".to_string(),
            product_set_id: "product_set0".to_string(),
            product_categories: vec!["apparel-v2".to_string()],
            max_results: 4,
            request_timeout_ms: 10_000,
        }
    }
}

impl SearchConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

impl Configuration {
    /// Loads defaults, then the optional file, then `VISUAL_SEARCH__SECTION__KEY` overrides.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let mut builder = config::Config::builder();
        if let Some(path) = path {
            builder = builder.add_source(config::File::from(path).required(false));
        }
        let configuration: Configuration = builder
            .add_source(config::Environment::with_prefix(ENV_PREFIX).separator("__"))
            .build()?
            .try_deserialize()?;
        configuration.validate()?;
        Ok(configuration)
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.camera.buffer_pool_size == 0 {
            return Err(ConfigError::Invalid(
                "Buffer pool size must be greater than 0".to_string(),
            ));
        }

        if self.camera.requested_fps <= 0.0 {
            return Err(ConfigError::Invalid(
                "Requested fps must be greater than 0".to_string(),
            ));
        }

        if self.camera.min_preview_width > self.camera.max_preview_width {
            return Err(ConfigError::Invalid(
                "Minimum preview width must not exceed the maximum".to_string(),
            ));
        }

        if self.confirmation.dwell_ms == 0 {
            return Err(ConfigError::Invalid(
                "Confirmation dwell must be greater than 0".to_string(),
            ));
        }

        if self.detection.view_width == 0 || self.detection.view_height == 0 {
            return Err(ConfigError::Invalid(
                "View dimensions must be greater than 0".to_string(),
            ));
        }

        if !(0.0..=1.0).contains(&self.detection.min_object_area_ratio) {
            return Err(ConfigError::Invalid(
                "Minimum object area ratio must be between 0.0 and 1.0".to_string(),
            ));
        }

        if self.search.max_results == 0 {
            return Err(ConfigError::Invalid(
                "Search max results must be greater than 0".to_string(),
            ));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn defaults_are_valid() {
        let configuration = Configuration::default();
        assert!(configuration.validate().is_ok());
        assert_eq!(configuration.camera.buffer_pool_size, 4);
        assert_eq!(configuration.confirmation.dwell(), Duration::from_millis(3_000));
        assert_eq!(configuration.detection.mode, ProcessingModeKind::Prominent);
    }

    #[test]
    fn zero_dwell_is_rejected() {
        let mut configuration = Configuration::default();
        configuration.confirmation.dwell_ms = 0;
        assert!(matches!(
            configuration.validate(),
            Err(ConfigError::Invalid(_))
        ));
    }

    #[test]
    fn file_values_override_defaults() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        writeln!(
            file,
            "[camera]\nbuffer_pool_size = 6\n\n[detection]\nmode = \"multi_object\"\n\n[confirmation]\ndwell_ms = 1500"
        )
        .unwrap();

        let configuration = Configuration::load(Some(file.path())).unwrap();
        assert_eq!(configuration.camera.buffer_pool_size, 6);
        assert_eq!(configuration.camera.requested_fps, 30.0);
        assert_eq!(configuration.detection.mode, ProcessingModeKind::MultiObject);
        assert_eq!(configuration.confirmation.dwell_ms, 1_500);
    }

    #[test]
    fn missing_file_falls_back_to_defaults() {
        let configuration =
            Configuration::load(Some(Path::new("/nonexistent/visual-search.toml"))).unwrap();
        assert_eq!(configuration.search.max_results, 4);
    }
}
