use parking_lot::Mutex;
use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};

use crate::error::ConfigError;

pub const PREVIEW_SIZE_KEY: &str = "rear_camera_preview_size";
pub const PICTURE_SIZE_KEY: &str = "rear_camera_picture_size";

/// Small persisted key-value store, used to remember the chosen camera sizes between sessions.
pub trait PreferenceStore: Send + Sync {
    fn get(&self, key: &str) -> Option<String>;
    fn put(&self, key: &str, value: &str) -> Result<(), ConfigError>;
}

#[derive(Default)]
pub struct MemoryPreferences {
    values: Mutex<HashMap<String, String>>,
}

impl PreferenceStore for MemoryPreferences {
    fn get(&self, key: &str) -> Option<String> {
        self.values.lock().get(key).cloned()
    }

    fn put(&self, key: &str, value: &str) -> Result<(), ConfigError> {
        self.values.lock().insert(key.to_string(), value.to_string());
        Ok(())
    }
}

/// Preferences kept as a flat JSON object on disk, rewritten on every change.
pub struct JsonFilePreferences {
    path: PathBuf,
    values: Mutex<BTreeMap<String, String>>,
}

impl JsonFilePreferences {
    pub fn open(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref().to_path_buf();
        let values = match std::fs::read(&path) {
            Ok(contents) => serde_json::from_slice(&contents).map_err(|e| {
                ConfigError::Preferences(format!("{}: {}", path.display(), e))
            })?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => BTreeMap::new(),
            Err(e) => {
                return Err(ConfigError::Preferences(format!(
                    "{}: {}",
                    path.display(),
                    e
                )));
            }
        };
        Ok(Self {
            path,
            values: Mutex::new(values),
        })
    }
}

impl PreferenceStore for JsonFilePreferences {
    fn get(&self, key: &str) -> Option<String> {
        self.values.lock().get(key).cloned()
    }

    fn put(&self, key: &str, value: &str) -> Result<(), ConfigError> {
        let mut values = self.values.lock();
        values.insert(key.to_string(), value.to_string());
        let contents = serde_json::to_vec_pretty(&*values)
            .map_err(|e| ConfigError::Preferences(e.to_string()))?;
        std::fs::write(&self.path, contents)
            .map_err(|e| ConfigError::Preferences(format!("{}: {}", self.path.display(), e)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn memory_preferences_store_values() {
        let preferences = MemoryPreferences::default();
        assert_eq!(preferences.get(PREVIEW_SIZE_KEY), None);
        preferences.put(PREVIEW_SIZE_KEY, "640x480").unwrap();
        assert_eq!(preferences.get(PREVIEW_SIZE_KEY).as_deref(), Some("640x480"));
    }

    #[test]
    fn file_preferences_survive_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("preferences.json");

        let preferences = JsonFilePreferences::open(&path).unwrap();
        preferences.put(PREVIEW_SIZE_KEY, "1280x720").unwrap();
        preferences.put(PICTURE_SIZE_KEY, "1920x1080").unwrap();
        drop(preferences);

        let reopened = JsonFilePreferences::open(&path).unwrap();
        assert_eq!(reopened.get(PREVIEW_SIZE_KEY).as_deref(), Some("1280x720"));
        assert_eq!(reopened.get(PICTURE_SIZE_KEY).as_deref(), Some("1920x1080"));
    }

    #[test]
    fn corrupt_file_is_reported() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("preferences.json");
        std::fs::write(&path, b"not json").unwrap();
        assert!(matches!(
            JsonFilePreferences::open(&path),
            Err(ConfigError::Preferences(_))
        ));
    }
}
