//! Settings Storage
//!
//! Reads and writes bridge settings as JSON.
//! Location: `<platform config dir>/sftp-browse/settings.json`

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use super::types::{BridgeSettings, SETTINGS_VERSION};

/// Settings storage errors
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("Failed to determine config directory")]
    NoConfigDir,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Settings version {found} is newer than supported {supported}")]
    VersionTooNew { found: u32, supported: u32 },
}

/// Get the sftp-browse configuration directory
pub fn config_dir() -> Result<PathBuf, StorageError> {
    dirs::config_dir()
        .map(|dir| dir.join("sftp-browse"))
        .ok_or(StorageError::NoConfigDir)
}

/// Get the settings file path
pub fn settings_file() -> Result<PathBuf, StorageError> {
    Ok(config_dir()?.join("settings.json"))
}

/// Settings storage manager
pub struct SettingsStorage {
    path: PathBuf,
}

impl SettingsStorage {
    /// Create a storage manager with the default path
    pub fn new() -> Result<Self, StorageError> {
        Ok(Self {
            path: settings_file()?,
        })
    }

    /// Create storage manager with custom path (for testing)
    pub fn with_path(path: PathBuf) -> Self {
        Self { path }
    }

    /// Load settings from disk
    /// Returns defaults if the file doesn't exist or is corrupted
    pub fn load(&self) -> Result<BridgeSettings, StorageError> {
        match fs::read_to_string(&self.path) {
            Ok(contents) => match serde_json::from_str::<BridgeSettings>(&contents) {
                Ok(settings) => {
                    if settings.version > SETTINGS_VERSION {
                        return Err(StorageError::VersionTooNew {
                            found: settings.version,
                            supported: SETTINGS_VERSION,
                        });
                    }
                    Ok(settings)
                }
                Err(e) => {
                    tracing::warn!("Settings file {:?} corrupted, using defaults: {}", self.path, e);
                    Ok(BridgeSettings::default())
                }
            },
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(BridgeSettings::default()),
            Err(e) => Err(StorageError::Io(e)),
        }
    }

    /// Save settings to disk
    pub fn save(&self, settings: &BridgeSettings) -> Result<(), StorageError> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }

        // Write to temp file first, then rename (atomic write)
        let temp_path = self.path.with_extension("json.tmp");
        let json = serde_json::to_string_pretty(settings)?;

        let mut file = fs::File::create(&temp_path)?;
        file.write_all(json.as_bytes())?;
        file.sync_all()?;

        fs::rename(&temp_path, &self.path)?;
        tracing::debug!("Settings saved to {:?}", self.path);

        Ok(())
    }

    /// Get settings file path
    pub fn path(&self) -> &Path {
        &self.path
    }
}
