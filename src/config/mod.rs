//! Configuration Management Module
//!
//! Bridge-wide settings and their persistent JSON storage.

pub mod storage;
pub mod types;

pub use storage::{config_dir, settings_file, SettingsStorage, StorageError};
pub use types::{BridgeSettings, SETTINGS_VERSION};
