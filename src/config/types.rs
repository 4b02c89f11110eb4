//! Bridge settings

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Current settings file version
pub const SETTINGS_VERSION: u32 = 1;

/// Tunables shared by every browse session
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BridgeSettings {
    /// Settings file version
    #[serde(default = "default_version")]
    pub version: u32,

    /// Grace window for graceful SFTP shutdown and SSH disconnect on close, in milliseconds
    #[serde(default = "default_close_grace_ms")]
    pub close_grace_ms: u64,

    /// Description sent with the SSH disconnect message
    #[serde(default = "default_disconnect_description")]
    pub disconnect_description: String,

    /// Enable SO_KEEPALIVE on session sockets
    #[serde(default = "default_true")]
    pub tcp_keepalive: bool,

    /// Maximum concurrently open sessions in a bridge
    #[serde(default = "default_max_sessions")]
    pub max_sessions: usize,
}

fn default_version() -> u32 {
    SETTINGS_VERSION
}

fn default_close_grace_ms() -> u64 {
    1000
}

fn default_disconnect_description() -> String {
    "sftp-browse".to_string()
}

fn default_true() -> bool {
    true
}

fn default_max_sessions() -> usize {
    20
}

impl Default for BridgeSettings {
    fn default() -> Self {
        Self {
            version: SETTINGS_VERSION,
            close_grace_ms: default_close_grace_ms(),
            disconnect_description: default_disconnect_description(),
            tcp_keepalive: true,
            max_sessions: default_max_sessions(),
        }
    }
}

impl BridgeSettings {
    pub fn close_grace(&self) -> Duration {
        Duration::from_millis(self.close_grace_ms)
    }
}
