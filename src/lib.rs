//! sftp-browse - deadline-bounded SSH/SFTP directory browsing
//!
//! Drives a non-blocking SSH transport through connect, authenticate,
//! enumerate, health-check and teardown, never blocking the calling thread
//! longer than the caller's budget.

#[cfg(not(unix))]
compile_error!("sftp-browse relies on POSIX sockets and poll(2)");

pub mod commands;
pub mod config;
pub mod session;
pub mod sftp;
pub mod ssh;

pub use commands::{
    bridge_version, classify_directory_entry, close_session, list_directories,
    list_directories_oneshot, open_session, ping_session, BrowseBridge, BRIDGE_VERSION,
};
pub use config::{BridgeSettings, SettingsStorage};
pub use sftp::{DirectoryEntry, ListResult};
pub use ssh::{status, BridgeError, BrowseSession, SessionRequest, SessionState};

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Install the tracing subscriber (`RUST_LOG`, default `info`).
///
/// Safe to call repeatedly; only the first call installs anything.
pub fn init_tracing() {
    let installed = tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(tracing_subscriber::fmt::layer())
        .try_init()
        .is_ok();
    if installed {
        tracing::debug!("sftp-browse bridge v{} logging initialized", BRIDGE_VERSION);
    }
}
