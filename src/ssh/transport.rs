//! SSH/SFTP transport capability
//!
//! The wire protocol lives outside this crate. A [`Transport`] exposes the
//! non-blocking primitives the session needs; each may report
//! [`TransportError::WouldBlock`] and is driven to completion by
//! [`run_until_ready`](super::retry::run_until_ready).

use std::path::Path;
use std::time::Duration;

use super::error::NativeError;
use super::readiness::BlockDirections;

/// Outcome of a non-blocking transport call that did not succeed
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportError {
    /// No progress was possible; retry once the socket is ready
    WouldBlock,
    /// Hard failure reported by the transport library
    Native(NativeError),
}

/// Directory entry as read from the wire, before classification
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RawEntry {
    pub name: String,
    /// SFTP attribute presence flags (`SSH_FILEXFER_ATTR_*`)
    pub flags: u64,
    pub permissions: u64,
    pub size: u64,
    pub mtime: u64,
    /// Human-readable `ls -l` style line, empty when the server sends none
    pub long_entry: String,
}

/// Non-blocking SSH transport with an SFTP subsystem
pub trait Transport {
    /// Open directory stream
    type Directory;

    /// Switch to non-blocking mode and apply the per-operation timeout
    fn prepare(&mut self, timeout: Duration);

    /// Direction(s) the last would-block call is waiting on
    fn block_directions(&self) -> BlockDirections;

    fn handshake(&mut self) -> Result<(), TransportError>;

    fn authenticate_password(&mut self, username: &str, password: &str) -> Result<(), TransportError>;

    /// Keyboard-interactive authentication answering every prompt with `secret`
    fn authenticate_keyboard_interactive(
        &mut self,
        username: &str,
        secret: &str,
    ) -> Result<(), TransportError>;

    fn authenticate_public_key(&mut self, username: &str, private_key: &Path) -> Result<(), TransportError>;

    fn init_subsystem(&mut self) -> Result<(), TransportError>;

    fn has_subsystem(&self) -> bool;

    /// Server-side canonical form of `path`
    fn real_path(&mut self, path: &str) -> Result<String, TransportError>;

    fn open_directory(&mut self, path: &str) -> Result<Self::Directory, TransportError>;

    /// Next entry, or `None` at end of stream
    fn read_directory(&mut self, dir: &mut Self::Directory) -> Result<Option<RawEntry>, TransportError>;

    /// Close `dir`. Resumable on `WouldBlock`; any other outcome retires the handle.
    fn close_directory(&mut self, dir: &mut Self::Directory) -> Result<(), TransportError>;

    fn stat(&mut self, path: &str) -> Result<(), TransportError>;

    /// Graceful SFTP teardown. Resumable on `WouldBlock`; the subsystem is
    /// released once it returns anything else.
    fn shutdown_subsystem(&mut self) -> Result<(), TransportError>;

    /// Graceful SSH disconnect
    fn disconnect(&mut self, description: &str) -> Result<(), TransportError>;
}
