//! Bridge error types
//!
//! Every failure surfaced to the host application carries a negative status
//! code from a closed set of bands (one band per stage) plus a diagnostic
//! string. `0` is reserved for success.

use std::fmt;

use thiserror::Error;

/// Status codes returned across the bridge boundary
pub mod status {
    pub const SUCCESS: i32 = 0;

    pub const INVALID_REQUEST: i32 = -10;
    pub const MISSING_CREDENTIALS: i32 = -11;
    pub const INVALID_SESSION: i32 = -12;

    pub const CONNECT_FAILED: i32 = -20;
    pub const SOCKET_TIMEOUT_CONFIG: i32 = -21;
    pub const CONNECT_TIMEOUT: i32 = -22;
    pub const TRANSPORT_INIT_FAILED: i32 = -23;

    pub const HANDSHAKE_FAILED: i32 = -30;
    pub const HANDSHAKE_TIMEOUT: i32 = -31;

    pub const PASSWORD_AUTH_FAILED: i32 = -40;
    pub const PASSWORD_AUTH_TIMEOUT: i32 = -41;
    pub const KEYBOARD_INTERACTIVE_FAILED: i32 = -42;
    pub const KEYBOARD_INTERACTIVE_TIMEOUT: i32 = -43;
    pub const PUBLIC_KEY_AUTH_FAILED: i32 = -44;
    pub const PUBLIC_KEY_AUTH_TIMEOUT: i32 = -45;

    pub const SUBSYSTEM_INIT_FAILED: i32 = -50;
    pub const SUBSYSTEM_INIT_TIMEOUT: i32 = -51;

    pub const RESOLVE_PATH_FAILED: i32 = -60;
    pub const RESOLVE_PATH_TIMEOUT: i32 = -61;

    pub const OPEN_DIRECTORY_FAILED: i32 = -70;
    pub const OPEN_DIRECTORY_TIMEOUT: i32 = -71;

    pub const READ_DIRECTORY_FAILED: i32 = -80;
    pub const READ_DIRECTORY_TIMEOUT: i32 = -81;

    pub const ENTRY_STORAGE_FAILED: i32 = -90;

    pub const KEEPALIVE_FAILED: i32 = -100;
    pub const KEEPALIVE_TIMEOUT: i32 = -101;

    pub const UNKNOWN_BROWSE_ERROR: i32 = -110;
}

/// Protocol step a failure is attributed to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Connect,
    TransportInit,
    Handshake,
    PasswordAuth,
    KeyboardInteractiveAuth,
    PublicKeyAuth,
    SubsystemInit,
    ResolvePath,
    OpenDirectory,
    ReadDirectory,
    Keepalive,
}

impl Stage {
    /// Status code reported for a hard (non-timeout) failure in this stage
    pub fn failure_code(self) -> i32 {
        match self {
            Stage::Connect => status::CONNECT_FAILED,
            Stage::TransportInit => status::TRANSPORT_INIT_FAILED,
            Stage::Handshake => status::HANDSHAKE_FAILED,
            Stage::PasswordAuth => status::PASSWORD_AUTH_FAILED,
            Stage::KeyboardInteractiveAuth => status::KEYBOARD_INTERACTIVE_FAILED,
            Stage::PublicKeyAuth => status::PUBLIC_KEY_AUTH_FAILED,
            Stage::SubsystemInit => status::SUBSYSTEM_INIT_FAILED,
            Stage::ResolvePath => status::RESOLVE_PATH_FAILED,
            Stage::OpenDirectory => status::OPEN_DIRECTORY_FAILED,
            Stage::ReadDirectory => status::READ_DIRECTORY_FAILED,
            Stage::Keepalive => status::KEEPALIVE_FAILED,
        }
    }

    /// Status code reported when the deadline expires in this stage
    pub fn timeout_code(self) -> i32 {
        match self {
            Stage::Connect | Stage::TransportInit => status::CONNECT_TIMEOUT,
            Stage::Handshake => status::HANDSHAKE_TIMEOUT,
            Stage::PasswordAuth => status::PASSWORD_AUTH_TIMEOUT,
            Stage::KeyboardInteractiveAuth => status::KEYBOARD_INTERACTIVE_TIMEOUT,
            Stage::PublicKeyAuth => status::PUBLIC_KEY_AUTH_TIMEOUT,
            Stage::SubsystemInit => status::SUBSYSTEM_INIT_TIMEOUT,
            Stage::ResolvePath => status::RESOLVE_PATH_TIMEOUT,
            Stage::OpenDirectory => status::OPEN_DIRECTORY_TIMEOUT,
            Stage::ReadDirectory => status::READ_DIRECTORY_TIMEOUT,
            Stage::Keepalive => status::KEEPALIVE_TIMEOUT,
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Stage::Connect => "TCP connect",
            Stage::TransportInit => "SSH session initialization",
            Stage::Handshake => "SSH handshake",
            Stage::PasswordAuth => "password authentication",
            Stage::KeyboardInteractiveAuth => "keyboard-interactive authentication",
            Stage::PublicKeyAuth => "public-key authentication",
            Stage::SubsystemInit => "SFTP subsystem initialization",
            Stage::ResolvePath => "SFTP realpath",
            Stage::OpenDirectory => "SFTP opendir",
            Stage::ReadDirectory => "SFTP readdir",
            Stage::Keepalive => "SFTP stat",
        };
        f.write_str(name)
    }
}

/// Error reported by the underlying transport library
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NativeError {
    /// Library that produced the error (e.g. "libssh2")
    pub origin: &'static str,
    /// Library-specific error code
    pub code: i32,
    /// Library-provided error text
    pub message: String,
}

impl NativeError {
    pub fn new(origin: &'static str, code: i32, message: impl Into<String>) -> Self {
        Self {
            origin,
            code,
            message: message.into(),
        }
    }
}

impl fmt::Display for NativeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} error {}: {}", self.origin, self.code, self.message)
    }
}

impl std::error::Error for NativeError {}

#[derive(Error, Debug)]
pub enum BridgeError {
    #[error("{0}")]
    InvalidRequest(String),

    #[error("No authentication material provided.")]
    MissingCredentials,

    #[error("{0}")]
    InvalidSession(String),

    #[error("Failed to configure socket send/receive timeouts.")]
    SocketTimeoutConfig,

    #[error("Could not connect to remote host: {0}")]
    ConnectionFailed(String),

    #[error("Timed out during {stage} after {budget_secs} second(s).")]
    Timeout { stage: Stage, budget_secs: i32 },

    /// Hard failure in a protocol stage; `detail` already carries the native diagnostic
    #[error("{detail}")]
    StageFailed { stage: Stage, detail: String },

    #[error("Failed to store SFTP directory entry: {0}")]
    EntryStorage(String),

    #[error("{0}")]
    Unknown(String),
}

impl BridgeError {
    /// Build a stage failure, prefixing the native diagnostic when one exists
    pub fn stage_failed(stage: Stage, native: Option<&NativeError>, summary: &str) -> Self {
        let detail = match native {
            Some(native) if !native.message.is_empty() => format!("{}: {}", native, summary),
            _ => summary.to_string(),
        };
        BridgeError::StageFailed { stage, detail }
    }

    /// Negative status code for this error
    pub fn status_code(&self) -> i32 {
        match self {
            BridgeError::InvalidRequest(_) => status::INVALID_REQUEST,
            BridgeError::MissingCredentials => status::MISSING_CREDENTIALS,
            BridgeError::InvalidSession(_) => status::INVALID_SESSION,
            BridgeError::SocketTimeoutConfig => status::SOCKET_TIMEOUT_CONFIG,
            BridgeError::ConnectionFailed(_) => status::CONNECT_FAILED,
            BridgeError::Timeout { stage, .. } => stage.timeout_code(),
            BridgeError::StageFailed { stage, .. } => stage.failure_code(),
            BridgeError::EntryStorage(_) => status::ENTRY_STORAGE_FAILED,
            BridgeError::Unknown(_) => status::UNKNOWN_BROWSE_ERROR,
        }
    }

    /// Whether this error came from an expired deadline
    pub fn is_timeout(&self) -> bool {
        matches!(self, BridgeError::Timeout { .. })
    }
}

// Serialized as the diagnostic string for the host application
impl serde::Serialize for BridgeError {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(&self.to_string())
    }
}
