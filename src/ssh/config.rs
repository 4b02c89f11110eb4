//! Session request configuration

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use super::error::BridgeError;

/// Request to open a browse session
#[derive(Clone, Serialize, Deserialize)]
pub struct SessionRequest {
    /// Remote host address
    pub host: String,

    /// SSH port (default: 22)
    #[serde(default = "default_port")]
    pub port: i32,

    /// Username for authentication
    pub username: String,

    /// Password; also answers keyboard-interactive prompts
    #[serde(default, skip_serializing)]
    pub password: Option<String>,

    /// Path to a private key file
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub private_key_path: Option<String>,

    /// Budget for the whole open sequence, in seconds
    #[serde(default = "default_timeout")]
    pub timeout_secs: i32,
}

impl std::fmt::Debug for SessionRequest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionRequest")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("username", &self.username)
            .field("password", &self.password.as_ref().map(|_| "<redacted>"))
            .field("private_key_path", &self.private_key_path)
            .field("timeout_secs", &self.timeout_secs)
            .finish()
    }
}

fn default_port() -> i32 {
    22
}

fn default_timeout() -> i32 {
    15
}

/// Authentication material selected from a request
#[derive(Clone, PartialEq, Eq)]
pub enum Credentials {
    /// Password, with keyboard-interactive fallback
    Password(String),
    PrivateKey(PathBuf),
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Credentials::Password(_) => f.write_str("Password(<redacted>)"),
            Credentials::PrivateKey(path) => f.debug_tuple("PrivateKey").field(path).finish(),
        }
    }
}

impl SessionRequest {
    pub fn new(host: impl Into<String>, port: i32, username: impl Into<String>, timeout_secs: i32) -> Self {
        Self {
            host: host.into(),
            port,
            username: username.into(),
            password: None,
            private_key_path: None,
            timeout_secs,
        }
    }

    pub fn with_password(mut self, password: impl Into<String>) -> Self {
        self.password = Some(password.into());
        self
    }

    pub fn with_private_key(mut self, path: impl Into<String>) -> Self {
        self.private_key_path = Some(path.into());
        self
    }

    /// Check preconditions before any I/O happens
    pub fn validate(&self) -> Result<(), BridgeError> {
        if self.host.trim().is_empty()
            || self.username.is_empty()
            || self.port <= 0
            || self.port > i32::from(u16::MAX)
            || self.timeout_secs <= 0
        {
            return Err(BridgeError::InvalidRequest(
                "Invalid browser session open request.".to_string(),
            ));
        }
        Ok(())
    }

    /// Port as a socket port; only meaningful after [`validate`](Self::validate)
    pub fn socket_port(&self) -> u16 {
        u16::try_from(self.port).unwrap_or(0)
    }

    /// Pick the authentication method. Empty strings count as absent; a password wins over a key.
    pub fn credentials(&self) -> Result<Credentials, BridgeError> {
        if let Some(password) = self.password.as_deref().filter(|p| !p.is_empty()) {
            return Ok(Credentials::Password(password.to_string()));
        }
        if let Some(path) = self.private_key_path.as_deref().filter(|p| !p.is_empty()) {
            return Ok(Credentials::PrivateKey(PathBuf::from(path)));
        }
        Err(BridgeError::MissingCredentials)
    }
}
