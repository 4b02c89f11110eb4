//! SFTP browse data types

use serde::{Deserialize, Serialize};

use crate::ssh::error::{status, BridgeError};

/// `SSH_FILEXFER_ATTR_SIZE`
pub const ATTR_SIZE: u64 = 0x0000_0001;
/// `SSH_FILEXFER_ATTR_UIDGID`
pub const ATTR_UIDGID: u64 = 0x0000_0002;
/// `SSH_FILEXFER_ATTR_PERMISSIONS`
pub const ATTR_PERMISSIONS: u64 = 0x0000_0004;
/// `SSH_FILEXFER_ATTR_ACMODTIME`
pub const ATTR_ACMODTIME: u64 = 0x0000_0008;

/// File type mask and directory type of POSIX mode bits
pub const MODE_TYPE_MASK: u64 = 0o170_000;
pub const MODE_DIRECTORY: u64 = 0o040_000;

/// Directory kept in a listing
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DirectoryEntry {
    /// Entry name (never empty, never "." or "..")
    pub name: String,
    /// Always true for listed entries
    pub is_directory: bool,
    /// Size in bytes, when the server reported one
    pub size: Option<u64>,
    /// Modification time (Unix timestamp), when the server reported one
    pub modified_at: Option<i64>,
}

/// Outcome envelope of a listing
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ListResult {
    /// 0 on success, negative status code on failure
    pub status_code: i32,
    /// Wall time of the whole operation
    pub latency_ms: u64,
    /// Canonical path, or the requested path when it could not be resolved
    pub resolved_path: Option<String>,
    pub entries: Vec<DirectoryEntry>,
    /// Set whenever `status_code` is non-zero
    pub error_message: Option<String>,
}

impl ListResult {
    pub fn success(resolved_path: String, entries: Vec<DirectoryEntry>, latency_ms: u64) -> Self {
        Self {
            status_code: status::SUCCESS,
            latency_ms,
            resolved_path: Some(resolved_path),
            entries,
            error_message: None,
        }
    }

    /// Failed listing; carries no entries
    pub fn failure(error: &BridgeError, resolved_path: Option<String>, latency_ms: u64) -> Self {
        let message = error.to_string();
        Self {
            status_code: error.status_code(),
            latency_ms,
            resolved_path,
            entries: Vec::new(),
            error_message: Some(if message.is_empty() {
                "Unknown libssh2 browse error.".to_string()
            } else {
                message
            }),
        }
    }

    pub fn is_success(&self) -> bool {
        self.status_code == status::SUCCESS
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_failure_always_has_message() {
        let result = ListResult::failure(&BridgeError::Unknown(String::new()), None, 3);
        assert_eq!(result.status_code, status::UNKNOWN_BROWSE_ERROR);
        assert_eq!(result.error_message.as_deref(), Some("Unknown libssh2 browse error."));
        assert!(result.entries.is_empty());
        assert!(!result.is_success());
    }

    #[test]
    fn test_optional_fields_serialize_as_null() {
        let entry = DirectoryEntry {
            name: "projects".into(),
            is_directory: true,
            size: Some(0),
            modified_at: None,
        };
        let json = serde_json::to_value(&entry).unwrap();
        assert_eq!(json["size"], 0);
        assert!(json["modified_at"].is_null());
    }
}
