//! SFTP browsing module
//!
//! Directory enumeration filtered to directories, entry classification
//! across server dialects, and keepalive probing over an open session.

pub mod classify;
pub mod keepalive;
pub mod lister;
pub mod path_utils;
pub mod types;

pub use classify::classify_directory_entry;
pub use keepalive::ping_session;
pub use lister::list_directories;
pub use types::*;
