//! Session management
//!
//! Opaque-handle registry over open browse sessions.

pub mod registry;

pub use registry::{RegistryError, SessionRegistry, SessionSlot, DEFAULT_MAX_SESSIONS};
