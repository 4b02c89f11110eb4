//! SSH module - deadline-bounded session establishment
//!
//! Every transport primitive is non-blocking and driven through one
//! retry-until-ready loop, so no call blocks past the caller's budget.
//!
//! # Features
//! - Non-blocking TCP connect with keepalive and per-socket timeouts
//! - Password auth with keyboard-interactive fallback, or public-key auth
//! - Ordered teardown on failure and on close

pub mod config;
pub mod connector;
pub mod deadline;
pub mod error;
pub mod keyboard_interactive;
pub mod libssh2;
pub mod readiness;
pub mod retry;
pub mod session;
pub mod transport;

#[cfg(test)]
pub(crate) mod testing;

pub use config::{Credentials, SessionRequest};
pub use deadline::Deadline;
pub use error::{status, BridgeError, NativeError, Stage};
pub use libssh2::{init_library, Ssh2Transport};
pub use readiness::BlockDirections;
pub use retry::{run_until_ready, RetryError};
pub use session::{BrowseSession, SessionState};
pub use transport::{RawEntry, Transport, TransportError};
