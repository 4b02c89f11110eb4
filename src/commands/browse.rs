//! Browse commands
//!
//! Boundary operations for the host application. Every operation takes an
//! explicit timeout in whole seconds and reports a status code where `0`
//! means success.

use std::net::TcpStream;
use std::time::Instant;

use tracing::{debug, info};

use crate::config::{BridgeSettings, SettingsStorage, StorageError};
use crate::session::registry::SessionRegistry;
use crate::sftp::types::ListResult;
use crate::sftp::{keepalive, lister};
use crate::ssh::config::SessionRequest;
use crate::ssh::deadline::elapsed_ms;
use crate::ssh::error::{BridgeError, NativeError};
use crate::ssh::libssh2::Ssh2Transport;
use crate::ssh::session::BrowseSession;
use crate::ssh::transport::Transport;

pub use crate::sftp::classify::classify_directory_entry;

/// Bridge interface revision, bumped on incompatible boundary changes
pub const BRIDGE_VERSION: i32 = 2;

pub fn bridge_version() -> i32 {
    BRIDGE_VERSION
}

/// Open a session over libssh2
pub fn open_session(
    request: &SessionRequest,
    settings: &BridgeSettings,
) -> Result<BrowseSession, BridgeError> {
    BrowseSession::open(request, settings)
}

/// List directories under `remote_path` on an open session
pub fn list_directories<T: Transport>(
    session: &mut BrowseSession<T>,
    remote_path: &str,
    timeout_secs: i32,
) -> ListResult {
    lister::list_directories(session, remote_path, timeout_secs)
}

/// Check an open session with a stat of `remote_path`
pub fn ping_session<T: Transport>(
    session: &mut BrowseSession<T>,
    remote_path: &str,
    timeout_secs: i32,
) -> Result<(), BridgeError> {
    keepalive::ping_session(session, remote_path, timeout_secs)
}

/// Close a session; `None` and already-closed sessions are ignored
pub fn close_session<T: Transport>(session: Option<&mut BrowseSession<T>>) {
    if let Some(session) = session {
        session.close();
    }
}

/// Open, list and close in one call over libssh2
pub fn list_directories_oneshot(
    request: &SessionRequest,
    remote_path: &str,
    settings: &BridgeSettings,
) -> ListResult {
    list_directories_oneshot_with(request, remote_path, settings, Ssh2Transport::attach)
}

/// One-shot listing with a caller-supplied transport.
///
/// The session is always closed, and the latency spans open, list and close.
pub fn list_directories_oneshot_with<T, A>(
    request: &SessionRequest,
    remote_path: &str,
    settings: &BridgeSettings,
    attach: A,
) -> ListResult
where
    T: Transport,
    A: FnOnce(&TcpStream) -> Result<T, NativeError>,
{
    let start = Instant::now();

    if remote_path.is_empty() {
        let err = BridgeError::InvalidRequest("Invalid one-shot browse request.".to_string());
        return ListResult::failure(&err, None, elapsed_ms(start));
    }
    if let Err(e) = request.validate() {
        return ListResult::failure(&e, None, elapsed_ms(start));
    }

    let mut session = match BrowseSession::open_with(request, settings, attach) {
        Ok(session) => session,
        Err(e) => {
            debug!("One-shot open failed: {}", e);
            return ListResult::failure(&e, None, elapsed_ms(start));
        }
    };

    let mut result = lister::list_directories(&mut session, remote_path, request.timeout_secs);
    session.close();
    result.latency_ms = elapsed_ms(start);

    info!(
        "One-shot listing of {} on {} finished with status {} in {}ms",
        remote_path, request.host, result.status_code, result.latency_ms
    );
    result
}

type AttachFn<T> = dyn Fn(&TcpStream) -> Result<T, NativeError> + Send + Sync;

/// Handle-based bridge: sessions are addressed by opaque ids
pub struct BrowseBridge<T: Transport = Ssh2Transport> {
    settings: BridgeSettings,
    registry: SessionRegistry<T>,
    attach: Box<AttachFn<T>>,
}

impl BrowseBridge<Ssh2Transport> {
    pub fn new(settings: BridgeSettings) -> Self {
        Self::with_transport(settings, Ssh2Transport::attach)
    }

    /// Bridge configured from persisted settings, defaults when none are saved
    pub fn from_storage(storage: &SettingsStorage) -> Result<Self, StorageError> {
        let settings = storage.load()?;
        info!(
            "Bridge settings loaded from {:?} (max {} sessions)",
            storage.path(),
            settings.max_sessions
        );
        Ok(Self::new(settings))
    }
}

impl<T: Transport> BrowseBridge<T> {
    pub fn with_transport<A>(settings: BridgeSettings, attach: A) -> Self
    where
        A: Fn(&TcpStream) -> Result<T, NativeError> + Send + Sync + 'static,
    {
        let registry = SessionRegistry::with_max_sessions(settings.max_sessions);
        Self {
            settings,
            registry,
            attach: Box::new(attach),
        }
    }

    pub fn settings(&self) -> &BridgeSettings {
        &self.settings
    }

    pub fn session_count(&self) -> usize {
        self.registry.len()
    }

    /// Open a session and return its id
    pub fn open_session(&self, request: &SessionRequest) -> Result<String, BridgeError> {
        self.registry.ensure_capacity()?;
        let session = BrowseSession::open_with(request, &self.settings, |socket| (self.attach)(socket))?;
        Ok(self.registry.register(session)?)
    }

    pub fn list_directories(&self, session_id: &str, remote_path: &str, timeout_secs: i32) -> ListResult {
        let start = Instant::now();
        match self.registry.get(session_id) {
            Some(slot) => {
                let mut session = slot.lock();
                lister::list_directories(&mut *session, remote_path, timeout_secs)
            }
            None => ListResult::failure(&unknown_session(session_id), None, elapsed_ms(start)),
        }
    }

    pub fn ping_session(&self, session_id: &str, remote_path: &str, timeout_secs: i32) -> Result<(), BridgeError> {
        let slot = self
            .registry
            .get(session_id)
            .ok_or_else(|| unknown_session(session_id))?;
        let mut session = slot.lock();
        keepalive::ping_session(&mut *session, remote_path, timeout_secs)
    }

    /// Close a session by id; unknown ids are ignored
    pub fn close_session(&self, session_id: &str) {
        self.registry.close(session_id);
    }

    pub fn close_all(&self) {
        self.registry.close_all();
    }
}

fn unknown_session(session_id: &str) -> BridgeError {
    BridgeError::InvalidSession(format!("Unknown browse session {}.", session_id))
}
