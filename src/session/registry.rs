//! Session Registry
//!
//! Thread-safe store of open browse sessions, addressed by opaque ids.
//! Each session sits behind its own mutex, which serialises operations on
//! it; a duplicate of its socket lets `close` wake an operation that is
//! parked in a readiness wait.

use std::net::{Shutdown, TcpStream};
use std::sync::Arc;

use dashmap::DashMap;
use parking_lot::{Mutex, MutexGuard};
use tracing::{debug, info, warn};

use crate::ssh::error::BridgeError;
use crate::ssh::libssh2::Ssh2Transport;
use crate::ssh::session::BrowseSession;
use crate::ssh::transport::Transport;

/// Default maximum concurrent sessions
pub const DEFAULT_MAX_SESSIONS: usize = 20;

/// Registry errors
#[derive(Debug, thiserror::Error)]
pub enum RegistryError {
    #[error("Connection limit reached: {current}/{max} sessions open")]
    ConnectionLimitReached { current: usize, max: usize },
}

impl From<RegistryError> for BridgeError {
    fn from(e: RegistryError) -> Self {
        BridgeError::InvalidRequest(e.to_string())
    }
}

/// One registered session
pub struct SessionSlot<T: Transport> {
    session: Mutex<BrowseSession<T>>,
    interrupt: Option<TcpStream>,
}

impl<T: Transport> SessionSlot<T> {
    fn new(session: BrowseSession<T>) -> Self {
        let interrupt = match session.interrupter() {
            Ok(socket) => Some(socket),
            Err(e) => {
                warn!("No interrupt handle for session: {}", e);
                None
            }
        };
        Self {
            session: Mutex::new(session),
            interrupt,
        }
    }

    /// Exclusive access to the session for one operation
    pub fn lock(&self) -> MutexGuard<'_, BrowseSession<T>> {
        self.session.lock()
    }

    /// Shut the socket down in both directions, waking any pending wait
    pub fn interrupt(&self) {
        if let Some(socket) = &self.interrupt {
            if let Err(e) = socket.shutdown(Shutdown::Both) {
                debug!("Interrupt shutdown: {}", e);
            }
        }
    }
}

/// Registry of open browse sessions
pub struct SessionRegistry<T: Transport = Ssh2Transport> {
    /// Map of session ID to session slot
    sessions: DashMap<String, Arc<SessionSlot<T>>>,
    /// Maximum allowed concurrent sessions
    max_sessions: usize,
    /// Lock for register to prevent TOCTOU race
    create_lock: Mutex<()>,
}

impl<T: Transport> Default for SessionRegistry<T> {
    fn default() -> Self {
        Self::with_max_sessions(DEFAULT_MAX_SESSIONS)
    }
}

impl<T: Transport> SessionRegistry<T> {
    pub fn with_max_sessions(max: usize) -> Self {
        Self {
            sessions: DashMap::new(),
            max_sessions: max,
            create_lock: Mutex::new(()),
        }
    }

    pub fn max_sessions(&self) -> usize {
        self.max_sessions
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }

    pub fn contains(&self, session_id: &str) -> bool {
        self.sessions.contains_key(session_id)
    }

    /// Fail fast when no slot is free
    pub fn ensure_capacity(&self) -> Result<(), RegistryError> {
        let current = self.len();
        let max = self.max_sessions();
        if current >= max {
            return Err(RegistryError::ConnectionLimitReached { current, max });
        }
        Ok(())
    }

    /// Register an open session and return its id.
    ///
    /// On a full registry the session is closed and handed back as an error.
    pub fn register(&self, mut session: BrowseSession<T>) -> Result<String, RegistryError> {
        let _guard = self.create_lock.lock();

        if let Err(e) = self.ensure_capacity() {
            session.close();
            return Err(e);
        }

        let session_id = uuid::Uuid::new_v4().to_string();
        self.sessions
            .insert(session_id.clone(), Arc::new(SessionSlot::new(session)));
        info!("Registered browse session {} ({} open)", session_id, self.len());

        Ok(session_id)
    }

    pub fn get(&self, session_id: &str) -> Option<Arc<SessionSlot<T>>> {
        self.sessions.get(session_id).map(|entry| Arc::clone(entry.value()))
    }

    /// Remove and close a session. Unknown ids are ignored.
    pub fn close(&self, session_id: &str) -> bool {
        let Some((_, slot)) = self.sessions.remove(session_id) else {
            debug!("Close requested for unknown session {}", session_id);
            return false;
        };

        slot.interrupt();
        slot.lock().close();
        info!("Closed browse session {}", session_id);
        true
    }

    /// Close every registered session
    pub fn close_all(&self) {
        let ids: Vec<String> = self.sessions.iter().map(|entry| entry.key().clone()).collect();
        for id in ids {
            self.close(&id);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::BridgeSettings;
    use crate::ssh::error::status;
    use crate::ssh::session::SessionState;
    use crate::ssh::testing::{password_request, silent_server, ScriptedTransport};

    fn open(listener_port: i32, transport: ScriptedTransport) -> BrowseSession<ScriptedTransport> {
        BrowseSession::open_with(
            &password_request(listener_port, 2),
            &BridgeSettings::default(),
            move |_| Ok(transport),
        )
        .unwrap()
    }

    #[test]
    fn test_register_and_close() {
        let (_listener, port) = silent_server();
        let registry: SessionRegistry<ScriptedTransport> = SessionRegistry::default();
        let transport = ScriptedTransport::new();
        let journal = transport.journal();

        let id = registry.register(open(port, transport)).unwrap();
        assert!(registry.contains(&id));
        assert_eq!(registry.get(&id).unwrap().lock().state(), SessionState::Ready);

        assert!(registry.close(&id));
        assert!(!registry.contains(&id));
        assert_eq!(journal.calls("disconnect"), 1);
    }

    #[test]
    fn test_close_unknown_or_twice_is_noop() {
        let (_listener, port) = silent_server();
        let registry: SessionRegistry<ScriptedTransport> = SessionRegistry::default();
        assert!(!registry.close("no-such-session"));

        let id = registry.register(open(port, ScriptedTransport::new())).unwrap();
        assert!(registry.close(&id));
        assert!(!registry.close(&id));
        assert!(registry.is_empty());
    }

    #[test]
    fn test_limit_rejects_and_closes_session() {
        let (_listener, port) = silent_server();
        let registry: SessionRegistry<ScriptedTransport> = SessionRegistry::with_max_sessions(1);
        registry.register(open(port, ScriptedTransport::new())).unwrap();

        let transport = ScriptedTransport::new();
        let journal = transport.journal();
        let err = registry.register(open(port, transport)).unwrap_err();
        assert!(matches!(err, RegistryError::ConnectionLimitReached { current: 1, max: 1 }));
        assert_eq!(journal.calls("disconnect"), 1);

        let bridge_err: BridgeError = err.into();
        assert_eq!(bridge_err.status_code(), status::INVALID_REQUEST);
    }

    #[test]
    fn test_ids_are_unique() {
        let (_listener, port) = silent_server();
        let registry: SessionRegistry<ScriptedTransport> = SessionRegistry::default();
        let a = registry.register(open(port, ScriptedTransport::new())).unwrap();
        let b = registry.register(open(port, ScriptedTransport::new())).unwrap();
        assert_ne!(a, b);
        assert_eq!(registry.len(), 2);

        registry.close_all();
        assert!(registry.is_empty());
    }
}
