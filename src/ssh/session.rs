//! Browse session lifecycle
//!
//! A [`BrowseSession`] owns the socket, the SSH transport and its SFTP
//! subsystem. Opening either yields a fully `Ready` session or fails and
//! releases everything acquired so far; no half-built session escapes.
//!
//! ```text
//! Idle ─▶ Connecting ─▶ Handshaking ─▶ Authenticating ─▶ InitializingSubsystem ─▶ Ready
//!              │              │               │                     │               │
//!              └──────────────┴───────────────┴─────────────────────┴─▶ Failed      │
//!                                                                        │          │
//!                                                                        └─▶ Closed ◀┘
//! ```

use std::io;
use std::net::{Shutdown, TcpStream};
use std::time::Duration;

use tracing::{debug, info, warn};

use super::config::{Credentials, SessionRequest};
use super::connector::{connect_socket, ConnectOptions};
use super::deadline::Deadline;
use super::error::{BridgeError, NativeError, Stage};
use super::libssh2::Ssh2Transport;
use super::retry::run_until_ready;
use super::transport::{Transport, TransportError};
use crate::config::BridgeSettings;

/// Lifecycle state of a browse session
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Idle,
    Connecting,
    Handshaking,
    Authenticating,
    InitializingSubsystem,
    Ready,
    Failed,
    Closed,
}

/// Connected, authenticated SFTP session
pub struct BrowseSession<T: Transport = Ssh2Transport> {
    socket: Option<TcpStream>,
    transport: Option<T>,
    state: SessionState,
    close_grace: Duration,
    disconnect_description: String,
}

impl BrowseSession<Ssh2Transport> {
    /// Open a session over libssh2
    pub fn open(request: &SessionRequest, settings: &BridgeSettings) -> Result<Self, BridgeError> {
        Self::open_with(request, settings, Ssh2Transport::attach)
    }
}

impl<T: Transport> BrowseSession<T> {
    /// Open a session, binding the transport to the connected socket with `attach`.
    ///
    /// The whole sequence shares one deadline derived from `request.timeout_secs`.
    pub fn open_with<A>(
        request: &SessionRequest,
        settings: &BridgeSettings,
        attach: A,
    ) -> Result<Self, BridgeError>
    where
        A: FnOnce(&TcpStream) -> Result<T, NativeError>,
    {
        request.validate()?;
        let credentials = request.credentials()?;

        let mut session = Self {
            socket: None,
            transport: None,
            state: SessionState::Idle,
            close_grace: settings.close_grace(),
            disconnect_description: settings.disconnect_description.clone(),
        };

        let deadline = Deadline::from_timeout_secs(request.timeout_secs);
        match session.establish(request, &credentials, &deadline, settings.tcp_keepalive, attach) {
            Ok(()) => {
                session.state = SessionState::Ready;
                info!(
                    "Browse session ready for {}@{}:{}",
                    request.username, request.host, request.port
                );
                Ok(session)
            }
            Err(e) => {
                warn!(
                    "Browse session to {}:{} failed while {:?}: {}",
                    request.host, request.port, session.state, e
                );
                session.state = SessionState::Failed;
                session.release(false);
                Err(e)
            }
        }
    }

    fn establish<A>(
        &mut self,
        request: &SessionRequest,
        credentials: &Credentials,
        deadline: &Deadline,
        tcp_keepalive: bool,
        attach: A,
    ) -> Result<(), BridgeError>
    where
        A: FnOnce(&TcpStream) -> Result<T, NativeError>,
    {
        let budget = request.timeout_secs;

        self.state = SessionState::Connecting;
        let socket = connect_socket(
            &request.host,
            request.socket_port(),
            deadline,
            ConnectOptions {
                budget_secs: budget,
                tcp_keepalive,
            },
        )?;
        let socket: &TcpStream = self.socket.insert(socket);

        let mut transport = attach(socket).map_err(|e| {
            BridgeError::stage_failed(Stage::TransportInit, Some(&e), "Failed to initialize libssh2 session.")
        })?;
        transport.prepare(Duration::from_secs(u64::try_from(budget).unwrap_or(0)));
        let transport = self.transport.insert(transport);

        self.state = SessionState::Handshaking;
        run_until_ready(transport, socket, deadline, |t| t.handshake())
            .map_err(|e| e.into_bridge(Stage::Handshake, budget, "SSH handshake failed."))?;
        debug!("SSH handshake completed");

        self.state = SessionState::Authenticating;
        authenticate(transport, socket, deadline, budget, &request.username, credentials)?;

        self.state = SessionState::InitializingSubsystem;
        run_until_ready(transport, socket, deadline, |t| t.init_subsystem()).map_err(|e| {
            e.into_bridge(Stage::SubsystemInit, budget, "Unable to initialize SFTP subsystem.")
        })?;
        debug!("SFTP subsystem initialized");

        Ok(())
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn is_ready(&self) -> bool {
        self.state == SessionState::Ready
    }

    /// Transport and socket of a ready session
    pub(crate) fn parts(&mut self) -> Result<(&mut T, &TcpStream), BridgeError> {
        match (self.state, self.transport.as_mut(), self.socket.as_ref()) {
            (SessionState::Ready, Some(transport), Some(socket)) if transport.has_subsystem() => {
                Ok((transport, socket))
            }
            _ => Err(BridgeError::InvalidSession(
                "Invalid libssh2 browse session state.".to_string(),
            )),
        }
    }

    /// Duplicate of the session socket; shutting it down wakes any pending readiness wait
    pub fn interrupter(&self) -> io::Result<TcpStream> {
        match &self.socket {
            Some(socket) => socket.try_clone(),
            None => Err(io::Error::new(io::ErrorKind::NotConnected, "session socket released")),
        }
    }

    /// Close the session. Safe to call any number of times.
    pub fn close(&mut self) {
        if self.state == SessionState::Closed {
            return;
        }

        if let Some(socket) = &self.socket {
            if let Err(e) = socket.shutdown(Shutdown::Both) {
                debug!("Socket shutdown before close: {}", e);
            }
        }
        self.release(true);
        self.state = SessionState::Closed;
        info!("Browse session closed");
    }

    /// Release subsystem, transport and socket in that order.
    ///
    /// With `graceful`, the SFTP shutdown and the SSH disconnect each get
    /// their own close grace window to wait for the peer; otherwise each
    /// step gets a single non-blocking attempt.
    fn release(&mut self, graceful: bool) {
        if let Some(mut transport) = self.transport.take() {
            transport.prepare(self.close_grace);
            let window = if graceful { self.close_grace } else { Duration::ZERO };

            if transport.has_subsystem() {
                let grace = Deadline::after(window);
                if let Err(e) = teardown_step(&mut transport, self.socket.as_ref(), &grace, |t| {
                    t.shutdown_subsystem()
                }) {
                    debug!("SFTP subsystem shutdown: {}", e);
                }
            }

            let description = self.disconnect_description.clone();
            let grace = Deadline::after(window);
            if let Err(e) = teardown_step(&mut transport, self.socket.as_ref(), &grace, |t| {
                t.disconnect(&description)
            }) {
                debug!("SSH disconnect: {}", e);
            }
            drop(transport);
        }

        if let Some(socket) = self.socket.take() {
            drop(socket);
            debug!("Session socket released");
        }
    }
}

impl<T: Transport> Drop for BrowseSession<T> {
    fn drop(&mut self) {
        if self.state != SessionState::Closed {
            debug!("Dropping browse session in state {:?}", self.state);
            self.close();
        }
    }
}

/// One teardown operation, retried while the grace deadline allows
fn teardown_step<T, F>(
    transport: &mut T,
    socket: Option<&TcpStream>,
    grace: &Deadline,
    mut op: F,
) -> Result<(), String>
where
    T: Transport,
    F: FnMut(&mut T) -> Result<(), TransportError>,
{
    match socket {
        Some(socket) if !grace.is_expired() => {
            run_until_ready(transport, socket, grace, op).map_err(|e| e.to_string())
        }
        _ => match op(transport) {
            Ok(()) => Ok(()),
            Err(TransportError::WouldBlock) => Err("would block".to_string()),
            Err(TransportError::Native(e)) => Err(e.to_string()),
        },
    }
}

/// Password (with keyboard-interactive fallback) or public-key authentication
fn authenticate<T: Transport>(
    transport: &mut T,
    socket: &TcpStream,
    deadline: &Deadline,
    budget: i32,
    username: &str,
    credentials: &Credentials,
) -> Result<(), BridgeError> {
    match credentials {
        Credentials::Password(password) => {
            let password_error = match run_until_ready(transport, socket, deadline, |t| {
                t.authenticate_password(username, password)
            }) {
                Ok(()) => {
                    info!("Password authentication succeeded for {}", username);
                    return Ok(());
                }
                Err(e) if e.is_timeout() => {
                    return Err(BridgeError::Timeout {
                        stage: Stage::PasswordAuth,
                        budget_secs: budget,
                    })
                }
                Err(e) => e.into_bridge(Stage::PasswordAuth, budget, "Password authentication failed."),
            };

            debug!(
                "Password authentication rejected, trying keyboard-interactive: {}",
                password_error
            );
            match run_until_ready(transport, socket, deadline, |t| {
                t.authenticate_keyboard_interactive(username, password)
            }) {
                Ok(()) => {
                    info!("Keyboard-interactive authentication succeeded for {}", username);
                    Ok(())
                }
                Err(e) if e.is_timeout() => Err(BridgeError::Timeout {
                    stage: Stage::KeyboardInteractiveAuth,
                    budget_secs: budget,
                }),
                Err(e) => {
                    let fallback_error = e.into_bridge(
                        Stage::KeyboardInteractiveAuth,
                        budget,
                        "Password authentication failed.",
                    );
                    Err(BridgeError::StageFailed {
                        stage: Stage::KeyboardInteractiveAuth,
                        detail: format!("{} (password attempt: {})", fallback_error, password_error),
                    })
                }
            }
        }
        Credentials::PrivateKey(path) => {
            run_until_ready(transport, socket, deadline, |t| {
                t.authenticate_public_key(username, path)
            })
            .map_err(|e| e.into_bridge(Stage::PublicKeyAuth, budget, "Private key authentication failed."))?;
            info!("Public-key authentication succeeded for {}", username);
            Ok(())
        }
    }
}
