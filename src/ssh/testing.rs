//! Scripted transport for unit tests
//!
//! Runs over a real loopback socket so readiness waits and deadlines are
//! exercised for real. Stalled steps report inbound blocking on a socket
//! that never receives data; other would-block rounds report outbound
//! blocking, which is ready immediately.

use std::collections::VecDeque;
use std::net::{TcpListener, TcpStream};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;

use super::config::SessionRequest;
use super::error::NativeError;
use super::readiness::BlockDirections;
use super::transport::{RawEntry, Transport, TransportError};
use crate::sftp::types::{ATTR_ACMODTIME, ATTR_PERMISSIONS, ATTR_SIZE};

pub(crate) fn socket_pair() -> (TcpStream, TcpStream) {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let client = TcpStream::connect(listener.local_addr().unwrap()).unwrap();
    let (server, _) = listener.accept().unwrap();
    (client, server)
}

/// Listener that accepts connections into its backlog and never speaks
pub(crate) fn silent_server() -> (TcpListener, i32) {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let port = i32::from(listener.local_addr().unwrap().port());
    (listener, port)
}

pub(crate) fn password_request(port: i32, timeout_secs: i32) -> SessionRequest {
    SessionRequest::new("127.0.0.1", port, "alice", timeout_secs).with_password("s3cret")
}

/// Behaviour of one scripted operation
#[derive(Debug, Clone)]
pub(crate) enum Step {
    Ok,
    /// Would block this many times, then succeed
    OkAfter(u32),
    /// Would block forever
    Stall,
    Fail(i32, &'static str),
}

/// Ordered record of transport calls, shared with the test after the transport moves
#[derive(Debug, Clone, Default)]
pub(crate) struct Journal(Arc<Mutex<Vec<String>>>);

impl Journal {
    fn record(&self, call: String) -> usize {
        let mut calls = self.0.lock();
        calls.push(call.clone());
        calls.iter().filter(|c| **c == call).count()
    }

    pub(crate) fn calls(&self, call: &str) -> usize {
        self.0.lock().iter().filter(|c| *c == call).count()
    }

    pub(crate) fn entries(&self) -> Vec<String> {
        self.0.lock().clone()
    }

    /// Position of the first occurrence of `call`
    pub(crate) fn position(&self, call: &str) -> Option<usize> {
        self.0.lock().iter().position(|c| c == call)
    }
}

pub(crate) struct ScriptedTransport {
    pub handshake: Step,
    pub password: Step,
    pub keyboard_interactive: Step,
    pub public_key: Step,
    pub subsystem: Step,
    pub real_path: Step,
    /// Canonical path returned by `real_path`; `None` echoes the input
    pub resolved: Option<String>,
    pub open_dir: Step,
    pub read_dir: Step,
    pub close_dir: Step,
    pub entries: VecDeque<RawEntry>,
    pub stat: Step,
    /// Paths for which `stat` finds something
    pub existing: Vec<String>,
    pub shutdown: Step,
    pub disconnect: Step,
    journal: Journal,
    stalled: bool,
    subsystem_ready: bool,
    watched: Option<TcpStream>,
}

impl ScriptedTransport {
    pub(crate) fn new() -> Self {
        Self {
            handshake: Step::Ok,
            password: Step::Ok,
            keyboard_interactive: Step::Ok,
            public_key: Step::Ok,
            subsystem: Step::Ok,
            real_path: Step::Ok,
            resolved: None,
            open_dir: Step::Ok,
            read_dir: Step::Ok,
            close_dir: Step::Ok,
            entries: VecDeque::new(),
            stat: Step::Ok,
            existing: Vec::new(),
            shutdown: Step::Ok,
            disconnect: Step::Ok,
            journal: Journal::default(),
            stalled: false,
            subsystem_ready: false,
            watched: None,
        }
    }

    /// Fail stalled calls once `socket` is shut down, like a real transport would
    pub(crate) fn watching(mut self, socket: &TcpStream) -> Self {
        self.watched = socket.try_clone().ok();
        self
    }

    fn socket_closed(&self) -> bool {
        let mut buf = [0u8; 1];
        match &self.watched {
            Some(socket) => match socket.peek(&mut buf) {
                Ok(0) => true,
                Ok(_) => false,
                Err(e) => e.kind() != std::io::ErrorKind::WouldBlock,
            },
            None => false,
        }
    }

    pub(crate) fn journal(&self) -> Journal {
        self.journal.clone()
    }

    pub(crate) fn calls(&self, call: &str) -> usize {
        self.journal.calls(call)
    }

    fn run(&mut self, call: &str, step: Step) -> Result<(), TransportError> {
        let attempt = self.journal.record(call.to_string());
        self.stalled = matches!(step, Step::Stall);
        match step {
            Step::Ok => Ok(()),
            Step::OkAfter(n) if (attempt as u32) <= n => Err(TransportError::WouldBlock),
            Step::OkAfter(_) => Ok(()),
            Step::Stall if self.socket_closed() => Err(TransportError::Native(NativeError::new(
                "libssh2",
                -43,
                "Error waiting on socket",
            ))),
            Step::Stall => Err(TransportError::WouldBlock),
            Step::Fail(code, message) => {
                Err(TransportError::Native(NativeError::new("libssh2", code, message)))
            }
        }
    }
}

/// Entry helper: `name` with the given permission bits and a long listing line
pub(crate) fn entry(name: &str, permissions: u64, long_entry: &str) -> RawEntry {
    RawEntry {
        name: name.to_string(),
        flags: ATTR_PERMISSIONS | ATTR_SIZE | ATTR_ACMODTIME,
        permissions,
        size: 4096,
        mtime: 1_700_000_000,
        long_entry: long_entry.to_string(),
    }
}

impl Transport for ScriptedTransport {
    type Directory = String;

    fn prepare(&mut self, _timeout: Duration) {}

    fn block_directions(&self) -> BlockDirections {
        if self.stalled {
            BlockDirections::Inbound
        } else {
            BlockDirections::Outbound
        }
    }

    fn handshake(&mut self) -> Result<(), TransportError> {
        self.run("handshake", self.handshake.clone())
    }

    fn authenticate_password(&mut self, _username: &str, _password: &str) -> Result<(), TransportError> {
        self.run("password", self.password.clone())
    }

    fn authenticate_keyboard_interactive(
        &mut self,
        _username: &str,
        _secret: &str,
    ) -> Result<(), TransportError> {
        self.run("keyboard_interactive", self.keyboard_interactive.clone())
    }

    fn authenticate_public_key(&mut self, _username: &str, _private_key: &Path) -> Result<(), TransportError> {
        self.run("public_key", self.public_key.clone())
    }

    fn init_subsystem(&mut self) -> Result<(), TransportError> {
        self.run("init_subsystem", self.subsystem.clone())?;
        self.subsystem_ready = true;
        Ok(())
    }

    fn has_subsystem(&self) -> bool {
        self.subsystem_ready
    }

    fn real_path(&mut self, path: &str) -> Result<String, TransportError> {
        self.run("real_path", self.real_path.clone())?;
        Ok(self.resolved.clone().unwrap_or_else(|| path.to_string()))
    }

    fn open_directory(&mut self, path: &str) -> Result<String, TransportError> {
        self.run("open_directory", self.open_dir.clone())?;
        Ok(path.to_string())
    }

    fn read_directory(&mut self, _dir: &mut String) -> Result<Option<RawEntry>, TransportError> {
        self.run("read_directory", self.read_dir.clone())?;
        Ok(self.entries.pop_front())
    }

    fn close_directory(&mut self, _dir: &mut String) -> Result<(), TransportError> {
        self.run("close_directory", self.close_dir.clone())
    }

    fn stat(&mut self, path: &str) -> Result<(), TransportError> {
        self.run(&format!("stat:{}", path), self.stat.clone())?;
        if self.existing.iter().any(|p| p == path) {
            Ok(())
        } else {
            Err(TransportError::Native(NativeError::new("libssh2", 2, "No such file")))
        }
    }

    fn shutdown_subsystem(&mut self) -> Result<(), TransportError> {
        let outcome = self.run("shutdown_subsystem", self.shutdown.clone());
        if outcome != Err(TransportError::WouldBlock) {
            self.subsystem_ready = false;
        }
        outcome
    }

    fn disconnect(&mut self, _description: &str) -> Result<(), TransportError> {
        self.run("disconnect", self.disconnect.clone())
    }
}
