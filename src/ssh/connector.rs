//! Socket Connector
//!
//! Resolves the host and opens a non-blocking, keepalive-enabled TCP
//! connection to the first address that answers within the deadline.

use std::io;
use std::net::{SocketAddr, TcpStream, ToSocketAddrs};
use std::os::fd::AsRawFd;

use nix::errno::Errno;
use nix::sys::socket::{
    connect, setsockopt, socket, sockopt, AddressFamily, SockFlag, SockProtocol, SockType,
    SockaddrStorage,
};
use tracing::{debug, info, warn};

use super::deadline::Deadline;
use super::error::{BridgeError, Stage};
use super::readiness::{wait_ready, BlockDirections, WaitError};

/// Connection parameters for one attempt
#[derive(Debug, Clone, Copy)]
pub struct ConnectOptions {
    /// Budget reported in timeout messages
    pub budget_secs: i32,
    pub tcp_keepalive: bool,
}

/// Why a single candidate address failed
#[derive(Debug)]
enum CandidateError {
    TimeoutConfig(io::Error),
    TimedOut,
    Io(io::Error),
}

/// Connect to `host:port`, trying every resolved address in order.
pub fn connect_socket(
    host: &str,
    port: u16,
    deadline: &Deadline,
    options: ConnectOptions,
) -> Result<TcpStream, BridgeError> {
    let addrs: Vec<SocketAddr> = (host, port)
        .to_socket_addrs()
        .map_err(|e| BridgeError::ConnectionFailed(format!("failed to resolve {}: {}", host, e)))?
        .collect();

    if addrs.is_empty() {
        return Err(BridgeError::ConnectionFailed(format!(
            "no addresses found for {}",
            host
        )));
    }

    let mut timeout_config_failed = false;
    let mut last_error: Option<io::Error> = None;

    for addr in addrs {
        if deadline.is_expired() {
            break;
        }
        debug!("Connecting to {}", addr);
        match connect_candidate(addr, deadline, options.tcp_keepalive) {
            Ok(stream) => {
                info!("TCP connection established to {}", addr);
                return Ok(stream);
            }
            Err(CandidateError::TimeoutConfig(e)) => {
                warn!("Failed to set socket timeouts for {}: {}", addr, e);
                timeout_config_failed = true;
            }
            Err(CandidateError::TimedOut) => {
                debug!("Connect to {} timed out", addr);
            }
            Err(CandidateError::Io(e)) => {
                debug!("Connect to {} failed: {}", addr, e);
                last_error = Some(e);
            }
        }
    }

    if timeout_config_failed {
        return Err(BridgeError::SocketTimeoutConfig);
    }
    if deadline.is_expired() {
        return Err(BridgeError::Timeout {
            stage: Stage::Connect,
            budget_secs: options.budget_secs,
        });
    }
    Err(BridgeError::ConnectionFailed(match last_error {
        Some(e) => e.to_string(),
        None => format!("{}:{} unreachable", host, port),
    }))
}

fn connect_candidate(
    addr: SocketAddr,
    deadline: &Deadline,
    keepalive: bool,
) -> Result<TcpStream, CandidateError> {
    let family = match addr {
        SocketAddr::V4(_) => AddressFamily::Inet,
        SocketAddr::V6(_) => AddressFamily::Inet6,
    };
    let fd = socket(family, SockType::Stream, SockFlag::empty(), SockProtocol::Tcp)
        .map_err(|e| CandidateError::Io(e.into()))?;
    let stream = TcpStream::from(fd);

    if keepalive {
        if let Err(e) = setsockopt(&stream, sockopt::KeepAlive, &true) {
            debug!("SO_KEEPALIVE not applied: {}", e);
        }
    }

    stream.set_nonblocking(true).map_err(CandidateError::Io)?;

    let remaining = deadline.remaining();
    if remaining.is_zero() {
        return Err(CandidateError::TimedOut);
    }
    stream
        .set_read_timeout(Some(remaining))
        .and_then(|_| stream.set_write_timeout(Some(remaining)))
        .map_err(CandidateError::TimeoutConfig)?;

    let target = SockaddrStorage::from(addr);
    match connect(stream.as_raw_fd(), &target) {
        Ok(()) => return Ok(stream),
        Err(Errno::EINPROGRESS) | Err(Errno::EINTR) => {}
        Err(errno) => return Err(CandidateError::Io(errno.into())),
    }

    match wait_ready(&stream, BlockDirections::Outbound, deadline) {
        Ok(()) => {}
        Err(WaitError::TimedOut) => return Err(CandidateError::TimedOut),
        Err(WaitError::Io(e)) => return Err(CandidateError::Io(e)),
    }

    match stream.take_error() {
        Ok(None) => Ok(stream),
        Ok(Some(e)) | Err(e) => Err(CandidateError::Io(e)),
    }
}
