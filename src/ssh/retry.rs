//! Retry-Until-Ready Executor
//!
//! Every transport call goes through [`run_until_ready`]: invoke, and on
//! would-block park in the readiness waiter against the shared deadline.
//! Success and hard errors return immediately.

use std::io;
use std::os::fd::AsFd;

use tracing::{debug, trace};

use super::deadline::Deadline;
use super::error::{BridgeError, NativeError, Stage};
use super::readiness::{wait_ready, WaitError};
use super::transport::{Transport, TransportError};

/// Why a retried operation stopped without succeeding
#[derive(Debug, thiserror::Error)]
pub enum RetryError {
    #[error("deadline expired")]
    TimedOut,

    #[error("socket wait failed: {0}")]
    Io(io::Error),

    #[error("{0}")]
    Native(NativeError),
}

impl RetryError {
    pub fn is_timeout(&self) -> bool {
        matches!(self, RetryError::TimedOut)
    }

    /// Map to the bridge error for `stage`, using `summary` as the failure text
    pub fn into_bridge(self, stage: Stage, budget_secs: i32, summary: &str) -> BridgeError {
        match self {
            RetryError::TimedOut => BridgeError::Timeout { stage, budget_secs },
            RetryError::Io(e) => BridgeError::StageFailed {
                stage,
                detail: format!("socket wait failed during {}: {}: {}", stage, e, summary),
            },
            RetryError::Native(native) => BridgeError::stage_failed(stage, Some(&native), summary),
        }
    }
}

impl From<WaitError> for RetryError {
    fn from(e: WaitError) -> Self {
        match e {
            WaitError::TimedOut => RetryError::TimedOut,
            WaitError::Io(e) => RetryError::Io(e),
        }
    }
}

/// Drive a non-blocking transport operation until it completes or the deadline expires.
pub fn run_until_ready<T, S, R, F>(
    transport: &mut T,
    socket: &S,
    deadline: &Deadline,
    mut op: F,
) -> Result<R, RetryError>
where
    T: Transport + ?Sized,
    S: AsFd,
    F: FnMut(&mut T) -> Result<R, TransportError>,
{
    let mut waits = 0u32;
    loop {
        match op(transport) {
            Ok(value) => {
                if waits > 0 {
                    trace!("Operation completed after {} readiness waits", waits);
                }
                return Ok(value);
            }
            Err(TransportError::Native(native)) => return Err(RetryError::Native(native)),
            Err(TransportError::WouldBlock) => {
                let directions = transport.block_directions();
                if let Err(e) = wait_ready(socket, directions, deadline) {
                    debug!("Readiness wait ended after {} retries: {}", waits, e);
                    return Err(e.into());
                }
                waits += 1;
            }
        }
    }
}
