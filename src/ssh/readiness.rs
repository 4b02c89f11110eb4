//! Readiness Waiter
//!
//! The only place the calling thread blocks. Waits on the session socket for
//! the direction(s) the transport reports as pending, never past the deadline.

use std::io;
use std::os::fd::AsFd;

use nix::errno::Errno;
use nix::poll::{poll, PollFd, PollFlags, PollTimeout};
use tracing::trace;

use super::deadline::Deadline;

/// I/O direction(s) the transport is waiting on
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlockDirections {
    /// Transport could not say; waits on both
    None,
    Inbound,
    Outbound,
    Both,
}

impl BlockDirections {
    fn poll_flags(self) -> PollFlags {
        match self {
            BlockDirections::Inbound => PollFlags::POLLIN,
            BlockDirections::Outbound => PollFlags::POLLOUT,
            BlockDirections::None | BlockDirections::Both => PollFlags::POLLIN | PollFlags::POLLOUT,
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum WaitError {
    #[error("deadline expired")]
    TimedOut,

    #[error("socket wait failed: {0}")]
    Io(#[from] io::Error),
}

/// Block until the socket is ready in `directions` or the deadline expires.
///
/// An already-expired deadline fails with [`WaitError::TimedOut`] without
/// touching the socket.
pub fn wait_ready<S: AsFd>(
    socket: &S,
    directions: BlockDirections,
    deadline: &Deadline,
) -> Result<(), WaitError> {
    loop {
        let remaining = deadline.remaining_ms();
        if remaining <= 0 {
            return Err(WaitError::TimedOut);
        }

        let timeout = PollTimeout::try_from(remaining).unwrap_or(PollTimeout::MAX);
        let mut fds = [PollFd::new(socket.as_fd(), directions.poll_flags())];
        trace!("Waiting up to {}ms for {:?}", remaining, directions);

        match poll(&mut fds, timeout) {
            Ok(0) => return Err(WaitError::TimedOut),
            Ok(_) => {
                let revents = fds[0].revents().unwrap_or_else(PollFlags::empty);
                if revents.contains(PollFlags::POLLNVAL) {
                    return Err(WaitError::Io(io::Error::from(Errno::EBADF)));
                }
                // POLLERR/POLLHUP count as ready: the next transport call surfaces the failure
                return Ok(());
            }
            Err(Errno::EINTR) => continue,
            Err(errno) => return Err(WaitError::Io(io::Error::from(errno))),
        }
    }
}
