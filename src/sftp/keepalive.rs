//! Keepalive Check
//!
//! A stat against the browsed path tells whether the session is still
//! usable without paying for a full listing.

use std::time::Duration;

use tracing::debug;

use super::path_utils::{has_trailing_separator, trim_trailing_separators};
use crate::ssh::deadline::Deadline;
use crate::ssh::error::{BridgeError, Stage};
use crate::ssh::retry::{run_until_ready, RetryError};
use crate::ssh::session::BrowseSession;
use crate::ssh::transport::Transport;

const KEEPALIVE_FAILED: &str = "SFTP keepalive check failed.";

/// Check that `path` is still reachable through `session`.
///
/// Some servers reject stat on `dir/`; a failed stat on a path with trailing
/// separators is retried once without them. Timeouts are never retried.
pub fn ping_session<T: Transport>(
    session: &mut BrowseSession<T>,
    path: &str,
    timeout_secs: i32,
) -> Result<(), BridgeError> {
    if path.is_empty() || timeout_secs <= 0 {
        return Err(BridgeError::InvalidRequest(
            "Invalid libssh2 keepalive request.".to_string(),
        ));
    }

    let (transport, socket) = session.parts()?;
    transport.prepare(Duration::from_secs(u64::try_from(timeout_secs).unwrap_or(0)));
    let deadline = Deadline::from_timeout_secs(timeout_secs);

    let first = match run_until_ready(transport, socket, &deadline, |t| t.stat(path)) {
        Ok(()) => return Ok(()),
        Err(e) => e,
    };

    let failure = if !first.is_timeout() && has_trailing_separator(path) {
        let trimmed = trim_trailing_separators(path);
        debug!("stat {} failed ({}), retrying as {}", path, first, trimmed);
        match run_until_ready(transport, socket, &deadline, |t| t.stat(trimmed)) {
            Ok(()) => return Ok(()),
            Err(e) => e,
        }
    } else {
        first
    };

    debug!("Keepalive stat for {} failed: {}", path, failure);
    Err(keepalive_error(failure, timeout_secs))
}

fn keepalive_error(error: RetryError, timeout_secs: i32) -> BridgeError {
    error.into_bridge(Stage::Keepalive, timeout_secs, KEEPALIVE_FAILED)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::BridgeSettings;
    use crate::ssh::error::status;
    use crate::ssh::testing::{password_request, silent_server, ScriptedTransport, Step};
    use std::net::TcpListener;

    fn open(transport: ScriptedTransport) -> (TcpListener, BrowseSession<ScriptedTransport>) {
        let (listener, port) = silent_server();
        let session = BrowseSession::open_with(
            &password_request(port, 2),
            &BridgeSettings::default(),
            move |_| Ok(transport),
        )
        .unwrap();
        (listener, session)
    }

    #[test]
    fn test_exact_path_succeeds() {
        let mut transport = ScriptedTransport::new();
        transport.existing = vec!["/remote/dir/".into()];
        let journal = transport.journal();
        let (_listener, mut session) = open(transport);

        assert!(ping_session(&mut session, "/remote/dir/", 2).is_ok());
        assert_eq!(journal.calls("stat:/remote/dir"), 0);
    }

    #[test]
    fn test_trailing_slash_retried_trimmed() {
        let mut transport = ScriptedTransport::new();
        transport.existing = vec!["/remote/dir".into()];
        let journal = transport.journal();
        let (_listener, mut session) = open(transport);

        assert!(ping_session(&mut session, "/remote/dir//", 2).is_ok());
        assert_eq!(journal.calls("stat:/remote/dir//"), 1);
        assert_eq!(journal.calls("stat:/remote/dir"), 1);
    }

    #[test]
    fn test_missing_path_reports_native_diagnostic() {
        let (_listener, mut session) = open(ScriptedTransport::new());

        let err = ping_session(&mut session, "/gone", 2).unwrap_err();
        assert_eq!(err.status_code(), status::KEEPALIVE_FAILED);
        assert_eq!(
            err.to_string(),
            "libssh2 error 2: No such file: SFTP keepalive check failed."
        );
    }

    #[test]
    fn test_root_is_not_trimmed() {
        let transport = ScriptedTransport::new();
        let journal = transport.journal();
        let (_listener, mut session) = open(transport);

        assert!(ping_session(&mut session, "/", 2).is_err());
        assert_eq!(journal.calls("stat:/"), 1);
    }

    #[test]
    fn test_timeout_is_not_retried() {
        let mut transport = ScriptedTransport::new();
        transport.stat = Step::Stall;
        let journal = transport.journal();
        let (_listener, mut session) = open(transport);

        let err = ping_session(&mut session, "/remote/dir/", 1).unwrap_err();
        assert_eq!(err.status_code(), status::KEEPALIVE_TIMEOUT);
        assert_eq!(journal.calls("stat:/remote/dir"), 0);
    }

    #[test]
    fn test_closed_session_rejected() {
        let (_listener, mut session) = open(ScriptedTransport::new());
        session.close();
        let err = ping_session(&mut session, "/", 2).unwrap_err();
        assert_eq!(err.status_code(), status::INVALID_SESSION);
    }
}
