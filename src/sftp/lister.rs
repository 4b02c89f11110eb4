//! Directory Lister
//!
//! Resolves a path, streams its entries and keeps only directories. Every
//! transport call shares one deadline; the directory handle is closed on
//! every path once opened, within what is left of the deadline or
//! [`DIRECTORY_CLOSE_GRACE`] if that is longer.

use std::time::{Duration, Instant};

use tracing::{debug, info, warn};

use super::classify::classify_directory_entry;
use super::path_utils::is_pseudo_entry;
use super::types::{DirectoryEntry, ListResult, ATTR_ACMODTIME, ATTR_SIZE};
use crate::ssh::deadline::{elapsed_ms, Deadline};
use crate::ssh::error::{BridgeError, Stage};
use crate::ssh::retry::run_until_ready;
use crate::ssh::session::BrowseSession;
use crate::ssh::transport::{RawEntry, Transport};

/// Minimum window for closing the directory handle once the listing deadline is spent
pub const DIRECTORY_CLOSE_GRACE: Duration = Duration::from_millis(250);

/// List the directories under `path` on an open session.
///
/// Never fails outright: the result carries the status code, latency and
/// diagnostic.
pub fn list_directories<T: Transport>(
    session: &mut BrowseSession<T>,
    path: &str,
    timeout_secs: i32,
) -> ListResult {
    let start = Instant::now();

    if path.is_empty() || timeout_secs <= 0 {
        let err = BridgeError::InvalidRequest("Invalid libssh2 browse request.".to_string());
        return ListResult::failure(&err, None, elapsed_ms(start));
    }

    let mut resolved = None;
    let outcome = collect_directories(session, path, timeout_secs, &mut resolved);
    let latency_ms = elapsed_ms(start);

    match outcome {
        Ok(entries) => {
            let resolved = resolved.unwrap_or_else(|| path.to_string());
            info!(
                "Listed {} directories under {} in {}ms",
                entries.len(),
                resolved,
                latency_ms
            );
            ListResult::success(resolved, entries, latency_ms)
        }
        Err(e) => {
            warn!("Listing {} failed after {}ms: {}", path, latency_ms, e);
            ListResult::failure(&e, resolved, latency_ms)
        }
    }
}

fn collect_directories<T: Transport>(
    session: &mut BrowseSession<T>,
    path: &str,
    timeout_secs: i32,
    resolved: &mut Option<String>,
) -> Result<Vec<DirectoryEntry>, BridgeError> {
    let (transport, socket) = session.parts()?;
    transport.prepare(Duration::from_secs(u64::try_from(timeout_secs).unwrap_or(0)));
    let deadline = Deadline::from_timeout_secs(timeout_secs);

    let effective = match run_until_ready(transport, socket, &deadline, |t| t.real_path(path)) {
        Ok(canonical) if !canonical.is_empty() => canonical,
        Ok(_) => path.to_string(),
        Err(e) if e.is_timeout() => {
            return Err(BridgeError::Timeout {
                stage: Stage::ResolvePath,
                budget_secs: timeout_secs,
            })
        }
        Err(e) => {
            debug!("realpath unavailable for {}, using it verbatim: {}", path, e);
            path.to_string()
        }
    };
    *resolved = Some(effective.clone());

    let mut dir = run_until_ready(transport, socket, &deadline, |t| t.open_directory(&effective))
        .map_err(|e| e.into_bridge(Stage::OpenDirectory, timeout_secs, "Unable to open remote directory."))?;

    let mut entries = Vec::new();
    let outcome = loop {
        let raw = match run_until_ready(transport, socket, &deadline, |t| t.read_directory(&mut dir)) {
            Ok(Some(raw)) => raw,
            Ok(None) => break Ok(()),
            Err(e) => {
                break Err(e.into_bridge(
                    Stage::ReadDirectory,
                    timeout_secs,
                    "Failed while reading remote directory.",
                ))
            }
        };
        if let Some(entry) = keep_directory(raw) {
            if let Err(e) = entries.try_reserve(1) {
                break Err(BridgeError::EntryStorage(e.to_string()));
            }
            entries.push(entry);
        }
    };

    let close_deadline = Deadline::after(deadline.remaining().max(DIRECTORY_CLOSE_GRACE));
    if let Err(e) = run_until_ready(transport, socket, &close_deadline, |t| t.close_directory(&mut dir)) {
        debug!("Directory handle for {} not closed cleanly: {}", effective, e);
    }
    outcome.map(|()| entries)
}

/// Directory entry for `raw`, or `None` when it is filtered out
fn keep_directory(raw: RawEntry) -> Option<DirectoryEntry> {
    if raw.name.is_empty() || is_pseudo_entry(&raw.name) {
        return None;
    }
    if !classify_directory_entry(raw.flags, raw.permissions, &raw.long_entry) {
        return None;
    }
    Some(DirectoryEntry {
        is_directory: true,
        size: (raw.flags & ATTR_SIZE != 0).then_some(raw.size),
        modified_at: (raw.flags & ATTR_ACMODTIME != 0).then(|| i64::try_from(raw.mtime).unwrap_or(i64::MAX)),
        name: raw.name,
    })
}
