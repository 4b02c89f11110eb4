//! libssh2 transport
//!
//! [`Transport`] implementation over libssh2, driven in non-blocking mode.
//! The SSH layer goes through the `ssh2` bindings. The SFTP subsystem is
//! driven through `libssh2-sys` directly: every SFTP call, including
//! directory close and subsystem shutdown, reports `LIBSSH2_ERROR_EAGAIN`
//! and is resumed by calling it again, and `readdir` hands back the
//! server's long listing line.

use std::ffi::{c_char, c_int, c_uint};
use std::mem;
use std::net::TcpStream;
use std::path::Path;
use std::ptr::NonNull;
use std::sync::Once;
use std::time::Duration;

use libssh2_sys as raw;
use ssh2::{DisconnectCode, ErrorCode, Session};
use tracing::{debug, info, warn};

use super::error::NativeError;
use super::keyboard_interactive::SecretResponder;
use super::readiness::BlockDirections;
use super::transport::{RawEntry, Transport, TransportError};

const ORIGIN: &str = "libssh2";

/// Buffer for canonical paths and entry names
const PATH_BUFFER_LEN: usize = 4096;

/// Buffer for `ls -l` style long listing lines
const LONG_ENTRY_BUFFER_LEN: usize = 4096;

static LIBRARY_INIT: Once = Once::new();

/// Process-wide libssh2 initialisation, executed at most once
pub fn init_library() {
    LIBRARY_INIT.call_once(|| {
        ssh2::init();
        info!("libssh2 initialized");
    });
}

fn map_error(e: ssh2::Error) -> TransportError {
    match e.code() {
        ErrorCode::Session(raw::LIBSSH2_ERROR_EAGAIN) => TransportError::WouldBlock,
        ErrorCode::Session(code) | ErrorCode::SFTP(code) => {
            TransportError::Native(NativeError::new(ORIGIN, code, e.message()))
        }
    }
}

fn native(e: ssh2::Error) -> NativeError {
    match map_error(e) {
        TransportError::Native(native) => native,
        TransportError::WouldBlock => NativeError::new(ORIGIN, raw::LIBSSH2_ERROR_EAGAIN, "would block"),
    }
}

fn no_subsystem() -> TransportError {
    TransportError::Native(NativeError::new(ORIGIN, 0, "SFTP subsystem is not initialized"))
}

fn closed_handle() -> TransportError {
    TransportError::Native(NativeError::new(
        ORIGIN,
        raw::LIBSSH2_ERROR_BAD_USE,
        "directory handle is closed",
    ))
}

/// Path as the `(pointer, length)` pair libssh2 expects
fn path_arg(path: &str) -> Result<(*const c_char, c_uint), TransportError> {
    let len = c_uint::try_from(path.len()).map_err(|_| {
        TransportError::Native(NativeError::new(
            ORIGIN,
            raw::LIBSSH2_ERROR_BAD_USE,
            "remote path is too long",
        ))
    })?;
    Ok((path.as_ptr().cast(), len))
}

/// Open SFTP directory handle.
///
/// Closing is explicit through [`Transport::close_directory`]. A handle
/// whose close never completes is left to libssh2, which still tracks it
/// on the subsystem.
pub struct DirectoryHandle {
    raw: Option<NonNull<raw::LIBSSH2_SFTP_HANDLE>>,
    name: Vec<u8>,
    long_entry: Vec<u8>,
}

impl DirectoryHandle {
    fn new(raw: NonNull<raw::LIBSSH2_SFTP_HANDLE>) -> Self {
        Self {
            raw: Some(raw),
            name: vec![0; PATH_BUFFER_LEN],
            long_entry: vec![0; LONG_ENTRY_BUFFER_LEN],
        }
    }
}

/// SSH session plus its SFTP channel
pub struct Ssh2Transport {
    session: Session,
    raw_session: *mut raw::LIBSSH2_SESSION,
    sftp: Option<NonNull<raw::LIBSSH2_SFTP>>,
}

// The raw pointers are owned by this transport and only touched through
// `&mut self`; libssh2 sessions may move between threads.
unsafe impl Send for Ssh2Transport {}

impl Ssh2Transport {
    /// Bind a new libssh2 session to a connected socket
    pub fn attach(socket: &TcpStream) -> Result<Self, NativeError> {
        init_library();

        let mut session = Session::new().map_err(native)?;
        let stream = socket
            .try_clone()
            .map_err(|e| NativeError::new("socket", e.raw_os_error().unwrap_or(0), e.to_string()))?;
        session.set_tcp_stream(stream);
        session.set_blocking(false);

        let raw_session = {
            let mut guard = session.raw();
            &mut *guard as *mut raw::LIBSSH2_SESSION
        };

        Ok(Self {
            session,
            raw_session,
            sftp: None,
        })
    }

    fn sftp(&self) -> Result<NonNull<raw::LIBSSH2_SFTP>, TransportError> {
        self.sftp.ok_or_else(no_subsystem)
    }

    /// Error for a negative libssh2 return code
    fn error_for(&self, rc: c_int) -> TransportError {
        if rc == raw::LIBSSH2_ERROR_EAGAIN {
            return TransportError::WouldBlock;
        }
        if rc == raw::LIBSSH2_ERROR_SFTP_PROTOCOL {
            if let Some(sftp) = self.sftp {
                let status = unsafe { raw::libssh2_sftp_last_error(sftp.as_ptr()) };
                if let Ok(status) = c_int::try_from(status) {
                    return map_error(ssh2::Error::from_errno(ErrorCode::SFTP(status)));
                }
            }
        }
        map_error(ssh2::Error::from_session_error_raw(self.raw_session, rc))
    }

    /// Error for a call that signalled failure with a null pointer
    fn last_error(&self) -> TransportError {
        let rc = unsafe { raw::libssh2_session_last_errno(self.raw_session) };
        self.error_for(rc)
    }

    fn check(&self, rc: c_int) -> Result<c_int, TransportError> {
        if rc < 0 {
            Err(self.error_for(rc))
        } else {
            Ok(rc)
        }
    }
}

impl Transport for Ssh2Transport {
    type Directory = DirectoryHandle;

    fn prepare(&mut self, timeout: Duration) {
        self.session.set_blocking(false);
        let ms = u32::try_from(timeout.as_millis()).unwrap_or(u32::MAX);
        self.session.set_timeout(ms);
    }

    fn block_directions(&self) -> BlockDirections {
        match self.session.block_directions() {
            ssh2::BlockDirections::None => BlockDirections::None,
            ssh2::BlockDirections::Inbound => BlockDirections::Inbound,
            ssh2::BlockDirections::Outbound => BlockDirections::Outbound,
            ssh2::BlockDirections::Both => BlockDirections::Both,
        }
    }

    fn handshake(&mut self) -> Result<(), TransportError> {
        self.session.handshake().map_err(map_error)
    }

    fn authenticate_password(&mut self, username: &str, password: &str) -> Result<(), TransportError> {
        self.session.userauth_password(username, password).map_err(map_error)
    }

    fn authenticate_keyboard_interactive(
        &mut self,
        username: &str,
        secret: &str,
    ) -> Result<(), TransportError> {
        let mut responder = SecretResponder::new(secret);
        let outcome = self
            .session
            .userauth_keyboard_interactive(username, &mut responder)
            .map_err(map_error);
        if responder.rounds() > 0 {
            debug!("Keyboard-interactive attempt answered {} round(s)", responder.rounds());
        }
        outcome
    }

    fn authenticate_public_key(&mut self, username: &str, private_key: &Path) -> Result<(), TransportError> {
        self.session
            .userauth_pubkey_file(username, None, private_key, None)
            .map_err(map_error)
    }

    fn init_subsystem(&mut self) -> Result<(), TransportError> {
        if self.sftp.is_some() {
            return Ok(());
        }
        let sftp = unsafe { raw::libssh2_sftp_init(self.raw_session) };
        match NonNull::new(sftp) {
            Some(sftp) => {
                self.sftp = Some(sftp);
                Ok(())
            }
            None => Err(self.last_error()),
        }
    }

    fn has_subsystem(&self) -> bool {
        self.sftp.is_some()
    }

    fn real_path(&mut self, path: &str) -> Result<String, TransportError> {
        let sftp = self.sftp()?;
        let (path_ptr, path_len) = path_arg(path)?;
        let mut target = vec![0u8; PATH_BUFFER_LEN];
        let rc = unsafe {
            raw::libssh2_sftp_symlink_ex(
                sftp.as_ptr(),
                path_ptr,
                path_len,
                target.as_mut_ptr().cast(),
                PATH_BUFFER_LEN as c_uint,
                raw::LIBSSH2_SFTP_REALPATH,
            )
        };
        let len = usize::try_from(self.check(rc)?).unwrap_or(0).min(target.len());
        Ok(String::from_utf8_lossy(&target[..len]).into_owned())
    }

    fn open_directory(&mut self, path: &str) -> Result<DirectoryHandle, TransportError> {
        let sftp = self.sftp()?;
        let (path_ptr, path_len) = path_arg(path)?;
        let handle = unsafe {
            raw::libssh2_sftp_open_ex(sftp.as_ptr(), path_ptr, path_len, 0, 0, raw::LIBSSH2_SFTP_OPENDIR)
        };
        match NonNull::new(handle) {
            Some(handle) => Ok(DirectoryHandle::new(handle)),
            None => Err(self.last_error()),
        }
    }

    fn read_directory(&mut self, dir: &mut DirectoryHandle) -> Result<Option<RawEntry>, TransportError> {
        let handle = dir.raw.ok_or_else(closed_handle)?;
        dir.long_entry.fill(0);
        let mut attrs: raw::LIBSSH2_SFTP_ATTRIBUTES = unsafe { mem::zeroed() };

        let rc = unsafe {
            raw::libssh2_sftp_readdir_ex(
                handle.as_ptr(),
                dir.name.as_mut_ptr().cast(),
                dir.name.len(),
                dir.long_entry.as_mut_ptr().cast(),
                dir.long_entry.len() - 1,
                &mut attrs,
            )
        };
        let read = self.check(rc)?;
        if read == 0 {
            return Ok(None);
        }

        let name_len = usize::try_from(read).unwrap_or(0).min(dir.name.len());
        let long_len = dir
            .long_entry
            .iter()
            .position(|b| *b == 0)
            .unwrap_or(dir.long_entry.len());

        Ok(Some(RawEntry {
            name: String::from_utf8_lossy(&dir.name[..name_len]).into_owned(),
            flags: u64::from(attrs.flags),
            permissions: u64::from(attrs.permissions),
            size: attrs.filesize,
            mtime: u64::from(attrs.mtime),
            long_entry: String::from_utf8_lossy(&dir.long_entry[..long_len]).into_owned(),
        }))
    }

    fn close_directory(&mut self, dir: &mut DirectoryHandle) -> Result<(), TransportError> {
        let Some(handle) = dir.raw else {
            return Ok(());
        };
        let rc = unsafe { raw::libssh2_sftp_close_handle(handle.as_ptr()) };
        if rc == raw::LIBSSH2_ERROR_EAGAIN {
            return Err(TransportError::WouldBlock);
        }
        // Anything but EAGAIN retires the handle
        dir.raw = None;
        self.check(rc).map(|_| ())
    }

    fn stat(&mut self, path: &str) -> Result<(), TransportError> {
        let sftp = self.sftp()?;
        let (path_ptr, path_len) = path_arg(path)?;
        let mut attrs: raw::LIBSSH2_SFTP_ATTRIBUTES = unsafe { mem::zeroed() };
        let rc = unsafe {
            raw::libssh2_sftp_stat_ex(sftp.as_ptr(), path_ptr, path_len, raw::LIBSSH2_SFTP_STAT, &mut attrs)
        };
        self.check(rc).map(|_| ())
    }

    fn shutdown_subsystem(&mut self) -> Result<(), TransportError> {
        let Some(sftp) = self.sftp else {
            return Ok(());
        };
        let rc = unsafe { raw::libssh2_sftp_shutdown(sftp.as_ptr()) };
        if rc == raw::LIBSSH2_ERROR_EAGAIN {
            return Err(TransportError::WouldBlock);
        }
        let outcome = self.check(rc).map(|_| ());
        self.sftp = None;
        debug!("SFTP subsystem released");
        outcome
    }

    fn disconnect(&mut self, description: &str) -> Result<(), TransportError> {
        self.session
            .disconnect(Some(DisconnectCode::ByApplication), description, None)
            .map_err(map_error)
    }
}

impl Drop for Ssh2Transport {
    fn drop(&mut self) {
        if let Some(sftp) = self.sftp.take() {
            self.session.set_blocking(false);
            let rc = unsafe { raw::libssh2_sftp_shutdown(sftp.as_ptr()) };
            if rc == raw::LIBSSH2_ERROR_EAGAIN {
                warn!("SFTP subsystem still busy at drop, abandoning it");
            }
        }
    }
}
