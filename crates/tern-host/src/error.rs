//! Host error codes.
//!
//! Errors crossing the host boundary carry a short code without the leading
//! `E` (`"NOENT"`, `"ACCES"`), the way WASI names its errno values. The `fs`
//! layer maps these onto Node-shaped errors.

use std::io;
use thiserror::Error;

/// Error returned by every host primitive.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("{code}: {message}")]
pub struct HostError {
    /// Short error code (`"NOENT"`, `"EXIST"`, ...).
    pub code: String,
    /// Human readable detail from the operating system.
    pub message: String,
}

pub type HostResult<T> = Result<T, HostError>;

impl HostError {
    pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            message: message.into(),
        }
    }

    pub fn bad_fd(fd: i32) -> Self {
        Self::new("BADF", format!("bad file descriptor {fd}"))
    }

    pub fn not_found(what: &str) -> Self {
        Self::new("NOENT", format!("{what} does not exist"))
    }

    pub fn exists(what: &str) -> Self {
        Self::new("EXIST", format!("{what} already exists"))
    }

    pub fn invalid(detail: impl Into<String>) -> Self {
        Self::new("INVAL", detail)
    }

    pub fn is(&self, code: &str) -> bool {
        self.code == code
    }
}

impl From<io::Error> for HostError {
    fn from(err: io::Error) -> Self {
        Self {
            code: io_error_code(&err).to_string(),
            message: err.to_string(),
        }
    }
}

/// Map an I/O error to a short host code, preferring the raw OS errno.
pub fn io_error_code(err: &io::Error) -> &'static str {
    #[cfg(unix)]
    if let Some(raw) = err.raw_os_error()
        && let Some(code) = errno_code(raw)
    {
        return code;
    }

    io_kind_to_code(err.kind())
}

#[cfg(unix)]
fn errno_code(raw: i32) -> Option<&'static str> {
    let code = match raw {
        libc::EPERM => "PERM",
        libc::ENOENT => "NOENT",
        libc::EIO => "IO",
        libc::EBADF => "BADF",
        libc::EAGAIN => "AGAIN",
        libc::ENOMEM => "NOMEM",
        libc::EACCES => "ACCES",
        libc::EBUSY => "BUSY",
        libc::EEXIST => "EXIST",
        libc::EXDEV => "XDEV",
        libc::ENOTDIR => "NOTDIR",
        libc::EISDIR => "ISDIR",
        libc::EINVAL => "INVAL",
        libc::ENFILE => "NFILE",
        libc::EMFILE => "MFILE",
        libc::ETXTBSY => "TXTBSY",
        libc::EFBIG => "FBIG",
        libc::ENOSPC => "NOSPC",
        libc::ESPIPE => "SPIPE",
        libc::EROFS => "ROFS",
        libc::EMLINK => "MLINK",
        libc::EPIPE => "PIPE",
        libc::ENAMETOOLONG => "NAMETOOLONG",
        libc::ENOSYS => "NOSYS",
        libc::ENOTEMPTY => "NOTEMPTY",
        libc::ELOOP => "LOOP",
        libc::EOVERFLOW => "OVERFLOW",
        libc::ENOTSUP => "NOTSUP",
        libc::ECONNREFUSED => "CONNREFUSED",
        libc::ECONNRESET => "CONNRESET",
        libc::EADDRINUSE => "ADDRINUSE",
        libc::ETIMEDOUT => "TIMEDOUT",
        _ => return None,
    };
    Some(code)
}

fn io_kind_to_code(kind: io::ErrorKind) -> &'static str {
    match kind {
        io::ErrorKind::NotFound => "NOENT",
        io::ErrorKind::PermissionDenied => "ACCES",
        io::ErrorKind::AlreadyExists => "EXIST",
        io::ErrorKind::IsADirectory => "ISDIR",
        io::ErrorKind::NotADirectory => "NOTDIR",
        io::ErrorKind::DirectoryNotEmpty => "NOTEMPTY",
        io::ErrorKind::InvalidInput => "INVAL",
        io::ErrorKind::ReadOnlyFilesystem => "ROFS",
        io::ErrorKind::Unsupported => "NOSYS",
        io::ErrorKind::ConnectionRefused => "CONNREFUSED",
        io::ErrorKind::ConnectionReset => "CONNRESET",
        io::ErrorKind::AddrInUse => "ADDRINUSE",
        io::ErrorKind::TimedOut => "TIMEDOUT",
        io::ErrorKind::BrokenPipe => "PIPE",
        _ => "IO",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn maps_io_kinds_without_os_errno() {
        let err = HostError::from(io::Error::new(io::ErrorKind::NotFound, "gone"));
        assert_eq!(err.code, "NOENT");
        let err = HostError::from(io::Error::new(io::ErrorKind::TimedOut, "slow"));
        assert_eq!(err.code, "TIMEDOUT");
        let err = HostError::from(io::Error::other("weird"));
        assert_eq!(err.code, "IO");
    }

    #[cfg(unix)]
    #[test]
    fn prefers_raw_os_errno() {
        let err = HostError::from(io::Error::from_raw_os_error(libc::ENOTEMPTY));
        assert_eq!(err.code, "NOTEMPTY");
        let err = HostError::from(io::Error::from_raw_os_error(libc::ELOOP));
        assert_eq!(err.code, "LOOP");
    }

    #[test]
    fn display_includes_code() {
        let err = HostError::bad_fd(42);
        assert_eq!(err.to_string(), "BADF: bad file descriptor 42");
        assert!(err.is("BADF"));
    }
}
