//! Node-shaped errors.
//!
//! Host failures are mapped into `NodeError` values carrying `code`, `errno`,
//! `syscall`, `path` and `dest`, with Node's message layout:
//!
//! ```text
//! ENOENT: no such file or directory, open '/missing'
//! EEXIST: file already exists, rename '/a' -> '/b'
//! ```
//!
//! Argument validation and resource-state failures use the same type with an
//! `ERR_*` code and no errno.

use std::fmt::Debug;
use tern_host::HostError;
use thiserror::Error;

/// errno reported for codes missing from the table.
pub const UV_UNKNOWN: i32 = -4094;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{message}")]
pub struct NodeError {
    pub code: String,
    pub errno: Option<i32>,
    pub syscall: Option<String>,
    pub path: Option<String>,
    pub dest: Option<String>,
    pub message: String,
}

pub type NodeResult<T> = Result<T, NodeError>;

/// `(code, errno, description)` for the system errors this layer surfaces.
const ERRNO_TABLE: &[(&str, i32, &str)] = &[
    ("EPERM", -1, "operation not permitted"),
    ("ENOENT", -2, "no such file or directory"),
    ("EIO", -5, "i/o error"),
    ("EBADF", -9, "bad file descriptor"),
    ("EAGAIN", -11, "resource temporarily unavailable"),
    ("ENOMEM", -12, "not enough memory"),
    ("EACCES", -13, "permission denied"),
    ("EBUSY", -16, "resource busy or locked"),
    ("EEXIST", -17, "file already exists"),
    ("EXDEV", -18, "cross-device link not permitted"),
    ("ENOTDIR", -20, "not a directory"),
    ("EISDIR", -21, "illegal operation on a directory"),
    ("EINVAL", -22, "invalid argument"),
    ("ENFILE", -23, "file table overflow"),
    ("EMFILE", -24, "too many open files"),
    ("ETXTBSY", -26, "text file is busy"),
    ("EFBIG", -27, "file too large"),
    ("ENOSPC", -28, "no space left on device"),
    ("ESPIPE", -29, "invalid seek"),
    ("EROFS", -30, "read-only file system"),
    ("EMLINK", -31, "too many links"),
    ("EPIPE", -32, "broken pipe"),
    ("ENAMETOOLONG", -36, "name too long"),
    ("ENOSYS", -38, "function not implemented"),
    ("ENOTEMPTY", -39, "directory not empty"),
    ("ELOOP", -40, "too many symbolic links encountered"),
    ("EOVERFLOW", -75, "value too large for defined data type"),
    ("ENOTSUP", -95, "operation not supported on socket"),
    ("EADDRINUSE", -98, "address already in use"),
    ("ECONNRESET", -104, "connection reset by peer"),
    ("ETIMEDOUT", -110, "connection timed out"),
    ("ECONNREFUSED", -111, "connection refused"),
];

/// Look up the errno and description of a Node error code.
pub fn errno_for(code: &str) -> Option<(i32, &'static str)> {
    ERRNO_TABLE
        .iter()
        .find(|(name, _, _)| *name == code)
        .map(|(_, errno, desc)| (*errno, *desc))
}

impl NodeError {
    /// An error with an arbitrary code and no system context.
    pub fn new(code: &str, message: impl Into<String>) -> Self {
        Self::plain(code, message.into())
    }

    fn plain(code: &str, message: String) -> Self {
        Self {
            code: code.to_string(),
            errno: None,
            syscall: None,
            path: None,
            dest: None,
            message,
        }
    }

    /// Build a system error from a host code such as `"NOENT"`.
    pub fn uv(host_code: &str, syscall: &str, path: Option<&str>, dest: Option<&str>) -> Self {
        let code = format!("E{host_code}");
        let (errno, desc) = errno_for(&code).unwrap_or((UV_UNKNOWN, "unknown error"));

        let mut message = format!("{code}: {desc}, {syscall}");
        if let Some(path) = path {
            message.push_str(&format!(" '{path}'"));
        }
        if let Some(dest) = dest {
            message.push_str(&format!(" -> '{dest}'"));
        }

        Self {
            code,
            errno: Some(errno),
            syscall: Some(syscall.to_string()),
            path: path.map(str::to_string),
            dest: dest.map(str::to_string),
            message,
        }
    }

    pub fn from_host(err: &HostError, syscall: &str, path: Option<&str>) -> Self {
        Self::uv(&err.code, syscall, path, None)
    }

    pub fn from_host_two(err: &HostError, syscall: &str, path: &str, dest: &str) -> Self {
        Self::uv(&err.code, syscall, Some(path), Some(dest))
    }

    pub fn invalid_arg_type(name: &str, expected: &str, actual: impl Debug) -> Self {
        Self::plain(
            "ERR_INVALID_ARG_TYPE",
            format!("The \"{name}\" argument must be {expected}. Received {actual:?}"),
        )
    }

    pub fn invalid_arg_value(name: &str, value: impl Debug, reason: &str) -> Self {
        Self::plain(
            "ERR_INVALID_ARG_VALUE",
            format!("The argument '{name}' {reason}. Received {value:?}"),
        )
    }

    pub fn out_of_range(name: &str, range: &str, received: impl Debug) -> Self {
        Self::plain(
            "ERR_OUT_OF_RANGE",
            format!("The value of \"{name}\" is out of range. It must be {range}. Received {received:?}"),
        )
    }

    pub fn dir_closed() -> Self {
        Self::plain("ERR_DIR_CLOSED", "Directory handle was closed".to_string())
    }

    pub fn dir_concurrent_operation() -> Self {
        Self::plain(
            "ERR_DIR_CONCURRENT_OPERATION",
            "Cannot do synchronous work on directory handle with concurrent asynchronous operations"
                .to_string(),
        )
    }

    pub fn file_too_large(size: u64) -> Self {
        Self::plain(
            "ERR_FS_FILE_TOO_LARGE",
            format!("File size ({size}) is greater than 2 GiB"),
        )
    }

    pub fn fs_eisdir(syscall: &str, path: &str) -> Self {
        Self {
            syscall: Some(syscall.to_string()),
            path: Some(path.to_string()),
            ..Self::plain(
                "ERR_FS_EISDIR",
                format!("Path is a directory: {syscall} returned EISDIR (is a directory) {path}"),
            )
        }
    }

    pub fn feature_unavailable(feature: &str) -> Self {
        Self::plain(
            "ERR_FEATURE_UNAVAILABLE_ON_PLATFORM",
            format!("The feature {feature} is unavailable on the current platform, which is being used to run Node.js"),
        )
    }

    pub fn invalid_url_scheme(expected: &str) -> Self {
        Self::plain(
            "ERR_INVALID_URL_SCHEME",
            format!("The URL must be of scheme {expected}"),
        )
    }

    pub fn invalid_file_url_path(reason: &str) -> Self {
        Self::plain(
            "ERR_INVALID_FILE_URL_PATH",
            format!("File URL path {reason}"),
        )
    }

    pub fn stream_destroyed(method: &str) -> Self {
        Self::plain(
            "ERR_STREAM_DESTROYED",
            format!("Cannot call {method} after a stream was destroyed"),
        )
    }

    pub fn write_after_end() -> Self {
        Self::plain("ERR_STREAM_WRITE_AFTER_END", "write after end".to_string())
    }

    pub fn closed_handle(syscall: &str) -> Self {
        Self::uv("BADF", syscall, None, None)
    }

    pub fn internal(detail: impl Into<String>) -> Self {
        Self::plain("ERR_INTERNAL_ASSERTION", detail.into())
    }

    pub fn is_code(&self, code: &str) -> bool {
        self.code == code
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn maps_host_code_with_path() {
        let err = NodeError::from_host(&HostError::not_found("x"), "open", Some("/x"));
        assert_eq!(err.code, "ENOENT");
        assert_eq!(err.errno, Some(-2));
        assert_eq!(err.syscall.as_deref(), Some("open"));
        assert_eq!(err.to_string(), "ENOENT: no such file or directory, open '/x'");
    }

    #[test]
    fn includes_dest_for_two_path_calls() {
        let err = NodeError::uv("EXIST", "rename", Some("/a"), Some("/b"));
        assert_eq!(err.code, "EEXIST");
        assert_eq!(err.dest.as_deref(), Some("/b"));
        assert_eq!(err.to_string(), "EEXIST: file already exists, rename '/a' -> '/b'");
    }

    #[test]
    fn unknown_codes_get_prefixed() {
        let err = NodeError::uv("WEIRD", "read", None, None);
        assert_eq!(err.code, "EWEIRD");
        assert_eq!(err.errno, Some(UV_UNKNOWN));
        assert_eq!(err.to_string(), "EWEIRD: unknown error, read");
    }

    #[test]
    fn validation_errors_have_no_errno() {
        let err = NodeError::invalid_arg_value("buffer", "<Buffer >", "is empty and cannot be written");
        assert_eq!(err.code, "ERR_INVALID_ARG_VALUE");
        assert!(err.errno.is_none());
        assert!(err.message.contains("is empty and cannot be written"));
    }
}
