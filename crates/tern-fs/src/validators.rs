//! Argument validation shared by every fs entry point.
//!
//! All checks run before any host call and fail with `ERR_INVALID_ARG_*` or
//! `ERR_OUT_OF_RANGE`.

use crate::constants::{
    COPYFILE_EXCL, COPYFILE_FICLONE, COPYFILE_FICLONE_FORCE, F_OK, O_APPEND, O_CREAT, O_EXCL,
    O_RDONLY, O_RDWR, O_SYNC, O_TRUNC, O_WRONLY, R_OK, W_OK, X_OK,
};
use crate::errors::{NodeError, NodeResult};
use std::path::{Path, PathBuf};
use url::Url;

/// Anything Node accepts as a path: a string, a byte buffer or a `file:` URL.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PathLike {
    Str(String),
    Bytes(Vec<u8>),
    Url(Url),
}

impl From<&str> for PathLike {
    fn from(s: &str) -> Self {
        Self::Str(s.to_string())
    }
}

impl From<String> for PathLike {
    fn from(s: String) -> Self {
        Self::Str(s)
    }
}

impl From<&String> for PathLike {
    fn from(s: &String) -> Self {
        Self::Str(s.clone())
    }
}

impl From<&Path> for PathLike {
    fn from(p: &Path) -> Self {
        match p.to_str() {
            Some(s) => Self::Str(s.to_string()),
            None => Self::Bytes(p.as_os_str().as_encoded_bytes().to_vec()),
        }
    }
}

impl From<PathBuf> for PathLike {
    fn from(p: PathBuf) -> Self {
        Self::from(p.as_path())
    }
}

impl From<&PathBuf> for PathLike {
    fn from(p: &PathBuf) -> Self {
        Self::from(p.as_path())
    }
}

impl From<Vec<u8>> for PathLike {
    fn from(b: Vec<u8>) -> Self {
        Self::Bytes(b)
    }
}

impl From<&[u8]> for PathLike {
    fn from(b: &[u8]) -> Self {
        Self::Bytes(b.to_vec())
    }
}

impl From<Url> for PathLike {
    fn from(u: Url) -> Self {
        Self::Url(u)
    }
}

/// Resolve a path argument to a string, rejecting non-`file:` URLs and NUL bytes.
///
/// Host paths are strings, so byte paths that are not valid UTF-8 are
/// rejected rather than rewritten.
pub fn get_validated_path(path: impl Into<PathLike>, prop_name: &str) -> NodeResult<String> {
    let path = match path.into() {
        PathLike::Str(s) => s,
        PathLike::Bytes(b) => String::from_utf8(b).map_err(|e| {
            NodeError::invalid_arg_value(prop_name, e.as_bytes(), "must be valid UTF-8")
        })?,
        PathLike::Url(url) => file_url_to_path(&url, prop_name)?,
    };

    if path.contains('\0') {
        return Err(NodeError::invalid_arg_value(
            prop_name,
            &path,
            "must be a string, Uint8Array, or URL without null bytes",
        ));
    }
    Ok(path)
}

fn file_url_to_path(url: &Url, prop_name: &str) -> NodeResult<String> {
    if url.scheme() != "file" {
        return Err(NodeError::invalid_url_scheme("file"));
    }
    if url.host_str().is_some_and(|h| !h.is_empty() && h != "localhost") {
        return Err(NodeError::invalid_file_url_path("must be absolute"));
    }
    let encoded = url.path();
    if encoded.to_ascii_lowercase().contains("%2f") {
        return Err(NodeError::invalid_file_url_path(
            "must not include encoded / characters",
        ));
    }
    let path = url
        .to_file_path()
        .map_err(|_| NodeError::invalid_file_url_path("must be absolute"))?;
    path.into_os_string().into_string().map_err(|raw| {
        NodeError::invalid_arg_value(prop_name, raw.as_encoded_bytes(), "must be valid UTF-8")
    })
}

/// A flag argument: a Node flag string or raw host bits.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Flags {
    Str(String),
    Bits(u32),
}

impl From<&str> for Flags {
    fn from(s: &str) -> Self {
        Self::Str(s.to_string())
    }
}

impl From<String> for Flags {
    fn from(s: String) -> Self {
        Self::Str(s)
    }
}

impl From<u32> for Flags {
    fn from(bits: u32) -> Self {
        Self::Bits(bits)
    }
}

impl Default for Flags {
    fn default() -> Self {
        Self::Str("r".to_string())
    }
}

/// Translate a Node flag string to host open bits; numeric flags pass through.
pub fn string_to_flags(flags: impl Into<Flags>) -> NodeResult<u32> {
    let flags = match flags.into() {
        Flags::Bits(bits) => return Ok(bits),
        Flags::Str(s) => s,
    };

    let bits = match flags.as_str() {
        "r" => O_RDONLY,
        "rs" | "sr" => O_RDONLY | O_SYNC,
        "r+" => O_RDWR,
        "rs+" | "sr+" => O_RDWR | O_SYNC,

        "w" => O_TRUNC | O_CREAT | O_WRONLY,
        "wx" | "xw" => O_TRUNC | O_CREAT | O_WRONLY | O_EXCL,

        "w+" => O_TRUNC | O_CREAT | O_RDWR,
        "wx+" | "xw+" => O_TRUNC | O_CREAT | O_RDWR | O_EXCL,

        "a" => O_APPEND | O_CREAT | O_WRONLY,
        "ax" | "xa" => O_APPEND | O_CREAT | O_WRONLY | O_EXCL,
        "as" | "sa" => O_APPEND | O_CREAT | O_WRONLY | O_SYNC,

        "a+" => O_APPEND | O_CREAT | O_RDWR,
        "ax+" | "xa+" => O_APPEND | O_CREAT | O_RDWR | O_EXCL,
        "as+" | "sa+" => O_APPEND | O_CREAT | O_RDWR | O_SYNC,

        _ => {
            return Err(NodeError::invalid_arg_value(
                "flags",
                &flags,
                "is invalid",
            ));
        }
    };
    Ok(bits)
}

/// Which operation a mode argument belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModeKind {
    Access,
    CopyFile,
}

/// Validate an `access` or `copyFile` mode bitmask, defaulting when absent.
pub fn get_valid_mode(mode: Option<u32>, kind: ModeKind) -> NodeResult<u32> {
    let (min, max, default) = match kind {
        ModeKind::Access => (F_OK, R_OK | W_OK | X_OK, F_OK),
        ModeKind::CopyFile => (
            0,
            COPYFILE_EXCL | COPYFILE_FICLONE | COPYFILE_FICLONE_FORCE,
            0,
        ),
    };
    let Some(mode) = mode else {
        return Ok(default);
    };
    if !(min..=max).contains(&mode) {
        return Err(NodeError::out_of_range(
            "mode",
            &format!("an integer >= {min} && <= {max}"),
            mode,
        ));
    }
    Ok(mode)
}

/// Validate a file permission mode.
pub fn parse_file_mode(mode: Option<u32>, name: &str, default: u32) -> NodeResult<u32> {
    let mode = mode.unwrap_or(default);
    if mode > 0o777 {
        return Err(NodeError::out_of_range(
            name,
            "an integer >= 0 && <= 511",
            mode,
        ));
    }
    Ok(mode)
}

/// Check that `offset..offset + length` fits into a buffer of `buffer_len` bytes.
pub fn validate_offset_length(offset: usize, length: usize, buffer_len: usize) -> NodeResult<()> {
    if offset > buffer_len {
        return Err(NodeError::out_of_range(
            "offset",
            &format!(">= 0 && <= {buffer_len}"),
            offset,
        ));
    }
    if length > buffer_len - offset {
        return Err(NodeError::out_of_range(
            "length",
            &format!(">= 0 && <= {}", buffer_len - offset),
            length,
        ));
    }
    Ok(())
}

/// Reject negative descriptors.
pub fn validate_fd(fd: i32) -> NodeResult<i32> {
    if fd < 0 {
        return Err(NodeError::out_of_range("fd", ">= 0 && <= 2147483647", fd));
    }
    Ok(fd)
}

/// Convert a Node position (`-1`/negative = current position) to a host position.
pub fn validate_position(position: Option<i64>) -> Option<u64> {
    position.and_then(|p| u64::try_from(p).ok())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn flag_strings_map_to_bits() {
        assert_eq!(string_to_flags("r").expect("r"), O_RDONLY);
        assert_eq!(string_to_flags("w").expect("w"), O_TRUNC | O_CREAT | O_WRONLY);
        assert_eq!(string_to_flags("xw+").expect("xw+"), string_to_flags("wx+").expect("wx+"));
        assert_eq!(
            string_to_flags("sa+").expect("sa+"),
            O_APPEND | O_CREAT | O_RDWR | O_SYNC
        );
        assert_eq!(string_to_flags(0o1234_u32).expect("bits"), 0o1234);
    }

    #[test]
    fn unknown_flag_is_invalid_value() {
        let err = string_to_flags("rw").expect_err("bad flag");
        assert_eq!(err.code, "ERR_INVALID_ARG_VALUE");
    }

    #[test]
    fn rejects_null_bytes_and_foreign_urls() {
        let err = get_validated_path("a\0b", "path").expect_err("nul");
        assert_eq!(err.code, "ERR_INVALID_ARG_VALUE");

        let url = Url::parse("http://example.com/x").expect("url");
        let err = get_validated_path(url, "path").expect_err("scheme");
        assert_eq!(err.code, "ERR_INVALID_URL_SCHEME");
    }

    #[test]
    fn byte_paths_must_be_utf8() {
        let path = get_validated_path(b"/tmp/caf\xc3\xa9".as_slice(), "path").expect("utf8 bytes");
        assert_eq!(path, "/tmp/café");

        let err = get_validated_path(b"/tmp/\xff\xfe".to_vec(), "path").expect_err("invalid");
        assert_eq!(err.code, "ERR_INVALID_ARG_VALUE");
        assert!(!err.message.contains('\u{fffd}'));
    }

    #[cfg(unix)]
    #[test]
    fn non_utf8_path_bufs_are_not_rewritten() {
        use std::ffi::OsStr;
        use std::os::unix::ffi::OsStrExt;
        let raw = Path::new(OsStr::from_bytes(b"/tmp/\xff"));
        assert_eq!(PathLike::from(raw), PathLike::Bytes(b"/tmp/\xff".to_vec()));
        let err = get_validated_path(raw, "path").expect_err("invalid");
        assert_eq!(err.code, "ERR_INVALID_ARG_VALUE");
    }

    #[cfg(unix)]
    #[test]
    fn converts_file_urls_and_bytes() {
        let url = Url::parse("file:///tmp/a%20b.txt").expect("url");
        assert_eq!(get_validated_path(url, "path").expect("url path"), "/tmp/a b.txt");
        assert_eq!(get_validated_path(b"/tmp/x".as_slice(), "path").expect("bytes"), "/tmp/x");
    }

    #[test]
    fn access_mode_range() {
        assert_eq!(get_valid_mode(None, ModeKind::Access).expect("default"), F_OK);
        assert_eq!(get_valid_mode(Some(R_OK | W_OK), ModeKind::Access).expect("rw"), 6);
        let err = get_valid_mode(Some(8), ModeKind::Access).expect_err("too big");
        assert_eq!(err.code, "ERR_OUT_OF_RANGE");
    }

    #[test]
    fn offset_and_length_must_fit() {
        validate_offset_length(2, 3, 5).expect("fits");
        assert_eq!(validate_offset_length(6, 0, 5).expect_err("offset").code, "ERR_OUT_OF_RANGE");
        assert_eq!(validate_offset_length(2, 4, 5).expect_err("length").code, "ERR_OUT_OF_RANGE");
    }

    #[test]
    fn negative_positions_mean_current() {
        assert_eq!(validate_position(Some(-1)), None);
        assert_eq!(validate_position(None), None);
        assert_eq!(validate_position(Some(7)), Some(7));
    }
}
