//! Option objects with Node's default values.
//!
//! Callers override individual fields with struct update syntax, leaving the
//! rest at their defaults:
//!
//! ```rust,ignore
//! fs.mkdir_sync("a/b", MkdirOptions { recursive: true, ..Default::default() })?;
//! ```

use crate::encoding::Encoding;
use crate::validators::Flags;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tern_host::Fd;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StatOptions {
    pub bigint: bool,
    pub throw_if_no_entry: bool,
}

impl Default for StatOptions {
    fn default() -> Self {
        Self {
            bigint: false,
            throw_if_no_entry: true,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MkdirOptions {
    pub recursive: bool,
    pub mode: u32,
}

impl Default for MkdirOptions {
    fn default() -> Self {
        Self {
            recursive: false,
            mode: 0o777,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RmOptions {
    pub force: bool,
    pub max_retries: u32,
    pub recursive: bool,
    pub retry_delay: Duration,
}

impl Default for RmOptions {
    fn default() -> Self {
        Self {
            force: false,
            max_retries: 0,
            recursive: false,
            retry_delay: Duration::from_millis(100),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RmdirOptions {
    pub max_retries: u32,
    pub recursive: bool,
    pub retry_delay: Duration,
}

impl Default for RmdirOptions {
    fn default() -> Self {
        Self {
            max_retries: 0,
            recursive: false,
            retry_delay: Duration::from_millis(100),
        }
    }
}

/// Options for `readFile`. Without an encoding the contents come back as bytes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReadFileOptions {
    pub encoding: Option<Encoding>,
    pub flag: Flags,
}

impl Default for ReadFileOptions {
    fn default() -> Self {
        Self {
            encoding: None,
            flag: Flags::from("r"),
        }
    }
}

impl From<Encoding> for ReadFileOptions {
    fn from(encoding: Encoding) -> Self {
        Self {
            encoding: Some(encoding),
            ..Default::default()
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WriteFileOptions {
    pub encoding: Encoding,
    pub mode: u32,
    pub flag: Flags,
}

impl Default for WriteFileOptions {
    fn default() -> Self {
        Self {
            encoding: Encoding::Utf8,
            mode: 0o666,
            flag: Flags::from("w"),
        }
    }
}

impl From<Encoding> for WriteFileOptions {
    fn from(encoding: Encoding) -> Self {
        Self {
            encoding,
            ..Default::default()
        }
    }
}

/// Options for `appendFile`; same shape as `WriteFileOptions` but opening with `"a"`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppendFileOptions {
    pub encoding: Encoding,
    pub mode: u32,
    pub flag: Flags,
}

impl Default for AppendFileOptions {
    fn default() -> Self {
        Self {
            encoding: Encoding::Utf8,
            mode: 0o666,
            flag: Flags::from("a"),
        }
    }
}

impl From<AppendFileOptions> for WriteFileOptions {
    fn from(o: AppendFileOptions) -> Self {
        Self {
            encoding: o.encoding,
            mode: o.mode,
            flag: o.flag,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OpendirOptions {
    /// Must be at least 1; the host decides the actual batch size.
    pub buffer_size: usize,
}

impl Default for OpendirOptions {
    fn default() -> Self {
        Self { buffer_size: 32 }
    }
}

/// Predicate deciding whether `cp` copies a `(src, dest)` pair.
pub type CpFilter = Arc<dyn Fn(&str, &str) -> bool + Send + Sync>;

#[derive(Clone)]
pub struct CpOptions {
    pub recursive: bool,
    pub force: bool,
    pub error_on_exist: bool,
    pub dereference: bool,
    pub preserve_timestamps: bool,
    pub verbatim_symlinks: bool,
    /// `COPYFILE_*` bits.
    pub mode: u32,
    pub filter: Option<CpFilter>,
}

impl Default for CpOptions {
    fn default() -> Self {
        Self {
            recursive: false,
            force: true,
            error_on_exist: false,
            dereference: false,
            preserve_timestamps: false,
            verbatim_symlinks: false,
            mode: 0,
            filter: None,
        }
    }
}

impl fmt::Debug for CpOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CpOptions")
            .field("recursive", &self.recursive)
            .field("force", &self.force)
            .field("error_on_exist", &self.error_on_exist)
            .field("dereference", &self.dereference)
            .field("preserve_timestamps", &self.preserve_timestamps)
            .field("verbatim_symlinks", &self.verbatim_symlinks)
            .field("mode", &self.mode)
            .field("filter", &self.filter.is_some())
            .finish()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReadStreamOptions {
    pub flags: Flags,
    pub encoding: Option<Encoding>,
    /// Adopt an already open descriptor instead of opening the path.
    pub fd: Option<Fd>,
    pub mode: u32,
    pub auto_close: bool,
    pub emit_close: bool,
    pub start: Option<u64>,
    /// Inclusive end offset.
    pub end: Option<u64>,
    pub high_water_mark: usize,
}

impl Default for ReadStreamOptions {
    fn default() -> Self {
        Self {
            flags: Flags::from("r"),
            encoding: None,
            fd: None,
            mode: 0o666,
            auto_close: true,
            emit_close: true,
            start: None,
            end: None,
            high_water_mark: 64 * 1024,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WriteStreamOptions {
    pub flags: Flags,
    pub encoding: Encoding,
    pub fd: Option<Fd>,
    pub mode: u32,
    pub auto_close: bool,
    pub emit_close: bool,
    pub start: Option<u64>,
}

impl Default for WriteStreamOptions {
    fn default() -> Self {
        Self {
            flags: Flags::from("w"),
            encoding: Encoding::Utf8,
            fd: None,
            mode: 0o666,
            auto_close: true,
            emit_close: true,
            start: None,
        }
    }
}
