//! Host primitives for the tern Node.js compatibility layer.
//!
//! This crate models the small syscall surface the `fs` shim is built on:
//! integer file descriptors, flat stat records, cookie-paginated directory
//! reads and host error codes in the short form (`"NOENT"`, `"EXIST"`, ...).
//!
//! # Modules
//!
//! - `error` - Host error codes built from `std::io::Error`
//! - `flags` - Host open-flag bits and their translation to `OpenOptions`
//! - `types` - Raw stat and directory-entry records
//! - `host` - The `HostFs` trait
//! - `std_host` - `StdHost`, the `std::fs` backed implementation
//!
//! # Usage
//!
//! ```rust,ignore
//! use tern_host::{HostFs, StdHost, flags};
//!
//! let host = StdHost::new();
//! let fd = host.open("/tmp/a.txt", flags::O_RDONLY, 0o666)?;
//! let bytes = host.fread(fd, Some(0), 64)?;
//! host.close(fd)?;
//! ```

pub mod error;
pub mod flags;
pub mod host;
pub mod std_host;
pub mod types;

pub use error::{HostError, HostResult};
pub use host::{Fd, HostFs};
pub use std_host::StdHost;
pub use types::{FileType, RawDirent, RawStat, ReaddirBatch};
