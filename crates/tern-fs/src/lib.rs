//! Node.js-compatible `fs` and `fs/promises` for tern.
//!
//! Node's option-heavy filesystem API is translated onto the small syscall
//! surface of a [`tern_host::HostFs`]. Errors keep Node's shape (`code`,
//! `errno`, `syscall`, `path`, `dest`).
//!
//! # Modules
//!
//! - `errors` - Host error mapping and `ERR_*` constructors
//! - `validators` - Path, flag, mode and offset checks
//! - `options` - Option structs with Node's defaults
//! - `stats` - `Stats`, `BigIntStats` and `Dirent`
//! - `ops` - Synchronous operations on [`Fs`]
//! - `callback` - Callback variants deferred onto the tokio runtime
//! - `dir` - The `Dir` iterator
//! - `file_handle` - `FileHandle`
//! - `stream` - `ReadStream` and `WriteStream`
//! - `promises` - `fs/promises`
//!
//! # Example
//!
//! ```no_run
//! use tern_fs::{Encoding, Fs, MkdirOptions, WriteFileOptions};
//!
//! # async fn demo() -> tern_fs::NodeResult<()> {
//! let fs = Fs::std();
//! fs.mkdir_sync("/tmp/tern/a/b", MkdirOptions { recursive: true, ..Default::default() })?;
//! fs.write_file_sync("/tmp/tern/a/b/hello.txt", "hi", WriteFileOptions::default())?;
//!
//! let text = fs.promises().read_file("/tmp/tern/a/b/hello.txt", Encoding::Utf8).await?;
//! assert_eq!(text.into_string(), "hi");
//! # Ok(())
//! # }
//! ```

pub mod callback;
pub mod constants;
pub mod dir;
pub mod encoding;
pub mod errors;
pub mod events;
pub mod file_handle;
pub mod ops;
pub mod options;
pub mod promises;
pub mod stats;
pub mod stream;
mod turns;
pub mod validators;

pub use dir::{Dir, DirState};
pub use encoding::Encoding;
pub use errors::{NodeError, NodeResult};
pub use events::{Emitter, FsEvent};
pub use file_handle::FileHandle;
pub use ops::{
    Contents, Data, FileTarget, Fs, ReadArgs, ReadRequest, TimeLike, WriteArgs, WriteRequest,
};
pub use options::{
    AppendFileOptions, CpFilter, CpOptions, MkdirOptions, OpendirOptions, ReadFileOptions,
    ReadStreamOptions, RmOptions, RmdirOptions, StatOptions, WriteFileOptions,
    WriteStreamOptions,
};
pub use promises::FsPromises;
pub use stats::{AnyStats, BigIntStats, Dirent, Stats, StatsBase};
pub use stream::{ReadStream, StreamState, WriteStream};
pub use validators::{Flags, PathLike};

pub use tern_host::{Fd, HostFs, StdHost};
