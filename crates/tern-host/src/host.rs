use crate::error::HostResult;
use crate::types::{RawStat, ReaddirBatch};
use futures_util::future::BoxFuture;

/// Integer file descriptor handed out by a host.
pub type Fd = i32;

/// The host syscall surface.
///
/// Every method is synchronous except `fread_async`/`fwrite_async`, which
/// return a future that completes on the async runtime. Implementations must
/// serialize operations on the same descriptor.
pub trait HostFs: Send + Sync + 'static {
    fn open(&self, path: &str, flags: u32, mode: u32) -> HostResult<Fd>;
    fn close(&self, fd: Fd) -> HostResult<()>;

    fn stat(&self, path: &str) -> HostResult<RawStat>;
    fn lstat(&self, path: &str) -> HostResult<RawStat>;
    fn fstat(&self, fd: Fd) -> HostResult<RawStat>;

    /// Read up to `len` bytes. `None` reads at the current file position.
    fn fread(&self, fd: Fd, position: Option<u64>, len: usize) -> HostResult<Vec<u8>>;
    /// Write `bytes`, returning the count written. `None` writes at the current position.
    fn fwrite(&self, fd: Fd, position: Option<u64>, bytes: &[u8]) -> HostResult<usize>;
    fn fread_async(
        &self,
        fd: Fd,
        position: Option<u64>,
        len: usize,
    ) -> BoxFuture<'static, HostResult<Vec<u8>>>;
    fn fwrite_async(
        &self,
        fd: Fd,
        position: Option<u64>,
        bytes: Vec<u8>,
    ) -> BoxFuture<'static, HostResult<usize>>;

    /// Read the next batch of entries of an open directory, starting at `cookie`.
    fn freaddir(&self, fd: Fd, cookie: u64) -> HostResult<ReaddirBatch>;

    fn mkdir(&self, path: &str, recursive: bool, mode: u32) -> HostResult<()>;
    fn rmdir(&self, path: &str, recursive: bool) -> HostResult<()>;
    fn rm(&self, path: &str, recursive: bool, force: bool) -> HostResult<()>;
    fn rename(&self, from: &str, to: &str) -> HostResult<()>;
    fn copy_file(&self, src: &str, dst: &str) -> HostResult<()>;
    fn link(&self, existing: &str, new_path: &str) -> HostResult<()>;
    fn symlink(&self, target: &str, path: &str) -> HostResult<()>;
    fn readlink(&self, path: &str) -> HostResult<String>;
    fn realpath(&self, path: &str) -> HostResult<String>;

    fn truncate(&self, path: &str, len: u64) -> HostResult<()>;
    fn ftruncate(&self, fd: Fd, len: u64) -> HostResult<()>;
    fn utime(&self, path: &str, atime_ms: f64, mtime_ms: f64) -> HostResult<()>;
    fn lutime(&self, path: &str, atime_ms: f64, mtime_ms: f64) -> HostResult<()>;
    fn futime(&self, fd: Fd, atime_ms: f64, mtime_ms: f64) -> HostResult<()>;
    fn fsync(&self, fd: Fd) -> HostResult<()>;
    fn fdatasync(&self, fd: Fd) -> HostResult<()>;
}
