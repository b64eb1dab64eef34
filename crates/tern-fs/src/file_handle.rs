//! `FileHandle`: a promise-based wrapper around one open descriptor.

use crate::errors::{NodeError, NodeResult};
use crate::events::{Emitter, FsEvent};
use crate::ops::{Contents, Data, FileTarget, Fs, ReadRequest, TimeLike, WriteRequest};
use crate::options::{AppendFileOptions, ReadFileOptions, WriteFileOptions};
use crate::promises::promisify;
use crate::stats::{AnyStats, Stats};
use std::sync::atomic::{AtomicI32, Ordering};
use tern_host::Fd;

const CLOSED: Fd = -1;

#[derive(Debug)]
pub struct FileHandle {
    fs: Fs,
    fd: AtomicI32,
    path: Option<String>,
    events: Emitter,
}

impl FileHandle {
    pub(crate) fn new(fs: Fs, fd: Fd, path: Option<String>) -> Self {
        Self {
            fs,
            fd: AtomicI32::new(fd),
            path,
            events: Emitter::new(),
        }
    }

    /// The descriptor, or `-1` once closed.
    pub fn fd(&self) -> Fd {
        self.fd.load(Ordering::Acquire)
    }

    /// Path the handle was opened with, when known.
    pub fn path(&self) -> Option<&str> {
        self.path.as_deref()
    }

    pub fn on(&self, event: &'static str, listener: impl Fn(&FsEvent) + Send + Sync + 'static) -> u64 {
        self.events.on(event, listener)
    }

    pub fn once(
        &self,
        event: &'static str,
        listener: impl Fn(&FsEvent) + Send + Sync + 'static,
    ) -> u64 {
        self.events.once(event, listener)
    }

    fn live(&self, syscall: &str) -> NodeResult<Fd> {
        match self.fd() {
            CLOSED => Err(NodeError::closed_handle(syscall)),
            fd => Ok(fd),
        }
    }

    pub async fn read(&self, request: ReadRequest) -> NodeResult<(usize, Vec<u8>)> {
        let fd = self.live("read")?;
        promisify(|cb| self.fs.read(fd, request, cb)).await
    }

    pub async fn readv(
        &self,
        buffers: Vec<Vec<u8>>,
        position: Option<i64>,
    ) -> NodeResult<(usize, Vec<Vec<u8>>)> {
        let fd = self.live("read")?;
        promisify(|cb| self.fs.readv(fd, buffers, position, cb)).await
    }

    pub async fn write(&self, request: WriteRequest) -> NodeResult<usize> {
        let fd = self.live("write")?;
        promisify(|cb| self.fs.write(fd, request, cb)).await
    }

    pub async fn writev(&self, buffers: Vec<Vec<u8>>, position: Option<i64>) -> NodeResult<usize> {
        let fd = self.live("write")?;
        promisify(|cb| self.fs.writev(fd, buffers, position, cb)).await
    }

    /// Read from the current position to the end of the file.
    pub async fn read_file(&self, options: impl Into<ReadFileOptions>) -> NodeResult<Contents> {
        let fd = self.live("read")?;
        let options = options.into();
        promisify(|cb| self.fs.read_file(FileTarget::Fd(fd), options, cb)).await
    }

    pub async fn write_file(
        &self,
        data: impl Into<Data>,
        options: impl Into<WriteFileOptions>,
    ) -> NodeResult<()> {
        let fd = self.live("write")?;
        let (data, options) = (data.into(), options.into());
        promisify(|cb| self.fs.write_file(FileTarget::Fd(fd), data, options, cb)).await
    }

    pub async fn append_file(
        &self,
        data: impl Into<Data>,
        options: impl Into<AppendFileOptions>,
    ) -> NodeResult<()> {
        self.write_file(data, WriteFileOptions::from(options.into()))
            .await
    }

    pub async fn stat(&self) -> NodeResult<Stats> {
        let fd = self.live("fstat")?;
        promisify(|cb| self.fs.fstat(fd, cb)).await
    }

    pub async fn stat_with(&self, bigint: bool) -> NodeResult<AnyStats> {
        let fd = self.live("fstat")?;
        promisify(|cb| self.fs.fstat_with(fd, bigint, cb)).await
    }

    pub async fn truncate(&self, len: u64) -> NodeResult<()> {
        let fd = self.live("ftruncate")?;
        promisify(|cb| self.fs.ftruncate(fd, len, cb)).await
    }

    pub async fn sync(&self) -> NodeResult<()> {
        let fd = self.live("fsync")?;
        promisify(|cb| self.fs.fsync(fd, cb)).await
    }

    pub async fn datasync(&self) -> NodeResult<()> {
        let fd = self.live("fdatasync")?;
        promisify(|cb| self.fs.fdatasync(fd, cb)).await
    }

    pub async fn utimes(
        &self,
        atime: impl Into<TimeLike>,
        mtime: impl Into<TimeLike>,
    ) -> NodeResult<()> {
        let fd = self.live("futime")?;
        let (atime, mtime) = (atime.into(), mtime.into());
        promisify(|cb| self.fs.futimes(fd, atime, mtime, cb)).await
    }

    pub async fn chmod(&self, mode: u32) -> NodeResult<()> {
        let fd = self.live("fchmod")?;
        promisify(|cb| self.fs.fchmod(fd, mode, cb)).await
    }

    pub async fn chown(&self, uid: u32, gid: u32) -> NodeResult<()> {
        let fd = self.live("fchown")?;
        promisify(|cb| self.fs.fchown(fd, uid, gid, cb)).await
    }

    /// Close the descriptor. `close` listeners run before this resolves.
    pub async fn close(&self) -> NodeResult<()> {
        let fd = self.fd.swap(CLOSED, Ordering::AcqRel);
        if fd == CLOSED {
            return Err(NodeError::closed_handle("close"));
        }
        let closed = promisify(|cb| self.fs.close(fd, cb)).await;
        self.events.emit(&FsEvent::Close);
        closed
    }
}

impl Drop for FileHandle {
    fn drop(&mut self) {
        let fd = *self.fd.get_mut();
        if fd != CLOSED {
            tracing::warn!(fd, path = ?self.path, "closing file descriptor on FileHandle drop");
            let _ = self.fs.close_sync(fd);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::encoding::Encoding;
    use crate::events::record;
    use crate::ops::ReadArgs;
    use crate::stats::StatsBase;
    use tempfile::tempdir;

    #[tokio::test]
    async fn operations_delegate_to_the_descriptor() {
        let dir = tempdir().expect("tempdir");
        let fs = Fs::std();
        let path = dir.path().join("h.txt");
        let handle = fs.promises().open(&path, "w+", None).await.expect("open");
        assert!(handle.fd() >= 0);

        let n = handle
            .write(WriteRequest::Buffer(b"hello world".to_vec(), ReadArgs::default()))
            .await
            .expect("write");
        assert_eq!(n, 11);
        let (n, buffer) = handle
            .read(ReadRequest::Into(vec![0; 5], ReadArgs::at(6)))
            .await
            .expect("read");
        assert_eq!(&buffer[..n], b"world");

        handle.truncate(5).await.expect("truncate");
        let stats = handle.stat().await.expect("stat");
        assert!(stats.is_file());
        assert_eq!(stats.size, 5);
        handle.sync().await.expect("sync");
        handle.datasync().await.expect("datasync");
        handle.chmod(0o600).await.expect("chmod no-op");
        handle.close().await.expect("close");
    }

    #[tokio::test]
    async fn close_emits_before_resolving_and_invalidates() {
        let dir = tempdir().expect("tempdir");
        let fs = Fs::std();
        let path = dir.path().join("c.txt");
        std::fs::write(&path, b"x").expect("seed");
        let handle = fs.promises().open(&path, "r", None).await.expect("open");
        let seen = record(&handle.events, &["close"]);

        handle.close().await.expect("close");
        assert_eq!(*seen.lock(), vec!["close"]);
        assert_eq!(handle.fd(), -1);

        assert_eq!(handle.close().await.expect_err("closed").code, "EBADF");
        assert_eq!(handle.stat().await.expect_err("closed").code, "EBADF");
    }

    #[tokio::test]
    async fn read_file_reads_from_the_current_position() {
        let dir = tempdir().expect("tempdir");
        let fs = Fs::std();
        let path = dir.path().join("rf.txt");
        std::fs::write(&path, b"abcdef").expect("seed");
        let handle = fs.promises().open(&path, "r", None).await.expect("open");
        let (n, _) = handle
            .read(ReadRequest::Into(vec![0; 2], ReadArgs::default()))
            .await
            .expect("read");
        assert_eq!(n, 2);
        let rest = handle.read_file(Encoding::Latin1).await.expect("rest");
        assert_eq!(rest, Contents::String("cdef".to_string()));
        handle.close().await.expect("close");
    }

    #[tokio::test]
    async fn writev_and_append() {
        let dir = tempdir().expect("tempdir");
        let fs = Fs::std();
        let path = dir.path().join("wv.txt");
        let handle = fs.promises().open(&path, "a+", None).await.expect("open");
        handle
            .writev(vec![b"ab".to_vec(), b"cd".to_vec()], None)
            .await
            .expect("writev");
        handle
            .append_file("ef", AppendFileOptions::default())
            .await
            .expect("append");
        let (n, buffers) = handle
            .readv(vec![vec![0; 3], vec![0; 3]], Some(0))
            .await
            .expect("readv");
        assert_eq!(n, 6);
        assert_eq!(buffers, vec![b"abc".to_vec(), b"def".to_vec()]);
        handle.close().await.expect("close");
    }
}
