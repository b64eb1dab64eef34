//! `rm` retry policy: transient failures are retried `max_retries` times and
//! each retry waits `retry_delay * attempt`.

use futures_util::future::BoxFuture;
use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;
use tern_fs::{Fs, RmOptions};
use tern_host::{Fd, HostError, HostFs, HostResult, RawStat, ReaddirBatch, StdHost};
use tempfile::tempdir;
use tokio::sync::oneshot;

/// Delegates to `StdHost`, but `rm` fails with `BUSY` a set number of times.
struct BusyHost {
    inner: StdHost,
    failures_left: AtomicU32,
    attempts: AtomicU32,
}

impl BusyHost {
    fn new(failures: u32) -> Arc<Self> {
        Arc::new(Self {
            inner: StdHost::new(),
            failures_left: AtomicU32::new(failures),
            attempts: AtomicU32::new(0),
        })
    }
}

impl HostFs for BusyHost {
    fn open(&self, path: &str, flags: u32, mode: u32) -> HostResult<Fd> {
        self.inner.open(path, flags, mode)
    }
    fn close(&self, fd: Fd) -> HostResult<()> {
        self.inner.close(fd)
    }
    fn stat(&self, path: &str) -> HostResult<RawStat> {
        self.inner.stat(path)
    }
    fn lstat(&self, path: &str) -> HostResult<RawStat> {
        self.inner.lstat(path)
    }
    fn fstat(&self, fd: Fd) -> HostResult<RawStat> {
        self.inner.fstat(fd)
    }
    fn fread(&self, fd: Fd, position: Option<u64>, len: usize) -> HostResult<Vec<u8>> {
        self.inner.fread(fd, position, len)
    }
    fn fwrite(&self, fd: Fd, position: Option<u64>, bytes: &[u8]) -> HostResult<usize> {
        self.inner.fwrite(fd, position, bytes)
    }
    fn fread_async(
        &self,
        fd: Fd,
        position: Option<u64>,
        len: usize,
    ) -> BoxFuture<'static, HostResult<Vec<u8>>> {
        self.inner.fread_async(fd, position, len)
    }
    fn fwrite_async(
        &self,
        fd: Fd,
        position: Option<u64>,
        bytes: Vec<u8>,
    ) -> BoxFuture<'static, HostResult<usize>> {
        self.inner.fwrite_async(fd, position, bytes)
    }
    fn freaddir(&self, fd: Fd, cookie: u64) -> HostResult<ReaddirBatch> {
        self.inner.freaddir(fd, cookie)
    }
    fn mkdir(&self, path: &str, recursive: bool, mode: u32) -> HostResult<()> {
        self.inner.mkdir(path, recursive, mode)
    }
    fn rmdir(&self, path: &str, recursive: bool) -> HostResult<()> {
        self.inner.rmdir(path, recursive)
    }
    fn rm(&self, path: &str, recursive: bool, force: bool) -> HostResult<()> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        let busy = self
            .failures_left
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if busy {
            return Err(HostError::new("BUSY", "resource busy"));
        }
        self.inner.rm(path, recursive, force)
    }
    fn rename(&self, from: &str, to: &str) -> HostResult<()> {
        self.inner.rename(from, to)
    }
    fn copy_file(&self, src: &str, dst: &str) -> HostResult<()> {
        self.inner.copy_file(src, dst)
    }
    fn link(&self, existing: &str, new_path: &str) -> HostResult<()> {
        self.inner.link(existing, new_path)
    }
    fn symlink(&self, target: &str, path: &str) -> HostResult<()> {
        self.inner.symlink(target, path)
    }
    fn readlink(&self, path: &str) -> HostResult<String> {
        self.inner.readlink(path)
    }
    fn realpath(&self, path: &str) -> HostResult<String> {
        self.inner.realpath(path)
    }
    fn truncate(&self, path: &str, len: u64) -> HostResult<()> {
        self.inner.truncate(path, len)
    }
    fn ftruncate(&self, fd: Fd, len: u64) -> HostResult<()> {
        self.inner.ftruncate(fd, len)
    }
    fn utime(&self, path: &str, atime_ms: f64, mtime_ms: f64) -> HostResult<()> {
        self.inner.utime(path, atime_ms, mtime_ms)
    }
    fn lutime(&self, path: &str, atime_ms: f64, mtime_ms: f64) -> HostResult<()> {
        self.inner.lutime(path, atime_ms, mtime_ms)
    }
    fn futime(&self, fd: Fd, atime_ms: f64, mtime_ms: f64) -> HostResult<()> {
        self.inner.futime(fd, atime_ms, mtime_ms)
    }
    fn fsync(&self, fd: Fd) -> HostResult<()> {
        self.inner.fsync(fd)
    }
    fn fdatasync(&self, fd: Fd) -> HostResult<()> {
        self.inner.fdatasync(fd)
    }
}

fn seeded_file() -> (tempfile::TempDir, std::path::PathBuf) {
    let dir = tempdir().expect("tempdir");
    let path = dir.path().join("victim.txt");
    std::fs::write(&path, b"x").expect("seed");
    (dir, path)
}

async fn rm_async(fs: &Fs, path: &std::path::Path, options: RmOptions) -> tern_fs::NodeResult<()> {
    let (tx, rx) = oneshot::channel();
    fs.rm(path, options, move |r| {
        let _ = tx.send(r);
    })
    .expect("scheduled");
    rx.await.expect("callback")
}

#[tokio::test(start_paused = true)]
async fn async_rm_sleeps_linearly_between_retries() {
    let (_dir, path) = seeded_file();
    let host = BusyHost::new(2);
    let fs = Fs::new(host.clone());
    let options = RmOptions {
        max_retries: 3,
        retry_delay: Duration::from_millis(100),
        ..Default::default()
    };

    let started = tokio::time::Instant::now();
    rm_async(&fs, &path, options).await.expect("rm");
    assert_eq!(host.attempts.load(Ordering::SeqCst), 3);
    // 100ms after the first failure, 200ms after the second.
    assert!(started.elapsed() >= Duration::from_millis(300));
    assert!(!path.exists());
}

#[tokio::test(start_paused = true)]
async fn async_rm_gives_up_after_max_retries() {
    let (_dir, path) = seeded_file();
    let host = BusyHost::new(10);
    let fs = Fs::new(host.clone());
    let options = RmOptions {
        max_retries: 2,
        ..Default::default()
    };
    let err = rm_async(&fs, &path, options).await.expect_err("busy");
    assert_eq!(err.code, "EBUSY");
    assert_eq!(err.errno, Some(-16));
    assert_eq!(host.attempts.load(Ordering::SeqCst), 3);
    assert!(path.exists());
}

#[tokio::test]
async fn zero_retries_means_one_attempt() {
    let (_dir, path) = seeded_file();
    let host = BusyHost::new(1);
    let fs = Fs::new(host.clone());
    let err = rm_async(&fs, &path, RmOptions::default())
        .await
        .expect_err("busy");
    assert_eq!(err.code, "EBUSY");
    assert_eq!(host.attempts.load(Ordering::SeqCst), 1);
}

#[test]
fn sync_rm_retries_with_the_same_policy() {
    let (_dir, path) = seeded_file();
    let host = BusyHost::new(2);
    let fs = Fs::new(host.clone());
    let options = RmOptions {
        max_retries: 2,
        retry_delay: Duration::from_millis(1),
        ..Default::default()
    };
    fs.rm_sync(&path, options).expect("rm");
    assert_eq!(host.attempts.load(Ordering::SeqCst), 3);
    assert!(!path.exists());
}
