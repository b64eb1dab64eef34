//! Callback-style fs operations.
//!
//! Each wrapper validates its arguments on the calling thread, so argument
//! errors come back as `Err` right away. The body is then scheduled on the
//! current tokio runtime, one `yield_now` later, and its result is handed to
//! the callback. Operations on one descriptor complete in the order they were
//! issued, on any runtime flavor.

use crate::errors::{NodeError, NodeResult};
use crate::ops::{
    Contents, Data, FileTarget, Fs, ReadArgs, ReadRequest, TimeLike, WriteRequest, is_retryable,
    resolve_read, uv_fd,
};
use crate::options::{
    AppendFileOptions, CpOptions, MkdirOptions, OpendirOptions, ReadFileOptions, RmOptions,
    RmdirOptions, StatOptions, WriteFileOptions,
};
use crate::dir::Dir;
use crate::stats::{AnyStats, Dirent, Stats};
use crate::validators::{Flags, PathLike, get_validated_path, validate_fd};
use std::future::Future;
use tern_host::{Fd, HostFs};
use tokio::runtime::Handle;

fn runtime() -> NodeResult<Handle> {
    Handle::try_current()
        .map_err(|_| NodeError::internal("fs callbacks require a running tokio runtime"))
}

/// Run `body` on the next turn of the runtime and pass its result to `cb`.
pub(crate) fn defer<T, F, C>(body: F, cb: C) -> NodeResult<()>
where
    T: Send + 'static,
    F: FnOnce() -> NodeResult<T> + Send + 'static,
    C: FnOnce(NodeResult<T>) + Send + 'static,
{
    runtime()?.spawn(async move {
        tokio::task::yield_now().await;
        cb(body());
    });
    Ok(())
}

/// Like [`defer`], for bodies that await host I/O.
pub(crate) fn defer_async<T, Fut, C>(body: Fut, cb: C) -> NodeResult<()>
where
    T: Send + 'static,
    Fut: Future<Output = NodeResult<T>> + Send + 'static,
    C: FnOnce(NodeResult<T>) + Send + 'static,
{
    runtime()?.spawn(async move {
        tokio::task::yield_now().await;
        cb(body.await);
    });
    Ok(())
}

impl Fs {
    /// Like [`defer`], queued behind earlier operations on `fd`.
    pub(crate) fn defer_fd<T, F, C>(&self, fd: Fd, body: F, cb: C) -> NodeResult<()>
    where
        T: Send + 'static,
        F: FnOnce() -> NodeResult<T> + Send + 'static,
        C: FnOnce(NodeResult<T>) + Send + 'static,
    {
        self.defer_fd_async(fd, async move { body() }, cb)
    }

    /// Like [`defer_async`], queued behind earlier operations on `fd`.
    pub(crate) fn defer_fd_async<T, Fut, C>(&self, fd: Fd, body: Fut, cb: C) -> NodeResult<()>
    where
        T: Send + 'static,
        Fut: Future<Output = NodeResult<T>> + Send + 'static,
        C: FnOnce(NodeResult<T>) + Send + 'static,
    {
        let handle = runtime()?;
        let mut turn = self.turns.reserve(fd);
        handle.spawn(async move {
            turn.ready().await;
            tokio::task::yield_now().await;
            cb(body.await);
            drop(turn);
        });
        Ok(())
    }
}

/// Wraps a path-taking sync op: validate now, run later.
macro_rules! path_op {
    ($(#[$doc:meta])* $name:ident => $sync:ident ( $($arg:ident : $ty:ty),* ) -> $out:ty) => {
        $(#[$doc])*
        pub fn $name(
            &self,
            path: impl Into<PathLike>,
            $($arg: $ty,)*
            cb: impl FnOnce(NodeResult<$out>) + Send + 'static,
        ) -> NodeResult<()> {
            let path = get_validated_path(path, "path")?;
            let fs = self.clone();
            defer(move || fs.$sync(path, $($arg),*), cb)
        }
    };
}

/// Wraps a two-path sync op.
macro_rules! two_path_op {
    ($name:ident => $sync:ident ( $first:literal, $second:literal $(, $arg:ident : $ty:ty)* )) => {
        pub fn $name(
            &self,
            from: impl Into<PathLike>,
            to: impl Into<PathLike>,
            $($arg: $ty,)*
            cb: impl FnOnce(NodeResult<()>) + Send + 'static,
        ) -> NodeResult<()> {
            let from = get_validated_path(from, $first)?;
            let to = get_validated_path(to, $second)?;
            let fs = self.clone();
            defer(move || fs.$sync(from, to, $($arg),*), cb)
        }
    };
}

/// Wraps an fd-taking sync op.
macro_rules! fd_op {
    ($name:ident => $sync:ident ( $($arg:ident : $ty:ty),* ) -> $out:ty) => {
        pub fn $name(
            &self,
            fd: Fd,
            $($arg: $ty,)*
            cb: impl FnOnce(NodeResult<$out>) + Send + 'static,
        ) -> NodeResult<()> {
            let fd = validate_fd(fd)?;
            let fs = self.clone();
            self.defer_fd(fd, move || fs.$sync(fd, $($arg),*), cb)
        }
    };
}

impl Fs {
    path_op!(access => access_sync(mode: Option<u32>) -> ());
    path_op!(stat => stat_sync() -> Stats);
    path_op!(stat_with => stat_sync_with(options: StatOptions) -> Option<AnyStats>);
    path_op!(lstat => lstat_sync() -> Stats);
    path_op!(lstat_with => lstat_sync_with(options: StatOptions) -> Option<AnyStats>);
    path_op!(
        /// Resolves to the first directory created when `recursive` is set.
        mkdir => mkdir_sync(options: MkdirOptions) -> Option<String>
    );
    path_op!(rmdir => rmdir_sync(options: RmdirOptions) -> ());
    path_op!(unlink => unlink_sync() -> ());
    path_op!(readdir => readdir_sync() -> Vec<String>);
    path_op!(readdir_dirents => readdir_dirents_sync() -> Vec<Dirent>);
    path_op!(opendir => opendir_sync(options: OpendirOptions) -> Dir);
    path_op!(readlink => readlink_sync() -> String);
    path_op!(realpath => realpath_sync() -> String);
    path_op!(truncate => truncate_sync(len: u64) -> ());
    path_op!(utimes => utimes_sync(atime: TimeLike, mtime: TimeLike) -> ());
    path_op!(lutimes => lutimes_sync(atime: TimeLike, mtime: TimeLike) -> ());
    path_op!(chmod => chmod_sync(mode: u32) -> ());
    path_op!(lchmod => lchmod_sync(mode: u32) -> ());
    path_op!(chown => chown_sync(uid: u32, gid: u32) -> ());
    path_op!(lchown => lchown_sync(uid: u32, gid: u32) -> ());

    two_path_op!(rename => rename_sync("oldPath", "newPath"));
    two_path_op!(copy_file => copy_file_sync("src", "dest", mode: u32));
    two_path_op!(link => link_sync("existingPath", "newPath"));
    two_path_op!(symlink => symlink_sync("target", "path"));
    two_path_op!(cp => cp_sync("src", "dest", options: CpOptions));

    fd_op!(fstat => fstat_sync() -> Stats);
    fd_op!(fstat_with => fstat_sync_with(bigint: bool) -> AnyStats);
    fd_op!(fsync => fsync_sync() -> ());
    fd_op!(fdatasync => fdatasync_sync() -> ());
    fd_op!(ftruncate => ftruncate_sync(len: u64) -> ());
    fd_op!(futimes => futimes_sync(atime: TimeLike, mtime: TimeLike) -> ());
    fd_op!(fchmod => fchmod_sync(mode: u32) -> ());
    fd_op!(fchown => fchown_sync(uid: u32, gid: u32) -> ());

    /// Close `fd` once every operation issued before it has completed.
    pub fn close(&self, fd: Fd, cb: impl FnOnce(NodeResult<()>) + Send + 'static) -> NodeResult<()> {
        let fd = validate_fd(fd)?;
        let handle = runtime()?;
        let mut turn = self.turns.reserve(fd);
        let fs = self.clone();
        handle.spawn(async move {
            turn.ready().await;
            tokio::task::yield_now().await;
            let result = fs.close_sync(fd);
            fs.turns.forget(&turn);
            cb(result);
        });
        Ok(())
    }

    /// Never fails; the callback receives `false` for anything unreadable.
    pub fn exists(
        &self,
        path: impl Into<PathLike>,
        cb: impl FnOnce(bool) + Send + 'static,
    ) -> NodeResult<()> {
        let path: PathLike = path.into();
        let fs = self.clone();
        defer(move || Ok(fs.exists_sync(path)), move |r| cb(r.unwrap_or(false)))
    }

    pub fn open(
        &self,
        path: impl Into<PathLike>,
        flags: impl Into<Flags>,
        mode: Option<u32>,
        cb: impl FnOnce(NodeResult<Fd>) + Send + 'static,
    ) -> NodeResult<()> {
        let path = get_validated_path(path, "path")?;
        let flags = flags.into();
        let fs = self.clone();
        defer(move || fs.open_sync(path, flags, mode), cb)
    }

    pub fn mkdtemp(
        &self,
        prefix: impl Into<PathLike>,
        cb: impl FnOnce(NodeResult<String>) + Send + 'static,
    ) -> NodeResult<()> {
        let prefix = get_validated_path(prefix, "prefix")?;
        let fs = self.clone();
        defer(move || fs.mkdtemp_sync(prefix), cb)
    }

    /// Remove a file or tree. Transient failures are retried on the runtime
    /// timer, waiting `retry_delay * attempt` between attempts.
    pub fn rm(
        &self,
        path: impl Into<PathLike>,
        options: RmOptions,
        cb: impl FnOnce(NodeResult<()>) + Send + 'static,
    ) -> NodeResult<()> {
        let path = get_validated_path(path, "path")?;
        let fs = self.clone();
        defer_async(async move { fs.rm_with_backoff(path, options).await }, cb)
    }

    pub(crate) async fn rm_with_backoff(&self, path: String, options: RmOptions) -> NodeResult<()> {
        if !self.rm_precheck(&path, &options)? {
            return Ok(());
        }
        let mut attempt = 0;
        loop {
            let err = match self.host().rm(&path, options.recursive, options.force) {
                Ok(()) => return Ok(()),
                Err(e) => NodeError::from_host(&e, "rm", Some(&path)),
            };
            if attempt >= options.max_retries || !is_retryable(&err) {
                return Err(err);
            }
            attempt += 1;
            tracing::debug!(path = %path, attempt, code = %err.code, "rm retry");
            tokio::time::sleep(options.retry_delay * attempt).await;
        }
    }

    /// Read into a buffer. The callback gets the byte count and the buffer back.
    ///
    /// Regular files are read in place; other descriptors (pipes, sockets,
    /// character devices) go through the host's blocking pool.
    pub fn read(
        &self,
        fd: Fd,
        request: ReadRequest,
        cb: impl FnOnce(NodeResult<(usize, Vec<u8>)>) + Send + 'static,
    ) -> NodeResult<()> {
        let (buffer, args) = request.into_parts();
        resolve_read(buffer.len(), &args)?;
        let fd = validate_fd(fd)?;
        let fs = self.clone();
        self.defer_fd_async(fd, async move { fs.read_dispatch(fd, buffer, args).await }, cb)
    }

    pub(crate) async fn read_dispatch(
        &self,
        fd: Fd,
        mut buffer: Vec<u8>,
        args: ReadArgs,
    ) -> NodeResult<(usize, Vec<u8>)> {
        let (offset, length, position) = resolve_read(buffer.len(), &args)?;
        if length == 0 {
            return Ok((0, buffer));
        }
        let data = self.fread(fd, position, length).await?;
        buffer[offset..offset + data.len()].copy_from_slice(&data);
        Ok((data.len(), buffer))
    }

    pub(crate) async fn fread(
        &self,
        fd: Fd,
        position: Option<u64>,
        length: usize,
    ) -> NodeResult<Vec<u8>> {
        let host = self.host();
        let regular = host.fstat(fd).map_err(uv_fd("read"))?.is_file;
        if regular {
            host.fread(fd, position, length).map_err(uv_fd("read"))
        } else {
            host.fread_async(fd, position, length)
                .await
                .map_err(uv_fd("read"))
        }
    }

    pub(crate) async fn fwrite(
        &self,
        fd: Fd,
        position: Option<u64>,
        bytes: Vec<u8>,
    ) -> NodeResult<usize> {
        let host = self.host();
        let regular = host.fstat(fd).map_err(uv_fd("write"))?.is_file;
        if regular {
            host.fwrite(fd, position, &bytes).map_err(uv_fd("write"))
        } else {
            host.fwrite_async(fd, position, bytes)
                .await
                .map_err(uv_fd("write"))
        }
    }

    pub fn readv(
        &self,
        fd: Fd,
        buffers: Vec<Vec<u8>>,
        position: Option<i64>,
        cb: impl FnOnce(NodeResult<(usize, Vec<Vec<u8>>)>) + Send + 'static,
    ) -> NodeResult<()> {
        let fd = validate_fd(fd)?;
        let fs = self.clone();
        self.defer_fd(
            fd,
            move || {
                let mut buffers = buffers;
                let n = {
                    let mut slices: Vec<&mut [u8]> =
                        buffers.iter_mut().map(Vec::as_mut_slice).collect();
                    fs.readv_sync(fd, &mut slices, position)?
                };
                Ok((n, buffers))
            },
            cb,
        )
    }

    /// Write a buffer slice or a string; the callback gets the byte count.
    pub fn write(
        &self,
        fd: Fd,
        request: WriteRequest,
        cb: impl FnOnce(NodeResult<usize>) + Send + 'static,
    ) -> NodeResult<()> {
        let fd = validate_fd(fd)?;
        let (bytes, position) = request.resolve()?;
        let fs = self.clone();
        self.defer_fd_async(fd, async move { fs.fwrite(fd, position, bytes).await }, cb)
    }

    pub fn writev(
        &self,
        fd: Fd,
        buffers: Vec<Vec<u8>>,
        position: Option<i64>,
        cb: impl FnOnce(NodeResult<usize>) + Send + 'static,
    ) -> NodeResult<()> {
        let fd = validate_fd(fd)?;
        let fs = self.clone();
        self.defer_fd(fd, move || fs.writev_sync(fd, &buffers, position), cb)
    }

    pub fn read_file(
        &self,
        target: impl Into<FileTarget>,
        options: impl Into<ReadFileOptions>,
        cb: impl FnOnce(NodeResult<Contents>) + Send + 'static,
    ) -> NodeResult<()> {
        let target = validated_target(target.into())?;
        let options = options.into();
        let fs = self.clone();
        match target {
            FileTarget::Fd(fd) => self.defer_fd(fd, move || fs.read_file_sync(fd, options), cb),
            target => defer(move || fs.read_file_sync(target, options), cb),
        }
    }

    pub fn write_file(
        &self,
        target: impl Into<FileTarget>,
        data: impl Into<Data>,
        options: impl Into<WriteFileOptions>,
        cb: impl FnOnce(NodeResult<()>) + Send + 'static,
    ) -> NodeResult<()> {
        let target = validated_target(target.into())?;
        let data = data.into();
        let options = options.into();
        let fs = self.clone();
        match target {
            FileTarget::Fd(fd) => {
                self.defer_fd(fd, move || fs.write_file_sync(fd, data, options), cb)
            }
            target => defer(move || fs.write_file_sync(target, data, options), cb),
        }
    }

    pub fn append_file(
        &self,
        target: impl Into<FileTarget>,
        data: impl Into<Data>,
        options: impl Into<AppendFileOptions>,
        cb: impl FnOnce(NodeResult<()>) + Send + 'static,
    ) -> NodeResult<()> {
        self.write_file(target, data, WriteFileOptions::from(options.into()), cb)
    }
}

fn validated_target(target: FileTarget) -> NodeResult<FileTarget> {
    match target {
        FileTarget::Path(path) => Ok(FileTarget::Path(get_validated_path(path, "path")?.into())),
        FileTarget::Fd(fd) => Ok(FileTarget::Fd(validate_fd(fd)?)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::encoding::Encoding;
    use parking_lot::Mutex;
    use std::sync::Arc;
    use tempfile::tempdir;
    use tokio::sync::oneshot;

    async fn recv<T>(rx: oneshot::Receiver<T>) -> T {
        rx.await.expect("callback dropped")
    }

    #[tokio::test]
    async fn stat_callback_runs_after_the_call_returns() {
        let dir = tempdir().expect("tempdir");
        let fs = Fs::std();
        let order = Arc::new(Mutex::new(Vec::new()));
        let (tx, rx) = oneshot::channel();
        let seen = order.clone();
        fs.stat(dir.path(), move |r| {
            seen.lock().push("callback");
            let _ = tx.send(r);
        })
        .expect("scheduled");
        order.lock().push("returned");
        let stats = recv(rx).await.expect("stat");
        assert!(crate::stats::StatsBase::is_directory(&stats));
        assert_eq!(*order.lock(), vec!["returned", "callback"]);
    }

    #[tokio::test]
    async fn invalid_arguments_fail_synchronously() {
        let fs = Fs::std();
        let err = fs.stat("bad\0path", |_| panic!("must not run")).expect_err("nul");
        assert_eq!(err.code, "ERR_INVALID_ARG_VALUE");

        let err = fs
            .read(-1, ReadRequest::Into(Vec::new(), ReadArgs::default()), |_| {
                panic!("must not run")
            })
            .expect_err("empty buffer");
        assert_eq!(err.code, "ERR_INVALID_ARG_VALUE");
    }

    #[tokio::test]
    async fn syscall_errors_reach_the_callback() {
        let dir = tempdir().expect("tempdir");
        let fs = Fs::std();
        let (tx, rx) = oneshot::channel();
        fs.read_file(dir.path().join("missing"), ReadFileOptions::default(), move |r| {
            let _ = tx.send(r);
        })
        .expect("scheduled");
        assert_eq!(recv(rx).await.expect_err("missing").code, "ENOENT");
    }

    fn text(text: String) -> WriteRequest {
        WriteRequest::Text {
            text,
            position: None,
            encoding: Encoding::Utf8,
        }
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn writes_on_one_fd_complete_in_issue_order() {
        let dir = tempdir().expect("tempdir");
        let fs = Fs::std();
        let path = dir.path().join("order.txt");
        let fd = fs.open_sync(&path, "w", None).expect("open");
        let completed = Arc::new(Mutex::new(Vec::new()));
        for i in 0..400 {
            let completed = completed.clone();
            fs.write(fd, text(format!("{i:04},")), move |r| {
                r.expect("write");
                completed.lock().push(i);
            })
            .expect("scheduled");
        }
        let (tx, rx) = oneshot::channel();
        fs.close(fd, move |r| {
            let _ = tx.send(r);
        })
        .expect("scheduled");
        recv(rx).await.expect("close");

        assert_eq!(*completed.lock(), (0..400).collect::<Vec<_>>());
        let expected: String = (0..400).map(|i| format!("{i:04},")).collect();
        assert_eq!(std::fs::read_to_string(&path).expect("read"), expected);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn reads_see_every_write_issued_before_them() {
        let dir = tempdir().expect("tempdir");
        let fs = Fs::std();
        let path = dir.path().join("mixed.txt");
        let fd = fs.open_sync(&path, "w+", None).expect("open");
        let reads = Arc::new(Mutex::new(Vec::new()));
        for i in 0..100usize {
            fs.write(fd, text(format!("{i:03},")), |r| {
                r.expect("write");
            })
            .expect("scheduled");
            let want = (i + 1) * 4;
            let args = ReadArgs {
                position: Some(0),
                ..Default::default()
            };
            let reads = reads.clone();
            fs.read(fd, ReadRequest::Into(vec![0; want], args), move |r| {
                let (n, buffer) = r.expect("read");
                reads.lock().push((i, String::from_utf8_lossy(&buffer[..n]).into_owned()));
            })
            .expect("scheduled");
        }
        let (tx, rx) = oneshot::channel();
        fs.close(fd, move |r| {
            let _ = tx.send(r);
        })
        .expect("scheduled");
        recv(rx).await.expect("close");

        let reads = reads.lock();
        assert_eq!(reads.len(), 100);
        for (i, seen) in reads.iter() {
            let expected: String = (0..=*i).map(|j| format!("{j:03},")).collect();
            assert_eq!(seen, &expected, "read issued after write {i}");
        }
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn close_releases_the_descriptor_queue() {
        let dir = tempdir().expect("tempdir");
        let fs = Fs::std();
        let fd = fs.open_sync(dir.path().join("q"), "w", None).expect("open");
        fs.write(fd, text("x".to_string()), |_| {}).expect("scheduled");
        let (tx, rx) = oneshot::channel();
        fs.close(fd, move |r| {
            let _ = tx.send(r);
        })
        .expect("scheduled");
        recv(rx).await.expect("close");
        assert_eq!(fs.turns.len(), 0);
    }

    #[tokio::test]
    async fn read_fills_a_fresh_buffer() {
        let dir = tempdir().expect("tempdir");
        let fs = Fs::std();
        let path = dir.path().join("r.txt");
        std::fs::write(&path, b"payload").expect("seed");
        let fd = fs.open_sync(&path, "r", None).expect("open");
        let (tx, rx) = oneshot::channel();
        fs.read(fd, ReadRequest::Alloc(ReadArgs::default()), move |r| {
            let _ = tx.send(r);
        })
        .expect("scheduled");
        let (n, buffer) = recv(rx).await.expect("read");
        assert_eq!(&buffer[..n], b"payload");
        assert_eq!(buffer.len(), crate::constants::DEFAULT_READ_BUFFER);
        fs.close_sync(fd).expect("close");
    }

    #[tokio::test]
    async fn rm_removes_trees_and_tolerates_missing_with_force() {
        let dir = tempdir().expect("tempdir");
        let fs = Fs::std();
        let sub = dir.path().join("tree");
        std::fs::create_dir_all(sub.join("a/b")).expect("mkdir");
        std::fs::write(sub.join("a/b/f"), b"").expect("seed");

        let (tx, rx) = oneshot::channel();
        let recursive = RmOptions {
            recursive: true,
            ..Default::default()
        };
        fs.rm(&sub, recursive, move |r| {
            let _ = tx.send(r);
        })
        .expect("scheduled");
        recv(rx).await.expect("rm");
        assert!(!sub.exists());

        let (tx, rx) = oneshot::channel();
        let forced = RmOptions {
            force: true,
            ..Default::default()
        };
        fs.rm(&sub, forced, move |r| {
            let _ = tx.send(r);
        })
        .expect("scheduled");
        recv(rx).await.expect("missing with force");
    }

    #[test]
    fn callbacks_need_a_runtime() {
        let fs = Fs::std();
        let err = fs.stat("/", |_| {}).expect_err("no runtime");
        assert_eq!(err.code, "ERR_INTERNAL_ASSERTION");
    }
}
