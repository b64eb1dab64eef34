//! `fs/promises`.
//!
//! Every operation is the callback variant turned into a future: the callback
//! sends its result over a oneshot channel that the returned future awaits.
//! `open` hands back a [`FileHandle`]; `readFile`, `writeFile` and `truncate`
//! on paths go through one.

use crate::dir::Dir;
use crate::errors::{NodeError, NodeResult};
use crate::file_handle::FileHandle;
use crate::ops::{Contents, Data, FileTarget, Fs, TimeLike};
use crate::options::{
    AppendFileOptions, CpOptions, MkdirOptions, OpendirOptions, ReadFileOptions, RmOptions,
    RmdirOptions, StatOptions, WriteFileOptions,
};
use crate::stats::{AnyStats, Dirent, Stats};
use crate::validators::{Flags, PathLike, get_validated_path};
use tokio::sync::oneshot;

pub(crate) type Callback<T> = Box<dyn FnOnce(NodeResult<T>) + Send>;

/// Start a callback operation and await its result.
pub(crate) async fn promisify<T, S>(start: S) -> NodeResult<T>
where
    T: Send + 'static,
    S: FnOnce(Callback<T>) -> NodeResult<()>,
{
    let (tx, rx) = oneshot::channel();
    start(Box::new(move |result| {
        let _ = tx.send(result);
    }))?;
    rx.await
        .map_err(|_| NodeError::internal("fs callback dropped without a result"))?
}

macro_rules! promise_path_op {
    ($name:ident ( $($arg:ident : $ty:ty),* ) -> $out:ty) => {
        pub async fn $name(&self, path: impl Into<PathLike>, $($arg: $ty),*) -> NodeResult<$out> {
            let path = path.into();
            promisify::<$out, _>(|cb| self.fs.$name(path, $($arg,)* cb)).await
        }
    };
}

macro_rules! promise_two_path_op {
    ($name:ident ( $($arg:ident : $ty:ty),* )) => {
        pub async fn $name(
            &self,
            from: impl Into<PathLike>,
            to: impl Into<PathLike>,
            $($arg: $ty),*
        ) -> NodeResult<()> {
            let (from, to) = (from.into(), to.into());
            promisify::<(), _>(|cb| self.fs.$name(from, to, $($arg,)* cb)).await
        }
    };
}

/// Promise-returning view of an [`Fs`].
#[derive(Debug, Clone)]
pub struct FsPromises {
    fs: Fs,
}

impl Fs {
    pub fn promises(&self) -> FsPromises {
        FsPromises { fs: self.clone() }
    }
}

impl FsPromises {
    promise_path_op!(access(mode: Option<u32>) -> ());
    promise_path_op!(stat() -> Stats);
    promise_path_op!(stat_with(options: StatOptions) -> Option<AnyStats>);
    promise_path_op!(lstat() -> Stats);
    promise_path_op!(lstat_with(options: StatOptions) -> Option<AnyStats>);
    promise_path_op!(mkdir(options: MkdirOptions) -> Option<String>);
    promise_path_op!(rmdir(options: RmdirOptions) -> ());
    promise_path_op!(rm(options: RmOptions) -> ());
    promise_path_op!(unlink() -> ());
    promise_path_op!(readdir() -> Vec<String>);
    promise_path_op!(readdir_dirents() -> Vec<Dirent>);
    promise_path_op!(opendir(options: OpendirOptions) -> Dir);
    promise_path_op!(readlink() -> String);
    promise_path_op!(realpath() -> String);
    promise_path_op!(utimes(atime: TimeLike, mtime: TimeLike) -> ());
    promise_path_op!(lutimes(atime: TimeLike, mtime: TimeLike) -> ());
    promise_path_op!(chmod(mode: u32) -> ());
    promise_path_op!(lchmod(mode: u32) -> ());
    promise_path_op!(chown(uid: u32, gid: u32) -> ());
    promise_path_op!(lchown(uid: u32, gid: u32) -> ());

    promise_two_path_op!(rename());
    promise_two_path_op!(copy_file(mode: u32));
    promise_two_path_op!(link());
    promise_two_path_op!(symlink());
    promise_two_path_op!(cp(options: CpOptions));

    pub async fn mkdtemp(&self, prefix: impl Into<PathLike>) -> NodeResult<String> {
        let prefix = prefix.into();
        promisify(|cb| self.fs.mkdtemp(prefix, cb)).await
    }

    pub async fn open(
        &self,
        path: impl Into<PathLike>,
        flags: impl Into<Flags>,
        mode: Option<u32>,
    ) -> NodeResult<FileHandle> {
        let path = get_validated_path(path, "path")?;
        let flags = flags.into();
        let fd = promisify(|cb| self.fs.open(path.clone(), flags, mode, cb)).await?;
        Ok(FileHandle::new(self.fs.clone(), fd, Some(path)))
    }

    pub async fn read_file(
        &self,
        target: impl Into<FileTarget>,
        options: impl Into<ReadFileOptions>,
    ) -> NodeResult<Contents> {
        let options = options.into();
        match target.into() {
            FileTarget::Fd(fd) => promisify(|cb| self.fs.read_file(fd, options, cb)).await,
            FileTarget::Path(path) => {
                let handle = self.open(path, options.flag.clone(), None).await?;
                let read = handle.read_file(options).await;
                let closed = handle.close().await;
                let contents = read?;
                closed?;
                Ok(contents)
            }
        }
    }

    pub async fn write_file(
        &self,
        target: impl Into<FileTarget>,
        data: impl Into<Data>,
        options: impl Into<WriteFileOptions>,
    ) -> NodeResult<()> {
        let options = options.into();
        let data = data.into();
        match target.into() {
            FileTarget::Fd(fd) => {
                promisify(|cb| self.fs.write_file(fd, data, options, cb)).await
            }
            FileTarget::Path(path) => {
                let handle = self
                    .open(path, options.flag.clone(), Some(options.mode))
                    .await?;
                let written = handle.write_file(data, options).await;
                let closed = handle.close().await;
                written?;
                closed
            }
        }
    }

    pub async fn append_file(
        &self,
        target: impl Into<FileTarget>,
        data: impl Into<Data>,
        options: impl Into<AppendFileOptions>,
    ) -> NodeResult<()> {
        self.write_file(target, data, WriteFileOptions::from(options.into()))
            .await
    }

    /// Truncate through a handle opened with `r+`.
    pub async fn truncate(&self, path: impl Into<PathLike>, len: u64) -> NodeResult<()> {
        let handle = self.open(path, "r+", None).await?;
        let truncated = handle.truncate(len).await;
        let closed = handle.close().await;
        truncated?;
        closed
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::encoding::Encoding;
    use crate::stats::StatsBase;
    use tempfile::tempdir;

    #[tokio::test]
    async fn write_then_read_through_promises() {
        let dir = tempdir().expect("tempdir");
        let fs = Fs::std().promises();
        let path = dir.path().join("p.txt");
        fs.write_file(&path, "promised", WriteFileOptions::default())
            .await
            .expect("write");
        fs.append_file(&path, "!", AppendFileOptions::default())
            .await
            .expect("append");
        let text = fs.read_file(&path, Encoding::Utf8).await.expect("read");
        assert_eq!(text, Contents::String("promised!".to_string()));
        assert!(fs.stat(&path).await.expect("stat").is_file());
    }

    #[tokio::test]
    async fn truncate_goes_through_a_handle() {
        let dir = tempdir().expect("tempdir");
        let fs = Fs::std().promises();
        let path = dir.path().join("t.txt");
        std::fs::write(&path, b"0123456789").expect("seed");
        fs.truncate(&path, 3).await.expect("truncate");
        assert_eq!(std::fs::read(&path).expect("read"), b"012");
        let err = fs
            .truncate(dir.path().join("missing"), 0)
            .await
            .expect_err("missing");
        assert_eq!(err.code, "ENOENT");
    }

    #[tokio::test]
    async fn rename_rejects_existing_destination() {
        let dir = tempdir().expect("tempdir");
        let fs = Fs::std().promises();
        let a = dir.path().join("a");
        let b = dir.path().join("b");
        std::fs::write(&a, b"a").expect("seed");
        std::fs::write(&b, b"b").expect("seed");
        let err = fs.rename(&a, &b).await.expect_err("exists");
        assert_eq!(err.code, "EEXIST");
        assert_eq!(err.syscall.as_deref(), Some("rename"));
    }

    #[tokio::test]
    async fn mkdir_and_readdir() {
        let dir = tempdir().expect("tempdir");
        let fs = Fs::std().promises();
        let nested = dir.path().join("x/y");
        let first = fs
            .mkdir(
                &nested,
                MkdirOptions {
                    recursive: true,
                    ..Default::default()
                },
            )
            .await
            .expect("mkdir");
        assert_eq!(first.as_deref(), dir.path().join("x").to_str());
        assert_eq!(fs.readdir(dir.path().join("x")).await.expect("readdir"), vec!["y"]);
    }

    #[tokio::test]
    async fn validation_errors_reject_without_io() {
        let fs = Fs::std().promises();
        let err = fs.open("a\0b", "r", None).await.expect_err("nul");
        assert_eq!(err.code, "ERR_INVALID_ARG_VALUE");
        let err = fs.open("/tmp/x", "nope", None).await.expect_err("flags");
        assert_eq!(err.code, "ERR_INVALID_ARG_VALUE");
    }
}
