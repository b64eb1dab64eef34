//! `fs.Dir`: a paginated iterator over an open directory descriptor.
//!
//! Entries are fetched from the host in batches keyed by a continuation
//! cookie and handed out one at a time. At most one read may be in flight;
//! `close` must be called exactly once.

use crate::errors::{NodeError, NodeResult};
use crate::stats::{Dirent, dirents_from_batch};
use futures_util::Stream;
use futures_util::stream;
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::fmt;
use std::future::Future;
use std::sync::Arc;
use tern_host::{Fd, HostFs};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DirState {
    Open,
    Fetching,
    Exhausted,
    Closed,
}

struct Cursor {
    fd: Fd,
    state: DirState,
    entries: VecDeque<Dirent>,
    cookie: u64,
    fin: bool,
}

impl Cursor {
    /// Pop the next buffered entry, marking the cursor exhausted at the end.
    fn next_buffered(&mut self) -> Option<Option<Dirent>> {
        if let Some(entry) = self.entries.pop_front() {
            return Some(Some(entry));
        }
        if self.fin {
            self.state = DirState::Exhausted;
            return Some(None);
        }
        None
    }
}

pub struct Dir {
    host: Arc<dyn HostFs>,
    path: String,
    cursor: Arc<Mutex<Cursor>>,
}

/// Puts a fetching cursor back to `Open` if the read future is dropped or fails.
struct FetchGuard(Arc<Mutex<Cursor>>);

impl Drop for FetchGuard {
    fn drop(&mut self) {
        let mut cursor = self.0.lock();
        if cursor.state == DirState::Fetching {
            cursor.state = DirState::Open;
        }
    }
}

enum Begin {
    Ready(Option<Dirent>),
    Fetch { fd: Fd, cookie: u64 },
}

impl Dir {
    pub(crate) fn new(host: Arc<dyn HostFs>, fd: Fd, path: String) -> Self {
        Self {
            host,
            path,
            cursor: Arc::new(Mutex::new(Cursor {
                fd,
                state: DirState::Open,
                entries: VecDeque::new(),
                cookie: 0,
                fin: false,
            })),
        }
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn state(&self) -> DirState {
        self.cursor.lock().state
    }

    /// Next entry, or `None` once the directory is exhausted.
    pub fn read_sync(&self) -> NodeResult<Option<Dirent>> {
        let mut cursor = self.cursor.lock();
        check_usable(&cursor)?;
        loop {
            if let Some(next) = cursor.next_buffered() {
                return Ok(next);
            }
            let (fd, cookie) = (cursor.fd, cursor.cookie);
            self.fetch_into(&mut cursor, fd, cookie)?;
        }
    }

    /// Asynchronous read. The state check happens when `read` is called, so a
    /// second call made while the first is pending fails with
    /// `ERR_DIR_CONCURRENT_OPERATION`.
    pub fn read(&self) -> impl Future<Output = NodeResult<Option<Dirent>>> + Send + 'static {
        let begun = self.begin_read();
        let guard = matches!(begun, Ok(Begin::Fetch { .. }))
            .then(|| FetchGuard(self.cursor.clone()));
        let host = self.host.clone();
        let path = self.path.clone();
        let cursor = self.cursor.clone();
        async move {
            let (mut fd, mut cookie) = match begun? {
                Begin::Ready(entry) => return Ok(entry),
                Begin::Fetch { fd, cookie } => (fd, cookie),
            };
            let _guard = guard;
            loop {
                tokio::task::yield_now().await;
                let batch = host
                    .freaddir(fd, cookie)
                    .map_err(|e| NodeError::from_host(&e, "scandir", Some(&path)))?;
                tracing::debug!(path = %path, count = batch.res.len(), fin = batch.fin, "dir batch");

                let mut guarded = cursor.lock();
                guarded.entries.extend(dirents_from_batch(batch.res, &path));
                guarded.fin = batch.fin;
                guarded.cookie = batch.cookie;
                guarded.state = DirState::Open;
                if let Some(next) = guarded.next_buffered() {
                    return Ok(next);
                }
                guarded.state = DirState::Fetching;
                (fd, cookie) = (guarded.fd, guarded.cookie);
            }
        }
    }

    fn begin_read(&self) -> NodeResult<Begin> {
        let mut cursor = self.cursor.lock();
        check_usable(&cursor)?;
        if let Some(next) = cursor.next_buffered() {
            return Ok(Begin::Ready(next));
        }
        cursor.state = DirState::Fetching;
        Ok(Begin::Fetch {
            fd: cursor.fd,
            cookie: cursor.cookie,
        })
    }

    fn fetch_into(&self, cursor: &mut Cursor, fd: Fd, cookie: u64) -> NodeResult<()> {
        let batch = self
            .host
            .freaddir(fd, cookie)
            .map_err(|e| NodeError::from_host(&e, "scandir", Some(&self.path)))?;
        tracing::debug!(path = %self.path, count = batch.res.len(), fin = batch.fin, "dir batch");
        cursor
            .entries
            .extend(dirents_from_batch(batch.res, &self.path));
        cursor.fin = batch.fin;
        cursor.cookie = batch.cookie;
        Ok(())
    }

    pub fn read_cb(
        &self,
        cb: impl FnOnce(NodeResult<Option<Dirent>>) + Send + 'static,
    ) -> NodeResult<()> {
        crate::callback::defer_async(self.read(), cb)
    }

    pub fn close_sync(&self) -> NodeResult<()> {
        let mut cursor = self.cursor.lock();
        match cursor.state {
            DirState::Closed => return Err(NodeError::dir_closed()),
            DirState::Fetching => return Err(NodeError::dir_concurrent_operation()),
            DirState::Open | DirState::Exhausted => {}
        }
        cursor.state = DirState::Closed;
        cursor.entries.clear();
        self.host
            .close(cursor.fd)
            .map_err(|e| NodeError::from_host(&e, "closedir", Some(&self.path)))
    }

    /// Close asynchronously; state errors are decided at call time.
    pub fn close(&self) -> impl Future<Output = NodeResult<()>> + Send + 'static {
        let closed = self.close_sync();
        async move {
            tokio::task::yield_now().await;
            closed
        }
    }

    pub fn close_cb(&self, cb: impl FnOnce(NodeResult<()>) + Send + 'static) -> NodeResult<()> {
        crate::callback::defer_async(self.close(), cb)
    }

    /// Iterate the remaining entries, closing the directory when done.
    pub fn entries(self) -> impl Stream<Item = NodeResult<Dirent>> + Send + 'static {
        stream::unfold(Some(self), |dir| async move {
            let dir = dir?;
            match dir.read().await {
                Ok(Some(entry)) => Some((Ok(entry), Some(dir))),
                Ok(None) => match dir.close().await {
                    Ok(()) => None,
                    Err(e) => Some((Err(e), None)),
                },
                Err(e) => {
                    let _ = dir.close_sync();
                    Some((Err(e), None))
                }
            }
        })
    }
}

impl Drop for Dir {
    fn drop(&mut self) {
        let mut cursor = self.cursor.lock();
        if cursor.state != DirState::Closed {
            cursor.state = DirState::Closed;
            let _ = self.host.close(cursor.fd);
        }
    }
}

fn check_usable(cursor: &Cursor) -> NodeResult<()> {
    match cursor.state {
        DirState::Closed => Err(NodeError::dir_closed()),
        DirState::Fetching => Err(NodeError::dir_concurrent_operation()),
        DirState::Open | DirState::Exhausted => Ok(()),
    }
}

impl fmt::Debug for Dir {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let cursor = self.cursor.lock();
        f.debug_struct("Dir")
            .field("path", &self.path)
            .field("fd", &cursor.fd)
            .field("state", &cursor.state)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ops::Fs;
    use crate::options::OpendirOptions;
    use futures_util::StreamExt;
    use tempfile::tempdir;

    fn populated(n: usize) -> tempfile::TempDir {
        let dir = tempdir().expect("tempdir");
        for i in 0..n {
            std::fs::write(dir.path().join(format!("f{i:03}")), b"").expect("seed");
        }
        dir
    }

    #[test]
    fn read_sync_spans_several_batches() {
        let dir = populated(70);
        let fs = Fs::std();
        let handle = fs
            .opendir_sync(dir.path(), OpendirOptions::default())
            .expect("opendir");
        let mut names = Vec::new();
        while let Some(entry) = handle.read_sync().expect("read") {
            names.push(entry.name);
        }
        names.sort();
        assert_eq!(names.len(), 70);
        assert_eq!(names[0], "f000");
        assert_eq!(handle.state(), DirState::Exhausted);
        assert!(handle.read_sync().expect("still exhausted").is_none());
        handle.close_sync().expect("close");
    }

    #[test]
    fn close_twice_reports_closed() {
        let dir = populated(1);
        let fs = Fs::std();
        let handle = fs
            .opendir_sync(dir.path(), OpendirOptions::default())
            .expect("opendir");
        handle.close_sync().expect("close");
        assert_eq!(handle.close_sync().expect_err("closed").code, "ERR_DIR_CLOSED");
        assert_eq!(handle.read_sync().expect_err("closed").code, "ERR_DIR_CLOSED");
    }

    #[tokio::test]
    async fn concurrent_read_is_rejected() {
        let dir = populated(3);
        let fs = Fs::std();
        let handle = fs
            .opendir_sync(dir.path(), OpendirOptions::default())
            .expect("opendir");
        let first = handle.read();
        let second = handle.read().await;
        assert_eq!(
            second.expect_err("busy").code,
            "ERR_DIR_CONCURRENT_OPERATION"
        );
        assert_eq!(
            handle.close_sync().expect_err("busy").code,
            "ERR_DIR_CONCURRENT_OPERATION"
        );
        assert!(first.await.expect("read").is_some());
        assert_eq!(handle.state(), DirState::Open);
        handle.close().await.expect("close");
    }

    #[tokio::test]
    async fn dropped_read_releases_the_cursor() {
        let dir = populated(2);
        let fs = Fs::std();
        let handle = fs
            .opendir_sync(dir.path(), OpendirOptions::default())
            .expect("opendir");
        let pending = handle.read();
        assert_eq!(handle.state(), DirState::Fetching);
        drop(pending);
        assert_eq!(handle.state(), DirState::Open);
        assert!(handle.read().await.expect("read").is_some());
        handle.close_sync().expect("close");
    }

    #[tokio::test]
    async fn entries_stream_yields_everything_then_closes() {
        let dir = populated(5);
        let fs = Fs::std();
        let handle = fs
            .opendir_sync(dir.path(), OpendirOptions::default())
            .expect("opendir");
        let entries: Vec<_> = handle.entries().collect().await;
        assert_eq!(entries.len(), 5);
        assert!(entries.iter().all(|e| e.as_ref().is_ok_and(|d| d.is_file())));
    }

    #[test]
    fn opendir_on_file_is_enotdir() {
        let dir = populated(1);
        let fs = Fs::std();
        let err = fs
            .opendir_sync(dir.path().join("f000"), OpendirOptions::default())
            .expect_err("file");
        assert_eq!(err.code, "ENOTDIR");
        assert_eq!(err.syscall.as_deref(), Some("opendir"));
    }
}
