//! `fs.ReadStream` and `fs.WriteStream`.
//!
//! Both own their descriptor from the first operation until `destroy`, the
//! end of the data, or drop, whichever comes first.

use crate::encoding::Encoding;
use crate::errors::{NodeError, NodeResult};
use crate::events::{Emitter, FsEvent};
use crate::ops::{Data, FileTarget, Fs};
use crate::options::{ReadStreamOptions, WriteStreamOptions};
use crate::validators::{Flags, get_validated_path, string_to_flags, validate_fd};
use bytes::Bytes;
use futures_util::Stream;
use futures_util::stream;
use tern_host::Fd;

/// Lifecycle of a file stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamState {
    /// Not opened yet.
    Pending,
    Open,
    /// All data read, or `end` called.
    Ended,
    Destroyed,
}

/// Where a stream gets its descriptor from.
#[derive(Debug)]
enum Source {
    Path { path: String, flags: u32, mode: u32 },
    Fd(Fd),
}

impl Source {
    fn resolve(target: FileTarget, fd: Option<Fd>, flags: Flags, mode: u32) -> NodeResult<Self> {
        if let Some(fd) = fd {
            return Ok(Self::Fd(validate_fd(fd)?));
        }
        match target {
            FileTarget::Fd(fd) => Ok(Self::Fd(validate_fd(fd)?)),
            FileTarget::Path(path) => Ok(Self::Path {
                path: get_validated_path(path, "path")?,
                flags: string_to_flags(flags)?,
                mode,
            }),
        }
    }

    fn path(&self) -> Option<&str> {
        match self {
            Self::Path { path, .. } => Some(path),
            Self::Fd(_) => None,
        }
    }
}

/// Shared open/close plumbing of both stream kinds.
#[derive(Debug)]
struct FileSlot {
    fs: Fs,
    source: Source,
    fd: Option<Fd>,
    auto_close: bool,
    emit_close: bool,
    state: StreamState,
    events: Emitter,
}

impl FileSlot {
    fn new(fs: Fs, source: Source, auto_close: bool, emit_close: bool) -> Self {
        Self {
            fs,
            source,
            fd: None,
            auto_close,
            emit_close,
            state: StreamState::Pending,
            events: Emitter::new(),
        }
    }

    /// Open on first use; emits `open` (for paths) and `ready`.
    async fn ensure_open(&mut self) -> NodeResult<Fd> {
        if let Some(fd) = self.fd {
            return Ok(fd);
        }
        let fd = match &self.source {
            Source::Fd(fd) => *fd,
            Source::Path { path, flags, mode } => {
                let (path, flags, mode) = (path.clone(), *flags, *mode);
                let fs = self.fs.clone();
                let fd = crate::promises::promisify(|cb| fs.open(path, flags, Some(mode), cb))
                    .await
                    .inspect_err(|e| {
                        self.state = StreamState::Destroyed;
                        self.events.emit(&FsEvent::Error(e.clone()));
                    })?;
                self.events.emit(&FsEvent::Open(fd));
                fd
            }
        };
        self.fd = Some(fd);
        self.state = StreamState::Open;
        self.events.emit(&FsEvent::Ready);
        Ok(fd)
    }

    /// Release the descriptor if the stream owns it.
    fn release(&mut self) -> NodeResult<()> {
        let Some(fd) = self.fd.take() else {
            return Ok(());
        };
        if self.auto_close {
            self.fs.close_sync(fd)?;
        }
        if self.emit_close {
            self.events.emit(&FsEvent::Close);
        }
        Ok(())
    }

    fn destroy(&mut self, error: Option<NodeError>) -> NodeResult<()> {
        if self.state == StreamState::Destroyed {
            return Ok(());
        }
        self.state = StreamState::Destroyed;
        if let Some(error) = error {
            self.events.emit(&FsEvent::Error(error));
        }
        self.release()
    }
}

impl Drop for FileSlot {
    fn drop(&mut self) {
        if self.auto_close
            && let Some(fd) = self.fd.take()
        {
            let _ = self.fs.close_sync(fd);
        }
    }
}

/// Reads a file in chunks of up to `high_water_mark` bytes.
#[derive(Debug)]
pub struct ReadStream {
    slot: FileSlot,
    encoding: Option<Encoding>,
    high_water_mark: usize,
    /// Next read position; `None` reads from the descriptor's current position.
    cur_pos: Option<u64>,
    /// Inclusive last offset to read.
    end: Option<u64>,
    end_resolved: bool,
    bytes_read: u64,
}

impl Fs {
    pub fn create_read_stream(
        &self,
        target: impl Into<FileTarget>,
        options: ReadStreamOptions,
    ) -> NodeResult<ReadStream> {
        if let (Some(start), Some(end)) = (options.start, options.end)
            && start > end
        {
            return Err(NodeError::out_of_range(
                "start",
                &format!("<= \"end\" (here: {end})"),
                start,
            ));
        }
        if options.high_water_mark == 0 {
            return Err(NodeError::out_of_range("highWaterMark", ">= 1", 0));
        }
        let source = Source::resolve(target.into(), options.fd, options.flags, options.mode)?;
        Ok(ReadStream {
            slot: FileSlot::new(self.clone(), source, options.auto_close, options.emit_close),
            encoding: options.encoding,
            high_water_mark: options.high_water_mark,
            cur_pos: options.start,
            end: options.end,
            end_resolved: false,
            bytes_read: 0,
        })
    }

    pub fn create_write_stream(
        &self,
        target: impl Into<FileTarget>,
        options: WriteStreamOptions,
    ) -> NodeResult<WriteStream> {
        let source = Source::resolve(target.into(), options.fd, options.flags, options.mode)?;
        Ok(WriteStream {
            slot: FileSlot::new(self.clone(), source, options.auto_close, options.emit_close),
            encoding: options.encoding,
            pos: options.start,
            bytes_written: 0,
        })
    }
}

impl ReadStream {
    pub fn path(&self) -> Option<&str> {
        self.slot.source.path()
    }

    pub fn fd(&self) -> Option<Fd> {
        self.slot.fd
    }

    pub fn bytes_read(&self) -> u64 {
        self.bytes_read
    }

    pub fn state(&self) -> StreamState {
        self.slot.state
    }

    pub fn encoding(&self) -> Option<Encoding> {
        self.encoding
    }

    pub fn on(&self, event: &'static str, listener: impl Fn(&FsEvent) + Send + Sync + 'static) -> u64 {
        self.slot.events.on(event, listener)
    }

    /// Next chunk, or `None` at end of data.
    pub async fn read_chunk(&mut self) -> NodeResult<Option<Bytes>> {
        match self.slot.state {
            StreamState::Destroyed => return Err(NodeError::stream_destroyed("read")),
            StreamState::Ended => return Ok(None),
            StreamState::Pending | StreamState::Open => {}
        }
        let fd = self.slot.ensure_open().await?;
        if !self.end_resolved {
            self.end_resolved = true;
            if self.end.is_none() {
                self.end = self.regular_file_end(fd)?;
            }
        }

        let want = self.next_len();
        let data = if want == 0 {
            Vec::new()
        } else {
            match self.slot.fs.fread(fd, self.cur_pos, want).await {
                Ok(data) => data,
                Err(e) => {
                    self.slot.destroy(Some(e.clone()))?;
                    return Err(e);
                }
            }
        };

        if data.is_empty() {
            self.slot.state = StreamState::Ended;
            self.slot.events.emit(&FsEvent::End);
            self.slot.release()?;
            return Ok(None);
        }
        if let Some(pos) = self.cur_pos.as_mut() {
            *pos += data.len() as u64;
        }
        self.bytes_read += data.len() as u64;
        let chunk = Bytes::from(data);
        self.slot.events.emit(&FsEvent::Data(chunk.clone()));
        Ok(Some(chunk))
    }

    /// Effective end of a regular file opened without an explicit `end`.
    fn regular_file_end(&self, fd: Fd) -> NodeResult<Option<u64>> {
        let size = self.slot.fs.checked_file_size(fd)?;
        Ok(size.map(|size| size.saturating_sub(1)))
    }

    fn next_len(&self) -> usize {
        let Some(end) = self.end else {
            return self.high_water_mark;
        };
        let from = self.cur_pos.unwrap_or(self.bytes_read);
        if from > end {
            return 0;
        }
        let remaining = end - from + 1;
        remaining.min(self.high_water_mark as u64) as usize
    }

    /// Drain the rest of the stream and decode it with the stream's encoding.
    pub async fn read_to_string(&mut self) -> NodeResult<String> {
        let mut data = Vec::new();
        while let Some(chunk) = self.read_chunk().await? {
            data.extend_from_slice(&chunk);
        }
        Ok(self.encoding.unwrap_or_default().decode(&data))
    }

    pub fn destroy(&mut self, error: Option<NodeError>) -> NodeResult<()> {
        self.slot.destroy(error)
    }

    pub fn into_stream(self) -> impl Stream<Item = NodeResult<Bytes>> + Send + 'static {
        stream::unfold(Some(self), |stream| async move {
            let mut stream = stream?;
            match stream.read_chunk().await {
                Ok(Some(chunk)) => Some((Ok(chunk), Some(stream))),
                Ok(None) => None,
                Err(e) => Some((Err(e), None)),
            }
        })
    }
}

/// Writes chunks to a file, opening it on the first write.
#[derive(Debug)]
pub struct WriteStream {
    slot: FileSlot,
    encoding: Encoding,
    pos: Option<u64>,
    bytes_written: u64,
}

impl WriteStream {
    pub fn path(&self) -> Option<&str> {
        self.slot.source.path()
    }

    pub fn fd(&self) -> Option<Fd> {
        self.slot.fd
    }

    pub fn bytes_written(&self) -> u64 {
        self.bytes_written
    }

    pub fn state(&self) -> StreamState {
        self.slot.state
    }

    pub fn on(&self, event: &'static str, listener: impl Fn(&FsEvent) + Send + Sync + 'static) -> u64 {
        self.slot.events.on(event, listener)
    }

    /// Open the file now instead of on the first write.
    pub async fn open(&mut self) -> NodeResult<Fd> {
        self.slot.ensure_open().await
    }

    pub async fn write(&mut self, data: impl Into<Data>) -> NodeResult<usize> {
        match self.slot.state {
            StreamState::Destroyed => return Err(NodeError::stream_destroyed("write")),
            StreamState::Ended => return Err(NodeError::write_after_end()),
            StreamState::Pending | StreamState::Open => {}
        }
        let fd = self.slot.ensure_open().await?;
        let bytes = data.into().into_bytes(self.encoding);
        let written = match self.slot.fs.fwrite(fd, self.pos, bytes).await {
            Ok(n) => n,
            Err(e) => {
                self.slot.destroy(Some(e.clone()))?;
                return Err(e);
            }
        };
        if let Some(pos) = self.pos.as_mut() {
            *pos += written as u64;
        }
        self.bytes_written += written as u64;
        Ok(written)
    }

    /// Write an optional last chunk, emit `finish` and release the file.
    pub async fn end(&mut self, data: Option<Data>) -> NodeResult<()> {
        if let Some(data) = data {
            self.write(data).await?;
        } else if self.slot.state == StreamState::Pending {
            self.slot.ensure_open().await?;
        }
        if self.slot.state == StreamState::Ended {
            return Ok(());
        }
        self.slot.state = StreamState::Ended;
        self.slot.events.emit(&FsEvent::Finish);
        self.slot.release()
    }

    pub fn destroy(&mut self, error: Option<NodeError>) -> NodeResult<()> {
        self.slot.destroy(error)
    }
}
