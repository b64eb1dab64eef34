//! `std::fs` backed host.
//!
//! Descriptors are small integers allocated from a per-host table. Directory
//! descriptors snapshot their entries (including `.` and `..`) when opened and
//! serve them back in fixed-size batches addressed by a numeric cookie.

use crate::error::{HostError, HostResult};
use crate::flags::{O_DIRECTORY, OpenFlags};
use crate::host::{Fd, HostFs};
use crate::types::{FileType, RawDirent, RawStat, ReaddirBatch};
use futures_util::FutureExt;
use futures_util::future::BoxFuture;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::io::{self, Read, Seek, SeekFrom, Write};
use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicI32, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

/// Entries returned per `freaddir` call.
pub const READDIR_BATCH: usize = 32;

/// First descriptor handed out; 0-2 stay reserved for stdio.
const FIRST_FD: Fd = 3;

struct OpenFile {
    path: String,
    file: Mutex<std::fs::File>,
    /// FIFO turn for async operations on this descriptor.
    turn: Arc<tokio::sync::Mutex<()>>,
}

enum Slot {
    File(Arc<OpenFile>),
    Dir { path: String, entries: Arc<Vec<RawDirent>> },
}

pub struct StdHost {
    next_fd: AtomicI32,
    slots: Mutex<HashMap<Fd, Slot>>,
}

impl StdHost {
    pub fn new() -> Self {
        Self {
            next_fd: AtomicI32::new(FIRST_FD),
            slots: Mutex::new(HashMap::new()),
        }
    }

    /// Number of descriptors currently open.
    pub fn open_count(&self) -> usize {
        self.slots.lock().len()
    }

    fn insert(&self, slot: Slot) -> Fd {
        let fd = self.next_fd.fetch_add(1, Ordering::Relaxed);
        self.slots.lock().insert(fd, slot);
        fd
    }

    fn file(&self, fd: Fd) -> HostResult<Arc<OpenFile>> {
        match self.slots.lock().get(&fd) {
            Some(Slot::File(file)) => Ok(file.clone()),
            Some(Slot::Dir { .. }) => Err(HostError::new("ISDIR", "descriptor refers to a directory")),
            None => Err(HostError::bad_fd(fd)),
        }
    }

    fn open_dir(&self, path: &str) -> HostResult<Fd> {
        let mut entries = vec![
            RawDirent {
                name: ".".to_string(),
                filetype: FileType::Directory,
            },
            RawDirent {
                name: "..".to_string(),
                filetype: FileType::Directory,
            },
        ];
        for entry in std::fs::read_dir(path)? {
            let entry = entry?;
            let filetype = entry
                .file_type()
                .map(FileType::from_std)
                .unwrap_or(FileType::Unknown);
            entries.push(RawDirent {
                name: entry.file_name().to_string_lossy().into_owned(),
                filetype,
            });
        }
        let fd = self.insert(Slot::Dir {
            path: path.to_string(),
            entries: Arc::new(entries),
        });
        tracing::trace!(fd, path, "opened directory descriptor");
        Ok(fd)
    }
}

impl Default for StdHost {
    fn default() -> Self {
        Self::new()
    }
}

impl HostFs for StdHost {
    fn open(&self, path: &str, flags: u32, mode: u32) -> HostResult<Fd> {
        let decoded = OpenFlags::from_bits(flags);
        if let Ok(meta) = std::fs::metadata(path)
            && meta.is_dir()
        {
            if !decoded.is_read_only() {
                return Err(HostError::new("ISDIR", format!("'{path}' is a directory")));
            }
            return self.open_dir(path);
        }
        if flags & O_DIRECTORY != 0 {
            return Err(HostError::new("NOTDIR", format!("'{path}' is not a directory")));
        }

        let mut options = std::fs::OpenOptions::new();
        decoded.apply(&mut options);
        #[cfg(unix)]
        {
            use std::os::unix::fs::OpenOptionsExt;
            options.mode(mode);
        }
        #[cfg(not(unix))]
        let _ = mode;

        let file = options.open(path)?;
        let fd = self.insert(Slot::File(Arc::new(OpenFile {
            path: path.to_string(),
            file: Mutex::new(file),
            turn: Arc::new(tokio::sync::Mutex::new(())),
        })));
        tracing::trace!(fd, path, flags, "opened file descriptor");
        Ok(fd)
    }

    fn close(&self, fd: Fd) -> HostResult<()> {
        match self.slots.lock().remove(&fd) {
            Some(_) => {
                tracing::trace!(fd, "closed descriptor");
                Ok(())
            }
            None => Err(HostError::bad_fd(fd)),
        }
    }

    fn stat(&self, path: &str) -> HostResult<RawStat> {
        Ok(metadata_to_raw(&std::fs::metadata(path)?))
    }

    fn lstat(&self, path: &str) -> HostResult<RawStat> {
        Ok(metadata_to_raw(&std::fs::symlink_metadata(path)?))
    }

    fn fstat(&self, fd: Fd) -> HostResult<RawStat> {
        let path = match self.slots.lock().get(&fd) {
            Some(Slot::File(open)) => {
                let meta = open.file.lock().metadata()?;
                return Ok(metadata_to_raw(&meta));
            }
            Some(Slot::Dir { path, .. }) => path.clone(),
            None => return Err(HostError::bad_fd(fd)),
        };
        self.stat(&path)
    }

    fn fread(&self, fd: Fd, position: Option<u64>, len: usize) -> HostResult<Vec<u8>> {
        let open = self.file(fd)?;
        let mut file = open.file.lock();
        Ok(read_at(&mut file, position, len)?)
    }

    fn fwrite(&self, fd: Fd, position: Option<u64>, bytes: &[u8]) -> HostResult<usize> {
        let open = self.file(fd)?;
        let mut file = open.file.lock();
        Ok(write_at(&mut file, position, bytes)?)
    }

    fn fread_async(
        &self,
        fd: Fd,
        position: Option<u64>,
        len: usize,
    ) -> BoxFuture<'static, HostResult<Vec<u8>>> {
        let open = match self.file(fd) {
            Ok(open) => open,
            Err(e) => return futures_util::future::ready(Err(e)).boxed(),
        };
        async move {
            let _turn = open.turn.clone().lock_owned().await;
            tokio::task::spawn_blocking(move || {
                let mut file = open.file.lock();
                read_at(&mut file, position, len).map_err(HostError::from)
            })
            .await
            .map_err(|e| HostError::new("IO", e.to_string()))?
        }
        .boxed()
    }

    fn fwrite_async(
        &self,
        fd: Fd,
        position: Option<u64>,
        bytes: Vec<u8>,
    ) -> BoxFuture<'static, HostResult<usize>> {
        let open = match self.file(fd) {
            Ok(open) => open,
            Err(e) => return futures_util::future::ready(Err(e)).boxed(),
        };
        async move {
            let _turn = open.turn.clone().lock_owned().await;
            tokio::task::spawn_blocking(move || {
                let mut file = open.file.lock();
                write_at(&mut file, position, &bytes).map_err(HostError::from)
            })
            .await
            .map_err(|e| HostError::new("IO", e.to_string()))?
        }
        .boxed()
    }

    fn freaddir(&self, fd: Fd, cookie: u64) -> HostResult<ReaddirBatch> {
        let entries = match self.slots.lock().get(&fd) {
            Some(Slot::Dir { entries, .. }) => entries.clone(),
            Some(Slot::File(open)) => {
                return Err(HostError::new(
                    "NOTDIR",
                    format!("'{}' is not a directory", open.path),
                ));
            }
            None => return Err(HostError::bad_fd(fd)),
        };
        let start = usize::try_from(cookie)
            .unwrap_or(usize::MAX)
            .min(entries.len());
        let end = (start + READDIR_BATCH).min(entries.len());
        Ok(ReaddirBatch {
            res: entries[start..end].to_vec(),
            fin: end == entries.len(),
            cookie: end as u64,
        })
    }

    fn mkdir(&self, path: &str, recursive: bool, mode: u32) -> HostResult<()> {
        let mut builder = std::fs::DirBuilder::new();
        builder.recursive(recursive);
        #[cfg(unix)]
        {
            use std::os::unix::fs::DirBuilderExt;
            builder.mode(mode);
        }
        #[cfg(not(unix))]
        let _ = mode;
        builder.create(path)?;
        Ok(())
    }

    fn rmdir(&self, path: &str, recursive: bool) -> HostResult<()> {
        if recursive {
            std::fs::remove_dir_all(path)?;
        } else {
            std::fs::remove_dir(path)?;
        }
        Ok(())
    }

    fn rm(&self, path: &str, recursive: bool, force: bool) -> HostResult<()> {
        let result = std::fs::symlink_metadata(path).and_then(|meta| {
            if meta.is_dir() {
                if recursive {
                    std::fs::remove_dir_all(path)
                } else {
                    std::fs::remove_dir(path)
                }
            } else {
                std::fs::remove_file(path)
            }
        });
        match result {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == io::ErrorKind::NotFound && force => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    fn rename(&self, from: &str, to: &str) -> HostResult<()> {
        std::fs::rename(from, to)?;
        Ok(())
    }

    fn copy_file(&self, src: &str, dst: &str) -> HostResult<()> {
        std::fs::copy(src, dst)?;
        Ok(())
    }

    fn link(&self, existing: &str, new_path: &str) -> HostResult<()> {
        std::fs::hard_link(existing, new_path)?;
        Ok(())
    }

    fn symlink(&self, target: &str, path: &str) -> HostResult<()> {
        create_symlink(Path::new(target), Path::new(path))?;
        Ok(())
    }

    fn readlink(&self, path: &str) -> HostResult<String> {
        Ok(std::fs::read_link(path)?.to_string_lossy().into_owned())
    }

    fn realpath(&self, path: &str) -> HostResult<String> {
        Ok(dunce::canonicalize(path)?.to_string_lossy().into_owned())
    }

    fn truncate(&self, path: &str, len: u64) -> HostResult<()> {
        let file = std::fs::OpenOptions::new().write(true).open(path)?;
        file.set_len(len)?;
        Ok(())
    }

    fn ftruncate(&self, fd: Fd, len: u64) -> HostResult<()> {
        let open = self.file(fd)?;
        open.file.lock().set_len(len)?;
        Ok(())
    }

    fn utime(&self, path: &str, atime_ms: f64, mtime_ms: f64) -> HostResult<()> {
        filetime::set_file_times(path, file_time(atime_ms), file_time(mtime_ms))?;
        Ok(())
    }

    fn lutime(&self, path: &str, atime_ms: f64, mtime_ms: f64) -> HostResult<()> {
        filetime::set_symlink_file_times(path, file_time(atime_ms), file_time(mtime_ms))?;
        Ok(())
    }

    fn futime(&self, fd: Fd, atime_ms: f64, mtime_ms: f64) -> HostResult<()> {
        let open = self.file(fd)?;
        let file = open.file.lock();
        filetime::set_file_handle_times(
            &file,
            Some(file_time(atime_ms)),
            Some(file_time(mtime_ms)),
        )?;
        Ok(())
    }

    fn fsync(&self, fd: Fd) -> HostResult<()> {
        self.file(fd)?.file.lock().sync_all()?;
        Ok(())
    }

    fn fdatasync(&self, fd: Fd) -> HostResult<()> {
        self.file(fd)?.file.lock().sync_data()?;
        Ok(())
    }
}

/// Positional reads restore the cursor afterwards so they never disturb
/// sequential reads on the same descriptor.
/// Positional reads restore the cursor afterwards so they never disturb
/// sequential reads on the same descriptor.
fn read_at(file: &mut std::fs::File, position: Option<u64>, len: usize) -> io::Result<Vec<u8>> {
    let previous = match position {
        Some(pos) => {
            let prev = file.stream_position()?;
            file.seek(SeekFrom::Start(pos))?;
            Some(prev)
        }
        None => None,
    };

    let mut buf = vec![0_u8; len];
    let mut filled = 0;
    while filled < len {
        match file.read(&mut buf[filled..]) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        }
    }
    buf.truncate(filled);

    if let Some(prev) = previous {
        file.seek(SeekFrom::Start(prev))?;
    }
    Ok(buf)
}

fn write_at(file: &mut std::fs::File, position: Option<u64>, bytes: &[u8]) -> io::Result<usize> {
    let previous = match position {
        Some(pos) => {
            let prev = file.stream_position()?;
            file.seek(SeekFrom::Start(pos))?;
            Some(prev)
        }
        None => None,
    };

    file.write_all(bytes)?;

    if let Some(prev) = previous {
        file.seek(SeekFrom::Start(prev))?;
    }
    Ok(bytes.len())
}

#[cfg(unix)]
fn create_symlink(target: &Path, path: &Path) -> io::Result<()> {
    std::os::unix::fs::symlink(target, path)
}

#[cfg(windows)]
fn create_symlink(target: &Path, path: &Path) -> io::Result<()> {
    use std::os::windows::fs::{symlink_dir, symlink_file};

    let base = path.parent().unwrap_or_else(|| Path::new("."));
    if base.join(target).is_dir() {
        symlink_dir(target, path)
    } else {
        symlink_file(target, path)
    }
}

#[cfg(not(any(unix, windows)))]
fn create_symlink(_target: &Path, _path: &Path) -> io::Result<()> {
    Err(io::Error::new(
        io::ErrorKind::Unsupported,
        "symlinks are not supported on this platform",
    ))
}

fn file_time(ms: f64) -> filetime::FileTime {
    let secs = (ms / 1000.0).floor();
    let nanos = ((ms - secs * 1000.0) * 1_000_000.0).round() as u32;
    filetime::FileTime::from_unix_time(secs as i64, nanos.min(999_999_999))
}

fn metadata_to_raw(metadata: &std::fs::Metadata) -> RawStat {
    #[cfg(unix)]
    let (dev, ino, mode, nlink, uid, gid, rdev, blksize, blocks) = {
        use std::os::unix::fs::MetadataExt;
        (
            metadata.dev(),
            metadata.ino(),
            metadata.mode(),
            metadata.nlink(),
            metadata.uid(),
            metadata.gid(),
            metadata.rdev(),
            metadata.blksize(),
            metadata.blocks(),
        )
    };
    #[cfg(not(unix))]
    let (dev, ino, mode, nlink, uid, gid, rdev, blksize, blocks) =
        (0_u64, 0_u64, 0_u32, 1_u64, 0_u32, 0_u32, 0_u64, 4096_u64, 0_u64);

    let file_type = FileType::from_std(metadata.file_type());
    RawStat {
        dev,
        ino,
        mode,
        nlink,
        uid,
        gid,
        rdev,
        size: metadata.len(),
        blksize,
        blocks,
        atime_ms: time_ms(metadata.accessed()),
        mtime_ms: time_ms(metadata.modified()),
        birthtime_ms: time_ms(metadata.created()),
        is_file: file_type == FileType::RegularFile,
        is_directory: file_type == FileType::Directory,
        is_symlink: file_type == FileType::SymbolicLink,
        is_block_device: file_type == FileType::BlockDevice,
        is_character_device: file_type == FileType::CharacterDevice,
        is_socket: matches!(file_type, FileType::SocketDgram | FileType::SocketStream),
    }
}

fn time_ms(time: io::Result<SystemTime>) -> f64 {
    time.ok()
        .and_then(|t| t.duration_since(UNIX_EPOCH).ok())
        .map(|d| d.as_secs() as f64 * 1000.0 + f64::from(d.subsec_nanos()) / 1_000_000.0)
        .unwrap_or(0.0)
}
