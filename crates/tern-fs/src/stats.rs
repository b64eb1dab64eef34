//! `Stats`, `BigIntStats` and `Dirent` views over raw host records.

use std::time::{Duration, SystemTime, UNIX_EPOCH};
use tern_host::{FileType, RawDirent, RawStat};

/// Type predicates shared by both stats flavours.
pub trait StatsBase {
    fn raw_kind(&self) -> Kind;

    fn is_file(&self) -> bool {
        self.raw_kind() == Kind::File
    }
    fn is_directory(&self) -> bool {
        self.raw_kind() == Kind::Directory
    }
    fn is_symbolic_link(&self) -> bool {
        self.raw_kind() == Kind::Symlink
    }
    fn is_block_device(&self) -> bool {
        self.raw_kind() == Kind::BlockDevice
    }
    fn is_character_device(&self) -> bool {
        self.raw_kind() == Kind::CharacterDevice
    }
    fn is_socket(&self) -> bool {
        self.raw_kind() == Kind::Socket
    }
    /// FIFOs are never reported by the host.
    fn is_fifo(&self) -> bool {
        false
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Kind {
    File,
    Directory,
    Symlink,
    BlockDevice,
    CharacterDevice,
    Socket,
    Other,
}

impl Kind {
    fn from_raw(raw: &RawStat) -> Self {
        if raw.is_symlink {
            Self::Symlink
        } else if raw.is_file {
            Self::File
        } else if raw.is_directory {
            Self::Directory
        } else if raw.is_block_device {
            Self::BlockDevice
        } else if raw.is_character_device {
            Self::CharacterDevice
        } else if raw.is_socket {
            Self::Socket
        } else {
            Self::Other
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Stats {
    pub dev: u64,
    pub ino: u64,
    pub mode: u32,
    pub nlink: u64,
    pub uid: u32,
    pub gid: u32,
    pub rdev: u64,
    pub size: u64,
    pub blksize: u64,
    pub blocks: u64,
    pub atime_ms: f64,
    pub mtime_ms: f64,
    pub ctime_ms: f64,
    pub birthtime_ms: f64,
    kind: Kind,
}

impl Stats {
    pub fn from_raw(raw: &RawStat) -> Self {
        Self {
            dev: raw.dev,
            ino: raw.ino,
            mode: raw.mode,
            nlink: raw.nlink,
            uid: raw.uid,
            gid: raw.gid,
            rdev: raw.rdev,
            size: raw.size,
            blksize: raw.blksize,
            blocks: raw.blocks,
            atime_ms: raw.atime_ms,
            mtime_ms: raw.mtime_ms,
            // The host has no change time; mtime stands in.
            ctime_ms: raw.mtime_ms,
            birthtime_ms: raw.birthtime_ms,
            kind: Kind::from_raw(raw),
        }
    }

    pub fn atime(&self) -> SystemTime {
        ms_to_time(self.atime_ms)
    }

    pub fn mtime(&self) -> SystemTime {
        ms_to_time(self.mtime_ms)
    }

    pub fn ctime(&self) -> SystemTime {
        ms_to_time(self.ctime_ms)
    }

    pub fn birthtime(&self) -> SystemTime {
        ms_to_time(self.birthtime_ms)
    }
}

impl StatsBase for Stats {
    fn raw_kind(&self) -> Kind {
        self.kind
    }
}

/// Integer-only stats with nanosecond time fields.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BigIntStats {
    pub dev: u64,
    pub ino: u64,
    pub mode: u64,
    pub nlink: u64,
    pub uid: u64,
    pub gid: u64,
    pub rdev: u64,
    pub size: u64,
    pub blksize: u64,
    pub blocks: u64,
    pub atime_ms: u64,
    pub mtime_ms: u64,
    pub ctime_ms: u64,
    pub birthtime_ms: u64,
    pub atime_ns: u64,
    pub mtime_ns: u64,
    pub ctime_ns: u64,
    pub birthtime_ns: u64,
    kind: Kind,
}

impl BigIntStats {
    pub fn from_raw(raw: &RawStat) -> Self {
        let atime_ms = raw.atime_ms.max(0.0) as u64;
        let mtime_ms = raw.mtime_ms.max(0.0) as u64;
        let birthtime_ms = raw.birthtime_ms.max(0.0) as u64;
        Self {
            dev: raw.dev,
            ino: raw.ino,
            mode: u64::from(raw.mode),
            nlink: raw.nlink,
            uid: u64::from(raw.uid),
            gid: u64::from(raw.gid),
            rdev: raw.rdev,
            size: raw.size,
            blksize: raw.blksize,
            blocks: raw.blocks,
            atime_ms,
            mtime_ms,
            ctime_ms: mtime_ms,
            birthtime_ms,
            atime_ns: atime_ms * 1_000_000,
            mtime_ns: mtime_ms * 1_000_000,
            ctime_ns: mtime_ms * 1_000_000,
            birthtime_ns: birthtime_ms * 1_000_000,
            kind: Kind::from_raw(raw),
        }
    }

    pub fn mtime(&self) -> SystemTime {
        UNIX_EPOCH + Duration::from_nanos(self.mtime_ns)
    }
}

impl StatsBase for BigIntStats {
    fn raw_kind(&self) -> Kind {
        self.kind
    }
}

/// Result of a stat call made with options.
#[derive(Debug, Clone, PartialEq)]
pub enum AnyStats {
    Number(Stats),
    BigInt(BigIntStats),
}

impl AnyStats {
    pub fn from_raw(raw: &RawStat, bigint: bool) -> Self {
        if bigint {
            Self::BigInt(BigIntStats::from_raw(raw))
        } else {
            Self::Number(Stats::from_raw(raw))
        }
    }

    pub fn size(&self) -> u64 {
        match self {
            Self::Number(s) => s.size,
            Self::BigInt(s) => s.size,
        }
    }
}

impl StatsBase for AnyStats {
    fn raw_kind(&self) -> Kind {
        match self {
            Self::Number(s) => s.kind,
            Self::BigInt(s) => s.kind,
        }
    }
}

fn ms_to_time(ms: f64) -> SystemTime {
    if ms >= 0.0 {
        UNIX_EPOCH + Duration::from_secs_f64(ms / 1000.0)
    } else {
        UNIX_EPOCH - Duration::from_secs_f64(-ms / 1000.0)
    }
}

/// One directory entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Dirent {
    pub name: String,
    /// Directory the entry was read from.
    pub parent_path: String,
    filetype: FileType,
}

impl Dirent {
    pub fn new(name: impl Into<String>, parent_path: impl Into<String>, filetype: FileType) -> Self {
        Self {
            name: name.into(),
            parent_path: parent_path.into(),
            filetype,
        }
    }

    pub fn from_raw(raw: RawDirent, parent_path: &str) -> Self {
        Self::new(raw.name, parent_path, raw.filetype)
    }

    pub fn filetype(&self) -> FileType {
        self.filetype
    }

    pub fn is_file(&self) -> bool {
        self.filetype == FileType::RegularFile
    }
    pub fn is_directory(&self) -> bool {
        self.filetype == FileType::Directory
    }
    pub fn is_symbolic_link(&self) -> bool {
        self.filetype == FileType::SymbolicLink
    }
    pub fn is_block_device(&self) -> bool {
        self.filetype == FileType::BlockDevice
    }
    pub fn is_character_device(&self) -> bool {
        self.filetype == FileType::CharacterDevice
    }
    pub fn is_socket(&self) -> bool {
        matches!(
            self.filetype,
            FileType::SocketDgram | FileType::SocketStream
        )
    }
    pub fn is_fifo(&self) -> bool {
        false
    }
}

/// Wrap a host batch, dropping `.` and `..`.
pub fn dirents_from_batch(batch: Vec<RawDirent>, parent_path: &str) -> Vec<Dirent> {
    batch
        .into_iter()
        .filter(|d| d.name != "." && d.name != "..")
        .map(|d| Dirent::from_raw(d, parent_path))
        .collect()
}
