//! Raw records returned by host primitives.

/// Directory-entry file type as numbered by the host.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[repr(u8)]
pub enum FileType {
    #[default]
    Unknown = 0,
    BlockDevice = 1,
    CharacterDevice = 2,
    Directory = 3,
    RegularFile = 4,
    SocketDgram = 5,
    SocketStream = 6,
    SymbolicLink = 7,
}

impl FileType {
    pub fn from_raw(raw: u8) -> Self {
        match raw {
            1 => Self::BlockDevice,
            2 => Self::CharacterDevice,
            3 => Self::Directory,
            4 => Self::RegularFile,
            5 => Self::SocketDgram,
            6 => Self::SocketStream,
            7 => Self::SymbolicLink,
            _ => Self::Unknown,
        }
    }

    pub fn from_std(file_type: std::fs::FileType) -> Self {
        if file_type.is_symlink() {
            return Self::SymbolicLink;
        }
        if file_type.is_dir() {
            return Self::Directory;
        }
        if file_type.is_file() {
            return Self::RegularFile;
        }
        #[cfg(unix)]
        {
            use std::os::unix::fs::FileTypeExt;
            if file_type.is_block_device() {
                return Self::BlockDevice;
            }
            if file_type.is_char_device() {
                return Self::CharacterDevice;
            }
            if file_type.is_socket() {
                return Self::SocketStream;
            }
        }
        Self::Unknown
    }

    pub fn as_raw(self) -> u8 {
        self as u8
    }
}

/// Flat stat record, times in milliseconds since the epoch.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RawStat {
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
    pub birthtime_ms: f64,
    pub is_file: bool,
    pub is_directory: bool,
    pub is_symlink: bool,
    pub is_block_device: bool,
    pub is_character_device: bool,
    pub is_socket: bool,
}

/// One entry of a directory batch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawDirent {
    pub name: String,
    pub filetype: FileType,
}

/// Result of one `freaddir` call.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReaddirBatch {
    pub res: Vec<RawDirent>,
    /// No entries remain after this batch.
    pub fin: bool,
    /// Continuation token for the next call.
    pub cookie: u64,
}
