//! Host open-flag bits.
//!
//! The values are the host's own numbering, not the platform's; they are
//! translated to `std::fs::OpenOptions` when a file is opened.

pub const O_RDONLY: u32 = 0;
pub const O_WRONLY: u32 = 1;
pub const O_RDWR: u32 = 2;
pub const O_APPEND: u32 = 8;
pub const O_NONBLOCK: u32 = 128;
pub const O_CREAT: u32 = 512;
pub const O_TRUNC: u32 = 1024;
pub const O_EXCL: u32 = 2048;
pub const O_SYNC: u32 = 4096;
pub const O_DIRECTORY: u32 = 65536;

const ACCESS_MASK: u32 = O_WRONLY | O_RDWR;

/// Decoded form of a host flag bitmask.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct OpenFlags {
    pub read: bool,
    pub write: bool,
    pub append: bool,
    pub truncate: bool,
    pub create: bool,
    pub create_new: bool,
    pub sync: bool,
}

impl OpenFlags {
    pub fn from_bits(bits: u32) -> Self {
        let (read, write) = match bits & ACCESS_MASK {
            O_WRONLY => (false, true),
            O_RDWR => (true, true),
            _ => (true, false),
        };
        let append = bits & O_APPEND != 0;
        let create = bits & O_CREAT != 0;
        Self {
            read,
            write: write || append,
            append,
            truncate: bits & O_TRUNC != 0 && !append,
            create,
            create_new: create && bits & O_EXCL != 0,
            sync: bits & O_SYNC != 0,
        }
    }

    pub fn is_read_only(&self) -> bool {
        self.read && !self.write
    }

    pub fn apply(&self, options: &mut std::fs::OpenOptions) {
        options
            .read(self.read)
            .write(self.write && !self.append)
            .append(self.append)
            .truncate(self.truncate)
            .create(self.create)
            .create_new(self.create_new);
    }
}
