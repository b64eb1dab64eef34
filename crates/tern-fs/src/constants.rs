//! `fs.constants`.

pub use tern_host::flags::{
    O_APPEND, O_CREAT, O_DIRECTORY, O_EXCL, O_NONBLOCK, O_RDONLY, O_RDWR, O_SYNC, O_TRUNC,
    O_WRONLY,
};

pub const F_OK: u32 = 0;
pub const R_OK: u32 = 4;
pub const W_OK: u32 = 2;
pub const X_OK: u32 = 1;

pub const COPYFILE_EXCL: u32 = 1;
pub const COPYFILE_FICLONE: u32 = 2;
pub const COPYFILE_FICLONE_FORCE: u32 = 4;

pub const S_IFMT: u32 = 0o170000;
pub const S_IFREG: u32 = 0o100000;
pub const S_IFDIR: u32 = 0o040000;
pub const S_IFCHR: u32 = 0o020000;
pub const S_IFBLK: u32 = 0o060000;
pub const S_IFIFO: u32 = 0o010000;
pub const S_IFLNK: u32 = 0o120000;
pub const S_IFSOCK: u32 = 0o140000;

/// Largest file `readFile`/`writeFile` will handle.
pub const MAX_FILE_SIZE: u64 = 2_147_483_647;

/// Buffer size for read calls that allocate their own buffer.
pub const DEFAULT_READ_BUFFER: usize = 16384;
