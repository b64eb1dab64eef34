//! Synchronous fs operations.
//!
//! Every operation validates its arguments, performs one or more host calls and
//! either transforms the host result or maps the host error through
//! [`NodeError::uv`]. Callback and promise variants are layered on top of
//! these in `callback.rs` and `promises.rs`.

use crate::constants::{
    COPYFILE_EXCL, DEFAULT_READ_BUFFER, MAX_FILE_SIZE, O_DIRECTORY, O_RDONLY, R_OK, W_OK, X_OK,
};
use crate::dir::Dir;
use crate::encoding::Encoding;
use crate::errors::{NodeError, NodeResult};
use crate::options::{
    AppendFileOptions, CpOptions, MkdirOptions, OpendirOptions, ReadFileOptions, RmOptions,
    RmdirOptions, StatOptions, WriteFileOptions,
};
use crate::stats::{AnyStats, Dirent, Stats, dirents_from_batch};
use crate::turns::FdTurns;
use crate::validators::{
    Flags, ModeKind, PathLike, get_valid_mode, get_validated_path, parse_file_mode,
    string_to_flags, validate_fd, validate_offset_length, validate_position,
};
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use tern_host::{Fd, HostError, HostFs, HostResult, RawStat, StdHost};
use url::Url;

const MKDTEMP_SUFFIX_LEN: usize = 6;
const MKDTEMP_ATTEMPTS: usize = 128;
const MKDTEMP_ALPHABET: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz0123456789";

/// Codes `rm`/`rmdir` retry on.
const RETRYABLE_CODES: &[&str] = &["EBUSY", "EMFILE", "ENFILE", "ENOTEMPTY", "EPERM"];

/// Entry point for the `fs` API, bound to one host.
#[derive(Clone)]
pub struct Fs {
    host: Arc<dyn HostFs>,
    pub(crate) turns: Arc<FdTurns>,
}

impl Fs {
    pub fn new(host: Arc<dyn HostFs>) -> Self {
        Self {
            host,
            turns: Arc::new(FdTurns::default()),
        }
    }

    /// An `Fs` backed by the local filesystem.
    pub fn std() -> Self {
        Self::new(Arc::new(StdHost::new()))
    }

    pub fn host(&self) -> &Arc<dyn HostFs> {
        &self.host
    }
}

impl Default for Fs {
    fn default() -> Self {
        Self::std()
    }
}

impl fmt::Debug for Fs {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Fs").finish_non_exhaustive()
    }
}

/// Data accepted by the write family.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Data {
    Bytes(Vec<u8>),
    Text(String),
}

impl Data {
    pub fn into_bytes(self, encoding: Encoding) -> Vec<u8> {
        match self {
            Self::Bytes(b) => b,
            Self::Text(t) => encoding.encode(&t),
        }
    }
}

impl From<Vec<u8>> for Data {
    fn from(b: Vec<u8>) -> Self {
        Self::Bytes(b)
    }
}

impl From<&[u8]> for Data {
    fn from(b: &[u8]) -> Self {
        Self::Bytes(b.to_vec())
    }
}

impl<const N: usize> From<&[u8; N]> for Data {
    fn from(b: &[u8; N]) -> Self {
        Self::Bytes(b.to_vec())
    }
}

impl From<&str> for Data {
    fn from(s: &str) -> Self {
        Self::Text(s.to_string())
    }
}

impl From<String> for Data {
    fn from(s: String) -> Self {
        Self::Text(s)
    }
}

/// `readFile` result: bytes, or a decoded string when an encoding was given.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Contents {
    Buffer(Vec<u8>),
    String(String),
}

impl Contents {
    pub fn into_bytes(self) -> Vec<u8> {
        match self {
            Self::Buffer(b) => b,
            Self::String(s) => s.into_bytes(),
        }
    }

    pub fn as_bytes(&self) -> &[u8] {
        match self {
            Self::Buffer(b) => b,
            Self::String(s) => s.as_bytes(),
        }
    }

    pub fn into_string(self) -> String {
        match self {
            Self::Buffer(b) => String::from_utf8_lossy(&b).into_owned(),
            Self::String(s) => s,
        }
    }
}

/// A path or an already open descriptor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FileTarget {
    Path(PathLike),
    Fd(Fd),
}

impl From<Fd> for FileTarget {
    fn from(fd: Fd) -> Self {
        Self::Fd(fd)
    }
}

impl From<&str> for FileTarget {
    fn from(s: &str) -> Self {
        Self::Path(s.into())
    }
}

impl From<String> for FileTarget {
    fn from(s: String) -> Self {
        Self::Path(s.into())
    }
}

impl From<&String> for FileTarget {
    fn from(s: &String) -> Self {
        Self::Path(s.into())
    }
}

impl From<&Path> for FileTarget {
    fn from(p: &Path) -> Self {
        Self::Path(p.into())
    }
}

impl From<PathBuf> for FileTarget {
    fn from(p: PathBuf) -> Self {
        Self::Path(p.into())
    }
}

impl From<&PathBuf> for FileTarget {
    fn from(p: &PathBuf) -> Self {
        Self::Path(p.into())
    }
}

impl From<Url> for FileTarget {
    fn from(u: Url) -> Self {
        Self::Path(u.into())
    }
}

/// Offset/length/position of a read. `position` of `None` or below zero reads
/// from the current file position.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReadArgs {
    pub offset: usize,
    pub length: Option<usize>,
    pub position: Option<i64>,
}

impl ReadArgs {
    pub fn at(position: i64) -> Self {
        Self {
            position: Some(position),
            ..Default::default()
        }
    }
}

/// The overloads of `fs.read`, resolved once at the call site.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReadRequest {
    /// `read(fd, callback)` and `read(fd, options, callback)`: a fresh 16 KiB buffer.
    Alloc(ReadArgs),
    /// `read(fd, buffer, offset, length, position, callback)`.
    Into(Vec<u8>, ReadArgs),
}

impl ReadRequest {
    pub(crate) fn into_parts(self) -> (Vec<u8>, ReadArgs) {
        match self {
            Self::Alloc(args) => (vec![0; DEFAULT_READ_BUFFER], args),
            Self::Into(buffer, args) => (buffer, args),
        }
    }
}

pub type WriteArgs = ReadArgs;

/// The overloads of `fs.write`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WriteRequest {
    Buffer(Vec<u8>, WriteArgs),
    Text {
        text: String,
        position: Option<i64>,
        encoding: Encoding,
    },
}

impl WriteRequest {
    /// Validate and cut down to the bytes and position that reach the host.
    pub(crate) fn resolve(self) -> NodeResult<(Vec<u8>, Option<u64>)> {
        match self {
            Self::Buffer(buffer, args) => {
                let length = args
                    .length
                    .unwrap_or(buffer.len().saturating_sub(args.offset));
                validate_offset_length(args.offset, length, buffer.len())?;
                let bytes = buffer[args.offset..args.offset + length].to_vec();
                Ok((bytes, validate_position(args.position)))
            }
            Self::Text {
                text,
                position,
                encoding,
            } => Ok((encoding.encode(&text), validate_position(position))),
        }
    }
}

/// A timestamp argument: seconds since the epoch or a `SystemTime`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum TimeLike {
    Seconds(f64),
    Time(SystemTime),
}

impl TimeLike {
    pub(crate) fn to_ms(self, name: &str) -> NodeResult<f64> {
        match self {
            Self::Seconds(s) if s.is_finite() => Ok(s * 1000.0),
            Self::Seconds(s) => Err(NodeError::invalid_arg_type(
                name,
                "a finite number or Date",
                s,
            )),
            Self::Time(t) => Ok(match t.duration_since(UNIX_EPOCH) {
                Ok(d) => d.as_secs_f64() * 1000.0,
                Err(e) => -(e.duration().as_secs_f64() * 1000.0),
            }),
        }
    }
}

impl From<f64> for TimeLike {
    fn from(s: f64) -> Self {
        Self::Seconds(s)
    }
}

impl From<i64> for TimeLike {
    fn from(s: i64) -> Self {
        Self::Seconds(s as f64)
    }
}

impl From<SystemTime> for TimeLike {
    fn from(t: SystemTime) -> Self {
        Self::Time(t)
    }
}

pub(crate) fn uv<'a>(syscall: &'a str, path: &'a str) -> impl FnOnce(HostError) -> NodeError + 'a {
    move |e| NodeError::from_host(&e, syscall, Some(path))
}

pub(crate) fn uv_fd(syscall: &str) -> impl FnOnce(HostError) -> NodeError + '_ {
    move |e| NodeError::from_host(&e, syscall, None)
}

/// Validate a read against a buffer of `buffer_len` bytes.
///
/// An empty buffer is rejected before anything else, including the descriptor.
pub(crate) fn resolve_read(
    buffer_len: usize,
    args: &ReadArgs,
) -> NodeResult<(usize, usize, Option<u64>)> {
    if buffer_len == 0 {
        return Err(NodeError::invalid_arg_value(
            "buffer",
            "<Buffer >",
            "is empty and cannot be written",
        ));
    }
    let length = args
        .length
        .unwrap_or(buffer_len.saturating_sub(args.offset));
    validate_offset_length(args.offset, length, buffer_len)?;
    Ok((args.offset, length, validate_position(args.position)))
}

pub(crate) fn is_retryable(err: &NodeError) -> bool {
    RETRYABLE_CODES.contains(&err.code.as_str())
}

/// Six characters drawn uniformly from the OS random source.
fn random_suffix() -> NodeResult<String> {
    let mut suffix = String::with_capacity(MKDTEMP_SUFFIX_LEN);
    let mut bytes = [0_u8; 16];
    while suffix.len() < MKDTEMP_SUFFIX_LEN {
        getrandom::fill(&mut bytes)
            .map_err(|e| NodeError::internal(format!("mkdtemp could not read random bytes: {e}")))?;
        let need = MKDTEMP_SUFFIX_LEN - suffix.len();
        // 248 is the largest multiple of 62 that fits in a byte.
        suffix.extend(
            bytes
                .iter()
                .filter(|&&b| b < 248)
                .take(need)
                .map(|&b| MKDTEMP_ALPHABET[usize::from(b % 62)] as char),
        );
    }
    Ok(suffix)
}

fn join(parent: &str, name: &str) -> String {
    Path::new(parent).join(name).to_string_lossy().into_owned()
}

impl Fs {
    // ---- descriptors ----

    pub fn open_sync(
        &self,
        path: impl Into<PathLike>,
        flags: impl Into<Flags>,
        mode: Option<u32>,
    ) -> NodeResult<Fd> {
        let path = get_validated_path(path, "path")?;
        let flags = string_to_flags(flags)?;
        let mode = parse_file_mode(mode, "mode", 0o666)?;
        self.host.open(&path, flags, mode).map_err(uv("open", &path))
    }

    pub fn close_sync(&self, fd: Fd) -> NodeResult<()> {
        let fd = validate_fd(fd)?;
        self.host.close(fd).map_err(uv_fd("close"))
    }

    pub fn read_sync(&self, fd: Fd, buffer: &mut [u8], args: ReadArgs) -> NodeResult<usize> {
        let (offset, length, position) = resolve_read(buffer.len(), &args)?;
        let fd = validate_fd(fd)?;
        if length == 0 {
            return Ok(0);
        }
        let data = self
            .host
            .fread(fd, position, length)
            .map_err(uv_fd("read"))?;
        buffer[offset..offset + data.len()].copy_from_slice(&data);
        Ok(data.len())
    }

    /// Scatter one read across `buffers`, filling each in turn.
    pub fn readv_sync(
        &self,
        fd: Fd,
        buffers: &mut [&mut [u8]],
        position: Option<i64>,
    ) -> NodeResult<usize> {
        let fd = validate_fd(fd)?;
        let total: usize = buffers.iter().map(|b| b.len()).sum();
        if total == 0 {
            return Ok(0);
        }
        let data = self
            .host
            .fread(fd, validate_position(position), total)
            .map_err(uv_fd("read"))?;
        Ok(scatter(&data, buffers))
    }

    pub fn write_sync(&self, fd: Fd, buffer: &[u8], args: WriteArgs) -> NodeResult<usize> {
        let fd = validate_fd(fd)?;
        let length = args
            .length
            .unwrap_or(buffer.len().saturating_sub(args.offset));
        validate_offset_length(args.offset, length, buffer.len())?;
        self.host
            .fwrite(
                fd,
                validate_position(args.position),
                &buffer[args.offset..args.offset + length],
            )
            .map_err(uv_fd("write"))
    }

    pub fn write_string_sync(
        &self,
        fd: Fd,
        text: &str,
        position: Option<i64>,
        encoding: Encoding,
    ) -> NodeResult<usize> {
        let fd = validate_fd(fd)?;
        self.host
            .fwrite(fd, validate_position(position), &encoding.encode(text))
            .map_err(uv_fd("write"))
    }

    /// Gather `buffers` into one write.
    pub fn writev_sync<B: AsRef<[u8]>>(
        &self,
        fd: Fd,
        buffers: &[B],
        position: Option<i64>,
    ) -> NodeResult<usize> {
        let fd = validate_fd(fd)?;
        let data = gather(buffers);
        if data.is_empty() {
            return Ok(0);
        }
        self.host
            .fwrite(fd, validate_position(position), &data)
            .map_err(uv_fd("write"))
    }

    pub fn fsync_sync(&self, fd: Fd) -> NodeResult<()> {
        let fd = validate_fd(fd)?;
        self.host.fsync(fd).map_err(uv_fd("fsync"))
    }

    pub fn fdatasync_sync(&self, fd: Fd) -> NodeResult<()> {
        let fd = validate_fd(fd)?;
        self.host.fdatasync(fd).map_err(uv_fd("fdatasync"))
    }

    pub fn ftruncate_sync(&self, fd: Fd, len: u64) -> NodeResult<()> {
        let fd = validate_fd(fd)?;
        self.host.ftruncate(fd, len).map_err(uv_fd("ftruncate"))
    }

    pub fn futimes_sync(
        &self,
        fd: Fd,
        atime: impl Into<TimeLike>,
        mtime: impl Into<TimeLike>,
    ) -> NodeResult<()> {
        let fd = validate_fd(fd)?;
        let atime = atime.into().to_ms("atime")?;
        let mtime = mtime.into().to_ms("mtime")?;
        self.host.futime(fd, atime, mtime).map_err(uv_fd("futime"))
    }

    // ---- whole files ----

    pub fn read_file_sync(
        &self,
        target: impl Into<FileTarget>,
        options: impl Into<ReadFileOptions>,
    ) -> NodeResult<Contents> {
        let options = options.into();
        let (fd, owned) = self.target_fd(target.into(), options.flag.clone(), 0o666)?;
        let read = self.read_all(fd);
        self.release(fd, owned, read)
            .map(|bytes| decode_contents(bytes, options.encoding))
    }

    pub fn write_file_sync(
        &self,
        target: impl Into<FileTarget>,
        data: impl Into<Data>,
        options: impl Into<WriteFileOptions>,
    ) -> NodeResult<()> {
        let options = options.into();
        let bytes = data.into().into_bytes(options.encoding);
        if bytes.len() as u64 > MAX_FILE_SIZE {
            return Err(NodeError::file_too_large(bytes.len() as u64));
        }
        let (fd, owned) = self.target_fd(target.into(), options.flag.clone(), options.mode)?;
        let written = self
            .host
            .fwrite(fd, None, &bytes)
            .map(|_| ())
            .map_err(uv_fd("write"));
        self.release(fd, owned, written)
    }

    pub fn append_file_sync(
        &self,
        target: impl Into<FileTarget>,
        data: impl Into<Data>,
        options: impl Into<AppendFileOptions>,
    ) -> NodeResult<()> {
        self.write_file_sync(target, data, WriteFileOptions::from(options.into()))
    }

    pub(crate) fn target_fd(
        &self,
        target: FileTarget,
        flag: Flags,
        mode: u32,
    ) -> NodeResult<(Fd, bool)> {
        match target {
            FileTarget::Path(path) => Ok((self.open_sync(path, flag, Some(mode))?, true)),
            FileTarget::Fd(fd) => Ok((validate_fd(fd)?, false)),
        }
    }

    /// Close `fd` if this call opened it, keeping the first error.
    pub(crate) fn release<T>(&self, fd: Fd, owned: bool, result: NodeResult<T>) -> NodeResult<T> {
        if !owned {
            return result;
        }
        let closed = self.host.close(fd).map_err(uv_fd("close"));
        let value = result?;
        closed?;
        Ok(value)
    }

    /// Size of a regular file, or `None` when the descriptor is not one.
    pub(crate) fn checked_file_size(&self, fd: Fd) -> NodeResult<Option<u64>> {
        let raw = self.host.fstat(fd).map_err(uv_fd("fstat"))?;
        if !raw.is_file {
            return Ok(None);
        }
        if raw.size > MAX_FILE_SIZE {
            return Err(NodeError::file_too_large(raw.size));
        }
        Ok(Some(raw.size))
    }

    fn read_all(&self, fd: Fd) -> NodeResult<Vec<u8>> {
        let size = self.checked_file_size(fd)?;
        let mut out = Vec::with_capacity(size.unwrap_or(0) as usize);
        loop {
            let chunk = self
                .host
                .fread(fd, None, read_chunk_len(size, out.len()))
                .map_err(uv_fd("read"))?;
            if chunk.is_empty() {
                return Ok(out);
            }
            out.extend_from_slice(&chunk);
            if out.len() as u64 > MAX_FILE_SIZE {
                return Err(NodeError::file_too_large(out.len() as u64));
            }
        }
    }

    // ---- metadata ----

    pub fn stat_sync(&self, path: impl Into<PathLike>) -> NodeResult<Stats> {
        let path = get_validated_path(path, "path")?;
        let raw = self.host.stat(&path).map_err(uv("stat", &path))?;
        Ok(Stats::from_raw(&raw))
    }

    pub fn stat_sync_with(
        &self,
        path: impl Into<PathLike>,
        options: StatOptions,
    ) -> NodeResult<Option<AnyStats>> {
        let path = get_validated_path(path, "path")?;
        stat_with(self.host.stat(&path), "stat", &path, options)
    }

    pub fn lstat_sync(&self, path: impl Into<PathLike>) -> NodeResult<Stats> {
        let path = get_validated_path(path, "path")?;
        let raw = self.host.lstat(&path).map_err(uv("lstat", &path))?;
        Ok(Stats::from_raw(&raw))
    }

    pub fn lstat_sync_with(
        &self,
        path: impl Into<PathLike>,
        options: StatOptions,
    ) -> NodeResult<Option<AnyStats>> {
        let path = get_validated_path(path, "path")?;
        stat_with(self.host.lstat(&path), "lstat", &path, options)
    }

    pub fn fstat_sync(&self, fd: Fd) -> NodeResult<Stats> {
        let fd = validate_fd(fd)?;
        let raw = self.host.fstat(fd).map_err(uv_fd("fstat"))?;
        Ok(Stats::from_raw(&raw))
    }

    pub fn fstat_sync_with(&self, fd: Fd, bigint: bool) -> NodeResult<AnyStats> {
        let fd = validate_fd(fd)?;
        let raw = self.host.fstat(fd).map_err(uv_fd("fstat"))?;
        Ok(AnyStats::from_raw(&raw, bigint))
    }

    pub fn access_sync(&self, path: impl Into<PathLike>, mode: Option<u32>) -> NodeResult<()> {
        let path = get_validated_path(path, "path")?;
        let mode = get_valid_mode(mode, ModeKind::Access)?;
        let raw = self.host.stat(&path).map_err(uv("access", &path))?;
        if !access_allowed(&raw, mode) {
            return Err(NodeError::uv("ACCES", "access", Some(&path), None));
        }
        Ok(())
    }

    /// Never fails; any error reads as "does not exist".
    pub fn exists_sync(&self, path: impl Into<PathLike>) -> bool {
        get_validated_path(path, "path")
            .map(|p| self.host.stat(&p).is_ok())
            .unwrap_or(false)
    }

    pub fn truncate_sync(&self, path: impl Into<PathLike>, len: u64) -> NodeResult<()> {
        let path = get_validated_path(path, "path")?;
        self.host.truncate(&path, len).map_err(uv("open", &path))
    }

    pub fn utimes_sync(
        &self,
        path: impl Into<PathLike>,
        atime: impl Into<TimeLike>,
        mtime: impl Into<TimeLike>,
    ) -> NodeResult<()> {
        let path = get_validated_path(path, "path")?;
        let atime = atime.into().to_ms("atime")?;
        let mtime = mtime.into().to_ms("mtime")?;
        self.host
            .utime(&path, atime, mtime)
            .map_err(uv("utime", &path))
    }

    pub fn lutimes_sync(
        &self,
        path: impl Into<PathLike>,
        atime: impl Into<TimeLike>,
        mtime: impl Into<TimeLike>,
    ) -> NodeResult<()> {
        let path = get_validated_path(path, "path")?;
        let atime = atime.into().to_ms("atime")?;
        let mtime = mtime.into().to_ms("mtime")?;
        self.host
            .lutime(&path, atime, mtime)
            .map_err(uv("lutime", &path))
    }

    // Permission changes are not supported by the host and succeed as no-ops.

    pub fn chmod_sync(&self, path: impl Into<PathLike>, mode: u32) -> NodeResult<()> {
        get_validated_path(path, "path")?;
        parse_file_mode(Some(mode), "mode", 0)?;
        Ok(())
    }

    pub fn lchmod_sync(&self, path: impl Into<PathLike>, mode: u32) -> NodeResult<()> {
        self.chmod_sync(path, mode)
    }

    pub fn fchmod_sync(&self, fd: Fd, mode: u32) -> NodeResult<()> {
        validate_fd(fd)?;
        parse_file_mode(Some(mode), "mode", 0)?;
        Ok(())
    }

    pub fn chown_sync(&self, path: impl Into<PathLike>, _uid: u32, _gid: u32) -> NodeResult<()> {
        get_validated_path(path, "path")?;
        Ok(())
    }

    pub fn lchown_sync(&self, path: impl Into<PathLike>, uid: u32, gid: u32) -> NodeResult<()> {
        self.chown_sync(path, uid, gid)
    }

    pub fn fchown_sync(&self, fd: Fd, _uid: u32, _gid: u32) -> NodeResult<()> {
        validate_fd(fd)?;
        Ok(())
    }

    // ---- directories ----

    /// Create a directory. With `recursive`, returns the first directory that
    /// had to be created, or `None` when the whole path already existed.
    pub fn mkdir_sync(
        &self,
        path: impl Into<PathLike>,
        options: MkdirOptions,
    ) -> NodeResult<Option<String>> {
        let path = get_validated_path(path, "path")?;
        let mode = parse_file_mode(Some(options.mode), "mode", 0o777)?;
        if !options.recursive {
            self.host
                .mkdir(&path, false, mode)
                .map_err(uv("mkdir", &path))?;
            return Ok(None);
        }

        let first = self.first_missing_ancestor(&path);
        self.host
            .mkdir(&path, true, mode)
            .map_err(uv("mkdir", &path))?;
        Ok(first)
    }

    fn first_missing_ancestor(&self, path: &str) -> Option<String> {
        let mut first = None;
        for ancestor in Path::new(path).ancestors() {
            if ancestor.as_os_str().is_empty() {
                break;
            }
            match self.host.stat(&ancestor.to_string_lossy()) {
                Ok(_) => break,
                Err(e) if e.is("NOENT") => first = Some(ancestor.to_string_lossy().into_owned()),
                Err(_) => break,
            }
        }
        first
    }

    /// Create a unique directory named `prefix` plus six random characters.
    pub fn mkdtemp_sync(&self, prefix: impl Into<PathLike>) -> NodeResult<String> {
        let prefix = get_validated_path(prefix, "prefix")?;
        let template = format!("{prefix}XXXXXX");
        for _ in 0..MKDTEMP_ATTEMPTS {
            let candidate = format!("{prefix}{}", random_suffix()?);
            match self.host.mkdir(&candidate, false, 0o700) {
                Ok(()) => return Ok(candidate),
                Err(e) if e.is("EXIST") => continue,
                Err(e) => return Err(NodeError::from_host(&e, "mkdtemp", Some(&template))),
            }
        }
        Err(NodeError::uv("EXIST", "mkdtemp", Some(&template), None))
    }

    pub fn rmdir_sync(&self, path: impl Into<PathLike>, options: RmdirOptions) -> NodeResult<()> {
        let path = get_validated_path(path, "path")?;
        retry_blocking("rmdir", &path, options.max_retries, options.retry_delay, || {
            self.host.rmdir(&path, options.recursive)
        })
    }

    pub fn rm_sync(&self, path: impl Into<PathLike>, options: RmOptions) -> NodeResult<()> {
        let path = get_validated_path(path, "path")?;
        if !self.rm_precheck(&path, &options)? {
            return Ok(());
        }
        retry_blocking("rm", &path, options.max_retries, options.retry_delay, || {
            self.host.rm(&path, options.recursive, options.force)
        })
    }

    /// `Ok(false)` when there is nothing to remove and `force` is set.
    pub(crate) fn rm_precheck(&self, path: &str, options: &RmOptions) -> NodeResult<bool> {
        match self.host.lstat(path) {
            Ok(raw) if raw.is_directory && !options.recursive => {
                Err(NodeError::fs_eisdir("rm", path))
            }
            Ok(_) => Ok(true),
            Err(e) if e.is("NOENT") && options.force => Ok(false),
            Err(e) => Err(NodeError::from_host(&e, "rm", Some(path))),
        }
    }

    pub fn unlink_sync(&self, path: impl Into<PathLike>) -> NodeResult<()> {
        let path = get_validated_path(path, "path")?;
        let raw = self.host.lstat(&path).map_err(uv("unlink", &path))?;
        if raw.is_directory {
            return Err(NodeError::uv("ISDIR", "unlink", Some(&path), None));
        }
        self.host
            .rm(&path, false, false)
            .map_err(uv("unlink", &path))
    }

    /// Names in `path`, without `.` and `..`.
    pub fn readdir_sync(&self, path: impl Into<PathLike>) -> NodeResult<Vec<String>> {
        Ok(self
            .readdir_dirents_sync(path)?
            .into_iter()
            .map(|d| d.name)
            .collect())
    }

    /// `readdir` with `withFileTypes: true`.
    pub fn readdir_dirents_sync(&self, path: impl Into<PathLike>) -> NodeResult<Vec<Dirent>> {
        let path = get_validated_path(path, "path")?;
        let fd = self
            .host
            .open(&path, O_RDONLY | O_DIRECTORY, 0)
            .map_err(uv("scandir", &path))?;

        let mut entries = Vec::new();
        let mut cookie = 0;
        let listed = loop {
            match self.host.freaddir(fd, cookie) {
                Ok(batch) => {
                    entries.extend(dirents_from_batch(batch.res, &path));
                    if batch.fin {
                        break Ok(());
                    }
                    cookie = batch.cookie;
                }
                Err(e) => break Err(NodeError::from_host(&e, "scandir", Some(&path))),
            }
        };
        self.release(fd, true, listed)?;
        Ok(entries)
    }

    pub fn opendir_sync(
        &self,
        path: impl Into<PathLike>,
        options: OpendirOptions,
    ) -> NodeResult<Dir> {
        let path = get_validated_path(path, "path")?;
        if options.buffer_size == 0 {
            return Err(NodeError::out_of_range(
                "options.bufferSize",
                ">= 1 && <= 4294967295",
                options.buffer_size,
            ));
        }
        let fd = self
            .host
            .open(&path, O_RDONLY | O_DIRECTORY, 0)
            .map_err(uv("opendir", &path))?;
        Ok(Dir::new(self.host.clone(), fd, path))
    }

    // ---- links and renames ----

    /// Rename without overwriting: the source must exist and the destination must not.
    pub fn rename_sync(
        &self,
        old_path: impl Into<PathLike>,
        new_path: impl Into<PathLike>,
    ) -> NodeResult<()> {
        let old_path = get_validated_path(old_path, "oldPath")?;
        let new_path = get_validated_path(new_path, "newPath")?;
        if let Err(e) = self.host.lstat(&old_path) {
            return Err(NodeError::from_host_two(&e, "rename", &old_path, &new_path));
        }
        if old_path == new_path {
            return Ok(());
        }
        if self.host.lstat(&new_path).is_ok() {
            return Err(NodeError::uv("EXIST", "rename", Some(&old_path), Some(&new_path)));
        }
        self.host
            .rename(&old_path, &new_path)
            .map_err(|e| NodeError::from_host_two(&e, "rename", &old_path, &new_path))
    }

    pub fn copy_file_sync(
        &self,
        src: impl Into<PathLike>,
        dest: impl Into<PathLike>,
        mode: u32,
    ) -> NodeResult<()> {
        let src = get_validated_path(src, "src")?;
        let dest = get_validated_path(dest, "dest")?;
        let mode = get_valid_mode(Some(mode), ModeKind::CopyFile)?;
        if let Err(e) = self.host.stat(&src) {
            return Err(NodeError::from_host_two(&e, "copyfile", &src, &dest));
        }
        if mode & COPYFILE_EXCL != 0 && self.host.lstat(&dest).is_ok() {
            return Err(NodeError::uv("EXIST", "copyfile", Some(&src), Some(&dest)));
        }
        self.host
            .copy_file(&src, &dest)
            .map_err(|e| NodeError::from_host_two(&e, "copyfile", &src, &dest))
    }

    pub fn link_sync(
        &self,
        existing_path: impl Into<PathLike>,
        new_path: impl Into<PathLike>,
    ) -> NodeResult<()> {
        let existing = get_validated_path(existing_path, "existingPath")?;
        let new_path = get_validated_path(new_path, "newPath")?;
        self.host
            .link(&existing, &new_path)
            .map_err(|e| NodeError::from_host_two(&e, "link", &existing, &new_path))
    }

    pub fn symlink_sync(
        &self,
        target: impl Into<PathLike>,
        path: impl Into<PathLike>,
    ) -> NodeResult<()> {
        let target = get_validated_path(target, "target")?;
        let path = get_validated_path(path, "path")?;
        self.host
            .symlink(&target, &path)
            .map_err(|e| NodeError::from_host_two(&e, "symlink", &target, &path))
    }

    pub fn readlink_sync(&self, path: impl Into<PathLike>) -> NodeResult<String> {
        let path = get_validated_path(path, "path")?;
        self.host.readlink(&path).map_err(uv("readlink", &path))
    }

    pub fn realpath_sync(&self, path: impl Into<PathLike>) -> NodeResult<String> {
        let path = get_validated_path(path, "path")?;
        self.host.realpath(&path).map_err(uv("realpath", &path))
    }

    // ---- cp ----

    pub fn cp_sync(
        &self,
        src: impl Into<PathLike>,
        dest: impl Into<PathLike>,
        options: CpOptions,
    ) -> NodeResult<()> {
        let src = get_validated_path(src, "src")?;
        let dest = get_validated_path(dest, "dest")?;
        if src == dest {
            return Err(NodeError::new(
                "ERR_FS_CP_EINVAL",
                format!("Invalid src or dest: cp returned EINVAL (src and dest cannot be the same) {dest}"),
            ));
        }
        self.cp_path(&src, &dest, &options)
    }

    fn cp_path(&self, src: &str, dest: &str, options: &CpOptions) -> NodeResult<()> {
        if let Some(filter) = &options.filter
            && !filter(src, dest)
        {
            return Ok(());
        }

        let meta = if options.dereference {
            self.host.stat(src)
        } else {
            self.host.lstat(src)
        }
        .map_err(uv("cp", src))?;

        if meta.is_directory {
            if !options.recursive {
                return Err(NodeError::fs_eisdir("cp", src));
            }
            return self.cp_dir(src, dest, options, &meta);
        }
        if meta.is_symlink {
            return self.cp_symlink(src, dest, options);
        }
        self.cp_file(src, dest, options, &meta)
    }

    /// Decide whether `dest` may be written; removes a file that `force` replaces.
    fn prepare_cp_destination(&self, dest: &str, options: &CpOptions) -> NodeResult<bool> {
        match self.host.lstat(dest) {
            Ok(meta) => {
                if options.mode & COPYFILE_EXCL != 0 || (!options.force && options.error_on_exist)
                {
                    return Err(NodeError::new(
                        "ERR_FS_CP_EEXIST",
                        format!("Target already exists: cp returned EEXIST ({dest} already exists)"),
                    ));
                }
                if !options.force {
                    return Ok(false);
                }
                if meta.is_directory {
                    return Err(NodeError::uv("ISDIR", "cp", Some(dest), None));
                }
                self.host.rm(dest, false, false).map_err(uv("cp", dest))?;
                Ok(true)
            }
            Err(e) if e.is("NOENT") => Ok(true),
            Err(e) => Err(NodeError::from_host(&e, "cp", Some(dest))),
        }
    }

    fn cp_file(&self, src: &str, dest: &str, options: &CpOptions, meta: &RawStat) -> NodeResult<()> {
        if !self.prepare_cp_destination(dest, options)? {
            return Ok(());
        }
        self.host
            .copy_file(src, dest)
            .map_err(|e| NodeError::from_host_two(&e, "cp", src, dest))?;
        if options.preserve_timestamps {
            self.host
                .utime(dest, meta.atime_ms, meta.mtime_ms)
                .map_err(uv("cp", dest))?;
        }
        Ok(())
    }

    fn cp_symlink(&self, src: &str, dest: &str, options: &CpOptions) -> NodeResult<()> {
        if !self.prepare_cp_destination(dest, options)? {
            return Ok(());
        }
        let mut target = self.host.readlink(src).map_err(uv("cp", src))?;
        if !options.verbatim_symlinks && !Path::new(&target).is_absolute() {
            let base = Path::new(src).parent().unwrap_or_else(|| Path::new("."));
            target = base.join(&target).to_string_lossy().into_owned();
        }
        self.host
            .symlink(&target, dest)
            .map_err(|e| NodeError::from_host_two(&e, "cp", src, dest))
    }

    fn cp_dir(&self, src: &str, dest: &str, options: &CpOptions, meta: &RawStat) -> NodeResult<()> {
        match self.host.stat(dest) {
            Ok(existing) if !existing.is_directory => {
                return Err(NodeError::new(
                    "ERR_FS_CP_DIR_TO_NON_DIR",
                    format!("Cannot overwrite non-directory with directory: cp returned EISDIR ({src} -> {dest})"),
                ));
            }
            Ok(_) => {}
            Err(e) if e.is("NOENT") => {
                self.host
                    .mkdir(dest, true, 0o777)
                    .map_err(uv("cp", dest))?;
            }
            Err(e) => return Err(NodeError::from_host(&e, "cp", Some(dest))),
        }

        for entry in self.readdir_dirents_sync(src)? {
            self.cp_path(&join(src, &entry.name), &join(dest, &entry.name), options)?;
        }

        if options.preserve_timestamps {
            self.host
                .utime(dest, meta.atime_ms, meta.mtime_ms)
                .map_err(uv("cp", dest))?;
        }
        Ok(())
    }

    // ---- unsupported ----

    pub fn watch(&self, _path: impl Into<PathLike>) -> NodeResult<()> {
        Err(NodeError::feature_unavailable("fs.watch"))
    }

    pub fn watch_file(&self, _path: impl Into<PathLike>) -> NodeResult<()> {
        Err(NodeError::feature_unavailable("fs.watchFile"))
    }

    pub fn unwatch_file(&self, _path: impl Into<PathLike>) -> NodeResult<()> {
        Err(NodeError::feature_unavailable("fs.unwatchFile"))
    }
}

fn stat_with(
    result: HostResult<RawStat>,
    syscall: &str,
    path: &str,
    options: StatOptions,
) -> NodeResult<Option<AnyStats>> {
    match result {
        Ok(raw) => Ok(Some(AnyStats::from_raw(&raw, options.bigint))),
        Err(e) if !options.throw_if_no_entry && (e.is("NOENT") || e.is("NOTDIR")) => Ok(None),
        Err(e) => Err(NodeError::from_host(&e, syscall, Some(path))),
    }
}

fn access_allowed(raw: &RawStat, mode: u32) -> bool {
    let perms = raw.mode;
    if mode & R_OK != 0 && perms & 0o444 == 0 {
        return false;
    }
    if mode & W_OK != 0 && perms & 0o222 == 0 {
        return false;
    }
    if mode & X_OK != 0 && !raw.is_directory && perms & 0o111 == 0 {
        return false;
    }
    true
}

pub(crate) fn decode_contents(bytes: Vec<u8>, encoding: Option<Encoding>) -> Contents {
    match encoding {
        Some(enc) => Contents::String(enc.decode(&bytes)),
        None => Contents::Buffer(bytes),
    }
}

/// Bytes to request next when draining a file of known (or unknown) size.
pub(crate) fn read_chunk_len(size: Option<u64>, have: usize) -> usize {
    match size {
        Some(size) if size as usize > have => size as usize - have,
        _ => 64 * 1024,
    }
}

pub(crate) fn scatter(data: &[u8], buffers: &mut [&mut [u8]]) -> usize {
    let mut copied = 0;
    for buffer in buffers.iter_mut() {
        if copied == data.len() {
            break;
        }
        let n = buffer.len().min(data.len() - copied);
        buffer[..n].copy_from_slice(&data[copied..copied + n]);
        copied += n;
    }
    copied
}

pub(crate) fn gather<B: AsRef<[u8]>>(buffers: &[B]) -> Vec<u8> {
    let total = buffers.iter().map(|b| b.as_ref().len()).sum();
    let mut data = Vec::with_capacity(total);
    for buffer in buffers {
        data.extend_from_slice(buffer.as_ref());
    }
    data
}

/// Run `op`, retrying transient failures with a linearly growing delay.
fn retry_blocking(
    syscall: &str,
    path: &str,
    max_retries: u32,
    delay: Duration,
    mut op: impl FnMut() -> HostResult<()>,
) -> NodeResult<()> {
    let mut attempt = 0;
    loop {
        let err = match op() {
            Ok(()) => return Ok(()),
            Err(e) => NodeError::from_host(&e, syscall, Some(path)),
        };
        if attempt >= max_retries || !is_retryable(&err) {
            return Err(err);
        }
        attempt += 1;
        tracing::debug!(syscall, path, attempt, code = %err.code, "retrying after transient error");
        std::thread::sleep(delay * attempt);
    }
}
