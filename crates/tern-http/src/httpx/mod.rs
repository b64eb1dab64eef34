//! HTTP/1.x message framing.
//!
//! Everything here works on byte slices and never touches a socket: a
//! [`Buffer`] accumulates whatever the transport delivered and the parse
//! functions report whether a complete message head or chunk is available.

use std::fmt::{self, Display, Formatter};
use std::str::FromStr;
use thiserror::Error;

pub mod buffer;
pub mod chunk;
pub mod headers;
pub mod request;
pub mod response;

pub use buffer::{Buffer, ChunkFrame};
pub use chunk::{Chunk, LAST_CHUNK, MAX_TRAILER_SIZE, encode_chunk, parse_chunk};
pub use headers::Headers;
pub use request::HttpRequest;
pub use response::{BodyLen, HttpResponse};

/// Framing errors. A connection that produces one of these is abandoned.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum ParseError {
    #[error("invalid HTTP method")]
    InvalidMethod,

    #[error("invalid request target")]
    InvalidUrl,

    #[error("invalid HTTP version")]
    InvalidVersion,

    #[error("invalid request line")]
    InvalidRequestLine,

    #[error("invalid status code")]
    InvalidStatusCode,

    #[error("invalid status line")]
    InvalidStatusLine,

    #[error("invalid header section")]
    InvalidHeaders,

    #[error("invalid chunk framing")]
    InvalidChunk,

    #[error("message head exceeds {0} bytes")]
    HeadTooLarge(usize),

    #[error("message body exceeds {0} bytes")]
    BodyTooLarge(usize),

    #[error("chunk trailers exceed {0} bytes")]
    TrailersTooLarge(usize),
}

pub type ParseResult<T> = Result<T, ParseError>;

/// Upper bound on a request or status line plus headers.
pub const MAX_HEAD_SIZE: usize = 64 * 1024;

/// Upper bound on a buffered request body and on any single chunk.
pub const MAX_BODY_SIZE: usize = 16 * 1024 * 1024;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Method {
    Get,
    Post,
    Head,
    Put,
    Delete,
    Connect,
    Options,
    Trace,
    Patch,
}

impl Method {
    pub fn as_str(&self) -> &'static str {
        match self {
            Method::Get => "GET",
            Method::Post => "POST",
            Method::Head => "HEAD",
            Method::Put => "PUT",
            Method::Delete => "DELETE",
            Method::Connect => "CONNECT",
            Method::Options => "OPTIONS",
            Method::Trace => "TRACE",
            Method::Patch => "PATCH",
        }
    }
}

impl Display for Method {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Method {
    type Err = ParseError;

    /// Case-sensitive, as on the wire. Callers that accept user input
    /// uppercase it first.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "GET" => Ok(Method::Get),
            "POST" => Ok(Method::Post),
            "HEAD" => Ok(Method::Head),
            "PUT" => Ok(Method::Put),
            "DELETE" => Ok(Method::Delete),
            "CONNECT" => Ok(Method::Connect),
            "OPTIONS" => Ok(Method::Options),
            "TRACE" => Ok(Method::Trace),
            "PATCH" => Ok(Method::Patch),
            _ => Err(ParseError::InvalidMethod),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Version {
    V1_0,
    #[default]
    V1_1,
}

impl Version {
    /// The bare number, as Node reports it in `httpVersion`.
    pub fn number(&self) -> &'static str {
        match self {
            Version::V1_0 => "1.0",
            Version::V1_1 => "1.1",
        }
    }

    /// Whether a connection without a `Connection` header stays open.
    pub fn keep_alive_by_default(&self) -> bool {
        matches!(self, Version::V1_1)
    }
}

impl Display for Version {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            Version::V1_0 => f.write_str("HTTP/1.0"),
            Version::V1_1 => f.write_str("HTTP/1.1"),
        }
    }
}

impl FromStr for Version {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "HTTP/1.0" => Ok(Version::V1_0),
            "HTTP/1.1" => Ok(Version::V1_1),
            _ => Err(ParseError::InvalidVersion),
        }
    }
}

/// Split one line off `buf` starting at `from`. Returns the line without
/// its terminator and the offset just past it, or `None` if no terminator
/// has arrived yet. A bare `\n` is accepted as a terminator.
pub(crate) fn next_line(buf: &[u8], from: usize) -> Option<(&[u8], usize)> {
    let rest = buf.get(from..)?;
    let nl = rest.iter().position(|&b| b == b'\n')?;
    let line = match rest[..nl].last() {
        Some(b'\r') => &rest[..nl - 1],
        _ => &rest[..nl],
    };
    Some((line, from + nl + 1))
}

/// Parse header lines starting at `from` up to and including the blank
/// line. Returns `None` if the blank line has not arrived yet.
pub(crate) fn parse_header_block(
    buf: &[u8],
    mut from: usize,
    lowercase: bool,
) -> ParseResult<Option<(Headers, usize)>> {
    let mut headers = Headers::new();
    loop {
        let Some((line, next)) = next_line(buf, from) else {
            if buf.len() > MAX_HEAD_SIZE {
                return Err(ParseError::HeadTooLarge(MAX_HEAD_SIZE));
            }
            return Ok(None);
        };
        from = next;
        if line.is_empty() {
            return Ok(Some((headers, from)));
        }
        let line = std::str::from_utf8(line).map_err(|_| ParseError::InvalidHeaders)?;
        let (name, value) = line.split_once(':').ok_or(ParseError::InvalidHeaders)?;
        let name = name.trim();
        if name.is_empty() || name.contains(char::is_whitespace) {
            return Err(ParseError::InvalidHeaders);
        }
        let name = if lowercase {
            name.to_ascii_lowercase()
        } else {
            name.to_string()
        };
        headers.append(name, value.trim());
    }
}
