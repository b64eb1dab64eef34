use super::{Headers, MAX_HEAD_SIZE, ParseError, ParseResult, Version, next_line, parse_header_block};
use crate::status::status_text;
use std::fmt::{self, Display, Formatter};

/// How the body following a response head is delimited.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BodyLen {
    Length(usize),
    Chunked,
    /// No framing header: the body runs until the peer closes.
    UntilClose,
}

/// A response status line and headers. The body travels separately.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpResponse {
    pub version: Version,
    pub status: u16,
    pub status_text: String,
    pub headers: Headers,
    pub body_len: BodyLen,
}

impl Default for HttpResponse {
    fn default() -> Self {
        Self::new(200)
    }
}

impl HttpResponse {
    /// A 1.1 response with the standard reason phrase and an empty body.
    pub fn new(status: u16) -> Self {
        Self {
            version: Version::V1_1,
            status,
            status_text: status_text(status).unwrap_or_default().to_string(),
            headers: Headers::new(),
            body_len: BodyLen::Length(0),
        }
    }

    /// Parse a status line and headers from the front of `buf`.
    ///
    /// Returns `None` until the blank line ending the head has arrived,
    /// otherwise the head and its length in bytes. The body is not
    /// required to be present.
    pub fn parse(buf: &[u8]) -> ParseResult<Option<(Self, usize)>> {
        let Some((line, next)) = next_line(buf, 0) else {
            if buf.len() > MAX_HEAD_SIZE {
                return Err(ParseError::HeadTooLarge(MAX_HEAD_SIZE));
            }
            return Ok(None);
        };
        let (version, status, status_text) = parse_status_line(line)?;
        let Some((headers, head_len)) = parse_header_block(buf, next, false)? else {
            return Ok(None);
        };

        let body_len = if bodiless(status) || status == 304 {
            BodyLen::Length(0)
        } else if headers.is_chunked() {
            BodyLen::Chunked
        } else {
            match headers.content_length() {
                Some(Ok(len)) => BodyLen::Length(len),
                Some(Err(_)) => return Err(ParseError::InvalidHeaders),
                None => BodyLen::UntilClose,
            }
        };

        Ok(Some((
            HttpResponse {
                version,
                status,
                status_text,
                headers,
                body_len,
            },
            head_len,
        )))
    }

    /// Status line and headers as written to the socket, with the framing
    /// header for `body_len` added when the caller did not set one.
    pub fn head_bytes(&self) -> Vec<u8> {
        self.to_string().into_bytes()
    }

    pub fn ok(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// Statuses that never carry a body or a `Content-Length`.
fn bodiless(status: u16) -> bool {
    (100..200).contains(&status) || status == 204
}

fn parse_status_line(line: &[u8]) -> ParseResult<(Version, u16, String)> {
    let line = std::str::from_utf8(line).map_err(|_| ParseError::InvalidStatusLine)?;
    let mut parts = line.splitn(3, ' ');
    let version = parts.next().filter(|v| !v.is_empty()).ok_or(ParseError::InvalidStatusLine)?;
    let status = parts.next().ok_or(ParseError::InvalidStatusLine)?;
    let reason = parts.next().unwrap_or_default().trim();
    if status.len() != 3 {
        return Err(ParseError::InvalidStatusCode);
    }
    let status = status.parse().map_err(|_| ParseError::InvalidStatusCode)?;
    Ok((version.parse()?, status, reason.to_string()))
}

impl Display for HttpResponse {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{} {} {}\r\n{}", self.version, self.status, self.status_text, self.headers)?;
        match self.body_len {
            BodyLen::Length(len) if !self.headers.contains("content-length") && !bodiless(self.status) => {
                write!(f, "Content-Length: {len}\r\n")?;
            }
            BodyLen::Chunked if !self.headers.is_chunked() => {
                f.write_str("Transfer-Encoding: chunked\r\n")?;
            }
            _ => {}
        }
        f.write_str("\r\n")
    }
}
