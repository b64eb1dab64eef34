use super::chunk::{Chunk, parse_chunk};
use super::{Headers, MAX_BODY_SIZE, MAX_HEAD_SIZE, Method, ParseError, ParseResult, Version, next_line, parse_header_block};
use bytes::Bytes;
use std::fmt::{self, Display, Formatter};

/// A request head plus its complete body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpRequest {
    pub method: Method,
    /// Request target as sent: origin form (`/a?b`), `*`, or absolute form.
    pub target: String,
    pub version: Version,
    pub headers: Headers,
    pub body: Bytes,
}

impl HttpRequest {
    pub fn new(method: Method, target: impl Into<String>) -> Self {
        Self {
            method,
            target: target.into(),
            version: Version::V1_1,
            headers: Headers::new(),
            body: Bytes::new(),
        }
    }

    /// Parse a whole request from the front of `buf`.
    ///
    /// Header names are lowercased. The body is framed by `Content-Length`
    /// or chunked encoding; chunked bodies are reassembled. Returns `None`
    /// until every byte of the message is present, otherwise the request
    /// and how many bytes it used.
    pub fn parse(buf: &[u8]) -> ParseResult<Option<(Self, usize)>> {
        let mut at = 0;
        let line = loop {
            let Some((line, next)) = next_line(buf, at) else {
                if buf.len() > MAX_HEAD_SIZE {
                    return Err(ParseError::HeadTooLarge(MAX_HEAD_SIZE));
                }
                return Ok(None);
            };
            at = next;
            // Tolerate stray CRLFs left between pipelined requests.
            if !line.is_empty() {
                break line;
            }
        };
        let (method, target, version) = parse_request_line(line)?;
        let Some((headers, head_end)) = parse_header_block(buf, at, true)? else {
            return Ok(None);
        };

        let (body, used) = if headers.is_chunked() {
            let mut body = Vec::new();
            let mut at = head_end;
            loop {
                match parse_chunk(&buf[at..])? {
                    None => return Ok(None),
                    Some((Chunk::Data(data), n)) => {
                        if body.len() + data.len() > MAX_BODY_SIZE {
                            return Err(ParseError::BodyTooLarge(MAX_BODY_SIZE));
                        }
                        body.extend_from_slice(data);
                        at += n;
                    }
                    Some((Chunk::Last, n)) => break (Bytes::from(body), at + n),
                }
            }
        } else {
            let len = match headers.content_length() {
                None => 0,
                Some(Ok(len)) => len,
                Some(Err(_)) => return Err(ParseError::InvalidHeaders),
            };
            if len > MAX_BODY_SIZE {
                return Err(ParseError::BodyTooLarge(MAX_BODY_SIZE));
            }
            let end = head_end.checked_add(len).ok_or(ParseError::InvalidHeaders)?;
            let Some(body) = buf.get(head_end..end) else {
                return Ok(None);
            };
            (Bytes::copy_from_slice(body), end)
        };

        Ok(Some((
            HttpRequest {
                method,
                target,
                version,
                headers,
                body,
            },
            used,
        )))
    }

    /// Head and body as written to the socket. A non-empty body gets a
    /// `Content-Length` unless the caller framed it already.
    pub fn encode(&self) -> Vec<u8> {
        let mut head = format!("{} {} {}\r\n{}", self.method, self.target, self.version, self.headers);
        let framed = self.headers.contains("content-length") || self.headers.is_chunked();
        if !self.body.is_empty() && !framed {
            head.push_str(&format!("Content-Length: {}\r\n", self.body.len()));
        }
        head.push_str("\r\n");
        let mut out = head.into_bytes();
        out.extend_from_slice(&self.body);
        out
    }

    /// Path component of the target, without the query.
    pub fn path(&self) -> &str {
        self.target.split('?').next().unwrap_or_default()
    }

    /// Whether the connection should stay open after this exchange.
    pub fn keep_alive(&self) -> bool {
        self.headers
            .connection_keep_alive()
            .unwrap_or_else(|| self.version.keep_alive_by_default())
    }
}

fn parse_request_line(line: &[u8]) -> ParseResult<(Method, String, Version)> {
    let line = std::str::from_utf8(line).map_err(|_| ParseError::InvalidRequestLine)?;
    let mut words = line.split_whitespace();
    let method = words.next().ok_or(ParseError::InvalidMethod)?;
    let target = words.next().ok_or(ParseError::InvalidUrl)?;
    let version = words.next().ok_or(ParseError::InvalidVersion)?;
    if words.next().is_some() {
        return Err(ParseError::InvalidRequestLine);
    }
    if !(target.starts_with('/') || target == "*" || target.contains("://")) {
        return Err(ParseError::InvalidUrl);
    }
    Ok((method.parse()?, target.to_string(), version.parse()?))
}

impl Display for HttpRequest {
    /// The head only.
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{} {} {}\r\n{}\r\n", self.method, self.target, self.version, self.headers)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const POST: &[u8] = b"POST /greeting?x=1 HTTP/1.1\r\nHost: localhost:3000\r\nUser-Agent: curl/7.64.1\r\nContent-Length: 11\r\nAccept: */*\r\n\r\ntestbody123";

    #[test]
    fn parses_head_and_fixed_body() {
        let (req, used) = HttpRequest::parse(POST).expect("parse").expect("complete");
        assert_eq!(req.method, Method::Post);
        assert_eq!(req.version, Version::V1_1);
        assert_eq!(req.target, "/greeting?x=1");
        assert_eq!(req.path(), "/greeting");
        assert_eq!(req.headers.get("user-agent"), Some("curl/7.64.1"));
        assert_eq!(req.headers.iter().next(), Some(("host", "localhost:3000")));
        assert_eq!(&req.body[..], b"testbody123");
        assert_eq!(used, POST.len());
        assert!(req.keep_alive());
    }

    #[test]
    fn waits_for_the_whole_body() {
        for cut in 0..POST.len() {
            assert_eq!(HttpRequest::parse(&POST[..cut]), Ok(None), "cut at {cut}");
        }
    }

    #[test]
    fn reassembles_chunked_bodies() {
        let wire = b"PUT /up HTTP/1.1\r\nTransfer-Encoding: chunked\r\n\r\n3\r\nabc\r\n2\r\nde\r\n0\r\n\r\nGET";
        let (req, used) = HttpRequest::parse(wire).expect("parse").expect("complete");
        assert_eq!(&req.body[..], b"abcde");
        assert_eq!(&wire[used..], b"GET");
    }

    #[test]
    fn bodies_over_the_limit_are_rejected() {
        let declared = format!("POST / HTTP/1.1\r\nContent-Length: {}\r\n\r\n", MAX_BODY_SIZE + 1);
        assert_eq!(
            HttpRequest::parse(declared.as_bytes()),
            Err(ParseError::BodyTooLarge(MAX_BODY_SIZE))
        );

        let mut chunked = b"POST / HTTP/1.1\r\nTransfer-Encoding: chunked\r\n\r\n".to_vec();
        let piece = vec![b'z'; 1024 * 1024];
        for _ in 0..=MAX_BODY_SIZE / piece.len() {
            chunked.extend_from_slice(&crate::httpx::encode_chunk(&piece));
        }
        assert_eq!(
            HttpRequest::parse(&chunked),
            Err(ParseError::BodyTooLarge(MAX_BODY_SIZE))
        );
    }

    #[test]
    fn rejects_bad_request_lines() {
        let cases: [(&[u8], ParseError); 5] = [
            (b"FETCH / HTTP/1.1\r\n\r\n", ParseError::InvalidMethod),
            (b"GET\r\n\r\n", ParseError::InvalidUrl),
            (b"GET /\r\n\r\n", ParseError::InvalidVersion),
            (b"GET / HTTP/1.1 extra\r\n\r\n", ParseError::InvalidRequestLine),
            (b"GET nope HTTP/1.1\r\n\r\n", ParseError::InvalidUrl),
        ];
        for (wire, expected) in cases {
            assert_eq!(HttpRequest::parse(wire), Err(expected));
        }
        assert_eq!(
            HttpRequest::parse(b"GET / HTTP/1.1\r\nContent-Length: ten\r\n\r\n"),
            Err(ParseError::InvalidHeaders)
        );
    }

    #[test]
    fn connection_header_overrides_version_default() {
        let (req, _) = HttpRequest::parse(b"GET / HTTP/1.0\r\n\r\n").expect("parse").expect("complete");
        assert!(!req.keep_alive());
        let (req, _) = HttpRequest::parse(b"GET / HTTP/1.0\r\nConnection: keep-alive\r\n\r\n")
            .expect("parse")
            .expect("complete");
        assert!(req.keep_alive());
        let (req, _) = HttpRequest::parse(b"GET / HTTP/1.1\r\nConnection: close\r\n\r\n")
            .expect("parse")
            .expect("complete");
        assert!(!req.keep_alive());
    }

    #[test]
    fn encode_adds_content_length() {
        let mut req = HttpRequest::new(Method::Get, "/abc");
        req.version = Version::V1_0;
        req.headers.append("Content-Type", "text/html");
        req.body = Bytes::from_static(b"abcd");
        assert_eq!(
            req.encode(),
            b"GET /abc HTTP/1.0\r\nContent-Type: text/html\r\nContent-Length: 4\r\n\r\nabcd"
        );
        assert_eq!(req.to_string(), "GET /abc HTTP/1.0\r\nContent-Type: text/html\r\n\r\n");
    }
}
