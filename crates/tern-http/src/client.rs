//! `fetch`, `Request` and `Response`.

use crate::error::{HttpError, HttpResult};
use crate::httpx::{BodyLen, Buffer, ChunkFrame, Headers, HttpRequest, HttpResponse, Method, Version};
use crate::net::{Socket, fill};
use bytes::{Bytes, BytesMut};
use serde::de::DeserializeOwned;
use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt};
use url::{Position, Url};

/// Transport a [`Response`] reads its body from.
pub type BodyReader = Box<dyn AsyncRead + Send + Unpin>;

/// Options for [`fetch`] and [`Request::new`].
#[derive(Debug, Clone, Default)]
pub struct RequestInit {
    /// Case-insensitive; defaults to `GET`.
    pub method: Option<String>,
    pub headers: Headers,
    pub body: Option<Bytes>,
}

impl RequestInit {
    pub fn method(mut self, method: impl Into<String>) -> Self {
        self.method = Some(method.into());
        self
    }

    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.set(name, value);
        self
    }

    pub fn body(mut self, body: impl Into<Bytes>) -> Self {
        self.body = Some(body.into());
        self
    }
}

#[derive(Debug, Clone)]
pub struct Request {
    url: Url,
    method: Method,
    headers: Headers,
    body: Bytes,
}

impl Request {
    /// Validate `input` and normalize headers. `Accept: */*` and `Host` are
    /// filled in when absent.
    pub fn new(input: &str, init: RequestInit) -> HttpResult<Self> {
        let url = Url::parse(input)?;
        if !url.username().is_empty() || url.password().is_some() {
            return Err(HttpError::Type(format!(
                "{url} is an url with embedded credentials."
            )));
        }
        let method = match init.method {
            None => Method::Get,
            Some(m) => m
                .to_ascii_uppercase()
                .parse()
                .map_err(|_| HttpError::Type(format!("'{m}' is not a valid HTTP method.")))?,
        };

        let mut headers = init.headers;
        headers.set_default("Accept", "*/*");
        headers.set_default("Host", &url[Position::BeforeHost..Position::AfterPort]);

        Ok(Self {
            url,
            method,
            headers,
            body: init.body.unwrap_or_default(),
        })
    }

    pub fn url(&self) -> &Url {
        &self.url
    }

    pub fn method(&self) -> Method {
        self.method
    }

    pub fn headers(&self) -> &Headers {
        &self.headers
    }

    pub fn headers_mut(&mut self) -> &mut Headers {
        &mut self.headers
    }

    pub fn body(&self) -> &Bytes {
        &self.body
    }

    pub fn set_body(&mut self, body: impl Into<Bytes>) {
        self.body = body.into();
    }

    /// Origin-form target: path plus query.
    pub fn target(&self) -> &str {
        &self.url[Position::BeforePath..Position::AfterQuery]
    }

    pub(crate) fn to_wire(&self) -> HttpRequest {
        HttpRequest {
            method: self.method,
            target: self.target().to_string(),
            version: Version::V1_1,
            headers: self.headers.clone(),
            body: self.body.clone(),
        }
    }
}

/// Connect, send `input`, and wait for the response head.
pub async fn fetch(input: &str, init: RequestInit) -> HttpResult<Response> {
    send(Request::new(input, init)?).await
}

pub async fn send(request: Request) -> HttpResult<Response> {
    let mut socket = Socket::connect(&request.url).await?;
    tracing::debug!(method = %request.method, url = %request.url, "Sending request");
    exchange(&mut socket, &request).await?;
    wait_response(Box::new(socket), request.url, request.method == Method::Head).await
}

pub(crate) async fn exchange<S>(io: &mut S, request: &Request) -> HttpResult<()>
where
    S: AsyncWrite + Unpin,
{
    io.write_all(&request.to_wire().encode()).await?;
    io.flush().await?;
    Ok(())
}

/// Read until a full response head is buffered.
///
/// EOF before the head is complete is an [`HttpError::IllegalResponse`].
pub async fn wait_response(mut reader: BodyReader, url: Url, head_only: bool) -> HttpResult<Response> {
    let mut buffer = Buffer::new();
    loop {
        if let Some(mut head) = buffer.parse_response()? {
            if head_only {
                head.body_len = BodyLen::Length(0);
            }
            tracing::debug!(status = head.status, framing = ?head.body_len, "Response head received");
            return Ok(Response::new(url, head, buffer, reader));
        }
        if fill(&mut reader, &mut buffer).await? == 0 {
            return Err(HttpError::IllegalResponse);
        }
    }
}

/// A response whose body has not been read yet.
pub struct Response {
    url: Url,
    head: HttpResponse,
    buffer: Buffer,
    /// Dropped as soon as the body is complete.
    reader: Option<BodyReader>,
    remaining: usize,
}

impl std::fmt::Debug for Response {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Response")
            .field("url", &self.url.as_str())
            .field("status", &self.head.status)
            .field("status_text", &self.head.status_text)
            .field("body_len", &self.head.body_len)
            .finish()
    }
}

impl Response {
    fn new(url: Url, head: HttpResponse, buffer: Buffer, reader: BodyReader) -> Self {
        let remaining = match head.body_len {
            BodyLen::Length(n) => n,
            _ => 0,
        };
        Self {
            url,
            head,
            buffer,
            reader: Some(reader),
            remaining,
        }
    }

    pub fn url(&self) -> &Url {
        &self.url
    }

    pub fn status(&self) -> u16 {
        self.head.status
    }

    pub fn status_text(&self) -> &str {
        &self.head.status_text
    }

    pub fn version(&self) -> Version {
        self.head.version
    }

    pub fn headers(&self) -> &Headers {
        &self.head.headers
    }

    pub fn body_len(&self) -> BodyLen {
        self.head.body_len
    }

    /// `true` for 2xx statuses.
    pub fn ok(&self) -> bool {
        self.head.ok()
    }

    /// Next piece of the body, or `None` once it is complete.
    pub async fn next_chunk(&mut self) -> HttpResult<Option<Bytes>> {
        loop {
            if self.reader.is_none() {
                return Ok(None);
            }
            match self.head.body_len {
                BodyLen::Length(_) => {
                    if self.remaining == 0 {
                        self.reader = None;
                        return Ok(None);
                    }
                    if !self.buffer.is_empty() {
                        let data = self.buffer.take(self.remaining);
                        self.remaining -= data.len();
                        return Ok(Some(data));
                    }
                }
                BodyLen::Chunked => match self.buffer.parse_chunk()? {
                    Some(ChunkFrame::Data(data)) => return Ok(Some(data)),
                    Some(ChunkFrame::Last) => {
                        self.reader = None;
                        return Ok(None);
                    }
                    None => {}
                },
                BodyLen::UntilClose => {
                    if !self.buffer.is_empty() {
                        return Ok(Some(self.buffer.take_all()));
                    }
                }
            }

            let Some(reader) = self.reader.as_mut() else {
                return Ok(None);
            };
            if fill(reader, &mut self.buffer).await? == 0 {
                self.reader = None;
                return match self.head.body_len {
                    BodyLen::UntilClose => Ok(None),
                    _ => Err(HttpError::ConnectionClosed),
                };
            }
        }
    }

    /// Drain the body, handing each piece to `on_chunk` as it arrives.
    pub async fn array_buffer_with(mut self, mut on_chunk: impl FnMut(&Bytes)) -> HttpResult<Bytes> {
        let mut body = BytesMut::new();
        while let Some(chunk) = self.next_chunk().await? {
            on_chunk(&chunk);
            body.extend_from_slice(&chunk);
        }
        Ok(body.freeze())
    }

    pub async fn array_buffer(self) -> HttpResult<Bytes> {
        self.array_buffer_with(|_| {}).await
    }

    /// Body decoded as UTF-8; invalid sequences become U+FFFD.
    pub async fn text(self) -> HttpResult<String> {
        let body = self.array_buffer().await?;
        Ok(String::from_utf8_lossy(&body).into_owned())
    }

    pub async fn json<T: DeserializeOwned>(self) -> HttpResult<T> {
        let body = self.array_buffer().await?;
        Ok(serde_json::from_slice(&body)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::AsyncReadExt;

    fn url() -> Url {
        Url::parse("http://example.test/x").expect("url")
    }

    async fn respond(wire: &'static [u8], head_only: bool) -> HttpResult<Response> {
        let (mut server, client) = tokio::io::duplex(8);
        tokio::spawn(async move {
            let _ = server.write_all(wire).await;
        });
        wait_response(Box::new(client), url(), head_only).await
    }

    #[test]
    fn request_defaults_and_validation() {
        let req = Request::new("http://example.test:8080/a/b?q=1#frag", RequestInit::default())
            .expect("request");
        assert_eq!(req.method(), Method::Get);
        assert_eq!(req.headers().get("accept"), Some("*/*"));
        assert_eq!(req.headers().get("host"), Some("example.test:8080"));
        assert_eq!(req.target(), "/a/b?q=1");

        let req = Request::new(
            "http://example.test",
            RequestInit::default().method("post").header("Accept", "text/plain"),
        )
        .expect("request");
        assert_eq!(req.method(), Method::Post);
        assert_eq!(req.headers().get("accept"), Some("text/plain"));
        assert_eq!(req.target(), "/");

        match Request::new("http://user:pw@example.test/", RequestInit::default()) {
            Err(HttpError::Type(msg)) => assert!(msg.contains("embedded credentials")),
            other => panic!("unexpected {other:?}"),
        }
        assert!(matches!(
            Request::new("http://example.test", RequestInit::default().method("brew")),
            Err(HttpError::Type(_))
        ));
    }

    #[tokio::test]
    async fn exchange_writes_an_encoded_request() {
        let req = Request::new("http://h.test/p", RequestInit::default().method("PUT").body("abc"))
            .expect("request");
        let (mut a, mut b) = tokio::io::duplex(1024);
        exchange(&mut a, &req).await.expect("send");
        drop(a);
        let mut wire = Vec::new();
        b.read_to_end(&mut wire).await.expect("read");
        let text = String::from_utf8(wire).expect("utf8");
        assert!(text.starts_with("PUT /p HTTP/1.1\r\n"));
        assert!(text.contains("Content-Length: 3\r\n"));
        assert!(text.ends_with("\r\n\r\nabc"));
    }

    #[tokio::test]
    async fn fixed_length_body() {
        let res = respond(b"HTTP/1.1 200 OK\r\nContent-Length: 5\r\n\r\nhelloEXTRA", false)
            .await
            .expect("head");
        assert!(res.ok());
        assert_eq!(res.text().await.expect("body"), "hello");
    }

    #[tokio::test]
    async fn chunked_body_reports_each_chunk() {
        let res = respond(
            b"HTTP/1.1 200 OK\r\nTransfer-Encoding: chunked\r\n\r\n3\r\none\r\n3\r\ntwo\r\n0\r\n\r\n",
            false,
        )
        .await
        .expect("head");
        let mut seen = Vec::new();
        let body = res
            .array_buffer_with(|c| seen.push(c.clone()))
            .await
            .expect("body");
        assert_eq!(&body[..], b"onetwo");
        assert_eq!(seen, vec![Bytes::from_static(b"one"), Bytes::from_static(b"two")]);
    }

    #[tokio::test]
    async fn unframed_body_runs_until_eof() {
        let res = respond(b"HTTP/1.0 200 OK\r\n\r\n{\"a\":[1,2]}", false)
            .await
            .expect("head");
        let value: serde_json::Value = res.json().await.expect("json");
        assert_eq!(value["a"][1], 2);
    }

    #[tokio::test]
    async fn truncated_bodies_and_heads_fail() {
        let res = respond(b"HTTP/1.1 200 OK\r\nContent-Length: 10\r\n\r\nshort", false)
            .await
            .expect("head");
        assert!(matches!(res.text().await, Err(HttpError::ConnectionClosed)));

        assert!(matches!(
            respond(b"HTTP/1.1 200 OK\r\nContent-", false).await,
            Err(HttpError::IllegalResponse)
        ));
    }

    #[tokio::test]
    async fn head_responses_have_no_body() {
        let res = respond(b"HTTP/1.1 200 OK\r\nContent-Length: 99\r\n\r\n", true)
            .await
            .expect("head");
        assert_eq!(res.headers().content_length(), Some(Ok(99)));
        assert!(res.array_buffer().await.expect("body").is_empty());
    }
}
