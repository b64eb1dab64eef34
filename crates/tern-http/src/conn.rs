//! Server side of one HTTP/1.x connection.

use crate::error::{HttpError, HttpResult};
use crate::httpx::{BodyLen, Buffer, HttpRequest, HttpResponse, LAST_CHUNK, Method, Version, encode_chunk};
use crate::net::fill;
use bytes::BytesMut;
use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt};

/// Anything a connection can run over.
pub trait Transport: AsyncRead + AsyncWrite + Send + Unpin {}

impl<T: AsyncRead + AsyncWrite + Send + Unpin> Transport for T {}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnState {
    AwaitingRequest,
    RequestReceived,
    Closed,
}

/// A response whose body is still being produced.
#[derive(Debug)]
enum Streaming {
    /// 1.1: head is on the wire, body goes out as chunks.
    Chunked,
    /// 1.0: nothing sent yet, body accumulates until `end`.
    Buffered { head: HttpResponse, body: BytesMut },
}

/// Request/response cycle over a transport.
///
/// `next_request` moves the connection to `RequestReceived`; completing a
/// response moves it back to `AwaitingRequest` when the exchange is
/// keep-alive, otherwise the transport is shut down and the connection is
/// `Closed`.
#[derive(Debug)]
pub struct HttpConn<S> {
    io: S,
    buffer: Buffer,
    state: ConnState,
    version: Version,
    keep_alive: bool,
    head_request: bool,
    streaming: Option<Streaming>,
}

impl<S: AsyncRead + AsyncWrite + Unpin> HttpConn<S> {
    pub fn new(io: S) -> Self {
        Self {
            io,
            buffer: Buffer::new(),
            state: ConnState::AwaitingRequest,
            version: Version::V1_1,
            keep_alive: true,
            head_request: false,
            streaming: None,
        }
    }

    pub fn state(&self) -> ConnState {
        self.state
    }

    /// Version of the request being answered.
    pub fn version(&self) -> Version {
        self.version
    }

    pub fn keep_alive(&self) -> bool {
        self.keep_alive
    }

    /// Wait for the next complete request.
    ///
    /// Returns `None` when the peer closes first or sends something that
    /// does not parse; either way the connection ends up `Closed`.
    pub async fn next_request(&mut self) -> Option<HttpRequest> {
        match self.state {
            ConnState::AwaitingRequest => {}
            ConnState::Closed => return None,
            ConnState::RequestReceived => {
                tracing::debug!("next_request before the previous response ended");
                self.close().await;
                return None;
            }
        }
        loop {
            match self.buffer.parse_request() {
                Ok(Some(request)) => {
                    self.version = request.version;
                    self.keep_alive = request.keep_alive();
                    self.head_request = request.method == Method::Head;
                    self.state = ConnState::RequestReceived;
                    tracing::debug!(
                        method = %request.method,
                        target = %request.target,
                        version = request.version.number(),
                        keep_alive = self.keep_alive,
                        "Request received"
                    );
                    return Some(request);
                }
                Ok(None) => {}
                Err(e) => {
                    tracing::debug!(error = %e, "Malformed request");
                    self.close().await;
                    return None;
                }
            }
            match fill(&mut self.io, &mut self.buffer).await {
                Ok(n) if n > 0 => {}
                Ok(_) => {
                    if !self.buffer.is_empty() {
                        tracing::debug!(pending = self.buffer.len(), "Peer closed mid-request");
                    }
                    self.close().await;
                    return None;
                }
                Err(e) => {
                    tracing::debug!(error = %e, "Read failed");
                    self.close().await;
                    return None;
                }
            }
        }
    }

    /// Send a complete response with a fixed-length body.
    pub async fn respond_with(&mut self, head: HttpResponse, body: &[u8]) -> HttpResult<()> {
        self.expect_response("respond")?;
        let mut head = self.prepare(head);
        head.body_len = BodyLen::Length(body.len());
        let mut wire = head.head_bytes();
        if !self.head_request {
            wire.extend_from_slice(body);
        }
        self.io.write_all(&wire).await?;
        self.finish().await
    }

    /// Commit `head` for a body of unknown length. On 1.1 the head goes
    /// out now with chunked framing; on 1.0 it is held until [`end`](Self::end).
    pub async fn start_chunked(&mut self, head: HttpResponse) -> HttpResult<()> {
        self.expect_response("write")?;
        if self.streaming.is_some() {
            return Err(HttpError::Type("response head already sent".to_string()));
        }
        let mut head = self.prepare(head);
        match self.version {
            Version::V1_1 => {
                head.body_len = BodyLen::Chunked;
                self.io.write_all(&head.head_bytes()).await?;
                self.streaming = Some(Streaming::Chunked);
            }
            Version::V1_0 => {
                self.streaming = Some(Streaming::Buffered {
                    head,
                    body: BytesMut::new(),
                });
            }
        }
        Ok(())
    }

    /// Add body bytes to the response started by `start_chunked`.
    pub async fn chunk(&mut self, data: &[u8]) -> HttpResult<()> {
        match &mut self.streaming {
            Some(Streaming::Chunked) => {
                if !self.head_request {
                    self.io.write_all(&encode_chunk(data)).await?;
                }
                Ok(())
            }
            Some(Streaming::Buffered { body, .. }) => {
                body.extend_from_slice(data);
                Ok(())
            }
            None => Err(HttpError::WriteAfterEnd("write")),
        }
    }

    /// Finish the response started by `start_chunked`.
    pub async fn end(&mut self) -> HttpResult<()> {
        match self.streaming.take() {
            Some(Streaming::Chunked) => {
                if !self.head_request {
                    self.io.write_all(LAST_CHUNK).await?;
                }
            }
            Some(Streaming::Buffered { mut head, body }) => {
                head.body_len = BodyLen::Length(body.len());
                let mut wire = head.head_bytes();
                if !self.head_request {
                    wire.extend_from_slice(&body);
                }
                self.io.write_all(&wire).await?;
            }
            None => return Err(HttpError::WriteAfterEnd("end")),
        }
        self.finish().await
    }

    /// Shut the transport down. Idempotent.
    pub async fn close(&mut self) {
        if self.state == ConnState::Closed {
            return;
        }
        self.state = ConnState::Closed;
        self.streaming = None;
        if let Err(e) = self.io.shutdown().await {
            tracing::debug!(error = %e, "Shutdown failed");
        }
    }

    fn expect_response(&self, what: &'static str) -> HttpResult<()> {
        match self.state {
            ConnState::RequestReceived => Ok(()),
            _ => Err(HttpError::WriteAfterEnd(what)),
        }
    }

    /// Stamp the negotiated version and `Connection` header onto `head`.
    fn prepare(&mut self, mut head: HttpResponse) -> HttpResponse {
        head.version = self.version;
        match head.headers.connection_keep_alive() {
            Some(keep_alive) => self.keep_alive &= keep_alive,
            None => {
                let value = if self.keep_alive { "keep-alive" } else { "close" };
                head.headers.set("Connection", value);
            }
        }
        head
    }

    async fn finish(&mut self) -> HttpResult<()> {
        self.streaming = None;
        self.io.flush().await?;
        if self.keep_alive {
            self.state = ConnState::AwaitingRequest;
        } else {
            self.close().await;
        }
        Ok(())
    }
}
