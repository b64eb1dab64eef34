//! `http.createServer`: accept loop, `IncomingMessage` and `ServerResponse`.

use crate::conn::{ConnState, HttpConn, Transport};
use crate::error::{HttpError, HttpResult};
use crate::httpx::{Headers, HttpRequest, HttpResponse, Method, Version};
use crate::status::status_text;
use bytes::Bytes;
use futures_util::future::BoxFuture;
use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::net::TcpListener;
use tokio::sync::{Mutex, oneshot};

type SharedConn = Arc<Mutex<HttpConn<Box<dyn Transport>>>>;

/// Called once per request.
///
/// The connection waits for the response to end (or be dropped) before
/// reading the next request, so `res` may be moved into another task.
pub trait RequestHandler: Send + Sync + 'static {
    fn handle(&self, req: IncomingMessage, res: ServerResponse) -> BoxFuture<'static, ()>;
}

impl<F, Fut> RequestHandler for F
where
    F: Fn(IncomingMessage, ServerResponse) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = ()> + Send + 'static,
{
    fn handle(&self, req: IncomingMessage, res: ServerResponse) -> BoxFuture<'static, ()> {
        Box::pin(self(req, res))
    }
}

/// A request as seen by a handler. The body is complete.
#[derive(Debug, Clone)]
pub struct IncomingMessage {
    method: Method,
    url: String,
    version: Version,
    headers: Headers,
    body: Bytes,
    remote_addr: Option<SocketAddr>,
}

impl IncomingMessage {
    fn from_request(request: HttpRequest, remote_addr: Option<SocketAddr>) -> Self {
        Self {
            method: request.method,
            url: request.target,
            version: request.version,
            headers: request.headers,
            body: request.body,
            remote_addr,
        }
    }

    pub fn method(&self) -> Method {
        self.method
    }

    /// Request target as sent, query included.
    pub fn url(&self) -> &str {
        &self.url
    }

    /// `"1.0"` or `"1.1"`.
    pub fn http_version(&self) -> &'static str {
        self.version.number()
    }

    /// Header names are lowercase.
    pub fn headers(&self) -> &Headers {
        &self.headers
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name)
    }

    pub fn body(&self) -> &Bytes {
        &self.body
    }

    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }

    pub fn remote_addr(&self) -> Option<SocketAddr> {
        self.remote_addr
    }
}

/// Response writer handed to a [`RequestHandler`].
///
/// Headers stay mutable until the first `write`, which commits them. An
/// `end` with no prior `write` sends head and body together with a
/// `Content-Length`.
pub struct ServerResponse {
    conn: SharedConn,
    status_code: u16,
    status_message: Option<String>,
    headers: Headers,
    headers_sent: bool,
    finished: bool,
    done: Option<oneshot::Sender<()>>,
}

impl std::fmt::Debug for ServerResponse {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServerResponse")
            .field("status_code", &self.status_code)
            .field("headers", &self.headers)
            .field("headers_sent", &self.headers_sent)
            .field("finished", &self.finished)
            .finish()
    }
}

impl ServerResponse {
    fn new(conn: SharedConn, done: oneshot::Sender<()>) -> Self {
        Self {
            conn,
            status_code: 200,
            status_message: None,
            headers: Headers::new(),
            headers_sent: false,
            finished: false,
            done: Some(done),
        }
    }

    pub fn status_code(&self) -> u16 {
        self.status_code
    }

    pub fn set_status_code(&mut self, status: u16) {
        self.status_code = status;
    }

    /// Reason phrase; defaults to the standard one for the status.
    pub fn set_status_message(&mut self, message: impl Into<String>) {
        self.status_message = Some(message.into());
    }

    pub fn set_header(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.headers.set(name, value);
    }

    pub fn get_header(&self, name: &str) -> Option<&str> {
        self.headers.get(name)
    }

    pub fn has_header(&self, name: &str) -> bool {
        self.headers.contains(name)
    }

    pub fn remove_header(&mut self, name: &str) -> bool {
        self.headers.remove(name)
    }

    /// Set status and merge `headers`. Nothing is sent until the first write.
    pub fn write_head<K, V>(&mut self, status: u16, headers: impl IntoIterator<Item = (K, V)>)
    where
        K: Into<String>,
        V: Into<String>,
    {
        self.status_code = status;
        for (k, v) in headers {
            self.headers.set(k, v);
        }
    }

    pub fn headers_sent(&self) -> bool {
        self.headers_sent
    }

    pub fn writable_ended(&self) -> bool {
        self.finished
    }

    fn head(&self) -> HttpResponse {
        let mut head = HttpResponse::new(self.status_code);
        head.status_text = match &self.status_message {
            Some(message) => message.clone(),
            None => status_text(self.status_code).unwrap_or("unknown").to_string(),
        };
        head.headers = self.headers.clone();
        head
    }

    /// Send a piece of the body, committing headers on the first call.
    pub async fn write(&mut self, data: impl AsRef<[u8]>) -> HttpResult<()> {
        if self.finished {
            return Err(HttpError::WriteAfterEnd("write"));
        }
        let mut conn = self.conn.lock().await;
        if !self.headers_sent {
            conn.start_chunked(self.head()).await?;
            self.headers_sent = true;
        }
        conn.chunk(data.as_ref()).await
    }

    /// Finish the response, sending `data` as its last piece.
    pub async fn end(&mut self, data: impl AsRef<[u8]>) -> HttpResult<()> {
        if self.finished {
            return Err(HttpError::WriteAfterEnd("end"));
        }
        self.finished = true;
        let data = data.as_ref();
        let result = {
            let mut conn = self.conn.lock().await;
            if self.headers_sent {
                match conn.chunk(data).await {
                    Ok(()) => conn.end().await,
                    Err(e) => Err(e),
                }
            } else {
                self.headers_sent = true;
                conn.respond_with(self.head(), data).await
            }
        };
        if let Some(done) = self.done.take() {
            let _ = done.send(());
        }
        result
    }
}

impl Drop for ServerResponse {
    fn drop(&mut self) {
        if !self.finished {
            tracing::warn!(status = self.status_code, "ServerResponse dropped before end");
        }
    }
}

/// Serve requests on `io` until the peer or a response closes it.
pub async fn serve_connection<T>(io: T, peer: Option<SocketAddr>, handler: Arc<dyn RequestHandler>)
where
    T: Transport + 'static,
{
    let io: Box<dyn Transport> = Box::new(io);
    let conn: SharedConn = Arc::new(Mutex::new(HttpConn::new(io)));
    loop {
        let request = conn.lock().await.next_request().await;
        let Some(request) = request else {
            break;
        };
        let (done_tx, done_rx) = oneshot::channel();
        let req = IncomingMessage::from_request(request, peer);
        let res = ServerResponse::new(conn.clone(), done_tx);
        handler.handle(req, res).await;
        // Resolves on `end` or when the response is dropped.
        let _ = done_rx.await;

        let mut conn = conn.lock().await;
        if conn.state() == ConnState::RequestReceived {
            conn.close().await;
        }
        if conn.state() == ConnState::Closed {
            break;
        }
    }
    tracing::debug!(peer = ?peer, "Connection finished");
}

/// An HTTP server. Create with [`create_server`].
pub struct Server {
    handler: Arc<dyn RequestHandler>,
    local_addr: Option<SocketAddr>,
    listening: Arc<AtomicBool>,
    shutdown_tx: Option<oneshot::Sender<()>>,
}

impl std::fmt::Debug for Server {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Server")
            .field("local_addr", &self.local_addr)
            .field("listening", &self.listening())
            .finish()
    }
}

pub fn create_server(handler: impl RequestHandler) -> Server {
    Server {
        handler: Arc::new(handler),
        local_addr: None,
        listening: Arc::new(AtomicBool::new(false)),
        shutdown_tx: None,
    }
}

impl Server {
    /// Bind and start accepting. Port 0 picks a free port; the bound
    /// address is returned and available from [`address`](Self::address).
    pub async fn listen(&mut self, port: u16, host: &str) -> HttpResult<SocketAddr> {
        if self.listening() {
            return Err(HttpError::AlreadyListening);
        }
        let listener = TcpListener::bind((host, port)).await?;
        let local_addr = listener.local_addr()?;

        let (shutdown_tx, mut shutdown_rx) = oneshot::channel::<()>();
        let handler = self.handler.clone();
        let listening = self.listening.clone();
        listening.store(true, Ordering::Release);

        tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = &mut shutdown_rx => {
                        tracing::debug!(addr = %local_addr, "HTTP server shutdown signal received");
                        break;
                    }
                    result = listener.accept() => {
                        match result {
                            Ok((stream, peer_addr)) => {
                                let _ = stream.set_nodelay(true);
                                tracing::debug!(peer = %peer_addr, "Connection accepted");
                                tokio::spawn(serve_connection(stream, Some(peer_addr), handler.clone()));
                            }
                            Err(e) => {
                                tracing::error!(error = %e, "Accept error");
                            }
                        }
                    }
                }
            }
            listening.store(false, Ordering::Release);
        });

        self.local_addr = Some(local_addr);
        self.shutdown_tx = Some(shutdown_tx);
        tracing::info!(port = local_addr.port(), hostname = host, "HTTP server started");
        Ok(local_addr)
    }

    pub fn address(&self) -> Option<SocketAddr> {
        self.local_addr
    }

    pub fn listening(&self) -> bool {
        self.listening.load(Ordering::Acquire)
    }

    /// Stop accepting connections. Connections already accepted run to
    /// completion.
    pub fn close(&mut self) -> HttpResult<()> {
        let tx = self.shutdown_tx.take().ok_or(HttpError::NotRunning)?;
        let _ = tx.send(());
        self.listening.store(false, Ordering::Release);
        tracing::info!(addr = ?self.local_addr, "HTTP server stopped");
        Ok(())
    }
}

impl Drop for Server {
    fn drop(&mut self) {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::{AsyncReadExt, AsyncWriteExt, duplex};

    async fn exchange(handler: impl RequestHandler, wire: &[u8]) -> String {
        let (server, mut client) = duplex(8192);
        let task = tokio::spawn(serve_connection(server, None, Arc::new(handler)));
        client.write_all(wire).await.expect("send");
        let mut out = Vec::new();
        client.read_to_end(&mut out).await.expect("read");
        task.await.expect("join");
        String::from_utf8(out).expect("utf8")
    }

    #[tokio::test]
    async fn end_without_write_is_one_fixed_length_response() {
        let out = exchange(
            |req: IncomingMessage, mut res: ServerResponse| async move {
                res.set_header("Content-Type", "text/plain");
                let _ = res.end(format!("got {}", req.text())).await;
            },
            b"POST /x HTTP/1.1\r\nContent-Length: 2\r\nConnection: close\r\n\r\nhi",
        )
        .await;
        assert_eq!(
            out,
            "HTTP/1.1 200 OK\r\nContent-Type: text/plain\r\nConnection: close\r\nContent-Length: 6\r\n\r\ngot hi"
        );
    }

    #[tokio::test]
    async fn write_commits_headers_and_streams_chunks() {
        let out = exchange(
            |_req: IncomingMessage, mut res: ServerResponse| async move {
                res.write_head(201, [("X-Step", "1")]);
                assert!(!res.headers_sent());
                res.write("ab").await.expect("write");
                assert!(res.headers_sent());
                res.set_header("X-Late", "ignored");
                res.end("c").await.expect("end");
                assert!(matches!(res.write("d").await, Err(HttpError::WriteAfterEnd("write"))));
            },
            b"GET / HTTP/1.1\r\nConnection: close\r\n\r\n",
        )
        .await;
        assert!(out.starts_with("HTTP/1.1 201 Created\r\nX-Step: 1\r\nConnection: close\r\nTransfer-Encoding: chunked\r\n\r\n"));
        assert!(out.ends_with("2\r\nab\r\n1\r\nc\r\n0\r\n\r\n"));
        assert!(!out.contains("X-Late"));
    }

    #[tokio::test]
    async fn response_may_finish_in_another_task() {
        let out = exchange(
            |_req: IncomingMessage, mut res: ServerResponse| async move {
                tokio::spawn(async move {
                    tokio::task::yield_now().await;
                    let _ = res.end("later").await;
                });
            },
            b"GET / HTTP/1.1\r\nConnection: close\r\n\r\n",
        )
        .await;
        assert!(out.ends_with("\r\n\r\nlater"));
    }

    #[tokio::test]
    async fn dropped_response_closes_the_connection() {
        let out = exchange(
            |_req: IncomingMessage, res: ServerResponse| async move {
                drop(res);
            },
            b"GET / HTTP/1.1\r\n\r\nGET /second HTTP/1.1\r\n\r\n",
        )
        .await;
        assert!(out.is_empty());
    }

    #[tokio::test]
    async fn listen_address_and_close() {
        let mut server = create_server(|_req: IncomingMessage, mut res: ServerResponse| async move {
            let _ = res.end("").await;
        });
        assert!(server.address().is_none());
        let addr = server.listen(0, "127.0.0.1").await.expect("listen");
        assert_eq!(server.address(), Some(addr));
        assert!(server.listening());
        assert!(matches!(server.listen(0, "127.0.0.1").await, Err(HttpError::AlreadyListening)));
        server.close().expect("close");
        assert!(!server.listening());
        assert!(matches!(server.close(), Err(HttpError::NotRunning)));
    }
}
