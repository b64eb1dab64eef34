//! Byte-stream transport shared by the client and the server.

use crate::error::{HttpError, HttpResult};
use crate::httpx::Buffer;
use crate::tls;
use std::io;
use std::pin::Pin;
use std::task::{Context, Poll};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, ReadBuf};
use tokio::net::TcpStream;
use tokio_rustls::client::TlsStream;
use url::{Host, Url};

/// Bytes requested from the transport per read.
pub const READ_SIZE: usize = 16 * 1024;

/// A plain or TLS connection.
pub enum Socket {
    Tcp(TcpStream),
    Tls(Box<TlsStream<TcpStream>>),
}

impl Socket {
    /// Connect to the origin of `url`: plain TCP for `http:`, TLS for `https:`.
    pub async fn connect(url: &Url) -> HttpResult<Self> {
        let host = match url.host() {
            Some(Host::Domain(name)) => name.to_string(),
            Some(Host::Ipv4(addr)) => addr.to_string(),
            Some(Host::Ipv6(addr)) => addr.to_string(),
            None => return Err(HttpError::Type(format!("{url} has no host"))),
        };
        let port = url
            .port_or_known_default()
            .ok_or_else(|| HttpError::Type(format!("{url} has no port")))?;

        let secure = match url.scheme() {
            "http" => false,
            "https" => true,
            other => {
                return Err(HttpError::Type(format!(
                    "Protocol \"{other}:\" not supported. Expected \"http:\" or \"https:\""
                )));
            }
        };

        let stream = TcpStream::connect((host.as_str(), port)).await?;
        stream.set_nodelay(true)?;
        tracing::debug!(host = %host, port, tls = secure, "Connected");

        if secure {
            let stream = tls::connect(stream, &host, tls::shared_client_config()?).await?;
            Ok(Socket::Tls(Box::new(stream)))
        } else {
            Ok(Socket::Tcp(stream))
        }
    }
}

impl std::fmt::Debug for Socket {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let (kind, stream) = match self {
            Socket::Tcp(s) => ("tcp", s),
            Socket::Tls(s) => ("tls", s.get_ref().0),
        };
        f.debug_struct("Socket")
            .field("kind", &kind)
            .field("peer", &stream.peer_addr().ok())
            .finish()
    }
}

impl AsyncRead for Socket {
    fn poll_read(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        match self.get_mut() {
            Socket::Tcp(s) => Pin::new(s).poll_read(cx, buf),
            Socket::Tls(s) => Pin::new(s.as_mut()).poll_read(cx, buf),
        }
    }
}

impl AsyncWrite for Socket {
    fn poll_write(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        match self.get_mut() {
            Socket::Tcp(s) => Pin::new(s).poll_write(cx, buf),
            Socket::Tls(s) => Pin::new(s.as_mut()).poll_write(cx, buf),
        }
    }

    fn poll_flush(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        match self.get_mut() {
            Socket::Tcp(s) => Pin::new(s).poll_flush(cx),
            Socket::Tls(s) => Pin::new(s.as_mut()).poll_flush(cx),
        }
    }

    fn poll_shutdown(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        match self.get_mut() {
            Socket::Tcp(s) => Pin::new(s).poll_shutdown(cx),
            Socket::Tls(s) => Pin::new(s.as_mut()).poll_shutdown(cx),
        }
    }
}

/// Read once from `io` into `buffer`. Returns the byte count; zero means EOF.
pub async fn fill<S>(io: &mut S, buffer: &mut Buffer) -> io::Result<usize>
where
    S: AsyncRead + Unpin,
{
    let mut chunk = [0u8; READ_SIZE];
    let n = io.read(&mut chunk).await?;
    buffer.append(&chunk[..n]);
    Ok(n)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::AsyncWriteExt;

    #[tokio::test]
    async fn rejects_unsupported_schemes() {
        let url = Url::parse("ftp://127.0.0.1/x").expect("url");
        match Socket::connect(&url).await {
            Err(HttpError::Type(msg)) => assert!(msg.contains("\"ftp:\"")),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[tokio::test]
    async fn fill_appends_and_reports_eof() {
        let (mut a, mut b) = tokio::io::duplex(64);
        a.write_all(b"abc").await.expect("write");
        drop(a);
        let mut buffer = Buffer::new();
        assert_eq!(fill(&mut b, &mut buffer).await.expect("read"), 3);
        assert_eq!(fill(&mut b, &mut buffer).await.expect("read"), 0);
        assert_eq!(buffer.as_slice(), b"abc");
    }
}
