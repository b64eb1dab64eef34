//! `http.request` / `http.get`: a buffered request and a streaming response.

use crate::client::{Request, RequestInit, Response, send};
use crate::error::{HttpError, HttpResult};
use crate::httpx::{Headers, Version};
use bytes::{Bytes, BytesMut};
use futures_util::stream::{self, BoxStream, Stream, StreamExt, TryStreamExt};
use std::pin::Pin;
use std::task::{Context, Poll};

#[derive(Debug, Clone, Default)]
pub struct RequestOptions {
    pub method: Option<String>,
    pub headers: Headers,
}

/// An outgoing request. Body writes are buffered and sent by [`end`](Self::end).
#[derive(Debug)]
pub struct ClientRequest {
    request: Request,
    body: BytesMut,
}

pub fn request(url: &str, options: RequestOptions) -> HttpResult<ClientRequest> {
    let init = RequestInit {
        method: options.method,
        headers: options.headers,
        body: None,
    };
    Ok(ClientRequest {
        request: Request::new(url, init)?,
        body: BytesMut::new(),
    })
}

/// `GET` with no body.
pub async fn get(url: &str, options: RequestOptions) -> HttpResult<IncomingMessageForClient> {
    let options = RequestOptions {
        method: Some("GET".to_string()),
        ..options
    };
    request(url, options)?.end(b"").await
}

impl ClientRequest {
    pub fn set_header(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.request.headers_mut().set(name, value);
    }

    pub fn get_header(&self, name: &str) -> Option<&str> {
        self.request.headers().get(name)
    }

    pub fn remove_header(&mut self, name: &str) -> bool {
        self.request.headers_mut().remove(name)
    }

    pub fn write(&mut self, data: impl AsRef<[u8]>) {
        self.body.extend_from_slice(data.as_ref());
    }

    /// Send the request with everything written so far plus `data`, and
    /// wait for the response head.
    pub async fn end(mut self, data: impl AsRef<[u8]>) -> HttpResult<IncomingMessageForClient> {
        self.body.extend_from_slice(data.as_ref());
        let mut request = self.request;
        request.set_body(self.body.freeze());
        let response = send(request).await?;
        Ok(IncomingMessageForClient::new(response))
    }
}

/// Response side of [`ClientRequest`]. Yields body pieces as they arrive.
pub struct IncomingMessageForClient {
    status_code: u16,
    status_message: String,
    version: Version,
    headers: Headers,
    body: BoxStream<'static, HttpResult<Bytes>>,
}

impl std::fmt::Debug for IncomingMessageForClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IncomingMessageForClient")
            .field("status_code", &self.status_code)
            .field("status_message", &self.status_message)
            .field("headers", &self.headers)
            .finish()
    }
}

impl IncomingMessageForClient {
    pub fn new(response: Response) -> Self {
        let status_code = response.status();
        let status_message = response.status_text().to_string();
        let version = response.version();
        let headers = response.headers().clone();
        let body = stream::try_unfold(response, |mut response| async move {
            let chunk = response.next_chunk().await?;
            Ok::<_, HttpError>(chunk.map(|chunk| (chunk, response)))
        })
        .boxed();
        Self {
            status_code,
            status_message,
            version,
            headers,
            body,
        }
    }

    pub fn status_code(&self) -> u16 {
        self.status_code
    }

    pub fn status_message(&self) -> &str {
        &self.status_message
    }

    pub fn http_version(&self) -> &'static str {
        self.version.number()
    }

    pub fn headers(&self) -> &Headers {
        &self.headers
    }

    /// Collect the rest of the body.
    pub async fn bytes(self) -> HttpResult<Bytes> {
        let chunks: Vec<Bytes> = self.body.try_collect().await?;
        Ok(chunks.concat().into())
    }

    pub async fn text(self) -> HttpResult<String> {
        let body = self.bytes().await?;
        Ok(String::from_utf8_lossy(&body).into_owned())
    }
}

impl Stream for IncomingMessageForClient {
    type Item = HttpResult<Bytes>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.body.poll_next_unpin(cx)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn request_validates_up_front() {
        let req = request("http://example.test/a", RequestOptions::default()).expect("request");
        assert_eq!(req.get_header("host"), Some("example.test"));
        assert!(matches!(
            request("http://u:p@example.test/", RequestOptions::default()),
            Err(HttpError::Type(_))
        ));
        assert!(matches!(
            request("not a url", RequestOptions::default()),
            Err(HttpError::Url(_))
        ));
    }

    #[test]
    fn headers_are_editable_before_end() {
        let mut req = request("http://example.test/", RequestOptions::default()).expect("request");
        req.set_header("X-A", "1");
        assert_eq!(req.get_header("x-a"), Some("1"));
        assert!(req.remove_header("x-a"));
        assert!(req.get_header("x-a").is_none());
        req.write("part");
        assert_eq!(&req.body[..], b"part");
    }
}
