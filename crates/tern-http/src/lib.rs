//! Node.js-compatible `http` for tern.
//!
//! HTTP/1.0 and 1.1 are framed by hand in [`httpx`]; this crate adds the
//! transports and the Node-shaped surface on top:
//!
//! - `fetch` with `Request`/`Response`
//! - `request`/`get` returning a streaming `IncomingMessageForClient`
//! - `create_server` with `IncomingMessage`/`ServerResponse`
//!
//! ```no_run
//! use tern_http::{IncomingMessage, RequestInit, ServerResponse, create_server, fetch};
//!
//! # async fn demo() -> tern_http::HttpResult<()> {
//! let mut server = create_server(|req: IncomingMessage, mut res: ServerResponse| async move {
//!     let _ = res.end(format!("echo:{}", req.text())).await;
//! });
//! let addr = server.listen(0, "127.0.0.1").await?;
//!
//! let url = format!("http://{addr}/x");
//! let res = fetch(&url, RequestInit::default().method("POST").body("hello")).await?;
//! assert_eq!(res.text().await?, "echo:hello");
//! server.close()?;
//! # Ok(())
//! # }
//! ```

pub mod client;
pub mod client_request;
pub mod conn;
pub mod error;
pub mod httpx;
pub mod net;
pub mod server;
pub mod status;
pub mod tls;

pub use client::{Request, RequestInit, Response, fetch, send};
pub use client_request::{ClientRequest, IncomingMessageForClient, RequestOptions, get, request};
pub use conn::{ConnState, HttpConn, Transport};
pub use error::{HttpError, HttpResult};
pub use httpx::{Headers, Method, Version};
pub use net::Socket;
pub use server::{IncomingMessage, RequestHandler, Server, ServerResponse, create_server, serve_connection};
pub use status::{METHODS, STATUS_CODES, status_text};
