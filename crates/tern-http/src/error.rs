use crate::httpx::ParseError;
use thiserror::Error;

/// Errors from the HTTP client and server.
#[derive(Debug, Error)]
pub enum HttpError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Address parse error: {0}")]
    AddrParse(#[from] std::net::AddrParseError),

    #[error("Invalid URL: {0}")]
    Url(#[from] url::ParseError),

    #[error("Parse error: {0}")]
    Parse(#[from] ParseError),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("TLS error: {0}")]
    Tls(String),

    /// Argument rejected before any I/O, Node's `TypeError`.
    #[error("TypeError: {0}")]
    Type(String),

    #[error("Illegal response")]
    IllegalResponse,

    #[error("Connection closed before the message was complete")]
    ConnectionClosed,

    #[error("Cannot {0} after the response has ended")]
    WriteAfterEnd(&'static str),

    #[error("Server is not running")]
    NotRunning,

    #[error("Server is already listening")]
    AlreadyListening,
}

pub type HttpResult<T> = Result<T, HttpError>;
