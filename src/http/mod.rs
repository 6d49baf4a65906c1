//! HTTP/1.1 client engine
//!
//! This module provides a blocking HTTP/1.1 client with connection reuse.
//!
//! # Architecture
//!
//! The layers, leaf first:
//!
//! - `SessionOps` abstracts over plain TCP and TLS transports; `HttpSession`
//!   adds timeouts and line-buffered reads on top of it
//! - `transfer` and `chunked` frame message bodies (chunked, by-length,
//!   until-closed, HTTP/0.9)
//! - `Connection` owns one transport, performs proxy CONNECT tunneling and the
//!   TLS upgrade, and exposes request/response primitives
//! - `Pool` keeps at most one idle connection per `scheme://host:port`
//! - `Client` drives a full request: keep-alive bookkeeping, one-shot retry on
//!   a stale pooled connection, and redirect following
//!
//! # Examples
//!
//! ```no_run
//! use h1pool::http::{Client, ClientConfig, Request};
//!
//! let client = Client::new(ClientConfig::default());
//!
//! let mut body = Vec::new();
//! let response = client
//!     .request(Request::get("http://example.com/").unwrap().sink(&mut body))
//!     .unwrap();
//! assert_eq!(response.status().code(), 200);
//! ```

pub mod body;
pub mod chunked;
pub mod client;
pub mod config;
pub mod connection;
pub mod global;
pub mod headers;
pub mod message;
pub mod parser;
pub mod pool;
pub mod request;
pub mod session;
pub mod tls;
pub mod transfer;

pub use body::Source;
pub use client::Client;
pub use config::ClientConfig;
pub use connection::{Connection, ConnectionHandle, KeepAlive, Reply};
pub use headers::Headers;
pub use message::{Method, Response, Status, StatusLine, Version};
pub use pool::Pool;
pub use request::{PreparedRequest, Request, Scheme};
pub use session::{HttpSession, SessionOps};
pub use transfer::Framing;

/// Result type for HTTP operations
pub type Result<T> = std::result::Result<T, Error>;

/// HTTP operation errors
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Network error: {0}")]
    Network(#[from] crate::net::Error),

    #[error("TLS error: {0}")]
    Tls(#[from] tls::TlsError),

    #[error("Request body source failed: {0}")]
    Source(#[source] std::io::Error),

    #[error("Response body sink failed: {0}")]
    Sink(#[source] std::io::Error),

    #[error("Proxy refused tunnel: {status} {reason}")]
    ProxyRefused { status: u16, reason: String },

    #[error("Parse error: {0}")]
    Parse(String),

    #[error("Invalid HTTP method: {0}")]
    InvalidMethod(String),

    #[error("Invalid HTTP status: {0}")]
    InvalidStatus(String),

    #[error("Invalid header: {0}")]
    InvalidHeader(String),

    #[error("Invalid chunk size: {0}")]
    InvalidChunkSize(String),

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Timeout")]
    Timeout,

    #[error("Connection closed")]
    ConnectionClosed,

    #[error("Operation would block")]
    WouldBlock,

    #[error("Protocol error: {0}")]
    Protocol(String),
}

/// Broad classification of an `Error`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// DNS, connect, proxy CONNECT or TLS handshake failure
    Establish,
    /// The transport failed mid-exchange
    Transport,
    /// The peer sent something that is not valid HTTP/1.x framing
    Framing,
    /// The request was rejected before any I/O
    InvalidRequest,
    /// The caller's body source or sink failed
    Body,
}

impl Error {
    /// Classify this error
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::Network(_) | Error::Tls(_) | Error::ProxyRefused { .. } => ErrorKind::Establish,
            Error::Io(_) | Error::Timeout | Error::ConnectionClosed | Error::WouldBlock => {
                ErrorKind::Transport
            }
            Error::Parse(_)
            | Error::InvalidStatus(_)
            | Error::InvalidHeader(_)
            | Error::InvalidChunkSize(_)
            | Error::Protocol(_) => ErrorKind::Framing,
            Error::InvalidMethod(_) | Error::InvalidRequest(_) => ErrorKind::InvalidRequest,
            Error::Source(_) | Error::Sink(_) => ErrorKind::Body,
        }
    }

    /// Whether this error means a reused connection was already dead
    pub fn is_stale_connection(&self) -> bool {
        use std::io::ErrorKind as Io;

        match self {
            Error::Timeout | Error::ConnectionClosed | Error::WouldBlock => true,
            Error::Io(e) => matches!(
                e.kind(),
                Io::ConnectionReset
                    | Io::ConnectionAborted
                    | Io::BrokenPipe
                    | Io::UnexpectedEof
                    | Io::TimedOut
                    | Io::WouldBlock
                    | Io::NotConnected
            ),
            _ => false,
        }
    }
}

/// Default HTTP port
pub const DEFAULT_HTTP_PORT: u16 = 80;

/// Default HTTPS port
pub const DEFAULT_HTTPS_PORT: u16 = 443;

/// Default port for proxy URLs that do not name one
pub const DEFAULT_PROXY_PORT: u16 = 3128;

/// CRLF line ending
pub const CRLF: &str = "\r\n";

/// Read block size for body transfers
pub const BLOCK_SIZE: usize = 8192;

#[cfg(test)]
mod tests {
    use super::*;
    use std::io;

    #[test]
    fn test_stale_connection_errors() {
        assert!(Error::Timeout.is_stale_connection());
        assert!(Error::ConnectionClosed.is_stale_connection());
        assert!(Error::Io(io::Error::from(io::ErrorKind::BrokenPipe)).is_stale_connection());
        assert!(Error::Io(io::Error::from(io::ErrorKind::ConnectionReset)).is_stale_connection());

        assert!(!Error::Parse("bad".into()).is_stale_connection());
        assert!(!Error::Io(io::Error::from(io::ErrorKind::PermissionDenied)).is_stale_connection());
        assert!(!Error::Sink(io::Error::from(io::ErrorKind::BrokenPipe)).is_stale_connection());
        assert!(!Error::Source(io::Error::from(io::ErrorKind::ConnectionReset)).is_stale_connection());
    }

    #[test]
    fn test_error_kind() {
        assert_eq!(Error::InvalidChunkSize("zz".into()).kind(), ErrorKind::Framing);
        assert_eq!(Error::Timeout.kind(), ErrorKind::Transport);
        assert_eq!(
            Error::ProxyRefused { status: 407, reason: "Proxy Authentication Required".into() }.kind(),
            ErrorKind::Establish
        );
        assert_eq!(Error::InvalidRequest("no host".into()).kind(), ErrorKind::InvalidRequest);
        assert_eq!(Error::Sink(io::Error::from(io::ErrorKind::BrokenPipe)).kind(), ErrorKind::Body);
    }
}
