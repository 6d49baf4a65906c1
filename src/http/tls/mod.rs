//! OpenSSL client side of https connections
//!
//! `TlsConfig` is a cloneable client context built once and shared by every
//! connection that uses it. `TlsSessionOps` runs the handshake over an
//! established socket and then stands in for the plain transport, so
//! framing and pooling code is the same for http and https.
//!
//! Server names double as the SNI value and, with peer verification on, as
//! the name checked against the certificate. IP literals are checked as
//! addresses instead.
//!
//! # Example
//!
//! ```no_run
//! use h1pool::http::tls::{TlsConfig, TlsVersion};
//! use std::net::TcpStream;
//!
//! let config = TlsConfig::client()
//!     .version_range(TlsVersion::Tls12, TlsVersion::Tls13)
//!     .verify_peer(true)
//!     .build()
//!     .unwrap();
//!
//! let socket = TcpStream::connect("example.com:443").unwrap();
//! let session = config.connect(socket, "example.com").unwrap();
//! println!("negotiated {}", session.version());
//! ```

pub mod config;
pub mod session;

pub use config::{ClientConfigBuilder, TlsConfig, TlsError, TlsVersion};
pub use session::TlsSessionOps;

/// Result type for TLS operations
pub type Result<T> = std::result::Result<T, TlsError>;
