//! h1pool - blocking HTTP/1.1 client engine
//!
//! This crate provides a synchronous HTTP/1.1 client with a keep-alive
//! connection pool, chunked transfer coding, proxy CONNECT tunneling,
//! OpenSSL-backed HTTPS, redirect following and stale-connection retry.

pub mod http;
pub mod net;
