//! TLS session operations
//!
//! This module implements the SessionOps trait for TLS connections,
//! enabling transparent switching between plain TCP and TLS I/O.

use super::config::{TlsConfig, TlsError};
use crate::http::session::{io_error, poll_fd, PollEvents, SessionOps};
use crate::http::{Error, Result as HttpResult};
use openssl::ssl::{Ssl, SslStream};
use std::io::{self, Read, Write};
use std::net::{IpAddr, Shutdown, TcpStream};
use std::os::fd::AsRawFd;
use std::time::Duration;

/// TLS session operations
///
/// Wraps an OpenSSL `SslStream` over a connected socket. Once a read or
/// write has failed the stream is marked failed and `close` skips the TLS
/// close-notify.
pub struct TlsSessionOps {
    stream: SslStream<TcpStream>,
    failed: bool,
}

impl TlsSessionOps {
    /// Perform the client handshake over `tcp_stream`
    ///
    /// `servername` is sent as SNI and, when the configuration verifies
    /// peers, checked against the certificate. On failure the socket is
    /// dropped with the handshake state.
    pub fn connect(tcp_stream: TcpStream, config: &TlsConfig, servername: &str) -> Result<Self, TlsError> {
        let mut ssl = Ssl::new(&config.ctx)?;

        let host = servername.trim_start_matches('[').trim_end_matches(']');
        match host.parse::<IpAddr>() {
            Ok(ip) => {
                if config.verify_peer {
                    ssl.param_mut().set_ip(ip)?;
                }
            }
            Err(_) => {
                ssl.set_hostname(host)?;
                if config.verify_peer {
                    ssl.param_mut().set_host(host)?;
                }
            }
        }

        let stream = ssl
            .connect(tcp_stream)
            .map_err(|e| TlsError::HandshakeFailed(format!("{}: {}", host, e)))?;

        log::debug!(
            "TLS established with {} ({})",
            host,
            stream.ssl().version_str()
        );

        Ok(TlsSessionOps { stream, failed: false })
    }

    /// Check if TLS failed
    pub fn failed(&self) -> bool {
        self.failed
    }

    /// Negotiated protocol version, e.g. `TLSv1.3`
    pub fn version(&self) -> &'static str {
        self.stream.ssl().version_str()
    }

    fn fail(&mut self, e: io::Error) -> Error {
        self.failed = true;
        io_error(e)
    }
}

impl SessionOps for TlsSessionOps {
    fn poll(&self, events: PollEvents, timeout: Option<Duration>) -> HttpResult<bool> {
        // Decrypted bytes already held by OpenSSL never show up on the fd
        if events == PollEvents::Read && self.stream.ssl().pending() > 0 {
            return Ok(true);
        }

        poll_fd(self.stream.get_ref().as_raw_fd(), events, timeout)
    }

    fn read(&mut self, buf: &mut [u8]) -> HttpResult<usize> {
        match self.stream.read(buf) {
            Ok(n) => Ok(n),
            Err(e) => Err(self.fail(e)),
        }
    }

    fn write(&mut self, buf: &[u8]) -> HttpResult<usize> {
        match self.stream.write(buf) {
            Ok(n) => Ok(n),
            Err(e) => Err(self.fail(e)),
        }
    }

    fn flush(&mut self) -> HttpResult<()> {
        match self.stream.flush() {
            Ok(()) => Ok(()),
            Err(e) => Err(self.fail(e)),
        }
    }

    fn close(&mut self) -> HttpResult<()> {
        if !self.failed {
            let _ = self.stream.shutdown();
        }

        match self.stream.get_mut().shutdown(Shutdown::Both) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == io::ErrorKind::NotConnected => Ok(()),
            Err(e) => Err(Error::Io(e)),
        }
    }
}
