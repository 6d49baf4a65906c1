//! TCP connection establishment
//!
//! Resolves a host name and connects to the first reachable address with a
//! bounded connect timeout.

use socket2::{Domain, Protocol, SockAddr, Socket, Type};
use std::io;
use std::net::{SocketAddr, TcpStream, ToSocketAddrs};
use std::time::Duration;

/// Result type for network operations
pub type Result<T> = std::result::Result<T, Error>;

/// Network errors
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Failed to resolve {host}: {source}")]
    Resolve {
        host: String,
        #[source]
        source: io::Error,
    },

    #[error("No addresses found for {0}")]
    NoAddress(String),

    #[error("Failed to connect to {addr}: {source}")]
    Connect {
        addr: SocketAddr,
        #[source]
        source: io::Error,
    },

    #[error("Connect to {0} timed out")]
    Timeout(SocketAddr),
}

/// Resolve `host:port` into socket addresses
pub fn resolve(host: &str, port: u16) -> Result<Vec<SocketAddr>> {
    // Bracketed IPv6 literals come straight from URLs
    let bare = host.trim_start_matches('[').trim_end_matches(']');
    let addrs: Vec<SocketAddr> = (bare, port)
        .to_socket_addrs()
        .map_err(|source| Error::Resolve {
            host: host.to_string(),
            source,
        })?
        .collect();

    if addrs.is_empty() {
        return Err(Error::NoAddress(host.to_string()));
    }
    Ok(addrs)
}

/// Connect to a single socket address with a timeout
pub fn connect_addr(addr: SocketAddr, timeout: Duration) -> Result<TcpStream> {
    let socket = Socket::new(Domain::for_address(addr), Type::STREAM, Some(Protocol::TCP))
        .map_err(|source| Error::Connect { addr, source })?;

    match socket.connect_timeout(&SockAddr::from(addr), timeout) {
        Ok(()) => {}
        Err(e) if e.kind() == io::ErrorKind::TimedOut || e.kind() == io::ErrorKind::WouldBlock => {
            return Err(Error::Timeout(addr));
        }
        Err(source) => return Err(Error::Connect { addr, source }),
    }

    socket
        .set_nodelay(true)
        .map_err(|source| Error::Connect { addr, source })?;

    Ok(socket.into())
}

/// Resolve `host` and connect to the first address that accepts
///
/// Each candidate address gets the full `timeout`. The error from the last
/// attempted address is returned when all of them fail.
pub fn connect_tcp(host: &str, port: u16, timeout: Duration) -> Result<TcpStream> {
    let mut last_err = None;

    for addr in resolve(host, port)? {
        match connect_addr(addr, timeout) {
            Ok(stream) => {
                log::debug!("connected to {} ({})", host, addr);
                return Ok(stream);
            }
            Err(e) => {
                log::debug!("connect to {} failed: {}", addr, e);
                last_err = Some(e);
            }
        }
    }

    Err(last_err.unwrap_or_else(|| Error::NoAddress(host.to_string())))
}
