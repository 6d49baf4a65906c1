//! Connections
//!
//! A `Connection` owns one transport to an origin server or proxy. It is
//! established directly or through an HTTP proxy, tunnelled with `CONNECT`
//! and upgraded to TLS in place for https origins, and then offers the
//! request/response primitives the client drives.

use super::body::Source;
use super::config::ClientConfig;
use super::parser::parse_status_line;
use super::pool::Pool;
use super::request::{PreparedRequest, Scheme};
use super::session::{FdSessionOps, HttpSession, PollEvents, SessionOps};
use super::tls::{TlsConfig, TlsSessionOps};
use super::transfer::{self, Framing};
use super::{Error, Headers, Result, StatusLine, CRLF};
use crate::net;
use bytes::Bytes;
use std::io::Write;
use std::mem;
use std::net::TcpStream;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

pub use super::parser::KeepAlive;

static NEXT_ID: AtomicU64 = AtomicU64::new(1);

/// The transport under a connection, plain until upgraded
pub enum Transport {
    Plain(FdSessionOps),
    Tls(TlsSessionOps),
    /// No socket: handed to the TLS handshake, or closed
    Detached,
}

impl SessionOps for Transport {
    fn poll(&self, events: PollEvents, timeout: Option<Duration>) -> Result<bool> {
        match self {
            Transport::Plain(s) => s.poll(events, timeout),
            Transport::Tls(s) => s.poll(events, timeout),
            Transport::Detached => Err(Error::ConnectionClosed),
        }
    }

    fn read(&mut self, buf: &mut [u8]) -> Result<usize> {
        match self {
            Transport::Plain(s) => s.read(buf),
            Transport::Tls(s) => s.read(buf),
            Transport::Detached => Err(Error::ConnectionClosed),
        }
    }

    fn write(&mut self, buf: &[u8]) -> Result<usize> {
        match self {
            Transport::Plain(s) => s.write(buf),
            Transport::Tls(s) => s.write(buf),
            Transport::Detached => Err(Error::ConnectionClosed),
        }
    }

    fn flush(&mut self) -> Result<()> {
        match self {
            Transport::Plain(s) => s.flush(),
            Transport::Tls(s) => s.flush(),
            Transport::Detached => Ok(()),
        }
    }

    fn close(&mut self) -> Result<()> {
        match self {
            Transport::Plain(s) => s.close(),
            Transport::Tls(s) => s.close(),
            Transport::Detached => Ok(()),
        }
    }
}

/// First thing read from a response
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reply {
    /// A parsed status line
    Status(StatusLine),
    /// No status line: an HTTP/0.9 reply whose first bytes are these
    Http09(Bytes),
}

/// One client connection
pub struct Connection {
    id: u64,
    key: String,
    session: HttpSession<Transport>,
    requests: u32,
    keep_alive: KeepAlive,
    closed: bool,
}

impl Connection {
    /// Wrap an already connected socket
    pub fn from_stream(key: impl Into<String>, stream: TcpStream, timeout: Duration) -> Self {
        let mut session = HttpSession::new(Transport::Plain(FdSessionOps::new(stream)));
        session.set_timeout(Some(timeout));

        Connection {
            id: NEXT_ID.fetch_add(1, Ordering::Relaxed),
            key: key.into(),
            session,
            requests: 0,
            keep_alive: KeepAlive::default(),
            closed: false,
        }
    }

    /// Establish a connection for `request`
    ///
    /// Connects to the proxy when one is configured, otherwise to the target.
    /// An https target is tunnelled with `CONNECT` through the proxy and then
    /// wrapped in TLS with the target host as SNI. On any failure the socket
    /// is closed before the error is returned.
    pub fn establish(request: &PreparedRequest, config: &ClientConfig) -> Result<Self> {
        let timeout = config.get_timeout();
        let (host, port) = request
            .proxy_addr()
            .unwrap_or_else(|| (request.host.clone(), request.port));

        let stream = net::connect_tcp(&host, port, timeout)?;
        // Bounds the TLS handshake, which runs outside the poll loop
        stream.set_read_timeout(Some(timeout))?;
        stream.set_write_timeout(Some(timeout))?;

        let mut conn = Connection::from_stream(request.address_key(), stream, timeout);
        log::debug!("connection {} opened to {}:{} for {}", conn.id, host, port, conn.key);

        if let Err(e) = conn.secure(request, config) {
            log::debug!("connection {} failed to establish: {}", conn.id, e);
            let _ = conn.close();
            return Err(e);
        }

        Ok(conn)
    }

    fn secure(&mut self, request: &PreparedRequest, config: &ClientConfig) -> Result<()> {
        if request.scheme != Scheme::Https {
            return Ok(());
        }

        if request.proxy.is_some() {
            self.tunnel(request, config.get_user_agent())?;
        }

        let tls = match request.tls {
            Some(ref tls) => tls.clone(),
            None => config.tls_config()?,
        };
        self.start_tls(&tls, &request.host)
    }

    /// Open a `CONNECT` tunnel to the request's authority
    fn tunnel(&mut self, request: &PreparedRequest, user_agent: &str) -> Result<()> {
        let authority = request.authority();

        let mut headers = Headers::new();
        headers.set("host", authority.as_str());
        headers.set("proxy-connection", "keep-alive");
        headers.set("user-agent", user_agent);
        if let Some(credentials) = request.proxy_credentials() {
            headers.set("proxy-authorization", credentials);
        }

        self.send_request_line("CONNECT", &authority)?;
        self.send_headers(&headers)?;

        let line = self.session.read_line()?;
        log::trace!(target: "h1pool::wire", "< {}", line);
        let status = parse_status_line(&line)?;

        if status.status.code() != 200 {
            return Err(Error::ProxyRefused {
                status: status.status.code(),
                reason: status.reason,
            });
        }

        transfer::receive_headers(&mut self.session, &mut Headers::new())?;

        if self.session.buffered() > 0 {
            return Err(Error::Protocol("Proxy sent data before the tunnel was used".to_string()));
        }

        log::debug!("connection {} tunnelled to {}", self.id, authority);
        Ok(())
    }

    /// Replace the plain transport with a TLS session over the same socket
    fn start_tls(&mut self, tls: &TlsConfig, servername: &str) -> Result<()> {
        let stream = match mem::replace(self.session.get_mut(), Transport::Detached) {
            Transport::Plain(ops) => ops.into_stream(),
            other => {
                *self.session.get_mut() = other;
                return Err(Error::Protocol("TLS requested on a non-plain transport".to_string()));
            }
        };

        // On failure the socket is dropped, and so closed, with the handshake
        let ops = TlsSessionOps::connect(stream, tls, servername)?;
        log::debug!("connection {} negotiated {} with {}", self.id, ops.version(), servername);
        *self.session.get_mut() = Transport::Tls(ops);
        Ok(())
    }

    /// Write `METHOD target HTTP/1.1`
    pub fn send_request_line(&mut self, method: &str, target: &str) -> Result<()> {
        let line = format!("{} {} HTTP/1.1", method, target);
        log::trace!(target: "h1pool::wire", "> {}", line);
        self.session.write_all(line.as_bytes())?;
        self.session.write_all(CRLF.as_bytes())
    }

    /// Write the header block and its terminating blank line
    pub fn send_headers(&mut self, headers: &Headers) -> Result<()> {
        if log::log_enabled!(target: "h1pool::wire", log::Level::Trace) {
            for line in headers.to_string().lines() {
                log::trace!(target: "h1pool::wire", "> {}", line);
            }
        }
        self.session.write_all(&headers.to_wire())?;
        self.session.flush()
    }

    /// Send a request body, raw with `content-length` or chunked without
    pub fn send_body(&mut self, headers: &Headers, source: &mut dyn Source) -> Result<u64> {
        transfer::send_body(&mut self.session, headers, source)
    }

    /// Read the status line, or detect a reply that has none
    ///
    /// Exactly five bytes are read first. Unless they are `HTTP/` the reply
    /// is HTTP/0.9 and those bytes start its body.
    pub fn receive_status_line(&mut self) -> Result<Reply> {
        let prefix = match self.session.read_exact(5) {
            Ok(prefix) => prefix,
            // A reply shorter than a status line prefix
            Err(Error::ConnectionClosed) if self.session.buffered() > 0 => {
                let rest = self.session.read_some(5)?.unwrap_or_default();
                return Ok(Reply::Http09(rest));
            }
            Err(e) => return Err(e),
        };

        if &prefix[..] != b"HTTP/" {
            log::trace!(target: "h1pool::wire", "< (no status line)");
            return Ok(Reply::Http09(prefix));
        }

        let rest = self.session.read_line()?;
        let line = format!("HTTP/{}", rest);
        log::trace!(target: "h1pool::wire", "< {}", line);
        parse_status_line(&line).map(Reply::Status)
    }

    /// Read header lines into `headers`
    pub fn receive_headers(&mut self, headers: &mut Headers) -> Result<()> {
        transfer::receive_headers(&mut self.session, headers)
    }

    /// Stream a response body to `sink` using the framing in `headers`
    pub fn receive_body(&mut self, headers: &mut Headers, sink: &mut dyn Write) -> Result<Framing> {
        transfer::receive_body(&mut self.session, headers, sink)
    }

    /// Stream the rest of an HTTP/0.9 reply, starting with `prefix`
    pub fn receive_09_body(&mut self, prefix: &[u8], sink: &mut dyn Write) -> Result<()> {
        transfer::receive_until_closed(&mut self.session, prefix, sink)?;
        sink.flush().map_err(Error::Sink)?;
        Ok(())
    }

    /// Close the socket; further calls do nothing
    pub fn close(&mut self) -> Result<()> {
        if self.closed {
            return Ok(());
        }
        self.closed = true;
        log::debug!("connection {} closed after {} requests", self.id, self.requests);
        let result = self.session.close();
        *self.session.get_mut() = Transport::Detached;
        result
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }

    /// Process-unique identifier
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Pool slot this connection belongs to
    pub fn key(&self) -> &str {
        &self.key
    }

    /// Number of completed exchanges
    pub fn requests(&self) -> u32 {
        self.requests
    }

    /// Keep-alive parameters the server advertised
    pub fn keep_alive(&self) -> KeepAlive {
        self.keep_alive
    }

    pub fn is_tls(&self) -> bool {
        matches!(self.session.get_ref(), Transport::Tls(_))
    }

    /// Change the bound on each blocking operation
    pub fn set_timeout(&mut self, timeout: Duration) {
        self.session.set_timeout(Some(timeout));
    }

    pub(crate) fn count_request(&mut self) -> u32 {
        self.requests += 1;
        self.requests
    }

    pub(crate) fn set_keep_alive(&mut self, keep_alive: KeepAlive) {
        self.keep_alive = keep_alive;
    }
}

impl std::fmt::Debug for Connection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Connection")
            .field("id", &self.id)
            .field("key", &self.key)
            .field("requests", &self.requests)
            .field("keep_alive", &self.keep_alive)
            .field("tls", &self.is_tls())
            .field("closed", &self.closed)
            .finish()
    }
}

/// Lock a shared connection, recovering it from a panicked holder
pub(crate) fn lock(conn: &Mutex<Connection>) -> MutexGuard<'_, Connection> {
    conn.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// A pooled connection handed out for direct use
///
/// Lock it to drive the request/response primitives. The connection stays
/// pooled until `close` is called.
pub struct ConnectionHandle {
    pool: Arc<Pool>,
    conn: Arc<Mutex<Connection>>,
    request: PreparedRequest,
}

impl ConnectionHandle {
    pub(crate) fn new(pool: Arc<Pool>, conn: Arc<Mutex<Connection>>, request: PreparedRequest) -> Self {
        ConnectionHandle { pool, conn, request }
    }

    /// The normalized request this connection was acquired for
    pub fn request(&self) -> &PreparedRequest {
        &self.request
    }

    /// Exclusive access to the connection
    pub fn lock(&self) -> MutexGuard<'_, Connection> {
        lock(&self.conn)
    }

    /// Remove the connection from the pool and close it
    pub fn close(&self) -> Result<()> {
        self.pool.evict(&self.conn);
        self.lock().close()
    }
}
