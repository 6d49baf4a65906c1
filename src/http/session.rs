//! Session operations abstraction
//!
//! This module provides the session operations pattern that allows
//! transparent switching between plain TCP and TLS connections.
//!
//! `SessionOps` is the raw transport; `HttpSession` wraps one with the
//! per-operation timeout and a read buffer so the protocol code can pull
//! whole lines or exact byte counts off the wire.

use super::{Error, Result, BLOCK_SIZE};
use bytes::{Buf, Bytes, BytesMut};
use std::io::{self, Read, Write};
use std::net::{Shutdown, TcpStream};
use std::os::fd::{AsRawFd, RawFd};
use std::time::Duration;

/// Longest status, header or chunk-size line accepted
pub const MAX_LINE: usize = 64 * 1024;

/// Session operations trait
///
/// This trait defines the operations that can be performed on a session,
/// abstracting over plain TCP and TLS connections.
pub trait SessionOps {
    /// Poll the session for events
    ///
    /// Returns true if the session is ready for the requested operation
    fn poll(&self, events: PollEvents, timeout: Option<Duration>) -> Result<bool>;

    /// Read data from the session
    fn read(&mut self, buf: &mut [u8]) -> Result<usize>;

    /// Write data to the session
    fn write(&mut self, buf: &[u8]) -> Result<usize>;

    /// Flush buffered output
    fn flush(&mut self) -> Result<()> {
        Ok(())
    }

    /// Close the session
    fn close(&mut self) -> Result<()>;
}

/// Poll events
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollEvents {
    Read,
    Write,
}

/// Wait until `fd` is ready, retrying on EINTR
pub(crate) fn poll_fd(fd: RawFd, events: PollEvents, timeout: Option<Duration>) -> Result<bool> {
    use libc::{poll, pollfd, POLLIN, POLLOUT};

    let mut pfd = pollfd {
        fd,
        events: match events {
            PollEvents::Read => POLLIN,
            PollEvents::Write => POLLOUT,
        },
        revents: 0,
    };

    let timeout_ms = timeout
        .map(|d| d.as_millis().min(i32::MAX as u128) as i32)
        .unwrap_or(-1); // -1 = infinite

    loop {
        let result = unsafe { poll(&mut pfd as *mut pollfd, 1, timeout_ms) };

        if result < 0 {
            let err = io::Error::last_os_error();
            if err.kind() == io::ErrorKind::Interrupted {
                continue;
            }
            return Err(Error::Io(err));
        }

        return Ok(result > 0);
    }
}

/// Map transport-level I/O errors onto the engine's error kinds
pub(crate) fn io_error(e: io::Error) -> Error {
    match e.kind() {
        io::ErrorKind::WouldBlock => Error::WouldBlock,
        io::ErrorKind::TimedOut => Error::Timeout,
        _ => Error::Io(e),
    }
}

/// HTTP session wrapping a transport with session operations
pub struct HttpSession<S: SessionOps> {
    session: S,
    timeout: Option<Duration>,
    buffer: BytesMut,
}

impl<S: SessionOps> HttpSession<S> {
    /// Create a new HTTP session
    pub fn new(session: S) -> Self {
        HttpSession {
            session,
            timeout: Some(Duration::from_secs(60)),
            buffer: BytesMut::with_capacity(BLOCK_SIZE),
        }
    }

    /// Set the timeout for operations
    pub fn set_timeout(&mut self, timeout: Option<Duration>) {
        self.timeout = timeout;
    }

    /// Get the timeout
    pub fn timeout(&self) -> Option<Duration> {
        self.timeout
    }

    /// Read data with timeout, bypassing the line buffer
    fn read_raw(&mut self, buf: &mut [u8]) -> Result<usize> {
        if !self.session.poll(PollEvents::Read, self.timeout)? {
            return Err(Error::Timeout);
        }

        self.session.read(buf)
    }

    /// Write data with timeout
    pub fn write(&mut self, buf: &[u8]) -> Result<usize> {
        if !self.session.poll(PollEvents::Write, self.timeout)? {
            return Err(Error::Timeout);
        }

        self.session.write(buf)
    }

    /// Write the whole buffer
    pub fn write_all(&mut self, mut buf: &[u8]) -> Result<()> {
        while !buf.is_empty() {
            let n = self.write(buf)?;
            if n == 0 {
                return Err(Error::ConnectionClosed);
            }
            buf = &buf[n..];
        }
        Ok(())
    }

    /// Flush the transport
    pub fn flush(&mut self) -> Result<()> {
        self.session.flush()
    }

    /// Pull more bytes from the transport into the read buffer
    ///
    /// Returns the number of bytes added; zero means end of stream.
    fn fill(&mut self) -> Result<usize> {
        let mut temp = [0u8; BLOCK_SIZE];
        let n = self.read_raw(&mut temp)?;
        self.buffer.extend_from_slice(&temp[..n]);
        Ok(n)
    }

    /// Read one line, without its `\n` or `\r\n` terminator
    ///
    /// End of stream before the terminator is `Error::ConnectionClosed`.
    pub fn read_line(&mut self) -> Result<String> {
        let mut scanned = 0;
        loop {
            if let Some(pos) = self.buffer[scanned..].iter().position(|&b| b == b'\n') {
                let line = self.buffer.split_to(scanned + pos + 1);
                let mut line = &line[..line.len() - 1];
                if line.last() == Some(&b'\r') {
                    line = &line[..line.len() - 1];
                }
                return Ok(String::from_utf8_lossy(line).into_owned());
            }

            scanned = self.buffer.len();
            if scanned > MAX_LINE {
                return Err(Error::Protocol(format!("Line exceeds {} bytes", MAX_LINE)));
            }
            if self.fill()? == 0 {
                return Err(Error::ConnectionClosed);
            }
        }
    }

    /// Read exactly `n` bytes
    pub fn read_exact(&mut self, n: usize) -> Result<Bytes> {
        while self.buffer.len() < n {
            if self.fill()? == 0 {
                return Err(Error::ConnectionClosed);
            }
        }
        Ok(self.buffer.split_to(n).freeze())
    }

    /// Read whatever is available, up to `max` bytes
    ///
    /// Returns `None` at end of stream.
    pub fn read_some(&mut self, max: usize) -> Result<Option<Bytes>> {
        if self.buffer.is_empty() && self.fill()? == 0 {
            return Ok(None);
        }
        let n = self.buffer.len().min(max);
        Ok(Some(self.buffer.split_to(n).freeze()))
    }

    /// Number of received bytes not consumed yet
    pub fn buffered(&self) -> usize {
        self.buffer.len()
    }

    /// Drop any received bytes not consumed yet
    pub fn discard_buffered(&mut self) {
        self.buffer.advance(self.buffer.len());
    }

    /// Close the session
    pub fn close(&mut self) -> Result<()> {
        self.discard_buffered();
        self.session.close()
    }

    /// Get a reference to the underlying session
    pub fn get_ref(&self) -> &S {
        &self.session
    }

    /// Get a mutable reference to the underlying session
    pub fn get_mut(&mut self) -> &mut S {
        &mut self.session
    }
}

impl<S: SessionOps> Write for HttpSession<S> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        HttpSession::write(self, buf).map_err(into_io)
    }

    fn flush(&mut self) -> io::Result<()> {
        HttpSession::flush(self).map_err(into_io)
    }
}

/// Carry an engine error through an `io::Write` boundary
fn into_io(e: Error) -> io::Error {
    match e {
        Error::Io(e) => e,
        Error::Timeout => io::Error::from(io::ErrorKind::TimedOut),
        Error::WouldBlock => io::Error::from(io::ErrorKind::WouldBlock),
        Error::ConnectionClosed => io::Error::from(io::ErrorKind::BrokenPipe),
        other => io::Error::new(io::ErrorKind::Other, other.to_string()),
    }
}

/// Plain file descriptor session operations
pub struct FdSessionOps {
    stream: TcpStream,
}

impl FdSessionOps {
    /// Create a new FD session operations from a TCP stream
    pub fn new(stream: TcpStream) -> Self {
        FdSessionOps { stream }
    }

    /// Give back the TCP stream, e.g. to wrap it in TLS
    pub fn into_stream(self) -> TcpStream {
        self.stream
    }
}

impl SessionOps for FdSessionOps {
    fn poll(&self, events: PollEvents, timeout: Option<Duration>) -> Result<bool> {
        poll_fd(self.stream.as_raw_fd(), events, timeout)
    }

    fn read(&mut self, buf: &mut [u8]) -> Result<usize> {
        self.stream.read(buf).map_err(io_error)
    }

    fn write(&mut self, buf: &[u8]) -> Result<usize> {
        self.stream.write(buf).map_err(io_error)
    }

    fn close(&mut self) -> Result<()> {
        match self.stream.shutdown(Shutdown::Both) {
            Ok(()) => Ok(()),
            // The peer got there first
            Err(e) if e.kind() == io::ErrorKind::NotConnected => Ok(()),
            Err(e) => Err(Error::Io(e)),
        }
    }
}

/// In-memory session
///
/// Serves a fixed input in reads of at most `read_size` bytes and records
/// everything written. Used for offline decoding and framing tests.
pub struct MemorySession {
    input: io::Cursor<Vec<u8>>,
    output: Vec<u8>,
    read_size: usize,
}

impl MemorySession {
    pub fn new(input: impl Into<Vec<u8>>) -> Self {
        MemorySession {
            input: io::Cursor::new(input.into()),
            output: Vec::new(),
            read_size: usize::MAX,
        }
    }

    /// Serve the input at most `read_size` bytes per read
    pub fn trickle(input: impl Into<Vec<u8>>, read_size: usize) -> Self {
        MemorySession {
            read_size: read_size.max(1),
            ..MemorySession::new(input)
        }
    }

    /// Bytes written so far
    pub fn output(&self) -> &[u8] {
        &self.output
    }
}

impl SessionOps for MemorySession {
    fn poll(&self, _events: PollEvents, _timeout: Option<Duration>) -> Result<bool> {
        Ok(true)
    }

    fn read(&mut self, buf: &mut [u8]) -> Result<usize> {
        let len = buf.len().min(self.read_size);
        self.input.read(&mut buf[..len]).map_err(Error::from)
    }

    fn write(&mut self, buf: &[u8]) -> Result<usize> {
        self.output.extend_from_slice(buf);
        Ok(buf.len())
    }

    fn close(&mut self) -> Result<()> {
        Ok(())
    }
}
