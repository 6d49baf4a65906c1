//! Chunked transfer encoding support
//!
//! This module provides encoding and decoding for HTTP chunked transfer encoding.

use super::session::{HttpSession, MemorySession, SessionOps};
use super::{transfer, Error, Headers, Result, BLOCK_SIZE, CRLF};
use bytes::Bytes;
use std::io::Write;

/// Chunked encoder
///
/// Encodes data in HTTP chunked transfer encoding format
pub struct ChunkedEncoder<W: Write> {
    writer: W,
}

impl<W: Write> ChunkedEncoder<W> {
    /// Create a new chunked encoder
    pub fn new(writer: W) -> Self {
        ChunkedEncoder { writer }
    }

    /// Write a chunk of data
    ///
    /// An empty chunk would read as the terminator, so it is skipped.
    pub fn write_chunk(&mut self, data: &[u8]) -> Result<()> {
        if data.is_empty() {
            return Ok(());
        }

        write!(self.writer, "{:x}{}", data.len(), CRLF)?;
        self.writer.write_all(data)?;
        self.writer.write_all(CRLF.as_bytes())?;

        Ok(())
    }

    /// Write the final chunk (0-sized chunk) with an empty trailer
    pub fn finish(&mut self) -> Result<()> {
        write!(self.writer, "0{}{}", CRLF, CRLF)?;
        self.writer.flush()?;
        Ok(())
    }

    /// Consume the encoder and return the underlying writer
    pub fn into_inner(self) -> W {
        self.writer
    }
}

/// Parse a chunk-size line: hex digits, optionally followed by `;extension`
pub fn parse_chunk_size(line: &str) -> Result<u64> {
    let size = line.split(';').next().unwrap_or_default().trim();

    if size.is_empty() {
        return Err(Error::InvalidChunkSize(line.to_string()));
    }

    u64::from_str_radix(size, 16).map_err(|_| Error::InvalidChunkSize(line.to_string()))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ReaderState {
    Size,
    Data(u64),
    Done,
}

/// Chunked decoder pulling from a session
///
/// Each call to `next_chunk` yields at most `BLOCK_SIZE` bytes, so a large
/// chunk is delivered in pieces and never buffered whole.
#[derive(Debug)]
pub struct ChunkedReader {
    state: ReaderState,
}

impl ChunkedReader {
    /// Create a new chunked decoder
    pub fn new() -> Self {
        ChunkedReader {
            state: ReaderState::Size,
        }
    }

    /// Decode the next piece of body data
    ///
    /// Trailer fields after the last chunk are merged into `trailers`.
    /// Returns `None` once the zero-size chunk and trailer have been read.
    pub fn next_chunk<S: SessionOps>(
        &mut self,
        session: &mut HttpSession<S>,
        trailers: &mut Headers,
    ) -> Result<Option<Bytes>> {
        loop {
            match self.state {
                ReaderState::Size => {
                    let line = session.read_line()?;
                    match parse_chunk_size(&line)? {
                        0 => {
                            transfer::receive_headers(session, trailers)?;
                            self.state = ReaderState::Done;
                        }
                        size => self.state = ReaderState::Data(size),
                    }
                }

                ReaderState::Data(remaining) => {
                    let n = remaining.min(BLOCK_SIZE as u64);
                    let data = session.read_exact(n as usize)?;

                    if remaining == n {
                        // CRLF after the chunk data
                        session.read_line()?;
                        self.state = ReaderState::Size;
                    } else {
                        self.state = ReaderState::Data(remaining - n);
                    }
                    return Ok(Some(data));
                }

                ReaderState::Done => return Ok(None),
            }
        }
    }

    /// Check if decoding is complete
    pub fn is_complete(&self) -> bool {
        self.state == ReaderState::Done
    }
}

impl Default for ChunkedReader {
    fn default() -> Self {
        Self::new()
    }
}

/// Decode a complete chunked body held in memory
///
/// Returns the body and any trailer fields.
pub fn decode_chunked_body(input: &[u8]) -> Result<(Vec<u8>, Headers)> {
    let mut session = HttpSession::new(MemorySession::new(input));
    let mut reader = ChunkedReader::new();
    let mut trailers = Headers::new();
    let mut output = Vec::with_capacity(input.len());

    while let Some(chunk) = reader.next_chunk(&mut session, &mut trailers)? {
        output.extend_from_slice(&chunk);
    }

    Ok((output, trailers))
}

/// Encode a sequence of chunks as a chunked body
pub fn encode_chunked_body<'a, I>(chunks: I) -> Result<Vec<u8>>
where
    I: IntoIterator<Item = &'a [u8]>,
{
    let mut encoder = ChunkedEncoder::new(Vec::new());

    for chunk in chunks {
        encoder.write_chunk(chunk)?;
    }
    encoder.finish()?;

    Ok(encoder.into_inner())
}
