//! Request body sources
//!
//! A `Source` is pulled one chunk at a time while the request body is sent,
//! so a body never has to be held in memory as a whole. Response bodies go
//! the other way, pushed into any `std::io::Write` sink.

use super::BLOCK_SIZE;
use bytes::Bytes;
use std::io::{self, Read};

/// Pull-based producer of request body chunks
pub trait Source {
    /// Produce the next chunk, or `None` once the body is exhausted
    ///
    /// Empty chunks are allowed and skipped by the sender.
    fn next_chunk(&mut self) -> io::Result<Option<Bytes>>;
}

impl<S: Source + ?Sized> Source for Box<S> {
    fn next_chunk(&mut self) -> io::Result<Option<Bytes>> {
        (**self).next_chunk()
    }
}

impl Source for Option<Bytes> {
    fn next_chunk(&mut self) -> io::Result<Option<Bytes>> {
        Ok(self.take())
    }
}

/// Source reading blocks from any `Read`
pub struct ReaderSource<R> {
    reader: R,
    block: usize,
}

impl<R: Read> ReaderSource<R> {
    pub fn new(reader: R) -> Self {
        Self::with_block_size(reader, BLOCK_SIZE)
    }

    pub fn with_block_size(reader: R, block: usize) -> Self {
        ReaderSource {
            reader,
            block: block.max(1),
        }
    }
}

impl<R: Read> Source for ReaderSource<R> {
    fn next_chunk(&mut self) -> io::Result<Option<Bytes>> {
        let mut buf = vec![0u8; self.block];
        loop {
            match self.reader.read(&mut buf) {
                Ok(0) => return Ok(None),
                Ok(n) => {
                    buf.truncate(n);
                    return Ok(Some(Bytes::from(buf)));
                }
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(e),
            }
        }
    }
}

/// Source yielding the items of an iterator
pub struct IterSource<I>(pub I);

impl<I> Source for IterSource<I>
where
    I: Iterator,
    I::Item: Into<Bytes>,
{
    fn next_chunk(&mut self) -> io::Result<Option<Bytes>> {
        Ok(self.0.next().map(Into::into))
    }
}

/// One-shot source over an in-memory body
pub fn once(body: impl Into<Bytes>) -> Option<Bytes> {
    Some(body.into())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn drain(source: &mut dyn Source) -> Vec<Bytes> {
        let mut chunks = Vec::new();
        while let Some(chunk) = source.next_chunk().unwrap() {
            chunks.push(chunk);
        }
        chunks
    }

    #[test]
    fn test_once() {
        let mut source = once("hello");
        assert_eq!(drain(&mut source), vec![Bytes::from("hello")]);
        assert!(source.next_chunk().unwrap().is_none());
    }

    #[test]
    fn test_reader_source_blocks() {
        let mut source = ReaderSource::with_block_size(&b"abcdefg"[..], 3);
        let chunks = drain(&mut source);
        assert_eq!(chunks, vec![Bytes::from("abc"), Bytes::from("def"), Bytes::from("g")]);
    }

    #[test]
    fn test_iter_source() {
        let mut source = IterSource(vec!["a", "", "bc"].into_iter());
        let chunks = drain(&mut source);
        assert_eq!(chunks.len(), 3);
        assert_eq!(chunks[2], Bytes::from("bc"));
    }
}
