//! Transfer coding engine
//!
//! Chooses how a message body is delimited on the wire and moves it between
//! the session and a `Source` or sink, one block at a time.

use super::chunked::{ChunkedEncoder, ChunkedReader};
use super::headers::MAX_HEADERS;
use super::parser::parse_content_length;
use super::session::{HttpSession, SessionOps};
use super::{Error, Headers, Result, Source, BLOCK_SIZE};
use std::io::Write;

/// How a received body is delimited
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Framing {
    /// `Transfer-Encoding` other than `identity`
    Chunked,
    /// Exactly this many bytes, from `Content-Length`
    Length(u64),
    /// Everything until the peer closes the connection
    UntilClosed,
}

impl Framing {
    /// Select the framing declared by a set of response headers
    pub fn from_headers(headers: &Headers) -> Result<Self> {
        if let Some(te) = headers.get("transfer-encoding") {
            if !te.trim().eq_ignore_ascii_case("identity") {
                return Ok(Framing::Chunked);
            }
        }

        match headers.get("content-length") {
            Some(cl) => Ok(Framing::Length(parse_content_length(cl)?)),
            None => Ok(Framing::UntilClosed),
        }
    }

    /// Whether the connection is unusable once the body has been read
    pub fn consumes_connection(&self) -> bool {
        matches!(self, Framing::UntilClosed)
    }
}

/// Read header lines up to the blank line, merging them into `headers`
///
/// Names are stored lower-cased and repeated fields are joined with `", "`.
/// A line starting with a space or tab continues the previous field.
pub fn receive_headers<S: SessionOps>(session: &mut HttpSession<S>, headers: &mut Headers) -> Result<()> {
    let mut count = 0;
    let mut last_name: Option<String> = None;

    loop {
        let line = session.read_line()?;
        if line.is_empty() {
            return Ok(());
        }

        log::trace!(target: "h1pool::wire", "< {}", line);

        // Folded lines count too, or one field could grow without bound
        count += 1;
        if count > MAX_HEADERS {
            return Err(Error::Protocol(format!("More than {} header lines", MAX_HEADERS)));
        }

        if line.starts_with(' ') || line.starts_with('\t') {
            let value = last_name
                .as_deref()
                .and_then(|name| headers.value_mut(name))
                .ok_or_else(|| Error::InvalidHeader(format!("Continuation without field: {}", line)))?;
            value.push(' ');
            value.push_str(line.trim());
            continue;
        }

        let (name, value) = Headers::parse_header_line(&line)?;
        headers.append(name.as_str(), value);
        last_name = Some(name);
    }
}

/// Send a request body pulled from `source`
///
/// With a `content-length` header the bytes go out as they are, otherwise
/// they are chunk-encoded and terminated by the zero-size chunk.
pub fn send_body<S: SessionOps>(
    session: &mut HttpSession<S>,
    headers: &Headers,
    source: &mut dyn Source,
) -> Result<u64> {
    let mut sent = 0u64;

    if headers.contains("content-length") {
        while let Some(chunk) = source.next_chunk().map_err(Error::Source)? {
            session.write_all(&chunk)?;
            sent += chunk.len() as u64;
        }
        session.flush()?;
        return Ok(sent);
    }

    let mut encoder = ChunkedEncoder::new(&mut *session);
    while let Some(chunk) = source.next_chunk().map_err(Error::Source)? {
        encoder.write_chunk(&chunk)?;
        sent += chunk.len() as u64;
    }
    encoder.finish()?;

    Ok(sent)
}

/// Receive a response body into `sink` using the framing in `headers`
///
/// Chunked trailers are merged into `headers`. Returns the framing used.
pub fn receive_body<S: SessionOps>(
    session: &mut HttpSession<S>,
    headers: &mut Headers,
    sink: &mut dyn Write,
) -> Result<Framing> {
    let framing = Framing::from_headers(headers)?;

    match framing {
        Framing::Chunked => {
            let mut reader = ChunkedReader::new();
            while let Some(chunk) = reader.next_chunk(session, headers)? {
                sink.write_all(&chunk).map_err(Error::Sink)?;
            }
        }
        Framing::Length(len) => receive_length(session, len, sink)?,
        Framing::UntilClosed => receive_until_closed(session, &[], sink)?,
    }

    sink.flush().map_err(Error::Sink)?;
    Ok(framing)
}

/// Receive exactly `len` body bytes
pub fn receive_length<S: SessionOps>(session: &mut HttpSession<S>, len: u64, sink: &mut dyn Write) -> Result<()> {
    let mut remaining = len;
    while remaining > 0 {
        let n = remaining.min(BLOCK_SIZE as u64) as usize;
        match session.read_some(n)? {
            Some(data) => {
                sink.write_all(&data).map_err(Error::Sink)?;
                remaining -= data.len() as u64;
            }
            None => return Err(Error::ConnectionClosed),
        }
    }
    Ok(())
}

/// Receive body bytes until the peer closes, after replaying `prefix`
///
/// `prefix` carries bytes already consumed from the stream, such as the
/// first five bytes of a reply that turned out to have no status line.
pub fn receive_until_closed<S: SessionOps>(
    session: &mut HttpSession<S>,
    prefix: &[u8],
    sink: &mut dyn Write,
) -> Result<()> {
    if !prefix.is_empty() {
        sink.write_all(prefix).map_err(Error::Sink)?;
    }

    while let Some(data) = session.read_some(BLOCK_SIZE)? {
        sink.write_all(&data).map_err(Error::Sink)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::http::body::{once, IterSource};
    use crate::http::chunked::decode_chunked_body;
    use crate::http::session::MemorySession;

    fn session(input: &[u8]) -> HttpSession<MemorySession> {
        HttpSession::new(MemorySession::new(input))
    }

    fn headers(fields: &[(&str, &str)]) -> Headers {
        fields.iter().copied().collect()
    }

    #[test]
    fn test_framing_selection() {
        assert_eq!(
            Framing::from_headers(&headers(&[("transfer-encoding", "chunked"), ("content-length", "5")])).unwrap(),
            Framing::Chunked
        );
        assert_eq!(
            Framing::from_headers(&headers(&[("transfer-encoding", "identity"), ("content-length", "5")])).unwrap(),
            Framing::Length(5)
        );
        assert_eq!(Framing::from_headers(&Headers::new()).unwrap(), Framing::UntilClosed);
        assert!(Framing::from_headers(&headers(&[("content-length", "lots")])).is_err());
    }

    #[test]
    fn test_receive_headers_merges_and_folds() {
        let mut s = session(b"Server: test\r\nVia: a\r\nvia: b\r\nX-Long: one\r\nvia: c\r\nx-long: more\r\n  two\r\n\r\nbody");
        let mut h = Headers::new();
        receive_headers(&mut s, &mut h).unwrap();

        assert_eq!(h.get("server"), Some("test"));
        assert_eq!(h.get("via"), Some("a, b, c"));
        assert_eq!(h.get("x-long"), Some("one, more two"));
        assert_eq!(s.buffered(), 4);
    }

    #[test]
    fn test_receive_headers_limits_folded_lines() {
        let mut input = b"X-A: a\r\n".to_vec();
        for _ in 0..MAX_HEADERS {
            input.extend_from_slice(b" more\r\n");
        }
        input.extend_from_slice(b"\r\n");

        let result = receive_headers(&mut session(&input), &mut Headers::new());
        assert!(matches!(result, Err(Error::Protocol(_))));

        let mut input = b"X-A: a\r\n".to_vec();
        for _ in 1..MAX_HEADERS {
            input.extend_from_slice(b" more\r\n");
        }
        input.extend_from_slice(b"\r\n");
        let mut h = Headers::new();
        receive_headers(&mut session(&input), &mut h).unwrap();
        assert!(h.get("x-a").unwrap().starts_with("a more more"));
    }

    #[test]
    fn test_chunked_trailers_limit_folded_lines() {
        let mut input = b"1\r\nx\r\n0\r\nX-Sum: 1\r\n".to_vec();
        for _ in 0..MAX_HEADERS {
            input.extend_from_slice(b"\t2\r\n");
        }
        input.extend_from_slice(b"\r\n");

        let mut h = headers(&[("transfer-encoding", "chunked")]);
        let result = receive_body(&mut session(&input), &mut h, &mut Vec::new());
        assert!(matches!(result, Err(Error::Protocol(_))));
    }

    #[test]
    fn test_duplicate_content_length() {
        let mut s = session(b"HelloWorld");
        let mut h = Headers::new();
        h.append("content-length", "5");
        h.append("content-length", "5");
        let mut body = Vec::new();

        assert_eq!(receive_body(&mut s, &mut h, &mut body).unwrap(), Framing::Length(5));
        assert_eq!(body, b"Hello");

        let mut h = Headers::new();
        h.append("content-length", "5");
        h.append("content-length", "6");
        assert!(matches!(Framing::from_headers(&h), Err(Error::Parse(_))));
    }

    struct BrokenSink;

    impl Write for BrokenSink {
        fn write(&mut self, _: &[u8]) -> std::io::Result<usize> {
            Err(std::io::Error::from(std::io::ErrorKind::BrokenPipe))
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn test_sink_failure_is_not_a_transport_error() {
        let mut h = headers(&[("content-length", "5")]);
        let err = receive_body(&mut session(b"Hello"), &mut h, &mut BrokenSink).unwrap_err();

        assert!(matches!(err, Error::Sink(_)), "{:?}", err);
        assert!(!err.is_stale_connection());
    }

    #[test]
    fn test_receive_headers_requires_colon() {
        let mut s = session(b"Server test\r\n\r\n");
        let result = receive_headers(&mut s, &mut Headers::new());
        assert!(matches!(result, Err(Error::InvalidHeader(_))));
    }

    #[test]
    fn test_receive_by_length_leaves_next_message() {
        let mut s = session(b"HelloHTTP/1.1");
        let mut h = headers(&[("content-length", "5")]);
        let mut body = Vec::new();

        assert_eq!(receive_body(&mut s, &mut h, &mut body).unwrap(), Framing::Length(5));
        assert_eq!(body, b"Hello");
        assert_eq!(s.buffered(), 8);
    }

    #[test]
    fn test_receive_by_length_short() {
        let mut s = session(b"Hel");
        let mut h = headers(&[("content-length", "5")]);
        let result = receive_body(&mut s, &mut h, &mut Vec::new());
        assert!(matches!(result, Err(Error::ConnectionClosed)));
    }

    #[test]
    fn test_receive_chunked_merges_trailers() {
        let mut s = session(b"3\r\nabc\r\n0\r\nX-Sum: 1\r\n\r\n");
        let mut h = headers(&[("transfer-encoding", "chunked"), ("x-sum", "0")]);
        let mut body = Vec::new();

        receive_body(&mut s, &mut h, &mut body).unwrap();
        assert_eq!(body, b"abc");
        assert_eq!(h.get("x-sum"), Some("0, 1"));
    }

    #[test]
    fn test_receive_until_closed_with_prefix() {
        let mut s = session(b"lo world");
        let mut body = Vec::new();
        receive_until_closed(&mut s, b"hel", &mut body).unwrap();
        assert_eq!(body, b"hello world");
    }

    #[test]
    fn test_send_body_with_length() {
        let mut s = session(b"");
        let h = headers(&[("content-length", "5")]);
        let sent = send_body(&mut s, &h, &mut once("hello")).unwrap();

        assert_eq!(sent, 5);
        assert_eq!(s.get_ref().output(), b"hello");
    }

    #[test]
    fn test_send_body_chunked_round_trip() {
        let mut s = session(b"");
        let mut source = IterSource(vec!["ab", "", "cde"].into_iter());
        send_body(&mut s, &Headers::new(), &mut source).unwrap();

        assert_eq!(s.get_ref().output(), b"2\r\nab\r\n3\r\ncde\r\n0\r\n\r\n");
        let (body, _) = decode_chunked_body(s.get_ref().output()).unwrap();
        assert_eq!(body, b"abcde");
    }

    #[test]
    fn test_send_empty_chunked_body() {
        let mut s = session(b"");
        send_body(&mut s, &Headers::new(), &mut IterSource(std::iter::empty::<&'static str>())).unwrap();
        assert_eq!(s.get_ref().output(), b"0\r\n\r\n");
    }
}
