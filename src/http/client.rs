//! HTTP client implementation
//!
//! `Client` drives whole requests over pooled connections: one exchange per
//! attempt, keep-alive bookkeeping afterwards, a single retry when a reused
//! connection turns out to be dead, and redirect following.

use super::body::Source;
use super::config::ClientConfig;
use super::connection::{lock, Connection, ConnectionHandle, KeepAlive, Reply};
use super::pool::Pool;
use super::request::{PreparedRequest, Request, Scheme};
use super::transfer::Framing;
use super::{Error, Headers, Method, Response, Result, Version};
use bytes::Bytes;
use std::io::{self, Write};
use std::sync::Arc;
use url::Url;

/// HTTP client
///
/// Cheap to share between threads; every request borrows a pooled
/// connection for the duration of one exchange.
#[derive(Debug, Default)]
pub struct Client {
    config: ClientConfig,
    pool: Arc<Pool>,
}

/// Result of one exchange on one connection
enum Outcome {
    /// Final response, body already delivered
    Done(Response),
    /// Redirect to follow; the body was not read
    Redirect(Url, Response),
}

/// Byte counter around a source or sink
///
/// Tells the retry logic whether an attempt already moved body bytes.
struct Tally<'s, T: ?Sized> {
    inner: &'s mut T,
    bytes: u64,
}

impl<'s, T: ?Sized> Tally<'s, T> {
    fn new(inner: &'s mut T) -> Self {
        Tally { inner, bytes: 0 }
    }
}

impl<T: Source + ?Sized> Source for Tally<'_, T> {
    fn next_chunk(&mut self) -> io::Result<Option<Bytes>> {
        let chunk = self.inner.next_chunk()?;
        if let Some(ref chunk) = chunk {
            self.bytes += chunk.len() as u64;
        }
        Ok(chunk)
    }
}

impl<T: Write + ?Sized> Write for Tally<'_, T> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let n = self.inner.write(buf)?;
        self.bytes += n as u64;
        Ok(n)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.inner.flush()
    }
}

impl Client {
    pub fn new(config: ClientConfig) -> Self {
        Client {
            config,
            pool: Arc::new(Pool::new()),
        }
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    pub fn pool(&self) -> &Pool {
        &self.pool
    }

    /// Perform a request, following redirects
    ///
    /// The response body is streamed into the request's sink before this
    /// returns. A redirect hop is only taken for GET and HEAD requests
    /// without a body source, and at most `max_redirects` times; past that
    /// the redirect response itself is returned.
    pub fn request(&self, mut request: Request<'_>) -> Result<Response> {
        let mut source = request.take_source();
        let mut sink: Box<dyn Write + '_> = match request.take_sink() {
            Some(sink) => sink,
            None => Box::new(io::sink()),
        };
        let mut location: Option<String> = None;

        loop {
            let prepared = request.prepare(&self.config)?;
            let may_redirect = source.is_none()
                && request.follows_redirects()
                && request.redirects() < self.config.get_max_redirects()
                && request.method().is_redirectable();

            let outcome = self.send(&prepared, request.url(), may_redirect, &mut source, &mut *sink)?;

            match outcome {
                Outcome::Done(mut response) => {
                    response.set_redirects(request.redirects());
                    if let Some(location) = location {
                        if !response.headers().contains("location") {
                            response.headers_mut().set("location", location);
                        }
                    }
                    return Ok(response);
                }
                Outcome::Redirect(url, response) => {
                    log::debug!(
                        "{} redirect {} -> {} (hop {})",
                        response.status().code(),
                        request.url(),
                        url,
                        request.redirects() + 1
                    );
                    location = response.headers().get("location").map(str::to_string);
                    request = request.redirected(url);
                }
            }
        }
    }

    /// GET `url` and read the whole body
    pub fn get(&self, url: &str) -> Result<(Response, Vec<u8>)> {
        let mut body = Vec::new();
        let response = self.request(Request::get(url)?.sink(&mut body))?;
        Ok((response, body))
    }

    /// POST a form-encoded `body` to `url` and read the whole response body
    pub fn post(&self, url: &str, body: impl Into<Bytes>) -> Result<(Response, Vec<u8>)> {
        let mut received = Vec::new();
        let request = Request::post(url)?
            .header("content-type", "application/x-www-form-urlencoded")
            .body(body)
            .sink(&mut received);
        let response = self.request(request)?;
        Ok((response, received))
    }

    /// Acquire the pooled connection for `request` for direct use
    pub fn connection(&self, request: &Request<'_>) -> Result<ConnectionHandle> {
        let prepared = request.prepare(&self.config)?;
        let (conn, _) = self
            .pool
            .acquire(&prepared.address_key(), || Connection::establish(&prepared, &self.config))?;
        Ok(ConnectionHandle::new(Arc::clone(&self.pool), conn, prepared))
    }

    /// Close every pooled connection
    pub fn close_all(&self) {
        self.pool.close_all();
    }

    /// Run one exchange, retrying once on a dead pooled connection
    fn send(
        &self,
        prepared: &PreparedRequest,
        url: &Url,
        may_redirect: bool,
        source: &mut Option<Box<dyn Source + '_>>,
        sink: &mut dyn Write,
    ) -> Result<Outcome> {
        let key = prepared.address_key();
        let mut retried = false;

        loop {
            let (shared, reused) = self
                .pool
                .acquire(&key, || Connection::establish(prepared, &self.config))?;
            let mut conn = lock(&shared);

            // Closed by another request while this one waited for the lock
            if conn.is_closed() {
                drop(conn);
                self.pool.evict(&shared);
                continue;
            }

            if reused {
                log::debug!("reusing connection {} for {}", conn.id(), key);
            }
            let served = conn.requests();

            let mut sent = source.as_deref_mut().map(Tally::new);
            let mut received = Tally::new(&mut *sink);

            let result = exchange(
                &mut conn,
                prepared,
                url,
                may_redirect,
                sent.as_mut().map(|s| s as &mut dyn Source),
                &mut received,
            );

            let (outcome, keep) = match result {
                Ok(done) => done,
                Err(e) => {
                    let _ = conn.close();
                    drop(conn);
                    self.pool.evict(&shared);

                    let untouched = received.bytes == 0 && sent.as_ref().map_or(true, |s| s.bytes == 0);
                    if !retried && served > 0 && untouched && e.is_stale_connection() {
                        log::debug!("stale connection for {} ({}), retrying", key, e);
                        retried = true;
                        continue;
                    }
                    return Err(e);
                }
            };

            if !keep {
                let _ = conn.close();
                drop(conn);
                self.pool.evict(&shared);
            }

            return Ok(outcome);
        }
    }
}

/// One request/response exchange
///
/// Returns the outcome and whether the connection may stay pooled.
fn exchange(
    conn: &mut Connection,
    prepared: &PreparedRequest,
    url: &Url,
    may_redirect: bool,
    source: Option<&mut dyn Source>,
    sink: &mut dyn Write,
) -> Result<(Outcome, bool)> {
    conn.send_request_line(prepared.method.as_str(), &prepared.target)?;
    conn.send_headers(&prepared.headers)?;
    if let Some(source) = source {
        conn.send_body(&prepared.headers, source)?;
    }

    let mut line = match conn.receive_status_line()? {
        Reply::Status(line) => line,
        Reply::Http09(prefix) => {
            conn.receive_09_body(&prefix, sink)?;
            conn.count_request();
            return Ok((Outcome::Done(Response::http09()), false));
        }
    };

    // Interim responses carry no body and are skipped entirely
    while line.status.is_informational() && line.status.code() != 101 {
        conn.receive_headers(&mut Headers::new())?;
        line = match conn.receive_status_line()? {
            Reply::Status(line) => line,
            Reply::Http09(_) => {
                return Err(Error::Protocol("Status line missing after interim response".to_string()));
            }
        };
    }

    let mut headers = Headers::new();
    conn.receive_headers(&mut headers)?;
    let mut response = Response::new(line, headers);

    if may_redirect {
        if let Some(target) = redirect_target(url, &response) {
            conn.count_request();
            return Ok((Outcome::Redirect(target, response), false));
        }
    }

    let framing = if prepared.method == Method::Head || response.status().forbids_body() {
        None
    } else {
        Some(conn.receive_body(response.headers_mut(), sink)?)
    };

    conn.count_request();
    let keep = keep_alive(conn, prepared, &response, framing);
    Ok((Outcome::Done(response), keep))
}

/// Where a response redirects to, if it is a redirect worth following
fn redirect_target(url: &Url, response: &Response) -> Option<Url> {
    if !response.status().is_followable_redirect() {
        return None;
    }

    let location = response.headers().get("location")?;
    let target = url.join(location.trim()).ok()?;

    match Scheme::from_str(target.scheme()) {
        Ok(_) if target.host_str().map_or(false, |h| !h.is_empty()) => Some(target),
        _ => {
            log::debug!("not following redirect to {}", location);
            None
        }
    }
}

/// Decide whether the connection stays pooled after a completed exchange
///
/// Records the server's keep-alive parameters on the connection when it
/// does.
fn keep_alive(conn: &mut Connection, prepared: &PreparedRequest, response: &Response, framing: Option<Framing>) -> bool {
    let headers = response.headers();

    let refused = if prepared.headers.has_token("connection", "close") || headers.has_token("connection", "close") {
        Some("connection: close")
    } else if framing.map_or(false, |f| f.consumes_connection()) {
        Some("body delimited by close")
    } else if response.status().code() == 101 {
        Some("protocol switch")
    } else {
        match response.version() {
            Version::Http11 => None,
            Version::Http10 if headers.has_token("connection", "keep-alive") => None,
            _ => Some("HTTP/1.0 without keep-alive"),
        }
    };

    if let Some(reason) = refused {
        log::debug!("connection {} not kept alive: {}", conn.id(), reason);
        return false;
    }

    let params = KeepAlive::from_headers(headers);
    conn.set_keep_alive(params);

    if let Some(max) = params.max {
        if conn.requests() >= max {
            log::debug!("connection {} used up its {} requests", conn.id(), max);
            return false;
        }
    }

    true
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::http::parser::parse_status_line;
    use crate::http::StatusLine;

    fn response(status: &str, headers: &[(&str, &str)]) -> Response {
        let line: StatusLine = parse_status_line(status).unwrap();
        Response::new(line, headers.iter().copied().collect())
    }

    #[test]
    fn test_redirect_target() {
        let base = Url::parse("http://example.test/a/b").unwrap();

        let target = redirect_target(&base, &response("HTTP/1.1 302 Found", &[("location", "/new")]));
        assert_eq!(target.unwrap().as_str(), "http://example.test/new");

        let target = redirect_target(&base, &response("HTTP/1.1 301 Moved", &[("location", "c?d=1")]));
        assert_eq!(target.unwrap().as_str(), "http://example.test/a/c?d=1");

        let target = redirect_target(
            &base,
            &response("HTTP/1.1 307 Temporary Redirect", &[("location", "https://other.test:8443/")]),
        );
        assert_eq!(target.unwrap().as_str(), "https://other.test:8443/");
    }

    #[test]
    fn test_redirect_target_rejects() {
        let base = Url::parse("http://example.test/").unwrap();

        assert!(redirect_target(&base, &response("HTTP/1.1 302 Found", &[])).is_none());
        assert!(redirect_target(&base, &response("HTTP/1.1 308 Permanent", &[("location", "/x")])).is_none());
        assert!(redirect_target(&base, &response("HTTP/1.1 200 OK", &[("location", "/x")])).is_none());
        assert!(redirect_target(&base, &response("HTTP/1.1 302 Found", &[("location", "ftp://x.test/")])).is_none());
    }

    #[test]
    fn test_tally_counts() {
        let mut out = Vec::new();
        let mut sink = Tally::new(&mut out);
        sink.write_all(b"abc").unwrap();
        assert_eq!(sink.bytes, 3);

        let mut inner = crate::http::body::once("hello");
        let mut source = Tally::new(&mut inner);
        while source.next_chunk().unwrap().is_some() {}
        assert_eq!(source.bytes, 5);
    }
}
