//! Requests and their normalization
//!
//! A `Request` is what the caller describes: a method, a URL, header
//! overrides, and optionally a body source and a response sink. Before any
//! I/O it is normalized into a `PreparedRequest` holding everything that goes
//! on the wire and the address key of the pool slot it is sent through.

use super::body::Source;
use super::config::{parse_proxy, ClientConfig};
use super::headers::{is_field_value, is_token};
use super::tls::TlsConfig;
use super::{Error, Headers, Method, Result, DEFAULT_HTTPS_PORT, DEFAULT_HTTP_PORT, DEFAULT_PROXY_PORT};
use base64::{engine::general_purpose, Engine as _};
use bytes::Bytes;
use std::fmt;
use std::io::Write;
use url::Url;

/// URL scheme of a request target
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Scheme {
    Http,
    Https,
}

impl Scheme {
    /// Parse a scheme name; only `http` and `https` are supported
    pub fn from_str(s: &str) -> Result<Self> {
        if s.eq_ignore_ascii_case("http") {
            Ok(Scheme::Http)
        } else if s.eq_ignore_ascii_case("https") {
            Ok(Scheme::Https)
        } else {
            Err(Error::InvalidRequest(format!("Unsupported scheme: {}", s)))
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Scheme::Http => "http",
            Scheme::Https => "https",
        }
    }

    pub fn default_port(&self) -> u16 {
        match self {
            Scheme::Http => DEFAULT_HTTP_PORT,
            Scheme::Https => DEFAULT_HTTPS_PORT,
        }
    }
}

impl fmt::Display for Scheme {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A request as described by the caller
///
/// ```
/// use h1pool::http::{Method, Request};
///
/// let mut body = Vec::new();
/// let request = Request::new(Method::Get, "http://example.test/a?b#c")
///     .unwrap()
///     .header("Accept", "text/plain")
///     .sink(&mut body);
/// assert_eq!(request.url().path(), "/a");
/// ```
pub struct Request<'a> {
    method: Method,
    url: Url,
    headers: Headers,
    proxy: Option<Url>,
    tls: Option<TlsConfig>,
    source: Option<Box<dyn Source + 'a>>,
    sink: Option<Box<dyn Write + 'a>>,
    follow_redirects: bool,
    redirects: u32,
}

impl<'a> Request<'a> {
    /// Create a request for `url`
    ///
    /// Fails before any I/O on an unparsable URL, a scheme other than
    /// http/https, or an empty host.
    pub fn new(method: Method, url: &str) -> Result<Self> {
        let url = Url::parse(url).map_err(|e| Error::InvalidRequest(format!("Invalid URL {}: {}", url, e)))?;
        Self::from_url(method, url)
    }

    /// Create a request for an already parsed URL
    pub fn from_url(method: Method, url: Url) -> Result<Self> {
        Scheme::from_str(url.scheme())?;
        if url.host_str().map_or(true, str::is_empty) {
            return Err(Error::InvalidRequest(format!("URL has no host: {}", url)));
        }

        Ok(Request {
            method,
            url,
            headers: Headers::new(),
            proxy: None,
            tls: None,
            source: None,
            sink: None,
            follow_redirects: true,
            redirects: 0,
        })
    }

    pub fn get(url: &str) -> Result<Self> {
        Self::new(Method::Get, url)
    }

    pub fn head(url: &str) -> Result<Self> {
        Self::new(Method::Head, url)
    }

    pub fn post(url: &str) -> Result<Self> {
        Self::new(Method::Post, url)
    }

    /// Set a header, overriding any default with the same name
    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.set(name, value);
        self
    }

    /// Stream the request body from `source`
    ///
    /// Without an explicit `content-length` header the body is sent chunked.
    pub fn source(mut self, source: impl Source + 'a) -> Self {
        self.source = Some(Box::new(source));
        self
    }

    /// Send `body` as the request body with its `content-length`
    pub fn body(self, body: impl Into<Bytes>) -> Self {
        let body = body.into();
        let len = body.len();
        self.header("content-length", len.to_string()).source(Some(body))
    }

    /// Deliver the response body to `sink`
    ///
    /// Without a sink the body is read and discarded.
    pub fn sink(mut self, sink: impl Write + 'a) -> Self {
        self.sink = Some(Box::new(sink));
        self
    }

    /// Send this request through an HTTP proxy
    pub fn proxy(mut self, proxy: &str) -> Result<Self> {
        self.proxy = Some(parse_proxy(proxy)?);
        Ok(self)
    }

    /// TLS configuration for this request, instead of the client's
    pub fn tls(mut self, tls: TlsConfig) -> Self {
        self.tls = Some(tls);
        self
    }

    /// Allow or forbid following redirects
    pub fn redirect(mut self, follow: bool) -> Self {
        self.follow_redirects = follow;
        self
    }

    pub fn method(&self) -> Method {
        self.method
    }

    pub fn url(&self) -> &Url {
        &self.url
    }

    pub fn headers(&self) -> &Headers {
        &self.headers
    }

    /// Number of redirect hops taken to reach this request
    pub fn redirects(&self) -> u32 {
        self.redirects
    }

    pub fn follows_redirects(&self) -> bool {
        self.follow_redirects
    }

    pub fn has_source(&self) -> bool {
        self.source.is_some()
    }

    pub(crate) fn take_source(&mut self) -> Option<Box<dyn Source + 'a>> {
        self.source.take()
    }

    pub(crate) fn take_sink(&mut self) -> Option<Box<dyn Write + 'a>> {
        self.sink.take()
    }

    /// The request for the next redirect hop
    ///
    /// The URL is replaced and the hop counter incremented; every other
    /// field carries over.
    pub(crate) fn redirected(self, url: Url) -> Self {
        Request {
            url,
            redirects: self.redirects + 1,
            ..self
        }
    }

    /// Normalize into what goes on the wire
    pub fn prepare(&self, config: &ClientConfig) -> Result<PreparedRequest> {
        let scheme = Scheme::from_str(self.url.scheme())?;
        let host = match self.url.host_str() {
            Some(host) if !host.is_empty() => host.to_string(),
            _ => return Err(Error::InvalidRequest(format!("URL has no host: {}", self.url))),
        };
        let port = self.url.port().unwrap_or_else(|| scheme.default_port());
        let proxy = self.proxy.as_ref().or(config.get_proxy()).cloned();

        let target = if proxy.is_some() && scheme == Scheme::Http {
            absolute_target(&self.url)
        } else {
            origin_target(&self.url)
        };

        let mut headers = Headers::new();
        headers.set("user-agent", config.get_user_agent());
        headers.set("host", host_header(&host, port, scheme));
        headers.set("connection", "keep-alive");
        headers.set("te", "trailers");

        if let Some(credentials) = basic_credentials(&self.url) {
            headers.set("authorization", credentials);
        }
        if scheme != Scheme::Https {
            if let Some(credentials) = proxy.as_ref().and_then(basic_credentials) {
                headers.set("proxy-authorization", credentials);
            }
        }

        for (name, value) in self.headers.iter() {
            if !is_token(name) {
                return Err(Error::InvalidRequest(format!("Bad header name: {:?}", name)));
            }
            if !is_field_value(value) {
                return Err(Error::InvalidRequest(format!("Bad value for header {}", name)));
            }
        }
        headers.extend_overriding(&self.headers);

        if self.source.is_some() && !headers.contains("content-length") && !headers.contains("transfer-encoding") {
            headers.set("transfer-encoding", "chunked");
        }

        Ok(PreparedRequest {
            method: self.method,
            scheme,
            host,
            port,
            target,
            headers,
            proxy,
            tls: self.tls.clone(),
        })
    }
}

impl fmt::Debug for Request<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Request")
            .field("method", &self.method)
            .field("url", &self.url.as_str())
            .field("headers", &self.headers)
            .field("proxy", &self.proxy.as_ref().map(Url::as_str))
            .field("has_source", &self.source.is_some())
            .field("has_sink", &self.sink.is_some())
            .field("follow_redirects", &self.follow_redirects)
            .field("redirects", &self.redirects)
            .finish()
    }
}

/// A normalized request, ready for the wire
#[derive(Debug, Clone)]
pub struct PreparedRequest {
    pub method: Method,
    pub scheme: Scheme,
    /// Target host as written in the URL, IPv6 literals bracketed
    pub host: String,
    pub port: u16,
    /// Request-target sent on the request line
    pub target: String,
    pub headers: Headers,
    pub proxy: Option<Url>,
    pub tls: Option<TlsConfig>,
}

impl PreparedRequest {
    /// Pool slot identifier, `scheme://host:port`
    pub fn address_key(&self) -> String {
        format!("{}://{}:{}", self.scheme, self.host, self.port)
    }

    /// Host and port of the proxy, if one is used
    pub fn proxy_addr(&self) -> Option<(String, u16)> {
        let proxy = self.proxy.as_ref()?;
        let host = proxy.host_str()?.to_string();
        Some((host, proxy.port().unwrap_or(DEFAULT_PROXY_PORT)))
    }

    /// `Proxy-Authorization` value from the proxy URL's userinfo
    pub fn proxy_credentials(&self) -> Option<String> {
        self.proxy.as_ref().and_then(basic_credentials)
    }

    /// `host:port` as used by `CONNECT`
    pub fn authority(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

/// Path and query, the form sent to an origin server
fn origin_target(url: &Url) -> String {
    match url.query() {
        Some(query) => format!("{}?{}", url.path(), query),
        None => url.path().to_string(),
    }
}

/// Absolute URI without userinfo or fragment, the form sent to a proxy
fn absolute_target(url: &Url) -> String {
    let mut url = url.clone();
    url.set_fragment(None);
    // Only fails for URLs that cannot carry credentials at all
    let _ = url.set_username("");
    let _ = url.set_password(None);
    url.to_string()
}

fn host_header(host: &str, port: u16, scheme: Scheme) -> String {
    if port == scheme.default_port() {
        host.to_string()
    } else {
        format!("{}:{}", host, port)
    }
}

/// `Basic` credentials from a URL's userinfo, if any
pub fn basic_credentials(url: &Url) -> Option<String> {
    if url.username().is_empty() && url.password().is_none() {
        return None;
    }

    let user = percent_decode(url.username());
    let password = url.password().map(percent_decode).unwrap_or_default();
    Some(format!(
        "Basic {}",
        general_purpose::STANDARD.encode(format!("{}:{}", user, password))
    ))
}

fn percent_decode(s: &str) -> String {
    String::from_utf8_lossy(&urlencoding::decode_binary(s.as_bytes())).into_owned()
}
