//! HTTP message types
//!
//! This module defines methods, versions, status codes and the response head
//! returned by a completed exchange.

use super::{Error, Headers, Result};
use std::fmt;

/// HTTP methods
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Method {
    #[default]
    Get,
    Head,
    Post,
    Put,
    Delete,
    Connect,
    Options,
    Trace,
    Patch,
}

impl Method {
    /// Parse method from string
    ///
    /// Method names are case-sensitive on the wire.
    pub fn from_str(s: &str) -> Result<Self> {
        match s {
            "GET" => Ok(Method::Get),
            "HEAD" => Ok(Method::Head),
            "POST" => Ok(Method::Post),
            "PUT" => Ok(Method::Put),
            "DELETE" => Ok(Method::Delete),
            "CONNECT" => Ok(Method::Connect),
            "OPTIONS" => Ok(Method::Options),
            "TRACE" => Ok(Method::Trace),
            "PATCH" => Ok(Method::Patch),
            _ => Err(Error::InvalidMethod(s.to_string())),
        }
    }

    /// Convert method to string
    pub fn as_str(&self) -> &'static str {
        match self {
            Method::Get => "GET",
            Method::Head => "HEAD",
            Method::Post => "POST",
            Method::Put => "PUT",
            Method::Delete => "DELETE",
            Method::Connect => "CONNECT",
            Method::Options => "OPTIONS",
            Method::Trace => "TRACE",
            Method::Patch => "PATCH",
        }
    }

    /// Whether a redirect response may be followed for this method
    pub fn is_redirectable(&self) -> bool {
        matches!(self, Method::Get | Method::Head)
    }
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// HTTP version of a received reply
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Version {
    /// Reply without a status line
    Http09,
    Http10,
    #[default]
    Http11,
    /// Any other `HTTP/<digit>.<digit>` a server may announce
    Other(u8, u8),
}

impl Version {
    /// Build a version from its major and minor digits
    pub fn from_digits(major: u8, minor: u8) -> Self {
        match (major, minor) {
            (0, 9) => Version::Http09,
            (1, 0) => Version::Http10,
            (1, 1) => Version::Http11,
            (major, minor) => Version::Other(major, minor),
        }
    }

    /// Parse version from string
    pub fn from_str(s: &str) -> Result<Self> {
        let digits = s
            .strip_prefix("HTTP/")
            .map(str::as_bytes)
            .filter(|d| d.len() == 3 && d[0].is_ascii_digit() && d[1] == b'.' && d[2].is_ascii_digit())
            .ok_or_else(|| Error::Parse(format!("Invalid HTTP version: {}", s)))?;

        Ok(Version::from_digits(digits[0] - b'0', digits[2] - b'0'))
    }
}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Version::Http09 => write!(f, "HTTP/0.9"),
            Version::Http10 => write!(f, "HTTP/1.0"),
            Version::Http11 => write!(f, "HTTP/1.1"),
            Version::Other(major, minor) => write!(f, "HTTP/{}.{}", major, minor),
        }
    }
}

/// HTTP status code
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Status {
    code: u16,
}

impl Status {
    /// Create a new status code from a three-digit number
    pub fn new(code: u16) -> Result<Self> {
        if (100..1000).contains(&code) {
            Ok(Status { code })
        } else {
            Err(Error::InvalidStatus(format!("Invalid status code: {}", code)))
        }
    }

    /// Get the status code
    pub fn code(&self) -> u16 {
        self.code
    }

    /// Get the canonical reason phrase for this status code
    pub fn reason_phrase(&self) -> &'static str {
        match self.code {
            100 => "Continue",
            101 => "Switching Protocols",
            200 => "OK",
            201 => "Created",
            202 => "Accepted",
            204 => "No Content",
            206 => "Partial Content",
            301 => "Moved Permanently",
            302 => "Found",
            303 => "See Other",
            304 => "Not Modified",
            307 => "Temporary Redirect",
            308 => "Permanent Redirect",
            400 => "Bad Request",
            401 => "Unauthorized",
            403 => "Forbidden",
            404 => "Not Found",
            405 => "Method Not Allowed",
            407 => "Proxy Authentication Required",
            408 => "Request Timeout",
            411 => "Length Required",
            413 => "Payload Too Large",
            500 => "Internal Server Error",
            501 => "Not Implemented",
            502 => "Bad Gateway",
            503 => "Service Unavailable",
            504 => "Gateway Timeout",
            _ => "Unknown",
        }
    }

    /// Check if this is an informational status (1xx)
    pub fn is_informational(&self) -> bool {
        (100..200).contains(&self.code)
    }

    /// Check if this is a success status (2xx)
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.code)
    }

    /// Whether this status is one the client follows a `Location` for
    pub fn is_followable_redirect(&self) -> bool {
        matches!(self.code, 301 | 302 | 303 | 307)
    }

    /// Whether a response with this status never carries a body
    pub fn forbids_body(&self) -> bool {
        self.is_informational() || self.code == 204 || self.code == 304
    }

    pub const OK: Status = Status { code: 200 };
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.code, self.reason_phrase())
    }
}

/// A parsed `HTTP/x.y NNN reason` line
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusLine {
    pub version: Version,
    pub status: Status,
    pub reason: String,
    /// The line as received, without its line terminator
    pub raw: String,
}

/// Head of a completed response
///
/// The body has already been streamed to the request's sink by the time a
/// `Response` is handed back.
#[derive(Debug, Clone)]
pub struct Response {
    version: Version,
    status: Status,
    reason: String,
    status_line: String,
    headers: Headers,
    redirects: u32,
}

impl Response {
    /// Build a response from its status line and headers
    pub fn new(line: StatusLine, headers: Headers) -> Self {
        Response {
            version: line.version,
            status: line.status,
            reason: line.reason,
            status_line: line.raw,
            headers,
            redirects: 0,
        }
    }

    /// Response to a reply that had no status line
    pub fn http09() -> Self {
        Response {
            version: Version::Http09,
            status: Status::OK,
            reason: Status::OK.reason_phrase().to_string(),
            status_line: String::new(),
            headers: Headers::new(),
            redirects: 0,
        }
    }

    /// Get the HTTP version
    pub fn version(&self) -> Version {
        self.version
    }

    /// Get the status code
    pub fn status(&self) -> Status {
        self.status
    }

    /// Get the reason phrase
    pub fn reason(&self) -> &str {
        &self.reason
    }

    /// Get the full status line text, empty for HTTP/0.9 replies
    pub fn status_line(&self) -> &str {
        &self.status_line
    }

    /// Get the headers
    pub fn headers(&self) -> &Headers {
        &self.headers
    }

    /// Get mutable headers
    pub fn headers_mut(&mut self) -> &mut Headers {
        &mut self.headers
    }

    /// Number of redirect hops followed to reach this response
    pub fn redirects(&self) -> u32 {
        self.redirects
    }

    pub(crate) fn set_redirects(&mut self, redirects: u32) {
        self.redirects = redirects;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_method_from_str() {
        assert_eq!(Method::from_str("GET").unwrap(), Method::Get);
        assert_eq!(Method::from_str("POST").unwrap(), Method::Post);
        assert!(Method::from_str("get").is_err());
        assert!(Method::from_str("INVALID").is_err());
    }

    #[test]
    fn test_redirectable_methods() {
        assert!(Method::Get.is_redirectable());
        assert!(Method::Head.is_redirectable());
        assert!(!Method::Post.is_redirectable());
    }

    #[test]
    fn test_version_from_str() {
        assert_eq!(Version::from_str("HTTP/1.0").unwrap(), Version::Http10);
        assert_eq!(Version::from_str("HTTP/1.1").unwrap(), Version::Http11);
        assert_eq!(Version::from_str("HTTP/2.0").unwrap(), Version::Other(2, 0));
        assert!(Version::from_str("HTTP/1").is_err());
        assert!(Version::from_str("HTTX/1.1").is_err());
        assert_eq!(Version::Other(1, 2).to_string(), "HTTP/1.2");
    }

    #[test]
    fn test_status() {
        let status = Status::new(200).unwrap();
        assert_eq!(status.code(), 200);
        assert_eq!(status.reason_phrase(), "OK");
        assert!(status.is_success());
        assert!(Status::new(99).is_err());
        assert!(Status::new(1000).is_err());
    }

    #[test]
    fn test_status_body_rules() {
        for code in [100, 101, 103, 204, 304] {
            assert!(Status::new(code).unwrap().forbids_body(), "{}", code);
        }
        for code in [200, 206, 301, 404] {
            assert!(!Status::new(code).unwrap().forbids_body(), "{}", code);
        }
    }

    #[test]
    fn test_followable_redirects() {
        for code in [301, 302, 303, 307] {
            assert!(Status::new(code).unwrap().is_followable_redirect());
        }
        for code in [300, 304, 305, 308] {
            assert!(!Status::new(code).unwrap().is_followable_redirect());
        }
    }
}
