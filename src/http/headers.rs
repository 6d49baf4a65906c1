//! HTTP headers handling
//!
//! Headers are an ordered mapping keyed case-insensitively. Two write rules
//! exist: `set` replaces any previous value (request overrides, last write
//! wins) and `append` joins repeated fields with `", "` (received fields and
//! chunked trailers).

use super::{Error, Result};
use std::borrow::Cow;
use std::fmt;

/// Maximum number of header lines accepted in one received block
pub const MAX_HEADERS: usize = 128;

/// Wire casing for well-known header names, keyed by lower-case name
static CANONICAL: &[(&str, &str)] = &[
    ("accept", "Accept"),
    ("accept-charset", "Accept-Charset"),
    ("accept-encoding", "Accept-Encoding"),
    ("accept-language", "Accept-Language"),
    ("accept-ranges", "Accept-Ranges"),
    ("age", "Age"),
    ("allow", "Allow"),
    ("authorization", "Authorization"),
    ("cache-control", "Cache-Control"),
    ("connection", "Connection"),
    ("content-disposition", "Content-Disposition"),
    ("content-encoding", "Content-Encoding"),
    ("content-language", "Content-Language"),
    ("content-length", "Content-Length"),
    ("content-location", "Content-Location"),
    ("content-md5", "Content-MD5"),
    ("content-range", "Content-Range"),
    ("content-type", "Content-Type"),
    ("cookie", "Cookie"),
    ("date", "Date"),
    ("etag", "ETag"),
    ("expect", "Expect"),
    ("expires", "Expires"),
    ("from", "From"),
    ("host", "Host"),
    ("if-match", "If-Match"),
    ("if-modified-since", "If-Modified-Since"),
    ("if-none-match", "If-None-Match"),
    ("if-range", "If-Range"),
    ("if-unmodified-since", "If-Unmodified-Since"),
    ("keep-alive", "Keep-Alive"),
    ("last-modified", "Last-Modified"),
    ("location", "Location"),
    ("max-forwards", "Max-Forwards"),
    ("pragma", "Pragma"),
    ("proxy-authenticate", "Proxy-Authenticate"),
    ("proxy-authorization", "Proxy-Authorization"),
    ("proxy-connection", "Proxy-Connection"),
    ("range", "Range"),
    ("referer", "Referer"),
    ("retry-after", "Retry-After"),
    ("server", "Server"),
    ("set-cookie", "Set-Cookie"),
    ("te", "TE"),
    ("trailer", "Trailer"),
    ("transfer-encoding", "Transfer-Encoding"),
    ("upgrade", "Upgrade"),
    ("user-agent", "User-Agent"),
    ("vary", "Vary"),
    ("via", "Via"),
    ("warning", "Warning"),
    ("www-authenticate", "WWW-Authenticate"),
];

/// Wire form of a header name
///
/// Known names get their canonical casing, anything else is sent as given.
pub fn canonical_name(name: &str) -> Cow<'_, str> {
    CANONICAL
        .iter()
        .find(|(lower, _)| lower.eq_ignore_ascii_case(name))
        .map(|(_, canonical)| Cow::Borrowed(*canonical))
        .unwrap_or(Cow::Borrowed(name))
}

/// Whether `name` is a valid field name (an RFC 7230 token)
pub fn is_token(name: &str) -> bool {
    !name.is_empty()
        && name.bytes().all(|b| {
            b.is_ascii_alphanumeric() || b"!#$%&'*+-.^_`|~".contains(&b)
        })
}

/// Whether `value` can be sent as a field value without breaking the line
pub fn is_field_value(value: &str) -> bool {
    !value.bytes().any(|b| b == b'\r' || b == b'\n' || b == 0)
}

/// HTTP headers collection
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Headers {
    headers: Vec<(String, String)>,
}

impl Headers {
    /// Create a new empty headers collection
    pub fn new() -> Self {
        Headers {
            headers: Vec::new(),
        }
    }

    fn position(&self, name: &str) -> Option<usize> {
        self.headers
            .iter()
            .position(|(n, _)| n.eq_ignore_ascii_case(name))
    }

    /// Set a header, replacing any previous value under the same name
    ///
    /// The field keeps its original position; the stored name takes the
    /// casing of this latest write.
    pub fn set(&mut self, name: impl Into<String>, value: impl Into<String>) {
        let name = name.into();
        let value = value.into();

        match self.position(&name) {
            Some(i) => self.headers[i] = (name, value),
            None => self.headers.push((name, value)),
        }
    }

    /// Append a header, joining with `", "` onto an existing value
    pub fn append(&mut self, name: impl Into<String>, value: impl Into<String>) {
        let name = name.into();
        let value = value.into();

        match self.position(&name) {
            Some(i) => {
                let existing = &mut self.headers[i].1;
                existing.push_str(", ");
                existing.push_str(&value);
            }
            None => self.headers.push((name, value)),
        }
    }

    /// Get the value for a header (case-insensitive)
    pub fn get(&self, name: &str) -> Option<&str> {
        self.position(name).map(|i| self.headers[i].1.as_str())
    }

    /// Check if a header exists
    pub fn contains(&self, name: &str) -> bool {
        self.position(name).is_some()
    }

    /// Check whether a comma-separated header carries `token`
    ///
    /// Tokens are compared case-insensitively after trimming whitespace.
    pub fn has_token(&self, name: &str, token: &str) -> bool {
        self.get(name)
            .map(|v| v.split(',').any(|t| t.trim().eq_ignore_ascii_case(token)))
            .unwrap_or(false)
    }

    /// Remove a header, returning its value
    pub fn remove(&mut self, name: &str) -> Option<String> {
        self.position(name).map(|i| self.headers.remove(i).1)
    }

    /// Get the number of headers
    pub fn len(&self) -> usize {
        self.headers.len()
    }

    /// Check if there are no headers
    pub fn is_empty(&self) -> bool {
        self.headers.is_empty()
    }

    /// Iterate over all headers in insertion order
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.headers.iter().map(|(n, v)| (n.as_str(), v.as_str()))
    }

    /// Apply every field of `other` with `set` semantics
    pub fn extend_overriding(&mut self, other: &Headers) {
        for (name, value) in other.iter() {
            self.set(name, value);
        }
    }

    /// Mutable access to a stored value
    pub(crate) fn value_mut(&mut self, name: &str) -> Option<&mut String> {
        self.position(name).map(move |i| &mut self.headers[i].1)
    }

    /// Serialize as header lines terminated by the blank line
    pub fn to_wire(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(self.headers.len() * 32 + 2);
        for (name, value) in &self.headers {
            buf.extend_from_slice(canonical_name(name).as_bytes());
            buf.extend_from_slice(b": ");
            buf.extend_from_slice(value.as_bytes());
            buf.extend_from_slice(b"\r\n");
        }
        buf.extend_from_slice(b"\r\n");
        buf
    }

    /// Parse a received header line into a lower-cased name and its value
    ///
    /// The line must look like `name:[ \t]*value`.
    pub fn parse_header_line(line: &str) -> Result<(String, String)> {
        let colon_pos = line
            .find(':')
            .ok_or_else(|| Error::InvalidHeader(format!("No colon in header: {}", line)))?;

        let name = &line[..colon_pos];
        if name.is_empty() || name.contains(|c: char| c == ' ' || c == '\t') {
            return Err(Error::InvalidHeader(format!("Bad header name: {}", line)));
        }

        let value = line[colon_pos + 1..]
            .trim_start_matches(|c| c == ' ' || c == '\t')
            .trim_end();

        Ok((name.to_ascii_lowercase(), value.to_string()))
    }
}

impl fmt::Display for Headers {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (name, value) in &self.headers {
            writeln!(f, "{}: {}", canonical_name(name), value)?;
        }
        Ok(())
    }
}

impl<N: Into<String>, V: Into<String>> FromIterator<(N, V)> for Headers {
    fn from_iter<T: IntoIterator<Item = (N, V)>>(iter: T) -> Self {
        let mut headers = Headers::new();
        for (name, value) in iter {
            headers.set(name, value);
        }
        headers
    }
}
