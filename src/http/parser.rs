//! HTTP message parsing
//!
//! Line-level parsers for status lines and the header values the engine
//! interprets itself (`Content-Length`, `Keep-Alive`).

use super::{Error, Headers, Result, Status, StatusLine, Version};
use std::time::Duration;

/// Parse HTTP response status line
///
/// Format: `HTTP/<major>.<minor> <3-digit-code>[ reason]`
/// Example: `HTTP/1.1 200 OK`
pub fn parse_status_line(line: &str) -> Result<StatusLine> {
    let bad = || Error::Parse(format!("Invalid status line: {}", line));

    let (version, rest) = line.split_once(' ').ok_or_else(bad)?;
    let version = Version::from_str(version).map_err(|_| bad())?;

    let rest = rest.trim_start_matches(' ');
    let code = rest.get(..3).ok_or_else(bad)?;
    if !code.bytes().all(|b| b.is_ascii_digit()) {
        return Err(bad());
    }

    let tail = &rest[3..];
    if !(tail.is_empty() || tail.starts_with(' ') || tail.starts_with('\t')) {
        return Err(bad());
    }

    let status = code
        .parse::<u16>()
        .map_err(|_| bad())
        .and_then(|c| Status::new(c).map_err(|_| bad()))?;

    let reason = match tail.trim() {
        "" => status.reason_phrase().to_string(),
        reason => reason.to_string(),
    };

    Ok(StatusLine {
        version,
        status,
        reason,
        raw: line.to_string(),
    })
}

/// Parse a `Content-Length` value
///
/// Repeated fields arrive merged as a list; it is accepted when every
/// member carries the same length.
pub fn parse_content_length(value: &str) -> Result<u64> {
    let invalid = || Error::Parse(format!("Invalid Content-Length: {}", value));
    let mut lengths = value.split(',').map(|v| v.trim().parse::<u64>().map_err(|_| invalid()));

    let first = lengths.next().ok_or_else(invalid)??;
    for length in lengths {
        if length? != first {
            return Err(invalid());
        }
    }
    Ok(first)
}

/// Keep-alive parameters a server advertised for its connection
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct KeepAlive {
    /// Idle time after which the server may close the connection
    pub timeout: Option<Duration>,
    /// Number of requests the server will serve on the connection
    pub max: Option<u32>,
}

impl KeepAlive {
    /// Parse a `Keep-Alive: timeout=5, max=100` value
    ///
    /// Unknown or malformed parameters are ignored.
    pub fn parse(value: &str) -> Self {
        let mut keep_alive = KeepAlive::default();

        for param in value.split(',') {
            let Some((name, val)) = param.split_once('=') else {
                continue;
            };
            let val = val.trim().trim_matches('"');

            match name.trim().to_ascii_lowercase().as_str() {
                "timeout" => keep_alive.timeout = val.parse::<u64>().ok().map(Duration::from_secs),
                "max" => keep_alive.max = val.parse::<u32>().ok(),
                _ => {}
            }
        }

        keep_alive
    }

    /// Parse the `Keep-Alive` header of a response, if any
    pub fn from_headers(headers: &Headers) -> Self {
        headers.get("keep-alive").map(KeepAlive::parse).unwrap_or_default()
    }
}
