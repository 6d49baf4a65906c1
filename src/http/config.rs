//! Client configuration
//!
//! Tunables shared by every request a `Client` drives.

use super::tls::TlsConfig;
use super::{Error, Result};
use std::time::Duration;
use url::Url;

/// Default bound on every blocking socket operation
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(60);

/// Default number of redirect hops followed per request
pub const DEFAULT_MAX_REDIRECTS: u32 = 5;

/// Default `User-Agent` value
pub const DEFAULT_USER_AGENT: &str = concat!("h1pool/", env!("CARGO_PKG_VERSION"));

/// Client configuration
///
/// Built with chained setters:
///
/// ```
/// use h1pool::http::ClientConfig;
/// use std::time::Duration;
///
/// let config = ClientConfig::default()
///     .timeout(Duration::from_secs(5))
///     .max_redirects(2)
///     .user_agent("fetcher/1.0");
/// assert_eq!(config.get_max_redirects(), 2);
/// ```
#[derive(Debug, Clone)]
pub struct ClientConfig {
    timeout: Duration,
    max_redirects: u32,
    user_agent: String,
    tls: Option<TlsConfig>,
    proxy: Option<Url>,
}

impl Default for ClientConfig {
    fn default() -> Self {
        ClientConfig {
            timeout: DEFAULT_TIMEOUT,
            max_redirects: DEFAULT_MAX_REDIRECTS,
            user_agent: DEFAULT_USER_AGENT.to_string(),
            tls: None,
            proxy: None,
        }
    }
}

impl ClientConfig {
    /// Bound for connect and for every blocking send or receive
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Maximum redirect hops followed for one request
    pub fn max_redirects(mut self, max: u32) -> Self {
        self.max_redirects = max;
        self
    }

    /// Default `User-Agent` header
    pub fn user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.user_agent = user_agent.into();
        self
    }

    /// TLS configuration used for https origins
    pub fn tls(mut self, tls: TlsConfig) -> Self {
        self.tls = Some(tls);
        self
    }

    /// HTTP proxy used for every request that does not name its own
    pub fn proxy(mut self, proxy: &str) -> Result<Self> {
        self.proxy = Some(parse_proxy(proxy)?);
        Ok(self)
    }

    pub fn get_timeout(&self) -> Duration {
        self.timeout
    }

    pub fn get_max_redirects(&self) -> u32 {
        self.max_redirects
    }

    pub fn get_user_agent(&self) -> &str {
        &self.user_agent
    }

    pub fn get_proxy(&self) -> Option<&Url> {
        self.proxy.as_ref()
    }

    /// The TLS configuration, building the default one on first need
    pub fn tls_config(&self) -> Result<TlsConfig> {
        match self.tls {
            Some(ref tls) => Ok(tls.clone()),
            None => Ok(TlsConfig::client().build()?),
        }
    }
}

/// Parse a proxy URL
///
/// Only `http://` proxies are spoken to; the tunnel to an https origin is
/// made with `CONNECT` over the plain proxy connection.
pub fn parse_proxy(proxy: &str) -> Result<Url> {
    let url = Url::parse(proxy).map_err(|e| Error::InvalidRequest(format!("Invalid proxy URL {}: {}", proxy, e)))?;

    if url.scheme() != "http" {
        return Err(Error::InvalidRequest(format!("Unsupported proxy scheme: {}", url.scheme())));
    }
    if url.host_str().map_or(true, str::is_empty) {
        return Err(Error::InvalidRequest(format!("Proxy URL has no host: {}", proxy)));
    }

    Ok(url)
}
