//! Process-wide client
//!
//! A lazily created `Client` shared by the whole process, for callers that
//! do not want to carry one around. Configure it once, before first use.

use super::{Client, ClientConfig, Request, Response, Result};
use bytes::Bytes;
use std::sync::OnceLock;

static CLIENT: OnceLock<Client> = OnceLock::new();

/// Install the process-wide configuration
///
/// Returns the configuration back if the client was already created,
/// either by an earlier `configure` or by a request.
pub fn configure(config: ClientConfig) -> std::result::Result<(), ClientConfig> {
    let mut config = Some(config);
    CLIENT.get_or_init(|| Client::new(config.take().unwrap_or_default()));
    match config {
        None => Ok(()),
        Some(config) => Err(config),
    }
}

/// The process-wide client, created with the default configuration if
/// `configure` was never called
pub fn client() -> &'static Client {
    CLIENT.get_or_init(Client::default)
}

pub fn request(request: Request<'_>) -> Result<Response> {
    client().request(request)
}

pub fn get(url: &str) -> Result<(Response, Vec<u8>)> {
    client().get(url)
}

pub fn post(url: &str, body: impl Into<Bytes>) -> Result<(Response, Vec<u8>)> {
    client().post(url, body)
}

/// Close every connection in the process-wide pool
pub fn close_all() {
    if let Some(client) = CLIENT.get() {
        client.close_all();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_configure_once() {
        let first = configure(ClientConfig::default().timeout(Duration::from_secs(7)));
        let second = configure(ClientConfig::default().timeout(Duration::from_secs(9)));

        assert!(first.is_ok());
        assert_eq!(client().config().get_timeout(), Duration::from_secs(7));
        let returned = second.unwrap_err();
        assert_eq!(returned.get_timeout(), Duration::from_secs(9));

        close_all();
        assert!(client().pool().is_empty());
    }
}
