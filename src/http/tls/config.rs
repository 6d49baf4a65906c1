//! TLS configuration
//!
//! This module provides the client-side TLS configuration builder.

use openssl::pkey::PKey;
use openssl::ssl::{SslContext, SslContextBuilder, SslMethod, SslVerifyMode};
use openssl::x509::X509;
use std::fs;
use std::path::{Path, PathBuf};

/// TLS version
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum TlsVersion {
    /// TLS 1.0
    Tls10,
    /// TLS 1.1
    Tls11,
    /// TLS 1.2
    Tls12,
    /// TLS 1.3
    Tls13,
}

impl TlsVersion {
    /// Get OpenSSL protocol version constant
    pub fn to_openssl_version(&self) -> openssl::ssl::SslVersion {
        use openssl::ssl::SslVersion;
        match self {
            TlsVersion::Tls10 => SslVersion::TLS1,
            TlsVersion::Tls11 => SslVersion::TLS1_1,
            TlsVersion::Tls12 => SslVersion::TLS1_2,
            TlsVersion::Tls13 => SslVersion::TLS1_3,
        }
    }
}

/// TLS errors
#[derive(Debug, thiserror::Error)]
pub enum TlsError {
    #[error("OpenSSL error: {0}")]
    OpenSsl(#[from] openssl::error::ErrorStack),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Certificate error: {0}")]
    Certificate(String),

    #[error("Handshake failed: {0}")]
    HandshakeFailed(String),
}

/// TLS configuration (immutable after building)
///
/// The context is reference counted, so cloning a config is cheap and every
/// connection built from it shares the loaded certificates.
#[derive(Clone)]
pub struct TlsConfig {
    pub(crate) ctx: SslContext,
    pub(crate) verify_peer: bool,
}

impl TlsConfig {
    /// Create a new client configuration builder
    pub fn client() -> ClientConfigBuilder {
        ClientConfigBuilder::default()
    }

    /// Whether the peer certificate and host name are verified
    pub fn verify_peer(&self) -> bool {
        self.verify_peer
    }

    /// Connect to a server with TLS, sending `servername` as SNI
    pub fn connect(
        &self,
        stream: std::net::TcpStream,
        servername: &str,
    ) -> Result<super::TlsSessionOps, TlsError> {
        super::session::TlsSessionOps::connect(stream, self, servername)
    }
}

impl std::fmt::Debug for TlsConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TlsConfig")
            .field("verify_peer", &self.verify_peer)
            .finish_non_exhaustive()
    }
}

/// Client configuration builder
#[derive(Debug, Clone)]
pub struct ClientConfigBuilder {
    min_version: Option<TlsVersion>,
    max_version: Option<TlsVersion>,
    cipher_list: Option<String>,
    verify_peer: bool,
    cert_file: Option<PathBuf>,
    key_file: Option<PathBuf>,
    ca_file: Option<PathBuf>,
}

impl Default for ClientConfigBuilder {
    fn default() -> Self {
        ClientConfigBuilder {
            min_version: Some(TlsVersion::Tls12),
            max_version: None,
            cipher_list: None,
            verify_peer: true,
            cert_file: None,
            key_file: None,
            ca_file: None,
        }
    }
}

impl ClientConfigBuilder {
    /// Set TLS version (both min and max)
    pub fn version(self, version: TlsVersion) -> Self {
        self.version_range(version, version)
    }

    /// Set TLS version range
    pub fn version_range(mut self, min: TlsVersion, max: TlsVersion) -> Self {
        self.min_version = Some(min);
        self.max_version = Some(max);
        self
    }

    /// Set cipher list (for TLS <= 1.2)
    pub fn cipher_list(mut self, ciphers: impl Into<String>) -> Self {
        self.cipher_list = Some(ciphers.into());
        self
    }

    /// Enable/disable peer certificate verification
    pub fn verify_peer(mut self, verify: bool) -> Self {
        self.verify_peer = verify;
        self
    }

    /// Client certificate PEM file
    ///
    /// Without a separate `key_file` the private key is read from this
    /// same file.
    pub fn cert_file(mut self, path: impl AsRef<Path>) -> Self {
        self.cert_file = Some(path.as_ref().to_path_buf());
        self
    }

    /// Private key PEM file for the client certificate
    pub fn key_file(mut self, path: impl AsRef<Path>) -> Self {
        self.key_file = Some(path.as_ref().to_path_buf());
        self
    }

    /// CA bundle used instead of the system trust store
    pub fn ca_file(mut self, path: impl AsRef<Path>) -> Self {
        self.ca_file = Some(path.as_ref().to_path_buf());
        self
    }

    /// Build the TLS configuration
    pub fn build(self) -> Result<TlsConfig, TlsError> {
        if let (Some(min), Some(max)) = (self.min_version, self.max_version) {
            if min > max {
                return Err(TlsError::InvalidConfig(format!(
                    "Minimum version {:?} above maximum {:?}",
                    min, max
                )));
            }
        }

        let mut ctx = SslContextBuilder::new(SslMethod::tls_client())?;

        ctx.set_min_proto_version(self.min_version.map(|v| v.to_openssl_version()))?;
        ctx.set_max_proto_version(self.max_version.map(|v| v.to_openssl_version()))?;

        if let Some(ref ciphers) = self.cipher_list {
            ctx.set_cipher_list(ciphers)?;
        }

        if self.verify_peer {
            ctx.set_verify(SslVerifyMode::PEER);
        } else {
            ctx.set_verify(SslVerifyMode::NONE);
        }

        match self.ca_file {
            Some(ref path) => ctx.set_ca_file(path)?,
            None => ctx.set_default_verify_paths()?,
        }

        if let Some(ref cert_path) = self.cert_file {
            load_identity(&mut ctx, cert_path, self.key_file.as_deref().unwrap_or(cert_path))?;
        } else if self.key_file.is_some() {
            return Err(TlsError::InvalidConfig("key_file set without cert_file".to_string()));
        }

        Ok(TlsConfig {
            ctx: ctx.build(),
            verify_peer: self.verify_peer,
        })
    }
}

/// Load a client certificate and its private key from PEM files
fn load_identity(ctx: &mut SslContextBuilder, cert_path: &Path, key_path: &Path) -> Result<(), TlsError> {
    let cert_pem = fs::read(cert_path)?;
    let cert = X509::from_pem(&cert_pem)
        .map_err(|e| TlsError::Certificate(format!("Failed to load certificate: {}", e)))?;
    ctx.set_certificate(&cert)?;

    let key_pem = if key_path == cert_path {
        cert_pem
    } else {
        fs::read(key_path)?
    };
    let key = PKey::private_key_from_pem(&key_pem)
        .map_err(|e| TlsError::Certificate(format!("Failed to load private key: {}", e)))?;
    ctx.set_private_key(&key)?;

    ctx.check_private_key()
        .map_err(|e| TlsError::Certificate(format!("Private key does not match certificate: {}", e)))?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_verifies_peer() {
        let config = TlsConfig::client().build().unwrap();
        assert!(config.verify_peer());
    }

    #[test]
    fn test_client_config_builder() {
        let config = TlsConfig::client()
            .version(TlsVersion::Tls13)
            .verify_peer(false)
            .build()
            .unwrap();

        assert!(!config.verify_peer());
    }

    #[test]
    fn test_inverted_version_range() {
        let result = TlsConfig::client()
            .version_range(TlsVersion::Tls13, TlsVersion::Tls12)
            .build();
        assert!(matches!(result, Err(TlsError::InvalidConfig(_))));
    }

    #[test]
    fn test_missing_cert_file() {
        let result = TlsConfig::client().cert_file("/nonexistent/client.pem").build();
        assert!(matches!(result, Err(TlsError::Io(_))));
    }

    #[test]
    fn test_key_without_cert() {
        let result = TlsConfig::client().key_file("/tmp/key.pem").build();
        assert!(matches!(result, Err(TlsError::InvalidConfig(_))));
    }
}
