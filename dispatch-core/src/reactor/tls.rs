//! One `rustls::ServerConfig` per TLS-enabled socket, backed by a self-signed
//! certificate generated at startup. The original (`x509.cpp`) hand-rolls an
//! RSA-2048/SHA-256 certificate via OpenSSL calls; `rcgen` is the idiomatic Rust
//! equivalent and defaults to ECDSA P-256 — recorded as a deliberate substitution in
//! the design notes, not a faithful RSA port.

use std::sync::Arc;

use rcgen::{CertificateParams, KeyPair};

use crate::error::ReactorError;

/// Wraps the generated key material and a ready-to-clone `rustls::ServerConfig`.
pub struct TlsContext {
    server_config: Arc<rustls::ServerConfig>,
}

impl TlsContext {
    /// Generates a self-signed certificate for `subject_alt_names` (hostnames/IPs the
    /// cert should be valid for) valid for roughly one year, matching the lifetime the
    /// original used for its RSA certs.
    pub fn generate_self_signed(subject_alt_names: Vec<String>) -> Result<TlsContext, ReactorError> {
        let key_pair = KeyPair::generate()?;
        let params = CertificateParams::new(subject_alt_names)?;
        let cert = params.self_signed(&key_pair)?;

        let cert_der = cert.der().clone();
        let key_der = rustls::pki_types::PrivateKeyDer::Pkcs8(key_pair.serialize_der().into());

        let server_config = rustls::ServerConfig::builder()
            .with_no_client_auth()
            .with_single_cert(vec![cert_der], key_der)?;

        Ok(TlsContext {
            server_config: Arc::new(server_config),
        })
    }

    /// One `rustls::ServerConnection` per accepted connection, bound to this context.
    pub fn new_server_connection(&self) -> Result<rustls::ServerConnection, ReactorError> {
        Ok(rustls::ServerConnection::new(Arc::clone(&self.server_config))?)
    }
}
