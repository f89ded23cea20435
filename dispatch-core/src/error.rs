//! Error types for each module boundary. `thiserror` enums at the seams, `anyhow` (in
//! the `dispatch-node` binary only) at the very top.

use std::io;
use std::net::SocketAddr;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to load configuration: {0}")]
    Load(#[from] figment::Error),

    #[error(
        "private RPC socket has allowed CIDRs configured ({cidrs}) but no explicit bind \
         hosts (or vice versa) — refusing to broaden access implicitly"
    )]
    InconsistentPrivateAcl { cidrs: usize },
}

#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    #[error("missing Authorization header")]
    MissingCredentials,

    #[error("malformed Authorization header")]
    MalformedHeader,

    #[error("credentials did not match")]
    Rejected,

    #[error("failed to read cookie file at {path}: {source}")]
    CookieFile {
        path: String,
        #[source]
        source: io::Error,
    },
}

#[derive(Debug, thiserror::Error)]
pub enum ReactorError {
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("TLS error: {0}")]
    Tls(#[from] rustls::Error),

    #[error("certificate generation failed: {0}")]
    CertGen(#[from] rcgen::Error),

    #[error("request header section exceeded the {limit}-byte cap")]
    HeaderTooLarge { limit: usize },

    #[error("request body exceeded the configured size cap of {limit} bytes")]
    BodyTooLarge { limit: usize },

    #[error("malformed HTTP request: {0}")]
    MalformedRequest(String),

    #[error("connection from {peer} rejected by ACL")]
    AclDenied { peer: SocketAddr },

    #[error("no listener is bound for socket {name}")]
    NoSuchSocket { name: String },
}

#[derive(Debug, thiserror::Error)]
pub enum DispatchError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Reactor(#[from] ReactorError),

    #[error(transparent)]
    Auth(#[from] AuthError),

    #[error("reply already sent for this request")]
    AlreadyReplied,

    #[error("handler panicked: {0}")]
    HandlerPanicked(String),
}
