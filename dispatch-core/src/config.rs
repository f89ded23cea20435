//! Layered configuration: compiled-in defaults, an optional TOML file, then
//! `DISPATCH_`-prefixed environment variables, in that order — the same
//! defaults-then-file-then-env layering `cloud-common`'s `MergedConfigLoader` gives each
//! service, built directly on `figment` rather than through that wrapper.

use std::collections::HashMap;
use std::net::IpAddr;
use std::path::{Path, PathBuf};

use figment::providers::{Env, Format, Serialized, Toml};
use figment::Figment;
use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SocketConfig {
    pub bind_hosts: Vec<IpAddr>,
    pub port: u16,
    /// Bypasses the ACL for connections accepted on this socket.
    pub public_access: bool,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct AclEntry {
    pub network: IpAddr,
    pub prefix_len: u8,
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct AclConfig {
    /// Extra CIDR entries allowed on the private socket, beyond loopback.
    pub allowed_cidrs: Vec<AclEntry>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct HmacEntry {
    pub name: String,
    pub salt: String,
    pub hmac_hex: String,
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct AuthConfig {
    pub cookie_path: Option<PathBuf>,
    pub configured_user: Option<String>,
    pub configured_pass: Option<String>,
    pub hmac_entries: Vec<HmacEntry>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct PodConfig {
    pub max_depth: Option<usize>,
    pub thread_count: usize,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct NotificationConfig {
    pub thread_count: usize,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct DispatchConfig {
    pub private_rpc: SocketConfig,
    pub public_web: SocketConfig,
    pub public_web_tls: SocketConfig,
    pub static_assets: SocketConfig,
    pub rest: SocketConfig,
    pub acl: AclConfig,
    pub auth: AuthConfig,
    pub pods: HashMap<String, PodConfig>,
    pub notification: NotificationConfig,
    pub http_timeout_secs: u64,
}

impl Default for DispatchConfig {
    fn default() -> Self {
        DispatchConfig {
            private_rpc: SocketConfig {
                bind_hosts: vec![IpAddr::from([127, 0, 0, 1])],
                port: 8893,
                public_access: false,
            },
            public_web: SocketConfig {
                bind_hosts: vec![IpAddr::from([0, 0, 0, 0])],
                port: 8899,
                public_access: true,
            },
            public_web_tls: SocketConfig {
                bind_hosts: vec![IpAddr::from([0, 0, 0, 0])],
                port: 8098,
                public_access: true,
            },
            static_assets: SocketConfig {
                bind_hosts: vec![IpAddr::from([0, 0, 0, 0])],
                port: 8080,
                public_access: true,
            },
            rest: SocketConfig {
                bind_hosts: vec![IpAddr::from([0, 0, 0, 0])],
                port: 8087,
                public_access: true,
            },
            acl: AclConfig::default(),
            auth: AuthConfig::default(),
            pods: HashMap::new(),
            notification: NotificationConfig { thread_count: 4 },
            http_timeout_secs: 30,
        }
    }
}

impl DispatchConfig {
    /// Loads defaults, merges an optional TOML file, then `DISPATCH_`-prefixed env vars.
    /// `config_path` need not exist — a missing file is treated as "no overrides".
    pub fn load(config_path: impl AsRef<Path>) -> Result<DispatchConfig, ConfigError> {
        let config: DispatchConfig = Figment::new()
            .merge(Serialized::defaults(DispatchConfig::default()))
            .merge(Toml::file(config_path.as_ref()))
            .merge(Env::prefixed("DISPATCH_").split("__"))
            .extract()?;
        config.validate()?;
        Ok(config)
    }

    /// Per §6: configuring allowed CIDRs without explicit private-socket bind hosts (or
    /// vice versa) would silently broaden access beyond what the operator asked for, so
    /// this is refused rather than guessed at.
    fn validate(&self) -> Result<(), ConfigError> {
        let has_cidrs = !self.acl.allowed_cidrs.is_empty();
        let has_explicit_binds = !self.private_rpc.bind_hosts.is_empty()
            && self.private_rpc.bind_hosts != vec![IpAddr::from([127, 0, 0, 1])];
        if has_cidrs != has_explicit_binds {
            return Err(ConfigError::InconsistentPrivateAcl {
                cidrs: self.acl.allowed_cidrs.len(),
            });
        }
        Ok(())
    }
}
