//! HTTP Basic Auth for the private socket. Three acceptance paths — cookie file,
//! single configured user:pass, or a list of `name:salt$hmac` entries — all compared in
//! constant time via `subtle` so a timing side channel can't leak how much of the
//! candidate matched.

use std::fs;
use std::path::Path;

use hmac::{Hmac, Mac};
use sha2::Sha256;
use subtle::ConstantTimeEq;

use crate::config::{AuthConfig, HmacEntry};
use crate::error::AuthError;

pub struct BasicAuthVerifier {
    cookie_secret: Option<String>,
    configured_user: Option<String>,
    configured_pass: Option<String>,
    hmac_entries: Vec<HmacEntry>,
}

impl BasicAuthVerifier {
    pub fn from_config(config: &AuthConfig) -> Result<BasicAuthVerifier, AuthError> {
        let cookie_secret = match &config.cookie_path {
            Some(path) => Some(load_or_create_cookie(path)?),
            None => None,
        };
        Ok(BasicAuthVerifier {
            cookie_secret,
            configured_user: config.configured_user.clone(),
            configured_pass: config.configured_pass.clone(),
            hmac_entries: config.hmac_entries.clone(),
        })
    }

    /// `credentials` is `(user, pass)` as decoded from the `Authorization: Basic` header.
    pub fn verify(&self, credentials: Option<(String, String)>) -> Result<(), AuthError> {
        let (user, pass) = credentials.ok_or(AuthError::MissingCredentials)?;

        if let Some(secret) = &self.cookie_secret {
            if constant_time_eq(&pass, secret) {
                return Ok(());
            }
        }

        if let (Some(configured_user), Some(configured_pass)) = (&self.configured_user, &self.configured_pass) {
            if constant_time_eq(&user, configured_user) & constant_time_eq(&pass, configured_pass) {
                return Ok(());
            }
        }

        for entry in &self.hmac_entries {
            if !constant_time_eq(&user, &entry.name) {
                continue;
            }
            if let Ok(computed) = hmac_hex(&entry.salt, &pass) {
                if constant_time_eq(&computed, &entry.hmac_hex) {
                    return Ok(());
                }
            }
        }

        Err(AuthError::Rejected)
    }
}

fn constant_time_eq(a: &str, b: &str) -> bool {
    // Length differences are themselves observable, but the candidate's byte-by-byte
    // match against the secret never short-circuits.
    if a.len() != b.len() {
        return false;
    }
    a.as_bytes().ct_eq(b.as_bytes()).into()
}

fn hmac_hex(salt: &str, password: &str) -> Result<String, hmac::digest::InvalidLength> {
    let mut mac = Hmac::<Sha256>::new_from_slice(salt.as_bytes())?;
    mac.update(password.as_bytes());
    Ok(hex::encode(mac.finalize().into_bytes()))
}

fn load_or_create_cookie(path: &Path) -> Result<String, AuthError> {
    match fs::read_to_string(path) {
        Ok(contents) => Ok(contents.trim().to_string()),
        Err(_) => {
            let secret = hex::encode(rand::random::<[u8; 24]>());
            fs::write(path, &secret).map_err(|source| AuthError::CookieFile {
                path: path.display().to_string(),
                source,
            })?;
            Ok(secret)
        }
    }
}
