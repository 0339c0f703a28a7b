// SPDX-License-Identifier: AGPL-3.0-or-later

//! # Authentication Settings
//!
//! Explicit, host-constructed configuration for the verification pipeline.
//! Hosts either build an [`AuthSettings`] programmatically or load it from
//! the environment at startup.
//!
//! ## Environment Variables
//!
//! | Variable | Description | Default |
//! |----------|-------------|---------|
//! | `AUTH_SIGNING_KEY` | Inline HMAC verification secret | Optional |
//! | `AUTH_SIGNING_KEY_PEM` | Inline RSA public key (PEM) | Optional |
//! | `AUTH_SIGNING_KEY_PEM_PATH` | Path to an RSA public key (PEM) | Optional |
//! | `AUTH_JWKS_ENDPOINT` | JWKS endpoint for RS256 key resolution | Optional |
//! | `AUTH_PERMISSION_ENDPOINT` | Permission service for authorization data | Optional |
//! | `AUTH_SERVICE_SECRET` | Shared secret for the service identity path | Optional |
//! | `AUTH_AUDIENCE` | Expected JWT audience claim | Optional |
//! | `AUTH_VERIFY_AUD` | Audience verification toggle (`true`/`false`) | `true` |

use std::{env, fs};

use crate::decoder::StaticKey;
use crate::error::AuthError;

/// Configuration surface for token verification and identity resolution.
#[derive(Clone)]
pub struct AuthSettings {
    /// Static verification keys, tried in order.
    pub keys: Vec<StaticKey>,
    /// JWKS endpoint URL for resolving RS256 keys by `kid`.
    pub jwks_endpoint: Option<String>,
    /// Permission endpoint URL for authorization enrichment.
    pub permission_endpoint: Option<String>,
    /// Shared secret for the service identity path; also authenticates the
    /// outbound permission call.
    pub service_secret: Option<String>,
    /// Audience verification toggle for the JWKS path.
    pub verify_aud: bool,
    /// Expected audience claim.
    pub audience: Option<String>,
}

impl Default for AuthSettings {
    fn default() -> Self {
        Self {
            keys: Vec::new(),
            jwks_endpoint: None,
            permission_endpoint: None,
            service_secret: None,
            verify_aud: true,
            audience: None,
        }
    }
}

impl AuthSettings {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a static verification key.
    pub fn with_key(mut self, key: StaticKey) -> Self {
        self.keys.push(key);
        self
    }

    pub fn with_jwks_endpoint(mut self, url: impl Into<String>) -> Self {
        self.jwks_endpoint = Some(url.into());
        self
    }

    pub fn with_permission_endpoint(mut self, url: impl Into<String>) -> Self {
        self.permission_endpoint = Some(url.into());
        self
    }

    pub fn with_service_secret(mut self, secret: impl Into<String>) -> Self {
        self.service_secret = Some(secret.into());
        self
    }

    pub fn with_audience(mut self, audience: impl Into<String>) -> Self {
        self.audience = Some(audience.into());
        self
    }

    pub fn verify_aud(mut self, verify: bool) -> Self {
        self.verify_aud = verify;
        self
    }

    /// Load settings from the environment.
    ///
    /// Key material may be supplied inline (`AUTH_SIGNING_KEY`,
    /// `AUTH_SIGNING_KEY_PEM`) or by path (`AUTH_SIGNING_KEY_PEM_PATH`);
    /// the inline PEM wins when both are set.
    pub fn from_env() -> Result<Self, AuthError> {
        let mut settings = Self::default();

        if let Some(secret) = env_optional("AUTH_SIGNING_KEY") {
            settings.keys.push(StaticKey::secret(secret.as_bytes()));
        }
        if let Some(pem) = env_optional("AUTH_SIGNING_KEY_PEM") {
            settings.keys.push(StaticKey::rsa_pem(pem.as_bytes())?);
        } else if let Some(path) = env_optional("AUTH_SIGNING_KEY_PEM_PATH") {
            let pem = fs::read_to_string(&path).map_err(|e| {
                AuthError::ConfigurationError(format!("failed to read {path}: {e}"))
            })?;
            settings.keys.push(StaticKey::rsa_pem(pem.as_bytes())?);
        }

        settings.jwks_endpoint = env_optional("AUTH_JWKS_ENDPOINT");
        settings.permission_endpoint = env_optional("AUTH_PERMISSION_ENDPOINT");
        settings.service_secret = env_optional("AUTH_SERVICE_SECRET");
        settings.audience = env_optional("AUTH_AUDIENCE");
        settings.verify_aud = env_flag("AUTH_VERIFY_AUD", true);

        Ok(settings)
    }
}

fn env_optional(name: &str) -> Option<String> {
    env::var(name).ok().filter(|v| !v.is_empty())
}

fn env_flag(name: &str, default: bool) -> bool {
    match env_optional(name).as_deref() {
        Some("true") | Some("1") => true,
        Some("false") | Some("0") => false,
        _ => default,
    }
}
