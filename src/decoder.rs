// SPDX-License-Identifier: AGPL-3.0-or-later

//! Token decoding and signature verification.
//!
//! Verification tries a JWKS-resolved key first for RS256 tokens, then the
//! statically configured keys in order. The static loop distinguishes "this
//! key is wrong" (signature mismatch, try the next key) from "this token is
//! broken" (expired, malformed, bad audience — abort immediately). Exactly
//! one successful verification path produces the claim set.

use jsonwebtoken::{decode, decode_header, Algorithm, DecodingKey, Validation};
use tracing::debug;

use crate::claims::Claims;
use crate::error::AuthError;
use crate::jwks::KeySetCache;

/// A statically configured verification key.
///
/// Either an HMAC secret (serves HS256 tokens) or an RSA public key in PEM
/// form (serves RS256 tokens). Identified only by its position in the
/// configured list.
#[derive(Clone)]
pub struct StaticKey {
    key: DecodingKey,
    algorithm: Algorithm,
}

impl StaticKey {
    /// An HMAC-SHA256 shared secret.
    pub fn secret(secret: impl AsRef<[u8]>) -> Self {
        Self {
            key: DecodingKey::from_secret(secret.as_ref()),
            algorithm: Algorithm::HS256,
        }
    }

    /// An RSA public key in PEM form.
    pub fn rsa_pem(pem: impl AsRef<[u8]>) -> Result<Self, AuthError> {
        let key = DecodingKey::from_rsa_pem(pem.as_ref())
            .map_err(|e| AuthError::ConfigurationError(format!("invalid RSA PEM key: {e}")))?;
        Ok(Self {
            key,
            algorithm: Algorithm::RS256,
        })
    }

    /// Parse key material: PEM blocks become RSA keys, anything else is
    /// treated as an HMAC secret.
    pub fn parse(material: &str) -> Result<Self, AuthError> {
        if material.contains("-----BEGIN") {
            Self::rsa_pem(material.as_bytes())
        } else {
            Ok(Self::secret(material.as_bytes()))
        }
    }

    /// The algorithm this key can verify.
    pub fn algorithm(&self) -> Algorithm {
        self.algorithm
    }
}

impl std::fmt::Debug for StaticKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StaticKey")
            .field("algorithm", &self.algorithm)
            .finish_non_exhaustive()
    }
}

/// Verifies raw tokens against static keys and the JWKS cache.
#[derive(Clone)]
pub struct TokenDecoder {
    keys: Vec<StaticKey>,
    keyset: KeySetCache,
    verify_aud: bool,
    audience: Option<String>,
}

impl TokenDecoder {
    /// Create a decoder over the given static keys and key set cache.
    pub fn new(keys: Vec<StaticKey>, keyset: KeySetCache) -> Self {
        Self {
            keys,
            keyset,
            verify_aud: true,
            audience: None,
        }
    }

    /// Toggle audience verification on the JWKS path (default on).
    pub fn verify_aud(mut self, verify: bool) -> Self {
        self.verify_aud = verify;
        self
    }

    /// Set the expected audience claim.
    pub fn with_audience(mut self, audience: impl Into<String>) -> Self {
        self.audience = Some(audience.into());
        self
    }

    /// Verify the token signature and return the claim set.
    ///
    /// RS256 tokens are checked against the key set first; a `kid` miss
    /// falls back to the static key list. Only the unverified header is
    /// read before a key has validated the signature.
    pub async fn verify(&self, token: &str) -> Result<Claims, AuthError> {
        let header = decode_header(token).map_err(|_| AuthError::MalformedToken)?;

        if header.alg == Algorithm::RS256 {
            if let Some(key) = self.keyset.resolve(&header).await? {
                debug!(kid = header.kid.as_deref(), "verifying with key set entry");
                return self.verify_resolved(token, &key);
            }
        }

        self.verify_static(token, header.alg)
    }

    /// Verify with a single JWKS-resolved key. No fallback on failure.
    fn verify_resolved(&self, token: &str, key: &DecodingKey) -> Result<Claims, AuthError> {
        let mut validation = base_validation(Algorithm::RS256);
        if self.verify_aud {
            if let Some(audience) = &self.audience {
                validation.validate_aud = true;
                validation.set_audience(&[audience]);
            }
        }

        let data = decode::<Claims>(token, key, &validation).map_err(map_decode_error)?;
        Ok(data.claims)
    }

    /// Try the static keys in configured order.
    fn verify_static(&self, token: &str, alg: Algorithm) -> Result<Claims, AuthError> {
        if self.keys.is_empty() {
            return Err(AuthError::ConfigurationError(
                "no verification keys configured".to_string(),
            ));
        }

        for key in &self.keys {
            // A key that cannot serve the token's declared algorithm is the
            // wrong key, same as a signature mismatch.
            if key.algorithm != alg {
                continue;
            }

            let validation = base_validation(alg);
            match decode::<Claims>(token, &key.key, &validation) {
                Ok(data) => return Ok(data.claims),
                Err(e)
                    if matches!(
                        e.kind(),
                        jsonwebtoken::errors::ErrorKind::InvalidSignature
                    ) =>
                {
                    continue;
                }
                Err(e) => return Err(map_decode_error(e)),
            }
        }

        Err(AuthError::SignatureInvalid)
    }
}

/// Validation with the crate's claim requirements: `exp` is honored when
/// present but not mandated, audience is off unless explicitly configured.
fn base_validation(alg: Algorithm) -> Validation {
    let mut validation = Validation::new(alg);
    validation.required_spec_claims = Default::default();
    validation.validate_aud = false;
    validation
}

fn map_decode_error(err: jsonwebtoken::errors::Error) -> AuthError {
    use jsonwebtoken::errors::ErrorKind;
    match err.kind() {
        ErrorKind::InvalidSignature => AuthError::SignatureInvalid,
        ErrorKind::ExpiredSignature => AuthError::TokenExpired,
        ErrorKind::InvalidAudience => AuthError::InvalidAudience,
        _ => AuthError::MalformedToken,
    }
}
