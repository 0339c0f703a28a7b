// SPDX-License-Identifier: AGPL-3.0-or-later

//! JWKS (JSON Web Key Set) fetching, caching, and key lookup.
//!
//! ## Lifecycle
//!
//! The cache starts empty and is populated by a single lazy fetch on the
//! first lookup. A successful fetch (even of an empty key set) is kept for
//! the lifetime of the process; a failed fetch is retried on a later
//! request once a backoff window has elapsed, and fails fast in between.
//!
//! ## Concurrency
//!
//! The cold path is single-flight: a `Mutex` serializes the first fetch so
//! concurrent first lookups produce at most one outbound request. The
//! in-between "fetching" state of the cache lifecycle is represented by
//! that held lock rather than by a stored variant.
//!
//! ## Security
//!
//! Lookup matches `kid` exactly. An entry that declares an `alg` differing
//! from the token header's algorithm fails the lookup loudly instead of
//! falling back to other keys.

use std::sync::Arc;
use std::time::{Duration, Instant};

use jsonwebtoken::jwk::{AlgorithmParameters, Jwk, JwkSet, KeyAlgorithm};
use jsonwebtoken::{Algorithm, DecodingKey, Header};
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, warn};

use crate::error::AuthError;

/// How long a failed fetch suppresses retries.
const FETCH_RETRY_BACKOFF: Duration = Duration::from_secs(30);

/// Timeout for the outbound JWKS request.
const HTTP_TIMEOUT: Duration = Duration::from_secs(10);

/// Cache lifecycle state.
enum CacheState {
    /// No fetch attempted yet.
    Empty,
    /// Key set fetched and retained for the process lifetime.
    Cached(JwkSet),
    /// Last fetch failed; retried after [`FETCH_RETRY_BACKOFF`].
    FetchFailed { at: Instant },
}

/// Cache of verification keys fetched from a remote JWKS endpoint.
///
/// Constructed once and injected into [`TokenDecoder`](crate::TokenDecoder).
/// With no endpoint configured every lookup is a no-op returning `None`.
#[derive(Clone)]
pub struct KeySetCache {
    endpoint: Option<String>,
    state: Arc<RwLock<CacheState>>,
    fetch_guard: Arc<Mutex<()>>,
    client: reqwest::Client,
}

impl KeySetCache {
    /// Create a new cache for the given JWKS endpoint.
    pub fn new(endpoint: Option<String>) -> Self {
        Self {
            endpoint,
            state: Arc::new(RwLock::new(CacheState::Empty)),
            fetch_guard: Arc::new(Mutex::new(())),
            client: reqwest::Client::builder()
                .timeout(HTTP_TIMEOUT)
                .build()
                .expect("Failed to create HTTP client"),
        }
    }

    /// Create a cache that never consults a remote endpoint.
    pub fn disabled() -> Self {
        Self::new(None)
    }

    /// The configured JWKS endpoint, if any.
    pub fn endpoint(&self) -> Option<&str> {
        self.endpoint.as_deref()
    }

    /// Resolve the token header against the key set.
    ///
    /// Returns `Ok(None)` when no endpoint is configured, the header carries
    /// no `kid`, or no entry matches — callers fall back to static keys.
    /// Fails with [`AuthError::AlgorithmMismatch`] when the matched entry
    /// declares an algorithm other than the header's.
    pub async fn resolve(&self, header: &Header) -> Result<Option<DecodingKey>, AuthError> {
        let Some(endpoint) = self.endpoint.as_deref() else {
            return Ok(None);
        };
        let Some(kid) = header.kid.as_deref() else {
            return Ok(None);
        };

        let jwks = self.keyset(endpoint).await?;

        let Some(jwk) = jwks
            .keys
            .iter()
            .find(|k| k.common.key_id.as_deref() == Some(kid))
        else {
            debug!(kid, "no key set entry matches token kid");
            return Ok(None);
        };

        if let Some(declared) = jwk.common.key_algorithm {
            if expected_key_algorithm(header.alg) != Some(declared) {
                warn!(kid, ?declared, "key set entry algorithm disagrees with token header");
                return Err(AuthError::AlgorithmMismatch);
            }
        }

        decoding_key(jwk).map(Some)
    }

    /// Whether a key set is currently cached.
    pub async fn is_cached(&self) -> bool {
        matches!(&*self.state.read().await, CacheState::Cached(_))
    }

    /// Get the key set, fetching it once on the cold path.
    async fn keyset(&self, endpoint: &str) -> Result<JwkSet, AuthError> {
        if let Some(result) = self.cached().await {
            return result;
        }

        // Cold path: serialize the fetch, then re-check under the lock so
        // only the first caller actually goes to the network.
        let _guard = self.fetch_guard.lock().await;
        if let Some(result) = self.cached().await {
            return result;
        }

        match self.fetch(endpoint).await {
            Ok(jwks) => {
                debug!(endpoint, keys = jwks.keys.len(), "fetched key set");
                *self.state.write().await = CacheState::Cached(jwks.clone());
                Ok(jwks)
            }
            Err(err) => {
                warn!(endpoint, error = %err, "key set fetch failed");
                *self.state.write().await = CacheState::FetchFailed { at: Instant::now() };
                Err(err)
            }
        }
    }

    /// Consult the cache state without fetching.
    async fn cached(&self) -> Option<Result<JwkSet, AuthError>> {
        match &*self.state.read().await {
            CacheState::Cached(jwks) => Some(Ok(jwks.clone())),
            CacheState::FetchFailed { at } if at.elapsed() < FETCH_RETRY_BACKOFF => {
                Some(Err(AuthError::KeySetUnavailable(
                    "previous fetch failed, retry pending".to_string(),
                )))
            }
            _ => None,
        }
    }

    /// Fetch the JWKS document from the endpoint.
    async fn fetch(&self, endpoint: &str) -> Result<JwkSet, AuthError> {
        let response = self
            .client
            .get(endpoint)
            .send()
            .await
            .map_err(|e| AuthError::KeySetUnavailable(e.to_string()))?;

        if !response.status().is_success() {
            return Err(AuthError::KeySetUnavailable(format!(
                "HTTP {} from JWKS endpoint",
                response.status()
            )));
        }

        response
            .json()
            .await
            .map_err(|e| AuthError::KeySetUnavailable(e.to_string()))
    }
}

/// The JWK algorithm a token with the given header algorithm must match.
fn expected_key_algorithm(alg: Algorithm) -> Option<KeyAlgorithm> {
    match alg {
        Algorithm::RS256 => Some(KeyAlgorithm::RS256),
        Algorithm::RS384 => Some(KeyAlgorithm::RS384),
        Algorithm::RS512 => Some(KeyAlgorithm::RS512),
        Algorithm::HS256 => Some(KeyAlgorithm::HS256),
        _ => None,
    }
}

/// Build a decoding key from a JWKS entry.
fn decoding_key(jwk: &Jwk) -> Result<DecodingKey, AuthError> {
    match &jwk.algorithm {
        AlgorithmParameters::RSA(rsa) => DecodingKey::from_rsa_components(&rsa.n, &rsa.e)
            .map_err(|e| AuthError::KeySetUnavailable(format!("invalid RSA key material: {e}"))),
        _ => Err(AuthError::KeySetUnavailable(
            "unsupported key type in key set".to_string(),
        )),
    }
}
