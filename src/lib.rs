// SPDX-License-Identifier: AGPL-3.0-or-later

//! jwt-identity - Token Verification & Identity Resolution
//!
//! Per-request authentication hook for axum services. Inbound bearer
//! tokens are verified against statically configured keys or a remotely
//! fetched JWKS, the verified claims are enriched with authorization data
//! from a permission service, and the result is assembled into an
//! [`Identity`] with role and subscription semantics. A parallel path
//! grants a fixed service identity to requests presenting a shared secret.
//!
//! ## Modules
//!
//! - `config` - Settings surface ([`AuthSettings`], environment loading)
//! - `decoder` - Token signature verification ([`TokenDecoder`])
//! - `jwks` - JWKS fetching, caching, and key lookup ([`KeySetCache`])
//! - `authorization` - Remote permission lookup ([`AuthorizationClient`])
//! - `identity` - The resolved principal ([`Identity`])
//! - `service` - Service-secret authentication ([`ServiceAuthenticator`])
//! - `extractor` - Axum integration ([`Auth`], [`OptionalAuth`])

pub mod authorization;
pub mod claims;
pub mod config;
pub mod decoder;
pub mod error;
pub mod extractor;
pub mod identity;
pub mod jwks;
pub mod service;

pub use authorization::{AuthorizationClient, AuthorizationPayload};
pub use claims::Claims;
pub use config::AuthSettings;
pub use decoder::{StaticKey, TokenDecoder};
pub use error::AuthError;
pub use extractor::{Auth, AuthRejection, AuthState, OptionalAuth};
pub use identity::{Identity, SubscriptionState};
pub use jwks::KeySetCache;
pub use service::ServiceAuthenticator;
