// SPDX-License-Identifier: AGPL-3.0-or-later

//! Remote authorization lookup.
//!
//! After signature verification succeeds, the verified subject is looked up
//! against a permission endpoint. The outbound call authenticates itself
//! with a static service-to-service token in the `Token` header — a
//! distinct credential from the inbound request's bearer token.

use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Deserialize;
use serde_json::{Map, Value};
use tracing::debug;
use uuid::Uuid;

use crate::error::AuthError;

/// Timeout for the outbound permission request.
const HTTP_TIMEOUT: Duration = Duration::from_secs(10);

/// Header carrying the service credential on the outbound call.
pub(crate) const SERVICE_TOKEN_HEADER: &str = "Token";

/// Role data attached to an authorization payload.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RoleFlags {
    #[serde(default)]
    pub is_staff: bool,
    #[serde(default)]
    pub is_superuser: bool,
    #[serde(default)]
    pub groups: Vec<String>,
}

/// Status of a single current subscription.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SubscriptionStatus {
    Active,
    Inactive,
}

/// The single-current-subscription wire shape.
#[derive(Debug, Clone, Deserialize)]
pub struct CurrentSubscription {
    pub plan: String,
    pub status: SubscriptionStatus,
    #[serde(default)]
    pub start_date_time: Option<DateTime<Utc>>,
    #[serde(default)]
    pub end_date_time: Option<DateTime<Utc>>,
}

/// One entry of the historical-subscription-list wire shape.
#[derive(Debug, Clone, Deserialize)]
pub struct SubscriptionRecord {
    #[serde(rename = "type")]
    pub name: String,
    pub is_expired: bool,
}

/// Authorization data fetched for a verified subject.
///
/// The two subscription shapes are carried side by side; a deployment's
/// permission service populates one of them. Unrecognized fields flow into
/// `extra` and end up in the identity's property bag.
#[derive(Debug, Clone, Deserialize)]
pub struct AuthorizationPayload {
    pub is_active: bool,
    #[serde(default)]
    pub role: RoleFlags,
    #[serde(default)]
    pub subscription: Option<CurrentSubscription>,
    #[serde(default)]
    pub subscriptions: Option<Vec<SubscriptionRecord>>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Client for the remote permission endpoint.
///
/// With no endpoint configured the lookup is skipped entirely and claims
/// alone populate the identity.
#[derive(Clone)]
pub struct AuthorizationClient {
    endpoint: Option<String>,
    service_token: Option<String>,
    client: reqwest::Client,
}

impl AuthorizationClient {
    /// Create a client for the given permission endpoint.
    pub fn new(endpoint: Option<String>, service_token: Option<String>) -> Self {
        Self {
            endpoint,
            service_token,
            client: reqwest::Client::builder()
                .timeout(HTTP_TIMEOUT)
                .build()
                .expect("Failed to create HTTP client"),
        }
    }

    /// Create a client that never performs a lookup.
    pub fn disabled() -> Self {
        Self::new(None, None)
    }

    /// Fetch authorization data for the verified subject.
    ///
    /// Returns `Ok(None)` when no endpoint is configured. A non-success
    /// response is a hard failure; no retries are performed here.
    pub async fn fetch(&self, subject: &Uuid) -> Result<Option<AuthorizationPayload>, AuthError> {
        let Some(endpoint) = self.endpoint.as_deref() else {
            return Ok(None);
        };

        let mut request = self
            .client
            .get(endpoint)
            .query(&[("uuid", subject.to_string())]);
        if let Some(token) = &self.service_token {
            request = request.header(SERVICE_TOKEN_HEADER, token);
        }

        let response = request
            .send()
            .await
            .map_err(|e| AuthError::AuthorizationUnavailable(e.to_string()))?;

        if !response.status().is_success() {
            return Err(AuthError::AuthorizationUnavailable(format!(
                "HTTP {} from permission endpoint",
                response.status()
            )));
        }

        let payload: AuthorizationPayload = response
            .json()
            .await
            .map_err(|e| AuthError::AuthorizationUnavailable(e.to_string()))?;

        debug!(%subject, is_active = payload.is_active, "fetched authorization data");
        Ok(Some(payload))
    }
}
