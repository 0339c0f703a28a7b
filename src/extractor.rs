// SPDX-License-Identifier: AGPL-3.0-or-later

//! Axum extractors for the verification pipeline.
//!
//! Use the `Auth` extractor in handlers to require an identity:
//!
//! ```rust,ignore
//! async fn my_handler(Auth(identity): Auth) -> impl IntoResponse {
//!     // identity is a fully resolved Identity
//! }
//! ```
//!
//! Two inbound credential paths are recognized, mutually exclusive in
//! practice: the `Token` header carrying the service secret, and the
//! `Authorization` header with the `JWT ` prefix. Absence of both is the
//! "no credential presented" outcome — `Auth` rejects it, `OptionalAuth`
//! yields `None`.

use axum::{
    extract::{FromRef, FromRequestParts},
    http::{
        header::{AUTHORIZATION, HOST, WWW_AUTHENTICATE},
        request::Parts,
        HeaderMap, HeaderValue,
    },
    response::{IntoResponse, Response},
};

use crate::authorization::{AuthorizationClient, SERVICE_TOKEN_HEADER};
use crate::claims::Claims;
use crate::config::AuthSettings;
use crate::decoder::TokenDecoder;
use crate::error::AuthError;
use crate::identity::Identity;
use crate::jwks::KeySetCache;
use crate::service::ServiceAuthenticator;

/// Prefix identifying a bearer token in the `Authorization` header.
const TOKEN_PREFIX: &str = "JWT ";

/// Shared state for the verification pipeline.
///
/// Built once from [`AuthSettings`] and stored in (or referenced from) the
/// host's application state.
#[derive(Clone)]
pub struct AuthState {
    decoder: TokenDecoder,
    authorization: AuthorizationClient,
    service: ServiceAuthenticator,
}

impl AuthState {
    /// Wire up the pipeline from settings.
    pub fn new(settings: AuthSettings) -> Self {
        let keyset = KeySetCache::new(settings.jwks_endpoint.clone());
        let mut decoder =
            TokenDecoder::new(settings.keys, keyset).verify_aud(settings.verify_aud);
        if let Some(audience) = settings.audience {
            decoder = decoder.with_audience(audience);
        }

        Self {
            decoder,
            authorization: AuthorizationClient::new(
                settings.permission_endpoint,
                settings.service_secret.clone(),
            ),
            service: ServiceAuthenticator::new(settings.service_secret),
        }
    }

    /// Run both credential paths against the request headers.
    ///
    /// `Ok(None)` means no credential was presented; any other failure is a
    /// hard authentication failure.
    pub async fn authenticate(&self, headers: &HeaderMap) -> Result<Option<Identity>, AuthError> {
        let presented = headers
            .get(SERVICE_TOKEN_HEADER)
            .and_then(|v| v.to_str().ok());
        if let Some(identity) = self.service.authenticate(presented)? {
            return Ok(Some(identity));
        }

        let Some(token) = bearer_token(headers) else {
            return Ok(None);
        };

        let claims = self.decoder.verify(token).await?;
        self.resolve(claims).await.map(Some)
    }

    /// Enrich verified claims and assemble the identity.
    async fn resolve(&self, claims: Claims) -> Result<Identity, AuthError> {
        let subject = claims.subject().ok_or(AuthError::MissingSubject)?;
        let authorization = self.authorization.fetch(&subject).await?;
        Identity::assemble(claims, authorization)
    }
}

/// The token from the `Authorization: JWT <token>` header, if presented.
fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    headers
        .get(AUTHORIZATION)?
        .to_str()
        .ok()?
        .strip_prefix(TOKEN_PREFIX)
}

/// Challenge value for authentication failures: the login URL derived from
/// the request host with a leading `www.` stripped.
pub fn login_challenge(host: &str) -> String {
    let host = host.strip_prefix("www.").unwrap_or(host);
    format!("aps.{host}/user/accounts/login/")
}

/// Rejection carrying the error response plus the challenge header.
#[derive(Debug)]
pub struct AuthRejection {
    pub error: AuthError,
    challenge: Option<String>,
}

impl AuthRejection {
    fn new(error: AuthError, parts: &Parts) -> Self {
        let challenge = parts
            .headers
            .get(HOST)
            .and_then(|v| v.to_str().ok())
            .map(login_challenge);
        Self { error, challenge }
    }
}

impl IntoResponse for AuthRejection {
    fn into_response(self) -> Response {
        let mut response = self.error.into_response();
        if let Some(challenge) = self
            .challenge
            .as_deref()
            .and_then(|c| HeaderValue::from_str(c).ok())
        {
            response.headers_mut().insert(WWW_AUTHENTICATE, challenge);
        }
        response
    }
}

/// Extractor requiring a resolved identity.
///
/// Rejects with 401 and the challenge header when no credential is
/// presented or verification fails.
#[derive(Debug)]
pub struct Auth(pub Identity);

impl<S> FromRequestParts<S> for Auth
where
    AuthState: FromRef<S>,
    S: Send + Sync,
{
    type Rejection = AuthRejection;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        // Honor identities pre-set by host middleware.
        if let Some(identity) = parts.extensions.get::<Identity>().cloned() {
            return Ok(Auth(identity));
        }

        let auth = AuthState::from_ref(state);
        match auth.authenticate(&parts.headers).await {
            Ok(Some(identity)) => Ok(Auth(identity)),
            Ok(None) => Err(AuthRejection::new(AuthError::MissingCredentials, parts)),
            Err(error) => Err(AuthRejection::new(error, parts)),
        }
    }
}

/// Optional authentication extractor.
///
/// Yields `None` when no credential is presented. Presented-but-invalid
/// credentials still reject: verification is all-or-nothing.
#[derive(Debug)]
pub struct OptionalAuth(pub Option<Identity>);

impl<S> FromRequestParts<S> for OptionalAuth
where
    AuthState: FromRef<S>,
    S: Send + Sync,
{
    type Rejection = AuthRejection;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        if let Some(identity) = parts.extensions.get::<Identity>().cloned() {
            return Ok(OptionalAuth(Some(identity)));
        }

        let auth = AuthState::from_ref(state);
        match auth.authenticate(&parts.headers).await {
            Ok(identity) => Ok(OptionalAuth(identity)),
            Err(error) => Err(AuthRejection::new(error, parts)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::Request;
    use jsonwebtoken::{encode, Algorithm, EncodingKey, Header};
    use serde_json::json;
    use uuid::Uuid;

    use crate::decoder::StaticKey;

    fn test_state() -> AuthState {
        AuthState::new(
            AuthSettings::new()
                .with_key(StaticKey::secret(b"really secret key"))
                .with_key(StaticKey::secret(b"a super secret key"))
                .with_service_secret("super secret"),
        )
    }

    fn sign_hs256(secret: &str, claims: &serde_json::Value) -> String {
        encode(
            &Header::new(Algorithm::HS256),
            claims,
            &EncodingKey::from_secret(secret.as_bytes()),
        )
        .unwrap()
    }

    fn parts(builder: axum::http::request::Builder) -> Parts {
        builder.body(()).unwrap().into_parts().0
    }

    #[tokio::test]
    async fn no_credential_rejects_required_auth() {
        let state = test_state();
        let mut parts = parts(Request::builder().uri("/test"));

        let result = Auth::from_request_parts(&mut parts, &state).await;
        assert!(matches!(
            result,
            Err(AuthRejection {
                error: AuthError::MissingCredentials,
                ..
            })
        ));
    }

    #[tokio::test]
    async fn non_jwt_prefix_is_no_credential() {
        let state = test_state();
        let mut parts = parts(
            Request::builder()
                .uri("/test")
                .header("Authorization", "Bearer some-token"),
        );

        let result = OptionalAuth::from_request_parts(&mut parts, &state).await;
        assert!(result.unwrap().0.is_none());
    }

    #[tokio::test]
    async fn valid_token_resolves_identity() {
        let state = test_state();
        let id = Uuid::new_v4();
        let token = sign_hs256(
            "a super secret key",
            &json!({ "sub": id.to_string(), "email": "user@example.com" }),
        );
        let mut parts = parts(
            Request::builder()
                .uri("/test")
                .header("Authorization", format!("JWT {token}")),
        );

        let Auth(identity) = Auth::from_request_parts(&mut parts, &state).await.unwrap();
        assert_eq!(identity.uuid(), id);
        assert_eq!(identity.email(), Some("user@example.com"));
    }

    #[tokio::test]
    async fn bad_token_rejects_with_challenge() {
        let state = test_state();
        let mut parts = parts(
            Request::builder()
                .uri("/test")
                .header("Host", "www.example.com")
                .header("Authorization", "JWT some random string"),
        );

        let rejection = Auth::from_request_parts(&mut parts, &state)
            .await
            .unwrap_err();
        assert!(matches!(rejection.error, AuthError::MalformedToken));

        let response = rejection.into_response();
        assert_eq!(
            response.headers().get(WWW_AUTHENTICATE).unwrap(),
            "aps.example.com/user/accounts/login/"
        );
    }

    #[tokio::test]
    async fn service_secret_short_circuits_token_path() {
        let state = test_state();
        let mut parts = parts(
            Request::builder()
                .uri("/test")
                .header("Token", "super secret"),
        );

        let Auth(identity) = Auth::from_request_parts(&mut parts, &state).await.unwrap();
        assert_eq!(identity.uuid(), Uuid::nil());
        assert_eq!(identity.groups(), vec!["service"]);
    }

    #[tokio::test]
    async fn wrong_service_secret_rejects() {
        let state = test_state();
        let mut parts = parts(
            Request::builder()
                .uri("/test")
                .header("Token", "bad secret"),
        );

        let rejection = Auth::from_request_parts(&mut parts, &state)
            .await
            .unwrap_err();
        assert!(matches!(rejection.error, AuthError::Unauthorized));
    }

    #[tokio::test]
    async fn missing_subject_rejects_despite_valid_signature() {
        let state = test_state();
        let token = sign_hs256("really secret key", &json!({ "email": "user@example.com" }));
        let mut parts = parts(
            Request::builder()
                .uri("/test")
                .header("Authorization", format!("JWT {token}")),
        );

        let rejection = Auth::from_request_parts(&mut parts, &state)
            .await
            .unwrap_err();
        assert!(matches!(rejection.error, AuthError::MissingSubject));
    }

    #[tokio::test]
    async fn extension_identity_is_preferred() {
        let state = test_state();
        let mut parts = parts(Request::builder().uri("/test"));
        parts.extensions.insert(Identity::service());

        let Auth(identity) = Auth::from_request_parts(&mut parts, &state).await.unwrap();
        assert_eq!(identity.uuid(), Uuid::nil());
    }

    #[test]
    fn challenge_strips_leading_www() {
        assert_eq!(
            login_challenge("www.example.com"),
            "aps.example.com/user/accounts/login/"
        );
        assert_eq!(
            login_challenge("example.com"),
            "aps.example.com/user/accounts/login/"
        );
    }
}
