// SPDX-License-Identifier: AGPL-3.0-or-later

//! Service-to-service authentication via a static shared secret.
//!
//! A request presenting the configured secret in the `Token` header is
//! granted the fixed service identity without touching the token pipeline.
//! "No secret presented" and "no secret configured" are normal skip
//! outcomes, distinct from a presented-but-wrong secret.

use subtle::ConstantTimeEq;

use crate::error::AuthError;
use crate::identity::Identity;

/// Authenticates inbound service requests against a configured secret.
#[derive(Clone)]
pub struct ServiceAuthenticator {
    secret: Option<String>,
}

impl ServiceAuthenticator {
    /// Create an authenticator for the given shared secret.
    pub fn new(secret: Option<String>) -> Self {
        Self { secret }
    }

    /// Check a presented secret.
    ///
    /// Returns `Ok(None)` when no secret was presented or none is
    /// configured. The comparison is exact and constant-time for inputs of
    /// equal length.
    pub fn authenticate(&self, presented: Option<&str>) -> Result<Option<Identity>, AuthError> {
        let (Some(secret), Some(presented)) = (self.secret.as_deref(), presented) else {
            return Ok(None);
        };

        let matches = secret.len() == presented.len()
            && bool::from(secret.as_bytes().ct_eq(presented.as_bytes()));
        if matches {
            Ok(Some(Identity::service()))
        } else {
            Err(AuthError::Unauthorized)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    fn authenticator() -> ServiceAuthenticator {
        ServiceAuthenticator::new(Some("super secret".to_string()))
    }

    #[test]
    fn matching_secret_yields_service_identity() {
        let identity = authenticator()
            .authenticate(Some("super secret"))
            .unwrap()
            .unwrap();
        assert_eq!(identity.uuid(), Uuid::nil());
        assert!(identity.is_staff());
        assert!(!identity.is_superuser());
    }

    #[test]
    fn wrong_secret_is_unauthorized() {
        let err = authenticator().authenticate(Some("bad secret")).unwrap_err();
        assert!(matches!(err, AuthError::Unauthorized));
    }

    #[test]
    fn prefix_of_the_secret_is_unauthorized() {
        let err = authenticator().authenticate(Some("super")).unwrap_err();
        assert!(matches!(err, AuthError::Unauthorized));
    }

    #[test]
    fn no_secret_presented_skips() {
        assert!(authenticator().authenticate(None).unwrap().is_none());
    }

    #[test]
    fn no_secret_configured_skips_even_when_presented() {
        let authenticator = ServiceAuthenticator::new(None);
        assert!(authenticator
            .authenticate(Some("super secret"))
            .unwrap()
            .is_none());
    }
}
