// SPDX-License-Identifier: AGPL-3.0-or-later

//! The resolved principal and its assembly from claims and authorization
//! data.
//!
//! An [`Identity`] is constructed fresh per request and never mutated after
//! authorization enrichment. Arbitrary claim and authorization fields live
//! in an explicit property bag keyed by name; the fields this crate
//! interprets get typed accessors.

use serde_json::{json, Map, Value};
use uuid::Uuid;

use crate::authorization::{
    AuthorizationPayload, CurrentSubscription, SubscriptionRecord, SubscriptionStatus,
};
use crate::claims::Claims;
use crate::error::AuthError;

/// Email attached to the fixed service identity.
const SERVICE_EMAIL: &str = "service@localhost";

/// Subscription data in either deployment shape behind one query surface.
#[derive(Debug, Clone, Default)]
pub enum SubscriptionState {
    /// No subscription data was provided.
    #[default]
    None,
    /// A single current subscription.
    Current(CurrentSubscription),
    /// Historical subscription records, each tagged expired or not.
    History(Vec<SubscriptionRecord>),
}

impl SubscriptionState {
    /// Names of subscriptions that are currently active.
    pub fn active(&self) -> Vec<&str> {
        match self {
            SubscriptionState::None => Vec::new(),
            SubscriptionState::Current(current) => {
                if current.status == SubscriptionStatus::Active {
                    vec![current.plan.as_str()]
                } else {
                    Vec::new()
                }
            }
            SubscriptionState::History(records) => records
                .iter()
                .filter(|r| !r.is_expired)
                .map(|r| r.name.as_str())
                .collect(),
        }
    }

    /// Names of subscriptions that have lapsed.
    pub fn expired(&self) -> Vec<&str> {
        match self {
            SubscriptionState::None => Vec::new(),
            SubscriptionState::Current(current) => {
                if current.status == SubscriptionStatus::Inactive {
                    vec![current.plan.as_str()]
                } else {
                    Vec::new()
                }
            }
            SubscriptionState::History(records) => records
                .iter()
                .filter(|r| r.is_expired)
                .map(|r| r.name.as_str())
                .collect(),
        }
    }

    /// Whether a non-expired subscription with the given name exists.
    pub fn check(&self, name: &str) -> bool {
        self.active().contains(&name)
    }
}

/// The resolved principal for one request.
#[derive(Debug, Clone)]
pub struct Identity {
    uuid: Uuid,
    email: Option<String>,
    subscriptions: SubscriptionState,
    properties: Map<String, Value>,
}

impl Identity {
    /// Assemble an identity from verified claims and optional authorization
    /// data.
    ///
    /// Fails with [`AuthError::MissingSubject`] when the claims carry no
    /// well-formed subject identifier, regardless of signature validity.
    pub fn assemble(
        claims: Claims,
        authorization: Option<AuthorizationPayload>,
    ) -> Result<Self, AuthError> {
        let uuid = claims.subject().ok_or(AuthError::MissingSubject)?;
        let email = claims.email().map(str::to_string);

        let mut identity = Self {
            uuid,
            email,
            subscriptions: SubscriptionState::None,
            properties: claims.into_inner(),
        };

        if let Some(payload) = authorization {
            identity.apply_authorization(payload);
        }

        Ok(identity)
    }

    /// The fixed, privileged identity for the service-secret path.
    ///
    /// Well-known zero identifier, staff but not superuser, in the
    /// `service` group.
    pub fn service() -> Self {
        let mut properties = Map::new();
        properties.insert("is_active".to_string(), json!(true));
        properties.insert("is_staff".to_string(), json!(true));
        properties.insert("is_superuser".to_string(), json!(false));
        properties.insert("groups".to_string(), json!(["service"]));

        Self {
            uuid: Uuid::nil(),
            email: Some(SERVICE_EMAIL.to_string()),
            subscriptions: SubscriptionState::None,
            properties,
        }
    }

    /// Overlay authorization data onto the property bag and subscription
    /// state. Called once during assembly.
    fn apply_authorization(&mut self, payload: AuthorizationPayload) {
        self.properties
            .insert("is_active".to_string(), json!(payload.is_active));
        self.properties
            .insert("is_staff".to_string(), json!(payload.role.is_staff));
        self.properties
            .insert("is_superuser".to_string(), json!(payload.role.is_superuser));
        self.properties
            .insert("groups".to_string(), json!(payload.role.groups));

        for (name, value) in payload.extra {
            self.properties.insert(name, value);
        }

        self.subscriptions = match (payload.subscription, payload.subscriptions) {
            (Some(current), _) => SubscriptionState::Current(current),
            (None, Some(records)) => SubscriptionState::History(records),
            (None, None) => SubscriptionState::None,
        };
    }

    /// The immutable subject identifier.
    pub fn uuid(&self) -> Uuid {
        self.uuid
    }

    /// The subject's email, if known.
    pub fn email(&self) -> Option<&str> {
        self.email.as_deref()
    }

    /// Always `true`: unauthenticated requests never produce an identity.
    pub fn is_authenticated(&self) -> bool {
        true
    }

    /// Always `false`, for the same reason.
    pub fn is_anonymous(&self) -> bool {
        false
    }

    /// Look up an arbitrary claim or authorization property by name.
    pub fn property(&self, name: &str) -> Option<&Value> {
        self.properties.get(name)
    }

    pub fn is_active(&self) -> bool {
        self.bool_property("is_active")
    }

    pub fn is_staff(&self) -> bool {
        self.bool_property("is_staff")
    }

    pub fn is_superuser(&self) -> bool {
        self.bool_property("is_superuser")
    }

    /// Group names from the authorization overlay.
    pub fn groups(&self) -> Vec<&str> {
        self.property("groups")
            .and_then(Value::as_array)
            .map(|groups| groups.iter().filter_map(Value::as_str).collect())
            .unwrap_or_default()
    }

    /// Names of the subject's currently active subscriptions.
    pub fn active_subscriptions(&self) -> Vec<&str> {
        self.subscriptions.active()
    }

    /// Names of the subject's expired subscriptions.
    pub fn expired_subscriptions(&self) -> Vec<&str> {
        self.subscriptions.expired()
    }

    /// Whether the subject holds a non-expired subscription of this name.
    pub fn check_subscription(&self, name: &str) -> bool {
        self.subscriptions.check(name)
    }

    fn bool_property(&self, name: &str) -> bool {
        self.property(name).and_then(Value::as_bool).unwrap_or(false)
    }
}
