// SPDX-License-Identifier: AGPL-3.0-or-later

//! Verified token claims.
//!
//! A claim set is an open-ended mapping from claim name to JSON value.
//! Typed accessors cover the fields this crate interprets (`sub`/`id`,
//! `email`); everything else is carried verbatim into the identity's
//! property bag.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use uuid::Uuid;

/// The verified payload of a signed token.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Claims(pub Map<String, Value>);

impl Claims {
    /// Look up a claim by name.
    pub fn get(&self, name: &str) -> Option<&Value> {
        self.0.get(name)
    }

    /// The subject identifier, read from `sub` with a fallback to `id`.
    ///
    /// Returns `None` when neither claim is present or the value is not a
    /// well-formed UUID.
    pub fn subject(&self) -> Option<Uuid> {
        self.get("sub")
            .or_else(|| self.get("id"))
            .and_then(Value::as_str)
            .and_then(|s| Uuid::parse_str(s).ok())
    }

    /// The `email` claim, if present.
    pub fn email(&self) -> Option<&str> {
        self.get("email").and_then(Value::as_str)
    }

    /// Consume the claim set, yielding the underlying map.
    pub fn into_inner(self) -> Map<String, Value> {
        self.0
    }
}

impl From<Map<String, Value>> for Claims {
    fn from(map: Map<String, Value>) -> Self {
        Claims(map)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn claims(value: serde_json::Value) -> Claims {
        Claims(value.as_object().cloned().unwrap())
    }

    #[test]
    fn subject_reads_sub_claim() {
        let id = Uuid::new_v4();
        let claims = claims(json!({ "sub": id.to_string() }));
        assert_eq!(claims.subject(), Some(id));
    }

    #[test]
    fn subject_falls_back_to_id_claim() {
        let id = Uuid::new_v4();
        let claims = claims(json!({ "id": id.to_string() }));
        assert_eq!(claims.subject(), Some(id));
    }

    #[test]
    fn sub_wins_over_id() {
        let sub = Uuid::new_v4();
        let claims = claims(json!({
            "sub": sub.to_string(),
            "id": Uuid::new_v4().to_string(),
        }));
        assert_eq!(claims.subject(), Some(sub));
    }

    #[test]
    fn subject_rejects_malformed_identifier() {
        let claims = claims(json!({ "sub": "not-a-uuid" }));
        assert_eq!(claims.subject(), None);
    }

    #[test]
    fn subject_absent() {
        let claims = claims(json!({ "email": "user@example.com" }));
        assert_eq!(claims.subject(), None);
        assert_eq!(claims.email(), Some("user@example.com"));
    }
}
