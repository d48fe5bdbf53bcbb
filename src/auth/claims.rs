// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Raw token claims and the canonical session data mapped from them.
//!
//! Mapping is a pure, field-by-field extraction. Each absent or mistyped
//! field is reported as [`AuthError::MalformedClaim`] naming that field, so an
//! older provider integration with a different claim shape is distinguishable
//! from a bad token.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize, Serializer};
use serde_json::{Map, Value};

use super::error::AuthError;

/// Expiry (seconds since epoch)
pub const CLAIM_EXP: &str = "exp";
/// Issued-at (seconds since epoch)
pub const CLAIM_IAT: &str = "iat";
/// Name of the upstream identity provider
pub const CLAIM_IDENTITY_PROVIDER: &str = "identityProvider";
/// Free-form user details (display name, email, ...)
pub const CLAIM_USER_DETAILS: &str = "userDetails";
/// Provider-scoped user identifier
pub const CLAIM_USER_ID: &str = "userId";
/// Role strings granted to the user
pub const CLAIM_USER_ROLES: &str = "userRoles";

/// Untyped claim set of a verified token.
///
/// Produced by the verifier after all signature, temporal, issuer and
/// audience checks passed; consumed by [`SessionData::from_claims`].
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RawClaimSet(Map<String, Value>);

impl RawClaimSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.0.get(name)
    }

    pub fn insert(&mut self, name: impl Into<String>, value: Value) -> Option<Value> {
        self.0.insert(name.into(), value)
    }

    /// The `sub` claim, if it is a string.
    pub fn subject(&self) -> Option<&str> {
        self.0.get("sub").and_then(Value::as_str)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn into_inner(self) -> Map<String, Value> {
        self.0
    }
}

impl From<Map<String, Value>> for RawClaimSet {
    fn from(map: Map<String, Value>) -> Self {
        Self(map)
    }
}

/// Canonical session data carried by every authenticated request.
///
/// `exp` and `iat` are always present once mapping succeeded and keep any
/// fractional seconds the provider sent; `user_roles` may be empty but is
/// never absent. Serializes under the same claim names it was read from.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionData {
    #[serde(serialize_with = "serialize_numeric_date")]
    exp: f64,
    #[serde(serialize_with = "serialize_numeric_date")]
    iat: f64,
    identity_provider: String,
    user_details: String,
    user_id: String,
    user_roles: Vec<String>,
}

impl SessionData {
    /// Map a verified claim set into session data.
    ///
    /// # Errors
    ///
    /// [`AuthError::MalformedClaim`] naming the first field that is absent or
    /// has the wrong type. An absent or `null` roles claim is not an error.
    pub fn from_claims(claims: &RawClaimSet) -> Result<Self, AuthError> {
        Ok(Self {
            exp: timestamp_claim(claims, CLAIM_EXP)?,
            iat: timestamp_claim(claims, CLAIM_IAT)?,
            identity_provider: string_claim(claims, CLAIM_IDENTITY_PROVIDER)?,
            user_details: string_claim(claims, CLAIM_USER_DETAILS)?,
            user_id: string_claim(claims, CLAIM_USER_ID)?,
            user_roles: roles_claim(claims)?,
        })
    }

    /// Re-serialize the canonical fields under their claim names.
    pub fn to_claims(&self) -> RawClaimSet {
        let mut claims = RawClaimSet::new();
        claims.insert(CLAIM_EXP, numeric_date_value(self.exp));
        claims.insert(CLAIM_IAT, numeric_date_value(self.iat));
        claims.insert(CLAIM_IDENTITY_PROVIDER, Value::from(self.identity_provider.as_str()));
        claims.insert(CLAIM_USER_DETAILS, Value::from(self.user_details.as_str()));
        claims.insert(CLAIM_USER_ID, Value::from(self.user_id.as_str()));
        claims.insert(
            CLAIM_USER_ROLES,
            Value::Array(self.user_roles.iter().cloned().map(Value::String).collect()),
        );
        claims
    }

    /// Expiry, seconds since epoch.
    pub fn exp(&self) -> f64 {
        self.exp
    }

    /// Issued-at, seconds since epoch.
    pub fn iat(&self) -> f64 {
        self.iat
    }

    pub fn identity_provider(&self) -> &str {
        &self.identity_provider
    }

    pub fn user_details(&self) -> &str {
        &self.user_details
    }

    pub fn user_id(&self) -> &str {
        &self.user_id
    }

    /// Roles in the order the provider listed them, without duplicates.
    pub fn user_roles(&self) -> &[String] {
        &self.user_roles
    }

    pub fn has_role(&self, role: &str) -> bool {
        self.user_roles.iter().any(|r| r == role)
    }

    /// `None` only when `exp` is outside chrono's representable range.
    pub fn expires_at(&self) -> Option<DateTime<Utc>> {
        to_datetime(self.exp)
    }

    pub fn issued_at(&self) -> Option<DateTime<Utc>> {
        to_datetime(self.iat)
    }
}

/// NumericDate: any finite JSON number of seconds, fractions included.
fn timestamp_claim(claims: &RawClaimSet, field: &'static str) -> Result<f64, AuthError> {
    match claims.get(field) {
        Some(Value::Number(number)) => number
            .as_f64()
            .filter(|secs| secs.is_finite())
            .ok_or(AuthError::MalformedClaim(field)),
        _ => Err(AuthError::MalformedClaim(field)),
    }
}

/// Whole seconds stay JSON integers so a mapped claim set re-serializes to
/// the same numbers it was read from.
fn whole_seconds(secs: f64) -> Option<i64> {
    // 2^63 is exactly representable; anything at or beyond it is not an i64
    (secs.fract() == 0.0 && secs >= i64::MIN as f64 && secs < i64::MAX as f64)
        .then_some(secs as i64)
}

fn numeric_date_value(secs: f64) -> Value {
    match whole_seconds(secs) {
        Some(whole) => Value::from(whole),
        None => Value::from(secs),
    }
}

fn serialize_numeric_date<S: Serializer>(secs: &f64, serializer: S) -> Result<S::Ok, S::Error> {
    match whole_seconds(*secs) {
        Some(whole) => serializer.serialize_i64(whole),
        None => serializer.serialize_f64(*secs),
    }
}

fn to_datetime(secs: f64) -> Option<DateTime<Utc>> {
    let whole = secs.floor();
    if whole < i64::MIN as f64 || whole >= i64::MAX as f64 {
        return None;
    }
    let nanos = ((secs - whole) * 1e9).round().min(999_999_999.0) as u32;
    DateTime::from_timestamp(whole as i64, nanos)
}

fn string_claim(claims: &RawClaimSet, field: &'static str) -> Result<String, AuthError> {
    claims
        .get(field)
        .and_then(Value::as_str)
        .map(str::to_owned)
        .ok_or(AuthError::MalformedClaim(field))
}

fn roles_claim(claims: &RawClaimSet) -> Result<Vec<String>, AuthError> {
    let items = match claims.get(CLAIM_USER_ROLES) {
        None | Some(Value::Null) => return Ok(Vec::new()),
        Some(Value::Array(items)) => items,
        Some(_) => return Err(AuthError::MalformedClaim(CLAIM_USER_ROLES)),
    };

    let mut roles: Vec<String> = Vec::with_capacity(items.len());
    for item in items {
        let role = item
            .as_str()
            .ok_or(AuthError::MalformedClaim(CLAIM_USER_ROLES))?;
        if !roles.iter().any(|r| r == role) {
            roles.push(role.to_owned());
        }
    }
    Ok(roles)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn claims(value: Value) -> RawClaimSet {
        serde_json::from_value(value).unwrap()
    }

    fn sample_claims() -> RawClaimSet {
        claims(json!({
            "sub": "u1",
            "exp": 9999999999i64,
            "iat": 1000000000,
            "identityProvider": "okta",
            "userId": "u1",
            "userDetails": "Jane",
            "userRoles": ["admin", "speaker"]
        }))
    }

    #[test]
    fn maps_every_canonical_field() {
        let data = SessionData::from_claims(&sample_claims()).unwrap();
        assert_eq!(data.exp(), 9999999999.0);
        assert_eq!(data.iat(), 1000000000.0);
        assert_eq!(data.identity_provider(), "okta");
        assert_eq!(data.user_id(), "u1");
        assert_eq!(data.user_details(), "Jane");
        assert_eq!(data.user_roles(), ["admin", "speaker"]);
        assert!(data.has_role("speaker"));
        assert!(!data.has_role("organizer"));
    }

    #[test]
    fn absent_roles_map_to_empty_set() {
        let mut raw = sample_claims().into_inner();
        raw.remove(CLAIM_USER_ROLES);
        let data = SessionData::from_claims(&raw.into()).unwrap();
        assert!(data.user_roles().is_empty());
    }

    #[test]
    fn null_roles_map_to_empty_set() {
        let mut raw = sample_claims();
        raw.insert(CLAIM_USER_ROLES, Value::Null);
        let data = SessionData::from_claims(&raw).unwrap();
        assert!(data.user_roles().is_empty());
    }

    #[test]
    fn non_string_role_is_malformed() {
        let mut raw = sample_claims();
        raw.insert(CLAIM_USER_ROLES, json!(["admin", 7]));
        assert_eq!(
            SessionData::from_claims(&raw),
            Err(AuthError::MalformedClaim("userRoles"))
        );
    }

    #[test]
    fn roles_as_string_is_malformed() {
        let mut raw = sample_claims();
        raw.insert(CLAIM_USER_ROLES, json!("admin"));
        assert_eq!(
            SessionData::from_claims(&raw),
            Err(AuthError::MalformedClaim("userRoles"))
        );
    }

    #[test]
    fn duplicate_roles_are_collapsed_in_order() {
        let mut raw = sample_claims();
        raw.insert(CLAIM_USER_ROLES, json!(["speaker", "admin", "speaker"]));
        let data = SessionData::from_claims(&raw).unwrap();
        assert_eq!(data.user_roles(), ["speaker", "admin"]);
    }

    #[test]
    fn each_missing_field_is_reported_by_name() {
        for field in [
            CLAIM_EXP,
            CLAIM_IAT,
            CLAIM_IDENTITY_PROVIDER,
            CLAIM_USER_DETAILS,
            CLAIM_USER_ID,
        ] {
            let mut raw = sample_claims().into_inner();
            raw.remove(field);
            assert_eq!(
                SessionData::from_claims(&raw.into()),
                Err(AuthError::MalformedClaim(field)),
                "removing {field}"
            );
        }
    }

    #[test]
    fn mistyped_fields_are_reported_by_name() {
        let mut raw = sample_claims();
        raw.insert(CLAIM_EXP, json!("9999999999"));
        assert_eq!(
            SessionData::from_claims(&raw),
            Err(AuthError::MalformedClaim("exp"))
        );

        let mut raw = sample_claims();
        raw.insert(CLAIM_USER_DETAILS, json!({"name": "Jane"}));
        assert_eq!(
            SessionData::from_claims(&raw),
            Err(AuthError::MalformedClaim("userDetails"))
        );
    }

    #[test]
    fn integral_float_timestamps_are_accepted() {
        let mut raw = sample_claims();
        raw.insert(CLAIM_IAT, json!(1.7e9));
        let data = SessionData::from_claims(&raw).unwrap();
        assert_eq!(data.iat(), 1_700_000_000.0);
        assert_eq!(data.to_claims().get(CLAIM_IAT), Some(&json!(1_700_000_000i64)));
    }

    #[test]
    fn fractional_timestamps_keep_their_fraction() {
        let mut raw = sample_claims();
        raw.insert(CLAIM_EXP, json!(9999999999.5));
        let data = SessionData::from_claims(&raw).unwrap();
        assert_eq!(data.exp(), 9999999999.5);

        let reserialized = data.to_claims();
        assert_eq!(reserialized.get(CLAIM_EXP), raw.get(CLAIM_EXP));
        assert_eq!(SessionData::from_claims(&reserialized).unwrap(), data);
        assert_eq!(serde_json::to_value(&data).unwrap()["exp"], json!(9999999999.5));

        let expires_at = data.expires_at().unwrap();
        assert_eq!(expires_at.timestamp(), 9999999999);
        assert_eq!(expires_at.timestamp_subsec_millis(), 500);
    }

    #[test]
    fn canonical_fields_survive_reserialization() {
        let original = sample_claims();
        let data = SessionData::from_claims(&original).unwrap();
        let reserialized = data.to_claims();

        for field in [
            CLAIM_EXP,
            CLAIM_IAT,
            CLAIM_IDENTITY_PROVIDER,
            CLAIM_USER_DETAILS,
            CLAIM_USER_ID,
            CLAIM_USER_ROLES,
        ] {
            assert_eq!(reserialized.get(field), original.get(field), "{field}");
        }
        assert_eq!(SessionData::from_claims(&reserialized).unwrap(), data);
    }

    #[test]
    fn serializes_with_claim_names() {
        let data = SessionData::from_claims(&sample_claims()).unwrap();
        let value = serde_json::to_value(&data).unwrap();
        assert_eq!(value["identityProvider"], "okta");
        assert_eq!(value["userRoles"], json!(["admin", "speaker"]));
        assert_eq!(value, Value::Object(data.to_claims().into_inner()));
    }

    #[test]
    fn timestamps_convert_to_datetimes() {
        let data = SessionData::from_claims(&sample_claims()).unwrap();
        assert_eq!(data.issued_at().unwrap().timestamp(), 1000000000);
        assert_eq!(data.expires_at().unwrap().timestamp(), 9999999999);
    }

    #[test]
    fn subject_is_read_from_sub() {
        assert_eq!(sample_claims().subject(), Some("u1"));
        assert_eq!(RawClaimSet::new().subject(), None);
    }
}
