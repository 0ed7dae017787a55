//! Claim types and the claim mapper.
//!
//! The validation authority answers a successful lookup with a loosely-typed
//! JSON object. This module parses that body into an explicit value tree
//! ([`PayloadValue`]) and flattens the top level into an ordered [`ClaimSet`]:
//!
//! - scalar values become exactly one claim;
//! - arrays become one claim per element, in element order;
//! - key order of the source object is preserved.
//!
//! No key is special-cased. Non-string scalars are stringified with their JSON
//! text (`42`, `1.5`, `true`), which is locale independent.

use serde::de::{self, Deserializer, MapAccess, SeqAccess, Visitor};
use serde::ser::{SerializeMap, SerializeSeq, Serializer};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use thiserror::Error;

// =============================================================================
// Error Types
// =============================================================================

/// The authority answered with a success status but the body is not a JSON
/// object of claims.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("Malformed validation payload: {0}")]
pub struct MalformedPayload(pub String);

// =============================================================================
// Claims
// =============================================================================

/// A single identity claim.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Claim {
    /// Claim type (the payload key).
    pub claim_type: String,

    /// Claim value, always a string.
    pub value: String,
}

impl Claim {
    /// Creates a new claim.
    #[must_use]
    pub fn new(claim_type: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            claim_type: claim_type.into(),
            value: value.into(),
        }
    }
}

/// Ordered sequence of claims.
///
/// An empty set is a valid authentication result (authenticated, no claims).
/// A claim type may repeat; values of the same type keep source order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ClaimSet(Vec<Claim>);

impl ClaimSet {
    /// Creates an empty claim set.
    #[must_use]
    pub fn new() -> Self {
        Self(Vec::new())
    }

    /// Appends a claim.
    pub fn push(&mut self, claim: Claim) {
        self.0.push(claim);
    }

    /// Number of claims.
    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Whether the set holds no claims.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Iterates claims in order.
    pub fn iter(&self) -> std::slice::Iter<'_, Claim> {
        self.0.iter()
    }

    /// Returns the first value of the given claim type.
    #[must_use]
    pub fn find_first(&self, claim_type: &str) -> Option<&str> {
        self.0
            .iter()
            .find(|c| c.claim_type == claim_type)
            .map(|c| c.value.as_str())
    }

    /// Iterates all values of the given claim type, in order.
    pub fn values<'a>(&'a self, claim_type: &'a str) -> impl Iterator<Item = &'a str> + 'a {
        self.0
            .iter()
            .filter(move |c| c.claim_type == claim_type)
            .map(|c| c.value.as_str())
    }

    /// Whether a claim with exactly this type and value exists.
    #[must_use]
    pub fn has_claim(&self, claim_type: &str, value: &str) -> bool {
        self.0
            .iter()
            .any(|c| c.claim_type == claim_type && c.value == value)
    }

    /// Reads the `exp` claim as a Unix timestamp, if present and numeric.
    ///
    /// Fractional timestamps (`1700000000.5`) are truncated to whole seconds;
    /// out-of-range values saturate at the `i64` bounds.
    #[must_use]
    pub fn expires_at(&self) -> Option<i64> {
        let exp = self.find_first("exp")?;
        exp.parse::<i64>().ok().or_else(|| {
            exp.parse::<f64>()
                .ok()
                .filter(|secs| secs.is_finite())
                .map(whole_seconds)
        })
    }
}

/// Float-to-int casts saturate, so huge timestamps clamp to `i64` bounds.
#[allow(clippy::cast_possible_truncation)]
fn whole_seconds(secs: f64) -> i64 {
    secs.trunc() as i64
}

impl FromIterator<Claim> for ClaimSet {
    fn from_iter<I: IntoIterator<Item = Claim>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

impl IntoIterator for ClaimSet {
    type Item = Claim;
    type IntoIter = std::vec::IntoIter<Claim>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.into_iter()
    }
}

impl<'a> IntoIterator for &'a ClaimSet {
    type Item = &'a Claim;
    type IntoIter = std::slice::Iter<'a, Claim>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}

// =============================================================================
// Payload Value Tree
// =============================================================================

/// JSON value with object key order preserved.
#[derive(Debug, Clone, PartialEq)]
pub enum PayloadValue {
    /// JSON `null`.
    Null,
    /// JSON boolean.
    Bool(bool),
    /// JSON number.
    Number(serde_json::Number),
    /// JSON string.
    String(String),
    /// JSON array.
    Array(Vec<PayloadValue>),
    /// JSON object, entries in source order.
    Object(Vec<(String, PayloadValue)>),
}

impl PayloadValue {
    /// Stringifies the value for use as a claim value.
    ///
    /// Null becomes the empty string; nested arrays and objects become
    /// compact JSON text.
    #[must_use]
    pub fn to_claim_value(&self) -> String {
        match self {
            Self::Null => String::new(),
            Self::Bool(b) => b.to_string(),
            Self::Number(n) => n.to_string(),
            Self::String(s) => s.clone(),
            Self::Array(_) | Self::Object(_) => serde_json::to_string(self).unwrap_or_default(),
        }
    }
}

/// Collects object entries with mapping semantics: a repeated key replaces
/// the earlier value in its original position.
fn collect_entries<'de, A>(mut map: A) -> Result<Vec<(String, PayloadValue)>, A::Error>
where
    A: MapAccess<'de>,
{
    let capacity = map.size_hint().unwrap_or(0);
    let mut entries: Vec<(String, PayloadValue)> = Vec::with_capacity(capacity);
    let mut positions: HashMap<String, usize> = HashMap::with_capacity(capacity);

    while let Some((key, value)) = map.next_entry::<String, PayloadValue>()? {
        match positions.get(&key) {
            Some(&index) => {
                if let Some(slot) = entries.get_mut(index) {
                    slot.1 = value;
                }
            }
            None => {
                positions.insert(key.clone(), entries.len());
                entries.push((key, value));
            }
        }
    }
    Ok(entries)
}

struct PayloadValueVisitor;

impl<'de> Visitor<'de> for PayloadValueVisitor {
    type Value = PayloadValue;

    fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("any JSON value")
    }

    fn visit_bool<E>(self, v: bool) -> Result<Self::Value, E> {
        Ok(PayloadValue::Bool(v))
    }

    fn visit_i64<E>(self, v: i64) -> Result<Self::Value, E> {
        Ok(PayloadValue::Number(v.into()))
    }

    fn visit_u64<E>(self, v: u64) -> Result<Self::Value, E> {
        Ok(PayloadValue::Number(v.into()))
    }

    fn visit_f64<E: de::Error>(self, v: f64) -> Result<Self::Value, E> {
        serde_json::Number::from_f64(v)
            .map(PayloadValue::Number)
            .ok_or_else(|| E::custom("non-finite number"))
    }

    fn visit_str<E>(self, v: &str) -> Result<Self::Value, E> {
        Ok(PayloadValue::String(v.to_owned()))
    }

    fn visit_string<E>(self, v: String) -> Result<Self::Value, E> {
        Ok(PayloadValue::String(v))
    }

    fn visit_unit<E>(self) -> Result<Self::Value, E> {
        Ok(PayloadValue::Null)
    }

    fn visit_none<E>(self) -> Result<Self::Value, E> {
        Ok(PayloadValue::Null)
    }

    fn visit_some<D: Deserializer<'de>>(self, deserializer: D) -> Result<Self::Value, D::Error> {
        PayloadValue::deserialize(deserializer)
    }

    fn visit_seq<A: SeqAccess<'de>>(self, mut seq: A) -> Result<Self::Value, A::Error> {
        let mut items = Vec::with_capacity(seq.size_hint().unwrap_or(0));
        while let Some(item) = seq.next_element()? {
            items.push(item);
        }
        Ok(PayloadValue::Array(items))
    }

    fn visit_map<A: MapAccess<'de>>(self, map: A) -> Result<Self::Value, A::Error> {
        collect_entries(map).map(PayloadValue::Object)
    }
}

impl<'de> Deserialize<'de> for PayloadValue {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        deserializer.deserialize_any(PayloadValueVisitor)
    }
}

impl Serialize for PayloadValue {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Self::Null => serializer.serialize_unit(),
            Self::Bool(b) => serializer.serialize_bool(*b),
            Self::Number(n) => n.serialize(serializer),
            Self::String(s) => serializer.serialize_str(s),
            Self::Array(items) => {
                let mut seq = serializer.serialize_seq(Some(items.len()))?;
                for item in items {
                    seq.serialize_element(item)?;
                }
                seq.end()
            }
            Self::Object(entries) => {
                let mut map = serializer.serialize_map(Some(entries.len()))?;
                for (key, value) in entries {
                    map.serialize_entry(key, value)?;
                }
                map.end()
            }
        }
    }
}

// =============================================================================
// Claim Payload
// =============================================================================

/// Top-level response object of the validation endpoint.
#[derive(Debug, Clone, PartialEq)]
pub struct ClaimPayload(Vec<(String, PayloadValue)>);

impl ClaimPayload {
    /// Flattens the payload into claims.
    #[must_use]
    pub fn into_claims(self) -> ClaimSet {
        let mut claims = ClaimSet::new();
        for (key, value) in self.0 {
            match value {
                PayloadValue::Array(items) => {
                    for item in items {
                        claims.push(Claim::new(key.clone(), item.to_claim_value()));
                    }
                }
                scalar => {
                    let value = scalar.to_claim_value();
                    claims.push(Claim::new(key, value));
                }
            }
        }
        claims
    }
}

struct ClaimPayloadVisitor;

impl<'de> Visitor<'de> for ClaimPayloadVisitor {
    type Value = ClaimPayload;

    fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("a JSON object of claims")
    }

    fn visit_map<A: MapAccess<'de>>(self, map: A) -> Result<Self::Value, A::Error> {
        collect_entries(map).map(ClaimPayload)
    }
}

impl<'de> Deserialize<'de> for ClaimPayload {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        deserializer.deserialize_map(ClaimPayloadVisitor)
    }
}

/// Parses a validation response body and flattens it into claims.
///
/// # Errors
///
/// Returns [`MalformedPayload`] if the body is not a JSON object.
pub fn map_to_claims(body: &[u8]) -> Result<ClaimSet, MalformedPayload> {
    let payload: ClaimPayload =
        serde_json::from_slice(body).map_err(|e| MalformedPayload(e.to_string()))?;
    Ok(payload.into_claims())
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    fn pairs(claims: &ClaimSet) -> Vec<(&str, &str)> {
        claims
            .iter()
            .map(|c| (c.claim_type.as_str(), c.value.as_str()))
            .collect()
    }

    #[test]
    fn test_scalar_and_array_claims() {
        let claims = map_to_claims(br#"{"sub":"u1","role":["admin","user"]}"#).unwrap();

        assert_eq!(
            pairs(&claims),
            vec![("sub", "u1"), ("role", "admin"), ("role", "user")]
        );
    }

    #[test]
    fn test_key_order_is_preserved() {
        // Deliberately not alphabetical
        let claims = map_to_claims(br#"{"zeta":"1","alpha":"2","mid":"3"}"#).unwrap();

        assert_eq!(
            pairs(&claims),
            vec![("zeta", "1"), ("alpha", "2"), ("mid", "3")]
        );
    }

    #[test]
    fn test_array_claims_interleave_with_other_keys() {
        let claims =
            map_to_claims(br#"{"a":"1","scope":["read","write","admin"],"b":"2"}"#).unwrap();

        assert_eq!(
            pairs(&claims),
            vec![
                ("a", "1"),
                ("scope", "read"),
                ("scope", "write"),
                ("scope", "admin"),
                ("b", "2"),
            ]
        );
    }

    #[test]
    fn test_non_string_scalars_are_stringified() {
        let claims =
            map_to_claims(br#"{"exp":1700000000,"ratio":1.5,"active":true,"neg":-3}"#).unwrap();

        assert_eq!(
            pairs(&claims),
            vec![
                ("exp", "1700000000"),
                ("ratio", "1.5"),
                ("active", "true"),
                ("neg", "-3"),
            ]
        );
    }

    #[test]
    fn test_null_value_keeps_key() {
        let claims = map_to_claims(br#"{"sub":"u1","email":null}"#).unwrap();

        assert_eq!(pairs(&claims), vec![("sub", "u1"), ("email", "")]);
    }

    #[test]
    fn test_mixed_array_elements() {
        let claims = map_to_claims(br#"{"aud":["api",7,false,null]}"#).unwrap();

        assert_eq!(
            pairs(&claims),
            vec![("aud", "api"), ("aud", "7"), ("aud", "false"), ("aud", "")]
        );
    }

    #[test]
    fn test_empty_array_emits_no_claims() {
        let claims = map_to_claims(br#"{"sub":"u1","role":[]}"#).unwrap();

        assert_eq!(pairs(&claims), vec![("sub", "u1")]);
    }

    #[test]
    fn test_nested_values_become_compact_json() {
        let claims =
            map_to_claims(br#"{"address":{"city":"Oslo","zip":"0150"},"m":[[1,2],{"k":"v"}]}"#)
                .unwrap();

        assert_eq!(
            pairs(&claims),
            vec![
                ("address", r#"{"city":"Oslo","zip":"0150"}"#),
                ("m", "[1,2]"),
                ("m", r#"{"k":"v"}"#),
            ]
        );
    }

    #[test]
    fn test_duplicate_key_replaces_in_first_position() {
        let claims = map_to_claims(br#"{"sub":"first","a":"1","sub":"second"}"#).unwrap();

        assert_eq!(pairs(&claims), vec![("sub", "second"), ("a", "1")]);
    }

    #[test]
    fn test_empty_object_is_empty_claim_set() {
        let claims = map_to_claims(b"{}").unwrap();
        assert!(claims.is_empty());
    }

    #[test]
    fn test_non_object_bodies_are_malformed() {
        for body in [
            &b"not json"[..],
            b"[1,2,3]",
            b"\"just a string\"",
            b"42",
            b"null",
            b"",
            b"{\"sub\":",
        ] {
            let result = map_to_claims(body);
            assert!(
                matches!(result, Err(MalformedPayload(_))),
                "Expected malformed payload for {:?}",
                String::from_utf8_lossy(body)
            );
        }
    }

    #[test]
    fn test_claim_set_lookups() {
        let claims = map_to_claims(br#"{"sub":"u1","role":["admin","user"],"exp":"1700"}"#).unwrap();

        assert_eq!(claims.len(), 4);
        assert_eq!(claims.find_first("role"), Some("admin"));
        assert_eq!(claims.find_first("missing"), None);
        assert_eq!(claims.values("role").collect::<Vec<_>>(), vec!["admin", "user"]);
        assert!(claims.has_claim("role", "user"));
        assert!(!claims.has_claim("role", "root"));
        assert_eq!(claims.expires_at(), Some(1700));
    }

    #[test]
    fn test_expires_at_ignores_non_numeric() {
        let claims: ClaimSet = vec![Claim::new("exp", "tomorrow")].into_iter().collect();
        assert_eq!(claims.expires_at(), None);
    }

    #[test]
    fn test_expires_at_accepts_fractional_seconds() {
        let claims = map_to_claims(br#"{"exp":1700000000.75}"#).unwrap();
        assert_eq!(claims.expires_at(), Some(1_700_000_000));

        let claims = map_to_claims(br#"{"exp":-1.5}"#).unwrap();
        assert_eq!(claims.expires_at(), Some(-1));
    }

    #[test]
    fn test_expires_at_saturates_huge_values() {
        let claims = map_to_claims(br#"{"exp":1e300}"#).unwrap();
        assert_eq!(claims.expires_at(), Some(i64::MAX));

        let claims = map_to_claims(br#"{"exp":-1e300}"#).unwrap();
        assert_eq!(claims.expires_at(), Some(i64::MIN));
    }

    #[test]
    fn test_many_keys_with_duplicates() {
        let keys = 50_000;
        let mut body = String::from("{");
        for i in 0..keys {
            body.push_str(&format!("\"k{i}\":{i},"));
        }
        // Repeat the first and a middle key at the end
        body.push_str(r#""k0":"first","k25000":"middle"}"#);

        let claims = map_to_claims(body.as_bytes()).unwrap();

        assert_eq!(claims.len(), keys);
        let mut iter = claims.iter();
        assert_eq!(iter.next(), Some(&Claim::new("k0", "first")));
        assert_eq!(iter.next(), Some(&Claim::new("k1", "1")));
        assert_eq!(claims.find_first("k25000"), Some("middle"));
        assert_eq!(
            claims.iter().last(),
            Some(&Claim::new(format!("k{}", keys - 1), format!("{}", keys - 1)))
        );
    }

    #[test]
    fn test_claim_set_serde_is_transparent() {
        let claims: ClaimSet = vec![Claim::new("sub", "u1"), Claim::new("role", "admin")]
            .into_iter()
            .collect();

        let json = serde_json::to_string(&claims).unwrap();
        assert_eq!(
            json,
            r#"[{"claim_type":"sub","value":"u1"},{"claim_type":"role","value":"admin"}]"#
        );

        let decoded: ClaimSet = serde_json::from_str(&json).unwrap();
        assert_eq!(decoded, claims);
    }
}
