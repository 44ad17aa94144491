//! Canonical parameter sets.
//!
//! A [`ParamSet`] is the flat key/value view of one outbound request or one inbound
//! response/notification. It is the representation that gets signed, serialized to
//! XML and re-verified, so its semantics follow the gateway protocol exactly:
//!
//! - Keys are case-sensitive ASCII identifiers (`appid`, `mch_id`, `nonce_str`, ...).
//! - Empty strings and integer zeros are never stored. Absence, not a zero, is what
//!   the gateway sees.
//! - Iteration is always in ascending byte order of the key, independent of the order
//!   in which fields were inserted.
//!
//! # Example
//!
//! ```rust
//! use wxpay_types::params::ParamSet;
//!
//! let mut params = ParamSet::new();
//! params.insert("total_fee", 100u64);
//! params.insert("body", "Test Order");
//! params.insert("attach", "");
//!
//! assert_eq!(params.canonical_string(), "body=Test Order&total_fee=100");
//! assert!(!params.contains("attach"));
//! ```

use serde::Serialize;
use serde_json::Value;
use std::collections::BTreeMap;
use std::collections::btree_map;
use std::fmt;

/// Name of the signature field. It is never part of the signed content.
pub const SIGN_FIELD: &str = "sign";

/// A single field value before it enters a [`ParamSet`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FieldValue {
    Str(String),
    Int(u64),
}

impl FieldValue {
    /// `true` for the empty string and the integer zero.
    pub fn is_omitted(&self) -> bool {
        match self {
            FieldValue::Str(s) => s.is_empty(),
            FieldValue::Int(n) => *n == 0,
        }
    }
}

impl fmt::Display for FieldValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FieldValue::Str(s) => f.write_str(s),
            FieldValue::Int(n) => write!(f, "{n}"),
        }
    }
}

impl From<&str> for FieldValue {
    fn from(value: &str) -> Self {
        FieldValue::Str(value.to_string())
    }
}

impl From<String> for FieldValue {
    fn from(value: String) -> Self {
        FieldValue::Str(value)
    }
}

impl From<&String> for FieldValue {
    fn from(value: &String) -> Self {
        FieldValue::Str(value.clone())
    }
}

impl From<u64> for FieldValue {
    fn from(value: u64) -> Self {
        FieldValue::Int(value)
    }
}

impl From<u32> for FieldValue {
    fn from(value: u32) -> Self {
        FieldValue::Int(u64::from(value))
    }
}

/// Errors raised when a typed value cannot be flattened into a [`ParamSet`].
#[derive(Debug, thiserror::Error)]
pub enum ParamsError {
    #[error("Failed to serialize request fields: {0}")]
    Serialize(#[from] serde_json::Error),
    #[error("Request must serialize to a flat object, got {0}")]
    NotAnObject(&'static str),
    #[error("Field `{0}` is not a scalar value")]
    NestedValue(String),
}

/// Ordered, omission-aware field collection.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ParamSet(BTreeMap<String, String>);

impl ParamSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts a field. Empty or zero values remove the key instead, so that
    /// `{"foo": ""}` and a set without `foo` are indistinguishable.
    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<FieldValue>) -> &mut Self {
        let key = key.into();
        let value = value.into();
        if value.is_omitted() {
            self.0.remove(&key);
        } else {
            self.0.insert(key, value.to_string());
        }
        self
    }

    /// Builder-style [`ParamSet::insert`].
    pub fn with(mut self, key: impl Into<String>, value: impl Into<FieldValue>) -> Self {
        self.insert(key, value);
        self
    }

    /// Inserts a value taken verbatim off the wire. Only empty text is dropped:
    /// a literal `"0"` sent by the gateway is part of what it signed.
    pub(crate) fn insert_raw(&mut self, key: String, value: String) -> Option<String> {
        if value.is_empty() {
            return None;
        }
        self.0.insert(key, value)
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.0.get(key).map(String::as_str)
    }

    pub fn contains(&self, key: &str) -> bool {
        self.0.contains_key(key)
    }

    pub fn remove(&mut self, key: &str) -> Option<String> {
        self.0.remove(key)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Fields in ascending key order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    /// Adds every field of `other`, overwriting keys present in both.
    pub fn extend(&mut self, other: ParamSet) {
        self.0.extend(other.0);
    }

    /// Produces `k1=v1&k2=v2&...` over every field except [`SIGN_FIELD`].
    pub fn canonical_string(&self) -> String {
        let mut out = String::new();
        for (key, value) in self.iter().filter(|(k, _)| *k != SIGN_FIELD) {
            if !out.is_empty() {
                out.push('&');
            }
            out.push_str(key);
            out.push('=');
            out.push_str(value);
        }
        out
    }

    /// Flattens a `Serialize` value into a field set.
    ///
    /// The value must serialize to a JSON object of scalars. `null`, empty strings and
    /// zero integers are skipped, so `Option` fields with `skip_serializing_if` and
    /// plain `None` behave the same.
    pub fn from_serialize<T: Serialize + ?Sized>(value: &T) -> Result<Self, ParamsError> {
        let object = match serde_json::to_value(value)? {
            Value::Object(object) => object,
            Value::Null => return Err(ParamsError::NotAnObject("null")),
            Value::Array(_) => return Err(ParamsError::NotAnObject("array")),
            _ => return Err(ParamsError::NotAnObject("scalar")),
        };
        let mut params = ParamSet::new();
        for (key, value) in object {
            match value {
                Value::Null => {}
                Value::String(s) => {
                    params.insert(key, s);
                }
                Value::Number(n) => match n.as_u64() {
                    Some(n) => {
                        params.insert(key, n);
                    }
                    None => {
                        params.insert(key, n.to_string());
                    }
                },
                Value::Bool(b) => {
                    params.insert(key, if b { "true" } else { "false" });
                }
                Value::Array(_) | Value::Object(_) => return Err(ParamsError::NestedValue(key)),
            }
        }
        Ok(params)
    }
}

impl<'a> IntoIterator for &'a ParamSet {
    type Item = (&'a String, &'a String);
    type IntoIter = btree_map::Iter<'a, String, String>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}

impl<K, V> FromIterator<(K, V)> for ParamSet
where
    K: Into<String>,
    V: Into<FieldValue>,
{
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut params = ParamSet::new();
        for (key, value) in iter {
            params.insert(key, value);
        }
        params
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Serialize)]
    struct Order {
        body: String,
        total_fee: u64,
        #[serde(skip_serializing_if = "Option::is_none")]
        openid: Option<String>,
        attach: Option<String>,
        coupon_fee: u64,
    }

    #[test]
    fn test_insertion_order_does_not_affect_canonical_string() {
        let mut a = ParamSet::new();
        a.insert("mch_id", "1900000")
            .insert("appid", "wx123")
            .insert("nonce_str", "abc");
        let b: ParamSet = [("nonce_str", "abc"), ("appid", "wx123"), ("mch_id", "1900000")]
            .into_iter()
            .collect();
        assert_eq!(a, b);
        assert_eq!(
            a.canonical_string(),
            "appid=wx123&mch_id=1900000&nonce_str=abc"
        );
    }

    #[test]
    fn test_empty_and_zero_values_are_dropped() {
        let params = ParamSet::new()
            .with("body", "x")
            .with("foo", "")
            .with("total_fee", 0u64);
        assert_eq!(params.len(), 1);
        assert!(!params.contains("foo"));
        assert!(!params.contains("total_fee"));
    }

    #[test]
    fn test_empty_value_removes_existing_key() {
        let mut params = ParamSet::new().with("attach", "note");
        params.insert("attach", "");
        assert!(params.is_empty());
    }

    #[test]
    fn test_canonical_string_skips_sign() {
        let params = ParamSet::new()
            .with("b", "2")
            .with(SIGN_FIELD, "ABC")
            .with("a", "1");
        assert_eq!(params.canonical_string(), "a=1&b=2");
    }

    #[test]
    fn test_canonical_order_is_bytewise() {
        let params = ParamSet::new()
            .with("sign_type", "MD5")
            .with("sign", "X")
            .with("Zeta", "z")
            .with("appid", "a");
        let keys: Vec<_> = params.iter().map(|(k, _)| k).collect();
        assert_eq!(keys, vec!["Zeta", "appid", "sign", "sign_type"]);
    }

    #[test]
    fn test_from_serialize_flattens_scalars() {
        let order = Order {
            body: "Test Order".into(),
            total_fee: 100,
            openid: None,
            attach: None,
            coupon_fee: 0,
        };
        let params = ParamSet::from_serialize(&order).unwrap();
        assert_eq!(params.get("body"), Some("Test Order"));
        assert_eq!(params.get("total_fee"), Some("100"));
        assert!(!params.contains("openid"));
        assert!(!params.contains("attach"));
        assert!(!params.contains("coupon_fee"));
    }

    #[test]
    fn test_from_serialize_rejects_nested_values() {
        let value = serde_json::json!({ "detail": { "goods": [] } });
        let err = ParamSet::from_serialize(&value).unwrap_err();
        assert!(matches!(err, ParamsError::NestedValue(key) if key == "detail"));
    }

    #[test]
    fn test_from_serialize_rejects_non_objects() {
        let err = ParamSet::from_serialize(&vec![1, 2]).unwrap_err();
        assert!(matches!(err, ParamsError::NotAnObject("array")));
    }
}
