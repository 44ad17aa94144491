//! Request and response signatures.
//!
//! The signed content is the canonical string of a [`ParamSet`] (see
//! [`ParamSet::canonical_string`]) followed by `&key=<secret>`. It is hashed with
//! either plain MD5 or HMAC-SHA256 keyed with the same secret, and rendered as
//! uppercase hex.
//!
//! # Example
//!
//! ```rust
//! use wxpay_types::params::ParamSet;
//! use wxpay_types::sign::{self, SignType};
//!
//! let mut params = ParamSet::new().with("appid", "wx123").with("body", "test");
//! let signature = sign::sign(&params, "secret", SignType::Md5);
//! params.insert("sign", signature);
//! assert!(sign::verify(&params, "secret", SignType::Md5));
//! ```

use hmac::{Hmac, Mac};
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use std::fmt;
use std::fmt::Display;
use std::str::FromStr;

use crate::params::{ParamSet, SIGN_FIELD};

type HmacSha256 = Hmac<Sha256>;

/// Digest used to sign a field set. Transmitted as the `sign_type` field.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SignType {
    #[default]
    #[serde(rename = "MD5")]
    Md5,
    #[serde(rename = "HMAC-SHA256")]
    HmacSha256,
}

impl SignType {
    pub const fn as_str(&self) -> &'static str {
        match self {
            SignType::Md5 => "MD5",
            SignType::HmacSha256 => "HMAC-SHA256",
        }
    }
}

impl Display for SignType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, thiserror::Error)]
#[error("Unsupported sign type: {0}")]
pub struct UnsupportedSignType(pub String);

impl FromStr for SignType {
    type Err = UnsupportedSignType;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "MD5" => Ok(SignType::Md5),
            "HMAC-SHA256" => Ok(SignType::HmacSha256),
            other => Err(UnsupportedSignType(other.to_string())),
        }
    }
}

/// Computes the uppercase hex signature of `params`.
///
/// Any `sign` entry already present in `params` is ignored. Callers must not rely
/// on empty values being signed: [`ParamSet`] never stores them.
pub fn sign(params: &ParamSet, key: &str, sign_type: SignType) -> String {
    let mut payload = params.canonical_string();
    if !payload.is_empty() {
        payload.push('&');
    }
    payload.push_str("key=");
    payload.push_str(key);

    match sign_type {
        SignType::Md5 => format!("{:X}", md5::compute(payload.as_bytes())),
        SignType::HmacSha256 => {
            let mut mac = HmacSha256::new_from_slice(key.as_bytes())
                .expect("HMAC can take key of any size");
            mac.update(payload.as_bytes());
            hex::encode_upper(mac.finalize().into_bytes())
        }
    }
}

/// Recomputes the signature of `params` and compares it with its `sign` field.
///
/// A missing `sign` field never verifies. The comparison ignores ASCII case and
/// does not short-circuit on the first differing byte.
pub fn verify(params: &ParamSet, key: &str, sign_type: SignType) -> bool {
    let Some(provided) = params.get(SIGN_FIELD) else {
        return false;
    };
    let expected = sign(params, key, sign_type);
    constant_time_eq(
        expected.as_bytes(),
        provided.to_ascii_uppercase().as_bytes(),
    )
}

fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }

    let mut diff = 0u8;
    for (&x, &y) in a.iter().zip(b.iter()) {
        diff |= x ^ y;
    }

    diff == 0
}

#[cfg(test)]
mod tests {
    use super::*;

    const DOC_KEY: &str = "192006250b4c09247ec02edce69f6a2d";

    fn doc_params() -> ParamSet {
        ParamSet::new()
            .with("appid", "wxd930ea5d5a258f4f")
            .with("mch_id", "10000100")
            .with("device_info", "1000")
            .with("body", "test")
            .with("nonce_str", "ibuaiVcKdpRxkhJA")
    }

    #[test]
    fn test_md5_known_answer() {
        assert_eq!(
            sign(&doc_params(), DOC_KEY, SignType::Md5),
            "9A0A8659F005D6984697E2CA0A9CF3B7"
        );
    }

    #[test]
    fn test_hmac_sha256_known_answer() {
        assert_eq!(
            sign(&doc_params(), DOC_KEY, SignType::HmacSha256),
            "6A9AE1657590FD6257D693A078E1C3E4BB6BA4DC30B23E0EE2496E54170DACD6"
        );
    }

    #[test]
    fn test_sign_matches_manual_md5() {
        let params = ParamSet::new().with("b", "2").with("a", "1");
        let expected = format!("{:X}", md5::compute(b"a=1&b=2&key=k"));
        assert_eq!(sign(&params, "k", SignType::Md5), expected);
    }

    #[test]
    fn test_sign_ignores_existing_sign_field() {
        let params = doc_params();
        let with_sign = params.clone().with(SIGN_FIELD, "WHATEVER");
        assert_eq!(
            sign(&params, DOC_KEY, SignType::Md5),
            sign(&with_sign, DOC_KEY, SignType::Md5)
        );
    }

    #[test]
    fn test_empty_field_does_not_change_signature() {
        let params = doc_params();
        let with_empty = params.clone().with("foo", "");
        assert_eq!(
            sign(&params, DOC_KEY, SignType::HmacSha256),
            sign(&with_empty, DOC_KEY, SignType::HmacSha256)
        );
    }

    #[test]
    fn test_verify_accepts_own_signature_for_both_digests() {
        for sign_type in [SignType::Md5, SignType::HmacSha256] {
            let mut params = doc_params();
            let signature = sign(&params, DOC_KEY, sign_type);
            params.insert(SIGN_FIELD, signature);
            assert!(verify(&params, DOC_KEY, sign_type));
        }
    }

    #[test]
    fn test_verify_is_case_insensitive() {
        let mut params = doc_params();
        let signature = sign(&params, DOC_KEY, SignType::Md5).to_ascii_lowercase();
        params.insert(SIGN_FIELD, signature);
        assert!(verify(&params, DOC_KEY, SignType::Md5));
    }

    #[test]
    fn test_verify_detects_any_single_character_change() {
        let mut params = doc_params();
        let signature = sign(&params, DOC_KEY, SignType::Md5);
        params.insert(SIGN_FIELD, signature);

        let fields: Vec<(String, String)> = params
            .iter()
            .filter(|(k, _)| *k != SIGN_FIELD)
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        for (key, value) in fields {
            let mut tampered = params.clone();
            let mut chars: Vec<char> = value.chars().collect();
            chars[0] = if chars[0] == 'x' { 'y' } else { 'x' };
            tampered.insert(key, chars.into_iter().collect::<String>());
            assert!(!verify(&tampered, DOC_KEY, SignType::Md5));
        }
    }

    #[test]
    fn test_verify_rejects_wrong_key_and_wrong_digest() {
        let mut params = doc_params();
        let signature = sign(&params, DOC_KEY, SignType::Md5);
        params.insert(SIGN_FIELD, signature);
        assert!(!verify(&params, "another-key", SignType::Md5));
        assert!(!verify(&params, DOC_KEY, SignType::HmacSha256));
    }

    #[test]
    fn test_verify_rejects_missing_sign() {
        assert!(!verify(&doc_params(), DOC_KEY, SignType::Md5));
    }

    #[test]
    fn test_sign_type_parse() {
        assert_eq!("MD5".parse::<SignType>().unwrap(), SignType::Md5);
        assert_eq!(
            "HMAC-SHA256".parse::<SignType>().unwrap(),
            SignType::HmacSha256
        );
        assert!("SHA1".parse::<SignType>().is_err());
        assert_eq!(
            serde_json::to_string(&SignType::HmacSha256).unwrap(),
            "\"HMAC-SHA256\""
        );
    }
}
