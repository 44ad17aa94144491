//! Nonce and timestamp generation.

use rand::Rng;
use rand::distr::Alphanumeric;
use std::time::{SystemTime, UNIX_EPOCH};

/// Length of the `nonce_str` attached to every request. The gateway accepts at most 32.
pub const NONCE_LEN: usize = 32;

/// Returns a random alphanumeric string of `len` characters.
///
/// Drawn from the thread-local CSPRNG, so values are unpredictable as well as unique.
pub fn nonce_str(len: usize) -> String {
    rand::rng()
        .sample_iter(&Alphanumeric)
        .take(len)
        .map(char::from)
        .collect()
}

/// Current Unix time in seconds, as the decimal string the client SDKs expect.
pub fn unix_timestamp() -> String {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or_default()
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_nonce_str_length_and_charset() {
        let nonce = nonce_str(NONCE_LEN);
        assert_eq!(nonce.len(), NONCE_LEN);
        assert!(nonce.chars().all(|c| c.is_ascii_alphanumeric()));
    }

    #[test]
    fn test_nonce_str_is_fresh() {
        assert_ne!(nonce_str(NONCE_LEN), nonce_str(NONCE_LEN));
    }

    #[test]
    fn test_unix_timestamp_is_seconds() {
        let ts = unix_timestamp();
        assert_eq!(ts.len(), 10);
        assert!(ts.parse::<u64>().is_ok());
    }
}
