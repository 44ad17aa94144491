//! Client configuration.
//!
//! [`ClientConfig`] is built once (in code or from a JSON file) and then shared
//! read-only by every call, typically behind an `Arc`. Nothing in this crate mutates
//! it after construction.
//!
//! # Environment Variable Resolution
//!
//! Secrets can be kept out of configuration files. Any field wrapped in
//! [`LiteralOrEnv`] (and the [`Secret`] API key) accepts either a literal value or a
//! reference to an environment variable:
//!
//! ```json
//! {
//!   "app_id": "wx8888888888888888",
//!   "mch_id": "1900000109",
//!   "api_key": "$WXPAY_API_KEY",
//!   "sign_type": "HMAC-SHA256",
//!   "notify_url": "https://shop.example.com/wxpay/notify",
//!   "trade_type": "NATIVE",
//!   "client_identity": {
//!     "cert_path": "${WXPAY_CERT}",
//!     "key_path": "/etc/wxpay/apiclient_key.pem"
//!   }
//! }
//! ```

use serde::Deserialize;
use std::fmt;
use std::fs;
use std::net::IpAddr;
use std::ops::Deref;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;
use url::Url;

use crate::proto::TradeType;
use crate::sign::SignType;

/// Production gateway host.
pub const DEFAULT_BASE_URL: &str = "https://api.mch.weixin.qq.com/";

// ============================================================================
// Environment Variable Resolution
// ============================================================================

/// A transparent wrapper that resolves environment variables during deserialization.
///
/// Supports both literal values and environment variable references:
/// - Literal: `"/etc/wxpay/apiclient_cert.pem"`
/// - Simple env var: `"$WXPAY_CERT"`
/// - Braced env var: `"${WXPAY_CERT}"`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LiteralOrEnv<T>(T);

impl<T> LiteralOrEnv<T> {
    pub fn from_literal(value: T) -> Self {
        Self(value)
    }

    pub fn into_inner(self) -> T {
        self.0
    }

    /// Returns the variable name if the string matches `$VAR` or `${VAR}` syntax.
    fn parse_env_var_syntax(s: &str) -> Option<&str> {
        if let Some(braced) = s.strip_prefix("${").and_then(|r| r.strip_suffix('}')) {
            Some(braced)
        } else if let Some(name) = s.strip_prefix('$') {
            let valid = !name.is_empty() && name.chars().all(|c| c.is_alphanumeric() || c == '_');
            valid.then_some(name)
        } else {
            None
        }
    }
}

impl<T> Deref for LiteralOrEnv<T> {
    type Target = T;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl<'de, T> Deserialize<'de> for LiteralOrEnv<T>
where
    T: FromStr,
    T::Err: fmt::Display,
{
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;

        let value = if let Some(var_name) = Self::parse_env_var_syntax(&s) {
            std::env::var(var_name).map_err(|_| {
                serde::de::Error::custom(format!(
                    "Environment variable '{}' not found (referenced as '{}')",
                    var_name, s
                ))
            })?
        } else {
            s
        };

        let parsed = value
            .parse::<T>()
            .map_err(|e| serde::de::Error::custom(format!("Failed to parse value: {}", e)))?;

        Ok(LiteralOrEnv(parsed))
    }
}

// ============================================================================
// Secrets
// ============================================================================

/// The merchant API key. Never printed by `Debug`.
#[derive(Clone, PartialEq, Eq)]
pub struct Secret(String);

impl Secret {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for Secret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Secret(***)")
    }
}

impl<'de> Deserialize<'de> for Secret {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let value = LiteralOrEnv::<String>::deserialize(deserializer)?;
        Ok(Secret(value.into_inner()))
    }
}

// ============================================================================
// Client Configuration
// ============================================================================

/// PEM files holding the merchant certificate and private key for mutual TLS.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ClientIdentityConfig {
    pub cert_path: LiteralOrEnv<PathBuf>,
    pub key_path: LiteralOrEnv<PathBuf>,
}

impl ClientIdentityConfig {
    pub fn new(cert_path: impl Into<PathBuf>, key_path: impl Into<PathBuf>) -> Self {
        Self {
            cert_path: LiteralOrEnv::from_literal(cert_path.into()),
            key_path: LiteralOrEnv::from_literal(key_path.into()),
        }
    }
}

/// Merchant identity and protocol settings shared by all calls.
#[derive(Debug, Clone, Deserialize)]
pub struct ClientConfig {
    app_id: String,
    mch_id: String,
    api_key: Secret,
    #[serde(default)]
    sign_type: SignType,
    #[serde(default)]
    notify_url: Option<String>,
    #[serde(default)]
    trade_type: Option<TradeType>,
    #[serde(default)]
    server_addr: Option<IpAddr>,
    #[serde(default)]
    client_identity: Option<ClientIdentityConfig>,
    #[serde(default = "config_defaults::default_base_url")]
    base_url: Url,
    /// Per-request deadline in milliseconds
    #[serde(default)]
    timeout_ms: Option<u64>,
}

pub mod config_defaults {
    use url::Url;

    /// Returns the production base URL, or `$WXPAY_BASE_URL` when set and valid.
    pub fn default_base_url() -> Url {
        std::env::var("WXPAY_BASE_URL")
            .ok()
            .and_then(|s| Url::parse(&s).ok())
            .unwrap_or_else(production_base_url)
    }

    pub(super) fn production_base_url() -> Url {
        Url::parse(super::DEFAULT_BASE_URL).expect("valid default base url")
    }
}

/// Configuration error types.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file at {0}: {1}")]
    FileRead(PathBuf, std::io::Error),
    #[error("Failed to parse config file: {0}")]
    JsonParse(#[from] serde_json::Error),
}

impl ClientConfig {
    /// Creates a configuration with MD5 signatures and the production gateway.
    pub fn new(app_id: impl Into<String>, mch_id: impl Into<String>, api_key: Secret) -> Self {
        Self {
            app_id: app_id.into(),
            mch_id: mch_id.into(),
            api_key,
            sign_type: SignType::default(),
            notify_url: None,
            trade_type: None,
            server_addr: None,
            client_identity: None,
            base_url: config_defaults::production_base_url(),
            timeout_ms: None,
        }
    }

    /// Loads configuration from a JSON file.
    pub fn load_from_path(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content =
            fs::read_to_string(path).map_err(|e| ConfigError::FileRead(path.to_path_buf(), e))?;
        let config: ClientConfig = serde_json::from_str(&content)?;
        Ok(config)
    }

    pub fn with_sign_type(mut self, sign_type: SignType) -> Self {
        self.sign_type = sign_type;
        self
    }

    pub fn with_notify_url(mut self, notify_url: impl Into<String>) -> Self {
        self.notify_url = Some(notify_url.into());
        self
    }

    pub fn with_trade_type(mut self, trade_type: TradeType) -> Self {
        self.trade_type = Some(trade_type);
        self
    }

    pub fn with_server_addr(mut self, server_addr: IpAddr) -> Self {
        self.server_addr = Some(server_addr);
        self
    }

    pub fn with_client_identity(mut self, identity: ClientIdentityConfig) -> Self {
        self.client_identity = Some(identity);
        self
    }

    pub fn with_base_url(mut self, base_url: Url) -> Self {
        self.base_url = base_url;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout_ms = Some(u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX));
        self
    }

    pub fn app_id(&self) -> &str {
        &self.app_id
    }

    pub fn mch_id(&self) -> &str {
        &self.mch_id
    }

    pub fn api_key(&self) -> &Secret {
        &self.api_key
    }

    pub fn sign_type(&self) -> SignType {
        self.sign_type
    }

    pub fn notify_url(&self) -> Option<&str> {
        self.notify_url.as_deref()
    }

    /// Default trade classification for order creation.
    pub fn trade_type(&self) -> Option<TradeType> {
        self.trade_type
    }

    /// Server-side IP used as `spbill_create_ip` for `NATIVE` and `MWEB` orders.
    pub fn server_addr(&self) -> Option<IpAddr> {
        self.server_addr
    }

    pub fn client_identity(&self) -> Option<&ClientIdentityConfig> {
        self.client_identity.as_ref()
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    pub fn timeout(&self) -> Option<Duration> {
        self.timeout_ms.map(Duration::from_millis)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_secret_is_redacted() {
        let config = ClientConfig::new("wx123", "1900000", Secret::new("testkey"));
        let debug = format!("{config:?}");
        assert!(!debug.contains("testkey"));
        assert!(debug.contains("Secret(***)"));
    }

    #[test]
    fn test_parse_env_var_syntax() {
        assert_eq!(LiteralOrEnv::<String>::parse_env_var_syntax("$KEY"), Some("KEY"));
        assert_eq!(
            LiteralOrEnv::<String>::parse_env_var_syntax("${KEY_2}"),
            Some("KEY_2")
        );
        assert_eq!(LiteralOrEnv::<String>::parse_env_var_syntax("$"), None);
        assert_eq!(LiteralOrEnv::<String>::parse_env_var_syntax("$a-b"), None);
        assert_eq!(LiteralOrEnv::<String>::parse_env_var_syntax("plain"), None);
    }

    #[test]
    fn test_deserialize_with_defaults() {
        let config: ClientConfig = serde_json::from_str(
            r#"{"app_id": "wx123", "mch_id": "1900000", "api_key": "testkey"}"#,
        )
        .unwrap();
        assert_eq!(config.app_id(), "wx123");
        assert_eq!(config.api_key().expose(), "testkey");
        assert_eq!(config.sign_type(), SignType::Md5);
        assert_eq!(config.trade_type(), None);
        assert_eq!(config.timeout(), None);
        assert!(config.client_identity().is_none());
    }

    #[test]
    fn test_deserialize_full() {
        let config: ClientConfig = serde_json::from_str(
            r#"{
                "app_id": "wx123",
                "mch_id": "1900000",
                "api_key": "testkey",
                "sign_type": "HMAC-SHA256",
                "notify_url": "https://shop.example.com/notify",
                "trade_type": "NATIVE",
                "server_addr": "10.0.0.1",
                "client_identity": {"cert_path": "/tmp/cert.pem", "key_path": "/tmp/key.pem"},
                "base_url": "https://sandbox.example.com/",
                "timeout_ms": 5000
            }"#,
        )
        .unwrap();
        assert_eq!(config.sign_type(), SignType::HmacSha256);
        assert_eq!(config.trade_type(), Some(TradeType::Native));
        assert_eq!(config.server_addr(), Some("10.0.0.1".parse().unwrap()));
        assert_eq!(config.base_url().as_str(), "https://sandbox.example.com/");
        assert_eq!(config.timeout(), Some(Duration::from_secs(5)));
        let identity = config.client_identity().unwrap();
        assert_eq!(*identity.cert_path, PathBuf::from("/tmp/cert.pem"));
    }

    #[test]
    fn test_sub_second_timeout_is_kept() {
        let config = ClientConfig::new("wx123", "1900000", Secret::new("testkey"))
            .with_timeout(Duration::from_millis(500));
        assert_eq!(config.timeout(), Some(Duration::from_millis(500)));
    }

    #[test]
    fn test_api_key_from_missing_env_var_fails() {
        let result: Result<ClientConfig, _> = serde_json::from_str(
            r#"{"app_id": "a", "mch_id": "m", "api_key": "$WXPAY_TEST_SURELY_UNSET_VAR"}"#,
        );
        assert!(result.is_err());
    }
}
