//! Gateway operations and the URLs they are served at.

use http::Method;
use std::fmt;
use std::fmt::Display;
use url::Url;

/// One of the fixed gateway operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Endpoint {
    /// Order creation ("unified order").
    UnifiedOrder,
    OrderQuery,
    /// Refund. Only reachable with a mutual-TLS client identity.
    Refund,
}

impl Endpoint {
    /// Path relative to the gateway base URL.
    pub const fn path(&self) -> &'static str {
        match self {
            Endpoint::UnifiedOrder => "pay/unifiedorder",
            Endpoint::OrderQuery => "pay/orderquery",
            Endpoint::Refund => "secapi/pay/refund",
        }
    }

    pub fn method(&self) -> Method {
        Method::POST
    }

    /// Operations the gateway classifies as sensitive require a client certificate.
    pub const fn requires_client_identity(&self) -> bool {
        matches!(self, Endpoint::Refund)
    }

    /// Joins [`Endpoint::path`] onto `base_url`.
    pub fn url(&self, base_url: &Url) -> Result<Url, url::ParseError> {
        base_url.join(self.path())
    }
}

impl Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Endpoint::UnifiedOrder => "unified_order",
            Endpoint::OrderQuery => "order_query",
            Endpoint::Refund => "refund",
        };
        f.write_str(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wxpay_types::config::DEFAULT_BASE_URL;

    #[test]
    fn test_production_urls() {
        let base = Url::parse(DEFAULT_BASE_URL).unwrap();
        assert_eq!(
            Endpoint::UnifiedOrder.url(&base).unwrap().as_str(),
            "https://api.mch.weixin.qq.com/pay/unifiedorder"
        );
        assert_eq!(
            Endpoint::OrderQuery.url(&base).unwrap().as_str(),
            "https://api.mch.weixin.qq.com/pay/orderquery"
        );
        assert_eq!(
            Endpoint::Refund.url(&base).unwrap().as_str(),
            "https://api.mch.weixin.qq.com/secapi/pay/refund"
        );
    }

    #[test]
    fn test_urls_keep_base_prefix() {
        let base = Url::parse("https://sandbox.example.com/sandboxnew/").unwrap();
        assert_eq!(
            Endpoint::OrderQuery.url(&base).unwrap().as_str(),
            "https://sandbox.example.com/sandboxnew/pay/orderquery"
        );
    }

    #[test]
    fn test_only_refund_requires_identity() {
        assert!(Endpoint::Refund.requires_client_identity());
        assert!(!Endpoint::UnifiedOrder.requires_client_identity());
        assert!(!Endpoint::OrderQuery.requires_client_identity());
    }
}
