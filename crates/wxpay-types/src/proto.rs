//! Typed views of the gateway messages.
//!
//! Requests are plain `Serialize` structs that get flattened into a
//! [`ParamSet`](crate::params::ParamSet) before signing; the common identity fields
//! (`appid`, `mch_id`, `nonce_str`, `sign_type`, `sign`) are added by the client and
//! are not part of these types.
//!
//! Responses only describe operation-specific fields. The status header shared by
//! every reply (`return_code`, `result_code`, ...) is read from the raw field set into
//! a [`ResponseStatus`].

use serde::{Deserialize, Serialize};
use std::fmt;
use std::fmt::Display;
use std::str::FromStr;

use crate::params::ParamSet;

/// Literal success marker of both `return_code` and `result_code`.
pub const SUCCESS: &str = "SUCCESS";

/// Trade classification of an order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TradeType {
    /// Public-account and mini-program payments.
    #[serde(rename = "JSAPI")]
    Jsapi,
    /// QR code payments.
    #[serde(rename = "NATIVE")]
    Native,
    /// In-app payments.
    #[serde(rename = "APP")]
    App,
    /// In-browser (H5) payments.
    #[serde(rename = "MWEB")]
    Mweb,
}

impl TradeType {
    pub const fn as_str(&self) -> &'static str {
        match self {
            TradeType::Jsapi => "JSAPI",
            TradeType::Native => "NATIVE",
            TradeType::App => "APP",
            TradeType::Mweb => "MWEB",
        }
    }
}

impl Display for TradeType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, thiserror::Error)]
#[error("Unknown trade type: {0}")]
pub struct UnknownTradeType(pub String);

impl FromStr for TradeType {
    type Err = UnknownTradeType;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "JSAPI" => Ok(TradeType::Jsapi),
            "NATIVE" => Ok(TradeType::Native),
            "APP" => Ok(TradeType::App),
            "MWEB" => Ok(TradeType::Mweb),
            other => Err(UnknownTradeType(other.to_string())),
        }
    }
}

/// State of an order as reported by an order query.
///
/// Unknown values are kept as [`TradeState::Other`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum TradeState {
    Success,
    Refund,
    NotPay,
    Closed,
    /// Revoked (card payments only).
    Revoked,
    UserPaying,
    /// Failed for other reasons, e.g. rejected by the bank.
    PayError,
    Other(String),
}

impl TradeState {
    pub fn as_str(&self) -> &str {
        match self {
            TradeState::Success => "SUCCESS",
            TradeState::Refund => "REFUND",
            TradeState::NotPay => "NOTPAY",
            TradeState::Closed => "CLOSED",
            TradeState::Revoked => "REVOKED",
            TradeState::UserPaying => "USERPAYING",
            TradeState::PayError => "PAYERROR",
            TradeState::Other(s) => s,
        }
    }
}

impl From<String> for TradeState {
    fn from(value: String) -> Self {
        match value.as_str() {
            "SUCCESS" => TradeState::Success,
            "REFUND" => TradeState::Refund,
            "NOTPAY" => TradeState::NotPay,
            "CLOSED" => TradeState::Closed,
            "REVOKED" => TradeState::Revoked,
            "USERPAYING" => TradeState::UserPaying,
            "PAYERROR" => TradeState::PayError,
            _ => TradeState::Other(value),
        }
    }
}

impl From<TradeState> for String {
    fn from(value: TradeState) -> Self {
        match value {
            TradeState::Other(s) => s,
            known => known.as_str().to_string(),
        }
    }
}

impl Display for TradeState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Status header shared by every response and notification.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ResponseStatus {
    /// Whether the gateway could process the request at all.
    pub return_code: Option<String>,
    pub return_msg: Option<String>,
    /// Whether the requested operation succeeded. Only meaningful when
    /// `return_code` is [`SUCCESS`].
    pub result_code: Option<String>,
    pub err_code: Option<String>,
    pub err_code_des: Option<String>,
}

impl ResponseStatus {
    pub fn from_params(params: &ParamSet) -> Self {
        let field = |key: &str| params.get(key).map(str::to_string);
        Self {
            return_code: field("return_code"),
            return_msg: field("return_msg"),
            result_code: field("result_code"),
            err_code: field("err_code"),
            err_code_des: field("err_code_des"),
        }
    }

    pub fn is_communication_success(&self) -> bool {
        self.return_code.as_deref() == Some(SUCCESS)
    }

    pub fn is_business_success(&self) -> bool {
        self.result_code.as_deref() == Some(SUCCESS)
    }
}

/// Order creation ("unified order") request.
///
/// `notify_url`, `trade_type` and `spbill_create_ip` fall back to the client
/// configuration when left empty.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct UnifiedOrderRequest {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub device_info: Option<String>,
    pub body: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub attach: Option<String>,
    pub out_trade_no: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fee_type: Option<String>,
    /// Amount in the smallest currency unit.
    pub total_fee: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub spbill_create_ip: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub time_start: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub time_expire: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub goods_tag: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub notify_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub trade_type: Option<TradeType>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub product_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub limit_pay: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub openid: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub scene_info: Option<String>,
}

impl UnifiedOrderRequest {
    pub fn new(body: impl Into<String>, out_trade_no: impl Into<String>, total_fee: u64) -> Self {
        Self {
            body: body.into(),
            out_trade_no: out_trade_no.into(),
            total_fee,
            ..Default::default()
        }
    }

    pub fn with_openid(mut self, openid: impl Into<String>) -> Self {
        self.openid = Some(openid.into());
        self
    }

    pub fn with_client_ip(mut self, ip: impl Into<String>) -> Self {
        self.spbill_create_ip = Some(ip.into());
        self
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct UnifiedOrderResponse {
    pub device_info: Option<String>,
    pub trade_type: Option<String>,
    pub prepay_id: Option<String>,
    /// QR code content, `NATIVE` orders only.
    pub code_url: Option<String>,
    /// Redirect URL, `MWEB` orders only.
    pub mweb_url: Option<String>,
}

/// Order query. At least one of the two references must be set.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct OrderQueryRequest {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub transaction_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub out_trade_no: Option<String>,
}

impl OrderQueryRequest {
    pub fn by_transaction_id(transaction_id: impl Into<String>) -> Self {
        Self {
            transaction_id: Some(transaction_id.into()),
            out_trade_no: None,
        }
    }

    pub fn by_out_trade_no(out_trade_no: impl Into<String>) -> Self {
        Self {
            transaction_id: None,
            out_trade_no: Some(out_trade_no.into()),
        }
    }

    pub fn has_reference(&self) -> bool {
        self.transaction_id.as_deref().is_some_and(|s| !s.is_empty())
            || self.out_trade_no.as_deref().is_some_and(|s| !s.is_empty())
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct OrderQueryResponse {
    pub device_info: Option<String>,
    pub openid: Option<String>,
    pub is_subscribe: Option<String>,
    pub trade_type: Option<String>,
    pub trade_state: Option<TradeState>,
    pub bank_type: Option<String>,
    pub total_fee: Option<u64>,
    pub settlement_total_fee: Option<u64>,
    pub fee_type: Option<String>,
    pub cash_fee: Option<u64>,
    pub cash_fee_type: Option<String>,
    pub coupon_fee: Option<u64>,
    pub transaction_id: Option<String>,
    pub out_trade_no: Option<String>,
    pub attach: Option<String>,
    pub time_end: Option<String>,
    pub trade_state_desc: Option<String>,
}

/// Refund request. Sent over the mutual-TLS connection.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct RefundRequest {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub transaction_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub out_trade_no: Option<String>,
    pub out_refund_no: String,
    pub total_fee: u64,
    pub refund_fee: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub refund_fee_type: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub refund_desc: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub refund_account: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub notify_url: Option<String>,
}

impl RefundRequest {
    pub fn has_reference(&self) -> bool {
        self.transaction_id.as_deref().is_some_and(|s| !s.is_empty())
            || self.out_trade_no.as_deref().is_some_and(|s| !s.is_empty())
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RefundResponse {
    pub transaction_id: Option<String>,
    pub out_trade_no: Option<String>,
    pub out_refund_no: Option<String>,
    pub refund_id: Option<String>,
    pub refund_fee: Option<u64>,
    pub settlement_refund_fee: Option<u64>,
    pub total_fee: Option<u64>,
    pub settlement_total_fee: Option<u64>,
    pub fee_type: Option<String>,
    pub cash_fee: Option<u64>,
    pub cash_refund_fee: Option<u64>,
}

/// Asynchronous payment result pushed by the gateway.
///
/// The business outcome is carried by the status header (`result_code`).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PayNotification {
    pub appid: Option<String>,
    pub mch_id: Option<String>,
    pub device_info: Option<String>,
    pub openid: Option<String>,
    pub is_subscribe: Option<String>,
    pub trade_type: Option<String>,
    pub bank_type: Option<String>,
    pub total_fee: Option<u64>,
    pub settlement_total_fee: Option<u64>,
    pub fee_type: Option<String>,
    pub cash_fee: Option<u64>,
    pub cash_fee_type: Option<String>,
    pub coupon_fee: Option<u64>,
    pub coupon_count: Option<u64>,
    pub transaction_id: Option<String>,
    pub out_trade_no: Option<String>,
    pub attach: Option<String>,
    pub time_end: Option<String>,
}

/// Parameters handed to the mobile SDK to launch an in-app payment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AppPayParams {
    pub appid: String,
    pub partnerid: String,
    pub prepayid: String,
    pub package: String,
    pub noncestr: String,
    pub timestamp: String,
    pub sign: String,
}

/// Parameters handed to the in-browser bridge to launch a JSAPI payment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct JsapiPayParams {
    pub app_id: String,
    pub time_stamp: String,
    pub nonce_str: String,
    pub package: String,
    pub sign_type: String,
    pub pay_sign: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_trade_state_roundtrip_with_unknown_value() {
        let known: TradeState = serde_json::from_str("\"NOTPAY\"").unwrap();
        assert_eq!(known, TradeState::NotPay);
        let unknown: TradeState = serde_json::from_str("\"ACCEPT\"").unwrap();
        assert_eq!(unknown, TradeState::Other("ACCEPT".into()));
        assert_eq!(serde_json::to_string(&unknown).unwrap(), "\"ACCEPT\"");
    }

    #[test]
    fn test_unified_order_request_flattens_without_empty_fields() {
        let mut request = UnifiedOrderRequest::new("Test Order", "T001", 100);
        request.trade_type = Some(TradeType::Native);
        let params = ParamSet::from_serialize(&request).unwrap();
        assert_eq!(params.get("trade_type"), Some("NATIVE"));
        assert_eq!(params.get("total_fee"), Some("100"));
        assert_eq!(params.len(), 4);
    }

    #[test]
    fn test_response_status_from_params() {
        let params = ParamSet::new()
            .with("return_code", "SUCCESS")
            .with("result_code", "FAIL")
            .with("err_code", "ORDERPAID");
        let status = ResponseStatus::from_params(&params);
        assert!(status.is_communication_success());
        assert!(!status.is_business_success());
        assert_eq!(status.err_code.as_deref(), Some("ORDERPAID"));
        assert_eq!(status.return_msg, None);
    }

    #[test]
    fn test_order_query_reference() {
        assert!(!OrderQueryRequest::default().has_reference());
        assert!(OrderQueryRequest::by_out_trade_no("T001").has_reference());
        assert!(!OrderQueryRequest::by_transaction_id("").has_reference());
    }

    #[test]
    fn test_jsapi_params_use_camel_case() {
        let params = JsapiPayParams {
            app_id: "wx".into(),
            time_stamp: "1".into(),
            nonce_str: "n".into(),
            package: "prepay_id=p".into(),
            sign_type: "MD5".into(),
            pay_sign: "S".into(),
        };
        let json = serde_json::to_value(&params).unwrap();
        assert_eq!(json["appId"], "wx");
        assert_eq!(json["paySign"], "S");
    }
}
