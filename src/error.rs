//! Error taxonomy of client calls.

use wxpay_types::codec::CodecError;
use wxpay_types::error::{MismatchReason, VerifyError};
use wxpay_types::params::ParamsError;
use wxpay_types::proto::TradeType;

use crate::transport::TransportError;

/// A client call that did not produce a verified result.
///
/// Exactly one class is reported per call; no partial results are returned.
#[derive(Debug, thiserror::Error)]
pub enum WxPayError {
    /// Network, TLS or timeout failure. Not retried.
    #[error(transparent)]
    Transport(#[from] TransportError),
    #[error("Malformed response: {0}")]
    MalformedResponse(#[source] CodecError),
    #[error("Gateway communication failure: {}", return_msg.as_deref().unwrap_or("<no message>"))]
    Communication { return_msg: Option<String> },
    /// The response cannot be trusted. Never act on it and never retry blindly.
    #[error("Signature mismatch: {reason}")]
    SignatureMismatch { reason: MismatchReason },
    /// Authenticated rejection of the operation (duplicate order, bad parameters, ...).
    #[error(
        "Business failure: {}: {}",
        err_code.as_deref().unwrap_or("<no code>"),
        err_code_des.as_deref().unwrap_or("<no description>")
    )]
    Business {
        err_code: Option<String>,
        err_code_des: Option<String>,
    },
    #[error("Invalid request parameters: {0}")]
    InvalidParams(#[from] ParamsError),
    #[error("Trade type mismatch: expected {expected}, configured {}", configured.map(|t| t.as_str()).unwrap_or("<none>"))]
    TradeTypeMismatch {
        expected: TradeType,
        configured: Option<TradeType>,
    },
    #[error("Either transaction_id or out_trade_no is required")]
    MissingOrderReference,
}

impl WxPayError {
    /// `true` when the response may have been tampered with.
    pub fn is_integrity_failure(&self) -> bool {
        matches!(self, WxPayError::SignatureMismatch { .. })
    }
}

impl From<VerifyError> for WxPayError {
    fn from(value: VerifyError) -> Self {
        match value {
            VerifyError::MalformedResponse(e) => WxPayError::MalformedResponse(e),
            VerifyError::Communication { return_msg } => WxPayError::Communication { return_msg },
            VerifyError::SignatureMismatch { reason } => WxPayError::SignatureMismatch { reason },
            VerifyError::Business {
                err_code,
                err_code_des,
            } => WxPayError::Business {
                err_code,
                err_code_des,
            },
        }
    }
}
