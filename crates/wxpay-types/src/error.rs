//! Failure classes of response and notification verification.

use crate::codec::CodecError;

/// Why a signature check failed. Every variant means the content is untrusted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MismatchReason {
    /// The message carries no `sign` field.
    MissingSign,
    /// The message names a `sign_type` this client does not implement.
    UnsupportedSignType,
    /// The recomputed signature differs from the provided one.
    Mismatch,
}

impl std::fmt::Display for MismatchReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MismatchReason::MissingSign => f.write_str("sign field missing"),
            MismatchReason::UnsupportedSignType => f.write_str("unsupported sign_type"),
            MismatchReason::Mismatch => f.write_str("signature does not match"),
        }
    }
}

/// A response or notification that did not pass verification.
///
/// Gates run in order (well-formedness, protocol status, signature, business status)
/// and the first failure is returned.
#[derive(Debug, thiserror::Error)]
pub enum VerifyError {
    #[error("Malformed response: {0}")]
    MalformedResponse(#[from] CodecError),
    #[error("Gateway communication failure: {}", return_msg.as_deref().unwrap_or("<no message>"))]
    Communication { return_msg: Option<String> },
    /// The content cannot be trusted and must not drive any business decision.
    #[error("Signature mismatch: {reason}")]
    SignatureMismatch { reason: MismatchReason },
    #[error(
        "Business failure: {}: {}",
        err_code.as_deref().unwrap_or("<no code>"),
        err_code_des.as_deref().unwrap_or("<no description>")
    )]
    Business {
        err_code: Option<String>,
        err_code_des: Option<String>,
    },
}

impl VerifyError {
    /// `true` when the message may have been tampered with.
    pub fn is_integrity_failure(&self) -> bool {
        matches!(self, VerifyError::SignatureMismatch { .. })
    }
}
