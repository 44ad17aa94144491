//! Response and notification verification.
//!
//! Parsing and verification are separate steps with separate types. A body decoded
//! with [`Unverified::from_wire`] exposes only its raw field set; the typed view
//! becomes reachable once a [`Verifier`] has turned it into a [`Verified`]. Business
//! code therefore cannot act on content whose signature was never checked.
//!
//! Gates, in order, each terminal on failure:
//!
//! 1. protocol: `return_code` must be `SUCCESS`, else [`VerifyError::Communication`];
//! 2. signature: `sign` must match a locally recomputed signature, else
//!    [`VerifyError::SignatureMismatch`];
//! 3. business (responses only): `result_code` must be `SUCCESS`, else
//!    [`VerifyError::Business`].
//!
//! Notifications stop after gate 2: the business outcome is part of their payload.
//!
//! The typed view is decoded only once every gate has passed, so a rejected message is
//! classified by its status and signature, never by the shape of its payload.

use serde::de::DeserializeOwned;
use std::marker::PhantomData;
use std::ops::Deref;

use crate::codec;
use crate::config::{ClientConfig, Secret};
use crate::error::{MismatchReason, VerifyError};
use crate::params::{ParamSet, SIGN_FIELD};
use crate::proto::ResponseStatus;
use crate::sign::{self, SignType};

/// Field naming the digest the sender used.
pub const SIGN_TYPE_FIELD: &str = "sign_type";

/// A decoded message whose signature has not been checked yet.
///
/// `T` is the typed view the message will expose once verified.
#[derive(Debug)]
pub struct Unverified<T> {
    params: ParamSet,
    _body: PhantomData<fn() -> T>,
}

impl<T> Unverified<T> {
    /// Decodes a response or notification body.
    pub fn from_wire(bytes: &[u8]) -> Result<Self, VerifyError> {
        let params = codec::parse_message(bytes)?;
        Ok(Self {
            params,
            _body: PhantomData,
        })
    }

    /// Raw fields as received. Untrusted.
    pub fn params(&self) -> &ParamSet {
        &self.params
    }
}

/// A message that passed verification.
#[derive(Debug, Clone)]
pub struct Verified<T> {
    body: T,
    status: ResponseStatus,
    params: ParamSet,
}

impl<T> Verified<T> {
    pub fn body(&self) -> &T {
        &self.body
    }

    pub fn into_body(self) -> T {
        self.body
    }

    pub fn status(&self) -> &ResponseStatus {
        &self.status
    }

    /// Every field received, including ones the typed view does not know about.
    pub fn params(&self) -> &ParamSet {
        &self.params
    }

    pub fn into_parts(self) -> (T, ResponseStatus, ParamSet) {
        (self.body, self.status, self.params)
    }
}

impl<T> Deref for Verified<T> {
    type Target = T;

    fn deref(&self) -> &Self::Target {
        &self.body
    }
}

/// Checks status codes and signatures with the merchant key.
///
/// Holds no mutable state; one instance can serve any number of concurrent calls.
#[derive(Debug, Clone)]
pub struct Verifier {
    key: Secret,
    sign_type: SignType,
}

impl Verifier {
    pub fn new(key: Secret, sign_type: SignType) -> Self {
        Self { key, sign_type }
    }

    pub fn from_config(config: &ClientConfig) -> Self {
        Self::new(config.api_key().clone(), config.sign_type())
    }

    /// Runs the protocol, signature and business gates over a direct response.
    pub fn verify_response<T: DeserializeOwned>(
        &self,
        message: Unverified<T>,
    ) -> Result<Verified<T>, VerifyError> {
        let (status, params) = self.authenticate(message)?;
        if !status.is_business_success() {
            return Err(VerifyError::Business {
                err_code: status.err_code,
                err_code_des: status.err_code_des,
            });
        }
        into_verified(status, params)
    }

    /// Runs the protocol and signature gates over an asynchronous notification.
    pub fn verify_notification<T: DeserializeOwned>(
        &self,
        message: Unverified<T>,
    ) -> Result<Verified<T>, VerifyError> {
        let (status, params) = self.authenticate(message)?;
        into_verified(status, params)
    }

    /// Checks the `sign` field of `params`.
    ///
    /// The digest is the one named by the message's `sign_type` field when present,
    /// the configured one otherwise.
    pub fn check_signature(&self, params: &ParamSet) -> Result<(), VerifyError> {
        if !params.contains(SIGN_FIELD) {
            return Err(signature_mismatch(params, MismatchReason::MissingSign));
        }
        let sign_type = match params.get(SIGN_TYPE_FIELD) {
            Some(declared) => declared.parse::<SignType>().map_err(|_| {
                signature_mismatch(params, MismatchReason::UnsupportedSignType)
            })?,
            None => self.sign_type,
        };
        if !sign::verify(params, self.key.expose(), sign_type) {
            return Err(signature_mismatch(params, MismatchReason::Mismatch));
        }
        Ok(())
    }

    fn authenticate<T>(
        &self,
        message: Unverified<T>,
    ) -> Result<(ResponseStatus, ParamSet), VerifyError> {
        let params = message.params;
        let status = ResponseStatus::from_params(&params);
        if !status.is_communication_success() {
            return Err(VerifyError::Communication {
                return_msg: status.return_msg,
            });
        }
        self.check_signature(&params)?;
        Ok((status, params))
    }
}

fn into_verified<T: DeserializeOwned>(
    status: ResponseStatus,
    params: ParamSet,
) -> Result<Verified<T>, VerifyError> {
    let body = codec::decode_fields(&params)?;
    Ok(Verified {
        body,
        status,
        params,
    })
}

#[cfg_attr(not(feature = "telemetry"), allow(unused_variables))]
fn signature_mismatch(params: &ParamSet, reason: MismatchReason) -> VerifyError {
    #[cfg(feature = "telemetry")]
    tracing::warn!(
        target: "wxpay::integrity",
        %reason,
        out_trade_no = params.get("out_trade_no"),
        transaction_id = params.get("transaction_id"),
        "Rejected message with invalid signature"
    );
    VerifyError::SignatureMismatch { reason }
}
