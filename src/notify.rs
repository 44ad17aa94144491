//! Asynchronous notification handling.
//!
//! The gateway pushes payment results to the merchant's `notify_url` as a signed XML
//! body. [`NotificationHandler`] verifies such a body (protocol and signature gates)
//! and exposes the typed [`PayNotification`]. The merchant answers with a
//! [`NotifyReply`].
//!
//! When used from inside an HTTP framework, [`NotificationHandler::handle_request`]
//! buffers the request body frame by frame, verifies it, and puts the body back so that
//! later handlers can read it again. This holds on every outcome: a body that is too
//! large or fails mid-stream is restored from the bytes already read.

use axum::body::Body;
use axum::response::{IntoResponse, Response};
use bytes::{Bytes, BytesMut};
use futures_util::{StreamExt, stream};
use http::header::CONTENT_TYPE;
use http::{Request, StatusCode};
use serde::de::DeserializeOwned;
use wxpay_types::codec;
use wxpay_types::config::ClientConfig;
use wxpay_types::error::VerifyError;
use wxpay_types::params::ParamSet;
use wxpay_types::proto::{PayNotification, SUCCESS};
use wxpay_types::verify::{Unverified, Verified, Verifier};

use crate::transport::XML_CONTENT_TYPE;

/// Largest notification body that will be buffered.
pub const MAX_NOTIFY_BODY_SIZE: usize = 64 * 1024;

#[derive(Debug, thiserror::Error)]
pub enum NotifyError {
    #[error("Failed to read notification body: {0}")]
    Body(#[source] axum::Error),
    #[error("Notification body exceeds {limit} bytes")]
    TooLarge { limit: usize },
    #[error(transparent)]
    Verify(#[from] VerifyError),
}

/// Verifies notifications with the merchant key.
#[derive(Debug, Clone)]
pub struct NotificationHandler {
    verifier: Verifier,
}

impl NotificationHandler {
    pub fn new(verifier: Verifier) -> Self {
        Self { verifier }
    }

    pub fn from_config(config: &ClientConfig) -> Self {
        Self::new(Verifier::from_config(config))
    }

    /// Verifies a payment notification body.
    pub fn handle(&self, body: &[u8]) -> Result<Verified<PayNotification>, VerifyError> {
        self.handle_as(body)
    }

    /// Verifies a notification body and decodes it as `T`.
    pub fn handle_as<T: DeserializeOwned>(&self, body: &[u8]) -> Result<Verified<T>, VerifyError> {
        let message = Unverified::<T>::from_wire(body)?;
        let verified = self.verifier.verify_notification(message)?;
        #[cfg(feature = "telemetry")]
        tracing::debug!(
            out_trade_no = verified.params().get("out_trade_no"),
            transaction_id = verified.params().get("transaction_id"),
            result_code = verified.status().result_code.as_deref(),
            "Notification verified"
        );
        Ok(verified)
    }

    /// Verifies the body of an incoming HTTP request.
    ///
    /// The body is put back before returning, whatever the outcome. On a read error
    /// the restored body holds the bytes read so far. On an oversized body it holds
    /// the buffered prefix followed by the unread remainder.
    pub async fn handle_request(
        &self,
        request: &mut Request<Body>,
    ) -> Result<Verified<PayNotification>, NotifyError> {
        let bytes = buffer_body(request).await?;
        let verified = self.handle(&bytes)?;
        Ok(verified)
    }
}

async fn buffer_body(request: &mut Request<Body>) -> Result<Bytes, NotifyError> {
    let mut frames = std::mem::take(request.body_mut()).into_data_stream();
    let mut buffered = BytesMut::new();
    while let Some(frame) = frames.next().await {
        match frame {
            Ok(chunk) => {
                buffered.extend_from_slice(&chunk);
                if buffered.len() > MAX_NOTIFY_BODY_SIZE {
                    let prefix = stream::iter([Ok::<_, axum::Error>(buffered.freeze())]);
                    *request.body_mut() = Body::from_stream(prefix.chain(frames));
                    return Err(NotifyError::TooLarge {
                        limit: MAX_NOTIFY_BODY_SIZE,
                    });
                }
            }
            Err(e) => {
                *request.body_mut() = Body::from(buffered.freeze());
                return Err(NotifyError::Body(e));
            }
        }
    }
    let bytes = buffered.freeze();
    *request.body_mut() = Body::from(bytes.clone());
    Ok(bytes)
}

/// The merchant's answer to a notification.
///
/// A `FAIL` reply (or no reply) makes the gateway deliver the notification again.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NotifyReply {
    return_code: String,
    return_msg: String,
}

impl NotifyReply {
    pub fn success() -> Self {
        Self {
            return_code: SUCCESS.to_string(),
            return_msg: "OK".to_string(),
        }
    }

    pub fn fail(message: impl Into<String>) -> Self {
        Self {
            return_code: "FAIL".to_string(),
            return_msg: message.into(),
        }
    }

    pub fn is_success(&self) -> bool {
        self.return_code == SUCCESS
    }

    pub fn to_wire(&self) -> Vec<u8> {
        let params = ParamSet::new()
            .with("return_code", &self.return_code)
            .with("return_msg", &self.return_msg);
        codec::to_wire(&params)
    }
}

impl IntoResponse for NotifyReply {
    fn into_response(self) -> Response {
        (
            StatusCode::OK,
            [(CONTENT_TYPE, XML_CONTENT_TYPE)],
            self.to_wire(),
        )
            .into_response()
    }
}

impl From<&NotifyError> for NotifyReply {
    fn from(value: &NotifyError) -> Self {
        match value {
            NotifyError::Body(_) => NotifyReply::fail("unreadable body"),
            NotifyError::TooLarge { .. } => NotifyReply::fail("body too large"),
            NotifyError::Verify(VerifyError::SignatureMismatch { .. }) => {
                NotifyReply::fail("invalid signature")
            }
            NotifyError::Verify(_) => NotifyReply::fail("invalid notification"),
        }
    }
}
