//! Client for a signed XML-over-HTTP merchant payment gateway.
//!
//! Every exchange with the gateway is a flat set of fields signed with a shared
//! merchant key (MD5 or HMAC-SHA256) and carried as an `<xml>` body. This crate
//! provides the HTTPS client that signs, sends and verifies those exchanges, and a
//! handler for the asynchronous notifications the gateway pushes back.
//!
//! Protocol types that do not touch the network (parameter sets, signatures, the XML
//! codec, typed messages, verification, configuration) live in the `wxpay-types`
//! crate and are re-exported here as [`types`].
//!
//! # Modules
//!
//! - [`client`] - [`WxPayClient`](client::WxPayClient): order creation, query and refund
//! - [`endpoint`] - Gateway operations and their URLs
//! - [`transport`] - The [`Transport`](transport::Transport) trait and its `reqwest` implementation
//! - [`notify`] - Notification verification with a re-readable request body
//! - [`error`] - Error taxonomy of client calls
//! - `telemetry` - Tracing subscriber setup (with the `telemetry` feature)
//!
//! # Trust Boundary
//!
//! Response content is only reachable through
//! [`Verified`](types::verify::Verified), which the client produces after the protocol,
//! signature and business checks pass. A
//! [`WxPayError::SignatureMismatch`](error::WxPayError::SignatureMismatch) means the
//! content may have been tampered with and must not drive any business decision.
//!
//! # Feature Flags
//!
//! - `telemetry` (default) - Tracing spans around every gateway call and a subscriber
//!   builder for binaries

pub mod client;
pub mod endpoint;
pub mod error;
pub mod notify;
#[cfg(feature = "telemetry")]
pub mod telemetry;
pub mod transport;

pub use wxpay_types as types;
