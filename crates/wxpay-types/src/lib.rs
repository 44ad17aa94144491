#![cfg_attr(docsrs, feature(doc_auto_cfg))]

//! Core types for the signed XML merchant payment protocol.
//!
//! This crate holds everything that does not touch the network: the canonical
//! parameter set, the signature engine, the XML codec, typed request/response views,
//! the verifier and the client configuration. The HTTP client and the notification
//! handler live in the `wxpay-rs` crate and are built on top of these pieces.
//!
//! # Overview
//!
//! Every exchange with the gateway is a flat set of fields. Outbound, the client
//! merges its identity (`appid`, `mch_id`, a fresh `nonce_str`) with the
//! operation's fields, signs the result and serializes it as `<xml>...</xml>`.
//! Inbound, the body is decoded into an [`Unverified`](verify::Unverified) message
//! which only a [`Verifier`](verify::Verifier) can turn into a usable
//! [`Verified`](verify::Verified) value.
//!
//! # Modules
//!
//! - [`params`] - Ordered, omission-aware field sets and their canonical string
//! - [`sign`] - MD5 and HMAC-SHA256 signatures over a field set
//! - [`codec`] - XML serialization and parsing
//! - [`proto`] - Typed requests, responses, notifications and status header
//! - [`verify`] - Protocol, signature and business gates
//! - [`error`] - Verification failure taxonomy
//! - [`config`] - Immutable client configuration with env-var resolution
//! - [`nonce`] - Nonce and timestamp generation
//!
//! # Feature Flags
//!
//! - `telemetry` - Emits `tracing` events; signature mismatches are reported on the
//!   `wxpay::integrity` target

pub mod codec;
pub mod config;
pub mod error;
pub mod nonce;
pub mod params;
pub mod proto;
pub mod sign;
pub mod verify;
