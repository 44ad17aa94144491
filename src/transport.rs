//! Transport dispatcher.
//!
//! A [`Transport`] takes a serialized request body and an [`Endpoint`] and returns the
//! raw response body. It does not retry and does not interpret the body; a failure is
//! handed back to the caller as-is.
//!
//! [`ReqwestTransport`] is the HTTPS implementation. It keeps two `reqwest` clients:
//! a plain one, and one presenting the merchant certificate for operations that
//! require mutual TLS (see [`Endpoint::requires_client_identity`]).

use bytes::Bytes;
use http::StatusCode;
use http::header::CONTENT_TYPE;
use reqwest::{Client, Identity};
use std::fs;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use url::Url;
use wxpay_types::config::{ClientConfig, ClientIdentityConfig};

use crate::endpoint::Endpoint;

/// Content type of every request body.
pub const XML_CONTENT_TYPE: &str = "text/xml; charset=utf-8";

/// Sends prepared request bodies to the gateway.
pub trait Transport {
    /// Posts `body` to `endpoint` and returns the response body.
    ///
    /// Cancelling the returned future aborts this call only.
    fn send(
        &self,
        endpoint: Endpoint,
        body: Vec<u8>,
    ) -> impl Future<Output = Result<Bytes, TransportError>> + Send;
}

impl<T: Transport + Send + Sync> Transport for Arc<T> {
    fn send(
        &self,
        endpoint: Endpoint,
        body: Vec<u8>,
    ) -> impl Future<Output = Result<Bytes, TransportError>> + Send {
        self.as_ref().send(endpoint, body)
    }
}

/// Errors that can occur while talking to the gateway over HTTP.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("URL parse error: {endpoint}: {source}")]
    UrlParse {
        endpoint: Endpoint,
        #[source]
        source: url::ParseError,
    },
    #[error("HTTP error: {endpoint}: {source}")]
    Http {
        endpoint: Endpoint,
        #[source]
        source: reqwest::Error,
    },
    #[error("Unexpected HTTP status {status}: {endpoint}: {body}")]
    HttpStatus {
        endpoint: Endpoint,
        status: StatusCode,
        body: String,
    },
    #[error("Failed to read response body: {endpoint}: {source}")]
    ResponseBodyRead {
        endpoint: Endpoint,
        #[source]
        source: reqwest::Error,
    },
    #[error("{0} requires a client certificate, none is configured")]
    ClientIdentityRequired(Endpoint),
    #[error("Failed to read client identity file {path}: {source}")]
    IdentityFile {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("Invalid client identity: {0}")]
    Identity(#[source] reqwest::Error),
    #[error("Failed to build HTTP client: {0}")]
    ClientBuild(#[source] reqwest::Error),
}

/// HTTPS transport backed by `reqwest`.
#[derive(Clone, Debug)]
pub struct ReqwestTransport {
    /// Gateway base URL, e.g. `https://api.mch.weixin.qq.com/`
    base_url: Url,
    /// Client for plain TLS operations
    client: Client,
    /// Client presenting the merchant certificate
    secure_client: Option<Client>,
    /// Optional per-request deadline
    timeout: Option<Duration>,
}

impl ReqwestTransport {
    pub fn new(base_url: Url) -> Self {
        Self {
            base_url,
            client: Client::new(),
            secure_client: None,
            timeout: None,
        }
    }

    /// Builds a transport from the client configuration, loading the mutual-TLS
    /// identity when one is configured.
    pub fn from_config(config: &ClientConfig) -> Result<Self, TransportError> {
        let mut transport = Self::new(config.base_url().clone());
        if let Some(timeout) = config.timeout() {
            transport = transport.with_timeout(timeout);
        }
        if let Some(identity) = config.client_identity() {
            transport = transport.with_identity(load_identity(identity)?)?;
        }
        Ok(transport)
    }

    /// Enables operations that require mutual TLS.
    pub fn with_identity(mut self, identity: Identity) -> Result<Self, TransportError> {
        let client = Client::builder()
            .identity(identity)
            .build()
            .map_err(TransportError::ClientBuild)?;
        self.secure_client = Some(client);
        Ok(self)
    }

    /// Sets a deadline for every request.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    pub fn timeout(&self) -> Option<Duration> {
        self.timeout
    }

    pub fn has_identity(&self) -> bool {
        self.secure_client.is_some()
    }
}

impl Transport for ReqwestTransport {
    async fn send(&self, endpoint: Endpoint, body: Vec<u8>) -> Result<Bytes, TransportError> {
        let client = if endpoint.requires_client_identity() {
            self.secure_client
                .as_ref()
                .ok_or(TransportError::ClientIdentityRequired(endpoint))?
        } else {
            &self.client
        };
        let url = endpoint
            .url(&self.base_url)
            .map_err(|e| TransportError::UrlParse {
                endpoint,
                source: e,
            })?;

        let mut req = client
            .request(endpoint.method(), url)
            .header(CONTENT_TYPE, XML_CONTENT_TYPE)
            .body(body);
        if let Some(timeout) = self.timeout {
            req = req.timeout(timeout);
        }
        let http_response = req
            .send()
            .await
            .map_err(|e| TransportError::Http {
                endpoint,
                source: e,
            })?;

        let status = http_response.status();
        if !status.is_success() {
            let body = http_response
                .text()
                .await
                .map_err(|e| TransportError::ResponseBodyRead {
                    endpoint,
                    source: e,
                })?;
            return Err(TransportError::HttpStatus {
                endpoint,
                status,
                body,
            });
        }
        http_response
            .bytes()
            .await
            .map_err(|e| TransportError::ResponseBodyRead {
                endpoint,
                source: e,
            })
    }
}

/// Reads the PEM certificate and key files into a `reqwest` identity.
pub fn load_identity(config: &ClientIdentityConfig) -> Result<Identity, TransportError> {
    let read = |path: &PathBuf| {
        fs::read(path).map_err(|e| TransportError::IdentityFile {
            path: path.clone(),
            source: e,
        })
    };
    let mut pem = read(&*config.cert_path)?;
    pem.push(b'\n');
    pem.extend(read(&*config.key_path)?);
    Identity::from_pem(&pem).map_err(TransportError::Identity)
}
