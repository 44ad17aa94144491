//! Gateway client.
//!
//! [`WxPayClient`] runs the full request pipeline for each call:
//!
//! 1. flatten the typed request into a [`ParamSet`];
//! 2. merge the merchant identity and a fresh nonce, then sign;
//! 3. serialize to XML and hand it to the [`Transport`];
//! 4. decode the reply and pass it through the [`Verifier`].
//!
//! The client holds only read-only state (configuration, verifier, transport), so a
//! single instance can be cloned or shared across tasks freely.
//!
//! ## Example
//!
//! ```rust,no_run
//! use wxpay_rs::client::WxPayClient;
//! use wxpay_rs::types::config::{ClientConfig, Secret};
//! use wxpay_rs::types::proto::TradeType;
//!
//! # async fn run() -> Result<(), Box<dyn std::error::Error>> {
//! let config = ClientConfig::new("wx8888888888888888", "1900000109", Secret::new("key"))
//!     .with_trade_type(TradeType::Native)
//!     .with_notify_url("https://shop.example.com/wxpay/notify");
//! let client = WxPayClient::try_new(config)?;
//! let code_url = client.native_trade("Test Order", "T001", 100).await?;
//! println!("{code_url}");
//! # Ok(())
//! # }
//! ```

use serde::Serialize;
use serde::de::DeserializeOwned;
use std::sync::Arc;
use wxpay_types::codec::{self, CodecError};
use wxpay_types::config::ClientConfig;
use wxpay_types::nonce::{NONCE_LEN, nonce_str, unix_timestamp};
use wxpay_types::params::{ParamSet, SIGN_FIELD};
use wxpay_types::proto::{
    AppPayParams, JsapiPayParams, OrderQueryRequest, OrderQueryResponse, RefundRequest,
    RefundResponse, TradeType, UnifiedOrderRequest, UnifiedOrderResponse,
};
use wxpay_types::sign;
use wxpay_types::verify::{SIGN_TYPE_FIELD, Unverified, Verified, Verifier};

#[cfg(feature = "telemetry")]
use tracing::{Instrument, Span, field::Empty};

use crate::endpoint::Endpoint;
use crate::error::WxPayError;
use crate::notify::NotificationHandler;
use crate::transport::{ReqwestTransport, Transport, TransportError};

/// Client for the merchant payment gateway.
#[derive(Clone, Debug)]
pub struct WxPayClient<T = ReqwestTransport> {
    /// Merchant identity and protocol settings
    config: Arc<ClientConfig>,
    /// Response verifier keyed with the merchant secret
    verifier: Verifier,
    /// Dispatcher for serialized requests
    transport: T,
}

impl WxPayClient<ReqwestTransport> {
    /// Creates a client with the HTTPS transport described by `config`.
    pub fn try_new(config: ClientConfig) -> Result<Self, TransportError> {
        let transport = ReqwestTransport::from_config(&config)?;
        Ok(Self::with_transport(config, transport))
    }
}

impl<T> WxPayClient<T> {
    /// Creates a client over a custom transport.
    pub fn with_transport(config: impl Into<Arc<ClientConfig>>, transport: T) -> Self {
        let config = config.into();
        let verifier = Verifier::from_config(&config);
        Self {
            config,
            verifier,
            transport,
        }
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    pub fn verifier(&self) -> &Verifier {
        &self.verifier
    }

    /// Handler for asynchronous notifications, keyed like this client.
    pub fn notification_handler(&self) -> NotificationHandler {
        NotificationHandler::new(self.verifier.clone())
    }

    /// Signs `params` with the configured key and digest.
    pub fn make_sign(&self, params: &ParamSet) -> String {
        sign::sign(
            params,
            self.config.api_key().expose(),
            self.config.sign_type(),
        )
    }

    /// Builds the signed request envelope: `fields` plus `appid`, `mch_id`, a fresh
    /// `nonce_str`, `sign_type` and finally `sign`.
    pub fn envelope(&self, fields: ParamSet) -> ParamSet {
        let mut params = fields;
        params
            .insert("appid", self.config.app_id())
            .insert("mch_id", self.config.mch_id())
            .insert("nonce_str", nonce_str(NONCE_LEN))
            .insert(SIGN_TYPE_FIELD, self.config.sign_type().as_str());
        let signature = self.make_sign(&params);
        params.insert(SIGN_FIELD, signature);
        params
    }

    /// Parameters for launching an in-app payment from the mobile SDK.
    pub fn app_pay_params(&self, prepay_id: &str) -> AppPayParams {
        let noncestr = nonce_str(NONCE_LEN);
        let timestamp = unix_timestamp();
        let package = "Sign=WXPay";
        let params = ParamSet::new()
            .with("appid", self.config.app_id())
            .with("partnerid", self.config.mch_id())
            .with("prepayid", prepay_id)
            .with("package", package)
            .with("noncestr", &noncestr)
            .with("timestamp", &timestamp);
        AppPayParams {
            appid: self.config.app_id().to_string(),
            partnerid: self.config.mch_id().to_string(),
            prepayid: prepay_id.to_string(),
            package: package.to_string(),
            noncestr,
            timestamp,
            sign: self.make_sign(&params),
        }
    }

    /// Parameters for launching a JSAPI payment from the in-browser bridge.
    pub fn jsapi_pay_params(&self, prepay_id: &str) -> JsapiPayParams {
        let nonce = nonce_str(NONCE_LEN);
        let timestamp = unix_timestamp();
        let package = format!("prepay_id={prepay_id}");
        let sign_type = self.config.sign_type().as_str();
        let params = ParamSet::new()
            .with("appId", self.config.app_id())
            .with("timeStamp", &timestamp)
            .with("nonceStr", &nonce)
            .with("package", &package)
            .with("signType", sign_type);
        JsapiPayParams {
            app_id: self.config.app_id().to_string(),
            time_stamp: timestamp,
            nonce_str: nonce,
            package,
            sign_type: sign_type.to_string(),
            pay_sign: self.make_sign(&params),
        }
    }

    fn expect_trade_type(&self, expected: TradeType) -> Result<(), WxPayError> {
        let configured = self.config.trade_type();
        if configured != Some(expected) {
            return Err(WxPayError::TradeTypeMismatch {
                expected,
                configured,
            });
        }
        Ok(())
    }
}

impl<T: Transport> WxPayClient<T> {
    /// Signs and sends a typed request, then verifies the reply.
    pub async fn submit<Req, Resp>(
        &self,
        endpoint: Endpoint,
        request: &Req,
    ) -> Result<Verified<Resp>, WxPayError>
    where
        Req: Serialize + ?Sized,
        Resp: DeserializeOwned,
    {
        let fields = ParamSet::from_serialize(request)?;
        self.submit_params(endpoint, fields).await
    }

    /// Signs and sends a raw field set, then verifies the reply.
    pub async fn submit_params<Resp>(
        &self,
        endpoint: Endpoint,
        fields: ParamSet,
    ) -> Result<Verified<Resp>, WxPayError>
    where
        Resp: DeserializeOwned,
    {
        let call = async move {
            let result = self.dispatch(endpoint, fields).await;
            record_result_on_span(&result);
            result
        };
        #[cfg(feature = "telemetry")]
        let call = call.instrument(endpoint_span(endpoint));
        call.await
    }

    async fn dispatch<Resp>(
        &self,
        endpoint: Endpoint,
        fields: ParamSet,
    ) -> Result<Verified<Resp>, WxPayError>
    where
        Resp: DeserializeOwned,
    {
        let envelope = self.envelope(fields);
        let body = codec::to_wire(&envelope);
        let raw = self.transport.send(endpoint, body).await?;
        let message = Unverified::<Resp>::from_wire(&raw)?;
        let verified = self.verifier.verify_response(message)?;
        Ok(verified)
    }

    /// Creates an order.
    ///
    /// Empty `notify_url` and `trade_type` are taken from the configuration. Without a
    /// client IP, `NATIVE` and `MWEB` orders use the configured server address.
    pub async fn unified_order(
        &self,
        mut request: UnifiedOrderRequest,
    ) -> Result<Verified<UnifiedOrderResponse>, WxPayError> {
        if request.notify_url.as_deref().is_none_or(str::is_empty) {
            request.notify_url = self.config.notify_url().map(str::to_string);
        }
        if request.trade_type.is_none() {
            request.trade_type = self.config.trade_type();
        }
        if request.spbill_create_ip.as_deref().is_none_or(str::is_empty)
            && matches!(
                request.trade_type,
                Some(TradeType::Native) | Some(TradeType::Mweb)
            )
        {
            request.spbill_create_ip = self.config.server_addr().map(|ip| ip.to_string());
        }
        self.submit(Endpoint::UnifiedOrder, &request).await
    }

    /// In-app payment. Returns the prepay id.
    pub async fn app_trade(
        &self,
        body: &str,
        out_trade_no: &str,
        total_fee: u64,
        client_ip: Option<&str>,
    ) -> Result<String, WxPayError> {
        self.expect_trade_type(TradeType::App)?;
        let mut request = UnifiedOrderRequest::new(body, out_trade_no, total_fee);
        request.spbill_create_ip = client_ip.map(str::to_string);
        let response = self.unified_order(request).await?.into_body();
        required("prepay_id", response.prepay_id)
    }

    /// Public-account payment for the user `openid`. Returns the prepay id.
    pub async fn jsapi_trade(
        &self,
        body: &str,
        out_trade_no: &str,
        total_fee: u64,
        openid: &str,
        client_ip: Option<&str>,
    ) -> Result<String, WxPayError> {
        self.expect_trade_type(TradeType::Jsapi)?;
        let mut request = UnifiedOrderRequest::new(body, out_trade_no, total_fee).with_openid(openid);
        request.spbill_create_ip = client_ip.map(str::to_string);
        let response = self.unified_order(request).await?.into_body();
        required("prepay_id", response.prepay_id)
    }

    /// QR code payment. Returns the code URL to render.
    pub async fn native_trade(
        &self,
        body: &str,
        out_trade_no: &str,
        total_fee: u64,
    ) -> Result<String, WxPayError> {
        self.expect_trade_type(TradeType::Native)?;
        let request = UnifiedOrderRequest::new(body, out_trade_no, total_fee);
        let response = self.unified_order(request).await?.into_body();
        required("code_url", response.code_url)
    }

    /// In-browser (H5) payment. Returns the redirect URL.
    pub async fn h5_trade(
        &self,
        body: &str,
        out_trade_no: &str,
        total_fee: u64,
        client_ip: Option<&str>,
    ) -> Result<String, WxPayError> {
        self.expect_trade_type(TradeType::Mweb)?;
        let mut request = UnifiedOrderRequest::new(body, out_trade_no, total_fee);
        request.spbill_create_ip = client_ip.map(str::to_string);
        let response = self.unified_order(request).await?.into_body();
        required("mweb_url", response.mweb_url)
    }

    /// Queries an order by `transaction_id` or `out_trade_no`.
    pub async fn order_query(
        &self,
        request: OrderQueryRequest,
    ) -> Result<Verified<OrderQueryResponse>, WxPayError> {
        if !request.has_reference() {
            return Err(WxPayError::MissingOrderReference);
        }
        self.submit(Endpoint::OrderQuery, &request).await
    }

    /// Refunds an order. Requires a configured client identity.
    pub async fn refund(
        &self,
        request: RefundRequest,
    ) -> Result<Verified<RefundResponse>, WxPayError> {
        if !request.has_reference() {
            return Err(WxPayError::MissingOrderReference);
        }
        self.submit(Endpoint::Refund, &request).await
    }
}

#[cfg(feature = "telemetry")]
fn endpoint_span(endpoint: Endpoint) -> Span {
    match endpoint {
        Endpoint::UnifiedOrder => tracing::info_span!(
            "wxpay.client.unified_order",
            otel.status_code = Empty,
            error.message = Empty
        ),
        Endpoint::OrderQuery => tracing::info_span!(
            "wxpay.client.order_query",
            otel.status_code = Empty,
            error.message = Empty
        ),
        Endpoint::Refund => tracing::info_span!(
            "wxpay.client.refund",
            otel.status_code = Empty,
            error.message = Empty
        ),
    }
}

#[cfg(feature = "telemetry")]
fn record_result_on_span<R>(result: &Result<R, WxPayError>) {
    let span = Span::current();
    match result {
        Ok(_) => {
            span.record("otel.status_code", "OK");
        }
        Err(err) => {
            span.record("otel.status_code", "ERROR");
            span.record("error.message", tracing::field::display(err));
            tracing::event!(tracing::Level::ERROR, error = %err, "Gateway call failed");
        }
    }
}

#[cfg(not(feature = "telemetry"))]
fn record_result_on_span<R>(_result: &Result<R, WxPayError>) {}

fn required(field: &'static str, value: Option<String>) -> Result<String, WxPayError> {
    value
        .filter(|v| !v.is_empty())
        .ok_or(WxPayError::MalformedResponse(CodecError::MissingField(field)))
}
