//! Command-line interface of the `wxpay` binary.

use clap::{Parser, Subcommand};
use dotenvy::dotenv;
use serde_json::json;
use std::error::Error;
use std::io::Read;
use std::path::PathBuf;
use std::{fs, io};
use wxpay_rs::client::WxPayClient;
use wxpay_rs::error::WxPayError;
use wxpay_rs::notify::NotificationHandler;
use wxpay_rs::types::codec;
use wxpay_rs::types::config::ClientConfig;
use wxpay_rs::types::error::VerifyError;
use wxpay_rs::types::params::{ParamSet, SIGN_FIELD};
use wxpay_rs::types::proto::{OrderQueryRequest, RefundRequest, TradeType, UnifiedOrderRequest};
use wxpay_rs::types::sign;

#[cfg(feature = "telemetry")]
use wxpay_rs::telemetry::Telemetry;

/// Exit status for responses or notifications that failed signature verification.
pub const EXIT_INTEGRITY_FAILURE: i32 = 2;

#[derive(Parser, Debug)]
#[command(name = "wxpay", version, about = "Merchant payment gateway client")]
struct CliArgs {
    /// Path to the JSON configuration file
    #[arg(long, short, env = "CONFIG", default_value = "config.json", global = true)]
    config: PathBuf,
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Create an order
    Order {
        #[arg(long)]
        body: String,
        #[arg(long)]
        out_trade_no: String,
        /// Amount in the smallest currency unit
        #[arg(long)]
        total_fee: u64,
        /// Overrides the configured trade type
        #[arg(long)]
        trade_type: Option<TradeType>,
        #[arg(long)]
        openid: Option<String>,
        #[arg(long)]
        client_ip: Option<String>,
    },
    /// Query an order
    Query {
        #[arg(long)]
        transaction_id: Option<String>,
        #[arg(long)]
        out_trade_no: Option<String>,
    },
    /// Refund an order (requires a client certificate)
    Refund {
        #[arg(long)]
        transaction_id: Option<String>,
        #[arg(long)]
        out_trade_no: Option<String>,
        #[arg(long)]
        out_refund_no: String,
        #[arg(long)]
        total_fee: u64,
        #[arg(long)]
        refund_fee: u64,
        #[arg(long)]
        refund_desc: Option<String>,
    },
    /// Verify a notification body stored in a file
    VerifyNotify { file: PathBuf },
    /// Sign `key=value` lines read from stdin and print the XML body
    Sign,
}

pub async fn run() -> Result<(), Box<dyn Error>> {
    // Load .env variables
    dotenv().ok();

    #[cfg(feature = "telemetry")]
    let _telemetry = Telemetry::new()
        .with_name(env!("CARGO_PKG_NAME"))
        .with_version(env!("CARGO_PKG_VERSION"))
        .register();

    let args = CliArgs::parse();
    let config = ClientConfig::load_from_path(&args.config)?;

    match args.command {
        Command::Order {
            body,
            out_trade_no,
            total_fee,
            trade_type,
            openid,
            client_ip,
        } => {
            let client = WxPayClient::try_new(config)?;
            let mut request = UnifiedOrderRequest::new(body, out_trade_no, total_fee);
            request.trade_type = trade_type;
            request.openid = openid;
            request.spbill_create_ip = client_ip;
            let response = client.unified_order(request).await?;
            let trade_type = trade_type.or(client.config().trade_type());
            let pay_params = match (trade_type, response.prepay_id.as_deref()) {
                (Some(TradeType::App), Some(prepay_id)) => {
                    Some(serde_json::to_value(client.app_pay_params(prepay_id))?)
                }
                (Some(TradeType::Jsapi), Some(prepay_id)) => {
                    Some(serde_json::to_value(client.jsapi_pay_params(prepay_id))?)
                }
                _ => None,
            };
            print_json(&json!({ "order": response.body(), "pay_params": pay_params }))?;
        }
        Command::Query {
            transaction_id,
            out_trade_no,
        } => {
            let client = WxPayClient::try_new(config)?;
            let request = OrderQueryRequest {
                transaction_id,
                out_trade_no,
            };
            let response = client.order_query(request).await?;
            print_json(response.body())?;
        }
        Command::Refund {
            transaction_id,
            out_trade_no,
            out_refund_no,
            total_fee,
            refund_fee,
            refund_desc,
        } => {
            let client = WxPayClient::try_new(config)?;
            let request = RefundRequest {
                transaction_id,
                out_trade_no,
                out_refund_no,
                total_fee,
                refund_fee,
                refund_desc,
                ..Default::default()
            };
            let response = client.refund(request).await?;
            print_json(response.body())?;
        }
        Command::VerifyNotify { file } => {
            let body = fs::read(&file)?;
            let verified = NotificationHandler::from_config(&config).handle(&body)?;
            print_json(&json!({
                "status": verified.status(),
                "notification": verified.body(),
            }))?;
        }
        Command::Sign => {
            let mut input = String::new();
            io::stdin().read_to_string(&mut input)?;
            let params = sign_pairs(&input, &config)?;
            println!("{}", String::from_utf8_lossy(&codec::to_wire(&params)));
        }
    }
    Ok(())
}

/// Process exit status for an error returned by [`run`].
pub fn exit_code(error: &(dyn Error + 'static)) -> i32 {
    let integrity = error
        .downcast_ref::<WxPayError>()
        .is_some_and(WxPayError::is_integrity_failure)
        || error
            .downcast_ref::<VerifyError>()
            .is_some_and(VerifyError::is_integrity_failure);
    if integrity { EXIT_INTEGRITY_FAILURE } else { 1 }
}

fn print_json<T: serde::Serialize + ?Sized>(value: &T) -> Result<(), serde_json::Error> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

#[derive(Debug, thiserror::Error)]
#[error("Line {line}: expected key=value")]
struct MalformedPair {
    line: usize,
}

/// Parses `key=value` lines. Blank lines and lines starting with `#` are skipped.
fn parse_pairs(input: &str) -> Result<ParamSet, MalformedPair> {
    let mut params = ParamSet::new();
    for (index, line) in input.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let (key, value) = line
            .split_once('=')
            .filter(|(key, _)| !key.is_empty())
            .ok_or(MalformedPair { line: index + 1 })?;
        params.insert(key.trim(), value.trim());
    }
    Ok(params)
}

/// Parses `key=value` lines and signs them with the configured key and digest.
fn sign_pairs(input: &str, config: &ClientConfig) -> Result<ParamSet, MalformedPair> {
    let mut params = parse_pairs(input)?;
    let signature = sign::sign(&params, config.api_key().expose(), config.sign_type());
    params.insert(SIGN_FIELD, signature);
    Ok(params)
}

#[cfg(test)]
mod tests {
    use super::*;
    use wxpay_rs::types::config::Secret;
    use wxpay_rs::types::error::MismatchReason;
    use wxpay_rs::types::sign::SignType;

    #[test]
    fn test_parse_pairs() {
        let params = parse_pairs("appid = wx123\n\n# comment\nbody=a=b\n").unwrap();
        assert_eq!(params.get("appid"), Some("wx123"));
        assert_eq!(params.get("body"), Some("a=b"));
        assert_eq!(params.len(), 2);
    }

    #[test]
    fn test_parse_pairs_rejects_malformed_line() {
        let err = parse_pairs("appid=wx123\nnonsense\n").unwrap_err();
        assert_eq!(err.line, 2);
    }

    #[test]
    fn test_sign_pairs_uses_configured_key_and_digest() {
        let config = ClientConfig::new("wx123", "1900000", Secret::new("testkey"))
            .with_sign_type(SignType::HmacSha256);
        let params = sign_pairs("appid=wx123\nbody=Test Order\n", &config).unwrap();
        assert_eq!(params.get("body"), Some("Test Order"));
        assert!(sign::verify(&params, "testkey", SignType::HmacSha256));
        assert!(!sign::verify(&params, "testkey", SignType::Md5));
        assert_eq!(params.get(SIGN_FIELD).unwrap().len(), 64);
    }

    #[test]
    fn test_exit_code_distinguishes_integrity_failures() {
        let mismatch: Box<dyn Error> = Box::new(WxPayError::SignatureMismatch {
            reason: MismatchReason::Mismatch,
        });
        assert_eq!(exit_code(mismatch.as_ref()), EXIT_INTEGRITY_FAILURE);

        let notify: Box<dyn Error> = Box::new(VerifyError::SignatureMismatch {
            reason: MismatchReason::MissingSign,
        });
        assert_eq!(exit_code(notify.as_ref()), EXIT_INTEGRITY_FAILURE);

        let other: Box<dyn Error> = Box::new(WxPayError::MissingOrderReference);
        assert_eq!(exit_code(other.as_ref()), 1);
    }

    #[test]
    fn test_cli_parses_order() {
        let args = CliArgs::try_parse_from([
            "wxpay",
            "--config",
            "wxpay.json",
            "order",
            "--body",
            "Test Order",
            "--out-trade-no",
            "T001",
            "--total-fee",
            "100",
            "--trade-type",
            "NATIVE",
        ])
        .unwrap();
        assert_eq!(args.config, PathBuf::from("wxpay.json"));
        assert!(matches!(
            args.command,
            Command::Order {
                total_fee: 100,
                trade_type: Some(TradeType::Native),
                ..
            }
        ));
    }
}
