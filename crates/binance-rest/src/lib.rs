//! REST gateway for Binance USD-M Futures
//!
//! This crate dispatches signed and unsigned REST calls and maps the JSON
//! responses into typed results.
//!
//! # Result validity
//!
//! An exchange-side rejection (insufficient margin, unknown order, ...) is an
//! expected outcome, not an error: the call returns a normal result with
//! `valid == false` and the raw error body. Only transport failures and
//! unparseable bodies surface as [`BinanceError`](binance_types::BinanceError).
//!
//! # Example
//!
//! ```no_run
//! use binance_auth::{Credentials, ReceiveWindows, RequestSigner};
//! use binance_rest::{AccountBalance, GatewayConfig, Method, RestGateway};
//! use binance_types::RestCall;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let gateway = RestGateway::new(GatewayConfig::default())?;
//!     let signer = RequestSigner::new(Credentials::from_env()?.into(), ReceiveWindows::default());
//!
//!     let balance: AccountBalance = gateway
//!         .call::<_, &str, &str>(&signer, RestCall::AccountBalance, Method::GET, true, &[])
//!         .await?;
//!     if balance.valid {
//!         println!("USDT: {:?}", balance.balances.get("USDT"));
//!     }
//!     Ok(())
//! }
//! ```

pub mod client;
pub mod types;

pub use client::{
    GatewayConfig, RestGateway, DEFAULT_API_KEY_HEADER, DEFAULT_CLIENT_ID, DEFAULT_TIMEOUT,
    EXCHANGE_API_KEY_HEADER,
};
pub use reqwest::Method;
pub use types::{
    AccountBalance, AccountInformation, AllOrdersResult, CancelOrderResult, KlineCandlestick,
    ListenKeyResult, NewOrderResult, RestRecord, TakerBuySellVolume, KLINE_FIELDS,
};
