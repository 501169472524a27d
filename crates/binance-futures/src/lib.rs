//! High-level SDK for Binance USD-M Futures
//!
//! This crate puts market streams, the private user-data stream, and the
//! REST trading calls behind one [`UsdFuturesMarket`] handle.
//!
//! # Quick Start
//!
//! ```no_run
//! use binance_futures::prelude::*;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let market = UsdFuturesMarket::builder()
//!         .with_variant(MarketVariant::Test)
//!         .with_credentials(Credentials::from_env()?)
//!         .build()?;
//!
//!     // Public stream
//!     market.subscribe_kline("BTCUSDT", "1m", |kline: FlatRecord| {
//!         if let Some(k) = kline.nested("k") {
//!             println!("close {:?}", k.decimal("c"));
//!         }
//!     })?;
//!
//!     // Private stream; the listen key is renewed in the background
//!     market
//!         .subscribe_user_data(|event: UserDataEvent| println!("{}", event.event_type()))
//!         .await?;
//!
//!     // Signed REST call
//!     let order = market
//!         .new_order(&[
//!             ("symbol", "BTCUSDT"),
//!             ("side", "BUY"),
//!             ("type", "LIMIT"),
//!             ("timeInForce", "GTC"),
//!             ("quantity", "0.001"),
//!             ("price", "30000"),
//!         ])
//!         .await?;
//!     if !order.valid {
//!         eprintln!("rejected: {}", order.raw_error);
//!     }
//!
//!     market.shutdown().await;
//!     Ok(())
//! }
//! ```
//!
//! # Features
//!
//! - **One Task Per Stream**: cancellable at every suspension point
//! - **Listen-Key Keepalive**: renewed on an interval, failures surface as a
//!   broken user-data subscription
//! - **Typed Results**: exchange rejections are results with `valid == false`
//! - **Live and Test Networks**: selected with [`MarketVariant`]

pub mod builder;
pub mod keepalive;
pub mod market;
pub mod prelude;

// Re-export main types
pub use builder::{ConfigError, MarketBuilder};
pub use keepalive::KeepAliveTimer;
pub use market::UsdFuturesMarket;

// Re-export commonly used types from dependencies
pub use binance_auth::Credentials;
pub use binance_rest::{DEFAULT_API_KEY_HEADER, EXCHANGE_API_KEY_HEADER};
pub use binance_types::{BinanceError, BinanceResult, FlatRecord, KeyedRecord, MarketVariant, RestCall};
pub use binance_ws::{SubscriptionHandle, SubscriptionState, UserDataEvent};
