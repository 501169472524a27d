//! Re-exports for convenience
//!
//! Import everything you need with:
//! ```
//! use binance_futures::prelude::*;
//! ```

// Market
pub use crate::market::UsdFuturesMarket;
pub use crate::builder::{ConfigError, MarketBuilder};
pub use crate::keepalive::{KeepAliveTimer, DEFAULT_KEEPALIVE_INTERVAL};

// Types from binance-types
pub use binance_types::{
    BinanceError, BinanceResult, FlatRecord, KeyedRecord, MarketVariant, RestCall, StreamKind,
};

// Credentials and signing
pub use binance_auth::{Credentials, ReceiveWindows};

// REST results
pub use binance_rest::{
    AccountBalance, AccountInformation, AllOrdersResult, CancelOrderResult, KlineCandlestick,
    ListenKeyResult, NewOrderResult, TakerBuySellVolume, EXCHANGE_API_KEY_HEADER,
};

// Streaming types
pub use binance_ws::{
    ConnectRetry, SubscriptionHandle, SubscriptionState, UserDataEvent,
};

// Decimal for prices/quantities
pub use binance_types::Decimal;
