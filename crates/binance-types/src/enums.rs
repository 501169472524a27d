//! RestCall, StreamKind, and MarketVariant enums

use serde::{Deserialize, Serialize};
use std::fmt;

/// REST call kinds
///
/// Every call kind owns a receive window and a request path.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RestCall {
    /// Place a new order
    NewOrder,
    /// Create, renew, or delete the user-data listen key
    ListenKey,
    /// Cancel an open order
    CancelOrder,
    /// Query all orders
    AllOrders,
    /// Account information (assets and positions)
    AccountInfo,
    /// Account balances
    AccountBalance,
    /// Taker buy/sell volume statistics
    TakerBuySellVolume,
    /// Kline/candlestick history
    KlineCandles,
    /// Connectivity check
    Ping,
}

impl RestCall {
    /// Every call kind, in table order
    pub const ALL: [RestCall; 9] = [
        Self::NewOrder,
        Self::ListenKey,
        Self::CancelOrder,
        Self::AllOrders,
        Self::AccountInfo,
        Self::AccountBalance,
        Self::TakerBuySellVolume,
        Self::KlineCandles,
        Self::Ping,
    ];

    /// Number of call kinds
    pub const COUNT: usize = Self::ALL.len();

    /// Position of this call kind in [`RestCall::ALL`]
    pub fn index(&self) -> usize {
        *self as usize
    }

    /// REST path, relative to the market's base URI
    pub fn path(&self) -> &'static str {
        match self {
            Self::NewOrder | Self::CancelOrder => "/fapi/v1/order",
            Self::ListenKey => "/fapi/v1/listenKey",
            Self::AllOrders => "/fapi/v1/allOrders",
            Self::AccountInfo => "/fapi/v2/account",
            Self::AccountBalance => "/fapi/v2/balance",
            Self::TakerBuySellVolume => "/futures/data/takerlongshortRatio",
            Self::KlineCandles => "/fapi/v1/klines",
            Self::Ping => "/fapi/v1/ping",
        }
    }

    /// Returns true if the exchange requires a signature for this call
    pub fn requires_signature(&self) -> bool {
        matches!(
            self,
            Self::NewOrder
                | Self::CancelOrder
                | Self::AllOrders
                | Self::AccountInfo
                | Self::AccountBalance
        )
    }
}

impl fmt::Display for RestCall {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// Streaming feed kinds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum StreamKind {
    /// Mark price for all symbols
    MarkPrice,
    /// Mini ticker for all symbols
    MiniTicker,
    /// Kline/candlestick updates for one symbol
    Kline,
    /// Mini ticker for one symbol
    Symbol,
    /// Best bid/ask for one symbol
    SymbolBook,
    /// Private user-data stream (orders, balances, positions)
    UserData,
}

/// Which Binance Futures market to talk to
///
/// The test network supports most endpoints; the ones it lacks are
/// rejected locally with [`crate::BinanceError::Unsupported`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum MarketVariant {
    /// Production market
    #[default]
    Live,
    /// Test network (testnet.binancefuture.com)
    Test,
}

impl MarketVariant {
    /// Base URI for REST calls
    pub fn rest_url(&self) -> &'static str {
        match self {
            Self::Live => "https://fapi.binance.com",
            Self::Test => "https://testnet.binancefuture.com",
        }
    }

    /// Base URI for streams
    pub fn stream_url(&self) -> &'static str {
        match self {
            Self::Live => "wss://fstream.binance.com",
            Self::Test => "wss://stream.binancefuture.com",
        }
    }

    /// Returns true if `call` can be issued against this market
    pub fn supports(&self, call: RestCall) -> bool {
        match self {
            Self::Live => true,
            Self::Test => !matches!(call, RestCall::TakerBuySellVolume),
        }
    }
}

impl fmt::Display for MarketVariant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Live => write!(f, "live"),
            Self::Test => write!(f, "test"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rest_call_index_matches_table() {
        for (i, call) in RestCall::ALL.iter().enumerate() {
            assert_eq!(call.index(), i);
        }
        assert_eq!(RestCall::COUNT, 9);
    }

    #[test]
    fn test_signed_calls() {
        assert!(RestCall::NewOrder.requires_signature());
        assert!(RestCall::AccountBalance.requires_signature());
        assert!(!RestCall::ListenKey.requires_signature());
        assert!(!RestCall::KlineCandles.requires_signature());
    }

    #[test]
    fn test_variant_capabilities() {
        assert!(MarketVariant::Live.supports(RestCall::TakerBuySellVolume));
        assert!(!MarketVariant::Test.supports(RestCall::TakerBuySellVolume));
        assert!(MarketVariant::Test.supports(RestCall::NewOrder));
        assert_eq!(MarketVariant::Test.stream_url(), "wss://stream.binancefuture.com");
    }
}
