//! Stream endpoint definitions

use crate::decoder::DecodeSpec;
use binance_types::StreamKind;
use std::fmt;

/// A stream on the futures streaming host
///
/// Knows its wire name (`btcusdt@bookTicker`, `!markPrice@arr`, ...) and the
/// frame shape it delivers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamEndpoint {
    kind: StreamKind,
    name: String,
}

impl StreamEndpoint {
    /// Mark price for all symbols, every 3 seconds
    pub fn mark_price() -> Self {
        Self::new(StreamKind::MarkPrice, "!markPrice@arr")
    }

    /// Mini ticker for all symbols
    pub fn mini_ticker() -> Self {
        Self::new(StreamKind::MiniTicker, "!miniTicker@arr")
    }

    /// Kline updates for one symbol (`interval` like `1m`, `4h`)
    pub fn kline(symbol: &str, interval: &str) -> Self {
        Self::new(
            StreamKind::Kline,
            format!("{}@kline_{}", symbol.to_lowercase(), interval),
        )
    }

    /// Mini ticker for one symbol
    pub fn symbol(symbol: &str) -> Self {
        Self::new(StreamKind::Symbol, format!("{}@miniTicker", symbol.to_lowercase()))
    }

    /// Best bid/ask for one symbol
    pub fn symbol_book(symbol: &str) -> Self {
        Self::new(StreamKind::SymbolBook, format!("{}@bookTicker", symbol.to_lowercase()))
    }

    /// Private stream named by a listen key
    pub fn user_data(listen_key: &str) -> Self {
        Self::new(StreamKind::UserData, listen_key)
    }

    fn new(kind: StreamKind, name: impl Into<String>) -> Self {
        Self {
            kind,
            name: name.into(),
        }
    }

    /// Get the stream kind
    pub fn kind(&self) -> StreamKind {
        self.kind
    }

    /// Get the wire name
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Full URL on the streaming host `base`
    pub fn url(&self, base: &str) -> String {
        format!("{}/ws/{}", base.trim_end_matches('/'), self.name)
    }

    /// Frame shape this stream delivers
    pub fn decode_spec(&self) -> DecodeSpec {
        match self.kind {
            StreamKind::MarkPrice | StreamKind::MiniTicker => DecodeSpec::keyed("s"),
            StreamKind::Kline | StreamKind::Symbol | StreamKind::SymbolBook => DecodeSpec::Flat,
            StreamKind::UserData => DecodeSpec::UserData,
        }
    }
}

impl fmt::Display for StreamEndpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const BASE: &str = "wss://fstream.binance.com";

    #[test]
    fn test_stream_urls() {
        assert_eq!(
            StreamEndpoint::mark_price().url(BASE),
            "wss://fstream.binance.com/ws/!markPrice@arr"
        );
        assert_eq!(
            StreamEndpoint::kline("BTCUSDT", "1m").url(BASE),
            "wss://fstream.binance.com/ws/btcusdt@kline_1m"
        );
        assert_eq!(
            StreamEndpoint::symbol_book("ETHUSDT").url("wss://stream.binancefuture.com/"),
            "wss://stream.binancefuture.com/ws/ethusdt@bookTicker"
        );
        assert_eq!(StreamEndpoint::user_data("Xyz").url(BASE), "wss://fstream.binance.com/ws/Xyz");
    }

    #[test]
    fn test_decode_specs() {
        assert_eq!(StreamEndpoint::mini_ticker().decode_spec(), DecodeSpec::keyed("s"));
        assert_eq!(StreamEndpoint::symbol("BTCUSDT").decode_spec(), DecodeSpec::Flat);
        assert_eq!(StreamEndpoint::user_data("k").decode_spec(), DecodeSpec::UserData);
        assert_eq!(StreamEndpoint::kline("BTCUSDT", "5m").kind(), StreamKind::Kline);
    }
}
