//! Error types for the Binance Futures SDK

use std::time::Duration;
use thiserror::Error;

use crate::enums::MarketVariant;

/// Main error type for SDK operations
///
/// REST-level rejections from the exchange (insufficient balance, unknown
/// order, ...) are not errors: they come back as results with `valid == false`.
#[derive(Error, Debug)]
pub enum BinanceError {
    // === Connection Errors ===
    /// Transport could not connect or the request failed in transit
    #[error("Failed to connect to {url}: {reason}")]
    ConnectionFailed { url: String, reason: String },

    /// Connect or request exceeded its time bound
    #[error("Connection timeout after {timeout:?} to {url}")]
    ConnectionTimeout { url: String, timeout: Duration },

    // === Lifecycle Errors ===
    /// Operation aborted by shutdown or unsubscribe
    #[error("Operation cancelled: {0}")]
    Cancelled(String),

    // === Protocol Errors ===
    /// Frame or response body not parseable into the expected shape
    #[error("Protocol error: {message}")]
    Protocol { message: String, raw: Option<String> },

    // === Authentication Errors ===
    /// Signed operation attempted without the required secret
    #[error("Credential error: {0}")]
    Credential(String),

    /// Listen key could not be created or renewed
    #[error("Listen key keepalive failed: {0}")]
    KeepAlive(String),

    // === Capability Errors ===
    /// Operation not offered by the selected market
    #[error("{operation} is not available on the {variant} market")]
    Unsupported {
        operation: &'static str,
        variant: MarketVariant,
    },
}

impl BinanceError {
    /// Create a connection failure
    pub fn connection_failed(url: impl Into<String>, reason: impl ToString) -> Self {
        Self::ConnectionFailed {
            url: url.into(),
            reason: reason.to_string(),
        }
    }

    /// Create a protocol error, keeping the offending text when available
    pub fn protocol(message: impl Into<String>, raw: Option<&str>) -> Self {
        Self::Protocol {
            message: message.into(),
            raw: raw.map(str::to_string),
        }
    }

    /// Returns true for the connection class (failed or timed out)
    pub fn is_connection_error(&self) -> bool {
        matches!(
            self,
            Self::ConnectionFailed { .. } | Self::ConnectionTimeout { .. }
        )
    }

    /// Returns true if a frame or body could not be parsed
    pub fn is_protocol_error(&self) -> bool {
        matches!(self, Self::Protocol { .. })
    }

    /// Returns true if the operation was cancelled
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled(_))
    }

    /// Returns true if retrying the same operation cannot succeed
    /// without caller intervention
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            Self::Credential(_) | Self::KeepAlive(_) | Self::Unsupported { .. }
        )
    }

    /// Raw payload attached to a protocol error
    pub fn raw(&self) -> Option<&str> {
        match self {
            Self::Protocol { raw, .. } => raw.as_deref(),
            _ => None,
        }
    }
}

/// Result type alias for SDK operations
pub type BinanceResult<T> = Result<T, BinanceError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_connection_class() {
        let err = BinanceError::connection_failed("wss://x", "refused");
        assert!(err.is_connection_error());
        assert!(!err.is_fatal());

        let err = BinanceError::ConnectionTimeout {
            url: "https://x".into(),
            timeout: Duration::from_secs(1),
        };
        assert!(err.is_connection_error());
    }

    #[test]
    fn test_protocol_error_keeps_raw() {
        let err = BinanceError::protocol("not json", Some("<html>"));
        assert!(err.is_protocol_error());
        assert_eq!(err.raw(), Some("<html>"));
    }

    #[test]
    fn test_fatal_errors() {
        assert!(BinanceError::Credential("no secret".into()).is_fatal());
        assert!(BinanceError::KeepAlive("HTTP 401".into()).is_fatal());
        let err = BinanceError::Unsupported {
            operation: "taker_buy_sell_volume",
            variant: MarketVariant::Test,
        };
        assert!(err.is_fatal());
        assert!(err.to_string().contains("test market"));
    }
}
