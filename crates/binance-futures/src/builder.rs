//! Market Builder Pattern
//!
//! Fluent configuration for [`UsdFuturesMarket`] with sensible defaults and
//! validation.
//!
//! # Example
//!
//! ```no_run
//! use binance_futures::{Credentials, MarketBuilder, MarketVariant};
//! use std::time::Duration;
//!
//! # async fn run() -> Result<(), Box<dyn std::error::Error>> {
//! let market = MarketBuilder::new()
//!     .with_variant(MarketVariant::Test)
//!     .with_credentials(Credentials::from_env()?)
//!     .with_rest_timeout(Duration::from_secs(5))
//!     .on_keepalive_failure(|e| eprintln!("user-data stream lost: {}", e))
//!     .build()?;
//! # Ok(())
//! # }
//! ```

use crate::keepalive::{FailureCallback, DEFAULT_KEEPALIVE_INTERVAL};
use crate::market::UsdFuturesMarket;
use binance_auth::{Clock, Credentials, ReceiveWindows};
use binance_rest::{DEFAULT_API_KEY_HEADER, DEFAULT_TIMEOUT};
use binance_types::{BinanceError, MarketVariant, RestCall};
use binance_ws::{ConnectRetry, Connector, RegistryConfig, WsConnector};
use std::sync::Arc;
use std::time::Duration;

/// Longest renewal interval that keeps a listen key alive
pub const MAX_KEEPALIVE_INTERVAL: Duration = Duration::from_secs(60 * 60);

/// Configuration validation error
#[derive(Debug, Clone, thiserror::Error)]
pub enum ConfigError {
    /// Keepalive interval of zero
    #[error("keepalive interval must be non-zero")]
    KeepAliveIntervalZero,

    /// Keepalive interval the listen key would not survive
    #[error("keepalive interval {interval:?} exceeds the listen key lifetime of 60 minutes")]
    KeepAliveIntervalTooLong { interval: Duration },

    /// REST timeout too short
    #[error("REST timeout must be at least 100 milliseconds")]
    TimeoutTooShort,

    /// Base URL with the wrong scheme
    #[error("invalid {kind} URL: {url} (expected {expected})")]
    InvalidUrl {
        kind: &'static str,
        url: String,
        expected: &'static str,
    },

    /// HTTP client could not be created
    #[error("failed to create HTTP client: {0}")]
    HttpClient(String),
}

impl From<BinanceError> for ConfigError {
    fn from(err: BinanceError) -> Self {
        Self::HttpClient(err.to_string())
    }
}

/// Builder for a [`UsdFuturesMarket`]
///
/// Defaults:
/// - live market, no credentials
/// - variant base URLs for REST and streams
/// - 10 s REST timeout, 5 s transport close timeout
/// - three connect attempts per session
/// - 30 minute listen-key renewal
/// - 5000 ms receive window for every call
pub struct MarketBuilder {
    pub(crate) variant: MarketVariant,
    pub(crate) credentials: Credentials,
    pub(crate) rest_url: Option<String>,
    pub(crate) stream_url: Option<String>,
    pub(crate) connector: Option<Arc<dyn Connector>>,
    pub(crate) rest_timeout: Duration,
    pub(crate) client_id: Option<String>,
    pub(crate) api_key_header: String,
    pub(crate) registry: RegistryConfig,
    pub(crate) keepalive_interval: Duration,
    pub(crate) windows: ReceiveWindows,
    pub(crate) clock: Option<Clock>,
    pub(crate) on_keepalive_failure: Option<FailureCallback>,
}

impl Default for MarketBuilder {
    fn default() -> Self {
        Self {
            variant: MarketVariant::Live,
            credentials: Credentials::none(),
            rest_url: None,
            stream_url: None,
            connector: None,
            rest_timeout: DEFAULT_TIMEOUT,
            client_id: None,
            api_key_header: DEFAULT_API_KEY_HEADER.to_string(),
            registry: RegistryConfig::default(),
            keepalive_interval: DEFAULT_KEEPALIVE_INTERVAL,
            windows: ReceiveWindows::default(),
            clock: None,
            on_keepalive_failure: None,
        }
    }
}

impl MarketBuilder {
    /// Create a builder with default settings
    pub fn new() -> Self {
        Self::default()
    }

    /// Select the live or test network
    pub fn with_variant(mut self, variant: MarketVariant) -> Self {
        self.variant = variant;
        self
    }

    /// Set the API credentials
    pub fn with_credentials(mut self, credentials: Credentials) -> Self {
        self.credentials = credentials;
        self
    }

    /// Override the REST base URL
    pub fn with_rest_url(mut self, url: impl Into<String>) -> Self {
        self.rest_url = Some(url.into());
        self
    }

    /// Override the streaming base URL
    pub fn with_stream_url(mut self, url: impl Into<String>) -> Self {
        self.stream_url = Some(url.into());
        self
    }

    /// Supply the transport factory for streaming sessions
    pub fn with_connector(mut self, connector: Arc<dyn Connector>) -> Self {
        self.connector = Some(connector);
        self
    }

    /// Set the per-request REST timeout
    pub fn with_rest_timeout(mut self, timeout: Duration) -> Self {
        self.rest_timeout = timeout;
        self
    }

    /// Set the client id header value
    pub fn with_client_id(mut self, client_id: impl Into<String>) -> Self {
        self.client_id = Some(client_id.into());
        self
    }

    /// Set the name of the header carrying the API key
    ///
    /// Defaults to `X-API-KEY`. Binance itself reads
    /// [`EXCHANGE_API_KEY_HEADER`](binance_rest::EXCHANGE_API_KEY_HEADER).
    pub fn with_api_key_header(mut self, name: impl Into<String>) -> Self {
        self.api_key_header = name.into();
        self
    }

    /// Set the connect retry policy for streaming sessions
    pub fn with_retry(mut self, retry: ConnectRetry) -> Self {
        self.registry = self.registry.with_retry(retry);
        self
    }

    /// Bound how long closing a stream transport may take
    pub fn with_close_timeout(mut self, timeout: Duration) -> Self {
        self.registry = self.registry.with_close_timeout(timeout);
        self
    }

    /// Set the listen-key renewal interval
    pub fn with_keepalive_interval(mut self, interval: Duration) -> Self {
        self.keepalive_interval = interval;
        self
    }

    /// Set the initial receive window for one call kind
    pub fn with_receive_window(mut self, call: RestCall, window: Duration) -> Self {
        self.windows.set(call, window);
        self
    }

    /// Replace the timestamp source used for signing (milliseconds since epoch)
    pub fn with_clock(mut self, clock: Clock) -> Self {
        self.clock = Some(clock);
        self
    }

    /// Called when the user-data keepalive fails
    ///
    /// Runs on the keepalive task after the failure is recorded; the
    /// user-data session is torn down right after.
    pub fn on_keepalive_failure<F>(mut self, hook: F) -> Self
    where
        F: Fn(BinanceError) + Send + Sync + 'static,
    {
        self.on_keepalive_failure = Some(Arc::new(hook));
        self
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.keepalive_interval.is_zero() {
            return Err(ConfigError::KeepAliveIntervalZero);
        }
        if self.keepalive_interval > MAX_KEEPALIVE_INTERVAL {
            return Err(ConfigError::KeepAliveIntervalTooLong {
                interval: self.keepalive_interval,
            });
        }

        if self.rest_timeout < Duration::from_millis(100) {
            return Err(ConfigError::TimeoutTooShort);
        }

        if let Some(url) = &self.rest_url {
            if !(url.starts_with("http://") || url.starts_with("https://")) {
                return Err(ConfigError::InvalidUrl {
                    kind: "REST",
                    url: url.clone(),
                    expected: "http:// or https://",
                });
            }
        }
        if let Some(url) = &self.stream_url {
            if !(url.starts_with("ws://") || url.starts_with("wss://")) {
                return Err(ConfigError::InvalidUrl {
                    kind: "stream",
                    url: url.clone(),
                    expected: "ws:// or wss://",
                });
            }
        }

        Ok(())
    }

    /// REST base URL after defaults
    pub fn rest_url(&self) -> &str {
        self.rest_url.as_deref().unwrap_or(self.variant.rest_url())
    }

    /// Streaming base URL after defaults
    pub fn stream_url(&self) -> &str {
        self.stream_url.as_deref().unwrap_or(self.variant.stream_url())
    }

    pub(crate) fn take_connector(&mut self) -> Arc<dyn Connector> {
        self.connector
            .take()
            .unwrap_or_else(|| Arc::new(WsConnector::new()))
    }

    /// Validate and build the market
    ///
    /// Must be called inside a Tokio runtime only if streams will be
    /// subscribed; building itself spawns nothing.
    pub fn build(self) -> Result<UsdFuturesMarket, ConfigError> {
        self.validate()?;
        UsdFuturesMarket::from_builder(self)
    }
}

impl std::fmt::Debug for MarketBuilder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MarketBuilder")
            .field("variant", &self.variant)
            .field("credentials", &self.credentials)
            .field("rest_url", &self.rest_url())
            .field("stream_url", &self.stream_url())
            .field("rest_timeout", &self.rest_timeout)
            .field("api_key_header", &self.api_key_header)
            .field("registry", &self.registry)
            .field("keepalive_interval", &self.keepalive_interval)
            .field("windows", &self.windows)
            .finish_non_exhaustive()
    }
}
