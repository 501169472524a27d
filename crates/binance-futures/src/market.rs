//! Unified market handle
//!
//! [`UsdFuturesMarket`] ties the streaming registry, the REST gateway, the
//! signer configuration, and the user-data keepalive together behind one
//! cloneable handle.

use crate::builder::{ConfigError, MarketBuilder};
use crate::keepalive::{FailureCallback, KeepAliveTimer, RenewFn};
use binance_auth::{Clock, Credentials, ReceiveWindows, RequestSigner};
use binance_rest::{
    AccountBalance, AccountInformation, AllOrdersResult, CancelOrderResult, GatewayConfig,
    KlineCandlestick, Method, NewOrderResult, RestGateway, RestRecord, TakerBuySellVolume,
};
use binance_types::{
    BinanceError, BinanceResult, FlatRecord, KeyedRecord, MarketVariant, RestCall, StreamKind,
};
use binance_ws::{
    DecodeSpec, RecordCallback, SessionRegistry, StreamEndpoint, StreamRecord, SubscriptionHandle,
    SubscriptionState, UserDataEvent,
};
use futures::FutureExt;
use parking_lot::{Mutex, RwLock};
use std::sync::{Arc, Weak};
use std::time::Duration;
use tokio::sync::{watch, Mutex as AsyncMutex};
use tracing::{debug, info, instrument, warn};

/// The live user-data session and the key keeping it open
struct UserDataSlot {
    url: String,
    handle: SubscriptionHandle,
    keepalive: KeepAliveTimer,
}

impl UserDataSlot {
    fn is_live(&self, registry: &SessionRegistry) -> bool {
        self.keepalive.is_running()
            && registry
                .state(self.handle)
                .map_or(false, |state| !state.is_terminal())
    }
}

struct MarketInner {
    variant: MarketVariant,
    stream_url: String,
    gateway: RestGateway,
    registry: SessionRegistry,
    credentials: RwLock<Arc<Credentials>>,
    windows: RwLock<ReceiveWindows>,
    clock: Option<Clock>,
    keepalive_interval: Duration,
    /// Held across listen-key creation so concurrent callers share one key
    user_data_setup: AsyncMutex<()>,
    user_data: Mutex<Option<UserDataSlot>>,
    user_data_failure: RwLock<Option<String>>,
    on_keepalive_failure: Option<FailureCallback>,
    shutdown_tx: watch::Sender<bool>,
}

impl MarketInner {
    /// Snapshot of the current credentials and windows
    fn signer(&self) -> RequestSigner {
        let signer = RequestSigner::new(self.credentials.read().clone(), *self.windows.read());
        match &self.clock {
            Some(clock) => signer.with_clock(clock.clone()),
            None => signer,
        }
    }

    fn is_shut_down(&self) -> bool {
        *self.shutdown_tx.borrow()
    }

    /// Abort the user-data session whose keepalive has stopped
    ///
    /// A slot with a running keepalive belongs to a newer subscription and
    /// is left alone.
    async fn abort_user_data(&self, reason: String) {
        let handle = self
            .user_data
            .lock()
            .as_ref()
            .filter(|slot| !slot.keepalive.is_running())
            .map(|slot| slot.handle);
        if let Some(handle) = handle {
            self.registry.abort(handle, reason).await;
        }
    }

    /// Stop renewing, end the session, and close the listen key
    async fn release_user_data(&self, slot: UserDataSlot) {
        slot.keepalive.stop();
        self.registry.unsubscribe(slot.handle).await;

        match self.gateway.delete_listen_key(&self.signer()).await {
            Ok(true) => debug!("Listen key deleted"),
            Ok(false) => {}
            Err(e) => warn!(error = %e, "Listen key deletion failed"),
        }
    }
}

/// Resolves once shutdown is requested
async fn shut_down(shutdown: &mut watch::Receiver<bool>) {
    loop {
        if *shutdown.borrow_and_update() {
            return;
        }
        if shutdown.changed().await.is_err() {
            return;
        }
    }
}

/// Binance USD-M Futures market
///
/// Cloning is cheap and every clone shares the same sessions, credentials,
/// and receive windows.
///
/// Dropping the last clone cancels every stream and stops the keepalive, but
/// cannot delete the listen key; call [`UsdFuturesMarket::shutdown`] first
/// for a clean exit.
///
/// # Example
///
/// ```no_run
/// use binance_futures::prelude::*;
///
/// #[tokio::main]
/// async fn main() -> Result<(), Box<dyn std::error::Error>> {
///     let market = UsdFuturesMarket::new(MarketVariant::Live, Credentials::from_env()?)?;
///
///     let handle = market.subscribe_symbol_book("BTCUSDT", |book: FlatRecord| {
///         println!("bid {:?} ask {:?}", book.get("b"), book.get("a"));
///     })?;
///
///     let balance = market.account_balance().await?;
///     println!("USDT: {:?}", balance.balances.get("USDT"));
///
///     market.unsubscribe(handle).await;
///     market.shutdown().await;
///     Ok(())
/// }
/// ```
#[derive(Clone)]
pub struct UsdFuturesMarket {
    inner: Arc<MarketInner>,
}

impl UsdFuturesMarket {
    /// Create a builder
    pub fn builder() -> MarketBuilder {
        MarketBuilder::new()
    }

    /// Create a market with default settings for `variant`
    pub fn new(variant: MarketVariant, credentials: Credentials) -> Result<Self, ConfigError> {
        MarketBuilder::new()
            .with_variant(variant)
            .with_credentials(credentials)
            .build()
    }

    pub(crate) fn from_builder(mut builder: MarketBuilder) -> Result<Self, ConfigError> {
        let mut gateway_config = GatewayConfig::for_variant(builder.variant)
            .with_base_url(builder.rest_url())
            .with_timeout(builder.rest_timeout)
            .with_api_key_header(std::mem::take(&mut builder.api_key_header));
        if let Some(client_id) = builder.client_id.take() {
            gateway_config = gateway_config.with_client_id(client_id);
        }
        let gateway = RestGateway::new(gateway_config)?;

        let connector = builder.take_connector();
        let stream_url = builder.stream_url().trim_end_matches('/').to_string();
        let (shutdown_tx, _) = watch::channel(false);

        info!(variant = %builder.variant, rest_url = gateway.base_url(), %stream_url, "Market created");

        Ok(Self {
            inner: Arc::new(MarketInner {
                variant: builder.variant,
                stream_url,
                gateway,
                registry: SessionRegistry::new(connector, builder.registry),
                credentials: RwLock::new(Arc::new(builder.credentials)),
                windows: RwLock::new(builder.windows),
                clock: builder.clock,
                keepalive_interval: builder.keepalive_interval,
                user_data_setup: AsyncMutex::new(()),
                user_data: Mutex::new(None),
                user_data_failure: RwLock::new(None),
                on_keepalive_failure: builder.on_keepalive_failure,
                shutdown_tx,
            }),
        })
    }

    /// Selected market
    pub fn variant(&self) -> MarketVariant {
        self.inner.variant
    }

    /// REST base URL
    pub fn rest_url(&self) -> &str {
        self.inner.gateway.base_url()
    }

    /// Streaming base URL
    pub fn stream_url(&self) -> &str {
        &self.inner.stream_url
    }

    // ========================================================================
    // Streams
    // ========================================================================

    /// Mark price of every symbol, keyed by symbol
    pub fn subscribe_mark_price<F>(&self, callback: F) -> BinanceResult<SubscriptionHandle>
    where
        F: Fn(KeyedRecord) + Send + Sync + 'static,
    {
        self.subscribe_keyed(StreamEndpoint::mark_price(), callback)
    }

    /// Mini ticker of every symbol, keyed by symbol
    pub fn subscribe_mini_ticker<F>(&self, callback: F) -> BinanceResult<SubscriptionHandle>
    where
        F: Fn(KeyedRecord) + Send + Sync + 'static,
    {
        self.subscribe_keyed(StreamEndpoint::mini_ticker(), callback)
    }

    /// Kline updates for `symbol` at `interval` (`1m`, `1h`, ...)
    pub fn subscribe_kline<F>(&self, symbol: &str, interval: &str, callback: F) -> BinanceResult<SubscriptionHandle>
    where
        F: Fn(FlatRecord) + Send + Sync + 'static,
    {
        self.subscribe_flat(StreamEndpoint::kline(symbol, interval), callback)
    }

    /// Mini ticker for `symbol`
    pub fn subscribe_symbol<F>(&self, symbol: &str, callback: F) -> BinanceResult<SubscriptionHandle>
    where
        F: Fn(FlatRecord) + Send + Sync + 'static,
    {
        self.subscribe_flat(StreamEndpoint::symbol(symbol), callback)
    }

    /// Best bid and ask for `symbol`
    pub fn subscribe_symbol_book<F>(&self, symbol: &str, callback: F) -> BinanceResult<SubscriptionHandle>
    where
        F: Fn(FlatRecord) + Send + Sync + 'static,
    {
        self.subscribe_flat(StreamEndpoint::symbol_book(symbol), callback)
    }

    /// Private order and account events
    ///
    /// Creates a listen key, starts renewing it, and subscribes to its
    /// stream. While that session is live, later calls join it and return
    /// the same handle instead of creating another key.
    ///
    /// If a renewal fails the session ends [`SubscriptionState::Broken`]
    /// and [`UsdFuturesMarket::user_data_failure`] reports why; call this
    /// again to start over with a fresh key.
    ///
    /// # Errors
    /// - [`BinanceError::Cancelled`] after shutdown
    /// - [`BinanceError::KeepAlive`] if the exchange refuses to create a key
    /// - transport errors from the listen-key request
    #[instrument(skip(self, callback))]
    pub async fn subscribe_user_data<F>(&self, callback: F) -> BinanceResult<SubscriptionHandle>
    where
        F: Fn(UserDataEvent) + Send + Sync + 'static,
    {
        self.ensure_open("subscribe_user_data")?;
        let callback: RecordCallback = Arc::new(move |record: StreamRecord| {
            if let StreamRecord::UserData(event) = record {
                callback(event)
            }
        });

        let inner = &self.inner;
        let _setup = inner.user_data_setup.lock().await;

        let live = inner
            .user_data
            .lock()
            .as_ref()
            .filter(|s| s.is_live(&inner.registry))
            .map(|s| (s.handle, s.url.clone()));
        if let Some((handle, url)) = live {
            debug!(id = handle.id(), "Joining live user-data session");
            return Ok(inner.registry.subscribe_or_join(
                StreamKind::UserData,
                &url,
                DecodeSpec::UserData,
                callback,
            ));
        }
        let stale = inner.user_data.lock().take();
        if let Some(stale) = stale {
            debug!(id = stale.handle.id(), "Replacing ended user-data session");
            inner.release_user_data(stale).await;
        }

        let key = inner.gateway.create_listen_key(&inner.signer()).await?;
        if !key.valid {
            return Err(BinanceError::KeepAlive(format!(
                "listen key creation rejected: {}",
                key.raw_error
            )));
        }

        let keepalive = KeepAliveTimer::start(inner.keepalive_interval, self.renew_fn(), self.failure_callback());

        let stream = StreamEndpoint::user_data(&key.listen_key);
        let url = stream.url(&inner.stream_url);
        let handle = inner
            .registry
            .subscribe_or_join(stream.kind(), &url, stream.decode_spec(), callback);

        *inner.user_data_failure.write() = None;
        info!(id = handle.id(), "User-data stream subscribed");
        *inner.user_data.lock() = Some(UserDataSlot {
            url,
            handle,
            keepalive,
        });
        Ok(handle)
    }

    /// End a subscription
    ///
    /// Ending the user-data subscription also stops the keepalive and
    /// deletes the listen key. Unknown handles are ignored.
    #[instrument(skip(self), fields(id = handle.id()))]
    pub async fn unsubscribe(&self, handle: SubscriptionHandle) {
        let inner = &self.inner;
        if handle.kind() == StreamKind::UserData {
            let current = {
                let mut slot = inner.user_data.lock();
                if slot.as_ref().map_or(false, |s| s.handle == handle) {
                    slot.take()
                } else {
                    None
                }
            };
            if let Some(current) = current {
                inner.release_user_data(current).await;
                return;
            }
        }
        inner.registry.unsubscribe(handle).await;
    }

    /// End every subscription, stop the keepalive, and delete the listen key
    #[instrument(skip(self))]
    pub async fn unsubscribe_all(&self) {
        let inner = &self.inner;
        let current = inner.user_data.lock().take();
        if let Some(current) = current {
            inner.release_user_data(current).await;
        }
        inner.registry.close_all().await;
    }

    /// Current state of a subscription, `None` once it has been removed
    pub fn subscription_state(&self, handle: SubscriptionHandle) -> Option<SubscriptionState> {
        self.inner.registry.state(handle)
    }

    /// Why a broken subscription failed
    pub fn subscription_failure(&self, handle: SubscriptionHandle) -> Option<String> {
        self.inner.registry.failure(handle)
    }

    /// Handles of subscriptions that have not ended
    pub fn active_subscriptions(&self) -> Vec<SubscriptionHandle> {
        let registry = &self.inner.registry;
        registry
            .handles()
            .into_iter()
            .filter(|h| registry.state(*h).map_or(false, |s| !s.is_terminal()))
            .collect()
    }

    /// Error that stopped the most recent user-data keepalive
    ///
    /// Cleared when a new user-data subscription starts.
    pub fn user_data_failure(&self) -> Option<String> {
        self.inner.user_data_failure.read().clone()
    }

    fn subscribe_keyed<F>(&self, stream: StreamEndpoint, callback: F) -> BinanceResult<SubscriptionHandle>
    where
        F: Fn(KeyedRecord) + Send + Sync + 'static,
    {
        self.subscribe_stream(
            stream,
            Arc::new(move |record: StreamRecord| {
                if let StreamRecord::Keyed(keyed) = record {
                    callback(keyed)
                }
            }),
        )
    }

    fn subscribe_flat<F>(&self, stream: StreamEndpoint, callback: F) -> BinanceResult<SubscriptionHandle>
    where
        F: Fn(FlatRecord) + Send + Sync + 'static,
    {
        self.subscribe_stream(
            stream,
            Arc::new(move |record: StreamRecord| {
                if let StreamRecord::Flat(flat) = record {
                    callback(flat)
                }
            }),
        )
    }

    fn subscribe_stream(&self, stream: StreamEndpoint, callback: RecordCallback) -> BinanceResult<SubscriptionHandle> {
        self.ensure_open("subscribe")?;
        let url = stream.url(&self.inner.stream_url);
        debug!(%stream, "Subscribing");
        Ok(self
            .inner
            .registry
            .subscribe(stream.kind(), &url, stream.decode_spec(), callback))
    }

    fn renew_fn(&self) -> RenewFn {
        let weak: Weak<MarketInner> = Arc::downgrade(&self.inner);
        Arc::new(move || {
            let weak = weak.clone();
            async move {
                match weak.upgrade() {
                    Some(inner) => {
                        let signer = inner.signer();
                        inner.gateway.renew_listen_key(&signer).await
                    }
                    None => Err(BinanceError::Cancelled("market dropped".to_string())),
                }
            }
            .boxed()
        })
    }

    fn failure_callback(&self) -> FailureCallback {
        let weak: Weak<MarketInner> = Arc::downgrade(&self.inner);
        Arc::new(move |error: BinanceError| {
            let Some(inner) = weak.upgrade() else {
                return;
            };
            let reason = error.to_string();
            warn!(%reason, "User-data keepalive failed, closing stream");
            *inner.user_data_failure.write() = Some(reason.clone());

            if let Some(hook) = &inner.on_keepalive_failure {
                hook(error);
            }
            tokio::spawn(async move {
                inner.abort_user_data(reason).await;
            });
        })
    }

    // ========================================================================
    // REST
    // ========================================================================

    /// Round-trip time of the connectivity check
    #[instrument(skip(self))]
    pub async fn ping(&self) -> BinanceResult<Duration> {
        self.ensure_open("ping")?;
        let signer = self.inner.signer();
        self.until_shutdown("ping", self.inner.gateway.ping(&signer)).await
    }

    /// Place an order (`symbol`, `side`, `type`, `quantity`, ...)
    pub async fn new_order(&self, params: &[(&str, &str)]) -> BinanceResult<NewOrderResult> {
        self.rest("new_order", RestCall::NewOrder, Method::POST, params).await
    }

    /// Cancel an order by `orderId` or `origClientOrderId`
    pub async fn cancel_order(&self, params: &[(&str, &str)]) -> BinanceResult<CancelOrderResult> {
        self.rest("cancel_order", RestCall::CancelOrder, Method::DELETE, params).await
    }

    /// All orders for a `symbol`
    pub async fn all_orders(&self, params: &[(&str, &str)]) -> BinanceResult<AllOrdersResult> {
        self.rest("all_orders", RestCall::AllOrders, Method::GET, params).await
    }

    /// Account summary with assets and positions
    pub async fn account_information(&self) -> BinanceResult<AccountInformation> {
        self.rest("account_information", RestCall::AccountInfo, Method::GET, &[])
            .await
    }

    /// Balance per asset
    pub async fn account_balance(&self) -> BinanceResult<AccountBalance> {
        self.rest("account_balance", RestCall::AccountBalance, Method::GET, &[])
            .await
    }

    /// Historical candles (`symbol`, `interval`, optional `limit`, ...)
    pub async fn klines(&self, params: &[(&str, &str)]) -> BinanceResult<KlineCandlestick> {
        self.rest("klines", RestCall::KlineCandles, Method::GET, params).await
    }

    /// Taker buy/sell volume (`symbol`, `period`, ...)
    ///
    /// # Errors
    /// Returns [`BinanceError::Unsupported`] on the test network.
    pub async fn taker_buy_sell_volume(&self, params: &[(&str, &str)]) -> BinanceResult<TakerBuySellVolume> {
        self.rest(
            "taker_buy_sell_volume",
            RestCall::TakerBuySellVolume,
            Method::GET,
            params,
        )
        .await
    }

    #[instrument(skip(self, params))]
    async fn rest<R: RestRecord>(
        &self,
        operation: &'static str,
        call: RestCall,
        method: Method,
        params: &[(&str, &str)],
    ) -> BinanceResult<R> {
        self.ensure_open(operation)?;
        if !self.inner.variant.supports(call) {
            return Err(BinanceError::Unsupported {
                operation,
                variant: self.inner.variant,
            });
        }

        let signer = self.inner.signer();
        let request = self
            .inner
            .gateway
            .call(&signer, call, method, call.requires_signature(), params);
        self.until_shutdown(operation, request).await
    }

    async fn until_shutdown<T>(
        &self,
        operation: &'static str,
        request: impl std::future::Future<Output = BinanceResult<T>>,
    ) -> BinanceResult<T> {
        let mut shutdown = self.inner.shutdown_tx.subscribe();
        tokio::select! {
            biased;
            _ = shut_down(&mut shutdown) => Err(BinanceError::Cancelled(format!(
                "{} interrupted by shutdown",
                operation
            ))),
            result = request => result,
        }
    }

    fn ensure_open(&self, operation: &'static str) -> BinanceResult<()> {
        if self.inner.is_shut_down() {
            Err(BinanceError::Cancelled(format!("{} after shutdown", operation)))
        } else {
            Ok(())
        }
    }

    // ========================================================================
    // Configuration
    // ========================================================================

    /// Replace the credentials used by every later call
    pub fn set_credentials(&self, credentials: Credentials) {
        *self.inner.credentials.write() = Arc::new(credentials);
        debug!("Credentials replaced");
    }

    /// Set the receive window for one call kind
    pub fn set_receive_window(&self, call: RestCall, window: Duration) {
        self.inner.windows.write().set(call, window);
    }

    /// Receive window for one call kind
    pub fn receive_window(&self, call: RestCall) -> Duration {
        Duration::from_millis(self.inner.windows.read().get(call))
    }

    // ========================================================================
    // Lifecycle
    // ========================================================================

    /// Close every stream and delete the listen key
    ///
    /// In-flight REST calls return [`BinanceError::Cancelled`], as does every
    /// operation issued afterwards. Calling it again is a no-op.
    #[instrument(skip(self))]
    pub async fn shutdown(&self) {
        if self.inner.shutdown_tx.send_replace(true) {
            return;
        }
        info!("Shutting down");
        self.unsubscribe_all().await;
        info!("Shutdown complete");
    }

    /// Check if [`UsdFuturesMarket::shutdown`] has been called
    pub fn is_shut_down(&self) -> bool {
        self.inner.is_shut_down()
    }
}

impl std::fmt::Debug for UsdFuturesMarket {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UsdFuturesMarket")
            .field("variant", &self.inner.variant)
            .field("rest_url", &self.inner.gateway.base_url())
            .field("stream_url", &self.inner.stream_url)
            .field("sessions", &self.inner.registry.len())
            .field("shut_down", &self.inner.is_shut_down())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use binance_ws::MockConnector;

    fn market(variant: MarketVariant) -> UsdFuturesMarket {
        MarketBuilder::new()
            .with_variant(variant)
            .with_rest_url("http://127.0.0.1:1")
            .with_connector(Arc::new(MockConnector::new()))
            .build()
            .unwrap()
    }

    #[tokio::test]
    async fn test_receive_window_defaults_and_updates() {
        let market = market(MarketVariant::Live);
        assert_eq!(market.receive_window(RestCall::NewOrder), Duration::from_millis(5000));

        market.set_receive_window(RestCall::NewOrder, Duration::from_millis(1500));
        assert_eq!(market.receive_window(RestCall::NewOrder), Duration::from_millis(1500));
        assert_eq!(market.receive_window(RestCall::AllOrders), Duration::from_millis(5000));
    }

    #[tokio::test]
    async fn test_clones_share_configuration() {
        let market = market(MarketVariant::Live);
        let other = market.clone();

        other.set_receive_window(RestCall::AccountBalance, Duration::from_millis(2500));
        assert_eq!(market.receive_window(RestCall::AccountBalance), Duration::from_millis(2500));

        other.set_credentials(Credentials::new("key", "secret").unwrap());
        assert!(market.inner.signer().api_key() == "key");
    }

    #[tokio::test]
    async fn test_taker_volume_unsupported_on_test_network() {
        let market = market(MarketVariant::Test);
        let err = market
            .taker_buy_sell_volume(&[("symbol", "BTCUSDT"), ("period", "5m")])
            .await
            .unwrap_err();

        assert!(matches!(
            err,
            BinanceError::Unsupported {
                operation: "taker_buy_sell_volume",
                variant: MarketVariant::Test
            }
        ));
        assert!(err.is_fatal());
    }

    #[tokio::test]
    async fn test_shutdown_cancels_later_operations() {
        let market = market(MarketVariant::Live);
        market.shutdown().await;

        assert!(market.is_shut_down());
        assert!(market.ping().await.unwrap_err().is_cancelled());
        assert!(market.account_balance().await.unwrap_err().is_cancelled());
        assert!(market
            .subscribe_symbol_book("BTCUSDT", |_: FlatRecord| {})
            .unwrap_err()
            .is_cancelled());
        assert!(market
            .subscribe_user_data(|_: UserDataEvent| {})
            .await
            .unwrap_err()
            .is_cancelled());

        // second shutdown is a no-op
        market.shutdown().await;
    }

    #[tokio::test]
    async fn test_stream_urls_use_configured_host() {
        let connector = MockConnector::new();
        let market = MarketBuilder::new()
            .with_stream_url("wss://mock.test/")
            .with_connector(Arc::new(connector.clone()))
            .build()
            .unwrap();

        let handle = market.subscribe_kline("BTCUSDT", "1m", |_: FlatRecord| {}).unwrap();
        assert_eq!(market.stream_url(), "wss://mock.test");
        assert!(connector.feed("wss://mock.test/ws/btcusdt@kline_1m").is_some());

        market.unsubscribe(handle).await;
        assert!(market.subscription_state(handle).is_none());
    }
}
