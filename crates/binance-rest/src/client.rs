//! REST gateway implementation

use crate::types::{ListenKeyResult, RestRecord};
use binance_auth::RequestSigner;
use binance_types::{BinanceError, BinanceResult, MarketVariant, RestCall};
use reqwest::header::CONTENT_TYPE;
use reqwest::{Client, Method, StatusCode};
use serde_json::Value;
use std::time::{Duration, Instant};
use tracing::{debug, info, instrument, warn};

/// Default bound on each HTTP call
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

/// Default value of the client identifier header
pub const DEFAULT_CLIENT_ID: &str = concat!("binance-futures-rs/", env!("CARGO_PKG_VERSION"));

/// Default name of the header carrying the API key
pub const DEFAULT_API_KEY_HEADER: &str = "X-API-KEY";

/// Header name the production exchange reads the API key from
///
/// Pass it to [`GatewayConfig::with_api_key_header`] when talking to
/// Binance directly rather than through a proxy that renames headers.
pub const EXCHANGE_API_KEY_HEADER: &str = "X-MBX-APIKEY";

/// Header carrying the client identifier
const CLIENT_ID_HEADER: &str = "client_SDK_Version";

/// Gateway configuration
#[derive(Debug, Clone)]
pub struct GatewayConfig {
    /// Base REST URI, without a trailing slash
    pub base_url: String,
    /// Bound on each HTTP call
    pub timeout: Duration,
    /// Client identifier sent with every request
    pub client_id: String,
    /// Name of the header carrying the API key
    pub api_key_header: String,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self::for_variant(MarketVariant::Live)
    }
}

impl GatewayConfig {
    /// Create a configuration for a market variant
    pub fn for_variant(variant: MarketVariant) -> Self {
        Self {
            base_url: variant.rest_url().to_string(),
            timeout: DEFAULT_TIMEOUT,
            client_id: DEFAULT_CLIENT_ID.to_string(),
            api_key_header: DEFAULT_API_KEY_HEADER.to_string(),
        }
    }

    /// Set the base URI
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    /// Set the per-call timeout
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Set the client identifier
    pub fn with_client_id(mut self, client_id: impl Into<String>) -> Self {
        self.client_id = client_id.into();
        self
    }

    /// Set the name of the API-key header
    pub fn with_api_key_header(mut self, name: impl Into<String>) -> Self {
        self.api_key_header = name.into();
        self
    }
}

/// REST gateway for USD-M Futures
///
/// Cheap to clone; clones share the connection pool.
#[derive(Clone)]
pub struct RestGateway {
    http_client: Client,
    base_url: String,
    timeout: Duration,
    client_id: String,
    api_key_header: String,
}

impl RestGateway {
    /// Create a gateway
    ///
    /// # Errors
    /// Returns [`BinanceError::ConnectionFailed`] if the HTTP client cannot
    /// be built (e.g. the TLS backend fails to initialize).
    pub fn new(config: GatewayConfig) -> BinanceResult<Self> {
        let http_client = Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| BinanceError::connection_failed(&config.base_url, e))?;

        info!(base_url = %config.base_url, "Created REST gateway");

        Ok(Self {
            http_client,
            base_url: config.base_url,
            timeout: config.timeout,
            client_id: config.client_id,
            api_key_header: config.api_key_header,
        })
    }

    /// Get the base URI
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Get the per-call timeout
    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Issue a REST call and map the response into `R`
    ///
    /// Non-OK statuses produce `R::invalid` with the raw body (or the status
    /// line when the body is empty).
    ///
    /// # Errors
    /// - [`BinanceError::Credential`] if `signed` and no secret is configured
    /// - [`BinanceError::ConnectionTimeout`] / [`BinanceError::ConnectionFailed`]
    ///   on transport failure
    /// - [`BinanceError::Protocol`] if an OK body is not the expected JSON
    #[instrument(skip(self, signer, params))]
    pub async fn call<R, K, V>(
        &self,
        signer: &RequestSigner,
        call: RestCall,
        method: Method,
        signed: bool,
        params: &[(K, V)],
    ) -> BinanceResult<R>
    where
        R: RestRecord,
        K: AsRef<str>,
        V: AsRef<str>,
    {
        let query = signer.build_query(params, call, signed)?;
        let url = self.url(call, &query);

        let (status, body) = self.dispatch(method, &url, signer.api_key()).await?;

        if !status.is_success() {
            warn!(%status, "Exchange rejected call");
            let raw_error = if body.is_empty() { status.to_string() } else { body };
            return Ok(R::invalid(raw_error));
        }

        let value: Value = serde_json::from_str(&body).map_err(|e| {
            BinanceError::protocol(format!("malformed {} response: {}", call, e), Some(&body))
        })?;
        R::from_json(value)
    }

    /// Measure the round trip of the connectivity check
    ///
    /// The latency is returned even if the status is not OK; that case is
    /// logged.
    #[instrument(skip(self, signer))]
    pub async fn ping(&self, signer: &RequestSigner) -> BinanceResult<Duration> {
        let url = self.url(RestCall::Ping, "");

        let started = Instant::now();
        let (status, _) = self.dispatch(Method::GET, &url, signer.api_key()).await?;
        let elapsed = started.elapsed();

        if !status.is_success() {
            warn!(%status, "Ping returned a non-OK status");
        }
        debug!(?elapsed, "Ping complete");
        Ok(elapsed)
    }

    /// Create a user-data listen key
    #[instrument(skip(self, signer))]
    pub async fn create_listen_key(&self, signer: &RequestSigner) -> BinanceResult<ListenKeyResult> {
        self.call::<ListenKeyResult, &str, &str>(signer, RestCall::ListenKey, Method::POST, false, &[])
            .await
    }

    /// Extend the validity of the current listen key
    ///
    /// Renewal is not signed and takes no `recvWindow`.
    ///
    /// # Errors
    /// Returns [`BinanceError::KeepAlive`] on a non-OK status, alongside the
    /// transport errors of [`RestGateway::call`].
    #[instrument(skip(self, signer))]
    pub async fn renew_listen_key(&self, signer: &RequestSigner) -> BinanceResult<()> {
        let url = self.url(RestCall::ListenKey, "");
        let (status, body) = self.dispatch(Method::PUT, &url, signer.api_key()).await?;

        if status.is_success() {
            debug!("Listen key renewed");
            Ok(())
        } else {
            Err(BinanceError::KeepAlive(format!("{}: {}", status, body)))
        }
    }

    /// Close the listen key
    ///
    /// Returns false if the exchange rejected the request.
    #[instrument(skip(self, signer))]
    pub async fn delete_listen_key(&self, signer: &RequestSigner) -> BinanceResult<bool> {
        let url = self.url(RestCall::ListenKey, "");
        let (status, body) = self.dispatch(Method::DELETE, &url, signer.api_key()).await?;

        if !status.is_success() {
            warn!(%status, %body, "Listen key deletion rejected");
        }
        Ok(status.is_success())
    }

    fn url(&self, call: RestCall, query: &str) -> String {
        if query.is_empty() {
            format!("{}{}", self.base_url, call.path())
        } else {
            format!("{}{}?{}", self.base_url, call.path(), query)
        }
    }

    async fn dispatch(&self, method: Method, url: &str, api_key: &str) -> BinanceResult<(StatusCode, String)> {
        let response = self
            .http_client
            .request(method, url)
            .header(self.api_key_header.as_str(), api_key)
            .header(CONTENT_TYPE, "application/json")
            .header(CLIENT_ID_HEADER, &self.client_id)
            .send()
            .await
            .map_err(|e| self.transport_error(e))?;

        let status = response.status();
        let body = response.text().await.map_err(|e| self.transport_error(e))?;
        Ok((status, body))
    }

    fn transport_error(&self, err: reqwest::Error) -> BinanceError {
        if err.is_timeout() {
            BinanceError::ConnectionTimeout {
                url: self.base_url.clone(),
                timeout: self.timeout,
            }
        } else {
            BinanceError::connection_failed(&self.base_url, err)
        }
    }
}

impl std::fmt::Debug for RestGateway {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RestGateway")
            .field("base_url", &self.base_url)
            .field("timeout", &self.timeout)
            .field("api_key_header", &self.api_key_header)
            .finish()
    }
}
