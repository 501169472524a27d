//! Query canonicalization and HMAC-SHA256 request signing

use crate::credentials::Credentials;
use crate::window::ReceiveWindows;
use binance_types::{BinanceError, BinanceResult, RestCall};
use hmac::{Hmac, Mac};
use sha2::Sha256;
use std::sync::Arc;
use tracing::trace;

type HmacSha256 = Hmac<Sha256>;

/// Source of epoch milliseconds for request timestamps
pub type Clock = Arc<dyn Fn() -> i64 + Send + Sync>;

/// Clock backed by the system time
pub fn system_clock() -> Clock {
    Arc::new(|| chrono::Utc::now().timestamp_millis())
}

/// HMAC-SHA256 over `payload`, lowercase hex encoded
pub fn sign(secret: &[u8], payload: &str) -> String {
    let mut mac = HmacSha256::new_from_slice(secret).expect("HMAC can take key of any size");
    mac.update(payload.as_bytes());
    hex::encode(mac.finalize().into_bytes())
}

/// Builds canonical query strings, signing them when asked
///
/// A signer is a snapshot: it holds the credentials and receive windows
/// that were current when it was created.
#[derive(Clone)]
pub struct RequestSigner {
    credentials: Arc<Credentials>,
    windows: ReceiveWindows,
    clock: Clock,
}

impl RequestSigner {
    /// Create a signer using the system clock
    pub fn new(credentials: Arc<Credentials>, windows: ReceiveWindows) -> Self {
        Self {
            credentials,
            windows,
            clock: system_clock(),
        }
    }

    /// Replace the timestamp source
    pub fn with_clock(mut self, clock: Clock) -> Self {
        self.clock = clock;
        self
    }

    /// Get the API key sent in the request header
    pub fn api_key(&self) -> &str {
        self.credentials.api_key()
    }

    /// Get the receive windows this signer uses
    pub fn windows(&self) -> &ReceiveWindows {
        &self.windows
    }

    /// Build the query string, timestamped by the signer's clock
    pub fn build_query<K, V>(&self, params: &[(K, V)], call: RestCall, signed: bool) -> BinanceResult<String>
    where
        K: AsRef<str>,
        V: AsRef<str>,
    {
        self.build_query_at(params, call, signed, (self.clock)())
    }

    /// Build the query string with an explicit timestamp
    ///
    /// Parameters keep the caller's order. Identical inputs always produce
    /// byte-identical output.
    ///
    /// # Errors
    /// Returns [`BinanceError::Credential`] if `signed` is set and no
    /// secret key is configured.
    pub fn build_query_at<K, V>(
        &self,
        params: &[(K, V)],
        call: RestCall,
        signed: bool,
        timestamp_ms: i64,
    ) -> BinanceResult<String>
    where
        K: AsRef<str>,
        V: AsRef<str>,
    {
        let mut pairs: Vec<String> = params
            .iter()
            .map(|(k, v)| format!("{}={}", k.as_ref(), v.as_ref()))
            .collect();

        if !signed {
            return Ok(pairs.join("&"));
        }

        let secret = self.credentials.secret().ok_or_else(|| {
            BinanceError::Credential(format!("{} requires a secret key", call))
        })?;

        pairs.push(format!("recvWindow={}", self.windows.get(call)));
        pairs.push(format!("timestamp={}", timestamp_ms));
        let query = pairs.join("&");
        let signature = sign(secret, &query);

        trace!(%call, "Signed query");
        Ok(format!("{}&signature={}", query, signature))
    }
}

impl std::fmt::Debug for RequestSigner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RequestSigner")
            .field("credentials", &self.credentials)
            .field("windows", &self.windows)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    const TIMESTAMP: i64 = 1_700_000_000_000;

    fn signer(secret: &str) -> RequestSigner {
        let creds = Credentials::new("test_key", secret).unwrap();
        RequestSigner::new(Arc::new(creds), ReceiveWindows::default())
    }

    fn split_signature(query: &str) -> (&str, &str) {
        query.rsplit_once("&signature=").unwrap()
    }

    #[test]
    fn test_exchange_documented_vector() {
        let signer = signer("NhqPtmdSJYdKjVHjA7PZj4Mge3R5YNiP1e3UZjInClVN65XAbvqqM6A7H5fATj0j");
        let params = [
            ("symbol", "LTCBTC"),
            ("side", "BUY"),
            ("type", "LIMIT"),
            ("timeInForce", "GTC"),
            ("quantity", "1"),
            ("price", "0.1"),
        ];

        let query = signer
            .build_query_at(&params, RestCall::NewOrder, true, 1_499_827_319_559)
            .unwrap();

        assert_eq!(
            query,
            "symbol=LTCBTC&side=BUY&type=LIMIT&timeInForce=GTC&quantity=1&price=0.1\
             &recvWindow=5000&timestamp=1499827319559\
             &signature=c8db56825ae71d6d79447849e617115f4a920fa2acdcab2b053c4b2838bd6b71"
        );
    }

    #[test]
    fn test_known_hmac_vector() {
        let query = "price=100&quantity=0.1&recvWindow=5000&side=BUY&symbol=BTCUSDT&timeInForce=GTC&timestamp=1700000000000&type=LIMIT";
        assert_eq!(
            sign(b"testsecret", query),
            "7ce35481df1c771813dfdf305ecf8a94804816bdc818eeb0404e79a58c887f66"
        );
    }

    #[test]
    fn test_signature_matches_reference_for_every_ordering() {
        let signer = signer("testsecret");
        let pairs = [("symbol", "BTCUSDT"), ("side", "SELL"), ("quantity", "0.5")];
        let orderings = [
            [0, 1, 2],
            [0, 2, 1],
            [1, 0, 2],
            [1, 2, 0],
            [2, 0, 1],
            [2, 1, 0],
        ];

        for order in orderings {
            let params: Vec<(&str, &str)> = order.iter().map(|&i| pairs[i]).collect();
            let query = signer
                .build_query_at(&params, RestCall::NewOrder, true, TIMESTAMP)
                .unwrap();
            let (canonical, signature) = split_signature(&query);

            let mut reference = HmacSha256::new_from_slice(b"testsecret").unwrap();
            reference.update(canonical.as_bytes());
            assert_eq!(signature, hex::encode(reference.finalize().into_bytes()));

            let again = signer
                .build_query_at(&params, RestCall::NewOrder, true, TIMESTAMP)
                .unwrap();
            assert_eq!(query, again);
        }
    }

    #[test]
    fn test_unsigned_query_has_no_auth_params() {
        let signer = RequestSigner::new(Arc::new(Credentials::none()), ReceiveWindows::default());
        let query = signer
            .build_query(&[("symbol", "BTCUSDT"), ("interval", "1m")], RestCall::KlineCandles, false)
            .unwrap();
        assert_eq!(query, "symbol=BTCUSDT&interval=1m");

        let empty: [(&str, &str); 0] = [];
        assert_eq!(signer.build_query(&empty, RestCall::Ping, false).unwrap(), "");
    }

    #[test]
    fn test_signed_without_secret_fails() {
        let signer = RequestSigner::new(
            Arc::new(Credentials::api_key_only("key")),
            ReceiveWindows::default(),
        );
        let result = signer.build_query(&[("symbol", "BTCUSDT")], RestCall::NewOrder, true);
        assert!(matches!(result, Err(BinanceError::Credential(_))));
    }

    #[test]
    fn test_signed_with_no_params() {
        let query = signer("s")
            .build_query_at::<&str, &str>(&[], RestCall::AccountBalance, true, TIMESTAMP)
            .unwrap();
        assert!(query.starts_with("recvWindow=5000&timestamp=1700000000000&signature="));
    }

    #[test]
    fn test_receive_window_per_call() {
        let creds = Arc::new(Credentials::new("k", "s").unwrap());
        let windows = ReceiveWindows::new().with(RestCall::CancelOrder, Duration::from_millis(250));
        let signer = RequestSigner::new(creds, windows).with_clock(Arc::new(|| TIMESTAMP));

        let cancel = signer.build_query(&[("orderId", "1")], RestCall::CancelOrder, true).unwrap();
        let order = signer.build_query(&[("orderId", "1")], RestCall::NewOrder, true).unwrap();

        assert!(cancel.contains("recvWindow=250&timestamp=1700000000000"));
        assert!(order.contains("recvWindow=5000&timestamp=1700000000000"));
    }
}
