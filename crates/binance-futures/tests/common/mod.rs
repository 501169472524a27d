//! Common test utilities and fixtures for integration tests
//!
//! Frames and bodies follow the shapes documented for the USD-M Futures API

#![allow(dead_code)]

use binance_futures::{Credentials, MarketBuilder, UsdFuturesMarket};
use binance_ws::MockConnector;
use httpmock::MockServer;
use std::sync::Arc;
use std::time::Duration;

/// Streaming host used with the mock connector
pub const STREAM_HOST: &str = "wss://mock.test";

/// Fixed signing timestamp
pub const TIMESTAMP_MS: i64 = 1_499_827_319_559;

pub const API_KEY: &str = "test-api-key";
pub const SECRET_KEY: &str = "test-secret-key";

/// Listen key returned by the mock exchange
pub const LISTEN_KEY: &str = "pqia91ma19a5s61cv6a81va65sdf19v8a65a1a5s61cv6a81va65sdf19v8a65a1";

/// Body of a successful listen-key creation
pub const LISTEN_KEY_RESPONSE: &str =
    r#"{"listenKey":"pqia91ma19a5s61cv6a81va65sdf19v8a65a1a5s61cv6a81va65sdf19v8a65a1"}"#;

/// `!markPrice@arr` frame
pub const MARK_PRICE_FRAME: &str = r#"[
    {"e":"markPriceUpdate","E":1562305380000,"s":"BTCUSDT","p":"11794.15000000","i":"11784.62659091","P":"11784.25641265","r":"0.00038167","T":1562306400000},
    {"e":"markPriceUpdate","E":1562305380000,"s":"ETHUSDT","p":"2350.11000000","i":"2349.80000000","P":"2350.00000000","r":"0.00010000","T":1562306400000}
]"#;

/// `<symbol>@bookTicker` frame
pub const BOOK_TICKER_FRAME: &str = r#"{
    "e":"bookTicker","u":400900217,"E":1568014460893,"T":1568014460891,
    "s":"BNBUSDT","b":"25.35190000","B":"31.21000000","a":"25.36520000","A":"40.66000000"
}"#;

/// `<symbol>@kline_<interval>` frame
pub const KLINE_FRAME: &str = r#"{
    "e":"kline","E":1638747660000,"s":"BTCUSDT",
    "k":{"t":1638747660000,"T":1638747719999,"s":"BTCUSDT","i":"1m","f":100,"L":200,
         "o":"0.0010","c":"0.0020","h":"0.0025","l":"0.0015","v":"1000","n":100,
         "x":false,"q":"1.0000","V":"500","Q":"0.500","B":"123456"}
}"#;

/// Order fill on the user-data stream
pub const ORDER_TRADE_UPDATE_FRAME: &str = r#"{
    "e":"ORDER_TRADE_UPDATE","E":1568879465651,"T":1568879465650,
    "o":{"s":"BTCUSDT","c":"TEST","S":"SELL","o":"TRAILING_STOP_MARKET","f":"GTC",
         "q":"0.001","p":"0","ap":"0","sp":"7103.04","x":"NEW","X":"NEW","i":8886774,
         "l":"0","z":"0","L":"0","T":1568879465650,"t":0,"ps":"LONG"}
}"#;

/// Balance and position change on the user-data stream
pub const ACCOUNT_UPDATE_FRAME: &str = r#"{
    "e":"ACCOUNT_UPDATE","E":1564745798939,"T":1564745798938,
    "a":{"m":"ORDER",
         "B":[{"a":"USDT","wb":"122624.12345678","cw":"100.12345678","bc":"50.12345678"},
              {"a":"BUSD","wb":"1.00000000","cw":"0.00000000","bc":"-49.12345678"}],
         "P":[{"s":"BTCUSDT","pa":"0","ep":"0.00000","cr":"200","up":"0","mt":"isolated","iw":"0.00000000","ps":"BOTH"},
              {"s":"BTCUSDT","pa":"20","ep":"6563.66500","cr":"0","up":"2850.21200","mt":"isolated","iw":"13200.70726908","ps":"LONG"}]}
}"#;

/// Body of `POST /fapi/v1/order`
pub const NEW_ORDER_RESPONSE: &str = r#"{
    "clientOrderId":"testOrder","cumQty":"0","cumQuote":"0","executedQty":"0",
    "orderId":22542179,"avgPrice":"0.00000","origQty":"10","price":"0",
    "reduceOnly":false,"side":"BUY","positionSide":"SHORT","status":"NEW",
    "stopPrice":"9300","symbol":"BTCUSDT","timeInForce":"GTD","type":"TRAILING_STOP_MARKET",
    "updateTime":1566818724722
}"#;

/// Body of `GET /fapi/v1/klines`
pub const KLINES_RESPONSE: &str = r#"[
    [1499040000000,"0.01634790","0.80000000","0.01575800","0.01577100","148976.11427815",1499644799999,"2434.19055334",308,"1756.87402397","28.46694368","0"]
]"#;

/// Error body for a rejected order
pub const INSUFFICIENT_MARGIN: &str = r#"{"code":-2019,"msg":"Margin is insufficient."}"#;

/// Error body for a renewal of an unknown listen key
pub const UNKNOWN_LISTEN_KEY: &str = r#"{"code":-1125,"msg":"This listenKey does not exist."}"#;

/// URL of the user-data stream for [`LISTEN_KEY`]
pub fn user_data_url() -> String {
    format!("{}/ws/{}", STREAM_HOST, LISTEN_KEY)
}

/// Install a test subscriber once; honors `RUST_LOG`
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

/// Builder wired to a mock REST server and a mock stream connector
pub fn mock_builder(server: &MockServer, connector: &MockConnector) -> MarketBuilder {
    init_tracing();
    UsdFuturesMarket::builder()
        .with_rest_url(server.base_url())
        .with_stream_url(STREAM_HOST)
        .with_connector(Arc::new(connector.clone()))
        .with_credentials(Credentials::new(API_KEY, SECRET_KEY).unwrap())
        .with_clock(Arc::new(|| TIMESTAMP_MS))
        .with_rest_timeout(Duration::from_secs(2))
}

/// Poll `condition` until it holds or two seconds pass
pub async fn wait_for(mut condition: impl FnMut() -> bool) -> bool {
    let deadline = tokio::time::Instant::now() + Duration::from_secs(2);
    while tokio::time::Instant::now() < deadline {
        if condition() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    condition()
}
