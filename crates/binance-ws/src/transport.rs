//! WebSocket transport abstraction
//!
//! Sessions talk to the exchange through the [`Transport`] trait, and obtain
//! transports from a [`Connector`]. Tests swap in [`MockConnector`], whose
//! transports are fed frames through channels.
//!
//! # Example
//!
//! ```no_run
//! use binance_ws::transport::{Transport, TransportError, WsTransport};
//!
//! async fn example() -> Result<(), TransportError> {
//!     let mut transport = WsTransport::new("wss://fstream.binance.com/ws/btcusdt@bookTicker");
//!     transport.connect().await?;
//!     if let Some(frame) = transport.recv().await? {
//!         println!("Received: {}", frame);
//!     }
//!     transport.close().await
//! }
//! ```

use async_trait::async_trait;
use binance_types::BinanceError;
use futures_util::{SinkExt, StreamExt};
use std::time::Duration;
use thiserror::Error;
use tokio::net::TcpStream;
use tokio::time::timeout;
use tokio_tungstenite::{connect_async, tungstenite::Message, MaybeTlsStream, WebSocketStream};
use tracing::{debug, instrument, trace};

/// Transport layer errors
#[derive(Error, Debug)]
pub enum TransportError {
    /// Connection failed
    #[error("connection failed: {0}")]
    ConnectionFailed(String),

    /// Connection closed without a close frame
    #[error("connection closed")]
    ConnectionClosed,

    /// Send failed
    #[error("send failed: {0}")]
    SendFailed(String),

    /// Receive failed
    #[error("receive failed: {0}")]
    ReceiveFailed(String),

    /// Connection timeout
    #[error("connection timeout after {0:?}")]
    Timeout(Duration),

    /// Not connected
    #[error("not connected")]
    NotConnected,

    /// Frame was not valid text
    #[error("protocol error: {0}")]
    Protocol(String),
}

impl TransportError {
    /// Convert into the SDK error for the endpoint `url`
    pub fn into_binance(self, url: &str) -> BinanceError {
        match self {
            Self::Timeout(timeout) => BinanceError::ConnectionTimeout {
                url: url.to_string(),
                timeout,
            },
            Self::Protocol(message) => BinanceError::protocol(message, None),
            other => BinanceError::connection_failed(url, other),
        }
    }
}

/// Trait for WebSocket transport abstraction
#[async_trait]
pub trait Transport: Send + Sync {
    /// Connect to the WebSocket endpoint
    async fn connect(&mut self) -> Result<(), TransportError>;

    /// Send a text message
    async fn send(&mut self, message: &str) -> Result<(), TransportError>;

    /// Receive the next text frame
    ///
    /// Returns `None` if the server closed the connection gracefully.
    /// Must be cancel safe: dropping the future loses no frame.
    async fn recv(&mut self) -> Result<Option<String>, TransportError>;

    /// Close the connection gracefully
    async fn close(&mut self) -> Result<(), TransportError>;

    /// Check if currently connected
    fn is_connected(&self) -> bool;

    /// Get the endpoint URL
    fn endpoint(&self) -> &str;
}

/// Factory for transports
///
/// The registry asks for a transport per session, before the session's
/// task starts. The transport is connected later, by that task.
pub trait Connector: Send + Sync {
    /// Create an unconnected transport for `url`
    fn transport(&self, url: &str) -> Box<dyn Transport>;
}

/// Real WebSocket transport using tokio-tungstenite
pub struct WsTransport {
    url: String,
    stream: Option<WebSocketStream<MaybeTlsStream<TcpStream>>>,
    connect_timeout: Duration,
}

impl WsTransport {
    /// Create a new WebSocket transport
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            stream: None,
            connect_timeout: Duration::from_secs(10),
        }
    }

    /// Set connection timeout
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }
}

#[async_trait]
impl Transport for WsTransport {
    #[instrument(skip(self), fields(url = %self.url))]
    async fn connect(&mut self) -> Result<(), TransportError> {
        debug!("Connecting to WebSocket");

        let (ws_stream, _response) = timeout(self.connect_timeout, connect_async(&self.url))
            .await
            .map_err(|_| TransportError::Timeout(self.connect_timeout))?
            .map_err(|e| TransportError::ConnectionFailed(e.to_string()))?;

        self.stream = Some(ws_stream);
        debug!("WebSocket connected");
        Ok(())
    }

    #[instrument(skip(self, message), fields(len = message.len()))]
    async fn send(&mut self, message: &str) -> Result<(), TransportError> {
        let stream = self.stream.as_mut().ok_or(TransportError::NotConnected)?;

        stream
            .send(Message::Text(message.to_string()))
            .await
            .map_err(|e| TransportError::SendFailed(e.to_string()))
    }

    async fn recv(&mut self) -> Result<Option<String>, TransportError> {
        loop {
            let stream = self.stream.as_mut().ok_or(TransportError::NotConnected)?;

            match stream.next().await {
                Some(Ok(Message::Text(text))) => return Ok(Some(text)),
                Some(Ok(Message::Binary(data))) => {
                    return String::from_utf8(data)
                        .map(Some)
                        .map_err(|e| TransportError::Protocol(e.to_string()));
                }
                Some(Ok(Message::Close(frame))) => {
                    debug!(?frame, "Server sent close frame");
                    self.stream = None;
                    return Ok(None);
                }
                // Pongs are queued by tungstenite itself
                Some(Ok(Message::Ping(_))) | Some(Ok(Message::Pong(_))) => {
                    trace!("Control frame");
                }
                Some(Ok(Message::Frame(_))) => {}
                Some(Err(e)) => return Err(TransportError::ReceiveFailed(e.to_string())),
                None => {
                    self.stream = None;
                    return Err(TransportError::ConnectionClosed);
                }
            }
        }
    }

    #[instrument(skip(self), fields(url = %self.url))]
    async fn close(&mut self) -> Result<(), TransportError> {
        if let Some(mut stream) = self.stream.take() {
            stream
                .close(None)
                .await
                .map_err(|e| TransportError::SendFailed(e.to_string()))?;
        }
        Ok(())
    }

    fn is_connected(&self) -> bool {
        self.stream.is_some()
    }

    fn endpoint(&self) -> &str {
        &self.url
    }
}

/// Connector producing [`WsTransport`]s
#[derive(Debug, Clone)]
pub struct WsConnector {
    connect_timeout: Duration,
}

impl WsConnector {
    /// Create a connector with the default connect timeout
    pub fn new() -> Self {
        Self::default()
    }

    /// Set connect timeout for every transport
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }
}

impl Default for WsConnector {
    fn default() -> Self {
        Self {
            connect_timeout: Duration::from_secs(10),
        }
    }
}

impl Connector for WsConnector {
    fn transport(&self, url: &str) -> Box<dyn Transport> {
        Box::new(WsTransport::new(url).with_timeout(self.connect_timeout))
    }
}

#[cfg(any(test, feature = "test-utils"))]
pub use mock::{MockConnector, MockFeed, MockTransport};

#[cfg(any(test, feature = "test-utils"))]
mod mock {
    use super::*;
    use parking_lot::Mutex;
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use std::sync::Arc;
    use tokio::sync::mpsc;

    type Frame = Result<Option<String>, TransportError>;

    /// Mock transport for testing
    ///
    /// Frames are pushed through the paired [`MockFeed`]. With nothing
    /// queued, `recv` waits, like a quiet live stream.
    pub struct MockTransport {
        url: String,
        connected: bool,
        frames: mpsc::UnboundedReceiver<Frame>,
        closed: Arc<AtomicBool>,
        sent: Arc<Mutex<Vec<String>>>,
        connect_failures: Arc<AtomicUsize>,
        connect_delay: Duration,
    }

    /// Test-side handle of a [`MockTransport`]
    #[derive(Clone)]
    pub struct MockFeed {
        frames: mpsc::UnboundedSender<Frame>,
        closed: Arc<AtomicBool>,
        sent: Arc<Mutex<Vec<String>>>,
    }

    impl MockTransport {
        /// Create a mock transport and its feed
        pub fn new(url: impl Into<String>) -> (Self, MockFeed) {
            let (tx, rx) = mpsc::unbounded_channel();
            let closed = Arc::new(AtomicBool::new(false));
            let sent = Arc::new(Mutex::new(Vec::new()));

            let transport = Self {
                url: url.into(),
                connected: false,
                frames: rx,
                closed: closed.clone(),
                sent: sent.clone(),
                connect_failures: Arc::new(AtomicUsize::new(0)),
                connect_delay: Duration::ZERO,
            };
            let feed = MockFeed {
                frames: tx,
                closed,
                sent,
            };
            (transport, feed)
        }
    }

    impl MockFeed {
        /// Queue a text frame
        pub fn push_frame(&self, frame: impl Into<String>) {
            let _ = self.frames.send(Ok(Some(frame.into())));
        }

        /// Queue several text frames
        pub fn push_frames(&self, frames: impl IntoIterator<Item = impl Into<String>>) {
            for frame in frames {
                self.push_frame(frame);
            }
        }

        /// Simulate a server close
        pub fn push_close(&self) {
            let _ = self.frames.send(Ok(None));
        }

        /// Simulate a receive error
        pub fn push_error(&self, error: TransportError) {
            let _ = self.frames.send(Err(error));
        }

        /// Check if the session closed the transport
        pub fn is_closed(&self) -> bool {
            self.closed.load(Ordering::SeqCst)
        }

        /// Messages the session sent
        pub fn sent(&self) -> Vec<String> {
            self.sent.lock().clone()
        }
    }

    #[async_trait]
    impl Transport for MockTransport {
        async fn connect(&mut self) -> Result<(), TransportError> {
            if !self.connect_delay.is_zero() {
                tokio::time::sleep(self.connect_delay).await;
            }
            let failing = self
                .connect_failures
                .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
                .is_ok();
            if failing {
                return Err(TransportError::ConnectionFailed("mock connection failure".into()));
            }
            self.connected = true;
            Ok(())
        }

        async fn send(&mut self, message: &str) -> Result<(), TransportError> {
            if !self.connected {
                return Err(TransportError::NotConnected);
            }
            self.sent.lock().push(message.to_string());
            Ok(())
        }

        async fn recv(&mut self) -> Result<Option<String>, TransportError> {
            if !self.connected {
                return Err(TransportError::NotConnected);
            }
            self.frames
                .recv()
                .await
                .unwrap_or(Err(TransportError::ConnectionClosed))
        }

        async fn close(&mut self) -> Result<(), TransportError> {
            self.connected = false;
            self.closed.store(true, Ordering::SeqCst);
            Ok(())
        }

        fn is_connected(&self) -> bool {
            self.connected
        }

        fn endpoint(&self) -> &str {
            &self.url
        }
    }

    /// Connector handing out [`MockTransport`]s
    ///
    /// Feeds are kept per URL, in creation order, so tests can drive every
    /// session the code under test opened.
    #[derive(Clone, Default)]
    pub struct MockConnector {
        feeds: Arc<Mutex<HashMap<String, Vec<MockFeed>>>>,
        connect_failures: Arc<AtomicUsize>,
        connect_delay: Duration,
    }

    impl MockConnector {
        /// Create a connector whose transports always connect
        pub fn new() -> Self {
            Self::default()
        }

        /// Fail the next `count` connect attempts across all transports
        pub fn with_connect_failures(self, count: usize) -> Self {
            self.connect_failures.store(count, Ordering::SeqCst);
            self
        }

        /// Delay every connect attempt
        pub fn with_connect_delay(mut self, delay: Duration) -> Self {
            self.connect_delay = delay;
            self
        }

        /// Feed of the most recent transport created for `url`
        pub fn feed(&self, url: &str) -> Option<MockFeed> {
            self.feeds.lock().get(url).and_then(|feeds| feeds.last().cloned())
        }

        /// Every feed created for `url`
        pub fn feeds(&self, url: &str) -> Vec<MockFeed> {
            self.feeds.lock().get(url).cloned().unwrap_or_default()
        }

        /// Total number of transports created
        pub fn transports_created(&self) -> usize {
            self.feeds.lock().values().map(Vec::len).sum()
        }
    }

    impl Connector for MockConnector {
        fn transport(&self, url: &str) -> Box<dyn Transport> {
            let (mut transport, feed) = MockTransport::new(url);
            transport.connect_failures = self.connect_failures.clone();
            transport.connect_delay = self.connect_delay;

            self.feeds.lock().entry(url.to_string()).or_default().push(feed);
            Box::new(transport)
        }
    }
}
