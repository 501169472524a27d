//! Streaming sessions for Binance USD-M Futures
//!
//! This crate owns the streaming half of the SDK:
//!
//! - [`SessionRegistry`] - one task per subscription, cancellable at any
//!   suspension point, with handles that are never reused
//! - [`decode`] - turns raw frames into [`StreamRecord`]s (flat, keyed, or
//!   routed user-data events)
//! - [`StreamEndpoint`] - stream names, URLs, and frame shapes
//! - [`Transport`] / [`Connector`] - the WebSocket seam, with mock
//!   implementations behind the `test-utils` feature
//!
//! # Example
//!
//! ```no_run
//! use binance_ws::{RegistryConfig, SessionRegistry, StreamEndpoint, StreamRecord, WsConnector};
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() {
//!     let registry = SessionRegistry::new(Arc::new(WsConnector::new()), RegistryConfig::default());
//!     let stream = StreamEndpoint::symbol_book("BTCUSDT");
//!
//!     let handle = registry.subscribe(
//!         stream.kind(),
//!         &stream.url("wss://fstream.binance.com"),
//!         stream.decode_spec(),
//!         Arc::new(|record: StreamRecord| println!("{:?}", record)),
//!     );
//!
//!     tokio::time::sleep(std::time::Duration::from_secs(5)).await;
//!     registry.unsubscribe(handle).await;
//! }
//! ```

pub mod decoder;
pub mod endpoint;
pub mod events;
pub mod registry;
pub mod retry;
pub mod session;
pub mod transport;

// Re-export main types
pub use decoder::{decode, DecodeSpec, StreamRecord};
pub use endpoint::StreamEndpoint;
pub use events::UserDataEvent;
pub use registry::{RegistryConfig, SessionRegistry, SubscriptionHandle};
pub use retry::ConnectRetry;
pub use session::{RecordCallback, SessionOutcome, SubscriptionState};
pub use transport::{Connector, Transport, TransportError, WsConnector, WsTransport};

#[cfg(any(test, feature = "test-utils"))]
pub use transport::{MockConnector, MockFeed, MockTransport};
