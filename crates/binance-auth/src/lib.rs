//! Credentials and request signing for Binance Futures
//!
//! Signed REST calls carry `recvWindow`, `timestamp`, and an HMAC-SHA256
//! `signature` over the canonical query string. This crate owns the pieces
//! needed to produce that string:
//!
//! - [`Credentials`] - API key and optional secret key
//! - [`ReceiveWindows`] - per-call receive window table
//! - [`RequestSigner`] - query canonicalization and signing
//!
//! # Example
//!
//! ```
//! use binance_auth::{Credentials, ReceiveWindows, RequestSigner};
//! use binance_types::RestCall;
//!
//! let creds = Credentials::new("api-key", "secret").unwrap();
//! let signer = RequestSigner::new(creds.into(), ReceiveWindows::default());
//!
//! let query = signer
//!     .build_query_at(&[("symbol", "BTCUSDT")], RestCall::AllOrders, true, 1_700_000_000_000)
//!     .unwrap();
//! assert!(query.starts_with("symbol=BTCUSDT&recvWindow=5000&timestamp=1700000000000&signature="));
//! ```

mod credentials;
mod signer;
mod window;

pub use credentials::Credentials;
pub use signer::{sign, system_clock, Clock, RequestSigner};
pub use window::{ReceiveWindows, DEFAULT_RECEIVE_WINDOW};
