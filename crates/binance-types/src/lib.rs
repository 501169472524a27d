//! Shared types for the Binance USD-M Futures SDK
//!
//! This crate provides the core type definitions used across the workspace.
//! It has minimal dependencies and can be used independently.
//!
//! # Key Types
//!
//! - [`FlatRecord`], [`KeyedRecord`] - Canonical decoded record shapes
//! - [`RestCall`], [`StreamKind`], [`MarketVariant`] - Call and stream enums
//! - [`BinanceError`] - Error taxonomy shared by every crate

pub mod enums;
pub mod error;
pub mod record;

// Re-export commonly used types
pub use enums::*;
pub use error::*;
pub use record::*;

// Re-export rust_decimal for users
pub use rust_decimal::Decimal;
