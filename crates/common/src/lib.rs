//! # Arb Monitor Common Crate
//!
//! This crate provides common data types and error definitions used across
//! the `arb-monitor` workspace.

/// Module for common error types.
pub mod errors;

/// Module for common data structures and types.
pub mod types;

// Re-export key items for easier access.
pub use errors::CommonError;
pub use types::{
    Asset, AssetPair, CachedQuote, ConnectionState, ExchangeId, Opportunity, Price, Quote,
    QuoteKey, RouteKey, StatusEvent,
};
