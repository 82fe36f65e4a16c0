//! Real-time price monitoring: streams trades for subscribed symbols and
//! raises an alert whenever a price moves beyond a percentage threshold
//! since the last alert.

pub mod alerts;
pub mod api;
pub mod config;
pub mod error;
pub mod monitor;
pub mod store;
pub mod symbol;

pub use error::{PriceWatchError, Result};
