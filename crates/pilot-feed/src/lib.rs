//! Mark price cache.
//!
//! Holds the latest mark price per instrument, fed by the exchange
//! adapter's subscription channel. The feed task is the single writer;
//! readers (monitor loop, reporting) observe the latest value.

pub mod price_cache;

pub use price_cache::{run_price_feed, PriceCache, PriceTick};
