//! Exchange adapter contract for the pilot trading executor.
//!
//! The core never talks to a venue directly; it depends on the
//! `ExchangeAdapter` trait. Venue-specific REST/WebSocket adapters live
//! outside this repository and implement the trait. `PaperExchange` is an
//! in-process implementation used for dry-run mode and tests.

pub mod adapter;
pub mod error;
pub mod paper;
pub mod retry;

pub use adapter::{
    ExchangeAdapter, ExchangePosition, OrderRequest, OrderResult, OrderSide, OrderStatus,
    PriceUpdate,
};
pub use error::{AdapterError, AdapterResult};
pub use paper::PaperExchange;
pub use retry::retry_with_backoff;
