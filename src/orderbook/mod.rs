//! Price-level order books and the concurrent store that holds one per instrument.

pub mod book;
pub mod error;
/// Single-step crossing of the best bid against the best ask.
pub mod matching;
pub mod snapshot;
/// Thread-safe instrument -> book mapping.
pub mod store;

pub use book::{NO_MARKET, OrderEntry, PriceLevelBook, Side};
pub use error::OrderBookError;
pub use matching::Fill;
pub use snapshot::BookSnapshot;
pub use store::OrderBookStore;
