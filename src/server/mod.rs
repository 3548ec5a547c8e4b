//! Snapshot publishing: the query service and its HTTP binding.

pub mod http;
pub mod service;

pub use http::{ApiError, ServerError, router, serve};
pub use service::{OrderBookResponse, PriceVolume, SnapshotError, SnapshotService, SymbolsResponse};
