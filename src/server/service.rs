//! Transport-independent snapshot queries.
//!
//! The service turns store contents into the response shapes published to
//! callers. Prices and volumes leave the process as plain numbers, and an
//! empty side reports [`NO_MARKET`] as its best price.

use std::sync::Arc;

use rust_decimal::Decimal;
use rust_decimal::prelude::ToPrimitive;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

use crate::orderbook::{BookSnapshot, NO_MARKET, OrderBookStore, OrderEntry};

/// One ladder entry as published to callers
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PriceVolume {
    /// Limit price
    pub price: f64,
    /// Resting volume at `price`
    pub volume: f64,
}

impl From<&OrderEntry> for PriceVolume {
    fn from(entry: &OrderEntry) -> Self {
        Self {
            price: to_number(entry.price),
            volume: to_number(entry.volume),
        }
    }
}

/// Response of `GetOrderBook`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderBookResponse {
    /// Instrument the snapshot was taken from
    pub symbol: String,
    /// Highest price first
    pub bids: Vec<PriceVolume>,
    /// Lowest price first
    pub asks: Vec<PriceVolume>,
    /// `-1` when there are no bids
    pub best_bid: f64,
    /// `-1` when there are no asks
    pub best_ask: f64,
    /// Capture time, seconds since the UNIX epoch
    pub timestamp: u64,
}

impl From<BookSnapshot> for OrderBookResponse {
    fn from(snapshot: BookSnapshot) -> Self {
        Self {
            bids: snapshot.bids.iter().map(PriceVolume::from).collect(),
            asks: snapshot.asks.iter().map(PriceVolume::from).collect(),
            best_bid: to_number(snapshot.best_bid.unwrap_or(NO_MARKET)),
            best_ask: to_number(snapshot.best_ask.unwrap_or(NO_MARKET)),
            timestamp: snapshot.timestamp,
            symbol: snapshot.symbol,
        }
    }
}

/// Response of `GetAvailableSymbols`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SymbolsResponse {
    /// Registered instruments, sorted ascending
    pub symbols: Vec<String>,
}

/// Both variants are reported to callers as "not found".
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SnapshotError {
    /// The symbol was never registered
    #[error("Order book not found for symbol: {0}")]
    UnknownSymbol(String),

    /// Registered, but both ladders are empty
    #[error("Order book not found for symbol: {0} (no data received yet)")]
    NoData(String),
}

impl SnapshotError {
    /// Symbol the query asked for
    #[must_use]
    pub fn symbol(&self) -> &str {
        match self {
            SnapshotError::UnknownSymbol(symbol) | SnapshotError::NoData(symbol) => symbol,
        }
    }
}

/// Read-only query surface over the shared store
#[derive(Debug, Clone)]
pub struct SnapshotService {
    store: Arc<OrderBookStore>,
}

impl SnapshotService {
    /// Serve snapshots of `store`
    pub fn new(store: Arc<OrderBookStore>) -> Self {
        Self { store }
    }

    /// Current book of `symbol`.
    ///
    /// # Errors
    /// [`SnapshotError::UnknownSymbol`] if it was never registered and
    /// [`SnapshotError::NoData`] while both sides are still empty.
    pub fn get_order_book(&self, symbol: &str) -> Result<OrderBookResponse, SnapshotError> {
        let snapshot = self
            .store
            .snapshot(symbol)
            .ok_or_else(|| SnapshotError::UnknownSymbol(symbol.to_string()))?;
        if snapshot.is_empty() {
            debug!("No data yet for {}", symbol);
            return Err(SnapshotError::NoData(symbol.to_string()));
        }
        Ok(snapshot.into())
    }

    /// Registered symbols in ascending order
    pub fn get_available_symbols(&self) -> SymbolsResponse {
        let mut symbols = self.store.list_instruments();
        symbols.sort_unstable();
        SymbolsResponse { symbols }
    }
}

fn to_number(value: Decimal) -> f64 {
    value.to_f64().unwrap_or(f64::NAN)
}
