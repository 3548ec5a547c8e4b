//! Order book snapshot for market data

use super::book::{OrderEntry, PriceLevelBook};
use crate::utils::current_time_secs;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tracing::trace;

/// A point-in-time view of one instrument's book
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BookSnapshot {
    /// The instrument this snapshot belongs to
    pub symbol: String,

    /// Capture time (seconds since epoch)
    pub timestamp: u64,

    /// Bid entries, highest price first
    pub bids: Vec<OrderEntry>,

    /// Ask entries, lowest price first
    pub asks: Vec<OrderEntry>,

    /// Best bid at capture time
    pub best_bid: Option<Decimal>,

    /// Best ask at capture time
    pub best_ask: Option<Decimal>,
}

impl BookSnapshot {
    /// Capture the current contents of `book`
    pub fn capture(symbol: &str, book: &PriceLevelBook) -> Self {
        Self {
            symbol: symbol.to_string(),
            timestamp: current_time_secs(),
            bids: book.snapshot_bids(),
            asks: book.snapshot_asks(),
            best_bid: book.best_bid(),
            best_ask: book.best_ask(),
        }
    }

    /// True when no data has been observed on either side
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.bids.is_empty() && self.asks.is_empty()
    }

    /// Get the spread (best ask - best bid)
    pub fn spread(&self) -> Option<Decimal> {
        let spread = match (self.best_bid, self.best_ask) {
            (Some(bid), Some(ask)) => Some(ask - bid),
            _ => None,
        };
        trace!("spread: {:?}", spread);
        spread
    }

    /// Calculate the total volume on the bid side
    pub fn total_bid_volume(&self) -> Decimal {
        self.bids.iter().map(|entry| entry.volume).sum()
    }

    /// Calculate the total volume on the ask side
    pub fn total_ask_volume(&self) -> Decimal {
        self.asks.iter().map(|entry| entry.volume).sum()
    }
}
