//! Single-step crossing of a price-level book.
//!
//! Each call performs at most one match between the front entries of the best
//! bid and best ask levels. Draining a crossed book means calling
//! [`PriceLevelBook::cross`] until it returns `None`, which lets callers
//! observe every individual fill.

use super::book::PriceLevelBook;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tracing::trace;

/// Outcome of one successful crossing step
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Fill {
    /// Price of the bid level that was matched
    pub bid_price: Decimal,
    /// Price of the ask level that was matched
    pub ask_price: Decimal,
    /// Volume removed from both front entries
    pub volume: Decimal,
}

impl PriceLevelBook {
    /// True when both sides are populated and best bid >= best ask
    #[must_use]
    pub fn is_crossed(&self) -> bool {
        matches!(
            (self.best_bid(), self.best_ask()),
            (Some(bid), Some(ask)) if bid >= ask
        )
    }

    /// Perform at most one match.
    ///
    /// Returns `None` when the book is not crossed (either side empty, or
    /// best bid below best ask). Otherwise the earliest entry of the best bid
    /// level is matched against the earliest entry of the best ask level for
    /// `min(bid volume, ask volume)`; exhausted entries are popped and empty
    /// levels removed.
    pub fn cross(&mut self) -> Option<Fill> {
        let (bid_price, ask_price) = match (self.best_bid(), self.best_ask()) {
            (Some(bid), Some(ask)) if bid >= ask => (bid, ask),
            _ => return None,
        };

        let (bid_queue, ask_queue) = match (
            self.bids.get_mut(&bid_price),
            self.asks.get_mut(&ask_price),
        ) {
            (Some(bids), Some(asks)) => (bids, asks),
            _ => return None,
        };

        let (bid_front, ask_front) = match (bid_queue.front_mut(), ask_queue.front_mut()) {
            (Some(bid), Some(ask)) => (bid, ask),
            _ => return None,
        };

        let volume = bid_front.volume.min(ask_front.volume);
        bid_front.volume -= volume;
        ask_front.volume -= volume;

        if bid_front.volume.is_zero() {
            bid_queue.pop_front();
        }
        if ask_front.volume.is_zero() {
            ask_queue.pop_front();
        }

        let bid_level_empty = bid_queue.is_empty();
        let ask_level_empty = ask_queue.is_empty();
        if bid_level_empty {
            self.bids.remove(&bid_price);
        }
        if ask_level_empty {
            self.asks.remove(&ask_price);
        }

        trace!(
            "Crossed bid {} with ask {} for {}",
            bid_price, ask_price, volume
        );

        Some(Fill {
            bid_price,
            ask_price,
            volume,
        })
    }
}
