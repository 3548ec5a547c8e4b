//! Core price-level book: two price-ordered ladders of time-ordered entries

use super::error::OrderBookError;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, VecDeque};
use std::fmt;
use tracing::trace;

/// Price reported for a side that has no resting volume.
///
/// It is distinguishable from every valid price (prices are never negative)
/// and must be read as "no market", never as a tradable level.
pub const NO_MARKET: Decimal = Decimal::NEGATIVE_ONE;

/// Side of the book a ladder or entry belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Side {
    /// Bid ladder, best (highest) price first
    Buy,
    /// Ask ladder, best (lowest) price first
    Sell,
}

impl fmt::Display for Side {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Side::Buy => write!(f, "BUY"),
            Side::Sell => write!(f, "SELL"),
        }
    }
}

/// Minimal resting unit at a price level.
///
/// The price duplicates the level key so flattened views stay self-describing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderEntry {
    /// Price of the level holding this entry
    pub price: Decimal,
    /// Remaining volume, strictly positive while the entry rests
    pub volume: Decimal,
}

impl OrderEntry {
    /// Create a new entry
    pub fn new(price: Decimal, volume: Decimal) -> Self {
        Self { price, volume }
    }
}

impl From<(Decimal, Decimal)> for OrderEntry {
    fn from((price, volume): (Decimal, Decimal)) -> Self {
        Self::new(price, volume)
    }
}

/// Price -> arrival-ordered queue of entries. Iterated in ascending key order,
/// so the bid side is read from the back.
pub(super) type Ladder = BTreeMap<Decimal, VecDeque<OrderEntry>>;

/// Per-instrument price-level book.
///
/// Levels self-prune: a price key never maps to an empty queue. The book does
/// not reject a crossed state on insert; [`PriceLevelBook::cross`] resolves it
/// one match at a time.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PriceLevelBook {
    /// Bid side price levels
    pub(super) bids: Ladder,

    /// Ask side price levels
    pub(super) asks: Ladder,
}

impl PriceLevelBook {
    /// Create an empty book
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a book directly from two sequences of entries.
    ///
    /// Entries with a negative price or non-positive volume are skipped.
    pub fn from_entries<B, A>(bids: B, asks: A) -> Self
    where
        B: IntoIterator<Item = OrderEntry>,
        A: IntoIterator<Item = OrderEntry>,
    {
        Self {
            bids: build_ladder(Side::Buy, bids),
            asks: build_ladder(Side::Sell, asks),
        }
    }

    /// Append a bid entry at `price`, creating the level if absent.
    ///
    /// Every call queues a distinct entry; volumes at the same price are not merged.
    pub fn add_bid(&mut self, price: Decimal, volume: Decimal) -> Result<(), OrderBookError> {
        self.add(Side::Buy, price, volume)
    }

    /// Append an ask entry at `price`, creating the level if absent.
    pub fn add_ask(&mut self, price: Decimal, volume: Decimal) -> Result<(), OrderBookError> {
        self.add(Side::Sell, price, volume)
    }

    /// Append an entry to the given side.
    ///
    /// # Errors
    /// [`OrderBookError::InvalidPrice`] for negative prices and
    /// [`OrderBookError::InvalidVolume`] for non-positive volumes.
    pub fn add(&mut self, side: Side, price: Decimal, volume: Decimal) -> Result<(), OrderBookError> {
        validate(side, price, volume)?;
        trace!("Adding {} entry {} x {}", side, price, volume);
        self.ladder_mut(side)
            .entry(price)
            .or_default()
            .push_back(OrderEntry::new(price, volume));
        Ok(())
    }

    /// Get the best bid price, if any
    #[must_use]
    pub fn best_bid(&self) -> Option<Decimal> {
        self.bids.keys().next_back().copied()
    }

    /// Get the best ask price, if any
    #[must_use]
    pub fn best_ask(&self) -> Option<Decimal> {
        self.asks.keys().next().copied()
    }

    /// Best bid, or [`NO_MARKET`] when the bid side is empty
    #[must_use]
    pub fn best_bid_or_sentinel(&self) -> Decimal {
        self.best_bid().unwrap_or(NO_MARKET)
    }

    /// Best ask, or [`NO_MARKET`] when the ask side is empty
    #[must_use]
    pub fn best_ask_or_sentinel(&self) -> Decimal {
        self.best_ask().unwrap_or(NO_MARKET)
    }

    /// Discard both ladders and rebuild them from the given entries.
    ///
    /// This is a destructive full replace, not a merge: each input entry
    /// becomes exactly one queued entry at its price. Invalid entries are
    /// skipped rather than failing the whole replace.
    pub fn replace<B, A>(&mut self, bids: B, asks: A)
    where
        B: IntoIterator<Item = OrderEntry>,
        A: IntoIterator<Item = OrderEntry>,
    {
        let rebuilt = Self::from_entries(bids, asks);
        trace!(
            "Replacing book: {} bid levels, {} ask levels",
            rebuilt.bids.len(),
            rebuilt.asks.len()
        );
        *self = rebuilt;
    }

    /// Flattened bids, highest price first, arrival order within a level
    #[must_use]
    pub fn snapshot_bids(&self) -> Vec<OrderEntry> {
        self.bids.values().rev().flatten().copied().collect()
    }

    /// Flattened asks, lowest price first, arrival order within a level
    #[must_use]
    pub fn snapshot_asks(&self) -> Vec<OrderEntry> {
        self.asks.values().flatten().copied().collect()
    }

    /// Number of distinct price levels on a side
    #[must_use]
    pub fn level_count(&self, side: Side) -> usize {
        self.ladder(side).len()
    }

    /// Total resting volume at `price` on a side, if the level exists
    #[must_use]
    pub fn volume_at(&self, side: Side, price: Decimal) -> Option<Decimal> {
        self.ladder(side)
            .get(&price)
            .map(|queue| queue.iter().map(|entry| entry.volume).sum())
    }

    /// True when neither side holds any entry
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.bids.is_empty() && self.asks.is_empty()
    }

    pub(super) fn ladder(&self, side: Side) -> &Ladder {
        match side {
            Side::Buy => &self.bids,
            Side::Sell => &self.asks,
        }
    }

    fn ladder_mut(&mut self, side: Side) -> &mut Ladder {
        match side {
            Side::Buy => &mut self.bids,
            Side::Sell => &mut self.asks,
        }
    }
}

fn validate(side: Side, price: Decimal, volume: Decimal) -> Result<(), OrderBookError> {
    if price < Decimal::ZERO {
        return Err(OrderBookError::InvalidPrice { side, price });
    }
    if volume <= Decimal::ZERO {
        return Err(OrderBookError::InvalidVolume {
            side,
            price,
            volume,
        });
    }
    Ok(())
}

fn build_ladder<I>(side: Side, entries: I) -> Ladder
where
    I: IntoIterator<Item = OrderEntry>,
{
    let mut ladder = Ladder::new();
    for entry in entries {
        if let Err(err) = validate(side, entry.price, entry.volume) {
            trace!("Skipping entry during replace: {}", err);
            continue;
        }
        ladder.entry(entry.price).or_default().push_back(entry);
    }
    ladder
}
