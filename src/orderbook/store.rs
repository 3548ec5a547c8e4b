//! Multi-book storage shared between feed writers and snapshot readers.
//!
//! Every public operation synchronises internally, so callers never hold a
//! lock themselves. A [`OrderBookStore::replace`] builds the new ladders
//! before taking the instrument's write lock and swaps them in, which keeps
//! the critical section to a single move and means readers only ever see a
//! fully applied book.

use crate::orderbook::OrderBookError;
use crate::orderbook::book::{OrderEntry, PriceLevelBook};
use crate::orderbook::matching::Fill;
use crate::orderbook::snapshot::BookSnapshot;
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use tracing::{info, trace};

/// Instrument identifier -> book, created lazily on registration.
#[derive(Debug, Default)]
pub struct OrderBookStore {
    /// Collection of order books indexed by instrument
    books: DashMap<String, PriceLevelBook>,
}

impl OrderBookStore {
    /// Create an empty store
    pub fn new() -> Self {
        Self {
            books: DashMap::new(),
        }
    }

    /// Ensure a book exists for `symbol`, creating it empty if absent.
    ///
    /// Returns `true` when the book was created by this call.
    pub fn register(&self, symbol: &str) -> bool {
        if self.books.contains_key(symbol) {
            return false;
        }
        match self.books.entry(symbol.to_string()) {
            Entry::Occupied(_) => false,
            Entry::Vacant(slot) => {
                slot.insert(PriceLevelBook::new());
                info!("Registered order book for instrument: {}", symbol);
                true
            }
        }
    }

    /// Check if a book exists for `symbol`
    pub fn contains(&self, symbol: &str) -> bool {
        self.books.contains_key(symbol)
    }

    /// Point-in-time copy of the book for `symbol`.
    ///
    /// Unknown instruments yield an empty book.
    pub fn get(&self, symbol: &str) -> PriceLevelBook {
        self.books
            .get(symbol)
            .map(|book| book.value().clone())
            .unwrap_or_default()
    }

    /// Snapshot of a registered instrument, `None` if it was never registered
    pub fn snapshot(&self, symbol: &str) -> Option<BookSnapshot> {
        self.books
            .get(symbol)
            .map(|book| BookSnapshot::capture(symbol, book.value()))
    }

    /// The registered instrument identifiers, in no particular order
    pub fn list_instruments(&self) -> Vec<String> {
        self.books.iter().map(|entry| entry.key().clone()).collect()
    }

    /// Atomically replace both ladders of a registered instrument.
    ///
    /// # Errors
    /// [`OrderBookError::UnknownInstrument`] if `symbol` was never registered.
    pub fn replace<B, A>(&self, symbol: &str, bids: B, asks: A) -> Result<(), OrderBookError>
    where
        B: IntoIterator<Item = OrderEntry>,
        A: IntoIterator<Item = OrderEntry>,
    {
        let rebuilt = PriceLevelBook::from_entries(bids, asks);
        let mut book = self
            .books
            .get_mut(symbol)
            .ok_or_else(|| OrderBookError::UnknownInstrument(symbol.to_string()))?;
        *book.value_mut() = rebuilt;
        trace!("Replaced order book for {}", symbol);
        Ok(())
    }

    /// Run `f` against the book for `symbol` while holding its write lock.
    ///
    /// `f` must not call back into the store.
    pub fn update<R>(
        &self,
        symbol: &str,
        f: impl FnOnce(&mut PriceLevelBook) -> R,
    ) -> Result<R, OrderBookError> {
        let mut book = self
            .books
            .get_mut(symbol)
            .ok_or_else(|| OrderBookError::UnknownInstrument(symbol.to_string()))?;
        Ok(f(book.value_mut()))
    }

    /// Perform one crossing step on the book for `symbol`
    pub fn cross(&self, symbol: &str) -> Result<Option<Fill>, OrderBookError> {
        self.update(symbol, PriceLevelBook::cross)
    }

    /// Get the number of registered books
    pub fn len(&self) -> usize {
        self.books.len()
    }

    /// True when no instrument has been registered
    pub fn is_empty(&self) -> bool {
        self.books.is_empty()
    }
}
