//! Order book error types

use rust_decimal::Decimal;
use std::fmt;

use super::book::Side;

/// Errors that can occur within a price level book or the book store
#[derive(Debug, Clone, PartialEq)]
#[non_exhaustive]
pub enum OrderBookError {
    /// A resting entry must carry strictly positive volume
    InvalidVolume {
        /// Side the entry was destined for
        side: Side,
        /// Price of the rejected entry
        price: Decimal,
        /// The rejected volume
        volume: Decimal,
    },

    /// Prices are non-negative; negative values are reserved for the
    /// "no market" sentinel
    InvalidPrice {
        /// Side the entry was destined for
        side: Side,
        /// The rejected price
        price: Decimal,
    },

    /// The instrument was never registered with the store
    UnknownInstrument(String),
}

impl fmt::Display for OrderBookError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OrderBookError::InvalidVolume {
                side,
                price,
                volume,
            } => {
                write!(
                    f,
                    "Invalid volume: {side} entry at {price} must have positive volume, got {volume}"
                )
            }
            OrderBookError::InvalidPrice { side, price } => {
                write!(f, "Invalid price: {side} entry at {price} is negative")
            }
            OrderBookError::UnknownInstrument(symbol) => {
                write!(f, "Unknown instrument: {symbol}")
            }
        }
    }
}

impl std::error::Error for OrderBookError {}
