//! Upstream wire messages.
//!
//! Outbound frames are the two requests the feed needs before it streams
//! (`authenticate`, then `subscribe`). Inbound frames are classified into
//! auth acknowledgments, book updates and everything else. A book update is
//! normalised here (sorted, truncated to [`MAX_DEPTH`] levels per side) so the
//! supervisor can hand it straight to the store.

use std::cmp::Reverse;
use std::str::FromStr;

use rust_decimal::Decimal;
use serde::Serialize;
use serde_json::Value;
use tracing::trace;

use crate::orderbook::OrderEntry;

/// Production sFOX websocket endpoint
pub const DEFAULT_FEED_URL: &str = "wss://ws.sfox.com/ws";

/// Levels kept per side from each book update
pub const MAX_DEPTH: usize = 10;

/// Feed channel carrying the order book of `instrument`
pub fn channel_for(instrument: &str) -> String {
    format!("orderbook.sfox.{instrument}")
}

/// Requests sent to the feed
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum OutboundMessage<'a> {
    Authenticate {
        #[serde(rename = "apiKey")]
        api_key: &'a str,
    },
    Subscribe {
        feeds: Vec<String>,
    },
}

impl OutboundMessage<'_> {
    /// Subscription request for a single instrument's book channel
    pub fn subscribe(instrument: &str) -> Self {
        OutboundMessage::Subscribe {
            feeds: vec![channel_for(instrument)],
        }
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    /// Short name used in logs and errors
    pub fn kind(&self) -> &'static str {
        match self {
            OutboundMessage::Authenticate { .. } => "authenticate",
            OutboundMessage::Subscribe { .. } => "subscribe",
        }
    }
}

/// Classified inbound text frame
#[derive(Debug, Clone, PartialEq)]
pub enum InboundMessage {
    AuthAccepted,
    AuthRejected { reason: String },
    BookUpdate(BookUpdate),
    /// Heartbeats, subscription acks and anything else we don't act on
    Other { kind: String },
}

impl InboundMessage {
    /// Classify a text frame.
    ///
    /// # Errors
    /// Returns the JSON error when `text` is not valid JSON. Valid JSON of an
    /// unexpected shape is never an error; it becomes [`InboundMessage::Other`].
    pub fn parse(text: &str) -> Result<Self, serde_json::Error> {
        let value: Value = serde_json::from_str(text)?;
        Ok(Self::classify(&value))
    }

    fn classify(value: &Value) -> Self {
        let kind = value
            .get("type")
            .and_then(Value::as_str)
            .unwrap_or("unknown");
        let payload = value.get("payload");

        if is_auth_ack(value) {
            let failed = kind == "error"
                || value.get("success").and_then(Value::as_bool) == Some(false)
                || payload
                    .and_then(|p| p.get("success"))
                    .and_then(Value::as_bool)
                    == Some(false);
            if failed {
                return InboundMessage::AuthRejected {
                    reason: auth_failure_reason(value),
                };
            }
            return InboundMessage::AuthAccepted;
        }

        if let Some(update) = payload.and_then(BookUpdate::from_payload) {
            return InboundMessage::BookUpdate(update);
        }

        InboundMessage::Other {
            kind: kind.to_string(),
        }
    }
}

fn is_auth_ack(value: &Value) -> bool {
    let action = |v: &Value| v.get("action").and_then(Value::as_str) == Some("authenticate");
    action(value) || value.get("payload").is_some_and(action)
}

fn auth_failure_reason(value: &Value) -> String {
    ["error", "message"]
        .iter()
        .find_map(|key| {
            value
                .get(*key)
                .or_else(|| value.get("payload").and_then(|p| p.get(*key)))
                .and_then(Value::as_str)
        })
        .unwrap_or("authentication rejected")
        .to_string()
}

/// Top-of-book levels carried by one update, already normalised
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BookUpdate {
    /// Highest price first, at most [`MAX_DEPTH`] entries
    pub bids: Vec<OrderEntry>,
    /// Lowest price first, at most [`MAX_DEPTH`] entries
    pub asks: Vec<OrderEntry>,
}

impl BookUpdate {
    /// Build an update from a `payload` object, `None` if it carries neither
    /// a `bids` nor an `asks` array.
    pub fn from_payload(payload: &Value) -> Option<Self> {
        let object = payload.as_object()?;
        let bids = object.get("bids").and_then(Value::as_array);
        let asks = object.get("asks").and_then(Value::as_array);
        if bids.is_none() && asks.is_none() {
            return None;
        }

        let mut update = Self {
            bids: bids.map(|levels| parse_levels(levels)).unwrap_or_default(),
            asks: asks.map(|levels| parse_levels(levels)).unwrap_or_default(),
        };
        update.normalize();
        Some(update)
    }

    /// Sort both sides best-first and keep the top [`MAX_DEPTH`] entries.
    ///
    /// The sorts are stable, so entries sharing a price keep feed order.
    pub fn normalize(&mut self) {
        self.bids.sort_by_key(|entry| Reverse(entry.price));
        self.asks.sort_by_key(|entry| entry.price);
        self.bids.truncate(MAX_DEPTH);
        self.asks.truncate(MAX_DEPTH);
    }
}

/// Parse `[price, volume, ...]` levels, skipping malformed ones.
fn parse_levels(levels: &[Value]) -> Vec<OrderEntry> {
    levels
        .iter()
        .filter_map(|level| {
            let entry = parse_level(level);
            if entry.is_none() {
                trace!("Skipping malformed level: {}", level);
            }
            entry
        })
        .collect()
}

fn parse_level(level: &Value) -> Option<OrderEntry> {
    let fields = level.as_array()?;
    if fields.len() < 2 {
        return None;
    }
    let price = decimal_from_value(&fields[0])?;
    let volume = decimal_from_value(&fields[1])?;
    if price < Decimal::ZERO || volume <= Decimal::ZERO {
        return None;
    }
    Some(OrderEntry::new(price, volume))
}

/// Feeds send numbers either as JSON numbers or numeric strings
fn decimal_from_value(value: &Value) -> Option<Decimal> {
    let raw = match value {
        Value::Number(number) => number.to_string(),
        Value::String(text) => text.trim().to_string(),
        _ => return None,
    };
    Decimal::from_str(&raw)
        .or_else(|_| Decimal::from_scientific(&raw))
        .ok()
}
