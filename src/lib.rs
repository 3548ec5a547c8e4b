//! # sFOX Multi-Instrument Order Book Feed
//!
//! A service that streams price-level market data for several instruments
//! over independent websocket connections, keeps an always-current order book
//! per instrument, and serves point-in-time snapshots of those books over
//! HTTP/JSON.
//!
//! ## Key Features
//!
//! - **Resilient Connections**: Each instrument gets its own connection supervisor, a state machine that authenticates, subscribes, detects silent connections with a staleness watchdog, refreshes long-lived connections on a schedule, and reconnects with a cycling exponential backoff (`2, 4, 8, 16, 30, 30, 2, ...` seconds).
//!
//! - **Consistent Snapshots**: Every book update from the feed replaces the whole top of book atomically. Readers never see a book that mixes two updates.
//!
//! - **Exact Prices**: Prices and volumes are kept as `rust_decimal::Decimal`, so ladder keys compare exactly.
//!
//! - **Isolation**: A failing, stalled or panicking connection only affects its own instrument.
//!
//! - **Graceful Shutdown**: A single `CancellationToken` stops every supervisor and drains the HTTP server.
//!
//! ## Architecture
//!
//! ```text
//!   sFOX websocket ──► ConnectionSupervisor (one per instrument)
//!                          │  receive loop / watchdog / refresh timer
//!                          ▼
//!                     OrderBookStore ──► SnapshotService ──► HTTP /v1
//!                          ▲
//!   IngestionCoordinator ──┘ registers instruments, staggers starts
//! ```
//!
//! - [`orderbook::PriceLevelBook`]: two price-ordered ladders of arrival-ordered entries, with best-price queries, full replace and single-step crossing.
//! - [`orderbook::OrderBookStore`]: concurrent instrument -> book map. All synchronisation lives inside it.
//! - [`feed::ConnectionSupervisor`]: the per-instrument lifecycle `Idle → Connecting → Authenticating → Subscribing → Streaming → Closing → Backoff → Connecting`, with `Stopped` reached only on cancellation.
//! - [`feed::IngestionCoordinator`]: deduplicates and caps the instrument list at 10, registers each book and starts its supervisor.
//! - [`server::SnapshotService`]: `GetOrderBook` and `GetAvailableSymbols`, bound to HTTP by [`server::router`].
//!
//! ## HTTP API
//!
//! | Method | Path | Response |
//! |--------|------|----------|
//! | `GET` | `/v1/orderbook/{symbol}` | `{symbol, bids, asks, best_bid, best_ask, timestamp}` or `404 {error: "NOT_FOUND", message}` |
//! | `GET` | `/v1/symbols` | `{symbols: [...]}`, sorted |
//!
//! A symbol that was never registered and a registered symbol whose book has
//! not received any data yet are both reported as not found. An empty side
//! reports a best price of `-1`.
//!
//! ## Configuration
//!
//! | Flag | Environment | Default |
//! |------|-------------|---------|
//! | `--instruments` | `SFOX_INSTRUMENTS` | `ethbtc,btcusd` |
//! | `--listen` | `SFOX_LISTEN` | `0.0.0.0:50051` |
//! | `--feed-url` | `SFOX_FEED_URL` | `wss://ws.sfox.com/ws` |
//! | `--api-key` | `SFOX_API_KEY` | none |
//! | `--config-file` | `SFOX_CONFIG_FILE` | none (`API_KEY=...` lines) |
//! | `--stagger-ms` | `SFOX_STAGGER_MS` | `500` |
//!
//! Logging is controlled with `RUST_LOG` (default `info`).
//!
//! ## Basic Usage
//!
//! ```rust
//! use rust_decimal::Decimal;
//! use sfox_book_feed::prelude::*;
//!
//! let store = OrderBookStore::new();
//! store.register("ethbtc");
//!
//! let bids = vec![OrderEntry::new(Decimal::new(5, 2), Decimal::ONE)];
//! let asks = vec![OrderEntry::new(Decimal::new(6, 2), Decimal::new(2, 0))];
//! store.replace("ethbtc", bids, asks).unwrap();
//!
//! let book = store.get("ethbtc");
//! assert_eq!(book.best_bid(), Some(Decimal::new(5, 2)));
//! assert_eq!(book.best_ask_or_sentinel(), Decimal::new(6, 2));
//! ```
//!
//! ## Status
//! Only full top-of-book replacement is modelled. Incremental deltas,
//! sequence numbers and checksums are not.

pub mod config;
pub mod feed;
pub mod orderbook;
pub mod prelude;
pub mod server;
mod utils;

pub use config::{Config, ConfigError, CredentialSource, FileCredential, StaticCredential};
pub use feed::{
    ConnectionPhase, ConnectionSupervisor, FeedError, IngestionCoordinator, SupervisorConfig,
};
pub use orderbook::{
    BookSnapshot, Fill, NO_MARKET, OrderBookError, OrderBookStore, OrderEntry, PriceLevelBook,
    Side,
};
pub use server::{SnapshotError, SnapshotService};
pub use utils::current_time_secs;
