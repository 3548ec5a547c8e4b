//! Prelude module that re-exports commonly used types and traits.
//!
//! Instead of importing each type individually, you can use:
//!
//! ```rust
//! use sfox_book_feed::prelude::*;
//! ```

// Core order book types
pub use crate::orderbook::{
    BookSnapshot, Fill, NO_MARKET, OrderBookError, OrderBookStore, OrderEntry, PriceLevelBook,
    Side,
};

// Feed ingestion
pub use crate::feed::{
    Backoff, BackoffPolicy, ConnectionPhase, ConnectionState, ConnectionSupervisor, Disconnect,
    FeedError, IngestionCoordinator, IngestionHandle, SupervisorConfig,
};

// Configuration
pub use crate::config::{Config, ConfigError, CredentialSource, FileCredential, StaticCredential};

// Snapshot publishing
pub use crate::server::{OrderBookResponse, SnapshotError, SnapshotService, SymbolsResponse};

// Utility functions
pub use crate::utils::current_time_secs;
