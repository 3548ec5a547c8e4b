//! Upstream feed ingestion: wire messages, reconnect policy, the
//! per-instrument connection supervisor and the coordinator that runs them.

pub mod backoff;
pub mod coordinator;
pub mod error;
pub mod message;
pub mod supervisor;

pub use backoff::{Backoff, BackoffPolicy};
pub use coordinator::{IngestionCoordinator, IngestionHandle, MAX_INSTRUMENTS, normalize_instruments};
pub use error::{Disconnect, FeedError};
pub use message::{BookUpdate, InboundMessage, OutboundMessage};
pub use supervisor::{ConnectionPhase, ConnectionState, ConnectionSupervisor, SupervisorConfig};
