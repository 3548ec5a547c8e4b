//! Starts one supervisor per instrument and owns their tasks.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use super::supervisor::{ConnectionState, ConnectionSupervisor, SupervisorConfig};
use crate::config::CredentialSource;
use crate::orderbook::OrderBookStore;

/// Most instruments a single coordinator will stream
pub const MAX_INSTRUMENTS: usize = 10;

/// Default pause between consecutive supervisor starts
pub const DEFAULT_STAGGER: Duration = Duration::from_millis(500);

/// Trim, lower-case and dedupe instrument identifiers, keeping first
/// occurrences in order and at most [`MAX_INSTRUMENTS`] of them.
pub fn normalize_instruments<I, S>(instruments: I) -> Vec<String>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let mut seen = HashSet::new();
    let mut unique: Vec<String> = instruments
        .into_iter()
        .map(|raw| raw.as_ref().trim().to_lowercase())
        .filter(|symbol| !symbol.is_empty())
        .filter(|symbol| seen.insert(symbol.clone()))
        .collect();

    if unique.len() > MAX_INSTRUMENTS {
        let dropped = unique.split_off(MAX_INSTRUMENTS);
        warn!(
            "Instrument limit is {}; ignoring {:?}",
            MAX_INSTRUMENTS, dropped
        );
    }
    unique
}

/// Starts and owns the supervisors of a set of instruments.
pub struct IngestionCoordinator {
    store: Arc<OrderBookStore>,
    credentials: Arc<dyn CredentialSource>,
    config: SupervisorConfig,
    stagger: Duration,
}

impl IngestionCoordinator {
    /// Create a coordinator whose supervisors share `store`, `credentials`
    /// and `config`.
    pub fn new(
        store: Arc<OrderBookStore>,
        credentials: Arc<dyn CredentialSource>,
        config: SupervisorConfig,
    ) -> Self {
        Self {
            store,
            credentials,
            config,
            stagger: DEFAULT_STAGGER,
        }
    }

    /// Pause between consecutive supervisor starts
    #[must_use]
    pub fn with_stagger(mut self, stagger: Duration) -> Self {
        self.stagger = stagger;
        self
    }

    /// Register every instrument and spawn its supervisor.
    ///
    /// Books are registered up front, in order, so they are listed before
    /// their connections come up. The n-th supervisor waits `n * stagger`
    /// before its first connection attempt.
    pub fn start<I, S>(&self, instruments: I, cancel: CancellationToken) -> IngestionHandle
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let instruments = normalize_instruments(instruments);
        let mut tasks = JoinSet::new();

        for (index, instrument) in instruments.iter().enumerate() {
            self.store.register(instrument);

            let delay = self.stagger.saturating_mul(index as u32);
            let supervisor = ConnectionSupervisor::new(
                instrument.clone(),
                Arc::clone(&self.store),
                Arc::clone(&self.credentials),
                self.config.clone(),
            )
            .with_start_delay(delay);

            tasks.spawn(supervisor.run(cancel.child_token()));
        }

        info!(
            "Started {} feed supervisor(s): {}",
            instruments.len(),
            instruments.join(", ")
        );
        IngestionHandle { instruments, tasks }
    }
}

/// Running supervisors of one [`IngestionCoordinator::start`] call
pub struct IngestionHandle {
    instruments: Vec<String>,
    tasks: JoinSet<ConnectionState>,
}

impl IngestionHandle {
    /// Instruments being streamed, in start order
    #[must_use]
    pub fn instruments(&self) -> &[String] {
        &self.instruments
    }

    /// Wait for every supervisor to stop and collect their final states.
    ///
    /// Supervisors only stop on cancellation; a panicked one is logged and
    /// left out of the result.
    pub async fn join(mut self) -> Vec<ConnectionState> {
        let mut states = Vec::with_capacity(self.instruments.len());
        while let Some(joined) = self.tasks.join_next().await {
            match joined {
                Ok(state) => states.push(state),
                Err(err) => error!("Feed supervisor task failed: {}", err),
            }
        }
        states
    }
}
