//! Per-instrument connection supervisor.
//!
//! A supervisor owns one websocket session at a time and walks it through
//! `Connecting -> Authenticating -> Subscribing -> Streaming -> Closing`,
//! then sleeps in `Backoff` and starts over. It only stops on cancellation.
//!
//! While streaming, three tasks run side by side in a [`JoinSet`]: the receive
//! loop, the staleness watchdog and the scheduled-refresh timer. Whichever
//! finishes first decides how the session ended, and the other two are torn
//! down before the connection is closed, so nothing outlives its session.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio::sync::watch;
use tokio::task::JoinSet;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace, warn};

use super::backoff::{Backoff, BackoffPolicy};
use super::error::{Disconnect, FeedError};
use super::message::{DEFAULT_FEED_URL, InboundMessage, OutboundMessage};
use crate::config::CredentialSource;
use crate::orderbook::OrderBookStore;

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;
type WsSink = SplitSink<WsStream, Message>;
type WsSource = SplitStream<WsStream>;

/// Timing policy of a supervisor
#[derive(Debug, Clone)]
pub struct SupervisorConfig {
    /// Websocket endpoint of the feed
    pub feed_url: String,
    /// Pause between the authenticate and subscribe requests
    pub settle_delay: Duration,
    /// Silence longer than this closes the connection
    pub stale_after: Duration,
    /// How often the watchdog checks for silence
    pub watchdog_period: Duration,
    /// Connections older than this are closed and reopened
    pub max_connection_age: Duration,
    /// Upper bound on establishing the websocket connection
    pub connect_timeout: Duration,
    /// Upper bound on each outbound request and on the closing handshake
    pub send_timeout: Duration,
    /// Delay sequence between connection attempts
    pub backoff: BackoffPolicy,
}

impl Default for SupervisorConfig {
    fn default() -> Self {
        Self {
            feed_url: DEFAULT_FEED_URL.to_string(),
            settle_delay: Duration::from_secs(1),
            stale_after: Duration::from_secs(5),
            watchdog_period: Duration::from_secs(1),
            max_connection_age: Duration::from_secs(30),
            connect_timeout: Duration::from_secs(10),
            send_timeout: Duration::from_secs(5),
            backoff: BackoffPolicy::default(),
        }
    }
}

/// Lifecycle phase of a supervised connection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ConnectionPhase {
    /// Created, waiting for its start delay
    Idle,
    /// Opening the websocket connection
    Connecting,
    /// Authentication sent, waiting out the settle delay
    Authenticating,
    /// Sending the subscription request
    Subscribing,
    /// Receiving book updates
    Streaming,
    /// Tearing down the session tasks and the connection
    Closing,
    /// Sleeping before the next connection attempt
    Backoff,
    /// Terminal, reached only on cancellation
    Stopped,
}

impl fmt::Display for ConnectionPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ConnectionPhase::Idle => "IDLE",
            ConnectionPhase::Connecting => "CONNECTING",
            ConnectionPhase::Authenticating => "AUTHENTICATING",
            ConnectionPhase::Subscribing => "SUBSCRIBING",
            ConnectionPhase::Streaming => "STREAMING",
            ConnectionPhase::Closing => "CLOSING",
            ConnectionPhase::Backoff => "BACKOFF",
            ConnectionPhase::Stopped => "STOPPED",
        };
        f.write_str(name)
    }
}

/// Private bookkeeping of one supervisor, returned when it stops
#[derive(Debug, Clone)]
pub struct ConnectionState {
    phase: ConnectionPhase,
    backoff: Backoff,
    last_data: Option<Instant>,
    connected_at: Option<Instant>,
    sessions: u64,
    book_updates: u64,
}

impl ConnectionState {
    fn new(policy: BackoffPolicy) -> Self {
        Self {
            phase: ConnectionPhase::Idle,
            backoff: Backoff::new(policy),
            last_data: None,
            connected_at: None,
            sessions: 0,
            book_updates: 0,
        }
    }

    /// Phase the supervisor was last in
    #[must_use]
    pub fn phase(&self) -> ConnectionPhase {
        self.phase
    }

    /// Position in the backoff sequence
    #[must_use]
    pub fn retry_count(&self) -> u32 {
        self.backoff.retry_count()
    }

    /// Arrival time of the most recent frame of the latest session
    #[must_use]
    pub fn last_data(&self) -> Option<Instant> {
        self.last_data
    }

    /// Open time of the live connection, `None` between sessions
    #[must_use]
    pub fn connected_at(&self) -> Option<Instant> {
        self.connected_at
    }

    /// Number of connection attempts made
    #[must_use]
    pub fn sessions(&self) -> u64 {
        self.sessions
    }

    /// Book updates applied to the store across all sessions
    #[must_use]
    pub fn book_updates(&self) -> u64 {
        self.book_updates
    }
}

/// What the receive loop has seen so far in the current session
#[derive(Debug, Clone, Copy, Default)]
struct Activity {
    last_frame: Option<Instant>,
    book_updates: u64,
}

/// Keeps one instrument's feed connected and its book current.
pub struct ConnectionSupervisor {
    instrument: String,
    store: Arc<OrderBookStore>,
    credentials: Arc<dyn CredentialSource>,
    config: SupervisorConfig,
    start_delay: Duration,
    state: ConnectionState,
    phase_tx: watch::Sender<ConnectionPhase>,
}

impl ConnectionSupervisor {
    /// Create a supervisor for `instrument`, writing into `store`.
    ///
    /// The credential is fetched again on every connection attempt.
    pub fn new(
        instrument: impl Into<String>,
        store: Arc<OrderBookStore>,
        credentials: Arc<dyn CredentialSource>,
        config: SupervisorConfig,
    ) -> Self {
        let state = ConnectionState::new(config.backoff);
        let (phase_tx, _) = watch::channel(ConnectionPhase::Idle);
        Self {
            instrument: instrument.into(),
            store,
            credentials,
            config,
            start_delay: Duration::ZERO,
            state,
            phase_tx,
        }
    }

    /// Wait this long in `Idle` before the first connection attempt
    #[must_use]
    pub fn with_start_delay(mut self, delay: Duration) -> Self {
        self.start_delay = delay;
        self
    }

    /// Instrument this supervisor streams
    #[must_use]
    pub fn instrument(&self) -> &str {
        &self.instrument
    }

    /// Observe phase transitions as they happen
    pub fn phases(&self) -> watch::Receiver<ConnectionPhase> {
        self.phase_tx.subscribe()
    }

    /// Run sessions until `cancel` fires, then return the final state.
    pub async fn run(mut self, cancel: CancellationToken) -> ConnectionState {
        info!("Starting feed supervisor for {}", self.instrument);

        if !self.start_delay.is_zero() && !pause(self.start_delay, &cancel).await {
            self.transition(ConnectionPhase::Stopped);
            return self.state;
        }

        loop {
            let outcome = self.run_session(&cancel).await;
            match outcome {
                Ok(Disconnect::Shutdown) => break,
                Ok(reason) => info!(instrument = %self.instrument, %reason, "connection closed"),
                Err(err) => warn!(instrument = %self.instrument, error = %err, "session failed"),
            }

            self.transition(ConnectionPhase::Backoff);
            let delay = self.state.backoff.next_delay();
            debug!(
                "{} reconnecting in {:?} (retry {})",
                self.instrument,
                delay,
                self.state.backoff.retry_count()
            );
            if !pause(delay, &cancel).await {
                break;
            }
        }

        self.transition(ConnectionPhase::Stopped);
        info!("Feed supervisor for {} stopped", self.instrument);
        self.state
    }

    fn transition(&mut self, next: ConnectionPhase) {
        debug!("{}: {} -> {}", self.instrument, self.state.phase, next);
        self.state.phase = next;
        self.phase_tx.send_replace(next);
    }

    async fn run_session(&mut self, cancel: &CancellationToken) -> Result<Disconnect, FeedError> {
        self.transition(ConnectionPhase::Connecting);
        self.state.sessions += 1;

        let url = self.config.feed_url.clone();
        let connecting = tokio::time::timeout(self.config.connect_timeout, connect_async(url.as_str()));
        let ws = tokio::select! {
            _ = cancel.cancelled() => return Ok(Disconnect::Shutdown),
            connected = connecting => match connected {
                Ok(result) => result?.0,
                Err(_) => {
                    return Err(FeedError::ConnectTimeout {
                        url: url.clone(),
                        timeout: self.config.connect_timeout,
                    });
                }
            },
        };

        let opened = Instant::now();
        self.state.connected_at = Some(opened);
        info!(instrument = %self.instrument, %url, "connected");

        let (mut write, read) = ws.split();
        let (activity_tx, activity_rx) = watch::channel(Activity::default());
        let outcome = self
            .handshake_and_stream(&mut write, read, activity_tx, opened, cancel)
            .await;
        self.record(*activity_rx.borrow());

        self.transition(ConnectionPhase::Closing);
        match tokio::time::timeout(self.config.send_timeout, write.close()).await {
            Ok(Ok(())) => {}
            Ok(Err(err)) => trace!("{} close failed: {}", self.instrument, err),
            Err(_) => trace!("{} close timed out", self.instrument),
        }
        self.state.connected_at = None;

        outcome
    }

    async fn handshake_and_stream(
        &mut self,
        write: &mut WsSink,
        mut read: WsSource,
        activity: watch::Sender<Activity>,
        opened: Instant,
        cancel: &CancellationToken,
    ) -> Result<Disconnect, FeedError> {
        self.transition(ConnectionPhase::Authenticating);
        let api_key = self.credentials.api_key()?;
        self.send(write, &OutboundMessage::Authenticate { api_key: &api_key })
            .await?;

        if !self.settle(&mut read, &activity, cancel).await? {
            return Ok(Disconnect::Shutdown);
        }

        self.transition(ConnectionPhase::Subscribing);
        self.send(write, &OutboundMessage::subscribe(&self.instrument))
            .await?;

        self.transition(ConnectionPhase::Streaming);
        self.stream(read, activity, opened, cancel).await
    }

    /// Wait out the settle delay while still reading the socket, so a
    /// rejected authentication ends the session before it subscribes.
    /// Returns `false` on cancellation.
    async fn settle(
        &self,
        read: &mut WsSource,
        activity: &watch::Sender<Activity>,
        cancel: &CancellationToken,
    ) -> Result<bool, FeedError> {
        let deadline = tokio::time::sleep(self.config.settle_delay);
        tokio::pin!(deadline);
        loop {
            tokio::select! {
                _ = cancel.cancelled() => return Ok(false),
                _ = &mut deadline => return Ok(true),
                frame = read.next() => match frame {
                    Some(frame) => handle_frame(&self.instrument, &self.store, frame?, activity)?,
                    None => return Err(FeedError::ClosedByPeer),
                },
            }
        }
    }

    async fn send(&self, write: &mut WsSink, message: &OutboundMessage<'_>) -> Result<(), FeedError> {
        let what = message.kind();
        let json = message
            .to_json()
            .map_err(|source| FeedError::Encode { what, source })?;
        match tokio::time::timeout(self.config.send_timeout, write.send(Message::Text(json.into()))).await {
            Ok(sent) => {
                sent?;
                debug!("{} sent {} request", self.instrument, what);
                Ok(())
            }
            Err(_) => Err(FeedError::SendTimeout { what }),
        }
    }

    async fn stream(
        &mut self,
        read: WsSource,
        activity: watch::Sender<Activity>,
        opened: Instant,
        cancel: &CancellationToken,
    ) -> Result<Disconnect, FeedError> {
        let seen = activity.subscribe();

        let mut tasks = JoinSet::new();
        tasks.spawn(receive_loop(
            self.instrument.clone(),
            Arc::clone(&self.store),
            read,
            activity,
        ));
        tasks.spawn(watchdog(
            seen,
            opened,
            self.config.stale_after,
            self.config.watchdog_period,
        ));
        tasks.spawn(refresh_timer(opened, self.config.max_connection_age));

        let outcome = tokio::select! {
            _ = cancel.cancelled() => Ok(Disconnect::Shutdown),
            joined = tasks.join_next() => match joined {
                Some(Ok(result)) => result,
                Some(Err(err)) => Err(FeedError::TaskFailed(err.to_string())),
                None => Err(FeedError::TaskFailed("no session tasks".to_string())),
            },
        };
        tasks.shutdown().await;
        outcome
    }

    /// Fold what a finished session saw into the supervisor state.
    fn record(&mut self, activity: Activity) {
        self.state.last_data = activity.last_frame;
        self.state.book_updates += activity.book_updates;
        if activity.book_updates > 0 {
            self.state.backoff.reset();
        }
    }
}

/// Sleep unless cancelled first. Returns `false` on cancellation.
async fn pause(duration: Duration, cancel: &CancellationToken) -> bool {
    tokio::select! {
        _ = cancel.cancelled() => false,
        _ = tokio::time::sleep(duration) => true,
    }
}

async fn receive_loop(
    instrument: String,
    store: Arc<OrderBookStore>,
    mut read: WsSource,
    activity: watch::Sender<Activity>,
) -> Result<Disconnect, FeedError> {
    while let Some(frame) = read.next().await {
        handle_frame(&instrument, &store, frame?, &activity)?;
    }
    Err(FeedError::ClosedByPeer)
}

/// Record the arrival of one frame and apply it.
fn handle_frame(
    instrument: &str,
    store: &OrderBookStore,
    frame: Message,
    activity: &watch::Sender<Activity>,
) -> Result<(), FeedError> {
    activity.send_modify(|seen| seen.last_frame = Some(Instant::now()));

    match frame {
        Message::Text(text) => {
            if apply_text(instrument, store, text.as_str())? {
                activity.send_modify(|seen| seen.book_updates += 1);
            }
            Ok(())
        }
        Message::Close(frame) => {
            debug!("{} received close frame: {:?}", instrument, frame);
            Err(FeedError::ClosedByPeer)
        }
        _ => Ok(()),
    }
}

/// Handle one text frame. Returns `true` when the book was replaced.
///
/// Only an auth rejection is an error; malformed frames are dropped here.
fn apply_text(instrument: &str, store: &OrderBookStore, text: &str) -> Result<bool, FeedError> {
    match InboundMessage::parse(text) {
        Ok(InboundMessage::BookUpdate(update)) => {
            trace!(
                "{} book update: {} bids, {} asks",
                instrument,
                update.bids.len(),
                update.asks.len()
            );
            match store.replace(instrument, update.bids, update.asks) {
                Ok(()) => Ok(true),
                Err(err) => {
                    warn!("{} dropped book update: {}", instrument, err);
                    Ok(false)
                }
            }
        }
        Ok(InboundMessage::AuthAccepted) => {
            info!("{} authenticated", instrument);
            Ok(false)
        }
        Ok(InboundMessage::AuthRejected { reason }) => Err(FeedError::AuthRejected(reason)),
        Ok(InboundMessage::Other { kind }) => {
            trace!("{} ignoring {} message", instrument, kind);
            Ok(false)
        }
        Err(err) => {
            warn!("{} discarding malformed message: {}", instrument, err);
            Ok(false)
        }
    }
}

async fn watchdog(
    activity: watch::Receiver<Activity>,
    opened: Instant,
    stale_after: Duration,
    period: Duration,
) -> Result<Disconnect, FeedError> {
    let mut ticker = tokio::time::interval(period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    loop {
        ticker.tick().await;
        let reference = activity.borrow().last_frame.unwrap_or(opened);
        let idle = reference.elapsed();
        if idle > stale_after {
            return Ok(Disconnect::Stale { idle });
        }
    }
}

async fn refresh_timer(opened: Instant, max_age: Duration) -> Result<Disconnect, FeedError> {
    tokio::time::sleep_until(opened + max_age).await;
    Ok(Disconnect::ScheduledRefresh {
        age: opened.elapsed(),
    })
}
