//! # Shared Update Core
//!
//! [`UpdateCore`] is the single source of truth for every reading of one charger. It
//! performs the fetch cycle, keeps the last good snapshot, and tells subscribers when
//! a new one lands. Readings never touch the network; they look at the cached state.
//!
//! ## State Machine
//!
//! ```text
//! Uninitialized --success--> Fresh <--success / failure--> Stale
//! ```
//!
//! Once populated, a core never loses its snapshot. A failed cycle only flips
//! availability and records the reason.
//!
//! ## Concurrency
//!
//! - **One request at a time**: cycles are serialized by an async mutex. A caller that
//!   arrives while a cycle is in flight waits for it and shares its outcome instead of
//!   issuing a second request.
//! - **Lock-free reads**: the state lives in an [`ArcSwap`]; `read` and `is_available`
//!   load an `Arc` and never wait on the fetch.
//! - **Copy-on-write**: each cycle stores a complete new [`CoreState`], so readers
//!   never observe a half-decoded snapshot.
//! - **Cancellation**: the request is bounded by the configured timeout. State is only
//!   written after a complete response, so an aborted cycle changes nothing.
//! - **Notification**: subscribers are fed through a broadcast channel after the swap.
//!   Callbacks run on their own task, outside the fetch critical section.

use crate::config::DeviceConfig;
use crate::schema::SchemaTable;
use crate::telemetry::{self, FetchError, HttpTransport, Transport};
use crate::{DecodedSnapshot, DecodedValue};
use arc_swap::ArcSwap;
use chrono::{DateTime, Utc};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::broadcast::{self, error::RecvError};
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// Buffered updates per subscriber before it starts lagging
const UPDATE_CHANNEL_CAPACITY: usize = 16;

/// Outcome of one refresh, shared with every caller that joined the cycle
pub type RefreshResult = Result<Arc<DecodedSnapshot>, FetchError>;

/// Lifecycle phase of a core.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CorePhase {
    /// No successful fetch yet
    Uninitialized,
    /// Last cycle succeeded
    Fresh,
    /// Last cycle failed; the previous snapshot is retained
    Stale,
}

/// Everything readers may observe, replaced as one unit per cycle.
#[derive(Clone, Debug, Default)]
pub struct CoreState {
    snapshot: Option<Arc<DecodedSnapshot>>,
    last_fetch_succeeded: bool,
    last_success: Option<DateTime<Utc>>,
    last_error: Option<FetchError>,
}

impl CoreState {
    pub fn snapshot(&self) -> Option<&Arc<DecodedSnapshot>> {
        self.snapshot.as_ref()
    }

    /// Decoded value of `label` from the cached snapshot, available or not
    pub fn read(&self, label: &str) -> Option<&DecodedValue> {
        self.snapshot.as_deref().and_then(|s| s.get(label))
    }

    pub fn is_available(&self) -> bool {
        self.last_fetch_succeeded
    }

    pub fn last_success(&self) -> Option<DateTime<Utc>> {
        self.last_success
    }

    pub fn last_error(&self) -> Option<&FetchError> {
        self.last_error.as_ref()
    }

    pub fn phase(&self) -> CorePhase {
        match (&self.snapshot, self.last_fetch_succeeded) {
            (None, _) => CorePhase::Uninitialized,
            (Some(_), true) => CorePhase::Fresh,
            (Some(_), false) => CorePhase::Stale,
        }
    }
}

/// Handle to the update core of one charger.
///
/// Cloning is cheap and every clone shares the same state, transport and fetch lock.
pub struct UpdateCore<T: Transport> {
    inner: Arc<Inner<T>>,
}

struct Inner<T> {
    config: DeviceConfig,
    schema: SchemaTable,
    transport: T,
    url: String,
    state: ArcSwap<CoreState>,
    /// Held for the duration of a cycle; stores the outcome of the last completed one
    cycle: Mutex<Option<RefreshResult>>,
    completed_cycles: AtomicU64,
    updates: broadcast::Sender<Arc<DecodedSnapshot>>,
}

impl<T: Transport> Clone for UpdateCore<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl UpdateCore<HttpTransport> {
    /// Core talking to a real charger over HTTP
    pub fn with_http(config: DeviceConfig, schema: SchemaTable) -> Result<Self, FetchError> {
        let transport = HttpTransport::new(config.timeout())?;
        Ok(Self::new(config, schema, transport))
    }
}

impl<T: Transport> UpdateCore<T> {
    pub fn new(config: DeviceConfig, schema: SchemaTable, transport: T) -> Self {
        let (updates, _) = broadcast::channel(UPDATE_CHANNEL_CAPACITY);
        let url = telemetry::device_url(&config.host);
        Self {
            inner: Arc::new(Inner {
                config,
                schema,
                transport,
                url,
                state: ArcSwap::from_pointee(CoreState::default()),
                cycle: Mutex::new(None),
                completed_cycles: AtomicU64::new(0),
                updates,
            }),
        }
    }

    pub fn config(&self) -> &DeviceConfig {
        &self.inner.config
    }

    pub fn schema(&self) -> &SchemaTable {
        &self.inner.schema
    }

    pub fn transport(&self) -> &T {
        &self.inner.transport
    }

    /// Run one fetch cycle, or join the one already in flight.
    ///
    /// Failures leave the cached snapshot untouched and are returned to the caller
    /// after being logged.
    pub async fn refresh(&self) -> RefreshResult {
        let inner = &self.inner;
        let observed = inner.completed_cycles.load(Ordering::Acquire);
        let mut last_outcome = inner.cycle.lock().await;

        if inner.completed_cycles.load(Ordering::Acquire) != observed {
            if let Some(outcome) = last_outcome.as_ref() {
                debug!(host = %inner.config.host, "joined in-flight refresh");
                return outcome.clone();
            }
        }

        let outcome = self.run_cycle().await;
        *last_outcome = Some(outcome.clone());
        inner.completed_cycles.fetch_add(1, Ordering::Release);
        outcome
    }

    /// Cached value for `label`; never fetches
    pub fn read(&self, label: &str) -> Option<DecodedValue> {
        self.inner.state.load().read(label).cloned()
    }

    /// Whether the most recent cycle succeeded
    pub fn is_available(&self) -> bool {
        self.inner.state.load().is_available()
    }

    pub fn last_success_timestamp(&self) -> Option<DateTime<Utc>> {
        self.inner.state.load().last_success()
    }

    /// Reason the most recent cycle failed, cleared by the next success
    pub fn last_error(&self) -> Option<FetchError> {
        self.inner.state.load().last_error().cloned()
    }

    pub fn snapshot(&self) -> Option<Arc<DecodedSnapshot>> {
        self.inner.state.load().snapshot().cloned()
    }

    /// Consistent view of everything a reader may need, from a single load
    pub fn state(&self) -> Arc<CoreState> {
        self.inner.state.load_full()
    }

    pub fn phase(&self) -> CorePhase {
        self.inner.state.load().phase()
    }

    /// Time since the last successful fetch, as of `now`
    pub fn staleness(&self, now: DateTime<Utc>) -> Option<chrono::Duration> {
        self.last_success_timestamp().map(|at| now - at)
    }

    /// Receive every snapshot committed from now on, one per successful refresh.
    pub fn subscribe(&self) -> broadcast::Receiver<Arc<DecodedSnapshot>> {
        self.inner.updates.subscribe()
    }

    /// Run `callback` on its own task for every committed snapshot.
    ///
    /// The task ends once every clone of the core is dropped. A callback that
    /// captures a clone keeps the channel open, so abort the returned handle to
    /// stop it. Must be called from within a tokio runtime.
    pub fn on_update<F>(&self, mut callback: F) -> JoinHandle<()>
    where
        F: FnMut(Arc<DecodedSnapshot>) + Send + 'static,
    {
        let mut updates = self.subscribe();
        let host = self.inner.config.host.clone();
        tokio::spawn(async move {
            loop {
                match updates.recv().await {
                    Ok(snapshot) => callback(snapshot),
                    Err(RecvError::Lagged(skipped)) => {
                        warn!(%host, skipped, "update listener fell behind");
                    }
                    Err(RecvError::Closed) => break,
                }
            }
        })
    }

    async fn run_cycle(&self) -> RefreshResult {
        let inner = &self.inner;
        let timeout = inner.config.timeout();
        debug!(host = %inner.config.host, "refreshing real-time data");

        let result = match tokio::time::timeout(timeout, self.fetch_and_decode()).await {
            Ok(result) => result,
            Err(_) => Err(FetchError::Timeout(timeout)),
        };

        match result {
            Ok(snapshot) => {
                let snapshot = Arc::new(snapshot);
                self.commit_success(Arc::clone(&snapshot));
                Ok(snapshot)
            }
            Err(error) => {
                self.commit_failure(error.clone());
                Err(error)
            }
        }
    }

    async fn fetch_and_decode(&self) -> Result<DecodedSnapshot, FetchError> {
        let inner = &self.inner;
        let body = telemetry::request_body(&inner.config.password);
        let response = inner.transport.post_form(&inner.url, body).await?;
        let raw = telemetry::parse_response(&response)?;
        Ok(inner.schema.decode(&raw)?)
    }

    fn commit_success(&self, snapshot: Arc<DecodedSnapshot>) {
        let inner = &self.inner;
        let previous = inner.state.load_full();

        inner.state.store(Arc::new(CoreState {
            snapshot: Some(Arc::clone(&snapshot)),
            last_fetch_succeeded: true,
            last_success: Some(Utc::now()),
            last_error: None,
        }));

        match previous.phase() {
            CorePhase::Uninitialized => {
                info!(host = %inner.config.host, fields = snapshot.len(), "first telemetry received")
            }
            CorePhase::Stale => info!(host = %inner.config.host, "charger reachable again"),
            CorePhase::Fresh => debug!(host = %inner.config.host, "telemetry updated"),
        }

        // Only fails when nobody is subscribed
        let _ = inner.updates.send(snapshot);
    }

    fn commit_failure(&self, error: FetchError) {
        let inner = &self.inner;
        let previous = inner.state.load_full();

        warn!(
            host = %inner.config.host,
            kind = error.kind(),
            error = %error,
            "refresh failed, keeping last snapshot"
        );

        inner.state.store(Arc::new(CoreState {
            snapshot: previous.snapshot.clone(),
            last_fetch_succeeded: false,
            last_success: previous.last_success,
            last_error: Some(error),
        }));
    }
}
