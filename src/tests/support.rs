//! Test doubles for the charger transport.

use crate::config::DeviceConfig;
use crate::schema::SchemaTable;
use crate::telemetry::{FetchError, Transport};
use crate::UpdateCore;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

/// Response captured from a live charger while charging on three phases
pub const CHARGING_RESPONSE: &str = r#"{"Data":[2,1,0,2300,2301,2299,1050,1048,1052,3150,3150,45,47,0,0,0,0,0,0,0,0,0,0,22,34]}"#;

/// Transport that replays a scripted list of outcomes.
///
/// Panics if a second request starts while one is still pending, which is the
/// property the update core must never violate.
pub struct ScriptedTransport {
    responses: Mutex<VecDeque<(Option<Duration>, Result<String, FetchError>)>>,
    delay: Duration,
    pending: AtomicBool,
    calls: AtomicUsize,
    last_request: Mutex<Option<(String, String)>>,
}

/// Clears the pending flag even when the request future is dropped mid-flight
struct PendingGuard<'a>(&'a AtomicBool);

impl Drop for PendingGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

impl ScriptedTransport {
    pub fn new(responses: Vec<Result<String, FetchError>>) -> Self {
        Self {
            responses: Mutex::new(responses.into_iter().map(|r| (None, r)).collect()),
            delay: Duration::ZERO,
            pending: AtomicBool::new(false),
            calls: AtomicUsize::new(0),
            last_request: Mutex::new(None),
        }
    }

    /// Requests without their own delay take `delay` before answering
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn push(&self, response: Result<String, FetchError>) {
        self.responses.lock().unwrap().push_back((None, response));
    }

    /// Queue a response that arrives after `delay`
    pub fn push_delayed(&self, delay: Duration, response: Result<String, FetchError>) {
        self.responses.lock().unwrap().push_back((Some(delay), response));
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn last_request(&self) -> Option<(String, String)> {
        self.last_request.lock().unwrap().clone()
    }
}

impl Transport for ScriptedTransport {
    async fn post_form(&self, url: &str, body: String) -> Result<String, FetchError> {
        assert!(
            !self.pending.swap(true, Ordering::SeqCst),
            "transport entered while a previous request was still pending"
        );
        let _guard = PendingGuard(&self.pending);

        self.calls.fetch_add(1, Ordering::SeqCst);
        *self.last_request.lock().unwrap() = Some((url.to_string(), body));

        // Dequeued up front: an abandoned request consumes its response
        let next = self.responses.lock().unwrap().pop_front();
        let (delay, response) = next.unwrap_or_else(|| (None, refused()));

        let delay = delay.unwrap_or(self.delay);
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        response
    }
}

pub fn ok(body: &str) -> Result<String, FetchError> {
    Ok(body.to_string())
}

pub fn refused() -> Result<String, FetchError> {
    Err(FetchError::Transport("connection refused".to_string()))
}

pub fn device() -> DeviceConfig {
    DeviceConfig::new("192.168.1.50", "12345678")
}

pub fn core_with(transport: ScriptedTransport) -> UpdateCore<ScriptedTransport> {
    UpdateCore::new(device(), SchemaTable::default(), transport)
}
