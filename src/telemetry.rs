//! # Charger Wire Protocol
//!
//! This module talks to the SolaX EV charger's local HTTP endpoint. The protocol is a
//! single request/response pair:
//!
//! ```text
//! POST http://<host>/
//! Content-Type: application/x-www-form-urlencoded
//!
//! optType=ReadRealTimeData&pwd=<password>
//! ```
//!
//! The answer is a JSON object whose `"Data"` member is the flat telemetry array.
//! Other members are ignored.
//!
//! ## Security Note
//!
//! The password travels in plaintext inside the request body. That is the charger's
//! native protocol and there is nothing stronger to negotiate, so keep the device on a
//! trusted network segment.
//!
//! ## Error Handling
//!
//! Every failure mode maps to one [`FetchError`] variant:
//! - **Transport**: connection refused, DNS failure, reset
//! - **Timeout**: no answer within the configured bound
//! - **Protocol**: non-2xx status, body is not JSON, `"Data"` missing or not an array
//! - **Decode**: a referenced raw value is not a number
//!
//! The update core treats all of them the same way: log, keep the last snapshot,
//! report unavailable.

use crate::schema::DecodeError;
use crate::RawSnapshot;
use reqwest::header::CONTENT_TYPE;
use serde_json::Value;
use std::future::Future;
use std::time::Duration;
use thiserror::Error;

/// Command understood by the charger's real-time endpoint
pub const READ_REAL_TIME_DATA: &str = "ReadRealTimeData";

/// Member of the response object that carries the telemetry array
pub const DATA_FIELD: &str = "Data";

const FORM_CONTENT_TYPE: &str = "application/x-www-form-urlencoded";

/// Errors that can occur during one fetch cycle.
///
/// Variants carry rendered messages rather than source errors so that the outcome of
/// one cycle can be cloned and handed to every caller that joined it.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum FetchError {
    /// Connection refused, DNS failure, reset, or HTTP client setup failure
    #[error("transport error: {0}")]
    Transport(String),

    /// No complete response within the configured bound
    #[error("no response within {0:?}")]
    Timeout(Duration),

    /// Response is not the shape the charger is expected to send
    #[error("protocol error: {0}")]
    Protocol(String),

    /// A raw value could not be decoded for its schema row
    #[error("decode error: {0}")]
    Decode(#[from] DecodeError),
}

impl FetchError {
    /// Short category name, stable for log filtering
    pub fn kind(&self) -> &'static str {
        match self {
            FetchError::Transport(_) => "transport",
            FetchError::Timeout(_) => "timeout",
            FetchError::Protocol(_) => "protocol",
            FetchError::Decode(_) => "decode",
        }
    }
}

/// Capability to POST a form body and return the response body.
///
/// The update core only needs this one operation, which keeps it independent of the
/// HTTP stack and lets tests substitute scripted transports.
pub trait Transport: Send + Sync + 'static {
    fn post_form(
        &self,
        url: &str,
        body: String,
    ) -> impl Future<Output = Result<String, FetchError>> + Send;
}

/// Production transport backed by `reqwest`.
#[derive(Clone, Debug)]
pub struct HttpTransport {
    client: reqwest::Client,
    timeout: Duration,
}

impl HttpTransport {
    /// Build a client whose connect and total request time are bounded by `timeout`.
    pub fn new(timeout: Duration) -> Result<Self, FetchError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .connect_timeout(timeout)
            .build()
            .map_err(|e| FetchError::Transport(format!("cannot build HTTP client: {e}")))?;
        Ok(Self { client, timeout })
    }

    fn classify(&self, error: reqwest::Error) -> FetchError {
        if error.is_timeout() {
            FetchError::Timeout(self.timeout)
        } else {
            FetchError::Transport(error.to_string())
        }
    }
}

impl Transport for HttpTransport {
    async fn post_form(&self, url: &str, body: String) -> Result<String, FetchError> {
        let response = self
            .client
            .post(url)
            .header(CONTENT_TYPE, FORM_CONTENT_TYPE)
            .body(body)
            .send()
            .await
            .map_err(|e| self.classify(e))?;

        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::Protocol(format!("HTTP status {status}")));
        }

        response.text().await.map_err(|e| self.classify(e))
    }
}

/// Endpoint URL for a configured host.
///
/// A bare host or `host:port` gets the `http://` scheme the charger speaks; a value
/// that already carries a scheme is used as is.
pub fn device_url(host: &str) -> String {
    let host = host.trim().trim_end_matches('/');
    if host.starts_with("http://") || host.starts_with("https://") {
        format!("{host}/")
    } else {
        format!("http://{host}/")
    }
}

/// Form body of the real-time data request.
///
/// The password is sent verbatim, exactly as the charger's own app does.
pub fn request_body(password: &str) -> String {
    format!("optType={READ_REAL_TIME_DATA}&pwd={password}")
}

/// Validate a response body and extract the raw telemetry array.
pub fn parse_response(body: &str) -> Result<RawSnapshot, FetchError> {
    let json: Value = serde_json::from_str(body)
        .map_err(|e| FetchError::Protocol(format!("response is not valid JSON: {e}")))?;

    let Value::Object(mut members) = json else {
        return Err(FetchError::Protocol(
            "response is not a JSON object".to_string(),
        ));
    };

    match members.remove(DATA_FIELD) {
        Some(Value::Array(items)) => Ok(RawSnapshot::from(items)),
        Some(Value::Null) => Err(FetchError::Protocol(format!(
            "\"{DATA_FIELD}\" is null"
        ))),
        Some(_) => Err(FetchError::Protocol(format!(
            "\"{DATA_FIELD}\" is not an array"
        ))),
        None => Err(FetchError::Protocol(format!(
            "response has no \"{DATA_FIELD}\" field"
        ))),
    }
}
