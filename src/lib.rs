//! # EVC Monitor Core Library
//!
//! This library polls a SolaX EV charging controller for its real-time telemetry and
//! exposes every value as a typed, named, unit-scaled reading. It is built around one
//! shared update core so that any number of readings cost exactly one network round
//! trip per polling interval.
//!
//! ## Design Philosophy
//!
//! ### One Fetch, Many Readings
//! - **Single request per cycle**: the charger answers `ReadRealTimeData` with a flat
//!   array of numbers; every reading is a view into that one array
//! - **Declarative schema**: positions, units and scaling live in a [`schema::SchemaTable`],
//!   which is plain data and can be replaced from the config file
//! - **Stale-but-retained**: a failed cycle keeps the last good values and only flips
//!   availability, so dashboards keep their continuity
//!
//! ### Data Flow
//! 1. **Fetch**: POST `optType=ReadRealTimeData&pwd=...` to the charger ([`telemetry`])
//! 2. **Validate**: the body must be JSON with a `"Data"` array ([`RawSnapshot`])
//! 3. **Decode**: every schema row is decoded at once ([`DecodedSnapshot`])
//! 4. **Swap**: the new state replaces the old one atomically ([`coordinator::UpdateCore`])
//! 5. **Notify**: subscribers receive the snapshot after the swap
//!
//! ## Core Types
//!
//! - [`RawSnapshot`]: the raw telemetry array from one successful fetch
//! - [`DecodedValue`]: a single decoded reading (number or text)
//! - [`DecodedSnapshot`]: every decoded reading of one cycle, keyed by label

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;

// Module declarations
pub mod config;
pub mod coordinator;
pub mod poller;
pub mod renderer;
pub mod schema;
pub mod sensor;
pub mod telemetry;

#[cfg(test)]
mod tests;

pub use coordinator::{CorePhase, CoreState, UpdateCore};
pub use telemetry::{FetchError, HttpTransport, Transport};

/// The raw telemetry array exactly as the charger delivered it.
///
/// Positions are meaningful only through a [`schema::SchemaTable`]. Elements are kept
/// as JSON values so that a malformed element surfaces as a decode error for the row
/// that references it, instead of failing the whole parse.
///
/// # Example
/// ```
/// use evc_core_lib::RawSnapshot;
///
/// let raw = RawSnapshot::from(vec![serde_json::json!(2), serde_json::json!(1)]);
/// assert_eq!(raw.len(), 2);
/// assert!(raw.get(5).is_none());
/// ```
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RawSnapshot(Vec<Value>);

impl RawSnapshot {
    /// Element at `index`, or `None` when the array is too short
    pub fn get(&self, index: usize) -> Option<&Value> {
        self.0.get(index)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl From<Vec<Value>> for RawSnapshot {
    fn from(values: Vec<Value>) -> Self {
        Self(values)
    }
}

/// A single decoded reading.
///
/// Scaled fields decode to [`DecodedValue::Number`] rounded to two decimals;
/// enum-mapped fields decode to [`DecodedValue::Text`].
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum DecodedValue {
    Number(f64),
    Text(String),
}

impl DecodedValue {
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            DecodedValue::Number(value) => Some(*value),
            DecodedValue::Text(_) => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            DecodedValue::Number(_) => None,
            DecodedValue::Text(text) => Some(text),
        }
    }
}

impl fmt::Display for DecodedValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DecodedValue::Number(value) => write!(f, "{value}"),
            DecodedValue::Text(text) => f.write_str(text),
        }
    }
}

impl From<f64> for DecodedValue {
    fn from(value: f64) -> Self {
        DecodedValue::Number(value)
    }
}

impl From<&str> for DecodedValue {
    fn from(text: &str) -> Self {
        DecodedValue::Text(text.to_string())
    }
}

/// Every reading decoded from one [`RawSnapshot`], keyed by schema label.
///
/// A label maps to `None` when its raw index was out of range for that fetch. The
/// map is ordered, so two snapshots decoded from the same input serialize to the
/// same bytes.
///
/// Snapshots are never edited after decoding; the update core shares them behind
/// an `Arc` and replaces them wholesale.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DecodedSnapshot {
    values: BTreeMap<String, Option<DecodedValue>>,
}

impl DecodedSnapshot {
    /// Decoded value for `label`; `None` for unknown labels and absent fields alike
    pub fn get(&self, label: &str) -> Option<&DecodedValue> {
        self.values.get(label).and_then(Option::as_ref)
    }

    /// True if the schema that produced this snapshot has a row named `label`
    pub fn contains_label(&self, label: &str) -> bool {
        self.values.contains_key(label)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, Option<&DecodedValue>)> {
        self.values
            .iter()
            .map(|(label, value)| (label.as_str(), value.as_ref()))
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub(crate) fn insert(&mut self, label: String, value: Option<DecodedValue>) {
        self.values.insert(label, value);
    }
}
