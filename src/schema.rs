//! # Telemetry Schema Table
//!
//! The charger reports its real-time data as one flat array of numbers. This module
//! declares, once, what each position means: a label, a unit, a semantic class and how
//! to turn the raw number into a reading.
//!
//! ## Decode Modes
//!
//! - **Scale factor**: `raw × factor`, rounded to two decimals, half away from zero.
//!   The product is first snapped to 1e-6 of a hundredth so that binary representation
//!   error cannot push an exact half-step down (`1005 × 0.001` gives `1.01`, not `1.0`).
//! - **Enum map**: integer raw values are looked up in a case list; anything else
//!   renders the default text, where `{raw}` is replaced by the raw value.
//!
//! ## Presets
//!
//! Two firmware variants of the table exist in the field. [`SchemaPreset::Full`] is the
//! authoritative one and includes the plug temperature sensor; [`SchemaPreset::PcbOnly`]
//! omits it. Tables can also be given entirely in the config file.

use crate::{DecodedSnapshot, DecodedValue, RawSnapshot};
use serde::{Deserialize, Serialize};
use serde_json::{Number, Value};
use std::collections::HashSet;
use thiserror::Error;

/// Placeholder replaced by the raw value in an enum map's default text
pub const RAW_PLACEHOLDER: &str = "{raw}";

/// Errors raised while building a [`SchemaTable`].
#[derive(Error, Debug, Clone, PartialEq)]
pub enum SchemaError {
    /// Two rows share a label
    #[error("duplicate field label '{0}'")]
    DuplicateLabel(String),

    /// A row has an empty or whitespace-only label
    #[error("field at position {0} has an empty label")]
    EmptyLabel(usize),

    /// Scale factor is NaN or infinite
    #[error("field '{0}' has a non-finite scale factor")]
    InvalidFactor(String),
}

/// A raw value that cannot be decoded for the row referencing it.
#[derive(Error, Debug, Clone, PartialEq)]
#[error("field '{label}' (raw index {index}): {reason}")]
pub struct DecodeError {
    pub label: String,
    pub index: usize,
    pub reason: String,
}

/// Unit tag of a reading.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum Unit {
    #[serde(rename = "V")]
    Volt,
    #[serde(rename = "A")]
    Ampere,
    #[serde(rename = "W")]
    Watt,
    #[serde(rename = "kWh")]
    KilowattHour,
    #[serde(rename = "°C", alias = "C")]
    Celsius,
}

impl Unit {
    pub const fn symbol(self) -> &'static str {
        match self {
            Unit::Volt => "V",
            Unit::Ampere => "A",
            Unit::Watt => "W",
            Unit::KilowattHour => "kWh",
            Unit::Celsius => "°C",
        }
    }
}

/// What kind of physical quantity a reading represents.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SemanticClass {
    Voltage,
    Current,
    Power,
    /// Energy counters only ever grow (until the device resets them)
    Energy,
    Temperature,
}

impl SemanticClass {
    pub const fn is_cumulative_increasing(self) -> bool {
        matches!(self, SemanticClass::Energy)
    }
}

/// One entry of an enum map.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct EnumCase {
    pub raw: i64,
    pub text: String,
}

/// How a raw value becomes a reading.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum DecodeMode {
    ScaleFactor { factor: f64 },
    EnumMap { cases: Vec<EnumCase>, default: String },
}

/// One schema row.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct FieldSpec {
    pub label: String,
    pub raw_index: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub unit: Option<Unit>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub semantic_class: Option<SemanticClass>,
    pub decode: DecodeMode,
}

impl FieldSpec {
    /// Row decoded by scaling
    pub fn scaled(
        label: &str,
        raw_index: usize,
        factor: f64,
        unit: Unit,
        semantic_class: SemanticClass,
    ) -> Self {
        Self {
            label: label.to_string(),
            raw_index,
            unit: Some(unit),
            semantic_class: Some(semantic_class),
            decode: DecodeMode::ScaleFactor { factor },
        }
    }

    /// Row decoded through an enum map, without unit or class
    pub fn mapped(label: &str, raw_index: usize, cases: &[(i64, &str)], default: &str) -> Self {
        Self {
            label: label.to_string(),
            raw_index,
            unit: None,
            semantic_class: None,
            decode: DecodeMode::EnumMap {
                cases: cases
                    .iter()
                    .map(|&(raw, text)| EnumCase {
                        raw,
                        text: text.to_string(),
                    })
                    .collect(),
                default: default.to_string(),
            },
        }
    }

    /// Decode the raw element this row points at.
    pub fn decode_value(&self, raw: &Value) -> Result<DecodedValue, DecodeError> {
        let number = match raw {
            Value::Number(number) => number,
            other => return Err(self.error(format!("expected a number, got {}", kind(other)))),
        };

        match &self.decode {
            DecodeMode::ScaleFactor { factor } => {
                let value = number
                    .as_f64()
                    .ok_or_else(|| self.error(format!("{number} is not representable as f64")))?;
                let scaled = value * factor;
                if !scaled.is_finite() {
                    return Err(self.error(format!("{number} x {factor} is out of range")));
                }
                Ok(DecodedValue::Number(round_hundredths(scaled)))
            }
            DecodeMode::EnumMap { cases, default } => {
                let text = integral(number)
                    .and_then(|raw| cases.iter().find(|case| case.raw == raw))
                    .map(|case| case.text.clone())
                    .unwrap_or_else(|| default.replace(RAW_PLACEHOLDER, &number.to_string()));
                Ok(DecodedValue::Text(text))
            }
        }
    }

    fn error(&self, reason: String) -> DecodeError {
        DecodeError {
            label: self.label.clone(),
            index: self.raw_index,
            reason,
        }
    }
}

/// Built-in schema variants.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SchemaPreset {
    /// Plug and PCB temperature, session and total energy
    #[default]
    Full,
    /// Older layout without the plug temperature sensor
    PcbOnly,
}

impl SchemaPreset {
    pub fn fields(self) -> Vec<FieldSpec> {
        use SemanticClass::*;
        use Unit::*;

        let mut fields = vec![
            FieldSpec::mapped(
                "device state",
                0,
                &[
                    (0, "Preparing"),
                    (1, "Preparing"),
                    (2, "Charging"),
                    (3, "Finishing"),
                    (4, "Faulted"),
                ],
                "Status {raw}",
            ),
            FieldSpec::mapped(
                "device mode",
                1,
                &[(0, "STOP"), (1, "FAST"), (2, "ECO"), (3, "GREEN")],
                "Unknown",
            ),
            FieldSpec::scaled("voltage a", 3, 0.01, Volt, Voltage),
            FieldSpec::scaled("voltage b", 4, 0.01, Volt, Voltage),
            FieldSpec::scaled("voltage c", 5, 0.01, Volt, Voltage),
            FieldSpec::scaled("current a", 6, 0.01, Ampere, Current),
            FieldSpec::scaled("current b", 7, 0.01, Ampere, Current),
            FieldSpec::scaled("current c", 8, 0.01, Ampere, Current),
            FieldSpec::scaled("power a", 9, 1.0, Watt, Power),
            FieldSpec::scaled("power b", 10, 1.0, Watt, Power),
            FieldSpec::scaled("power c", 11, 1.0, Watt, Power),
            FieldSpec::scaled("total power", 12, 1.0, Watt, Power),
            FieldSpec::scaled("single-session energy", 13, 0.1, KilowattHour, Energy),
            FieldSpec::scaled("total energy", 15, 0.1, KilowattHour, Energy),
        ];

        if self == SchemaPreset::Full {
            fields.push(FieldSpec::scaled("plug temperature", 23, 1.0, Celsius, Temperature));
        }
        fields.push(FieldSpec::scaled("pcb temperature", 24, 1.0, Celsius, Temperature));

        fields
    }
}

/// The ordered, validated list of schema rows for one device.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(transparent)]
pub struct SchemaTable {
    fields: Vec<FieldSpec>,
}

impl SchemaTable {
    /// Build a table, rejecting empty or duplicate labels and non-finite factors.
    pub fn new(fields: Vec<FieldSpec>) -> Result<Self, SchemaError> {
        let mut seen = HashSet::with_capacity(fields.len());
        for (position, field) in fields.iter().enumerate() {
            if field.label.trim().is_empty() {
                return Err(SchemaError::EmptyLabel(position));
            }
            if !seen.insert(field.label.as_str()) {
                return Err(SchemaError::DuplicateLabel(field.label.clone()));
            }
            if let DecodeMode::ScaleFactor { factor } = field.decode {
                if !factor.is_finite() {
                    return Err(SchemaError::InvalidFactor(field.label.clone()));
                }
            }
        }
        Ok(Self { fields })
    }

    pub fn preset(preset: SchemaPreset) -> Self {
        // Presets are static and always pass validation.
        Self {
            fields: preset.fields(),
        }
    }

    pub fn fields(&self) -> &[FieldSpec] {
        &self.fields
    }

    pub fn field(&self, label: &str) -> Option<&FieldSpec> {
        self.fields.iter().find(|field| field.label == label)
    }

    /// Schema index of `label`
    pub fn position(&self, label: &str) -> Option<usize> {
        self.fields.iter().position(|field| field.label == label)
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Decode every row from one raw array.
    ///
    /// Rows whose index lies beyond the array decode to absent. A referenced element
    /// that is not a number fails the whole decode; elements no row points at are
    /// never inspected.
    pub fn decode(&self, raw: &RawSnapshot) -> Result<DecodedSnapshot, DecodeError> {
        let mut snapshot = DecodedSnapshot::default();
        for field in &self.fields {
            let value = match raw.get(field.raw_index) {
                Some(element) => Some(field.decode_value(element)?),
                None => None,
            };
            snapshot.insert(field.label.clone(), value);
        }
        Ok(snapshot)
    }
}

impl Default for SchemaTable {
    fn default() -> Self {
        Self::preset(SchemaPreset::default())
    }
}

/// Round to two decimal places, half away from zero.
pub fn round_hundredths(value: f64) -> f64 {
    let hundredths = value * 100.0;
    // Beyond 1e9 hundredths the 1e-6 grid is finer than f64 resolution anyway.
    let snapped = if hundredths.abs() < 1e9 {
        (hundredths * 1e6).round() / 1e6
    } else {
        hundredths
    };
    snapped.round() / 100.0
}

fn integral(number: &Number) -> Option<i64> {
    number.as_i64().or_else(|| {
        number
            .as_f64()
            .filter(|value| value.fract() == 0.0 && value.abs() < i64::MAX as f64)
            .map(|value| value as i64)
    })
}

fn kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}
