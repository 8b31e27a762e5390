//! # Reading Views
//!
//! A [`Sensor`] is the presentation side of one schema row: a display name, a unique
//! id stable across restarts, unit and classes. It owns no data. Values and
//! availability are pulled from the [`UpdateCore`] (or a [`CoreState`] taken from it)
//! on demand, so attaching any number of sensors costs no extra requests.
//!
//! Unique ids derive from the label rather than the raw index, so editing the schema
//! layout never shuffles ids between readings.

use crate::coordinator::{CoreState, UpdateCore};
use crate::schema::{FieldSpec, SchemaTable, SemanticClass, Unit};
use crate::telemetry::Transport;
use crate::DecodedValue;
use serde::Serialize;

/// Display name prefix for every reading of the charger
pub const NAME_PREFIX: &str = "SolaX EVC";

/// Unique id prefix for every reading of the charger
pub const UNIQUE_ID_PREFIX: &str = "solax_evc";

/// How a reading's history should be aggregated by whatever stores it.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StateClass {
    /// Monotonic counter, such as delivered energy
    TotalIncreasing,
}

/// Presentation view of one schema row.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct Sensor {
    index: usize,
    label: String,
    name: String,
    unique_id: String,
    unit: Option<Unit>,
    device_class: Option<SemanticClass>,
    state_class: Option<StateClass>,
}

/// Value of a sensor at one instant, with the metadata needed to show it.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct Reading {
    pub name: String,
    pub value: Option<DecodedValue>,
    pub unit: Option<Unit>,
    pub available: bool,
}

impl Sensor {
    /// View for the row at schema position `index` of the charger at `host`
    pub fn from_field(index: usize, field: &FieldSpec, host: &str) -> Self {
        Self {
            index,
            label: field.label.clone(),
            name: format!("{NAME_PREFIX} {}", title_case(&field.label)),
            unique_id: format!("{UNIQUE_ID_PREFIX}_{host}_{}", slug(&field.label)),
            unit: field.unit,
            device_class: field.semantic_class,
            state_class: field
                .semantic_class
                .filter(|class| class.is_cumulative_increasing())
                .map(|_| StateClass::TotalIncreasing),
        }
    }

    /// Position of the row in its schema table
    pub fn index(&self) -> usize {
        self.index
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn unique_id(&self) -> &str {
        &self.unique_id
    }

    pub fn unit(&self) -> Option<Unit> {
        self.unit
    }

    pub fn device_class(&self) -> Option<SemanticClass> {
        self.device_class
    }

    pub fn state_class(&self) -> Option<StateClass> {
        self.state_class
    }

    /// Last decoded value, kept even while the core is unavailable
    pub fn native_value<T: Transport>(&self, core: &UpdateCore<T>) -> Option<DecodedValue> {
        core.read(&self.label)
    }

    pub fn available<T: Transport>(&self, core: &UpdateCore<T>) -> bool {
        core.is_available()
    }

    /// Value and availability from one consistent state
    pub fn reading(&self, state: &CoreState) -> Reading {
        Reading {
            name: self.name.clone(),
            value: state.read(&self.label).cloned(),
            unit: self.unit,
            available: state.is_available(),
        }
    }
}

/// One sensor per schema row, in schema order.
pub fn build_sensors(schema: &SchemaTable, host: &str) -> Vec<Sensor> {
    schema
        .fields()
        .iter()
        .enumerate()
        .map(|(index, field)| Sensor::from_field(index, field, host))
        .collect()
}

/// Readings of all `sensors` from one state.
pub fn readings(sensors: &[Sensor], state: &CoreState) -> Vec<Reading> {
    sensors.iter().map(|sensor| sensor.reading(state)).collect()
}

/// "single-session energy" -> "Single-Session Energy"
fn title_case(label: &str) -> String {
    let mut out = String::with_capacity(label.len());
    let mut at_word_start = true;
    for c in label.chars() {
        if at_word_start {
            out.extend(c.to_uppercase());
        } else {
            out.push(c);
        }
        at_word_start = c == ' ' || c == '-';
    }
    out
}

/// "Single-Session Energy" -> "single_session_energy"
fn slug(label: &str) -> String {
    label
        .trim()
        .to_lowercase()
        .chars()
        .map(|c| if c == ' ' || c == '-' { '_' } else { c })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_names_and_unique_ids() {
        let sensors = build_sensors(&SchemaTable::default(), "192.168.1.50");

        assert_eq!(sensors.len(), 16);
        assert_eq!(sensors[0].name(), "SolaX EVC Device State");
        assert_eq!(sensors[0].unique_id(), "solax_evc_192.168.1.50_device_state");
        assert_eq!(sensors[2].name(), "SolaX EVC Voltage A");
        assert_eq!(sensors[12].name(), "SolaX EVC Single-Session Energy");
        assert_eq!(
            sensors[12].unique_id(),
            "solax_evc_192.168.1.50_single_session_energy"
        );
    }

    #[test]
    fn test_sensor_order_follows_schema() {
        let schema = SchemaTable::default();
        for (index, sensor) in build_sensors(&schema, "evc").iter().enumerate() {
            assert_eq!(sensor.index(), index);
            assert_eq!(sensor.label(), schema.fields()[index].label);
        }
    }

    #[test]
    fn test_only_energy_is_total_increasing() {
        let sensors = build_sensors(&SchemaTable::default(), "evc");
        for sensor in &sensors {
            let expected = match sensor.device_class() {
                Some(SemanticClass::Energy) => Some(StateClass::TotalIncreasing),
                _ => None,
            };
            assert_eq!(sensor.state_class(), expected, "{}", sensor.label());
        }
        assert_eq!(sensors[0].unit(), None);
        assert_eq!(sensors[13].unit(), Some(Unit::KilowattHour));
    }

    #[test]
    fn test_reading_before_first_fetch() {
        let sensors = build_sensors(&SchemaTable::default(), "evc");
        let reading = sensors[2].reading(&CoreState::default());

        assert_eq!(reading.name, "SolaX EVC Voltage A");
        assert_eq!(reading.value, None);
        assert_eq!(reading.unit, Some(Unit::Volt));
        assert!(!reading.available);
    }

    #[test]
    fn test_title_case_and_slug() {
        assert_eq!(title_case("pcb temperature"), "Pcb Temperature");
        assert_eq!(slug("Single-Session Energy"), "single_session_energy");
    }
}
