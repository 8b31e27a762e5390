//! # Terminal Rendering
//!
//! This module renders the current readings as a plain ASCII table, for the `--once`
//! mode and for watching the charger from a terminal.
//!
//! ```text
//! SolaX EVC Device State          Charging
//! SolaX EVC Voltage A             230.1 V
//! SolaX EVC Plug Temperature      -
//! -----------------------------------------------
//! Last update: 2026-10-17 08:14:03 UTC
//! ```
//!
//! Values from a failed cycle are still shown, suffixed with `[unavailable]`, so the
//! operator sees both the last known state and that it is outdated.

use crate::sensor::Reading;
use chrono::{DateTime, Utc};
use std::fmt::Write;

/// Marker appended to readings whose last refresh failed
pub const UNAVAILABLE_MARKER: &str = "[unavailable]";

/// Shown in place of a value that has never been decoded
const ABSENT: &str = "-";

/// Format one value with its unit
fn format_value(reading: &Reading) -> String {
    match (&reading.value, reading.unit) {
        (None, _) => ABSENT.to_string(),
        (Some(value), Some(unit)) => format!("{value} {}", unit.symbol()),
        (Some(value), None) => value.to_string(),
    }
}

/// Render `readings` as an aligned table followed by a freshness footer.
pub fn render_table(readings: &[Reading], last_success: Option<DateTime<Utc>>) -> String {
    let name_width = readings
        .iter()
        .map(|reading| reading.name.chars().count())
        .max()
        .unwrap_or(0)
        + 2;

    let mut out = String::new();
    for reading in readings {
        let mut value = format_value(reading);
        if !reading.available {
            value.push(' ');
            value.push_str(UNAVAILABLE_MARKER);
        }
        // Writing to a String cannot fail
        let _ = writeln!(out, "{:<name_width$}{}", reading.name, value);
    }

    let rule_width = name_width.max(20) + 16;
    let _ = writeln!(out, "{}", "-".repeat(rule_width));
    match last_success {
        Some(at) => {
            let _ = writeln!(out, "Last update: {}", at.format("%Y-%m-%d %H:%M:%S UTC"));
        }
        None => out.push_str("Last update: never\n"),
    }
    out
}

/// Print the table to stdout
pub fn draw_ascii(readings: &[Reading], last_success: Option<DateTime<Utc>>) {
    print!("{}", render_table(readings, last_success));
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::Unit;
    use crate::DecodedValue;
    use chrono::TimeZone;

    fn reading(name: &str, value: Option<DecodedValue>, unit: Option<Unit>, available: bool) -> Reading {
        Reading {
            name: name.to_string(),
            value,
            unit,
            available,
        }
    }

    #[test]
    fn test_format_value() {
        assert_eq!(
            format_value(&reading("v", Some(23.0.into()), Some(Unit::Volt), true)),
            "23 V"
        );
        assert_eq!(
            format_value(&reading("t", Some(22.0.into()), Some(Unit::Celsius), true)),
            "22 °C"
        );
        assert_eq!(
            format_value(&reading("s", Some("Charging".into()), None, true)),
            "Charging"
        );
        assert_eq!(format_value(&reading("x", None, Some(Unit::Watt), true)), "-");
    }

    #[test]
    fn test_render_table_aligns_and_flags_unavailable() {
        let rows = vec![
            reading("SolaX EVC Device State", Some("Charging".into()), None, false),
            reading("SolaX EVC Voltage A", Some(12.34.into()), Some(Unit::Volt), false),
        ];
        let at = Utc.with_ymd_and_hms(2026, 10, 17, 8, 14, 3).unwrap();
        let table = render_table(&rows, Some(at));
        let lines: Vec<&str> = table.lines().collect();

        assert_eq!(lines[0], "SolaX EVC Device State  Charging [unavailable]");
        assert_eq!(lines[1], "SolaX EVC Voltage A     12.34 V [unavailable]");
        assert!(lines[2].chars().all(|c| c == '-'));
        assert_eq!(lines[3], "Last update: 2026-10-17 08:14:03 UTC");
    }

    #[test]
    fn test_render_table_without_success() {
        let rows = vec![reading("SolaX EVC Total Power", None, Some(Unit::Watt), false)];
        let table = render_table(&rows, None);

        assert!(table.starts_with("SolaX EVC Total Power  - [unavailable]\n"));
        assert!(table.ends_with("Last update: never\n"));
    }
}
