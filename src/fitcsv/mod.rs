//! # FIT CSV Encoder
//!
//! Exact textual grammar for the activity log consumed by the FIT CSV
//! conversion tool.
//!
//! Pure formatting: given a row type and an ordered field list, produce one
//! line. Rows are comma-separated; every field contributes a
//! `name,count-or-value,units` cell triple followed by a trailing comma.
//! Data values are double-quoted, definition counts and units are not.

use crate::measurement::Metric;

/// Local message number for the `file_id` message
pub const LOCAL_FILE_ID: u8 = 0;

/// Local message number for the `record` message
pub const LOCAL_RECORD: u8 = 1;

/// Local message number for the `session` message
pub const LOCAL_SESSION: u8 = 2;

/// Local message number for the `activity` message
pub const LOCAL_ACTIVITY: u8 = 3;

/// FIT manufacturer code written into `file_id`
pub const MANUFACTURER: &str = "118";

/// FIT file type code for an activity file
pub const FILE_TYPE_ACTIVITY: &str = "4";

/// FIT sport code: rowing
pub const SPORT_ROWING: &str = "15";

/// FIT sub-sport code: indoor rowing
pub const SUB_SPORT_INDOOR_ROWING: &str = "14";

/// FIT activity type code: manual
pub const ACTIVITY_TYPE_MANUAL: &str = "0";

/// Widest message in the file (record: timestamp + 6 metrics)
pub const MAX_FIELDS: usize = 7;

/// Field names of the `file_id` definition, in emitted order
pub const FILE_ID_FIELDS: [&str; 4] = ["serial_number", "time_created", "manufacturer", "type"];

/// Field names of the `record` definition, in emitted order
pub const RECORD_DEF_FIELDS: [&str; 7] = [
    "timestamp",
    "distance",
    "power",
    "cadence",
    "speed",
    "total_cycles",
    "heart_rate",
];

/// Metric order of a `record` data row (timestamp is prepended separately)
pub const RECORD_ROW_METRICS: [Metric; 6] = [
    Metric::Distance,
    Metric::Power,
    Metric::TotalCycles,
    Metric::Speed,
    Metric::Cadence,
    Metric::HeartRate,
];

/// Field names of the `session` definition, in emitted order
pub const SESSION_FIELDS: [&str; 7] = [
    "timestamp",
    "start_time",
    "total_elapsed_time",
    "total_distance",
    "total_cycles",
    "sport",
    "sub_sport",
];

/// Field names of the `activity` definition, in emitted order
pub const ACTIVITY_FIELDS: [&str; 3] = ["timestamp", "num_sessions", "type"];

/// The column header row (`Field1,Value1,Units1` triples up to the widest
/// message in the file)
pub fn header_row() -> String {
    let mut row = String::from("Type,LocalNumber,Message");
    for n in 1..=MAX_FIELDS {
        row.push_str(&format!(",Field{n},Value{n},Units{n}"));
    }
    row
}

/// One `Definition` row: every field is declared with count 1 and no units.
pub fn definition_row(local: u8, message: &str, fields: &[&str]) -> String {
    let mut row = format!("Definition,{},{},", local, message);
    for name in fields {
        row.push_str(&format!("{},1,,", name));
    }
    row
}

/// One `Data` row from `(name, value, units)` triples; values are quoted.
pub fn data_row(local: u8, message: &str, fields: &[(&str, String, &str)]) -> String {
    let mut row = format!("Data,{},{},", local, message);
    for (name, value, units) in fields {
        row.push_str(&format!("{},\"{}\",{},", name, value, units));
    }
    row
}

/// Format a measurement value as its shortest decimal string
/// (`120`, not `120.0`; `2.5` stays `2.5`).
pub fn format_value(value: f64) -> String {
    format!("{}", value)
}
