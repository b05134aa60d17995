//! # Measurement Model
//!
//! Core data model for live performance measurements.
//!
//! This module defines:
//! - The closed set of metrics a device can report
//! - The fixed unit attached to each metric
//! - Per-device measurement storage keyed by the metric enumeration
//! - Bus topic naming (`"<deviceType>/<metric>"`)

use std::ops::{Index, IndexMut};

/// Closed set of metrics known to the system.
///
/// Using an enumeration (rather than string lookups) guarantees at compile
/// time that a metric lookup can never silently return "not found".
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Metric {
    Distance,
    Power,
    TotalCycles,
    Speed,
    Cadence,
    Split,
    HeartRate,
}

/// Number of metric variants
pub const METRIC_COUNT: usize = 7;

impl Metric {
    /// All metric variants, in declaration order
    pub const ALL: [Metric; METRIC_COUNT] = [
        Metric::Distance,
        Metric::Power,
        Metric::TotalCycles,
        Metric::Speed,
        Metric::Cadence,
        Metric::Split,
        Metric::HeartRate,
    ];

    /// Wire/topic name of the metric
    pub fn as_str(self) -> &'static str {
        match self {
            Metric::Distance => "distance",
            Metric::Power => "power",
            Metric::TotalCycles => "total_cycles",
            Metric::Speed => "speed",
            Metric::Cadence => "cadence",
            Metric::Split => "split",
            Metric::HeartRate => "heart_rate",
        }
    }

    /// Fixed unit for this metric. A metric's unit never changes.
    pub fn unit(self) -> Unit {
        match self {
            Metric::Distance => Unit::Meters,
            Metric::Power => Unit::Watts,
            Metric::TotalCycles => Unit::Cycles,
            Metric::Speed => Unit::MetersPerSecond,
            Metric::Cadence => Unit::StrokesPerMinute,
            Metric::Split => Unit::SecondsPer500m,
            Metric::HeartRate => Unit::Bpm,
        }
    }

    fn index(self) -> usize {
        match self {
            Metric::Distance => 0,
            Metric::Power => 1,
            Metric::TotalCycles => 2,
            Metric::Speed => 3,
            Metric::Cadence => 4,
            Metric::Split => 5,
            Metric::HeartRate => 6,
        }
    }
}

/// Units of measurement, one fixed unit per metric
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Unit {
    Meters,
    Watts,
    Cycles,
    MetersPerSecond,
    StrokesPerMinute,
    SecondsPer500m,
    Bpm,
}

impl Unit {
    /// Unit label as written into the activity log
    pub fn as_str(self) -> &'static str {
        match self {
            Unit::Meters => "m",
            Unit::Watts => "watts",
            Unit::Cycles => "cycles",
            Unit::MetersPerSecond => "m/s",
            Unit::StrokesPerMinute => "spm",
            Unit::SecondsPer500m => "s/500m",
            Unit::Bpm => "bpm",
        }
    }
}

/// A single live measurement value
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Measurement {
    pub metric: Metric,
    pub value: f64,
}

impl Measurement {
    pub fn unit(&self) -> Unit {
        self.metric.unit()
    }
}

/// Dense metric-keyed value storage.
///
/// Indexing by `Metric` is total: every metric always has a value
/// (0 until first updated).
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct MetricValues([f64; METRIC_COUNT]);

impl MetricValues {
    pub fn new() -> Self {
        Self::default()
    }

    /// Reset every value back to the 0 baseline
    pub fn reset(&mut self) {
        self.0 = [0.0; METRIC_COUNT];
    }
}

impl Index<Metric> for MetricValues {
    type Output = f64;

    fn index(&self, metric: Metric) -> &f64 {
        &self.0[metric.index()]
    }
}

impl IndexMut<Metric> for MetricValues {
    fn index_mut(&mut self, metric: Metric) -> &mut f64 {
        &mut self.0[metric.index()]
    }
}

/// A measurement source, identified by its type string.
///
/// The owning driver holds write access to the values; other components only
/// ever see read-only snapshots delivered over the bus.
#[derive(Debug, Clone)]
pub struct Device {
    device_type: String,
    metrics: Vec<Metric>,
    values: MetricValues,
}

impl Device {
    pub fn new(device_type: impl Into<String>, metrics: Vec<Metric>) -> Self {
        Self {
            device_type: device_type.into(),
            metrics,
            values: MetricValues::new(),
        }
    }

    /// The WaterRower S4 monitor
    pub fn s4() -> Self {
        Self::new(
            "s4",
            vec![
                Metric::Distance,
                Metric::Power,
                Metric::TotalCycles,
                Metric::Speed,
                Metric::Cadence,
                Metric::Split,
            ],
        )
    }

    /// An external heart-rate source (e.g. a BLE strap bridge).
    ///
    /// The capture process lives outside this crate and publishes on the same
    /// bus; this descriptor only exists so the recorder subscribes to it.
    pub fn heart_rate_monitor() -> Self {
        Self::new("hrm", vec![Metric::HeartRate])
    }

    pub fn device_type(&self) -> &str {
        &self.device_type
    }

    /// Metrics this device exposes
    pub fn metrics(&self) -> &[Metric] {
        &self.metrics
    }

    /// Bus topic for one of this device's metrics
    pub fn topic(&self, metric: Metric) -> String {
        format!("{}/{}", self.device_type, metric.as_str())
    }

    /// Latest value written by the owning driver
    pub fn value(&self, metric: Metric) -> f64 {
        self.values[metric]
    }

    /// Overwrite a metric's value. Only the owning driver calls this.
    pub fn set(&mut self, metric: Metric, value: f64) {
        self.values[metric] = value;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_metric_units_are_fixed() {
        assert_eq!(Metric::Distance.unit().as_str(), "m");
        assert_eq!(Metric::Power.unit().as_str(), "watts");
        assert_eq!(Metric::TotalCycles.unit().as_str(), "cycles");
        assert_eq!(Metric::Speed.unit().as_str(), "m/s");
        assert_eq!(Metric::Cadence.unit().as_str(), "spm");
        assert_eq!(Metric::Split.unit().as_str(), "s/500m");
        assert_eq!(Metric::HeartRate.unit().as_str(), "bpm");
    }

    #[test]
    fn test_metric_all_covers_every_variant() {
        assert_eq!(Metric::ALL.len(), METRIC_COUNT);
        for (i, metric) in Metric::ALL.iter().enumerate() {
            assert_eq!(metric.index(), i);
        }
    }

    #[test]
    fn test_metric_values_default_to_zero() {
        let values = MetricValues::new();
        for metric in Metric::ALL {
            assert_eq!(values[metric], 0.0);
        }
    }

    #[test]
    fn test_metric_values_overwrite_and_reset() {
        let mut values = MetricValues::new();
        values[Metric::Power] = 100.0;
        values[Metric::Power] = 150.0;
        assert_eq!(values[Metric::Power], 150.0);

        values.reset();
        assert_eq!(values[Metric::Power], 0.0);
    }

    #[test]
    fn test_topic_naming() {
        let device = Device::s4();
        assert_eq!(device.topic(Metric::Distance), "s4/distance");
        assert_eq!(device.topic(Metric::TotalCycles), "s4/total_cycles");

        let hrm = Device::heart_rate_monitor();
        assert_eq!(hrm.topic(Metric::HeartRate), "hrm/heart_rate");
    }

    #[test]
    fn test_s4_device_metric_set() {
        let device = Device::s4();
        assert_eq!(device.metrics().len(), 6);
        assert!(device.metrics().contains(&Metric::Split));
        assert!(!device.metrics().contains(&Metric::HeartRate));
    }

    #[test]
    fn test_measurement_unit_follows_metric() {
        let m = Measurement {
            metric: Metric::Speed,
            value: 2.5,
        };
        assert_eq!(m.unit(), Unit::MetersPerSecond);
    }
}
