//! # S4 Protocol Driver
//!
//! Query/response state machine for the WaterRower S4 monitor.
//!
//! This module handles:
//! - The handshake and identification exchange (`USB` → `_WR_` → `IV?`)
//! - Dispatching incoming response lines to measurement updates
//! - Driving the two outgoing query chains (stroke-start → power → stroke
//!   count, and the periodic distance → pace poll)
//! - Deriving cadence from inter-stroke timing and split from raw speed
//!
//! The driver itself performs no I/O. Each incoming line produces a list of
//! [`Action`]s that the caller applies to the serial port and timers, which
//! keeps the ordering auditable and lets tests inject synthetic byte
//! sequences without a real monitor.

pub mod protocol;

use std::sync::Arc;
use std::time::Instant;

use tracing::{debug, info};

use crate::bus::MeasurementBus;
use crate::measurement::{Device, Metric};
use self::protocol::*;

/// Raw speed responses are centimeters/second; published speed is m/s.
const CM_PER_METER: f64 = 100.0;

/// Split (seconds per 500 m) from a cm/s raw value: 500 m / (raw/100 m/s).
const SPLIT_NUMERATOR: f64 = 50_000.0;

/// Connection lifecycle of the driver
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DriverState {
    /// Serial port not yet opened
    Disconnected,
    /// Handshake sent, waiting for stroke data
    Identifying,
    /// Stroke data arriving, query chains active
    Polling,
}

/// Side effect requested by the driver, applied by the owning event loop
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    /// Write a command line to the serial port
    Send(&'static str),
    /// Arm the periodic distance poll (requested at most once per connection)
    StartDistancePoll,
}

/// WaterRower S4 protocol driver.
///
/// Owns the device's measurement values; every update is republished on the
/// bus as a read-only snapshot.
pub struct S4Driver {
    state: DriverState,
    firmware: Option<String>,
    last_stroke: Option<Instant>,
    distance_poll_started: bool,
    device: Device,
    bus: Arc<MeasurementBus>,
}

impl S4Driver {
    pub fn new(bus: Arc<MeasurementBus>) -> Self {
        Self {
            state: DriverState::Disconnected,
            firmware: None,
            last_stroke: None,
            distance_poll_started: false,
            device: Device::s4(),
            bus,
        }
    }

    pub fn state(&self) -> DriverState {
        self.state
    }

    /// Firmware version reported by the monitor, once identified
    pub fn firmware(&self) -> Option<&str> {
        self.firmware.as_deref()
    }

    /// Latest value the driver has written for a metric
    pub fn value(&self, metric: Metric) -> f64 {
        self.device.value(metric)
    }

    /// The serial port opened successfully: start the handshake.
    pub fn on_connect(&mut self) -> Vec<Action> {
        self.state = DriverState::Identifying;
        vec![Action::Send(CMD_HANDSHAKE)]
    }

    /// The periodic distance poll fired: read distance (the pace read is
    /// chained off the distance response).
    pub fn on_poll_tick(&mut self) -> Vec<Action> {
        vec![Action::Send(CMD_READ_DISTANCE)]
    }

    /// Dispatch one received line.
    ///
    /// A line matches at most one rule; unroutable or malformed lines are
    /// dropped silently. `now` is injected so tests control stroke timing.
    pub fn on_line(&mut self, line: &str, now: Instant) -> Vec<Action> {
        let line = line.trim_end();

        if line.starts_with(RSP_HANDSHAKE) {
            debug!("monitor acknowledged handshake");
            return vec![Action::Send(CMD_FIRMWARE_VERSION)];
        }

        if line.starts_with(RSP_FIRMWARE) {
            // Identification is best-effort logging only; no state change.
            if let Some(version) = parse_firmware(line) {
                info!("S4 monitor firmware {}", version);
                self.firmware = Some(version);
            }
            return Vec::new();
        }

        if line.starts_with(RSP_STROKE_START) {
            return self.on_stroke_start(now);
        }

        if line.starts_with(RSP_POWER) {
            self.publish(Metric::Power, decode_hex_field(line) as f64);
            return vec![Action::Send(CMD_READ_STROKE_COUNT)];
        }

        if line.starts_with(RSP_STROKE_COUNT) {
            self.publish(Metric::TotalCycles, decode_hex_field(line) as f64);
            return Vec::new();
        }

        if line.starts_with(RSP_DISTANCE) {
            self.publish(Metric::Distance, decode_hex_field(line) as f64);
            return vec![Action::Send(CMD_READ_PACE)];
        }

        if line.starts_with(RSP_PACE) {
            let raw = decode_hex_field(line);
            self.publish(Metric::Speed, raw as f64 / CM_PER_METER);
            if raw != 0 {
                self.publish(Metric::Split, SPLIT_NUMERATOR / raw as f64);
            }
            return Vec::new();
        }

        debug!("dropping unroutable line: {:?}", line);
        Vec::new()
    }

    fn on_stroke_start(&mut self, now: Instant) -> Vec<Action> {
        if self.state == DriverState::Identifying {
            debug!("stroke data arriving, polling active");
            self.state = DriverState::Polling;
        }

        // The first stroke has no previous timestamp and never produces a
        // cadence value; the stored timestamp is always overwritten.
        if let Some(previous) = self.last_stroke.replace(now) {
            let elapsed_ms = now.duration_since(previous).as_millis();
            if elapsed_ms > 0 {
                let cadence = round1(60_000.0 / elapsed_ms as f64);
                self.publish(Metric::Cadence, cadence);
            }
        }

        let mut actions = vec![Action::Send(CMD_READ_POWER)];
        if !self.distance_poll_started {
            self.distance_poll_started = true;
            actions.push(Action::StartDistancePoll);
        }
        actions
    }

    fn publish(&mut self, metric: Metric, value: f64) {
        self.device.set(metric, value);
        self.bus.publish(&self.device.topic(metric), value);
    }
}

/// Round to one decimal place
fn round1(value: f64) -> f64 {
    (value * 10.0).round() / 10.0
}
