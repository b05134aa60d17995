//! # Rowlog Library
//!
//! Log live WaterRower S4 performance data to FIT-convertible activity files.
//!
//! This library provides the core functionality for talking to a WaterRower S4
//! monitor over USB serial, republishing each measurement on a lightweight
//! pub/sub bus, and snapshotting all known measurements into a row-oriented
//! activity log once per second.

pub mod bus;
pub mod config;
pub mod error;
pub mod fitcsv;
pub mod measurement;
pub mod recorder;
pub mod s4;
pub mod serial;
