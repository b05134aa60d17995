//! # Activity Recorder
//!
//! Aggregates live measurements into a deterministic, fixed-interval log.
//!
//! This module handles:
//! - Subscribing once to every `(device, metric)` topic and caching the
//!   latest value per metric (last value wins)
//! - Session lifecycle: opening the output file, writing header and
//!   definition rows, and writing summary rows on stop
//! - The 1 Hz snapshot tick, gated on the first observed stroke so an idle
//!   machine produces no rows

use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::PathBuf;
use std::sync::Arc;

use chrono::Utc;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::bus::MeasurementBus;
use crate::error::Result;
use crate::fitcsv::{
    self, ACTIVITY_FIELDS, ACTIVITY_TYPE_MANUAL, FILE_ID_FIELDS, FILE_TYPE_ACTIVITY,
    LOCAL_ACTIVITY, LOCAL_FILE_ID, LOCAL_RECORD, LOCAL_SESSION, MANUFACTURER, RECORD_DEF_FIELDS,
    RECORD_ROW_METRICS, SESSION_FIELDS, SPORT_ROWING, SUB_SPORT_INDOOR_ROWING,
};
use crate::measurement::{Device, Measurement, Metric, MetricValues};

/// Offset of the device epoch from the Unix epoch, in seconds
pub const DEVICE_EPOCH_OFFSET: i64 = 631_065_600;

/// Current time in device-epoch seconds
pub fn device_epoch_now() -> i64 {
    Utc::now().timestamp() - DEVICE_EPOCH_OFFSET
}

/// One open recording, backed by one output resource
struct Session {
    start_epoch: i64,
    sink: Box<dyn Write + Send>,
    rows: u64,
}

/// Fixed-cadence snapshot engine.
///
/// Holds one cached value per metric, shared across devices; the cache is
/// only ever read at tick time, so delivery order between topics does not
/// matter.
pub struct ActivityRecorder {
    topics: Vec<(String, Metric)>,
    cache: MetricValues,
    session: Option<Session>,
    output_dir: PathBuf,
    bus: Arc<MeasurementBus>,
}

impl ActivityRecorder {
    /// Build a recorder over the given device descriptors.
    pub fn new(
        devices: &[Device],
        bus: Arc<MeasurementBus>,
        output_dir: impl Into<PathBuf>,
    ) -> Self {
        let topics = devices
            .iter()
            .flat_map(|device| {
                device
                    .metrics()
                    .iter()
                    .map(|&metric| (device.topic(metric), metric))
                    .collect::<Vec<_>>()
            })
            .collect();

        Self {
            topics,
            cache: MetricValues::new(),
            session: None,
            output_dir: output_dir.into(),
            bus,
        }
    }

    /// Subscribe to every known topic and merge all updates into one stream.
    ///
    /// A rejected subscription is logged and skipped; recording continues
    /// without that metric.
    pub fn subscribe_updates(&self) -> mpsc::UnboundedReceiver<Measurement> {
        let (tx, rx) = mpsc::unbounded_channel();

        for (topic, metric) in &self.topics {
            let mut watch_rx = match self.bus.subscribe(topic) {
                Ok(watch_rx) => watch_rx,
                Err(e) => {
                    warn!("recording without {}: {}", topic, e);
                    continue;
                }
            };

            let tx = tx.clone();
            let metric = *metric;
            tokio::spawn(async move {
                while watch_rx.changed().await.is_ok() {
                    let value = *watch_rx.borrow_and_update();
                    if tx.send(Measurement { metric, value }).is_err() {
                        break;
                    }
                }
            });
        }

        rx
    }

    /// Overwrite the cached value for a metric
    pub fn on_update(&mut self, metric: Metric, value: f64) {
        self.cache[metric] = value;
    }

    /// Number of data rows written in the current or last session
    pub fn rows_recorded(&self) -> u64 {
        self.session.as_ref().map_or(0, |s| s.rows)
    }

    pub fn is_recording(&self) -> bool {
        self.session.is_some()
    }

    /// Open a new session file stamped with the current device-epoch time.
    ///
    /// A no-op if a session is already open.
    pub fn start(&mut self) -> Result<()> {
        if self.session.is_some() {
            debug!("start ignored: session already open");
            return Ok(());
        }

        let start_epoch = device_epoch_now();
        fs::create_dir_all(&self.output_dir)?;
        let path = self.output_dir.join(format!("activity_{}.csv", start_epoch));
        let file = BufWriter::new(File::create(&path)?);
        info!("recording to {}", path.display());

        self.start_with_sink(Box::new(file), start_epoch)
    }

    /// Open a session over an arbitrary sink. Same idempotence guard as
    /// [`start`](Self::start).
    pub fn start_with_sink(&mut self, sink: Box<dyn Write + Send>, start_epoch: i64) -> Result<()> {
        if self.session.is_some() {
            debug!("start ignored: session already open");
            return Ok(());
        }

        let mut session = Session {
            start_epoch,
            sink,
            rows: 0,
        };

        let epoch = fitcsv::format_value(start_epoch as f64);
        writeln!(session.sink, "{}", fitcsv::header_row())?;
        writeln!(
            session.sink,
            "{}",
            fitcsv::definition_row(LOCAL_FILE_ID, "file_id", &FILE_ID_FIELDS)
        )?;
        writeln!(
            session.sink,
            "{}",
            fitcsv::data_row(
                LOCAL_FILE_ID,
                "file_id",
                &[
                    ("serial_number", epoch.clone(), ""),
                    ("time_created", epoch, ""),
                    ("manufacturer", MANUFACTURER.to_string(), ""),
                    ("type", FILE_TYPE_ACTIVITY.to_string(), ""),
                ],
            )
        )?;
        writeln!(
            session.sink,
            "{}",
            fitcsv::definition_row(LOCAL_RECORD, "record", &RECORD_DEF_FIELDS)
        )?;
        session.sink.flush()?;

        // Clean baseline: stale values from a previous session must not
        // leak into this one.
        self.cache.reset();
        self.session = Some(session);
        Ok(())
    }

    /// Emit one snapshot row, unless the machine is still idle.
    pub fn on_tick(&mut self) -> Result<()> {
        self.tick_at(device_epoch_now())
    }

    fn tick_at(&mut self, now_epoch: i64) -> Result<()> {
        let Some(session) = self.session.as_mut() else {
            return Ok(());
        };

        // No stroke observed yet this session: the machine is idle and the
        // tick is not worth recording.
        if self.cache[Metric::TotalCycles] == 0.0 {
            return Ok(());
        }

        let mut fields = Vec::with_capacity(1 + RECORD_ROW_METRICS.len());
        fields.push(("timestamp", fitcsv::format_value(now_epoch as f64), "s"));
        for metric in RECORD_ROW_METRICS {
            fields.push((
                metric.as_str(),
                fitcsv::format_value(self.cache[metric]),
                metric.unit().as_str(),
            ));
        }

        writeln!(
            session.sink,
            "{}",
            fitcsv::data_row(LOCAL_RECORD, "record", &fields)
        )?;
        session.sink.flush()?;
        session.rows += 1;
        Ok(())
    }

    /// Write the session and activity summary rows and close the output
    /// resource. A no-op if no session is open.
    pub fn stop(&mut self) -> Result<()> {
        self.stop_at(device_epoch_now())
    }

    fn stop_at(&mut self, now_epoch: i64) -> Result<()> {
        let Some(mut session) = self.session.take() else {
            debug!("stop ignored: no session open");
            return Ok(());
        };

        let elapsed = now_epoch - session.start_epoch;
        writeln!(
            session.sink,
            "{}",
            fitcsv::definition_row(LOCAL_SESSION, "session", &SESSION_FIELDS)
        )?;
        writeln!(
            session.sink,
            "{}",
            fitcsv::data_row(
                LOCAL_SESSION,
                "session",
                &[
                    ("timestamp", fitcsv::format_value(now_epoch as f64), "s"),
                    (
                        "start_time",
                        fitcsv::format_value(session.start_epoch as f64),
                        "s"
                    ),
                    ("total_elapsed_time", fitcsv::format_value(elapsed as f64), "s"),
                    (
                        "total_distance",
                        fitcsv::format_value(self.cache[Metric::Distance]),
                        "m"
                    ),
                    (
                        "total_cycles",
                        fitcsv::format_value(self.cache[Metric::TotalCycles]),
                        "cycles"
                    ),
                    ("sport", SPORT_ROWING.to_string(), ""),
                    ("sub_sport", SUB_SPORT_INDOOR_ROWING.to_string(), ""),
                ],
            )
        )?;
        writeln!(
            session.sink,
            "{}",
            fitcsv::definition_row(LOCAL_ACTIVITY, "activity", &ACTIVITY_FIELDS)
        )?;
        writeln!(
            session.sink,
            "{}",
            fitcsv::data_row(
                LOCAL_ACTIVITY,
                "activity",
                &[
                    ("timestamp", fitcsv::format_value(now_epoch as f64), "s"),
                    ("num_sessions", "1".to_string(), ""),
                    ("type", ACTIVITY_TYPE_MANUAL.to_string(), ""),
                ],
            )
        )?;
        session.sink.flush()?;

        info!(
            "session closed: {} rows over {} seconds",
            session.rows, elapsed
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    /// Shared in-memory sink, clonable so tests can read back what the
    /// recorder wrote after handing ownership over.
    #[derive(Clone, Default)]
    struct SharedSink(Arc<Mutex<Vec<u8>>>);

    impl SharedSink {
        fn new() -> Self {
            Self::default()
        }

        fn lines(&self) -> Vec<String> {
            let bytes = self.0.lock().unwrap().clone();
            String::from_utf8(bytes)
                .unwrap()
                .lines()
                .map(str::to_string)
                .collect()
        }
    }

    impl Write for SharedSink {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    fn recorder() -> ActivityRecorder {
        let bus = Arc::new(MeasurementBus::new());
        let devices = vec![Device::s4(), Device::heart_rate_monitor()];
        ActivityRecorder::new(&devices, bus, "./activities")
    }

    fn started(sink: &SharedSink, epoch: i64) -> ActivityRecorder {
        let mut rec = recorder();
        rec.start_with_sink(Box::new(sink.clone()), epoch).unwrap();
        rec
    }

    #[test]
    fn test_start_writes_header_and_definitions() {
        let sink = SharedSink::new();
        let _rec = started(&sink, 1_136_749_162);

        let lines = sink.lines();
        assert_eq!(lines.len(), 4);
        assert!(lines[0].starts_with("Type,LocalNumber,Message,Field1,Value1,Units1"));
        assert_eq!(
            lines[1],
            "Definition,0,file_id,serial_number,1,,time_created,1,,manufacturer,1,,type,1,,"
        );
        assert_eq!(
            lines[2],
            "Data,0,file_id,serial_number,\"1136749162\",,time_created,\"1136749162\",,\
             manufacturer,\"118\",,type,\"4\",,"
        );
        assert_eq!(
            lines[3],
            "Definition,1,record,timestamp,1,,distance,1,,power,1,,cadence,1,,speed,1,,\
             total_cycles,1,,heart_rate,1,,"
        );
    }

    #[test]
    fn test_start_is_idempotent() {
        let sink = SharedSink::new();
        let mut rec = started(&sink, 100);
        let before = sink.lines().len();

        rec.start_with_sink(Box::new(sink.clone()), 200).unwrap();
        assert_eq!(sink.lines().len(), before);
        assert!(rec.is_recording());
    }

    #[test]
    fn test_tick_skipped_while_idle() {
        let sink = SharedSink::new();
        let mut rec = started(&sink, 100);

        rec.tick_at(101).unwrap();
        rec.tick_at(102).unwrap();

        assert_eq!(sink.lines().len(), 4);
        assert_eq!(rec.rows_recorded(), 0);
    }

    #[test]
    fn test_tick_emits_row_after_first_stroke() {
        let sink = SharedSink::new();
        let mut rec = started(&sink, 100);

        rec.on_update(Metric::TotalCycles, 5.0);
        rec.on_update(Metric::Power, 100.0);
        rec.on_update(Metric::Distance, 50.0);
        rec.on_update(Metric::Speed, 2.5);
        rec.on_update(Metric::Cadence, 24.5);
        rec.tick_at(103).unwrap();

        let lines = sink.lines();
        assert_eq!(rec.rows_recorded(), 1);
        // Fixed metric order; heart_rate never updated, so default 0.
        assert_eq!(
            lines[4],
            "Data,1,record,timestamp,\"103\",s,distance,\"50\",m,power,\"100\",watts,\
             total_cycles,\"5\",cycles,speed,\"2.5\",m/s,cadence,\"24.5\",spm,\
             heart_rate,\"0\",bpm,"
        );
    }

    #[test]
    fn test_tick_without_session_is_noop() {
        let mut rec = recorder();
        rec.on_update(Metric::TotalCycles, 5.0);
        rec.tick_at(103).unwrap();
        assert_eq!(rec.rows_recorded(), 0);
    }

    #[test]
    fn test_start_resets_cached_values() {
        let sink = SharedSink::new();
        let mut rec = recorder();
        rec.on_update(Metric::Distance, 999.0);

        rec.start_with_sink(Box::new(sink.clone()), 100).unwrap();
        rec.on_update(Metric::TotalCycles, 1.0);
        rec.tick_at(101).unwrap();

        let last = sink.lines().pop().unwrap();
        assert!(last.contains("distance,\"0\",m"));
    }

    #[test]
    fn test_cache_is_last_value_wins() {
        let sink = SharedSink::new();
        let mut rec = started(&sink, 100);

        rec.on_update(Metric::TotalCycles, 1.0);
        rec.on_update(Metric::TotalCycles, 2.0);
        rec.tick_at(101).unwrap();

        let last = sink.lines().pop().unwrap();
        assert!(last.contains("total_cycles,\"2\",cycles"));
    }

    #[test]
    fn test_stop_writes_summary_rows() {
        let sink = SharedSink::new();
        let mut rec = started(&sink, 100);
        rec.on_update(Metric::TotalCycles, 42.0);
        rec.on_update(Metric::Distance, 500.0);

        rec.stop_at(160).unwrap();

        let lines = sink.lines();
        assert_eq!(
            lines[4],
            "Definition,2,session,timestamp,1,,start_time,1,,total_elapsed_time,1,,\
             total_distance,1,,total_cycles,1,,sport,1,,sub_sport,1,,"
        );
        assert_eq!(
            lines[5],
            "Data,2,session,timestamp,\"160\",s,start_time,\"100\",s,\
             total_elapsed_time,\"60\",s,total_distance,\"500\",m,\
             total_cycles,\"42\",cycles,sport,\"15\",,sub_sport,\"14\",,"
        );
        assert_eq!(
            lines[6],
            "Definition,3,activity,timestamp,1,,num_sessions,1,,type,1,,"
        );
        assert_eq!(
            lines[7],
            "Data,3,activity,timestamp,\"160\",s,num_sessions,\"1\",,type,\"0\",,"
        );
        assert!(!rec.is_recording());
    }

    #[test]
    fn test_stop_is_idempotent() {
        let sink = SharedSink::new();
        let mut rec = started(&sink, 100);
        rec.stop_at(110).unwrap();
        let len = sink.lines().len();

        rec.stop_at(120).unwrap();
        assert_eq!(sink.lines().len(), len);
    }

    #[test]
    fn test_no_rows_after_stop() {
        let sink = SharedSink::new();
        let mut rec = started(&sink, 100);
        rec.on_update(Metric::TotalCycles, 5.0);
        rec.stop_at(110).unwrap();

        rec.tick_at(111).unwrap();
        assert_eq!(sink.lines().len(), 8);
    }

    #[test]
    fn test_start_creates_file_in_output_dir() {
        let dir = tempfile::tempdir().unwrap();
        let bus = Arc::new(MeasurementBus::new());
        let mut rec = ActivityRecorder::new(&[Device::s4()], bus, dir.path());

        rec.start().unwrap();

        let names: Vec<String> = fs::read_dir(dir.path())
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
            .collect();
        assert_eq!(names.len(), 1);
        assert!(names[0].starts_with("activity_"));
        assert!(names[0].ends_with(".csv"));
    }

    #[tokio::test]
    async fn test_bus_updates_are_forwarded() {
        let bus = Arc::new(MeasurementBus::new());
        let devices = vec![Device::s4(), Device::heart_rate_monitor()];
        let mut rec = ActivityRecorder::new(&devices, bus.clone(), "./activities");
        let mut updates = rec.subscribe_updates();

        bus.publish("s4/power", 150.0);
        bus.publish("hrm/heart_rate", 131.0);

        for _ in 0..2 {
            let update = updates.recv().await.unwrap();
            rec.on_update(update.metric, update.value);
        }

        let mut seen = std::collections::BTreeMap::new();
        seen.insert(Metric::Power, 150.0);
        seen.insert(Metric::HeartRate, 131.0);
        for (metric, value) in seen {
            assert_eq!(rec.cache[metric], value);
        }
    }

    #[test]
    fn test_device_epoch_offset() {
        assert_eq!(DEVICE_EPOCH_OFFSET, 631_065_600);
        let now = device_epoch_now();
        let unix = Utc::now().timestamp();
        assert!((unix - DEVICE_EPOCH_OFFSET - now).abs() <= 1);
    }
}
