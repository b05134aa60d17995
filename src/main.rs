//! # Rowlog
//!
//! Log live WaterRower S4 performance data to FIT-convertible activity files.
//!
//! Connects to the monitor over USB serial, republishes every measurement on
//! the in-process bus, and snapshots all known measurements into a
//! row-oriented activity log once per second.

use std::sync::Arc;
use std::time::Instant;

use anyhow::Result;
use tokio::time::{interval, Duration, Interval, MissedTickBehavior};
use tracing::{debug, error, info, warn};

use rowlog::bus::MeasurementBus;
use rowlog::config::Config;
use rowlog::measurement::Device;
use rowlog::recorder::ActivityRecorder;
use rowlog::s4::{Action, S4Driver};
use rowlog::serial::{self, S4Port};

/// Main entry point for Rowlog
///
/// # Control Flow
///
/// 1. **Initialization**
///    - Set up logging with tracing subscriber
///    - Load configuration (optional TOML path as first argument)
///    - Discover and open the monitor's serial port (fatal if absent)
///    - Optionally start a recording session immediately
///
/// 2. **Main Loop**
///    - One `select!` multiplexes serial lines, the distance poll, the
///      snapshot tick, recorder updates, and Ctrl+C; the callbacks interleave
///      but never run concurrently
///
/// 3. **Graceful Shutdown**
///    - Stop the recording session (summary rows, flush, close)
///    - Timers are dropped with the loop
///
/// # Errors
///
/// Returns error if no monitor is attached, the configuration is invalid, or
/// the session file cannot be created.
#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into()),
        )
        .init();

    info!("Rowlog v{} starting...", env!("CARGO_PKG_VERSION"));

    let config = match std::env::args().nth(1) {
        Some(path) => Config::load(&path)?,
        None => Config::default(),
    };

    // Device discovery is fatal when nothing matches: no retry loop.
    let (mut port, mut reader) = serial::open(&config.serial)?;
    info!("S4 serial port opened at: {}", port.device_path());

    let bus = Arc::new(MeasurementBus::new());
    let devices = vec![Device::s4(), Device::heart_rate_monitor()];
    let mut recorder = ActivityRecorder::new(&devices, bus.clone(), &config.recording.output_dir);
    let mut updates = recorder.subscribe_updates();

    if config.recording.autostart {
        recorder.start()?;
    }

    let mut distance_poll = interval(Duration::from_millis(config.serial.distance_poll_ms));
    distance_poll.set_missed_tick_behavior(MissedTickBehavior::Delay);
    let mut poll_armed = false;

    let mut record_tick = interval(Duration::from_millis(config.recording.tick_interval_ms));
    record_tick.set_missed_tick_behavior(MissedTickBehavior::Delay);

    let mut driver = S4Driver::new(bus.clone());
    for action in driver.on_connect() {
        apply_action(action, &mut port, &mut distance_poll, &mut poll_armed).await;
    }

    info!("Press Ctrl+C to exit");

    // Main event loop
    loop {
        tokio::select! {
            line = reader.next_line() => {
                match line {
                    Ok(Some(line)) => {
                        for action in driver.on_line(&line, Instant::now()) {
                            apply_action(action, &mut port, &mut distance_poll, &mut poll_armed).await;
                        }
                    }
                    Ok(None) => {
                        warn!("serial connection closed");
                        break;
                    }
                    Err(e) => {
                        error!("serial read failed: {}", e);
                        break;
                    }
                }
            }

            _ = distance_poll.tick(), if poll_armed => {
                for action in driver.on_poll_tick() {
                    apply_action(action, &mut port, &mut distance_poll, &mut poll_armed).await;
                }
            }

            _ = record_tick.tick() => {
                // A failed row write degrades the session, it does not end it.
                if let Err(e) = recorder.on_tick() {
                    warn!("failed to write record row: {}", e);
                }
            }

            Some(update) = updates.recv() => {
                recorder.on_update(update.metric, update.value);
            }

            // Handle Ctrl+C for graceful shutdown
            _ = tokio::signal::ctrl_c() => {
                info!("Received Ctrl+C, shutting down...");
                break;
            }
        }
    }

    recorder.stop()?;
    Ok(())
}

/// Apply one driver action to the serial port and timers.
async fn apply_action(
    action: Action,
    port: &mut S4Port,
    distance_poll: &mut Interval,
    poll_armed: &mut bool,
) {
    match action {
        Action::Send(command) => {
            if let Err(e) = port.send_command(command).await {
                warn!("failed to send {:?}: {}", command, e);
            }
        }
        Action::StartDistancePoll => {
            distance_poll.reset();
            *poll_armed = true;
            debug!("distance poll armed");
        }
    }
}
