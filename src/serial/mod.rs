//! # Serial Communication Module
//!
//! Handles serial communication with the WaterRower S4 monitor.
//!
//! This module handles:
//! - Discovering the monitor among available ports by its USB vendor and
//!   product identity
//! - Opening the port with 8N1 settings at the configured baud rate
//! - Line-oriented reads and `\r\n`-terminated command writes

use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader, Lines, ReadHalf, WriteHalf};
use tokio_serial::{SerialPortBuilderExt, SerialPortType, SerialStream};
use tracing::{debug, info, warn};

use crate::config::SerialConfig;
use crate::error::{Result, RowlogError};

/// Line-oriented reader over the monitor's response stream
pub type S4Reader = Lines<BufReader<ReadHalf<SerialStream>>>;

/// Write side of the monitor connection.
///
/// The writer is optional so that a send attempted before the connection
/// exists is a logged no-op rather than an error.
pub struct S4Port {
    writer: Option<WriteHalf<SerialStream>>,
    device_path: String,
}

impl std::fmt::Debug for S4Port {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("S4Port")
            .field("device_path", &self.device_path)
            .field("open", &self.writer.is_some())
            .finish()
    }
}

impl S4Port {
    /// A port with no connection behind it; every send is a warned no-op.
    pub fn closed() -> Self {
        Self {
            writer: None,
            device_path: String::new(),
        }
    }

    /// Send one command line (`\r\n`-terminated) to the monitor.
    ///
    /// Sends are fire-and-forget: there is no request/response correlation
    /// beyond the protocol's declared prefixes.
    pub async fn send_command(&mut self, command: &str) -> Result<()> {
        let Some(writer) = self.writer.as_mut() else {
            warn!("serial port not open, dropping command {:?}", command);
            return Ok(());
        };

        writer
            .write_all(command.as_bytes())
            .await
            .map_err(|e| RowlogError::Serial(format!("failed to write command: {}", e)))?;
        writer
            .write_all(b"\r\n")
            .await
            .map_err(|e| RowlogError::Serial(format!("failed to write command: {}", e)))?;
        writer
            .flush()
            .await
            .map_err(|e| RowlogError::Serial(format!("failed to flush serial port: {}", e)))?;

        debug!("sent {:?}", command);
        Ok(())
    }

    /// Path of the opened serial device (e.g. `/dev/ttyACM0`)
    pub fn device_path(&self) -> &str {
        &self.device_path
    }
}

/// Find the monitor's serial device by USB vendor/product identity.
///
/// # Errors
///
/// Returns `RowlogError::DeviceNotFound` if no attached port matches; this is
/// fatal at startup and is not retried.
pub fn discover(config: &SerialConfig) -> Result<String> {
    let ports = tokio_serial::available_ports()
        .map_err(|e| RowlogError::Serial(format!("failed to enumerate serial ports: {}", e)))?;

    for port in ports {
        if let SerialPortType::UsbPort(usb) = &port.port_type {
            debug!(
                "found usb serial {} ({:04x}:{:04x})",
                port.port_name, usb.vid, usb.pid
            );
            if usb.vid == config.vendor_id && usb.pid == config.product_id {
                return Ok(port.port_name);
            }
        }
    }

    Err(RowlogError::DeviceNotFound {
        vendor_id: config.vendor_id,
        product_id: config.product_id,
    })
}

/// Discover and open the monitor connection, returning the write side and a
/// line reader over the read side.
pub fn open(config: &SerialConfig) -> Result<(S4Port, S4Reader)> {
    let path = discover(config)?;

    let stream = tokio_serial::new(&path, config.baud_rate)
        .data_bits(tokio_serial::DataBits::Eight)
        .parity(tokio_serial::Parity::None)
        .stop_bits(tokio_serial::StopBits::One)
        .flow_control(tokio_serial::FlowControl::None)
        .open_native_async()
        .map_err(|e| RowlogError::Serial(format!("failed to open {}: {}", path, e)))?;

    info!("opened S4 monitor at {}", path);

    let (read_half, write_half) = tokio::io::split(stream);
    let port = S4Port {
        writer: Some(write_half),
        device_path: path,
    };
    let reader = BufReader::new(read_half).lines();

    Ok((port, reader))
}
