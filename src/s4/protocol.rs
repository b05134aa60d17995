//! # S4 Protocol Constants and Decoding
//!
//! Token vocabulary and field decoding for the WaterRower S4 ASCII protocol.
//!
//! Commands are short ASCII strings; memory-read responses (`IDD...`) carry a
//! 4-hex-digit value at a fixed character offset after the 3-character memory
//! address.

/// Handshake command, sent once after the port opens
pub const CMD_HANDSHAKE: &str = "USB";

/// Firmware version query
pub const CMD_FIRMWARE_VERSION: &str = "IV?";

/// Memory read: instantaneous power (watts)
pub const CMD_READ_POWER: &str = "IRD088";

/// Memory read: total stroke count
pub const CMD_READ_STROKE_COUNT: &str = "IRD140";

/// Memory read: total distance (meters)
pub const CMD_READ_DISTANCE: &str = "IRD057";

/// Memory read: instantaneous speed (cm/s)
pub const CMD_READ_PACE: &str = "IRD14A";

/// Handshake acknowledgment from the monitor
pub const RSP_HANDSHAKE: &str = "_WR_";

/// Firmware version response (model 4 monitor)
pub const RSP_FIRMWARE: &str = "IV4";

/// Stroke-start event
pub const RSP_STROKE_START: &str = "SS";

/// Power read response
pub const RSP_POWER: &str = "IDD088";

/// Stroke-count read response
pub const RSP_STROKE_COUNT: &str = "IDD140";

/// Distance read response
pub const RSP_DISTANCE: &str = "IDD057";

/// Pace read response
pub const RSP_PACE: &str = "IDD14A";

/// Character offset of the hex value field in an `IDD` response
/// (`IDD` + 3 address characters)
pub const HEX_FIELD_OFFSET: usize = 6;

/// Width of the hex value field
pub const HEX_FIELD_LEN: usize = 4;

/// Decode the 4-hex-digit value field of an `IDD` response line.
///
/// A short or non-hex field decodes to 0, never an error: the monitor
/// occasionally emits garbage and a zero sample is the harmless reading.
pub fn decode_hex_field(line: &str) -> u32 {
    line.get(HEX_FIELD_OFFSET..HEX_FIELD_OFFSET + HEX_FIELD_LEN)
        .and_then(|field| u32::from_str_radix(field, 16).ok())
        .unwrap_or(0)
}

/// Parse the firmware version out of an `IV4` response.
///
/// The response carries two 2-digit groups after the model digit, e.g.
/// `IV40210` is firmware `02.10`. Returns `None` if the line is too short.
pub fn parse_firmware(line: &str) -> Option<String> {
    let major = line.get(3..5)?;
    let minor = line.get(5..7)?;
    Some(format!("{}.{}", major, minor))
}
