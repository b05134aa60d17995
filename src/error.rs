//! # Error Types
//!
//! Custom error types for Rowlog using `thiserror`.

use thiserror::Error;

/// Main error type for Rowlog
#[derive(Debug, Error)]
pub enum RowlogError {
    /// No serial device matched the expected USB identity. Fatal at startup.
    #[error("no serial device found matching {vendor_id:04x}:{product_id:04x}")]
    DeviceNotFound { vendor_id: u16, product_id: u16 },

    /// Serial port errors
    #[error("serial error: {0}")]
    Serial(String),

    /// Bus subscription errors
    #[error("bus subscription failed: {0}")]
    Subscribe(String),

    /// Configuration errors
    #[error("configuration error: {0}")]
    Config(#[from] toml::de::Error),

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type alias for Rowlog
pub type Result<T> = std::result::Result<T, RowlogError>;
