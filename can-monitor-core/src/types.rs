//! Core types for the CAN monitor
//!
//! This module defines the values that flow from the transport into the
//! aggregation table: frames, driver timestamps and message signatures, plus the
//! error type shared by the whole library.

use std::fmt;

/// Result type for monitor operations
pub type Result<T> = std::result::Result<T, MonitorError>;

/// Highest identifier of a standard (11-bit) frame
pub const MAX_STANDARD_ID: u32 = 0x7FF;

/// Highest identifier of an extended (29-bit) frame
pub const MAX_EXTENDED_ID: u32 = 0x1FFF_FFFF;

/// Maximum payload length of a classic CAN frame
pub const MAX_DATA_LEN: u8 = 8;

/// Driver-relative arrival time of a frame
///
/// Monotonic and relative to the driver start, not wall-clock.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Timestamp {
    /// Milliseconds part
    pub millis: u32,
    /// Microseconds on top of `millis` (0..1000)
    pub micros: u16,
}

impl Timestamp {
    pub fn new(millis: u32, micros: u16) -> Self {
        Self { millis, micros }
    }

    /// Timestamp value in microseconds
    pub fn total_micros(&self) -> u64 {
        u64::from(self.millis) * 1000 + u64::from(self.micros)
    }

    /// Build a timestamp from a total microsecond count
    ///
    /// Saturates at `u32::MAX` milliseconds (about 49.7 days of driver uptime).
    pub fn from_micros(total_micros: u64) -> Self {
        match u32::try_from(total_micros / 1000) {
            Ok(millis) => Self {
                millis,
                micros: (total_micros % 1000) as u16,
            },
            Err(_) => Self {
                millis: u32::MAX,
                micros: 999,
            },
        }
    }
}

/// A received or to-be-sent CAN frame
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Frame {
    /// CAN identifier (11-bit or 29-bit)
    pub id: u32,
    /// True if this is an extended (29-bit) identifier
    pub extended: bool,
    /// True if this is a remote transmission request
    pub remote: bool,
    /// Payload length (0..=8)
    pub len: u8,
    /// Payload bytes, only the first `len` are meaningful
    pub data: [u8; 8],
    /// Driver-relative arrival time
    pub timestamp: Timestamp,
}

impl Frame {
    /// Create a standard data frame from a payload slice (at most 8 bytes are used)
    pub fn standard(id: u32, payload: &[u8]) -> Self {
        Self::data_frame(id, false, payload)
    }

    /// Create an extended data frame from a payload slice (at most 8 bytes are used)
    pub fn extended(id: u32, payload: &[u8]) -> Self {
        Self::data_frame(id, true, payload)
    }

    /// Create a remote transmission request
    pub fn remote(id: u32, extended: bool, len: u8) -> Self {
        Self {
            id,
            extended,
            remote: true,
            len: len.min(MAX_DATA_LEN),
            data: [0; 8],
            timestamp: Timestamp::default(),
        }
    }

    fn data_frame(id: u32, extended: bool, payload: &[u8]) -> Self {
        let len = payload.len().min(MAX_DATA_LEN as usize);
        let mut data = [0u8; 8];
        data[..len].copy_from_slice(&payload[..len]);
        Self {
            id,
            extended,
            remote: false,
            len: len as u8,
            data,
            timestamp: Timestamp::default(),
        }
    }

    /// Builder method: set the arrival timestamp
    pub fn with_timestamp(mut self, timestamp: Timestamp) -> Self {
        self.timestamp = timestamp;
        self
    }

    /// The identity of this frame inside the aggregation table
    pub fn signature(&self) -> Signature {
        Signature {
            id: self.id,
            extended: self.extended,
            remote: self.remote,
        }
    }

    /// Meaningful payload bytes
    pub fn payload(&self) -> &[u8] {
        &self.data[..self.len.min(MAX_DATA_LEN) as usize]
    }

    /// Check identifier and length ranges for this frame's kind
    pub fn validate(&self) -> Result<()> {
        let max_id = if self.extended {
            MAX_EXTENDED_ID
        } else {
            MAX_STANDARD_ID
        };
        if self.id > max_id {
            return Err(MonitorError::InvalidFrame(format!(
                "ID 0x{:X} exceeds maximum 0x{:X} for {} frames",
                self.id,
                max_id,
                if self.extended { "extended" } else { "standard" }
            )));
        }
        if self.len > MAX_DATA_LEN {
            return Err(MonitorError::InvalidFrame(format!(
                "length {} exceeds {} bytes",
                self.len, MAX_DATA_LEN
            )));
        }
        Ok(())
    }
}

/// `(id, extended, remote)`: two frames are the same message iff these match
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Signature {
    pub id: u32,
    pub extended: bool,
    pub remote: bool,
}

impl fmt::Display for Signature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "0x{:X}{}{}",
            self.id,
            if self.extended { "x" } else { "" },
            if self.remote { "/RTR" } else { "" }
        )
    }
}

/// Error reported by the transport collaborator (`Error(code)`)
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("Transport error 0x{code:X}: {message}")]
pub struct TransportError {
    /// Driver status code
    pub code: u32,
    /// Human-readable driver text for the code
    pub message: String,
}

impl TransportError {
    pub fn new(code: u32, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }
}

/// Errors that can occur in the monitor
#[derive(Debug, thiserror::Error)]
pub enum MonitorError {
    #[error(transparent)]
    Transport(#[from] TransportError),

    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("No channel is connected")]
    NotConnected,

    #[error("Operation requires the {expected} strategy, but {active} is active")]
    WrongStrategy {
        expected: &'static str,
        active: &'static str,
    },

    #[error("Invalid frame: {0}")]
    InvalidFrame(String),

    #[error("Background worker panicked: {0}")]
    WorkerPanicked(String),

    #[error("Failed to parse DBC file: {0}")]
    DbcParse(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}
