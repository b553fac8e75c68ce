//! Request-level errors shared by every front-end.

use crate::card::CardError;

/// Why a request could not be completed.
#[derive(Debug, thiserror::Error)]
pub enum RelayError {
    /// No attached card matches the request. Expected when no hardware is
    /// plugged in.
    #[error("No compatible device detected{}", serial_suffix(.serial))]
    NoDeviceFound { serial: Option<String> },

    #[error("relay {channel} does not exist, card has {relay_count} relays")]
    ChannelOutOfRange { channel: u32, relay_count: u8 },

    #[error(transparent)]
    Backend(#[from] CardError),

    #[error("malformed request: {0}")]
    MalformedRequest(String),
}

impl RelayError {
    /// Whether this is the "nothing attached" outcome rather than a fault.
    pub fn is_no_device(&self) -> bool {
        matches!(self, RelayError::NoDeviceFound { .. })
    }
}

fn serial_suffix(serial: &Option<String>) -> String {
    match serial {
        Some(s) => format!(" with serial {s}"),
        None => String::new(),
    }
}
