//! Device configuration.
//!
//! Durations are (de)serialized as integer milliseconds so a config can be
//! loaded from JSON:
//!
//! ```
//! use loupedeck_protocol::DeviceConfig;
//!
//! let config: DeviceConfig =
//!     serde_json::from_str(r#"{"request_timeout": 250, "max_transfer_size": 4096}"#).unwrap();
//! assert_eq!(config.request_timeout.as_millis(), 250);
//! assert_eq!(config.event_capacity, loupedeck_protocol::config::DEFAULT_EVENT_CAPACITY);
//! ```

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{LoupedeckError, Result};

/// Default deadline for a response to a request.
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(5);

/// Default pixel bytes per framebuffer command.
pub const DEFAULT_MAX_TRANSFER_SIZE: usize = 0xFFFF - 64;

/// Default capacity of the engine mailbox.
pub const DEFAULT_MAILBOX_CAPACITY: usize = 256;

/// Default maximum frames queued for writing before backpressure kicks in.
pub const DEFAULT_MAX_PENDING_FRAMES: usize = 1024;

/// Default backpressure timeout.
pub const DEFAULT_BACKPRESSURE_TIMEOUT: Duration = Duration::from_secs(5);

/// Default per-subscriber event queue length.
pub const DEFAULT_EVENT_CAPACITY: usize = 256;

/// Default deadline for the serial upgrade handshake.
pub const DEFAULT_HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(2);

/// Tunables for one device instance.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DeviceConfig {
    /// Deadline for each request's response.
    #[serde(with = "duration_ms")]
    pub request_timeout: Duration,
    /// Maximum pixel bytes in one framebuffer command.
    pub max_transfer_size: usize,
    /// Capacity of the engine mailbox.
    pub mailbox_capacity: usize,
    /// Frames queued for writing before senders wait.
    pub max_pending_frames: usize,
    /// How long a sender waits for the write queue to drain.
    #[serde(with = "duration_ms")]
    pub backpressure_timeout: Duration,
    /// Per-subscriber event queue length.
    pub event_capacity: usize,
    /// Deadline for the serial upgrade handshake.
    #[serde(with = "duration_ms")]
    pub handshake_timeout: Duration,
    /// Write a close frame to the device on `close()`.
    pub send_close_frame: bool,
}

impl Default for DeviceConfig {
    fn default() -> Self {
        Self {
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
            max_transfer_size: DEFAULT_MAX_TRANSFER_SIZE,
            mailbox_capacity: DEFAULT_MAILBOX_CAPACITY,
            max_pending_frames: DEFAULT_MAX_PENDING_FRAMES,
            backpressure_timeout: DEFAULT_BACKPRESSURE_TIMEOUT,
            event_capacity: DEFAULT_EVENT_CAPACITY,
            handshake_timeout: DEFAULT_HANDSHAKE_TIMEOUT,
            send_close_frame: true,
        }
    }
}

impl DeviceConfig {
    /// Parse a config from JSON. Missing fields take their defaults.
    pub fn from_json(json: &str) -> Result<Self> {
        serde_json::from_str(json)
            .map_err(|e| LoupedeckError::Validation(format!("invalid device config: {}", e)))
    }
}

mod duration_ms {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(u64::try_from(value.as_millis()).unwrap_or(u64::MAX))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        u64::deserialize(deserializer).map(Duration::from_millis)
    }
}
