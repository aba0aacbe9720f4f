//! Error types for the Loupedeck protocol engine.

use thiserror::Error;

/// Main error type for all device operations.
#[derive(Debug, Clone, Error)]
pub enum LoupedeckError {
    /// A caller-supplied argument was rejected before anything was sent.
    #[error("Invalid argument: {0}")]
    Validation(String),

    /// Malformed frame, unexpected response shape, or similar.
    #[error("Protocol error: {0}")]
    Protocol(String),

    /// No response arrived before the transaction deadline.
    #[error(
        "Timed out waiting for response to command {command:#04x} (transaction {transaction_id})"
    )]
    Timeout { command: u8, transaction_id: u8 },

    /// The transaction id wrapped around onto this still-pending request.
    #[error("Transaction {transaction_id} was reassigned before a response arrived")]
    TransactionSuperseded { transaction_id: u8 },

    /// The underlying channel failed or closed. Terminal for the device.
    #[error("Transport error: {0}")]
    Transport(String),

    /// The write queue stayed full past the backpressure timeout.
    #[error("Write queue did not drain in time")]
    Backpressure,

    /// I/O error on a path that talks to the stream directly (handshake).
    #[error("I/O error: {0}")]
    Io(String),

    /// The device was closed while the request was pending.
    #[error("Request cancelled")]
    Cancelled,

    /// The device has already been closed.
    #[error("Device closed")]
    Closed,
}

impl From<std::io::Error> for LoupedeckError {
    fn from(err: std::io::Error) -> Self {
        LoupedeckError::Io(err.to_string())
    }
}

/// Result type alias using LoupedeckError.
pub type Result<T> = std::result::Result<T, LoupedeckError>;
