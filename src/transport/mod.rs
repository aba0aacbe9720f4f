//! Transport module - preparing an already-open byte stream.
//!
//! Opening the serial port or socket is left to the application; anything
//! implementing `AsyncRead + AsyncWrite` can carry the protocol.
//!
//! - Serial links need the [`upgrade`] handshake before framed traffic
//! - WebSocket-style TCP links are framed from the first byte

mod handshake;

pub use handshake::{upgrade, UPGRADE_REQUEST};
