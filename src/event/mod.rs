//! Event module - input events decoded from unsolicited frames.
//!
//! - [`EventDecoder`] turns frames into [`InputEvent`]s and tracks active touches
//! - [`EventStream`] is one subscriber's queue of [`DeviceEvent`]s

mod decoder;
mod listeners;

use crate::error::LoupedeckError;
use crate::model::DisplayId;

pub use decoder::EventDecoder;
pub use listeners::EventStream;
pub(crate) use listeners::ListenerRegistry;

/// What a touch landed on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TouchTarget {
    pub display: DisplayId,
    /// Key under the touch, if it is inside the key grid.
    pub key: Option<u8>,
}

/// One finger on a touch panel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TouchPoint {
    /// Device-assigned id, stable from touch start until release.
    pub id: u8,
    /// Panel coordinates.
    pub x: u16,
    pub y: u16,
    /// `None` when the point is outside every known display.
    pub target: Option<TouchTarget>,
}

/// Payload of touch events.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct TouchEvent {
    /// Points reported by this frame.
    pub changed: Vec<TouchPoint>,
    /// Every point still down after this frame.
    pub touches: Vec<TouchPoint>,
}

/// A decoded input event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InputEvent {
    ButtonDown { index: u8 },
    ButtonUp { index: u8 },
    DialPress { index: u8, pressed: bool },
    DialRotate { index: u8, delta: i8 },
    TouchStart(TouchEvent),
    TouchMove(TouchEvent),
    TouchEnd(TouchEvent),
}

/// Notifications delivered to subscribers.
#[derive(Debug, Clone)]
pub enum DeviceEvent {
    /// The protocol engine is running on the transport.
    Connected,
    /// User input.
    Input(InputEvent),
    /// The engine detached. `error` is set when the transport failed.
    Disconnected { error: Option<LoupedeckError> },
}
