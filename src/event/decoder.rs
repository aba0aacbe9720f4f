//! Decoding of unsolicited frames into input events.
//!
//! Touch records are six bytes (`[_, x u16 BE, y u16 BE, id]`) and a frame
//! may carry several of them. Frames with an unknown command byte are
//! ignored so newer firmware does not break older hosts.

use std::sync::Arc;

use super::{InputEvent, TouchEvent, TouchPoint, TouchTarget};
use crate::model::{ControlKind, ModelSpec, TouchPanel};
use crate::protocol::{commands, Frame};

/// Size of one touch record.
const TOUCH_RECORD_SIZE: usize = 6;

/// Stateful decoder for one device instance.
pub struct EventDecoder {
    spec: Arc<ModelSpec>,
    /// Points currently down, in the order they started.
    active: Vec<(TouchPanel, TouchPoint)>,
}

impl EventDecoder {
    /// Create a decoder for a model.
    pub fn new(spec: Arc<ModelSpec>) -> Self {
        Self {
            spec,
            active: Vec::new(),
        }
    }

    /// Decode a frame, or `None` if it is not a recognized event.
    pub fn decode(&mut self, frame: &Frame) -> Option<InputEvent> {
        match frame.command() {
            commands::BUTTON_PRESS => self.decode_button(frame.payload()),
            commands::KNOB_ROTATE => self.decode_rotate(frame.payload()),
            commands::TOUCH => self.decode_touch(TouchPanel::Main, frame.payload(), false),
            commands::TOUCH_CT => self.decode_touch(TouchPanel::Wheel, frame.payload(), false),
            commands::TOUCH_END => self.decode_touch(TouchPanel::Main, frame.payload(), true),
            commands::TOUCH_END_CT => self.decode_touch(TouchPanel::Wheel, frame.payload(), true),
            other => {
                tracing::debug!("Ignoring unsolicited frame with command {:#04x}", other);
                None
            }
        }
    }

    /// Points currently down.
    pub fn active_touches(&self) -> Vec<TouchPoint> {
        self.active.iter().map(|(_, p)| *p).collect()
    }

    fn decode_button(&self, payload: &[u8]) -> Option<InputEvent> {
        let [encoded, state, ..] = *payload else {
            tracing::warn!("Button frame too short ({} bytes)", payload.len());
            return None;
        };
        let Some(control) = self.spec.control_by_encoded(encoded) else {
            tracing::debug!("Button event for unknown control {:#04x}", encoded);
            return None;
        };

        let pressed = state == 0x00;
        Some(match (control.kind, pressed) {
            (ControlKind::Button, true) => InputEvent::ButtonDown { index: control.index },
            (ControlKind::Button, false) => InputEvent::ButtonUp { index: control.index },
            (ControlKind::Rotary, pressed) => InputEvent::DialPress {
                index: control.index,
                pressed,
            },
        })
    }

    fn decode_rotate(&self, payload: &[u8]) -> Option<InputEvent> {
        let [encoded, delta, ..] = *payload else {
            tracing::warn!("Rotate frame too short ({} bytes)", payload.len());
            return None;
        };
        match self.spec.control_by_encoded(encoded) {
            Some(control) if control.kind == ControlKind::Rotary => Some(InputEvent::DialRotate {
                index: control.index,
                delta: i8::from_ne_bytes([delta]),
            }),
            _ => {
                tracing::debug!("Rotate event for unknown dial {:#04x}", encoded);
                None
            }
        }
    }

    fn decode_touch(
        &mut self,
        panel: TouchPanel,
        payload: &[u8],
        released: bool,
    ) -> Option<InputEvent> {
        if payload.len() < TOUCH_RECORD_SIZE {
            tracing::warn!("Touch frame too short ({} bytes)", payload.len());
            return None;
        }

        let changed: Vec<TouchPoint> = payload
            .chunks_exact(TOUCH_RECORD_SIZE)
            .map(|record| {
                let x = u16::from_be_bytes([record[1], record[2]]);
                let y = u16::from_be_bytes([record[3], record[4]]);
                let target = self
                    .spec
                    .locate_touch(panel, x, y)
                    .map(|(display, _, key)| TouchTarget { display, key });
                TouchPoint {
                    id: record[5],
                    x,
                    y,
                    target,
                }
            })
            .collect();

        if released {
            self.active
                .retain(|(p, point)| !(*p == panel && changed.iter().any(|c| c.id == point.id)));
            return Some(InputEvent::TouchEnd(TouchEvent {
                changed,
                touches: self.active_touches(),
            }));
        }

        let mut started = false;
        for point in &changed {
            match self
                .active
                .iter_mut()
                .find(|(p, existing)| *p == panel && existing.id == point.id)
            {
                Some((_, existing)) => *existing = *point,
                None => {
                    started = true;
                    self.active.push((panel, *point));
                }
            }
        }

        let event = TouchEvent {
            changed,
            touches: self.active_touches(),
        };
        Some(if started {
            InputEvent::TouchStart(event)
        } else {
            InputEvent::TouchMove(event)
        })
    }
}
