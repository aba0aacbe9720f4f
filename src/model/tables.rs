//! Capability tables for the shipped models.

use super::{
    ButtonColorEncoding, ControlDefinition, ControlKind, Correlation, DisplayDefinition, DisplayId,
    DrawAck, KeyGrid, ModelId, ModelSpec, TouchPanel,
};
use crate::image::PixelFormat;
use crate::protocol::{DisplayWireId, FrameFormat};

/// Single framebuffer shared by all strips on newer firmware ('M').
const WIRE_MAIN: DisplayWireId = [0x00, 0x4d];
/// CT centre display ('A').
const WIRE_CENTER: DisplayWireId = [0x00, 0x41];
/// CT left strip ('L').
const WIRE_LEFT: DisplayWireId = [0x00, 0x4c];
/// CT right strip ('R').
const WIRE_RIGHT: DisplayWireId = [0x00, 0x52];
/// CT wheel ('W').
const WIRE_WHEEL: DisplayWireId = [0x00, 0x57];

fn display(
    id: DisplayId,
    wire_id: DisplayWireId,
    (width, height): (u16, u16),
    draw_offset: (u16, u16),
    touch_origin: (u16, u16),
) -> DisplayDefinition {
    DisplayDefinition {
        id,
        wire_id,
        width,
        height,
        draw_offset,
        touch_panel: TouchPanel::Main,
        touch_origin,
        pixel_format: PixelFormat::Rgb565Le,
    }
}

fn rotaries(encoded: &[u8]) -> impl Iterator<Item = ControlDefinition> + '_ {
    encoded.iter().zip(0u8..).map(|(&encoded, index)| ControlDefinition {
        kind: ControlKind::Rotary,
        index,
        encoded,
        has_color: false,
    })
}

fn buttons(
    first_index: u8,
    encoded: impl Iterator<Item = u8>,
    has_color: bool,
) -> impl Iterator<Item = ControlDefinition> {
    encoded.zip(first_index..).map(move |(encoded, index)| ControlDefinition {
        kind: ControlKind::Button,
        index,
        encoded,
        has_color,
    })
}

/// Three strips on one 480x270 framebuffer with a 4x3 key grid in the middle.
fn live_layout() -> (Vec<DisplayDefinition>, KeyGrid) {
    let displays = vec![
        display(DisplayId::Left, WIRE_MAIN, (60, 270), (0, 0), (0, 0)),
        display(DisplayId::Center, WIRE_MAIN, (360, 270), (60, 0), (60, 0)),
        display(DisplayId::Right, WIRE_MAIN, (60, 270), (420, 0), (420, 0)),
    ];
    let keys = KeyGrid {
        display: DisplayId::Center,
        columns: 4,
        rows: 3,
        key_width: 90,
        key_height: 90,
        padding: (0, 0),
        gap: (0, 0),
    };
    (displays, keys)
}

fn live_controls() -> Vec<ControlDefinition> {
    rotaries(&[0x01, 0x02, 0x03, 0x04, 0x05, 0x06])
        .chain(buttons(0, 0x07..=0x0e, true))
        .collect()
}

fn loupedeck_live(id: ModelId) -> ModelSpec {
    let (displays, keys) = live_layout();
    ModelSpec {
        id,
        displays,
        keys,
        controls: live_controls(),
        frame_format: FrameFormat::PLAIN,
        correlation: Correlation::TransactionId,
        draw_ack: DrawAck::Acknowledged,
        button_colors: ButtonColorEncoding::PerButton,
        has_haptics: true,
    }
}

fn loupedeck_live_s() -> ModelSpec {
    ModelSpec {
        id: ModelId::LoupedeckLiveS,
        displays: vec![display(DisplayId::Center, WIRE_MAIN, (480, 270), (0, 0), (0, 0))],
        keys: KeyGrid {
            display: DisplayId::Center,
            columns: 5,
            rows: 3,
            key_width: 90,
            key_height: 90,
            padding: (15, 0),
            gap: (0, 0),
        },
        controls: rotaries(&[0x01, 0x02])
            .chain(buttons(0, 0x07..=0x0a, true))
            .collect(),
        frame_format: FrameFormat::PLAIN,
        correlation: Correlation::TransactionId,
        draw_ack: DrawAck::Acknowledged,
        button_colors: ButtonColorEncoding::PerButton,
        has_haptics: true,
    }
}

fn loupedeck_ct() -> ModelSpec {
    let mut wheel = display(DisplayId::Wheel, WIRE_WHEEL, (240, 240), (0, 0), (0, 0));
    wheel.touch_panel = TouchPanel::Wheel;
    wheel.pixel_format = PixelFormat::Rgb565Be;

    let mut controls = live_controls();
    // Jog wheel reports as the seventh rotary
    controls.extend(rotaries(&[0x00]).map(|c| ControlDefinition { index: 6, ..c }));
    // home, undo, keyboard, enter, save, fn-left, a, c, fn-right, b, d, e
    controls.extend(buttons(8, 0x0f..=0x1a, false));

    ModelSpec {
        id: ModelId::LoupedeckCt,
        displays: vec![
            display(DisplayId::Left, WIRE_LEFT, (60, 270), (0, 0), (0, 0)),
            display(DisplayId::Center, WIRE_CENTER, (360, 270), (0, 0), (60, 0)),
            display(DisplayId::Right, WIRE_RIGHT, (60, 270), (0, 0), (420, 0)),
            wheel,
        ],
        keys: KeyGrid {
            display: DisplayId::Center,
            columns: 4,
            rows: 3,
            key_width: 90,
            key_height: 90,
            padding: (0, 0),
            gap: (0, 0),
        },
        controls,
        frame_format: FrameFormat::PLAIN,
        correlation: Correlation::TransactionId,
        draw_ack: DrawAck::Acknowledged,
        button_colors: ButtonColorEncoding::PerButton,
        has_haptics: true,
    }
}

fn razer_stream_controller_x() -> ModelSpec {
    ModelSpec {
        id: ModelId::RazerStreamControllerX,
        displays: vec![display(DisplayId::Center, WIRE_MAIN, (480, 288), (0, 0), (0, 0))],
        keys: KeyGrid {
            display: DisplayId::Center,
            columns: 5,
            rows: 3,
            key_width: 96,
            key_height: 96,
            padding: (0, 0),
            gap: (0, 0),
        },
        // The LCD keys are plain push buttons without indicators
        controls: buttons(0, 0x1b..=0x29, false).collect(),
        frame_format: FrameFormat::PLAIN,
        correlation: Correlation::TransactionId,
        draw_ack: DrawAck::FireAndForget,
        button_colors: ButtonColorEncoding::PerButton,
        has_haptics: false,
    }
}

pub(super) fn spec_for(model: ModelId) -> ModelSpec {
    match model {
        ModelId::LoupedeckCt => loupedeck_ct(),
        ModelId::LoupedeckLive | ModelId::RazerStreamController => loupedeck_live(model),
        ModelId::LoupedeckLiveS => loupedeck_live_s(),
        ModelId::RazerStreamControllerX => razer_stream_controller_x(),
    }
}
