//! Model module - per-model capability tables.
//!
//! Every supported device is described by a [`ModelSpec`]: its displays, key
//! grid, physical controls, and the protocol quirks the shared engine has to
//! honour. Custom specs can be built for firmware variants not listed here.

mod tables;
mod vibrate;

use serde::{Deserialize, Serialize};

use crate::image::{PixelFormat, Rect};
use crate::protocol::{DisplayWireId, FrameFormat};

pub use vibrate::VibratePattern;

/// Supported device models.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ModelId {
    LoupedeckCt,
    LoupedeckLive,
    LoupedeckLiveS,
    RazerStreamController,
    RazerStreamControllerX,
}

/// Loupedeck USB vendor id.
pub const VENDOR_LOUPEDECK: u16 = 0x2ec2;
/// Razer USB vendor id.
pub const VENDOR_RAZER: u16 = 0x1532;

impl ModelId {
    /// All known models.
    pub const ALL: [ModelId; 5] = [
        ModelId::LoupedeckCt,
        ModelId::LoupedeckLive,
        ModelId::LoupedeckLiveS,
        ModelId::RazerStreamController,
        ModelId::RazerStreamControllerX,
    ];

    /// Descriptive name.
    pub fn name(self) -> &'static str {
        match self {
            ModelId::LoupedeckCt => "Loupedeck CT",
            ModelId::LoupedeckLive => "Loupedeck Live",
            ModelId::LoupedeckLiveS => "Loupedeck Live S",
            ModelId::RazerStreamController => "Razer Stream Controller",
            ModelId::RazerStreamControllerX => "Razer Stream Controller X",
        }
    }

    /// USB vendor and product id.
    pub fn usb_ids(self) -> (u16, u16) {
        match self {
            ModelId::LoupedeckCt => (VENDOR_LOUPEDECK, 0x0003),
            ModelId::LoupedeckLive => (VENDOR_LOUPEDECK, 0x0004),
            ModelId::LoupedeckLiveS => (VENDOR_LOUPEDECK, 0x0006),
            ModelId::RazerStreamController => (VENDOR_RAZER, 0x0d06),
            ModelId::RazerStreamControllerX => (VENDOR_RAZER, 0x0d09),
        }
    }

    /// Identify a model from its USB ids.
    pub fn from_usb_ids(vendor_id: u16, product_id: u16) -> Option<ModelId> {
        Self::ALL
            .into_iter()
            .find(|m| m.usb_ids() == (vendor_id, product_id))
    }

    /// Capability table for this model.
    pub fn spec(self) -> ModelSpec {
        tables::spec_for(self)
    }
}

impl std::fmt::Display for ModelId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// Named display surfaces.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DisplayId {
    Center,
    Left,
    Right,
    Wheel,
}

/// Which touch panel reported a touch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TouchPanel {
    /// Main touchscreen spanning the side strips and centre display.
    Main,
    /// CT jog wheel screen.
    Wheel,
}

/// One display surface.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DisplayDefinition {
    pub id: DisplayId,
    /// Framebuffer id on the wire.
    pub wire_id: DisplayWireId,
    pub width: u16,
    pub height: u16,
    /// Offset of this surface inside its wire framebuffer.
    pub draw_offset: (u16, u16),
    /// Panel reporting touches on this surface.
    pub touch_panel: TouchPanel,
    /// Position of this surface in the panel's touch coordinates.
    pub touch_origin: (u16, u16),
    /// Native pixel encoding.
    pub pixel_format: PixelFormat,
}

impl DisplayDefinition {
    /// Whole-surface rectangle.
    pub fn bounds(&self) -> Rect {
        Rect::new(0, 0, self.width, self.height)
    }

    fn contains_touch(&self, panel: TouchPanel, x: u16, y: u16) -> bool {
        let (ox, oy) = self.touch_origin;
        self.touch_panel == panel
            && x >= ox
            && y >= oy
            && u32::from(x) < u32::from(ox) + u32::from(self.width)
            && u32::from(y) < u32::from(oy) + u32::from(self.height)
    }
}

/// Layout of the LCD keys on one display.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KeyGrid {
    pub display: DisplayId,
    pub columns: u8,
    pub rows: u8,
    pub key_width: u16,
    pub key_height: u16,
    /// Left/top margin before the first key.
    pub padding: (u16, u16),
    /// Horizontal/vertical gap between keys.
    pub gap: (u16, u16),
}

impl KeyGrid {
    /// Number of keys.
    pub fn count(&self) -> u8 {
        self.columns * self.rows
    }

    /// Area of key `index` within its display.
    pub fn key_rect(&self, index: u8) -> Option<Rect> {
        if index >= self.count() {
            return None;
        }
        let col = u16::from(index % self.columns);
        let row = u16::from(index / self.columns);
        Some(Rect::new(
            self.padding.0 + col * (self.key_width + self.gap.0),
            self.padding.1 + row * (self.key_height + self.gap.1),
            self.key_width,
            self.key_height,
        ))
    }

    /// Key under a point in display coordinates, if any.
    pub fn key_at(&self, x: u16, y: u16) -> Option<u8> {
        (0..self.count()).find(|&i| {
            self.key_rect(i).is_some_and(|r| {
                x >= r.x && y >= r.y && x - r.x < r.width && y - r.y < r.height
            })
        })
    }
}

/// Kinds of physical controls.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ControlKind {
    Button,
    Rotary,
}

/// One physical control.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ControlDefinition {
    pub kind: ControlKind,
    /// Caller-facing index within its kind.
    pub index: u8,
    /// Id used on the wire.
    pub encoded: u8,
    /// Whether the control has an RGB indicator.
    pub has_color: bool,
}

/// How responses are matched to requests.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Correlation {
    /// By the transaction id echoed in the response.
    TransactionId,
    /// By command byte, oldest outstanding request first.
    CommandFifo,
}

/// Whether the firmware answers framebuffer and refresh commands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DrawAck {
    Acknowledged,
    FireAndForget,
}

/// How several button colours are sent.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ButtonColorEncoding {
    /// One frame per button.
    PerButton,
    /// All buttons in one frame.
    Batched,
}

/// Everything the engine needs to know about a model.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModelSpec {
    pub id: ModelId,
    pub displays: Vec<DisplayDefinition>,
    pub keys: KeyGrid,
    pub controls: Vec<ControlDefinition>,
    pub frame_format: FrameFormat,
    pub correlation: Correlation,
    pub draw_ack: DrawAck,
    pub button_colors: ButtonColorEncoding,
    pub has_haptics: bool,
}

impl ModelSpec {
    /// Look up a display.
    pub fn display(&self, id: DisplayId) -> Option<&DisplayDefinition> {
        self.displays.iter().find(|d| d.id == id)
    }

    /// Look up a control by its wire id.
    pub fn control_by_encoded(&self, encoded: u8) -> Option<&ControlDefinition> {
        self.controls.iter().find(|c| c.encoded == encoded)
    }

    /// Look up a button by index.
    pub fn button(&self, index: u8) -> Option<&ControlDefinition> {
        self.controls
            .iter()
            .find(|c| c.kind == ControlKind::Button && c.index == index)
    }

    /// Buttons that have a colour indicator.
    pub fn colored_buttons(&self) -> impl Iterator<Item = &ControlDefinition> {
        self.controls
            .iter()
            .filter(|c| c.kind == ControlKind::Button && c.has_color)
    }

    /// Display and area of key `index`.
    pub fn key_region(&self, index: u8) -> Option<(&DisplayDefinition, Rect)> {
        let rect = self.keys.key_rect(index)?;
        let display = self.display(self.keys.display)?;
        Some((display, rect))
    }

    /// Resolve a touch point to a display and key.
    ///
    /// Returns the display, the point in display coordinates, and the key
    /// under it.
    pub fn locate_touch(
        &self,
        panel: TouchPanel,
        x: u16,
        y: u16,
    ) -> Option<(DisplayId, (u16, u16), Option<u8>)> {
        let display = self
            .displays
            .iter()
            .find(|d| d.contains_touch(panel, x, y))?;
        let local = (x - display.touch_origin.0, y - display.touch_origin.1);
        let key = if display.id == self.keys.display {
            self.keys.key_at(local.0, local.1)
        } else {
            None
        };
        Some((display.id, local, key))
    }
}
