use serde::{Deserialize, Serialize};

use crate::model::ModelId;

/// A device found on the system, as reported by enumeration.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeviceInfo {
    pub model: ModelId,
    /// OS path of the device (serial port or HID path).
    pub path: String,
    pub serial_number: Option<String>,
}

impl DeviceInfo {
    pub fn new(model: ModelId, path: impl Into<String>) -> Self {
        Self {
            model,
            path: path.into(),
            serial_number: None,
        }
    }

    /// Builds the info for a USB device if its ids belong to a known model.
    pub fn from_usb(
        vendor_id: u16,
        product_id: u16,
        path: impl Into<String>,
        serial_number: Option<String>,
    ) -> Option<Self> {
        let model = ModelId::from_usb_ids(vendor_id, product_id)?;
        Some(Self {
            model,
            path: path.into(),
            serial_number,
        })
    }
}
