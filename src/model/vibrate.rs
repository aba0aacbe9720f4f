use serde::{Deserialize, Serialize};

/// Haptic patterns built into the firmware.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
#[repr(u8)]
pub enum VibratePattern {
    Short = 0x01,
    Medium = 0x0a,
    Long = 0x0f,
    Low = 0x31,
    ShortLow = 0x32,
    ShortLower = 0x33,
    Lower = 0x40,
    Lowest = 0x41,
    DescendSlow = 0x46,
    DescendMed = 0x47,
    DescendFast = 0x48,
    AscendSlow = 0x52,
    AscendMed = 0x53,
    AscendFast = 0x58,
    RevSlowest = 0x5e,
    RevSlow = 0x5f,
    RevMed = 0x60,
    RevFast = 0x61,
    RevFaster = 0x62,
    RevFastest = 0x63,
    RiseFall = 0x6a,
    Buzz = 0x70,
    VeryLong = 0x76,
    Rumble5 = 0x77,
    Rumble4 = 0x78,
    Rumble3 = 0x79,
    Rumble2 = 0x7a,
    Rumble1 = 0x7b,
}

impl VibratePattern {
    /// Wire value.
    #[inline]
    pub fn code(self) -> u8 {
        self as u8
    }
}
