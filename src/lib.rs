//! # loupedeck-protocol
//!
//! Async protocol engine for Loupedeck Live, Live S, CT and Razer Stream
//! Controller control surfaces.
//!
//! The crate speaks the devices' framed binary protocol over any
//! `AsyncRead + AsyncWrite` stream: a serial port after the upgrade
//! handshake, or a WebSocket-style TCP link.
//!
//! ## Architecture
//!
//! - **Frame Codec** ([`protocol`]): wire framing and reassembly
//! - **Image Transcoder** ([`image`]): pixel conversion and chunking
//! - **Event Decoder** ([`event`]): input events from unsolicited frames
//! - **Command Dispatcher** ([`dispatcher`]): transaction ids, correlation, timeouts
//! - **Device Facade** ([`LoupedeckDevice`]): the public operation set
//!
//! ## Example
//!
//! ```ignore
//! use loupedeck_protocol::{LoupedeckDevice, ModelId, VibratePattern};
//!
//! #[tokio::main]
//! async fn main() -> loupedeck_protocol::Result<()> {
//!     let port = open_serial_port("/dev/ttyACM0");
//!     let device = LoupedeckDevice::builder(ModelId::LoupedeckLive)
//!         .open_serial(port)
//!         .await?;
//!
//!     println!("firmware {}", device.get_firmware_version().await?);
//!     device.vibrate(VibratePattern::Short).await?;
//!     device.close().await;
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod dispatcher;
pub mod error;
pub mod event;
pub mod image;
pub mod info;
pub mod model;
pub mod protocol;
pub mod transport;
pub mod writer;

mod device;

pub use config::DeviceConfig;
pub use device::{ButtonColor, DeviceBuilder, LoupedeckDevice, MAX_BRIGHTNESS};
pub use error::{LoupedeckError, Result};
pub use event::{DeviceEvent, EventStream, InputEvent, TouchEvent, TouchPoint, TouchTarget};
pub use image::{PixelBuffer, PixelFormat, Rect, RgbColor};
pub use info::DeviceInfo;
pub use model::{DisplayId, ModelId, ModelSpec, VibratePattern};
