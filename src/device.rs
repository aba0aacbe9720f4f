//! Device facade and builder.
//!
//! The [`DeviceBuilder`] collects configuration and early subscribers, then
//! starts the protocol engine on a stream. The [`LoupedeckDevice`] turns
//! high-level operations into commands; it keeps no protocol state of its own.
//!
//! # Example
//!
//! ```ignore
//! use loupedeck_protocol::{LoupedeckDevice, ModelId, RgbColor, DisplayId, Rect};
//!
//! let mut builder = LoupedeckDevice::builder(ModelId::LoupedeckLive)
//!     .request_timeout(std::time::Duration::from_secs(2));
//! let mut events = builder.subscribe();
//! let device = builder.open_serial(port).await?;
//!
//! device.set_brightness(7).await?;
//! device
//!     .draw_solid_colour(
//!         DisplayId::Center,
//!         RgbColor::new(255, 0, 0),
//!         Rect::new(0, 0, 90, 90),
//!         false,
//!     )
//!     .await?;
//!
//! while let Some(event) = events.recv().await {
//!     println!("{:?}", event);
//! }
//! ```

use std::collections::VecDeque;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use bytes::Bytes;
use tokio::io::{AsyncRead, AsyncWrite};

use crate::config::DeviceConfig;
use crate::dispatcher::{self, DispatcherHandle, PendingResponse};
use crate::error::{LoupedeckError, Result};
use crate::event::{EventStream, ListenerRegistry};
use crate::image::{convert, fill, split_regions, PixelBuffer, Rect, RgbColor};
use crate::model::{
    ButtonColorEncoding, DisplayDefinition, DisplayId, DrawAck, ModelId, ModelSpec, VibratePattern,
};
use crate::protocol::{ColorEntry, Command};
use crate::transport::upgrade;

/// Highest accepted brightness level.
pub const MAX_BRIGHTNESS: i32 = 10;

/// Framebuffer chunks outstanding at once during one draw. Kept well below
/// the 255 transaction ids so a large draw never wraps onto itself.
const MAX_CHUNKS_IN_FLIGHT: usize = 128;

/// Colour for one button indicator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ButtonColor {
    /// Button index as listed in the model's control table.
    pub id: u8,
    pub red: u8,
    pub green: u8,
    pub blue: u8,
}

impl ButtonColor {
    pub const fn new(id: u8, red: u8, green: u8, blue: u8) -> Self {
        Self {
            id,
            red,
            green,
            blue,
        }
    }

    pub const fn from_rgb(id: u8, color: RgbColor) -> Self {
        Self::new(id, color.red, color.green, color.blue)
    }
}

/// Builder for configuring and opening a device.
pub struct DeviceBuilder {
    spec: ModelSpec,
    config: DeviceConfig,
    listeners: ListenerRegistry,
}

impl DeviceBuilder {
    /// Create a builder for one of the shipped models.
    pub fn new(model: ModelId) -> Self {
        Self::with_spec(model.spec())
    }

    /// Create a builder for a custom capability table.
    pub fn with_spec(spec: ModelSpec) -> Self {
        let config = DeviceConfig::default();
        Self {
            listeners: ListenerRegistry::new(config.event_capacity),
            spec,
            config,
        }
    }

    /// Replace the whole configuration.
    pub fn config(mut self, config: DeviceConfig) -> Self {
        self.listeners.set_capacity(config.event_capacity);
        self.config = config;
        self
    }

    /// Deadline for each response.
    ///
    /// Default: 5 seconds
    pub fn request_timeout(mut self, timeout: Duration) -> Self {
        self.config.request_timeout = timeout;
        self
    }

    /// Maximum pixel bytes per framebuffer command.
    pub fn max_transfer_size(mut self, size: usize) -> Self {
        self.config.max_transfer_size = size;
        self
    }

    /// Set the maximum pending frames for backpressure.
    ///
    /// Default: 1024
    pub fn max_pending_frames(mut self, limit: usize) -> Self {
        self.config.max_pending_frames = limit;
        self
    }

    /// Set the backpressure timeout.
    ///
    /// Default: 5 seconds
    pub fn backpressure_timeout(mut self, timeout: Duration) -> Self {
        self.config.backpressure_timeout = timeout;
        self
    }

    /// Queue length for subscribers registered after this call.
    pub fn event_capacity(mut self, capacity: usize) -> Self {
        self.config.event_capacity = capacity;
        self.listeners.set_capacity(capacity);
        self
    }

    /// Deadline for the serial upgrade handshake.
    pub fn handshake_timeout(mut self, timeout: Duration) -> Self {
        self.config.handshake_timeout = timeout;
        self
    }

    /// Whether `close()` sends a close frame to the device.
    pub fn send_close_frame(mut self, enabled: bool) -> Self {
        self.config.send_close_frame = enabled;
        self
    }

    /// Subscribe before opening, so the stream also sees `Connected`.
    pub fn subscribe(&mut self) -> EventStream {
        self.listeners.subscribe()
    }

    /// Start the engine on a stream that already carries framed traffic.
    ///
    /// Must be called within a Tokio runtime.
    pub fn open<S>(self, stream: S) -> LoupedeckDevice
    where
        S: AsyncRead + AsyncWrite + Send + 'static,
    {
        self.start(stream, Bytes::new())
    }

    /// Perform the serial upgrade handshake, then start the engine.
    pub async fn open_serial<S>(self, mut stream: S) -> Result<LoupedeckDevice>
    where
        S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
    {
        let leftover = upgrade(&mut stream, self.config.handshake_timeout).await?;
        Ok(self.start(stream, leftover))
    }

    fn start<S>(self, stream: S, leftover: Bytes) -> LoupedeckDevice
    where
        S: AsyncRead + AsyncWrite + Send + 'static,
    {
        let spec = Arc::new(self.spec);
        let listeners = Arc::new(Mutex::new(self.listeners));
        let dispatcher = dispatcher::spawn(
            stream,
            leftover,
            spec.clone(),
            &self.config,
            listeners.clone(),
        );
        tracing::debug!("Opened {}", spec.id);

        LoupedeckDevice {
            spec,
            config: self.config,
            dispatcher,
            listeners,
        }
    }
}

/// An open device.
pub struct LoupedeckDevice {
    spec: Arc<ModelSpec>,
    config: DeviceConfig,
    dispatcher: DispatcherHandle,
    listeners: Arc<Mutex<ListenerRegistry>>,
}

impl LoupedeckDevice {
    /// Create a builder for a shipped model.
    pub fn builder(model: ModelId) -> DeviceBuilder {
        DeviceBuilder::new(model)
    }

    pub fn model(&self) -> ModelId {
        self.spec.id
    }

    pub fn model_name(&self) -> &'static str {
        self.spec.id.name()
    }

    /// Capability table in use.
    pub fn spec(&self) -> &ModelSpec {
        &self.spec
    }

    pub fn config(&self) -> &DeviceConfig {
        &self.config
    }

    /// Register a new event subscriber.
    pub fn subscribe(&self) -> EventStream {
        self.listeners
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .subscribe()
    }

    /// Check if the device has been closed or lost its transport.
    pub fn is_closed(&self) -> bool {
        self.dispatcher.is_closed()
    }

    /// Clear displays and/or button colours to black.
    pub async fn blank_device(&self, displays: bool, buttons: bool) -> Result<()> {
        if displays {
            for display in &self.spec.displays {
                self.draw_solid_colour(display.id, RgbColor::BLACK, display.bounds(), true)
                    .await?;
            }
            // Displays sharing a framebuffer are refreshed once
            let mut refreshed = Vec::with_capacity(self.spec.displays.len());
            for display in &self.spec.displays {
                if !refreshed.contains(&display.wire_id) {
                    refreshed.push(display.wire_id);
                    self.refresh_display(display.id).await?;
                }
            }
        }

        if buttons {
            let colors: Vec<ButtonColor> = self
                .spec
                .colored_buttons()
                .map(|c| ButtonColor::from_rgb(c.index, RgbColor::BLACK))
                .collect();
            self.set_button_color(&colors).await?;
        }
        Ok(())
    }

    /// Paint `buffer` into a display at (`x`, `y`).
    pub async fn draw_buffer(
        &self,
        display: DisplayId,
        buffer: &PixelBuffer<'_>,
        x: u16,
        y: u16,
        skip_refresh: bool,
    ) -> Result<()> {
        let definition = self.display(display)?;
        let rect = Rect::new(x, y, buffer.width(), buffer.height());
        self.check_bounds(definition, rect)?;

        let native = convert(buffer, definition.pixel_format);
        self.write_region(definition, rect, &native).await?;
        self.finish_draw(display, skip_refresh).await
    }

    /// Paint one key. Index 0 is the top-left key, counting row by row.
    ///
    /// A buffer smaller than the key is centred on it.
    pub async fn draw_key_buffer(
        &self,
        index: u8,
        buffer: &PixelBuffer<'_>,
        skip_refresh: bool,
    ) -> Result<()> {
        let (definition, key) = self.spec.key_region(index).ok_or_else(|| {
            LoupedeckError::Validation(format!(
                "key {} out of range, {} has {} keys",
                index,
                self.spec.id,
                self.spec.keys.count()
            ))
        })?;
        if buffer.width() > key.width || buffer.height() > key.height {
            return Err(LoupedeckError::Validation(format!(
                "{}x{} image does not fit a {}x{} key",
                buffer.width(),
                buffer.height(),
                key.width,
                key.height
            )));
        }

        let rect = Rect::new(
            key.x + (key.width - buffer.width()) / 2,
            key.y + (key.height - buffer.height()) / 2,
            buffer.width(),
            buffer.height(),
        );
        let native = convert(buffer, definition.pixel_format);
        self.write_region(definition, rect, &native).await?;
        self.finish_draw(definition.id, skip_refresh).await
    }

    /// Fill a rectangle of a display with one colour.
    pub async fn draw_solid_colour(
        &self,
        display: DisplayId,
        color: RgbColor,
        rect: Rect,
        skip_refresh: bool,
    ) -> Result<()> {
        let definition = self.display(display)?;
        self.check_bounds(definition, rect)?;

        let native = fill(color, definition.pixel_format, rect.area());
        self.write_region(definition, rect, &native).await?;
        self.finish_draw(display, skip_refresh).await
    }

    /// Push pending framebuffer writes of a display to the panel.
    pub async fn refresh_display(&self, display: DisplayId) -> Result<()> {
        let definition = self.display(display)?;
        let command = Command::RefreshDisplay {
            display: definition.wire_id,
        };
        self.dispatcher.request(command, self.draws_acked()).await?;
        Ok(())
    }

    /// Set display brightness, 0 to 10.
    pub async fn set_brightness(&self, value: i32) -> Result<()> {
        let level = u8::try_from(value)
            .ok()
            .filter(|&v| i32::from(v) <= MAX_BRIGHTNESS)
            .ok_or_else(|| {
                LoupedeckError::Validation(format!(
                    "brightness {} outside 0..={}",
                    value, MAX_BRIGHTNESS
                ))
            })?;
        self.dispatcher.request(Command::SetBrightness(level), true).await?;
        Ok(())
    }

    /// Set button indicator colours.
    ///
    /// All ids are checked before anything is sent. Depending on the model
    /// the colours go out as one frame or one frame per button; either way
    /// the call completes once every frame is acknowledged.
    pub async fn set_button_color(&self, colors: &[ButtonColor]) -> Result<()> {
        let entries = colors
            .iter()
            .map(|c| {
                let control = self
                    .spec
                    .button(c.id)
                    .filter(|b| b.has_color)
                    .ok_or_else(|| {
                        LoupedeckError::Validation(format!(
                            "button {} has no colour indicator",
                            c.id
                        ))
                    })?;
                Ok(ColorEntry {
                    control: control.encoded,
                    red: c.red,
                    green: c.green,
                    blue: c.blue,
                })
            })
            .collect::<Result<Vec<_>>>()?;

        if entries.is_empty() {
            return Ok(());
        }

        match self.spec.button_colors {
            ButtonColorEncoding::Batched => {
                self.dispatcher.request(Command::SetColor(entries), true).await?;
            }
            ButtonColorEncoding::PerButton => {
                let mut pending = Vec::with_capacity(entries.len());
                for entry in entries {
                    pending.push(self.dispatcher.send(Command::SetColor(vec![entry]), true).await?);
                }
                wait_all(pending).await?;
            }
        }
        Ok(())
    }

    /// Play a haptic pattern.
    pub async fn vibrate(&self, pattern: VibratePattern) -> Result<()> {
        if !self.spec.has_haptics {
            return Err(LoupedeckError::Validation(format!(
                "{} has no vibration motor",
                self.spec.id
            )));
        }
        self.dispatcher.request(Command::Vibrate(pattern.code()), true).await?;
        Ok(())
    }

    /// Firmware version as `major.minor.patch`.
    pub async fn get_firmware_version(&self) -> Result<String> {
        let response = self.dispatcher.request(Command::GetFirmwareVersion, true).await?;
        match response.payload() {
            [major, minor, patch, ..] => Ok(format!("{}.{}.{}", major, minor, patch)),
            other => Err(LoupedeckError::Protocol(format!(
                "version response has {} bytes, expected 3",
                other.len()
            ))),
        }
    }

    /// Serial number reported by the firmware.
    pub async fn get_serial_number(&self) -> Result<String> {
        let response = self.dispatcher.request(Command::GetSerial, true).await?;
        Ok(String::from_utf8_lossy(response.payload())
            .trim_matches(|c: char| c.is_whitespace() || c == '\0')
            .to_string())
    }

    /// Cancel pending requests and detach from the transport.
    ///
    /// Safe to call more than once.
    pub async fn close(&self) {
        self.dispatcher.close().await;
    }

    fn display(&self, id: DisplayId) -> Result<&DisplayDefinition> {
        self.spec.display(id).ok_or_else(|| {
            LoupedeckError::Validation(format!("{} has no {:?} display", self.spec.id, id))
        })
    }

    fn check_bounds(&self, definition: &DisplayDefinition, rect: Rect) -> Result<()> {
        if rect.fits_within(definition.width, definition.height) {
            Ok(())
        } else {
            Err(LoupedeckError::Validation(format!(
                "{}x{} at ({}, {}) exceeds the {}x{} {:?} display",
                rect.width,
                rect.height,
                rect.x,
                rect.y,
                definition.width,
                definition.height,
                definition.id
            )))
        }
    }

    fn draws_acked(&self) -> bool {
        self.spec.draw_ack == DrawAck::Acknowledged
    }

    /// Send `native` as one framebuffer command per chunk, then wait for all.
    ///
    /// At most [`MAX_CHUNKS_IN_FLIGHT`] chunks are unacknowledged at a time.
    async fn write_region(
        &self,
        definition: &DisplayDefinition,
        rect: Rect,
        native: &[u8],
    ) -> Result<()> {
        let bytes_per_pixel = definition.pixel_format.bytes_per_pixel();
        let chunks = split_regions(native, rect, bytes_per_pixel, self.config.max_transfer_size)?;
        let (offset_x, offset_y) = definition.draw_offset;

        let mut in_flight = VecDeque::with_capacity(chunks.len().min(MAX_CHUNKS_IN_FLIGHT));
        for chunk in chunks {
            if in_flight.len() >= MAX_CHUNKS_IN_FLIGHT {
                if let Some(oldest) = in_flight.pop_front() {
                    if let Err(e) = oldest.await {
                        let _ = wait_all(in_flight).await;
                        return Err(e);
                    }
                }
            }

            let x = chunk.region.x.checked_add(offset_x);
            let y = chunk.region.y.checked_add(offset_y);
            let (Some(x), Some(y)) = (x, y) else {
                return Err(LoupedeckError::Validation(
                    "draw offset overflows framebuffer coordinates".into(),
                ));
            };
            let command = Command::WriteFramebuffer {
                display: definition.wire_id,
                x,
                y,
                width: chunk.region.width,
                height: chunk.region.height,
                pixels: Bytes::copy_from_slice(chunk.bytes),
            };
            in_flight.push_back(self.dispatcher.send(command, self.draws_acked()).await?);
        }
        wait_all(in_flight).await
    }

    async fn finish_draw(&self, display: DisplayId, skip_refresh: bool) -> Result<()> {
        if skip_refresh {
            Ok(())
        } else {
            self.refresh_display(display).await
        }
    }
}

/// Wait for every response, returning the first error after all settle.
async fn wait_all(pending: impl IntoIterator<Item = PendingResponse>) -> Result<()> {
    let mut first_error = None;
    for response in pending {
        if let Err(e) = response.await {
            first_error.get_or_insert(e);
        }
    }
    first_error.map_or(Ok(()), Err)
}
