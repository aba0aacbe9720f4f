//! Light up keys and buttons as they are pressed.
//!
//! Connects to a Loupedeck Live whose serial port is exposed over TCP
//! (for example with `ser2net`), performs the upgrade handshake, and then
//! mirrors input on the device until Ctrl+C.
//!
//! ```text
//! RUST_LOG=debug cargo run --example blink -- 127.0.0.1:2000
//! ```

use loupedeck_protocol::{
    ButtonColor, DeviceEvent, InputEvent, LoupedeckDevice, ModelId, PixelBuffer, PixelFormat,
    RgbColor, VibratePattern,
};
use tokio::net::TcpStream;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

const PALETTE: [RgbColor; 4] = [
    RgbColor::new(255, 0, 0),
    RgbColor::new(0, 255, 0),
    RgbColor::new(0, 0, 255),
    RgbColor::new(255, 255, 0),
];

fn solid_key(color: RgbColor, size: u16) -> Vec<u8> {
    [color.red, color.green, color.blue].repeat(usize::from(size) * usize::from(size))
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "loupedeck_protocol=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let addr = std::env::args()
        .nth(1)
        .unwrap_or_else(|| "127.0.0.1:2000".to_string());
    let stream = TcpStream::connect(&addr).await?;

    let mut builder = LoupedeckDevice::builder(ModelId::LoupedeckLive);
    let mut events = builder.subscribe();
    let device = builder.open_serial(stream).await?;

    tracing::info!(
        "{} serial {} firmware {}",
        device.model_name(),
        device.get_serial_number().await?,
        device.get_firmware_version().await?
    );

    device.set_brightness(7).await?;
    device.blank_device(true, true).await?;

    let key_size = device.spec().keys.key_width;
    let mut step = 0usize;

    loop {
        let event = tokio::select! {
            event = events.recv() => event,
            _ = tokio::signal::ctrl_c() => break,
        };
        let Some(event) = event else { break };

        match event {
            DeviceEvent::Input(InputEvent::ButtonDown { index }) => {
                step += 1;
                let color = PALETTE[step % PALETTE.len()];
                device.set_button_color(&[ButtonColor::from_rgb(index, color)]).await?;
            }
            DeviceEvent::Input(InputEvent::TouchStart(touch)) => {
                for point in &touch.changed {
                    let Some(key) = point.target.and_then(|t| t.key) else {
                        continue;
                    };
                    step += 1;
                    let pixels = solid_key(PALETTE[step % PALETTE.len()], key_size);
                    let buffer = PixelBuffer::new(&pixels, key_size, key_size, PixelFormat::Rgb)?;
                    device.draw_key_buffer(key, &buffer, false).await?;
                }
            }
            DeviceEvent::Input(InputEvent::DialRotate { index, delta }) => {
                tracing::info!("Dial {} turned {}", index, delta);
            }
            DeviceEvent::Input(InputEvent::DialPress { pressed: true, .. }) => {
                device.vibrate(VibratePattern::Short).await?;
            }
            DeviceEvent::Disconnected { error } => {
                tracing::warn!("Device disconnected: {:?}", error);
                break;
            }
            _ => {}
        }
    }

    device.blank_device(true, true).await.ok();
    device.close().await;
    Ok(())
}
