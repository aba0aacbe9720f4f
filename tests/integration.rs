//! Integration tests for loupedeck-protocol.
//!
//! A full device runs against the mock firmware in `common` over an
//! in-memory duplex link.

mod common;

use std::time::Duration;

use common::{
    count, framebuffer_parts, next_disconnect, next_input, open_model, open_spec, open_with,
    FirmwareOptions,
};
use loupedeck_protocol::model::{ButtonColorEncoding, DisplayId};
use loupedeck_protocol::protocol::{commands, Frame, CLOSE_FRAME};
use loupedeck_protocol::{
    ButtonColor, DeviceEvent, InputEvent, LoupedeckDevice, LoupedeckError, ModelId, PixelBuffer,
    PixelFormat, Rect, RgbColor, VibratePattern,
};

fn touch_record(x: u16, y: u16, id: u8) -> Vec<u8> {
    let mut record = vec![0x00];
    record.extend_from_slice(&x.to_be_bytes());
    record.extend_from_slice(&y.to_be_bytes());
    record.push(id);
    record
}

/// Identity queries resolve with strings.
#[tokio::test]
async fn test_identity_queries() {
    let (device, _firmware) = open_model(ModelId::LoupedeckLive);

    assert_eq!(device.get_firmware_version().await.unwrap(), "0.2.26");
    assert_eq!(device.get_serial_number().await.unwrap(), "LDD2101014000123");
    assert_eq!(device.model_name(), "Loupedeck Live");
}

/// Two key draws with refresh skipped and one refresh produce exactly two
/// framebuffer groups and one refresh frame.
#[tokio::test]
async fn test_batched_key_draws_single_refresh() {
    let (device, mut firmware) = open_model(ModelId::LoupedeckLive);

    let pixels = vec![0x80u8; 64 * 64 * 3];
    let buffer = PixelBuffer::new(&pixels, 64, 64, PixelFormat::Rgb).unwrap();

    device.draw_key_buffer(0, &buffer, true).await.unwrap();
    device.draw_key_buffer(0, &buffer, true).await.unwrap();
    device.refresh_display(DisplayId::Center).await.unwrap();

    let frames = firmware.take_frames();
    assert_eq!(count(&frames, commands::FRAMEBUFF), 2);
    assert_eq!(count(&frames, commands::DRAW), 1);
    assert_eq!(frames.last().unwrap().command(), commands::DRAW);

    // Key 0 starts at the centre display's offset; the 64px image is centred on the 90px key
    let (display, x, y, width, height, data) = framebuffer_parts(&frames[0]);
    assert_eq!(display, [0x00, 0x4d]);
    assert_eq!((x, y, width, height), (60 + 13, 13, 64, 64));
    assert_eq!(data.len(), 64 * 64 * 2);
}

/// Draws larger than the transfer size are split into self-contained
/// sub-rectangles.
#[tokio::test]
async fn test_large_draw_is_chunked() {
    let builder = LoupedeckDevice::builder(ModelId::LoupedeckLive).max_transfer_size(1024);
    let (device, mut firmware) = open_with(builder, FirmwareOptions::default());

    let pixels: Vec<u8> = (0..64 * 64 * 4).map(|i| i as u8).collect();
    let buffer = PixelBuffer::new(&pixels, 64, 64, PixelFormat::Rgba).unwrap();
    device.draw_buffer(DisplayId::Center, &buffer, 10, 20, false).await.unwrap();

    let frames = firmware.take_frames();
    let draws: Vec<&Frame> = frames.iter().filter(|f| f.command() == commands::FRAMEBUFF).collect();
    assert_eq!(draws.len(), 8);
    assert_eq!(count(&frames, commands::DRAW), 1);

    let mut next_row = 20;
    let mut total = 0;
    for frame in draws {
        let (_, x, y, width, height, data) = framebuffer_parts(frame);
        assert_eq!(x, 60 + 10);
        assert_eq!(y, next_row);
        assert_eq!(width, 64);
        assert!(data.len() <= 1024);
        assert_eq!(data.len(), usize::from(width) * usize::from(height) * 2);
        next_row += height;
        total += data.len();
    }
    assert_eq!(next_row, 20 + 64);
    assert_eq!(total, 64 * 64 * 2);
}

/// A draw needing more chunks than there are transaction ids completes,
/// even when the firmware acknowledges in bursts.
#[tokio::test]
async fn test_draw_with_more_chunks_than_transaction_ids() {
    let builder = LoupedeckDevice::builder(ModelId::LoupedeckLive).max_transfer_size(720);
    let options = FirmwareOptions {
        hold_replies: 256,
        ..FirmwareOptions::default()
    };
    let (device, mut firmware) = open_with(builder, options);

    // One 360px row of RGB565 per chunk
    device
        .draw_solid_colour(
            DisplayId::Center,
            RgbColor::new(0, 0, 255),
            Rect::new(0, 0, 360, 270),
            false,
        )
        .await
        .unwrap();

    let frames = firmware.take_frames();
    assert_eq!(count(&frames, commands::FRAMEBUFF), 270);
    assert_eq!(count(&frames, commands::DRAW), 1);
}

/// Solid fills encode one colour across the whole region.
#[tokio::test]
async fn test_solid_colour_fill() {
    let (device, mut firmware) = open_model(ModelId::LoupedeckLive);

    device
        .draw_solid_colour(
            DisplayId::Left,
            RgbColor::new(255, 0, 0),
            Rect::new(0, 0, 60, 10),
            false,
        )
        .await
        .unwrap();

    let frames = firmware.take_frames();
    let (_, x, y, width, height, data) = framebuffer_parts(&frames[0]);
    assert_eq!((x, y, width, height), (0, 0, 60, 10));
    assert!(data.chunks(2).all(|px| px == [0x00, 0xF8]));
    assert_eq!(frames[1].command(), commands::DRAW);
    assert_eq!(frames[1].payload(), &[0x00, 0x4d]);
}

#[tokio::test]
async fn test_draw_out_of_bounds_is_rejected() {
    let (device, mut firmware) = open_model(ModelId::LoupedeckLive);

    let result = device
        .draw_solid_colour(DisplayId::Left, RgbColor::BLACK, Rect::new(30, 0, 60, 10), false)
        .await;
    assert!(matches!(result, Err(LoupedeckError::Validation(_))));

    let result = device
        .draw_solid_colour(DisplayId::Wheel, RgbColor::BLACK, Rect::new(0, 0, 1, 1), false)
        .await;
    assert!(matches!(result, Err(LoupedeckError::Validation(_))));

    let pixels = vec![0u8; 100 * 100 * 3];
    let big = PixelBuffer::new(&pixels, 100, 100, PixelFormat::Rgb).unwrap();
    let result = device.draw_key_buffer(0, &big, false).await;
    assert!(matches!(result, Err(LoupedeckError::Validation(_))));
    let result = device.draw_key_buffer(12, &big, false).await;
    assert!(matches!(result, Err(LoupedeckError::Validation(_))));

    device.get_serial_number().await.unwrap();
    let frames = firmware.take_frames();
    assert_eq!(frames.len(), 1);
    assert_eq!(frames[0].command(), commands::SERIAL);
}

/// Out-of-range brightness never reaches the wire.
#[tokio::test]
async fn test_brightness_validation() {
    let (device, mut firmware) = open_model(ModelId::LoupedeckLive);

    assert!(matches!(device.set_brightness(11).await, Err(LoupedeckError::Validation(_))));
    assert!(matches!(device.set_brightness(-1).await, Err(LoupedeckError::Validation(_))));

    device.set_brightness(7).await.unwrap();
    let frames = firmware.take_frames();
    assert_eq!(frames.len(), 1);
    assert_eq!(frames[0].command(), commands::SET_BRIGHTNESS);
    assert_eq!(frames[0].payload(), &[7]);
}

#[tokio::test]
async fn test_button_colors_one_frame_per_button() {
    let (device, mut firmware) = open_model(ModelId::LoupedeckLive);

    device
        .set_button_color(&[ButtonColor::new(0, 255, 0, 0), ButtonColor::new(3, 0, 0, 255)])
        .await
        .unwrap();

    let frames = firmware.take_frames();
    assert_eq!(frames.len(), 2);
    assert_eq!(frames[0].payload(), &[0x07, 255, 0, 0]);
    assert_eq!(frames[1].payload(), &[0x0a, 0, 0, 255]);
    assert_ne!(frames[0].transaction_id(), frames[1].transaction_id());
}

#[tokio::test]
async fn test_button_colors_batched() {
    let mut spec = ModelId::LoupedeckLive.spec();
    spec.button_colors = ButtonColorEncoding::Batched;
    let (device, mut firmware) = open_spec(spec);

    device
        .set_button_color(&[ButtonColor::new(0, 1, 2, 3), ButtonColor::new(1, 4, 5, 6)])
        .await
        .unwrap();

    let frames = firmware.take_frames();
    assert_eq!(frames.len(), 1);
    assert_eq!(frames[0].command(), commands::SET_COLOR);
    assert_eq!(frames[0].payload(), &[0x07, 1, 2, 3, 0x08, 4, 5, 6]);
}

#[tokio::test]
async fn test_button_color_validation() {
    let (device, mut firmware) = open_model(ModelId::LoupedeckCt);

    // Button 8 on the CT is the home button, which has no indicator
    let result = device
        .set_button_color(&[ButtonColor::new(0, 1, 1, 1), ButtonColor::new(8, 1, 1, 1)])
        .await;
    assert!(matches!(result, Err(LoupedeckError::Validation(_))));

    device.set_brightness(3).await.unwrap();
    let frames = firmware.take_frames();
    assert_eq!(frames.len(), 1);
    assert_eq!(frames[0].command(), commands::SET_BRIGHTNESS);
}

#[tokio::test]
async fn test_vibrate() {
    let (device, mut firmware) = open_model(ModelId::LoupedeckLiveS);
    device.vibrate(VibratePattern::AscendFast).await.unwrap();

    let frames = firmware.take_frames();
    assert_eq!(frames[0].command(), commands::SET_VIBRATION);
    assert_eq!(frames[0].payload(), &[0x58]);

    let (razer, _firmware) = open_model(ModelId::RazerStreamControllerX);
    assert!(matches!(
        razer.vibrate(VibratePattern::Short).await,
        Err(LoupedeckError::Validation(_))
    ));
}

/// Blanking a Live clears all three strips, refreshes their shared
/// framebuffer once, and turns every coloured button off.
#[tokio::test]
async fn test_blank_device() {
    let (device, mut firmware) = open_model(ModelId::LoupedeckLive);
    device.blank_device(true, true).await.unwrap();

    let frames = firmware.take_frames();
    assert_eq!(count(&frames, commands::DRAW), 1);
    assert_eq!(count(&frames, commands::SET_COLOR), 8);

    let covered: usize = frames
        .iter()
        .filter(|f| f.command() == commands::FRAMEBUFF)
        .map(|f| {
            let (_, _, _, w, h, data) = framebuffer_parts(f);
            assert!(data.iter().all(|&b| b == 0));
            usize::from(w) * usize::from(h)
        })
        .sum();
    assert_eq!(covered, 480 * 270);
}

#[tokio::test]
async fn test_blank_ct_refreshes_each_display() {
    let (device, mut firmware) = open_model(ModelId::LoupedeckCt);
    device.blank_device(true, false).await.unwrap();

    let frames = firmware.take_frames();
    assert_eq!(count(&frames, commands::DRAW), 4);
    assert_eq!(count(&frames, commands::SET_COLOR), 0);
}

/// The Stream Controller X does not acknowledge draws.
#[tokio::test]
async fn test_fire_and_forget_draws() {
    let options = FirmwareOptions {
        silent: vec![commands::FRAMEBUFF, commands::DRAW],
        ..FirmwareOptions::default()
    };
    let builder = LoupedeckDevice::builder(ModelId::RazerStreamControllerX)
        .request_timeout(Duration::from_millis(50));
    let (device, mut firmware) = open_with(builder, options);

    let pixels = vec![0u8; 96 * 96 * 3];
    let buffer = PixelBuffer::new(&pixels, 96, 96, PixelFormat::Bgr).unwrap();
    device.draw_key_buffer(14, &buffer, false).await.unwrap();

    let draw = firmware.next_frame().await;
    let (_, x, y, _, _, _) = framebuffer_parts(&draw);
    assert_eq!((x, y), (4 * 96, 2 * 96));
    assert_eq!(firmware.next_frame().await.command(), commands::DRAW);
}

#[tokio::test(start_paused = true)]
async fn test_unanswered_request_times_out() {
    let options = FirmwareOptions {
        silent: vec![commands::SERIAL],
        ..FirmwareOptions::default()
    };
    let builder = LoupedeckDevice::builder(ModelId::LoupedeckLive)
        .request_timeout(Duration::from_millis(300));
    let (device, _firmware) = open_with(builder, options);

    let result = device.get_serial_number().await;
    assert!(matches!(result, Err(LoupedeckError::Timeout { command: commands::SERIAL, .. })));

    // Other requests are unaffected
    assert_eq!(device.get_firmware_version().await.unwrap(), "0.2.26");
}

#[tokio::test]
async fn test_concurrent_requests() {
    let (device, _firmware) = open_model(ModelId::LoupedeckLive);

    let (version, serial, brightness) = tokio::join!(
        device.get_firmware_version(),
        device.get_serial_number(),
        device.set_brightness(5),
    );
    assert_eq!(version.unwrap(), "0.2.26");
    assert_eq!(serial.unwrap(), "LDD2101014000123");
    brightness.unwrap();
}

#[tokio::test]
async fn test_input_events() {
    let (device, firmware) = open_model(ModelId::LoupedeckLive);
    let mut events = device.subscribe();

    firmware.send_event(commands::BUTTON_PRESS, &[0x09, 0x00]);
    firmware.send_event(commands::KNOB_ROTATE, &[0x03, 0xFE]);
    firmware.send_event(commands::BUTTON_PRESS, &[0x03, 0x01]);

    assert_eq!(next_input(&mut events).await, InputEvent::ButtonDown { index: 2 });
    assert_eq!(
        next_input(&mut events).await,
        InputEvent::DialRotate { index: 2, delta: -2 }
    );
    assert_eq!(
        next_input(&mut events).await,
        InputEvent::DialPress { index: 2, pressed: false }
    );
}

/// A touch frame with two coordinate sets yields one event with two points.
#[tokio::test]
async fn test_two_finger_touch() {
    let (device, firmware) = open_model(ModelId::LoupedeckLive);
    let mut events = device.subscribe();

    let mut payload = touch_record(100, 40, 1);
    payload.extend(touch_record(400, 200, 2));
    firmware.send_event(commands::TOUCH, &payload);
    firmware.send_event(commands::TOUCH_END, &touch_record(100, 40, 1));

    let InputEvent::TouchStart(start) = next_input(&mut events).await else {
        panic!("expected touch start");
    };
    assert_eq!(start.changed.len(), 2);
    assert_eq!(start.changed[0].id, 1);
    assert_eq!(start.changed[1].id, 2);
    assert_eq!(start.changed[0].target.unwrap().key, Some(0));
    assert_eq!(start.changed[1].target.unwrap().display, DisplayId::Center);

    let InputEvent::TouchEnd(end) = next_input(&mut events).await else {
        panic!("expected touch end");
    };
    assert_eq!(end.changed[0].id, 1);
    assert_eq!(end.touches.len(), 1);
    assert_eq!(end.touches[0].id, 2);
}

/// Subscribers registered on the builder see `Connected` and are notified
/// in registration order alongside later subscribers.
#[tokio::test]
async fn test_builder_subscribers() {
    let mut builder = LoupedeckDevice::builder(ModelId::LoupedeckLiveS);
    let mut early = builder.subscribe();
    let (device, firmware) = open_with(builder, FirmwareOptions::default());
    let mut late = device.subscribe();

    assert!(matches!(early.recv().await, Some(DeviceEvent::Connected)));

    firmware.send_event(commands::BUTTON_PRESS, &[0x07, 0x00]);
    assert!(matches!(
        early.recv().await,
        Some(DeviceEvent::Input(InputEvent::ButtonDown { index: 0 }))
    ));
    assert_eq!(next_input(&mut late).await, InputEvent::ButtonDown { index: 0 });
}

/// Garbage on the line does not stall later frames.
#[tokio::test]
async fn test_resync_after_garbage() {
    let (device, firmware) = open_model(ModelId::LoupedeckLive);
    let mut events = device.subscribe();

    firmware.send_raw(vec![0x00, 0x13, 0x37, 0xFF]);
    firmware.send_event(commands::BUTTON_PRESS, &[0x07, 0x00]);

    assert_eq!(next_input(&mut events).await, InputEvent::ButtonDown { index: 0 });
    assert_eq!(device.get_firmware_version().await.unwrap(), "0.2.26");
}

#[tokio::test]
async fn test_close_is_idempotent() {
    let options = FirmwareOptions {
        silent: vec![commands::SERIAL],
        ..FirmwareOptions::default()
    };
    let (device, firmware) = open_with(LoupedeckDevice::builder(ModelId::LoupedeckLive), options);
    let mut events = device.subscribe();

    let (serial, ()) = tokio::join!(device.get_serial_number(), async {
        tokio::time::sleep(Duration::from_millis(20)).await;
        device.close().await;
    });
    assert!(matches!(serial, Err(LoupedeckError::Cancelled)));

    device.close().await;
    assert!(device.is_closed());
    assert!(matches!(device.set_brightness(1).await, Err(LoupedeckError::Closed)));
    assert!(next_disconnect(&mut events).await.is_none());
    assert!(events.recv().await.is_none());

    // Subscribing after close yields a stream that has already ended
    let mut late = device.subscribe();
    assert!(late.recv().await.is_none());

    tokio::time::sleep(Duration::from_millis(20)).await;
    assert!(firmware.raw.lock().unwrap().ends_with(&CLOSE_FRAME));
}

#[tokio::test]
async fn test_unplug_fails_pending_requests() {
    let options = FirmwareOptions {
        silent: vec![commands::VERSION],
        ..FirmwareOptions::default()
    };
    let builder = LoupedeckDevice::builder(ModelId::LoupedeckLive);
    let (device, mut firmware) = open_with(builder, options);
    let mut events = device.subscribe();

    let (version, ()) = tokio::join!(device.get_firmware_version(), async {
        firmware.next_frame().await;
        firmware.unplug();
    });
    assert!(matches!(version, Err(LoupedeckError::Transport(_))));

    assert!(matches!(
        next_disconnect(&mut events).await,
        Some(LoupedeckError::Transport(_))
    ));
    assert!(matches!(device.get_serial_number().await, Err(LoupedeckError::Closed)));
}

/// Serial links perform the upgrade handshake; frames that arrive in the
/// same read as the response are not lost.
#[tokio::test]
async fn test_serial_handshake() {
    let options = FirmwareOptions {
        serial_handshake: true,
        after_handshake: vec![Frame::from_parts(commands::BUTTON_PRESS, 0, &[0x08, 0x00])],
        ..FirmwareOptions::default()
    };
    let (host, link) = tokio::io::duplex(64 * 1024);
    let _firmware = common::spawn_firmware(link, options);

    let mut builder = LoupedeckDevice::builder(ModelId::RazerStreamController);
    let mut events = builder.subscribe();
    let device = builder.open_serial(host).await.unwrap();

    assert!(matches!(events.recv().await, Some(DeviceEvent::Connected)));
    assert!(matches!(
        events.recv().await,
        Some(DeviceEvent::Input(InputEvent::ButtonDown { index: 1 }))
    ));
    assert_eq!(device.get_firmware_version().await.unwrap(), "0.2.26");
}
