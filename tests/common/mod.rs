//! Mock device firmware for integration tests.
//!
//! Decodes host frames with the crate's own codec, records them, and answers
//! requests the way the real firmware does unless told to stay silent.

#![allow(dead_code)]

use std::sync::{Arc, Mutex};
use std::time::Duration;

use loupedeck_protocol::protocol::{
    build_frame, commands, Direction, Frame, FrameBuffer, FrameFormat,
};
use loupedeck_protocol::{
    DeviceBuilder, DeviceEvent, EventStream, InputEvent, LoupedeckDevice, LoupedeckError, ModelId,
    ModelSpec,
};
use tokio::io::{AsyncReadExt, AsyncWriteExt, DuplexStream};
use tokio::sync::mpsc;

pub const FIRMWARE_VERSION: [u8; 3] = [0, 2, 26];
pub const SERIAL_NUMBER: &[u8] = b"LDD2101014000123 \0";

const UPGRADE_RESPONSE: &[u8] = b"HTTP/1.1 101 Switching Protocols\r\n\
Upgrade: websocket\r\n\
Connection: Upgrade\r\n\r\n";

/// How the mock behaves.
#[derive(Debug, Clone, Default)]
pub struct FirmwareOptions {
    /// Commands that are never answered.
    pub silent: Vec<u8>,
    /// Expect the serial upgrade request first.
    pub serial_handshake: bool,
    /// Frames written right after the upgrade response, in the same write.
    pub after_handshake: Vec<Frame>,
    /// Hold replies until this many are queued or the host goes quiet.
    /// Zero answers every request at once.
    pub hold_replies: usize,
}

/// Quiet period after which held replies are flushed.
const QUIET: Duration = Duration::from_millis(10);

pub struct MockFirmware {
    /// Every frame the host sent, in order.
    pub received: mpsc::UnboundedReceiver<Frame>,
    /// Every raw byte the host sent.
    pub raw: Arc<Mutex<Vec<u8>>>,
    inject: mpsc::UnboundedSender<Vec<u8>>,
}

impl MockFirmware {
    /// Send an unsolicited frame to the host.
    pub fn send_event(&self, command: u8, data: &[u8]) {
        let frame = Frame::from_parts(command, 0, data);
        self.inject
            .send(device_bytes(&frame))
            .expect("firmware task stopped");
    }

    /// Write raw bytes to the host.
    pub fn send_raw(&self, bytes: Vec<u8>) {
        self.inject.send(bytes).expect("firmware task stopped");
    }

    /// Frames received so far that have not been taken yet.
    pub fn take_frames(&mut self) -> Vec<Frame> {
        let mut frames = Vec::new();
        while let Ok(frame) = self.received.try_recv() {
            frames.push(frame);
        }
        frames
    }

    /// Wait for the next frame from the host.
    pub async fn next_frame(&mut self) -> Frame {
        self.received.recv().await.expect("firmware task stopped")
    }

    /// Drop the connection, as if the device was unplugged.
    pub fn unplug(&self) {
        let _ = self.inject.send(Vec::new());
    }
}

pub fn device_bytes(frame: &Frame) -> Vec<u8> {
    build_frame(Direction::DeviceToHost, FrameFormat::PLAIN, frame).expect("frame fits")
}

/// Start the firmware task on the device end of a duplex pair.
pub fn spawn_firmware(stream: DuplexStream, options: FirmwareOptions) -> MockFirmware {
    let (frames_tx, received) = mpsc::unbounded_channel();
    let (inject, mut inject_rx) = mpsc::unbounded_channel::<Vec<u8>>();
    let raw = Arc::new(Mutex::new(Vec::new()));
    let raw_log = raw.clone();

    tokio::spawn(async move {
        let mut stream = stream;
        let mut frames = FrameBuffer::new(Direction::HostToDevice, FrameFormat::PLAIN);
        let mut buf = vec![0u8; 64 * 1024];

        if options.serial_handshake {
            let mut request = Vec::new();
            while !request.ends_with(b"\n\n") {
                let n = stream.read(&mut buf).await.unwrap_or(0);
                if n == 0 {
                    return;
                }
                request.extend_from_slice(&buf[..n]);
            }
            let mut reply = UPGRADE_RESPONSE.to_vec();
            for frame in &options.after_handshake {
                reply.extend(device_bytes(frame));
            }
            if stream.write_all(&reply).await.is_err() {
                return;
            }
        }

        let mut held: Vec<u8> = Vec::new();
        let mut held_count = 0;

        loop {
            tokio::select! {
                read = stream.read(&mut buf) => {
                    let n = match read {
                        Ok(0) | Err(_) => return,
                        Ok(n) => n,
                    };
                    raw_log.lock().unwrap().extend_from_slice(&buf[..n]);
                    for frame in frames.feed(&buf[..n]) {
                        let reply = respond(&frame, &options);
                        let _ = frames_tx.send(frame);
                        let Some(reply) = reply else { continue };
                        held.extend(device_bytes(&reply));
                        held_count += 1;
                        if held_count >= options.hold_replies {
                            if stream.write_all(&held).await.is_err() {
                                return;
                            }
                            held.clear();
                            held_count = 0;
                        }
                    }
                }
                bytes = inject_rx.recv() => match bytes {
                    Some(bytes) if !bytes.is_empty() => {
                        if stream.write_all(&bytes).await.is_err() {
                            return;
                        }
                    }
                    _ => return,
                },
                _ = tokio::time::sleep(QUIET), if held_count > 0 => {
                    if stream.write_all(&held).await.is_err() {
                        return;
                    }
                    held.clear();
                    held_count = 0;
                }
            }
        }
    });

    MockFirmware {
        received,
        raw,
        inject,
    }
}

fn respond(frame: &Frame, options: &FirmwareOptions) -> Option<Frame> {
    if options.silent.contains(&frame.command()) {
        return None;
    }
    let data: &[u8] = match frame.command() {
        commands::VERSION => &FIRMWARE_VERSION,
        commands::SERIAL => SERIAL_NUMBER,
        _ => &[],
    };
    Some(Frame::from_parts(frame.command(), frame.transaction_id(), data))
}

/// Open a device on an in-memory link to a mock firmware.
pub fn open_with(
    builder: DeviceBuilder,
    options: FirmwareOptions,
) -> (LoupedeckDevice, MockFirmware) {
    let (host, device) = tokio::io::duplex(256 * 1024);
    let firmware = spawn_firmware(device, options);
    (builder.open(host), firmware)
}

pub fn open_model(model: ModelId) -> (LoupedeckDevice, MockFirmware) {
    open_with(LoupedeckDevice::builder(model), FirmwareOptions::default())
}

pub fn open_spec(spec: ModelSpec) -> (LoupedeckDevice, MockFirmware) {
    open_with(DeviceBuilder::with_spec(spec), FirmwareOptions::default())
}

/// Split a framebuffer payload into (display id, x, y, width, height, pixels).
pub fn framebuffer_parts(frame: &Frame) -> ([u8; 2], u16, u16, u16, u16, &[u8]) {
    let p = frame.payload();
    let word = |i: usize| u16::from_be_bytes([p[i], p[i + 1]]);
    ([p[0], p[1]], word(2), word(4), word(6), word(8), &p[10..])
}

pub fn count(frames: &[Frame], command: u8) -> usize {
    frames.iter().filter(|f| f.command() == command).count()
}

/// Next input event, skipping lifecycle notifications.
pub async fn next_input(events: &mut EventStream) -> InputEvent {
    loop {
        match events.recv().await.expect("event stream ended") {
            DeviceEvent::Input(event) => return event,
            _ => continue,
        }
    }
}

/// Wait for the disconnect notification and return its error.
pub async fn next_disconnect(events: &mut EventStream) -> Option<LoupedeckError> {
    loop {
        let event = events.recv().await.expect("event stream ended");
        if let DeviceEvent::Disconnected { error } = event {
            return error;
        }
    }
}
