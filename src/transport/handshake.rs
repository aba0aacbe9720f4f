//! WebSocket upgrade over a serial stream.
//!
//! The serial firmware expects the host to open with an HTTP upgrade request
//! and answers with a `101 Switching Protocols` block terminated by a blank
//! line. Frames may follow the response in the same read, so the bytes past
//! the blank line are handed back to seed the frame decoder.

use std::time::Duration;

use bytes::Bytes;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use crate::error::{LoupedeckError, Result};

/// Request the firmware waits for before switching to framed mode.
pub const UPGRADE_REQUEST: &[u8] = b"GET /index.html\n\
HTTP/1.1\n\
Connection: Upgrade\n\
Upgrade: websocket\n\
Sec-WebSocket-Key: 123abc\n\n";

/// Status line prefix of a successful upgrade.
const UPGRADE_STATUS: &[u8] = b"HTTP/1.1 101";

/// Longest response accepted before giving up.
const MAX_RESPONSE_SIZE: usize = 4096;

/// Perform the upgrade handshake on `stream`.
///
/// Returns any bytes received after the end of the response.
pub async fn upgrade<S>(stream: &mut S, timeout: Duration) -> Result<Bytes>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    match tokio::time::timeout(timeout, exchange(stream)).await {
        Ok(result) => result,
        Err(_) => Err(LoupedeckError::Transport(format!(
            "no upgrade response within {:?}",
            timeout
        ))),
    }
}

async fn exchange<S>(stream: &mut S) -> Result<Bytes>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    stream.write_all(UPGRADE_REQUEST).await?;
    stream.flush().await?;

    let mut response = Vec::with_capacity(256);
    let mut buf = [0u8; 256];
    loop {
        let n = stream.read(&mut buf).await?;
        if n == 0 {
            return Err(LoupedeckError::Transport(
                "stream closed during upgrade handshake".into(),
            ));
        }
        response.extend_from_slice(&buf[..n]);

        if let Some(end) = find_header_end(&response) {
            if !response.starts_with(UPGRADE_STATUS) {
                let status = response
                    .split(|&b| b == b'\n')
                    .next()
                    .map(|line| String::from_utf8_lossy(line).trim().to_string())
                    .unwrap_or_default();
                return Err(LoupedeckError::Protocol(format!(
                    "unexpected upgrade response: {}",
                    status
                )));
            }
            tracing::debug!("Upgrade handshake complete");
            return Ok(Bytes::copy_from_slice(&response[end..]));
        }

        if response.len() > MAX_RESPONSE_SIZE {
            return Err(LoupedeckError::Protocol(
                "upgrade response has no end of headers".into(),
            ));
        }
    }
}

/// Offset just past the blank line ending the headers (`\r\n\r\n` or `\n\n`).
fn find_header_end(data: &[u8]) -> Option<usize> {
    let crlf = data.windows(4).position(|w| w == b"\r\n\r\n").map(|p| p + 4);
    let lf = data.windows(2).position(|w| w == b"\n\n").map(|p| p + 2);
    match (crlf, lf) {
        (Some(a), Some(b)) => Some(a.min(b)),
        (a, b) => a.or(b),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::duplex;

    const RESPONSE: &[u8] = b"HTTP/1.1 101 Switching Protocols\r\n\
Upgrade: websocket\r\n\
Connection: Upgrade\r\n\
Sec-WebSocket-Accept: ALtlZo9FMEUEQleXJmq++ukUQ1s=\r\n\r\n";

    #[test]
    fn test_find_header_end() {
        assert_eq!(find_header_end(b"a\r\n\r\nrest"), Some(5));
        assert_eq!(find_header_end(b"a\n\nrest"), Some(3));
        assert_eq!(find_header_end(b"a\r\nb"), None);
    }

    #[tokio::test]
    async fn test_upgrade_returns_trailing_bytes() {
        let (mut host, mut device) = duplex(1024);

        let firmware = tokio::spawn(async move {
            let mut request = vec![0u8; UPGRADE_REQUEST.len()];
            device.read_exact(&mut request).await.unwrap();
            assert_eq!(request, UPGRADE_REQUEST);

            let mut reply = RESPONSE.to_vec();
            reply.extend_from_slice(&[0x82, 0x05, 0x05, 0x00, 0x00, 0x07, 0x00]);
            device.write_all(&reply).await.unwrap();
            device
        });

        let leftover = upgrade(&mut host, Duration::from_secs(1)).await.unwrap();
        assert_eq!(&leftover[..], &[0x82, 0x05, 0x05, 0x00, 0x00, 0x07, 0x00]);
        firmware.await.unwrap();
    }

    #[tokio::test]
    async fn test_response_split_across_reads() {
        let (mut host, mut device) = duplex(1024);

        tokio::spawn(async move {
            let mut request = vec![0u8; UPGRADE_REQUEST.len()];
            device.read_exact(&mut request).await.unwrap();
            for piece in RESPONSE.chunks(7) {
                device.write_all(piece).await.unwrap();
                tokio::task::yield_now().await;
            }
            device
        });

        let leftover = upgrade(&mut host, Duration::from_secs(1)).await.unwrap();
        assert!(leftover.is_empty());
    }

    #[tokio::test]
    async fn test_rejected_upgrade() {
        let (mut host, mut device) = duplex(1024);

        tokio::spawn(async move {
            let mut request = vec![0u8; UPGRADE_REQUEST.len()];
            device.read_exact(&mut request).await.unwrap();
            device.write_all(b"HTTP/1.1 400 Bad Request\r\n\r\n").await.unwrap();
            device
        });

        let result = upgrade(&mut host, Duration::from_secs(1)).await;
        assert!(matches!(result, Err(LoupedeckError::Protocol(msg)) if msg.contains("400")));
    }

    #[tokio::test(start_paused = true)]
    async fn test_silent_device_times_out() {
        let (mut host, _device) = duplex(1024);
        let result = upgrade(&mut host, Duration::from_millis(200)).await;
        assert!(matches!(result, Err(LoupedeckError::Transport(_))));
    }

    #[tokio::test]
    async fn test_closed_stream() {
        let (mut host, device) = duplex(1024);
        drop(device);
        let result = upgrade(&mut host, Duration::from_secs(1)).await;
        assert!(result.is_err());
    }
}
