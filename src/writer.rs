//! Dedicated writer task.
//!
//! All outgoing frames go through one task that owns the write half of the
//! transport, so a frame is always written completely before the next one
//! starts no matter how many callers are active.
//!
//! ```text
//! Engine ─► WriterHandle ─► queue ─► Writer Task ─► Transport
//! ```
//!
//! Each queued frame holds one of `max_pending_frames` slots until it is on
//! the wire, so a stalled transport pushes back on senders. Frames that are
//! already queued when the task wakes up go out in one vectored write.

use std::io::IoSlice;
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio::sync::{mpsc, OwnedSemaphorePermit, Semaphore};
use tokio::task::JoinHandle;

use crate::config::{DeviceConfig, DEFAULT_BACKPRESSURE_TIMEOUT, DEFAULT_MAX_PENDING_FRAMES};
use crate::error::{LoupedeckError, Result};

/// Most frames gathered into one vectored write.
const MAX_BATCH_SIZE: usize = 64;

/// A fully encoded wire frame.
#[derive(Debug, Clone)]
pub struct OutboundFrame {
    pub bytes: Bytes,
}

impl OutboundFrame {
    #[inline]
    pub fn new(bytes: impl Into<Bytes>) -> Self {
        Self {
            bytes: bytes.into(),
        }
    }

    #[inline]
    pub fn size(&self) -> usize {
        self.bytes.len()
    }
}

/// Writer task limits.
#[derive(Debug, Clone)]
pub struct WriterConfig {
    /// Frames that may be queued but unwritten at once.
    pub max_pending_frames: usize,
    /// How long `send` waits for room before giving up.
    pub backpressure_timeout: Duration,
}

impl Default for WriterConfig {
    fn default() -> Self {
        Self {
            max_pending_frames: DEFAULT_MAX_PENDING_FRAMES,
            backpressure_timeout: DEFAULT_BACKPRESSURE_TIMEOUT,
        }
    }
}

impl From<&DeviceConfig> for WriterConfig {
    fn from(config: &DeviceConfig) -> Self {
        Self {
            max_pending_frames: config.max_pending_frames.max(1),
            backpressure_timeout: config.backpressure_timeout,
        }
    }
}

/// A queued frame. Its slot is released once the frame has been written.
struct Queued {
    frame: OutboundFrame,
    _slot: OwnedSemaphorePermit,
}

/// Sending side of the writer task.
#[derive(Clone)]
pub struct WriterHandle {
    tx: mpsc::UnboundedSender<Queued>,
    slots: Arc<Semaphore>,
    max_pending: usize,
    timeout: Duration,
}

impl WriterHandle {
    /// Queue a frame, waiting up to the backpressure timeout for a free slot.
    pub async fn send(&self, frame: OutboundFrame) -> Result<()> {
        let acquire = self.slots.clone().acquire_owned();
        let slot = match tokio::time::timeout(self.timeout, acquire).await {
            Ok(Ok(slot)) => slot,
            Ok(Err(_)) => return Err(LoupedeckError::Transport("writer task stopped".into())),
            Err(_) => {
                tracing::warn!(
                    "Write queue still full after {:?} ({} frames pending)",
                    self.timeout,
                    self.pending_count()
                );
                return Err(LoupedeckError::Backpressure);
            }
        };

        self.tx
            .send(Queued { frame, _slot: slot })
            .map_err(|_| LoupedeckError::Transport("writer task stopped".into()))
    }

    /// Whether the next `send` would have to wait.
    #[inline]
    pub fn is_backpressure_active(&self) -> bool {
        self.slots.available_permits() == 0
    }

    /// Frames queued but not yet written.
    #[inline]
    pub fn pending_count(&self) -> usize {
        self.max_pending - self.slots.available_permits()
    }
}

/// Spawn the writer task.
///
/// The task ends with `Ok(())` once every handle is dropped and the queue is
/// flushed, or with the first write error.
pub fn spawn_writer_task<W>(
    writer: W,
    config: WriterConfig,
) -> (WriterHandle, JoinHandle<Result<()>>)
where
    W: AsyncWrite + Unpin + Send + 'static,
{
    let (tx, rx) = mpsc::unbounded_channel();
    let max_pending = config.max_pending_frames.max(1);
    let handle = WriterHandle {
        tx,
        slots: Arc::new(Semaphore::new(max_pending)),
        max_pending,
        timeout: config.backpressure_timeout,
    };

    (handle, tokio::spawn(writer_loop(rx, writer)))
}

async fn writer_loop<W>(mut rx: mpsc::UnboundedReceiver<Queued>, mut writer: W) -> Result<()>
where
    W: AsyncWrite + Unpin,
{
    let mut batch = Vec::with_capacity(MAX_BATCH_SIZE);

    while let Some(first) = rx.recv().await {
        batch.push(first);
        while batch.len() < MAX_BATCH_SIZE {
            match rx.try_recv() {
                Ok(queued) => batch.push(queued),
                Err(_) => break,
            }
        }

        let frames: Vec<&OutboundFrame> = batch.iter().map(|q| &q.frame).collect();
        if let Err(e) = write_batch(&mut writer, &frames).await {
            tracing::error!("Writer failed after {} queued frames: {}", batch.len(), e);
            return Err(e);
        }
        tracing::trace!("Wrote {} frames", batch.len());

        // Dropping the batch frees the slots
        batch.clear();
    }

    writer.shutdown().await.ok();
    Ok(())
}

/// Write every byte of `batch`, resuming after partial vectored writes.
async fn write_batch<W>(writer: &mut W, batch: &[&OutboundFrame]) -> Result<()>
where
    W: AsyncWrite + Unpin,
{
    let total: usize = batch.iter().map(|f| f.size()).sum();
    let mut written = 0;

    while written < total {
        let slices = remaining_slices(batch, written);
        let n = writer.write_vectored(&slices).await?;
        if n == 0 {
            return Err(LoupedeckError::Transport("transport accepted no bytes".into()));
        }
        written += n;
    }

    writer.flush().await?;
    Ok(())
}

/// Slices covering `batch` minus its first `skip` bytes.
fn remaining_slices<'a>(batch: &[&'a OutboundFrame], skip: usize) -> Vec<IoSlice<'a>> {
    let mut offset = 0;
    batch
        .iter()
        .filter_map(|frame| {
            let start = offset;
            offset += frame.size();
            (skip < offset).then(|| IoSlice::new(&frame.bytes[skip.saturating_sub(start)..]))
        })
        .collect()
}
