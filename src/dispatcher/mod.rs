//! Command dispatcher.
//!
//! One engine task per device owns the transaction table, the event decoder
//! and the writer handle. Callers talk to it through a [`DispatcherHandle`]
//! mailbox and get their outcome back on a oneshot, so the table is never
//! touched from more than one task.
//!
//! ```text
//! DispatcherHandle ─► mailbox ─┐
//!                              ├─► Engine ─► WriterHandle ─► Writer Task ─► Transport
//! Reader Task ─────► inbound ──┘      │
//!   (FrameBuffer)                     └─► ListenerRegistry ─► EventStream
//! ```

mod transactions;

use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, Mutex, PoisonError};
use std::task::{Context, Poll};
use std::time::Duration;

use bytes::Bytes;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite};
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time::Instant;

use crate::config::DeviceConfig;
use crate::error::{LoupedeckError, Result};
use crate::event::{DeviceEvent, EventDecoder, ListenerRegistry};
use crate::model::{Correlation, ModelSpec};
use crate::protocol::{build_frame, Command, Direction, Frame, FrameBuffer, CLOSE_FRAME};
use crate::writer::{spawn_writer_task, OutboundFrame, WriterConfig, WriterHandle};

use transactions::{Transaction, TransactionTable};

/// Read buffer size for the reader task.
const READ_BUFFER_SIZE: usize = 4096;

/// Capacity of the reader to engine channel.
const INBOUND_CAPACITY: usize = 256;

/// Outcome of a submitted command.
///
/// Resolves with the response frame, or with the frame as sent for commands
/// that expect no response.
#[derive(Debug)]
pub struct PendingResponse {
    rx: oneshot::Receiver<Result<Frame>>,
}

impl Future for PendingResponse {
    type Output = Result<Frame>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        Pin::new(&mut self.rx)
            .poll(cx)
            .map(|result| result.unwrap_or(Err(LoupedeckError::Closed)))
    }
}

struct Request {
    command: Command,
    expects_response: bool,
    reply: oneshot::Sender<Result<Frame>>,
}

enum EngineMessage {
    Submit(Request),
    Close { done: oneshot::Sender<()> },
}

enum Inbound {
    Frame(Frame),
    Closed(LoupedeckError),
}

enum Shutdown {
    Closed(Option<oneshot::Sender<()>>),
    Failed(LoupedeckError),
}

/// Handle to a running engine.
#[derive(Clone)]
pub struct DispatcherHandle {
    mailbox: mpsc::Sender<EngineMessage>,
}

impl DispatcherHandle {
    /// Submit a command.
    ///
    /// Returns once the engine has accepted it; await the returned
    /// [`PendingResponse`] for the outcome. Several commands may be
    /// outstanding at once.
    pub async fn send(&self, command: Command, expects_response: bool) -> Result<PendingResponse> {
        let (reply, rx) = oneshot::channel();
        self.mailbox
            .send(EngineMessage::Submit(Request {
                command,
                expects_response,
                reply,
            }))
            .await
            .map_err(|_| LoupedeckError::Closed)?;
        Ok(PendingResponse { rx })
    }

    /// Submit a command and wait for its outcome.
    pub async fn request(&self, command: Command, expects_response: bool) -> Result<Frame> {
        self.send(command, expects_response).await?.await
    }

    /// Stop the engine, cancelling everything pending.
    ///
    /// Safe to call any number of times.
    pub async fn close(&self) {
        let (done, rx) = oneshot::channel();
        if self.mailbox.send(EngineMessage::Close { done }).await.is_ok() {
            let _ = rx.await;
        }
    }

    /// Check if the engine has stopped.
    pub fn is_closed(&self) -> bool {
        self.mailbox.is_closed()
    }
}

/// Start the engine on an already-open stream.
///
/// `leftover` holds bytes read past the handshake; they are decoded before
/// anything read from `stream`.
pub(crate) fn spawn<S>(
    stream: S,
    leftover: Bytes,
    spec: Arc<ModelSpec>,
    config: &DeviceConfig,
    listeners: Arc<Mutex<ListenerRegistry>>,
) -> DispatcherHandle
where
    S: AsyncRead + AsyncWrite + Send + 'static,
{
    let (read_half, write_half) = tokio::io::split(stream);
    let (writer, writer_task) = spawn_writer_task(write_half, WriterConfig::from(config));

    let (inbound_tx, inbound_rx) = mpsc::channel(INBOUND_CAPACITY);
    let frames = FrameBuffer::new(Direction::DeviceToHost, spec.frame_format);
    let reader_task = tokio::spawn(read_loop(read_half, frames, leftover, inbound_tx));

    let (mailbox_tx, mailbox_rx) = mpsc::channel(config.mailbox_capacity.max(1));

    let engine = Engine {
        table: TransactionTable::new(spec.correlation),
        decoder: EventDecoder::new(spec.clone()),
        spec,
        listeners,
        writer: Some(writer),
        writer_task,
        writer_finished: false,
        reader_task,
        mailbox: mailbox_rx,
        inbound: inbound_rx,
        request_timeout: config.request_timeout,
        drain_timeout: config.backpressure_timeout,
        send_close_frame: config.send_close_frame,
    };
    tokio::spawn(engine.run());

    DispatcherHandle {
        mailbox: mailbox_tx,
    }
}

/// Reads the transport and forwards every complete frame to the engine.
async fn read_loop<R>(
    mut reader: R,
    mut frames: FrameBuffer,
    leftover: Bytes,
    tx: mpsc::Sender<Inbound>,
) where
    R: AsyncRead + Unpin,
{
    let mut buf = vec![0u8; READ_BUFFER_SIZE];
    let mut pending = frames.feed(&leftover);

    loop {
        for frame in pending.drain(..) {
            if tx.send(Inbound::Frame(frame)).await.is_err() {
                return;
            }
        }

        let n = match reader.read(&mut buf).await {
            Ok(0) => {
                let _ = tx
                    .send(Inbound::Closed(LoupedeckError::Transport(
                        "device closed the connection".into(),
                    )))
                    .await;
                return;
            }
            Ok(n) => n,
            Err(e) => {
                tracing::error!("Read loop error: {}", e);
                let _ = tx.send(Inbound::Closed(LoupedeckError::Transport(e.to_string()))).await;
                return;
            }
        };

        pending = frames.feed(&buf[..n]);
    }
}

struct Engine {
    spec: Arc<ModelSpec>,
    table: TransactionTable,
    decoder: EventDecoder,
    listeners: Arc<Mutex<ListenerRegistry>>,
    writer: Option<WriterHandle>,
    writer_task: JoinHandle<Result<()>>,
    writer_finished: bool,
    reader_task: JoinHandle<()>,
    mailbox: mpsc::Receiver<EngineMessage>,
    inbound: mpsc::Receiver<Inbound>,
    request_timeout: Duration,
    /// Upper bound on flushing the writer during close.
    drain_timeout: Duration,
    send_close_frame: bool,
}

impl Engine {
    async fn run(mut self) {
        tracing::debug!("Protocol engine started for {}", self.spec.id);
        self.emit(DeviceEvent::Connected);

        let reason = loop {
            let deadline = self.table.next_deadline();
            tokio::select! {
                message = self.mailbox.recv() => match message {
                    Some(EngineMessage::Submit(request)) => self.submit(request).await,
                    Some(EngineMessage::Close { done }) => break Shutdown::Closed(Some(done)),
                    None => break Shutdown::Closed(None),
                },
                inbound = self.inbound.recv() => match inbound {
                    Some(Inbound::Frame(frame)) => self.on_frame(frame),
                    Some(Inbound::Closed(error)) => break Shutdown::Failed(error),
                    None => {
                        break Shutdown::Failed(LoupedeckError::Transport("reader stopped".into()))
                    }
                },
                result = &mut self.writer_task, if !self.writer_finished => {
                    self.writer_finished = true;
                    let error = match result {
                        Ok(Err(e)) => LoupedeckError::Transport(e.to_string()),
                        Ok(Ok(())) => LoupedeckError::Transport("writer stopped".into()),
                        Err(e) => LoupedeckError::Transport(e.to_string()),
                    };
                    break Shutdown::Failed(error);
                },
                _ = sleep_until(deadline) => self.expire(),
            }
        };

        self.shutdown(reason).await;
    }

    async fn submit(&mut self, request: Request) {
        let Request {
            command,
            expects_response,
            reply,
        } = request;

        let (transaction_id, superseded) = self.table.allocate();
        if let Some(old) = superseded {
            tracing::warn!(
                "Transaction id {} still pending after wrap-around, failing the older request",
                transaction_id
            );
            old.complete(Err(LoupedeckError::TransactionSuperseded { transaction_id }));
        }

        let frame = command.to_frame(transaction_id);
        let bytes = match build_frame(Direction::HostToDevice, self.spec.frame_format, &frame) {
            Ok(bytes) => bytes,
            Err(e) => {
                let _ = reply.send(Err(e));
                return;
            }
        };

        let Some(writer) = &self.writer else {
            let _ = reply.send(Err(LoupedeckError::Closed));
            return;
        };
        if let Err(e) = writer.send(OutboundFrame::new(bytes)).await {
            let _ = reply.send(Err(e));
            return;
        }

        if expects_response {
            let deadline = Instant::now() + self.request_timeout;
            self.table
                .insert(Transaction::new(frame.command(), transaction_id, deadline, reply));
        } else {
            let _ = reply.send(Ok(frame));
        }
    }

    fn on_frame(&mut self, frame: Frame) {
        if let Some(transaction) = self.table.take_match(&frame) {
            transaction.complete(Ok(frame));
            return;
        }

        if self.spec.correlation == Correlation::TransactionId && !frame.is_unsolicited() {
            tracing::debug!(
                "Dropping response {:#04x} with unknown transaction id {}",
                frame.command(),
                frame.transaction_id()
            );
            return;
        }

        if let Some(event) = self.decoder.decode(&frame) {
            self.emit(DeviceEvent::Input(event));
        }
    }

    fn expire(&mut self) {
        for transaction in self.table.expire(Instant::now()) {
            tracing::warn!(
                "Command {:#04x} (transaction {}) timed out",
                transaction.command,
                transaction.transaction_id
            );
            let error = LoupedeckError::Timeout {
                command: transaction.command,
                transaction_id: transaction.transaction_id,
            };
            transaction.complete(Err(error));
        }
    }

    fn emit(&self, event: DeviceEvent) {
        self.listeners
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .emit(&event);
    }

    async fn shutdown(mut self, reason: Shutdown) {
        self.reader_task.abort();
        self.mailbox.close();

        let done = match reason {
            Shutdown::Closed(done) => {
                self.table.fail_all(&LoupedeckError::Cancelled);
                self.detach_writer().await;
                tracing::debug!("Protocol engine closed");
                self.emit(DeviceEvent::Disconnected { error: None });
                done
            }
            Shutdown::Failed(error) => {
                tracing::warn!("Transport failed: {}", error);
                self.table.fail_all(&error);
                self.writer = None;
                if !self.writer_finished {
                    self.writer_task.abort();
                }
                self.emit(DeviceEvent::Disconnected { error: Some(error) });
                None
            }
        };

        self.listeners
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .close();
        if let Some(done) = done {
            let _ = done.send(());
        }
    }

    /// Send the close frame if configured and let the writer flush.
    async fn detach_writer(&mut self) {
        let Some(writer) = self.writer.take() else {
            return;
        };
        if self.send_close_frame {
            let close = OutboundFrame::new(Bytes::from_static(&CLOSE_FRAME));
            if let Err(e) = writer.send(close).await {
                tracing::debug!("Could not queue close frame: {}", e);
            }
        }
        drop(writer);

        if self.writer_finished {
            return;
        }
        match tokio::time::timeout(self.drain_timeout, &mut self.writer_task).await {
            Ok(Ok(Ok(()))) => {}
            Ok(Ok(Err(e))) => tracing::debug!("Writer failed during close: {}", e),
            Ok(Err(e)) => tracing::debug!("Writer task ended abnormally: {}", e),
            Err(_) => {
                tracing::warn!("Writer did not flush within {:?}", self.drain_timeout);
                self.writer_task.abort();
            }
        }
        self.writer_finished = true;
    }
}

async fn sleep_until(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => tokio::time::sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}
