//! Grbl streaming client.
//!
//! Two tasks per connection: a reader that turns raw bytes into frames,
//! and a control loop that owns the transport writer, the shadow buffer
//! ledger, and both command queues. Every public operation talks to the
//! control loop over a channel and waits only on its own reply, so the
//! FIFO correlation between sent commands and acknowledgments holds
//! without any locking.

use std::collections::VecDeque;
use std::io;

use grblkit_core::ClientError;
use serde::{Deserialize, Serialize};
use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt};
use tokio::sync::{mpsc, oneshot};

use crate::framer::{Frame, FrameReader};
use crate::realtime;

/// Grbl's serial receive buffer size, in bytes, for character-count
/// flow control.
pub const RX_BUFFER_SIZE: usize = 127;

/// Conservative capacity historically used with the send-response
/// protocol; kept for controllers that misreport buffer room.
pub const LEGACY_RX_BUFFER_SIZE: usize = 50;

/// The line the firmware prints after any reset, e.g.
/// `Grbl 1.1f ['$' for help]`.
const BANNER_PREFIX: &str = "Grbl";

/// Flow control strategy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ClientMode {
    /// Wait for each command's acknowledgment before sending the next.
    SendResponse,
    /// Track in-flight bytes and pipeline commands up to the
    /// controller's receive buffer capacity.
    CharacterCount,
}

/// Client configuration.
#[derive(Debug, Clone, Copy)]
pub struct ClientConfig {
    pub mode: ClientMode,
    /// Receive buffer capacity assumed in character-count mode.
    pub rx_buffer_size: usize,
}

impl Default for ClientConfig {
    fn default() -> Self {
        ClientConfig {
            mode: ClientMode::CharacterCount,
            rx_buffer_size: RX_BUFFER_SIZE,
        }
    }
}

impl ClientConfig {
    /// The legacy send-response configuration.
    pub fn send_response() -> Self {
        ClientConfig {
            mode: ClientMode::SendResponse,
            rx_buffer_size: LEGACY_RX_BUFFER_SIZE,
        }
    }
}

/// An unsolicited message from the controller, classified once at the
/// connection boundary.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Push {
    /// Interior of a `<...>` realtime status report.
    Report(String),
    /// A `$n=value` settings line.
    Setting(String),
    /// The boot banner printed after a reset.
    Welcome(String),
    /// Any other unsolicited line, e.g. `[MSG:...]` feedback.
    Message(String),
}

/// The acknowledgment (or error) line for one command.
pub type Response = Result<String, ClientError>;

enum Request {
    Execute {
        data: Vec<u8>,
        reply: oneshot::Sender<Response>,
    },
    Mode {
        reply: oneshot::Sender<ClientMode>,
    },
    SetMode {
        mode: ClientMode,
    },
    Close {
        reply: oneshot::Sender<()>,
    },
}

/// Handle to a running connection. Cheap to clone; all clones talk to
/// the same control loop.
#[derive(Clone)]
pub struct Client {
    requests: mpsc::UnboundedSender<Request>,
}

impl Client {
    /// Start a client over `transport`.
    ///
    /// Returns the client handle plus the stream of push messages. The
    /// transport is owned by the connection from here on and released
    /// when the connection closes.
    pub fn connect<T>(transport: T, config: ClientConfig) -> (Client, mpsc::UnboundedReceiver<Push>)
    where
        T: AsyncRead + AsyncWrite + Send + 'static,
    {
        let (read_half, write_half) = tokio::io::split(transport);
        let (frame_tx, frame_rx) = mpsc::unbounded_channel();
        let (push_tx, push_rx) = mpsc::unbounded_channel();
        let (req_tx, req_rx) = mpsc::unbounded_channel();

        tokio::spawn(read_loop(read_half, frame_tx));
        tokio::spawn(
            Connection {
                writer: write_half,
                mode: config.mode,
                rx_buffer_size: config.rx_buffer_size,
                inflight: VecDeque::new(),
                unsent: VecDeque::new(),
                push_tx,
            }
            .run(req_rx, frame_rx),
        );

        (Client { requests: req_tx }, push_rx)
    }

    /// Submit one command and wait for its acknowledgment.
    ///
    /// Realtime bytes resolve as soon as they are written; everything
    /// else resolves when the controller acknowledges it, in FIFO order.
    pub async fn execute(&self, command: impl Into<Vec<u8>>) -> Response {
        let (tx, rx) = oneshot::channel();
        self.requests
            .send(Request::Execute {
                data: command.into(),
                reply: tx,
            })
            .map_err(|_| ClientError::Closed)?;
        rx.await.unwrap_or(Err(ClientError::Discarded))
    }

    /// Queue several commands at once; responses arrive in submission
    /// order.
    pub fn execute_many(&self, commands: Vec<Vec<u8>>) -> mpsc::Receiver<Response> {
        let (out_tx, out_rx) = mpsc::channel(commands.len().max(1));
        let mut replies = Vec::with_capacity(commands.len());
        for data in commands {
            let (tx, rx) = oneshot::channel();
            // a failed send drops `tx`, which resolves `rx` below
            let _ = self.requests.send(Request::Execute { data, reply: tx });
            replies.push(rx);
        }
        tokio::spawn(async move {
            for rx in replies {
                let res = rx.await.unwrap_or(Err(ClientError::Discarded));
                if out_tx.send(res).await.is_err() {
                    return;
                }
            }
        });
        out_rx
    }

    /// The current flow control mode.
    pub async fn mode(&self) -> Result<ClientMode, ClientError> {
        let (tx, rx) = oneshot::channel();
        self.requests
            .send(Request::Mode { reply: tx })
            .map_err(|_| ClientError::Closed)?;
        rx.await.map_err(|_| ClientError::Closed)
    }

    /// Switch flow control mode. Commands already in flight keep their
    /// ledger entries.
    pub fn set_mode(&self, mode: ClientMode) -> Result<(), ClientError> {
        self.requests
            .send(Request::SetMode { mode })
            .map_err(|_| ClientError::Closed)
    }

    /// Close the connection, failing outstanding commands.
    pub async fn close(&self) {
        let (tx, rx) = oneshot::channel();
        if self.requests.send(Request::Close { reply: tx }).is_ok() {
            let _ = rx.await;
        }
    }
}

async fn read_loop<R>(reader: R, frames: mpsc::UnboundedSender<Result<Frame, io::Error>>)
where
    R: AsyncRead + Unpin,
{
    let mut framer = FrameReader::new(reader);
    loop {
        match framer.next_frame().await {
            Ok(frame) => {
                if frames.send(Ok(frame)).is_err() {
                    return;
                }
            }
            Err(err) => {
                let _ = frames.send(Err(err));
                return;
            }
        }
    }
}

/// A command accepted but not yet transmitted.
struct Pending {
    data: Vec<u8>,
    reply: oneshot::Sender<Response>,
}

/// A command occupying controller buffer space, awaiting its
/// acknowledgment. The front of the in-flight queue resolves next.
struct Inflight {
    len: usize,
    reply: oneshot::Sender<Response>,
}

struct Connection<W> {
    writer: W,
    mode: ClientMode,
    rx_buffer_size: usize,
    inflight: VecDeque<Inflight>,
    unsent: VecDeque<Pending>,
    push_tx: mpsc::UnboundedSender<Push>,
}

impl<W: AsyncWrite + Unpin> Connection<W> {
    async fn run(
        mut self,
        mut requests: mpsc::UnboundedReceiver<Request>,
        mut frames: mpsc::UnboundedReceiver<Result<Frame, io::Error>>,
    ) {
        let fatal = loop {
            tokio::select! {
                req = requests.recv() => match req {
                    Some(Request::Execute { data, reply }) => {
                        if let Err(err) = self.submit(data, reply).await {
                            break err;
                        }
                    }
                    Some(Request::Mode { reply }) => {
                        let _ = reply.send(self.mode);
                    }
                    Some(Request::SetMode { mode }) => {
                        self.mode = mode;
                        // a mode switch can free up sends
                        if let Err(err) = self.pump().await {
                            break err;
                        }
                    }
                    Some(Request::Close { reply }) => {
                        self.fail_all(ClientError::Closed);
                        let _ = reply.send(());
                        return;
                    }
                    None => {
                        self.fail_all(ClientError::Closed);
                        return;
                    }
                },
                frame = frames.recv() => match frame {
                    Some(Ok(frame)) => {
                        if let Err(err) = self.handle_frame(frame).await {
                            break err;
                        }
                    }
                    Some(Err(err)) => break ClientError::from_io(err),
                    None => break ClientError::Closed,
                },
            }
        };

        tracing::error!(error = %fatal, "connection failed");
        self.fail_all(fatal.clone());
        let mode = self.mode;
        drop(self);
        // unhooks the reader so it stops buffering frames nobody reads
        drop(frames);

        // Erroring state: every later submission fails immediately
        // without touching the transport.
        while let Some(req) = requests.recv().await {
            match req {
                Request::Execute { reply, .. } => {
                    let _ = reply.send(Err(fatal.clone()));
                }
                Request::Mode { reply } => {
                    let _ = reply.send(mode);
                }
                Request::SetMode { .. } => {}
                Request::Close { reply } => {
                    let _ = reply.send(());
                    return;
                }
            }
        }
    }

    async fn submit(
        &mut self,
        data: Vec<u8>,
        reply: oneshot::Sender<Response>,
    ) -> Result<(), ClientError> {
        if realtime::is_realtime(&data) {
            // bypasses queue and ledger; the controller always has room
            tracing::debug!(byte = data[0], "realtime");
            match self.write(&data).await {
                Ok(()) => {
                    let _ = reply.send(Ok(String::new()));
                    Ok(())
                }
                Err(err) => {
                    let _ = reply.send(Err(err.clone()));
                    Err(err)
                }
            }
        } else {
            self.unsent.push_back(Pending { data, reply });
            self.pump().await
        }
    }

    /// Transmit queued commands while the controller has room.
    async fn pump(&mut self) -> Result<(), ClientError> {
        match self.mode {
            ClientMode::SendResponse => {
                if self.inflight.is_empty() {
                    if let Some(cmd) = self.unsent.pop_front() {
                        self.transmit(cmd).await?;
                    }
                }
            }
            ClientMode::CharacterCount => {
                let mut used: usize = self.inflight.iter().map(|c| c.len).sum();
                while self
                    .unsent
                    .front()
                    .is_some_and(|c| used + c.data.len() <= self.rx_buffer_size)
                {
                    let cmd = self.unsent.pop_front().expect("front checked");
                    used += cmd.data.len();
                    self.transmit(cmd).await?;
                }
            }
        }
        Ok(())
    }

    async fn transmit(&mut self, cmd: Pending) -> Result<(), ClientError> {
        tracing::debug!(
            command = %String::from_utf8_lossy(&cmd.data).trim_end(),
            "send"
        );
        if let Err(err) = self.write(&cmd.data).await {
            let _ = cmd.reply.send(Err(err.clone()));
            return Err(err);
        }
        self.inflight.push_back(Inflight {
            len: cmd.data.len(),
            reply: cmd.reply,
        });
        Ok(())
    }

    async fn write(&mut self, data: &[u8]) -> Result<(), ClientError> {
        self.writer
            .write_all(data)
            .await
            .map_err(ClientError::from_io)?;
        self.writer.flush().await.map_err(ClientError::from_io)
    }

    async fn handle_frame(&mut self, frame: Frame) -> Result<(), ClientError> {
        match frame {
            Frame::Report(data) => {
                let _ = self.push_tx.send(Push::Report(data));
                Ok(())
            }
            Frame::Line(line) => {
                if !self.inflight.is_empty() && (line.starts_with('o') || line.starts_with('e')) {
                    self.acknowledge(line);
                    self.pump().await
                } else if line.starts_with(BANNER_PREFIX) {
                    self.reset(line);
                    Ok(())
                } else if line.starts_with('$') {
                    let _ = self.push_tx.send(Push::Setting(line));
                    Ok(())
                } else {
                    let _ = self.push_tx.send(Push::Message(line));
                    Ok(())
                }
            }
        }
    }

    /// Resolve the oldest in-flight command and free its ledger entry.
    fn acknowledge(&mut self, line: String) {
        let cmd = self.inflight.pop_front().expect("inflight checked");
        tracing::debug!(response = %line, "ack");
        if line.starts_with("error") {
            let _ = cmd.reply.send(Err(ClientError::Command { response: line }));
        } else {
            let _ = cmd.reply.send(Ok(line));
        }
    }

    /// The controller rebooted: everything it had buffered is gone.
    fn reset(&mut self, banner: String) {
        tracing::warn!(banner = %banner, "controller reset detected");
        for cmd in self.inflight.drain(..) {
            let _ = cmd.reply.send(Err(ClientError::SoftReset));
        }
        // pre-reset intent, never transmitted; dropping the reply
        // resolves the waiter as discarded
        self.unsent.clear();
        let _ = self.push_tx.send(Push::Welcome(banner));
    }

    fn fail_all(&mut self, err: ClientError) {
        for cmd in self.inflight.drain(..) {
            let _ = cmd.reply.send(Err(err.clone()));
        }
        for cmd in self.unsent.drain(..) {
            let _ = cmd.reply.send(Err(err.clone()));
        }
    }
}
