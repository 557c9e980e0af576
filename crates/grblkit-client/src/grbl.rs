//! High-level Grbl interface.
//!
//! Wraps a [`Client`] with a monitor task that folds push messages into a
//! merged [`Status`] (machine and work coordinates reconciled through the
//! last known work coordinate offset) and an incrementally-built
//! [`Settings`] snapshot, and exposes job-oriented operations on top.

use grblkit_core::{gcode::Line, ClientError};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::sync::{mpsc, oneshot, watch};

use crate::client::{Client, ClientConfig, Push};
use crate::realtime;
use crate::settings::Settings;
use crate::status::{MachineState, Status, StatusField};

/// Per-line outcome of a program run.
#[derive(Debug)]
pub struct LineStatus {
    /// Zero-based index into the submitted program.
    pub line: usize,
    pub result: Result<(), ClientError>,
}

enum MonitorRequest {
    /// Resolve with the merged status after the next report.
    NextStatus { reply: oneshot::Sender<Status> },
    /// Resolve with the current settings snapshot.
    Settings { reply: oneshot::Sender<Settings> },
}

/// Connected Grbl machine.
pub struct Grbl {
    client: Client,
    monitor: mpsc::UnboundedSender<MonitorRequest>,
    status_rx: watch::Receiver<Status>,
}

impl Grbl {
    /// Connect over `transport` with character-count flow control.
    pub fn connect<T>(transport: T) -> Grbl
    where
        T: AsyncRead + AsyncWrite + Send + 'static,
    {
        Self::connect_with(transport, ClientConfig::default())
    }

    /// Connect with an explicit client configuration.
    pub fn connect_with<T>(transport: T, config: ClientConfig) -> Grbl
    where
        T: AsyncRead + AsyncWrite + Send + 'static,
    {
        let (client, pushes) = Client::connect(transport, config);
        Self::with_client(client, pushes)
    }

    /// Build the façade over an already-running client.
    pub fn with_client(client: Client, pushes: mpsc::UnboundedReceiver<Push>) -> Grbl {
        let (status_tx, status_rx) = watch::channel(Status::default());
        let (req_tx, req_rx) = mpsc::unbounded_channel();
        tokio::spawn(
            Monitor {
                client: client.clone(),
                merged: Status::default(),
                settings: Settings::default(),
                status_tx,
                status_waiters: Vec::new(),
            }
            .run(pushes, req_rx),
        );
        Grbl {
            client,
            monitor: req_tx,
            status_rx,
        }
    }

    /// Force a status report and return the merged snapshot it produces.
    ///
    /// The monitor registers the waiter before the query byte goes out,
    /// so the resulting report cannot slip past it.
    pub async fn status(&self) -> Result<Status, ClientError> {
        let (tx, rx) = oneshot::channel();
        self.monitor
            .send(MonitorRequest::NextStatus { reply: tx })
            .map_err(|_| ClientError::Closed)?;
        rx.await.map_err(|_| ClientError::Closed)
    }

    /// Watch merged status snapshots as they arrive.
    pub fn subscribe(&self) -> watch::Receiver<Status> {
        self.status_rx.clone()
    }

    /// Request a settings dump and return the resulting snapshot.
    pub async fn settings(&self) -> Result<Settings, ClientError> {
        self.client.execute(b"$$\n".to_vec()).await?;
        let (tx, rx) = oneshot::channel();
        self.monitor
            .send(MonitorRequest::Settings { reply: tx })
            .map_err(|_| ClientError::Closed)?;
        rx.await.map_err(|_| ClientError::Closed)
    }

    /// Execute a single line and wait for its acknowledgment.
    pub async fn exec_line(&self, line: &Line) -> Result<(), ClientError> {
        self.client
            .execute(format!("{line}\n").into_bytes())
            .await
            .map(|_| ())
    }

    /// Stream a program. Results arrive once per line, in order.
    pub fn run(&self, lines: &[Line]) -> mpsc::Receiver<LineStatus> {
        let cmds = lines
            .iter()
            .map(|l| format!("{l}\n").into_bytes())
            .collect();
        let mut responses = self.client.execute_many(cmds);
        let (tx, rx) = mpsc::channel(lines.len().max(1));
        tokio::spawn(async move {
            let mut line = 0usize;
            while let Some(res) = responses.recv().await {
                let status = LineStatus {
                    line,
                    result: res.map(|_| ()),
                };
                if tx.send(status).await.is_err() {
                    return;
                }
                line += 1;
            }
        });
        rx
    }

    /// Run a program under the controller's check mode, which parses and
    /// validates without moving the machine.
    ///
    /// The program is wrapped in `$C` toggles with a `G92` shim zeroing
    /// the work origin; the acknowledgments of that scaffolding are
    /// filtered out, so results map one-to-one onto `lines`.
    pub fn check(&self, lines: &[Line]) -> mpsc::Receiver<LineStatus> {
        let mut cmds: Vec<Vec<u8>> = vec![b"$C\n".to_vec(), b"G92X0Y0Z0\n".to_vec()];
        cmds.extend(lines.iter().map(|l| format!("{l}\n").into_bytes()));
        cmds.push(b"$C\n".to_vec());
        let total = cmds.len();

        let mut responses = self.client.execute_many(cmds);
        let (tx, rx) = mpsc::channel(lines.len().max(1));
        tokio::spawn(async move {
            let mut idx = 0usize;
            while let Some(res) = responses.recv().await {
                if idx >= 2 && idx < total - 1 {
                    let status = LineStatus {
                        line: idx - 2,
                        result: res.map(|_| ()),
                    };
                    if tx.send(status).await.is_err() {
                        return;
                    }
                }
                idx += 1;
            }
        });
        rx
    }

    /// Fire-and-forget relative jog.
    pub fn jog(&self, line: &Line) {
        let cmd = format!("$J={line}\n").into_bytes();
        let client = self.client.clone();
        tokio::spawn(async move {
            if let Err(err) = client.execute(cmd).await {
                tracing::warn!(error = %err, "jog rejected");
            }
        });
    }

    /// Cancel an in-progress jog.
    pub async fn jog_cancel(&self) -> Result<(), ClientError> {
        self.client.execute(vec![realtime::JOG_CANCEL]).await?;
        self.refresh();
        Ok(())
    }

    /// Pause motion.
    pub async fn feed_hold(&self) -> Result<(), ClientError> {
        self.client.execute(vec![realtime::FEED_HOLD]).await?;
        self.refresh();
        Ok(())
    }

    /// Start or resume the cycle.
    pub async fn start_resume(&self) -> Result<(), ClientError> {
        self.client.execute(vec![realtime::CYCLE_START]).await?;
        self.refresh();
        Ok(())
    }

    /// Reset the controller, abandoning whatever it was doing.
    pub async fn soft_reset(&self) -> Result<(), ClientError> {
        self.client.execute(vec![realtime::SOFT_RESET]).await?;
        self.refresh();
        Ok(())
    }

    /// Run the homing cycle.
    pub async fn home(&self) -> Result<(), ClientError> {
        self.client.execute(b"$H\n".to_vec()).await?;
        self.refresh();
        Ok(())
    }

    /// Clear an alarm lock.
    pub async fn unlock(&self) -> Result<(), ClientError> {
        self.client.execute(b"$X\n".to_vec()).await.map(|_| ())
    }

    /// The client's flow control mode.
    pub async fn serial_mode(&self) -> Result<crate::client::ClientMode, ClientError> {
        self.client.mode().await
    }

    /// Switch the client's flow control mode.
    pub fn set_serial_mode(&self, mode: crate::client::ClientMode) -> Result<(), ClientError> {
        self.client.set_mode(mode)
    }

    /// Close the connection.
    pub async fn close(&self) {
        self.client.close().await;
    }

    /// Queue a status query without waiting for the report.
    fn refresh(&self) {
        let client = self.client.clone();
        tokio::spawn(async move {
            let _ = client.execute(vec![realtime::STATUS_REPORT]).await;
        });
    }
}

struct Monitor {
    client: Client,
    merged: Status,
    settings: Settings,
    status_tx: watch::Sender<Status>,
    status_waiters: Vec<oneshot::Sender<Status>>,
}

impl Monitor {
    async fn run(
        mut self,
        mut pushes: mpsc::UnboundedReceiver<Push>,
        mut requests: mpsc::UnboundedReceiver<MonitorRequest>,
    ) {
        loop {
            // Pushes drain first: a snapshot requested after an
            // acknowledgment must observe every line that preceded that
            // acknowledgment on the wire.
            tokio::select! {
                biased;
                push = pushes.recv() => match push {
                    Some(push) => self.handle_push(push),
                    None => return,
                },
                req = requests.recv() => match req {
                    Some(MonitorRequest::NextStatus { reply }) => {
                        self.status_waiters.push(reply);
                        let client = self.client.clone();
                        tokio::spawn(async move {
                            let _ = client.execute(vec![realtime::STATUS_REPORT]).await;
                        });
                    }
                    Some(MonitorRequest::Settings { reply }) => {
                        let _ = reply.send(self.settings.clone());
                    }
                    None => return,
                },
            }
        }
    }

    fn handle_push(&mut self, push: Push) {
        match push {
            Push::Report(data) => match Status::parse(&data) {
                Ok(report) => {
                    self.merge(report);
                    self.publish();
                }
                Err(err) => {
                    tracing::warn!(error = %err, report = %data, "discarding malformed status report");
                }
            },
            Push::Setting(line) => {
                tracing::debug!(setting = %line, "setting");
                if let Err(err) = self.settings.apply_line(&line) {
                    tracing::warn!(error = %err, line = %line, "ignoring malformed setting");
                }
            }
            Push::Welcome(banner) => {
                tracing::info!(banner = %banner, "controller ready");
            }
            Push::Message(msg) => match msg.as_str() {
                "[MSG:Enabled]" => {
                    self.merged.state = MachineState::Check;
                    self.publish();
                }
                "[MSG:Disabled]" => {
                    self.merged.state = MachineState::Idle;
                    self.publish();
                }
                _ => tracing::debug!(message = %msg, "push message"),
            },
        }
    }

    /// Fold one report into the merged snapshot. Absent fields keep
    /// their previous values; whichever of machine/work position was not
    /// reported is recomputed through the work coordinate offset.
    fn merge(&mut self, report: Status) {
        self.merged.state = report.state.clone();
        let mut saw_mpos = false;
        let mut saw_wpos = false;
        for field in &report.fields {
            match field {
                StatusField::MachinePosition => {
                    saw_mpos = true;
                    self.merged.mpos = report.mpos;
                    self.derive_wpos();
                }
                StatusField::WorkPosition => {
                    saw_wpos = true;
                    self.merged.wpos = report.wpos;
                    self.derive_mpos();
                }
                StatusField::WorkOffset => {
                    self.merged.wco = report.wco;
                    if saw_mpos && !saw_wpos {
                        self.derive_wpos();
                    } else if saw_wpos && !saw_mpos {
                        self.derive_mpos();
                    }
                }
                StatusField::Buffer => {
                    self.merged.block_buffer_available = report.block_buffer_available;
                    self.merged.serial_buffer_available = report.serial_buffer_available;
                }
                StatusField::Line => self.merged.line = report.line,
                StatusField::FeedSpindle => {
                    self.merged.feed_speed = report.feed_speed;
                    self.merged.spindle_speed = report.spindle_speed;
                }
                StatusField::Feed => self.merged.feed_speed = report.feed_speed,
                StatusField::Pins => self.merged.pins = report.pins,
                StatusField::Overrides => self.merged.overrides = report.overrides,
                StatusField::Aux => self.merged.aux = report.aux,
            }
        }
        self.merged.fields = report.fields;
    }

    fn derive_wpos(&mut self) {
        if let (Some(m), Some(o)) = (self.merged.mpos, self.merged.wco) {
            self.merged.wpos = Some([m[0] - o[0], m[1] - o[1], m[2] - o[2]]);
        }
    }

    fn derive_mpos(&mut self) {
        if let (Some(w), Some(o)) = (self.merged.wpos, self.merged.wco) {
            self.merged.mpos = Some([w[0] + o[0], w[1] + o[1], w[2] + o[2]]);
        }
    }

    fn publish(&mut self) {
        for waiter in self.status_waiters.drain(..) {
            let _ = waiter.send(self.merged.clone());
        }
        self.status_tx.send_replace(self.merged.clone());
    }
}
