//! GRBL dialect driver: one reactor task per connection, driving
//! character-counting admission control, the executed-loop time model, and
//! GRBL's particular connection and cancel sequences.
//!
//! Builds on the `GrblCommunicator` character-counting shape for the
//! flow-control half (see [`crate::queue::grbl`]) and on the polling task /
//! `Notify`-shutdown shape of `firmware::tinyg::controller` for the
//! single-task reactor structure, generalized to drive a command channel
//! instead of a fire-and-forget background poller.

use async_trait::async_trait;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time::{interval, sleep, Duration, Instant as TokioInstant};
use tracing::{debug, info, warn};

use cncctl_core::state::{CommsSnapshot, Controller, ErrorData, SendQueueEntry, StatusSnapshot};
use cncctl_core::{Error, Result};

use crate::codec::grbl::{parse_line, GrblEvent};
use crate::config::EngineConfig;
use crate::engine::{AckWaiter, Command, ConnectionLifecycle, ControllerEngine};
use crate::machine_state;
use crate::operations::{self, probe, JogThrottle, PendingStream};
use crate::queue::grbl::GrblFlowState;
use crate::queue::SendQueue;
use crate::transport::{SerialTransport, TransportEvent};

use std::sync::{Arc, Mutex as StdMutex};

/// A probe cycle in progress, waiting on GRBL's `PRB:` parameter feedback
/// (or, failing that, an alarm that aborts it).
struct PendingProbe {
    respond: oneshot::Sender<Result<Vec<f64>>>,
    #[allow(dead_code)]
    target: Vec<Option<f64>>,
}

/// A `home` call in progress: the line id of the (full-sync) `$H` so its
/// ack can be matched, and the axis indices to zero once it lands (§9 Open
/// Question 1).
struct PendingHome {
    line_id: f64,
    axes: Vec<usize>,
}

/// Handle to a running GRBL connection. Cloning is not supported; obtain
/// further handles by cloning the returned `Arc<GrblEngine>` if several
/// owners need one.
pub struct GrblEngine {
    command_tx: mpsc::Sender<Command>,
    channels: Arc<cncctl_core::EngineChannels>,
    task: StdMutex<Option<JoinHandle<()>>>,
}

impl GrblEngine {
    /// Open the serial port and start the reactor task.
    pub async fn connect(config: EngineConfig) -> Result<Self> {
        let channels = Arc::new(cncctl_core::EngineChannels::new());
        let (transport, transport_rx) = SerialTransport::connect(config.connection.clone(), true).await?;
        let (command_tx, command_rx) = mpsc::channel(64);

        let reactor = Reactor {
            transport,
            transport_rx,
            command_rx,
            queue: SendQueue::new(),
            flow: GrblFlowState::new(config.rx_buffer_size),
            controller: Controller::new(config.axis_labels.clone()),
            channels: Arc::clone(&channels),
            config,
            lifecycle: ConnectionLifecycle::Opening,
            status_since_last_ack: false,
            pending_wait_sync: Vec::new(),
            pending_probe: None,
            pending_home: None,
            pending_stream: None,
            jog: JogThrottle::new(),
            machine_clock: 0.0,
        };

        let task = tokio::spawn(reactor.run());

        Ok(Self {
            command_tx,
            channels,
            task: StdMutex::new(Some(task)),
        })
    }

    /// Subscribe to the engine's broadcast channels directly, bypassing the
    /// command surface.
    pub fn channels(&self) -> Arc<cncctl_core::EngineChannels> {
        Arc::clone(&self.channels)
    }
}

#[async_trait]
impl ControllerEngine for GrblEngine {
    async fn send(&self, line: String) -> Result<()> {
        self.command_tx
            .send(Command::Send { line, immediate: false })
            .await
            .map_err(|_| Error::internal("engine reactor not running"))
    }

    async fn send_gcode(&self, line: String) -> Result<()> {
        self.send(line).await
    }

    async fn request(&self, line: String) -> Result<String> {
        let (tx, rx) = oneshot::channel();
        self.command_tx
            .send(Command::Request { line, respond: tx })
            .await
            .map_err(|_| Error::internal("engine reactor not running"))?;
        let ack = rx.await.map_err(|_| Error::internal("engine reactor dropped response"))?;
        ack?;
        Ok(String::new())
    }

    async fn move_to(&self, pos: Vec<Option<f64>>, feed: Option<f64>) -> Result<()> {
        let (tx, rx) = oneshot::channel();
        self.command_tx
            .send(Command::Move { pos, feed, respond: tx })
            .await
            .map_err(|_| Error::internal("engine reactor not running"))?;
        rx.await.map_err(|_| Error::internal("engine reactor dropped response"))?
    }

    async fn home(&self, axes: Option<Vec<char>>) -> Result<()> {
        let (tx, rx) = oneshot::channel();
        self.command_tx
            .send(Command::Home { axes, respond: tx })
            .await
            .map_err(|_| Error::internal("engine reactor not running"))?;
        rx.await.map_err(|_| Error::internal("engine reactor dropped response"))?
    }

    async fn probe(&self, target: Vec<Option<f64>>, feed: Option<f64>) -> Result<Vec<f64>> {
        let (tx, rx) = oneshot::channel();
        self.command_tx
            .send(Command::Probe { target, feed, respond: tx })
            .await
            .map_err(|_| Error::internal("engine reactor not running"))?;
        rx.await.map_err(|_| Error::internal("engine reactor dropped response"))?
    }

    async fn wait_sync(&self) -> Result<()> {
        let (tx, rx) = oneshot::channel();
        self.command_tx
            .send(Command::WaitSync { respond: tx })
            .await
            .map_err(|_| Error::internal("engine reactor not running"))?;
        rx.await.map_err(|_| Error::internal("engine reactor dropped response"))?
    }

    async fn hold(&self) -> Result<()> {
        let (tx, rx) = oneshot::channel();
        self.command_tx
            .send(Command::Hold { respond: tx })
            .await
            .map_err(|_| Error::internal("engine reactor not running"))?;
        rx.await.map_err(|_| Error::internal("engine reactor dropped response"))?
    }

    async fn resume(&self) -> Result<()> {
        let (tx, rx) = oneshot::channel();
        self.command_tx
            .send(Command::Resume { respond: tx })
            .await
            .map_err(|_| Error::internal("engine reactor not running"))?;
        rx.await.map_err(|_| Error::internal("engine reactor dropped response"))?
    }

    async fn cancel(&self) -> Result<()> {
        let (tx, rx) = oneshot::channel();
        self.command_tx
            .send(Command::Cancel { respond: tx })
            .await
            .map_err(|_| Error::internal("engine reactor not running"))?;
        rx.await.map_err(|_| Error::internal("engine reactor dropped response"))?
    }

    async fn reset(&self) -> Result<()> {
        let (tx, rx) = oneshot::channel();
        self.command_tx
            .send(Command::Reset { respond: tx })
            .await
            .map_err(|_| Error::internal("engine reactor not running"))?;
        rx.await.map_err(|_| Error::internal("engine reactor dropped response"))?
    }

    async fn send_stream(&self, lines: Vec<String>) -> Result<()> {
        let (tx, rx) = oneshot::channel();
        self.command_tx
            .send(Command::SendStream { lines, respond: tx })
            .await
            .map_err(|_| Error::internal("engine reactor not running"))?;
        rx.await.map_err(|_| Error::internal("engine reactor dropped response"))?
    }

    async fn real_time_move(&self, axis: char, inc: f64) -> Result<bool> {
        let (tx, rx) = oneshot::channel();
        self.command_tx
            .send(Command::RealTimeMove { axis, inc, respond: tx })
            .await
            .map_err(|_| Error::internal("engine reactor not running"))?;
        rx.await.map_err(|_| Error::internal("engine reactor dropped response"))?
    }

    async fn get_status(&self) -> StatusSnapshot {
        let (tx, rx) = oneshot::channel();
        if self.command_tx.send(Command::GetStatus { respond: tx }).await.is_err() {
            return empty_snapshot();
        }
        rx.await.unwrap_or_else(|_| empty_snapshot())
    }

    async fn close(&self) {
        let _ = self.command_tx.send(Command::Close).await;
        let task = self.task.lock().unwrap().take();
        if let Some(task) = task {
            let _ = task.await;
        }
    }
}

fn empty_snapshot() -> StatusSnapshot {
    StatusSnapshot {
        controller: Controller::default_xyz(),
        comms: CommsSnapshot {
            send_queue_length: 0,
            idx_to_send: 0,
            idx_to_ack: 0,
            last_qr_num_free: None,
        },
    }
}

/// Map a taxonomy error to the stable subcode `cancel()` inspects to decide
/// whether position is known after a reset (§4.4.9, §9 Open Question 3).
fn error_subcode(err: &Error) -> Option<String> {
    match err {
        Error::LimitHit(_) => Some("position_unknown".to_string()),
        Error::ProbeNotTripped => Some("probe_not_tripped".to_string()),
        Error::SafetyInterlock(_) => Some("safety_interlock".to_string()),
        _ => None,
    }
}

/// The single task owning everything mutable about a GRBL connection.
struct Reactor {
    transport: SerialTransport,
    transport_rx: mpsc::Receiver<TransportEvent>,
    command_rx: mpsc::Receiver<Command>,
    queue: SendQueue,
    flow: GrblFlowState,
    controller: Controller,
    channels: Arc<cncctl_core::EngineChannels>,
    config: EngineConfig,
    lifecycle: ConnectionLifecycle,
    /// True once a status report has arrived more recently than the last
    /// ack (§4.4.7 `is_synced`).
    status_since_last_ack: bool,
    pending_wait_sync: Vec<oneshot::Sender<Result<()>>>,
    pending_probe: Option<PendingProbe>,
    pending_home: Option<PendingHome>,
    pending_stream: Option<PendingStream>,
    jog: JogThrottle,
    machine_clock: f64,
}

impl Reactor {
    async fn run(mut self) {
        let mut status_interval = interval(Duration::from_millis(self.config.status_update_interval_ms));
        let mut executed_interval = interval(Duration::from_millis(50));
        let welcome_deadline = sleep(Duration::from_secs(5));
        tokio::pin!(welcome_deadline);

        loop {
            tokio::select! {
                cmd = self.command_rx.recv() => {
                    match cmd {
                        Some(c) => {
                            if self.handle_command(c).await {
                                break;
                            }
                        }
                        None => break,
                    }
                }
                event = self.transport_rx.recv() => {
                    match event {
                        Some(e) => self.handle_transport_event(e).await,
                        None => {
                            self.channels.cancel_running_ops("transport closed");
                            break;
                        }
                    }
                }
                _ = status_interval.tick() => {
                    if self.lifecycle == ConnectionLifecycle::Ready {
                        let _ = self.transport.write(vec![crate::firmware::grbl::CMD_QUERY_STATUS]).await;
                    }
                }
                _ = executed_interval.tick() => {
                    self.machine_clock += 0.05;
                    self.flow.executed_loop_tick(&mut self.queue, self.machine_clock);
                    self.service_pending_stream();
                }
                () = &mut welcome_deadline, if self.lifecycle == ConnectionLifecycle::WaitingWelcome => {
                    warn!("grbl welcome timed out, forcing soft reset");
                    let _ = self.transport.write(vec![crate::firmware::grbl::CMD_SOFT_RESET]).await;
                    welcome_deadline.as_mut().reset(TokioInstant::now() + Duration::from_secs(5));
                }
            }
        }

        self.transport.close().await;
        self.cancel_pending_wait_sync("engine closed");
    }

    async fn handle_command(&mut self, cmd: Command) -> bool {
        match cmd {
            Command::Send { line, immediate } => {
                machine_state::apply_modal_gcode(&mut self.controller, &line);
                let entry = SendQueueEntry::new(line, 0.0);
                if immediate {
                    self.queue.enqueue_immediate(entry);
                } else {
                    self.queue.enqueue(entry);
                }
                self.pump_writes().await;
            }
            Command::Request { line, respond } => {
                machine_state::apply_modal_gcode(&mut self.controller, &line);
                self.queue
                    .enqueue(SendQueueEntry::new(line, 0.0).with_hooks(Box::new(AckWaiter::new(respond))));
                self.pump_writes().await;
            }
            Command::Move { pos, feed, respond } => {
                match operations::move_gcode_line(&self.controller.axis_labels, &pos, feed) {
                    Ok(line) => {
                        machine_state::apply_modal_gcode(&mut self.controller, &line);
                        self.queue
                            .enqueue(SendQueueEntry::new(line, 0.0).with_hooks(Box::new(AckWaiter::new(respond))));
                        self.pump_writes().await;
                    }
                    Err(e) => {
                        let _ = respond.send(Err(e));
                    }
                }
            }
            Command::Home { axes, respond } => {
                let line = operations::home_gcode_grbl(axes.as_deref());
                let resolved = operations::resolved_home_axes(
                    &self.controller.axis_labels,
                    &self.controller.homable_axes,
                    axes.as_deref(),
                );
                let line_id = self.queue.enqueue(
                    SendQueueEntry::new(line, 0.0)
                        .with_full_sync(true)
                        .with_hooks(Box::new(AckWaiter::new(respond))),
                );
                self.pending_home = Some(PendingHome {
                    line_id,
                    axes: resolved,
                });
                self.pump_writes().await;
            }
            Command::Probe { target, feed, respond } => {
                if let Err(e) = probe::validate_single_axis_probe(&self.controller.mpos, &target) {
                    let _ = respond.send(Err(e));
                    return false;
                }
                match operations::probe_gcode_line(&self.controller.axis_labels, &target, feed) {
                    Ok(line) => {
                        self.queue.enqueue(SendQueueEntry::new(line, 0.0));
                        self.queue.enqueue(SendQueueEntry::new("$#", 0.0));
                        self.pending_probe = Some(PendingProbe { respond, target });
                        self.pump_writes().await;
                    }
                    Err(e) => {
                        let _ = respond.send(Err(e));
                    }
                }
            }
            Command::WaitSync { respond } => {
                if self.is_synced_now() {
                    let _ = respond.send(Ok(()));
                } else {
                    self.pending_wait_sync.push(respond);
                }
            }
            Command::Hold { respond } => {
                let _ = self.transport.write(vec![crate::firmware::grbl::CMD_FEED_HOLD]).await;
                let _ = respond.send(Ok(()));
            }
            Command::Resume { respond } => {
                let _ = self.transport.write(vec![crate::firmware::grbl::CMD_CYCLE_START]).await;
                let _ = respond.send(Ok(()));
            }
            Command::Cancel { respond } => {
                self.do_cancel().await;
                let _ = respond.send(Ok(()));
            }
            Command::Reset { respond } => {
                let _ = self.transport.write(vec![crate::firmware::grbl::CMD_SOFT_RESET]).await;
                self.queue.cancel_all(&Error::cancelled("reset"));
                self.lifecycle = ConnectionLifecycle::WaitingWelcome;
                self.channels.cancel_running_ops("reset");
                self.cancel_pending_wait_sync("reset");
                let _ = respond.send(Ok(()));
            }
            Command::SendStream { lines, respond } => {
                let mut pending = PendingStream::new(lines, respond);
                pending.top_up(
                    &mut self.queue,
                    self.config.stream_send_queue_high_water_mark,
                    self.config.stream_send_queue_low_water_mark,
                );
                pending.resolve_empty();
                self.pending_stream = Some(pending);
                self.pump_writes().await;
                self.service_pending_stream();
            }
            Command::RealTimeMove { axis, inc, respond } => {
                if self.queue.len() >= self.config.real_time_moves_max_queued {
                    let _ = respond.send(Ok(false));
                } else {
                    let max_feed = self.config.axis_max_feeds.get(&axis).copied().unwrap_or(1000.0);
                    let accepted =
                        self.jog
                            .try_consume(axis, inc, max_feed, self.config.real_time_moves_max_overshoot_factor);
                    if accepted {
                        for line in operations::real_time_move_lines(axis, inc) {
                            self.queue.enqueue_immediate(SendQueueEntry::new(line, 0.0));
                        }
                        self.pump_writes().await;
                    }
                    let _ = respond.send(Ok(accepted));
                }
            }
            Command::GetStatus { respond } => {
                let _ = respond.send(self.snapshot());
            }
            Command::Close => {
                self.channels.cancel_running_ops("closed");
                self.cancel_pending_wait_sync("closed");
                return true;
            }
        }
        false
    }

    async fn handle_transport_event(&mut self, event: TransportEvent) {
        match event {
            TransportEvent::Line(line) => {
                let _ = self.channels.received.send(line.clone());
                self.handle_line(&line).await;
            }
            TransportEvent::Error(msg) => {
                warn!(error = %msg, "grbl transport error");
                self.channels
                    .messages
                    .publish(cncctl_core::Message::warning("transport", msg.clone()));
                self.queue.cancel_all(&Error::comm(msg));
                self.channels.cancel_running_ops("transport error");
                self.cancel_pending_wait_sync("transport error");
                self.lifecycle = ConnectionLifecycle::Retrying;
            }
        }
    }

    async fn handle_line(&mut self, line: &str) {
        match parse_line(line) {
            GrblEvent::Ack { .. } => {
                let ack_id = self.queue.entry_at_ack().map(|e| e.line_id);
                self.flow.on_ack(&mut self.queue, None);
                if let Some(id) = ack_id {
                    let _ = self.channels.ack.send(id);
                    self.complete_pending_home(id);
                }
                self.status_since_last_ack = false;
                self.pump_writes().await;
                self.service_pending_stream();
                self.check_wait_sync();
            }
            GrblEvent::AckError { error, .. } => {
                let ack_id = self.queue.entry_at_ack().map(|e| e.line_id);
                self.controller.error = true;
                self.controller.error_data = Some(ErrorData {
                    subcode: error_subcode(&error),
                    message: error.to_string(),
                });
                self.channels
                    .messages
                    .publish(cncctl_core::Message::warning("grbl", error.to_string()));
                self.flow.on_ack(&mut self.queue, Some(error));
                if let Some(id) = ack_id {
                    let _ = self.channels.ack.send(id);
                }
                self.status_since_last_ack = false;
                self.publish_status();
                self.check_wait_sync();
            }
            GrblEvent::Alarm { error, .. } => {
                self.controller.error = true;
                self.controller.error_data = Some(ErrorData {
                    subcode: error_subcode(&error),
                    message: error.to_string(),
                });
                self.channels
                    .messages
                    .publish(cncctl_core::Message::error("grbl", error.to_string()));
                if let Some(probe) = self.pending_probe.take() {
                    let _ = probe.respond.send(Err(error.clone()));
                } else {
                    self.queue.cancel_all(&error);
                }
                self.channels.cancel_running_ops("alarm");
                self.cancel_pending_wait_sync("alarm");
                self.publish_status();
            }
            GrblEvent::StatusReport(report) => {
                let changed = machine_state::apply_grbl_status(&mut self.controller, &report);
                self.status_since_last_ack = true;
                if self.lifecycle == ConnectionLifecycle::Initializing {
                    self.lifecycle = ConnectionLifecycle::Ready;
                }
                if changed {
                    self.publish_status();
                }
                self.check_wait_sync();
            }
            GrblEvent::Welcome { version } => {
                info!(version = %version, "grbl welcome");
                self.channels
                    .messages
                    .publish(cncctl_core::Message::info("grbl", format!("welcome: {version}")));
                match self.lifecycle {
                    ConnectionLifecycle::WaitingWelcome | ConnectionLifecycle::Opening | ConnectionLifecycle::Retrying => {
                        self.lifecycle = ConnectionLifecycle::Initializing;
                        let _ = self.transport.write(vec![crate::firmware::grbl::CMD_QUERY_STATUS]).await;
                    }
                    _ => {
                        // An unprompted welcome mid-session means the board
                        // reset on its own; treat in-flight work as lost.
                        self.queue.cancel_all(&Error::comm("unexpected welcome"));
                        self.channels.cancel_running_ops("unexpected welcome");
                        self.lifecycle = ConnectionLifecycle::Initializing;
                    }
                }
            }
            GrblEvent::SettingFeedback { .. } => {}
            GrblEvent::Message(text) => {
                debug!(message = %text, "grbl message");
                self.channels.messages.publish(cncctl_core::Message::info("grbl", text));
            }
            GrblEvent::ParserState(text) => {
                machine_state::apply_modal_gcode(&mut self.controller, &text);
            }
            GrblEvent::ParameterFeedback { name, value } => {
                if name == "PRB" {
                    if let Some(pending) = self.pending_probe.take() {
                        match probe::grbl_probe_tripped(&value) {
                            Ok((coords, tripped)) => {
                                if tripped {
                                    let _ = pending.respond.send(Ok(coords));
                                } else {
                                    let _ = pending.respond.send(Err(Error::probe_not_tripped()));
                                }
                            }
                            Err(e) => {
                                let _ = pending.respond.send(Err(e));
                            }
                        }
                    }
                }
            }
            GrblEvent::Ignored => {}
            GrblEvent::Unrecognized(text) => {
                debug!(line = %text, "unrecognized grbl line");
            }
        }
    }

    /// Hold, soft-reset, await welcome, and conditionally unlock — GRBL's
    /// `cancel` sequence (§4.4.9, §9 Open Question 3).
    async fn do_cancel(&mut self) {
        let _ = self.transport.write(vec![crate::firmware::grbl::CMD_FEED_HOLD]).await;

        let hold_wait = sleep(Duration::from_millis(500));
        tokio::pin!(hold_wait);
        loop {
            tokio::select! {
                () = &mut hold_wait => break,
                event = self.transport_rx.recv() => {
                    match event {
                        Some(e) => {
                            self.handle_transport_event(e).await;
                            if self.controller.held {
                                break;
                            }
                        }
                        None => break,
                    }
                }
            }
        }

        let position_unknown = self
            .controller
            .error_data
            .as_ref()
            .and_then(|d| d.subcode.as_deref())
            == Some("position_unknown");

        let _ = self.transport.write(vec![crate::firmware::grbl::CMD_SOFT_RESET]).await;
        self.lifecycle = ConnectionLifecycle::WaitingWelcome;
        self.queue.cancel_all(&Error::cancelled("cancel"));
        self.channels.cancel_running_ops("cancel");
        self.cancel_pending_wait_sync("cancel");

        let welcome_wait = sleep(Duration::from_secs(5));
        tokio::pin!(welcome_wait);
        let mut saw_welcome = false;
        loop {
            tokio::select! {
                () = &mut welcome_wait => break,
                event = self.transport_rx.recv() => {
                    match event {
                        Some(TransportEvent::Line(line)) => {
                            if let GrblEvent::Welcome { .. } = parse_line(&line) {
                                saw_welcome = true;
                                break;
                            }
                        }
                        Some(TransportEvent::Error(_)) | None => break,
                    }
                }
            }
        }

        if saw_welcome {
            self.lifecycle = ConnectionLifecycle::Initializing;
            if position_unknown {
                // Silent unlock: the firmware's `[MSG:Caution: Unlocked]` is
                // expected here and not surfaced as an error.
                self.queue.enqueue(SendQueueEntry::new("$X", 0.0));
            }
            self.lifecycle = ConnectionLifecycle::Ready;
        }
        self.controller.error = false;
        self.controller.error_data = None;
        self.pump_writes().await;
    }

    /// Run the dialect admission pass and write whatever it admits.
    async fn pump_writes(&mut self) {
        let lines = self.flow.admit(&mut self.queue);
        for line in lines {
            let mut data = line.into_bytes();
            data.push(b'\n');
            if let Err(e) = self.transport.write(data).await {
                self.queue.cancel_all(&e);
                self.channels.cancel_running_ops("write failed");
                return;
            }
        }
    }

    fn service_pending_stream(&mut self) {
        if let Some(stream) = self.pending_stream.as_mut() {
            stream.top_up(
                &mut self.queue,
                self.config.stream_send_queue_high_water_mark,
                self.config.stream_send_queue_low_water_mark,
            );
            if stream.fully_drained() {
                self.pending_stream = None;
            }
        }
    }

    fn is_synced_now(&self) -> bool {
        super::is_synced(
            self.controller.ready,
            self.controller.held,
            self.controller.moving,
            self.queue.drained(),
            false,
            self.status_since_last_ack,
        )
    }

    fn check_wait_sync(&mut self) {
        if !self.pending_wait_sync.is_empty() && self.is_synced_now() {
            for tx in self.pending_wait_sync.drain(..) {
                let _ = tx.send(Ok(()));
            }
        }
    }

    fn cancel_pending_wait_sync(&mut self, reason: &str) {
        for tx in self.pending_wait_sync.drain(..) {
            let _ = tx.send(Err(Error::cancelled(reason)));
        }
    }

    /// GRBL's `$H` is full-sync: its `ok` only arrives once the homing cycle
    /// itself has finished, so that ack is the homing-complete signal (§9
    /// Open Question 1). Zero the homed axes and mark them homed; the next
    /// status report overwrites `mpos` with the firmware's own account.
    fn complete_pending_home(&mut self, acked_line_id: f64) {
        let Some(home) = &self.pending_home else { return };
        if home.line_id != acked_line_id {
            return;
        }
        let home = self.pending_home.take().unwrap();
        for i in home.axes {
            if let Some(p) = self.controller.mpos.get_mut(i) {
                *p = 0.0;
            }
            if let Some(h) = self.controller.homed.get_mut(i) {
                *h = true;
            }
        }
    }

    fn snapshot(&self) -> StatusSnapshot {
        StatusSnapshot {
            controller: self.controller.clone(),
            comms: CommsSnapshot {
                send_queue_length: self.queue.len(),
                idx_to_send: self.queue.idx_to_send(),
                idx_to_ack: self.queue.idx_to_ack(),
                last_qr_num_free: None,
            },
        }
    }

    fn publish_status(&self) {
        self.channels.publish_status(self.snapshot());
    }
}
