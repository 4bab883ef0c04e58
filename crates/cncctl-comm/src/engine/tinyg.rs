//! TinyG dialect driver: the reactor task for a TinyG connection, driving
//! queue-report-based admission control and the planner mirror instead of
//! GRBL's character count and executed-loop timer.
//!
//! Builds on the polling-task / `Notify`-shutdown shape
//! (`firmware::tinyg::controller::TinyGController`) for the reactor
//! structure; the flow control itself ([`crate::queue::tinyg`]) has no
//! direct precedent to build on and is built from the queue-report
//! protocol directly.

use async_trait::async_trait;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time::{interval, sleep, Duration};
use tracing::{debug, info, warn};

use cncctl_core::state::{CommsSnapshot, Controller, ErrorData, SendQueueEntry, StatusSnapshot};
use cncctl_core::{Error, Result};

use crate::codec::tinyg::{encode_command, parse_line, TinyGEvent, TinyGValue};
use crate::config::{EngineConfig, ProbeCoordFrame};
use crate::engine::{AckWaiter, Command, ConnectionLifecycle, ControllerEngine};
use crate::machine_state;
use crate::operations::{self, probe, JogThrottle, PendingStream};
use crate::queue::tinyg::TinyGFlowState;
use crate::queue::SendQueue;
use crate::transport::{SerialTransport, TransportEvent};

use std::sync::{Arc, Mutex as StdMutex};

/// A probe cycle in progress. TinyG reports the stop position via an
/// explicit `prb` parameter request rather than volunteering one, so the
/// reactor drives a short settle-then-ask sequence before arming this.
struct PendingProbe {
    respond: oneshot::Sender<Result<Vec<f64>>>,
    target: Vec<Option<f64>>,
    /// Line ID of the queued `G38.2`, used to notice its ack and start the
    /// 250ms settle timer (§4.6).
    probe_line_id: f64,
    /// Once set, the settle timer is armed and will fire at this instant.
    settle_deadline: Option<tokio::time::Instant>,
    /// Active coord system at the time the probe was issued, restored once
    /// the probe resolves (firmware sometimes resets it, §4.6).
    saved_coord_sys: Option<u8>,
}

/// A `home` call in progress: the line id of the (full-sync) `G28.2` so its
/// ack can be matched, and the axis indices to zero once it lands (§9 Open
/// Question 1).
struct PendingHome {
    line_id: f64,
    axes: Vec<usize>,
}

/// Handle to a running TinyG connection.
pub struct TinyGEngine {
    command_tx: mpsc::Sender<Command>,
    channels: Arc<cncctl_core::EngineChannels>,
    task: StdMutex<Option<JoinHandle<()>>>,
}

impl TinyGEngine {
    pub async fn connect(config: EngineConfig) -> Result<Self> {
        let channels = Arc::new(cncctl_core::EngineChannels::new());
        let (transport, transport_rx) = SerialTransport::connect(config.connection.clone(), true).await?;
        let (command_tx, command_rx) = mpsc::channel(64);

        let planner_queue_size = crate::firmware::tinyg::DEFAULT_PLANNER_QUEUE_SIZE;
        let reactor = Reactor {
            transport,
            transport_rx,
            command_rx,
            queue: SendQueue::new(),
            flow: TinyGFlowState::new(planner_queue_size, config.max_unacked_requests),
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
            disable_sending: false,
            disable_response_error_event: false,
        };

        let task = tokio::spawn(reactor.run());

        Ok(Self {
            command_tx,
            channels,
            task: StdMutex::new(Some(task)),
        })
    }

    pub fn channels(&self) -> Arc<cncctl_core::EngineChannels> {
        Arc::clone(&self.channels)
    }
}

#[async_trait]
impl ControllerEngine for TinyGEngine {
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

fn error_subcode(err: &Error) -> Option<String> {
    match err {
        Error::LimitHit(_) => Some("position_unknown".to_string()),
        Error::ProbeNotTripped | Error::ProbeInitialState(_) => Some("probe_not_tripped".to_string()),
        Error::SafetyInterlock(_) => Some("safety_interlock".to_string()),
        _ => None,
    }
}

/// The single task owning everything mutable about a TinyG connection.
struct Reactor {
    transport: SerialTransport,
    transport_rx: mpsc::Receiver<TransportEvent>,
    command_rx: mpsc::Receiver<Command>,
    queue: SendQueue,
    flow: TinyGFlowState,
    controller: Controller,
    channels: Arc<cncctl_core::EngineChannels>,
    config: EngineConfig,
    lifecycle: ConnectionLifecycle,
    status_since_last_ack: bool,
    pending_wait_sync: Vec<oneshot::Sender<Result<()>>>,
    pending_probe: Option<PendingProbe>,
    pending_home: Option<PendingHome>,
    pending_stream: Option<PendingStream>,
    jog: JogThrottle,
    /// Set for the duration of a probe cycle (including its coordinate-frame
    /// detection sub-probe, if run) to block all background traffic other
    /// than the probe line itself (§4.6).
    disable_sending: bool,
    /// Set alongside `disable_sending`: suppresses the top-level `error`
    /// event / message for alarms expected during an active probe, since
    /// the probe operation handles them locally (§4.6, §7).
    disable_response_error_event: bool,
}

impl Reactor {
    async fn run(mut self) {
        let mut status_interval = interval(Duration::from_millis(self.config.status_update_interval_ms));
        let mut probe_settle_interval = interval(Duration::from_millis(50));
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
                    if self.lifecycle == ConnectionLifecycle::Ready && !self.disable_sending {
                        let _ = self.transport.write(format!("{}\n", encode_command("sr", TinyGValue::Null)).into_bytes()).await;
                    }
                }
                _ = probe_settle_interval.tick() => {
                    self.check_probe_settle().await;
                }
                () = &mut welcome_deadline, if self.lifecycle == ConnectionLifecycle::WaitingWelcome => {
                    warn!("tinyg welcome timed out, requesting status directly");
                    let _ = self.transport.write(format!("{}\n", encode_command("sr", TinyGValue::Null)).into_bytes()).await;
                    self.lifecycle = ConnectionLifecycle::Initializing;
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
                let entry = SendQueueEntry::new(encode_command("gc", TinyGValue::String(line)), 0.0);
                if immediate {
                    self.queue.enqueue_immediate(entry);
                } else {
                    self.queue.enqueue(entry);
                }
                self.pump_writes().await;
            }
            Command::Request { line, respond } => {
                machine_state::apply_modal_gcode(&mut self.controller, &line);
                let wire = encode_command("gc", TinyGValue::String(line));
                self.queue
                    .enqueue(SendQueueEntry::new(wire, 0.0).with_hooks(Box::new(AckWaiter::new(respond))));
                self.pump_writes().await;
            }
            Command::Move { pos, feed, respond } => {
                match operations::move_gcode_line(&self.controller.axis_labels, &pos, feed) {
                    Ok(line) => {
                        machine_state::apply_modal_gcode(&mut self.controller, &line);
                        let wire = encode_command("gc", TinyGValue::String(line));
                        self.queue
                            .enqueue(SendQueueEntry::new(wire, 0.0).with_hooks(Box::new(AckWaiter::new(respond))));
                        self.pump_writes().await;
                    }
                    Err(e) => {
                        let _ = respond.send(Err(e));
                    }
                }
            }
            Command::Home { axes, respond } => {
                let line = operations::home_gcode_tinyg(&self.controller.axis_labels, &self.controller.used_axes, axes.as_deref());
                let resolved = operations::resolved_home_axes(
                    &self.controller.axis_labels,
                    &self.controller.homable_axes,
                    axes.as_deref(),
                );
                let wire = encode_command("gc", TinyGValue::String(line));
                let line_id = self.queue.enqueue(
                    SendQueueEntry::new(wire, 0.0)
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
                let axis_idx = match probe::validate_single_axis_probe(&self.controller.mpos, &target) {
                    Ok(idx) => idx,
                    Err(e) => {
                        let _ = respond.send(Err(e));
                        return false;
                    }
                };
                let axis_label = self.controller.axis_labels[axis_idx];
                let coord_offset = self.active_coord_offset(axis_idx);

                // Only bother disambiguating the frame when an offset is
                // actually in play; with no offset, either interpretation
                // lands on the same machine coordinate (§4.6).
                let frame = if self.config.probe_uses_machine_coords == ProbeCoordFrame::AutoDetect
                    && coord_offset.abs() > 1e-9
                {
                    self.disable_sending = true;
                    self.disable_response_error_event = true;
                    let detected = self.detect_coord_frame(axis_label, axis_idx).await;
                    self.config.probe_uses_machine_coords = detected;
                    detected
                } else {
                    self.config.probe_uses_machine_coords
                };

                let mut wire_target = target.clone();
                if let Some(want) = wire_target[axis_idx] {
                    wire_target[axis_idx] = Some(probe::adjust_probe_target_for_frame(want, coord_offset, frame));
                }

                match operations::probe_gcode_line(&self.controller.axis_labels, &wire_target, feed) {
                    Ok(line) => {
                        let wire = encode_command("gc", TinyGValue::String(line));
                        // Re-enable sending just long enough to admit this one
                        // full_sync probe entry, then block everything else
                        // until the probe and its settle sequence resolve.
                        self.disable_sending = false;
                        let probe_line_id = self.queue.enqueue(SendQueueEntry::new(wire, 0.0).with_full_sync(true));
                        self.pending_probe = Some(PendingProbe {
                            respond,
                            target,
                            probe_line_id,
                            settle_deadline: None,
                            saved_coord_sys: self.controller.active_coord_sys,
                        });
                        self.pump_writes().await;
                        self.disable_sending = true;
                        self.disable_response_error_event = true;
                    }
                    Err(e) => {
                        self.disable_sending = false;
                        self.disable_response_error_event = false;
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
                let _ = self.transport.write(vec![crate::firmware::tinyg::CMD_FEED_HOLD]).await;
                let _ = respond.send(Ok(()));
            }
            Command::Resume { respond } => {
                let _ = self.transport.write(vec![crate::firmware::tinyg::CMD_CYCLE_START]).await;
                let _ = respond.send(Ok(()));
            }
            Command::Cancel { respond } => {
                self.do_cancel().await;
                let _ = respond.send(Ok(()));
            }
            Command::Reset { respond } => {
                let _ = self.transport.write(encode_command("clear", TinyGValue::Null).into_bytes()).await;
                self.queue.cancel_all(&Error::cancelled("reset"));
                self.lifecycle = ConnectionLifecycle::Initializing;
                self.channels.cancel_running_ops("reset");
                self.cancel_pending_wait_sync("reset");
                let _ = respond.send(Ok(()));
            }
            Command::SendStream { lines, respond } => {
                let wire_lines = lines
                    .into_iter()
                    .map(|l| encode_command("gc", TinyGValue::String(l)))
                    .collect();
                let mut pending = PendingStream::new(wire_lines, respond);
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
                            let wire = encode_command("gc", TinyGValue::String(line));
                            self.queue.enqueue_immediate(SendQueueEntry::new(wire, 0.0));
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
                warn!(error = %msg, "tinyg transport error");
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
            TinyGEvent::Ack { footer, .. } => {
                let error = footer.as_ref().and_then(|f| decode_footer_error(f));
                let ack_id = self.queue.entry_at_ack().map(|e| e.line_id);
                if let Some(err) = &error {
                    self.controller.error = true;
                    self.controller.error_data = Some(ErrorData {
                        subcode: error_subcode(err),
                        message: err.to_string(),
                    });
                }
                self.flow.on_ack(&mut self.queue, error);
                if let Some(id) = ack_id {
                    let _ = self.channels.ack.send(id);
                    self.complete_pending_home(id);
                }
                if let Some(probe) = self.pending_probe.as_mut() {
                    if Some(probe.probe_line_id) == ack_id {
                        // A wrapped probe report sometimes arrives right on
                        // the ack's heels; wait it out before asking for
                        // `prb` explicitly (§4.6).
                        probe.settle_deadline = Some(tokio::time::Instant::now() + Duration::from_millis(250));
                    }
                }
                self.status_since_last_ack = false;
                self.pump_writes().await;
                self.service_pending_stream();
                self.check_wait_sync();
                self.publish_status();
            }
            TinyGEvent::Welcome => {
                info!("tinyg welcome");
                self.channels
                    .messages
                    .publish(cncctl_core::Message::info("tinyg", "SYSTEM READY"));
                match self.lifecycle {
                    ConnectionLifecycle::WaitingWelcome | ConnectionLifecycle::Opening | ConnectionLifecycle::Retrying => {
                        self.lifecycle = ConnectionLifecycle::Initializing;
                        let _ = self
                            .transport
                            .write(format!("{}\n", encode_command("sr", TinyGValue::Null)).into_bytes())
                            .await;
                    }
                    _ => {
                        self.queue.cancel_all(&Error::comm("unexpected welcome"));
                        self.channels.cancel_running_ops("unexpected welcome");
                        self.lifecycle = ConnectionLifecycle::Initializing;
                    }
                }
            }
            TinyGEvent::StatusReport(fields) => {
                let changed = machine_state::apply_tinyg_status(&mut self.controller, &fields);
                self.status_since_last_ack = true;
                if self.lifecycle == ConnectionLifecycle::Initializing {
                    self.lifecycle = ConnectionLifecycle::Ready;
                }
                if changed {
                    self.publish_status();
                }
                self.check_wait_sync();
            }
            TinyGEvent::QueueReport { qr, qi, qo } => {
                self.flow.on_queue_report(&mut self.queue, qr, qi, qo);
                self.service_pending_stream();
                self.check_wait_sync();
            }
            TinyGEvent::Error { error, .. } => {
                // An active probe expects exactly this kind of noise (soft
                // alarms from a deliberately out-of-range target, the
                // cancel-and-clear of the detection sub-probe); absorb it
                // locally instead of escalating to a top-level error (§4.6, §7).
                if self.disable_response_error_event {
                    if let Some(pending) = self.pending_probe.take() {
                        self.disable_sending = false;
                        self.disable_response_error_event = false;
                        let _ = pending.respond.send(Err(error));
                    }
                    return;
                }
                self.controller.error = true;
                self.controller.error_data = Some(ErrorData {
                    subcode: error_subcode(&error),
                    message: error.to_string(),
                });
                self.channels
                    .messages
                    .publish(cncctl_core::Message::error("tinyg", error.to_string()));
                if let Some(pending) = self.pending_probe.take() {
                    let _ = pending.respond.send(Err(error.clone()));
                } else {
                    self.queue.cancel_all(&error);
                }
                self.channels.cancel_running_ops("error");
                self.cancel_pending_wait_sync("error");
                self.publish_status();
            }
            TinyGEvent::Parameter { name, value } => {
                if name == "prb" {
                    self.handle_prb_parameter(&value).await;
                }
            }
            TinyGEvent::Message(text) => {
                debug!(message = %text, "tinyg message");
                self.channels.messages.publish(cncctl_core::Message::info("tinyg", text));
            }
            TinyGEvent::Unrecognized(text) => {
                debug!(line = %text, "unrecognized tinyg line");
            }
        }
    }

    async fn handle_prb_parameter(&mut self, value: &TinyGValue) {
        let Some(pending) = self.pending_probe.take() else {
            return;
        };
        self.disable_sending = false;
        self.disable_response_error_event = false;
        self.restore_coord_system(pending.saved_coord_sys).await;
        let stop_pos: Vec<f64> = self
            .controller
            .axis_labels
            .iter()
            .filter_map(|label| {
                value
                    .get(&label.to_ascii_lowercase().to_string())
                    .and_then(TinyGValue::as_f64)
            })
            .collect();
        if stop_pos.len() != self.controller.axis_labels.len() {
            let _ = pending
                .respond
                .send(Err(Error::parse_error("incomplete prb report")));
            return;
        }
        let firmware_flag = value.get("e").and_then(TinyGValue::as_f64).map(|e| e != 0.0);
        let tripped = probe::tinyg_probe_tripped(&stop_pos, &pending.target, firmware_flag);
        if tripped {
            let _ = pending.respond.send(Ok(stop_pos));
        } else {
            let _ = pending.respond.send(Err(Error::probe_not_tripped()));
        }
    }

    /// The firmware sometimes resets the active coordinate system across a
    /// probe cycle; reselect whatever was active before the probe (§4.6).
    async fn restore_coord_system(&mut self, saved: Option<u8>) {
        if let Some(idx) = saved {
            let word = format!("G{}", 54 + idx);
            let wire = encode_command("gc", TinyGValue::String(word));
            let _ = self.transport.write(format!("{wire}\n").into_bytes()).await;
        }
    }

    /// Total active offset (coord-system + enabled G92) for one axis —
    /// equivalently `mpos - wpos` for that axis, reusing the same formula
    /// `Controller::derive_wpos` applies (§4.3, §4.6).
    fn active_coord_offset(&self, axis_idx: usize) -> f64 {
        let wpos = self.controller.derive_wpos();
        self.controller.mpos.get(axis_idx).copied().unwrap_or(0.0)
            - wpos.get(axis_idx).copied().unwrap_or(0.0)
    }

    /// Coordinate-frame detection probe (§4.6): command a target numerically
    /// equal to the current machine position, so a firmware that applies the
    /// active offset on top of it (work-frame semantics) actually moves the
    /// axis before we cancel, while one that takes the parameter as a raw
    /// machine coordinate (machine-frame semantics) does not. Cancel
    /// immediately (`!`, `%`, `{clear:null}`) and read `mpo<axis>` back to
    /// decide which happened.
    async fn detect_coord_frame(&mut self, axis_label: char, axis_idx: usize) -> ProbeCoordFrame {
        let pre = self.controller.mpos.get(axis_idx).copied().unwrap_or(0.0);
        let probe_word = format!("G38.2 {axis_label}{pre} F50");
        let _ = self
            .transport
            .write(format!("{}\n", encode_command("gc", TinyGValue::String(probe_word))).into_bytes())
            .await;

        sleep(Duration::from_millis(80)).await;
        let _ = self.transport.write(b"!\n".to_vec()).await;
        let _ = self.transport.write(b"%\n".to_vec()).await;
        let _ = self
            .transport
            .write(format!("{}\n", encode_command("clear", TinyGValue::Null)).into_bytes())
            .await;

        let mpo_key = format!("mpo{}", axis_label.to_ascii_lowercase());
        let _ = self
            .transport
            .write(format!("{}\n", encode_command(&mpo_key, TinyGValue::Null)).into_bytes())
            .await;

        let mut post = pre;
        let deadline = sleep(Duration::from_millis(300));
        tokio::pin!(deadline);
        loop {
            tokio::select! {
                () = &mut deadline => break,
                event = self.transport_rx.recv() => {
                    match event {
                        Some(TransportEvent::Line(line)) => {
                            let _ = self.channels.received.send(line.clone());
                            if let TinyGEvent::Parameter { name, value } = parse_line(&line) {
                                if name == mpo_key {
                                    post = value.as_f64().unwrap_or(pre);
                                    break;
                                }
                            }
                            self.handle_line(&line).await;
                        }
                        Some(other) => self.handle_transport_event(other).await,
                        None => break,
                    }
                }
            }
        }

        probe::resolved_coord_frame(pre, post)
    }

    /// Once the 250ms post-ack settle window has passed, discard a possible
    /// spurious wrapped probe report, send `{clear:null}` in case a soft
    /// alarm was raised, and explicitly request the `prb` parameter rather
    /// than waiting for the firmware to volunteer one (§4.6).
    async fn check_probe_settle(&mut self) {
        let Some(probe) = self.pending_probe.as_mut() else {
            return;
        };
        let Some(deadline) = probe.settle_deadline else {
            return;
        };
        if tokio::time::Instant::now() < deadline {
            return;
        }
        probe.settle_deadline = None;
        let _ = self
            .transport
            .write(format!("{}\n", encode_command("clear", TinyGValue::Null)).into_bytes())
            .await;
        let _ = self
            .transport
            .write(format!("{}\n", encode_command("prb", TinyGValue::Null)).into_bytes())
            .await;
    }

    /// Hold, wipe the planner, and stop spindle/coolant — TinyG's `cancel`
    /// sequence (§4.4.9, §9 Open Question 3).
    async fn do_cancel(&mut self) {
        let _ = self.transport.write(b"!\n".to_vec()).await;

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

        let _ = self.transport.write(b"%\n".to_vec()).await;
        self.queue.cancel_all(&Error::cancelled("cancel"));
        self.channels.cancel_running_ops("cancel");
        self.cancel_pending_wait_sync("cancel");
        if let Some(pending) = self.pending_probe.take() {
            let _ = pending.respond.send(Err(Error::cancelled("cancel")));
        }
        self.disable_sending = false;
        self.disable_response_error_event = false;

        // The wipe needs a moment to settle before further commands land
        // reliably in the planner.
        sleep(Duration::from_millis(3500)).await;

        let _ = self
            .transport
            .write(format!("{}\n", encode_command("gc", TinyGValue::String("M5".to_string()))).into_bytes())
            .await;
        let _ = self
            .transport
            .write(format!("{}\n", encode_command("gc", TinyGValue::String("M9".to_string()))).into_bytes())
            .await;

        self.controller.error = false;
        self.controller.error_data = None;
        self.lifecycle = ConnectionLifecycle::Ready;
    }

    async fn pump_writes(&mut self) {
        if self.disable_sending {
            return;
        }
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

    /// TinyG's `G28.2` is sent full-sync; its ack only arrives once the
    /// homing cycle itself has finished, so that ack is the homing-complete
    /// signal (§9 Open Question 1). Zero the homed axes and mark them
    /// homed; the next status report overwrites `mpos` with the firmware's
    /// own account.
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
                last_qr_num_free: self.flow.last_qr_num_free,
            },
        }
    }

    fn publish_status(&self) {
        self.channels.publish_status(self.snapshot());
    }
}

/// TinyG footer codes below 200 indicate failure; fold them to the stable
/// taxonomy the same way `{er:...}` is decoded.
fn decode_footer_error(footer: &[f64]) -> Option<Error> {
    let code = *footer.first()? as u16;
    if code < 200 {
        return None;
    }
    match code {
        204 => Some(Error::limit_hit("footer reported limit condition")),
        _ => Some(Error::machine_error(format!("footer status code {code}"))),
    }
}
