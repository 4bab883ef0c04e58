//! The serial transport (§4.1): owns the serial port, emits framed lines,
//! accepts raw byte writes, and reopens the port on failure.
//!
//! The port itself is blocking (see [`crate::communication::serial`]), so
//! all I/O runs on a dedicated blocking thread; the async reactor only ever
//! sees [`TransportEvent`]s arriving on a channel and calls
//! [`SerialTransport::write`], which hands bytes to that same thread.

use crate::communication::serial::{RealSerialPort, SerialPort};
use crate::communication::ConnectionParams;
use cncctl_core::{Error, Result};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex as StdMutex};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{sleep, Duration};

/// Reconnect delay after an I/O error or unexpected close (§4.1, §5).
pub const RECONNECT_DELAY: Duration = Duration::from_secs(5);

/// Bytes the transport strips before line framing: NUL, XON, XOFF.
const STRIP_BYTES: [u8; 3] = [0x00, 0x11, 0x13];

/// Event emitted upward by the transport.
#[derive(Debug, Clone)]
pub enum TransportEvent {
    /// A complete line, split on CR/LF, with framing bytes already removed.
    Line(String),
    /// The port failed or closed unexpectedly.
    Error(String),
}

struct LineFramer {
    partial: Vec<u8>,
}

impl LineFramer {
    fn new() -> Self {
        Self {
            partial: Vec::new(),
        }
    }

    /// Feed raw bytes in; returns any complete lines found, in order. A
    /// trailing partial line (no CR/LF yet) is buffered for the next call.
    fn feed(&mut self, data: &[u8]) -> Vec<String> {
        let mut lines = Vec::new();
        for &b in data {
            if STRIP_BYTES.contains(&b) {
                continue;
            }
            if b == b'\r' || b == b'\n' {
                if !self.partial.is_empty() {
                    lines.push(String::from_utf8_lossy(&self.partial).into_owned());
                    self.partial.clear();
                }
            } else {
                self.partial.push(b);
            }
        }
        lines
    }
}

/// Drives a [`SerialPort`] on a blocking thread, reopening it on failure
/// while `retry` stays set.
pub struct SerialTransport {
    port: Arc<StdMutex<Option<Box<dyn SerialPort>>>>,
    params: ConnectionParams,
    retry: Arc<AtomicBool>,
    reader_task: Option<JoinHandle<()>>,
}

impl SerialTransport {
    /// Open the port and start the blocking read loop. Returns an event
    /// receiver the caller should poll for framed lines and errors.
    pub async fn connect(
        params: ConnectionParams,
        retry: bool,
    ) -> Result<(Self, mpsc::Receiver<TransportEvent>)> {
        params.validate()?;

        let params_for_open = params.clone();
        let opened = tokio::task::spawn_blocking(move || RealSerialPort::open(&params_for_open))
            .await
            .map_err(|e| Error::internal(format!("serial open task panicked: {e}")))??;

        let port: Arc<StdMutex<Option<Box<dyn SerialPort>>>> =
            Arc::new(StdMutex::new(Some(Box::new(opened))));
        let retry = Arc::new(AtomicBool::new(retry));
        let (tx, rx) = mpsc::channel(256);

        let reader_task = spawn_reader(Arc::clone(&port), params.clone(), Arc::clone(&retry), tx);

        Ok((
            Self {
                port,
                params,
                retry,
                reader_task: Some(reader_task),
            },
            rx,
        ))
    }

    /// Write bytes to the wire. Blocking I/O runs on a blocking thread so the
    /// async reactor is never stalled by a slow or wedged port.
    pub async fn write(&self, data: Vec<u8>) -> Result<usize> {
        let port = Arc::clone(&self.port);
        tokio::task::spawn_blocking(move || {
            let mut guard = port.lock().unwrap();
            match guard.as_mut() {
                Some(p) => p.write(&data).map_err(|e| Error::comm(e.to_string())),
                None => Err(Error::comm("port not open")),
            }
        })
        .await
        .map_err(|e| Error::internal(format!("serial write task panicked: {e}")))?
    }

    pub fn set_retry(&self, retry: bool) {
        self.retry.store(retry, Ordering::SeqCst);
    }

    pub fn port_name(&self) -> &str {
        &self.params.port
    }

    /// Close the port and stop retrying.
    pub async fn close(&mut self) {
        self.retry.store(false, Ordering::SeqCst);
        if let Some(task) = self.reader_task.take() {
            task.abort();
        }
        let port = Arc::clone(&self.port);
        let _ = tokio::task::spawn_blocking(move || {
            if let Some(mut p) = port.lock().unwrap().take() {
                let _ = p.close();
            }
        })
        .await;
    }
}

fn spawn_reader(
    port: Arc<StdMutex<Option<Box<dyn SerialPort>>>>,
    params: ConnectionParams,
    retry: Arc<AtomicBool>,
    tx: mpsc::Sender<TransportEvent>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            let port_for_loop = Arc::clone(&port);
            let tx_for_loop = tx.clone();
            let read_result = tokio::task::spawn_blocking(move || {
                read_loop_until_error(port_for_loop, tx_for_loop)
            })
            .await;

            match read_result {
                Ok(()) => {}
                Err(e) => {
                    let _ = tx.send(TransportEvent::Error(format!("reader task panicked: {e}"))).await;
                }
            }

            if !retry.load(Ordering::SeqCst) {
                break;
            }

            sleep(RECONNECT_DELAY).await;

            let params_for_open = params.clone();
            match tokio::task::spawn_blocking(move || RealSerialPort::open(&params_for_open)).await
            {
                Ok(Ok(reopened)) => {
                    *port.lock().unwrap() = Some(Box::new(reopened));
                }
                _ => {
                    let _ = tx
                        .send(TransportEvent::Error(format!(
                            "failed to reopen {}",
                            params.port
                        )))
                        .await;
                    // loop again after another RECONNECT_DELAY
                }
            }
        }
    })
}

/// Blocking loop: read until the port errors, emitting `Line` events for
/// every complete line and exiting on the first I/O error.
fn read_loop_until_error(
    port: Arc<StdMutex<Option<Box<dyn SerialPort>>>>,
    tx: mpsc::Sender<TransportEvent>,
) {
    let mut framer = LineFramer::new();
    let mut buf = [0u8; 1024];
    loop {
        let n = {
            let mut guard = port.lock().unwrap();
            match guard.as_mut() {
                Some(p) => match p.read(&mut buf) {
                    Ok(n) => n,
                    Err(e)
                        if matches!(
                            e.kind(),
                            std::io::ErrorKind::WouldBlock | std::io::ErrorKind::TimedOut
                        ) =>
                    {
                        0
                    }
                    Err(e) => {
                        let _ = tx.blocking_send(TransportEvent::Error(e.to_string()));
                        return;
                    }
                },
                None => return,
            }
        };

        if n == 0 {
            // Timed read with nothing available; yield briefly so the
            // blocking thread doesn't spin.
            std::thread::sleep(std::time::Duration::from_millis(5));
            continue;
        }

        for line in framer.feed(&buf[..n]) {
            if tx.blocking_send(TransportEvent::Line(line)).is_err() {
                return;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn line_framer_splits_on_cr_lf_and_strips_control_bytes() {
        let mut framer = LineFramer::new();
        let lines = framer.feed(b"ok\r\n\x11<Idle|MPos:0,0,0>\x00\r\n");
        assert_eq!(lines, vec!["ok".to_string(), "<Idle|MPos:0,0,0>".to_string()]);
    }

    #[test]
    fn line_framer_buffers_partial_tail_across_feeds() {
        let mut framer = LineFramer::new();
        assert!(framer.feed(b"ok").is_empty());
        let lines = framer.feed(b"\r\n");
        assert_eq!(lines, vec!["ok".to_string()]);
    }

    #[test]
    fn line_framer_ignores_bare_cr_lf_with_no_content() {
        let mut framer = LineFramer::new();
        assert!(framer.feed(b"\r\n\r\n").is_empty());
    }
}
