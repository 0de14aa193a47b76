use super::lines::LineSplitter;
use crate::metrics::Metrics;
use crate::models::{MONITOR_BAUD_RATES, SerialEvent};
use std::io::{self, Read, Write};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, mpsc as std_mpsc};
use std::thread::{self, JoinHandle};
use std::time::Duration;
use thiserror::Error;
use tokio::sync::mpsc;

pub const DEFAULT_READ_TIMEOUT: Duration = Duration::from_secs(1);
pub const DEFAULT_JOIN_TIMEOUT: Duration = Duration::from_secs(1);

pub type SerialSender = mpsc::UnboundedSender<SerialEvent>;
pub type SerialReceiver = mpsc::UnboundedReceiver<SerialEvent>;

/// Create the serial bridge's event queue.
pub fn serial_channel() -> (SerialSender, SerialReceiver) {
    mpsc::unbounded_channel()
}

#[derive(Error, Debug)]
pub enum SerialError {
    #[error("Unsupported baud rate: {0}")]
    UnsupportedBaud(u32),

    #[error("Already connected to {0}")]
    AlreadyConnected(String),

    #[error("Could not open {port}: {reason}")]
    Open { port: String, reason: String },

    #[error("Serial write failed: {0}")]
    Write(#[source] io::Error),

    #[error("Could not start serial reader: {0}")]
    Spawn(#[source] io::Error),
}

/// Independent read and write halves of one open port.
pub struct SerialHandles {
    pub reader: Box<dyn Read + Send>,
    pub writer: Box<dyn Write + Send>,
}

/// Opens a serial port. Reads on the returned reader must give up after
/// `timeout` with [`io::ErrorKind::TimedOut`] or [`io::ErrorKind::WouldBlock`].
#[cfg_attr(test, mockall::automock)]
pub trait PortOpener: Send + Sync {
    fn open(&self, port: &str, baud: u32, timeout: Duration) -> Result<SerialHandles, SerialError>;
}

/// [`PortOpener`] backed by the OS serial driver.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemPortOpener;

impl PortOpener for SystemPortOpener {
    fn open(&self, port: &str, baud: u32, timeout: Duration) -> Result<SerialHandles, SerialError> {
        let open_error = |e: serialport::Error| SerialError::Open {
            port: port.to_string(),
            reason: e.to_string(),
        };

        let reader = serialport::new(port, baud)
            .timeout(timeout)
            .open()
            .map_err(open_error)?;
        let writer = reader.try_clone().map_err(open_error)?;

        Ok(SerialHandles {
            reader: Box::new(reader),
            writer: Box::new(writer),
        })
    }
}

struct Connection {
    port: String,
    writer: Box<dyn Write + Send>,
    stop: Arc<AtomicBool>,
    alive: Arc<AtomicBool>,
    done_rx: std_mpsc::Receiver<()>,
    reader: Option<JoinHandle<()>>,
}

impl Connection {
    fn is_alive(&self) -> bool {
        self.alive.load(Ordering::Acquire)
    }
}

/// Live serial terminal connection.
///
/// A dedicated reader thread turns incoming bytes into [`SerialEvent::Line`]s
/// on the event queue; [`send`](Self::send) writes straight to the port from
/// the caller's thread. The reader only ever talks to the rest of the program
/// through the queue.
pub struct SerialBridge {
    opener: Arc<dyn PortOpener>,
    events: SerialSender,
    metrics: Arc<Metrics>,
    read_timeout: Duration,
    join_timeout: Duration,
    connection: Mutex<Option<Connection>>,
}

impl SerialBridge {
    pub fn new(opener: Arc<dyn PortOpener>, events: SerialSender, metrics: Arc<Metrics>) -> Self {
        Self {
            opener,
            events,
            metrics,
            read_timeout: DEFAULT_READ_TIMEOUT,
            join_timeout: DEFAULT_JOIN_TIMEOUT,
            connection: Mutex::new(None),
        }
    }

    pub fn with_timeouts(mut self, read_timeout: Duration, join_timeout: Duration) -> Self {
        self.read_timeout = read_timeout;
        self.join_timeout = join_timeout;
        self
    }

    /// Open `port` and start the reader thread.
    ///
    /// Every failure except [`SerialError::AlreadyConnected`] is also reported
    /// as a single [`SerialEvent::ConnectFailed`]. On success the reader
    /// publishes [`SerialEvent::Connected`] before any line.
    pub fn connect(&self, port: &str, baud: u32) -> Result<(), SerialError> {
        let mut guard = self.lock();

        if let Some(existing) = guard.as_ref()
            && existing.is_alive()
        {
            tracing::warn!("Connect to {} refused: {} is still open", port, existing.port);
            return Err(SerialError::AlreadyConnected(existing.port.clone()));
        }

        // A connection whose reader already died is torn down silently
        if let Some(dead) = guard.take() {
            self.shutdown(dead);
        }

        match self.open_connection(port, baud) {
            Ok(connection) => {
                tracing::info!("Serial connection opened: {} at {} baud", port, baud);
                *guard = Some(connection);
                Ok(())
            }
            Err(e) => {
                tracing::error!("Serial connect to {} failed: {}", port, e);
                self.emit(SerialEvent::ConnectFailed(e.to_string()));
                Err(e)
            }
        }
    }

    /// Write `text` followed by `\n`.
    ///
    /// Does nothing for empty text or when no live connection exists.
    pub fn send(&self, text: &str) -> Result<(), SerialError> {
        if text.is_empty() {
            return Ok(());
        }

        let mut guard = self.lock();
        let Some(connection) = guard.as_mut().filter(|c| c.is_alive()) else {
            tracing::debug!("Dropping serial input, not connected");
            return Ok(());
        };

        let mut payload = Vec::with_capacity(text.len() + 1);
        payload.extend_from_slice(text.as_bytes());
        payload.push(b'\n');

        connection
            .writer
            .write_all(&payload)
            .and_then(|_| connection.writer.flush())
            .map_err(|e| {
                tracing::error!("Serial write to {} failed: {}", connection.port, e);
                SerialError::Write(e)
            })?;

        self.metrics.record_serial_bytes_sent(payload.len());
        Ok(())
    }

    /// Stop the reader and release the port. Safe to call repeatedly.
    pub fn close(&self) {
        let connection = self.lock().take();
        if let Some(connection) = connection {
            self.shutdown(connection);
        }
    }

    pub fn is_connected(&self) -> bool {
        self.lock().as_ref().is_some_and(Connection::is_alive)
    }

    /// Port of the current connection, live or not yet cleaned up.
    pub fn port(&self) -> Option<String> {
        self.lock().as_ref().map(|c| c.port.clone())
    }

    fn open_connection(&self, port: &str, baud: u32) -> Result<Connection, SerialError> {
        if !MONITOR_BAUD_RATES.contains(&baud) {
            return Err(SerialError::UnsupportedBaud(baud));
        }

        let SerialHandles { reader, writer } = self.opener.open(port, baud, self.read_timeout)?;

        let stop = Arc::new(AtomicBool::new(false));
        let alive = Arc::new(AtomicBool::new(true));
        let (done_tx, done_rx) = std_mpsc::channel();

        let context = ReaderContext {
            port: port.to_string(),
            baud,
            events: self.events.clone(),
            metrics: Arc::clone(&self.metrics),
            stop: Arc::clone(&stop),
            alive: Arc::clone(&alive),
        };

        let handle = thread::Builder::new()
            .name("espforge-serial-reader".to_string())
            .spawn(move || {
                context.run(reader);
                let _ = done_tx.send(());
            })
            .map_err(SerialError::Spawn)?;

        Ok(Connection {
            port: port.to_string(),
            writer,
            stop,
            alive,
            done_rx,
            reader: Some(handle),
        })
    }

    fn shutdown(&self, mut connection: Connection) {
        connection.stop.store(true, Ordering::Release);

        match connection.done_rx.recv_timeout(self.join_timeout) {
            Ok(()) | Err(std_mpsc::RecvTimeoutError::Disconnected) => {
                if let Some(handle) = connection.reader.take()
                    && handle.join().is_err()
                {
                    tracing::error!("Serial reader for {} panicked", connection.port);
                }
            }
            Err(std_mpsc::RecvTimeoutError::Timeout) => {
                tracing::warn!(
                    "Serial reader for {} did not stop within {:?}, detaching",
                    connection.port,
                    self.join_timeout
                );
            }
        }

        tracing::info!("Serial connection to {} closed", connection.port);
    }

    fn emit(&self, event: SerialEvent) {
        if self.events.send(event).is_err() {
            tracing::trace!("Serial queue closed, dropping event");
        }
    }

    fn lock(&self) -> MutexGuard<'_, Option<Connection>> {
        self.connection.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Drop for SerialBridge {
    fn drop(&mut self) {
        self.close();
    }
}

/// Everything the reader thread owns besides the port itself.
struct ReaderContext {
    port: String,
    baud: u32,
    events: SerialSender,
    metrics: Arc<Metrics>,
    stop: Arc<AtomicBool>,
    alive: Arc<AtomicBool>,
}

impl ReaderContext {
    fn run(self, mut reader: Box<dyn Read + Send>) {
        self.emit(SerialEvent::Connected {
            port: self.port.clone(),
            baud: self.baud,
        });

        let mut splitter = LineSplitter::new();
        let mut buf = [0u8; 1024];

        let lost = loop {
            if self.stop.load(Ordering::Acquire) {
                break None;
            }

            match reader.read(&mut buf) {
                Ok(0) => break Some("end of stream".to_string()),
                Ok(n) => {
                    for line in splitter.feed(&buf[..n]) {
                        self.publish(&line);
                    }
                }
                Err(e) if matches!(e.kind(), io::ErrorKind::TimedOut | io::ErrorKind::WouldBlock) => {
                    // A quiet line ends whatever partial text arrived
                    if let Some(line) = splitter.flush() {
                        self.publish(&line);
                    }
                }
                Err(e) if e.kind() == io::ErrorKind::Interrupted => {}
                Err(e) => break Some(e.to_string()),
            }
        };

        if let Some(line) = splitter.flush() {
            self.publish(&line);
        }

        self.alive.store(false, Ordering::Release);

        match lost {
            Some(reason) if !self.stop.load(Ordering::Acquire) => {
                tracing::warn!("Serial device {} lost: {}", self.port, reason);
                self.metrics.record_serial_disconnect();
                self.emit(SerialEvent::Disconnected(reason));
            }
            _ => tracing::debug!("Serial reader for {} stopped", self.port),
        }
    }

    fn publish(&self, raw: &str) {
        let line = raw.trim_end_matches(['\r', '\n']);
        if line.is_empty() {
            return;
        }
        self.metrics.record_serial_line();
        self.emit(SerialEvent::Line(line.to_string()));
    }

    fn emit(&self, event: SerialEvent) {
        let _ = self.events.send(event);
    }
}
