//! Integration tests for SerialBridge driven through a fake port opener
//!
//! These tests verify:
//! - Connected is queued before any received line
//! - A lost device yields exactly one Disconnected and nothing after it
//! - Closing is idempotent and silent
//! - Sent text reaches the port with a trailing newline
//! - Open failures and unsupported baud rates are reported

use espforge::Metrics;
use espforge::models::SerialEvent;
use espforge::services::{
    PortOpener, SerialBridge, SerialError, SerialHandles, SerialReceiver, serial_channel,
};
use std::io::{self, Cursor, Read, Write};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::{Duration, Instant};

/// Reader that times out forever, like an idle port.
struct IdleReader;

impl Read for IdleReader {
    fn read(&mut self, _buf: &mut [u8]) -> io::Result<usize> {
        thread::sleep(Duration::from_millis(5));
        Err(io::Error::new(io::ErrorKind::TimedOut, "idle"))
    }
}

#[derive(Clone, Default)]
struct SharedWriter(Arc<Mutex<Vec<u8>>>);

impl Write for SharedWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0.lock().unwrap().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

enum Script {
    /// Deliver these bytes, then EOF (device unplugged)
    Bytes(&'static [u8]),
    Idle,
    Refuse,
}

struct FakeOpener {
    script: Script,
    written: SharedWriter,
    opens: AtomicUsize,
}

impl FakeOpener {
    fn new(script: Script) -> Arc<Self> {
        Arc::new(Self {
            script,
            written: SharedWriter::default(),
            opens: AtomicUsize::new(0),
        })
    }
}

impl PortOpener for FakeOpener {
    fn open(&self, port: &str, _baud: u32, _timeout: Duration) -> Result<SerialHandles, SerialError> {
        self.opens.fetch_add(1, Ordering::SeqCst);
        let reader: Box<dyn Read + Send> = match self.script {
            Script::Bytes(bytes) => Box::new(Cursor::new(bytes)),
            Script::Idle => Box::new(IdleReader),
            Script::Refuse => {
                return Err(SerialError::Open {
                    port: port.to_string(),
                    reason: "Access is denied.".to_string(),
                });
            }
        };
        Ok(SerialHandles {
            reader,
            writer: Box::new(self.written.clone()),
        })
    }
}

fn bridge(opener: Arc<FakeOpener>) -> (SerialBridge, SerialReceiver, Arc<Metrics>) {
    let (tx, rx) = serial_channel();
    let metrics = Arc::new(Metrics::new());
    let bridge = SerialBridge::new(opener, tx, Arc::clone(&metrics))
        .with_timeouts(Duration::from_millis(20), Duration::from_secs(1));
    (bridge, rx, metrics)
}

/// Collect events until `done` returns true or two seconds pass.
fn collect_until(
    rx: &mut SerialReceiver,
    mut done: impl FnMut(&[SerialEvent]) -> bool,
) -> Vec<SerialEvent> {
    let deadline = Instant::now() + Duration::from_secs(2);
    let mut events = Vec::new();
    while Instant::now() < deadline && !done(&events) {
        match rx.try_recv() {
            Ok(event) => events.push(event),
            Err(_) => thread::sleep(Duration::from_millis(5)),
        }
    }
    events
}

#[test]
fn test_device_loss_reports_one_disconnect() {
    let opener = FakeOpener::new(Script::Bytes(b"boot: ok\r\nready\npartial"));
    let (bridge, mut rx, metrics) = bridge(Arc::clone(&opener));

    bridge.connect("/dev/ttyUSB0", 115_200).unwrap();

    let events = collect_until(&mut rx, |events| {
        events.iter().any(|e| matches!(e, SerialEvent::Disconnected(_)))
    });

    assert_eq!(
        events[..4],
        [
            SerialEvent::Connected {
                port: "/dev/ttyUSB0".to_string(),
                baud: 115_200
            },
            SerialEvent::Line("boot: ok".to_string()),
            SerialEvent::Line("ready".to_string()),
            SerialEvent::Line("partial".to_string()),
        ]
    );
    assert!(matches!(events.last(), Some(SerialEvent::Disconnected(_))));

    // Nothing follows the disconnect
    thread::sleep(Duration::from_millis(50));
    assert!(rx.try_recv().is_err());

    assert!(!bridge.is_connected());
    assert_eq!(metrics.serial_disconnects.load(Ordering::Relaxed), 1);
}

#[test]
fn test_reconnect_after_device_loss() {
    let opener = FakeOpener::new(Script::Bytes(b"hello\n"));
    let (bridge, mut rx, _metrics) = bridge(Arc::clone(&opener));

    bridge.connect("COM3", 115_200).unwrap();
    collect_until(&mut rx, |events| {
        events.iter().any(|e| matches!(e, SerialEvent::Disconnected(_)))
    });

    bridge.connect("COM3", 115_200).unwrap();
    assert_eq!(opener.opens.load(Ordering::SeqCst), 2);
    bridge.close();
}

#[test]
fn test_close_twice_is_silent() {
    let opener = FakeOpener::new(Script::Idle);
    let (bridge, mut rx, _metrics) = bridge(Arc::clone(&opener));

    bridge.connect("COM3", 9600).unwrap();
    let events = collect_until(&mut rx, |events| !events.is_empty());
    assert!(matches!(events[0], SerialEvent::Connected { baud: 9600, .. }));
    assert!(bridge.is_connected());
    assert_eq!(bridge.port().as_deref(), Some("COM3"));

    bridge.close();
    bridge.close();

    assert!(!bridge.is_connected());
    thread::sleep(Duration::from_millis(50));
    assert!(rx.try_recv().is_err(), "user close must not report a disconnect");
}

#[test]
fn test_send_appends_newline() {
    let opener = FakeOpener::new(Script::Idle);
    let (bridge, _rx, metrics) = bridge(Arc::clone(&opener));

    bridge.connect("COM3", 115_200).unwrap();
    bridge.send("AT+GMR").unwrap();
    bridge.close();

    assert_eq!(opener.written.0.lock().unwrap().as_slice(), b"AT+GMR\n");
    assert_eq!(metrics.serial_bytes_sent.load(Ordering::Relaxed), 7);
}

#[test]
fn test_second_connect_is_refused() {
    let opener = FakeOpener::new(Script::Idle);
    let (bridge, _rx, _metrics) = bridge(Arc::clone(&opener));

    bridge.connect("COM3", 115_200).unwrap();
    let err = bridge.connect("COM4", 115_200).unwrap_err();

    assert!(matches!(err, SerialError::AlreadyConnected(ref port) if port == "COM3"));
    assert_eq!(opener.opens.load(Ordering::SeqCst), 1);
    bridge.close();
}

#[test]
fn test_open_failure_is_reported() {
    let opener = FakeOpener::new(Script::Refuse);
    let (bridge, mut rx, _metrics) = bridge(Arc::clone(&opener));

    let err = bridge.connect("COM9", 115_200).unwrap_err();
    assert!(err.to_string().contains("Access is denied."));

    let events = collect_until(&mut rx, |events| !events.is_empty());
    assert!(matches!(events.as_slice(), [SerialEvent::ConnectFailed(_)]));
    assert!(!bridge.is_connected());
}

#[test]
fn test_unsupported_baud_never_opens() {
    let opener = FakeOpener::new(Script::Idle);
    let (bridge, _rx, _metrics) = bridge(Arc::clone(&opener));

    let err = bridge.connect("COM3", 12_345).unwrap_err();

    assert!(matches!(err, SerialError::UnsupportedBaud(12_345)));
    assert_eq!(opener.opens.load(Ordering::SeqCst), 0);
}
