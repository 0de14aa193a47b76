// EventPump - moves events from the background queues onto the front-end loop
//
// The task runner and the serial reader never touch front-end state. They
// push onto two unbounded queues and this pump, ticking on the front end's own
// loop, drains both completely on every tick and applies what it finds:
// - state mutations go through the StateManager
// - text and progress go to an EventSink that renders them

use crate::metrics::Metrics;
use crate::models::{LinePresenter, OutputEvent, SerialEvent, SerialStatus, Severity};
use crate::services::{OutputReceiver, SerialReceiver};
use crate::state::StateManager;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::{self, MissedTickBehavior};

/// Renders what the pump drains.
///
/// Every call happens on the loop that owns the pump, in queue order.
pub trait EventSink {
    /// A line from the flashing tool or about the task itself
    fn task_line(&mut self, message: &str, severity: Severity);

    /// The progress indicator changed
    fn progress(&mut self, percent: u8, failed: bool);

    /// The running task finished; called after its final line
    fn task_finished(&mut self, success: bool);

    /// A line for the serial monitor, already timestamped
    fn serial_line(&mut self, message: &str, severity: Severity);
}

/// What one [`EventPump::drain`] call processed.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DrainSummary {
    pub output_events: usize,
    pub serial_events: usize,

    /// Set if a Completion was drained, holding its success flag
    pub task_finished: Option<bool>,

    /// A connection attempt failed or the device went away
    pub serial_lost: bool,

    /// A sender half was dropped and its queue is empty
    pub output_closed: bool,
    pub serial_closed: bool,
}

impl DrainSummary {
    pub fn is_empty(&self) -> bool {
        self.output_events == 0 && self.serial_events == 0
    }
}

/// Drains the output and serial queues on the front end's loop.
///
/// # Example
/// ```ignore
/// let mut pump = EventPump::new(output_rx, serial_rx, state_manager, metrics);
///
/// runner.start(invocation)?;
/// let success = pump.run_until_task_finished(&mut sink, settings.poll_interval()).await;
/// ```
pub struct EventPump {
    output_rx: OutputReceiver,
    serial_rx: SerialReceiver,
    state: StateManager,
    presenter: LinePresenter,
    metrics: Arc<Metrics>,
}

impl EventPump {
    pub fn new(
        output_rx: OutputReceiver,
        serial_rx: SerialReceiver,
        state: StateManager,
        metrics: Arc<Metrics>,
    ) -> Self {
        let presenter = LinePresenter::new(state.read(|s| s.timestamps));
        Self {
            output_rx,
            serial_rx,
            state,
            presenter,
            metrics,
        }
    }

    pub fn set_timestamps(&mut self, enabled: bool) {
        self.presenter = LinePresenter::new(enabled);
        self.state.update_settings(|s| s.timestamps = enabled);
    }

    /// Process every event currently queued, output queue first.
    ///
    /// Never blocks. Events arriving while this runs are picked up by the
    /// same call if they land before the queue reads empty.
    pub fn drain(&mut self, sink: &mut dyn EventSink) -> DrainSummary {
        let mut summary = DrainSummary::default();

        loop {
            match self.output_rx.try_recv() {
                Ok(event) => {
                    summary.output_events += 1;
                    self.apply_output(event, sink, &mut summary);
                }
                Err(tokio::sync::mpsc::error::TryRecvError::Empty) => break,
                Err(tokio::sync::mpsc::error::TryRecvError::Disconnected) => {
                    summary.output_closed = true;
                    break;
                }
            }
        }

        loop {
            match self.serial_rx.try_recv() {
                Ok(event) => {
                    summary.serial_events += 1;
                    self.apply_serial(event, sink, &mut summary);
                }
                Err(tokio::sync::mpsc::error::TryRecvError::Empty) => break,
                Err(tokio::sync::mpsc::error::TryRecvError::Disconnected) => {
                    summary.serial_closed = true;
                    break;
                }
            }
        }

        let drained = summary.output_events + summary.serial_events;
        if drained > 0 {
            self.metrics.record_events_drained(drained);
            tracing::trace!(
                "Drained {} output and {} serial events",
                summary.output_events,
                summary.serial_events
            );
        }

        summary
    }

    /// Tick every `interval` until a Completion is drained, then return its
    /// success flag. Returns false if the output queue closes first.
    pub async fn run_until_task_finished(
        &mut self,
        sink: &mut dyn EventSink,
        interval: Duration,
    ) -> bool {
        let mut ticker = time::interval(interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            ticker.tick().await;
            let summary = self.drain(sink);

            if let Some(success) = summary.task_finished {
                return success;
            }
            if summary.output_closed {
                tracing::warn!("Output queue closed before the task finished");
                return false;
            }
        }
    }

    fn apply_output(
        &mut self,
        event: OutputEvent,
        sink: &mut dyn EventSink,
        summary: &mut DrainSummary,
    ) {
        match event {
            OutputEvent::Line { message, severity } => sink.task_line(&message, severity),
            OutputEvent::Progress(percent) => {
                if !self.state.set_progress(percent).is_empty() {
                    sink.progress(percent.min(100), false);
                }
            }
            OutputEvent::Completion { success } => {
                self.state.on_task_complete(success);
                let (percent, failed) = self.state.read(|s| (s.progress, s.progress_failed));
                sink.progress(percent, failed);
                sink.task_finished(success);
                summary.task_finished = Some(success);
            }
        }
    }

    fn apply_serial(
        &mut self,
        event: SerialEvent,
        sink: &mut dyn EventSink,
        summary: &mut DrainSummary,
    ) {
        match event {
            SerialEvent::Connected { port, baud } => {
                sink.serial_line(
                    &format!("Connected to {} at {} baud.", port, baud),
                    Severity::Success,
                );
                self.state
                    .set_serial_status(SerialStatus::Connected { port, baud });
            }
            SerialEvent::ConnectFailed(reason) => {
                self.state.set_serial_status(SerialStatus::Disconnected);
                sink.serial_line(&format!("Error: {}", reason), Severity::Error);
                summary.serial_lost = true;
            }
            SerialEvent::Line(text) => {
                if let Some(line) = self.presenter.format(&text) {
                    sink.serial_line(&line, Severity::Info);
                }
            }
            SerialEvent::Disconnected(reason) => {
                tracing::info!("Serial device disconnected: {}", reason);
                self.state.set_serial_status(SerialStatus::Disconnected);
                sink.serial_line("ERROR: Device disconnected.", Severity::Error);
                summary.serial_lost = true;
            }
        }
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::models::Operation;
    use crate::services::{output_channel, serial_channel};

    /// Sink that records every call as text
    #[derive(Default)]
    pub(crate) struct RecordingSink {
        pub calls: Vec<String>,
    }

    impl EventSink for RecordingSink {
        fn task_line(&mut self, message: &str, severity: Severity) {
            self.calls.push(format!("task {} {}", severity, message));
        }

        fn progress(&mut self, percent: u8, failed: bool) {
            self.calls.push(format!("progress {} {}", percent, failed));
        }

        fn task_finished(&mut self, success: bool) {
            self.calls.push(format!("finished {}", success));
        }

        fn serial_line(&mut self, message: &str, severity: Severity) {
            self.calls.push(format!("serial {} {}", severity, message));
        }
    }

    fn pump() -> (
        EventPump,
        crate::services::OutputSender,
        crate::services::SerialSender,
        StateManager,
    ) {
        let (out_tx, out_rx) = output_channel();
        let (ser_tx, ser_rx) = serial_channel();
        let state = StateManager::new();
        state.update_settings(|s| s.timestamps = false);
        let pump = EventPump::new(out_rx, ser_rx, state.clone(), Arc::new(Metrics::new()));
        (pump, out_tx, ser_tx, state)
    }

    #[test]
    fn test_drain_applies_task_events_in_order() {
        let (mut pump, out_tx, _ser_tx, state) = pump();
        let mut sink = RecordingSink::default();
        state.begin_task(Operation::Flash);

        out_tx.send(OutputEvent::info("Starting multi-file flash...")).unwrap();
        out_tx.send(OutputEvent::info("Writing at 0x1000... (50 %)")).unwrap();
        out_tx.send(OutputEvent::Progress(50)).unwrap();
        out_tx.send(OutputEvent::success("Operation completed successfully!")).unwrap();
        out_tx.send(OutputEvent::Completion { success: true }).unwrap();

        let summary = pump.drain(&mut sink);

        assert_eq!(summary.output_events, 5);
        assert_eq!(summary.task_finished, Some(true));
        assert_eq!(
            sink.calls,
            vec![
                "task INFO Starting multi-file flash...",
                "task INFO Writing at 0x1000... (50 %)",
                "progress 50 false",
                "task SUCCESS Operation completed successfully!",
                "progress 100 false",
                "finished true",
            ]
        );

        let snapshot = state.snapshot();
        assert!(snapshot.controls_enabled);
        assert!(!snapshot.is_running());
    }

    #[test]
    fn test_order_preserved_across_drains() {
        let (mut pump, out_tx, _ser_tx, _state) = pump();
        let mut sink = RecordingSink::default();

        out_tx.send(OutputEvent::info("L1")).unwrap();
        pump.drain(&mut sink);
        out_tx.send(OutputEvent::info("L2")).unwrap();
        out_tx.send(OutputEvent::info("L3")).unwrap();
        pump.drain(&mut sink);

        assert_eq!(sink.calls, vec!["task INFO L1", "task INFO L2", "task INFO L3"]);
    }

    #[test]
    fn test_failed_completion_marks_progress() {
        let (mut pump, out_tx, _ser_tx, state) = pump();
        let mut sink = RecordingSink::default();
        state.begin_task(Operation::Erase);

        out_tx.send(OutputEvent::error("Operation failed with error code: 2")).unwrap();
        out_tx.send(OutputEvent::Completion { success: false }).unwrap();
        pump.drain(&mut sink);

        assert!(sink.calls.contains(&"progress 100 true".to_string()));
        assert_eq!(sink.calls.last().map(String::as_str), Some("finished false"));
        assert!(state.read(|s| s.controls_enabled));
    }

    #[test]
    fn test_serial_events_update_status() {
        let (mut pump, _out_tx, ser_tx, state) = pump();
        let mut sink = RecordingSink::default();

        ser_tx
            .send(SerialEvent::Connected {
                port: "COM3".to_string(),
                baud: 115_200,
            })
            .unwrap();
        ser_tx.send(SerialEvent::Line("hello".to_string())).unwrap();
        ser_tx.send(SerialEvent::Line("   ".to_string())).unwrap();

        let summary = pump.drain(&mut sink);
        assert_eq!(summary.serial_events, 3);
        assert!(!summary.serial_lost);
        assert!(state.read(|s| s.is_serial_connected()));

        ser_tx.send(SerialEvent::Disconnected("gone".to_string())).unwrap();
        let summary = pump.drain(&mut sink);
        assert!(summary.serial_lost);
        assert!(!state.read(|s| s.is_serial_connected()));

        assert_eq!(
            sink.calls,
            vec![
                "serial SUCCESS Connected to COM3 at 115200 baud.",
                "serial INFO hello",
                "serial ERROR ERROR: Device disconnected.",
            ]
        );
    }

    #[test]
    fn test_closed_queues_are_reported() {
        let (mut pump, out_tx, ser_tx, _state) = pump();
        drop(out_tx);
        drop(ser_tx);

        let summary = pump.drain(&mut RecordingSink::default());
        assert!(summary.is_empty());
        assert!(summary.output_closed);
        assert!(summary.serial_closed);
    }

    #[tokio::test]
    async fn test_run_until_task_finished() {
        let (mut pump, out_tx, _ser_tx, _state) = pump();
        let mut sink = RecordingSink::default();

        tokio::spawn(async move {
            out_tx.send(OutputEvent::info("working")).unwrap();
            tokio::time::sleep(Duration::from_millis(30)).await;
            out_tx.send(OutputEvent::Completion { success: false }).unwrap();
        });

        let success = pump
            .run_until_task_finished(&mut sink, Duration::from_millis(5))
            .await;

        assert!(!success);
        assert_eq!(sink.calls.first().map(String::as_str), Some("task INFO working"));
    }
}
