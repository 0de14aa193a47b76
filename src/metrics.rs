// Performance metrics module
//
// Lightweight counters for the two I/O pipelines

use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::time::{Duration, Instant};

/// Pipeline metrics
///
/// Uses atomic operations so the subprocess pump, the serial reader thread
/// and the event pump can all record without locks. Logged on shutdown.
#[derive(Debug)]
pub struct Metrics {
    /// Flashing-tool operations that exited with code 0
    pub tasks_succeeded: AtomicUsize,

    /// Operations that failed to launch or exited non-zero
    pub tasks_failed: AtomicUsize,

    /// Output lines read from flashing-tool subprocesses
    pub task_lines: AtomicU64,

    /// Progress reports extracted from those lines
    pub progress_updates: AtomicU64,

    /// Total subprocess run time in milliseconds
    pub total_task_time_ms: AtomicU64,

    /// Lines received from the serial port
    pub serial_lines: AtomicU64,

    /// Bytes written to the serial port
    pub serial_bytes_sent: AtomicU64,

    /// Serial sessions ended by an I/O failure
    pub serial_disconnects: AtomicU64,

    /// Events taken off either queue by the event pump
    pub events_drained: AtomicU64,

    /// Application start time
    start_time: Instant,
}

impl Metrics {
    /// Create a new Metrics instance
    pub fn new() -> Self {
        Self {
            tasks_succeeded: AtomicUsize::new(0),
            tasks_failed: AtomicUsize::new(0),
            task_lines: AtomicU64::new(0),
            progress_updates: AtomicU64::new(0),
            total_task_time_ms: AtomicU64::new(0),
            serial_lines: AtomicU64::new(0),
            serial_bytes_sent: AtomicU64::new(0),
            serial_disconnects: AtomicU64::new(0),
            events_drained: AtomicU64::new(0),
            start_time: Instant::now(),
        }
    }

    pub fn record_task_finished(&self, success: bool, duration: Duration) {
        if success {
            self.tasks_succeeded.fetch_add(1, Ordering::Relaxed);
        } else {
            self.tasks_failed.fetch_add(1, Ordering::Relaxed);
        }
        self.total_task_time_ms
            .fetch_add(duration.as_millis() as u64, Ordering::Relaxed);
    }

    pub fn record_task_line(&self) {
        self.task_lines.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_progress_update(&self) {
        self.progress_updates.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_serial_line(&self) {
        self.serial_lines.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_serial_bytes_sent(&self, bytes: usize) {
        self.serial_bytes_sent
            .fetch_add(bytes as u64, Ordering::Relaxed);
    }

    pub fn record_serial_disconnect(&self) {
        self.serial_disconnects.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_events_drained(&self, count: usize) {
        self.events_drained
            .fetch_add(count as u64, Ordering::Relaxed);
    }

    /// Get total uptime
    pub fn uptime(&self) -> Duration {
        self.start_time.elapsed()
    }

    /// Average subprocess run time in milliseconds
    pub fn avg_task_time_ms(&self) -> f64 {
        let total = self.total_task_time_ms.load(Ordering::Relaxed);
        let count = self.tasks_succeeded.load(Ordering::Relaxed)
            + self.tasks_failed.load(Ordering::Relaxed);
        if count > 0 {
            total as f64 / count as f64
        } else {
            0.0
        }
    }

    /// Log metrics summary
    pub fn log_summary(&self) {
        tracing::info!("=== Session Metrics Summary ===");
        tracing::info!("Uptime: {:.2}s", self.uptime().as_secs_f64());
        tracing::info!(
            "Tasks: {} succeeded, {} failed (avg: {:.0}ms)",
            self.tasks_succeeded.load(Ordering::Relaxed),
            self.tasks_failed.load(Ordering::Relaxed),
            self.avg_task_time_ms()
        );
        tracing::info!(
            "Task output: {} lines, {} progress updates",
            self.task_lines.load(Ordering::Relaxed),
            self.progress_updates.load(Ordering::Relaxed)
        );
        tracing::info!(
            "Serial: {} lines received, {} bytes sent, {} disconnects",
            self.serial_lines.load(Ordering::Relaxed),
            self.serial_bytes_sent.load(Ordering::Relaxed),
            self.serial_disconnects.load(Ordering::Relaxed)
        );
        tracing::info!(
            "Events drained: {}",
            self.events_drained.load(Ordering::Relaxed)
        );
    }
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    #[test]
    fn test_metrics_creation() {
        let metrics = Metrics::new();
        assert_eq!(metrics.tasks_succeeded.load(Ordering::Relaxed), 0);
        assert_eq!(metrics.serial_lines.load(Ordering::Relaxed), 0);
    }

    #[test]
    fn test_record_task_finished() {
        let metrics = Metrics::new();

        metrics.record_task_finished(true, Duration::from_millis(100));
        metrics.record_task_finished(false, Duration::from_millis(300));

        assert_eq!(metrics.tasks_succeeded.load(Ordering::Relaxed), 1);
        assert_eq!(metrics.tasks_failed.load(Ordering::Relaxed), 1);
        assert_eq!(metrics.total_task_time_ms.load(Ordering::Relaxed), 400);
        assert_eq!(metrics.avg_task_time_ms(), 200.0);
    }

    #[test]
    fn test_avg_task_time_no_tasks() {
        let metrics = Metrics::new();
        assert_eq!(metrics.avg_task_time_ms(), 0.0);
    }

    #[test]
    fn test_uptime() {
        let metrics = Metrics::new();
        thread::sleep(Duration::from_millis(10));
        assert!(metrics.uptime().as_millis() >= 10);
    }

    #[test]
    fn test_pipeline_counters() {
        let metrics = Metrics::new();

        metrics.record_task_line();
        metrics.record_progress_update();
        metrics.record_serial_line();
        metrics.record_serial_bytes_sent(6);
        metrics.record_serial_disconnect();
        metrics.record_events_drained(3);

        assert_eq!(metrics.task_lines.load(Ordering::Relaxed), 1);
        assert_eq!(metrics.progress_updates.load(Ordering::Relaxed), 1);
        assert_eq!(metrics.serial_lines.load(Ordering::Relaxed), 1);
        assert_eq!(metrics.serial_bytes_sent.load(Ordering::Relaxed), 6);
        assert_eq!(metrics.serial_disconnects.load(Ordering::Relaxed), 1);
        assert_eq!(metrics.events_drained.load(Ordering::Relaxed), 3);
    }
}
