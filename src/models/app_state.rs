use super::job::Operation;
use super::profile::{ChipType, FlashBaud};
use std::fmt;

/// Maximum number of concurrent flashing-tool subprocesses.
///
/// The tool holds the serial port exclusively for the whole operation, so a
/// second invocation against the same board can only fail. This is enforced
/// by [`crate::services::TaskRunner`] with a `tokio::sync::Semaphore`.
pub const MAX_CONCURRENT_TASKS: usize = 1;

/// Whether a flashing-tool operation is in flight.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TaskState {
    #[default]
    Idle,
    Running,
}

/// How the last operation ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskOutcome {
    Succeeded,
    Failed,
}

/// Serial monitor connection status as seen by the front end.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum SerialStatus {
    #[default]
    Disconnected,
    Connecting { port: String, baud: u32 },
    Connected { port: String, baud: u32 },
}

impl fmt::Display for SerialStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SerialStatus::Disconnected => f.write_str("disconnected"),
            SerialStatus::Connecting { port, baud } => {
                write!(f, "connecting to {} at {} baud", port, baud)
            }
            SerialStatus::Connected { port, baud } => {
                write!(f, "connected to {} at {} baud", port, baud)
            }
        }
    }
}

/// Front-end state. Only the event pump and the controller mutate it, always
/// through [`crate::state::StateManager`].
#[derive(Clone, Debug)]
pub struct AppState {
    // Hardware selection
    pub port: Option<String>,
    pub chip: ChipType,
    pub flash_baud: FlashBaud,
    pub monitor_baud: u32,

    // Task lifecycle
    pub task: TaskState,
    pub operation: Option<Operation>,
    pub last_outcome: Option<TaskOutcome>,

    // Progress indicator
    pub progress: u8,
    pub progress_failed: bool,

    // Buttons are disabled while a task runs
    pub controls_enabled: bool,

    // Serial monitor
    pub serial: SerialStatus,
    pub timestamps: bool,
}

impl Default for AppState {
    fn default() -> Self {
        Self {
            port: None,
            chip: ChipType::Esp32,
            flash_baud: FlashBaud::B921600,
            monitor_baud: 115_200,
            task: TaskState::Idle,
            operation: None,
            last_outcome: None,
            progress: 0,
            progress_failed: false,
            controls_enabled: true,
            serial: SerialStatus::Disconnected,
            timestamps: true,
        }
    }
}

impl AppState {
    pub fn is_running(&self) -> bool {
        self.task == TaskState::Running
    }

    pub fn is_serial_connected(&self) -> bool {
        matches!(self.serial, SerialStatus::Connected { .. })
    }

    /// Reset the indicator and lock the controls for a new operation.
    pub fn begin_task(&mut self, operation: Operation) {
        self.task = TaskState::Running;
        self.operation = Some(operation);
        self.last_outcome = None;
        self.progress = 0;
        self.progress_failed = false;
        self.controls_enabled = false;
    }

    /// Apply a progress report, clamped to 100.
    pub fn set_progress(&mut self, percent: u8) {
        self.progress = percent.min(100);
    }

    /// Terminal transition back to idle.
    ///
    /// A successful run fills the indicator. A failed run marks it failed and
    /// fills it only if nothing was reported yet, so a partial write stays
    /// visible where it stopped.
    pub fn complete_task(&mut self, success: bool) {
        self.task = TaskState::Idle;
        self.controls_enabled = true;

        if success {
            self.last_outcome = Some(TaskOutcome::Succeeded);
            self.progress = 100;
        } else {
            self.last_outcome = Some(TaskOutcome::Failed);
            self.progress_failed = true;
            if self.progress == 0 {
                self.progress = 100;
            }
        }
    }
}
