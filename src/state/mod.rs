// State management module
//
// StateManager wraps AppState with thread-safe access using Arc<RwLock<T>>
// and broadcasts change events to whoever renders the front end.

use crate::models::{
    AppSettings, AppState, ChipType, FlashBaud, Operation, SerialStatus, TaskOutcome,
};
use std::sync::{Arc, PoisonError, RwLock};
use tokio::sync::broadcast;

/// Change events emitted when state is modified
#[derive(Clone, Debug, PartialEq)]
pub enum StateChange {
    /// A flashing-tool operation has started
    TaskStarted { operation: Operation },

    /// The progress indicator moved or changed colour
    ProgressUpdated { percent: u8, failed: bool },

    /// The running operation finished
    TaskFinished { success: bool },

    /// Action buttons were locked or unlocked
    ControlsChanged { enabled: bool },

    /// Serial monitor connection status changed
    SerialStatusChanged { status: SerialStatus },

    /// Port, chip or flash baud selection changed
    TargetChanged,

    /// Monitor baud or timestamp preference changed
    SettingsChanged,
}

/// Thread-safe state manager with event emission
///
/// - [`read()`](Self::read) and [`snapshot()`](Self::snapshot) for reading
/// - [`update()`](Self::update) for mutations with automatic event emission
/// - [`subscribe()`](Self::subscribe) for listening to state changes
///
/// The task lifecycle helpers ([`begin_task`](Self::begin_task),
/// [`set_progress`](Self::set_progress),
/// [`on_task_complete`](Self::on_task_complete)) are what the event pump
/// calls while draining the output queue.
pub struct StateManager {
    state: Arc<RwLock<AppState>>,

    /// Multiple subscribers can listen for state changes
    state_tx: broadcast::Sender<StateChange>,
}

impl StateManager {
    /// Create a new StateManager with default state and a 100 event buffer
    pub fn new() -> Self {
        let (state_tx, _) = broadcast::channel(100);
        Self {
            state: Arc::new(RwLock::new(AppState::default())),
            state_tx,
        }
    }

    /// Clone of the current state
    pub fn snapshot(&self) -> AppState {
        self.state
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Execute a function with read access to the state
    ///
    /// # Example
    /// ```ignore
    /// let busy = state_manager.read(|state| state.is_running());
    /// ```
    pub fn read<F, R>(&self, f: F) -> R
    where
        F: FnOnce(&AppState) -> R,
    {
        let state = self.state.read().unwrap_or_else(PoisonError::into_inner);
        f(&state)
    }

    /// Apply `update_fn`, then emit one event per detected change
    ///
    /// Returns the emitted events.
    pub fn update<F>(&self, update_fn: F) -> Vec<StateChange>
    where
        F: FnOnce(&mut AppState),
    {
        let mut state = self.state.write().unwrap_or_else(PoisonError::into_inner);
        let old_state = state.clone();

        update_fn(&mut state);

        let changes = detect_changes(&old_state, &state);

        for change in &changes {
            // No subscribers is fine
            let _ = self.state_tx.send(change.clone());
        }

        changes
    }

    pub fn subscribe(&self) -> broadcast::Receiver<StateChange> {
        self.state_tx.subscribe()
    }

    /// Lock the controls and reset the indicator for `operation`
    pub fn begin_task(&self, operation: Operation) -> Vec<StateChange> {
        self.update(|state| state.begin_task(operation))
    }

    pub fn set_progress(&self, percent: u8) -> Vec<StateChange> {
        self.update(|state| state.set_progress(percent))
    }

    /// Terminal transition for the running operation
    pub fn on_task_complete(&self, success: bool) -> Vec<StateChange> {
        let changes = self.update(|state| state.complete_task(success));
        tracing::debug!("Task complete (success: {}), {} state changes", success, changes.len());
        changes
    }

    pub fn set_serial_status(&self, status: SerialStatus) -> Vec<StateChange> {
        self.update(|state| state.serial = status)
    }

    /// Select the board the next operation targets
    pub fn select_target(
        &self,
        port: Option<String>,
        chip: ChipType,
        flash_baud: FlashBaud,
    ) -> Vec<StateChange> {
        self.update(|state| {
            state.port = port;
            state.chip = chip;
            state.flash_baud = flash_baud;
        })
    }

    pub fn update_settings<F>(&self, settings_fn: F) -> Vec<StateChange>
    where
        F: FnOnce(&mut AppState),
    {
        self.update(settings_fn)
    }

    /// Populate selections and preferences from loaded settings
    pub fn load_from_settings(&self, settings: &AppSettings) -> Vec<StateChange> {
        self.update(|state| {
            state.chip = settings.default_chip;
            state.flash_baud = FlashBaud::from_u32(settings.default_baud).unwrap_or_else(|| {
                tracing::warn!(
                    "Unsupported default_baud {}, using {}",
                    settings.default_baud,
                    FlashBaud::default()
                );
                FlashBaud::default()
            });
            state.monitor_baud = settings.monitor_baud;
            state.timestamps = settings.timestamps;

            tracing::info!(
                "Loaded settings: chip={}, flash_baud={}, monitor_baud={}, timestamps={}",
                state.chip,
                state.flash_baud,
                state.monitor_baud,
                state.timestamps
            );
        })
    }
}

/// Diff two states into the events a renderer cares about
fn detect_changes(old: &AppState, new: &AppState) -> Vec<StateChange> {
    let mut changes = Vec::new();

    if old.task != new.task {
        if new.is_running() {
            if let Some(operation) = new.operation {
                changes.push(StateChange::TaskStarted { operation });
            }
        } else {
            changes.push(StateChange::TaskFinished {
                success: new.last_outcome == Some(TaskOutcome::Succeeded),
            });
        }
    }

    if old.progress != new.progress || old.progress_failed != new.progress_failed {
        changes.push(StateChange::ProgressUpdated {
            percent: new.progress,
            failed: new.progress_failed,
        });
    }

    if old.controls_enabled != new.controls_enabled {
        changes.push(StateChange::ControlsChanged {
            enabled: new.controls_enabled,
        });
    }

    if old.serial != new.serial {
        changes.push(StateChange::SerialStatusChanged {
            status: new.serial.clone(),
        });
    }

    if old.port != new.port || old.chip != new.chip || old.flash_baud != new.flash_baud {
        changes.push(StateChange::TargetChanged);
    }

    if old.monitor_baud != new.monitor_baud || old.timestamps != new.timestamps {
        changes.push(StateChange::SettingsChanged);
    }

    changes
}

impl Default for StateManager {
    fn default() -> Self {
        Self::new()
    }
}

impl Clone for StateManager {
    fn clone(&self) -> Self {
        Self {
            state: Arc::clone(&self.state),
            state_tx: self.state_tx.clone(),
        }
    }
}
