//! Data models for ESP-Forge.
//!
//! - [`AppState`]: front-end state (task lifecycle, progress indicator, serial status)
//! - [`AppSettings`]: settings loaded from `ESP-Forge Settings.yaml`
//! - [`Profile`] and [`FileSlots`]: saved flashing setups and the slot rows they fill
//! - [`FlashJob`]: validated `(address, path)` list for one flash run
//! - [`OutputEvent`] and [`SerialEvent`]: items carried on the two event queues
//! - [`Transcript`]: displayed output with severity tags, savable as plain text

pub mod app_state;
pub mod events;
pub mod job;
pub mod profile;
pub mod settings;
pub mod transcript;

pub use app_state::{AppState, MAX_CONCURRENT_TASKS, SerialStatus, TaskOutcome, TaskState};
pub use events::{OutputEvent, SerialEvent, Severity};
pub use job::{FlashJob, FlashSegment, Operation, ValidationError, parse_address, validate_port};
pub use profile::{
    ChipType, DEFAULT_SLOT_ADDRESSES, FileSlots, FlashBaud, MAX_FILE_SLOTS, MONITOR_BAUD_RATES,
    Profile, ProfileEntry, ProfileError,
};
pub use settings::AppSettings;
pub use transcript::{LinePresenter, Transcript, TranscriptLine};
