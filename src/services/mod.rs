//! Services module - background I/O pipelines for flashing and monitoring.
//!
//! Nothing in here touches front-end state. Both pipelines publish onto an
//! unbounded FIFO queue and the event pump ([`crate::ui::EventPump`]) applies
//! what it drains on the front end's own loop.
//!
//! # Components
//!
//! - [`EsptoolCommand`]: builds the flashing-tool [`Invocation`] for flash,
//!   erase and chip-info from validated inputs and [`FlashOptions`].
//!
//! - [`TaskRunner`]: runs one invocation at a time on the tokio runtime,
//!   streaming stdout and stderr as lines, progress reports extracted by
//!   [`ProgressParser`], and exactly one completion per run.
//!
//! - [`SerialBridge`]: owns at most one serial connection. A dedicated reader
//!   thread publishes received lines and disconnects; writes happen on the
//!   caller's thread. Ports are opened through the [`PortOpener`] seam.
//!
//! - [`LineSplitter`]: shared byte-to-line decoding for both pipelines.
//!
//! # Usage Example
//!
//! ```ignore
//! use espforge::services::{EsptoolCommand, TaskRunner, output_channel};
//!
//! let (tx, mut rx) = output_channel();
//! let runner = TaskRunner::new(handle, tx, ProgressParser::new(), metrics);
//!
//! let command = EsptoolCommand::from_settings(&AppSettings::default());
//! let invocation = command.erase(ChipType::Esp32, "COM3");
//! runner.start(invocation)?;
//!
//! while let Some(event) = rx.recv().await {
//!     // Line, Progress, then exactly one Completion
//! }
//! ```

pub mod esptool;
pub mod lines;
pub mod progress;
pub mod serial;
pub mod task_runner;

pub use esptool::{EsptoolCommand, FlashOptions, Invocation};
pub use lines::{LineSplitter, decode_lossy};
pub use progress::{DEFAULT_PROGRESS_MARKERS, ProgressParser};
pub use serial::{
    PortOpener, SerialBridge, SerialError, SerialHandles, SerialReceiver, SerialSender,
    SystemPortOpener, serial_channel,
};
pub use task_runner::{OutputReceiver, OutputSender, TaskError, TaskRunner, output_channel};
