// UI module - headless console front end
//
// This module contains:
// - EventPump: drains the task and serial queues on the front end's loop
// - ConsoleController: validates input, starts work and renders the results

pub mod bridge;
pub mod controller;

pub use bridge::{DrainSummary, EventPump, EventSink};
pub use controller::{
    CommandOutcome, ConsoleController, ConsoleSink, FlashRequest, MonitorRequest,
    spawn_stdin_lines,
};
