// ConsoleController - headless front end for flashing and monitoring
//
// Plays the role a window would: it validates user input, starts background
// work through the TaskRunner or SerialBridge, then runs the EventPump on its
// own loop until the work is done. All rendering goes through ConsoleSink.

use super::bridge::{EventPump, EventSink};
use crate::config::ConfigManager;
use crate::metrics::Metrics;
use crate::models::{
    AppSettings, ChipType, FileSlots, FlashBaud, FlashJob, MAX_FILE_SLOTS, Profile,
    SerialStatus, Severity, Transcript, validate_port,
};
use crate::services::{
    EsptoolCommand, Invocation, PortOpener, ProgressParser, SerialBridge, TaskRunner,
    output_channel, serial_channel,
};
use crate::state::StateManager;
use anyhow::{Context, Result, bail};
use camino::Utf8PathBuf;
use std::io::{BufRead, Write};
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::time::{self, MissedTickBehavior};

const ERASE_PROMPT: &str = "This will ERASE ALL DATA on the chip. Are you sure? [y/N] ";

/// How a console command ended, mapped to the process exit code.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommandOutcome {
    Success,
    Failure,
    Cancelled,
}

impl CommandOutcome {
    pub fn from_success(success: bool) -> Self {
        if success { Self::Success } else { Self::Failure }
    }

    pub fn exit_code(&self) -> u8 {
        match self {
            CommandOutcome::Success | CommandOutcome::Cancelled => 0,
            CommandOutcome::Failure => 1,
        }
    }
}

/// Inputs for a multi-file flash.
#[derive(Debug, Clone, Default)]
pub struct FlashRequest {
    pub port: String,
    pub chip: Option<ChipType>,
    pub baud: Option<FlashBaud>,

    /// Profile to fill the file slots, chip and baud from
    pub profile: Option<Utf8PathBuf>,

    /// `(address, path)` rows; replace the profile's rows when given
    pub files: Vec<(String, String)>,

    pub save_profile: Option<Utf8PathBuf>,
}

/// Inputs for a serial monitor session.
#[derive(Debug, Clone)]
pub struct MonitorRequest {
    pub port: String,
    pub baud: Option<u32>,
    pub timestamps: bool,
    pub save_log: Option<Utf8PathBuf>,
}

/// [`EventSink`] that prints to a writer and keeps both transcripts.
pub struct ConsoleSink<W: Write> {
    out: W,
    task_log: Transcript,
    monitor_log: Transcript,
    last_progress: Option<(u8, bool)>,
}

impl<W: Write> ConsoleSink<W> {
    pub fn new(out: W) -> Self {
        Self {
            out,
            task_log: Transcript::new(),
            monitor_log: Transcript::new(),
            last_progress: None,
        }
    }

    pub fn task_transcript(&self) -> &Transcript {
        &self.task_log
    }

    pub fn monitor_transcript(&self) -> &Transcript {
        &self.monitor_log
    }

    pub fn writer(&self) -> &W {
        &self.out
    }

    /// Fresh task pane for a new operation
    fn begin_task(&mut self) {
        self.task_log.clear();
        self.last_progress = None;
    }

    fn clear_monitor(&mut self) {
        self.monitor_log.clear();
    }

    fn prompt(&mut self, text: &str) -> std::io::Result<()> {
        write!(self.out, "{}", text)?;
        self.out.flush()
    }

    fn write_line(&mut self, text: &str) {
        if let Err(e) = writeln!(self.out, "{}", text) {
            tracing::warn!("Failed to write console output: {}", e);
        }
    }
}

impl<W: Write> EventSink for ConsoleSink<W> {
    fn task_line(&mut self, message: &str, severity: Severity) {
        self.task_log.push(message, severity);
        self.write_line(message);
    }

    fn progress(&mut self, percent: u8, failed: bool) {
        if self.last_progress == Some((percent, failed)) {
            return;
        }
        self.last_progress = Some((percent, failed));

        if failed {
            self.write_line(&format!("Progress: {}% (failed)", percent));
        } else {
            self.write_line(&format!("Progress: {}%", percent));
        }
    }

    fn task_finished(&mut self, success: bool) {
        tracing::debug!("Console task finished (success: {})", success);
        if let Err(e) = self.out.flush() {
            tracing::warn!("Failed to flush console output: {}", e);
        }
    }

    fn serial_line(&mut self, message: &str, severity: Severity) {
        self.monitor_log.push(message, severity);
        self.write_line(message);
    }
}

/// Front end that drives one command at a time from the console.
pub struct ConsoleController<W: Write> {
    settings: AppSettings,
    config: ConfigManager,
    state: StateManager,
    command: EsptoolCommand,
    runner: TaskRunner,
    bridge: SerialBridge,
    pump: EventPump,
    sink: ConsoleSink<W>,
}

impl<W: Write> ConsoleController<W> {
    pub fn new(
        settings: AppSettings,
        config: ConfigManager,
        state: StateManager,
        metrics: Arc<Metrics>,
        runtime: tokio::runtime::Handle,
        opener: Arc<dyn PortOpener>,
        out: W,
    ) -> Self {
        let (output_tx, output_rx) = output_channel();
        let (serial_tx, serial_rx) = serial_channel();

        state.load_from_settings(&settings);

        let runner = TaskRunner::new(
            runtime,
            output_tx,
            ProgressParser::with_markers(settings.progress_markers.clone()),
            Arc::clone(&metrics),
        );
        let bridge = SerialBridge::new(opener, serial_tx, Arc::clone(&metrics))
            .with_timeouts(settings.serial_read_timeout(), settings.reader_join_timeout());
        let pump = EventPump::new(output_rx, serial_rx, state.clone(), metrics);

        tracing::info!("Console controller initialized");

        Self {
            command: EsptoolCommand::from_settings(&settings),
            settings,
            config,
            state,
            runner,
            bridge,
            pump,
            sink: ConsoleSink::new(out),
        }
    }

    pub fn sink(&self) -> &ConsoleSink<W> {
        &self.sink
    }

    pub fn state(&self) -> &StateManager {
        &self.state
    }

    /// Write every complete slot to the chip.
    ///
    /// Input problems are returned as errors before anything is spawned.
    pub async fn flash(&mut self, request: FlashRequest) -> Result<CommandOutcome> {
        let port = validate_port(&request.port)?.to_string();
        let (mut chip, mut baud) = self.state.read(|s| (s.chip, s.flash_baud));
        self.sink.begin_task();
        let mut slots = FileSlots::with_default_addresses();

        if let Some(path) = &request.profile {
            let profile = self.config.load_profile(path)?;
            slots.apply_profile(&profile);
            chip = profile.chip;
            baud = profile.baud;
            self.sink
                .task_line("Profile loaded successfully.", Severity::Success);
        }

        if !request.files.is_empty() {
            if request.files.len() > MAX_FILE_SLOTS {
                bail!(
                    "At most {} files can be flashed at once, got {}",
                    MAX_FILE_SLOTS,
                    request.files.len()
                );
            }
            slots.clear(false);
            for (index, (addr, path)) in request.files.iter().enumerate() {
                slots.set(index, addr.as_str(), path.as_str());
            }
        }

        chip = request.chip.unwrap_or(chip);
        baud = request.baud.unwrap_or(baud);

        if let Some(path) = &request.save_profile {
            let profile = Profile::from_slots(chip, baud, &slots);
            self.config.save_profile(path, &profile)?;
            self.sink
                .task_line("Profile saved successfully.", Severity::Success);
        }

        let job = FlashJob::from_rows(slots.iter().map(|e| (e.addr.as_str(), e.path.as_str())))?;
        self.state.select_target(Some(port.clone()), chip, baud);

        tracing::info!(
            "Flashing {} segment(s) to {} on {} at {} baud",
            job.len(),
            chip,
            port,
            baud
        );

        let invocation = self.command.flash(chip, &port, baud, &job);
        self.run_task(invocation).await
    }

    /// Erase the whole flash after a confirmation read from `input`.
    pub async fn erase(
        &mut self,
        port: &str,
        chip: Option<ChipType>,
        assume_yes: bool,
        input: &mut dyn BufRead,
    ) -> Result<CommandOutcome> {
        let port = validate_port(port)?.to_string();
        let chip = chip.unwrap_or_else(|| self.state.read(|s| s.chip));
        self.sink.begin_task();

        if !assume_yes && !self.confirm_erase(input)? {
            tracing::info!("Erase declined by user");
            self.sink.task_line("Erase cancelled.", Severity::Info);
            return Ok(CommandOutcome::Cancelled);
        }

        let invocation = self.command.erase(chip, &port);
        self.run_task(invocation).await
    }

    pub async fn chip_info(&mut self, port: &str, chip: Option<ChipType>) -> Result<CommandOutcome> {
        let port = validate_port(port)?.to_string();
        let chip = chip.unwrap_or_else(|| self.state.read(|s| s.chip));
        self.sink.begin_task();

        let invocation = self.command.chip_info(chip, &port);
        self.run_task(invocation).await
    }

    /// Run a serial terminal until `input` closes, Ctrl-C, or the device
    /// goes away. Each received input line is sent to the device.
    pub async fn monitor(
        &mut self,
        request: MonitorRequest,
        mut input: mpsc::UnboundedReceiver<String>,
    ) -> Result<CommandOutcome> {
        let port = validate_port(&request.port)?.to_string();
        let baud = request.baud.unwrap_or(self.settings.monitor_baud);

        self.sink.clear_monitor();
        self.pump.set_timestamps(request.timestamps);
        self.state.update_settings(|s| s.monitor_baud = baud);
        self.state.set_serial_status(SerialStatus::Connecting {
            port: port.clone(),
            baud,
        });

        let outcome = if self.bridge.connect(&port, baud).is_err() {
            // ConnectFailed is already queued with the reason
            self.pump.drain(&mut self.sink);
            CommandOutcome::Failure
        } else {
            let outcome = self.monitor_loop(&mut input).await;
            self.bridge.close();
            self.pump.drain(&mut self.sink);
            outcome
        };
        self.state.set_serial_status(SerialStatus::Disconnected);

        if let Some(path) = &request.save_log {
            self.sink.monitor_transcript().save(path)?;
        }

        Ok(outcome)
    }

    async fn monitor_loop(&mut self, input: &mut mpsc::UnboundedReceiver<String>) -> CommandOutcome {
        let mut ticker = time::interval(self.settings.poll_interval());
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        let ctrl_c = tokio::signal::ctrl_c();
        tokio::pin!(ctrl_c);

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    if self.pump.drain(&mut self.sink).serial_lost {
                        return CommandOutcome::Failure;
                    }
                }
                line = input.recv() => match line {
                    Some(text) => {
                        if let Err(e) = self.bridge.send(&text) {
                            self.sink.serial_line(&format!("Error: {}", e), Severity::Error);
                        }
                    }
                    None => {
                        tracing::info!("Monitor input closed");
                        return CommandOutcome::Success;
                    }
                },
                _ = &mut ctrl_c => {
                    tracing::info!("Monitor interrupted");
                    return CommandOutcome::Success;
                }
            }
        }
    }

    /// Callers start a fresh task pane with `sink.begin_task()` first.
    async fn run_task(&mut self, invocation: Invocation) -> Result<CommandOutcome> {
        self.state.begin_task(invocation.operation);

        if let Err(e) = self.runner.start(invocation) {
            self.state.on_task_complete(false);
            return Err(e).context("Could not start the flashing tool");
        }

        let success = self
            .pump
            .run_until_task_finished(&mut self.sink, self.settings.poll_interval())
            .await;

        Ok(CommandOutcome::from_success(success))
    }

    fn confirm_erase(&mut self, input: &mut dyn BufRead) -> Result<bool> {
        self.sink
            .prompt(ERASE_PROMPT)
            .context("Failed to write erase prompt")?;

        let mut answer = String::new();
        input
            .read_line(&mut answer)
            .context("Failed to read erase confirmation")?;

        Ok(matches!(answer.trim().to_ascii_lowercase().as_str(), "y" | "yes"))
    }
}

/// Forward stdin lines into a channel from a blocking reader thread.
///
/// The channel closes when stdin reaches EOF.
pub fn spawn_stdin_lines() -> mpsc::UnboundedReceiver<String> {
    let (tx, rx) = mpsc::unbounded_channel();

    let spawned = std::thread::Builder::new()
        .name("espforge-stdin".to_string())
        .spawn(move || {
            for line in std::io::stdin().lock().lines() {
                match line {
                    Ok(text) => {
                        if tx.send(text).is_err() {
                            break;
                        }
                    }
                    Err(e) => {
                        tracing::warn!("Stopped reading stdin: {}", e);
                        break;
                    }
                }
            }
        });

    if let Err(e) = spawned {
        tracing::error!("Could not start stdin reader: {}", e);
    }

    rx
}
