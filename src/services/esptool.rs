use crate::models::{AppSettings, ChipType, FlashBaud, FlashJob, Operation};
use std::fmt;

/// A fully built flashing-tool command line.
///
/// The task runner executes this as-is; nothing in it is validated again.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Invocation {
    pub program: String,
    pub args: Vec<String>,
    pub operation: Operation,
}

impl Invocation {
    /// Space-joined command line for logging.
    pub fn command_line(&self) -> String {
        std::iter::once(self.program.as_str())
            .chain(self.args.iter().map(String::as_str))
            .collect::<Vec<_>>()
            .join(" ")
    }
}

impl fmt::Display for Invocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.command_line())
    }
}

/// `write_flash` options that do not come from the profile.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FlashOptions {
    pub before_reset: String,
    pub after_reset: String,
    pub flash_mode: String,
    pub flash_freq: String,
    pub flash_size: String,
}

impl Default for FlashOptions {
    fn default() -> Self {
        Self {
            before_reset: "default_reset".to_string(),
            after_reset: "hard_reset".to_string(),
            flash_mode: "dio".to_string(),
            flash_freq: "80m".to_string(),
            flash_size: "detect".to_string(),
        }
    }
}

/// Builds esptool argument vectors for each [`Operation`].
///
/// ```text
/// flash:     --chip C --port P --baud B --before .. --after .. write_flash -z
///            --flash_mode .. --flash_freq .. --flash_size .. ADDR PATH [ADDR PATH ..]
/// erase:     --chip C --port P erase_flash
/// chip-info: --chip C --port P chip_id
/// ```
#[derive(Debug, Clone)]
pub struct EsptoolCommand {
    program: String,
    prefix_args: Vec<String>,
    options: FlashOptions,
}

impl EsptoolCommand {
    pub fn new(program: impl Into<String>, prefix_args: Vec<String>, options: FlashOptions) -> Self {
        Self {
            program: program.into(),
            prefix_args,
            options,
        }
    }

    pub fn from_settings(settings: &AppSettings) -> Self {
        Self::new(
            settings.esptool_program.clone(),
            settings.esptool_args.clone(),
            FlashOptions {
                before_reset: settings.before_reset.clone(),
                after_reset: settings.after_reset.clone(),
                flash_mode: settings.flash_mode.clone(),
                flash_freq: settings.flash_freq.clone(),
                flash_size: settings.flash_size.clone(),
            },
        )
    }

    pub fn flash(&self, chip: ChipType, port: &str, baud: FlashBaud, job: &FlashJob) -> Invocation {
        let mut args = self.target_args(chip, port);
        args.extend([
            "--baud".to_string(),
            baud.to_string(),
            "--before".to_string(),
            self.options.before_reset.clone(),
            "--after".to_string(),
            self.options.after_reset.clone(),
            "write_flash".to_string(),
            "-z".to_string(),
            "--flash_mode".to_string(),
            self.options.flash_mode.clone(),
            "--flash_freq".to_string(),
            self.options.flash_freq.clone(),
            "--flash_size".to_string(),
            self.options.flash_size.clone(),
        ]);
        args.extend(job.to_args());

        self.invocation(Operation::Flash, args)
    }

    pub fn erase(&self, chip: ChipType, port: &str) -> Invocation {
        let mut args = self.target_args(chip, port);
        args.push("erase_flash".to_string());
        self.invocation(Operation::Erase, args)
    }

    pub fn chip_info(&self, chip: ChipType, port: &str) -> Invocation {
        let mut args = self.target_args(chip, port);
        args.push("chip_id".to_string());
        self.invocation(Operation::ChipInfo, args)
    }

    fn target_args(&self, chip: ChipType, port: &str) -> Vec<String> {
        let mut args = self.prefix_args.clone();
        args.extend([
            "--chip".to_string(),
            chip.to_string(),
            "--port".to_string(),
            port.to_string(),
        ]);
        args
    }

    fn invocation(&self, operation: Operation, args: Vec<String>) -> Invocation {
        let invocation = Invocation {
            program: self.program.clone(),
            args,
            operation,
        };
        tracing::debug!("Built {} command: {}", operation, invocation);
        invocation
    }
}

impl Default for EsptoolCommand {
    fn default() -> Self {
        Self::from_settings(&AppSettings::default())
    }
}
