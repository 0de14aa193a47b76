use super::profile::ChipType;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Application settings from `ESP-Forge Settings.yaml`.
///
/// Every field has a default, so a partial file (or none at all) is valid.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppSettings {
    /// Program used to run the flashing tool
    pub esptool_program: String,

    /// Arguments placed before the operation arguments (e.g. `-m esptool`)
    pub esptool_args: Vec<String>,

    pub default_chip: ChipType,
    pub default_baud: u32,
    pub monitor_baud: u32,

    pub flash_mode: String,
    pub flash_freq: String,
    pub flash_size: String,
    pub before_reset: String,
    pub after_reset: String,

    /// Substrings that mark a line as a write-progress report
    pub progress_markers: Vec<String>,

    pub poll_interval_ms: u64,
    pub serial_read_timeout_ms: u64,
    pub reader_join_timeout_ms: u64,

    /// Prefix serial monitor lines with a wall-clock timestamp
    pub timestamps: bool,

    pub log_dir: String,
    pub debug_mode: bool,
}

impl Default for AppSettings {
    fn default() -> Self {
        Self {
            esptool_program: default_esptool_program(),
            esptool_args: vec!["-m".to_string(), "esptool".to_string()],
            default_chip: ChipType::Esp32,
            default_baud: 921_600,
            monitor_baud: 115_200,
            flash_mode: "dio".to_string(),
            flash_freq: "80m".to_string(),
            flash_size: "detect".to_string(),
            before_reset: "default_reset".to_string(),
            after_reset: "hard_reset".to_string(),
            progress_markers: vec!["Writing at".to_string(), "write_flash".to_string()],
            poll_interval_ms: 100,
            serial_read_timeout_ms: 1000,
            reader_join_timeout_ms: 1000,
            timestamps: true,
            log_dir: "logs".to_string(),
            debug_mode: false,
        }
    }
}

fn default_esptool_program() -> String {
    if cfg!(target_os = "windows") {
        "python".to_string()
    } else {
        "python3".to_string()
    }
}

impl AppSettings {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms.max(1))
    }

    pub fn serial_read_timeout(&self) -> Duration {
        Duration::from_millis(self.serial_read_timeout_ms.max(1))
    }

    pub fn reader_join_timeout(&self) -> Duration {
        Duration::from_millis(self.reader_join_timeout_ms)
    }
}
