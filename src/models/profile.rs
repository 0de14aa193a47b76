use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

use super::job::ValidationError;

/// Number of file slots offered by the front end and kept when loading a profile.
pub const MAX_FILE_SLOTS: usize = 8;

/// Addresses pre-filled into the first slots (bootloader, partition table,
/// OTA data, application).
pub const DEFAULT_SLOT_ADDRESSES: [&str; 4] = ["0x1000", "0x8000", "0xe000", "0x10000"];

/// Baud rates the serial monitor accepts.
pub const MONITOR_BAUD_RATES: [u32; 7] = [9600, 57600, 74880, 115200, 230400, 460800, 921600];

/// Target chip family passed to the flashing tool as `--chip`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChipType {
    #[default]
    Esp32,
    Esp32s2,
    Esp32s3,
    Esp32c3,
    Esp8266,
}

impl ChipType {
    pub const ALL: [ChipType; 5] = [
        ChipType::Esp32,
        ChipType::Esp32s2,
        ChipType::Esp32s3,
        ChipType::Esp32c3,
        ChipType::Esp8266,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ChipType::Esp32 => "esp32",
            ChipType::Esp32s2 => "esp32s2",
            ChipType::Esp32s3 => "esp32s3",
            ChipType::Esp32c3 => "esp32c3",
            ChipType::Esp8266 => "esp8266",
        }
    }
}

impl fmt::Display for ChipType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ChipType {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim();
        Self::ALL
            .into_iter()
            .find(|chip| chip.as_str().eq_ignore_ascii_case(wanted))
            .ok_or_else(|| ValidationError::UnknownChip(s.to_string()))
    }
}

/// Baud rate used while flashing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum FlashBaud {
    B115200,
    B230400,
    B460800,
    #[default]
    B921600,
}

impl FlashBaud {
    pub const ALL: [FlashBaud; 4] = [
        FlashBaud::B115200,
        FlashBaud::B230400,
        FlashBaud::B460800,
        FlashBaud::B921600,
    ];

    pub fn as_u32(&self) -> u32 {
        match self {
            FlashBaud::B115200 => 115_200,
            FlashBaud::B230400 => 230_400,
            FlashBaud::B460800 => 460_800,
            FlashBaud::B921600 => 921_600,
        }
    }

    pub fn from_u32(baud: u32) -> Option<Self> {
        Self::ALL.into_iter().find(|b| b.as_u32() == baud)
    }
}

impl fmt::Display for FlashBaud {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_u32())
    }
}

impl FromStr for FlashBaud {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.trim()
            .parse::<u32>()
            .ok()
            .and_then(Self::from_u32)
            .ok_or_else(|| ValidationError::UnsupportedBaud(s.to_string()))
    }
}

/// Errors raised while reading or writing a profile document
#[derive(Error, Debug)]
pub enum ProfileError {
    #[error("Invalid profile JSON: {0}")]
    Json(#[from] serde_json::Error),
}

/// One `{path, addr}` row of a profile. Both fields are kept as text so a
/// half-filled slot survives a save/load cycle untouched.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProfileEntry {
    #[serde(default)]
    pub path: String,
    #[serde(default)]
    pub addr: String,
}

impl ProfileEntry {
    pub fn new(addr: impl Into<String>, path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            addr: addr.into(),
        }
    }

    pub fn is_complete(&self) -> bool {
        !self.path.is_empty() && !self.addr.is_empty()
    }
}

/// Saved flashing setup: chip, flash baud and the file list.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Profile {
    pub chip: ChipType,
    pub baud: FlashBaud,
    pub files: Vec<ProfileEntry>,
}

/// On-disk shape. Loading goes through `serde_json::Value` for the scalar
/// fields so that wrong types fall back to defaults instead of failing.
#[derive(Debug, Default, Deserialize)]
struct RawProfile {
    #[serde(default)]
    chip: Option<serde_json::Value>,
    #[serde(default)]
    baud: Option<serde_json::Value>,
    #[serde(default)]
    files: Vec<ProfileEntry>,
}

#[derive(Serialize)]
struct ProfileDocument<'a> {
    chip: &'a str,
    baud: String,
    files: Vec<&'a ProfileEntry>,
}

impl Profile {
    /// Build a profile from the current slots, keeping only complete rows.
    pub fn from_slots(chip: ChipType, baud: FlashBaud, slots: &FileSlots) -> Self {
        Self {
            chip,
            baud,
            files: slots
                .iter()
                .filter(|slot| slot.is_complete())
                .cloned()
                .collect(),
        }
    }

    /// Parse a profile document.
    ///
    /// Missing or unrecognized `chip`/`baud` values fall back to the defaults
    /// (`esp32`, `921600`), unknown keys are ignored and only the first
    /// [`MAX_FILE_SLOTS`] file entries are kept.
    pub fn from_json(text: &str) -> Result<Self, ProfileError> {
        let raw: RawProfile = serde_json::from_str(text)?;

        let chip = raw
            .chip
            .as_ref()
            .and_then(value_as_text)
            .and_then(|s| s.parse().ok())
            .unwrap_or_default();
        let baud = raw
            .baud
            .as_ref()
            .and_then(value_as_text)
            .and_then(|s| s.parse().ok())
            .unwrap_or_default();

        if raw.files.len() > MAX_FILE_SLOTS {
            tracing::warn!(
                "Profile lists {} files, keeping the first {}",
                raw.files.len(),
                MAX_FILE_SLOTS
            );
        }

        let files = raw.files.into_iter().take(MAX_FILE_SLOTS).collect();

        Ok(Self { chip, baud, files })
    }

    /// Serialize with four-space indentation. Incomplete rows are dropped.
    pub fn to_json(&self) -> Result<String, ProfileError> {
        let document = ProfileDocument {
            chip: self.chip.as_str(),
            baud: self.baud.to_string(),
            files: self.files.iter().filter(|e| e.is_complete()).collect(),
        };

        let mut out = Vec::new();
        let formatter = serde_json::ser::PrettyFormatter::with_indent(b"    ");
        let mut serializer = serde_json::Serializer::with_formatter(&mut out, formatter);
        document.serialize(&mut serializer)?;

        // serde_json only ever emits valid UTF-8
        Ok(String::from_utf8_lossy(&out).into_owned())
    }
}

fn value_as_text(value: &serde_json::Value) -> Option<String> {
    match value {
        serde_json::Value::String(s) => Some(s.clone()),
        serde_json::Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

/// Fixed set of address/path rows edited by the front end.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileSlots {
    slots: Vec<ProfileEntry>,
}

impl FileSlots {
    /// Empty slots.
    pub fn new() -> Self {
        Self {
            slots: vec![ProfileEntry::default(); MAX_FILE_SLOTS],
        }
    }

    /// Empty slots with the usual ESP32 addresses pre-filled.
    pub fn with_default_addresses() -> Self {
        let mut slots = Self::new();
        slots.clear(true);
        slots
    }

    /// Clear every slot, optionally restoring the default addresses.
    pub fn clear(&mut self, set_defaults: bool) {
        for slot in &mut self.slots {
            *slot = ProfileEntry::default();
        }
        if set_defaults {
            for (slot, addr) in self.slots.iter_mut().zip(DEFAULT_SLOT_ADDRESSES) {
                slot.addr = addr.to_string();
            }
        }
    }

    /// Set one slot. Returns false if the index is past the last slot.
    pub fn set(&mut self, index: usize, addr: impl Into<String>, path: impl Into<String>) -> bool {
        match self.slots.get_mut(index) {
            Some(slot) => {
                *slot = ProfileEntry::new(addr, path);
                true
            }
            None => false,
        }
    }

    pub fn get(&self, index: usize) -> Option<&ProfileEntry> {
        self.slots.get(index)
    }

    pub fn iter(&self) -> impl Iterator<Item = &ProfileEntry> {
        self.slots.iter()
    }

    /// Replace the slot contents with a profile's file list.
    pub fn apply_profile(&mut self, profile: &Profile) {
        self.clear(false);
        for (slot, entry) in self.slots.iter_mut().zip(&profile.files) {
            *slot = entry.clone();
        }
    }
}

impl Default for FileSlots {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_chip_parse_and_display() {
        assert_eq!("esp32s3".parse::<ChipType>().unwrap(), ChipType::Esp32s3);
        assert_eq!("ESP8266".parse::<ChipType>().unwrap(), ChipType::Esp8266);
        assert_eq!(ChipType::Esp32c3.to_string(), "esp32c3");
        assert!("esp32h2".parse::<ChipType>().is_err());
    }

    #[test]
    fn test_flash_baud_parse() {
        assert_eq!("230400".parse::<FlashBaud>().unwrap(), FlashBaud::B230400);
        assert_eq!(FlashBaud::default().as_u32(), 921_600);
        assert!("9600".parse::<FlashBaud>().is_err());
        assert!("fast".parse::<FlashBaud>().is_err());
    }

    #[test]
    fn test_profile_defaults_on_missing_keys() {
        let profile = Profile::from_json("{}").unwrap();
        assert_eq!(profile.chip, ChipType::Esp32);
        assert_eq!(profile.baud, FlashBaud::B921600);
        assert!(profile.files.is_empty());
    }

    #[test]
    fn test_profile_unknown_values_fall_back() {
        let profile =
            Profile::from_json(r#"{"chip": "esp32p4", "baud": 12345, "extra": true}"#).unwrap();
        assert_eq!(profile.chip, ChipType::Esp32);
        assert_eq!(profile.baud, FlashBaud::B921600);
    }

    #[test]
    fn test_profile_numeric_baud_accepted() {
        let profile = Profile::from_json(r#"{"baud": 460800}"#).unwrap();
        assert_eq!(profile.baud, FlashBaud::B460800);
    }

    #[test]
    fn test_profile_truncates_to_slot_count() {
        let files: Vec<String> = (0..12)
            .map(|i| format!(r#"{{"path": "/f{i}.bin", "addr": "0x{i:x}000"}}"#))
            .collect();
        let json = format!(r#"{{"files": [{}]}}"#, files.join(","));

        let profile = Profile::from_json(&json).unwrap();
        assert_eq!(profile.files.len(), MAX_FILE_SLOTS);
        assert_eq!(profile.files[7].path, "/f7.bin");
    }

    #[test]
    fn test_profile_to_json_skips_incomplete_rows() {
        let profile = Profile {
            chip: ChipType::Esp32s2,
            baud: FlashBaud::B115200,
            files: vec![
                ProfileEntry::new("0x1000", "/boot.bin"),
                ProfileEntry::new("0x8000", ""),
            ],
        };

        let json = profile.to_json().unwrap();
        assert!(json.contains("\"chip\": \"esp32s2\""));
        assert!(json.contains("\"baud\": \"115200\""));
        assert!(json.contains("/boot.bin"));
        assert!(!json.contains("0x8000"));
        // four-space indentation
        assert!(json.contains("\n    \"chip\""));
    }

    #[test]
    fn test_invalid_json_is_error() {
        assert!(Profile::from_json("not json").is_err());
        assert!(Profile::from_json(r#"{"files": 3}"#).is_err());
    }

    #[test]
    fn test_slots_default_addresses() {
        let slots = FileSlots::with_default_addresses();
        assert_eq!(slots.get(0).unwrap().addr, "0x1000");
        assert_eq!(slots.get(3).unwrap().addr, "0x10000");
        assert_eq!(slots.get(4).unwrap().addr, "");
        assert!(slots.iter().all(|s| s.path.is_empty()));
    }

    #[test]
    fn test_slots_apply_profile_and_from_slots() {
        let mut slots = FileSlots::with_default_addresses();
        let profile = Profile {
            chip: ChipType::Esp32,
            baud: FlashBaud::B921600,
            files: vec![ProfileEntry::new("0x0", "/merged.bin")],
        };

        slots.apply_profile(&profile);
        assert_eq!(slots.get(0).unwrap().path, "/merged.bin");
        // defaults are not restored on load
        assert_eq!(slots.get(1).unwrap().addr, "");

        let rebuilt = Profile::from_slots(ChipType::Esp32, FlashBaud::B921600, &slots);
        assert_eq!(rebuilt, profile);
    }

    #[test]
    fn test_slot_set_out_of_range() {
        let mut slots = FileSlots::new();
        assert!(slots.set(7, "0x1000", "/a.bin"));
        assert!(!slots.set(8, "0x1000", "/a.bin"));
    }
}
