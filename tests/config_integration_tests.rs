//! Integration tests for ConfigManager, settings and flashing profiles
//!
//! These tests verify:
//! - Settings loading and saving, with defaults for a missing file
//! - Profile documents round-trip through disk in the expected JSON shape
//! - Tolerant profile loading (bad values, extra entries)
//! - Loaded settings flowing into StateManager

use camino::Utf8PathBuf;
use espforge::models::{ChipType, FileSlots, FlashBaud, Profile, ProfileEntry};
use espforge::{AppSettings, ConfigManager, StateManager};
use std::fs;
use tempfile::TempDir;

fn create_test_config_dir() -> (TempDir, Utf8PathBuf) {
    let temp_dir = TempDir::new().unwrap();
    let config_path = Utf8PathBuf::try_from(temp_dir.path().to_path_buf()).unwrap();
    (temp_dir, config_path)
}

#[test]
fn test_create_config_manager() {
    let (_temp_dir, config_path) = create_test_config_dir();
    let manager = ConfigManager::new(&config_path).unwrap();

    assert_eq!(manager.config_dir(), config_path.as_path());
    assert!(manager.settings_path().as_str().ends_with("ESP-Forge Settings.yaml"));
}

#[test]
fn test_load_default_settings() {
    let (_temp_dir, config_path) = create_test_config_dir();
    let manager = ConfigManager::new(&config_path).unwrap();

    let settings = manager.load_settings().unwrap();

    assert_eq!(settings.default_chip, ChipType::Esp32);
    assert_eq!(settings.default_baud, 921_600);
    assert_eq!(settings.flash_mode, "dio");
    assert_eq!(settings.before_reset, "default_reset");
    assert_eq!(settings.after_reset, "hard_reset");
}

#[test]
fn test_settings_written_as_yaml() {
    let (_temp_dir, config_path) = create_test_config_dir();
    let manager = ConfigManager::new(&config_path).unwrap();

    manager.save_settings(&AppSettings::default()).unwrap();

    let text = fs::read_to_string(manager.settings_path()).unwrap();
    assert!(text.contains("flash_freq: 80m"));
    assert!(text.contains("default_chip: esp32"));
}

#[test]
fn test_profile_round_trip() {
    let (_temp_dir, config_path) = create_test_config_dir();
    let manager = ConfigManager::new(&config_path).unwrap();
    let path = config_path.join("esp32s3.json");

    let mut slots = FileSlots::new();
    slots.set(0, "0x1000", "/a.bin");
    slots.set(1, "0x8000", "/b.bin");
    slots.set(2, "0xe000", ""); // incomplete, not saved
    let profile = Profile::from_slots(ChipType::Esp32s3, FlashBaud::B230400, &slots);

    manager.save_profile(&path, &profile).unwrap();

    let text = fs::read_to_string(&path).unwrap();
    let json: serde_json::Value = serde_json::from_str(&text).unwrap();
    assert_eq!(json["chip"], "esp32s3");
    assert_eq!(json["baud"], "230400");
    assert_eq!(json["files"].as_array().unwrap().len(), 2);
    assert_eq!(json["files"][0]["path"], "/a.bin");
    assert_eq!(json["files"][0]["addr"], "0x1000");
    assert!(text.contains("\n    \"chip\""), "expected 4-space indentation:\n{}", text);

    let loaded = manager.load_profile(&path).unwrap();
    assert_eq!(loaded.chip, ChipType::Esp32s3);
    assert_eq!(loaded.baud, FlashBaud::B230400);
    assert_eq!(
        loaded.files,
        vec![
            ProfileEntry::new("0x1000", "/a.bin"),
            ProfileEntry::new("0x8000", "/b.bin"),
        ]
    );

    let mut restored = FileSlots::with_default_addresses();
    restored.apply_profile(&loaded);
    assert_eq!(restored.get(1).unwrap().path, "/b.bin");
    assert_eq!(restored.get(2).unwrap(), &ProfileEntry::default());
}

#[test]
fn test_tolerant_profile_loading() {
    let (_temp_dir, config_path) = create_test_config_dir();
    let manager = ConfigManager::new(&config_path).unwrap();
    let path = config_path.join("odd.json");

    let files: Vec<String> = (0..10)
        .map(|i| format!(r#"{{"path": "/fw/{}.bin", "addr": "0x{:x}"}}"#, i, i * 0x1000))
        .collect();
    fs::write(
        &path,
        format!(
            r#"{{"chip": "esp32h9", "baud": 460800, "extra": true, "files": [{}]}}"#,
            files.join(",")
        ),
    )
    .unwrap();

    let profile = manager.load_profile(&path).unwrap();

    assert_eq!(profile.chip, ChipType::Esp32);
    assert_eq!(profile.baud, FlashBaud::B460800);
    assert_eq!(profile.files.len(), 8);
    assert_eq!(profile.files[7].path, "/fw/7.bin");
}

#[test]
fn test_corrupt_profile_is_an_error() {
    let (_temp_dir, config_path) = create_test_config_dir();
    let manager = ConfigManager::new(&config_path).unwrap();
    let path = config_path.join("broken.json");
    fs::write(&path, "{ not json").unwrap();

    let err = manager.load_profile(&path).unwrap_err();
    assert!(format!("{:#}", err).contains("Failed to parse profile"));
}

#[test]
fn test_settings_into_state_manager() {
    let (_temp_dir, config_path) = create_test_config_dir();
    let manager = ConfigManager::new(&config_path).unwrap();
    fs::write(
        manager.settings_path(),
        "default_chip: esp32c3\ndefault_baud: 115200\ntimestamps: false\n",
    )
    .unwrap();

    let settings = manager.load_settings().unwrap();
    let state = StateManager::new();
    state.load_from_settings(&settings);

    let snapshot = state.snapshot();
    assert_eq!(snapshot.chip, ChipType::Esp32c3);
    assert_eq!(snapshot.flash_baud, FlashBaud::B115200);
    assert!(!snapshot.timestamps);
}
