use crate::models::{AppSettings, Profile};
use anyhow::{Context, Result};
use camino::{Utf8Path, Utf8PathBuf};
use config::{Config, Environment, File, FileFormat};
use std::fs;

/// Default configuration directory, relative to the working directory.
pub const DEFAULT_CONFIG_DIR: &str = "ESP-Forge Data";

/// Settings file name inside the configuration directory.
pub const SETTINGS_FILE_NAME: &str = "ESP-Forge Settings.yaml";

/// Prefix for environment overrides, e.g. `ESPFORGE_MONITOR_BAUD=9600`.
pub const ENV_PREFIX: &str = "ESPFORGE";

/// Loads and saves application settings and flashing profiles.
///
/// Settings are layered: built-in defaults, then `ESP-Forge Settings.yaml`
/// (optional), then `ESPFORGE_*` environment variables. List settings take
/// comma-separated values from the environment.
///
/// Profiles are standalone JSON files the user picks a path for.
#[derive(Debug, Clone)]
pub struct ConfigManager {
    config_dir: Utf8PathBuf,
    settings_path: Utf8PathBuf,
}

impl ConfigManager {
    /// Create a ConfigManager rooted at `config_dir`, creating it if missing.
    pub fn new<P: AsRef<Utf8Path>>(config_dir: P) -> Result<Self> {
        let config_dir = config_dir.as_ref().to_path_buf();

        if !config_dir.exists() {
            fs::create_dir_all(&config_dir)
                .with_context(|| format!("Failed to create config directory: {}", config_dir))?;
        }

        Ok(Self {
            settings_path: config_dir.join(SETTINGS_FILE_NAME),
            config_dir,
        })
    }

    /// Load settings from the file and environment, defaults for the rest.
    pub fn load_settings(&self) -> Result<AppSettings> {
        self.load_settings_with(Self::environment())
    }

    fn load_settings_with(&self, environment: Environment) -> Result<AppSettings> {
        if !self.settings_path.exists() {
            tracing::warn!(
                "Settings file not found at {}, using defaults",
                self.settings_path
            );
        }

        let layered = Config::builder()
            .add_source(
                File::from(self.settings_path.as_std_path())
                    .format(FileFormat::Yaml)
                    .required(false),
            )
            .add_source(environment)
            .build()
            .with_context(|| format!("Failed to read settings: {}", self.settings_path))?;

        let settings: AppSettings = layered
            .try_deserialize()
            .with_context(|| format!("Failed to parse settings: {}", self.settings_path))?;

        tracing::info!("Loaded settings from {}", self.settings_path);
        Ok(settings)
    }

    fn environment() -> Environment {
        Environment::with_prefix(ENV_PREFIX)
            .try_parsing(true)
            .list_separator(",")
            .with_list_parse_key("esptool_args")
            .with_list_parse_key("progress_markers")
    }

    pub fn save_settings(&self, settings: &AppSettings) -> Result<()> {
        let yaml_string =
            serde_yaml_ng::to_string(settings).context("Failed to serialize settings to YAML")?;

        fs::write(&self.settings_path, yaml_string)
            .with_context(|| format!("Failed to write settings: {}", self.settings_path))?;

        tracing::info!("Saved settings to {}", self.settings_path);
        Ok(())
    }

    /// Read a profile. Unknown or missing fields fall back to defaults.
    pub fn load_profile(&self, path: &Utf8Path) -> Result<Profile> {
        let text = fs::read_to_string(path)
            .with_context(|| format!("Failed to read profile: {}", path))?;

        let profile =
            Profile::from_json(&text).with_context(|| format!("Failed to parse profile: {}", path))?;

        tracing::info!(
            "Loaded profile from {} ({} files, chip {}, baud {})",
            path,
            profile.files.len(),
            profile.chip,
            profile.baud
        );
        Ok(profile)
    }

    /// Write a profile as 4-space indented JSON.
    pub fn save_profile(&self, path: &Utf8Path, profile: &Profile) -> Result<()> {
        let json = profile
            .to_json()
            .context("Failed to serialize profile to JSON")?;

        if let Some(parent) = path.parent()
            && !parent.as_str().is_empty()
            && !parent.exists()
        {
            fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create profile directory: {}", parent))?;
        }

        fs::write(path, json).with_context(|| format!("Failed to write profile: {}", path))?;

        tracing::info!("Saved profile to {}", path);
        Ok(())
    }

    pub fn config_dir(&self) -> &Utf8Path {
        &self.config_dir
    }

    pub fn settings_path(&self) -> &Utf8Path {
        &self.settings_path
    }
}
