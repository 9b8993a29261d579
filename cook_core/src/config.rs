//! Configuration file support for Cookalong.
//!
//! Configuration is loaded from `$XDG_CONFIG_HOME/cookalong/config.toml`.

use crate::{Error, Result, VoiceLanguage};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Application configuration
#[derive(Clone, Debug, Serialize, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub data: DataConfig,

    #[serde(default)]
    pub session: SessionConfig,

    #[serde(default)]
    pub voice: VoiceConfig,
}

/// Data storage configuration
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct DataConfig {
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,
}

impl Default for DataConfig {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
        }
    }
}

impl DataConfig {
    pub fn catalog_path(&self) -> PathBuf {
        catalog_path(&self.data_dir)
    }

    pub fn prep_log_path(&self) -> PathBuf {
        prep_log_path(&self.data_dir)
    }

    pub fn preferences_path(&self) -> PathBuf {
        preferences_path(&self.data_dir)
    }
}

/// Path of the recipe catalog inside a data directory
pub fn catalog_path(data_dir: &Path) -> PathBuf {
    data_dir.join("recipes.json")
}

/// Path of the preparation log inside a data directory
pub fn prep_log_path(data_dir: &Path) -> PathBuf {
    data_dir.join("logs").join("preparations.jsonl")
}

/// Path of the saved user preferences inside a data directory
pub fn preferences_path(data_dir: &Path) -> PathBuf {
    data_dir.join("preferences.json")
}

/// Timer behaviour while cooking
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SessionConfig {
    #[serde(default = "default_tick_interval_ms")]
    pub tick_interval_ms: u64,

    #[serde(default = "default_alarm_repeat_secs")]
    pub alarm_repeat_secs: u64,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            tick_interval_ms: default_tick_interval_ms(),
            alarm_repeat_secs: default_alarm_repeat_secs(),
        }
    }
}

/// Narration settings
///
/// Commands are argv templates. `translate_command` receives the text on stdin
/// and `{lang}` is replaced by the target language name. `speak_command` gets
/// `{tag}` (e.g. `hi-IN`) and `{text}` substituted.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct VoiceConfig {
    #[serde(default)]
    pub default_language: VoiceLanguage,

    #[serde(default)]
    pub translate_command: Option<Vec<String>>,

    /// Seconds before a translate command is killed
    #[serde(default = "default_translate_timeout_secs")]
    pub translate_timeout_secs: u64,

    #[serde(default)]
    pub speak_command: Option<Vec<String>>,
}

impl Default for VoiceConfig {
    fn default() -> Self {
        Self {
            default_language: VoiceLanguage::English,
            translate_command: None,
            translate_timeout_secs: default_translate_timeout_secs(),
            speak_command: None,
        }
    }
}

// Default value functions
fn default_data_dir() -> PathBuf {
    let base = dirs::data_local_dir().unwrap_or_else(|| {
        std::env::var("HOME")
            .map(|home| PathBuf::from(home).join(".local/share"))
            .unwrap_or_else(|_| PathBuf::from("."))
    });
    base.join("cookalong")
}

fn default_translate_timeout_secs() -> u64 {
    10
}

fn default_tick_interval_ms() -> u64 {
    1000
}

fn default_alarm_repeat_secs() -> u64 {
    10
}

impl Config {
    /// Load configuration from the standard config path
    pub fn load() -> Result<Self> {
        let config_path = Self::default_config_path();
        if config_path.exists() {
            Self::load_from(&config_path)
        } else {
            tracing::info!("No config file found at {:?}, using defaults", config_path);
            Ok(Self::default())
        }
    }

    /// Load configuration from a specific path
    pub fn load_from(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&contents)?;
        config.validate()?;
        tracing::info!("Loaded config from {:?}", path);
        Ok(config)
    }

    /// Get the default config file path
    pub fn default_config_path() -> PathBuf {
        let base = dirs::config_dir().unwrap_or_else(|| {
            std::env::var("HOME")
                .map(|home| PathBuf::from(home).join(".config"))
                .unwrap_or_else(|_| PathBuf::from("."))
        });
        base.join("cookalong").join("config.toml")
    }

    pub fn validate(&self) -> Result<()> {
        if self.session.tick_interval_ms == 0 {
            return Err(Error::Config("tick_interval_ms must be positive".into()));
        }
        if self.session.alarm_repeat_secs == 0 {
            return Err(Error::Config("alarm_repeat_secs must be positive".into()));
        }
        if self.voice.translate_timeout_secs == 0 {
            return Err(Error::Config("translate_timeout_secs must be positive".into()));
        }
        for (name, command) in [
            ("translate_command", &self.voice.translate_command),
            ("speak_command", &self.voice.speak_command),
        ] {
            if matches!(command, Some(argv) if argv.is_empty()) {
                return Err(Error::Config(format!("{} must not be empty", name)));
            }
        }
        Ok(())
    }

    /// Save the current configuration to the default path
    pub fn save(&self) -> Result<()> {
        let config_path = Self::default_config_path();
        self.save_to(&config_path)
    }

    /// Save the current configuration to a specific path
    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let contents = toml::to_string_pretty(self)
            .map_err(|e| Error::Config(format!("Failed to serialize config: {}", e)))?;
        std::fs::write(path, contents)?;
        tracing::info!("Saved config to {:?}", path);
        Ok(())
    }
}
