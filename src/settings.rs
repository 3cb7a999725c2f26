//! Tool settings for the `jsm` binary
//!
//! These are user preferences, separate from the registry's own
//! `json-schema-manager-config.yml`. They are layered from:
//! - Default values
//! - Settings file (jsm.toml, .jsm.toml, config/jsm.toml)
//! - The user config directory
//! - Environment variables (JSM__*)
//!
//! ## Example settings file (jsm.toml):
//! ```toml
//! [registry]
//! path = "./schemas"
//! environment = "staging"
//!
//! [test]
//! stop_on_first_error = false
//! output_format = "json"
//!
//! [watch]
//! debounce_ms = 250
//!
//! [dist]
//! out_dir = "./dist"
//! workers = 8
//! ```

use config_crate::{Config, ConfigError, Environment, File};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

use crate::report::ReportFormat;

/// Main settings for the command line tool
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Settings {
    #[serde(default)]
    pub registry: RegistrySettings,

    #[serde(default)]
    pub test: TestSettings,

    #[serde(default)]
    pub watch: WatchSettings,

    #[serde(default)]
    pub dist: DistSettings,
}

/// Which registry to open
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegistrySettings {
    /// Registry root (resolved against the working directory)
    #[serde(default = "default_registry_path")]
    pub path: PathBuf,

    /// Environment used when a command does not name one; production if unset
    #[serde(default)]
    pub environment: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TestSettings {
    #[serde(default = "default_true")]
    pub stop_on_first_error: bool,

    #[serde(default)]
    pub output_format: ReportFormat,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WatchSettings {
    #[serde(default = "default_debounce_ms")]
    pub debounce_ms: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DistSettings {
    #[serde(default = "default_out_dir")]
    pub out_dir: PathBuf,

    /// Writer threads; the number of CPUs if unset
    #[serde(default)]
    pub workers: Option<usize>,
}

fn default_registry_path() -> PathBuf {
    PathBuf::from(".")
}

fn default_true() -> bool {
    true
}

fn default_debounce_ms() -> u64 {
    100
}

fn default_out_dir() -> PathBuf {
    PathBuf::from("dist")
}

impl Default for RegistrySettings {
    fn default() -> Self {
        Self {
            path: default_registry_path(),
            environment: None,
        }
    }
}

impl Default for TestSettings {
    fn default() -> Self {
        Self {
            stop_on_first_error: true,
            output_format: ReportFormat::Text,
        }
    }
}

impl Default for WatchSettings {
    fn default() -> Self {
        Self {
            debounce_ms: default_debounce_ms(),
        }
    }
}

impl Default for DistSettings {
    fn default() -> Self {
        Self {
            out_dir: default_out_dir(),
            workers: None,
        }
    }
}

impl Settings {
    /// Load settings, with `config_path` layered over the default locations
    pub fn load_from(config_path: Option<&str>) -> Result<Self, ConfigError> {
        let mut builder = Config::builder();

        for location in ["jsm.toml", ".jsm.toml", "config/jsm.toml"] {
            builder = builder.add_source(File::with_name(location).required(false));
        }

        if let Some(dirs) = directories::ProjectDirs::from("org", "json-schema-manager", "jsm") {
            let user_settings = dirs.config_dir().join("jsm.toml");
            if user_settings.exists() {
                builder = builder.add_source(File::from(user_settings).required(false));
            }
        }

        if let Some(path) = config_path {
            builder = builder.add_source(File::with_name(path).required(true));
        }

        // JSM__WATCH__DEBOUNCE_MS=250
        builder = builder.add_source(
            Environment::with_prefix("JSM")
                .prefix_separator("__")
                .separator("__")
                .try_parsing(true),
        );

        builder.build()?.try_deserialize()
    }

    /// Save settings to a file
    pub fn save(&self, path: &str) -> std::io::Result<()> {
        let content = toml::to_string_pretty(self)
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))?;
        std::fs::write(path, content)
    }

    /// Registry root, relative paths resolved against the working directory
    pub fn registry_path(&self) -> PathBuf {
        if self.registry.path.is_absolute() {
            self.registry.path.clone()
        } else {
            std::env::current_dir().unwrap_or_default().join(&self.registry.path)
        }
    }

    pub fn debounce(&self) -> Duration {
        Duration::from_millis(self.watch.debounce_ms)
    }
}
