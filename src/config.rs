use anyhow::Context;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, warn};

use crate::i18n::Locale;
use crate::viewport::{LayoutStrategy, DEFAULT_THRESHOLD};

fn default_endpoint() -> String {
    "http://localhost:5000/ask".to_string()
}

fn default_timeout_secs() -> u64 {
    60
}

fn default_welcome_delay_ms() -> u64 {
    1000
}

fn default_reveal_delay_ms() -> u64 {
    300
}

fn default_keyboard_threshold() -> f32 {
    DEFAULT_THRESHOLD
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub service: ServiceConfig,
    #[serde(default)]
    pub window: WindowConfig,
    #[serde(default)]
    pub ui: UiConfig,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ServiceConfig {
    #[serde(default = "default_endpoint")]
    pub endpoint: String,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct WindowConfig {
    pub width: u32,
    pub height: u32,
    pub min_width: u32,
    pub min_height: u32,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct UiConfig {
    /// Overrides the locale detected from the environment.
    #[serde(default)]
    pub locale: Option<Locale>,
    #[serde(default = "default_welcome_delay_ms")]
    pub welcome_delay_ms: u64,
    #[serde(default = "default_reveal_delay_ms")]
    pub reveal_delay_ms: u64,
    #[serde(default = "default_keyboard_threshold")]
    pub keyboard_threshold: f32,
    /// Lift the input bar above an on-screen keyboard.
    #[serde(default)]
    pub adapt_to_keyboard: bool,
    #[serde(default)]
    pub layout_strategy: LayoutStrategy,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        ServiceConfig {
            endpoint: default_endpoint(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

impl Default for WindowConfig {
    fn default() -> Self {
        WindowConfig {
            width: 480,
            height: 760,
            min_width: 320,
            min_height: 400,
        }
    }
}

impl Default for UiConfig {
    fn default() -> Self {
        UiConfig {
            locale: None,
            welcome_delay_ms: default_welcome_delay_ms(),
            reveal_delay_ms: default_reveal_delay_ms(),
            keyboard_threshold: default_keyboard_threshold(),
            adapt_to_keyboard: false,
            layout_strategy: LayoutStrategy::default(),
        }
    }
}

impl ServiceConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs.max(1))
    }
}

impl UiConfig {
    pub fn welcome_delay(&self) -> Duration {
        Duration::from_millis(self.welcome_delay_ms)
    }

    pub fn reveal_delay(&self) -> Duration {
        Duration::from_millis(self.reveal_delay_ms)
    }

    pub fn initial_locale(&self) -> Locale {
        self.locale.unwrap_or_else(Locale::detect)
    }
}

impl Config {
    pub fn load() -> Self {
        Self::load_from(&Self::get_config_path())
    }

    pub fn load_from(config_path: &Path) -> Self {
        if config_path.exists() {
            match Self::read(config_path) {
                Ok(config) => {
                    debug!(path = %config_path.display(), "loaded config");
                    return config;
                }
                Err(e) => warn!("{:#}. Using defaults.", e),
            }
        } else if let Some(parent) = config_path.parent() {
            // Create config directory if it doesn't exist
            let _ = fs::create_dir_all(parent);
        }

        Config::default()
    }

    fn read(config_path: &Path) -> anyhow::Result<Self> {
        let contents = fs::read_to_string(config_path)
            .with_context(|| format!("Error reading {}", config_path.display()))?;
        let config = toml::from_str(&contents)
            .with_context(|| format!("Error parsing {}", config_path.display()))?;
        Ok(config)
    }

    pub fn get_config_path() -> PathBuf {
        Self::get_config_dir().join("config.toml")
    }

    pub fn get_config_dir() -> PathBuf {
        if let Some(home) = std::env::var_os("HOME") {
            PathBuf::from(home).join(".config/chik")
        } else {
            PathBuf::from(".")
        }
    }

    pub fn get_locales_path() -> PathBuf {
        Self::get_config_dir().join("locales.toml")
    }
}
