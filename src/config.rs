//! Configuration management for voice-nav.
//!
//! Loads config from YAML files in standard locations. Every section has
//! defaults, so a partial file (or none at all) is valid.

use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{info, warn};

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct FeedbackConfig {
    /// Speak confirmations and error messages.
    pub spoken: bool,
    /// Show desktop notifications for alerts.
    pub notifications: bool,
}

impl Default for FeedbackConfig {
    fn default() -> Self {
        Self {
            spoken: true,
            notifications: true,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SpeechConfig {
    /// Preferred voice name. Falls back to `default_locale`, then the first voice.
    pub voice: Option<String>,
    pub default_locale: String,
    pub rate: f32,
    pub volume: f32,
}

impl Default for SpeechConfig {
    fn default() -> Self {
        Self {
            voice: None,
            default_locale: "en-GB".into(),
            rate: 1.0,
            volume: 1.0,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RecognitionConfig {
    pub locale: String,
    pub restart_delay_ms: u64,
    pub resume_after_speech_ms: u64,
    pub no_speech_retry_ms: u64,
    pub voice_catalog_timeout_ms: u64,
    pub activation_phrases: Vec<String>,
}

impl Default for RecognitionConfig {
    fn default() -> Self {
        Self {
            locale: "en-US".into(),
            restart_delay_ms: 300,
            resume_after_speech_ms: 300,
            no_speech_retry_ms: 1000,
            voice_catalog_timeout_ms: 1500,
            activation_phrases: vec![
                "enable voice".into(),
                "enable commands".into(),
                "wake up".into(),
                "start listening".into(),
            ],
        }
    }
}

impl RecognitionConfig {
    pub fn restart_delay(&self) -> Duration {
        Duration::from_millis(self.restart_delay_ms)
    }

    pub fn resume_after_speech(&self) -> Duration {
        Duration::from_millis(self.resume_after_speech_ms)
    }

    pub fn no_speech_retry(&self) -> Duration {
        Duration::from_millis(self.no_speech_retry_ms)
    }

    pub fn voice_catalog_timeout(&self) -> Duration {
        Duration::from_millis(self.voice_catalog_timeout_ms)
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ReadingConfig {
    pub max_chunk_chars: usize,
}

impl Default for ReadingConfig {
    fn default() -> Self {
        Self {
            max_chunk_chars: 500,
        }
    }
}

/// A named navigation destination and the extra phrases that reach it.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct RouteConfig {
    pub name: String,
    pub path: String,
    #[serde(default)]
    pub aliases: Vec<String>,
}

impl RouteConfig {
    fn new(name: &str, path: &str, aliases: &[&str]) -> Self {
        Self {
            name: name.into(),
            path: path.into(),
            aliases: aliases.iter().map(|a| (*a).into()).collect(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct NavigationConfig {
    pub routes: Vec<RouteConfig>,
}

impl Default for NavigationConfig {
    fn default() -> Self {
        Self {
            routes: vec![
                RouteConfig::new("dashboard", "/dashboard", &["my dashboard"]),
                RouteConfig::new("courses", "/courses", &["my courses", "course list"]),
                RouteConfig::new("assignments", "/assignments", &["homework"]),
                RouteConfig::new("grades", "/grades", &["my grades", "results"]),
                RouteConfig::new("calendar", "/calendar", &["schedule"]),
                RouteConfig::new("messages", "/messages", &["inbox"]),
                RouteConfig::new("profile", "/profile", &["my profile", "account"]),
                RouteConfig::new("settings", "/settings", &["preferences"]),
                RouteConfig::new("chat", "/chat", &["ai assistant", "tutor"]),
                RouteConfig::new("home", "/", &["home page", "start page"]),
            ],
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct HotkeyConfig {
    pub combo: Vec<String>,
    pub alt_combos: Vec<Vec<String>>,
}

impl Default for HotkeyConfig {
    fn default() -> Self {
        Self {
            combo: vec!["KEY_LEFTALT".into(), "KEY_V".into()],
            alt_combos: vec![],
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    pub feedback: FeedbackConfig,
    pub speech: SpeechConfig,
    pub recognition: RecognitionConfig,
    pub reading: ReadingConfig,
    pub navigation: NavigationConfig,
    pub hotkey: HotkeyConfig,
}

impl Config {
    /// Load the first config file found, or defaults.
    ///
    /// An explicit `path` is used as is. Otherwise [`search_paths`](Self::search_paths)
    /// is tried in order. A file that cannot be read or parsed is reported
    /// and replaced by defaults, so a typo never keeps the service from starting.
    pub fn load(path: Option<&Path>) -> Self {
        let found = match path {
            Some(path) => Some(path.to_path_buf()),
            None => Self::search_paths().into_iter().find(|p| p.is_file()),
        };
        let Some(path) = found else {
            info!("No config file found, using defaults");
            return Self::default();
        };

        Self::from_file(&path).unwrap_or_else(|e| {
            warn!("Ignoring {}: {e}, using defaults", path.display());
            Self::default()
        })
    }

    /// `./voice-nav.yaml`, then the user config dir, then `/etc`.
    pub fn search_paths() -> Vec<PathBuf> {
        let mut paths = Vec::with_capacity(3);
        if let Ok(cwd) = std::env::current_dir() {
            paths.push(cwd.join("voice-nav.yaml"));
        }
        if let Some(dir) = dirs::config_dir() {
            paths.push(dir.join("voice-nav").join("config.yaml"));
        }
        paths.push(PathBuf::from("/etc/voice-nav/config.yaml"));
        paths
    }

    pub fn from_file(path: &Path) -> crate::Result<Self> {
        let config = Self::from_yaml(&std::fs::read_to_string(path)?)?;
        info!(
            "Loaded config from {} ({} route(s))",
            path.display(),
            config.navigation.routes.len()
        );
        Ok(config)
    }

    pub fn from_yaml(contents: &str) -> crate::Result<Self> {
        serde_yml::from_str(contents).map_err(|e| crate::NavError::Config(e.to_string()))
    }
}
