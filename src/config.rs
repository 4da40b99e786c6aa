//! Configuration management for the moodcast client

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

const EMAIL_ENV: &str = "MOODCAST_EMAIL";
const PASSWORD_ENV: &str = "MOODCAST_PASSWORD";

/// Main configuration structure
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Feed server location
    #[serde(default)]
    pub server: ServerConfig,

    /// Account used to log in
    #[serde(default)]
    pub account: AccountConfig,

    /// Live capture configuration
    #[serde(default)]
    pub capture: CaptureConfig,

    /// Upload configuration
    #[serde(default)]
    pub upload: UploadConfig,

    /// Path to config file (not serialized)
    #[serde(skip)]
    config_path: Option<PathBuf>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Base URL of the feed server, e.g. `http://127.0.0.1:5000`
    #[serde(default = "default_base_url")]
    pub base_url: String,

    /// Static path under which uploaded media is served
    #[serde(default = "default_media_path")]
    pub media_path: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AccountConfig {
    /// Login email. The password is only ever read from the environment.
    pub email: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CaptureConfig {
    /// Interval at which the encoder emits fragments (ms)
    #[serde(default = "default_timeslice_ms")]
    pub timeslice_ms: u64,

    /// Container formats to try, most preferred first
    #[serde(default = "default_preferred_formats")]
    pub preferred_formats: Vec<String>,

    /// How long to wait for the encoder to flush after a stop request (ms)
    #[serde(default = "default_finalize_timeout_ms")]
    pub finalize_timeout_ms: u64,

    /// Recordings are stopped automatically after this many seconds (0 = no limit)
    #[serde(default = "default_max_recording_secs")]
    pub max_recording_secs: u64,

    /// Media file the replay device plays back as its live feed
    pub replay_source: Option<PathBuf>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UploadConfig {
    /// Prefix for generated filenames of recorded artifacts
    #[serde(default = "default_filename_prefix")]
    pub filename_prefix: String,
}

// Default value functions
fn default_base_url() -> String {
    "http://127.0.0.1:5000".to_string()
}

fn default_media_path() -> String {
    "/static/uploads".to_string()
}

fn default_timeslice_ms() -> u64 {
    1000
}

fn default_preferred_formats() -> Vec<String> {
    vec!["video/webm".to_string(), "video/mp4".to_string()]
}

fn default_finalize_timeout_ms() -> u64 {
    3000
}

fn default_max_recording_secs() -> u64 {
    120
}

fn default_filename_prefix() -> String {
    "live_rec".to_string()
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            media_path: default_media_path(),
        }
    }
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            timeslice_ms: default_timeslice_ms(),
            preferred_formats: default_preferred_formats(),
            finalize_timeout_ms: default_finalize_timeout_ms(),
            max_recording_secs: default_max_recording_secs(),
            replay_source: None,
        }
    }
}

impl Default for UploadConfig {
    fn default() -> Self {
        Self {
            filename_prefix: default_filename_prefix(),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            server: ServerConfig::default(),
            account: AccountConfig::default(),
            capture: CaptureConfig::default(),
            upload: UploadConfig::default(),
            config_path: None,
        }
    }
}

impl CaptureConfig {
    pub fn timeslice(&self) -> Duration {
        Duration::from_millis(self.timeslice_ms.max(1))
    }

    pub fn finalize_timeout(&self) -> Duration {
        Duration::from_millis(self.finalize_timeout_ms)
    }

    /// Maximum recording length, `None` when unlimited
    pub fn max_recording(&self) -> Option<Duration> {
        (self.max_recording_secs > 0).then(|| Duration::from_secs(self.max_recording_secs))
    }
}

impl Config {
    /// Load configuration from default location or create default
    pub fn load() -> Result<Self> {
        let config_path = Self::default_config_path()?;
        Self::load_from(&config_path)
    }

    /// Load configuration from an explicit path, writing defaults if it does not exist
    pub fn load_from(config_path: &Path) -> Result<Self> {
        if config_path.exists() {
            let contents = std::fs::read_to_string(config_path)
                .with_context(|| format!("Failed to read config file: {:?}", config_path))?;

            let mut config: Config = toml::from_str(&contents)
                .with_context(|| format!("Failed to parse config file: {:?}", config_path))?;

            config.config_path = Some(config_path.to_path_buf());
            Ok(config)
        } else {
            let config = Config {
                config_path: Some(config_path.to_path_buf()),
                ..Config::default()
            };
            config.save()?;
            Ok(config)
        }
    }

    /// Save configuration to file
    pub fn save(&self) -> Result<()> {
        let config_path = self.config_path()?;

        // Ensure parent directory exists
        if let Some(parent) = config_path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create config directory: {:?}", parent))?;
        }

        let contents = toml::to_string_pretty(self).context("Failed to serialize config")?;

        std::fs::write(&config_path, contents)
            .with_context(|| format!("Failed to write config file: {:?}", config_path))?;

        Ok(())
    }

    /// Get the config file path
    pub fn config_path(&self) -> Result<PathBuf> {
        match &self.config_path {
            Some(path) => Ok(path.clone()),
            None => Self::default_config_path(),
        }
    }

    /// Get default config path
    fn default_config_path() -> Result<PathBuf> {
        let proj_dirs = directories::ProjectDirs::from("dev", "moodcast", "client")
            .context("Failed to determine config directory")?;

        Ok(proj_dirs.config_dir().join("config.toml"))
    }

    /// Login email, environment first
    pub fn email(&self) -> Option<String> {
        std::env::var(EMAIL_ENV)
            .ok()
            .filter(|e| !e.is_empty())
            .or_else(|| self.account.email.clone())
    }

    /// Login password from the environment
    pub fn password(&self) -> Option<String> {
        std::env::var(PASSWORD_ENV).ok().filter(|p| !p.is_empty())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert_eq!(config.capture.timeslice(), Duration::from_secs(1));
        assert_eq!(config.capture.preferred_formats[0], "video/webm");
        assert_eq!(config.capture.max_recording(), Some(Duration::from_secs(120)));
        assert_eq!(config.upload.filename_prefix, "live_rec");
    }

    #[test]
    fn test_zero_max_recording_is_unlimited() {
        let mut capture = CaptureConfig::default();
        capture.max_recording_secs = 0;
        assert_eq!(capture.max_recording(), None);
    }

    #[test]
    fn test_load_creates_default_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("config.toml");

        let config = Config::load_from(&path).unwrap();
        assert!(path.exists());
        assert_eq!(config.config_path().unwrap(), path);
        assert_eq!(config.server.base_url, "http://127.0.0.1:5000");
    }

    #[test]
    fn test_partial_file_fills_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(
            &path,
            "[server]\nbase_url = \"http://feed.local:8080\"\n\n[capture]\ntimeslice_ms = 250\n",
        )
        .unwrap();

        let config = Config::load_from(&path).unwrap();
        assert_eq!(config.server.base_url, "http://feed.local:8080");
        assert_eq!(config.server.media_path, "/static/uploads");
        assert_eq!(config.capture.timeslice(), Duration::from_millis(250));
        assert_eq!(config.capture.finalize_timeout_ms, 3000);
    }
}
