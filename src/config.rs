use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::path::{Path, PathBuf};

use crate::error::ConfigError;

/// Sender used by the local terminal harness when test mode is on
pub const DEFAULT_TEST_SENDER: &str = "foo_sender@zulip.com";

/// Connection settings for the OBS websocket server
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct MixerSettings {
    pub host: String,
    pub port: u16,

    /// Leave unset when OBS authentication is disabled
    #[serde(default)]
    pub password: Option<String>,

    /// How long to wait for a single mixer response
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
}

fn default_timeout_ms() -> u64 {
    5000
}

impl Default for MixerSettings {
    fn default() -> Self {
        Self {
            host: "localhost".to_string(),
            port: 4455,
            password: Some("secret".to_string()),
            timeout_ms: default_timeout_ms(),
        }
    }
}

impl MixerSettings {
    pub fn url(&self) -> String {
        format!("ws://{}:{}", self.host, self.port)
    }
}

/// Credentials for the Zulip bot account
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ZulipSettings {
    /// e.g. `https://example.zulipchat.com`
    pub site: String,
    pub email: String,
    pub api_key: String,
}

/// Local testing harness settings.
///
/// When enabled, messages from `sender` that carry no message id are accepted
/// even though the sender is not in the allow-list. Real chat messages always
/// carry an id, so only the terminal harness can use this.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct TestMode {
    #[serde(default)]
    pub enabled: bool,

    #[serde(default = "default_test_sender")]
    pub sender: String,
}

fn default_test_sender() -> String {
    DEFAULT_TEST_SENDER.to_string()
}

impl Default for TestMode {
    fn default() -> Self {
        Self {
            enabled: false,
            sender: default_test_sender(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub mixer: MixerSettings,

    /// Absent when only the terminal transport is used
    #[serde(default)]
    pub zulip: Option<ZulipSettings>,

    /// Sender emails allowed to command the bot
    pub authorized_senders: BTreeSet<String>,

    /// OBS audio sources muted/unmuted together by `mute` and `unmute`
    #[serde(default)]
    pub microphones: Vec<String>,

    /// Short name -> OBS scene name
    #[serde(default)]
    pub scenes: BTreeMap<String, String>,

    /// Short name -> OBS text sources kept in sync
    #[serde(default)]
    pub texts: BTreeMap<String, Vec<String>>,

    #[serde(default)]
    pub test_mode: TestMode,

    /// Reply with the observed state when a switch or text update does not verify
    #[serde(default)]
    pub report_partial_failures: bool,
}

impl Default for Config {
    fn default() -> Self {
        let scenes = [
            ("blank", "Empty"),
            ("title", "Title card"),
            ("gallery", "Gallery"),
            ("screen", "Desktop (remote)+camera"),
        ]
        .into_iter()
        .map(|(name, obs)| (name.to_string(), obs.to_string()))
        .collect();

        let mut texts = BTreeMap::new();
        texts.insert("front".to_string(), vec!["Timing text".to_string()]);

        Self {
            mixer: MixerSettings::default(),
            zulip: None,
            authorized_senders: BTreeSet::new(),
            microphones: vec!["A_Desktop Audio".to_string()],
            scenes,
            texts,
            test_mode: TestMode::default(),
            report_partial_failures: false,
        }
    }
}

impl Config {
    /// Load configuration from `path`, or from the platform config directory.
    /// Creates a default config file if none exists there.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let config_path = match path {
            Some(path) => path.to_path_buf(),
            None => Self::default_path()?,
        };

        if !config_path.exists() {
            let config = Config::default();
            config.save(&config_path)?;
            tracing::warn!(
                "Created default config at: {} (edit it before going live)",
                config_path.display()
            );
            return Ok(config);
        }

        let content = fs::read_to_string(&config_path).map_err(|e| ConfigError::LoadFailed {
            path: config_path.display().to_string(),
            source: Box::new(e),
        })?;
        let config = Self::from_json(&content).map_err(|e| match e {
            ConfigError::Parse(source) => ConfigError::LoadFailed {
                path: config_path.display().to_string(),
                source: Box::new(source),
            },
            other => other,
        })?;

        tracing::info!("Loaded config from: {}", config_path.display());
        Ok(config)
    }

    /// Parse and validate a JSON configuration document
    pub fn from_json(content: &str) -> Result<Self, ConfigError> {
        let mut config: Config = serde_json::from_str(content)?;
        config.normalize();
        config.validate()?;
        Ok(config)
    }

    /// Save configuration to disk
    pub fn save(&self, path: &Path) -> Result<(), ConfigError> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(|e| ConfigError::DirectoryCreationFailed {
                path: parent.display().to_string(),
                source: e,
            })?;
        }

        let json = serde_json::to_string_pretty(self).map_err(|e| ConfigError::SaveFailed {
            path: path.display().to_string(),
            source: Box::new(e),
        })?;
        fs::write(path, json).map_err(|e| ConfigError::SaveFailed {
            path: path.display().to_string(),
            source: Box::new(e),
        })?;

        Ok(())
    }

    /// `<config dir>/ObsChatRemote/config.json`
    pub fn default_path() -> Result<PathBuf, ConfigError> {
        dirs::config_dir()
            .map(|dir| dir.join("ObsChatRemote").join("config.json"))
            .ok_or(ConfigError::NoConfigDirectory)
    }

    /// Drop duplicate microphones, keeping the first occurrence
    fn normalize(&mut self) {
        let mut seen = BTreeSet::new();
        self.microphones.retain(|mic| seen.insert(mic.clone()));
    }

    /// Check the invariants the command table relies on
    pub fn validate(&self) -> Result<(), ConfigError> {
        for name in self.scenes.keys().chain(self.texts.keys()) {
            if name.is_empty() || name.chars().any(char::is_whitespace) {
                return Err(ConfigError::Invalid(format!(
                    "command name '{}' must be a single non-empty word",
                    name
                )));
            }
        }

        for (name, remote) in &self.scenes {
            if remote.trim().is_empty() {
                return Err(ConfigError::Invalid(format!(
                    "scene '{}' maps to an empty OBS scene name",
                    name
                )));
            }
        }

        for (name, sources) in &self.texts {
            if sources.is_empty() {
                return Err(ConfigError::Invalid(format!(
                    "text item '{}' has no OBS text sources",
                    name
                )));
            }
        }

        if self.microphones.iter().any(|mic| mic.trim().is_empty()) {
            return Err(ConfigError::Invalid(
                "microphone source names must not be empty".to_string(),
            ));
        }

        if self.authorized_senders.is_empty() && !self.test_mode.enabled {
            tracing::warn!("No authorized senders configured; every message will be ignored");
        }

        Ok(())
    }

    pub fn is_authorized_sender(&self, sender: &str) -> bool {
        self.authorized_senders.contains(sender)
    }

    /// Every OBS input the bot touches: microphones first, then text sources
    pub fn remote_sources(&self) -> Vec<&str> {
        let mut sources: Vec<&str> = self.microphones.iter().map(String::as_str).collect();
        for text_sources in self.texts.values() {
            for source in text_sources {
                if !sources.contains(&source.as_str()) {
                    sources.push(source);
                }
            }
        }
        sources
    }
}
