//! Configuration management

use crate::{DrillError, Result};
use ini::Ini;
use log::{debug, info};
use std::collections::HashMap;
use std::path::PathBuf;
use std::time::Duration;

/// Application configuration
///
/// Persists speech parameters and per-language voice preferences in an
/// INI file (~/.spelldrill.cfg). Session data lives in the JSON store,
/// not here.
pub struct Config {
    /// INI configuration storage
    ini: Ini,

    /// Config file path (~/.spelldrill.cfg)
    path: PathBuf,

    /// Voice preferences (2-letter language prefix -> voice id)
    voice_overrides: HashMap<String, String>,
}

impl Config {
    /// Load configuration from disk or create default
    pub fn load() -> Result<Self> {
        Self::load_from(Self::config_path())
    }

    /// Load from an explicit path; used by tests
    pub fn load_from(path: PathBuf) -> Result<Self> {
        debug!("Loading config from {:?}", path);

        let ini = if path.exists() {
            Ini::load_from_file(&path)
                .map_err(|e| DrillError::Config(format!("Failed to load config: {}", e)))?
        } else {
            info!("Config file not found, creating default");
            let default = Self::default_config();
            default
                .write_to_file(&path)
                .map_err(|e| DrillError::Config(format!("Failed to write config: {}", e)))?;
            default
        };

        let mut config = Self {
            ini,
            path,
            voice_overrides: HashMap::new(),
        };
        config.parse_voice_overrides();
        Ok(config)
    }

    /// Save configuration to disk
    pub fn save(&self) -> Result<()> {
        debug!("Saving config to {:?}", self.path);
        self.ini
            .write_to_file(&self.path)
            .map_err(|e| DrillError::Config(format!("Failed to save config: {}", e)))
    }

    /// Get config file path (~/.spelldrill.cfg)
    fn config_path() -> PathBuf {
        let home = std::env::var("HOME").unwrap_or_else(|_| ".".to_string());
        PathBuf::from(home).join(".spelldrill.cfg")
    }

    /// Expose the config file path for display
    pub fn path(&self) -> &PathBuf {
        &self.path
    }

    /// Create default configuration
    fn default_config() -> Ini {
        let mut ini = Ini::new();

        ini.with_section(Some("speech"))
            .set("rate", "0.8")
            .set("pitch", "1.0")
            .set("volume", "1.0")
            .set("start_delay_ms", "500");

        ini.with_section(Some("voices"));

        ini
    }

    /// Parse voice preferences from config
    fn parse_voice_overrides(&mut self) {
        if let Some(section) = self.ini.section(Some("voices")) {
            for (prefix, voice_id) in section.iter() {
                self.voice_overrides
                    .insert(prefix.to_lowercase(), voice_id.to_string());
            }
        }
        debug!("Loaded {} voice preferences", self.voice_overrides.len());
    }

    /// Get a boolean value from config
    pub fn get_bool(&self, section: &str, key: &str, default: bool) -> bool {
        self.ini
            .get_from(Some(section), key)
            .and_then(|v| v.parse().ok())
            .unwrap_or(default)
    }

    /// Get a string value from config
    pub fn get_string(&self, section: &str, key: &str, default: &str) -> String {
        self.ini
            .get_from(Some(section), key)
            .unwrap_or(default)
            .to_string()
    }

    /// Get a float value from config
    pub fn get_float(&self, section: &str, key: &str, default: f32) -> f32 {
        self.ini
            .get_from(Some(section), key)
            .and_then(|v| v.parse().ok())
            .unwrap_or(default)
    }

    /// Set a value in config
    pub fn set(&mut self, section: &str, key: &str, value: &str) {
        self.ini.with_section(Some(section)).set(key, value);
    }

    // Playback-specific configuration getters

    /// Speech rate multiplier, slowed down for spelling by default
    pub fn rate(&self) -> f32 {
        self.get_float("speech", "rate", 0.8)
    }

    /// Pitch multiplier
    pub fn pitch(&self) -> f32 {
        self.get_float("speech", "pitch", 1.0)
    }

    /// Volume fraction (0.0..=1.0)
    pub fn volume(&self) -> f32 {
        self.get_float("speech", "volume", 1.0).clamp(0.0, 1.0)
    }

    /// Delay before auto-play when entering test mode
    pub fn start_delay(&self) -> Duration {
        let ms = self
            .ini
            .get_from(Some("speech"), "start_delay_ms")
            .and_then(|v| v.parse().ok())
            .unwrap_or(500u64);
        Duration::from_millis(ms)
    }

    /// Preferred voice id for a language prefix, if set
    pub fn voice_override(&self, prefix: &str) -> Option<&str> {
        self.voice_overrides.get(prefix).map(String::as_str)
    }

    /// Record a voice preference; survives restarts once saved
    pub fn set_voice_override(&mut self, prefix: &str, voice_id: &str) {
        let prefix = prefix.to_lowercase();
        self.ini.with_section(Some("voices")).set(&prefix, voice_id);
        self.voice_overrides.insert(prefix, voice_id.to_string());
    }

    /// All voice preferences, for installing on the speech engine
    pub fn voice_overrides(&self) -> HashMap<String, String> {
        self.voice_overrides.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_created() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("spelldrill.cfg");
        let config = Config::load_from(path.clone()).unwrap();
        assert!(path.exists());
        assert!((config.rate() - 0.8).abs() < f32::EPSILON);
        assert!((config.volume() - 1.0).abs() < f32::EPSILON);
        assert_eq!(config.start_delay(), Duration::from_millis(500));
        assert!(config.voice_override("en").is_none());
    }

    #[test]
    fn test_start_delay_configurable() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("spelldrill.cfg");
        let mut config = Config::load_from(path).unwrap();
        config.set("speech", "start_delay_ms", "250");
        assert_eq!(config.start_delay(), Duration::from_millis(250));

        // Garbage falls back to the default
        config.set("speech", "start_delay_ms", "soon");
        assert_eq!(config.start_delay(), Duration::from_millis(500));
    }

    #[test]
    fn test_voice_override_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("spelldrill.cfg");

        {
            let mut config = Config::load_from(path.clone()).unwrap();
            config.set_voice_override("zh", "com.apple.voice.Tingting");
            config.save().unwrap();
        }

        let config = Config::load_from(path).unwrap();
        assert_eq!(
            config.voice_override("zh"),
            Some("com.apple.voice.Tingting")
        );
        assert_eq!(config.voice_overrides().len(), 1);
    }

    #[test]
    fn test_volume_clamped() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("spelldrill.cfg");
        let mut config = Config::load_from(path).unwrap();
        config.set("speech", "volume", "3.5");
        assert!((config.volume() - 1.0).abs() < f32::EPSILON);
    }
}
