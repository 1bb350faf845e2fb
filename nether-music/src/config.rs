//! Engine configuration (engine.toml)

use std::path::Path;

use serde::{Deserialize, Serialize};

/// Errors loading or validating an [`EngineConfig`]
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("invalid config: {0}")]
    Invalid(String),
}

/// Engine configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Feed ticks per second
    pub tick_rate: u32,
    /// Regular track slots
    pub max_tracks: usize,
    /// Fade clone slots
    pub max_fade_tracks: usize,
    /// Double the quota for streams whose output reports starvation
    pub catch_up_on_starvation: bool,
    /// Ticks between metrics log lines (0 = never)
    pub metrics_interval_ticks: u64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            tick_rate: 60,
            max_tracks: 8,
            max_fade_tracks: 4,
            catch_up_on_starvation: true,
            metrics_interval_ticks: 600, // 10s at 60 ticks/s
        }
    }
}

impl EngineConfig {
    /// Parse and validate a TOML document
    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Load and validate a TOML file
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml_str(&content)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.tick_rate == 0 {
            return Err(ConfigError::Invalid("tick_rate must be > 0".into()));
        }
        if self.max_tracks == 0 || self.max_tracks > u8::MAX as usize {
            return Err(ConfigError::Invalid(format!(
                "max_tracks must be in 1..=255 (got {})",
                self.max_tracks
            )));
        }
        if self.max_fade_tracks == 0 || self.max_fade_tracks > self.max_tracks {
            return Err(ConfigError::Invalid(format!(
                "max_fade_tracks must be in 1..={} (got {})",
                self.max_tracks, self.max_fade_tracks
            )));
        }
        Ok(())
    }

    /// Tick period
    pub fn tick_interval(&self) -> std::time::Duration {
        std::time::Duration::from_secs_f64(1.0 / self.tick_rate.max(1) as f64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_default_is_valid() {
        let config = EngineConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.tick_rate, 60);
        assert_eq!(config.max_tracks, 8);
        assert_eq!(config.max_fade_tracks, 4);
    }

    #[test]
    fn test_partial_toml_uses_defaults() {
        let config = EngineConfig::from_toml_str("tick_rate = 30\n").unwrap();
        assert_eq!(config.tick_rate, 30);
        assert_eq!(config.max_tracks, 8);
        assert!(config.catch_up_on_starvation);
    }

    #[test]
    fn test_invalid_values_rejected() {
        assert!(matches!(
            EngineConfig::from_toml_str("tick_rate = 0"),
            Err(ConfigError::Invalid(_))
        ));
        assert!(matches!(
            EngineConfig::from_toml_str("max_tracks = 2\nmax_fade_tracks = 3"),
            Err(ConfigError::Invalid(_))
        ));
        assert!(matches!(
            EngineConfig::from_toml_str("max_fade_tracks = 0"),
            Err(ConfigError::Invalid(_))
        ));
        assert!(matches!(
            EngineConfig::from_toml_str("tick_rate = \"fast\""),
            Err(ConfigError::Parse(_))
        ));
    }

    #[test]
    fn test_load_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "tick_rate = 50\nmax_fade_tracks = 2").unwrap();
        let config = EngineConfig::load(file.path()).unwrap();
        assert_eq!(config.tick_rate, 50);
        assert_eq!(config.max_fade_tracks, 2);
    }

    #[test]
    fn test_load_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        assert!(matches!(
            EngineConfig::load(dir.path().join("missing.toml")),
            Err(ConfigError::Io(_))
        ));
    }

    #[test]
    fn test_serialize_roundtrip() {
        let config = EngineConfig {
            tick_rate: 100,
            ..EngineConfig::default()
        };
        let text = toml::to_string(&config).unwrap();
        assert_eq!(EngineConfig::from_toml_str(&text).unwrap(), config);
    }
}
