use serde::{Deserialize, Serialize};

use crate::common::types::AnyResult;
use crate::configs::*;

#[derive(Debug, Deserialize, Serialize, Clone, Default)]
pub struct Config {
  #[serde(default)]
  pub io: IoConfig,
  #[serde(default)]
  pub codec: CodecConfig,
  pub logging: Option<LoggingConfig>,
}

impl Config {
  pub fn load() -> AnyResult<Self> {
    let config_path = if std::path::Path::new("config.toml").exists() {
      "config.toml"
    } else if std::path::Path::new("config.default.toml").exists() {
      "config.default.toml"
    } else {
      return Err("config.toml or config.default.toml not found".into());
    };

    let config_str = std::fs::read_to_string(config_path)?;
    if config_str.is_empty() {
      return Err(format!("{} is empty", config_path).into());
    }

    Self::from_toml_str(&config_str)
  }

  pub fn from_toml_str(source: &str) -> AnyResult<Self> {
    let config: Config = toml::from_str(source)?;
    config.validate()?;
    Ok(config)
  }

  pub fn validate(&self) -> AnyResult<()> {
    if self.io.max_sessions == 0 {
      return Err("io.max_sessions must be at least 1".into());
    }
    if self.io.max_sessions > i32::MAX as usize {
      return Err("io.max_sessions does not fit a session handle".into());
    }
    if self.io.buffer_size == 0 || self.io.buffer_size > i32::MAX as usize {
      return Err("io.buffer_size must be between 1 and i32::MAX".into());
    }
    if self.codec.default_audio_frame_size == 0 {
      return Err("codec.default_audio_frame_size must be at least 1".into());
    }
    Ok(())
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn empty_document_uses_defaults() {
    let config = Config::from_toml_str("").unwrap();
    assert_eq!(config.io, IoConfig::default());
    assert_eq!(config.io.max_sessions, 128);
    assert_eq!(config.io.buffer_size, 32_768);
    assert!(config.logging.is_none());
  }

  #[test]
  fn partial_sections_keep_other_defaults() {
    let config = Config::from_toml_str(
      r#"
        [io]
        buffer_size = 4096

        [codec]
        stall_limit = 2

        [logging]
        level = "debug"
        file = { path = "logs/bridge.log" }
      "#,
    )
    .unwrap();

    assert_eq!(config.io.buffer_size, 4096);
    assert_eq!(config.io.max_sessions, 128);
    assert_eq!(config.codec.stall_limit, 2);
    assert_eq!(config.codec.read_retry_limit, 64);
    let file = config.logging.and_then(|l| l.file).unwrap();
    assert_eq!(file.max_lines, 10_000);
  }

  #[test]
  fn rejects_zero_capacity() {
    assert!(Config::from_toml_str("[io]\nmax_sessions = 0").is_err());
  }

  #[test]
  fn shipped_default_file_matches_defaults() {
    let config = Config::from_toml_str(include_str!("../../config.default.toml")).unwrap();
    assert_eq!(config.io, IoConfig::default());
    assert_eq!(config.codec, CodecConfig::default());
  }
}
