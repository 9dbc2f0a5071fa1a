use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::state::{Difficulty, DEFAULT_MAX_LIVES};

const DEFAULT_MISMATCH_DELAY_MS: u32 = 2000;
const DEFAULT_CHALLENGE_DELAY_MS: u32 = 1500;
const DEFAULT_VICTORY_DELAY_MS: u32 = 2000;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Error)]
#[serde(tag = "type")]
pub enum ConfigError {
    #[error("invalid config json: {message}")]
    InvalidJson { message: String },
    #[error("invalid value for `{field}`: {reason}")]
    InvalidValue { field: String, reason: String },
}

/// 会话配置。JSON 中缺省的字段取默认值。
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct SessionConfig {
    pub max_lives: u8,
    /// 配错后两张牌保持翻开的时长。
    pub mismatch_delay_ms: u32,
    /// 最后一对配上到弹出挑战的间隔。
    pub challenge_delay_ms: u32,
    /// 答对后到自动开始下一局的间隔。
    pub victory_delay_ms: u32,
    pub default_difficulty: Difficulty,
    /// 固定种子时牌面可复现。
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rng_seed: Option<u64>,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            max_lives: DEFAULT_MAX_LIVES,
            mismatch_delay_ms: DEFAULT_MISMATCH_DELAY_MS,
            challenge_delay_ms: DEFAULT_CHALLENGE_DELAY_MS,
            victory_delay_ms: DEFAULT_VICTORY_DELAY_MS,
            default_difficulty: Difficulty::default(),
            rng_seed: None,
        }
    }
}

impl SessionConfig {
    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        let config: SessionConfig =
            serde_json::from_str(json).map_err(|error| ConfigError::InvalidJson {
                message: error.to_string(),
            })?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_lives == 0 {
            return Err(ConfigError::InvalidValue {
                field: "max_lives".into(),
                reason: "must be at least 1".into(),
            });
        }
        Ok(())
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.rng_seed = Some(seed);
        self
    }

    pub fn with_max_lives(mut self, max_lives: u8) -> Self {
        self.max_lives = max_lives;
        self
    }

    pub fn with_difficulty(mut self, difficulty: Difficulty) -> Self {
        self.default_difficulty = difficulty;
        self
    }

    pub fn with_delays(mut self, mismatch_ms: u32, challenge_ms: u32, victory_ms: u32) -> Self {
        self.mismatch_delay_ms = mismatch_ms;
        self.challenge_delay_ms = challenge_ms;
        self.victory_delay_ms = victory_ms;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn missing_fields_fall_back_to_defaults() {
        let config = SessionConfig::from_json(r#"{ "max_lives": 3, "default_difficulty": "hard" }"#)
            .expect("config should parse");
        assert_eq!(
            config,
            SessionConfig::default()
                .with_max_lives(3)
                .with_difficulty(Difficulty::Hard)
        );
    }

    #[test]
    fn zero_lives_is_rejected() {
        let error = SessionConfig::from_json(r#"{ "max_lives": 0 }"#).unwrap_err();
        assert!(matches!(error, ConfigError::InvalidValue { ref field, .. } if field == "max_lives"));
    }

    #[test]
    fn broken_json_is_reported() {
        let error = SessionConfig::from_json("{ max_lives").unwrap_err();
        assert!(matches!(error, ConfigError::InvalidJson { .. }));
    }
}
