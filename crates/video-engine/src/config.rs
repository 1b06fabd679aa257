use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{EngineError, Result};
use crate::strategy::{StrategyKind, StrategyStep};
use crate::time::{DEFAULT_FRAME_TIME_MICROS, DEFAULT_TARGET_SIZE_PX};

/// One entry of the extraction chain as written in configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct StrategyConfig {
    pub kind: StrategyKind,
    pub timeout_ms: u64,
}

/// Engine tuning. Every field has a default, so `{}` is a valid config.
///
/// # Example
/// ```
/// use video_engine::EngineConfig;
///
/// let config = EngineConfig::from_json_str(r#"{ "decode_workers": 4 }"#).expect("valid");
/// assert_eq!(config.decode_workers, 4);
/// assert_eq!(config.strategies.len(), 4);
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct EngineConfig {
    /// Parent of the scratch directory; the system temp dir when unset.
    pub scratch_root: Option<PathBuf>,
    pub scratch_dir_name: String,
    pub decode_workers: usize,
    pub strategies: Vec<StrategyConfig>,
    pub default_frame_time_micros: i64,
    pub default_target_size_px: u32,
    pub purge_scratch_on_dispose: bool,
    pub request_queue_capacity: usize,
    /// How long dispose waits for in-flight decode attempts.
    pub shutdown_grace_ms: u64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            scratch_root: None,
            scratch_dir_name: "video_native".to_string(),
            decode_workers: 2,
            strategies: vec![
                StrategyConfig {
                    kind: StrategyKind::PlatformThumbnail,
                    timeout_ms: 1_200,
                },
                StrategyConfig {
                    kind: StrategyKind::ThumbnailUtility,
                    timeout_ms: 1_200,
                },
                StrategyConfig {
                    kind: StrategyKind::FrameAtTime,
                    timeout_ms: 1_200,
                },
                StrategyConfig {
                    kind: StrategyKind::DecodePipeline,
                    timeout_ms: 4_000,
                },
            ],
            default_frame_time_micros: DEFAULT_FRAME_TIME_MICROS,
            default_target_size_px: DEFAULT_TARGET_SIZE_PX,
            purge_scratch_on_dispose: false,
            request_queue_capacity: 32,
            shutdown_grace_ms: 2_000,
        }
    }
}

impl EngineConfig {
    pub fn from_json_str(raw: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(raw)
            .map_err(|err| EngineError::invalid("config", err.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Reads and validates a JSON config file.
    pub fn load(path: &Path) -> Result<Self> {
        let raw = fs::read_to_string(path)
            .map_err(|source| EngineError::io("failed to read config", path, source))?;
        Self::from_json_str(&raw)
    }

    pub fn validate(&self) -> Result<()> {
        if self.decode_workers == 0 {
            return Err(EngineError::invalid("decode_workers", "must be at least 1"));
        }
        if self.strategies.is_empty() {
            return Err(EngineError::invalid("strategies", "must not be empty"));
        }
        if let Some(step) = self.strategies.iter().find(|step| step.timeout_ms == 0) {
            return Err(EngineError::invalid(
                "strategies",
                format!("{} has a zero timeout", step.kind.as_str()),
            ));
        }
        if self.scratch_dir_name.trim().is_empty() {
            return Err(EngineError::invalid("scratch_dir_name", "must not be empty"));
        }
        if self.default_frame_time_micros <= 0 || self.default_target_size_px == 0 {
            return Err(EngineError::invalid("defaults", "must be positive"));
        }
        if self.request_queue_capacity == 0 {
            return Err(EngineError::invalid("request_queue_capacity", "must be at least 1"));
        }
        Ok(())
    }

    pub fn scratch_dir(&self) -> PathBuf {
        self.scratch_root
            .clone()
            .unwrap_or_else(std::env::temp_dir)
            .join(&self.scratch_dir_name)
    }

    pub fn strategy_steps(&self) -> Vec<StrategyStep> {
        self.strategies
            .iter()
            .map(|step| StrategyStep {
                kind: step.kind,
                timeout: Duration::from_millis(step.timeout_ms),
            })
            .collect()
    }

    pub fn shutdown_grace(&self) -> Duration {
        Duration::from_millis(self.shutdown_grace_ms)
    }
}

#[cfg(test)]
mod tests {
    use std::path::PathBuf;
    use std::time::Duration;

    use super::EngineConfig;
    use crate::strategy::StrategyKind;

    #[test]
    fn defaults_follow_documented_chain() {
        let config = EngineConfig::default();
        let steps = config.strategy_steps();

        assert_eq!(
            steps.iter().map(|step| step.kind).collect::<Vec<_>>(),
            StrategyKind::ALL
        );
        assert_eq!(steps[3].timeout, Duration::from_secs(4));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn strategies_can_be_reordered_from_json() {
        let config = EngineConfig::from_json_str(
            r#"{
                "scratch_root": "/var/cache/app",
                "strategies": [
                    { "kind": "decode_pipeline", "timeout_ms": 500 },
                    { "kind": "frame_at_time", "timeout_ms": 250 }
                ]
            }"#,
        )
        .expect("valid config");

        assert_eq!(config.scratch_dir(), PathBuf::from("/var/cache/app/video_native"));
        assert_eq!(config.strategies[0].kind, StrategyKind::DecodePipeline);
        assert_eq!(config.decode_workers, 2);
    }

    #[test]
    fn invalid_configs_are_rejected() {
        assert!(EngineConfig::from_json_str(r#"{ "decode_workers": 0 }"#).is_err());
        assert!(EngineConfig::from_json_str(r#"{ "strategies": [] }"#).is_err());
        assert!(
            EngineConfig::from_json_str(
                r#"{ "strategies": [{ "kind": "frame_at_time", "timeout_ms": 0 }] }"#
            )
            .is_err()
        );
        assert!(EngineConfig::from_json_str(r#"{ "workers": 3 }"#).is_err());
    }
}
