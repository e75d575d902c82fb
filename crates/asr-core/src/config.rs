//! Gateway configuration — environment-variable driven, validated at startup.

use serde::{Deserialize, Serialize};

use crate::error::{AsrError, Result};

/// Top-level gateway configuration, sourced entirely from environment
/// variables (see module docs in the crate root for the recognised set).
/// Invalid values are a startup error rather than a silent fallback.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub server_host: String,
    pub server_port: u16,
    pub log_level: String,

    pub model_path: String,
    pub gpu_memory_utilization: f32,
    pub max_new_tokens: u32,
    pub model_dtype: String,

    pub streaming_chunk_size_sec: f32,
    pub auto_commit_interval_sec: f32,

    pub vad_enabled: bool,
    pub vad_threshold: f32,
    pub vad_silence_duration_ms: u32,

    /// Seconds the server waits for in-flight connections to drain after a
    /// shutdown signal before forcing the process to exit.
    pub shutdown_budget_sec: f32,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            server_host: "0.0.0.0".into(),
            server_port: 8001,
            log_level: "info".into(),
            model_path: "Qwen/Qwen3-ASR-1.7B".into(),
            gpu_memory_utilization: 0.8,
            max_new_tokens: 64,
            model_dtype: "auto".into(),
            streaming_chunk_size_sec: 2.0,
            auto_commit_interval_sec: 60.0,
            vad_enabled: true,
            vad_threshold: 0.5,
            vad_silence_duration_ms: 400,
            shutdown_budget_sec: 10.0,
        }
    }
}

fn env_string(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}

fn env_parsed<T: std::str::FromStr>(key: &str, default: T) -> Result<T> {
    match std::env::var(key) {
        Ok(val) => val
            .parse()
            .map_err(|_| AsrError::Config(format!("{key}: invalid value {val:?}"))),
        Err(_) => Ok(default),
    }
}

impl Config {
    /// Load configuration from the process environment, falling back to
    /// spec defaults for anything unset. Returns an error rather than
    /// guessing if a set variable doesn't parse.
    pub fn from_env() -> Result<Self> {
        let defaults = Self::default();
        Ok(Self {
            server_host: env_string("SERVER_HOST", &defaults.server_host),
            server_port: env_parsed("SERVER_PORT", defaults.server_port)?,
            log_level: env_string("LOG_LEVEL", &defaults.log_level),
            model_path: env_string("QWEN3_ASR_MODEL_PATH", &defaults.model_path),
            gpu_memory_utilization: env_parsed(
                "GPU_MEMORY_UTILIZATION",
                defaults.gpu_memory_utilization,
            )?,
            max_new_tokens: env_parsed("MAX_NEW_TOKENS", defaults.max_new_tokens)?,
            model_dtype: env_string("MODEL_DTYPE", &defaults.model_dtype),
            streaming_chunk_size_sec: env_parsed(
                "STREAMING_CHUNK_SIZE_SEC",
                defaults.streaming_chunk_size_sec,
            )?,
            auto_commit_interval_sec: env_parsed(
                "AUTO_COMMIT_INTERVAL_SEC",
                defaults.auto_commit_interval_sec,
            )?,
            vad_enabled: env_parsed("VAD_ENABLED", defaults.vad_enabled)?,
            vad_threshold: env_parsed("VAD_THRESHOLD", defaults.vad_threshold)?,
            vad_silence_duration_ms: env_parsed(
                "VAD_SILENCE_DURATION_MS",
                defaults.vad_silence_duration_ms,
            )?,
            shutdown_budget_sec: env_parsed("SHUTDOWN_BUDGET_SEC", defaults.shutdown_budget_sec)?,
        })
    }

    /// Validate cross-field constraints not expressible as a single env parse.
    pub fn validate(&self) -> Vec<String> {
        let mut errors = Vec::new();
        if !(0.0..=1.0).contains(&self.vad_threshold) {
            errors.push(format!(
                "VAD_THRESHOLD must be in [0,1], got {}",
                self.vad_threshold
            ));
        }
        if self.streaming_chunk_size_sec <= 0.0 {
            errors.push("STREAMING_CHUNK_SIZE_SEC must be positive".to_string());
        }
        if self.auto_commit_interval_sec <= 0.0 {
            errors.push("AUTO_COMMIT_INTERVAL_SEC must be positive".to_string());
        }
        if self.shutdown_budget_sec <= 0.0 {
            errors.push("SHUTDOWN_BUDGET_SEC must be positive".to_string());
        }
        errors
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    #[test]
    fn defaults_match_spec() {
        let c = Config::default();
        assert_eq!(c.server_port, 8001);
        assert_eq!(c.streaming_chunk_size_sec, 2.0);
        assert_eq!(c.auto_commit_interval_sec, 60.0);
        assert_eq!(c.vad_silence_duration_ms, 400);
        assert!(c.validate().is_empty());
    }

    #[test]
    #[serial]
    fn from_env_overrides_defaults() {
        unsafe {
            std::env::set_var("SERVER_PORT", "9999");
            std::env::set_var("VAD_THRESHOLD", "0.3");
        }
        let c = Config::from_env().unwrap();
        assert_eq!(c.server_port, 9999);
        assert_eq!(c.vad_threshold, 0.3);
        unsafe {
            std::env::remove_var("SERVER_PORT");
            std::env::remove_var("VAD_THRESHOLD");
        }
    }

    #[test]
    #[serial]
    fn from_env_rejects_unparseable_value() {
        unsafe {
            std::env::set_var("SERVER_PORT", "not-a-port");
        }
        let result = Config::from_env();
        assert!(result.is_err());
        unsafe {
            std::env::remove_var("SERVER_PORT");
        }
    }

    #[test]
    fn validate_flags_out_of_range_threshold() {
        let c = Config {
            vad_threshold: 1.5,
            ..Config::default()
        };
        assert!(!c.validate().is_empty());
    }
}
