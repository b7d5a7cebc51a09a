use std::env;

use serde::{Deserialize, Serialize};

use crate::error::{FlowqError, Result};

/// Engine-wide knobs shared by planning and execution.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Target rows per record batch produced by scans.
    pub batch_size_rows: usize,
    /// Number of parallel tasks a consuming relation is split into.
    pub task_parallelism: usize,
    /// Compile `STORE` statements together and run them on `execute_batch`.
    pub batch_mode: bool,
    /// Upper bound on the in-memory size of one broadcast scalar row.
    pub max_scalar_row_bytes: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            batch_size_rows: 8192,
            task_parallelism: 4,
            batch_mode: false,
            max_scalar_row_bytes: 1024 * 1024,
        }
    }
}

impl EngineConfig {
    /// Build a config from `FLOWQ_*` environment variables, falling back to defaults.
    ///
    /// Recognised keys: `FLOWQ_BATCH_SIZE_ROWS`, `FLOWQ_TASK_PARALLELISM`,
    /// `FLOWQ_BATCH_MODE`, `FLOWQ_MAX_SCALAR_ROW_BYTES`.
    pub fn from_env() -> Result<Self> {
        let defaults = Self::default();
        let cfg = Self {
            batch_size_rows: env_usize_or_default("FLOWQ_BATCH_SIZE_ROWS", defaults.batch_size_rows)?,
            task_parallelism: env_usize_or_default(
                "FLOWQ_TASK_PARALLELISM",
                defaults.task_parallelism,
            )?,
            batch_mode: env_bool_or_default("FLOWQ_BATCH_MODE", defaults.batch_mode)?,
            max_scalar_row_bytes: env_usize_or_default(
                "FLOWQ_MAX_SCALAR_ROW_BYTES",
                defaults.max_scalar_row_bytes,
            )?,
        };
        cfg.validate()?;
        Ok(cfg)
    }

    /// Reject values the runtime cannot work with.
    pub fn validate(&self) -> Result<()> {
        if self.batch_size_rows == 0 {
            return Err(FlowqError::InvalidConfig(
                "batch_size_rows must be > 0".to_string(),
            ));
        }
        if self.task_parallelism == 0 {
            return Err(FlowqError::InvalidConfig(
                "task_parallelism must be > 0".to_string(),
            ));
        }
        if self.max_scalar_row_bytes == 0 {
            return Err(FlowqError::InvalidConfig(
                "max_scalar_row_bytes must be > 0".to_string(),
            ));
        }
        Ok(())
    }
}

fn env_usize_or_default(key: &str, default: usize) -> Result<usize> {
    match env::var(key) {
        Ok(v) => v
            .trim()
            .parse::<usize>()
            .map_err(|e| FlowqError::InvalidConfig(format!("{key}={v:?}: {e}"))),
        Err(_) => Ok(default),
    }
}

fn env_bool_or_default(key: &str, default: bool) -> Result<bool> {
    match env::var(key) {
        Ok(v) => match v.trim().to_ascii_lowercase().as_str() {
            "1" | "true" | "on" | "yes" => Ok(true),
            "0" | "false" | "off" | "no" => Ok(false),
            other => Err(FlowqError::InvalidConfig(format!(
                "{key}: expected boolean, got {other:?}"
            ))),
        },
        Err(_) => Ok(default),
    }
}

#[cfg(test)]
mod tests {
    use super::EngineConfig;

    #[test]
    fn default_config_is_valid() {
        EngineConfig::default().validate().expect("valid defaults");
    }

    #[test]
    fn zero_parallelism_rejected() {
        let cfg = EngineConfig {
            task_parallelism: 0,
            ..EngineConfig::default()
        };
        let err = cfg.validate().expect_err("must reject");
        assert!(err.to_string().contains("task_parallelism"), "err={err}");
    }
}
