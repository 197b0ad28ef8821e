//! Tunable processor knobs, loaded from an optional `.specforge/config.toml`.
//! Every field has a hard-coded default so the file is never required.

use std::collections::HashMap;

use camino::Utf8Path;
use serde::Deserialize;

use crate::error::ConfigError;

const DEFAULT_IDEMPOTENCY_WINDOW_SECS: u64 = 60;
const DEFAULT_CREATE_SPEC_IDEMPOTENCY_WINDOW_SECS: u64 = 300;
const DEFAULT_BATCH_CAPACITY: usize = 50;
const DEFAULT_CONCURRENCY: usize = 4;
const DEFAULT_RETRY_BASE_MS: u64 = 500;
const DEFAULT_RETRY_MAX_MS: u64 = 8_000;
const DEFAULT_MAX_RETRIES: u32 = 3;
const DEFAULT_OPTIMIZER_INTERVAL_SECS: u64 = 300;
const DEFAULT_CACHE_CAPACITY: usize = 512;
const DEFAULT_STALE_OPERATION_HOURS: i64 = 24;

/// Raw, partially-specified TOML shape. Every field is optional; absent
/// fields fall back to [`TuningConfig::default`].
#[derive(Debug, Default, Deserialize)]
struct RawTuningConfig {
    #[serde(default)]
    idempotency_window_secs: HashMap<String, u64>,
    batch_capacity: Option<usize>,
    concurrency: Option<usize>,
    retry_base_ms: Option<u64>,
    retry_max_ms: Option<u64>,
    max_retries: Option<u32>,
    optimizer_interval_secs: Option<u64>,
    cache_capacity: Option<usize>,
    stale_operation_hours: Option<i64>,
}

#[derive(Debug, Clone)]
pub struct TuningConfig {
    idempotency_window_secs: HashMap<String, u64>,
    default_idempotency_window_secs: u64,
    pub batch_capacity: usize,
    pub concurrency: usize,
    pub retry_base_ms: u64,
    pub retry_max_ms: u64,
    pub max_retries: u32,
    pub optimizer_interval_secs: u64,
    pub cache_capacity: usize,
    pub stale_operation_hours: i64,
}

impl Default for TuningConfig {
    fn default() -> Self {
        let mut idempotency_window_secs = HashMap::new();
        idempotency_window_secs.insert(
            "create_spec".to_string(),
            DEFAULT_CREATE_SPEC_IDEMPOTENCY_WINDOW_SECS,
        );
        Self {
            idempotency_window_secs,
            default_idempotency_window_secs: DEFAULT_IDEMPOTENCY_WINDOW_SECS,
            batch_capacity: DEFAULT_BATCH_CAPACITY,
            concurrency: DEFAULT_CONCURRENCY,
            retry_base_ms: DEFAULT_RETRY_BASE_MS,
            retry_max_ms: DEFAULT_RETRY_MAX_MS,
            max_retries: DEFAULT_MAX_RETRIES,
            optimizer_interval_secs: DEFAULT_OPTIMIZER_INTERVAL_SECS,
            cache_capacity: DEFAULT_CACHE_CAPACITY,
            stale_operation_hours: DEFAULT_STALE_OPERATION_HOURS,
        }
    }
}

impl TuningConfig {
    /// Idempotency window for a given operation type, falling back to the
    /// default window when the type has no override.
    #[must_use]
    pub fn idempotency_window_secs(&self, operation_type: &str) -> u64 {
        self.idempotency_window_secs
            .get(operation_type)
            .copied()
            .unwrap_or(self.default_idempotency_window_secs)
    }

    /// Load tuning knobs from `path` if it exists, layering overrides onto
    /// the defaults. Returns defaults unchanged when `path` is absent.
    pub fn load(path: Option<&Utf8Path>) -> Result<Self, ConfigError> {
        let mut config = Self::default();
        let Some(path) = path else {
            return Ok(config);
        };

        let raw_text = std::fs::read_to_string(path.as_std_path()).map_err(|source| ConfigError::Read {
            path: path.to_string(),
            source,
        })?;
        let raw: RawTuningConfig = toml::from_str(&raw_text).map_err(|source| ConfigError::Parse {
            path: path.to_string(),
            source,
        })?;

        for (op_type, window) in raw.idempotency_window_secs {
            config.idempotency_window_secs.insert(op_type, window);
        }
        if let Some(v) = raw.batch_capacity {
            config.batch_capacity = v;
        }
        if let Some(v) = raw.concurrency {
            config.concurrency = v;
        }
        if let Some(v) = raw.retry_base_ms {
            config.retry_base_ms = v;
        }
        if let Some(v) = raw.retry_max_ms {
            config.retry_max_ms = v;
        }
        if let Some(v) = raw.max_retries {
            config.max_retries = v;
        }
        if let Some(v) = raw.optimizer_interval_secs {
            config.optimizer_interval_secs = v;
        }
        if let Some(v) = raw.cache_capacity {
            config.cache_capacity = v;
        }
        if let Some(v) = raw.stale_operation_hours {
            config.stale_operation_hours = v;
        }

        Ok(config)
    }
}
