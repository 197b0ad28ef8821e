//! Operation results persisted to `mcp-results.json` (§6).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Rolling result log capped at this many most-recent entries (§6).
pub const MAX_RETAINED_RESULTS: usize = 100;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OperationResult {
    pub operation_id: String,
    pub success: bool,
    pub message: String,
    #[serde(default)]
    pub data: Option<Value>,
    pub timestamp: DateTime<Utc>,
    pub processing_time_ms: u64,
    pub retryable: bool,
}

/// Append `result` to the log, trimming to [`MAX_RETAINED_RESULTS`] from the
/// tail (oldest dropped first).
pub fn append_result(log: &mut Vec<OperationResult>, result: OperationResult) {
    log.push(result);
    if log.len() > MAX_RETAINED_RESULTS {
        let overflow = log.len() - MAX_RETAINED_RESULTS;
        log.drain(0..overflow);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample(id: &str) -> OperationResult {
        OperationResult {
            operation_id: id.to_string(),
            success: true,
            message: "ok".to_string(),
            data: None,
            timestamp: Utc::now(),
            processing_time_ms: 1,
            retryable: false,
        }
    }

    #[test]
    fn append_result_trims_to_cap() {
        let mut log = Vec::new();
        for i in 0..(MAX_RETAINED_RESULTS + 10) {
            append_result(&mut log, sample(&format!("op-{i}")));
        }
        assert_eq!(log.len(), MAX_RETAINED_RESULTS);
        assert_eq!(log.first().unwrap().operation_id, "op-10");
        assert_eq!(log.last().unwrap().operation_id, format!("op-{}", MAX_RETAINED_RESULTS + 9));
    }
}
