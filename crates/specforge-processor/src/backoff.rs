//! Exponential backoff with jitter for retried operations (spec §4.I step 8, §9).

use chrono::Duration;

pub const DEFAULT_BASE_MS: u64 = 500;
pub const DEFAULT_CAP_MS: u64 = 30_000;

/// `base * 2^(retry_count-1) + jitter`, `jitter ∈ [0, base/2]`, capped at `cap_ms`.
///
/// `retry_count` is the count *after* incrementing for this failure, so the
/// first retry (`retry_count == 1`) backs off by `base` plus jitter.
#[must_use]
pub fn compute_backoff(retry_count: u32, base_ms: u64, cap_ms: u64, jitter_fraction: f64) -> Duration {
    if retry_count == 0 {
        return Duration::zero();
    }
    let exponent = retry_count - 1;
    let raw = base_ms.saturating_mul(1u64.checked_shl(exponent).unwrap_or(u64::MAX).max(1));
    let capped = raw.min(cap_ms);
    let jitter = (capped as f64 * jitter_fraction * 0.5).round() as u64;
    Duration::milliseconds((capped + jitter).min(cap_ms) as i64)
}

/// Deterministic jitter fraction derived from the operation id, so retries
/// across clients sharing a directory don't all land on the same tick
/// (§9: "small uniform jitter prevents synchronized retry storms").
#[must_use]
pub fn jitter_fraction_for(operation_id: &str) -> f64 {
    let mut hash: u32 = 2166136261;
    for byte in operation_id.as_bytes() {
        hash ^= u32::from(*byte);
        hash = hash.wrapping_mul(16777619);
    }
    f64::from(hash % 1000) / 1000.0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_retry_backs_off_by_base_plus_jitter() {
        let d = compute_backoff(1, DEFAULT_BASE_MS, DEFAULT_CAP_MS, 0.0);
        assert_eq!(d.num_milliseconds(), 500);
    }

    #[test]
    fn backoff_doubles_per_retry() {
        let d1 = compute_backoff(1, DEFAULT_BASE_MS, DEFAULT_CAP_MS, 0.0);
        let d2 = compute_backoff(2, DEFAULT_BASE_MS, DEFAULT_CAP_MS, 0.0);
        let d3 = compute_backoff(3, DEFAULT_BASE_MS, DEFAULT_CAP_MS, 0.0);
        assert_eq!(d2.num_milliseconds(), 1000);
        assert_eq!(d3.num_milliseconds(), 2000);
        assert!(d1 < d2 && d2 < d3);
    }

    #[test]
    fn backoff_is_capped() {
        let d = compute_backoff(10, DEFAULT_BASE_MS, DEFAULT_CAP_MS, 0.0);
        assert!(d.num_milliseconds() as u64 <= DEFAULT_CAP_MS);
    }

    #[test]
    fn jitter_fraction_is_stable_and_bounded() {
        let a = jitter_fraction_for("op-1");
        let b = jitter_fraction_for("op-1");
        assert_eq!(a, b);
        assert!((0.0..1.0).contains(&a));
    }
}
