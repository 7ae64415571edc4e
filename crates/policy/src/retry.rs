use std::time::Duration;

use {pagemine_config::RetryConfig, serde::Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct RetryDecision {
    pub delay: Duration,
    pub should_retry: bool,
}

/// Backoff for a failed `attempt` (1-based; 0 is treated as 1):
/// `min(base * 2^(attempt-1), max_backoff)`.
pub fn decide(cfg: &RetryConfig, attempt: u32) -> RetryDecision {
    let attempt = attempt.max(1);
    let exp = (attempt - 1).min(32);
    let delay_ms = cfg
        .base_delay_ms
        .saturating_mul(1u64 << exp)
        .min(cfg.max_backoff_ms);
    RetryDecision {
        delay: Duration::from_millis(delay_ms),
        should_retry: attempt < cfg.max_attempts,
    }
}
