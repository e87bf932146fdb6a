//! Exponential backoff with jitter for notification delivery (spec §4.5:
//! "initial 5s, factor 2, max 5 attempts, jitter ±20%").

use crate::config::RetryConfig;
use rand::Rng;
use std::time::Duration;

/// Delay before attempt number `attempt` (1-indexed: the delay *before*
/// the first retry, i.e. before attempt 2). `attempt` is clamped to
/// `max_attempts`.
pub fn backoff_delay(attempt: u32, cfg: &RetryConfig) -> Duration {
    let exponent = attempt.saturating_sub(1).min(cfg.max_attempts.saturating_sub(1));
    let base_secs = cfg.initial.as_secs_f64() * cfg.factor.powi(exponent as i32);

    let jitter_span = base_secs * cfg.jitter;
    let jittered = rand::thread_rng().gen_range(-jitter_span..=jitter_span);

    Duration::from_secs_f64((base_secs + jittered).max(0.0))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cfg() -> RetryConfig {
        RetryConfig { initial: Duration::from_secs(5), factor: 2.0, max_attempts: 5, jitter: 0.2 }
    }

    #[test]
    fn first_attempt_is_near_initial() {
        let d = backoff_delay(1, &cfg());
        assert!(d.as_secs_f64() >= 4.0 && d.as_secs_f64() <= 6.0);
    }

    #[test]
    fn delay_grows_with_attempt_number() {
        let d2 = backoff_delay(2, &cfg());
        let d4 = backoff_delay(4, &cfg());
        assert!(d4.as_secs_f64() > d2.as_secs_f64());
    }

    #[test]
    fn delay_clamps_past_max_attempts() {
        let d5 = backoff_delay(5, &cfg());
        let d50 = backoff_delay(50, &cfg());
        // Both clamp to the same exponent, so they land in the same jittered
        // band even though the nominal attempt numbers differ wildly.
        assert!((d5.as_secs_f64() - d50.as_secs_f64()).abs() < d5.as_secs_f64() * 2.0 * cfg().jitter + 1.0);
    }
}
