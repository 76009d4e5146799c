//! Delay sequences for the retry policy.

use std::time::Duration;
use rand::Rng;

/// Calculate exponential backoff delay with jitter.
///
/// `attempt` is 1-based; attempt 0 yields no delay.
pub fn calculate_backoff(attempt: u32, base_ms: u64, max_ms: u64) -> Duration {
    if attempt == 0 {
        return Duration::from_millis(0);
    }

    let exponential_base = 2u64.saturating_pow(attempt - 1);
    let delay_ms = base_ms.saturating_mul(exponential_base);
    let capped_delay = delay_ms.min(max_ms);

    // Apply jitter (0 to 10% of the delay)
    let jitter_range = capped_delay / 10;
    let jitter = if jitter_range > 0 {
        rand::thread_rng().gen_range(0..jitter_range)
    } else {
        0
    };

    Duration::from_millis(capped_delay + jitter)
}

/// One jittered exponential delay per retry.
pub fn exponential_delays(retries: u32, base: Duration, max: Duration) -> Vec<Duration> {
    let base_ms = base.as_millis() as u64;
    let max_ms = max.as_millis() as u64;
    (1..=retries)
        .map(|attempt| calculate_backoff(attempt, base_ms, max_ms))
        .collect()
}

/// The same delay before every retry.
pub fn constant_delays(retries: u32, delay: Duration) -> Vec<Duration> {
    vec![delay; retries as usize]
}

/// Delays given in milliseconds, as written in configuration files.
pub fn delays_from_millis(millis: &[u64]) -> Vec<Duration> {
    millis.iter().copied().map(Duration::from_millis).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_backoff_calculation() {
        let b1 = calculate_backoff(1, 100, 2000);
        assert!(b1.as_millis() >= 100);

        let b2 = calculate_backoff(2, 100, 2000);
        assert!(b2.as_millis() >= 200);

        let max = calculate_backoff(10, 100, 1000);
        assert!(max.as_millis() >= 1000);
        assert!(max.as_millis() < 1100);

        assert_eq!(calculate_backoff(0, 100, 1000), Duration::ZERO);
    }

    #[test]
    fn test_exponential_delays_grow_and_cap() {
        let delays = exponential_delays(4, Duration::from_millis(100), Duration::from_millis(500));
        assert_eq!(delays.len(), 4);
        assert!(delays[0] >= Duration::from_millis(100) && delays[0] < Duration::from_millis(110));
        assert!(delays[1] >= Duration::from_millis(200));
        assert!(delays[3] >= Duration::from_millis(500) && delays[3] < Duration::from_millis(550));
    }

    #[test]
    fn test_fixed_sequences() {
        assert_eq!(
            constant_delays(2, Duration::from_secs(1)),
            vec![Duration::from_secs(1); 2]
        );
        assert_eq!(
            delays_from_millis(&[1000, 2000, 3000]),
            vec![
                Duration::from_secs(1),
                Duration::from_secs(2),
                Duration::from_secs(3)
            ]
        );
        assert!(constant_delays(0, Duration::from_secs(1)).is_empty());
    }
}
