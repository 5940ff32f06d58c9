//! Exponential backoff with optional jitter.

use std::time::Duration;

use rand::Rng;

/// `min(initial × factor^attempt, max)`, computed in nanoseconds.
pub fn exponential_delay(attempt: u32, initial: Duration, factor: f64, max: Duration) -> Duration {
    let max_nanos = max.as_nanos() as f64;
    let exponent = attempt.min(i32::MAX as u32) as i32;
    let delay_nanos = initial.as_nanos() as f64 * factor.powi(exponent);

    if !delay_nanos.is_finite() || delay_nanos >= max_nanos {
        return max;
    }
    Duration::from_nanos(delay_nanos.max(0.0).round() as u64)
}

/// Add 0 to 10% random jitter to a delay.
pub fn with_jitter(delay: Duration) -> Duration {
    let jitter_range = delay.as_millis() as u64 / 10;
    let jitter = if jitter_range > 0 {
        rand::thread_rng().gen_range(0..jitter_range)
    } else {
        0
    };
    delay + Duration::from_millis(jitter)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_backoff_calculation() {
        let initial = Duration::from_millis(100);
        let max = Duration::from_millis(2000);

        assert_eq!(exponential_delay(0, initial, 2.0, max), Duration::from_millis(100));
        assert_eq!(exponential_delay(1, initial, 2.0, max), Duration::from_millis(200));
        assert_eq!(exponential_delay(3, initial, 2.0, max), Duration::from_millis(800));
        assert_eq!(exponential_delay(10, initial, 2.0, max), max);
        assert_eq!(exponential_delay(u32::MAX, initial, 2.0, max), max);
    }

    #[test]
    fn test_non_integer_factor() {
        let d = exponential_delay(2, Duration::from_millis(100), 1.5, Duration::from_secs(10));
        assert_eq!(d, Duration::from_millis(225));
    }

    #[test]
    fn test_jitter_bounds() {
        let base = Duration::from_millis(1000);
        for _ in 0..100 {
            let d = with_jitter(base);
            assert!(d >= base);
            assert!(d < base + Duration::from_millis(100));
        }
        assert_eq!(with_jitter(Duration::from_millis(5)), Duration::from_millis(5));
    }
}
