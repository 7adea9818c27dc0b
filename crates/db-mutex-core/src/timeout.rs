//! Timeout value helpers.

use std::time::Duration;

/// A non-negative wait bound for an acquire attempt.
///
/// Zero means "try once, do not wait". Backends differ in the resolution they
/// accept, so conversions round up: a positive wait never collapses into a
/// non-blocking attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct TimeoutValue {
    duration: Duration,
}

impl TimeoutValue {
    pub const ZERO: Self = Self {
        duration: Duration::ZERO,
    };

    pub const fn from_secs(secs: u64) -> Self {
        Self {
            duration: Duration::from_secs(secs),
        }
    }

    pub fn is_zero(&self) -> bool {
        self.duration.is_zero()
    }

    pub fn as_duration(&self) -> Duration {
        self.duration
    }

    /// Whole seconds, rounded up.
    pub fn as_whole_seconds(&self) -> u64 {
        let secs = self.duration.as_secs();
        if self.duration.subsec_nanos() > 0 {
            secs.saturating_add(1)
        } else {
            secs
        }
    }

    /// Whole milliseconds, rounded up.
    pub fn as_whole_millis(&self) -> u64 {
        let millis = self.duration.as_millis();
        let rounded = if self.duration.subsec_nanos() % 1_000_000 > 0 {
            millis + 1
        } else {
            millis
        };
        u64::try_from(rounded).unwrap_or(u64::MAX)
    }
}

impl From<Duration> for TimeoutValue {
    fn from(duration: Duration) -> Self {
        Self { duration }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_zero_is_non_blocking() {
        assert!(TimeoutValue::ZERO.is_zero());
        assert!(TimeoutValue::from(Duration::ZERO).is_zero());
        assert!(!TimeoutValue::from_secs(1).is_zero());
    }

    #[test]
    fn test_seconds_round_up() {
        assert_eq!(TimeoutValue::ZERO.as_whole_seconds(), 0);
        assert_eq!(TimeoutValue::from_secs(3).as_whole_seconds(), 3);
        assert_eq!(
            TimeoutValue::from(Duration::from_millis(1)).as_whole_seconds(),
            1
        );
        assert_eq!(
            TimeoutValue::from(Duration::from_millis(2500)).as_whole_seconds(),
            3
        );
    }

    #[test]
    fn test_millis_round_up() {
        assert_eq!(
            TimeoutValue::from(Duration::from_micros(1)).as_whole_millis(),
            1
        );
        assert_eq!(
            TimeoutValue::from(Duration::from_millis(250)).as_whole_millis(),
            250
        );
        assert_eq!(TimeoutValue::from_secs(2).as_whole_millis(), 2000);
    }
}
