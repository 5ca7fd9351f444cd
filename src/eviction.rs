//! Staleness tracking for pooled handles.
//!
//! Both checks run lazily at acquire time; nothing here is driven by a
//! background timer.

use std::time::Instant;

use crate::config::PoolConfig;

/// A handle tagged with the timestamps the staleness checks read.
///
/// `opened_at` is set exactly once, when the opener returned success;
/// `idle_at` is restamped on every return to the idle buffer.
#[derive(Debug)]
pub(crate) struct Entry<T> {
    pub handle: T,
    pub id: u64,
    pub opened_at: Instant,
    pub idle_at: Instant,
}

impl<T> Entry<T> {
    pub fn new(handle: T, id: u64) -> Self {
        let now = Instant::now();
        Self {
            handle,
            id,
            opened_at: now,
            idle_at: now,
        }
    }

    /// Restamp `idle_at`; called on each enqueue into the idle buffer.
    pub fn touch(&mut self) {
        self.idle_at = Instant::now();
    }

    pub fn exceeds_max_idle_time(&self, config: &PoolConfig) -> bool {
        match config.max_idle_time {
            Some(limit) => self.idle_at.elapsed() > limit,
            None => false,
        }
    }

    pub fn exceeds_max_life_time(&self, config: &PoolConfig) -> bool {
        match config.max_life_time {
            Some(limit) => self.opened_at.elapsed() > limit,
            None => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread::sleep;
    use std::time::Duration;

    #[test]
    fn test_disabled_checks_never_fire() {
        let config = PoolConfig::new()
            .with_max_idle_time(Duration::ZERO)
            .with_max_life_time(Duration::ZERO);
        let entry = Entry::new((), 0);
        sleep(Duration::from_millis(5));
        assert!(!entry.exceeds_max_idle_time(&config));
        assert!(!entry.exceeds_max_life_time(&config));
    }

    #[test]
    fn test_idle_check_reads_idle_at() {
        let config = PoolConfig::new()
            .with_max_idle_time(Duration::from_millis(10))
            .with_max_life_time(Duration::ZERO);
        let mut entry = Entry::new((), 0);
        sleep(Duration::from_millis(20));
        assert!(entry.exceeds_max_idle_time(&config));

        // A fresh return resets the idle clock but not the life clock.
        entry.touch();
        assert!(!entry.exceeds_max_idle_time(&config));
    }

    #[test]
    fn test_life_check_reads_opened_at() {
        let config = PoolConfig::new()
            .with_max_idle_time(Duration::ZERO)
            .with_max_life_time(Duration::from_millis(10));
        let mut entry = Entry::new((), 0);
        sleep(Duration::from_millis(20));
        entry.touch();
        assert!(entry.exceeds_max_life_time(&config));
    }
}
