//! Time provider abstraction for testable time-dependent logic
//!
//! Retired protocol generations are reaped after a grace period and the pump
//! thread runs maintenance on an interval. Both read the clock through
//! [`TimeProvider`] so tests can move time forward without sleeping.

#[cfg(test)]
use std::sync::{Arc, Mutex};
#[cfg(test)]
use std::time::Duration;
use std::time::{Instant, SystemTime};

/// Abstraction over system time
pub trait TimeProvider: Send + Sync {
    /// Monotonic time, for measuring ages and intervals
    fn now(&self) -> Instant;

    /// Wall-clock time, for log-friendly timestamps
    fn system_time(&self) -> SystemTime;
}

/// Production time provider using actual system time
#[derive(Debug, Default, Clone)]
pub struct SystemTimeProvider;

impl TimeProvider for SystemTimeProvider {
    fn now(&self) -> Instant {
        Instant::now()
    }

    fn system_time(&self) -> SystemTime {
        SystemTime::now()
    }
}

/// Mock time provider for deterministic testing
#[derive(Clone)]
#[cfg(test)]
pub struct MockTimeProvider {
    current_instant: Arc<Mutex<Instant>>,
    current_system_time: Arc<Mutex<SystemTime>>,
}

#[cfg(test)]
impl MockTimeProvider {
    pub fn new() -> Self {
        Self {
            current_instant: Arc::new(Mutex::new(Instant::now())),
            current_system_time: Arc::new(Mutex::new(SystemTime::now())),
        }
    }

    /// Advance both monotonic and system time by the given duration
    pub fn advance_time(&self, duration: Duration) {
        *self.current_instant.lock().unwrap() += duration;
        *self.current_system_time.lock().unwrap() += duration;
    }
}

#[cfg(test)]
impl TimeProvider for MockTimeProvider {
    fn now(&self) -> Instant {
        *self.current_instant.lock().unwrap()
    }

    fn system_time(&self) -> SystemTime {
        *self.current_system_time.lock().unwrap()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_system_time_provider() {
        let provider = SystemTimeProvider;

        let instant1 = provider.now();
        std::thread::sleep(Duration::from_millis(1));
        let instant2 = provider.now();

        assert!(instant2 > instant1);
    }

    #[test]
    fn test_mock_time_provider_only_moves_when_advanced() {
        let provider = MockTimeProvider::new();

        let initial_instant = provider.now();
        let initial_system = provider.system_time();
        assert_eq!(provider.now(), initial_instant);

        provider.advance_time(Duration::from_secs(10));

        assert_eq!(
            provider.now().duration_since(initial_instant),
            Duration::from_secs(10)
        );
        assert_eq!(
            provider
                .system_time()
                .duration_since(initial_system)
                .unwrap(),
            Duration::from_secs(10)
        );
    }
}
