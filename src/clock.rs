//! Time port and adapters.
//!
//! Every expiry comparison goes through [`Clock`] so tests can pin time.

use chrono::{DateTime, SubsecRound, Utc};

/// Port for getting the current time.
pub trait Clock: Send + Sync {
    /// Get the current instant, truncated to whole seconds.
    fn now(&self) -> DateTime<Utc>;
}

/// System clock using the OS time.
#[derive(Debug, Clone, Copy)]
pub struct SystemClock;

impl SystemClock {
    pub fn new() -> Self {
        Self
    }
}

impl Default for SystemClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        // JWT numeric dates carry seconds only.
        Utc::now().trunc_subsecs(0)
    }
}

#[cfg(test)]
pub use fixed::FixedClock;


#[cfg(test)]
mod tests {
    use chrono::TimeDelta;

    use super::*;

    #[test]
    fn test_system_clock_has_no_subseconds() {
        assert_eq!(SystemClock::new().now().timestamp_subsec_nanos(), 0);
    }

    #[test]
    fn test_fixed_clock_advance() {
        let clock = FixedClock::new(1_700_000_000);
        clock.advance(TimeDelta::minutes(15));
        assert_eq!(clock.now().timestamp(), 1_700_000_900);
    }
}
