//! Injecting the real-time clock behind a trait lets tests advance time
//! deterministically instead of racing `SystemTime::now()`.

use crate::error::{Error, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Timestamp {
    pub sec: i64,
    pub nsec: u32,
}

impl Timestamp {
    pub const ZERO: Timestamp = Timestamp { sec: 0, nsec: 0 };
}

pub trait Clock {
    /// Returns the current time, or `Error::Fault` if the clock could not be
    /// read.
    fn now(&self) -> Result<Timestamp>;
}

/// The real-time clock, backed by `std::time::SystemTime`.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Result<Timestamp> {
        use std::time::{SystemTime, UNIX_EPOCH};
        let dur = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map_err(|_| Error::Fault)?;
        Ok(Timestamp {
            sec: dur.as_secs() as i64,
            nsec: dur.subsec_nanos(),
        })
    }
}

#[cfg(any(test, feature = "test-util"))]
pub mod test_support {
    use super::*;
    use std::cell::Cell;

    /// A deterministic clock for tests: starts at an arbitrary epoch and only
    /// advances when told to.
    pub struct FakeClock(Cell<Timestamp>);

    impl FakeClock {
        pub fn new(start: Timestamp) -> Self {
            Self(Cell::new(start))
        }

        pub fn advance(&self, secs: i64) {
            let mut t = self.0.get();
            t.sec += secs;
            self.0.set(t);
        }
    }

    impl Clock for FakeClock {
        fn now(&self) -> Result<Timestamp> {
            Ok(self.0.get())
        }
    }
}
