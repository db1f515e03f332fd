//! Wall-clock source for snapshot labels.

use chrono::{Local, NaiveDateTime};

/// Supplies the current local time.
pub trait Clock {
    /// Returns the current local time.
    fn now(&self) -> NaiveDateTime;
}

/// Reads the host clock.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> NaiveDateTime {
        Local::now().naive_local()
    }
}

impl<F: Fn() -> NaiveDateTime> Clock for F {
    fn now(&self) -> NaiveDateTime {
        self()
    }
}
