use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};

pub const USEC_PER_SEC: u32 = 1_000_000;

/// Wall-clock instant with microsecond resolution.
///
/// Used for archive file start times: the whole second drives the filename,
/// the fraction is kept for the "accurate" layout and for computing how far
/// into a period capture started. All period arithmetic on this type is
/// integer-exact so that boundaries never accumulate drift.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Timestamp {
    pub sec: i64,
    pub usec: u32,
}

impl Timestamp {
    pub fn new(sec: i64, usec: u32) -> Self {
        debug_assert!(usec < USEC_PER_SEC);
        Self { sec, usec }
    }

    /// Current wall-clock time.
    pub fn now() -> Self {
        let elapsed = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default();
        Self {
            sec: elapsed.as_secs() as i64,
            usec: elapsed.subsec_micros(),
        }
    }

    /// Start of the archive period containing this instant.
    pub fn period_start(&self, period_secs: u32) -> i64 {
        let period = i64::from(period_secs);
        self.sec - self.sec.rem_euclid(period)
    }

    /// Number of frames between `period_start` and this instant.
    ///
    /// Exact for the whole seconds; the sub-second part rounds down to a
    /// whole frame.
    pub fn frames_into_period(&self, period_start: i64, sample_rate: u32) -> u64 {
        let whole = (self.sec - period_start).max(0) as u64 * u64::from(sample_rate);
        let frac = u64::from(self.usec) * u64::from(sample_rate) / u64::from(USEC_PER_SEC);
        whole + frac
    }

    /// The instant `secs` whole seconds later, microseconds unchanged.
    pub fn plus_secs(&self, secs: u32) -> Self {
        Self {
            sec: self.sec + i64::from(secs),
            usec: self.usec,
        }
    }
}
