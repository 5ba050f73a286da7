use std::sync::Mutex;
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Timestamp {
    pub physical: u64,  // Milliseconds since epoch
    pub logical: u64,   // Tie-breaker within one millisecond
}

impl Timestamp {
    pub fn now() -> Self {
        HLC.now()
    }

    pub fn from_millis(millis: u64) -> Self {
        Timestamp {
            physical: millis,
            logical: 0,
        }
    }

    /// Wall-clock view for display. Falls back to the epoch for values chrono
    /// cannot represent.
    pub fn to_datetime(&self) -> DateTime<Utc> {
        DateTime::<Utc>::from_timestamp_millis(self.physical as i64).unwrap_or_default()
    }

    pub fn saturating_elapsed_since(&self, earlier: Timestamp) -> Duration {
        Duration::from_millis(self.physical.saturating_sub(earlier.physical))
    }
}

impl std::fmt::Display for Timestamp {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.to_datetime().format("%Y-%m-%d %H:%M:%S"))
    }
}

pub fn wall_clock_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}

/// Hybrid logical clock: never hands out the same timestamp twice and never
/// goes backwards, even if the wall clock does.
pub struct HybridLogicalClock {
    last: Mutex<Timestamp>,
}

impl HybridLogicalClock {
    pub fn new() -> Self {
        HybridLogicalClock {
            last: Mutex::new(Timestamp::from_millis(0)),
        }
    }

    pub fn now(&self) -> Timestamp {
        let wall_clock = wall_clock_ms();

        // A poisoned lock still holds the last issued value
        let mut last = self.last.lock().unwrap_or_else(|poisoned| poisoned.into_inner());

        let next = if wall_clock > last.physical {
            Timestamp::from_millis(wall_clock)
        } else {
            Timestamp {
                physical: last.physical,
                logical: last.logical + 1,
            }
        };

        *last = next;
        next
    }
}

impl Default for HybridLogicalClock {
    fn default() -> Self {
        Self::new()
    }
}

lazy_static::lazy_static! {
    static ref HLC: HybridLogicalClock = HybridLogicalClock::new();
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn test_clock_is_strictly_monotonic_across_threads() {
        let clock = Arc::new(HybridLogicalClock::new());

        let handles: Vec<_> = (0..4)
            .map(|_| {
                let clock = clock.clone();
                std::thread::spawn(move || (0..500).map(|_| clock.now()).collect::<Vec<_>>())
            })
            .collect();

        let mut all: Vec<Timestamp> = handles
            .into_iter()
            .flat_map(|h| h.join().unwrap())
            .collect();
        let total = all.len();
        all.sort();
        all.dedup();

        assert_eq!(all.len(), total);
    }

    #[test]
    fn test_elapsed_saturates() {
        let early = Timestamp::from_millis(1_000);
        let late = Timestamp::from_millis(3_500);

        assert_eq!(late.saturating_elapsed_since(early), Duration::from_millis(2_500));
        assert_eq!(early.saturating_elapsed_since(late), Duration::ZERO);
    }
}
