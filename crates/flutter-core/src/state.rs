//! Per-run mutable context threaded into every generator and producer call.

use std::time::{Duration, SystemTime, UNIX_EPOCH};

use chrono::{DateTime, Utc};
use rand::SeedableRng;
use rand::rngs::StdRng;

/// Clock, cursor and random source for one run.
///
/// Exactly one exists per run. The random generator is not shared; callers
/// borrow the whole state mutably for each draw.
#[derive(Debug, Clone)]
pub struct RunState {
    /// Offset of the current tick from run start
    pub tick: Duration,
    /// `start + tick`
    pub wallclock: DateTime<Utc>,
    /// Total run duration
    pub duration: Duration,
    /// Index of the next action to dispatch
    pub current_action: usize,
    /// Seeded random source
    pub rng: StdRng,
    start: DateTime<Utc>,
}

impl RunState {
    pub fn new(duration: Duration, seed: u64, start: DateTime<Utc>) -> Self {
        Self {
            tick: Duration::ZERO,
            wallclock: start,
            duration,
            current_action: 0,
            rng: make_rng(seed),
            start,
        }
    }

    /// Move the clock to `tick` seconds after start.
    pub fn advance_to(&mut self, tick: Duration) {
        self.tick = tick;
        self.wallclock = self.start + chrono::Duration::from_std(tick).unwrap_or(chrono::Duration::zero());
    }

    pub fn start(&self) -> DateTime<Utc> {
        self.start
    }

    /// Fraction of the run completed, in percent.
    pub fn progress(&self) -> f64 {
        if self.duration.is_zero() {
            return 100.0;
        }
        self.tick.as_secs_f64() / self.duration.as_secs_f64() * 100.0
    }
}

/// Build the run's random source. A zero seed draws one from the clock.
pub fn make_rng(seed: u64) -> StdRng {
    let seed = if seed == 0 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_nanos() as u64)
            .unwrap_or(1)
    } else {
        seed
    };
    StdRng::seed_from_u64(seed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use rand::Rng;

    #[test]
    fn test_advance_moves_wallclock() {
        let start = Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 0).unwrap();
        let mut rs = RunState::new(Duration::from_secs(60), 7, start);
        rs.advance_to(Duration::from_secs(30));

        assert_eq!(rs.wallclock, start + chrono::Duration::seconds(30));
        assert!((rs.progress() - 50.0).abs() < 1e-9);
    }

    #[test]
    fn test_same_seed_same_sequence() {
        let mut a = make_rng(42);
        let mut b = make_rng(42);
        for _ in 0..100 {
            assert_eq!(a.random::<u64>(), b.random::<u64>());
        }
    }
}
