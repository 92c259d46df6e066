use std::time::Duration;

use time::OffsetDateTime;

/// Wall-clock schedule the game engine ticks on.
///
/// Ticks are aligned to multiples of `timestep` since the unix epoch rather than measured from the
/// end of the previous tick, so the time spent updating the market never accumulates into drift.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Cadence {
    timestep: Duration,
}

impl Cadence {
    pub fn new(timestep: Duration) -> Self {
        Self { timestep }
    }

    pub fn from_secs(secs: u64) -> Self {
        Self::new(Duration::from_secs(secs))
    }

    pub fn timestep(&self) -> Duration {
        self.timestep
    }

    /// Time left from `now` until the next boundary. A `now` exactly on a boundary waits a full
    /// timestep.
    pub fn until_next(&self, now: OffsetDateTime) -> Duration {
        let step = self.timestep.as_nanos() as i128;
        if step == 0 {
            return Duration::ZERO;
        }
        let elapsed = now.unix_timestamp_nanos().rem_euclid(step);
        Duration::from_nanos((step - elapsed) as u64)
    }

    pub fn next_boundary(&self, now: OffsetDateTime) -> OffsetDateTime {
        now + self.until_next(now)
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use time::macros::datetime;

    use super::Cadence;

    #[test]
    fn test_that_wait_lands_on_the_next_boundary() {
        let cadence = Cadence::from_secs(5);
        let now = datetime!(2024-01-01 12:00:03.250 UTC);
        assert_eq!(cadence.until_next(now), Duration::from_millis(1750));
        assert_eq!(
            cadence.next_boundary(now),
            datetime!(2024-01-01 12:00:05 UTC)
        );
    }

    #[test]
    fn test_that_boundary_waits_a_full_step() {
        let cadence = Cadence::from_secs(2);
        let now = datetime!(2024-01-01 12:00:04 UTC);
        assert_eq!(cadence.until_next(now), Duration::from_secs(2));
    }

    #[test]
    fn test_that_sub_second_steps_align() {
        let cadence = Cadence::new(Duration::from_millis(100));
        let now = datetime!(2024-01-01 12:00:00.030 UTC);
        assert_eq!(cadence.until_next(now), Duration::from_millis(70));
    }

    #[test]
    fn test_that_zero_step_never_waits() {
        let cadence = Cadence::new(Duration::ZERO);
        let now = datetime!(2024-01-01 12:00:00.030 UTC);
        assert_eq!(cadence.until_next(now), Duration::ZERO);
    }
}
