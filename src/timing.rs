//! Round clock: minute-aligned boundaries and round identifiers.
//!
//! The platform opens one round per minute. A round is named after the
//! minute it starts in, normalised to the marker second, so every caller
//! inside the same minute derives the same key.

use std::time::Duration as StdDuration;

use time::{Duration, OffsetDateTime};

use crate::error::TimingError;

/// Second within the minute that names a round.
pub const ROUND_MARKER_SECOND: u8 = 18;

/// Prefix of every round identifier.
pub const ROUND_PREFIX: &str = "ojoCap_";

/// Source of wall-clock time.
pub trait Clock: Send + Sync {
    /// Current wall-clock time.
    fn now(&self) -> OffsetDateTime;
}

/// Operating system clock.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> OffsetDateTime {
        OffsetDateTime::now_utc()
    }
}

/// Wall clock driven by tokio's timer.
///
/// Starts at `origin` and advances with `tokio::time::Instant`, so it follows
/// paused and auto-advanced time in tests.
#[derive(Debug, Clone, Copy)]
pub struct RuntimeClock {
    origin: OffsetDateTime,
    started: tokio::time::Instant,
}

impl RuntimeClock {
    /// Anchor the clock at `origin` as of now.
    pub fn starting_at(origin: OffsetDateTime) -> Self {
        Self {
            origin,
            started: tokio::time::Instant::now(),
        }
    }
}

impl Clock for RuntimeClock {
    fn now(&self) -> OffsetDateTime {
        let elapsed = self.started.elapsed();
        self.origin + elapsed
    }
}

fn check_offset(second_offset: u8) -> Result<(), TimingError> {
    if second_offset > 59 {
        return Err(TimingError::InvalidOffset(second_offset));
    }
    Ok(())
}

/// Truncate a timestamp to the start of its minute.
pub fn minute_floor(ts: OffsetDateTime) -> OffsetDateTime {
    ts - Duration::new(i64::from(ts.second()), ts.nanosecond() as i32)
}

/// Next instant strictly after `now` whose seconds equal `second_offset`.
///
/// Sub-second precision is zeroed. When `now` is already at or past the
/// offset within its minute, the boundary rolls into the following minute.
pub fn next_boundary(now: OffsetDateTime, second_offset: u8) -> Result<OffsetDateTime, TimingError> {
    check_offset(second_offset)?;

    let candidate = minute_floor(now) + Duration::seconds(i64::from(second_offset));
    if now.second() >= second_offset {
        Ok(candidate + Duration::MINUTE)
    } else {
        Ok(candidate)
    }
}

/// [`next_boundary`] against the system clock.
pub fn next_boundary_now(second_offset: u8) -> Result<OffsetDateTime, TimingError> {
    next_boundary(OffsetDateTime::now_utc(), second_offset)
}

/// Milliseconds since the epoch of the round active in `ts`'s minute.
pub fn round_epoch_millis(ts: OffsetDateTime) -> i64 {
    let marker = minute_floor(ts) + Duration::seconds(i64::from(ROUND_MARKER_SECOND));
    marker.unix_timestamp() * 1000
}

/// Stable round key, e.g. `ojoCap_1717243218000`.
pub fn round_id(ts: OffsetDateTime) -> String {
    format!("{}{}", ROUND_PREFIX, round_epoch_millis(ts))
}

/// When to look up results for a round that opened at `boundary`.
///
/// Lands on `second_offset` within the minute after the boundary's minute.
pub fn verification_time(
    boundary: OffsetDateTime,
    second_offset: u8,
) -> Result<OffsetDateTime, TimingError> {
    check_offset(second_offset)?;
    Ok(minute_floor(boundary) + Duration::MINUTE + Duration::seconds(i64::from(second_offset)))
}

/// Time left until `target`, zero if it has passed.
pub fn until(now: OffsetDateTime, target: OffsetDateTime) -> StdDuration {
    StdDuration::try_from(target - now).unwrap_or(StdDuration::ZERO)
}
