use chrono::{DateTime, FixedOffset, Local, NaiveTime, TimeDelta, Utc};
use domains::ports::Clock;

/// The host's local wall clock.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<FixedOffset> {
        Local::now().fixed_offset()
    }
}

/// `[start, end)` of the local calendar day containing `now`, in UTC.
pub fn local_day_bounds(now: &DateTime<FixedOffset>) -> (DateTime<Utc>, DateTime<Utc>) {
    let since_midnight = now.time() - NaiveTime::MIN;
    let start = (*now - since_midnight).with_timezone(&Utc);
    (start, start + TimeDelta::days(1))
}
