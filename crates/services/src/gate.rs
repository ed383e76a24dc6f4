//! Quota/window admission check for automatic generation.

use chrono::{DateTime, TimeZone, Timelike};
use domains::models::GenerationType;

/// Stateless: every call re-evaluates the hour and the caller-supplied count.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QuotaGate {
    max_per_day: u32,
    /// Inclusive.
    window_start_hour: u32,
    /// Exclusive.
    window_end_hour: u32,
}

impl Default for QuotaGate {
    fn default() -> Self {
        Self::new(4, 9, 21)
    }
}

impl QuotaGate {
    pub fn new(max_per_day: u32, window_start_hour: u32, window_end_hour: u32) -> Self {
        Self {
            max_per_day,
            window_start_hour,
            window_end_hour,
        }
    }

    pub fn max_per_day(&self) -> u32 {
        self.max_per_day
    }

    /// Manual runs always pass. Auto runs pass inside the hour window while
    /// today's count is below the daily maximum.
    pub fn allow<Tz: TimeZone>(
        &self,
        kind: GenerationType,
        now: &DateTime<Tz>,
        count_today: u32,
    ) -> bool {
        match kind {
            GenerationType::Manual => true,
            GenerationType::Auto => {
                self.in_window(now.hour()) && count_today < self.max_per_day
            }
        }
    }

    fn in_window(&self, hour: u32) -> bool {
        hour >= self.window_start_hour && hour < self.window_end_hour
    }

    /// Human-readable reason an auto run was refused, for logs and skip outcomes.
    pub fn denial_reason<Tz: TimeZone>(&self, now: &DateTime<Tz>, count_today: u32) -> String {
        if !self.in_window(now.hour()) {
            format!(
                "outside generation window ({:02}:00-{:02}:00), hour is {:02}",
                self.window_start_hour,
                self.window_end_hour,
                now.hour()
            )
        } else {
            format!(
                "daily generation limit reached ({}/{})",
                count_today, self.max_per_day
            )
        }
    }
}
