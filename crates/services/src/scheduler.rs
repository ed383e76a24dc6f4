//! # Scheduler
//!
//! Fixed time-of-day task runner. One background task polls at a fixed
//! interval and runs every due task to completion, in registration order,
//! before looking at the next one. Schedule state lives in memory only and is
//! recomputed at process start.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, FixedOffset, NaiveTime, TimeDelta};
use domains::errors::AppError;
use domains::ports::Clock;
use tokio::time::MissedTickBehavior;

/// A unit of work the scheduler can fire.
#[async_trait]
pub trait ScheduledTask: Send + Sync {
    fn name(&self) -> &str;
    /// Failures are the task's own business; the scheduler only sequences.
    async fn run(&self);
}

struct Entry {
    at: NaiveTime,
    next_run: DateTime<FixedOffset>,
    task: Arc<dyn ScheduledTask>,
}

pub struct Scheduler {
    clock: Arc<dyn Clock>,
    poll_interval: Duration,
    entries: Vec<Entry>,
}

impl Scheduler {
    pub fn new(clock: Arc<dyn Clock>, poll_interval: Duration) -> Self {
        Self {
            clock,
            poll_interval,
            entries: Vec::new(),
        }
    }

    /// Registers `task` to fire daily at `at` (local time). The first run is the
    /// next occurrence strictly after now.
    pub fn every_day_at(&mut self, at: NaiveTime, task: Arc<dyn ScheduledTask>) -> &mut Self {
        let next_run = next_occurrence(&self.clock.now(), at);
        tracing::info!(task = task.name(), at = %at.format("%H:%M"), %next_run, "scheduled task");
        self.entries.push(Entry { at, next_run, task });
        self
    }

    fn len(&self) -> usize {
        self.entries.len()
    }

    /// Earliest upcoming run across all tasks.
    pub fn next_run(&self) -> Option<DateTime<FixedOffset>> {
        self.entries.iter().map(|e| e.next_run).min()
    }

    /// Runs every task whose time has come and returns how many ran.
    pub async fn run_pending(&mut self) -> usize {
        let mut ran = 0;
        for entry in &mut self.entries {
            if self.clock.now() < entry.next_run {
                continue;
            }
            tracing::info!(task = entry.task.name(), "running scheduled task");
            entry.task.run().await;
            ran += 1;
            entry.next_run = next_occurrence(&self.clock.now(), entry.at);
            tracing::debug!(task = entry.task.name(), next_run = %entry.next_run, "rescheduled");
        }
        ran
    }

    /// Moves the scheduler onto its own tokio task. It keeps polling until
    /// the returned handle is aborted or the runtime shuts down.
    pub fn spawn(mut self) -> tokio::task::JoinHandle<()> {
        tracing::info!(tasks = self.len(), next_run = ?self.next_run(), "scheduler started");
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(self.poll_interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                self.run_pending().await;
            }
        })
    }
}

/// First `at` strictly after `after`, on the same local offset.
pub fn next_occurrence(after: &DateTime<FixedOffset>, at: NaiveTime) -> DateTime<FixedOffset> {
    let today = *after - (after.time() - at);
    if today > *after {
        today
    } else {
        today + TimeDelta::days(1)
    }
}

/// Parses "HH:MM" (or "HH:MM:SS").
pub fn parse_time_of_day(raw: &str) -> Result<NaiveTime, AppError> {
    let raw = raw.trim();
    NaiveTime::parse_from_str(raw, "%H:%M")
        .or_else(|_| NaiveTime::parse_from_str(raw, "%H:%M:%S"))
        .map_err(|_| AppError::ValidationError(format!("invalid time of day '{raw}'")))
}
