//! Daily sweep of old activity-log rows.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{TimeDelta, Utc};
use domains::ports::{Clock, LogRepo};
use serde_json::json;

use crate::activity::ActivityLog;
use crate::scheduler::ScheduledTask;

pub struct LogRetention {
    logs: Arc<dyn LogRepo>,
    clock: Arc<dyn Clock>,
    keep_days: u32,
    activity: ActivityLog,
}

impl LogRetention {
    pub fn new(logs: Arc<dyn LogRepo>, clock: Arc<dyn Clock>, keep_days: u32) -> Self {
        let activity = ActivityLog::new(logs.clone(), "scheduler");
        Self {
            logs,
            clock,
            keep_days,
            activity,
        }
    }

    /// Deletes rows older than `keep_days` and returns how many went.
    pub async fn sweep(&self) -> anyhow::Result<u64> {
        let cutoff = self.clock.now().with_timezone(&Utc) - TimeDelta::days(i64::from(self.keep_days));
        let deleted = self.logs.delete_logs_before(cutoff).await?;
        self.activity
            .info(
                format!("log retention removed {deleted} rows"),
                json!({ "cutoff": cutoff, "keep_days": self.keep_days }),
            )
            .await;
        Ok(deleted)
    }
}

#[async_trait]
impl ScheduledTask for LogRetention {
    fn name(&self) -> &str {
        "log-retention"
    }

    async fn run(&self) {
        if let Err(e) = self.sweep().await {
            tracing::error!(error = %e, "log retention sweep failed");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{DateTime, FixedOffset};
    use domains::ports::{MockClock, MockLogRepo};

    fn fixed_now() -> DateTime<FixedOffset> {
        DateTime::parse_from_rfc3339("2024-05-20T03:00:00+02:00").unwrap()
    }

    #[tokio::test]
    async fn cutoff_is_keep_days_before_now() {
        let mut clock = MockClock::new();
        clock.expect_now().returning(fixed_now);
        let mut logs = MockLogRepo::new();
        logs.expect_delete_logs_before()
            .withf(|cutoff| cutoff.to_rfc3339() == "2024-05-13T01:00:00+00:00")
            .times(1)
            .returning(|_| Ok(12));
        logs.expect_insert_log().returning(|_| Ok(()));

        let retention = LogRetention::new(Arc::new(logs), Arc::new(clock), 7);
        let deleted = tokio_test::assert_ok!(retention.sweep().await);
        assert_eq!(deleted, 12);
    }

    #[tokio::test]
    async fn failed_sweep_is_contained_by_the_task() {
        let mut clock = MockClock::new();
        clock.expect_now().returning(fixed_now);
        let mut logs = MockLogRepo::new();
        logs.expect_delete_logs_before()
            .returning(|_| Err(anyhow::anyhow!("no such table: logs")));
        logs.expect_insert_log().never();

        let retention = LogRetention::new(Arc::new(logs), Arc::new(clock), 7);
        assert!(retention.sweep().await.is_err());
        retention.run().await;
    }
}
