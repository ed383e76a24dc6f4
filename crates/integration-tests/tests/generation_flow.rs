use std::sync::Arc;
use std::time::Duration;

use chrono::{NaiveTime, TimeDelta};
use domains::models::{GenerationType, ImageLocators, LogFilter, LogLevel};
use domains::ports::{GalleryRepo, LogRepo};
use integration_tests::{at, FailingImages, FailingStorage, Harness, GENERATED_BYTES, ORIGIN_URL, PROMPT_TEXT};
use services::{
    AutoGenerationTask, GenerationError, GenerationOutcome, LogRetention, Resolved, Scheduler,
};

fn completed(outcome: GenerationOutcome) -> services::GenerationReport {
    match outcome {
        GenerationOutcome::Completed(report) => report,
        GenerationOutcome::Skipped { reason } => panic!("run was skipped: {reason}"),
    }
}

#[tokio::test]
async fn manual_run_persists_prompt_then_image_with_every_locator() {
    let h = Harness::builder().build().await.unwrap();

    let report = completed(h.generation.run(GenerationType::Manual, None).await.unwrap());

    assert_eq!(report.prompt, PROMPT_TEXT);
    assert!(report.image_url.starts_with("/media/images/"));
    let local_path = report.local_path.clone().expect("cached locally");
    assert_eq!(tokio::fs::read(&local_path).await.unwrap(), GENERATED_BYTES);

    let rows = h.store.list_images(10, 0).await.unwrap();
    assert_eq!(rows.len(), 1);
    let row = &rows[0];
    assert_eq!(row.image.id, report.image_id);
    assert_eq!(row.image.prompt_id, report.prompt_id);
    assert_eq!(row.prompts.as_ref().map(|p| p.text.as_str()), Some(PROMPT_TEXT));
    assert_eq!(row.image.locators.origin_url.as_deref(), Some(ORIGIN_URL));
    assert_eq!(row.image.locators.permanent_url.as_deref(), Some(report.image_url.as_str()));

    let stored = h
        .dir
        .path()
        .join("bucket")
        .join(row.image.locators.storage_path.as_deref().unwrap());
    assert!(stored.is_file());

    assert_eq!(h.generation.count_today(GenerationType::Manual).await.unwrap(), 1);
    assert_eq!(h.generation.count_today(GenerationType::Auto).await.unwrap(), 0);

    let logs = h
        .store
        .list_logs(LogFilter { source: Some("generator".into()), limit: 50, ..Default::default() })
        .await
        .unwrap();
    assert!(logs.iter().any(|l| l.message == "generation completed"));
}

#[tokio::test]
async fn storage_failure_still_completes_and_resolves_from_cache() {
    let h = Harness::builder().storage(FailingStorage).build().await.unwrap();

    let report = completed(h.generation.run(GenerationType::Manual, None).await.unwrap());
    assert_eq!(report.image_url, ORIGIN_URL);

    let record = h.store.get_image(report.image_id).await.unwrap().unwrap();
    assert!(record.locators.storage_path.is_none());
    assert!(record.locators.permanent_url.is_none());
    assert_eq!(record.locators.origin_url.as_deref(), Some(ORIGIN_URL));

    match h.resolver.resolve(&record).await {
        Resolved::Bytes { content_type, body } => {
            assert_eq!(content_type, "image/png");
            assert_eq!(&body[..], GENERATED_BYTES);
        }
        other => panic!("expected cached bytes, got {other:?}"),
    }

    let warnings = h
        .store
        .list_logs(LogFilter { level: Some(LogLevel::Warning), limit: 50, ..Default::default() })
        .await
        .unwrap();
    assert!(warnings.iter().any(|l| l.message.contains("storage upload failed")));
}

#[tokio::test]
async fn image_failure_aborts_without_rows() {
    let h = Harness::builder().images(FailingImages).build().await.unwrap();

    let err = h.generation.run(GenerationType::Manual, None).await.unwrap_err();
    assert!(matches!(err, GenerationError::Image(_)));
    assert!(h.store.list_images(10, 0).await.unwrap().is_empty());

    let errors = h
        .store
        .list_logs(LogFilter { level: Some(LogLevel::Error), limit: 50, ..Default::default() })
        .await
        .unwrap();
    assert_eq!(errors.len(), 1);
}

#[tokio::test]
async fn auto_runs_respect_window_and_daily_quota() {
    let h = Harness::builder()
        .now(at("2024-05-20T08:59:59+02:00"))
        .build()
        .await
        .unwrap();

    let outcome = h.generation.run(GenerationType::Auto, None).await.unwrap();
    assert!(matches!(outcome, GenerationOutcome::Skipped { ref reason } if reason.contains("window")));

    h.clock.set(at("2024-05-20T10:00:00+02:00"));
    for _ in 0..3 {
        h.seed_image(GenerationType::Auto, ImageLocators::default(), h.now_utc())
            .await
            .unwrap();
    }
    // Yesterday's images do not count.
    h.seed_image(
        GenerationType::Auto,
        ImageLocators::default(),
        h.now_utc() - TimeDelta::days(1),
    )
    .await
    .unwrap();

    completed(h.generation.run(GenerationType::Auto, None).await.unwrap());
    let outcome = h.generation.run(GenerationType::Auto, None).await.unwrap();
    assert!(matches!(outcome, GenerationOutcome::Skipped { ref reason } if reason.contains("4/4")));

    // Manual runs ignore both limits.
    completed(h.generation.run(GenerationType::Manual, None).await.unwrap());
}

#[tokio::test]
async fn scheduler_fires_auto_generation_once_per_slot() {
    let h = Harness::builder()
        .now(at("2024-05-20T08:30:00+02:00"))
        .build()
        .await
        .unwrap();

    let mut scheduler = Scheduler::new(h.clock.clone(), Duration::from_secs(60));
    scheduler.every_day_at(
        NaiveTime::from_hms_opt(9, 0, 0).unwrap(),
        Arc::new(AutoGenerationTask(h.generation.clone())),
    );

    assert_eq!(scheduler.run_pending().await, 0);

    h.clock.set(at("2024-05-20T09:00:30+02:00"));
    assert_eq!(scheduler.run_pending().await, 1);
    assert_eq!(scheduler.run_pending().await, 0);
    assert_eq!(h.generation.count_today(GenerationType::Auto).await.unwrap(), 1);
    assert_eq!(
        scheduler.next_run().map(|t| t.to_rfc3339()),
        Some("2024-05-21T09:00:00+02:00".to_string())
    );
}

#[tokio::test]
async fn retention_sweep_only_drops_old_rows() {
    let h = Harness::builder().build().await.unwrap();
    completed(h.generation.run(GenerationType::Manual, None).await.unwrap());

    let mut old = domains::models::LogEntry::new(LogLevel::Info, "scheduler", "ancient");
    old.created_at = h.now_utc() - TimeDelta::days(30);
    h.store.insert_log(old).await.unwrap();

    let retention = LogRetention::new(h.store.clone(), h.clock.clone(), 7);
    let deleted = tokio_test::assert_ok!(retention.sweep().await);
    assert_eq!(deleted, 1);

    let remaining = h
        .store
        .list_logs(LogFilter { limit: 100, ..Default::default() })
        .await
        .unwrap();
    assert!(remaining.iter().any(|l| l.source == "generator"));
    assert!(remaining.iter().all(|l| l.message != "ancient"));
}
