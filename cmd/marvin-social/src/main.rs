//! # marvin-social
//!
//! Social agent: posts generated images on a daily quota and reports how
//! many are still waiting.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use api_adapters::web::{middleware, social, SocialState};
use configs::Settings;
use domains::ports::Clock;
use services::{
    ensure_character, parse_time_of_day, AutoPostTask, LogRetention, RecordOnlyPublisher,
    Scheduler, SocialAgent, SystemClock,
};
use storage_adapters::SqliteStore;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let settings = Settings::load()?;
    configs::telemetry::init(&settings.log);

    let store = Arc::new(SqliteStore::connect(&settings.database.url).await?);
    // Both services may start against a fresh database.
    ensure_character(store.as_ref(), settings.generation.character_id).await?;

    let clock: Arc<dyn Clock> = Arc::new(SystemClock);
    let s = &settings.social;
    let agent = Arc::new(SocialAgent::new(
        store.clone(),
        store.clone(),
        store.clone(),
        Arc::new(RecordOnlyPublisher::new(s.platform.clone())),
        clock.clone(),
        s.max_posts_per_day,
        s.post_times.clone(),
    ));

    let mut scheduler = Scheduler::new(
        clock.clone(),
        Duration::from_secs(settings.scheduler.poll_interval_secs),
    );
    for at in &s.post_times {
        scheduler.every_day_at(parse_time_of_day(at)?, Arc::new(AutoPostTask(agent.clone())));
    }
    scheduler.every_day_at(
        parse_time_of_day(&settings.scheduler.retention_time)?,
        Arc::new(LogRetention::new(
            store,
            clock,
            settings.scheduler.log_retention_days,
        )),
    );
    let scheduler = scheduler.spawn();

    let app = middleware::standard(
        social::router(SocialState { agent }),
        &settings.server.cors_origins,
    );

    let addr = (settings.server.host.as_str(), settings.server.social_port);
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("binding {}:{}", addr.0, addr.1))?;
    tracing::info!(
        addr = %listener.local_addr()?,
        max_posts_per_day = s.max_posts_per_day,
        "marvin-social listening"
    );

    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            if tokio::signal::ctrl_c().await.is_err() {
                std::future::pending::<()>().await;
            }
            tracing::info!("shutdown requested");
        })
        .await?;
    scheduler.abort();
    Ok(())
}
