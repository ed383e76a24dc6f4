//! # marvin-art
//!
//! Art generator service: gallery UI, generation API, image proxy and the
//! daily generation schedule.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use ai_adapters::{OpenAiClient, OpenAiConfig};
use anyhow::Context;
use api_adapters::web::{art, middleware, ArtState, StaticAssets};
use configs::{Settings, StorageSettings};
use domains::ports::{BlobStorage, Clock};
use services::{
    ensure_character, parse_time_of_day, AutoGenerationTask, GenerationConfig, GenerationDeps,
    GenerationService, ImageResolver, LogRetention, QuotaGate, Scheduler, SystemClock,
};
use storage_adapters::{load_or_render, LocalBlobStorage, LocalImageCache, ReqwestFetcher, SqliteStore};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let settings = Settings::load()?;
    configs::telemetry::init(&settings.log);

    // 1. Persistence
    let store = Arc::new(SqliteStore::connect(&settings.database.url).await?);
    let character_id = settings.generation.character_id;
    ensure_character(store.as_ref(), character_id).await?;

    // 2. Model provider
    let api_key = settings
        .openai
        .api_key
        .clone()
        .context("OPENAI_API_KEY is not set")?;
    let openai = Arc::new(OpenAiClient::new(OpenAiConfig {
        api_base: settings.openai.api_base.clone(),
        api_key,
        chat_model: settings.openai.chat_model.clone(),
        image_model: settings.openai.image_model.clone(),
        timeout: Duration::from_secs(settings.openai.timeout_secs),
    })?);

    // 3. Media
    let (storage, media) = build_storage(&settings.storage)?;
    let clock: Arc<dyn Clock> = Arc::new(SystemClock);

    let g = &settings.generation;
    let generation = Arc::new(GenerationService::new(
        GenerationDeps {
            characters: store.clone(),
            gallery: store.clone(),
            logs: store.clone(),
            prompts: openai.clone(),
            images: openai,
            storage,
            cache: Arc::new(LocalImageCache::new(settings.storage.cache_dir.clone())),
            clock: clock.clone(),
        },
        GenerationConfig {
            character_id,
            gate: QuotaGate::new(g.max_per_day, g.window_start_hour, g.window_end_hour),
            defaults: g.image_settings(),
        },
    ));

    let placeholder = load_or_render(settings.resolver.placeholder_path.as_deref()).await?;
    let resolver = Arc::new(ImageResolver::new(
        Arc::new(ReqwestFetcher::default()),
        placeholder,
        Duration::from_secs(settings.resolver.fetch_timeout_secs),
    ));

    // 4. Schedule
    let mut scheduler = Scheduler::new(
        clock.clone(),
        Duration::from_secs(settings.scheduler.poll_interval_secs),
    );
    for at in &g.times {
        scheduler.every_day_at(
            parse_time_of_day(at)?,
            Arc::new(AutoGenerationTask(generation.clone())),
        );
    }
    scheduler.every_day_at(
        parse_time_of_day(&settings.scheduler.retention_time)?,
        Arc::new(LogRetention::new(
            store.clone(),
            clock.clone(),
            settings.scheduler.log_retention_days,
        )),
    );
    let scheduler = scheduler.spawn();

    // 5. HTTP
    let state = ArtState {
        generation,
        resolver,
        characters: store.clone(),
        gallery: store.clone(),
        logs: store,
        clock,
        character_id,
    };
    let assets = StaticAssets {
        static_dir: settings.ui.static_dir.clone(),
        media,
    };
    let app = middleware::standard(art::router(state, &assets), &settings.server.cors_origins);

    let addr = (settings.server.host.as_str(), settings.server.art_port);
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("binding {}:{}", addr.0, addr.1))?;
    tracing::info!(addr = %listener.local_addr()?, "marvin-art listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;
    scheduler.abort();
    tracing::info!("marvin-art stopped");
    Ok(())
}

/// Supabase when configured, otherwise a directory served under `local_url_prefix`.
fn build_storage(
    settings: &StorageSettings,
) -> anyhow::Result<(Arc<dyn BlobStorage>, Option<(String, PathBuf)>)> {
    #[cfg(feature = "media-supabase")]
    {
        if let Some((url, key)) = settings.supabase() {
            let storage = storage_adapters::SupabaseStorage::new(
                url,
                key,
                settings.bucket.clone(),
                Duration::from_secs(settings.upload_timeout_secs),
            )?;
            tracing::info!(bucket = %settings.bucket, "uploading images to Supabase storage");
            return Ok((Arc::new(storage), None));
        }
    }

    tracing::info!(root = %settings.local_root.display(), "uploading images to local storage");
    let storage = LocalBlobStorage::new(settings.local_root.clone(), settings.local_url_prefix.clone());
    Ok((
        Arc::new(storage),
        Some((settings.local_url_prefix.clone(), settings.local_root.clone())),
    ))
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    tracing::info!("shutdown requested");
}
