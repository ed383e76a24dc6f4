//! # Generation Orchestrator
//!
//! One generation run: gate → prompt → image → local cache → storage →
//! prompt row → image row. Prompt/image generation and persistence failures
//! abort the run; cache and storage failures only drop the affected locators.

use std::sync::Arc;

use chrono::Utc;
use domains::errors::AppError;
use domains::models::{
    GeneratedImage, GenerationType, ImageLocators, ImageRecord, ImageSettings, PromptRecord,
};
use domains::ports::{
    BlobStorage, CharacterRepo, Clock, GalleryRepo, ImageGenerator, LogRepo, MediaCache,
    PromptGenerator,
};
use serde::Serialize;
use serde_json::json;
use thiserror::Error;
use uuid::Uuid;

use crate::activity::ActivityLog;
use crate::clock::local_day_bounds;
use crate::gate::QuotaGate;
use crate::prompt::character_system_prompt;
use crate::scheduler::ScheduledTask;

#[derive(Debug, Error)]
pub enum GenerationError {
    #[error("character {0} not found")]
    CharacterMissing(Uuid),

    #[error("prompt generation failed: {0:#}")]
    Prompt(anyhow::Error),

    #[error("image generation failed: {0:#}")]
    Image(anyhow::Error),

    #[error("database save failed: {0:#}")]
    Persistence(anyhow::Error),
}

impl From<GenerationError> for AppError {
    fn from(err: GenerationError) -> Self {
        // Every failed run is a server-side failure, a missing character included.
        AppError::Internal(err.to_string())
    }
}

/// What a completed run produced. Field names are the `/generate` response.
#[derive(Debug, Clone, Serialize)]
pub struct GenerationReport {
    pub prompt: String,
    /// Permanent URL when the upload succeeded, otherwise the generator URL.
    pub image_url: String,
    pub local_path: Option<String>,
    pub settings: serde_json::Value,
    pub prompt_id: Uuid,
    pub image_id: Uuid,
}

#[derive(Debug, Clone)]
pub enum GenerationOutcome {
    Completed(GenerationReport),
    /// The gate refused an auto run. Not an error.
    Skipped { reason: String },
}

/// Everything the orchestrator talks to.
#[derive(Clone)]
pub struct GenerationDeps {
    pub characters: Arc<dyn CharacterRepo>,
    pub gallery: Arc<dyn GalleryRepo>,
    pub logs: Arc<dyn LogRepo>,
    pub prompts: Arc<dyn PromptGenerator>,
    pub images: Arc<dyn ImageGenerator>,
    pub storage: Arc<dyn BlobStorage>,
    pub cache: Arc<dyn MediaCache>,
    pub clock: Arc<dyn Clock>,
}

#[derive(Debug, Clone, Copy)]
pub struct GenerationConfig {
    pub character_id: Uuid,
    pub gate: QuotaGate,
    pub defaults: ImageSettings,
}

pub struct GenerationService {
    deps: GenerationDeps,
    config: GenerationConfig,
    activity: ActivityLog,
}

impl GenerationService {
    pub fn new(deps: GenerationDeps, config: GenerationConfig) -> Self {
        let activity = ActivityLog::new(deps.logs.clone(), "generator");
        Self {
            deps,
            config,
            activity,
        }
    }

    pub fn defaults(&self) -> ImageSettings {
        self.config.defaults
    }

    /// Number of `kind` images created during the current local day.
    pub async fn count_today(&self, kind: GenerationType) -> anyhow::Result<i64> {
        let (from, to) = local_day_bounds(&self.deps.clock.now());
        self.deps.gallery.count_images(kind, from, to).await
    }

    /// Runs one generation. `settings` falls back to the configured defaults.
    pub async fn run(
        &self,
        kind: GenerationType,
        settings: Option<ImageSettings>,
    ) -> Result<GenerationOutcome, GenerationError> {
        let settings = settings.unwrap_or(self.config.defaults);

        // 1. Gate (auto only)
        if kind == GenerationType::Auto {
            let now = self.deps.clock.now();
            let count = match self.count_today(kind).await {
                Ok(n) => u32::try_from(n).unwrap_or(u32::MAX),
                Err(e) => {
                    tracing::warn!(error = %e, "could not count today's images, assuming none");
                    0
                }
            };
            if !self.config.gate.allow(kind, &now, count) {
                let reason = self.config.gate.denial_reason(&now, count);
                self.activity
                    .info(format!("auto generation skipped: {reason}"), json!({ "count_today": count }))
                    .await;
                return Ok(GenerationOutcome::Skipped { reason });
            }
        }

        self.activity
            .info(
                format!("{kind} generation started"),
                json!({ "size": settings.size.as_str(), "quality": settings.quality.as_str() }),
            )
            .await;

        match self.generate(kind, settings).await {
            Ok(report) => {
                self.activity
                    .info(
                        "generation completed",
                        json!({ "prompt_id": report.prompt_id, "image_id": report.image_id }),
                    )
                    .await;
                Ok(GenerationOutcome::Completed(report))
            }
            Err(e) => {
                self.activity
                    .error(format!("{kind} generation failed: {e}"), json!({}))
                    .await;
                Err(e)
            }
        }
    }

    async fn generate(
        &self,
        kind: GenerationType,
        settings: ImageSettings,
    ) -> Result<GenerationReport, GenerationError> {
        let character_id = self.config.character_id;

        // 2. Prompt
        let character = self
            .deps
            .characters
            .get_character(character_id)
            .await
            .map_err(GenerationError::Persistence)?
            .ok_or(GenerationError::CharacterMissing(character_id))?;
        let system_prompt = character_system_prompt(&character.content);
        let prompt = self
            .deps
            .prompts
            .generate_prompt(&system_prompt)
            .await
            .map_err(GenerationError::Prompt)?;
        tracing::info!(%prompt, "generated art prompt");

        // 3. Image
        let image = self
            .deps
            .images
            .generate_image(&prompt, settings)
            .await
            .map_err(GenerationError::Image)?;
        tracing::info!(origin_url = %image.origin_url, "generated image");

        // 4. Local cache + durable storage, both best-effort
        let stamp = self.deps.clock.now().format("%Y%m%d_%H%M%S").to_string();
        let unique = Uuid::now_v7().simple().to_string();
        let local_path = self.cache_locally(&image, &stamp, &unique).await;
        let stored = self.upload(&image, &stamp, &unique).await;

        // 5. Prompt row, then image row
        let now = self.deps.clock.now().with_timezone(&Utc);
        let prompt_record = PromptRecord {
            id: Uuid::now_v7(),
            text: prompt.clone(),
            character_id,
            created_at: now,
        };
        let prompt_id = prompt_record.id;
        self.deps
            .gallery
            .insert_prompt(prompt_record)
            .await
            .map_err(GenerationError::Persistence)?;

        let (storage_path, permanent_url) = match stored {
            Some((path, url)) => (Some(path), Some(url)),
            None => (None, None),
        };
        let image_url = permanent_url
            .clone()
            .unwrap_or_else(|| image.origin_url.clone());
        let record = ImageRecord {
            id: Uuid::now_v7(),
            prompt_id,
            locators: ImageLocators {
                storage_path,
                permanent_url,
                local_path: local_path.clone(),
                origin_url: Some(image.origin_url.clone()),
                image_url: Some(image_url.clone()),
            },
            generation_type: kind,
            api_used: image.model.clone(),
            settings: image.settings.clone(),
            created_at: now,
        };
        let image_id = record.id;
        self.deps
            .gallery
            .insert_image(record)
            .await
            .map_err(GenerationError::Persistence)?;

        Ok(GenerationReport {
            prompt,
            image_url,
            local_path,
            settings: image.settings,
            prompt_id,
            image_id,
        })
    }

    async fn cache_locally(&self, image: &GeneratedImage, stamp: &str, unique: &str) -> Option<String> {
        let file_name = format!("marvin_art_{stamp}_{}.png", &unique[unique.len() - 8..]);
        match self.deps.cache.save(&file_name, image.bytes.clone()).await {
            Ok(path) => Some(path),
            Err(e) => {
                self.activity
                    .warn(format!("local cache write failed: {e:#}"), json!({ "file": file_name }))
                    .await;
                None
            }
        }
    }

    /// Returns `(storage_path, permanent_url)` on success.
    async fn upload(&self, image: &GeneratedImage, stamp: &str, unique: &str) -> Option<(String, String)> {
        let path = format!("images/{stamp}_{unique}.png");
        match self
            .deps
            .storage
            .upload(&path, image.bytes.clone(), image.content_type.as_ref())
            .await
        {
            Ok(()) => {
                let url = self.deps.storage.public_url(&path);
                tracing::info!(%path, %url, "uploaded image to storage");
                Some((path, url))
            }
            Err(e) => {
                self.activity
                    .warn(
                        format!("storage upload failed, keeping generator URL: {e:#}"),
                        json!({ "path": path }),
                    )
                    .await;
                None
            }
        }
    }

    /// Fires a run on its own task so the caller is not blocked.
    pub fn trigger(
        self: &Arc<Self>,
        kind: GenerationType,
        settings: Option<ImageSettings>,
    ) -> tokio::task::JoinHandle<()> {
        let service = Arc::clone(self);
        tokio::spawn(async move { service.run_logged(kind, settings).await })
    }

    /// `run`, with the outcome reported to tracing instead of the caller.
    pub async fn run_logged(&self, kind: GenerationType, settings: Option<ImageSettings>) {
        match self.run(kind, settings).await {
            Ok(GenerationOutcome::Completed(report)) => {
                tracing::info!(%kind, image_id = %report.image_id, "generation finished")
            }
            Ok(GenerationOutcome::Skipped { reason }) => {
                tracing::info!(%kind, %reason, "generation skipped")
            }
            Err(e) => tracing::error!(%kind, error = %e, "generation failed"),
        }
    }
}

/// Scheduler adapter: one gated `auto` run per firing.
pub struct AutoGenerationTask(pub Arc<GenerationService>);

#[async_trait::async_trait]
impl ScheduledTask for AutoGenerationTask {
    fn name(&self) -> &str {
        "auto-generation"
    }

    async fn run(&self) {
        self.0.run_logged(GenerationType::Auto, None).await;
    }
}
