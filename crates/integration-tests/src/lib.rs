//! Shared fixtures for the cross-crate tests: a SQLite-backed harness wired the
//! way the binaries wire it, with the model providers replaced by fakes.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use anyhow::bail;
use async_trait::async_trait;
use axum::Router;
use bytes::Bytes;
use chrono::{DateTime, FixedOffset, Utc};
use domains::models::{
    GeneratedImage, GenerationType, ImageLocators, ImageRecord, ImageSettings,
    PromptRecord,
};
use domains::ports::{
    BlobStorage, Clock, GalleryRepo, ImageGenerator, PromptGenerator, RemoteFetcher,
};
use services::{
    ensure_character, GenerationConfig, GenerationDeps, GenerationService, ImageResolver,
    QuotaGate, RecordOnlyPublisher, SocialAgent,
};
use storage_adapters::{
    render_placeholder, LocalBlobStorage, LocalImageCache, ReqwestFetcher, SqliteStore,
};
use tempfile::TempDir;
use uuid::Uuid;

pub const PROMPT_TEXT: &str = "a brass orchestra of jellyfish drifting through fog";
pub const ORIGIN_URL: &str = "https://generator.test/tmp/img-123.png";
pub const GENERATED_BYTES: &[u8] = b"\x89PNG\r\n\x1a\ngenerated";

pub fn at(rfc3339: &str) -> DateTime<FixedOffset> {
    DateTime::parse_from_rfc3339(rfc3339).expect("valid timestamp literal")
}

/// Settable wall clock.
pub struct FixedClock(Mutex<DateTime<FixedOffset>>);

impl FixedClock {
    pub fn new(now: DateTime<FixedOffset>) -> Self {
        Self(Mutex::new(now))
    }

    pub fn set(&self, now: DateTime<FixedOffset>) {
        *self.0.lock().expect("clock lock") = now;
    }
}

impl Clock for FixedClock {
    fn now(&self) -> DateTime<FixedOffset> {
        *self.0.lock().expect("clock lock")
    }
}

pub struct StaticPrompt;

#[async_trait]
impl PromptGenerator for StaticPrompt {
    async fn generate_prompt(&self, system_prompt: &str) -> anyhow::Result<String> {
        if !system_prompt.contains("You are a visual AI artist") {
            bail!("unexpected system prompt");
        }
        Ok(PROMPT_TEXT.to_string())
    }
}

pub struct StaticImage;

#[async_trait]
impl ImageGenerator for StaticImage {
    async fn generate_image(&self, _: &str, settings: ImageSettings) -> anyhow::Result<GeneratedImage> {
        Ok(GeneratedImage {
            bytes: Bytes::from_static(GENERATED_BYTES),
            content_type: mime::IMAGE_PNG,
            origin_url: ORIGIN_URL.to_string(),
            settings: serde_json::json!({
                "model": "dall-e-3",
                "size": settings.size.as_str(),
                "quality": settings.quality.as_str(),
            }),
            model: "dall-e-3".into(),
        })
    }
}

pub struct FailingImages;

#[async_trait]
impl ImageGenerator for FailingImages {
    async fn generate_image(&self, _: &str, _: ImageSettings) -> anyhow::Result<GeneratedImage> {
        bail!("content policy violation")
    }
}

pub struct FailingStorage;

#[async_trait]
impl BlobStorage for FailingStorage {
    async fn upload(&self, _: &str, _: Bytes, _: &str) -> anyhow::Result<()> {
        bail!("bucket unreachable")
    }

    fn public_url(&self, path: &str) -> String {
        format!("https://storage.test/{path}")
    }
}

/// Everything a test needs, backed by an in-memory database and a temp directory.
pub struct Harness {
    pub store: Arc<SqliteStore>,
    pub clock: Arc<FixedClock>,
    pub generation: Arc<GenerationService>,
    pub resolver: Arc<ImageResolver>,
    pub placeholder: Bytes,
    pub character_id: Uuid,
    pub dir: TempDir,
}

pub struct HarnessBuilder {
    images: Arc<dyn ImageGenerator>,
    storage: Option<Arc<dyn BlobStorage>>,
    fetcher: Arc<dyn RemoteFetcher>,
    now: DateTime<FixedOffset>,
    gate: QuotaGate,
}

impl Default for HarnessBuilder {
    fn default() -> Self {
        Self {
            images: Arc::new(StaticImage),
            storage: None,
            fetcher: Arc::new(ReqwestFetcher::default()),
            now: at("2024-05-20T12:00:00+02:00"),
            gate: QuotaGate::default(),
        }
    }
}

impl HarnessBuilder {
    pub fn images(mut self, images: impl ImageGenerator + 'static) -> Self {
        self.images = Arc::new(images);
        self
    }

    pub fn storage(mut self, storage: impl BlobStorage + 'static) -> Self {
        self.storage = Some(Arc::new(storage));
        self
    }

    pub fn now(mut self, now: DateTime<FixedOffset>) -> Self {
        self.now = now;
        self
    }

    pub async fn build(self) -> anyhow::Result<Harness> {
        let dir = tempfile::tempdir()?;
        let store = Arc::new(SqliteStore::connect("sqlite::memory:").await?);
        let clock = Arc::new(FixedClock::new(self.now));
        let character_id = Uuid::now_v7();
        ensure_character(store.as_ref(), character_id).await?;

        let storage = self.storage.unwrap_or_else(|| {
            Arc::new(LocalBlobStorage::new(dir.path().join("bucket"), "/media"))
        });
        let generation = GenerationService::new(
            GenerationDeps {
                characters: store.clone(),
                gallery: store.clone(),
                logs: store.clone(),
                prompts: Arc::new(StaticPrompt),
                images: self.images,
                storage,
                cache: Arc::new(LocalImageCache::new(dir.path().join("images"))),
                clock: clock.clone(),
            },
            GenerationConfig {
                character_id,
                gate: self.gate,
                defaults: ImageSettings::default(),
            },
        );

        let placeholder = render_placeholder()?;
        let resolver = ImageResolver::new(self.fetcher, placeholder.clone(), Duration::from_secs(2));

        Ok(Harness {
            store,
            clock,
            generation: Arc::new(generation),
            resolver: Arc::new(resolver),
            placeholder,
            character_id,
            dir,
        })
    }
}

impl Harness {
    pub fn builder() -> HarnessBuilder {
        HarnessBuilder::default()
    }

    pub fn art_router(&self) -> Router {
        use api_adapters::web::{art, ArtState, StaticAssets};

        let state = ArtState {
            generation: self.generation.clone(),
            resolver: self.resolver.clone(),
            characters: self.store.clone(),
            gallery: self.store.clone(),
            logs: self.store.clone(),
            clock: self.clock.clone(),
            character_id: self.character_id,
        };
        let assets = StaticAssets {
            static_dir: self.dir.path().join("static"),
            media: Some(("/media".into(), self.dir.path().join("bucket"))),
        };
        art::router(state, &assets)
    }

    pub fn social_agent(&self, max_posts_per_day: u32) -> SocialAgent {
        SocialAgent::new(
            self.store.clone(),
            self.store.clone(),
            self.store.clone(),
            Arc::new(RecordOnlyPublisher::new("twitter")),
            self.clock.clone(),
            max_posts_per_day,
            vec!["10:00".into(), "19:00".into()],
        )
    }

    /// Writes a prompt and an image row directly, bypassing generation.
    pub async fn seed_image(
        &self,
        kind: GenerationType,
        locators: ImageLocators,
        created_at: DateTime<Utc>,
    ) -> anyhow::Result<ImageRecord> {
        let prompt = PromptRecord {
            id: Uuid::now_v7(),
            text: "seeded prompt".into(),
            character_id: self.character_id,
            created_at,
        };
        let image = ImageRecord {
            id: Uuid::now_v7(),
            prompt_id: prompt.id,
            locators,
            generation_type: kind,
            api_used: "dall-e-3".into(),
            settings: serde_json::json!({ "size": "1024x1024", "quality": "standard" }),
            created_at,
        };
        self.store.insert_prompt(prompt).await?;
        self.store.insert_image(image.clone()).await?;
        Ok(image)
    }

    pub fn now_utc(&self) -> DateTime<Utc> {
        self.clock.now().with_timezone(&Utc)
    }
}
