//! # Art service routes
//!
//! Gallery UI, manual/triggered generation, listings and the image proxy.

use std::path::PathBuf;
use std::str::FromStr;
use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::http::header;
use axum::response::{IntoResponse, Redirect, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use chrono::{TimeDelta, Utc};
use domains::errors::AppError;
use domains::models::{
    CharacterContent, GenerationType, ImageQuality, ImageSettings, ImageSize, ImageWithPrompt,
    LogEntry, LogFilter, LogLevel,
};
use domains::ports::{CharacterRepo, Clock, GalleryRepo, LogRepo};
use serde::Deserialize;
use serde_json::{json, Value};
use services::{GenerationOutcome, GenerationReport, GenerationService, ImageResolver, Resolved};
use tower_http::services::ServeDir;
use uuid::Uuid;

use super::error::{ApiError, ApiResult};

pub const SERVICE_NAME: &str = "Marvin Art Generator";

const MAX_PAGE: i64 = 100;

/// State shared across all request handlers.
#[derive(Clone)]
pub struct ArtState {
    pub generation: Arc<GenerationService>,
    pub resolver: Arc<ImageResolver>,
    pub characters: Arc<dyn CharacterRepo>,
    pub gallery: Arc<dyn GalleryRepo>,
    pub logs: Arc<dyn LogRepo>,
    pub clock: Arc<dyn Clock>,
    pub character_id: Uuid,
}

/// Directories served as-is.
#[derive(Debug, Clone)]
pub struct StaticAssets {
    /// Holds `ui/index.html` and the shared assets under `/static`.
    pub static_dir: PathBuf,
    /// URL prefix and directory of the local bucket, when uploads stay on this node.
    pub media: Option<(String, PathBuf)>,
}

pub fn router(state: ArtState, assets: &StaticAssets) -> Router {
    let mut router = Router::new()
        .route("/", get(root))
        .route("/health", get(health))
        .route("/character", get(character))
        .route("/generate", post(generate))
        .route("/trigger-generation", post(trigger_generation))
        .route("/images", get(images))
        .route("/unposted", get(unposted))
        .route("/logs", get(logs))
        .route("/proxy-image/{id}", get(proxy_image))
        .nest_service("/ui", ServeDir::new(assets.static_dir.join("ui")))
        .nest_service("/static", ServeDir::new(&assets.static_dir));

    if let Some((prefix, dir)) = &assets.media {
        router = router.nest_service(prefix, ServeDir::new(dir));
    }
    router.with_state(state)
}

async fn root() -> Redirect {
    Redirect::temporary("/ui")
}

async fn health() -> Json<Value> {
    Json(json!({ "status": "online", "service": SERVICE_NAME }))
}

async fn character(State(state): State<ArtState>) -> ApiResult<Json<CharacterContent>> {
    state
        .characters
        .get_character(state.character_id)
        .await?
        .map(|c| Json(c.content))
        .ok_or_else(|| {
            ApiError(AppError::NotFound("character".into(), state.character_id.to_string()))
        })
}

#[derive(Debug, Default, Deserialize)]
pub struct GenerateRequest {
    pub size: Option<ImageSize>,
    pub quality: Option<ImageQuality>,
}

impl GenerateRequest {
    fn settings(&self, defaults: ImageSettings) -> ImageSettings {
        ImageSettings {
            size: self.size.unwrap_or(defaults.size),
            quality: self.quality.unwrap_or(defaults.quality),
        }
    }
}

/// Manual run, answered when the image row is written.
async fn generate(
    State(state): State<ArtState>,
    body: Option<Json<GenerateRequest>>,
) -> ApiResult<Json<GenerationReport>> {
    let request = body.map(|Json(r)| r).unwrap_or_default();
    let settings = request.settings(state.generation.defaults());

    match state.generation.run(GenerationType::Manual, Some(settings)).await? {
        GenerationOutcome::Completed(report) => Ok(Json(report)),
        GenerationOutcome::Skipped { reason } => Err(ApiError(AppError::RateLimitExceeded(reason))),
    }
}

async fn trigger_generation(State(state): State<ArtState>) -> Json<Value> {
    let _ = state.generation.trigger(GenerationType::Manual, None);
    Json(json!({ "status": "success", "message": "Image generation started" }))
}

#[derive(Debug, Deserialize)]
pub struct PageQuery {
    #[serde(default = "default_images_limit")]
    pub limit: i64,
    #[serde(default)]
    pub offset: i64,
}

fn default_images_limit() -> i64 {
    10
}

async fn images(
    State(state): State<ArtState>,
    Query(page): Query<PageQuery>,
) -> ApiResult<Json<Vec<ImageWithPrompt>>> {
    let limit = page.limit.clamp(1, MAX_PAGE);
    let offset = page.offset.max(0);
    Ok(Json(state.gallery.list_images(limit, offset).await?))
}

async fn unposted(State(state): State<ArtState>) -> ApiResult<Json<Value>> {
    let images = state.gallery.list_unposted().await?;
    Ok(Json(json!({
        "status": "success",
        "count": images.len(),
        "images": images,
    })))
}

#[derive(Debug, Deserialize)]
pub struct LogsQuery {
    #[serde(default = "default_logs_limit")]
    pub limit: i64,
    #[serde(default)]
    pub offset: i64,
    pub level: Option<String>,
    pub source: Option<String>,
    /// Only rows from the last `days` days.
    pub days: Option<i64>,
}

fn default_logs_limit() -> i64 {
    100
}

async fn logs(
    State(state): State<ArtState>,
    Query(q): Query<LogsQuery>,
) -> ApiResult<Json<Vec<LogEntry>>> {
    let level = q.level.as_deref().map(LogLevel::from_str).transpose()?;
    let since = match q.days {
        Some(days) if days < 0 => {
            return Err(ApiError(AppError::ValidationError("days must not be negative".into())))
        }
        Some(days) => {
            let now = state.clock.now().with_timezone(&Utc);
            let since = TimeDelta::try_days(days).and_then(|d| now.checked_sub_signed(d));
            Some(since.ok_or_else(|| {
                ApiError(AppError::ValidationError(format!("days={days} is out of range")))
            })?)
        }
        None => None,
    };

    let filter = LogFilter {
        level,
        source: q.source.filter(|s| !s.is_empty()),
        since,
        limit: q.limit.clamp(1, 1000),
        offset: q.offset.max(0),
    };
    Ok(Json(state.logs.list_logs(filter).await?))
}

/// Always answers with something displayable; unknown ids get the placeholder.
async fn proxy_image(State(state): State<ArtState>, Path(id): Path<String>) -> Response {
    let Ok(id) = Uuid::parse_str(&id) else {
        tracing::debug!(%id, "proxy-image: malformed id");
        return resolved_response(state.resolver.placeholder());
    };

    let resolved = match state.gallery.get_image(id).await {
        Ok(Some(record)) => state.resolver.resolve(&record).await,
        Ok(None) => {
            tracing::debug!(%id, "proxy-image: unknown image");
            state.resolver.placeholder()
        }
        Err(e) => {
            tracing::warn!(%id, error = %e, "proxy-image: lookup failed");
            state.resolver.placeholder()
        }
    };
    resolved_response(resolved)
}

fn resolved_response(resolved: Resolved) -> Response {
    match resolved {
        Resolved::Redirect(url) => Redirect::temporary(&url).into_response(),
        Resolved::Bytes { content_type, body } => {
            ([(header::CONTENT_TYPE, content_type)], body).into_response()
        }
        Resolved::Placeholder(body) => {
            ([(header::CONTENT_TYPE, mime::IMAGE_PNG.as_ref())], body).into_response()
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use axum::body::{to_bytes, Body};
    use axum::http::{Request, StatusCode};
    use bytes::Bytes;
    use chrono::{DateTime, FixedOffset};
    use domains::models::{Character, FetchedImage, ImageLocators, ImageRecord};
    use domains::ports::{
        MockBlobStorage, MockCharacterRepo, MockClock, MockGalleryRepo, MockImageGenerator,
        MockLogRepo, MockMediaCache, MockPromptGenerator, MockRemoteFetcher,
    };
    use services::{GenerationConfig, GenerationDeps, QuotaGate};
    use tower::ServiceExt;

    use super::*;

    const PLACEHOLDER: &[u8] = b"PLACEHOLDER";

    #[derive(Default)]
    struct Parts {
        characters: MockCharacterRepo,
        gallery: MockGalleryRepo,
        logs: MockLogRepo,
        fetcher: MockRemoteFetcher,
    }

    fn fixed_clock() -> MockClock {
        let mut clock = MockClock::new();
        clock.expect_now().returning(|| {
            DateTime::<FixedOffset>::parse_from_rfc3339("2024-05-20T12:00:00+00:00").unwrap()
        });
        clock
    }

    fn app(parts: Parts) -> Router {
        let characters: Arc<dyn CharacterRepo> = Arc::new(parts.characters);
        let gallery: Arc<dyn GalleryRepo> = Arc::new(parts.gallery);
        let logs: Arc<dyn LogRepo> = Arc::new(parts.logs);
        let clock: Arc<dyn Clock> = Arc::new(fixed_clock());
        let generation = GenerationService::new(
            GenerationDeps {
                characters: characters.clone(),
                gallery: gallery.clone(),
                logs: logs.clone(),
                prompts: Arc::new(MockPromptGenerator::new()),
                images: Arc::new(MockImageGenerator::new()),
                storage: Arc::new(MockBlobStorage::new()),
                cache: Arc::new(MockMediaCache::new()),
                clock: clock.clone(),
            },
            GenerationConfig {
                character_id: Uuid::nil(),
                gate: QuotaGate::default(),
                defaults: ImageSettings::default(),
            },
        );
        let state = ArtState {
            generation: Arc::new(generation),
            resolver: Arc::new(ImageResolver::new(
                Arc::new(parts.fetcher),
                Bytes::from_static(PLACEHOLDER),
                Duration::from_secs(5),
            )),
            characters,
            gallery,
            logs,
            clock,
            character_id: Uuid::nil(),
        };
        let dir = std::env::temp_dir();
        router(state, &StaticAssets { static_dir: dir, media: None })
    }

    fn record(locators: ImageLocators) -> ImageRecord {
        ImageRecord {
            id: Uuid::now_v7(),
            prompt_id: Uuid::now_v7(),
            locators,
            generation_type: GenerationType::Auto,
            api_used: "dall-e-3".into(),
            settings: json!({}),
            created_at: Utc::now(),
        }
    }

    async fn get(app: Router, uri: &str) -> Response {
        app.oneshot(Request::get(uri).body(Body::empty()).unwrap()).await.unwrap()
    }

    async fn body(resp: Response) -> Bytes {
        to_bytes(resp.into_body(), usize::MAX).await.unwrap()
    }

    #[tokio::test]
    async fn root_redirects_to_ui_and_health_reports_online() {
        let resp = get(app(Parts::default()), "/").await;
        assert_eq!(resp.status(), StatusCode::TEMPORARY_REDIRECT);
        assert_eq!(resp.headers()[header::LOCATION], "/ui");

        let resp = get(app(Parts::default()), "/health").await;
        assert_eq!(resp.status(), StatusCode::OK);
        let v: Value = serde_json::from_slice(&body(resp).await).unwrap();
        assert_eq!(v, json!({ "status": "online", "service": SERVICE_NAME }));
    }

    #[tokio::test]
    async fn character_missing_is_404_with_detail() {
        let mut parts = Parts::default();
        parts.characters.expect_get_character().returning(|_| Ok(None));

        let resp = get(app(parts), "/character").await;
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);
        let v: Value = serde_json::from_slice(&body(resp).await).unwrap();
        assert!(v["detail"].as_str().unwrap().contains("character"));
    }

    #[tokio::test]
    async fn generate_with_missing_character_is_500() {
        let mut parts = Parts::default();
        parts.characters.expect_get_character().returning(|_| Ok(None));
        parts.logs.expect_insert_log().returning(|_| Ok(()));

        let resp = app(parts)
            .oneshot(Request::post("/generate").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::INTERNAL_SERVER_ERROR);
        let v: Value = serde_json::from_slice(&body(resp).await).unwrap();
        assert!(v["detail"].as_str().unwrap().contains("character"));
    }

    #[tokio::test]
    async fn character_returns_content() {
        let mut parts = Parts::default();
        parts.characters.expect_get_character().returning(|id| {
            Ok(Some(Character {
                id,
                agent_name: "marvin".into(),
                display_name: "Marvin".into(),
                content: CharacterContent { name: "Marvin".into(), ..Default::default() },
                version: 1,
                is_active: true,
                created_at: Utc::now(),
                updated_at: Utc::now(),
            }))
        });

        let resp = get(app(parts), "/character").await;
        assert_eq!(resp.status(), StatusCode::OK);
        let v: Value = serde_json::from_slice(&body(resp).await).unwrap();
        assert_eq!(v["name"], "Marvin");
    }

    #[tokio::test]
    async fn proxy_image_unknown_id_serves_placeholder() {
        let mut parts = Parts::default();
        parts.gallery.expect_get_image().returning(|_| Ok(None));

        let resp = get(app(parts), &format!("/proxy-image/{}", Uuid::now_v7())).await;
        assert_eq!(resp.status(), StatusCode::OK);
        assert_eq!(resp.headers()[header::CONTENT_TYPE], "image/png");
        assert_eq!(&body(resp).await[..], PLACEHOLDER);
    }

    #[tokio::test]
    async fn proxy_image_malformed_id_or_lookup_error_serves_placeholder() {
        let resp = get(app(Parts::default()), "/proxy-image/not-a-uuid").await;
        assert_eq!(resp.status(), StatusCode::OK);
        assert_eq!(&body(resp).await[..], PLACEHOLDER);

        let mut parts = Parts::default();
        parts
            .gallery
            .expect_get_image()
            .returning(|_| Err(anyhow::anyhow!("db down")));
        let resp = get(app(parts), &format!("/proxy-image/{}", Uuid::now_v7())).await;
        assert_eq!(resp.status(), StatusCode::OK);
        assert_eq!(&body(resp).await[..], PLACEHOLDER);
    }

    #[tokio::test]
    async fn proxy_image_redirects_to_storage() {
        let mut parts = Parts::default();
        parts.gallery.expect_get_image().returning(|_| {
            Ok(Some(record(ImageLocators {
                storage_path: Some("images/a.png".into()),
                permanent_url: Some("https://cdn/a.png".into()),
                ..Default::default()
            })))
        });

        let resp = get(app(parts), &format!("/proxy-image/{}", Uuid::now_v7())).await;
        assert_eq!(resp.status(), StatusCode::TEMPORARY_REDIRECT);
        assert_eq!(resp.headers()[header::LOCATION], "https://cdn/a.png");
    }

    #[tokio::test]
    async fn proxy_image_streams_fetched_bytes() {
        let mut parts = Parts::default();
        parts.gallery.expect_get_image().returning(|_| {
            Ok(Some(record(ImageLocators {
                origin_url: Some("https://gen/x.jpg".into()),
                ..Default::default()
            })))
        });
        parts.fetcher.expect_fetch().returning(|_, _| {
            Ok(FetchedImage {
                status: 200,
                content_type: Some("image/jpeg".into()),
                body: Bytes::from_static(b"jpeg"),
            })
        });

        let resp = get(app(parts), &format!("/proxy-image/{}", Uuid::now_v7())).await;
        assert_eq!(resp.status(), StatusCode::OK);
        assert_eq!(resp.headers()[header::CONTENT_TYPE], "image/jpeg");
        assert_eq!(&body(resp).await[..], b"jpeg");
    }

    #[tokio::test]
    async fn images_clamps_paging() {
        let mut parts = Parts::default();
        parts
            .gallery
            .expect_list_images()
            .withf(|limit, offset| *limit == MAX_PAGE && *offset == 0)
            .returning(|_, _| Ok(vec![]));

        let resp = get(app(parts), "/images?limit=5000&offset=-3").await;
        assert_eq!(resp.status(), StatusCode::OK);
        assert_eq!(&body(resp).await[..], b"[]");
    }

    #[tokio::test]
    async fn unposted_wraps_count() {
        let mut parts = Parts::default();
        parts.gallery.expect_list_unposted().returning(|| Ok(vec![]));

        let resp = get(app(parts), "/unposted").await;
        let v: Value = serde_json::from_slice(&body(resp).await).unwrap();
        assert_eq!(v, json!({ "status": "success", "count": 0, "images": [] }));
    }

    #[tokio::test]
    async fn logs_builds_filter_from_query() {
        let mut parts = Parts::default();
        parts
            .logs
            .expect_list_logs()
            .withf(|f| {
                f.level == Some(LogLevel::Warning)
                    && f.source.as_deref() == Some("generator")
                    && f.since.map(|s| s.to_rfc3339()) == Some("2024-05-18T12:00:00+00:00".into())
                    && f.limit == 20
                    && f.offset == 40
            })
            .returning(|_| Ok(vec![]));

        let resp = get(app(parts), "/logs?level=warn&source=generator&days=2&limit=20&offset=40").await;
        assert_eq!(resp.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn logs_rejects_unknown_level() {
        let resp = get(app(Parts::default()), "/logs?level=loud").await;
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn logs_rejects_days_beyond_the_calendar() {
        for days in ["9223372036854775807", "1000000000"] {
            let resp = get(app(Parts::default()), &format!("/logs?days={days}")).await;
            assert_eq!(resp.status(), StatusCode::BAD_REQUEST, "days={days}");
        }
    }

    #[test]
    fn generate_request_overrides_defaults_field_by_field() {
        let req: GenerateRequest = serde_json::from_value(json!({ "quality": "hd" })).unwrap();
        let s = req.settings(ImageSettings::default());
        assert_eq!(s.size, ImageSize::Square);
        assert_eq!(s.quality, ImageQuality::Hd);
    }
}
