//! # Social Agent
//!
//! Picks unposted images and announces them, at most `max_posts_per_day` times
//! per local day. An image counts as posted once a feedback row references it.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use domains::errors::{AppError, Result};
use domains::models::{Feedback, ImageRecord, ImageWithPrompt};
use domains::ports::{Clock, FeedbackRepo, GalleryRepo, LogRepo, SocialPublisher};
use rand::seq::IndexedRandom;
use serde::Serialize;
use serde_json::json;
use uuid::Uuid;

use crate::activity::ActivityLog;
use crate::clock::local_day_bounds;
use crate::scheduler::ScheduledTask;

#[derive(Debug, Clone, PartialEq)]
pub enum PostOutcome {
    Posted(Feedback),
    Skipped { reason: String },
}

#[derive(Debug, Clone, Serialize)]
pub struct SocialStats {
    pub posted_today: i64,
    pub unposted_count: usize,
    pub max_posts_per_day: u32,
    pub post_times: Vec<String>,
}

pub struct SocialAgent {
    gallery: Arc<dyn GalleryRepo>,
    feedback: Arc<dyn FeedbackRepo>,
    publisher: Arc<dyn SocialPublisher>,
    clock: Arc<dyn Clock>,
    max_posts_per_day: u32,
    post_times: Vec<String>,
    activity: ActivityLog,
}

impl SocialAgent {
    pub fn new(
        gallery: Arc<dyn GalleryRepo>,
        feedback: Arc<dyn FeedbackRepo>,
        logs: Arc<dyn LogRepo>,
        publisher: Arc<dyn SocialPublisher>,
        clock: Arc<dyn Clock>,
        max_posts_per_day: u32,
        post_times: Vec<String>,
    ) -> Self {
        Self {
            gallery,
            feedback,
            publisher,
            clock,
            max_posts_per_day,
            post_times,
            activity: ActivityLog::new(logs, "social"),
        }
    }

    pub async fn posted_today(&self) -> anyhow::Result<i64> {
        let (start, _) = local_day_bounds(&self.clock.now());
        self.feedback.count_feedback_since(start).await
    }

    pub async fn unposted(&self) -> anyhow::Result<Vec<ImageWithPrompt>> {
        self.gallery.list_unposted().await
    }

    async fn ensure_below_limit(&self) -> Result<()> {
        let posted = self.posted_today().await?;
        if posted >= i64::from(self.max_posts_per_day) {
            return Err(AppError::RateLimitExceeded(format!(
                "daily post limit reached ({posted}/{})",
                self.max_posts_per_day
            )));
        }
        Ok(())
    }

    /// Scheduled path: random unposted image, skipped at the limit or when
    /// nothing is left to post.
    pub async fn auto_post(&self) -> Result<PostOutcome> {
        match self.ensure_below_limit().await {
            Ok(()) => {}
            Err(AppError::RateLimitExceeded(reason)) => {
                self.activity.info(format!("auto post skipped: {reason}"), json!({})).await;
                return Ok(PostOutcome::Skipped { reason });
            }
            Err(e) => return Err(e),
        }

        let unposted = self.unposted().await?;
        let picked = {
            let mut rng = rand::rng();
            unposted.choose(&mut rng).map(|row| row.image.clone())
        };
        let Some(image) = picked else {
            let reason = "no unposted images available".to_string();
            self.activity.info(format!("auto post skipped: {reason}"), json!({})).await;
            return Ok(PostOutcome::Skipped { reason });
        };

        self.publish(&image).await.map(PostOutcome::Posted)
    }

    /// Operator path: post a specific image, still subject to the daily limit.
    pub async fn post_image(&self, image_id: Uuid) -> Result<Feedback> {
        self.ensure_below_limit().await?;
        let image = self
            .gallery
            .get_image(image_id)
            .await?
            .ok_or_else(|| AppError::NotFound("image".into(), image_id.to_string()))?;
        self.publish(&image).await
    }

    async fn publish(&self, image: &ImageRecord) -> Result<Feedback> {
        let platform = match self.publisher.publish(image).await {
            Ok(platform) => platform,
            Err(e) => {
                self.activity
                    .error(format!("failed to post image: {e:#}"), json!({ "image_id": image.id }))
                    .await;
                return Err(AppError::Internal(format!("failed to post image {}: {e:#}", image.id)));
            }
        };

        let now = self.clock.now().with_timezone(&Utc);
        let feedback = Feedback {
            id: Uuid::now_v7(),
            image_id: image.id,
            platform,
            status: "posted".into(),
            posted_at: now,
            created_at: now,
        };
        self.feedback.insert_feedback(feedback.clone()).await?;
        self.activity
            .info(
                format!("posted image {} to {}", image.id, feedback.platform),
                json!({ "image_id": image.id, "feedback_id": feedback.id }),
            )
            .await;
        Ok(feedback)
    }

    pub async fn stats(&self) -> Result<SocialStats> {
        Ok(SocialStats {
            posted_today: self.posted_today().await?,
            unposted_count: self.unposted().await?.len(),
            max_posts_per_day: self.max_posts_per_day,
            post_times: self.post_times.clone(),
        })
    }
}

/// Scheduler adapter for [`SocialAgent::auto_post`].
pub struct AutoPostTask(pub Arc<SocialAgent>);

#[async_trait]
impl ScheduledTask for AutoPostTask {
    fn name(&self) -> &str {
        "auto-post"
    }

    async fn run(&self) {
        match self.0.auto_post().await {
            Ok(PostOutcome::Posted(f)) => tracing::info!(image_id = %f.image_id, "auto post done"),
            Ok(PostOutcome::Skipped { reason }) => tracing::info!(%reason, "auto post skipped"),
            Err(e) => tracing::error!(error = %e, "auto post failed"),
        }
    }
}

/// Records the post without calling out to a network; the feedback row is the
/// only effect.
pub struct RecordOnlyPublisher {
    platform: String,
}

impl RecordOnlyPublisher {
    pub fn new(platform: impl Into<String>) -> Self {
        Self {
            platform: platform.into(),
        }
    }
}

#[async_trait]
impl SocialPublisher for RecordOnlyPublisher {
    async fn publish(&self, image: &ImageRecord) -> anyhow::Result<String> {
        tracing::info!(image_id = %image.id, platform = %self.platform, "posting image");
        Ok(self.platform.clone())
    }
}
