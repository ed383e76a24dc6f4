//! # Core Traits (Ports)
//!
//! Any adapter must implement these traits to be wired into a binary.
//! Adapters report failures as `anyhow::Error`; services decide whether a
//! failure is fatal or degraded.

use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, FixedOffset, Utc};
use uuid::Uuid;

use crate::models::{
    Character, FetchedImage, Feedback, GeneratedImage, GenerationType,
    ImageRecord, ImageSettings, ImageWithPrompt, LogEntry, LogFilter, PromptRecord,
};

/// Persona documents.
#[cfg_attr(any(test, feature = "testing"), mockall::automock)]
#[async_trait]
pub trait CharacterRepo: Send + Sync {
    async fn get_character(&self, id: Uuid) -> anyhow::Result<Option<Character>>;
    async fn insert_character(&self, character: Character) -> anyhow::Result<()>;
}

/// Prompt and image rows.
#[cfg_attr(any(test, feature = "testing"), mockall::automock)]
#[async_trait]
pub trait GalleryRepo: Send + Sync {
    async fn insert_prompt(&self, prompt: PromptRecord) -> anyhow::Result<()>;
    async fn insert_image(&self, image: ImageRecord) -> anyhow::Result<()>;
    async fn get_image(&self, id: Uuid) -> anyhow::Result<Option<ImageRecord>>;

    /// Count of images of `kind` with `from <= created_at < to`.
    async fn count_images(
        &self,
        kind: GenerationType,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> anyhow::Result<i64>;

    /// Newest first.
    async fn list_images(&self, limit: i64, offset: i64) -> anyhow::Result<Vec<ImageWithPrompt>>;

    /// Images with no feedback row, newest first.
    async fn list_unposted(&self) -> anyhow::Result<Vec<ImageWithPrompt>>;
}

/// The `logs` table.
#[cfg_attr(any(test, feature = "testing"), mockall::automock)]
#[async_trait]
pub trait LogRepo: Send + Sync {
    async fn insert_log(&self, entry: LogEntry) -> anyhow::Result<()>;
    async fn list_logs(&self, filter: LogFilter) -> anyhow::Result<Vec<LogEntry>>;
    /// Deletes rows with `created_at < cutoff` and returns how many went.
    async fn delete_logs_before(&self, cutoff: DateTime<Utc>) -> anyhow::Result<u64>;
}

/// The `feedback` table (one row per social post).
#[cfg_attr(any(test, feature = "testing"), mockall::automock)]
#[async_trait]
pub trait FeedbackRepo: Send + Sync {
    async fn insert_feedback(&self, feedback: Feedback) -> anyhow::Result<()>;
    async fn count_feedback_since(&self, since: DateTime<Utc>) -> anyhow::Result<i64>;
}

/// Text model that writes image prompts in a character's voice.
#[cfg_attr(any(test, feature = "testing"), mockall::automock)]
#[async_trait]
pub trait PromptGenerator: Send + Sync {
    /// `system_prompt` already carries the character's voice.
    async fn generate_prompt(&self, system_prompt: &str) -> anyhow::Result<String>;
}

/// Image model.
#[cfg_attr(any(test, feature = "testing"), mockall::automock)]
#[async_trait]
pub trait ImageGenerator: Send + Sync {
    async fn generate_image(
        &self,
        prompt: &str,
        settings: ImageSettings,
    ) -> anyhow::Result<GeneratedImage>;
}

/// Durable object storage.
#[cfg_attr(any(test, feature = "testing"), mockall::automock)]
#[async_trait]
pub trait BlobStorage: Send + Sync {
    /// Uploads `data` under `path`.
    async fn upload(&self, path: &str, data: Bytes, content_type: &str) -> anyhow::Result<()>;
    /// Public URL for an uploaded `path`.
    fn public_url(&self, path: &str) -> String;
}

/// Node-local image cache.
#[cfg_attr(any(test, feature = "testing"), mockall::automock)]
#[async_trait]
pub trait MediaCache: Send + Sync {
    /// Writes `data` as `file_name` and returns the path it can be read back from.
    async fn save(&self, file_name: &str, data: Bytes) -> anyhow::Result<String>;
}

/// Bounded HTTP GET used by the resolver.
#[cfg_attr(any(test, feature = "testing"), mockall::automock)]
#[async_trait]
pub trait RemoteFetcher: Send + Sync {
    async fn fetch(&self, url: &str, timeout: Duration) -> anyhow::Result<FetchedImage>;
}

/// Where a chosen image gets announced.
#[cfg_attr(any(test, feature = "testing"), mockall::automock)]
#[async_trait]
pub trait SocialPublisher: Send + Sync {
    /// Publishes the image and returns the platform it went to.
    async fn publish(&self, image: &ImageRecord) -> anyhow::Result<String>;
}

/// Wall clock in the operator's local timezone.
#[cfg_attr(any(test, feature = "testing"), mockall::automock)]
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<FixedOffset>;
}
