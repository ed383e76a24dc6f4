//! # Domain Models
//!
//! These structs represent the core entities of Marvin Art.
//! Rows use UUID v7 for time-ordered, globally unique identification.

use std::fmt;
use std::str::FromStr;

use bytes::Bytes;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::errors::AppError;

/// Who asked for a generation run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GenerationType {
    /// Fired by the scheduler; subject to the quota/window gate.
    Auto,
    /// Explicit operator action; never throttled.
    Manual,
}

impl GenerationType {
    pub fn as_str(&self) -> &'static str {
        match self {
            GenerationType::Auto => "auto",
            GenerationType::Manual => "manual",
        }
    }
}

impl fmt::Display for GenerationType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for GenerationType {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "auto" => Ok(GenerationType::Auto),
            "manual" => Ok(GenerationType::Manual),
            other => Err(AppError::ValidationError(format!(
                "unknown generation type '{other}'"
            ))),
        }
    }
}

/// Output sizes accepted by DALL·E 3.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ImageSize {
    #[default]
    #[serde(rename = "1024x1024")]
    Square,
    #[serde(rename = "1024x1792")]
    Portrait,
    #[serde(rename = "1792x1024")]
    Landscape,
}

impl ImageSize {
    pub fn as_str(&self) -> &'static str {
        match self {
            ImageSize::Square => "1024x1024",
            ImageSize::Portrait => "1024x1792",
            ImageSize::Landscape => "1792x1024",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ImageQuality {
    #[default]
    Standard,
    Hd,
}

impl ImageQuality {
    pub fn as_str(&self) -> &'static str {
        match self {
            ImageQuality::Standard => "standard",
            ImageQuality::Hd => "hd",
        }
    }
}

/// Knobs passed through to the image generator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ImageSettings {
    #[serde(default)]
    pub size: ImageSize,
    #[serde(default)]
    pub quality: ImageQuality,
}

/// Every stored pointer to an image's bytes. Any subset may be present.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImageLocators {
    /// Object key inside the storage bucket.
    pub storage_path: Option<String>,
    /// Public URL of `storage_path`.
    pub permanent_url: Option<String>,
    /// Cached copy on the serving node.
    pub local_path: Option<String>,
    /// URL handed back by the image generator (expires).
    pub origin_url: Option<String>,
    /// Generic reference URL shown by the gallery.
    pub image_url: Option<String>,
}

/// A generated image. Immutable once written.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImageRecord {
    pub id: Uuid,
    pub prompt_id: Uuid,
    #[serde(flatten)]
    pub locators: ImageLocators,
    pub generation_type: GenerationType,
    /// Model that produced the image (e.g. "dall-e-3").
    pub api_used: String,
    pub settings: serde_json::Value,
    pub created_at: DateTime<Utc>,
}

/// The text that produced an image. Always written before its image.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PromptRecord {
    pub id: Uuid,
    pub text: String,
    pub character_id: Uuid,
    pub created_at: DateTime<Utc>,
}

/// Gallery row: an image joined with the prompt that produced it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ImageWithPrompt {
    #[serde(flatten)]
    pub image: ImageRecord,
    /// Named after the joined table so the UI can read `image.prompts.text`.
    pub prompts: Option<PromptRecord>,
}

/// Stylistic traits of a character.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CharacterStyle {
    #[serde(default)]
    pub all: Vec<String>,
    #[serde(default)]
    pub chat: Vec<String>,
    #[serde(default)]
    pub post: Vec<String>,
}

/// The persona document used to build system prompts.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CharacterContent {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub bio: Vec<String>,
    #[serde(default)]
    pub lore: Vec<String>,
    #[serde(default)]
    pub style: CharacterStyle,
    #[serde(default)]
    pub topics: Vec<String>,
    #[serde(default)]
    pub adjectives: Vec<String>,
    /// Anything else the document carries (post examples, plugin settings...).
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Character {
    pub id: Uuid,
    pub agent_name: String,
    pub display_name: String,
    pub content: CharacterContent,
    pub version: i64,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Severity of an activity-log row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Debug,
    Info,
    Warning,
    Error,
}

impl LogLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            LogLevel::Debug => "debug",
            LogLevel::Info => "info",
            LogLevel::Warning => "warning",
            LogLevel::Error => "error",
        }
    }
}

impl FromStr for LogLevel {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "debug" => Ok(LogLevel::Debug),
            "info" => Ok(LogLevel::Info),
            "warning" | "warn" => Ok(LogLevel::Warning),
            "error" => Ok(LogLevel::Error),
            other => Err(AppError::ValidationError(format!("unknown log level '{other}'"))),
        }
    }
}

/// A row of the `logs` table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogEntry {
    pub id: Uuid,
    pub level: LogLevel,
    /// Component that wrote the row (generator, resolver, scheduler, social).
    pub source: String,
    pub message: String,
    pub metadata: serde_json::Value,
    pub created_at: DateTime<Utc>,
}

impl LogEntry {
    pub fn new(level: LogLevel, source: &str, message: impl Into<String>) -> Self {
        Self {
            id: Uuid::now_v7(),
            level,
            source: source.to_string(),
            message: message.into(),
            metadata: serde_json::json!({}),
            created_at: Utc::now(),
        }
    }

    pub fn with_metadata(mut self, metadata: serde_json::Value) -> Self {
        self.metadata = metadata;
        self
    }
}

/// Query parameters for listing log rows. `since` bounds `created_at` from below.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LogFilter {
    pub level: Option<LogLevel>,
    pub source: Option<String>,
    pub since: Option<DateTime<Utc>>,
    pub limit: i64,
    pub offset: i64,
}

/// One post of an image to a social platform.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Feedback {
    pub id: Uuid,
    pub image_id: Uuid,
    pub platform: String,
    pub status: String,
    pub posted_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
}

/// What the image generator hands back.
#[derive(Debug, Clone)]
pub struct GeneratedImage {
    pub bytes: Bytes,
    pub content_type: mime::Mime,
    /// Where the generator is serving the image (short-lived).
    pub origin_url: String,
    /// Model and request parameters, stored verbatim on the image row.
    pub settings: serde_json::Value,
    pub model: String,
}

/// A remote image fetched by URL.
#[derive(Debug, Clone)]
pub struct FetchedImage {
    pub status: u16,
    pub content_type: Option<String>,
    pub body: Bytes,
}
