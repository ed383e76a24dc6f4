//! # SQLite repositories
//!
//! This module implements the data mapping between the SQLite relational model
//! and the `domains` models. One [`SqliteStore`] backs every repository port.
//!
//! Timestamps are stored as fixed-width RFC 3339 text (microseconds, `Z`) so
//! that range filters can compare them lexically.

use std::str::FromStr;

use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use domains::models::{
    Character, CharacterContent, Feedback, GenerationType, ImageLocators, ImageRecord,
    ImageWithPrompt, LogEntry, LogFilter, LogLevel, PromptRecord,
};
use domains::ports::{CharacterRepo, FeedbackRepo, GalleryRepo, LogRepo};
use sqlx::migrate::Migrator;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions, SqliteRow};
use sqlx::{QueryBuilder, Row, Sqlite};
use uuid::Uuid;

static MIGRATOR: Migrator = sqlx::migrate!("./migrations");

const IMAGE_COLUMNS: &str = "i.id, i.prompt_id, i.storage_path, i.permanent_url, i.local_path, \
     i.origin_url, i.image_url, i.generation_type, i.api_used, i.settings, i.created_at";

const PROMPT_JOIN_COLUMNS: &str = "p.id AS p_id, p.text AS p_text, \
     p.character_id AS p_character_id, p.created_at AS p_created_at";

pub struct SqliteStore {
    pool: SqlitePool,
}

// Helpers for timestamp conversion
fn ts_to_text(ts: DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn text_to_ts(text: &str) -> anyhow::Result<DateTime<Utc>> {
    Ok(DateTime::parse_from_rfc3339(text)?.with_timezone(&Utc))
}

fn json_column(row: &SqliteRow, column: &str) -> anyhow::Result<serde_json::Value> {
    let raw: String = row.try_get(column)?;
    Ok(serde_json::from_str(&raw).unwrap_or_default())
}

impl SqliteStore {
    /// Opens (creating if needed) the database at `url` and applies migrations.
    pub async fn connect(url: &str) -> anyhow::Result<Self> {
        let options = SqliteConnectOptions::from_str(url)?
            .create_if_missing(true)
            .foreign_keys(true);

        // An in-memory database lives and dies with its single connection.
        let in_memory = url.contains(":memory:");
        if !in_memory {
            if let Some(parent) = options.get_filename().parent() {
                if !parent.as_os_str().is_empty() {
                    tokio::fs::create_dir_all(parent).await?;
                }
            }
        }
        let pool = SqlitePoolOptions::new()
            .max_connections(if in_memory { 1 } else { 5 })
            .idle_timeout(if in_memory { None } else { Some(std::time::Duration::from_secs(600)) })
            .max_lifetime(if in_memory { None } else { Some(std::time::Duration::from_secs(1800)) })
            .connect_with(options)
            .await?;

        MIGRATOR.run(&pool).await?;
        tracing::info!(%url, "sqlite store ready");
        Ok(Self { pool })
    }

    fn image_from_row(row: &SqliteRow) -> anyhow::Result<ImageRecord> {
        let generation_type: String = row.try_get("generation_type")?;
        Ok(ImageRecord {
            id: row.try_get("id")?,
            prompt_id: row.try_get("prompt_id")?,
            locators: ImageLocators {
                storage_path: row.try_get("storage_path")?,
                permanent_url: row.try_get("permanent_url")?,
                local_path: row.try_get("local_path")?,
                origin_url: row.try_get("origin_url")?,
                image_url: row.try_get("image_url")?,
            },
            generation_type: GenerationType::from_str(&generation_type)?,
            api_used: row.try_get("api_used")?,
            settings: json_column(row, "settings")?,
            created_at: text_to_ts(&row.try_get::<String, _>("created_at")?)?,
        })
    }

    fn joined_from_row(row: &SqliteRow) -> anyhow::Result<ImageWithPrompt> {
        let image = Self::image_from_row(row)?;
        let prompts = match row.try_get::<Option<Uuid>, _>("p_id")? {
            Some(id) => Some(PromptRecord {
                id,
                text: row.try_get("p_text")?,
                character_id: row.try_get("p_character_id")?,
                created_at: text_to_ts(&row.try_get::<String, _>("p_created_at")?)?,
            }),
            None => None,
        };
        Ok(ImageWithPrompt { image, prompts })
    }

    fn log_from_row(row: &SqliteRow) -> anyhow::Result<LogEntry> {
        let level: String = row.try_get("level")?;
        Ok(LogEntry {
            id: row.try_get("id")?,
            level: LogLevel::from_str(&level)?,
            source: row.try_get("source")?,
            message: row.try_get("message")?,
            metadata: json_column(row, "metadata")?,
            created_at: text_to_ts(&row.try_get::<String, _>("created_at")?)?,
        })
    }
}

#[async_trait]
impl CharacterRepo for SqliteStore {
    async fn get_character(&self, id: Uuid) -> anyhow::Result<Option<Character>> {
        let row = sqlx::query(
            "SELECT id, agent_name, display_name, content, version, is_active, created_at, updated_at \
             FROM character_files WHERE id = ?",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        let Some(row) = row else {
            return Ok(None);
        };
        let content: String = row.try_get("content")?;
        Ok(Some(Character {
            id: row.try_get("id")?,
            agent_name: row.try_get("agent_name")?,
            display_name: row.try_get("display_name")?,
            content: serde_json::from_str::<CharacterContent>(&content)?,
            version: row.try_get("version")?,
            is_active: row.try_get("is_active")?,
            created_at: text_to_ts(&row.try_get::<String, _>("created_at")?)?,
            updated_at: text_to_ts(&row.try_get::<String, _>("updated_at")?)?,
        }))
    }

    async fn insert_character(&self, character: Character) -> anyhow::Result<()> {
        sqlx::query(
            "INSERT INTO character_files (id, agent_name, display_name, content, version, is_active, created_at, updated_at) \
             VALUES (?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(character.id)
        .bind(character.agent_name)
        .bind(character.display_name)
        .bind(serde_json::to_string(&character.content)?)
        .bind(character.version)
        .bind(character.is_active)
        .bind(ts_to_text(character.created_at))
        .bind(ts_to_text(character.updated_at))
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}

#[async_trait]
impl GalleryRepo for SqliteStore {
    async fn insert_prompt(&self, prompt: PromptRecord) -> anyhow::Result<()> {
        sqlx::query("INSERT INTO prompts (id, text, character_id, created_at) VALUES (?, ?, ?, ?)")
            .bind(prompt.id)
            .bind(prompt.text)
            .bind(prompt.character_id)
            .bind(ts_to_text(prompt.created_at))
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn insert_image(&self, image: ImageRecord) -> anyhow::Result<()> {
        let loc = image.locators;
        sqlx::query(
            "INSERT INTO images (id, prompt_id, storage_path, permanent_url, local_path, origin_url, image_url, \
             generation_type, api_used, settings, created_at) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(image.id)
        .bind(image.prompt_id)
        .bind(loc.storage_path)
        .bind(loc.permanent_url)
        .bind(loc.local_path)
        .bind(loc.origin_url)
        .bind(loc.image_url)
        .bind(image.generation_type.as_str())
        .bind(image.api_used)
        .bind(serde_json::to_string(&image.settings)?)
        .bind(ts_to_text(image.created_at))
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn get_image(&self, id: Uuid) -> anyhow::Result<Option<ImageRecord>> {
        let row = sqlx::query(&format!("SELECT {IMAGE_COLUMNS} FROM images i WHERE i.id = ?"))
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(Self::image_from_row).transpose()
    }

    async fn count_images(
        &self,
        kind: GenerationType,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> anyhow::Result<i64> {
        let count = sqlx::query_scalar::<_, i64>(
            "SELECT COUNT(*) FROM images WHERE generation_type = ? AND created_at >= ? AND created_at < ?",
        )
        .bind(kind.as_str())
        .bind(ts_to_text(from))
        .bind(ts_to_text(to))
        .fetch_one(&self.pool)
        .await?;
        Ok(count)
    }

    async fn list_images(&self, limit: i64, offset: i64) -> anyhow::Result<Vec<ImageWithPrompt>> {
        let rows = sqlx::query(&format!(
            "SELECT {IMAGE_COLUMNS}, {PROMPT_JOIN_COLUMNS} FROM images i \
             LEFT JOIN prompts p ON p.id = i.prompt_id \
             ORDER BY i.created_at DESC LIMIT ? OFFSET ?"
        ))
        .bind(limit)
        .bind(offset)
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(Self::joined_from_row).collect()
    }

    async fn list_unposted(&self) -> anyhow::Result<Vec<ImageWithPrompt>> {
        let rows = sqlx::query(&format!(
            "SELECT {IMAGE_COLUMNS}, {PROMPT_JOIN_COLUMNS} FROM images i \
             LEFT JOIN prompts p ON p.id = i.prompt_id \
             WHERE NOT EXISTS (SELECT 1 FROM feedback f WHERE f.image_id = i.id) \
             ORDER BY i.created_at DESC"
        ))
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(Self::joined_from_row).collect()
    }
}

#[async_trait]
impl LogRepo for SqliteStore {
    async fn insert_log(&self, entry: LogEntry) -> anyhow::Result<()> {
        sqlx::query(
            "INSERT INTO logs (id, level, source, message, metadata, created_at) VALUES (?, ?, ?, ?, ?, ?)",
        )
        .bind(entry.id)
        .bind(entry.level.as_str())
        .bind(entry.source)
        .bind(entry.message)
        .bind(serde_json::to_string(&entry.metadata)?)
        .bind(ts_to_text(entry.created_at))
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn list_logs(&self, filter: LogFilter) -> anyhow::Result<Vec<LogEntry>> {
        let mut qb: QueryBuilder<Sqlite> = QueryBuilder::new(
            "SELECT id, level, source, message, metadata, created_at FROM logs WHERE 1 = 1",
        );
        if let Some(level) = filter.level {
            qb.push(" AND level = ").push_bind(level.as_str());
        }
        if let Some(source) = filter.source {
            qb.push(" AND source = ").push_bind(source);
        }
        if let Some(since) = filter.since {
            qb.push(" AND created_at >= ").push_bind(ts_to_text(since));
        }
        qb.push(" ORDER BY created_at DESC LIMIT ")
            .push_bind(filter.limit)
            .push(" OFFSET ")
            .push_bind(filter.offset);

        let rows = qb.build().fetch_all(&self.pool).await?;
        rows.iter().map(Self::log_from_row).collect()
    }

    async fn delete_logs_before(&self, cutoff: DateTime<Utc>) -> anyhow::Result<u64> {
        let result = sqlx::query("DELETE FROM logs WHERE created_at < ?")
            .bind(ts_to_text(cutoff))
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }
}

#[async_trait]
impl FeedbackRepo for SqliteStore {
    async fn insert_feedback(&self, feedback: Feedback) -> anyhow::Result<()> {
        sqlx::query(
            "INSERT INTO feedback (id, image_id, platform, status, posted_at, created_at) VALUES (?, ?, ?, ?, ?, ?)",
        )
        .bind(feedback.id)
        .bind(feedback.image_id)
        .bind(feedback.platform)
        .bind(feedback.status)
        .bind(ts_to_text(feedback.posted_at))
        .bind(ts_to_text(feedback.created_at))
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn count_feedback_since(&self, since: DateTime<Utc>) -> anyhow::Result<i64> {
        let count = sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM feedback WHERE created_at >= ?")
            .bind(ts_to_text(since))
            .fetch_one(&self.pool)
            .await?;
        Ok(count)
    }
}
