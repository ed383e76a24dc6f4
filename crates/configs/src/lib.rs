//! # configs
//!
//! Layered settings shared by both binaries.
//!
//! Sources, lowest precedence first:
//! 1. built-in defaults (the `Default` impls below)
//! 2. `config/default.toml` (optional)
//! 3. `config/{MARVIN_ENV}.toml` (optional, `MARVIN_ENV` defaults to "development")
//! 4. `MARVIN__SECTION__KEY` environment variables
//! 5. the bare `OPENAI_API_KEY`, `SUPABASE_URL`, `SUPABASE_KEY` and `DATABASE_URL` variables

pub mod telemetry;

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use domains::models::{ImageQuality, ImageSettings, ImageSize};
use secrecy::SecretString;
use serde::Deserialize;
use uuid::Uuid;

/// Persona seeded on first start.
pub const DEFAULT_CHARACTER_ID: Uuid = uuid::uuid!("af871ddd-febb-4454-9171-080450357b8c");

const LIST_KEYS: [&str; 2] = ["generation.times", "social.post_times"];

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to load configuration: {0}")]
    Load(#[from] config::ConfigError),
    #[error("invalid configuration: {0}")]
    Invalid(String),
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServerSettings {
    pub host: String,
    pub art_port: u16,
    pub social_port: u16,
    /// Empty means any origin.
    pub cors_origins: Vec<String>,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".into(),
            art_port: 8000,
            social_port: 8001,
            cors_origins: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct DatabaseSettings {
    pub url: String,
}

impl Default for DatabaseSettings {
    fn default() -> Self {
        Self { url: "sqlite://data/marvin.db".into() }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct OpenAiSettings {
    pub api_key: Option<SecretString>,
    pub api_base: String,
    pub chat_model: String,
    pub image_model: String,
    pub timeout_secs: u64,
}

impl Default for OpenAiSettings {
    fn default() -> Self {
        Self {
            api_key: None,
            api_base: "https://api.openai.com/v1".into(),
            chat_model: "gpt-4".into(),
            image_model: "dall-e-3".into(),
            timeout_secs: 120,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct StorageSettings {
    /// When both Supabase values are set uploads go to the bucket; otherwise to `local_root`.
    pub supabase_url: Option<String>,
    pub supabase_key: Option<SecretString>,
    pub bucket: String,
    pub upload_timeout_secs: u64,
    pub local_root: PathBuf,
    /// URL prefix under which `local_root` is served.
    pub local_url_prefix: String,
    /// Node-local image cache.
    pub cache_dir: PathBuf,
}

impl Default for StorageSettings {
    fn default() -> Self {
        Self {
            supabase_url: None,
            supabase_key: None,
            bucket: "images".into(),
            upload_timeout_secs: 30,
            local_root: PathBuf::from("data/bucket"),
            local_url_prefix: "/media".into(),
            cache_dir: PathBuf::from("data/images"),
        }
    }
}

impl StorageSettings {
    pub fn supabase(&self) -> Option<(&str, &SecretString)> {
        match (&self.supabase_url, &self.supabase_key) {
            (Some(url), Some(key)) if !url.trim().is_empty() => Some((url.as_str(), key)),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct GenerationSettings {
    pub character_id: Uuid,
    pub max_per_day: u32,
    pub window_start_hour: u32,
    pub window_end_hour: u32,
    pub size: ImageSize,
    pub quality: ImageQuality,
    /// Local times of day ("HH:MM") for automatic runs.
    pub times: Vec<String>,
}

impl Default for GenerationSettings {
    fn default() -> Self {
        Self {
            character_id: DEFAULT_CHARACTER_ID,
            max_per_day: 4,
            window_start_hour: 9,
            window_end_hour: 21,
            size: ImageSize::default(),
            quality: ImageQuality::default(),
            times: ["09:00", "12:00", "15:00", "18:00"].map(String::from).to_vec(),
        }
    }
}

impl GenerationSettings {
    pub fn image_settings(&self) -> ImageSettings {
        ImageSettings { size: self.size, quality: self.quality }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ResolverSettings {
    pub fetch_timeout_secs: u64,
    /// Rendered on the fly when absent or unreadable.
    pub placeholder_path: Option<PathBuf>,
}

impl Default for ResolverSettings {
    fn default() -> Self {
        Self {
            fetch_timeout_secs: 5,
            placeholder_path: Some(PathBuf::from("static/placeholder.png")),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SchedulerSettings {
    pub poll_interval_secs: u64,
    pub retention_time: String,
    pub log_retention_days: u32,
}

impl Default for SchedulerSettings {
    fn default() -> Self {
        Self {
            poll_interval_secs: 60,
            retention_time: "03:00".into(),
            log_retention_days: 7,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SocialSettings {
    pub max_posts_per_day: u32,
    pub post_times: Vec<String>,
    pub platform: String,
}

impl Default for SocialSettings {
    fn default() -> Self {
        Self {
            max_posts_per_day: 2,
            post_times: ["10:00", "19:00"].map(String::from).to_vec(),
            platform: "twitter".into(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct UiSettings {
    /// Holds `ui/` (the gallery page) and the shared static assets.
    pub static_dir: PathBuf,
}

impl Default for UiSettings {
    fn default() -> Self {
        Self { static_dir: PathBuf::from("static") }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct LogSettings {
    pub format: LogFormat,
    /// `EnvFilter` directive used when `RUST_LOG` is unset.
    pub filter: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub server: ServerSettings,
    pub database: DatabaseSettings,
    pub openai: OpenAiSettings,
    pub storage: StorageSettings,
    pub generation: GenerationSettings,
    pub resolver: ResolverSettings,
    pub scheduler: SchedulerSettings,
    pub social: SocialSettings,
    pub ui: UiSettings,
    pub log: LogSettings,
}

impl Settings {
    /// Loads `.env`, then every layer from the process environment and `./config`.
    pub fn load() -> Result<Self, ConfigError> {
        if let Err(err) = dotenvy::dotenv() {
            if !err.not_found() {
                return Err(ConfigError::Invalid(format!(".env: {err}")));
            }
        }
        let env_name = std::env::var("MARVIN_ENV").unwrap_or_else(|_| "development".into());
        Self::load_from(Path::new("config"), &env_name, None, |key| std::env::var(key).ok())
    }

    /// `env` replaces the process environment for the `MARVIN__*` layer when given;
    /// `legacy` resolves the bare variable names.
    pub fn load_from(
        config_dir: &Path,
        env_name: &str,
        env: Option<HashMap<String, String>>,
        legacy: impl Fn(&str) -> Option<String>,
    ) -> Result<Self, ConfigError> {
        let mut environment = config::Environment::with_prefix("MARVIN")
            .prefix_separator("__")
            .separator("__")
            .list_separator(",")
            .try_parsing(true)
            .source(env);
        for key in LIST_KEYS {
            environment = environment.with_list_parse_key(key);
        }

        let mut settings: Settings = config::Config::builder()
            .add_source(config::File::from(config_dir.join("default")).required(false))
            .add_source(config::File::from(config_dir.join(env_name)).required(false))
            .add_source(environment)
            .build()?
            .try_deserialize()?;

        settings.apply_legacy(legacy);
        settings.validate()?;
        tracing::debug!(env = env_name, "configuration loaded");
        Ok(settings)
    }

    fn apply_legacy(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        let lookup = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        if let Some(key) = lookup("OPENAI_API_KEY") {
            self.openai.api_key = Some(SecretString::from(key));
        }
        if let Some(url) = lookup("SUPABASE_URL") {
            self.storage.supabase_url = Some(url);
        }
        if let Some(key) = lookup("SUPABASE_KEY") {
            self.storage.supabase_key = Some(SecretString::from(key));
        }
        if let Some(url) = lookup("DATABASE_URL") {
            self.database.url = url;
        }
    }

    fn validate(&self) -> Result<(), ConfigError> {
        let g = &self.generation;
        if g.window_end_hour > 24 || g.window_start_hour >= g.window_end_hour {
            return Err(ConfigError::Invalid(format!(
                "generation window {}..{} is not a valid hour range",
                g.window_start_hour, g.window_end_hour
            )));
        }
        if self.scheduler.poll_interval_secs == 0 {
            return Err(ConfigError::Invalid("scheduler.poll_interval_secs must be > 0".into()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use secrecy::ExposeSecret;

    use super::*;

    fn no_legacy(_: &str) -> Option<String> {
        None
    }

    fn env(pairs: &[(&str, &str)]) -> Option<HashMap<String, String>> {
        Some(pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect())
    }

    #[test]
    fn test_defaults_without_files() {
        let dir = tempfile::tempdir().unwrap();
        let s = Settings::load_from(dir.path(), "development", env(&[]), no_legacy).unwrap();

        assert_eq!(s.server.art_port, 8000);
        assert_eq!(s.server.social_port, 8001);
        assert_eq!(s.generation.max_per_day, 4);
        assert_eq!((s.generation.window_start_hour, s.generation.window_end_hour), (9, 21));
        assert_eq!(s.generation.times, vec!["09:00", "12:00", "15:00", "18:00"]);
        assert_eq!(s.generation.character_id, DEFAULT_CHARACTER_ID);
        assert_eq!(s.resolver.fetch_timeout_secs, 5);
        assert_eq!(s.scheduler.log_retention_days, 7);
        assert_eq!(s.social.max_posts_per_day, 2);
        assert_eq!(s.log.format, LogFormat::Pretty);
        assert!(s.openai.api_key.is_none());
        assert!(s.storage.supabase().is_none());
    }

    #[test]
    fn test_files_then_env_layering() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join("default.toml"),
            "[generation]\nmax_per_day = 6\nwindow_start_hour = 8\n\n[social]\nplatform = \"mastodon\"\n",
        )
        .unwrap();
        std::fs::write(dir.path().join("production.toml"), "[generation]\nmax_per_day = 3\n").unwrap();

        let s = Settings::load_from(
            dir.path(),
            "production",
            env(&[
                ("MARVIN__SERVER__ART_PORT", "9000"),
                ("MARVIN__SOCIAL__POST_TIMES", "08:30,20:15"),
                ("MARVIN__LOG__FORMAT", "json"),
            ]),
            no_legacy,
        )
        .unwrap();

        assert_eq!(s.generation.max_per_day, 3);
        assert_eq!(s.generation.window_start_hour, 8);
        assert_eq!(s.social.platform, "mastodon");
        assert_eq!(s.server.art_port, 9000);
        assert_eq!(s.social.post_times, vec!["08:30", "20:15"]);
        assert_eq!(s.log.format, LogFormat::Json);
    }

    #[test]
    fn test_legacy_variables_override() {
        let dir = tempfile::tempdir().unwrap();
        let s = Settings::load_from(dir.path(), "development", env(&[]), |key| match key {
            "OPENAI_API_KEY" => Some("sk-live".into()),
            "SUPABASE_URL" => Some("https://proj.supabase.co".into()),
            "SUPABASE_KEY" => Some("service".into()),
            "DATABASE_URL" => Some("sqlite::memory:".into()),
            _ => None,
        })
        .unwrap();

        assert_eq!(s.openai.api_key.as_ref().map(|k| k.expose_secret()), Some("sk-live"));
        let (url, key) = s.storage.supabase().unwrap();
        assert_eq!(url, "https://proj.supabase.co");
        assert_eq!(key.expose_secret(), "service");
        assert_eq!(s.database.url, "sqlite::memory:");
    }

    #[test]
    fn test_rejects_inverted_window() {
        let dir = tempfile::tempdir().unwrap();
        let err = Settings::load_from(
            dir.path(),
            "development",
            env(&[
                ("MARVIN__GENERATION__WINDOW_START_HOUR", "22"),
                ("MARVIN__GENERATION__WINDOW_END_HOUR", "9"),
            ]),
            no_legacy,
        )
        .unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(_)));
    }
}
