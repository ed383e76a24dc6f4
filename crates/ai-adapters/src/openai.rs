//! # OpenAI adapter
//! Chat completions for prompt writing and DALL·E for images.
//! The generator hands back a short-lived URL; the bytes are downloaded
//! immediately so the caller can persist them.

use std::time::Duration;

use anyhow::{bail, Context};
use async_trait::async_trait;
use bytes::Bytes;
use domains::models::{GeneratedImage, ImageSettings};
use domains::ports::{ImageGenerator, PromptGenerator};
use reqwest::header::CONTENT_TYPE;
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use serde_json::json;

pub const DEFAULT_API_BASE: &str = "https://api.openai.com/v1";
pub const DEFAULT_CHAT_MODEL: &str = "gpt-4";
pub const DEFAULT_IMAGE_MODEL: &str = "dall-e-3";

const USER_INSTRUCTION: &str = "Generate a new prompt for a visual artwork.";
const TEMPERATURE: f32 = 0.8;
const MAX_TOKENS: u32 = 150;

#[derive(Debug, Clone)]
pub struct OpenAiConfig {
    pub api_base: String,
    pub api_key: SecretString,
    pub chat_model: String,
    pub image_model: String,
    pub timeout: Duration,
}

impl OpenAiConfig {
    pub fn new(api_key: SecretString) -> Self {
        Self {
            api_base: DEFAULT_API_BASE.to_string(),
            api_key,
            chat_model: DEFAULT_CHAT_MODEL.to_string(),
            image_model: DEFAULT_IMAGE_MODEL.to_string(),
            timeout: Duration::from_secs(120),
        }
    }
}

#[derive(Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: [ChatMessage<'a>; 2],
    temperature: f32,
    max_tokens: u32,
}

#[derive(Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<ChatChoice>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChatReply,
}

#[derive(Deserialize)]
struct ChatReply {
    #[serde(default)]
    content: Option<String>,
}

#[derive(Serialize)]
struct ImageRequest<'a> {
    model: &'a str,
    prompt: &'a str,
    size: &'a str,
    quality: &'a str,
    n: u8,
}

#[derive(Deserialize)]
struct ImageResponse {
    #[serde(default)]
    data: Vec<ImageItem>,
}

#[derive(Deserialize)]
struct ImageItem {
    url: Option<String>,
}

pub struct OpenAiClient {
    http: reqwest::Client,
    config: OpenAiConfig,
}

impl OpenAiClient {
    pub fn new(mut config: OpenAiConfig) -> anyhow::Result<Self> {
        config.api_base = config.api_base.trim().trim_end_matches('/').to_string();
        let http = reqwest::Client::builder()
            .timeout(config.timeout)
            .build()
            .context("building OpenAI http client")?;
        Ok(Self { http, config })
    }

    async fn post_json<B: Serialize + ?Sized, R: for<'de> Deserialize<'de>>(
        &self,
        path: &str,
        body: &B,
    ) -> anyhow::Result<R> {
        let endpoint = format!("{}{}", self.config.api_base, path);
        let response = self
            .http
            .post(&endpoint)
            .bearer_auth(self.config.api_key.expose_secret())
            .json(body)
            .send()
            .await
            .with_context(|| format!("OpenAI request failed ({endpoint})"))?;

        if !response.status().is_success() {
            let code = response.status().as_u16();
            let text = response.text().await.unwrap_or_default();
            bail!("OpenAI request failed ({code}): {}", truncate(&text, 512));
        }
        response
            .json::<R>()
            .await
            .with_context(|| format!("decoding OpenAI response ({endpoint})"))
    }

    async fn download_image(&self, url: &str) -> anyhow::Result<(Bytes, mime::Mime)> {
        let response = self
            .http
            .get(url)
            .send()
            .await
            .with_context(|| format!("failed downloading generated image ({url})"))?;
        if !response.status().is_success() {
            let code = response.status().as_u16();
            bail!("generated image download failed ({code})");
        }
        let content_type = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|value| value.to_str().ok())
            .and_then(|value| value.parse::<mime::Mime>().ok())
            .unwrap_or(mime::IMAGE_PNG);
        let bytes = response
            .bytes()
            .await
            .context("failed reading generated image bytes")?;
        Ok((bytes, content_type))
    }
}

fn truncate(text: &str, max: usize) -> &str {
    match text.char_indices().nth(max) {
        Some((idx, _)) => &text[..idx],
        None => text,
    }
}

#[async_trait]
impl PromptGenerator for OpenAiClient {
    async fn generate_prompt(&self, system_prompt: &str) -> anyhow::Result<String> {
        let request = ChatRequest {
            model: &self.config.chat_model,
            messages: [
                ChatMessage { role: "system", content: system_prompt },
                ChatMessage { role: "user", content: USER_INSTRUCTION },
            ],
            temperature: TEMPERATURE,
            max_tokens: MAX_TOKENS,
        };
        let response: ChatResponse = self.post_json("/chat/completions", &request).await?;

        let text = response
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .map(|content| content.trim().to_string())
            .unwrap_or_default();
        if text.is_empty() {
            bail!("OpenAI returned an empty prompt");
        }
        tracing::debug!(model = %self.config.chat_model, chars = text.len(), "prompt generated");
        Ok(text)
    }
}

#[async_trait]
impl ImageGenerator for OpenAiClient {
    async fn generate_image(
        &self,
        prompt: &str,
        settings: ImageSettings,
    ) -> anyhow::Result<GeneratedImage> {
        let request = ImageRequest {
            model: &self.config.image_model,
            prompt,
            size: settings.size.as_str(),
            quality: settings.quality.as_str(),
            n: 1,
        };
        let response: ImageResponse = self.post_json("/images/generations", &request).await?;

        let Some(origin_url) = response.data.into_iter().find_map(|item| item.url) else {
            bail!("OpenAI response returned no images");
        };
        let (bytes, content_type) = self.download_image(&origin_url).await?;
        tracing::info!(
            model = %self.config.image_model,
            size = settings.size.as_str(),
            bytes = bytes.len(),
            "image generated"
        );

        Ok(GeneratedImage {
            bytes,
            content_type,
            origin_url,
            settings: json!({
                "model": self.config.image_model,
                "size": settings.size.as_str(),
                "quality": settings.quality.as_str(),
            }),
            model: self.config.image_model.clone(),
        })
    }
}

#[cfg(test)]
mod tests {
    use std::sync::{Arc, Mutex};

    use axum::extract::State;
    use axum::http::{header, HeaderMap, StatusCode};
    use axum::response::IntoResponse;
    use axum::routing::{get, post};
    use axum::{Json, Router};
    use domains::models::{ImageQuality, ImageSize};
    use serde_json::Value;

    use super::*;

    #[derive(Clone, Default)]
    struct Fake {
        base: Arc<Mutex<String>>,
        bodies: Arc<Mutex<Vec<Value>>>,
        auth: Arc<Mutex<Option<String>>>,
    }

    async fn chat(State(fake): State<Fake>, headers: HeaderMap, Json(body): Json<Value>) -> Json<Value> {
        *fake.auth.lock().unwrap() = headers
            .get(header::AUTHORIZATION)
            .and_then(|v| v.to_str().ok())
            .map(String::from);
        fake.bodies.lock().unwrap().push(body);
        Json(json!({ "choices": [{ "message": { "content": "  a clockwork whale over Paris \n" } }] }))
    }

    async fn images(State(fake): State<Fake>, Json(body): Json<Value>) -> Json<Value> {
        fake.bodies.lock().unwrap().push(body);
        let base = fake.base.lock().unwrap().clone();
        Json(json!({ "data": [{ "url": format!("{base}/files/img.png") }] }))
    }

    async fn file() -> impl IntoResponse {
        ([(header::CONTENT_TYPE, "image/png")], b"\x89PNGfake".to_vec())
    }

    async fn serve(app_status: StatusCode) -> (OpenAiClient, Fake) {
        let fake = Fake::default();
        let mut app = Router::new().route("/files/img.png", get(file));
        if app_status.is_success() {
            app = app
                .route("/v1/chat/completions", post(chat))
                .route("/v1/images/generations", post(images));
        } else {
            app = app
                .route("/v1/chat/completions", post(move || async move { (app_status, "nope") }))
                .route("/v1/images/generations", post(move || async move { (app_status, "nope") }));
        }
        let app = app.with_state(fake.clone());

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        *fake.base.lock().unwrap() = format!("http://{addr}");
        tokio::spawn(async move { axum::serve(listener, app).await.unwrap() });

        let mut config = OpenAiConfig::new(SecretString::from("sk-test"));
        config.api_base = format!("http://{addr}/v1/");
        (OpenAiClient::new(config).unwrap(), fake)
    }

    #[tokio::test]
    async fn test_prompt_uses_chat_parameters_and_trims() {
        let (client, fake) = serve(StatusCode::OK).await;

        let prompt = client
            .generate_prompt("You are Marvin.")
            .await
            .unwrap();

        assert_eq!(prompt, "a clockwork whale over Paris");
        assert_eq!(fake.auth.lock().unwrap().as_deref(), Some("Bearer sk-test"));
        let body = fake.bodies.lock().unwrap()[0].clone();
        assert_eq!(body["model"], "gpt-4");
        assert_eq!(body["max_tokens"], 150);
        assert!((body["temperature"].as_f64().unwrap() - 0.8).abs() < 1e-6);
        assert_eq!(body["messages"][0]["role"], "system");
        assert_eq!(body["messages"][0]["content"], "You are Marvin.");
        assert_eq!(body["messages"][1]["content"], USER_INSTRUCTION);
    }

    #[tokio::test]
    async fn test_image_downloads_generated_url() {
        let (client, fake) = serve(StatusCode::OK).await;
        let settings = ImageSettings { size: ImageSize::Landscape, quality: ImageQuality::Hd };

        let image = client.generate_image("a whale", settings).await.unwrap();

        assert_eq!(&image.bytes[..], b"\x89PNGfake");
        assert_eq!(image.content_type, mime::IMAGE_PNG);
        assert!(image.origin_url.ends_with("/files/img.png"));
        assert_eq!(image.model, "dall-e-3");
        assert_eq!(image.settings["size"], "1792x1024");
        assert_eq!(image.settings["quality"], "hd");

        let body = fake.bodies.lock().unwrap()[0].clone();
        assert_eq!(body["n"], 1);
        assert_eq!(body["prompt"], "a whale");
    }

    #[tokio::test]
    async fn test_http_errors_are_reported() {
        let (client, _) = serve(StatusCode::TOO_MANY_REQUESTS).await;

        let err = client
            .generate_prompt("sys")
            .await
            .unwrap_err();
        assert!(err.to_string().contains("429"));
        assert!(client.generate_image("x", ImageSettings::default()).await.is_err());
    }

    #[test]
    fn test_truncate_respects_char_boundaries() {
        assert_eq!(truncate("héllo", 2), "hé");
        assert_eq!(truncate("ok", 10), "ok");
    }
}
