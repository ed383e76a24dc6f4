//! # Supabase storage
//! `BlobStorage` over the Supabase Storage REST API.

use std::time::Duration;

use anyhow::{bail, Context};
use async_trait::async_trait;
use bytes::Bytes;
use domains::ports::BlobStorage;
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION, CONTENT_TYPE};
use secrecy::{ExposeSecret, SecretString};

pub const DEFAULT_UPLOAD_TIMEOUT: Duration = Duration::from_secs(30);

pub struct SupabaseStorage {
    client: reqwest::Client,
    base_url: String,
    bucket: String,
}

impl SupabaseStorage {
    pub fn new(
        base_url: &str,
        api_key: &SecretString,
        bucket: impl Into<String>,
        timeout: Duration,
    ) -> anyhow::Result<Self> {
        let key = api_key.expose_secret();
        let mut auth = HeaderValue::from_str(&format!("Bearer {key}"))?;
        auth.set_sensitive(true);
        let mut apikey = HeaderValue::from_str(key)?;
        apikey.set_sensitive(true);

        let mut headers = HeaderMap::new();
        headers.insert(AUTHORIZATION, auth);
        headers.insert("apikey", apikey);

        let client = reqwest::Client::builder()
            .default_headers(headers)
            .timeout(timeout)
            .build()
            .context("building storage http client")?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            bucket: bucket.into(),
        })
    }

    fn object_url(&self, path: &str) -> String {
        format!(
            "{}/storage/v1/object/{}/{}",
            self.base_url,
            self.bucket,
            path.trim_start_matches('/')
        )
    }
}

#[async_trait]
impl BlobStorage for SupabaseStorage {
    async fn upload(&self, path: &str, data: Bytes, content_type: &str) -> anyhow::Result<()> {
        let resp = self
            .client
            .post(self.object_url(path))
            .header(CONTENT_TYPE, content_type)
            .header("x-upsert", "true")
            .body(data)
            .send()
            .await
            .with_context(|| format!("uploading {path}"))?;

        if !resp.status().is_success() {
            let status = resp.status();
            let text = resp.text().await.unwrap_or_default();
            bail!("storage upload failed ({status}): {text}");
        }
        Ok(())
    }

    fn public_url(&self, path: &str) -> String {
        format!(
            "{}/storage/v1/object/public/{}/{}",
            self.base_url,
            self.bucket,
            path.trim_start_matches('/')
        )
    }
}
