//! # Image Resolver
//!
//! Turns an [`ImageRecord`] into something a browser can display. Locators are
//! tried in a fixed order and every failure degrades to the next one, ending at
//! the placeholder asset. `resolve` never returns an error.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use domains::models::ImageRecord;
use domains::ports::RemoteFetcher;

/// Outcome of resolving an image.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Resolved {
    /// Send the client to durable storage.
    Redirect(String),
    /// Serve these bytes directly.
    Bytes { content_type: String, body: Bytes },
    /// Nothing resolved; serve the fallback asset.
    Placeholder(Bytes),
}

pub struct ImageResolver {
    fetcher: Arc<dyn RemoteFetcher>,
    placeholder: Bytes,
    fetch_timeout: Duration,
}

impl ImageResolver {
    pub fn new(fetcher: Arc<dyn RemoteFetcher>, placeholder: Bytes, fetch_timeout: Duration) -> Self {
        Self {
            fetcher,
            placeholder,
            fetch_timeout,
        }
    }

    pub fn placeholder(&self) -> Resolved {
        Resolved::Placeholder(self.placeholder.clone())
    }

    pub async fn resolve(&self, record: &ImageRecord) -> Resolved {
        let loc = &record.locators;

        // 1. Storage is authoritative once both fields are set.
        if let (Some(_), Some(permanent_url)) = (&loc.storage_path, &loc.permanent_url) {
            return Resolved::Redirect(permanent_url.clone());
        }

        // 2. Cached copy on this node.
        if let Some(local_path) = &loc.local_path {
            match read_local(local_path).await {
                Some(body) => {
                    return Resolved::Bytes {
                        content_type: mime::IMAGE_PNG.to_string(),
                        body,
                    }
                }
                None => tracing::debug!(image_id = %record.id, %local_path, "local copy unavailable"),
            }
        }

        // 3. Generator URL (these expire, so failure is common).
        if let Some(origin_url) = &loc.origin_url {
            if let Some(resolved) = self.fetch_remote(record, origin_url).await {
                return resolved;
            }
        }

        // 4. Generic URL, unless it is just the permanent URL again.
        if let Some(image_url) = &loc.image_url {
            if loc.permanent_url.as_deref() != Some(image_url.as_str()) {
                if let Some(resolved) = self.fetch_remote(record, image_url).await {
                    return resolved;
                }
            }
        }

        tracing::info!(image_id = %record.id, "no locator resolved, serving placeholder");
        self.placeholder()
    }

    async fn fetch_remote(&self, record: &ImageRecord, url: &str) -> Option<Resolved> {
        match self.fetcher.fetch(url, self.fetch_timeout).await {
            Ok(fetched) if fetched.status == 200 => Some(Resolved::Bytes {
                content_type: fetched
                    .content_type
                    .unwrap_or_else(|| mime::IMAGE_PNG.to_string()),
                body: fetched.body,
            }),
            Ok(fetched) => {
                tracing::warn!(image_id = %record.id, %url, status = fetched.status, "remote image fetch returned non-200");
                None
            }
            Err(e) => {
                tracing::warn!(image_id = %record.id, %url, error = %e, "remote image fetch failed");
                None
            }
        }
    }
}

async fn read_local(path: &str) -> Option<Bytes> {
    if !Path::new(path).is_file() {
        return None;
    }
    tokio::fs::read(path).await.ok().map(Bytes::from)
}
