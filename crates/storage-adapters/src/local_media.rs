//! # Local media
//! Filesystem implementations of `MediaCache` and `BlobStorage`.
//!
//! `LocalImageCache` is the per-node copy the resolver prefers over the network.
//! `LocalBlobStorage` stands in for the bucket when no object store is
//! configured; its files are served by the HTTP layer under `url_prefix`.

use std::path::{Component, Path, PathBuf};

use anyhow::{bail, Context};
use async_trait::async_trait;
use bytes::Bytes;
use domains::ports::{BlobStorage, MediaCache};
use tokio::fs;

/// Joins `rel` onto `root`, refusing anything that could escape it.
fn contained(root: &Path, rel: &str) -> anyhow::Result<PathBuf> {
    let rel_path = Path::new(rel);
    if rel.is_empty()
        || rel_path
            .components()
            .any(|c| !matches!(c, Component::Normal(_)))
    {
        bail!("refusing media path '{rel}'");
    }
    Ok(root.join(rel_path))
}

async fn write_file(target: &Path, data: &[u8]) -> anyhow::Result<()> {
    if let Some(parent) = target.parent() {
        fs::create_dir_all(parent)
            .await
            .with_context(|| format!("creating {}", parent.display()))?;
    }
    fs::write(target, data)
        .await
        .with_context(|| format!("writing {}", target.display()))?;
    Ok(())
}

pub struct LocalImageCache {
    /// Directory holding cached images (e.g. "./data/images")
    root_path: PathBuf,
}

impl LocalImageCache {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root_path: root.into() }
    }
}

#[async_trait]
impl MediaCache for LocalImageCache {
    async fn save(&self, file_name: &str, data: Bytes) -> anyhow::Result<String> {
        let target = contained(&self.root_path, file_name)?;
        write_file(&target, &data).await?;
        tracing::debug!(path = %target.display(), bytes = data.len(), "cached image locally");
        Ok(target.to_string_lossy().into_owned())
    }
}

pub struct LocalBlobStorage {
    /// Root directory for all objects (e.g. "./data/bucket")
    root_path: PathBuf,
    /// Public URL prefix (e.g. "/media")
    url_prefix: String,
}

impl LocalBlobStorage {
    pub fn new(root: impl Into<PathBuf>, url_prefix: impl Into<String>) -> Self {
        Self {
            root_path: root.into(),
            url_prefix: url_prefix.into().trim_end_matches('/').to_string(),
        }
    }
}

#[async_trait]
impl BlobStorage for LocalBlobStorage {
    async fn upload(&self, path: &str, data: Bytes, _content_type: &str) -> anyhow::Result<()> {
        let target = contained(&self.root_path, path)?;
        write_file(&target, &data).await
    }

    fn public_url(&self, path: &str) -> String {
        format!("{}/{}", self.url_prefix, path.trim_start_matches('/'))
    }
}
