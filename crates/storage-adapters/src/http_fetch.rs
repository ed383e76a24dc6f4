//! Bounded HTTP GET for the image resolver.

use std::time::Duration;

use anyhow::Context;
use async_trait::async_trait;
use domains::models::FetchedImage;
use domains::ports::RemoteFetcher;
use reqwest::header::CONTENT_TYPE;

#[derive(Clone, Default)]
pub struct ReqwestFetcher {
    client: reqwest::Client,
}

impl ReqwestFetcher {
    pub fn new(client: reqwest::Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl RemoteFetcher for ReqwestFetcher {
    /// Non-2xx statuses are returned, not raised; the resolver decides what they mean.
    async fn fetch(&self, url: &str, timeout: Duration) -> anyhow::Result<FetchedImage> {
        let resp = self
            .client
            .get(url)
            .timeout(timeout)
            .send()
            .await
            .with_context(|| format!("fetching {url}"))?;

        let status = resp.status().as_u16();
        let content_type = resp
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);
        let body = resp.bytes().await.context("reading image body")?;

        Ok(FetchedImage { status, content_type, body })
    }
}

#[cfg(test)]
mod tests {
    use axum::http::{header, StatusCode};
    use axum::routing::get;
    use axum::Router;

    use super::*;

    async fn serve() -> String {
        let app = Router::new()
            .route(
                "/ok.png",
                get(|| async { ([(header::CONTENT_TYPE, "image/jpeg")], b"jpegbytes".to_vec()) }),
            )
            .route("/gone.png", get(|| async { StatusCode::NOT_FOUND }))
            .route(
                "/slow.png",
                get(|| async {
                    tokio::time::sleep(Duration::from_secs(5)).await;
                    "late"
                }),
            );
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move { axum::serve(listener, app).await.unwrap() });
        format!("http://{addr}")
    }

    #[tokio::test]
    async fn test_fetch_returns_body_and_content_type() {
        let base = serve().await;
        let fetched = ReqwestFetcher::default()
            .fetch(&format!("{base}/ok.png"), Duration::from_secs(5))
            .await
            .unwrap();

        assert_eq!(fetched.status, 200);
        assert_eq!(fetched.content_type.as_deref(), Some("image/jpeg"));
        assert_eq!(&fetched.body[..], b"jpegbytes");
    }

    #[tokio::test]
    async fn test_fetch_reports_non_success_status() {
        let base = serve().await;
        let fetched = ReqwestFetcher::default()
            .fetch(&format!("{base}/gone.png"), Duration::from_secs(5))
            .await
            .unwrap();
        assert_eq!(fetched.status, 404);
    }

    #[tokio::test]
    async fn test_fetch_times_out() {
        let base = serve().await;
        let result = ReqwestFetcher::default()
            .fetch(&format!("{base}/slow.png"), Duration::from_millis(100))
            .await;
        assert!(result.is_err());
    }
}
