//! # Social service routes

use std::sync::Arc;

use axum::extract::{Query, State};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Deserialize;
use serde_json::{json, Value};
use services::{SocialAgent, SocialStats};
use uuid::Uuid;

use super::error::ApiResult;

#[derive(Clone)]
pub struct SocialState {
    pub agent: Arc<SocialAgent>,
}

pub fn router(state: SocialState) -> Router {
    Router::new()
        .route("/", get(root))
        .route("/post", post(post_image))
        .route("/stats", get(stats))
        .route("/status", get(stats))
        .route("/unposted", get(unposted))
        .with_state(state)
}

async fn root() -> Json<Value> {
    Json(json!({ "message": "Marvin Social Agent is running" }))
}

#[derive(Debug, Deserialize)]
pub struct PostQuery {
    pub image_id: Uuid,
}

async fn post_image(
    State(state): State<SocialState>,
    Query(q): Query<PostQuery>,
) -> ApiResult<Json<Value>> {
    let feedback = state.agent.post_image(q.image_id).await?;
    Ok(Json(json!({ "status": "success", "feedback": feedback })))
}

async fn stats(State(state): State<SocialState>) -> ApiResult<Json<SocialStats>> {
    Ok(Json(state.agent.stats().await?))
}

async fn unposted(State(state): State<SocialState>) -> ApiResult<Json<Value>> {
    let images = state.agent.unposted().await?;
    Ok(Json(json!({
        "status": "success",
        "count": images.len(),
        "images": images,
    })))
}
