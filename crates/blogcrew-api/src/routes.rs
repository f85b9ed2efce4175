use axum::{
    Json, Router,
    extract::{State, rejection::JsonRejection},
    routing::{get, post},
};
use serde::{Deserialize, Serialize};
use tower_http::trace::TraceLayer;
use tracing::{error, info, instrument};

use crate::error::{ApiResult, AppError};
use crate::state::AppState;

pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/generate-blog", post(generate_blog))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

#[derive(Debug, Deserialize)]
pub struct TopicRequest {
    pub topic: String,
}

#[derive(Debug, Serialize)]
pub struct BlogResponse {
    pub result: String,
}

#[derive(Debug, Serialize)]
struct HealthResponse {
    status: &'static str,
    model: String,
}

async fn health(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        model: state.crew().model_name().to_string(),
    })
}

#[instrument(name = "http.generate_blog", skip_all)]
async fn generate_blog(
    State(state): State<AppState>,
    payload: Result<Json<TopicRequest>, JsonRejection>,
) -> ApiResult<Json<BlogResponse>> {
    let Json(request) = payload.map_err(|rejection| AppError::validation(rejection.body_text()))?;

    let topic = request.topic.trim();
    if topic.is_empty() {
        return Err(AppError::validation("topic must be a non-empty string"));
    }

    info!(%topic, "generating blog post");
    let output = state.crew().run(topic).await.map_err(|err| {
        error!(error = %err, "crew run failed");
        AppError::from(err)
    })?;

    Ok(Json(BlogResponse { result: output.raw }))
}
