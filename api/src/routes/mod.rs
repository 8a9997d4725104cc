//! All `/api/...` HTTP handlers, composed as one `Router<App>` nesting a
//! sub-router per resource.

mod auth;
mod news;
mod preferences;
mod urls;

use axum::{routing::get, Router};
use serde::Serialize;

use crate::context::App;

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
}

async fn health() -> axum::Json<HealthResponse> {
    axum::Json(HealthResponse { status: "healthy" })
}

pub fn build(ctx: App) -> Router {
    Router::new()
        .nest("/api/urls", urls::route())
        .nest("/api/news", news::route())
        .nest("/api/preference-vectors", preferences::route())
        .nest("/api/auth", auth::route())
        .route("/api/health", get(health))
        .with_state(ctx)
}
