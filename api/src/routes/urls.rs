use axum::{
    extract::{Path, State},
    routing::get,
    Router,
};
use serde::{Deserialize, Serialize};

use crate::context::App;
use crate::error::{AppError, EngineError};
use crate::json::Json;
use crate::registry::{self, SourceEntry, SourceType};

pub fn route() -> Router<App> {
    Router::new()
        .route("/", get(list).post(create))
        .route("/{id}", get(get_one).delete(delete_one))
}

#[derive(Serialize)]
struct SourceResponse {
    id: i64,
    url: String,
    #[serde(rename = "type")]
    source_type: &'static str,
    created_at: chrono::NaiveDateTime,
    updated_at: chrono::NaiveDateTime,
    last_crawled_at: Option<chrono::NaiveDateTime>,
}

impl From<SourceEntry> for SourceResponse {
    fn from(entry: SourceEntry) -> Self {
        SourceResponse {
            id: entry.id,
            url: entry.url,
            source_type: match entry.source_type {
                SourceType::Rss => "rss",
                SourceType::Homepage => "homepage",
            },
            created_at: entry.created_at,
            updated_at: entry.updated_at,
            last_crawled_at: entry.last_crawled_at,
        }
    }
}

fn require_enabled(ctx: &App) -> Result<(), AppError> {
    if ctx.config.enable_url_management {
        Ok(())
    } else {
        Err(AppError::Forbidden("url management is disabled"))
    }
}

async fn list(State(ctx): State<App>) -> Result<Json<Vec<SourceResponse>>, AppError> {
    require_enabled(&ctx)?;
    let entries = registry::list(&ctx.sqlite).await?;
    Ok(Json(entries.into_iter().map(SourceResponse::from).collect()))
}

#[derive(Deserialize)]
struct CreateSourceRequest {
    url: String,
    #[serde(rename = "type")]
    source_type: String,
}

async fn create(
    State(ctx): State<App>,
    Json(body): Json<CreateSourceRequest>,
) -> Result<Json<SourceResponse>, AppError> {
    require_enabled(&ctx)?;

    if body.url.trim().is_empty() {
        return Err(EngineError::ValidationFailure("url must not be empty".into()).into());
    }
    url::Url::parse(&body.url)
        .map_err(|_| EngineError::ValidationFailure("url is not a valid URL".into()))?;

    let source_type = match body.source_type.as_str() {
        "rss" => SourceType::Rss,
        "homepage" => SourceType::Homepage,
        _ => {
            return Err(EngineError::ValidationFailure(
                "type must be `rss` or `homepage`".into(),
            )
            .into())
        }
    };

    let entry = registry::create(&ctx.sqlite, &body.url, source_type).await?;
    Ok(Json(entry.into()))
}

async fn get_one(
    State(ctx): State<App>,
    Path(id): Path<i64>,
) -> Result<Json<SourceResponse>, AppError> {
    require_enabled(&ctx)?;
    let entry = registry::get(&ctx.sqlite, id)
        .await?
        .ok_or(EngineError::NotFound)?;
    Ok(Json(entry.into()))
}

async fn delete_one(
    State(ctx): State<App>,
    Path(id): Path<i64>,
) -> Result<axum::http::StatusCode, AppError> {
    require_enabled(&ctx)?;
    let deleted = registry::delete(&ctx.sqlite, id).await?;
    if deleted {
        Ok(axum::http::StatusCode::NO_CONTENT)
    } else {
        Err(EngineError::NotFound.into())
    }
}
