//! Preference-vector CRUD plus the affinity-ranking endpoint:
//! `/api/preference-vectors/{id}/matches` ranks recent articles against a
//! single stored preference vector, the mirror image of
//! `/api/news/search`'s free-text query embedding.

use axum::{
    extract::{Path, Query, State},
    routing::get,
    Router,
};
use serde::{Deserialize, Serialize};

use crate::context::App;
use crate::error::{AppError, EngineError};
use crate::index::normalize;
use crate::json::Json;
use crate::models::preference::PreferenceVectorRecord;
use crate::routes::news::ArticleResponse;
use crate::store;

pub fn route() -> Router<App> {
    Router::new()
        .route("/", get(list).post(create))
        .route("/{id}", get(get_one).put(update).delete(delete_one))
        .route("/{id}/matches", get(matches))
}

fn require_enabled(ctx: &App) -> Result<(), AppError> {
    if ctx.config.enable_preference_management {
        Ok(())
    } else {
        Err(AppError::Forbidden("preference vector management is disabled"))
    }
}

#[derive(Serialize)]
struct PreferenceResponse {
    id: i32,
    title: String,
    description: String,
    created_at: chrono::NaiveDateTime,
    updated_at: chrono::NaiveDateTime,
}

impl From<PreferenceVectorRecord> for PreferenceResponse {
    fn from(row: PreferenceVectorRecord) -> Self {
        PreferenceResponse {
            id: row.id,
            title: row.title,
            description: row.description,
            created_at: row.created_at,
            updated_at: row.updated_at,
        }
    }
}

async fn list(State(ctx): State<App>) -> Result<Json<Vec<PreferenceResponse>>, AppError> {
    require_enabled(&ctx)?;
    let mut conn = ctx.diesel.get().await?;
    let rows = store::list_preference_vectors(&mut conn).await?;
    Ok(Json(rows.into_iter().map(PreferenceResponse::from).collect()))
}

#[derive(Deserialize)]
struct UpsertPreferenceRequest {
    title: String,
    description: String,
}

async fn create(
    State(ctx): State<App>,
    Json(body): Json<UpsertPreferenceRequest>,
) -> Result<Json<PreferenceResponse>, AppError> {
    require_enabled(&ctx)?;
    validate(&body)?;

    let mut conn = ctx.diesel.get().await?;
    if store::preference_vector_by_title(&mut conn, &body.title)
        .await?
        .is_some()
    {
        return Err(EngineError::ValidationFailure("title already exists".into()).into());
    }

    let embedding_text = format!("{}\n{}", body.title, body.description);
    let mut vector = ctx.embedding.embed(&embedding_text).await?;
    normalize(&mut vector);

    let row = store::create_preference_vector(
        &mut conn,
        body.title,
        body.description,
        Some(pgvector::Vector::from(vector)),
    )
    .await?;
    Ok(Json(row.into()))
}

async fn get_one(
    State(ctx): State<App>,
    Path(id): Path<i32>,
) -> Result<Json<PreferenceResponse>, AppError> {
    require_enabled(&ctx)?;
    let mut conn = ctx.diesel.get().await?;
    let row = store::get_preference_vector(&mut conn, id)
        .await?
        .ok_or(EngineError::NotFound)?;
    Ok(Json(row.into()))
}

async fn update(
    State(ctx): State<App>,
    Path(id): Path<i32>,
    Json(body): Json<UpsertPreferenceRequest>,
) -> Result<Json<PreferenceResponse>, AppError> {
    require_enabled(&ctx)?;
    validate(&body)?;

    let mut conn = ctx.diesel.get().await?;
    if let Some(existing) = store::preference_vector_by_title(&mut conn, &body.title).await? {
        if existing.id != id {
            return Err(EngineError::ValidationFailure("title already exists".into()).into());
        }
    }

    let embedding_text = format!("{}\n{}", body.title, body.description);
    let mut vector = ctx.embedding.embed(&embedding_text).await?;
    normalize(&mut vector);

    let row = store::update_preference_vector(
        &mut conn,
        id,
        body.title,
        body.description,
        Some(pgvector::Vector::from(vector)),
    )
    .await?
    .ok_or(EngineError::NotFound)?;
    Ok(Json(row.into()))
}

async fn delete_one(
    State(ctx): State<App>,
    Path(id): Path<i32>,
) -> Result<axum::http::StatusCode, AppError> {
    require_enabled(&ctx)?;
    let mut conn = ctx.diesel.get().await?;
    let deleted = store::delete_preference_vector(&mut conn, id).await?;
    if deleted {
        Ok(axum::http::StatusCode::NO_CONTENT)
    } else {
        Err(EngineError::NotFound.into())
    }
}

fn validate(body: &UpsertPreferenceRequest) -> Result<(), AppError> {
    if body.title.trim().is_empty() {
        return Err(EngineError::ValidationFailure("title must not be empty".into()).into());
    }
    if body.description.trim().is_empty() {
        return Err(EngineError::ValidationFailure("description must not be empty".into()).into());
    }
    Ok(())
}

#[derive(Deserialize)]
struct MatchesQuery {
    limit: Option<i64>,
}

async fn matches(
    State(ctx): State<App>,
    Path(id): Path<i32>,
    Query(query): Query<MatchesQuery>,
) -> Result<Json<Vec<ArticleResponse>>, AppError> {
    require_enabled(&ctx)?;
    let limit = query.limit.unwrap_or(10).clamp(1, 100);

    let mut conn = ctx.diesel.get().await?;
    let preference = store::get_preference_vector(&mut conn, id)
        .await?
        .ok_or(EngineError::NotFound)?;
    let embedding = preference
        .embedding
        .ok_or(EngineError::EmbeddingUnavailable)?;

    let mut query_vec = embedding.to_vec();
    normalize(&mut query_vec);

    let snapshot = ctx.index.load();
    let neighbors = snapshot.search_knn(&query_vec, limit as usize, 0.0);

    let ids: Vec<i32> = neighbors.iter().map(|n| n.id).collect();
    let rows = store::get_articles_by_ids(&mut conn, &ids).await?;
    let mut by_id: std::collections::HashMap<i32, _> =
        rows.into_iter().map(|r| (r.id, r)).collect();

    let mut out = Vec::with_capacity(neighbors.len());
    for neighbor in neighbors {
        if let Some(row) = by_id.remove(&neighbor.id) {
            let mut response: ArticleResponse = row.into();
            response.similarity = Some(neighbor.similarity);
            out.push(response);
        }
    }

    Ok(Json(out))
}
