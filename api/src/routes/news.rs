use std::collections::HashMap;

use axum::{
    extract::{Path, Query, State},
    routing::get,
    Router,
};
use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

use crate::cluster::{self, ClusterConfig, ClusterNode};
use crate::context::App;
use crate::error::{AppError, EngineError};
use crate::index::Neighbor;
use crate::json::Json;
use crate::models::article::ArticleRecord;
use crate::store;
use crate::umap;

pub fn route() -> Router<App> {
    Router::new()
        .route("/", get(list))
        .route("/search", get(search))
        .route("/trending", get(trending))
        .route("/clusters", get(clusters))
        .route("/umap", get(umap_view))
        .route("/stats", get(stats))
        .route("/{id}", get(get_one))
        .route("/{id}/similar", get(similar))
}

#[derive(Debug, Clone, Serialize)]
pub struct ArticleResponse {
    pub id: i32,
    pub title: String,
    pub summary: Option<String>,
    pub url: String,
    pub source_url: Option<String>,
    pub first_seen_at: NaiveDateTime,
    pub last_seen_at: NaiveDateTime,
    pub hit_count: i32,
    pub created_at: NaiveDateTime,
    pub updated_at: NaiveDateTime,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub similarity: Option<f32>,
}

impl From<ArticleRecord> for ArticleResponse {
    fn from(row: ArticleRecord) -> Self {
        ArticleResponse {
            id: row.id,
            title: row.title,
            summary: row.summary,
            url: row.url,
            source_url: row.source_url,
            first_seen_at: row.first_seen_at,
            last_seen_at: row.last_seen_at,
            hit_count: row.hit_count,
            created_at: row.created_at,
            updated_at: row.updated_at,
            similarity: None,
        }
    }
}

fn clamp(value: Option<i64>, default: i64, min: i64, max: i64) -> i64 {
    value.unwrap_or(default).clamp(min, max)
}

// --- GET /api/news -----------------------------------------------------

#[derive(Deserialize)]
struct ListQuery {
    source_url: Option<String>,
    limit: Option<i64>,
    offset: Option<i64>,
}

async fn list(
    State(ctx): State<App>,
    Query(query): Query<ListQuery>,
) -> Result<Json<Vec<ArticleResponse>>, AppError> {
    let limit = clamp(query.limit, 100, 1, 1000);
    let offset = query.offset.unwrap_or(0).max(0);

    let mut conn = ctx.diesel.get().await?;
    let rows = store::list_articles_by_source(
        &mut conn,
        query.source_url.as_deref(),
        limit,
        offset,
    )
    .await?;

    Ok(Json(rows.into_iter().map(ArticleResponse::from).collect()))
}

// --- GET /api/news/search ------------------------------------------------

#[derive(Deserialize)]
struct SearchQuery {
    query: Option<String>,
    limit: Option<i64>,
    source_url: Option<String>,
}

async fn search(
    State(ctx): State<App>,
    Query(query): Query<SearchQuery>,
) -> Result<Json<Vec<ArticleResponse>>, AppError> {
    let q = query
        .query
        .filter(|q| !q.trim().is_empty())
        .ok_or(EngineError::EmptyQuery)?;
    let limit = clamp(query.limit, 10, 1, 100);

    let query_vector = ctx.embedding.embed(&q).await?;

    let snapshot = ctx.index.load();
    let results = if snapshot.is_empty() {
        // Durable-store fallback for when the in-memory index hasn't been built yet.
        let mut query_vec = query_vector.clone();
        crate::index::normalize(&mut query_vec);
        let mut conn = ctx.diesel.get().await?;
        let rows = store::search_by_distance(
            &mut conn,
            &pgvector::Vector::from(query_vec),
            limit * 5,
        )
        .await?;
        rows.into_iter()
            .map(|row| Neighbor {
                id: row.id,
                similarity: row.similarity as f32,
            })
            .collect::<Vec<_>>()
    } else {
        let mut query_vec = query_vector;
        crate::index::normalize(&mut query_vec);
        let k = if query.source_url.is_some() {
            (limit as usize) * 5
        } else {
            limit as usize
        };
        snapshot.search_knn(&query_vec, k, 0.5)
    };

    let ids: Vec<i32> = results.iter().map(|n| n.id).collect();
    let mut conn = ctx.diesel.get().await?;
    let rows = store::get_articles_by_ids(&mut conn, &ids).await?;
    let mut by_id: HashMap<i32, ArticleRecord> = rows.into_iter().map(|r| (r.id, r)).collect();

    let mut out = Vec::with_capacity(results.len());
    for neighbor in results {
        let Some(row) = by_id.remove(&neighbor.id) else {
            continue;
        };
        if let Some(source) = &query.source_url {
            if row.source_url.as_deref() != Some(source.as_str()) {
                continue;
            }
        }
        let mut response = ArticleResponse::from(row);
        response.similarity = Some(neighbor.similarity);
        out.push(response);
        if out.len() >= limit as usize {
            break;
        }
    }

    Ok(Json(out))
}

// --- GET /api/news/trending ----------------------------------------------

#[derive(Deserialize)]
struct TrendingQuery {
    hours: Option<i64>,
    limit: Option<i64>,
}

async fn trending(
    State(ctx): State<App>,
    Query(query): Query<TrendingQuery>,
) -> Result<Json<Vec<ArticleResponse>>, AppError> {
    let hours = clamp(query.hours, 24, 1, 168);
    let limit = clamp(query.limit, 10, 1, 100);

    let mut conn = ctx.diesel.get().await?;
    let rows = store::trending(&mut conn, hours, limit).await?;
    Ok(Json(rows.into_iter().map(ArticleResponse::from).collect()))
}

// --- GET /api/news/{id} and /{id}/similar ---------------------------------

async fn get_one(
    State(ctx): State<App>,
    Path(id): Path<i32>,
) -> Result<Json<ArticleResponse>, AppError> {
    let mut conn = ctx.diesel.get().await?;
    let row = store::get_article_by_id(&mut conn, id)
        .await?
        .ok_or(EngineError::NotFound)?;
    Ok(Json(row.into()))
}

#[derive(Deserialize)]
struct SimilarQuery {
    limit: Option<i64>,
}

async fn similar(
    State(ctx): State<App>,
    Path(id): Path<i32>,
    Query(query): Query<SimilarQuery>,
) -> Result<Json<Vec<ArticleResponse>>, AppError> {
    let limit = clamp(query.limit, 5, 1, 20);

    let mut conn = ctx.diesel.get().await?;
    let row = store::get_article_by_id(&mut conn, id)
        .await?
        .ok_or(EngineError::NotFound)?;
    let embedding = row.embedding.ok_or(EngineError::EmbeddingUnavailable)?;

    let mut query_vec = embedding.to_vec();
    crate::index::normalize(&mut query_vec);

    let snapshot = ctx.index.load();
    let neighbors: Vec<Neighbor> = snapshot
        .search_knn(&query_vec, (limit + 1) as usize, 0.0)
        .into_iter()
        .filter(|n| n.id != id)
        .take(limit as usize)
        .collect();

    let ids: Vec<i32> = neighbors.iter().map(|n| n.id).collect();
    let rows = store::get_articles_by_ids(&mut conn, &ids).await?;
    let mut by_id: HashMap<i32, ArticleRecord> = rows.into_iter().map(|r| (r.id, r)).collect();

    let mut out = Vec::with_capacity(neighbors.len());
    for neighbor in neighbors {
        if let Some(row) = by_id.remove(&neighbor.id) {
            let mut response = ArticleResponse::from(row);
            response.similarity = Some(neighbor.similarity);
            out.push(response);
        }
    }

    Ok(Json(out))
}

// --- GET /api/news/clusters and /umap --------------------------------------

async fn clusters(State(ctx): State<App>) -> Result<Json<serde_json::Value>, AppError> {
    let hours = ctx.config.visualization_time_range;
    let min_similarity = ctx.config.visualization_similarity;

    let mut conn = ctx.diesel.get().await?;
    if let Some(snapshot) = store::read_latest_cluster_snapshot(&mut conn, hours as i32, min_similarity).await? {
        return Ok(Json(snapshot.snapshot));
    }

    let rows = store::list_articles_in_window(&mut conn, hours).await?;
    let texts: HashMap<i32, cluster::ArticleText> = rows
        .iter()
        .map(|row| {
            (
                row.id,
                cluster::ArticleText {
                    title: row.title.clone(),
                    summary: row.summary.clone(),
                },
            )
        })
        .collect();

    let cfg = ClusterConfig::from_min_similarity(min_similarity, ctx.config.subcluster_enabled);
    let snapshot = ctx.index.load();
    let result: std::collections::BTreeMap<String, ClusterNode> =
        cluster::build_clusters(&snapshot, &texts, min_similarity, &cfg);
    let value = serde_json::to_value(&result)
        .map_err(|err| AppError::Internal(eyre::eyre!(err)))?;

    store::save_cluster_snapshot(&mut conn, hours as i32, min_similarity, value.clone()).await?;
    Ok(Json(value))
}

async fn umap_view(State(ctx): State<App>) -> Result<Json<serde_json::Value>, AppError> {
    let hours = ctx.config.visualization_time_range;
    let min_similarity = ctx.config.visualization_similarity;

    let mut conn = ctx.diesel.get().await?;
    if let Some(snapshot) = store::read_latest_umap_snapshot(&mut conn, hours as i32, min_similarity).await? {
        return Ok(Json(snapshot.snapshot));
    }

    let rows = store::list_articles_in_window(&mut conn, hours).await?;
    let article_meta: HashMap<i32, umap::ArticleMeta> = rows
        .into_iter()
        .map(|row| {
            (
                row.id,
                umap::ArticleMeta {
                    id: row.id,
                    title: row.title,
                    url: row.url,
                    source_url: row.source_url,
                    last_seen_at: row.last_seen_at,
                },
            )
        })
        .collect();

    let preference_rows = store::list_preference_vectors(&mut conn).await?;
    let preference_meta: Vec<(umap::PreferenceMeta, Vec<f32>)> = preference_rows
        .into_iter()
        .filter_map(|row| {
            let embedding = row.embedding?;
            Some((
                umap::PreferenceMeta {
                    id: row.id,
                    title: row.title,
                    description: row.description,
                },
                embedding.to_vec(),
            ))
        })
        .collect();

    let snapshot = ctx.index.load();
    let now = chrono::Utc::now().naive_utc();
    let points = umap::project(&snapshot, &article_meta, &preference_meta, min_similarity, now);
    let value = serde_json::to_value(&points).map_err(|err| AppError::Internal(eyre::eyre!(err)))?;
    store::save_umap_snapshot(&mut conn, hours as i32, min_similarity, value.clone()).await?;

    Ok(Json(value))
}

// --- GET /api/news/stats ---------------------------------------------------

#[derive(Serialize)]
struct StatsResponse {
    total_articles: i64,
    hourly_timeline: Vec<HourlyBucketResponse>,
    lifespan_buckets: Vec<LifespanBucketResponse>,
    top_sources: Vec<SourceCountResponse>,
    newest_seen_at: Option<NaiveDateTime>,
    oldest_in_window_at: Option<NaiveDateTime>,
    cluster_snapshot_refreshed_at: Option<NaiveDateTime>,
}

#[derive(Serialize)]
struct HourlyBucketResponse {
    bucket: NaiveDateTime,
    count: i64,
}

#[derive(Serialize)]
struct LifespanBucketResponse {
    bucket: String,
    count: i64,
}

#[derive(Serialize)]
struct SourceCountResponse {
    source_url: String,
    count: i64,
}

async fn stats(State(ctx): State<App>) -> Result<Json<StatsResponse>, AppError> {
    const STATS_WINDOW_HOURS: i64 = 48;

    let mut conn = ctx.diesel.get().await?;
    let total_articles = store::total_article_count(&mut conn).await?;
    let hourly = store::hourly_timeline(&mut conn, STATS_WINDOW_HOURS).await?;
    let lifespan = store::lifespan_buckets(&mut conn).await?;
    let sources = store::top_sources(&mut conn, 10).await?;
    let (newest_seen_at, oldest_in_window_at) =
        store::newest_and_oldest_in_window(&mut conn, STATS_WINDOW_HOURS).await?;

    let cluster_snapshot_refreshed_at = store::read_latest_cluster_snapshot(
        &mut conn,
        ctx.config.visualization_time_range as i32,
        ctx.config.visualization_similarity,
    )
    .await?
    .map(|row| row.refreshed_at);

    Ok(Json(StatsResponse {
        total_articles,
        hourly_timeline: hourly
            .into_iter()
            .map(|row| HourlyBucketResponse {
                bucket: row.bucket,
                count: row.count,
            })
            .collect(),
        lifespan_buckets: lifespan
            .into_iter()
            .map(|row| LifespanBucketResponse {
                bucket: row.bucket,
                count: row.count,
            })
            .collect(),
        top_sources: sources
            .into_iter()
            .map(|row| SourceCountResponse {
                source_url: row.source_url,
                count: row.count,
            })
            .collect(),
        newest_seen_at,
        oldest_in_window_at,
        cluster_snapshot_refreshed_at,
    }))
}
