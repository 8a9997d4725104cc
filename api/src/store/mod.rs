//! Durable store: the `news` / `preference_vectors` / snapshot tables.
//!
//! Every function here takes an already-checked-out connection or the
//! `App` handle (when it needs to check one out itself) and maps
//! `diesel::result::Error` through `?` into `AppError`/`eyre::Error` at the
//! call site.

use chrono::NaiveDateTime;
use diesel::prelude::*;
use diesel::sql_types::{BigInt, Float8, Text, Timestamp};
use diesel_async::{AsyncPgConnection, RunQueryDsl};
use pgvector::Vector;
use serde_json::Value;

use crate::models::article::{ArticleRecord, NewArticle};
use crate::models::preference::{
    NewPreferenceVector, PreferenceVectorChanges, PreferenceVectorRecord,
};
use crate::models::snapshot::{
    ClusterSnapshotRow, NewClusterSnapshot, NewUmapSnapshot, UmapSnapshotRow,
};
use crate::schema::{news, news_clusters, news_umap, preference_vectors};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpsertOutcome {
    Inserted(i32),
    Updated(i32),
}

/// Upsert-by-URL: re-sighting only touches `hit_count`/`last_seen_at`; a
/// brand-new URL inserts a fully-populated row. Title/summary/embedding are
/// never recomputed on re-sighting.
pub async fn upsert_article_by_url(
    conn: &mut AsyncPgConnection,
    url: &str,
    title: &str,
    summary: Option<&str>,
    source_url: Option<&str>,
    embedding: Option<Vector>,
    now: NaiveDateTime,
) -> Result<UpsertOutcome, diesel::result::Error> {
    use news::dsl;

    let existing = dsl::news
        .filter(dsl::url.eq(url))
        .select(dsl::id)
        .first::<i32>(conn)
        .await
        .optional()?;

    if let Some(id) = existing {
        diesel::update(dsl::news.filter(dsl::id.eq(id)))
            .set((
                dsl::hit_count.eq(dsl::hit_count + 1),
                dsl::last_seen_at.eq(now),
            ))
            .execute(conn)
            .await?;
        return Ok(UpsertOutcome::Updated(id));
    }

    let new_article = NewArticle {
        url: url.to_string(),
        title: title.to_string(),
        summary: summary.map(str::to_string),
        source_url: source_url.map(str::to_string),
        first_seen_at: now,
        last_seen_at: now,
        hit_count: 1,
        embedding,
    };

    let id = diesel::insert_into(dsl::news)
        .values(&new_article)
        .on_conflict(dsl::url)
        .do_nothing()
        .returning(dsl::id)
        .get_result::<i32>(conn)
        .await
        .optional()?;

    match id {
        Some(id) => Ok(UpsertOutcome::Inserted(id)),
        // Lost the race to a concurrent insert of the same URL: re-sighting.
        None => {
            let id = dsl::news
                .filter(dsl::url.eq(url))
                .select(dsl::id)
                .first::<i32>(conn)
                .await?;
            diesel::update(dsl::news.filter(dsl::id.eq(id)))
                .set((
                    dsl::hit_count.eq(dsl::hit_count + 1),
                    dsl::last_seen_at.eq(now),
                ))
                .execute(conn)
                .await?;
            Ok(UpsertOutcome::Updated(id))
        }
    }
}

/// Every article with a last_seen_at within the window that has a
/// correctly-shaped embedding, ordered by ascending id (the clustering
/// engine's determinism contract).
pub async fn list_articles_in_window(
    conn: &mut AsyncPgConnection,
    hours: i64,
) -> Result<Vec<ArticleRecord>, diesel::result::Error> {
    use news::dsl;

    let cutoff = chrono::Utc::now().naive_utc() - chrono::Duration::hours(hours);
    dsl::news
        .filter(dsl::last_seen_at.ge(cutoff))
        .filter(dsl::embedding.is_not_null())
        .order(dsl::id.asc())
        .load::<ArticleRecord>(conn)
        .await
}

pub async fn get_articles_by_ids(
    conn: &mut AsyncPgConnection,
    ids: &[i32],
) -> Result<Vec<ArticleRecord>, diesel::result::Error> {
    use news::dsl;

    dsl::news
        .filter(dsl::id.eq_any(ids))
        .load::<ArticleRecord>(conn)
        .await
}

/// Returns the subset of `urls` that already have a `news` row, used by the
/// crawler to split re-sightings (no re-fetch/re-embed) from new items
/// before doing any network I/O.
pub async fn existing_urls(
    conn: &mut AsyncPgConnection,
    urls: &[String],
) -> Result<std::collections::HashSet<String>, diesel::result::Error> {
    use news::dsl;

    let found = dsl::news
        .filter(dsl::url.eq_any(urls))
        .select(dsl::url)
        .load::<String>(conn)
        .await?;
    Ok(found.into_iter().collect())
}

pub async fn get_article_by_id(
    conn: &mut AsyncPgConnection,
    id: i32,
) -> Result<Option<ArticleRecord>, diesel::result::Error> {
    use news::dsl;

    dsl::news
        .filter(dsl::id.eq(id))
        .first::<ArticleRecord>(conn)
        .await
        .optional()
}

pub async fn list_articles_by_source(
    conn: &mut AsyncPgConnection,
    source_url: Option<&str>,
    limit: i64,
    offset: i64,
) -> Result<Vec<ArticleRecord>, diesel::result::Error> {
    use news::dsl;

    let mut query = dsl::news.into_boxed();
    if let Some(source) = source_url {
        query = query.filter(dsl::source_url.eq(source));
    }
    query
        .order(dsl::last_seen_at.desc())
        .limit(limit)
        .offset(offset)
        .load::<ArticleRecord>(conn)
        .await
}

pub async fn trending(
    conn: &mut AsyncPgConnection,
    hours: i64,
    limit: i64,
) -> Result<Vec<ArticleRecord>, diesel::result::Error> {
    use news::dsl;

    let cutoff = chrono::Utc::now().naive_utc() - chrono::Duration::hours(hours);
    dsl::news
        .filter(dsl::last_seen_at.ge(cutoff))
        .order((dsl::hit_count.desc(), dsl::last_seen_at.desc()))
        .limit(limit)
        .load::<ArticleRecord>(conn)
        .await
}

/// Retention sweep: delete stale rows, then enforce the row cap by deleting
/// the oldest-by-`last_seen_at`. Idempotent — a second run with no new
/// inserts deletes nothing.
pub async fn delete_older_than(
    conn: &mut AsyncPgConnection,
    cutoff: NaiveDateTime,
) -> Result<usize, diesel::result::Error> {
    use news::dsl;

    diesel::delete(dsl::news.filter(dsl::last_seen_at.lt(cutoff)))
        .execute(conn)
        .await
}

pub async fn delete_overflow(
    conn: &mut AsyncPgConnection,
    max_items: i64,
) -> Result<usize, diesel::result::Error> {
    use news::dsl;

    let total: i64 = dsl::news.count().get_result(conn).await?;
    let overflow = total - max_items;
    if overflow <= 0 {
        return Ok(0);
    }

    let victims = dsl::news
        .select(dsl::id)
        .order(dsl::last_seen_at.asc())
        .limit(overflow)
        .load::<i32>(conn)
        .await?;

    diesel::delete(dsl::news.filter(dsl::id.eq_any(&victims)))
        .execute(conn)
        .await
}

/// `ORDER BY embedding <=> $1` fallback search used when the in-memory
/// index is empty (e.g. just after startup, before the first rebuild).
#[derive(QueryableByName, Debug)]
pub struct DistanceRow {
    #[diesel(sql_type = diesel::sql_types::Integer)]
    pub id: i32,
    #[diesel(sql_type = Float8)]
    pub similarity: f64,
}

pub async fn search_by_distance(
    conn: &mut AsyncPgConnection,
    query_embedding: &Vector,
    limit: i64,
) -> Result<Vec<DistanceRow>, diesel::result::Error> {
    diesel::sql_query(
        "SELECT id, (1 - (embedding <=> $1))::FLOAT8 AS similarity \
         FROM news WHERE embedding IS NOT NULL \
         ORDER BY embedding <=> $1 LIMIT $2",
    )
    .bind::<pgvector::sql_types::Vector, _>(query_embedding.clone())
    .bind::<diesel::sql_types::BigInt, _>(limit)
    .load(conn)
    .await
}

// --- Preference vectors -----------------------------------------------------

pub async fn list_preference_vectors(
    conn: &mut AsyncPgConnection,
) -> Result<Vec<PreferenceVectorRecord>, diesel::result::Error> {
    use preference_vectors::dsl;
    dsl::preference_vectors
        .order(dsl::id.asc())
        .load::<PreferenceVectorRecord>(conn)
        .await
}

pub async fn get_preference_vector(
    conn: &mut AsyncPgConnection,
    id: i32,
) -> Result<Option<PreferenceVectorRecord>, diesel::result::Error> {
    use preference_vectors::dsl;
    dsl::preference_vectors
        .filter(dsl::id.eq(id))
        .first::<PreferenceVectorRecord>(conn)
        .await
        .optional()
}

/// Used to enforce the title-uniqueness invariant at the application layer
/// (no DB migration tooling is part of this crate's scope).
pub async fn preference_vector_by_title(
    conn: &mut AsyncPgConnection,
    title: &str,
) -> Result<Option<PreferenceVectorRecord>, diesel::result::Error> {
    use preference_vectors::dsl;
    dsl::preference_vectors
        .filter(dsl::title.eq(title))
        .first::<PreferenceVectorRecord>(conn)
        .await
        .optional()
}

pub async fn create_preference_vector(
    conn: &mut AsyncPgConnection,
    title: String,
    description: String,
    embedding: Option<Vector>,
) -> Result<PreferenceVectorRecord, diesel::result::Error> {
    use preference_vectors::dsl;

    let new = NewPreferenceVector {
        title,
        description,
        embedding,
    };

    diesel::insert_into(dsl::preference_vectors)
        .values(&new)
        .get_result::<PreferenceVectorRecord>(conn)
        .await
}

pub async fn update_preference_vector(
    conn: &mut AsyncPgConnection,
    id: i32,
    title: String,
    description: String,
    embedding: Option<Vector>,
) -> Result<Option<PreferenceVectorRecord>, diesel::result::Error> {
    use preference_vectors::dsl;

    let changes = PreferenceVectorChanges {
        title,
        description,
        embedding,
        updated_at: chrono::Utc::now().naive_utc(),
    };

    diesel::update(dsl::preference_vectors.filter(dsl::id.eq(id)))
        .set(&changes)
        .get_result::<PreferenceVectorRecord>(conn)
        .await
        .optional()
}

pub async fn delete_preference_vector(
    conn: &mut AsyncPgConnection,
    id: i32,
) -> Result<bool, diesel::result::Error> {
    use preference_vectors::dsl;
    let deleted = diesel::delete(dsl::preference_vectors.filter(dsl::id.eq(id)))
        .execute(conn)
        .await?;
    Ok(deleted > 0)
}

// --- Cluster / layout snapshots ---------------------------------------------

pub async fn save_cluster_snapshot(
    conn: &mut AsyncPgConnection,
    hours_window: i32,
    min_similarity: f64,
    snapshot: Value,
) -> Result<(), diesel::result::Error> {
    use news_clusters::dsl;

    let new_row = NewClusterSnapshot {
        hours_window,
        min_similarity,
        snapshot,
        refreshed_at: chrono::Utc::now().naive_utc(),
    };

    diesel::insert_into(dsl::news_clusters)
        .values(&new_row)
        .on_conflict((dsl::hours_window, dsl::min_similarity))
        .do_update()
        .set((
            dsl::snapshot.eq(&new_row.snapshot),
            dsl::refreshed_at.eq(new_row.refreshed_at),
        ))
        .execute(conn)
        .await?;
    Ok(())
}

pub async fn read_latest_cluster_snapshot(
    conn: &mut AsyncPgConnection,
    hours_window: i32,
    min_similarity: f64,
) -> Result<Option<ClusterSnapshotRow>, diesel::result::Error> {
    use news_clusters::dsl;
    dsl::news_clusters
        .filter(dsl::hours_window.eq(hours_window))
        .filter(dsl::min_similarity.eq(min_similarity))
        .first::<ClusterSnapshotRow>(conn)
        .await
        .optional()
}

pub async fn save_umap_snapshot(
    conn: &mut AsyncPgConnection,
    hours_window: i32,
    min_similarity: f64,
    snapshot: Value,
) -> Result<(), diesel::result::Error> {
    use news_umap::dsl;

    let new_row = NewUmapSnapshot {
        hours_window,
        min_similarity,
        snapshot,
        refreshed_at: chrono::Utc::now().naive_utc(),
    };

    diesel::insert_into(dsl::news_umap)
        .values(&new_row)
        .on_conflict((dsl::hours_window, dsl::min_similarity))
        .do_update()
        .set((
            dsl::snapshot.eq(&new_row.snapshot),
            dsl::refreshed_at.eq(new_row.refreshed_at),
        ))
        .execute(conn)
        .await?;
    Ok(())
}

pub async fn read_latest_umap_snapshot(
    conn: &mut AsyncPgConnection,
    hours_window: i32,
    min_similarity: f64,
) -> Result<Option<UmapSnapshotRow>, diesel::result::Error> {
    use news_umap::dsl;
    dsl::news_umap
        .filter(dsl::hours_window.eq(hours_window))
        .filter(dsl::min_similarity.eq(min_similarity))
        .first::<UmapSnapshotRow>(conn)
        .await
        .optional()
}

// --- Stats (GET /api/news/stats) --------------------------------------------

#[derive(QueryableByName, Debug)]
pub struct HourlyBucket {
    #[diesel(sql_type = Timestamp)]
    pub bucket: NaiveDateTime,
    #[diesel(sql_type = BigInt)]
    pub count: i64,
}

pub async fn hourly_timeline(
    conn: &mut AsyncPgConnection,
    hours: i64,
) -> Result<Vec<HourlyBucket>, diesel::result::Error> {
    diesel::sql_query(
        "SELECT date_trunc('hour', first_seen_at) AS bucket, COUNT(*)::BIGINT AS count \
         FROM news WHERE first_seen_at >= NOW() - ($1 || ' hours')::INTERVAL \
         GROUP BY bucket ORDER BY bucket ASC",
    )
    .bind::<Text, _>(hours.to_string())
    .load(conn)
    .await
}

/// Histogram of article lifespan (`last_seen_at - first_seen_at`), bucketed
/// into fixed ranges, over the whole corpus (not windowed — lifespan is a
/// property of an article's full history, not a recent slice of it).
#[derive(QueryableByName, Debug)]
pub struct LifespanBucket {
    #[diesel(sql_type = Text)]
    pub bucket: String,
    #[diesel(sql_type = BigInt)]
    pub count: i64,
}

pub async fn lifespan_buckets(
    conn: &mut AsyncPgConnection,
) -> Result<Vec<LifespanBucket>, diesel::result::Error> {
    diesel::sql_query(
        "SELECT bucket, COUNT(*)::BIGINT AS count FROM ( \
            SELECT CASE \
                WHEN EXTRACT(EPOCH FROM (last_seen_at - first_seen_at)) < 3600 THEN '<1h' \
                WHEN EXTRACT(EPOCH FROM (last_seen_at - first_seen_at)) < 21600 THEN '1-6h' \
                WHEN EXTRACT(EPOCH FROM (last_seen_at - first_seen_at)) < 86400 THEN '6-24h' \
                WHEN EXTRACT(EPOCH FROM (last_seen_at - first_seen_at)) < 604800 THEN '1-7d' \
                ELSE '>7d' \
            END AS bucket, \
            CASE \
                WHEN EXTRACT(EPOCH FROM (last_seen_at - first_seen_at)) < 3600 THEN 0 \
                WHEN EXTRACT(EPOCH FROM (last_seen_at - first_seen_at)) < 21600 THEN 1 \
                WHEN EXTRACT(EPOCH FROM (last_seen_at - first_seen_at)) < 86400 THEN 2 \
                WHEN EXTRACT(EPOCH FROM (last_seen_at - first_seen_at)) < 604800 THEN 3 \
                ELSE 4 \
            END AS bucket_order \
            FROM news \
         ) buckets GROUP BY bucket, bucket_order ORDER BY bucket_order ASC",
    )
    .load(conn)
    .await
}

#[derive(QueryableByName, Debug)]
pub struct SourceCount {
    #[diesel(sql_type = Text)]
    pub source_url: String,
    #[diesel(sql_type = BigInt)]
    pub count: i64,
}

pub async fn top_sources(
    conn: &mut AsyncPgConnection,
    limit: i64,
) -> Result<Vec<SourceCount>, diesel::result::Error> {
    diesel::sql_query(
        "SELECT COALESCE(source_url, '') AS source_url, COUNT(*)::BIGINT AS count \
         FROM news GROUP BY source_url ORDER BY count DESC LIMIT $1",
    )
    .bind::<diesel::sql_types::BigInt, _>(limit)
    .load(conn)
    .await
}

pub async fn total_article_count(
    conn: &mut AsyncPgConnection,
) -> Result<i64, diesel::result::Error> {
    use news::dsl;
    dsl::news.count().get_result(conn).await
}

pub async fn newest_and_oldest_in_window(
    conn: &mut AsyncPgConnection,
    hours: i64,
) -> Result<(Option<NaiveDateTime>, Option<NaiveDateTime>), diesel::result::Error> {
    use news::dsl;

    let newest = dsl::news
        .select(dsl::last_seen_at)
        .order(dsl::last_seen_at.desc())
        .first::<NaiveDateTime>(conn)
        .await
        .optional()?;

    let cutoff = chrono::Utc::now().naive_utc() - chrono::Duration::hours(hours);
    let oldest_in_window = dsl::news
        .filter(dsl::last_seen_at.ge(cutoff))
        .select(dsl::last_seen_at)
        .order(dsl::last_seen_at.asc())
        .first::<NaiveDateTime>(conn)
        .await
        .optional()?;

    Ok((newest, oldest_in_window))
}
