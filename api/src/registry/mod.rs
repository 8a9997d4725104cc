//! URL registry: a small SQLite-backed table of crawl sources, kept
//! deliberately separate from the Postgres-backed article store — a
//! lightweight source list next to the heavier article/vector store.

use chrono::NaiveDateTime;
use serde::Serialize;
use sqlx::{FromRow, SqlitePool};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceType {
    Rss,
    Homepage,
}

impl SourceType {
    fn as_str(self) -> &'static str {
        match self {
            SourceType::Rss => "rss",
            SourceType::Homepage => "homepage",
        }
    }

    fn parse(s: &str) -> Option<Self> {
        match s {
            "rss" => Some(SourceType::Rss),
            "homepage" => Some(SourceType::Homepage),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct SourceEntry {
    pub id: i64,
    pub url: String,
    pub source_type: SourceType,
    pub created_at: NaiveDateTime,
    pub updated_at: NaiveDateTime,
    pub last_crawled_at: Option<NaiveDateTime>,
}

#[derive(FromRow)]
struct SourceRow {
    id: i64,
    url: String,
    source_type: String,
    created_at: NaiveDateTime,
    updated_at: NaiveDateTime,
    last_crawled_at: Option<NaiveDateTime>,
}

impl TryFrom<SourceRow> for SourceEntry {
    type Error = sqlx::Error;

    fn try_from(row: SourceRow) -> Result<Self, Self::Error> {
        let source_type = SourceType::parse(&row.source_type).ok_or_else(|| {
            sqlx::Error::Decode(format!("unknown source type `{}`", row.source_type).into())
        })?;
        Ok(SourceEntry {
            id: row.id,
            url: row.url,
            source_type,
            created_at: row.created_at,
            updated_at: row.updated_at,
            last_crawled_at: row.last_crawled_at,
        })
    }
}

pub async fn init_schema(pool: &SqlitePool) -> Result<(), sqlx::Error> {
    sqlx::query(
        "CREATE TABLE IF NOT EXISTS url_registry (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            url TEXT NOT NULL UNIQUE,
            source_type TEXT NOT NULL,
            created_at TEXT NOT NULL,
            updated_at TEXT NOT NULL,
            last_crawled_at TEXT
        )",
    )
    .execute(pool)
    .await?;
    Ok(())
}

/// Most-recent-first by id (no other ordering guarantee).
pub async fn list(pool: &SqlitePool) -> Result<Vec<SourceEntry>, sqlx::Error> {
    let rows: Vec<SourceRow> = sqlx::query_as(
        "SELECT id, url, source_type, created_at, updated_at, last_crawled_at \
         FROM url_registry ORDER BY id DESC",
    )
    .fetch_all(pool)
    .await?;

    rows.into_iter().map(SourceEntry::try_from).collect()
}

pub async fn get(pool: &SqlitePool, id: i64) -> Result<Option<SourceEntry>, sqlx::Error> {
    let row: Option<SourceRow> = sqlx::query_as(
        "SELECT id, url, source_type, created_at, updated_at, last_crawled_at \
         FROM url_registry WHERE id = ?",
    )
    .bind(id)
    .fetch_optional(pool)
    .await?;

    row.map(SourceEntry::try_from).transpose()
}

pub async fn create(
    pool: &SqlitePool,
    url: &str,
    source_type: SourceType,
) -> Result<SourceEntry, sqlx::Error> {
    let now = chrono::Utc::now().naive_utc();
    let id = sqlx::query(
        "INSERT INTO url_registry (url, source_type, created_at, updated_at) \
         VALUES (?, ?, ?, ?)",
    )
    .bind(url)
    .bind(source_type.as_str())
    .bind(now)
    .bind(now)
    .execute(pool)
    .await?
    .last_insert_rowid();

    Ok(SourceEntry {
        id,
        url: url.to_string(),
        source_type,
        created_at: now,
        updated_at: now,
        last_crawled_at: None,
    })
}

pub async fn delete(pool: &SqlitePool, id: i64) -> Result<bool, sqlx::Error> {
    let result = sqlx::query("DELETE FROM url_registry WHERE id = ?")
        .bind(id)
        .execute(pool)
        .await?;
    Ok(result.rows_affected() > 0)
}

pub async fn mark_crawled(
    pool: &SqlitePool,
    id: i64,
    ts: NaiveDateTime,
) -> Result<(), sqlx::Error> {
    sqlx::query("UPDATE url_registry SET last_crawled_at = ?, updated_at = ? WHERE id = ?")
        .bind(ts)
        .bind(ts)
        .bind(id)
        .execute(pool)
        .await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn pool() -> SqlitePool {
        let pool = SqlitePool::connect("sqlite::memory:").await.unwrap();
        init_schema(&pool).await.unwrap();
        pool
    }

    #[tokio::test]
    async fn create_then_list_round_trips() {
        let pool = pool().await;
        let created = create(&pool, "https://ex.com/feed", SourceType::Rss)
            .await
            .unwrap();
        let all = list(&pool).await.unwrap();
        assert_eq!(all.len(), 1);
        assert_eq!(all[0].id, created.id);
        assert_eq!(all[0].source_type, SourceType::Rss);
    }

    #[tokio::test]
    async fn mark_crawled_updates_timestamp() {
        let pool = pool().await;
        let created = create(&pool, "https://ex.com/feed", SourceType::Rss)
            .await
            .unwrap();
        let ts = chrono::Utc::now().naive_utc();
        mark_crawled(&pool, created.id, ts).await.unwrap();
        let fetched = get(&pool, created.id).await.unwrap().unwrap();
        assert_eq!(fetched.last_crawled_at, Some(ts));
    }

    #[tokio::test]
    async fn delete_removes_entry() {
        let pool = pool().await;
        let created = create(&pool, "https://ex.com/feed", SourceType::Rss)
            .await
            .unwrap();
        assert!(delete(&pool, created.id).await.unwrap());
        assert!(get(&pool, created.id).await.unwrap().is_none());
    }
}
