use chrono::NaiveDateTime;
use diesel::prelude::*;
use serde_json::Value;

#[derive(Queryable, Selectable, Debug, Clone)]
#[diesel(table_name = crate::schema::news_clusters)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct ClusterSnapshotRow {
    pub id: i32,
    pub hours_window: i32,
    pub min_similarity: f64,
    pub snapshot: Value,
    pub refreshed_at: NaiveDateTime,
}

#[derive(Insertable, Debug)]
#[diesel(table_name = crate::schema::news_clusters)]
pub struct NewClusterSnapshot {
    pub hours_window: i32,
    pub min_similarity: f64,
    pub snapshot: Value,
    pub refreshed_at: NaiveDateTime,
}

#[derive(Queryable, Selectable, Debug, Clone)]
#[diesel(table_name = crate::schema::news_umap)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct UmapSnapshotRow {
    pub id: i32,
    pub hours_window: i32,
    pub min_similarity: f64,
    pub snapshot: Value,
    pub refreshed_at: NaiveDateTime,
}

#[derive(Insertable, Debug)]
#[diesel(table_name = crate::schema::news_umap)]
pub struct NewUmapSnapshot {
    pub hours_window: i32,
    pub min_similarity: f64,
    pub snapshot: Value,
    pub refreshed_at: NaiveDateTime,
}
