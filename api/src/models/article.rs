use chrono::NaiveDateTime;
use diesel::prelude::*;
use pgvector::Vector;
use serde::Serialize;

#[derive(Queryable, Selectable, Debug, Serialize, Clone)]
#[diesel(table_name = crate::schema::news)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct ArticleRecord {
    pub id: i32,
    pub url: String,
    pub title: String,
    pub summary: Option<String>,
    pub source_url: Option<String>,
    pub first_seen_at: NaiveDateTime,
    pub last_seen_at: NaiveDateTime,
    pub hit_count: i32,
    pub embedding: Option<Vector>,
    pub created_at: NaiveDateTime,
    pub updated_at: NaiveDateTime,
}

#[derive(Insertable, Debug)]
#[diesel(table_name = crate::schema::news)]
pub struct NewArticle {
    pub url: String,
    pub title: String,
    pub summary: Option<String>,
    pub source_url: Option<String>,
    pub first_seen_at: NaiveDateTime,
    pub last_seen_at: NaiveDateTime,
    pub hit_count: i32,
    pub embedding: Option<Vector>,
}
