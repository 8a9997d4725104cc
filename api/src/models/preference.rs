use chrono::NaiveDateTime;
use diesel::prelude::*;
use pgvector::Vector;
use serde::Serialize;

#[derive(Queryable, Selectable, Debug, Serialize, Clone)]
#[diesel(table_name = crate::schema::preference_vectors)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct PreferenceVectorRecord {
    pub id: i32,
    pub title: String,
    pub description: String,
    pub embedding: Option<Vector>,
    pub created_at: NaiveDateTime,
    pub updated_at: NaiveDateTime,
}

#[derive(Insertable, Debug)]
#[diesel(table_name = crate::schema::preference_vectors)]
pub struct NewPreferenceVector {
    pub title: String,
    pub description: String,
    pub embedding: Option<Vector>,
}

#[derive(AsChangeset, Debug)]
#[diesel(table_name = crate::schema::preference_vectors)]
pub struct PreferenceVectorChanges {
    pub title: String,
    pub description: String,
    pub embedding: Option<Vector>,
    pub updated_at: NaiveDateTime,
}
