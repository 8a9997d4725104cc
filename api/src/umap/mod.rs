//! 2-D layout projector.
//!
//! Implements a deterministic Fruchterman-Reingold-style force layout over
//! the same cosine/L2 neighbor relation the cluster engine uses as its edge
//! oracle: neighbors attract toward their target (similarity-derived)
//! distance, all pairs repel, with a fixed iteration count and a circular
//! (not random) initial layout so the result is reproducible for a fixed
//! input order.

use std::collections::HashMap;

use chrono::NaiveDateTime;
use serde::Serialize;

use crate::cluster::{self, ArticleText, ClusterConfig};
use crate::index::IndexData;

const N_NEIGHBORS: usize = 15;
const ITERATIONS: usize = 150;
const TOP_CLUSTERS: usize = 20;

#[derive(Debug, Clone, Serialize)]
#[serde(untagged)]
pub enum UmapPoint {
    Article(ArticlePoint),
    Preference(PreferencePoint),
}

#[derive(Debug, Clone, Serialize)]
pub struct ArticlePoint {
    pub id: i32,
    pub title: String,
    pub url: String,
    pub source_url: Option<String>,
    pub last_seen_at: NaiveDateTime,
    pub x: f64,
    pub y: f64,
    pub cluster_id: Option<String>,
    pub cluster_name: Option<String>,
    #[serde(rename = "type")]
    pub kind: &'static str,
    pub opacity: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct PreferencePoint {
    pub id: String,
    pub title: String,
    pub description: String,
    pub x: f64,
    pub y: f64,
    #[serde(rename = "type")]
    pub kind: &'static str,
    pub opacity: f64,
}

pub struct ArticleMeta {
    pub id: i32,
    pub title: String,
    pub url: String,
    pub source_url: Option<String>,
    pub last_seen_at: NaiveDateTime,
}

pub struct PreferenceMeta {
    pub id: i32,
    pub title: String,
    pub description: String,
}

fn opacity_for_age(last_seen_at: NaiveDateTime, now: NaiveDateTime) -> f64 {
    let hours_old = (now - last_seen_at).num_minutes() as f64 / 60.0;
    if hours_old <= 1.0 {
        0.8
    } else if hours_old >= 24.0 {
        0.2
    } else {
        0.8 - 0.6 * (hours_old - 1.0) / 23.0
    }
}

fn squared_l2(a: &[f32], b: &[f32]) -> f32 {
    a.iter().zip(b.iter()).map(|(x, y)| (x - y) * (x - y)).sum()
}

/// Force-directed layout over `n` unit-norm vectors (flat, `dim`-wide).
/// Deterministic: circular init by index, fixed iteration count, fixed
/// cooling schedule — no RNG anywhere.
fn layout(vectors: &[f32], n: usize, dim: usize) -> Vec<(f64, f64)> {
    if n == 0 {
        return Vec::new();
    }
    if n == 1 {
        return vec![(0.0, 0.0)];
    }

    let vector_at = |i: usize| -> &[f32] { &vectors[i * dim..(i + 1) * dim] };

    // k-nearest-neighbor adjacency (cosine via squared L2 on unit vectors)
    // gives each point its attraction set, approximating UMAP's fuzzy
    // simplicial set with a plain kNN graph.
    let mut neighbors: Vec<Vec<(usize, f32)>> = Vec::with_capacity(n);
    for i in 0..n {
        let mut scored: Vec<(usize, f32)> = (0..n)
            .filter(|&j| j != i)
            .map(|j| (j, squared_l2(vector_at(i), vector_at(j))))
            .collect();
        scored.sort_by(|a, b| a.1.partial_cmp(&b.1).unwrap_or(std::cmp::Ordering::Equal));
        scored.truncate(N_NEIGHBORS);
        neighbors.push(scored);
    }

    let mut pos: Vec<(f64, f64)> = (0..n)
        .map(|i| {
            let angle = 2.0 * std::f64::consts::PI * (i as f64) / (n as f64);
            (angle.cos(), angle.sin())
        })
        .collect();

    // Fixed unit-square layout area: ideal spacing shrinks as more points
    // are packed in, the standard Fruchterman-Reingold relation.
    const LAYOUT_AREA: f64 = 1.0;
    let k_ideal = (LAYOUT_AREA / n as f64).sqrt();

    for iter in 0..ITERATIONS {
        let temperature = 1.0 - (iter as f64 / ITERATIONS as f64);
        let mut displacement = vec![(0.0f64, 0.0f64); n];

        // Repulsion: every pair pushes apart, inverse-square falloff.
        for i in 0..n {
            for j in (i + 1)..n {
                let dx = pos[i].0 - pos[j].0;
                let dy = pos[i].1 - pos[j].1;
                let dist_sq = (dx * dx + dy * dy).max(1e-6);
                let dist = dist_sq.sqrt();
                let force = (k_ideal * k_ideal) / dist;
                let fx = dx / dist * force;
                let fy = dy / dist * force;
                displacement[i].0 += fx;
                displacement[i].1 += fy;
                displacement[j].0 -= fx;
                displacement[j].1 -= fy;
            }
        }

        // Attraction: neighbors pulled toward a similarity-derived target
        // distance, closer pairs stay closer.
        for (i, edges) in neighbors.iter().enumerate() {
            for &(j, sq_l2) in edges {
                let similarity = (1.0 - sq_l2 / 2.0).clamp(0.0, 1.0) as f64;
                let target = k_ideal * (1.0 - similarity * 0.9);
                let dx = pos[i].0 - pos[j].0;
                let dy = pos[i].1 - pos[j].1;
                let dist = (dx * dx + dy * dy).sqrt().max(1e-6);
                let force = (dist - target) / k_ideal;
                let fx = dx / dist * force;
                let fy = dy / dist * force;
                displacement[i].0 -= fx;
                displacement[i].1 -= fy;
            }
        }

        for i in 0..n {
            let (dx, dy) = displacement[i];
            let dist = (dx * dx + dy * dy).sqrt().max(1e-6);
            let capped = dist.min(k_ideal * temperature.max(0.01) * 4.0);
            pos[i].0 += dx / dist * capped;
            pos[i].1 += dy / dist * capped;
        }
    }

    pos
}

/// Builds the full UMAP point set over in-window articles plus every
/// preference vector with an embedding, tagging each article row with the
/// top-20-by-size cluster it belongs to (or `null` if outside the top 20).
pub fn project(
    index: &IndexData,
    article_meta: &HashMap<i32, ArticleMeta>,
    preference_meta: &[(PreferenceMeta, Vec<f32>)],
    min_similarity: f64,
    now: NaiveDateTime,
) -> Vec<UmapPoint> {
    let dim = if index.len() > 0 { index.vector(0).len() } else { 0 };

    let mut flat: Vec<f32> = Vec::with_capacity((index.len() + preference_meta.len()) * dim);
    for i in 0..index.len() {
        flat.extend_from_slice(index.vector(i));
    }
    for (_, vector) in preference_meta {
        let mut v = vector.clone();
        v.resize(dim, 0.0);
        crate::index::normalize(&mut v);
        flat.extend(v);
    }

    let total = index.len() + preference_meta.len();
    let positions = layout(&flat, total, dim);

    let texts: HashMap<i32, ArticleText> = article_meta
        .iter()
        .map(|(id, meta)| {
            (
                *id,
                ArticleText {
                    title: meta.title.clone(),
                    summary: None,
                },
            )
        })
        .collect();

    let cfg = ClusterConfig::from_min_similarity(min_similarity, false);
    let clusters = cluster::build_clusters(index, &texts, min_similarity, &cfg);

    let mut ranked: Vec<(&String, &cluster::ClusterNode)> = clusters.iter().collect();
    ranked.sort_by(|a, b| b.1.articles.len().cmp(&a.1.articles.len()).then(a.0.cmp(b.0)));

    let mut assignment: HashMap<i32, (String, String)> = HashMap::new();
    for (cluster_id, node) in ranked.into_iter().take(TOP_CLUSTERS) {
        for member in &node.articles {
            assignment.insert(member.id, (cluster_id.clone(), node.name.clone()));
        }
    }

    let mut out = Vec::with_capacity(total);
    for i in 0..index.len() {
        let id = index.ids[i];
        let Some(meta) = article_meta.get(&id) else {
            continue;
        };
        let (x, y) = positions[i];
        let (cluster_id, cluster_name) = assignment
            .get(&id)
            .map(|(cid, name)| (Some(cid.clone()), Some(name.clone())))
            .unwrap_or((None, None));

        out.push(UmapPoint::Article(ArticlePoint {
            id,
            title: meta.title.clone(),
            url: meta.url.clone(),
            source_url: meta.source_url.clone(),
            last_seen_at: meta.last_seen_at,
            x,
            y,
            cluster_id,
            cluster_name,
            kind: "news_item",
            opacity: opacity_for_age(meta.last_seen_at, now),
        }));
    }

    for (offset, (meta, _)) in preference_meta.iter().enumerate() {
        let (x, y) = positions[index.len() + offset];
        out.push(UmapPoint::Preference(PreferencePoint {
            id: format!("pref_{}", meta.id),
            title: meta.title.clone(),
            description: meta.description.clone(),
            x,
            y,
            kind: "preference_vector",
            opacity: 1.0,
        }));
    }

    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embedding::EMBEDDING_DIM;
    use crate::index::normalize;

    fn unit(mut v: Vec<f32>) -> Vec<f32> {
        v.resize(EMBEDDING_DIM, 0.0);
        normalize(&mut v);
        v
    }

    #[test]
    fn empty_index_yields_no_points() {
        let index = IndexData::empty();
        let points = project(&index, &HashMap::new(), &[], 0.55, chrono::Utc::now().naive_utc());
        assert!(points.is_empty());
    }

    #[test]
    fn single_vector_yields_one_point_at_origin() {
        let index = IndexData {
            ids: vec![1],
            vectors: unit(vec![1.0, 0.0]),
            last_rebuilt: chrono::Utc::now().naive_utc(),
        };
        let mut meta = HashMap::new();
        meta.insert(
            1,
            ArticleMeta {
                id: 1,
                title: "Hello".into(),
                url: "https://ex.com/a".into(),
                source_url: None,
                last_seen_at: chrono::Utc::now().naive_utc(),
            },
        );
        let points = project(&index, &meta, &[], 0.55, chrono::Utc::now().naive_utc());
        assert_eq!(points.len(), 1);
    }

    #[test]
    fn opacity_bounds_are_respected() {
        let now = chrono::Utc::now().naive_utc();
        assert_eq!(opacity_for_age(now, now), 0.8);
        assert_eq!(opacity_for_age(now - chrono::Duration::hours(48), now), 0.2);
        let mid = opacity_for_age(now - chrono::Duration::hours(12), now);
        assert!(mid > 0.2 && mid < 0.8);
    }
}
