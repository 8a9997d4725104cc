use arc_swap::ArcSwap;
use std::sync::Arc;

use crate::context::App;
use crate::embedding::EMBEDDING_DIM;

/// A flat, brute-force in-memory vector index over the recent window.
/// `ids[i]` corresponds to the D-wide unit-norm vector at
/// `vectors[i*D..(i+1)*D]`.
pub struct IndexData {
    pub ids: Vec<i32>,
    pub vectors: Vec<f32>,
    pub last_rebuilt: chrono::NaiveDateTime,
}

impl IndexData {
    pub fn empty() -> Self {
        IndexData {
            ids: Vec::new(),
            vectors: Vec::new(),
            last_rebuilt: chrono::Utc::now().naive_utc(),
        }
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    fn vector_at(&self, i: usize) -> &[f32] {
        &self.vectors[i * EMBEDDING_DIM..(i + 1) * EMBEDDING_DIM]
    }
}

pub struct VectorIndex {
    data: ArcSwap<IndexData>,
}

impl Default for VectorIndex {
    fn default() -> Self {
        Self::new()
    }
}

impl VectorIndex {
    pub fn new() -> Self {
        VectorIndex {
            data: ArcSwap::from_pointee(IndexData::empty()),
        }
    }

    /// Atomically publishes a freshly-built index. Readers holding the
    /// previous snapshot via `load()` are unaffected.
    pub fn publish(&self, data: IndexData) {
        self.data.store(Arc::new(data));
    }

    pub fn load(&self) -> Arc<IndexData> {
        self.data.load_full()
    }
}

pub fn normalize(vector: &mut [f32]) {
    let norm: f32 = vector.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm > 0.0 {
        for x in vector.iter_mut() {
            *x /= norm;
        }
    }
}

fn squared_l2(a: &[f32], b: &[f32]) -> f32 {
    a.iter().zip(b.iter()).map(|(x, y)| (x - y) * (x - y)).sum()
}

/// `similarity = 1 - L2²/2`, valid for unit-norm vectors.
pub fn similarity_from_squared_l2(sq_l2: f32) -> f32 {
    1.0 - sq_l2 / 2.0
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Neighbor {
    pub id: i32,
    pub similarity: f32,
}

impl IndexData {
    /// Returns the k nearest neighbors to `query` (already unit-norm) with
    /// similarity `>= min_sim`, ties broken by ascending id.
    pub fn search_knn(&self, query: &[f32], k: usize, min_sim: f32) -> Vec<Neighbor> {
        let mut scored: Vec<Neighbor> = (0..self.len())
            .map(|i| {
                let sq = squared_l2(query, self.vector_at(i));
                Neighbor {
                    id: self.ids[i],
                    similarity: similarity_from_squared_l2(sq),
                }
            })
            .filter(|n| n.similarity >= min_sim)
            .collect();

        scored.sort_by(|a, b| {
            b.similarity
                .partial_cmp(&a.similarity)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then(a.id.cmp(&b.id))
        });
        scored.truncate(k);
        scored
    }

    /// Returns every index position within `max_sq_l2` of `query`, used by
    /// the cluster engine's neighbor relation (no k-cutoff).
    pub fn search_all(&self, query: &[f32], max_sq_l2: f32) -> Vec<usize> {
        (0..self.len())
            .filter(|&i| squared_l2(query, self.vector_at(i)) <= max_sq_l2)
            .collect()
    }

    pub fn vector(&self, i: usize) -> &[f32] {
        self.vector_at(i)
    }
}

/// Rebuilds the index from every in-window article with a correctly-shaped
/// embedding, normalizes each vector, and atomically publishes it. Built
/// off-band (no lock held while querying/normalizing) then swapped under
/// `VectorIndex::publish`'s short critical section.
#[tracing::instrument(skip(ctx))]
pub async fn rebuild(ctx: &App, window_hours: i64) -> Result<usize, eyre::Error> {
    let mut conn = ctx.diesel.get().await?;
    let rows = crate::store::list_articles_in_window(&mut conn, window_hours).await?;
    drop(conn);

    let mut ids = Vec::with_capacity(rows.len());
    let mut vectors = Vec::with_capacity(rows.len() * EMBEDDING_DIM);

    for row in rows {
        let Some(embedding) = row.embedding else {
            continue;
        };
        let raw = embedding.to_vec();
        if raw.len() != EMBEDDING_DIM {
            tracing::warn!(
                id = row.id,
                got = raw.len(),
                "dropping article with malformed embedding during rebuild"
            );
            continue;
        }
        let mut v = raw;
        normalize(&mut v);
        ids.push(row.id);
        vectors.extend(v);
    }

    let count = ids.len();
    ctx.index.publish(IndexData {
        ids,
        vectors,
        last_rebuilt: chrono::Utc::now().naive_utc(),
    });

    Ok(count)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn build(ids: Vec<i32>, vectors: Vec<Vec<f32>>) -> IndexData {
        let mut flat = Vec::with_capacity(ids.len() * EMBEDDING_DIM);
        for mut v in vectors {
            v.resize(EMBEDDING_DIM, 0.0);
            normalize(&mut v);
            flat.extend(v);
        }
        IndexData {
            ids,
            vectors: flat,
            last_rebuilt: chrono::Utc::now().naive_utc(),
        }
    }

    #[test]
    fn knn_orders_by_similarity_with_id_tiebreak() {
        // e1 . e2 = 0.9, e1 . e3 = 0.1 (approximated with 2 live dims, rest zero)
        let e1 = vec![1.0, 0.0];
        let e2 = vec![0.9, (1.0f32 - 0.81).sqrt()];
        let e3 = vec![0.1, (1.0f32 - 0.01).sqrt()];

        let index = build(vec![1, 2, 3], vec![e1.clone(), e2, e3]);
        let mut query = e1;
        query.resize(EMBEDDING_DIM, 0.0);
        normalize(&mut query);

        let top = index.search_knn(&query, 2, 0.0);
        assert_eq!(top.len(), 2);
        assert_eq!(top[0].id, 1);
        assert!((top[0].similarity - 1.0).abs() < 1e-4);
        assert_eq!(top[1].id, 2);
        assert!((top[1].similarity - 0.9).abs() < 1e-3);
    }

    #[test]
    fn empty_index_returns_no_neighbors() {
        let index = IndexData::empty();
        assert!(index.search_knn(&[0.0; EMBEDDING_DIM], 5, 0.0).is_empty());
    }

    #[test]
    fn normalize_produces_unit_norm() {
        let mut v = vec![3.0, 4.0];
        v.resize(EMBEDDING_DIM, 0.0);
        normalize(&mut v);
        let norm: f32 = v.iter().map(|x| x * x).sum::<f32>().sqrt();
        assert!((norm - 1.0).abs() < 1e-5);
    }
}
