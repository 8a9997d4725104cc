mod keywords;

use std::collections::{BTreeMap, HashMap, VecDeque};

use serde::Serialize;

use crate::index::{similarity_from_squared_l2, IndexData};

pub const DEFAULT_MAX_LEAF_SIZE: usize = 10;
pub const DEFAULT_SIMILARITY_STEP: f64 = 0.05;
pub const DEFAULT_MAX_SIMILARITY: f64 = 0.95;
pub const DEFAULT_MAX_DEPTH: usize = 5;

#[derive(Debug, Clone)]
pub struct ArticleText {
    pub title: String,
    pub summary: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ClusterMember {
    pub id: i32,
    pub similarity: f32,
}

#[derive(Debug, Clone, Serialize)]
pub struct ClusterNode {
    pub name: String,
    pub articles: Vec<ClusterMember>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub subclusters: Option<Vec<ClusterNode>>,
}

#[derive(Debug, Clone)]
pub struct ClusterConfig {
    pub max_leaf_size: usize,
    pub subcluster_similarity: f64,
    pub similarity_step: f64,
    pub max_similarity: f64,
    pub max_depth: usize,
    pub subcluster_enabled: bool,
}

impl ClusterConfig {
    /// `subcluster_similarity` has no literal spec default beyond "greater
    /// than min_similarity"; this picks `min_similarity + 0.1`, capped below
    /// `max_similarity`, as the concrete starting escalation point.
    pub fn from_min_similarity(min_similarity: f64, subcluster_enabled: bool) -> Self {
        ClusterConfig {
            max_leaf_size: DEFAULT_MAX_LEAF_SIZE,
            subcluster_similarity: (min_similarity + 0.1).min(DEFAULT_MAX_SIMILARITY),
            similarity_step: DEFAULT_SIMILARITY_STEP,
            max_similarity: DEFAULT_MAX_SIMILARITY,
            max_depth: DEFAULT_MAX_DEPTH,
            subcluster_enabled,
        }
    }
}

fn max_sq_l2(tau: f64) -> f32 {
    (2.0 * (1.0 - tau)) as f32
}

/// Connected components under the "similarity >= tau" neighbor relation,
/// computed by BFS over `index`'s implicit neighbor graph
/// (`VectorIndex::search_all` as the edge oracle). Iterates seeds in the
/// index's existing (ascending-id) order, so results are deterministic given
/// a fixed input ordering. Every local index ends up in exactly one group,
/// including singletons (callers decide whether to discard those).
fn transitive_components(index: &IndexData, tau: f64) -> Vec<Vec<usize>> {
    let n = index.len();
    let threshold = max_sq_l2(tau);
    let mut visited = vec![false; n];
    let mut groups = Vec::new();

    for seed in 0..n {
        if visited[seed] {
            continue;
        }
        visited[seed] = true;
        let mut group = vec![seed];
        let mut queue = VecDeque::from([seed]);

        while let Some(current) = queue.pop_front() {
            let neighbors = index.search_all(index.vector(current), threshold);
            for j in neighbors {
                if !visited[j] {
                    visited[j] = true;
                    group.push(j);
                    queue.push_back(j);
                }
            }
        }

        groups.push(group);
    }

    groups
}

fn build_sub_index(parent: &IndexData, local_indices: &[usize]) -> IndexData {
    let ids = local_indices.iter().map(|&i| parent.ids[i]).collect();
    let dim = if parent.len() > 0 {
        parent.vector(0).len()
    } else {
        0
    };
    let mut vectors = Vec::with_capacity(local_indices.len() * dim);
    for &i in local_indices {
        vectors.extend_from_slice(parent.vector(i));
    }
    IndexData {
        ids,
        vectors,
        last_rebuilt: parent.last_rebuilt,
    }
}

fn members_from_group(index: &IndexData, group: &[usize]) -> Vec<ClusterMember> {
    let seed_vector = index.vector(group[0]);
    group
        .iter()
        .map(|&i| {
            let sq: f32 = seed_vector
                .iter()
                .zip(index.vector(i))
                .map(|(a, b)| (a - b) * (a - b))
                .sum();
            ClusterMember {
                id: index.ids[i],
                similarity: similarity_from_squared_l2(sq),
            }
        })
        .collect()
}

fn build_subclusters(
    index: &IndexData,
    texts: &HashMap<i32, ArticleText>,
    starting_tau: f64,
    depth: usize,
    cfg: &ClusterConfig,
) -> Option<Vec<ClusterNode>> {
    if depth > cfg.max_depth || index.len() <= cfg.max_leaf_size {
        return None;
    }

    let mut tau = starting_tau;
    loop {
        let groups = transitive_components(index, tau);
        if groups.len() <= 1 {
            if tau >= cfg.max_similarity {
                return None;
            }
            tau = (tau + cfg.similarity_step).min(cfg.max_similarity);
            continue;
        }

        let next_starting_tau = (tau + cfg.similarity_step).min(cfg.max_similarity);
        let nodes = groups
            .into_iter()
            .map(|group| {
                let ids: Vec<i32> = group.iter().map(|&i| index.ids[i]).collect();
                let sub_index = build_sub_index(index, &group);
                let subclusters =
                    build_subclusters(&sub_index, texts, next_starting_tau, depth + 1, cfg);
                ClusterNode {
                    name: keywords::label_for(&ids, texts),
                    articles: members_from_group(index, &group),
                    subclusters,
                }
            })
            .collect();
        return Some(nodes);
    }
}

/// Builds the top-level cluster map: transitive clustering at
/// `min_similarity`, discarding singletons, with recursive adaptive
/// subclustering for any cluster larger than `max_leaf_size`.
pub fn build_clusters(
    index: &IndexData,
    texts: &HashMap<i32, ArticleText>,
    min_similarity: f64,
    cfg: &ClusterConfig,
) -> BTreeMap<String, ClusterNode> {
    let groups = transitive_components(index, min_similarity);

    let mut out = BTreeMap::new();
    let mut cluster_id = 0usize;
    for group in groups {
        if group.len() < 2 {
            continue;
        }

        let ids: Vec<i32> = group.iter().map(|&i| index.ids[i]).collect();
        let subclusters = if cfg.subcluster_enabled && group.len() > cfg.max_leaf_size {
            let sub_index = build_sub_index(index, &group);
            build_subclusters(&sub_index, texts, cfg.subcluster_similarity, 1, cfg)
        } else {
            None
        };

        out.insert(
            cluster_id.to_string(),
            ClusterNode {
                name: keywords::label_for(&ids, texts),
                articles: members_from_group(index, &group),
                subclusters,
            },
        );
        cluster_id += 1;
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

    fn index_from(ids: Vec<i32>, vectors: Vec<Vec<f32>>) -> IndexData {
        let mut flat = Vec::new();
        for v in vectors {
            flat.extend(unit(v));
        }
        IndexData {
            ids,
            vectors: flat,
            last_rebuilt: chrono::Utc::now().naive_utc(),
        }
    }

    #[test]
    fn singletons_are_discarded() {
        let index = index_from(
            vec![1, 2],
            vec![vec![1.0, 0.0], vec![0.0, 1.0]], // orthogonal, similarity 0
        );
        let cfg = ClusterConfig::from_min_similarity(0.55, true);
        let clusters = build_clusters(&index, &HashMap::new(), 0.55, &cfg);
        assert!(clusters.is_empty());
    }

    #[test]
    fn identical_vectors_form_one_cluster() {
        let index = index_from(vec![1, 2, 3], vec![vec![1.0, 0.0]; 3]);
        let cfg = ClusterConfig::from_min_similarity(0.55, true);
        let clusters = build_clusters(&index, &HashMap::new(), 0.55, &cfg);
        assert_eq!(clusters.len(), 1);
        assert_eq!(clusters["0"].articles.len(), 3);
    }

    #[test]
    fn clusters_are_disjoint() {
        let index = index_from(
            vec![1, 2, 3, 4],
            vec![
                vec![1.0, 0.0],
                vec![0.99, 0.14],
                vec![0.0, 1.0],
                vec![0.02, 0.999],
            ],
        );
        let cfg = ClusterConfig::from_min_similarity(0.8, true);
        let clusters = build_clusters(&index, &HashMap::new(), 0.8, &cfg);
        let mut seen = std::collections::HashSet::new();
        for node in clusters.values() {
            for member in &node.articles {
                assert!(seen.insert(member.id), "member {} appeared twice", member.id);
            }
        }
    }
}
