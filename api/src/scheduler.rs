//! Refresh scheduler: two independent interval timers driving the crawl
//! loop and the index/cluster/UMAP refresh loop, each tick isolated so one
//! failing tick never poisons the next.

use std::collections::HashMap;

use crate::context::App;
use crate::{cluster, crawler, index, store, umap};

/// Starts both timers as detached tasks. Each tick's failure is logged and
/// swallowed; it never poisons the next tick. Call once at startup.
pub fn spawn(ctx: App) {
    tokio::spawn(crawl_loop(ctx.clone()));
    tokio::spawn(index_loop(ctx));
}

async fn crawl_loop(ctx: App) {
    let mut interval = tokio::time::interval(ctx.config.crawler_interval);
    interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
    loop {
        interval.tick().await;
        crawler::run_crawl_cycle(&ctx).await;
        tracing::info!("crawl cycle complete, triggering snapshot refresh");
        if let Err(err) = refresh_snapshots(&ctx).await {
            tracing::warn!(?err, "post-crawl snapshot refresh failed");
        }
    }
}

async fn index_loop(ctx: App) {
    let mut interval = tokio::time::interval(ctx.config.faiss_update_interval);
    interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
    loop {
        interval.tick().await;
        if let Err(err) = refresh_snapshots(&ctx).await {
            tracing::warn!(?err, "scheduled index/snapshot refresh failed");
        }
    }
}

/// Rebuilds the in-memory vector index over `VISUALIZATION_TIME_RANGE`, then
/// recomputes clusters and the 2-D layout and upserts both snapshots. Shared
/// between both timers: the crawl loop triggers it immediately after a
/// cycle, the index loop triggers it on its own period.
pub async fn refresh_snapshots(ctx: &App) -> Result<(), eyre::Error> {
    let hours = ctx.config.visualization_time_range;
    let min_similarity = ctx.config.visualization_similarity;

    let count = index::rebuild(ctx, hours).await?;
    tracing::info!(count, hours, "vector index rebuilt");

    let snapshot = ctx.index.load();

    let mut conn = ctx.diesel.get().await?;
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

    let cfg = cluster::ClusterConfig::from_min_similarity(
        min_similarity,
        ctx.config.subcluster_enabled,
    );
    let clusters = cluster::build_clusters(&snapshot, &texts, min_similarity, &cfg);
    let cluster_json = serde_json::to_value(&clusters)?;
    store::save_cluster_snapshot(&mut conn, hours as i32, min_similarity, cluster_json).await?;

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

    let now = chrono::Utc::now().naive_utc();
    let points = umap::project(&snapshot, &article_meta, &preference_meta, min_similarity, now);
    let umap_json = serde_json::to_value(&points)?;
    store::save_umap_snapshot(&mut conn, hours as i32, min_similarity, umap_json).await?;

    Ok(())
}
