//! Crawler pipeline: fetch -> parse -> dedupe-by-URL -> fetch article ->
//! embed -> upsert, with a retention sweep before every source's insert
//! batch. Sources are crawled serially; each source's new items are fanned
//! out with bounded concurrency, and one source's failures never abort
//! another's.

use std::time::Duration;

use futures::stream::StreamExt;
use pgvector::Vector;
use robotxt::Robots;

use crate::context::App;
use crate::error::EngineError;
use crate::extract::{self, LinkItem, RssItem};
use crate::registry::{SourceEntry, SourceType};
use crate::store;

const ROBOTS_USER_AGENT: &str = "newsdesk-crawler";
const DEFAULT_CRAWL_DELAY: Duration = Duration::from_secs(1);

/// Fetches (or returns cached) robots.txt rules for `url`'s host, politely
/// waiting its turn on the shared per-domain limiter first.
async fn robots_for(ctx: &App, url: &url::Url) -> Result<Robots, EngineError> {
    let host = url
        .host_str()
        .ok_or_else(|| EngineError::TransientNetwork("missing host".into()))?
        .to_string();

    {
        let cache = ctx.crawler.robots_cache.lock().await;
        if let Some(robots) = cache.get(&host).cloned() {
            return Ok(robots);
        }
    }

    ctx.crawler.wait_turn(&host, DEFAULT_CRAWL_DELAY).await;

    let base = url::Url::parse(&format!("{}://{}/", url.scheme(), host))
        .map_err(|err| EngineError::TransientNetwork(err.to_string()))?;
    let robots_url =
        robotxt::create_url(&base).map_err(|err| EngineError::TransientNetwork(err.to_string()))?;
    let body = match ctx.http.get(robots_url).send().await {
        Ok(resp) => resp.text().await.unwrap_or_default(),
        Err(_) => String::new(),
    };

    let robots = if body.is_empty() {
        Robots::from_always(true, ROBOTS_USER_AGENT)
    } else {
        Robots::from_bytes(body.as_bytes(), ROBOTS_USER_AGENT)
    };

    let mut cache = ctx.crawler.robots_cache.lock().await;
    cache.insert(host, robots.clone());
    Ok(robots)
}

/// Checks robots.txt and waits out this host's crawl-delay before a fetch.
async fn respect_robots(ctx: &App, url: &url::Url) -> Result<(), EngineError> {
    let domain = url
        .host_str()
        .ok_or_else(|| EngineError::TransientNetwork("missing host".into()))?
        .to_string();

    let robots = robots_for(ctx, url).await?;
    if !robots.is_absolute_allowed(url) {
        return Err(EngineError::TransientNetwork(
            "robots.txt disallows crawling this URL".into(),
        ));
    }

    ctx.crawler
        .wait_turn(&domain, robots.crawl_delay().unwrap_or(DEFAULT_CRAWL_DELAY))
        .await;
    Ok(())
}

/// Runs one crawl cycle: iterate the registry serially, fan out each
/// source's new items with the shared fetch semaphore. One source's
/// failures never abort another's.
#[tracing::instrument(skip(ctx))]
pub async fn run_crawl_cycle(ctx: &App) {
    let sources = match crate::registry::list(&ctx.sqlite).await {
        Ok(sources) => sources,
        Err(err) => {
            tracing::error!(?err, "failed to list registry sources, skipping crawl cycle");
            return;
        }
    };

    for source in sources {
        if let Err(err) = crawl_source(ctx, &source).await {
            tracing::warn!(source_id = source.id, url = %source.url, ?err, "source crawl failed");
        }
    }
}

struct CandidateItem {
    title: String,
    url: url::Url,
}

async fn fetch_candidates(
    ctx: &App,
    source: &SourceEntry,
) -> Result<Vec<CandidateItem>, EngineError> {
    let response = ctx
        .http
        .get(&source.url)
        .send()
        .await
        .map_err(|err| EngineError::TransientNetwork(err.to_string()))?;
    let body = response
        .text()
        .await
        .map_err(|err| EngineError::TransientNetwork(err.to_string()))?;

    match source.source_type {
        SourceType::Rss => {
            let items: Vec<RssItem> = extract::extract_rss(&body);
            Ok(items
                .into_iter()
                .map(|item| CandidateItem {
                    title: item.title,
                    url: extract::canonicalize_url(item.url),
                })
                .collect())
        }
        SourceType::Homepage => {
            let base = url::Url::parse(&source.url)
                .map_err(|err| EngineError::TransientNetwork(err.to_string()))?;
            let links: Vec<LinkItem> = extract::extract_links(&body, &base);
            Ok(links
                .into_iter()
                .map(|item| CandidateItem {
                    title: item.title,
                    url: extract::canonicalize_url(item.url),
                })
                .collect())
        }
    }
}

async fn run_retention_sweep(ctx: &App) {
    let cutoff =
        chrono::Utc::now().naive_utc() - chrono::Duration::days(ctx.config.news_retention_days);
    let mut conn = match ctx.diesel.get().await {
        Ok(conn) => conn,
        Err(err) => {
            tracing::warn!(?err, "retention sweep: failed to check out connection");
            return;
        }
    };

    if let Err(err) = store::delete_older_than(&mut conn, cutoff).await {
        tracing::warn!(?err, "retention sweep: delete_older_than failed");
    }
    if let Err(err) = store::delete_overflow(&mut conn, ctx.config.news_max_items).await {
        tracing::warn!(?err, "retention sweep: delete_overflow failed");
    }
}

#[tracing::instrument(skip(ctx, source), fields(source_id = source.id))]
async fn crawl_source(ctx: &App, source: &SourceEntry) -> Result<(), eyre::Error> {
    let candidates = fetch_candidates(ctx, source).await?;
    tracing::debug!(count = candidates.len(), "fetched candidate items");

    let urls: Vec<String> = candidates.iter().map(|c| c.url.to_string()).collect();
    let mut conn = ctx.diesel.get().await?;
    let existing = store::existing_urls(&mut conn, &urls).await?;
    drop(conn);

    let now = chrono::Utc::now().naive_utc();

    // Re-sightings: no fetch, no embed, just bump hit_count/last_seen_at.
    let (resighted, new_items): (Vec<_>, Vec<_>) = candidates
        .into_iter()
        .partition(|c| existing.contains(c.url.as_str()));

    if !resighted.is_empty() {
        let mut conn = ctx.diesel.get().await?;
        for item in &resighted {
            if let Err(err) = store::upsert_article_by_url(
                &mut conn,
                item.url.as_str(),
                &item.title,
                None,
                Some(&source.url),
                None,
                now,
            )
            .await
            {
                tracing::warn!(url = %item.url, ?err, "failed to record re-sighting");
            }
        }
    }

    if new_items.is_empty() {
        mark_crawled(ctx, source.id).await;
        return Ok(());
    }

    run_retention_sweep(ctx).await;

    futures::stream::iter(new_items)
        .map(|item| {
            let ctx = ctx.clone();
            let source_url = source.url.clone();
            async move { process_new_item(&ctx, item, &source_url).await }
        })
        .buffer_unordered(ctx.config.max_concurrent_requests)
        .collect::<Vec<_>>()
        .await;

    mark_crawled(ctx, source.id).await;
    Ok(())
}

async fn mark_crawled(ctx: &App, source_id: i64) {
    let now = chrono::Utc::now().naive_utc();
    if let Err(err) = crate::registry::mark_crawled(&ctx.sqlite, source_id, now).await {
        tracing::warn!(source_id, ?err, "failed to mark source as crawled");
    }
}

/// Fetch -> extract -> embed -> upsert for one never-before-seen URL. Any
/// failure drops the item entirely rather than writing a partial row.
async fn process_new_item(ctx: &App, item: CandidateItem, source_url: &str) {
    let _permit = ctx.crawler.fetch_semaphore.acquire().await;

    if let Err(err) = respect_robots(ctx, &item.url).await {
        tracing::debug!(url = %item.url, ?err, "robots.txt disallows item, dropping");
        return;
    }

    let article = match extract::fetch_article(ctx, &item.url).await {
        Ok(article) => article,
        Err(err) => {
            tracing::debug!(url = %item.url, ?err, "extraction failed, dropping item");
            return;
        }
    };

    let title = if article.title.is_empty() {
        item.title.clone()
    } else {
        article.title.clone()
    };

    let embed_input = if ctx.config.embed_title_only {
        title.clone()
    } else {
        format!("{title}. {}", article.summary)
    };

    let vector = match ctx.embedding.embed(&embed_input).await {
        Ok(vector) => vector,
        Err(err) => {
            tracing::debug!(url = %item.url, ?err, "embedding failed, dropping item");
            return;
        }
    };

    let now = chrono::Utc::now().naive_utc();
    let mut conn = match ctx.diesel.get().await {
        Ok(conn) => conn,
        Err(err) => {
            tracing::warn!(url = %item.url, ?err, "failed to check out connection for upsert");
            return;
        }
    };

    let outcome = store::upsert_article_by_url(
        &mut conn,
        item.url.as_str(),
        &title,
        Some(&article.summary),
        Some(source_url),
        Some(Vector::from(vector)),
        now,
    )
    .await;

    if let Err(err) = outcome {
        tracing::warn!(url = %item.url, ?err, "failed to upsert article");
    }
}
