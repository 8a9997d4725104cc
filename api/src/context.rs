use std::collections::HashMap;
use std::sync::Arc;

use diesel_async::pooled_connection::deadpool::Pool as DieselPool;
use diesel_async::pooled_connection::AsyncDieselConnectionManager;
use diesel_async::AsyncPgConnection;
use robotxt::Robots;
use sqlx::SqlitePool;
use tokio::sync::{Mutex, Semaphore};
use tokio::time::Instant;

use crate::config::Config;
use crate::embedding::EmbeddingClient;
use crate::index::VectorIndex;

pub type DieselConnPool = DieselPool<AsyncPgConnection>;

/// Per-domain crawl politeness: a robots.txt cache plus a site limiter that
/// staggers requests to the same host. Shared across crawl cycles.
pub struct CrawlerState {
    pub robots_cache: Mutex<HashMap<String, Robots>>,
    next_allowed: Mutex<HashMap<String, Instant>>,
    pub fetch_semaphore: Semaphore,
}

impl CrawlerState {
    pub fn new(max_concurrent_requests: usize) -> Self {
        CrawlerState {
            robots_cache: Mutex::new(HashMap::new()),
            next_allowed: Mutex::new(HashMap::new()),
            fetch_semaphore: Semaphore::new(max_concurrent_requests),
        }
    }

    pub async fn wait_turn(&self, domain: &str, delay: std::time::Duration) {
        loop {
            let sleep_for = {
                let mut guard = self.next_allowed.lock().await;
                let now = Instant::now();
                match guard.get(domain) {
                    Some(next) if *next > now => Some(*next - now),
                    _ => {
                        guard.insert(domain.to_string(), now + delay);
                        None
                    }
                }
            };

            match sleep_for {
                Some(duration) => tokio::time::sleep(duration).await,
                None => break,
            }
        }
    }
}

/// Process-lifetime shared state, constructed once at startup and passed by
/// handle (every field is cheaply `Clone`). No ambient/global state.
#[derive(Clone)]
pub struct App {
    pub config: Arc<Config>,
    pub diesel: DieselConnPool,
    pub sqlite: SqlitePool,
    pub http: reqwest::Client,
    pub embedding: Arc<dyn EmbeddingClient>,
    pub index: Arc<VectorIndex>,
    pub crawler: Arc<CrawlerState>,
}
