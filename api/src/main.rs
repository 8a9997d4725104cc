mod cluster;
mod config;
mod context;
mod crawler;
mod embedding;
mod error;
mod extract;
mod index;
mod json;
mod models;
mod registry;
mod routes;
mod schema;
mod scheduler;
mod store;
mod umap;

use std::sync::Arc;
use std::time::Duration;

use diesel_async::pooled_connection::deadpool::Pool as DieselPool;
use diesel_async::pooled_connection::AsyncDieselConnectionManager;
use diesel_async::AsyncPgConnection;
use mimalloc::MiMalloc;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::config::{Config, ServiceType};
use crate::context::CrawlerState;
use crate::embedding::CohereEmbeddingClient;
use crate::index::VectorIndex;

pub use context::App;

#[global_allocator]
static GLOBAL: MiMalloc = MiMalloc;

#[tokio::main]
async fn main() {
    dotenv::dotenv().ok();

    let config = Config::new_from_env();
    init_tracing(config.debug);

    let ctx = build_app(config).await;

    scheduler::spawn(ctx.clone());

    match ctx.config.service_type {
        ServiceType::Crawler => {
            tracing::info!("running in crawler-only mode, no HTTP surface");
            std::future::pending::<()>().await;
        }
        ServiceType::Full => serve(ctx).await,
    }
}

/// JSON logs in production, pretty-printed in debug mode for local
/// development (`DEBUG=true` or a debug build by default).
fn init_tracing(debug: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let registry = tracing_subscriber::registry().with(filter);

    if debug {
        registry.with(tracing_subscriber::fmt::layer().pretty()).init();
    } else {
        registry.with(tracing_subscriber::fmt::layer().json()).init();
    }
}

async fn build_app(config: Config) -> App {
    let config = Arc::new(config);

    let manager = AsyncDieselConnectionManager::<AsyncPgConnection>::new(&config.database_url);
    let diesel = DieselPool::builder(manager)
        .max_size(16)
        .runtime(deadpool_runtime::Runtime::Tokio1)
        .build()
        .expect("failed to build diesel connection pool");

    let sqlite_options = SqliteConnectOptions::new()
        .filename(&config.sqlite_path)
        .create_if_missing(true);
    let sqlite = SqlitePoolOptions::new()
        .max_connections(4)
        .connect_with(sqlite_options)
        .await
        .expect("failed to open sqlite registry database");
    registry::init_schema(&sqlite)
        .await
        .expect("failed to initialize url registry schema");

    let http = reqwest::Client::builder()
        .user_agent(config.user_agent.clone())
        .timeout(config.request_timeout)
        .pool_idle_timeout(Duration::from_secs(90))
        .redirect(reqwest::redirect::Policy::limited(5))
        .build()
        .expect("failed to build http client");

    let embedding: Arc<dyn embedding::EmbeddingClient> = Arc::new(CohereEmbeddingClient::new(
        http.clone(),
        config
            .cohere_api_key
            .clone()
            .unwrap_or_else(|| "missing-cohere-api-key".to_string()),
    ));

    App {
        diesel,
        sqlite,
        http,
        embedding,
        index: Arc::new(VectorIndex::new()),
        crawler: Arc::new(CrawlerState::new(config.max_concurrent_requests)),
        config,
    }
}

async fn serve(ctx: App) {
    let addr = std::net::SocketAddr::from(([0, 0, 0, 0], 8080));
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .expect("failed to bind HTTP listener");

    let router = routes::build(ctx)
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http());

    tracing::info!(%addr, "listening");

    axum::serve(
        listener,
        router.into_make_service_with_connect_info::<std::net::SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await
    .expect("server error");
}

/// Waits for Ctrl+C or SIGTERM. Axum stops accepting new connections and lets
/// in-flight requests finish; the scheduler's detached tasks simply finish
/// their current tick since nothing cancels them directly.
async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }

    tracing::info!("shutdown signal received");
}
