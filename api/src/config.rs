use std::time::Duration;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ServiceType {
    /// Runs only the crawl + index refresh scheduler, no HTTP surface.
    Crawler,
    /// Runs the HTTP query surface and the scheduler in the same process.
    Full,
}

#[derive(Clone, Debug)]
pub struct Config {
    pub database_url: String,
    pub sqlite_path: String,
    pub cohere_api_key: Option<String>,
    pub user_agent: String,
    pub max_concurrent_requests: usize,
    pub request_timeout: Duration,
    pub crawler_interval: Duration,
    pub news_retention_days: i64,
    pub news_max_items: i64,
    pub visualization_time_range: i64,
    pub visualization_similarity: f64,
    pub faiss_update_interval: Duration,
    pub faiss_max_vectors: usize,
    pub service_type: ServiceType,
    pub enable_url_management: bool,
    pub enable_preference_management: bool,
    pub subcluster_enabled: bool,
    pub embed_title_only: bool,
    pub admin_email: Option<String>,
    pub admin_password: Option<String>,
    pub debug: bool,
}

fn var(key: &str) -> Result<Option<String>, String> {
    match std::env::var(key) {
        Ok(env) => Ok(Some(env)),
        Err(e) => match e {
            std::env::VarError::NotPresent => Ok(None),
            std::env::VarError::NotUnicode(_) => Err(format!(
                "Could not get the environment variable `{key}` due to unicode error"
            )),
        },
    }
}

fn required_var(key: &str) -> String {
    match var(key) {
        Ok(Some(val)) => val,
        Ok(None) => {
            tracing::error!("Environment variable `{key}` is required");
            std::process::exit(1)
        }
        Err(e) => {
            tracing::error!("Environment variable `{key}` is required, but could not retrieve: {e}");
            std::process::exit(1)
        }
    }
}

fn var_or<T: std::str::FromStr>(key: &str, default: T) -> T {
    match var(key) {
        Ok(Some(val)) => val.parse().unwrap_or_else(|_| {
            tracing::warn!("Environment variable `{key}` has an invalid value, using default");
            default
        }),
        _ => default,
    }
}

fn bool_var_or(key: &str, default: bool) -> bool {
    match var(key) {
        Ok(Some(val)) => matches!(val.to_lowercase().as_str(), "1" | "true" | "yes" | "on"),
        _ => default,
    }
}

impl Config {
    pub fn new_from_env() -> Self {
        let service_type = match var("SERVICE_TYPE") {
            Ok(Some(val)) if val == "crawler" => ServiceType::Crawler,
            _ => ServiceType::Full,
        };

        let cohere_api_key = var("COHERE_API_KEY").unwrap_or(None);
        if cohere_api_key.is_none() && service_type == ServiceType::Crawler {
            tracing::error!("`COHERE_API_KEY` is required when SERVICE_TYPE=crawler");
            std::process::exit(1);
        }

        Config {
            database_url: required_var("DATABASE_URL"),
            sqlite_path: var("SQLITE_PATH")
                .unwrap_or(None)
                .unwrap_or_else(|| "urls.sqlite3".to_string()),
            cohere_api_key,
            user_agent: var("USER_AGENT")
                .unwrap_or(None)
                .unwrap_or_else(|| "newsdesk-crawler/1.0".to_string()),
            max_concurrent_requests: var_or("MAX_CONCURRENT_REQUESTS", 5),
            request_timeout: Duration::from_secs(var_or("REQUEST_TIMEOUT", 30)),
            crawler_interval: Duration::from_secs(var_or("CRAWLER_INTERVAL", 3600)),
            news_retention_days: var_or("NEWS_RETENTION_DAYS", 7),
            news_max_items: var_or("NEWS_MAX_ITEMS", 10_000),
            visualization_time_range: var_or("VISUALIZATION_TIME_RANGE", 48),
            visualization_similarity: var_or("VISUALIZATION_SIMILARITY", 0.55),
            faiss_update_interval: Duration::from_secs(var_or("FAISS_UPDATE_INTERVAL", 3600)),
            faiss_max_vectors: var_or("FAISS_MAX_VECTORS", 50_000),
            service_type,
            enable_url_management: bool_var_or("ENABLE_URL_MANAGEMENT", true),
            enable_preference_management: bool_var_or("ENABLE_PREFERENCE_MANAGEMENT", true),
            subcluster_enabled: bool_var_or("SUBCLUSTER_ENABLED", true),
            embed_title_only: bool_var_or("EMBED_TITLE_ONLY", false),
            admin_email: var("ADMIN_EMAIL").unwrap_or(None),
            admin_password: var("ADMIN_PASSWORD").unwrap_or(None),
            debug: bool_var_or("DEBUG", cfg!(debug_assertions)),
        }
    }
}
