use std::{path::PathBuf, str::FromStr};

pub const DEFAULT_BIND_ADDR: &str = "127.0.0.1:8000";
pub const DEFAULT_DB_PATH: &str = "phoenix.db";
pub const IN_MEMORY_DB: &str = ":memory:";
pub const DEFAULT_MAX_BODY_BYTES: usize = 16 * 1024 * 1024;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DatabaseLocation {
    InMemory,
    File(PathBuf),
}

impl DatabaseLocation {
    pub fn parse(raw: &str) -> Self {
        match raw.trim() {
            "" => Self::File(PathBuf::from(DEFAULT_DB_PATH)),
            IN_MEMORY_DB => Self::InMemory,
            path => Self::File(PathBuf::from(path)),
        }
    }

    pub fn describe(&self) -> String {
        match self {
            Self::InMemory => IN_MEMORY_DB.to_string(),
            Self::File(path) => path.display().to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApiConfig {
    pub bind_addr: String,
    pub database: DatabaseLocation,
    pub http_workers: usize,
    pub max_body_bytes: usize,
}

impl ApiConfig {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup<F>(env_lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let bind_addr = env_with_fallback(&env_lookup, "PHOENIX_API_BIND", "PHOENIX_BIND")
            .filter(|value| !value.trim().is_empty())
            .unwrap_or_else(|| DEFAULT_BIND_ADDR.to_string());
        let database = env_with_fallback(&env_lookup, "PHOENIX_DB_PATH", "DATABASE_PATH")
            .map(|raw| DatabaseLocation::parse(&raw))
            .unwrap_or_else(|| DatabaseLocation::File(PathBuf::from(DEFAULT_DB_PATH)));
        let http_workers = parse_env_with_fallback::<usize, _>(
            &env_lookup,
            "PHOENIX_API_WORKERS",
            "PHOENIX_HTTP_WORKERS",
        )
        .filter(|workers| *workers > 0)
        .unwrap_or_else(default_http_workers);
        let max_body_bytes = env_lookup("PHOENIX_API_MAX_BODY_BYTES")
            .and_then(|raw| raw.trim().parse::<usize>().ok())
            .filter(|value| *value > 0)
            .unwrap_or(DEFAULT_MAX_BODY_BYTES);

        Self {
            bind_addr,
            database,
            http_workers,
            max_body_bytes,
        }
    }
}

pub fn default_http_workers() -> usize {
    std::thread::available_parallelism()
        .map(|parallelism| parallelism.get().clamp(1, 32))
        .unwrap_or(4)
}

fn env_with_fallback<F>(env_lookup: &F, primary: &str, fallback: &str) -> Option<String>
where
    F: Fn(&str) -> Option<String>,
{
    env_lookup(primary).or_else(|| env_lookup(fallback))
}

fn parse_env_with_fallback<T, F>(env_lookup: &F, primary: &str, fallback: &str) -> Option<T>
where
    T: FromStr,
    F: Fn(&str) -> Option<String>,
{
    for key in [primary, fallback] {
        if let Some(raw) = env_lookup(key)
            && let Ok(value) = raw.trim().parse::<T>()
        {
            return Some(value);
        }
    }
    None
}
