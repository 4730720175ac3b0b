use phoenix_api::{
    transport::{ApiConfig, PhoenixRuntime},
    transport_axum::serve_http_with_axum,
};
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    if std::env::args().any(|arg| arg == "--help" || arg == "-h") {
        println!("{}", usage_text());
        return;
    }

    let config = ApiConfig::from_env();
    let runtime = match PhoenixRuntime::open(&config.database) {
        Ok(runtime) => runtime,
        Err(err) => {
            error!(database = %config.database.describe(), "phoenix-api failed opening store: {err}");
            std::process::exit(1);
        }
    };

    let bind_addr = &config.bind_addr;
    info!("phoenix-api listening on http://{bind_addr}");
    info!(
        database = %config.database.describe(),
        workers = config.http_workers,
        max_body_bytes = config.max_body_bytes,
        "phoenix-api configuration"
    );
    info!("phoenix-api status endpoint: http://{bind_addr}/api/status");
    info!("phoenix-api document endpoint: http://{bind_addr}/api/phoenix-data");
    info!("phoenix-api outlet endpoint: http://{bind_addr}/api/outlet/{{code}}");
    info!("phoenix-api backups endpoint: http://{bind_addr}/api/backups");

    if let Err(err) = serve_http_with_axum(runtime, &config) {
        error!("phoenix-api transport failed: {err}");
        std::process::exit(1);
    }
}

fn usage_text() -> &'static str {
    "Usage: phoenix-api\n\
Environment:\n\
  PHOENIX_API_BIND (fallback PHOENIX_BIND), default 127.0.0.1:8000\n\
  PHOENIX_DB_PATH (fallback DATABASE_PATH), default phoenix.db; ':memory:' for a throwaway store\n\
  PHOENIX_API_WORKERS (fallback PHOENIX_HTTP_WORKERS), default available parallelism\n\
  PHOENIX_API_MAX_BODY_BYTES, default 16777216\n\
  RUST_LOG, default info"
}
