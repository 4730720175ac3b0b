use cache_sync::{DEFAULT_POLL_INTERVAL, LocalCache, RemoteStore, SyncClient};
use std::{env, path::PathBuf, sync::Arc, time::Duration};
use tokio::sync::oneshot;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

const DEFAULT_CACHE_PATH: &str = "phoenix-cache.json";

#[derive(Debug, Clone, PartialEq, Eq)]
struct Config {
    remote_url: String,
    cache_path: PathBuf,
    interval: Duration,
    once: bool,
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    if let Err(err) = run().await {
        error!("sync-daemon failed: {err}");
        std::process::exit(1);
    }
}

async fn run() -> Result<(), String> {
    let args: Vec<String> = env::args().skip(1).collect();
    if args.iter().any(|arg| arg == "--help" || arg == "-h") {
        println!("{}", usage_text());
        return Ok(());
    }
    let config = config_from_inputs(args, |key| env::var(key).ok())?;

    let remote = RemoteStore::new(&config.remote_url).map_err(|err| err.to_string())?;
    let local = LocalCache::new(config.cache_path.clone());
    let client = Arc::new(SyncClient::new(Arc::new(remote), Arc::new(local)));

    let doc = client.load().await;
    info!(
        remote = %config.remote_url,
        cache = %config.cache_path.display(),
        outlets = doc.outlet_count(),
        last_updated = doc.last_updated().unwrap_or("none"),
        status = client.status().as_str(),
        "initial reconcile finished"
    );
    if config.once {
        return Ok(());
    }

    let (stop, shutdown) = oneshot::channel();
    let poll = client.clone().spawn_poll_loop(config.interval, shutdown);
    info!(interval_ms = config.interval.as_millis() as u64, "polling; ctrl-c to stop");

    tokio::signal::ctrl_c()
        .await
        .map_err(|err| format!("failed waiting for ctrl-c: {err}"))?;
    let _ = stop.send(());
    poll.await
        .map_err(|err| format!("poll loop ended abnormally: {err}"))?;
    info!(status = client.status().as_str(), "sync-daemon stopped");
    Ok(())
}

fn usage_text() -> &'static str {
    "Usage: sync-daemon [--once] [--remote URL] [--cache PATH] [--interval-ms N]\n\
Defaults:\n\
  --remote from PHOENIX_SYNC_REMOTE_URL (required)\n\
  --cache from PHOENIX_SYNC_CACHE_PATH, default phoenix-cache.json\n\
  --interval-ms from PHOENIX_SYNC_INTERVAL_MS, default 30000"
}

fn config_from_inputs<I, F>(args: I, env_lookup: F) -> Result<Config, String>
where
    I: IntoIterator<Item = String>,
    F: Fn(&str) -> Option<String>,
{
    let mut once = false;
    let mut remote_override: Option<String> = None;
    let mut cache_override: Option<String> = None;
    let mut interval_ms_override: Option<u64> = None;

    let mut args = args.into_iter();
    while let Some(arg) = args.next() {
        match arg.as_str() {
            "--once" => once = true,
            "--remote" => {
                remote_override = Some(
                    args.next()
                        .ok_or_else(|| "--remote requires a value".to_string())?,
                );
            }
            "--cache" => {
                cache_override = Some(
                    args.next()
                        .ok_or_else(|| "--cache requires a value".to_string())?,
                );
            }
            "--interval-ms" => {
                interval_ms_override = Some(parse_u64_arg(
                    "--interval-ms",
                    &args
                        .next()
                        .ok_or_else(|| "--interval-ms requires a value".to_string())?,
                )?);
            }
            _ => {
                if let Some(value) = arg.strip_prefix("--remote=") {
                    remote_override = Some(value.to_string());
                } else if let Some(value) = arg.strip_prefix("--cache=") {
                    cache_override = Some(value.to_string());
                } else if let Some(value) = arg.strip_prefix("--interval-ms=") {
                    interval_ms_override = Some(parse_u64_arg("--interval-ms", value)?);
                } else {
                    return Err(format!("unknown option '{arg}'"));
                }
            }
        }
    }

    let remote_url = remote_override
        .or_else(|| env_lookup("PHOENIX_SYNC_REMOTE_URL"))
        .ok_or_else(|| "remote url is required (--remote or PHOENIX_SYNC_REMOTE_URL)".to_string())?;
    if remote_url.trim().is_empty() {
        return Err("remote url is empty".to_string());
    }

    let cache_path = cache_override
        .or_else(|| env_lookup("PHOENIX_SYNC_CACHE_PATH"))
        .filter(|value| !value.trim().is_empty())
        .unwrap_or_else(|| DEFAULT_CACHE_PATH.to_string());

    let default_interval_ms = DEFAULT_POLL_INTERVAL.as_millis() as u64;
    let interval_ms = interval_ms_override
        .or_else(|| {
            env_lookup("PHOENIX_SYNC_INTERVAL_MS").and_then(|raw| raw.trim().parse::<u64>().ok())
        })
        .unwrap_or(default_interval_ms);
    if !once && interval_ms == 0 {
        return Err("poll interval must be > 0 in daemon loop mode".to_string());
    }

    Ok(Config {
        remote_url,
        cache_path: PathBuf::from(cache_path),
        interval: Duration::from_millis(interval_ms.max(1)),
        once,
    })
}

fn parse_u64_arg(flag: &str, raw: &str) -> Result<u64, String> {
    raw.parse::<u64>()
        .map_err(|_| format!("{flag} expects an integer, got '{raw}'"))
}
