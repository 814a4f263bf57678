// src/bin/admission_cli.rs

#[macro_use]
extern crate prettytable;

use http::{HeaderMap, HeaderValue};
use prettytable::Table;
use std::sync::Arc;
use std::time::{Duration, Instant};
use structopt::StructOpt;
use tokio::time;
use tracing::{error, info, warn};

use admission_limiter::config::{AdmissionConfig, LimiterConfig, RedisConfig};
use admission_limiter::storage::{MemoryStorage, RecordStore, RedisStorage};
use admission_limiter::{RateLimiter, SessionScope, Verdict};

#[derive(Debug, StructOpt)]
#[structopt(
    name = "admission_cli",
    about = "Replays a request pattern against an admission preset"
)]
struct Opt {
    /// Limiter preset to apply
    #[structopt(short, long, possible_values = &["public_api", "analytics", "signup"], default_value = "public_api")]
    preset: String,

    /// Record store to use
    #[structopt(short, long, possible_values = &["memory", "redis"], default_value = "memory")]
    storage: String,

    /// Redis URL (overrides ADMISSION_REDIS_URL when using Redis storage)
    #[structopt(long)]
    redis_url: Option<String>,

    /// Client address sent as x-forwarded-for
    #[structopt(long, default_value = "203.0.113.10")]
    ip: String,

    /// Session id for the session scope (needs --identifier too)
    #[structopt(long)]
    session_id: Option<String>,

    /// Resource identifier for the session scope
    #[structopt(long)]
    identifier: Option<String>,

    /// Request pattern
    #[structopt(long, possible_values = &["burst", "steady"], default_value = "burst")]
    simulation: String,

    /// Number of requests to simulate
    #[structopt(short = "n", long, default_value = "15")]
    num_requests: usize,

    /// Time between requests in milliseconds (steady mode)
    #[structopt(short = "t", long, default_value = "1000")]
    request_interval_ms: u64,

    /// Verbosity level
    #[structopt(short, long, parse(from_occurrences))]
    verbose: usize,

    /// Disable logs
    #[structopt(long)]
    disable_logs: bool,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let opt = Opt::from_args();

    let log_level = match (opt.disable_logs, opt.verbose) {
        (true, _) => "error",
        (false, 0) => "info",
        (false, 1) => "debug",
        _ => "trace",
    };
    admission_limiter::logging::init_with_default(&format!(
        "admission_cli={0},admission_limiter={0}",
        log_level
    ));

    let limiter_config: LimiterConfig = opt.preset.parse()?;
    let mut config = AdmissionConfig::from_env()?;

    info!(
        "Simulating {} requests against {} ({})",
        opt.num_requests, opt.preset, limiter_config
    );

    match opt.storage.as_str() {
        "memory" => {
            let storage = open_store::<MemoryStorage>(config.memory.clone()).await?;
            let limiter = RateLimiter::new(storage, &config);
            run_simulation(&opt, &limiter, &limiter_config).await
        }
        "redis" => {
            if let Some(url) = &opt.redis_url {
                config.redis = Some(RedisConfig::new(url.clone()));
            }
            let redis_config = config
                .redis
                .clone()
                .unwrap_or_else(|| RedisConfig::new("redis://localhost:6379"));

            let storage = match open_store::<RedisStorage>(redis_config).await {
                Ok(storage) => storage,
                Err(e) => {
                    error!("Failed to connect to Redis: {}", e);
                    return Err(e.into());
                }
            };
            let limiter = RateLimiter::new(storage, &config);
            run_simulation(&opt, &limiter, &limiter_config).await
        }
        other => Err(format!("Unknown storage backend: {}", other).into()),
    }
}

async fn open_store<S: RecordStore>(config: S::Config) -> admission_limiter::Result<Arc<S>> {
    Ok(Arc::new(S::new(config).await?))
}

async fn run_simulation<S: RecordStore>(
    opt: &Opt,
    limiter: &RateLimiter<S>,
    limiter_config: &LimiterConfig,
) -> Result<(), Box<dyn std::error::Error>> {
    let mut headers = HeaderMap::new();
    headers.insert("x-forwarded-for", HeaderValue::from_str(&opt.ip)?);

    let session =
        SessionScope::from_parts(opt.session_id.as_deref(), opt.identifier.as_deref());
    if opt.session_id.is_some() && session.is_none() {
        warn!("Session scope needs both --session-id and --identifier; checking IP only");
    }

    let interval = match opt.simulation.as_str() {
        "burst" => Duration::ZERO,
        _ => Duration::from_millis(opt.request_interval_ms),
    };

    let mut table = Table::new();
    table.set_titles(row![
        "#",
        "Verdict",
        "Scope",
        "Remaining",
        "Retry-After",
        "Note"
    ]);

    let mut allowed_count = 0;
    let mut denied_count = 0;
    let mut first_denial = None;
    let start_time = Instant::now();

    for i in 0..opt.num_requests {
        let request_time = Instant::now();
        let verdict = limiter
            .admit(&headers, limiter_config, session.as_ref())
            .await;

        match &verdict {
            Verdict::Allowed(allowance) => {
                allowed_count += 1;
                let note = allowance
                    .degraded
                    .map(|cause| format!("degraded: {:?}", cause))
                    .unwrap_or_default();
                table.add_row(row![
                    i + 1,
                    "ALLOWED",
                    "",
                    allowance.remaining,
                    "",
                    note
                ]);
            }
            Verdict::Denied(denial) => {
                denied_count += 1;
                table.add_row(row![
                    i + 1,
                    "DENIED",
                    denial.scope,
                    0,
                    denial.retry_after_secs,
                    denial.reason
                ]);
                first_denial.get_or_insert(verdict);
            }
        }

        let elapsed = request_time.elapsed();
        if elapsed < interval {
            time::sleep(interval - elapsed).await;
        }
    }

    let elapsed = start_time.elapsed();

    table.printstd();

    println!("\nSimulation Results:");
    println!("-------------------");
    println!("Total requests: {}", opt.num_requests);
    println!("Allowed: {}", allowed_count);
    println!("Denied: {}", denied_count);
    println!("Time elapsed: {:?}", elapsed);

    if let Some(rejection) = first_denial.and_then(|v| v.rejection()) {
        let code = rejection.code.as_str();
        let response = rejection.into_response()?;
        println!("\nFirst rejection: {} ({})", response.status(), code);
        for (name, value) in response.headers() {
            println!("  {}: {}", name, value.to_str().unwrap_or("<binary>"));
        }
        println!("  {}", response.body());
    }

    Ok(())
}
