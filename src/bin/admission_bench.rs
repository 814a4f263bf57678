// src/bin/admission_bench.rs

use http::{HeaderMap, HeaderValue};
use indicatif::{ProgressBar, ProgressStyle};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use structopt::StructOpt;
use tokio::sync::Barrier;
use tracing::{error, info};

use admission_limiter::config::{AdmissionConfig, LimiterConfig, RedisConfig};
use admission_limiter::storage::{MemoryStorage, RecordStore, RedisStorage};
use admission_limiter::{RateLimiter, Verdict};

#[derive(Debug, Clone, StructOpt)]
#[structopt(
    name = "admission_bench",
    about = "Measures admission throughput under same-key contention"
)]
struct Opt {
    /// Record store to use
    #[structopt(short, long, possible_values = &["memory", "redis"], default_value = "memory")]
    storage: String,

    /// Redis URL (when using Redis storage)
    #[structopt(long, default_value = "redis://localhost:6379")]
    redis_url: String,

    /// Maximum number of requests allowed per window
    #[structopt(short, long, default_value = "100000")]
    max_requests: u32,

    /// Requests allowed per 10s burst window
    #[structopt(short, long, default_value = "100000")]
    burst: u32,

    /// Window duration in seconds
    #[structopt(short, long, default_value = "60")]
    window_seconds: u64,

    /// Concurrent clients sharing one address
    #[structopt(short = "u", long, default_value = "16")]
    num_clients: usize,

    /// Requests per client
    #[structopt(short = "r", long, default_value = "50")]
    requests_per_client: usize,

    /// Number of iterations to run
    #[structopt(short, long, default_value = "3")]
    iterations: usize,

    /// Verbosity level
    #[structopt(short, long, parse(from_occurrences))]
    verbose: usize,

    /// Disable logs
    #[structopt(long)]
    disable_logs: bool,
}

#[derive(Debug, Default, Clone, Copy)]
struct Tally {
    allowed: usize,
    denied: usize,
    degraded: usize,
}

impl Tally {
    fn total(&self) -> usize {
        self.allowed + self.denied
    }

    fn add(&mut self, other: Tally) {
        self.allowed += other.allowed;
        self.denied += other.denied;
        self.degraded += other.degraded;
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let opt = Opt::from_args();

    let log_level = match (opt.disable_logs, opt.verbose) {
        (true, _) => "error",
        // contention warnings would drown the progress bar
        (false, 0) => "error",
        (false, 1) => "info",
        (false, 2) => "debug",
        _ => "trace",
    };
    admission_limiter::logging::init_with_default(&format!(
        "admission_bench={0},admission_limiter={0}",
        log_level
    ));

    let limiter_config = LimiterConfig::new(
        Duration::from_secs(opt.window_seconds),
        opt.max_requests,
        opt.burst,
    )?;
    let config = AdmissionConfig::from_env()?;

    let stop = Arc::new(AtomicBool::new(false));
    {
        let stop = stop.clone();
        ctrlc::set_handler(move || {
            stop.store(true, Ordering::SeqCst);
        })?;
    }

    match opt.storage.as_str() {
        "memory" => {
            let storage = open_store::<MemoryStorage>(config.memory.clone()).await?;
            let limiter = Arc::new(RateLimiter::new(storage, &config));
            run_benchmark(limiter, "Memory", &opt, limiter_config, stop).await
        }
        "redis" => {
            let redis_config = RedisConfig::new(opt.redis_url.clone());
            let storage = match open_store::<RedisStorage>(redis_config).await {
                Ok(storage) => storage,
                Err(e) => {
                    error!("Failed to connect to Redis: {}", e);
                    return Err(format!("Failed to connect to Redis: {}", e).into());
                }
            };
            let limiter = Arc::new(RateLimiter::new(storage, &config));
            run_benchmark(limiter, "Redis", &opt, limiter_config, stop).await
        }
        other => Err(format!("Unknown storage backend: {}", other).into()),
    }
}

async fn open_store<S: RecordStore>(config: S::Config) -> admission_limiter::Result<Arc<S>> {
    Ok(Arc::new(S::new(config).await?))
}

async fn run_benchmark<S: RecordStore + 'static>(
    limiter: Arc<RateLimiter<S>>,
    name: &str,
    opt: &Opt,
    limiter_config: LimiterConfig,
    stop: Arc<AtomicBool>,
) -> Result<(), Box<dyn std::error::Error>> {
    println!("\nRunning benchmark: {} ({})", name, limiter_config);
    println!("==================={}", "=".repeat(name.len()));

    let per_iteration = (opt.num_clients * opt.requests_per_client) as u64;
    let progress = ProgressBar::new(per_iteration * opt.iterations as u64);
    progress.set_style(
        ProgressStyle::with_template("{bar:40} {pos}/{len} admissions ({per_sec}) {msg}")?,
    );

    let mut total_duration = Duration::ZERO;
    let mut total = Tally::default();

    for iteration in 0..opt.iterations {
        if stop.load(Ordering::SeqCst) {
            break;
        }
        info!("Starting iteration {} of {}", iteration + 1, opt.iterations);

        // fresh address per iteration so earlier records don't count
        let mut headers = HeaderMap::new();
        headers.insert(
            "x-forwarded-for",
            HeaderValue::from_str(&format!("10.99.{}.1", iteration % 256))?,
        );
        let headers = Arc::new(headers);

        let start_time = Instant::now();
        let barrier = Arc::new(Barrier::new(opt.num_clients));
        let mut handles = Vec::with_capacity(opt.num_clients);

        for _ in 0..opt.num_clients {
            let limiter = limiter.clone();
            let barrier = barrier.clone();
            let headers = headers.clone();
            let progress = progress.clone();
            let stop = stop.clone();
            let requests = opt.requests_per_client;

            handles.push(tokio::spawn(async move {
                barrier.wait().await;

                let mut tally = Tally::default();
                for _ in 0..requests {
                    if stop.load(Ordering::Relaxed) {
                        break;
                    }
                    match limiter.admit(&headers, &limiter_config, None).await {
                        Verdict::Allowed(allowance) => {
                            tally.allowed += 1;
                            if allowance.degraded.is_some() {
                                tally.degraded += 1;
                            }
                        }
                        Verdict::Denied(_) => tally.denied += 1,
                    }
                    progress.inc(1);
                }
                tally
            }));
        }

        let mut iteration_tally = Tally::default();
        for result in futures::future::join_all(handles).await {
            match result {
                Ok(tally) => iteration_tally.add(tally),
                Err(e) => error!("Benchmark task failed: {}", e),
            }
        }

        let elapsed = start_time.elapsed();
        total_duration += elapsed;
        total.add(iteration_tally);

        progress.println(format!(
            "Iteration {}: {:?}, {} allowed ({} degraded), {} denied, {:.2} req/sec",
            iteration + 1,
            elapsed,
            iteration_tally.allowed,
            iteration_tally.degraded,
            iteration_tally.denied,
            iteration_tally.total() as f64 / elapsed.as_secs_f64()
        ));
    }

    if stop.load(Ordering::SeqCst) {
        progress.abandon_with_message("interrupted");
    } else {
        progress.finish_with_message("done");
    }

    let total_requests = total.total();
    if total_requests == 0 {
        println!("\nNo admissions completed");
        return Ok(());
    }

    let pct = |n: usize| 100.0 * n as f64 / total_requests as f64;
    println!("\nBenchmark Results for {}:", name);
    println!("  Total Requests:     {}", total_requests);
    println!("  Allowed:            {} ({:.1}%)", total.allowed, pct(total.allowed));
    println!("  Degraded:           {} ({:.1}%)", total.degraded, pct(total.degraded));
    println!("  Denied:             {} ({:.1}%)", total.denied, pct(total.denied));
    println!(
        "  Avg. Throughput:    {:.2} requests/second",
        total_requests as f64 / total_duration.as_secs_f64()
    );

    Ok(())
}
