use std::{
    sync::{
        Arc,
        atomic::{AtomicBool, AtomicU64, Ordering},
    },
    time::{Duration, Instant},
};

use clap::{Parser, ValueEnum};
use hdrhistogram::Histogram;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use zwindow::memory::MemoryWindowStore;
use zwindow::{
    Capacity, SlidingWindowOptions, SlidingWindowRateLimiter, WindowDurationMs, WindowKey,
    WindowStore,
};

#[derive(Clone, Copy, Debug, PartialEq, ValueEnum)]
enum Backend {
    Memory,
    Redis,
}

#[derive(Clone, Copy, Debug, PartialEq, ValueEnum)]
enum Op {
    /// Atomic check-and-record.
    Allow,
    /// Advisory wait hint; records every attempt.
    TimeLeft,
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum KeyDist {
    Hot,
    Uniform,
}

#[derive(Parser, Debug, Clone)]
#[command(
    name = "zwindow-stress",
    about = "Load test / benchmark harness for zwindow"
)]
struct Args {
    #[arg(long, value_enum, default_value_t = Backend::Memory)]
    backend: Backend,

    #[arg(long, value_enum, default_value_t = Op::Allow)]
    op: Op,

    #[arg(long, value_enum, default_value_t = KeyDist::Hot)]
    key_dist: KeyDist,

    /// Number of concurrent callers.
    #[arg(long, default_value_t = 8)]
    concurrency: usize,

    #[arg(long, default_value_t = 30)]
    duration_s: u64,

    #[arg(long, default_value_t = 1000)]
    window_ms: u64,

    #[arg(long, default_value_t = 100)]
    capacity: u64,

    #[arg(long, default_value_t = 10_000)]
    key_space: usize,

    #[arg(long, default_value_t = 10)]
    sample_every: u64,

    #[arg(long, default_value = "redis://127.0.0.1:16379/")]
    redis_url: String,

    #[arg(long, default_value = "stress")]
    redis_prefix: String,
}

#[derive(Default)]
struct Counts {
    allowed: AtomicU64,
    rejected: AtomicU64,
    errors: AtomicU64,
}

fn build_keys(args: &Args) -> Vec<String> {
    let n = match args.key_dist {
        KeyDist::Hot => 1,
        KeyDist::Uniform => args.key_space.max(1),
    };
    (0..n).map(|i| format!("user_{i}")).collect()
}

fn build_options(args: &Args, prefix: Option<WindowKey>) -> SlidingWindowOptions {
    SlidingWindowOptions {
        window_duration_ms: WindowDurationMs::try_from(args.window_ms).unwrap(),
        capacity: Capacity::try_from(args.capacity).unwrap(),
        prefix,
    }
}

fn should_sample(iter: u64, sample_every: u64) -> bool {
    if sample_every <= 1 {
        return true;
    }

    iter.is_multiple_of(sample_every)
}

fn print_results(
    args: &Args,
    elapsed: Duration,
    ops: u64,
    ops_s: f64,
    hist: &Histogram<u64>,
    counts: &Counts,
) {
    println!("backend={:?} op={:?}", args.backend, args.op);
    println!(
        "concurrency={} duration_s={} window_ms={} capacity={} key_dist={:?} key_space={}",
        args.concurrency,
        args.duration_s,
        args.window_ms,
        args.capacity,
        args.key_dist,
        args.key_space
    );
    println!(
        "elapsed_s={:.3} ops={} ops_per_s={:.0}",
        elapsed.as_secs_f64(),
        ops,
        ops_s
    );
    println!(
        "allowed={} rejected={} errors={}",
        counts.allowed.load(Ordering::Relaxed),
        counts.rejected.load(Ordering::Relaxed),
        counts.errors.load(Ordering::Relaxed)
    );
    if !hist.is_empty() {
        let p50 = hist.value_at_quantile(0.50);
        let p95 = hist.value_at_quantile(0.95);
        let p99 = hist.value_at_quantile(0.99);
        let p999 = hist.value_at_quantile(0.999);
        println!(
            "lat_us p50={} p95={} p99={} p999={} max={}",
            p50,
            p95,
            p99,
            p999,
            hist.max()
        );
        println!("sample_every={} samples={}", args.sample_every, hist.len());
    } else {
        println!("no latency samples collected");
    }
}

async fn run<S>(args: Args, rl: Arc<SlidingWindowRateLimiter<S>>)
where
    S: WindowStore + 'static,
{
    let keys = Arc::new(build_keys(&args));

    let stop = Arc::new(AtomicBool::new(false));
    let counts = Arc::new(Counts::default());
    let total_ops = Arc::new(AtomicU64::new(0));

    let started = Instant::now();
    let deadline = started + Duration::from_secs(args.duration_s);

    let mut join = Vec::with_capacity(args.concurrency);
    for t in 0..args.concurrency {
        let rl = Arc::clone(&rl);
        let keys = Arc::clone(&keys);
        let stop = Arc::clone(&stop);
        let counts = Arc::clone(&counts);
        let total_ops = Arc::clone(&total_ops);
        let args = args.clone();

        join.push(tokio::spawn(async move {
            let mut hist = Histogram::<u64>::new_with_bounds(1, 60_000_000, 3).unwrap();
            let mut i = 0_u64;
            let mut seed = (t as u64 + 1) * 0x9E37_79B9_7F4A_7C15;

            let mut rng_u64 = || {
                // xorshift64*
                seed ^= seed >> 12;
                seed ^= seed << 25;
                seed ^= seed >> 27;
                seed = seed.wrapping_mul(0x2545_F491_4F6C_DD1D);
                seed
            };

            while !stop.load(Ordering::Relaxed) {
                if Instant::now() >= deadline {
                    break;
                }

                i = i.wrapping_add(1);
                let k = &keys[(rng_u64() as usize) % keys.len()];
                let sample = should_sample(i, args.sample_every);
                let t0 = if sample { Some(Instant::now()) } else { None };

                let res = match args.op {
                    Op::Allow => rl.allow_request(k).await,
                    Op::TimeLeft => rl.time_left(k).await.map(|wait_ms| wait_ms == 0),
                };

                if let Some(t0) = t0 {
                    let us = t0.elapsed().as_micros() as u64;
                    let _ = hist.record(us.max(1));
                }

                total_ops.fetch_add(1, Ordering::Relaxed);
                match res {
                    Ok(true) => {
                        counts.allowed.fetch_add(1, Ordering::Relaxed);
                    }
                    Ok(false) => {
                        counts.rejected.fetch_add(1, Ordering::Relaxed);
                    }
                    Err(err) => {
                        // one line per thousand errors is enough to spot a dead backend
                        if counts.errors.fetch_add(1, Ordering::Relaxed) % 1000 == 0 {
                            warn!(error = %err, "stress.op.error");
                        }
                    }
                }
            }

            hist
        }));
    }

    tokio::time::sleep(Duration::from_secs(args.duration_s)).await;
    stop.store(true, Ordering::Relaxed);

    let mut merged = Histogram::<u64>::new_with_bounds(1, 60_000_000, 3).unwrap();
    for j in join {
        let hist = j.await.unwrap();
        merged.add(&hist).unwrap();
    }

    let elapsed = started.elapsed();
    let ops = total_ops.load(Ordering::Relaxed);
    let ops_s = ops as f64 / elapsed.as_secs_f64();
    print_results(&args, elapsed, ops, ops_s, &merged, &counts);
}

async fn run_memory(args: Args) {
    let rl = Arc::new(SlidingWindowRateLimiter::new(
        build_options(&args, None),
        MemoryWindowStore::new(),
    ));
    run(args, rl).await;
}

#[cfg(feature = "redis-tokio")]
async fn run_redis(args: Args) {
    use zwindow::redis::{RedisWindowStore, ZwindowRedisClient};

    let client = redis::Client::open(args.redis_url.as_str()).unwrap();
    let store = RedisWindowStore::new(
        ZwindowRedisClient::from_client(client, args.concurrency.clamp(1, 16))
            .await
            .unwrap(),
    );
    let prefix = WindowKey::try_from(args.redis_prefix.clone()).unwrap();

    let rl = Arc::new(SlidingWindowRateLimiter::new(
        build_options(&args, Some(prefix)),
        store,
    ));
    run(args, rl).await;
}

#[cfg(not(feature = "redis-tokio"))]
async fn run_redis(_: Args) {
    eprintln!("redis backend requires: cargo run -p zwindow-stress --features redis-tokio -- ...");
    std::process::exit(2);
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_target(false)
        .init();

    let args = Args::parse();
    info!(backend = ?args.backend, op = ?args.op, "stress.start");

    let rt = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .worker_threads(args.concurrency.clamp(2, 64))
        .build()
        .unwrap();

    rt.block_on(async move {
        match args.backend {
            Backend::Memory => run_memory(args).await,
            Backend::Redis => run_redis(args).await,
        }
    });
}
