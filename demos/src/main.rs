use anyhow::{Context, Result};
use clap::Parser;
use metrics_exporter_prometheus::PrometheusBuilder;
use mock_store::MockStore;
use stampede::prelude::*;
use std::net::SocketAddr;
use std::num::NonZeroU32;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};
use tracing_subscriber::{fmt, EnvFilter};

/// Run a write load test against an in-memory store.
#[derive(Parser, Debug)]
#[command(name = "stampede-demo", version)]
struct Args {
    /// Name reported for the target table
    #[arg(long, default_value = "demo-table")]
    target: String,

    /// Maximum writes in flight
    #[arg(short, long, default_value_t = 32)]
    concurrency: usize,

    /// Total items to write
    #[arg(short = 'n', long, default_value_t = 10_000)]
    items: u64,

    /// Share of items and concurrency used for the sustain phase (0.1 - 100)
    #[arg(long, default_value_t = 100.)]
    max_concurrency_percentage: f64,

    /// Share of writes that reuse an earlier key (0 - 100)
    #[arg(long, default_value_t = 0.)]
    duplicate_percentage: f64,

    /// Delete every written key once the run ends
    #[arg(long)]
    cleanup: bool,

    #[arg(long, default_value = "local")]
    environment: String,

    #[arg(long, default_value_t = 512)]
    payload_bytes: usize,

    /// Cap on item dispatch rate
    #[arg(long)]
    max_tps: Option<NonZeroU32>,

    #[arg(long)]
    seed: Option<u64>,

    /// Simulated store latency in milliseconds
    #[arg(long, default_value_t = 5)]
    store_latency_ms: u64,

    /// Standard deviation of the simulated latency in milliseconds
    #[arg(long, default_value_t = 0)]
    store_jitter_ms: u64,

    /// Writes per second the store accepts before throttling
    #[arg(long)]
    store_capacity: Option<NonZeroU32>,

    /// Probability (0 - 1) that the store drops a write with a connection reset
    #[arg(long, default_value_t = 0.)]
    store_failure_rate: f64,

    /// Serve Prometheus metrics on this address
    #[arg(long)]
    metrics_addr: Option<SocketAddr>,
}

impl Args {
    fn run_config(&self) -> RunConfig {
        let mut config = RunConfig::new(&self.target)
            .concurrency_limit(self.concurrency)
            .total_items(self.items)
            .max_concurrency_percentage(self.max_concurrency_percentage)
            .duplicate_percentage(self.duplicate_percentage)
            .cleanup_after_run(self.cleanup)
            .environment_tag(&self.environment)
            .payload_bytes(self.payload_bytes);
        if let Some(tps) = self.max_tps {
            config = config.max_tps(tps);
        }
        if let Some(seed) = self.seed {
            config = config.seed(seed);
        }
        config
    }

    fn store(&self) -> MockStore {
        let mut store = MockStore::new().latency(Duration::from_millis(self.store_latency_ms));
        if self.store_jitter_ms > 0 {
            store = store.jitter(Duration::from_millis(self.store_jitter_ms));
        }
        if let Some(capacity) = self.store_capacity {
            store = store.capacity(capacity);
        }
        if self.store_failure_rate > 0. {
            store = store.fail_rate(self.store_failure_rate, FailureKind::ConnectionReset);
        }
        store
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("stampede=info")),
        )
        .init();

    let args = Args::parse();

    if let Some(addr) = args.metrics_addr {
        PrometheusBuilder::new()
            .with_http_listener(addr)
            .install()
            .context("installing Prometheus exporter")?;
        info!("Serving metrics on {addr}");
    }

    let test = LoadTest::new(Arc::new(args.store()), args.run_config());
    let handle = test.handle();

    let signal_handle = handle.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupted; draining in-flight writes");
            signal_handle.cancel();
        }
    });

    let progress_handle = handle.clone();
    let progress = tokio::spawn(async move {
        let mut interval = tokio::time::interval(Duration::from_secs(5));
        interval.tick().await;
        loop {
            interval.tick().await;
            if let Some(snapshot) = progress_handle.snapshot() {
                info!(
                    phase = %progress_handle.phase(),
                    "{} ops, {} errors, p99 {:?}",
                    snapshot.total_operations,
                    snapshot.total_errors,
                    snapshot.latency.p99
                );
            }
        }
    });

    let summary = test.await.context("load test failed")?;
    progress.abort();

    println!("{summary}");
    Ok(())
}
