//! strand-cli: runs a sample workload through the strand-core primitives.
//!
//! Usage: `strand-cli [pool-config.json]`
//!
//! The optional JSON file holds a `PoolConfig`
//! (`{"concurrency": 3, "payload": 4}`); missing fields use the defaults.
//! Logs go to stderr (`RUST_LOG` overrides the `info` default), the JSON
//! summary to stdout.

use std::error::Error;
use std::io;
use std::sync::Arc;
use std::sync::atomic::{AtomicU32, AtomicUsize, Ordering};
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use rand::Rng;
use serde::Serialize;
use strand_core::bridge::{from_future, into_future};
use strand_core::domain::Callback;
use strand_core::queue::{Batch, IdleListener, PoolPhase};
use strand_core::{
    Cargo, CompletionResult, Flow, FlowError, PoolConfig, RetryPolicy, Scheduler, Task, TokioScheduler, WorkQueue,
    task,
};
use tokio::runtime::Handle;
use tokio::sync::mpsc;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use ulid::Ulid;

const QUEUE_ITEMS: u64 = 20;
const CARGO_ITEMS: u64 = 12;

#[derive(Debug, Serialize)]
struct Summary {
    run_id: Ulid,
    started_at: DateTime<Utc>,
    config: PoolConfig,
    queue: StageReport,
    cargo: StageReport,
    retry: RetryReport,
    parallel: Vec<u64>,
    elapsed_ms: u128,
}

#[derive(Debug, Default, Serialize)]
struct StageReport {
    succeeded: usize,
    failed: usize,
    drains: usize,
    total: u64,
    phase: PoolPhase,
}

#[derive(Debug, Serialize)]
struct RetryReport {
    attempts: u32,
    outcome: String,
}

fn init_tracing() {
    // defaults to INFO if RUST_LOG is not set
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::registry()
        .with(env_filter)
        .with(tracing_subscriber::fmt::layer().with_writer(io::stderr))
        .init();
}

fn load_config() -> Result<PoolConfig, Box<dyn Error>> {
    match std::env::args().nth(1) {
        Some(path) => {
            let text = std::fs::read_to_string(&path).map_err(|e| format!("{path}: {e}"))?;
            let config = PoolConfig::from_json(&text)?;
            info!(%path, ?config, "pool config loaded");
            Ok(config)
        }
        None => Ok(PoolConfig::default()),
    }
}

/// Random pause standing in for I/O.
fn jitter() -> Duration {
    Duration::from_millis(rand::thread_rng().gen_range(5..40))
}

fn drain_counter() -> (Arc<dyn IdleListener>, Arc<AtomicUsize>) {
    let drains = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&drains);
    let listener: Arc<dyn IdleListener> = Arc::new(move || {
        counter.fetch_add(1, Ordering::SeqCst);
    });
    (listener, drains)
}

async fn collect(mut rx: mpsc::UnboundedReceiver<CompletionResult<u64>>, expected: u64) -> StageReport {
    let mut report = StageReport::default();
    for _ in 0..expected {
        let Some(result) = rx.recv().await else {
            break;
        };
        match result {
            CompletionResult::Success(value) => {
                report.succeeded += 1;
                report.total += value;
            }
            CompletionResult::Failure(cause) => {
                warn!(error = %cause, "item failed");
                report.failed += 1;
            }
        }
    }
    report
}

/// Squares numbers one item at a time, `concurrency` in flight.
async fn run_queue(scheduler: Arc<dyn Scheduler>, config: &PoolConfig) -> Result<StageReport, FlowError> {
    let handle = Handle::current();
    let queue = WorkQueue::with_config(scheduler, config, move |n: u64, cb: Callback<u64>| {
        let pause = jitter();
        handle.spawn(async move {
            tokio::time::sleep(pause).await;
            cb(CompletionResult::success(n * n));
        });
    })?;
    let (listener, drains) = drain_counter();
    queue.add_listener(listener);

    let (tx, rx) = mpsc::unbounded_channel();
    for n in 1..=QUEUE_ITEMS {
        let tx = tx.clone();
        queue.add(
            n,
            Box::new(move |result| {
                let _ = tx.send(result);
            }),
        );
    }
    info!(pending = queue.len(), running = queue.running(), "queue loaded");

    let mut report = collect(rx, QUEUE_ITEMS).await;
    report.drains = drains.load(Ordering::SeqCst);
    report.phase = queue.phase();
    Ok(report)
}

/// Doubles numbers in batches of `payload`; every seventh item is left
/// unreported to show the batch-end policy.
async fn run_cargo(scheduler: Arc<dyn Scheduler>, config: &PoolConfig) -> Result<StageReport, FlowError> {
    let handle = Handle::current();
    let cargo = Cargo::with_config(scheduler, config, move |batch: Batch<u64, u64>, done: Callback<()>| {
        let pause = jitter();
        info!(size = batch.len(), "batch started");
        handle.spawn(async move {
            tokio::time::sleep(pause).await;
            for item in batch {
                if item.payload % 7 != 0 {
                    (item.callback)(CompletionResult::success(item.payload * 2));
                }
            }
            done(CompletionResult::success(()));
        });
    })?;
    let (listener, drains) = drain_counter();
    cargo.add_listener(listener);

    let (tx, rx) = mpsc::unbounded_channel();
    let items: Vec<u64> = (1..=CARGO_ITEMS).collect();
    let (urgent, rest) = items.split_at(2);
    cargo.add(rest.to_vec(), item_sender(&tx), false);
    cargo.add(urgent.to_vec(), item_sender(&tx), true);

    let mut report = collect(rx, CARGO_ITEMS).await;
    report.drains = drains.load(Ordering::SeqCst);
    report.phase = cargo.phase();
    Ok(report)
}

fn item_sender(tx: &mpsc::UnboundedSender<CompletionResult<u64>>) -> impl Fn(CompletionResult<u64>) + Send + Sync + 'static {
    let tx = tx.clone();
    move |result| {
        let _ = tx.send(result);
    }
}

/// A task that fails twice before succeeding, retried with a delay.
async fn run_retry(flow: &Flow) -> Result<RetryReport, FlowError> {
    let attempts = Arc::new(AtomicU32::new(0));
    let counter = Arc::clone(&attempts);
    let policy = RetryPolicy::new(4)?.with_delay(Duration::from_millis(15))?;
    let flow = flow.clone();

    let result = into_future(task(move |done| {
        flow.retry(
            policy,
            move |cb: Callback<String>| {
                let n = counter.fetch_add(1, Ordering::SeqCst) + 1;
                if n < 3 {
                    cb(CompletionResult::failure(FlowError::failed(format!("flaky upstream (attempt {n})"))));
                } else {
                    cb(CompletionResult::success(format!("ok after {n} attempts")));
                }
            },
            done,
        )
    }))
    .await;

    let outcome = match result {
        CompletionResult::Success(message) => message,
        CompletionResult::Failure(cause) => cause.to_string(),
    };
    Ok(RetryReport {
        attempts: attempts.load(Ordering::SeqCst),
        outcome,
    })
}

/// Three async lookups joined with `parallel`; results stay in input order.
async fn run_parallel(flow: &Flow, handle: &Handle) -> Result<Vec<u64>, FlowError> {
    let tasks: Vec<Task<u64>> = [3u64, 1, 2]
        .into_iter()
        .map(|n| {
            from_future(handle.clone(), async move {
                tokio::time::sleep(Duration::from_millis(10 * n)).await;
                Ok::<_, io::Error>(n * 100)
            })
        })
        .collect();
    let flow = flow.clone();
    into_future(task(move |done| flow.parallel(tasks, done)))
        .await
        .into_result()
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    init_tracing();
    let config = load_config()?;
    let run_id = Ulid::new();
    let started_at = Utc::now();
    let started = Instant::now();
    info!(%run_id, "run started");

    let line = Arc::new(TokioScheduler::current());
    let handle = line.handle().clone();
    let flow = Flow::new(line);

    let queue = run_queue(Arc::clone(flow.scheduler()), &config).await?;
    info!(?queue, "queue stage finished");
    let cargo = run_cargo(Arc::clone(flow.scheduler()), &config).await?;
    info!(?cargo, "cargo stage finished");
    let retry = run_retry(&flow).await?;
    info!(?retry, "retry stage finished");
    let parallel = run_parallel(&flow, &handle).await?;

    let summary = Summary {
        run_id,
        started_at,
        config,
        queue,
        cargo,
        retry,
        parallel,
        elapsed_ms: started.elapsed().as_millis(),
    };
    println!("{}", serde_json::to_string_pretty(&summary)?);
    Ok(())
}
