//! Partitioned batch execution on a bounded worker pool.

use std::collections::HashMap;
use std::future::Future;
use std::hash::Hash;
use std::sync::Arc;
use std::time::{Duration, Instant};

use metrics::{counter, histogram};
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{debug, error};

use crate::application::error::ResolveError;
use crate::application::store::StoreHandle;

pub(crate) const METRIC_BATCH_QUERY_MS: &str = "glossa_batch_query_ms";
pub(crate) const METRIC_BATCH_TOTAL: &str = "glossa_batch_total";

const DEFAULT_BATCH_SIZE: usize = 1000;
const DEFAULT_BATCH_WORKERS: usize = 5;
const DEFAULT_BATCH_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BatchSettings {
    /// Largest number of keys handled by one query.
    pub batch_size: usize,
    /// Batches running at the same time.
    pub workers: usize,
    /// Upper bound on waiting for all batches of a partitioned run.
    pub timeout: Duration,
}

impl Default for BatchSettings {
    fn default() -> Self {
        Self {
            batch_size: DEFAULT_BATCH_SIZE,
            workers: DEFAULT_BATCH_WORKERS,
            timeout: DEFAULT_BATCH_TIMEOUT,
        }
    }
}

/// Runs `run` over `keys`, splitting them into batches of at most
/// `settings.batch_size`.
///
/// A single batch runs inline. Larger inputs are spread over at most
/// `settings.workers` concurrent tasks and merged; any batch error, or the
/// timeout elapsing, fails the whole call and aborts the remaining tasks.
pub async fn run_partitioned<K, V, F, Fut>(
    settings: &BatchSettings,
    store: &StoreHandle,
    keys: Vec<K>,
    run: F,
) -> Result<HashMap<K, V>, ResolveError>
where
    K: Eq + Hash + Send + 'static,
    V: Send + 'static,
    F: Fn(Vec<K>) -> Fut,
    Fut: Future<Output = Result<HashMap<K, V>, ResolveError>> + Send + 'static,
{
    if keys.is_empty() {
        return Ok(HashMap::new());
    }

    let batch_size = settings.batch_size.max(1);
    if keys.len() <= batch_size {
        let started_at = Instant::now();
        let outcome = run(keys).await;
        record_batch(started_at, "single", outcome.is_ok());
        return outcome;
    }

    let chunks = partition(keys, batch_size);
    let batches = chunks.len();
    debug!(
        store = %store,
        batches,
        batch_size,
        workers = settings.workers,
        "Running partitioned resolution"
    );

    let permits = Arc::new(Semaphore::new(settings.workers.max(1)));
    let mut tasks = JoinSet::new();
    for chunk in chunks {
        let permits = Arc::clone(&permits);
        let work = run(chunk);
        tasks.spawn(async move {
            let _permit = permits
                .acquire_owned()
                .await
                .map_err(|err| ResolveError::worker(err.to_string()))?;
            let started_at = Instant::now();
            let outcome = work.await;
            record_batch(started_at, "partitioned", outcome.is_ok());
            outcome
        });
    }

    let merge = async {
        let mut merged = HashMap::new();
        while let Some(joined) = tasks.join_next().await {
            let partial = joined.map_err(|err| ResolveError::worker(err.to_string()))??;
            merged.extend(partial);
        }
        Ok::<_, ResolveError>(merged)
    };

    let waited = tokio::time::timeout(settings.timeout, merge).await;
    match waited {
        Ok(outcome) => outcome,
        Err(_) => {
            tasks.abort_all();
            error!(
                store = %store,
                batches,
                timeout_ms = settings.timeout.as_millis() as u64,
                "Partitioned resolution timed out"
            );
            Err(ResolveError::Timeout {
                store: store.clone(),
                timeout: settings.timeout,
                batches,
            })
        }
    }
}

fn partition<K>(keys: Vec<K>, batch_size: usize) -> Vec<Vec<K>> {
    let mut chunks = Vec::with_capacity(keys.len().div_ceil(batch_size));
    let mut keys = keys.into_iter();
    loop {
        let chunk: Vec<K> = keys.by_ref().take(batch_size).collect();
        if chunk.is_empty() {
            break;
        }
        chunks.push(chunk);
    }
    chunks
}

fn record_batch(started_at: Instant, mode: &'static str, ok: bool) {
    histogram!(METRIC_BATCH_QUERY_MS, "mode" => mode)
        .record(started_at.elapsed().as_secs_f64() * 1000.0);
    counter!(
        METRIC_BATCH_TOTAL,
        "mode" => mode,
        "result" => if ok { "ok" } else { "error" }
    )
    .increment(1);
}
