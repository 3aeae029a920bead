use crate::classifier::classify_port;
use crate::config::{PortSet, ScanConfig};
use crate::error::{ConfigError, ProbeError};
use crate::probe::{NetworkProber, Prober};
use crate::types::{PortType, ScanReport, ScanResult, ScanTarget};
use futures::FutureExt;
use std::any::Any;
use std::collections::HashMap;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;
use tokio::task::{JoinError, JoinSet};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use ::time::{format_description::well_known, OffsetDateTime};

/// Classify every port in `start..=end` on `host`.
///
/// - At most `concurrency` ports are classified at the same time.
/// - Each probe is bounded by `timeout`, dial and handshake together.
/// - Returns exactly one result per port, sorted by address then port.
/// - Only invalid parameters fail; per-port errors end up in the results.
pub async fn scan(
    host: &str,
    start: u16,
    end: u16,
    timeout: Duration,
    concurrency: usize,
) -> Result<Vec<ScanResult>, ConfigError> {
    let config = ScanConfig::new(host, PortSet::range(start, end)?, timeout, concurrency)?;
    Ok(scan_ports(&config).await.results)
}

/// Scan with a validated config and return the full report.
pub async fn scan_ports(config: &ScanConfig) -> ScanReport {
    scan_internal(Arc::new(NetworkProber), config, CancellationToken::new()).await
}

/// Variant that accepts a `CancellationToken` to allow external cancellation.
///
/// Once cancelled no further port is submitted. Ports already submitted run
/// to completion and are the only ones in the report.
pub async fn scan_ports_with_cancel(config: &ScanConfig, cancel: CancellationToken) -> ScanReport {
    scan_internal(Arc::new(NetworkProber), config, cancel).await
}

/// Scan through a caller-supplied [`Prober`].
pub async fn scan_with_prober<P>(
    prober: Arc<P>,
    config: &ScanConfig,
    cancel: CancellationToken,
) -> ScanReport
where
    P: Prober + 'static,
{
    scan_internal(prober, config, cancel).await
}

async fn scan_internal<P>(prober: Arc<P>, config: &ScanConfig, cancel: CancellationToken) -> ScanReport
where
    P: Prober + 'static,
{
    let started = Instant::now();
    let started_at = now_rfc3339();
    let total = config.ports.len() as u64;

    let sem = Arc::new(Semaphore::new(config.concurrency.max(1)));
    let mut set = JoinSet::new();
    let mut submitted = HashMap::new();

    for target in config.targets() {
        if cancel.is_cancelled() {
            break;
        }
        // A slot frees when a running classification finishes, bounded by its timeouts.
        let permit = tokio::select! {
            biased;
            _ = cancel.cancelled() => break,
            permit = sem.clone().acquire_owned() => match permit {
                Ok(p) => p,
                Err(_) => break,
            },
        };
        let prober = prober.clone();
        let hint = config.protocol;
        let timeout = config.timeout;
        let task_target = target.clone();

        let handle = set.spawn(async move {
            let _permit = permit; // keep permit until task completes
            let target = task_target;
            let started = Instant::now();
            let classified = AssertUnwindSafe(classify_port(prober.as_ref(), &target, hint, timeout))
                .catch_unwind()
                .await;
            match classified {
                Ok(result) => result,
                Err(payload) => {
                    let err = ProbeError::Panicked(panic_message(payload.as_ref()));
                    warn!(target = %target, error = %err, "classification panicked");
                    ScanResult::unrecognized(&target, PortType::Other, err.to_string(), started.elapsed())
                }
            }
        });
        submitted.insert(handle.id(), target);
    }

    let mut results = Vec::with_capacity(submitted.len());
    while let Some(joined) = set.join_next_with_id().await {
        match joined {
            Ok((_, result)) => results.push(result),
            Err(e) => {
                if let Some(target) = submitted.get(&e.id()) {
                    warn!(target = %target, error = %e, "classification task failed");
                    results.push(join_failure(target, &e));
                }
            }
        }
    }
    results.sort_by(|a, b| a.target.cmp(&b.target));

    let report = ScanReport {
        host: config.host.clone(),
        scanned_total: total,
        scanned_done: results.len() as u64,
        recognized_count: results.iter().filter(|r| r.port_type.is_recognized()).count() as u64,
        pq_capable_count: results.iter().filter(|r| r.pq_kex_supported).count() as u64,
        started_at,
        finished_at: now_rfc3339(),
        elapsed: started.elapsed(),
        results,
    };
    info!(
        host = %report.host,
        scanned = report.scanned_done,
        total = report.scanned_total,
        recognized = report.recognized_count,
        pq_capable = report.pq_capable_count,
        elapsed_ms = report.elapsed.as_millis() as u64,
        cancelled = cancel.is_cancelled(),
        "scan finished"
    );
    report
}

/// Result for a task that never returned one. Panics inside the classification
/// are caught in the task, so this is mostly an aborted task.
fn join_failure(target: &ScanTarget, e: &JoinError) -> ScanResult {
    let err = if e.is_panic() {
        ProbeError::Panicked(e.to_string())
    } else {
        ProbeError::Cancelled(e.to_string())
    };
    ScanResult::unrecognized(target, PortType::Other, err.to_string(), Duration::ZERO)
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic payload".to_string()
    }
}

fn now_rfc3339() -> String {
    let now = OffsetDateTime::now_utc();
    now.format(&well_known::Rfc3339)
        .unwrap_or_else(|_| String::from("1970-01-01T00:00:00Z"))
}
