//! Fans target checks out across a bounded worker pool.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use tokio::sync::mpsc;
use tokio::task::JoinSet;
use tracing::{debug, warn};

use crate::probe;
use crate::types::CheckResult;

/// Worker count for a batch: enough parallelism to hide per-target network
/// latency without unbounded fan-out.
pub fn worker_count_for_targets(n: usize) -> usize {
    if n == 0 {
        return 0;
    }
    let cpus = std::thread::available_parallelism().map(|c| c.get()).unwrap_or(1);
    (cpus * 4).clamp(1, 64).min(n)
}

/// Check multiple targets in parallel and return results in the same order
/// as the input slice, regardless of completion order.
pub async fn check_many(targets: &[String], override_port: Option<u16>) -> Vec<CheckResult> {
    let n = targets.len();
    if n == 0 {
        return Vec::new();
    }
    let workers = worker_count_for_targets(n);
    debug!(targets = n, workers, "starting ordered batch");

    let next = Arc::new(AtomicUsize::new(0));
    let targets = Arc::new(targets.to_vec());

    let mut set = JoinSet::new();
    for _ in 0..workers {
        let next = next.clone();
        let targets = targets.clone();
        set.spawn(async move {
            let mut done = Vec::new();
            // Workers pull the next target index until the queue is drained.
            loop {
                let idx = next.fetch_add(1, Ordering::Relaxed);
                if idx >= targets.len() {
                    break;
                }
                let result = probe::check_target(&targets[idx], override_port).await;
                done.push((idx, result));
            }
            done
        });
    }

    let mut slots: Vec<Option<CheckResult>> = (0..n).map(|_| None).collect();
    while let Some(joined) = set.join_next().await {
        match joined {
            Ok(done) => {
                for (idx, result) in done {
                    slots[idx] = Some(result);
                }
            }
            Err(err) => warn!(error = %err, "batch worker failed"),
        }
    }

    slots
        .into_iter()
        .enumerate()
        .map(|(idx, slot)| {
            slot.unwrap_or_else(|| {
                CheckResult::invalid(&targets[idx], "probe worker failed".to_string())
            })
        })
        .collect()
}

/// Check multiple targets in parallel, emitting each result as soon as it
/// completes (completion order, explicitly unordered). The channel closes
/// once every worker has finished.
pub fn check_many_streaming(
    targets: Vec<String>,
    override_port: Option<u16>,
) -> mpsc::Receiver<CheckResult> {
    let n = targets.len();
    let (tx, rx) = mpsc::channel(n.max(1));
    let workers = worker_count_for_targets(n);
    debug!(targets = n, workers, "starting streaming batch");

    let next = Arc::new(AtomicUsize::new(0));
    let targets = Arc::new(targets);
    for _ in 0..workers {
        let tx = tx.clone();
        let next = next.clone();
        let targets = targets.clone();
        tokio::spawn(async move {
            loop {
                let idx = next.fetch_add(1, Ordering::Relaxed);
                if idx >= targets.len() {
                    break;
                }
                let result = probe::check_target(&targets[idx], override_port).await;
                if tx.send(result).await.is_err() {
                    // Receiver went away; nothing left to report to.
                    break;
                }
            }
        });
    }
    rx
}

#[cfg(test)]
mod tests {
    use super::worker_count_for_targets;

    #[test]
    fn worker_count_bounds() {
        assert_eq!(worker_count_for_targets(0), 0);
        assert_eq!(worker_count_for_targets(1), 1);
        assert_eq!(worker_count_for_targets(2), 2);
        assert!(worker_count_for_targets(10_000) <= 64);
        assert!(worker_count_for_targets(10_000) >= 1);
    }
}
