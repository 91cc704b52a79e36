use crate::load_test::cancelled;
use stampede_core::{CleanupReport, StoreClient};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{watch, Semaphore};
use tokio::task::JoinSet;
#[allow(unused_imports)]
use tracing::{debug, error, info, instrument, trace, warn};

/// Delete every key the run wrote, `concurrency` deletes at a time.
///
/// Failed deletes are counted and logged, never retried. A cleanup failure does not fail the run.
/// Once `cancel` fires no further deletes are issued, in-flight ones get `drain_timeout` to
/// finish, and every key not confirmed deleted counts as failed.
#[instrument(name = "cleanup", skip_all, fields(keys = keys.len()))]
pub(crate) async fn delete_keys<C: StoreClient>(
    client: Arc<C>,
    keys: Vec<String>,
    concurrency: usize,
    mut cancel: watch::Receiver<bool>,
    drain_timeout: Duration,
) -> CleanupReport {
    let mut report = CleanupReport::default();
    if keys.is_empty() {
        return report;
    }

    let total = keys.len() as u64;
    let semaphore = Arc::new(Semaphore::new(concurrency.max(1)));
    let mut tasks = JoinSet::new();
    let mut stopped = false;

    for key in keys {
        let permit = tokio::select! {
            biased;
            _ = cancelled(&mut cancel) => {
                stopped = true;
                break;
            }
            res = semaphore.clone().acquire_owned() => match res {
                Ok(permit) => permit,
                Err(_) => break,
            },
        };
        let client = client.clone();
        tasks.spawn(async move {
            let res = client.delete(&key).await;
            drop(permit);
            if let Err(err) = &res {
                debug!(key = %key, "Delete failed: {err}");
            }
            res.is_ok()
        });

        while let Some(res) = tasks.try_join_next() {
            tally(&mut report, res);
        }
    }

    if stopped {
        let finished = tokio::time::timeout(drain_timeout, async {
            while let Some(res) = tasks.join_next().await {
                tally(&mut report, res);
            }
        })
        .await;
        if finished.is_err() {
            tasks.abort_all();
        }
    }
    while let Some(res) = tasks.join_next().await {
        tally(&mut report, res);
    }
    // Also covers keys never handed to a delete task.
    report.failed = total - report.deleted;

    if report.failed > 0 {
        warn!(
            "Cleanup left {} of {} keys behind{}",
            report.failed,
            total,
            if stopped { " after cancellation" } else { "" }
        );
    } else {
        info!("Cleanup deleted {} keys", report.deleted);
    }
    report
}

fn tally(report: &mut CleanupReport, res: Result<bool, tokio::task::JoinError>) {
    match res {
        Ok(true) => report.deleted += 1,
        Ok(false) => report.failed += 1,
        Err(err) if err.is_cancelled() => report.failed += 1,
        Err(err) => {
            error!("Cleanup task failed: {err}");
            report.failed += 1;
        }
    }
}
