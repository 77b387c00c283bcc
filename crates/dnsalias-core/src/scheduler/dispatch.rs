//! Dispatch loop and worker execution

use super::Inner;
use super::entry::AliasEntry;
use crate::alert::{Alert, AlertCategory, AlertSink};
use crate::error::Error;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::{JoinError, JoinSet};
use tokio::time::Instant;
use tracing::{debug, error, info, warn};

enum Next {
    Run(Instant, Arc<AliasEntry>),
    Wait(Option<Instant>),
    Exit,
}

/// Single dispatch task
///
/// Returns the worker set still outstanding when the loop exits, so
/// `stop` can drain it.
pub(super) async fn dispatch_loop(inner: Arc<Inner>, generation: u64) -> JoinSet<()> {
    let mut workers = JoinSet::new();
    let mut last_due: Option<Instant> = None;
    let slack = inner.settings.dispatch_slack();
    let late_warning = inner.settings.late_warning();

    loop {
        while let Some(result) = workers.try_join_next() {
            log_worker_result(result);
        }

        let now = Instant::now();
        let next = {
            let mut state = inner.dispatch.lock();
            if !state.running || state.generation != generation {
                Next::Exit
            } else {
                match state.queue.peek_due() {
                    None => Next::Wait(None),
                    Some(due) if due <= now + slack => match state.queue.pop() {
                        Some((due, entry)) => Next::Run(due, entry),
                        None => Next::Wait(None),
                    },
                    Some(due) => Next::Wait(Some(due)),
                }
            }
        };

        match next {
            Next::Exit => break,
            Next::Run(due, entry) => {
                let lag = now.saturating_duration_since(due);
                if lag > late_warning {
                    warn!(
                        "Scheduler dispatch missed head-of-line event by {} milliseconds.",
                        lag.as_millis()
                    );
                }
                if last_due.is_some_and(|last| due < last) {
                    warn!("Schedule events are arriving out of order");
                }
                last_due = Some(due);

                if !entry.is_active() {
                    debug!("Discarding inactive alias entry {} ({})", entry.name, entry.id);
                    continue;
                }
                workers.spawn(run_entry(inner.clone(), entry, generation));
            }
            Next::Wait(until) => {
                tokio::select! {
                    _ = inner.wake.notified() => {}
                    _ = sleep_until_or_forever(until) => {}
                    Some(result) = workers.join_next(), if !workers.is_empty() => {
                        log_worker_result(result);
                    }
                }
            }
        }
    }

    debug!("Scheduler dispatch loop exiting with {} worker(s) running", workers.len());
    workers
}

async fn sleep_until_or_forever(until: Option<Instant>) {
    match until {
        Some(deadline) => tokio::time::sleep_until(deadline).await,
        None => std::future::pending::<()>().await,
    }
}

pub(super) fn log_worker_result(result: Result<(), JoinError>) {
    if let Err(e) = result {
        if e.is_panic() {
            error!("Alias check panicked: {}", e);
        }
    }
}

/// Run one check of `entry`, then re-queue it if it is still active
async fn run_entry(inner: Arc<Inner>, entry: Arc<AliasEntry>, generation: u64) {
    if !entry.is_active() {
        debug!("Skipping alias entry {} ({}), no longer active", entry.name, entry.id);
        return;
    }

    let started = Instant::now();
    let recheck = {
        let mut task = entry.task.lock().await;
        let outcome = task.processor.process_guarded(inner.alerts.as_ref()).await;
        let allowed = inner.settings.allowed_consecutive_failures;

        match outcome {
            Ok(seconds) => {
                task.consecutive_failures = 0;
                Duration::from_secs(u64::from(seconds))
            }
            Err(e @ Error::Lookup { .. }) => {
                task.consecutive_failures += 1;
                if task.consecutive_failures > allowed {
                    let message = format!(
                        "An exception occurred reading source data for {}",
                        task.processor
                    );
                    inner
                        .alerts
                        .send_alert(&Alert::with_error(AlertCategory::LookupException, message, &e))
                        .await;
                } else {
                    warn!(
                        "Ignoring lookup failure for {} because it might be transient: {}",
                        task.processor, e
                    );
                }
                inner.settings.failure_recheck()
            }
            Err(e @ Error::Update { .. }) => {
                task.consecutive_failures += 1;
                if task.consecutive_failures > allowed {
                    let message = format!(
                        "An exception occurred in the DNS provider for {}",
                        task.processor
                    );
                    inner
                        .alerts
                        .send_alert(&Alert::with_error(AlertCategory::UpdateException, message, &e))
                        .await;
                } else {
                    warn!(
                        "Ignoring update failure for {} because it might be transient: {}",
                        task.processor, e
                    );
                }
                inner.settings.failure_recheck()
            }
            Err(e) => {
                error!("Error processing {}: {}", task.processor, e);
                inner
                    .alerts
                    .send_alert(&Alert::with_error(
                        AlertCategory::ProcessingException,
                        "An exception occurred processing an alias",
                        &e,
                    ))
                    .await;
                inner.settings.failure_recheck()
            }
        }
    };

    let mut next = started + recheck;
    let earliest = Instant::now() + inner.settings.minimum_schedule();
    if next < earliest {
        warn!(
            "Check for {} is too fast - pushing out for {} milliseconds",
            entry.name,
            inner.settings.minimum_schedule_ms
        );
        next = earliest;
    }

    let mut flags = entry.flags.lock();
    if !flags.active {
        info!(
            "Alias node {} version {} is not being rescheduled because it is no longer current.",
            entry.name, entry.fingerprint
        );
        return;
    }
    flags.next_run = next;
    inner.enqueue(entry.clone(), next, Some(generation));
}
