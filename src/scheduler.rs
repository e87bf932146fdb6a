//! Scheduler (component C, spec §4.3).
//!
//! A driver task wakes on a fixed tick, pulls due monitors from the
//! repository, and fans each one out to a bounded worker pool. Per-monitor
//! checks are serialised via an in-flight set so a slow probe never races
//! its own successor; across distinct monitors no ordering is implied.

use crate::broadcaster::Broadcaster;
use crate::config::Config;
use crate::db::Repository;
use crate::error::RepositoryError;
use crate::evaluator::Evaluator;
use crate::models::{Monitor, MonitorCheck};
use crate::probes;
use chrono::Utc;
use std::collections::HashSet;
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::Semaphore;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// Consecutive transient-storage-error count after which the scheduler
/// stops dispatching new probes (spec §7(e)).
const DEGRADED_MODE_THRESHOLD: u32 = 5;

/// Tracks scheduler degraded-mode entry/exit (spec SPEC_FULL AMBIENT-5).
#[derive(Debug, Default)]
pub struct DegradedState {
    consecutive_errors: AtomicU32,
    degraded: std::sync::atomic::AtomicBool,
}

impl DegradedState {
    fn record_success(&self) {
        self.consecutive_errors.store(0, Ordering::SeqCst);
        if self.degraded.swap(false, Ordering::SeqCst) {
            info!("scheduler exiting degraded mode");
        }
    }

    fn record_transient_error(&self) {
        let count = self.consecutive_errors.fetch_add(1, Ordering::SeqCst) + 1;
        if count >= DEGRADED_MODE_THRESHOLD && !self.degraded.swap(true, Ordering::SeqCst) {
            error!(count, "scheduler entering degraded mode");
        }
    }

    pub fn is_degraded(&self) -> bool {
        self.degraded.load(Ordering::SeqCst)
    }
}

/// Elapsed time, in milliseconds, between a monitor becoming due and its
/// probe being dispatched (spec §4.3 "staleness tracked as a metric").
#[derive(Debug, Default)]
pub struct StalenessGauge {
    last_ms: AtomicU64,
    max_ms: AtomicU64,
}

impl StalenessGauge {
    fn record(&self, elapsed_ms: u64) {
        self.last_ms.store(elapsed_ms, Ordering::Relaxed);
        self.max_ms.fetch_max(elapsed_ms, Ordering::Relaxed);
    }

    pub fn last_ms(&self) -> u64 {
        self.last_ms.load(Ordering::Relaxed)
    }

    pub fn max_ms(&self) -> u64 {
        self.max_ms.load(Ordering::Relaxed)
    }
}

/// Shared in-flight set of monitor ids currently being probed. A monitor is
/// removed once its check is persisted (or abandoned), never before.
#[derive(Default)]
struct InFlight(Mutex<HashSet<String>>);

impl InFlight {
    fn try_acquire(&self, monitor_id: &str) -> bool {
        self.0.lock().expect("in-flight set mutex poisoned").insert(monitor_id.to_string())
    }

    fn release(&self, monitor_id: &str) {
        self.0.lock().expect("in-flight set mutex poisoned").remove(monitor_id);
    }
}

/// One `reqwest::Client` per tenant, built lazily. Each client owns its own
/// connection pool, so distinct tenants never share a TLS session cache or
/// keep-alive socket for their http probes (spec §5: "does not share
/// connection pools between monitors of distinct tenants").
#[derive(Default)]
struct TenantClients {
    by_tenant: Mutex<std::collections::HashMap<String, reqwest::Client>>,
}

impl TenantClients {
    fn get_or_create(&self, tenant_id: &str, max_redirects: usize) -> reqwest::Client {
        let mut map = self.by_tenant.lock().expect("tenant client map mutex poisoned");
        map.entry(tenant_id.to_string())
            .or_insert_with(|| {
                reqwest::Client::builder()
                    .redirect(reqwest::redirect::Policy::limited(max_redirects))
                    .pool_max_idle_per_host(0)
                    .build()
                    .unwrap_or_else(|_| reqwest::Client::new())
            })
            .clone()
    }
}

pub struct Scheduler<R: Repository + 'static> {
    repo: Arc<R>,
    http_clients: Arc<TenantClients>,
    broadcaster: Arc<Broadcaster>,
    evaluator: Arc<Evaluator<R>>,
    config: Config,
    in_flight: Arc<InFlight>,
    worker_pool: Arc<Semaphore>,
    /// Handles for currently-spawned per-monitor check tasks, kept so
    /// shutdown can wait on them and then `abort()` whatever is still
    /// running past the grace period (spec §4.3).
    tasks: Arc<Mutex<Vec<tokio::task::JoinHandle<()>>>>,
    pub degraded: Arc<DegradedState>,
    pub staleness: Arc<StalenessGauge>,
}

impl<R: Repository + 'static> Scheduler<R> {
    pub fn new(repo: Arc<R>, broadcaster: Arc<Broadcaster>, evaluator: Arc<Evaluator<R>>, config: Config) -> Self {
        let worker_pool = Arc::new(Semaphore::new(config.scheduler_worker_pool));
        Scheduler {
            repo,
            http_clients: Arc::new(TenantClients::default()),
            broadcaster,
            evaluator,
            config,
            in_flight: Arc::new(InFlight::default()),
            worker_pool,
            tasks: Arc::new(Mutex::new(Vec::new())),
            degraded: Arc::new(DegradedState::default()),
            staleness: Arc::new(StalenessGauge::default()),
        }
    }

    /// Runs the scheduler's driver loop until `cancel` fires. Gives
    /// in-flight probes a grace period of twice the longest configured
    /// timeout to persist before forcibly abandoning them: stragglers still
    /// running past the deadline are aborted outright so they never reach
    /// `repo.insert_check` (spec §4.3 — "their results are discarded; no
    /// partial row is written").
    pub async fn run(self: Arc<Self>, cancel: CancellationToken) {
        info!(tick_secs = ?self.config.scheduler_tick, "scheduler starting");
        let mut ticker = tokio::time::interval(self.config.scheduler_tick);

        loop {
            tokio::select! {
                _ = ticker.tick() => self.tick().await,
                _ = cancel.cancelled() => break,
            }
        }

        let grace = self.config.probe_default_timeout * 2;
        info!(?grace, "scheduler shutting down, awaiting in-flight probes");
        let deadline = tokio::time::Instant::now() + grace;
        loop {
            let pending = {
                let mut tasks = self.tasks.lock().expect("scheduler task list mutex poisoned");
                tasks.retain(|h| !h.is_finished());
                tasks.len()
            };
            if pending == 0 || tokio::time::Instant::now() >= deadline {
                break;
            }
            tokio::time::sleep(std::time::Duration::from_millis(50)).await;
        }

        let stragglers = {
            let mut tasks = self.tasks.lock().expect("scheduler task list mutex poisoned");
            tasks.retain(|h| !h.is_finished());
            std::mem::take(&mut *tasks)
        };
        if !stragglers.is_empty() {
            warn!(count = stragglers.len(), "grace period elapsed, abandoning in-flight probes");
            for handle in stragglers {
                handle.abort();
            }
        }
        info!("scheduler stopped");
    }

    async fn tick(&self) {
        self.tasks.lock().expect("scheduler task list mutex poisoned").retain(|h| !h.is_finished());

        let was_degraded = self.degraded.is_degraded();
        if was_degraded {
            warn!("scheduler in degraded mode, skipping dispatch this tick");
        }

        let now = Utc::now();
        let due = match self.repo.list_due_monitors(now, self.config.scheduler_worker_pool * 4) {
            Ok(monitors) => monitors,
            Err(RepositoryError::Transient(msg)) => {
                warn!(error = %msg, "transient error listing due monitors");
                self.degraded.record_transient_error();
                return;
            }
            Err(err) => {
                error!(error = %err, "unexpected error listing due monitors");
                return;
            }
        };
        self.degraded.record_success();

        if was_degraded {
            // This call just proved storage reachable again; let degraded
            // mode fully clear rather than resuming dispatch mid-tick on
            // the very call that detected recovery. Dispatch resumes next
            // tick.
            return;
        }

        debug!(count = due.len(), "monitors due this tick");

        for monitor in due {
            if self.degraded.is_degraded() {
                break;
            }
            if !self.in_flight.try_acquire(&monitor.id) {
                // Previous check for this monitor hasn't persisted yet; skip
                // and retry next tick (spec §4.3 ordering guarantee).
                continue;
            }

            let staleness_ms = (now - monitor.last_checked_at.unwrap_or(monitor.created_at))
                .num_milliseconds()
                .max(0) as u64;
            self.staleness.record(staleness_ms);

            let Ok(permit) = self.worker_pool.clone().try_acquire_owned() else {
                // Pool is saturated — leave this monitor's slot held so no
                // duplicate dispatch happens, but skip running it now; it
                // becomes due again (still overdue) and is retried.
                self.in_flight.release(&monitor.id);
                continue;
            };

            let http_client = self.http_clients.get_or_create(&monitor.tenant_id, self.config.probe_max_redirects);
            let repo = self.repo.clone();
            let broadcaster = self.broadcaster.clone();
            let evaluator = self.evaluator.clone();
            let in_flight = self.in_flight.clone();
            let degraded = self.degraded.clone();

            let handle = tokio::spawn(async move {
                let _permit = permit;
                run_one_check(monitor, repo, http_client, broadcaster, evaluator, degraded, in_flight).await;
            });
            self.tasks.lock().expect("scheduler task list mutex poisoned").push(handle);
        }
    }
}

async fn run_one_check<R: Repository + 'static>(
    monitor: Monitor,
    repo: Arc<R>,
    http_client: reqwest::Client,
    broadcaster: Arc<Broadcaster>,
    evaluator: Arc<Evaluator<R>>,
    degraded: Arc<DegradedState>,
    in_flight: Arc<InFlight>,
) {
    let monitor_id = monitor.id.clone();
    let tenant_id = monitor.tenant_id.clone();
    let now = Utc::now();

    let outcome = probes::execute(&monitor, &http_client, now).await;
    let new_check = outcome.into_check(&monitor_id, now);

    match repo.insert_check(&new_check) {
        Ok(check_id) => {
            if let Err(err) = repo.update_monitor_last_checked(&monitor_id, now) {
                warn!(monitor_id, error = %err, "failed to update last_checked_at");
            }
            degraded.record_success();
            debug!(monitor_id, success = new_check.success, check_id, "check persisted");
            broadcaster.publish_check(&tenant_id, &monitor_id, &check_id, &new_check);

            let check = MonitorCheck {
                id: check_id,
                monitor_id: monitor_id.clone(),
                checked_at: new_check.checked_at,
                success: new_check.success,
                status_code: new_check.status_code,
                response_time_ms: new_check.response_time_ms,
                error_message: new_check.error_message,
                ssl_valid: new_check.ssl_valid,
                ssl_expires_at: new_check.ssl_expires_at,
            };
            evaluator.evaluate_check(&monitor, &check).await;
        }
        Err(RepositoryError::Transient(msg)) => {
            warn!(monitor_id, error = %msg, "transient error persisting check, will retry next tick");
            degraded.record_transient_error();
        }
        Err(err) => {
            error!(monitor_id, error = %err, "failed to persist check");
        }
    }

    in_flight.release(&monitor_id);
}
