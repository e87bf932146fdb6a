//! Alert evaluator (component D, spec §4.4).
//!
//! Evaluates a monitor's rule set against each newly persisted check (and,
//! for `ssl_expiry`, against a one-minute tick) and opens/resolves
//! `Incident` rows. Evaluation for a single `(monitor_id, rule_id)` is
//! serialised via a shard lock keyed on `monitor_id`, so the
//! at-most-one-open-incident invariant holds without a global lock.

use crate::broadcaster::Broadcaster;
use crate::db::{OpenIncident, Repository};
use crate::dispatcher::Dispatcher;
use crate::models::{AlertRule, EventKind, Monitor, MonitorCheck, TriggerType};
use chrono::{DateTime, Utc};
use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, error, warn};

pub struct Evaluator<R: Repository + 'static> {
    repo: Arc<R>,
    broadcaster: Arc<Broadcaster>,
    dispatcher: Arc<Dispatcher<R>>,
    shards: Vec<Mutex<()>>,
}

impl<R: Repository + 'static> Evaluator<R> {
    pub fn new(repo: Arc<R>, broadcaster: Arc<Broadcaster>, dispatcher: Arc<Dispatcher<R>>, shard_count: usize) -> Self {
        let shards = (0..shard_count.max(1)).map(|_| Mutex::new(())).collect();
        Evaluator { repo, broadcaster, dispatcher, shards }
    }

    fn shard_for(&self, monitor_id: &str) -> &Mutex<()> {
        let mut hasher = DefaultHasher::new();
        monitor_id.hash(&mut hasher);
        let idx = (hasher.finish() as usize) % self.shards.len();
        &self.shards[idx]
    }

    /// Evaluates every rule applicable to `monitor` against `check`.
    /// Evaluate-then-act is atomic per check: the shard lock is held for
    /// the whole pass so a single check cannot both open and resolve an
    /// incident against the same rule (spec §4.4 hysteresis requirement).
    pub async fn evaluate_check(&self, monitor: &Monitor, check: &MonitorCheck) {
        let _guard = self.shard_for(&monitor.id).lock().await;

        let rules = match self.repo.get_rules_for_monitor(monitor) {
            Ok(rules) => rules,
            Err(err) => {
                error!(monitor_id = %monitor.id, error = %err, "failed to load rules for monitor");
                return;
            }
        };

        for rule in rules.into_iter().filter(|r| r.enabled) {
            self.evaluate_rule(monitor, &rule, check, check.checked_at).await;
        }
    }

    /// One-minute tick pass for `ssl_expiry` rules, independent of the
    /// check-driven path (spec §4.4: "evaluated on each http check and on
    /// the minute tick for early warning").
    pub async fn run_ssl_expiry_tick(&self, now: DateTime<Utc>) {
        let rules = match self.repo.get_rules_by_trigger_type(TriggerType::SslExpiry) {
            Ok(rules) => rules,
            Err(err) => {
                error!(error = %err, "failed to load ssl_expiry rules for tick pass");
                return;
            }
        };

        for rule in rules.into_iter().filter(|r| r.enabled) {
            let Some(monitor_id) = rule.monitor_id.clone() else {
                // Tenant-wide ssl_expiry rules have no single certificate to
                // check against; only per-monitor rules are tick-evaluated.
                continue;
            };
            let monitor = match self.repo.get_monitor(&monitor_id) {
                Ok(m) => m,
                Err(err) => {
                    warn!(monitor_id, error = %err, "ssl_expiry tick: monitor lookup failed");
                    continue;
                }
            };
            if !monitor.ssl_applicable() {
                continue;
            }
            let recent = match self.repo.get_last_n_checks(&monitor_id, 1) {
                Ok(checks) => checks,
                Err(err) => {
                    warn!(monitor_id, error = %err, "ssl_expiry tick: check lookup failed");
                    continue;
                }
            };
            let Some(latest) = recent.into_iter().next() else { continue };

            let _guard = self.shard_for(&monitor_id).lock().await;
            self.evaluate_rule(&monitor, &rule, &latest, now).await;
        }
    }

    async fn evaluate_rule(&self, monitor: &Monitor, rule: &AlertRule, check: &MonitorCheck, now: DateTime<Utc>) {
        let verdict = match rule.trigger_type {
            TriggerType::Down => self.down_fires(monitor, rule, check),
            TriggerType::SlowResponse => slow_response_fires(rule, check),
            TriggerType::SslExpiry => ssl_expiry_fires(rule, check, now),
        };

        let open = match self.repo.get_open_incident(&monitor.id, &rule.id) {
            Ok(open) => open,
            Err(err) => {
                error!(monitor_id = %monitor.id, rule_id = %rule.id, error = %err, "failed to load open incident");
                return;
            }
        };

        match (verdict, open) {
            (Some(cause_summary), None) => {
                let input = OpenIncident {
                    tenant_id: &monitor.tenant_id,
                    monitor_id: &monitor.id,
                    alert_rule_id: &rule.id,
                    opening_check_id: &check.id,
                    cause_summary: &cause_summary,
                    started_at: now,
                };
                match self.repo.open_incident(input) {
                    Ok(incident) => {
                        debug!(monitor_id = %monitor.id, rule_id = %rule.id, incident_id = %incident.id, "incident opened");
                        self.broadcaster.publish_incident(&monitor.tenant_id, &incident, EventKind::IncidentOpened);
                        self.dispatcher.dispatch(monitor, rule, &incident, EventKind::IncidentOpened).await;
                    }
                    Err(err) => {
                        // A concurrent writer may have already opened one (the
                        // partial unique index rejects the duplicate); log and
                        // let the next evaluation reconcile (spec §7(d)).
                        warn!(monitor_id = %monitor.id, rule_id = %rule.id, error = %err, "failed to open incident");
                    }
                }
            }
            (None, Some(incident)) => match self.repo.resolve_incident(&incident.id, now) {
                Ok(resolved) => {
                    debug!(monitor_id = %monitor.id, rule_id = %rule.id, incident_id = %resolved.id, "incident resolved");
                    self.broadcaster.publish_incident(&monitor.tenant_id, &resolved, EventKind::IncidentResolved);
                    self.dispatcher.dispatch(monitor, rule, &resolved, EventKind::IncidentResolved).await;
                }
                Err(err) => {
                    warn!(monitor_id = %monitor.id, rule_id = %rule.id, error = %err, "failed to resolve incident");
                }
            },
            _ => {}
        }
    }

    /// `down(N)` fires when the last `max(N,1)` consecutive checks all
    /// failed (spec §4.4; `N=0` behaves as `N=1`).
    fn down_fires(&self, monitor: &Monitor, rule: &AlertRule, latest: &MonitorCheck) -> Option<String> {
        let n = rule.threshold_value.max(1) as usize;
        if n == 1 {
            return (!latest.success).then(|| "monitor_down".to_string());
        }
        let recent = self.repo.get_last_n_checks(&monitor.id, n).ok()?;
        if recent.len() < n || !recent.iter().all(|c| !c.success) {
            return None;
        }
        Some(format!("monitor_down_last_{n}_checks"))
    }
}

fn slow_response_fires(rule: &AlertRule, check: &MonitorCheck) -> Option<String> {
    let response_ms = check.response_time_ms?;
    (response_ms as u64 > rule.threshold_value).then(|| format!("response_time_{response_ms}ms_exceeds_{}ms", rule.threshold_value))
}

fn ssl_expiry_fires(rule: &AlertRule, check: &MonitorCheck, now: DateTime<Utc>) -> Option<String> {
    let expires_at = check.ssl_expires_at?;
    let days_remaining = (expires_at - now).num_days();
    (days_remaining <= rule.threshold_value as i64).then(|| format!("ssl_expires_in_{days_remaining}_days"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::TriggerType;
    use chrono::Duration as ChronoDuration;

    fn rule(trigger_type: TriggerType, threshold: u64) -> AlertRule {
        AlertRule {
            id: "r1".into(),
            tenant_id: "t1".into(),
            monitor_id: Some("m1".into()),
            name: "test rule".into(),
            trigger_type,
            threshold_value: threshold,
            enabled: true,
            channel_ids: vec![],
            managed: false,
        }
    }

    fn check(response_time_ms: Option<u32>, ssl_expires_at: Option<DateTime<Utc>>) -> MonitorCheck {
        MonitorCheck {
            id: "c1".into(),
            monitor_id: "m1".into(),
            checked_at: Utc::now(),
            success: true,
            status_code: Some(200),
            response_time_ms,
            error_message: None,
            ssl_valid: Some(true),
            ssl_expires_at,
        }
    }

    #[test]
    fn slow_response_fires_above_threshold() {
        let r = rule(TriggerType::SlowResponse, 500);
        assert!(slow_response_fires(&r, &check(Some(600), None)).is_some());
        assert!(slow_response_fires(&r, &check(Some(500), None)).is_none());
        assert!(slow_response_fires(&r, &check(Some(400), None)).is_none());
    }

    #[test]
    fn ssl_expiry_fires_at_or_under_threshold_days() {
        let r = rule(TriggerType::SslExpiry, 30);
        let now = Utc::now();
        let expires_in_29_days = now + ChronoDuration::days(29);
        let expires_in_60_days = now + ChronoDuration::days(60);

        let cause = ssl_expiry_fires(&r, &check(None, Some(expires_in_29_days)), now);
        assert_eq!(cause, Some("ssl_expires_in_29_days".to_string()));

        assert!(ssl_expiry_fires(&r, &check(None, Some(expires_in_60_days)), now).is_none());
    }

    #[test]
    fn ssl_expiry_no_cert_facts_never_fires() {
        let r = rule(TriggerType::SslExpiry, 30);
        assert!(ssl_expiry_fires(&r, &check(None, None), Utc::now()).is_none());
    }
}
