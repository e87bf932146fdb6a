//! Auto-rule maintainer (component G, spec §4.7).
//!
//! Reconciles a lifecycle-managed `ssl_expiry` rule for every http monitor
//! with `check_ssl=true`. Disables rather than deletes on monitor mutation
//! so historical incidents keep a valid `alert_rule_id`; only a monitor
//! deletion deletes the managed rule outright.

use crate::db::Repository;
use crate::models::{AlertRule, IngestedEvent, Monitor, TriggerType};
use std::sync::Arc;
use tracing::{debug, info, warn};
use uuid::Uuid;

pub struct RuleMaintainer<R: Repository + 'static> {
    repo: Arc<R>,
}

impl<R: Repository + 'static> RuleMaintainer<R> {
    pub fn new(repo: Arc<R>) -> Self {
        RuleMaintainer { repo }
    }

    pub async fn handle_event(&self, event: IngestedEvent) {
        match event {
            IngestedEvent::MonitorCreated(id) | IngestedEvent::MonitorUpdated(id) => self.reconcile(&id),
            IngestedEvent::MonitorDeleted(id) => self.on_monitor_deleted(&id),
            _ => {}
        }
    }

    fn reconcile(&self, monitor_id: &str) {
        let monitor = match self.repo.get_monitor(monitor_id) {
            Ok(m) => m,
            Err(err) => {
                warn!(monitor_id, error = %err, "auto-rule maintainer: monitor lookup failed");
                return;
            }
        };

        let existing = match self.repo.get_managed_ssl_rule(monitor_id) {
            Ok(rule) => rule,
            Err(err) => {
                warn!(monitor_id, error = %err, "auto-rule maintainer: managed rule lookup failed");
                return;
            }
        };

        if monitor.ssl_applicable() {
            self.ensure_enabled(&monitor, existing);
        } else if let Some(mut rule) = existing {
            if rule.enabled {
                rule.enabled = false;
                if let Err(err) = self.repo.update_rule(&rule) {
                    warn!(monitor_id, error = %err, "auto-rule maintainer: failed to disable managed rule");
                } else {
                    debug!(monitor_id, rule_id = %rule.id, "disabled managed ssl_expiry rule (check_ssl off)");
                }
            }
        }
    }

    fn ensure_enabled(&self, monitor: &Monitor, existing: Option<AlertRule>) {
        let desired_name = managed_rule_name(monitor);
        let desired_threshold = monitor.ssl_alert_days as u64;

        match existing {
            Some(mut rule) => {
                let needs_update = rule.name != desired_name || rule.threshold_value != desired_threshold || !rule.enabled;
                if needs_update {
                    rule.name = desired_name;
                    rule.threshold_value = desired_threshold;
                    rule.enabled = true;
                    if let Err(err) = self.repo.update_rule(&rule) {
                        warn!(monitor_id = %monitor.id, error = %err, "auto-rule maintainer: failed to update managed rule");
                    } else {
                        debug!(monitor_id = %monitor.id, rule_id = %rule.id, "reconciled managed ssl_expiry rule");
                    }
                }
            }
            None => {
                let rule = AlertRule {
                    id: Uuid::new_v4().to_string(),
                    tenant_id: monitor.tenant_id.clone(),
                    monitor_id: Some(monitor.id.clone()),
                    name: desired_name,
                    trigger_type: TriggerType::SslExpiry,
                    threshold_value: desired_threshold,
                    enabled: true,
                    // No default channels: an operator must attach delivery
                    // channels explicitly (no channel is implied by monitor
                    // configuration alone).
                    channel_ids: Vec::new(),
                    managed: true,
                };
                if let Err(err) = self.repo.insert_rule(&rule) {
                    warn!(monitor_id = %monitor.id, error = %err, "auto-rule maintainer: failed to create managed rule");
                } else {
                    info!(monitor_id = %monitor.id, rule_id = %rule.id, "created managed ssl_expiry rule");
                }
            }
        }
    }

    fn on_monitor_deleted(&self, monitor_id: &str) {
        match self.repo.get_managed_ssl_rule(monitor_id) {
            Ok(Some(rule)) => {
                if let Err(err) = self.repo.delete_rule(&rule.id) {
                    warn!(monitor_id, rule_id = %rule.id, error = %err, "auto-rule maintainer: failed to delete managed rule");
                } else {
                    debug!(monitor_id, rule_id = %rule.id, "deleted managed ssl_expiry rule (monitor deleted)");
                }
            }
            Ok(None) => {}
            Err(err) => warn!(monitor_id, error = %err, "auto-rule maintainer: managed rule lookup failed on delete"),
        }
    }
}

fn managed_rule_name(monitor: &Monitor) -> String {
    format!("SSL Expiry Alert - {} ({} days)", monitor.name, monitor.ssl_alert_days)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::MonitorType;
    use chrono::Utc;

    fn http_monitor(check_ssl: bool) -> Monitor {
        Monitor {
            id: "m1".into(),
            tenant_id: "t1".into(),
            name: "example".into(),
            monitor_type: MonitorType::Http,
            target: "https://example.test".into(),
            keyword: None,
            check_interval_seconds: 60,
            timeout_seconds: 10,
            enabled: true,
            check_ssl,
            ssl_alert_days: 30,
            last_checked_at: None,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn managed_rule_name_matches_lifecycle_pattern() {
        let name = managed_rule_name(&http_monitor(true));
        assert_eq!(name, "SSL Expiry Alert - example (30 days)");
    }
}
