//! Repository facade (component A, spec §4.1).
//!
//! All other components read and write persisted state exclusively through
//! this trait. The only implementation shipped here is sqlite-backed
//! (`sqlite::SqliteRepository`), in keeping with the base crate, but the
//! trait boundary exists so the engine never depends on `rusqlite` types
//! directly outside this module.

mod sqlite;

pub use sqlite::SqliteRepository;

use crate::error::RepositoryError;
use crate::models::*;
use chrono::{DateTime, Utc};

/// Fields needed to open a new incident (spec §4.1 `open_incident(...)`).
pub struct OpenIncident<'a> {
    pub tenant_id: &'a str,
    pub monitor_id: &'a str,
    pub alert_rule_id: &'a str,
    pub opening_check_id: &'a str,
    pub cause_summary: &'a str,
    pub started_at: DateTime<Utc>,
}

pub trait Repository: Send + Sync {
    /// Enabled monitors whose `last_checked_at + check_interval <= now`,
    /// eldest first, tie-broken by monitor id, bounded by `limit`. Must not
    /// return the same monitor twice within one scheduler tick — callers
    /// achieve this by combining the result with the scheduler's in-flight
    /// set (§4.3); the repository itself is stateless across calls.
    fn list_due_monitors(&self, now: DateTime<Utc>, limit: usize) -> Result<Vec<Monitor>, RepositoryError>;

    fn get_monitor(&self, monitor_id: &str) -> Result<Monitor, RepositoryError>;

    /// Assigns an id, persists, and returns it.
    fn insert_check(&self, check: &NewMonitorCheck) -> Result<CheckId, RepositoryError>;

    fn update_monitor_last_checked(&self, monitor_id: &str, at: DateTime<Utc>) -> Result<(), RepositoryError>;

    /// Newest first.
    fn get_recent_checks(&self, monitor_id: &str, since: DateTime<Utc>) -> Result<Vec<MonitorCheck>, RepositoryError>;

    /// The `n` most recent checks regardless of age, newest first. Used by
    /// the `down` trigger to evaluate "last N consecutive checks".
    fn get_last_n_checks(&self, monitor_id: &str, n: usize) -> Result<Vec<MonitorCheck>, RepositoryError>;

    /// The set of enabled rules applicable to a monitor: its own rules
    /// union tenant-wide rules (`monitor_id IS NULL`).
    fn get_rules_for_monitor(&self, monitor: &Monitor) -> Result<Vec<AlertRule>, RepositoryError>;

    /// All enabled rules of a given trigger type across all tenants, used
    /// by the evaluator's one-minute tick pass for `ssl_expiry`.
    fn get_rules_by_trigger_type(&self, trigger_type: TriggerType) -> Result<Vec<AlertRule>, RepositoryError>;

    fn get_rule(&self, rule_id: &str) -> Result<AlertRule, RepositoryError>;

    fn get_open_incident(&self, monitor_id: &str, rule_id: &str) -> Result<Option<Incident>, RepositoryError>;

    fn open_incident(&self, input: OpenIncident<'_>) -> Result<Incident, RepositoryError>;

    fn resolve_incident(&self, incident_id: &str, at: DateTime<Utc>) -> Result<Incident, RepositoryError>;

    fn list_open_incidents(&self, tenant_id: &str) -> Result<Vec<Incident>, RepositoryError>;

    /// Returns only enabled channels belonging to `tenant_id`; unknown or
    /// foreign ids are silently dropped (and logged by the caller).
    fn get_channels(&self, tenant_id: &str, channel_ids: &[String]) -> Result<Vec<AlertChannel>, RepositoryError>;

    fn record_notification_attempt(&self, attempt: &NotificationAttempt) -> Result<(), RepositoryError>;

    /// Notification attempts for `(incident_id, channel_id, event_kind)`
    /// within the last `window`, used for duplicate suppression (spec
    /// §4.5).
    fn recent_notification_attempts(
        &self,
        incident_id: &str,
        channel_id: &str,
        event_kind: EventKind,
        since: DateTime<Utc>,
    ) -> Result<Vec<NotificationAttempt>, RepositoryError>;

    /// Delete check rows older than `before` (spec §6 retention policy).
    /// Returns the number of rows deleted.
    fn prune_checks_older_than(&self, before: DateTime<Utc>) -> Result<u64, RepositoryError>;

    // ── Minimal mutation surface ──────────────────────────────────────
    //
    // The CRUD HTTP layer that validates and exposes these to end users is
    // out of scope (spec §1); these plain methods exist so the auto-rule
    // maintainer (component G) and tests can create/update/delete rows
    // without reaching into SQL directly.

    fn insert_monitor(&self, monitor: &Monitor) -> Result<(), RepositoryError>;
    fn update_monitor(&self, monitor: &Monitor) -> Result<(), RepositoryError>;
    fn delete_monitor(&self, monitor_id: &str) -> Result<(), RepositoryError>;

    fn insert_rule(&self, rule: &AlertRule) -> Result<(), RepositoryError>;
    fn update_rule(&self, rule: &AlertRule) -> Result<(), RepositoryError>;
    fn get_managed_ssl_rule(&self, monitor_id: &str) -> Result<Option<AlertRule>, RepositoryError>;
    fn delete_rule(&self, rule_id: &str) -> Result<(), RepositoryError>;

    fn insert_channel(&self, channel: &AlertChannel) -> Result<(), RepositoryError>;
}
