use super::{OpenIncident, Repository};
use crate::error::RepositoryError;
use crate::models::*;
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension, Row};
use std::sync::Mutex;

/// Sqlite-backed repository. A single shared connection guarded by a mutex,
/// matching the base crate's `Db` — sqlite's own writer serialisation makes
/// a connection pool unnecessary at this scale, and WAL mode keeps readers
/// unblocked by writers.
pub struct SqliteRepository {
    conn: Mutex<Connection>,
}

impl SqliteRepository {
    pub fn new(path: &str) -> Result<Self, RepositoryError> {
        let conn = Connection::open(path).map_err(RepositoryError::from)?;
        conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA foreign_keys=ON; PRAGMA busy_timeout=5000;")
            .map_err(RepositoryError::from)?;
        let repo = SqliteRepository { conn: Mutex::new(conn) };
        repo.migrate()?;
        Ok(repo)
    }

    #[cfg(test)]
    pub fn in_memory() -> Result<Self, RepositoryError> {
        let conn = Connection::open_in_memory().map_err(RepositoryError::from)?;
        conn.execute_batch("PRAGMA foreign_keys=ON;").map_err(RepositoryError::from)?;
        let repo = SqliteRepository { conn: Mutex::new(conn) };
        repo.migrate()?;
        Ok(repo)
    }

    fn migrate(&self) -> Result<(), RepositoryError> {
        let conn = self.conn.lock().unwrap();
        conn.execute_batch(
            "
            CREATE TABLE IF NOT EXISTS monitors (
                id TEXT PRIMARY KEY,
                tenant_id TEXT NOT NULL,
                name TEXT NOT NULL,
                monitor_type TEXT NOT NULL,
                target TEXT NOT NULL,
                keyword TEXT,
                check_interval_seconds INTEGER NOT NULL DEFAULT 60,
                timeout_seconds INTEGER NOT NULL DEFAULT 30,
                enabled INTEGER NOT NULL DEFAULT 1,
                check_ssl INTEGER NOT NULL DEFAULT 0,
                ssl_alert_days INTEGER NOT NULL DEFAULT 14,
                last_checked_at TEXT,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_monitors_tenant ON monitors(tenant_id);
            CREATE INDEX IF NOT EXISTS idx_monitors_due ON monitors(enabled, last_checked_at);

            CREATE TABLE IF NOT EXISTS monitor_checks (
                id TEXT PRIMARY KEY,
                monitor_id TEXT NOT NULL REFERENCES monitors(id) ON DELETE CASCADE,
                checked_at TEXT NOT NULL,
                success INTEGER NOT NULL,
                status_code INTEGER,
                response_time_ms INTEGER,
                error_message TEXT,
                ssl_valid INTEGER,
                ssl_expires_at TEXT
            );
            CREATE INDEX IF NOT EXISTS idx_checks_monitor ON monitor_checks(monitor_id, checked_at DESC);

            CREATE TABLE IF NOT EXISTS alert_rules (
                id TEXT PRIMARY KEY,
                tenant_id TEXT NOT NULL,
                monitor_id TEXT REFERENCES monitors(id) ON DELETE CASCADE,
                name TEXT NOT NULL,
                trigger_type TEXT NOT NULL,
                threshold_value INTEGER NOT NULL DEFAULT 0,
                enabled INTEGER NOT NULL DEFAULT 1,
                managed INTEGER NOT NULL DEFAULT 0
            );
            CREATE INDEX IF NOT EXISTS idx_rules_tenant ON alert_rules(tenant_id);
            CREATE INDEX IF NOT EXISTS idx_rules_monitor ON alert_rules(monitor_id);

            CREATE TABLE IF NOT EXISTS alert_channels (
                id TEXT PRIMARY KEY,
                tenant_id TEXT NOT NULL,
                name TEXT NOT NULL,
                channel_type TEXT NOT NULL,
                enabled INTEGER NOT NULL DEFAULT 1,
                config TEXT NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_channels_tenant ON alert_channels(tenant_id);

            CREATE TABLE IF NOT EXISTS alert_rule_channels (
                rule_id TEXT NOT NULL REFERENCES alert_rules(id) ON DELETE CASCADE,
                channel_id TEXT NOT NULL REFERENCES alert_channels(id) ON DELETE CASCADE,
                PRIMARY KEY (rule_id, channel_id)
            );

            CREATE TABLE IF NOT EXISTS incidents (
                id TEXT PRIMARY KEY,
                tenant_id TEXT NOT NULL,
                monitor_id TEXT NOT NULL REFERENCES monitors(id) ON DELETE CASCADE,
                alert_rule_id TEXT NOT NULL REFERENCES alert_rules(id) ON DELETE CASCADE,
                status TEXT NOT NULL,
                started_at TEXT NOT NULL,
                resolved_at TEXT,
                opening_check_id TEXT NOT NULL,
                cause_summary TEXT NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_incidents_monitor ON incidents(monitor_id, started_at DESC);
            CREATE INDEX IF NOT EXISTS idx_incidents_tenant ON incidents(tenant_id);
            -- Enforces spec §3's 'at most one open incident per (monitor_id, alert_rule_id)'
            -- at the storage layer: a second open-incident insert raises a constraint
            -- violation, which the caller maps to RepositoryError::Integrity and drops.
            CREATE UNIQUE INDEX IF NOT EXISTS idx_incidents_one_open
                ON incidents(monitor_id, alert_rule_id) WHERE status = 'open';

            CREATE TABLE IF NOT EXISTS notification_attempts (
                id TEXT PRIMARY KEY,
                tenant_id TEXT NOT NULL,
                incident_id TEXT NOT NULL,
                channel_id TEXT NOT NULL,
                event_kind TEXT NOT NULL,
                outcome TEXT NOT NULL,
                detail TEXT,
                attempted_at TEXT NOT NULL,
                attempt_number INTEGER NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_attempts_dedup
                ON notification_attempts(incident_id, channel_id, event_kind, attempted_at DESC);
            ",
        )
        .map_err(RepositoryError::from)?;

        Ok(())
    }
}

fn parse_dt(raw: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or_else(|_| Utc::now())
}

fn fmt_dt(dt: DateTime<Utc>) -> String {
    dt.to_rfc3339()
}

fn row_to_monitor(row: &Row) -> rusqlite::Result<Monitor> {
    let monitor_type_raw: String = row.get("monitor_type")?;
    let last_checked_raw: Option<String> = row.get("last_checked_at")?;
    let created_raw: String = row.get("created_at")?;
    let updated_raw: String = row.get("updated_at")?;
    Ok(Monitor {
        id: row.get("id")?,
        tenant_id: row.get("tenant_id")?,
        name: row.get("name")?,
        monitor_type: MonitorType::parse(&monitor_type_raw).unwrap_or(MonitorType::Http),
        target: row.get("target")?,
        keyword: row.get("keyword")?,
        check_interval_seconds: row.get("check_interval_seconds")?,
        timeout_seconds: row.get("timeout_seconds")?,
        enabled: row.get::<_, i64>("enabled")? != 0,
        check_ssl: row.get::<_, i64>("check_ssl")? != 0,
        ssl_alert_days: row.get("ssl_alert_days")?,
        last_checked_at: last_checked_raw.map(|s| parse_dt(&s)),
        created_at: parse_dt(&created_raw),
        updated_at: parse_dt(&updated_raw),
    })
}

fn row_to_check(row: &Row) -> rusqlite::Result<MonitorCheck> {
    let checked_raw: String = row.get("checked_at")?;
    let ssl_expires_raw: Option<String> = row.get("ssl_expires_at")?;
    Ok(MonitorCheck {
        id: row.get("id")?,
        monitor_id: row.get("monitor_id")?,
        checked_at: parse_dt(&checked_raw),
        success: row.get::<_, i64>("success")? != 0,
        status_code: row.get("status_code")?,
        response_time_ms: row.get("response_time_ms")?,
        error_message: row.get("error_message")?,
        ssl_valid: row.get::<_, Option<i64>>("ssl_valid")?.map(|v| v != 0),
        ssl_expires_at: ssl_expires_raw.map(|s| parse_dt(&s)),
    })
}

fn row_to_incident(row: &Row) -> rusqlite::Result<Incident> {
    let started_raw: String = row.get("started_at")?;
    let resolved_raw: Option<String> = row.get("resolved_at")?;
    let status_raw: String = row.get("status")?;
    Ok(Incident {
        id: row.get("id")?,
        tenant_id: row.get("tenant_id")?,
        monitor_id: row.get("monitor_id")?,
        alert_rule_id: row.get("alert_rule_id")?,
        status: if status_raw == "open" { IncidentStatus::Open } else { IncidentStatus::Resolved },
        started_at: parse_dt(&started_raw),
        resolved_at: resolved_raw.map(|s| parse_dt(&s)),
        opening_check_id: row.get("opening_check_id")?,
        cause_summary: row.get("cause_summary")?,
    })
}

fn row_to_channel(row: &Row) -> rusqlite::Result<AlertChannel> {
    let config_raw: String = row.get("config")?;
    let config: ChannelConfig = serde_json::from_str(&config_raw)
        .unwrap_or(ChannelConfig::Webhook { url: String::new() });
    Ok(AlertChannel {
        id: row.get("id")?,
        tenant_id: row.get("tenant_id")?,
        name: row.get("name")?,
        enabled: row.get::<_, i64>("enabled")? != 0,
        config,
    })
}

impl SqliteRepository {
    fn channel_ids_for_rule(conn: &Connection, rule_id: &str) -> rusqlite::Result<Vec<String>> {
        let mut stmt = conn.prepare("SELECT channel_id FROM alert_rule_channels WHERE rule_id = ?1")?;
        let ids = stmt.query_map(params![rule_id], |r| r.get(0))?.filter_map(|r| r.ok()).collect();
        Ok(ids)
    }

    fn row_to_rule(conn: &Connection, row: &Row) -> rusqlite::Result<AlertRule> {
        let trigger_raw: String = row.get("trigger_type")?;
        let id: String = row.get("id")?;
        Ok(AlertRule {
            id: id.clone(),
            tenant_id: row.get("tenant_id")?,
            monitor_id: row.get("monitor_id")?,
            name: row.get("name")?,
            trigger_type: TriggerType::parse(&trigger_raw).unwrap_or(TriggerType::Down),
            threshold_value: row.get::<_, i64>("threshold_value")? as u64,
            enabled: row.get::<_, i64>("enabled")? != 0,
            channel_ids: Self::channel_ids_for_rule(conn, &id)?,
            managed: row.get::<_, i64>("managed")? != 0,
        })
    }
}

impl Repository for SqliteRepository {
    fn list_due_monitors(&self, now: DateTime<Utc>, limit: usize) -> Result<Vec<Monitor>, RepositoryError> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(
            "SELECT * FROM monitors
             WHERE enabled = 1
               AND (last_checked_at IS NULL
                    OR datetime(last_checked_at, '+' || check_interval_seconds || ' seconds') <= datetime(?1))
             ORDER BY (last_checked_at IS NOT NULL), last_checked_at ASC, id ASC
             LIMIT ?2",
        )?;
        let rows = stmt
            .query_map(params![fmt_dt(now), limit as i64], row_to_monitor)?
            .filter_map(|r| r.ok())
            .collect();
        Ok(rows)
    }

    fn get_monitor(&self, monitor_id: &str) -> Result<Monitor, RepositoryError> {
        let conn = self.conn.lock().unwrap();
        conn.query_row("SELECT * FROM monitors WHERE id = ?1", params![monitor_id], row_to_monitor)
            .map_err(RepositoryError::from)
    }

    fn insert_check(&self, check: &NewMonitorCheck) -> Result<CheckId, RepositoryError> {
        let conn = self.conn.lock().unwrap();
        let id = uuid::Uuid::new_v4().to_string();
        conn.execute(
            "INSERT INTO monitor_checks
                (id, monitor_id, checked_at, success, status_code, response_time_ms, error_message, ssl_valid, ssl_expires_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
            params![
                id,
                check.monitor_id,
                fmt_dt(check.checked_at),
                check.success as i64,
                check.status_code,
                check.response_time_ms,
                check.error_message,
                check.ssl_valid.map(|b| b as i64),
                check.ssl_expires_at.map(fmt_dt),
            ],
        )?;
        Ok(id)
    }

    fn update_monitor_last_checked(&self, monitor_id: &str, at: DateTime<Utc>) -> Result<(), RepositoryError> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "UPDATE monitors SET last_checked_at = ?1, updated_at = ?1 WHERE id = ?2",
            params![fmt_dt(at), monitor_id],
        )?;
        Ok(())
    }

    fn get_recent_checks(&self, monitor_id: &str, since: DateTime<Utc>) -> Result<Vec<MonitorCheck>, RepositoryError> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(
            "SELECT * FROM monitor_checks WHERE monitor_id = ?1 AND checked_at >= ?2 ORDER BY checked_at DESC",
        )?;
        let rows = stmt
            .query_map(params![monitor_id, fmt_dt(since)], row_to_check)?
            .filter_map(|r| r.ok())
            .collect();
        Ok(rows)
    }

    fn get_last_n_checks(&self, monitor_id: &str, n: usize) -> Result<Vec<MonitorCheck>, RepositoryError> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(
            "SELECT * FROM monitor_checks WHERE monitor_id = ?1 ORDER BY checked_at DESC LIMIT ?2",
        )?;
        let rows = stmt
            .query_map(params![monitor_id, n as i64], row_to_check)?
            .filter_map(|r| r.ok())
            .collect();
        Ok(rows)
    }

    fn get_rules_for_monitor(&self, monitor: &Monitor) -> Result<Vec<AlertRule>, RepositoryError> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(
            "SELECT * FROM alert_rules
             WHERE enabled = 1 AND tenant_id = ?1 AND (monitor_id = ?2 OR monitor_id IS NULL)",
        )?;
        let rows = stmt
            .query_map(params![monitor.tenant_id, monitor.id], |row| Self::row_to_rule(&conn, row))?
            .filter_map(|r| r.ok())
            .collect();
        Ok(rows)
    }

    fn get_rules_by_trigger_type(&self, trigger_type: TriggerType) -> Result<Vec<AlertRule>, RepositoryError> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare("SELECT * FROM alert_rules WHERE enabled = 1 AND trigger_type = ?1")?;
        let rows = stmt
            .query_map(params![trigger_type.as_str()], |row| Self::row_to_rule(&conn, row))?
            .filter_map(|r| r.ok())
            .collect();
        Ok(rows)
    }

    fn get_rule(&self, rule_id: &str) -> Result<AlertRule, RepositoryError> {
        let conn = self.conn.lock().unwrap();
        conn.query_row("SELECT * FROM alert_rules WHERE id = ?1", params![rule_id], |row| {
            Self::row_to_rule(&conn, row)
        })
        .map_err(RepositoryError::from)
    }

    fn get_open_incident(&self, monitor_id: &str, rule_id: &str) -> Result<Option<Incident>, RepositoryError> {
        let conn = self.conn.lock().unwrap();
        conn.query_row(
            "SELECT * FROM incidents WHERE monitor_id = ?1 AND alert_rule_id = ?2 AND status = 'open'",
            params![monitor_id, rule_id],
            row_to_incident,
        )
        .optional()
        .map_err(RepositoryError::from)
    }

    fn open_incident(&self, input: OpenIncident<'_>) -> Result<Incident, RepositoryError> {
        let conn = self.conn.lock().unwrap();
        let id = uuid::Uuid::new_v4().to_string();
        conn.execute(
            "INSERT INTO incidents
                (id, tenant_id, monitor_id, alert_rule_id, status, started_at, resolved_at, opening_check_id, cause_summary)
             VALUES (?1, ?2, ?3, ?4, 'open', ?5, NULL, ?6, ?7)",
            params![
                id,
                input.tenant_id,
                input.monitor_id,
                input.alert_rule_id,
                fmt_dt(input.started_at),
                input.opening_check_id,
                input.cause_summary,
            ],
        )?;
        conn.query_row("SELECT * FROM incidents WHERE id = ?1", params![id], row_to_incident)
            .map_err(RepositoryError::from)
    }

    fn resolve_incident(&self, incident_id: &str, at: DateTime<Utc>) -> Result<Incident, RepositoryError> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "UPDATE incidents SET status = 'resolved', resolved_at = ?1 WHERE id = ?2 AND status = 'open'",
            params![fmt_dt(at), incident_id],
        )?;
        conn.query_row("SELECT * FROM incidents WHERE id = ?1", params![incident_id], row_to_incident)
            .map_err(RepositoryError::from)
    }

    fn list_open_incidents(&self, tenant_id: &str) -> Result<Vec<Incident>, RepositoryError> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(
            "SELECT * FROM incidents WHERE tenant_id = ?1 AND status = 'open' ORDER BY started_at DESC",
        )?;
        let rows = stmt
            .query_map(params![tenant_id], row_to_incident)?
            .filter_map(|r| r.ok())
            .collect();
        Ok(rows)
    }

    fn get_channels(&self, tenant_id: &str, channel_ids: &[String]) -> Result<Vec<AlertChannel>, RepositoryError> {
        if channel_ids.is_empty() {
            return Ok(vec![]);
        }
        let conn = self.conn.lock().unwrap();
        let placeholders = channel_ids.iter().map(|_| "?").collect::<Vec<_>>().join(",");
        let sql = format!(
            "SELECT * FROM alert_channels WHERE tenant_id = ? AND enabled = 1 AND id IN ({})",
            placeholders
        );
        let mut stmt = conn.prepare(&sql)?;
        let mut query_params: Vec<&dyn rusqlite::ToSql> = vec![&tenant_id];
        for id in channel_ids {
            query_params.push(id);
        }
        let rows = stmt
            .query_map(query_params.as_slice(), row_to_channel)?
            .filter_map(|r| r.ok())
            .collect();
        Ok(rows)
    }

    fn record_notification_attempt(&self, attempt: &NotificationAttempt) -> Result<(), RepositoryError> {
        let conn = self.conn.lock().unwrap();
        let outcome = match attempt.outcome {
            NotificationOutcome::Success => "success",
            NotificationOutcome::Failure => "failure",
            NotificationOutcome::ConfigError => "config_error",
            NotificationOutcome::Suppressed => "suppressed",
        };
        let event_kind = attempt.event_kind.as_str();
        conn.execute(
            "INSERT INTO notification_attempts
                (id, tenant_id, incident_id, channel_id, event_kind, outcome, detail, attempted_at, attempt_number)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
            params![
                attempt.id,
                attempt.tenant_id,
                attempt.incident_id,
                attempt.channel_id,
                event_kind,
                outcome,
                attempt.detail,
                fmt_dt(attempt.attempted_at),
                attempt.attempt_number,
            ],
        )?;
        Ok(())
    }

    fn recent_notification_attempts(
        &self,
        incident_id: &str,
        channel_id: &str,
        event_kind: EventKind,
        since: DateTime<Utc>,
    ) -> Result<Vec<NotificationAttempt>, RepositoryError> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(
            "SELECT * FROM notification_attempts
             WHERE incident_id = ?1 AND channel_id = ?2 AND event_kind = ?3
               AND attempted_at >= ?4 AND outcome = 'success'
             ORDER BY attempted_at DESC",
        )?;
        let rows = stmt
            .query_map(params![incident_id, channel_id, event_kind.as_str(), fmt_dt(since)], |row| {
                let outcome_raw: String = row.get("outcome")?;
                let event_raw: String = row.get("event_kind")?;
                let attempted_raw: String = row.get("attempted_at")?;
                Ok(NotificationAttempt {
                    id: row.get("id")?,
                    tenant_id: row.get("tenant_id")?,
                    incident_id: row.get("incident_id")?,
                    channel_id: row.get("channel_id")?,
                    event_kind: if event_raw == "incident_opened" {
                        EventKind::IncidentOpened
                    } else {
                        EventKind::IncidentResolved
                    },
                    outcome: match outcome_raw.as_str() {
                        "success" => NotificationOutcome::Success,
                        "config_error" => NotificationOutcome::ConfigError,
                        "suppressed" => NotificationOutcome::Suppressed,
                        _ => NotificationOutcome::Failure,
                    },
                    detail: row.get("detail")?,
                    attempted_at: parse_dt(&attempted_raw),
                    attempt_number: row.get("attempt_number")?,
                })
            })?
            .filter_map(|r| r.ok())
            .collect();
        Ok(rows)
    }

    fn prune_checks_older_than(&self, before: DateTime<Utc>) -> Result<u64, RepositoryError> {
        let conn = self.conn.lock().unwrap();
        let deleted = conn.execute("DELETE FROM monitor_checks WHERE checked_at < ?1", params![fmt_dt(before)])?;
        Ok(deleted as u64)
    }

    fn insert_monitor(&self, monitor: &Monitor) -> Result<(), RepositoryError> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "INSERT INTO monitors
                (id, tenant_id, name, monitor_type, target, keyword, check_interval_seconds, timeout_seconds,
                 enabled, check_ssl, ssl_alert_days, last_checked_at, created_at, updated_at)
             VALUES (?1,?2,?3,?4,?5,?6,?7,?8,?9,?10,?11,?12,?13,?14)",
            params![
                monitor.id,
                monitor.tenant_id,
                monitor.name,
                monitor.monitor_type.as_str(),
                monitor.target,
                monitor.keyword,
                monitor.check_interval_seconds,
                monitor.timeout_seconds,
                monitor.enabled as i64,
                monitor.check_ssl as i64,
                monitor.ssl_alert_days,
                monitor.last_checked_at.map(fmt_dt),
                fmt_dt(monitor.created_at),
                fmt_dt(monitor.updated_at),
            ],
        )?;
        Ok(())
    }

    fn update_monitor(&self, monitor: &Monitor) -> Result<(), RepositoryError> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "UPDATE monitors SET name=?1, monitor_type=?2, target=?3, keyword=?4, check_interval_seconds=?5,
                timeout_seconds=?6, enabled=?7, check_ssl=?8, ssl_alert_days=?9, updated_at=?10
             WHERE id = ?11",
            params![
                monitor.name,
                monitor.monitor_type.as_str(),
                monitor.target,
                monitor.keyword,
                monitor.check_interval_seconds,
                monitor.timeout_seconds,
                monitor.enabled as i64,
                monitor.check_ssl as i64,
                monitor.ssl_alert_days,
                fmt_dt(monitor.updated_at),
                monitor.id,
            ],
        )?;
        Ok(())
    }

    fn delete_monitor(&self, monitor_id: &str) -> Result<(), RepositoryError> {
        let conn = self.conn.lock().unwrap();
        conn.execute("DELETE FROM monitors WHERE id = ?1", params![monitor_id])?;
        Ok(())
    }

    fn insert_rule(&self, rule: &AlertRule) -> Result<(), RepositoryError> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "INSERT INTO alert_rules (id, tenant_id, monitor_id, name, trigger_type, threshold_value, enabled, managed)
             VALUES (?1,?2,?3,?4,?5,?6,?7,?8)",
            params![
                rule.id,
                rule.tenant_id,
                rule.monitor_id,
                rule.name,
                rule.trigger_type.as_str(),
                rule.threshold_value as i64,
                rule.enabled as i64,
                rule.managed as i64,
            ],
        )?;
        for channel_id in &rule.channel_ids {
            conn.execute(
                "INSERT OR IGNORE INTO alert_rule_channels (rule_id, channel_id) VALUES (?1, ?2)",
                params![rule.id, channel_id],
            )?;
        }
        Ok(())
    }

    fn update_rule(&self, rule: &AlertRule) -> Result<(), RepositoryError> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "UPDATE alert_rules SET name=?1, threshold_value=?2, enabled=?3 WHERE id=?4",
            params![rule.name, rule.threshold_value as i64, rule.enabled as i64, rule.id],
        )?;
        conn.execute("DELETE FROM alert_rule_channels WHERE rule_id = ?1", params![rule.id])?;
        for channel_id in &rule.channel_ids {
            conn.execute(
                "INSERT OR IGNORE INTO alert_rule_channels (rule_id, channel_id) VALUES (?1, ?2)",
                params![rule.id, channel_id],
            )?;
        }
        Ok(())
    }

    fn get_managed_ssl_rule(&self, monitor_id: &str) -> Result<Option<AlertRule>, RepositoryError> {
        let conn = self.conn.lock().unwrap();
        conn.query_row(
            "SELECT * FROM alert_rules WHERE monitor_id = ?1 AND trigger_type = 'ssl_expiry' AND managed = 1",
            params![monitor_id],
            |row| Self::row_to_rule(&conn, row),
        )
        .optional()
        .map_err(RepositoryError::from)
    }

    fn delete_rule(&self, rule_id: &str) -> Result<(), RepositoryError> {
        let conn = self.conn.lock().unwrap();
        conn.execute("DELETE FROM alert_rules WHERE id = ?1", params![rule_id])?;
        Ok(())
    }

    fn insert_channel(&self, channel: &AlertChannel) -> Result<(), RepositoryError> {
        let conn = self.conn.lock().unwrap();
        let config_json = serde_json::to_string(&channel.config).unwrap_or_default();
        conn.execute(
            "INSERT INTO alert_channels (id, tenant_id, name, channel_type, enabled, config)
             VALUES (?1,?2,?3,?4,?5,?6)",
            params![
                channel.id,
                channel.tenant_id,
                channel.name,
                channel.config.channel_type().as_str(),
                channel.enabled as i64,
                config_json,
            ],
        )?;
        Ok(())
    }
}
