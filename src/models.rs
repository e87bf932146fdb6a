//! Core data model (spec §3). Mirrors the persisted state layout in §6:
//! normalised tables, ids resolved on demand rather than long-lived object
//! graphs (see DESIGN.md — "cyclic references" note).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub type TenantId = String;
pub type MonitorId = String;
pub type RuleId = String;
pub type ChannelId = String;
pub type IncidentId = String;
pub type CheckId = String;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MonitorType {
    Http,
    Tcp,
    Ping,
}

impl MonitorType {
    pub fn as_str(&self) -> &'static str {
        match self {
            MonitorType::Http => "http",
            MonitorType::Tcp => "tcp",
            MonitorType::Ping => "ping",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "http" => Some(MonitorType::Http),
            "tcp" => Some(MonitorType::Tcp),
            "ping" => Some(MonitorType::Ping),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Monitor {
    pub id: MonitorId,
    pub tenant_id: TenantId,
    pub name: String,
    pub monitor_type: MonitorType,
    pub target: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub keyword: Option<String>,
    pub check_interval_seconds: u32,
    pub timeout_seconds: u32,
    pub enabled: bool,
    pub check_ssl: bool,
    pub ssl_alert_days: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_checked_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Monitor {
    /// `check_ssl` is only meaningful for http monitors whose URL scheme is
    /// https (spec §3 invariant).
    pub fn ssl_applicable(&self) -> bool {
        self.monitor_type == MonitorType::Http
            && self.check_ssl
            && self.target.to_ascii_lowercase().starts_with("https://")
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MonitorCheck {
    pub id: CheckId,
    pub monitor_id: MonitorId,
    pub checked_at: DateTime<Utc>,
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status_code: Option<u16>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub response_time_ms: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ssl_valid: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ssl_expires_at: Option<DateTime<Utc>>,
}

/// A new check prior to insertion (no id yet — assigned by the repository).
#[derive(Debug, Clone)]
pub struct NewMonitorCheck {
    pub monitor_id: MonitorId,
    pub checked_at: DateTime<Utc>,
    pub success: bool,
    pub status_code: Option<u16>,
    pub response_time_ms: Option<u32>,
    pub error_message: Option<String>,
    pub ssl_valid: Option<bool>,
    pub ssl_expires_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TriggerType {
    Down,
    SlowResponse,
    SslExpiry,
}

impl TriggerType {
    pub fn as_str(&self) -> &'static str {
        match self {
            TriggerType::Down => "down",
            TriggerType::SlowResponse => "slow_response",
            TriggerType::SslExpiry => "ssl_expiry",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "down" => Some(TriggerType::Down),
            "slow_response" => Some(TriggerType::SlowResponse),
            "ssl_expiry" => Some(TriggerType::SslExpiry),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AlertRule {
    pub id: RuleId,
    pub tenant_id: TenantId,
    /// `None` means "all monitors of this tenant" (spec §3).
    pub monitor_id: Option<MonitorId>,
    pub name: String,
    pub trigger_type: TriggerType,
    pub threshold_value: u64,
    pub enabled: bool,
    pub channel_ids: Vec<ChannelId>,
    /// Whether this rule is lifecycle-managed by the auto-rule maintainer
    /// (component G) rather than user-authored.
    pub managed: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChannelType {
    Webhook,
    Discord,
    Email,
}

impl ChannelType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ChannelType::Webhook => "webhook",
            ChannelType::Discord => "discord",
            ChannelType::Email => "email",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "webhook" => Some(ChannelType::Webhook),
            "discord" => Some(ChannelType::Discord),
            "email" => Some(ChannelType::Email),
            _ => None,
        }
    }
}

/// Tagged channel configuration (DESIGN NOTES — replaces the source's
/// dynamic config maps with a typed variant per spec §9).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ChannelConfig {
    Webhook { url: String },
    Discord { url: String },
    Email {
        smtp_host: String,
        smtp_port: u16,
        #[serde(skip_serializing_if = "Option::is_none")]
        smtp_user: Option<String>,
        #[serde(skip_serializing_if = "Option::is_none")]
        smtp_password: Option<String>,
        smtp_from: String,
        recipients: Vec<String>,
    },
}

impl ChannelConfig {
    pub fn channel_type(&self) -> ChannelType {
        match self {
            ChannelConfig::Webhook { .. } => ChannelType::Webhook,
            ChannelConfig::Discord { .. } => ChannelType::Discord,
            ChannelConfig::Email { .. } => ChannelType::Email,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AlertChannel {
    pub id: ChannelId,
    pub tenant_id: TenantId,
    pub name: String,
    pub enabled: bool,
    pub config: ChannelConfig,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IncidentStatus {
    Open,
    Resolved,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Incident {
    pub id: IncidentId,
    pub tenant_id: TenantId,
    pub monitor_id: MonitorId,
    pub alert_rule_id: RuleId,
    pub status: IncidentStatus,
    pub started_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub resolved_at: Option<DateTime<Utc>>,
    pub opening_check_id: CheckId,
    pub cause_summary: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    IncidentOpened,
    IncidentResolved,
}

impl EventKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            EventKind::IncidentOpened => "incident_opened",
            EventKind::IncidentResolved => "incident_resolved",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationOutcome {
    Success,
    Failure,
    ConfigError,
    Suppressed,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NotificationAttempt {
    pub id: String,
    pub tenant_id: TenantId,
    pub incident_id: IncidentId,
    pub channel_id: ChannelId,
    pub event_kind: EventKind,
    pub outcome: NotificationOutcome,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
    pub attempted_at: DateTime<Utc>,
    pub attempt_number: u32,
}

/// Ingested mutation events from the (out-of-scope) API tier — spec §6.
#[derive(Debug, Clone)]
pub enum IngestedEvent {
    MonitorCreated(MonitorId),
    MonitorUpdated(MonitorId),
    MonitorDeleted(MonitorId),
    RuleCreated(RuleId),
    RuleUpdated(RuleId),
    RuleDeleted(RuleId),
    ChannelCreated(ChannelId),
    ChannelUpdated(ChannelId),
    ChannelDeleted(ChannelId),
}
