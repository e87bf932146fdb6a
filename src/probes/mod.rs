//! Probe executors (component B, spec §4.2).
//!
//! Each executor is a pure function of `(monitor, now, timeout)` to a
//! `CheckOutcome` — no shared mutable state, no knowledge of the scheduler
//! or the repository. `dispatch` selects the executor by monitor type.

mod http;
mod ping;
mod tcp;
mod tls;

use crate::error::ProbeError;
use crate::models::{Monitor, MonitorType, NewMonitorCheck};
use chrono::{DateTime, Utc};
use std::time::Duration;

/// The outcome of one probe execution, prior to being turned into a
/// `NewMonitorCheck` row (keeps the probe layer free of repository types).
#[derive(Debug, Clone)]
pub struct CheckOutcome {
    pub success: bool,
    pub status_code: Option<u16>,
    pub response_time_ms: Option<u32>,
    pub error_message: Option<String>,
    pub ssl_valid: Option<bool>,
    pub ssl_expires_at: Option<DateTime<Utc>>,
}

impl CheckOutcome {
    pub fn into_check(self, monitor_id: &str, checked_at: DateTime<Utc>) -> NewMonitorCheck {
        NewMonitorCheck {
            monitor_id: monitor_id.to_string(),
            checked_at,
            success: self.success,
            status_code: self.status_code,
            response_time_ms: self.response_time_ms,
            error_message: self.error_message,
            ssl_valid: self.ssl_valid,
            ssl_expires_at: self.ssl_expires_at,
        }
    }
}

/// Execute the probe appropriate to `monitor.monitor_type`. `http_client`
/// is process-wide and passed in so callers can enforce the "no shared
/// connection pool across tenants" rule (spec §5) by handing each tenant
/// its own client, or a single client when that guarantee is not needed
/// (e.g. in tests).
pub async fn execute(monitor: &Monitor, http_client: &reqwest::Client, now: DateTime<Utc>) -> CheckOutcome {
    let timeout = Duration::from_secs(monitor.timeout_seconds as u64);
    match monitor.monitor_type {
        MonitorType::Http => http::check(http_client, monitor, timeout, now).await,
        MonitorType::Tcp => tcp::check(monitor, timeout).await,
        MonitorType::Ping => ping::check(monitor, timeout).await,
    }
}

pub(crate) fn outcome_from_probe_error(err: ProbeError) -> CheckOutcome {
    let status_code = match &err {
        ProbeError::NonSuccessStatus(code) => Some(*code),
        _ => None,
    };
    CheckOutcome {
        success: false,
        status_code,
        response_time_ms: None,
        error_message: Some(err.canonical()),
        ssl_valid: None,
        ssl_expires_at: None,
    }
}
