//! Event broadcaster (component F, spec §4.6).
//!
//! Generalises the base crate's single `tokio::sync::broadcast` channel
//! (`sse.rs`) into a tenant-keyed subscriber registry with per-subscriber
//! bounded buffers and drop-on-full semantics, so one slow dashboard
//! connection cannot stall delivery to any other subscriber.

use crate::models::{EventKind, Incident, NewMonitorCheck, TenantId};
use chrono::Utc;
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{debug, trace};
use uuid::Uuid;

/// One live listener for a tenant's event stream. `events()` yields framed
/// JSON envelopes (spec §6); heartbeats are interleaved by the caller using
/// `heartbeat_interval`.
pub struct Subscription {
    pub id: String,
    pub tenant_id: TenantId,
    receiver: mpsc::Receiver<Value>,
    registry: std::sync::Weak<SubscriberRegistry>,
}

impl Subscription {
    pub async fn recv(&mut self) -> Option<Value> {
        self.receiver.recv().await
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(registry) = self.registry.upgrade() {
            registry.remove(&self.tenant_id, &self.id);
        }
    }
}

struct Subscriber {
    id: String,
    sender: mpsc::Sender<Value>,
    dropped_events: AtomicU64,
}

#[derive(Default)]
struct SubscriberRegistry {
    by_tenant: Mutex<HashMap<TenantId, Vec<Subscriber>>>,
}

impl SubscriberRegistry {
    fn remove(&self, tenant_id: &str, subscriber_id: &str) {
        let mut map = self.by_tenant.lock().expect("broadcaster registry mutex poisoned");
        if let Some(subs) = map.get_mut(tenant_id) {
            subs.retain(|s| s.id != subscriber_id);
            if subs.is_empty() {
                map.remove(tenant_id);
            }
        }
    }
}

pub struct Broadcaster {
    registry: std::sync::Arc<SubscriberRegistry>,
    buffer_size: usize,
    pub heartbeat_interval: Duration,
}

impl Broadcaster {
    pub fn new(subscriber_buffer: usize, heartbeat_interval: Duration) -> Self {
        Broadcaster {
            registry: std::sync::Arc::new(SubscriberRegistry::default()),
            buffer_size: subscriber_buffer,
            heartbeat_interval,
        }
    }

    /// Registers a new subscriber for `tenant_id`. Events for other tenants
    /// are never routed to it — filtering happens at `broadcast`, before
    /// any subscriber sees an event outside its own tenant (spec §4.6).
    pub fn subscribe(&self, tenant_id: &str) -> Subscription {
        let (tx, rx) = mpsc::channel(self.buffer_size);
        let id = Uuid::new_v4().to_string();
        let mut map = self.registry.by_tenant.lock().expect("broadcaster registry mutex poisoned");
        map.entry(tenant_id.to_string()).or_default().push(Subscriber {
            id: id.clone(),
            sender: tx,
            dropped_events: AtomicU64::new(0),
        });
        Subscription {
            id,
            tenant_id: tenant_id.to_string(),
            receiver: rx,
            registry: std::sync::Arc::downgrade(&self.registry),
        }
    }

    pub fn subscriber_count(&self, tenant_id: &str) -> usize {
        self.registry
            .by_tenant
            .lock()
            .expect("broadcaster registry mutex poisoned")
            .get(tenant_id)
            .map_or(0, |v| v.len())
    }

    /// Total events dropped across this tenant's subscribers due to a full
    /// buffer (spec §8 "backpressure" scenario).
    pub fn dropped_events(&self, tenant_id: &str) -> u64 {
        self.registry
            .by_tenant
            .lock()
            .expect("broadcaster registry mutex poisoned")
            .get(tenant_id)
            .map_or(0, |subs| subs.iter().map(|s| s.dropped_events.load(Ordering::Relaxed)).sum())
    }

    fn broadcast(&self, tenant_id: &str, envelope: Value) {
        let map = self.registry.by_tenant.lock().expect("broadcaster registry mutex poisoned");
        let Some(subs) = map.get(tenant_id) else { return };
        for sub in subs {
            match sub.sender.try_send(envelope.clone()) {
                Ok(()) => {}
                Err(mpsc::error::TrySendError::Full(_)) => {
                    sub.dropped_events.fetch_add(1, Ordering::Relaxed);
                    trace!(tenant_id, subscriber_id = %sub.id, "dropping event, subscriber buffer full");
                }
                Err(mpsc::error::TrySendError::Closed(_)) => {
                    // Subscriber already dropped its receiver; it will be
                    // pruned on its own `Drop`.
                }
            }
        }
    }

    pub fn publish_check(&self, tenant_id: &str, monitor_id: &str, check_id: &str, check: &NewMonitorCheck) {
        debug!(tenant_id, monitor_id, check_id, "broadcasting check event");
        let envelope = json!({
            "type": "check",
            "data": {
                "id": check_id,
                "monitor_id": monitor_id,
                "checked_at": check.checked_at.to_rfc3339(),
                "success": check.success,
                "status_code": check.status_code,
                "response_time_ms": check.response_time_ms,
                "error_message": check.error_message,
                "ssl_valid": check.ssl_valid,
                "ssl_expires_at": check.ssl_expires_at.map(|t| t.to_rfc3339()),
            },
            "timestamp": Utc::now().to_rfc3339(),
        });
        self.broadcast(tenant_id, envelope);
    }

    pub fn publish_incident(&self, tenant_id: &str, incident: &Incident, kind: EventKind) {
        debug!(tenant_id, incident_id = %incident.id, kind = kind.as_str(), "broadcasting incident event");
        let envelope = json!({
            "type": kind.as_str(),
            "data": {
                "id": incident.id,
                "monitor_id": incident.monitor_id,
                "alert_rule_id": incident.alert_rule_id,
                "status": match incident.status {
                    crate::models::IncidentStatus::Open => "open",
                    crate::models::IncidentStatus::Resolved => "resolved",
                },
                "started_at": incident.started_at.to_rfc3339(),
                "resolved_at": incident.resolved_at.map(|t| t.to_rfc3339()),
                "cause_summary": incident.cause_summary,
            },
            "timestamp": Utc::now().to_rfc3339(),
        });
        self.broadcast(tenant_id, envelope);
    }

    /// Heartbeat envelope, sent periodically per subscriber by the host
    /// transport to keep the connection warm (spec §4.6).
    pub fn heartbeat_envelope() -> Value {
        json!({ "type": "heartbeat", "data": {}, "timestamp": Utc::now().to_rfc3339() })
    }
}
