//! The only HTTP surface this crate exposes: a tenant-scoped live event
//! stream and a health check. The CRUD API that manages monitors, rules,
//! and channels lives in a separate, out-of-scope tier (spec §1) that
//! talks to the same repository.

use crate::broadcaster::Broadcaster;
use crate::scheduler::DegradedState;
use rocket::response::stream::{Event, EventStream};
use rocket::serde::json::Json;
use rocket::{get, State};
use serde::Serialize;
use std::sync::Arc;

#[derive(Serialize)]
pub struct HealthStatus {
    ok: bool,
    degraded: bool,
}

#[get("/health")]
pub fn health(degraded: &State<Arc<DegradedState>>) -> Json<HealthStatus> {
    Json(HealthStatus { ok: true, degraded: degraded.is_degraded() })
}

/// Tenant-scoped live event stream (spec §4.6/§6). Each subscriber gets its
/// own bounded buffer; heartbeats are interleaved so intermediaries don't
/// close an idle connection.
#[get("/events/<tenant_id>")]
pub fn events<'a>(tenant_id: &str, broadcaster: &'a State<Arc<Broadcaster>>) -> EventStream![Event + 'a] {
    let mut subscription = broadcaster.subscribe(tenant_id);
    let heartbeat_interval = broadcaster.heartbeat_interval;

    EventStream! {
        let mut heartbeat = rocket::tokio::time::interval(heartbeat_interval);
        heartbeat.tick().await; // first tick fires immediately; discard it
        loop {
            rocket::tokio::select! {
                maybe_event = subscription.recv() => {
                    match maybe_event {
                        Some(envelope) => {
                            let event_type = envelope.get("type").and_then(|v| v.as_str()).unwrap_or("message").to_string();
                            let data = serde_json::to_string(&envelope).unwrap_or_default();
                            yield Event::data(data).event(event_type);
                        }
                        None => break,
                    }
                }
                _ = heartbeat.tick() => {
                    let data = serde_json::to_string(&Broadcaster::heartbeat_envelope()).unwrap_or_default();
                    yield Event::data(data).event("heartbeat");
                }
            }
        }
    }
}
