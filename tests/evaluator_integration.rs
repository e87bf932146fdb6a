//! Incident lifecycle scenarios against a real (in-memory) sqlite
//! repository, mirroring the literal end-to-end cases in the design
//! document's testable-properties section.

use chrono::{Duration as ChronoDuration, Utc};
use sentrywatch_core::broadcaster::Broadcaster;
use sentrywatch_core::config::{Config, RetryConfig};
use sentrywatch_core::db::{Repository, SqliteRepository};
use sentrywatch_core::dispatcher::Dispatcher;
use sentrywatch_core::evaluator::Evaluator;
use sentrywatch_core::models::*;
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;

fn test_config() -> Config {
    Config {
        database_path: ":memory:".into(),
        scheduler_tick: Duration::from_secs(10),
        scheduler_worker_pool: 10,
        probe_default_timeout: Duration::from_secs(5),
        probe_max_redirects: 5,
        evaluator_shards: 4,
        dispatcher_concurrency_per_type: 4,
        dispatcher_timeout: Duration::from_secs(5),
        dispatcher_retry: RetryConfig { initial: Duration::from_millis(1), factor: 2.0, max_attempts: 1, jitter: 0.0 },
        broadcaster_subscriber_buffer: 10,
        broadcaster_heartbeat: Duration::from_secs(30),
        retention_check_days: 90,
    }
}

fn new_monitor(tenant_id: &str, monitor_type: MonitorType, ssl_alert_days: u32) -> Monitor {
    let now = Utc::now();
    Monitor {
        id: Uuid::new_v4().to_string(),
        tenant_id: tenant_id.into(),
        name: "example".into(),
        monitor_type,
        target: "https://example.test/ok".into(),
        keyword: None,
        check_interval_seconds: 60,
        timeout_seconds: 10,
        enabled: true,
        check_ssl: false,
        ssl_alert_days,
        last_checked_at: None,
        created_at: now,
        updated_at: now,
    }
}

fn new_rule(tenant_id: &str, monitor_id: &str, trigger_type: TriggerType, threshold: u64) -> AlertRule {
    AlertRule {
        id: Uuid::new_v4().to_string(),
        tenant_id: tenant_id.into(),
        monitor_id: Some(monitor_id.into()),
        name: "test rule".into(),
        trigger_type,
        threshold_value: threshold,
        enabled: true,
        channel_ids: vec![],
        managed: false,
    }
}

fn insert_check(repo: &SqliteRepository, monitor_id: &str, success: bool, response_time_ms: Option<u32>) -> MonitorCheck {
    let new_check = NewMonitorCheck {
        monitor_id: monitor_id.into(),
        checked_at: Utc::now(),
        success,
        status_code: Some(if success { 200 } else { 500 }),
        response_time_ms,
        error_message: if success { None } else { Some("non_success_status: 500".into()) },
        ssl_valid: None,
        ssl_expires_at: None,
    };
    let id = repo.insert_check(&new_check).unwrap();
    MonitorCheck {
        id,
        monitor_id: new_check.monitor_id,
        checked_at: new_check.checked_at,
        success: new_check.success,
        status_code: new_check.status_code,
        response_time_ms: new_check.response_time_ms,
        error_message: new_check.error_message,
        ssl_valid: new_check.ssl_valid,
        ssl_expires_at: new_check.ssl_expires_at,
    }
}

fn build_evaluator(repo: Arc<SqliteRepository>) -> Evaluator<SqliteRepository> {
    let broadcaster = Arc::new(Broadcaster::new(10, Duration::from_secs(30)));
    let dispatcher = Arc::new(Dispatcher::new(repo.clone(), test_config()));
    Evaluator::new(repo, broadcaster, dispatcher, 4)
}

#[tokio::test]
async fn down_threshold_one_opens_on_first_failure_and_resolves_on_success() {
    let repo = Arc::new(SqliteRepository::in_memory().unwrap());
    let monitor = new_monitor("tenant-a", MonitorType::Http, 30);
    repo.insert_monitor(&monitor).unwrap();
    let rule = new_rule("tenant-a", &monitor.id, TriggerType::Down, 1);
    repo.insert_rule(&rule).unwrap();

    let evaluator = build_evaluator(repo.clone());

    let failing_check = insert_check(&repo, &monitor.id, false, None);
    evaluator.evaluate_check(&monitor, &failing_check).await;

    let open = repo.get_open_incident(&monitor.id, &rule.id).unwrap();
    assert!(open.is_some(), "expected an open incident after a single failure with threshold=1");

    let success_check = insert_check(&repo, &monitor.id, true, Some(50));
    evaluator.evaluate_check(&monitor, &success_check).await;

    let open_after_recovery = repo.get_open_incident(&monitor.id, &rule.id).unwrap();
    assert!(open_after_recovery.is_none(), "incident should resolve on the next successful check");
}

#[tokio::test]
async fn flap_sequence_opens_at_third_failure_and_resolves_at_fourth_check() {
    let repo = Arc::new(SqliteRepository::in_memory().unwrap());
    let monitor = new_monitor("tenant-a", MonitorType::Http, 30);
    repo.insert_monitor(&monitor).unwrap();
    let rule = new_rule("tenant-a", &monitor.id, TriggerType::Down, 3);
    repo.insert_rule(&rule).unwrap();

    let evaluator = build_evaluator(repo.clone());

    for outcome in [false, false] {
        let check = insert_check(&repo, &monitor.id, outcome, None);
        evaluator.evaluate_check(&monitor, &check).await;
        assert!(repo.get_open_incident(&monitor.id, &rule.id).unwrap().is_none());
    }

    let third_failure = insert_check(&repo, &monitor.id, false, None);
    evaluator.evaluate_check(&monitor, &third_failure).await;
    assert!(repo.get_open_incident(&monitor.id, &rule.id).unwrap().is_some(), "incident should open on the 3rd consecutive failure");

    let recovery = insert_check(&repo, &monitor.id, true, Some(20));
    evaluator.evaluate_check(&monitor, &recovery).await;
    assert!(repo.get_open_incident(&monitor.id, &rule.id).unwrap().is_none(), "incident should resolve on the 4th check");
}

#[tokio::test]
async fn at_most_one_open_incident_per_monitor_and_rule() {
    let repo = Arc::new(SqliteRepository::in_memory().unwrap());
    let monitor = new_monitor("tenant-a", MonitorType::Http, 30);
    repo.insert_monitor(&monitor).unwrap();
    let rule = new_rule("tenant-a", &monitor.id, TriggerType::Down, 1);
    repo.insert_rule(&rule).unwrap();

    let evaluator = build_evaluator(repo.clone());

    for _ in 0..3 {
        let check = insert_check(&repo, &monitor.id, false, None);
        evaluator.evaluate_check(&monitor, &check).await;
    }

    let open_incidents = repo.list_open_incidents("tenant-a").unwrap();
    assert_eq!(open_incidents.len(), 1, "repeated firing checks must not open a second incident");
}

#[tokio::test]
async fn ssl_expiry_boundary_opens_just_under_threshold_and_resolves_after_renewal() {
    let repo = Arc::new(SqliteRepository::in_memory().unwrap());
    let mut monitor = new_monitor("tenant-a", MonitorType::Http, 30);
    monitor.check_ssl = true;
    repo.insert_monitor(&monitor).unwrap();
    let rule = new_rule("tenant-a", &monitor.id, TriggerType::SslExpiry, 30);
    repo.insert_rule(&rule).unwrap();

    let evaluator = build_evaluator(repo.clone());

    let now = Utc::now();
    let almost_expired = NewMonitorCheck {
        monitor_id: monitor.id.clone(),
        checked_at: now,
        success: true,
        status_code: Some(200),
        response_time_ms: Some(40),
        error_message: None,
        ssl_valid: Some(true),
        ssl_expires_at: Some(now + ChronoDuration::days(29)),
    };
    let id = repo.insert_check(&almost_expired).unwrap();
    let check = MonitorCheck {
        id,
        monitor_id: almost_expired.monitor_id.clone(),
        checked_at: almost_expired.checked_at,
        success: true,
        status_code: almost_expired.status_code,
        response_time_ms: almost_expired.response_time_ms,
        error_message: None,
        ssl_valid: almost_expired.ssl_valid,
        ssl_expires_at: almost_expired.ssl_expires_at,
    };
    evaluator.evaluate_check(&monitor, &check).await;

    let opened = repo.get_open_incident(&monitor.id, &rule.id).unwrap();
    assert!(opened.is_some());
    assert_eq!(opened.unwrap().cause_summary, "ssl_expires_in_29_days");

    let renewed = NewMonitorCheck {
        monitor_id: monitor.id.clone(),
        checked_at: Utc::now(),
        success: true,
        status_code: Some(200),
        response_time_ms: Some(40),
        error_message: None,
        ssl_valid: Some(true),
        ssl_expires_at: Some(now + ChronoDuration::days(60)),
    };
    let id = repo.insert_check(&renewed).unwrap();
    let check = MonitorCheck {
        id,
        monitor_id: renewed.monitor_id.clone(),
        checked_at: renewed.checked_at,
        success: true,
        status_code: renewed.status_code,
        response_time_ms: renewed.response_time_ms,
        error_message: None,
        ssl_valid: renewed.ssl_valid,
        ssl_expires_at: renewed.ssl_expires_at,
    };
    evaluator.evaluate_check(&monitor, &check).await;

    assert!(repo.get_open_incident(&monitor.id, &rule.id).unwrap().is_none(), "renewal should resolve the incident");
}

#[tokio::test]
async fn tenant_scoped_broadcast_never_crosses_tenants() {
    let broadcaster = Broadcaster::new(10, Duration::from_secs(30));
    let mut tenant_a_sub = broadcaster.subscribe("tenant-a");
    let mut tenant_b_sub = broadcaster.subscribe("tenant-b");

    let check = NewMonitorCheck {
        monitor_id: "m-b".into(),
        checked_at: Utc::now(),
        success: false,
        status_code: Some(500),
        response_time_ms: Some(10),
        error_message: Some("non_success_status: 500".into()),
        ssl_valid: None,
        ssl_expires_at: None,
    };
    broadcaster.publish_check("tenant-b", "m-b", "c-b", &check);

    let b_event = tokio::time::timeout(Duration::from_millis(200), tenant_b_sub.recv()).await;
    assert!(b_event.is_ok() && b_event.unwrap().is_some(), "tenant B should receive its own event");

    let a_event = tokio::time::timeout(Duration::from_millis(50), tenant_a_sub.recv()).await;
    assert!(a_event.is_err(), "tenant A must never see tenant B's event");
}

#[tokio::test]
async fn full_buffer_drops_without_stalling_other_subscribers() {
    let broadcaster = Broadcaster::new(2, Duration::from_secs(30));
    let never_drained = broadcaster.subscribe("tenant-a");
    let mut other = broadcaster.subscribe("tenant-a");

    let check = NewMonitorCheck {
        monitor_id: "m-a".into(),
        checked_at: Utc::now(),
        success: true,
        status_code: Some(200),
        response_time_ms: Some(5),
        error_message: None,
        ssl_valid: None,
        ssl_expires_at: None,
    };

    // Both subscribers have a 2-slot buffer; the 3rd publish overflows it for
    // whichever subscriber hasn't drained (both, here), forcing a drop.
    for _ in 0..3 {
        broadcaster.publish_check("tenant-a", "m-a", "c", &check);
    }

    assert!(broadcaster.dropped_events("tenant-a") >= 1);

    // `other` still has its queued events available despite the drop.
    let got = tokio::time::timeout(Duration::from_millis(200), other.recv()).await;
    assert!(got.is_ok() && got.unwrap().is_some());

    drop(never_drained);
}
