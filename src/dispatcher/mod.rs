//! Notification dispatcher (component E, spec §4.5).
//!
//! Consumes `incident_opened`/`incident_resolved` events, resolves the
//! rule's enabled channels, and delivers a type-specific payload with
//! retry/backoff. Each channel type (webhook/discord/email) has its own
//! bounded concurrency pool; duplicate sends within a 60s window per
//! `(incident_id, channel_id, event_kind)` are suppressed, and dispatch is
//! serialised per-incident so `incident_resolved` can never race ahead of
//! its `incident_opened`.

mod discord;
mod email;
mod retry;
mod webhook;

pub mod validate;

use crate::config::Config;
use crate::db::Repository;
use crate::error::DispatchError;
use crate::models::{AlertChannel, AlertRule, ChannelConfig, ChannelType, EventKind, Incident, Monitor, NotificationAttempt, NotificationOutcome};
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::sync::Arc;
use tokio::sync::{Mutex, Semaphore};
use tracing::{debug, error, warn};
use uuid::Uuid;

const DUPLICATE_SUPPRESSION_WINDOW_SECS: i64 = 60;

pub struct NotificationContext<'a> {
    pub incident_id: &'a str,
    pub monitor_name: &'a str,
    pub monitor_url: &'a str,
    pub rule_name: &'a str,
    pub kind: EventKind,
    pub timestamp: DateTime<Utc>,
    pub duration: Option<ChronoDuration>,
}

impl<'a> NotificationContext<'a> {
    pub fn status_str(&self) -> &'static str {
        match self.kind {
            EventKind::IncidentOpened => "down",
            EventKind::IncidentResolved => "resolved",
        }
    }

    pub fn message(&self) -> String {
        match self.kind {
            EventKind::IncidentOpened => format!("{} is down", self.monitor_name),
            EventKind::IncidentResolved => format!("{} has recovered", self.monitor_name),
        }
    }

    pub fn duration_human(&self) -> Option<String> {
        let d = self.duration?;
        let secs = d.num_seconds().max(0);
        Some(if secs < 60 {
            format!("{secs}s")
        } else if secs < 3600 {
            format!("{}m{}s", secs / 60, secs % 60)
        } else {
            format!("{}h{}m", secs / 3600, (secs % 3600) / 60)
        })
    }
}

pub struct Dispatcher<R: Repository + 'static> {
    repo: Arc<R>,
    http_client: reqwest::Client,
    config: Config,
    webhook_pool: Arc<Semaphore>,
    discord_pool: Arc<Semaphore>,
    email_pool: Arc<Semaphore>,
    incident_shards: Vec<Mutex<()>>,
}

impl<R: Repository + 'static> Dispatcher<R> {
    pub fn new(repo: Arc<R>, config: Config) -> Self {
        let per_type = config.dispatcher_concurrency_per_type;
        let shard_count = config.evaluator_shards.max(1);
        Dispatcher {
            repo,
            http_client: reqwest::Client::new(),
            config,
            webhook_pool: Arc::new(Semaphore::new(per_type)),
            discord_pool: Arc::new(Semaphore::new(per_type)),
            email_pool: Arc::new(Semaphore::new(per_type)),
            incident_shards: (0..shard_count).map(|_| Mutex::new(())).collect(),
        }
    }

    fn incident_shard(&self, incident_id: &str) -> &Mutex<()> {
        let mut hasher = DefaultHasher::new();
        incident_id.hash(&mut hasher);
        let idx = (hasher.finish() as usize) % self.incident_shards.len();
        &self.incident_shards[idx]
    }

    /// Dispatches one incident event across all of the rule's enabled
    /// channels concurrently, honouring per-type pools and duplicate
    /// suppression.
    pub async fn dispatch(&self, monitor: &Monitor, rule: &AlertRule, incident: &Incident, kind: EventKind) {
        let _guard = self.incident_shard(&incident.id).lock().await;

        let channels = match self.repo.get_channels(&monitor.tenant_id, &rule.channel_ids) {
            Ok(channels) => channels,
            Err(err) => {
                error!(incident_id = %incident.id, error = %err, "failed to load channels for dispatch");
                return;
            }
        };

        let duration = match kind {
            EventKind::IncidentResolved => incident.resolved_at.map(|r| r - incident.started_at),
            EventKind::IncidentOpened => None,
        };

        let ctx = NotificationContext {
            incident_id: &incident.id,
            monitor_name: &monitor.name,
            monitor_url: &monitor.target,
            rule_name: &rule.name,
            kind,
            timestamp: Utc::now(),
            duration,
        };

        let mut tasks = Vec::with_capacity(channels.len());
        for channel in channels.into_iter().filter(|c| c.enabled) {
            tasks.push(self.dispatch_one(channel, &ctx));
        }
        futures_util::future::join_all(tasks).await;
    }

    async fn dispatch_one(&self, channel: AlertChannel, ctx: &NotificationContext<'_>) {
        let since = ctx.timestamp - ChronoDuration::seconds(DUPLICATE_SUPPRESSION_WINDOW_SECS);
        match self.repo.recent_notification_attempts(ctx.incident_id, &channel.id, ctx.kind, since) {
            Ok(attempts) if attempts.iter().any(|a| a.outcome == NotificationOutcome::Success) => {
                debug!(incident_id = ctx.incident_id, channel_id = %channel.id, "suppressing duplicate notification");
                self.record(&channel, ctx, 0, NotificationOutcome::Suppressed, None);
                return;
            }
            Ok(_) => {}
            Err(err) => {
                warn!(channel_id = %channel.id, error = %err, "failed to check duplicate suppression window, proceeding");
            }
        }

        if let Err(err) = validate::validate(&channel.config) {
            self.record(&channel, ctx, 1, NotificationOutcome::ConfigError, Some(err.to_string()));
            return;
        }

        let pool = match channel.config.channel_type() {
            ChannelType::Webhook => &self.webhook_pool,
            ChannelType::Discord => &self.discord_pool,
            ChannelType::Email => &self.email_pool,
        };

        let Ok(_permit) = pool.clone().acquire_owned().await else { return };

        let max_attempts = self.config.dispatcher_retry.max_attempts;
        for attempt in 1..=max_attempts {
            match self.send_once(&channel.config, ctx).await {
                Ok(()) => {
                    self.record(&channel, ctx, attempt, NotificationOutcome::Success, None);
                    return;
                }
                Err(DispatchError::ConfigError(detail)) => {
                    self.record(&channel, ctx, attempt, NotificationOutcome::ConfigError, Some(detail));
                    return;
                }
                Err(err) => {
                    warn!(channel_id = %channel.id, attempt, error = %err, "notification attempt failed");
                    if attempt == max_attempts {
                        self.record(&channel, ctx, attempt, NotificationOutcome::Failure, Some(err.to_string()));
                        return;
                    }
                    tokio::time::sleep(retry::backoff_delay(attempt, &self.config.dispatcher_retry)).await;
                }
            }
        }
    }

    async fn send_once(&self, config: &ChannelConfig, ctx: &NotificationContext<'_>) -> Result<(), DispatchError> {
        match config {
            ChannelConfig::Webhook { url } => webhook::send(&self.http_client, url, ctx, self.config.dispatcher_timeout).await,
            ChannelConfig::Discord { url } => discord::send(&self.http_client, url, ctx, self.config.dispatcher_timeout).await,
            ChannelConfig::Email { .. } => email::send(config, ctx, self.config.dispatcher_timeout).await,
        }
    }

    fn record(&self, channel: &AlertChannel, ctx: &NotificationContext<'_>, attempt_number: u32, outcome: NotificationOutcome, detail: Option<String>) {
        let attempt = NotificationAttempt {
            id: Uuid::new_v4().to_string(),
            tenant_id: channel.tenant_id.clone(),
            incident_id: ctx.incident_id.to_string(),
            channel_id: channel.id.clone(),
            event_kind: ctx.kind,
            outcome,
            detail,
            attempted_at: Utc::now(),
            attempt_number,
        };
        if let Err(err) = self.repo.record_notification_attempt(&attempt) {
            error!(incident_id = ctx.incident_id, channel_id = %channel.id, error = %err, "failed to record notification attempt");
        }
    }
}
