#[macro_use]
extern crate rocket;

use chrono::Utc;
use rocket::{Build, Rocket};
use sentrywatch_core::broadcaster::Broadcaster;
use sentrywatch_core::config::Config;
use sentrywatch_core::db::SqliteRepository;
use sentrywatch_core::dispatcher::Dispatcher;
use sentrywatch_core::evaluator::Evaluator;
use sentrywatch_core::models::IngestedEvent;
use sentrywatch_core::retention;
use sentrywatch_core::routes;
use sentrywatch_core::rules::RuleMaintainer;
use sentrywatch_core::scheduler::Scheduler;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::info;

#[launch]
async fn rocket() -> Rocket<Build> {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    let config = Config::from_env();
    info!(database_path = %config.database_path, "starting sentrywatch-core");

    let repo = Arc::new(SqliteRepository::new(&config.database_path).expect("failed to open database"));
    let broadcaster = Arc::new(Broadcaster::new(config.broadcaster_subscriber_buffer, config.broadcaster_heartbeat));
    let dispatcher = Arc::new(Dispatcher::new(repo.clone(), config.clone()));
    let evaluator = Arc::new(Evaluator::new(repo.clone(), broadcaster.clone(), dispatcher.clone(), config.evaluator_shards));
    let scheduler = Arc::new(Scheduler::new(repo.clone(), broadcaster.clone(), evaluator.clone(), config.clone()));
    let rule_maintainer = Arc::new(RuleMaintainer::new(repo.clone()));

    // monitor/rule/channel mutation events (spec §6) are produced by the
    // out-of-scope API tier; it holds `ingest_tx` and pushes here.
    let (ingest_tx, mut ingest_rx) = tokio::sync::mpsc::channel::<IngestedEvent>(256);
    tokio::spawn(async move {
        while let Some(event) = ingest_rx.recv().await {
            rule_maintainer.handle_event(event).await;
        }
    });

    let cancel = CancellationToken::new();

    tokio::spawn({
        let scheduler = scheduler.clone();
        let cancel = cancel.clone();
        async move { scheduler.run(cancel).await }
    });

    tokio::spawn({
        let repo = repo.clone();
        let retention_days = config.retention_check_days;
        let cancel = cancel.clone();
        async move { retention::run(repo, retention_days, cancel).await }
    });

    tokio::spawn({
        let evaluator = evaluator.clone();
        let cancel = cancel.clone();
        async move {
            let mut ticker = tokio::time::interval(std::time::Duration::from_secs(60));
            loop {
                tokio::select! {
                    _ = ticker.tick() => evaluator.run_ssl_expiry_tick(Utc::now()).await,
                    _ = cancel.cancelled() => break,
                }
            }
        }
    });

    rocket::build()
        .manage(broadcaster)
        .manage(scheduler.degraded.clone())
        .manage(ingest_tx)
        .manage(cancel)
        .mount("/", routes![routes::health, routes::events])
}
