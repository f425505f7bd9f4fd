use std::sync::Arc;

use actix_web::{middleware::Logger, web, App, HttpServer};
use anyhow::Context;
use tokio::sync::watch;
use tracing::{info, warn};

use stream_state_service::config::Config;
use stream_state_service::handlers::{self, AppState};
use stream_state_service::metrics;
use stream_state_service::services::auth::PublishAuth;
use stream_state_service::services::reconciler::{
    run_snapshot_loop, MediaServerClient, MetricsNotifier, Notifier, Reconciler, ReconcilerActor,
    RedisStore, SnapshotSource, StateStore,
};

#[actix_web::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,actix_web=info".into()),
        )
        .init();

    let config = Config::from_env();

    // No backing store, no service: fail fast instead of running blind.
    let store: Arc<dyn StateStore> = Arc::new(
        RedisStore::connect(&config.redis_url)
            .await
            .context("failed to connect to Redis")?,
    );
    let notifier: Arc<dyn Notifier> = Arc::new(MetricsNotifier);

    let reconciler = Reconciler::new(
        store.clone(),
        notifier,
        config.stream_path_prefix.clone(),
        config.stopped_retention,
    );
    let (actor, reconciler_handle) = ReconcilerActor::new(reconciler);
    let actor_task = tokio::spawn(actor.run());

    let snapshot_source: Arc<dyn SnapshotSource> = Arc::new(MediaServerClient::new(
        &config.media_api_url,
        config.snapshot_timeout,
    )?);
    let (shutdown_tx, shutdown_rx) = watch::channel(());
    let monitor_task = tokio::spawn(run_snapshot_loop(
        snapshot_source,
        reconciler_handle.clone(),
        config.poll_interval,
        shutdown_rx,
    ));

    let state = web::Data::new(AppState {
        reconciler: reconciler_handle.clone(),
        auth: PublishAuth::new(store.clone(), config.stream_path_prefix.clone()),
        store: store.clone(),
    });

    let bind_addr = format!("{}:{}", config.host, config.port);
    info!(%bind_addr, media_api = %config.media_api_url, "starting stream-state-service");

    HttpServer::new(move || {
        App::new()
            .app_data(state.clone())
            .wrap(Logger::default())
            .route("/health", web::get().to(handlers::health))
            .route("/metrics", web::get().to(metrics::serve_metrics))
            .route("/auth/publish", web::post().to(handlers::auth_publish))
            .route("/streams/live", web::get().to(handlers::list_live_streams))
            .service(
                web::scope("/webhooks")
                    .route("/stream/start", web::post().to(handlers::stream_start))
                    .route("/stream/stop", web::post().to(handlers::stream_stop))
                    .route("/viewer/join", web::post().to(handlers::viewer_join))
                    .route("/viewer/leave", web::post().to(handlers::viewer_leave)),
            )
    })
    .bind(&bind_addr)
    .with_context(|| format!("failed to bind on {bind_addr}"))?
    .shutdown_timeout(config.shutdown_grace.as_secs())
    .run()
    .await
    .context("HTTP server error")?;

    // Intake is closed. Stop the poll timer, then let the actor drain its
    // queue within the grace period.
    let _ = shutdown_tx.send(());
    if let Err(err) = monitor_task.await {
        warn!(error = %err, "snapshot monitor ended abnormally");
    }
    drop(reconciler_handle);

    if tokio::time::timeout(config.shutdown_grace, actor_task)
        .await
        .is_err()
    {
        warn!("reconciler actor did not drain within the grace period");
    }

    info!("stream-state-service stopped");
    Ok(())
}
