use crate::cli::ServeArgs;
use crate::infra::{
    seed_catalog, seed_directory, seed_principals, AppState, InMemorySubmissionStore,
    LoggingNotificationSink,
};
use crate::routes::with_workflow_routes;
use axum::Extension;
use axum_prometheus::PrometheusMetricLayer;
use eduflow::config::AppConfig;
use eduflow::error::AppError;
use eduflow::telemetry;
use eduflow::workflows::submissions::{ChangeFeed, SubmissionWorkflowService};
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

pub(crate) async fn run(mut args: ServeArgs) -> Result<(), AppError> {
    let mut config = AppConfig::load()?;

    if let Some(host) = args.host.take() {
        config.server.host = host;
    }
    if let Some(port) = args.port.take() {
        config.server.port = port;
    }

    telemetry::init(&config.telemetry)?;

    let (prometheus_layer, prometheus_handle) = PrometheusMetricLayer::pair();
    let readiness_flag = Arc::new(std::sync::atomic::AtomicBool::new(false));
    let app_state = AppState {
        readiness: readiness_flag.clone(),
        metrics: Arc::new(prometheus_handle),
    };

    let (change_tx, mut change_feed) = ChangeFeed::channel(
        64,
        Duration::from_millis(config.watch.reload_debounce_ms),
    );
    tokio::spawn(async move {
        while let Some(reload) = change_feed.next_reload().await {
            info!(scopes = ?reload.scopes, "submissions changed, reload advised");
        }
    });

    let store = Arc::new(InMemorySubmissionStore::default());
    let sink = Arc::new(LoggingNotificationSink::with_changes(change_tx));
    let service = Arc::new(SubmissionWorkflowService::new(
        store,
        sink,
        Arc::new(seed_catalog()),
        Arc::new(seed_directory()),
    ));
    let principals = Arc::new(seed_principals());

    let app = with_workflow_routes(service, principals)
        .layer(Extension(app_state))
        .layer(prometheus_layer);

    let addr = config.server.socket_addr()?;
    let listener = tokio::net::TcpListener::bind(addr).await?;
    readiness_flag.store(true, Ordering::Release);

    info!(?config.environment, %addr, "submission workflow service ready");

    axum::serve(listener, app).await?;
    Ok(())
}
