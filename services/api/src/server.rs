use crate::cli::ServeArgs;
use crate::infra::{build_pipeline, AppState};
use crate::routes::with_expense_routes;
use axum::Extension;
use axum_prometheus::PrometheusMetricLayer;
use expense_ai::config::AppConfig;
use expense_ai::error::AppError;
use expense_ai::telemetry;
use expense_ai::workflows::expense::ReceiptRoot;
use std::sync::atomic::Ordering;
use std::sync::Arc;
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

    let pipeline = Arc::new(build_pipeline(&config, None)?);
    std::fs::create_dir_all(&config.pipeline.receipts_dir)?;
    let receipts = ReceiptRoot::new(&config.pipeline.receipts_dir)?;

    let app = with_expense_routes(pipeline, receipts)
        .layer(Extension(app_state))
        .layer(prometheus_layer);

    let addr = config.server.socket_addr()?;
    let listener = tokio::net::TcpListener::bind(addr).await?;
    readiness_flag.store(true, Ordering::Release);

    info!(
        ?config.environment,
        %addr,
        evaluator = ?config.pipeline.evaluator,
        output_dir = %config.pipeline.output_dir.display(),
        receipts_dir = %config.pipeline.receipts_dir.display(),
        "expense pipeline service ready"
    );

    axum::serve(listener, app).await?;
    Ok(())
}
