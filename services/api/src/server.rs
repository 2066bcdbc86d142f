use crate::cli::ServeArgs;
use crate::infra::{build_catalog, build_generator, AppState, InMemorySessionStore};
use crate::routes::with_simulation_routes;
use axum::Extension;
use axum_prometheus::PrometheusMetricLayer;
use courtcraft::config::AppConfig;
use courtcraft::error::AppError;
use courtcraft::simulation::{Adjudicator, SimulationEngine};
use courtcraft::telemetry;
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
    if let Some(dir) = args.scenario_dir.take() {
        config.simulation.scenario_dir = Some(dir);
    }

    telemetry::init(&config.telemetry)?;

    let (prometheus_layer, prometheus_handle) = PrometheusMetricLayer::pair();
    let readiness_flag = Arc::new(std::sync::atomic::AtomicBool::new(false));
    let app_state = AppState {
        readiness: readiness_flag.clone(),
        metrics: Arc::new(prometheus_handle),
    };

    let catalog = Arc::new(build_catalog(&config.simulation));
    let scenarios = catalog.list()?;
    info!(count = scenarios.len(), "scenario catalog validated");

    let adjudicator_config = config.adjudication.adjudicator_config();
    info!(
        model = %adjudicator_config.model,
        worst_case_turn = ?adjudicator_config.worst_case_duration(),
        "adjudication policy configured"
    );
    let adjudicator = Adjudicator::new(build_generator(&config.adjudication), adjudicator_config);
    let engine = Arc::new(SimulationEngine::new(
        Arc::new(InMemorySessionStore::default()),
        catalog,
        adjudicator,
        config.simulation.engine_config(),
    ));

    let app = with_simulation_routes(engine)
        .layer(Extension(app_state))
        .layer(prometheus_layer);

    let addr = config.server.socket_addr()?;
    let listener = tokio::net::TcpListener::bind(addr).await?;
    readiness_flag.store(true, Ordering::Release);

    info!(
        ?config.environment,
        %addr,
        model = %config.adjudication.model,
        "courtroom simulation service ready"
    );

    axum::serve(listener, app).await?;
    Ok(())
}
