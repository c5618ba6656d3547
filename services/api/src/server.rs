use crate::cli::ServeArgs;
use crate::demo::seed_demo_accounts;
use crate::infra::{
    build_service, document_store, http_client, identity_table, notification_dispatcher,
    AppState, Backend, ServiceProbe,
};
use crate::routes::with_platform_routes;
use axum::http::{header, HeaderValue, Method};
use axum::Extension;
use axum_prometheus::PrometheusMetricLayer;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tower_http::cors::{AllowOrigin, CorsLayer};
use tracing::{info, warn};
use vendor_intake::config::AppConfig;
use vendor_intake::error::AppError;
use vendor_intake::telemetry;
use vendor_intake::workflows::vendor::applications::{
    vendor_router, ApplicationApi, ApplicationRepository, DocumentStore, NotificationDispatcher,
    NotificationOutbox, StaticTokenTable,
};

pub(crate) async fn run(mut args: ServeArgs) -> Result<(), AppError> {
    let mut config = AppConfig::load()?;

    if let Some(host) = args.host.take() {
        config.server.host = host;
    }
    if let Some(port) = args.port.take() {
        config.server.port = port;
    }

    telemetry::init(&config.telemetry)?;

    let client = http_client(&config)?;
    let store = document_store(&config, &client);
    let dispatcher = notification_dispatcher(&config, &client);
    let mut identity = identity_table(&config)?;

    match Backend::connect(&config).await? {
        Backend::Memory(repository) => {
            if identity.is_empty() && !config.environment.is_production() {
                seed_demo_accounts(&repository, &mut identity);
            }
            serve(config, repository, store, dispatcher, identity).await
        }
        Backend::Postgres(repository) => {
            serve(config, repository, store, dispatcher, identity).await
        }
    }
}

async fn serve<R>(
    config: AppConfig,
    repository: Arc<R>,
    store: Arc<dyn DocumentStore>,
    dispatcher: NotificationDispatcher,
    identity: StaticTokenTable,
) -> Result<(), AppError>
where
    R: ApplicationRepository + NotificationOutbox + 'static,
{
    let backend = repository.backend_name();
    let service = Arc::new(build_service(&config, repository, store, dispatcher));
    let relay_task = service.relay().clone().spawn(config.outbox.poll_interval);

    let (prometheus_layer, prometheus_handle) = PrometheusMetricLayer::pair();
    let readiness_flag = Arc::new(AtomicBool::new(false));
    let app_state = AppState {
        readiness: readiness_flag.clone(),
        metrics: Arc::new(prometheus_handle),
        probe: Arc::new(ServiceProbe::new(service.clone())),
    };

    if identity.is_empty() {
        warn!("API_TOKENS is empty; authenticated vendor routes will answer 401");
    } else {
        info!(tokens = identity.len(), "static identity table loaded");
    }
    let api = ApplicationApi::new(service, Arc::new(identity))
        .hide_internal_errors(config.environment.is_production());

    let app = with_platform_routes(vendor_router(api))
        .layer(Extension(app_state))
        .layer(prometheus_layer)
        .layer(cors_layer(&config));

    let addr = config.server.socket_addr()?;
    let listener = tokio::net::TcpListener::bind(addr).await?;
    readiness_flag.store(true, Ordering::Release);

    info!(?config.environment, %addr, backend, "vendor intake service ready");

    let served = axum::serve(listener, app).await;
    relay_task.abort();
    served?;
    Ok(())
}

fn cors_layer(config: &AppConfig) -> CorsLayer {
    let origins: Vec<HeaderValue> = config
        .allowed_origins()
        .iter()
        .filter_map(|origin| match HeaderValue::from_str(origin) {
            Ok(value) => Some(value),
            Err(_) => {
                warn!(%origin, "ignoring invalid CORS origin");
                None
            }
        })
        .collect();

    CorsLayer::new()
        .allow_origin(AllowOrigin::list(origins))
        .allow_methods([Method::GET, Method::POST, Method::PUT, Method::OPTIONS])
        .allow_headers([header::AUTHORIZATION, header::CONTENT_TYPE])
        .allow_credentials(true)
}
