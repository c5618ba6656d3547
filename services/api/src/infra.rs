use async_trait::async_trait;
use clap::Args;
use metrics_exporter_prometheus::PrometheusHandle;
use serde::Serialize;
use std::fs::File;
use std::path::PathBuf;
use std::sync::atomic::AtomicBool;
use std::sync::Arc;
use tracing::{info, warn};
use vendor_intake::config::AppConfig;
use vendor_intake::error::AppError;
use vendor_intake::telemetry;
use vendor_intake::workflows::vendor::applications::{
    write_listing_csv, ApplicationRepository, ApplicationStatus, ApplicationSummary,
    DocumentStore, HttpObjectStore, InMemoryDocumentStore, LogNotifier, MailApiNotifier,
    MemoryApplicationRepository, NotificationDispatcher, NotificationOutbox, Notifier,
    OutboxRelay, PgApplicationRepository, StaticTokenTable, VendorApplicationService,
};

const MAINTENANCE_BATCH: usize = 100;

#[derive(Clone)]
pub(crate) struct AppState {
    pub(crate) readiness: Arc<AtomicBool>,
    pub(crate) metrics: Arc<PrometheusHandle>,
    pub(crate) probe: Arc<dyn DependencyProbe>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub(crate) struct DependencyStatus {
    pub(crate) repository: bool,
    pub(crate) storage: bool,
}

impl DependencyStatus {
    pub(crate) fn healthy(self) -> bool {
        self.repository && self.storage
    }
}

/// Checks the backends the readiness endpoint depends on.
#[async_trait]
pub(crate) trait DependencyProbe: Send + Sync {
    async fn check(&self) -> DependencyStatus;
}

pub(crate) struct ServiceProbe<R> {
    service: Arc<VendorApplicationService<R>>,
}

impl<R> ServiceProbe<R> {
    pub(crate) fn new(service: Arc<VendorApplicationService<R>>) -> Self {
        Self { service }
    }
}

#[async_trait]
impl<R> DependencyProbe for ServiceProbe<R>
where
    R: ApplicationRepository + NotificationOutbox + 'static,
{
    async fn check(&self) -> DependencyStatus {
        let repository = match self.service.repository().health_check().await {
            Ok(()) => true,
            Err(err) => {
                warn!(error = %err, "repository health check failed");
                false
            }
        };
        let storage = self.service.store().bucket_exists().await;
        if !storage {
            warn!("document bucket is not reachable");
        }
        DependencyStatus {
            repository,
            storage,
        }
    }
}

/// Repository selected by `DATABASE_URL`.
pub(crate) enum Backend {
    Memory(Arc<MemoryApplicationRepository>),
    Postgres(Arc<PgApplicationRepository>),
}

impl Backend {
    pub(crate) async fn connect(config: &AppConfig) -> Result<Self, AppError> {
        match &config.database {
            Some(database) => {
                let repository = PgApplicationRepository::connect(database).await?;
                info!(
                    max_connections = database.max_connections,
                    "connected to postgres"
                );
                Ok(Self::Postgres(Arc::new(repository)))
            }
            None => {
                warn!("DATABASE_URL is not set; applications are kept in memory");
                Ok(Self::Memory(Arc::new(MemoryApplicationRepository::default())))
            }
        }
    }
}

pub(crate) fn http_client(config: &AppConfig) -> Result<reqwest::Client, AppError> {
    Ok(reqwest::Client::builder()
        .connect_timeout(config.storage.request_timeout)
        .build()?)
}

pub(crate) fn document_store(config: &AppConfig, client: &reqwest::Client) -> Arc<dyn DocumentStore> {
    match config.storage.remote() {
        Some((url, service_key)) => {
            info!(bucket = %config.storage.bucket, "using remote document storage");
            Arc::new(HttpObjectStore::new(
                client.clone(),
                url,
                service_key,
                config.storage.bucket.clone(),
            ))
        }
        None => {
            warn!("STORAGE_URL or STORAGE_SERVICE_KEY is not set; documents are kept in memory");
            Arc::new(InMemoryDocumentStore::default())
        }
    }
}

pub(crate) fn notification_dispatcher(
    config: &AppConfig,
    client: &reqwest::Client,
) -> NotificationDispatcher {
    let notifier: Arc<dyn Notifier> = match &config.mail.api_key {
        Some(api_key) => Arc::new(MailApiNotifier::new(
            client.clone(),
            config.mail.api_url.clone(),
            api_key.clone(),
            config.mail.from_address.clone(),
        )),
        None => {
            warn!("MAIL_API_KEY is not set; notifications are only logged");
            Arc::new(LogNotifier)
        }
    };
    NotificationDispatcher::new(notifier, config.mail.timeout)
}

pub(crate) fn identity_table(config: &AppConfig) -> Result<StaticTokenTable, AppError> {
    match &config.api_tokens {
        Some(raw) => Ok(raw.parse()?),
        None => Ok(StaticTokenTable::default()),
    }
}

pub(crate) fn build_service<R>(
    config: &AppConfig,
    repository: Arc<R>,
    store: Arc<dyn DocumentStore>,
    dispatcher: NotificationDispatcher,
) -> VendorApplicationService<R>
where
    R: ApplicationRepository + NotificationOutbox + 'static,
{
    let relay = OutboxRelay::new(
        Arc::clone(&repository),
        dispatcher,
        config.outbox.max_attempts,
    );
    VendorApplicationService::with_relay(repository, store, relay, config.intake())
}

pub(crate) fn parse_status(raw: &str) -> Result<ApplicationStatus, String> {
    raw.parse::<ApplicationStatus>()
        .map_err(|err| err.to_string())
}

#[derive(Args, Debug, Default)]
pub(crate) struct ReportArgs {
    /// Write the listing to this CSV file
    #[arg(long)]
    pub(crate) csv: Option<PathBuf>,
    /// Only list applications in this status (pending, under_review, approved, rejected)
    #[arg(long, value_parser = parse_status)]
    pub(crate) status: Option<ApplicationStatus>,
}

#[derive(Args, Debug)]
pub(crate) struct MaintainArgs {
    /// Maximum orphaned blobs and notifications handled in this run
    #[arg(long, default_value_t = MAINTENANCE_BATCH)]
    pub(crate) limit: usize,
}

pub(crate) async fn run_report(args: ReportArgs) -> Result<(), AppError> {
    let config = AppConfig::load()?;
    telemetry::init(&config.telemetry)?;
    let client = http_client(&config)?;
    let store = document_store(&config, &client);
    let dispatcher = notification_dispatcher(&config, &client);

    match Backend::connect(&config).await? {
        Backend::Memory(repository) => {
            let service = build_service(&config, repository, store, dispatcher);
            crate::demo::walkthrough(&service, false).await?;
            println!("(in-memory backend: reporting on the seeded demo dataset)\n");
            print_report(&service, args).await
        }
        Backend::Postgres(repository) => {
            let service = build_service(&config, repository, store, dispatcher);
            print_report(&service, args).await
        }
    }
}

async fn print_report<R>(
    service: &VendorApplicationService<R>,
    args: ReportArgs,
) -> Result<(), AppError>
where
    R: ApplicationRepository + NotificationOutbox + 'static,
{
    let stats = service.stats().await?;
    println!("Vendor applications");
    println!("===================");
    println!(
        "Total: {} | pending {} | under review {} | approved {} | rejected {}",
        stats.total, stats.pending, stats.under_review, stats.approved, stats.rejected
    );
    println!(
        "Approval rate: {:.2}% | submitted in the last 7 days: {}",
        stats.approval_rate, stats.recent_submissions
    );
    if !stats.by_business_type.is_empty() {
        println!("By business type:");
        for entry in &stats.by_business_type {
            println!("  - {:<14} {}", entry.business_type.label(), entry.count);
        }
    }

    let listing = match args.status {
        Some(status) => service.applications_by_status(status).await?,
        None => service.list_applications().await?,
    };
    println!();
    render_listing(&listing);

    if let Some(path) = args.csv {
        let file = File::create(&path)?;
        write_listing_csv(file, &listing)?;
        println!("\nListing exported to {}", path.display());
    }
    Ok(())
}

fn render_listing(listing: &[ApplicationSummary]) {
    if listing.is_empty() {
        println!("No applications match.");
        return;
    }
    println!("Applications ({}):", listing.len());
    for row in listing {
        let application = &row.application;
        println!(
            "  {} | {:<12} | {:<28} | {:<24} | {} document(s)",
            application.submitted_at.format("%Y-%m-%d %H:%M"),
            application.status.label(),
            application.business.business_name,
            row.applicant_email,
            row.documents_count
        );
    }
}

pub(crate) async fn run_maintenance(args: MaintainArgs) -> Result<(), AppError> {
    let config = AppConfig::load()?;
    telemetry::init(&config.telemetry)?;
    let client = http_client(&config)?;
    let store = document_store(&config, &client);
    let dispatcher = notification_dispatcher(&config, &client);

    match Backend::connect(&config).await? {
        Backend::Memory(_) => {
            println!("Nothing to maintain: the in-memory backend starts empty.");
            Ok(())
        }
        Backend::Postgres(repository) => {
            let service = build_service(&config, repository, store, dispatcher);
            let sweep = service.sweep_orphaned_blobs(args.limit).await?;
            let drain = service.relay().drain_once(args.limit).await?;
            println!(
                "Orphaned blobs: {} attempted, {} removed",
                sweep.attempted, sweep.removed
            );
            println!(
                "Notifications: {} delivered, {} failed",
                drain.delivered, drain.failed
            );
            Ok(())
        }
    }
}
