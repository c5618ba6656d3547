use crate::infra::build_service;
use chrono::Utc;
use clap::Args;
use std::fmt::Display;
use std::sync::Arc;
use std::time::Duration;
use tracing::warn;
use uuid::Uuid;
use vendor_intake::config::AppConfig;
use vendor_intake::error::AppError;
use vendor_intake::workflows::vendor::applications::{
    ApplicationDraft, ApplicationServiceError, BusinessType, DocumentType, DocumentUpload,
    InMemoryDocumentStore, LogNotifier, MemoryApplicationRepository, NotificationDispatcher,
    StaticTokenTable, UserId, UserProfile, UserRole, VendorApplicationService,
};

const ROSA: UserId = UserId(Uuid::from_u128(0x0000_0000_0000_0000_0000_0000_0000_0c01));
const JORGE: UserId = UserId(Uuid::from_u128(0x0000_0000_0000_0000_0000_0000_0000_0c02));
const ADMIN: UserId = UserId(Uuid::from_u128(0x0000_0000_0000_0000_0000_0000_0000_0a01));

#[derive(Args, Debug, Default)]
pub(crate) struct DemoArgs {
    /// Commission rate granted on approval (defaults to the configured rate)
    #[arg(long)]
    pub(crate) commission_rate: Option<f64>,
    /// Print every queued notification at the end of the walkthrough
    #[arg(long)]
    pub(crate) show_notifications: bool,
}

pub(crate) fn demo_accounts() -> Vec<UserProfile> {
    let account = |id: UserId, name: &str, email: &str, role: UserRole| UserProfile {
        id,
        full_name: name.to_string(),
        email: email.to_string(),
        phone: None,
        role,
        is_active: true,
        is_verified: false,
        created_at: Utc::now(),
    };
    vec![
        account(ROSA, "Rosa Mamani", "rosa@example.org", UserRole::Client),
        account(JORGE, "Jorge Quispe", "jorge@example.org", UserRole::Client),
        account(ADMIN, "Review Desk", "review@example.org", UserRole::Admin),
    ]
}

/// Seeds the demo accounts and bearer tokens into an empty in-memory deployment.
pub(crate) fn seed_demo_accounts(
    repository: &MemoryApplicationRepository,
    tokens: &mut StaticTokenTable,
) {
    for account in demo_accounts() {
        repository.upsert_user(account);
    }
    tokens.insert("demo-rosa", ROSA);
    tokens.insert("demo-jorge", JORGE);
    tokens.insert("demo-admin", ADMIN);
    warn!(
        tokens = "demo-rosa, demo-jorge, demo-admin",
        "API_TOKENS not set; seeded demo accounts for the in-memory backend"
    );
}

fn rosa_draft() -> ApplicationDraft {
    ApplicationDraft {
        business_name: "Diablada Tours".to_string(),
        business_type: BusinessType::TravelAgency,
        tax_id: Some("1020304050".to_string()),
        business_address: Some("Av. 6 de Agosto 123, Oruro".to_string()),
        business_phone: Some("+591 2 5250000".to_string()),
        business_email: Some("ventas@diablada.bo".to_string()),
        years_of_experience: Some(8),
        description: Some("Carnival packages and guided city tours.".to_string()),
        motivation: "We have sold carnival packages for a decade and want to offer official tickets to our travellers."
            .to_string(),
        expected_sales_volume: Some(150),
    }
}

fn jorge_draft() -> ApplicationDraft {
    ApplicationDraft {
        business_name: "Hostal Sajama".to_string(),
        business_type: BusinessType::Hotel,
        tax_id: None,
        business_address: None,
        business_phone: None,
        business_email: None,
        years_of_experience: None,
        description: None,
        motivation: "Guests ask for parade tickets at check-in every year and we would like to sell them directly."
            .to_string(),
        expected_sales_volume: None,
    }
}

fn scan(filename: &str) -> DocumentUpload {
    DocumentUpload {
        filename: filename.to_string(),
        content_type: Some("application/pdf".to_string()),
        bytes: format!("%PDF-1.4 demo scan of {filename}").into_bytes(),
    }
}

struct Narrator {
    enabled: bool,
}

impl Narrator {
    fn say(&self, line: impl Display) {
        if self.enabled {
            println!("{line}");
        }
    }
}

/// Runs the scripted intake flow against an in-memory service. Also used to give `report`
/// something to show when no database is configured.
pub(crate) async fn walkthrough(
    service: &VendorApplicationService<MemoryApplicationRepository>,
    narrate: bool,
) -> Result<(), AppError> {
    run_script(service, Narrator { enabled: narrate }, None).await
}

async fn run_script(
    service: &VendorApplicationService<MemoryApplicationRepository>,
    narrator: Narrator,
    commission_rate: Option<f64>,
) -> Result<(), AppError> {
    for account in demo_accounts() {
        service.repository().upsert_user(account);
    }

    let rosa_application = service.create_application(ROSA, rosa_draft()).await?;
    narrator.say(format!(
        "- Rosa applied for {} -> {} ({})",
        rosa_application.business.business_name,
        rosa_application.status.label(),
        rosa_application.id
    ));

    match service.create_application(ROSA, rosa_draft()).await {
        Err(ApplicationServiceError::Conflict(reason)) => {
            narrator.say(format!("  Second application refused: {reason}"))
        }
        Ok(duplicate) => narrator.say(format!(
            "  Unexpected second application accepted ({})",
            duplicate.id
        )),
        Err(other) => return Err(other.into()),
    }

    for (document_type, filename) in [
        (DocumentType::IdCard, "cedula.pdf"),
        (DocumentType::TaxRegistration, "nit.pdf"),
        (DocumentType::IdCard, "cedula-legible.pdf"),
    ] {
        let document = service
            .upload_document(rosa_application.id, document_type, scan(filename), ROSA)
            .await?;
        narrator.say(format!(
            "  Uploaded {filename} as {} ({} bytes)",
            document_type.label(),
            document.file_size
        ));
    }
    let on_file = service
        .get_user_application(&ROSA)
        .await?
        .map(|application| application.documents.len())
        .unwrap_or_default();
    narrator.say(format!(
        "  Documents on file: {on_file} (the second id_card upload replaced the first)"
    ));

    let jorge_application = service.create_application(JORGE, jorge_draft()).await?;
    narrator.say(format!(
        "- Jorge applied for {} -> {}",
        jorge_application.business.business_name,
        jorge_application.status.label()
    ));

    let queue = service.review_queue().await?;
    narrator.say("- Review queue (oldest first):");
    for entry in &queue {
        narrator.say(format!(
            "  - {} by {} ({} document(s))",
            entry.application.business.business_name, entry.applicant_name, entry.documents_count
        ));
    }

    let receipt = service
        .approve_application(
            rosa_application.id,
            ADMIN,
            commission_rate,
            Some("Documents verified during the demo".to_string()),
        )
        .await?;
    narrator.say(format!(
        "- Approved {}: role {} -> {}, commission {:.2}%",
        receipt.application.business.business_name,
        receipt.role_change.previous_role.label(),
        receipt.role_change.new_role.label(),
        receipt.settings.commission_rate
    ));

    match service
        .reject_application(jorge_application.id, ADMIN, "missing")
        .await
    {
        Err(ApplicationServiceError::Validation(violation)) => {
            narrator.say(format!("  Rejection with a short reason refused: {violation}"))
        }
        Ok(_) => narrator.say("  Unexpected rejection with a short reason"),
        Err(other) => return Err(other.into()),
    }
    let rejected = service
        .reject_application(
            jorge_application.id,
            ADMIN,
            "Operating license and tax registration are missing",
        )
        .await?;
    narrator.say(format!(
        "- Rejected {}: {}",
        rejected.business.business_name,
        rejected.rejection_reason.unwrap_or_default()
    ));

    let stats = service.stats().await?;
    narrator.say(format!(
        "- Stats: {} total | {} approved | {} rejected | approval rate {:.2}%",
        stats.total, stats.approved, stats.rejected, stats.approval_rate
    ));
    Ok(())
}

pub(crate) async fn run_demo(args: DemoArgs) -> Result<(), AppError> {
    let config = AppConfig::load()?;
    let repository = Arc::new(MemoryApplicationRepository::default());
    let store = Arc::new(InMemoryDocumentStore::default());
    let dispatcher = NotificationDispatcher::new(Arc::new(LogNotifier), Duration::from_secs(1));
    let service = build_service(&config, repository.clone(), store.clone(), dispatcher);

    println!("Vendor intake demo");
    run_script(&service, Narrator { enabled: true }, args.commission_rate).await?;
    println!("- Blobs stored: {}", store.paths().len());

    let notifications = repository.notifications();
    let delivered = notifications
        .iter()
        .filter(|intent| intent.delivered_at.is_some())
        .count();
    println!(
        "- Notifications: {} queued, {} delivered",
        notifications.len(),
        delivered
    );
    if args.show_notifications {
        for intent in &notifications {
            let message = intent.notice.render();
            println!("  - to {}: {}", intent.recipient, message.subject);
        }
    }
    Ok(())
}
