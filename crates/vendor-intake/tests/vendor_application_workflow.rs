//! End-to-end scenarios for vendor intake through the public service facade and HTTP router,
//! backed by the in-memory repository and document store.

mod common {
    use std::sync::Arc;
    use std::time::Duration;

    use chrono::Utc;
    use uuid::Uuid;

    use vendor_intake::workflows::vendor::applications::{
        ApplicationDraft, BusinessType, DocumentUpload, InMemoryDocumentStore, IntakeConfig,
        LogNotifier, MemoryApplicationRepository, NotificationDispatcher, UploadPolicy, UserId,
        UserProfile, UserRole, VendorApplicationService,
    };

    pub(super) const MAX_UPLOAD_BYTES: u64 = 2048;

    pub(super) fn applicant() -> UserId {
        UserId(Uuid::from_u128(0x1001))
    }

    pub(super) fn reviewer() -> UserId {
        UserId(Uuid::from_u128(0x2001))
    }

    fn user(id: UserId, name: &str, email: &str, role: UserRole) -> UserProfile {
        UserProfile {
            id,
            full_name: name.to_string(),
            email: email.to_string(),
            phone: Some("+591 70000000".to_string()),
            role,
            is_active: true,
            is_verified: false,
            created_at: Utc::now(),
        }
    }

    pub(super) fn draft() -> ApplicationDraft {
        ApplicationDraft {
            business_name: "Morenada Central".to_string(),
            business_type: BusinessType::Restaurant,
            tax_id: None,
            business_address: Some("Calle Bolivar 45, Oruro".to_string()),
            business_phone: None,
            business_email: None,
            years_of_experience: Some(3),
            description: None,
            motivation: "Our restaurant sits on the parade route and visitors ask us for tickets every year."
                .to_string(),
            expected_sales_volume: None,
        }
    }

    pub(super) fn upload(filename: &str, size: usize) -> DocumentUpload {
        DocumentUpload {
            filename: filename.to_string(),
            content_type: None,
            bytes: vec![1; size],
        }
    }

    pub(super) struct Harness {
        pub(super) service: VendorApplicationService<MemoryApplicationRepository>,
        pub(super) repository: Arc<MemoryApplicationRepository>,
        pub(super) store: Arc<InMemoryDocumentStore>,
    }

    pub(super) fn harness() -> Harness {
        let repository = Arc::new(MemoryApplicationRepository::with_users([
            user(applicant(), "Lucia Condori", "lucia@example.org", UserRole::Client),
            user(reviewer(), "Review Desk", "review@example.org", UserRole::Admin),
        ]));
        let store = Arc::new(InMemoryDocumentStore::default());
        let config = IntakeConfig {
            upload_policy: UploadPolicy::new(MAX_UPLOAD_BYTES, ["pdf", "png"]),
            ..IntakeConfig::default()
        };
        let service = VendorApplicationService::new(
            repository.clone(),
            store.clone(),
            NotificationDispatcher::new(Arc::new(LogNotifier), Duration::from_secs(1)),
            config,
        );
        Harness {
            service,
            repository,
            store,
        }
    }
}

use std::sync::Arc;

use axum::body::Body;
use axum::http::{header, Request, StatusCode};
use tower::ServiceExt;
use vendor_intake::workflows::vendor::applications::{
    approval_rate, vendor_router, write_listing_csv, ApplicationApi, ApplicationRepository,
    ApplicationServiceError, ApplicationStatus, ApprovalStep, DocumentRejection, DocumentType,
    StaticTokenTable, UserRole, ValidationError,
};

use common::*;

#[tokio::test]
async fn a_second_application_while_one_is_active_conflicts() {
    let harness = harness();
    harness
        .service
        .create_application(applicant(), draft())
        .await
        .expect("first application");

    match harness
        .service
        .create_application(applicant(), draft())
        .await
    {
        Err(ApplicationServiceError::Conflict(_)) => {}
        other => panic!("expected conflict, got {other:?}"),
    }
    assert_eq!(
        harness
            .service
            .list_applications()
            .await
            .expect("listing")
            .len(),
        1
    );
}

#[tokio::test]
async fn approving_at_fifteen_percent_promotes_with_one_history_row() {
    let harness = harness();
    let application = harness
        .service
        .create_application(applicant(), draft())
        .await
        .expect("application");

    harness
        .service
        .approve_application(application.id, reviewer(), Some(15.0), None)
        .await
        .expect("approval");

    let settings = harness
        .repository
        .vendor_settings(&applicant())
        .await
        .expect("read")
        .expect("settings row");
    assert_eq!(settings.commission_rate, 15.0);
    let history = harness
        .repository
        .role_history(&applicant())
        .await
        .expect("read");
    assert_eq!(history.len(), 1);
    assert_eq!(history[0].new_role, UserRole::Vendor);
}

#[tokio::test]
async fn interrupted_approval_leaves_no_partial_promotion() {
    let harness = harness();
    let application = harness
        .service
        .create_application(applicant(), draft())
        .await
        .expect("application");

    harness
        .repository
        .fail_approval_at(Some(ApprovalStep::VendorSettings));
    assert!(harness
        .service
        .approve_application(application.id, reviewer(), None, None)
        .await
        .is_err());

    let owner = harness
        .repository
        .user_profile(&applicant())
        .await
        .expect("read")
        .expect("profile");
    assert_eq!(owner.role, UserRole::Client);
    let stored = harness
        .repository
        .application(&application.id)
        .await
        .expect("read")
        .expect("application");
    assert_eq!(stored.status, ApplicationStatus::Pending);
}

#[tokio::test]
async fn oversized_upload_writes_nothing() {
    let harness = harness();
    let application = harness
        .service
        .create_application(applicant(), draft())
        .await
        .expect("application");

    match harness
        .service
        .upload_document(
            application.id,
            DocumentType::OperatingLicense,
            upload("license.pdf", MAX_UPLOAD_BYTES as usize + 1),
            applicant(),
        )
        .await
    {
        Err(ApplicationServiceError::Validation(ValidationError::Document(
            DocumentRejection::TooLarge { .. },
        ))) => {}
        other => panic!("expected oversize rejection, got {other:?}"),
    }
    assert!(harness
        .repository
        .documents(&application.id)
        .await
        .expect("read")
        .is_empty());
    assert!(harness.store.paths().is_empty());
}

#[tokio::test]
async fn replacing_a_document_keeps_a_single_row_per_type() {
    let harness = harness();
    let application = harness
        .service
        .create_application(applicant(), draft())
        .await
        .expect("application");

    for name in ["nit.pdf", "nit-renewed.png"] {
        harness
            .service
            .upload_document(
                application.id,
                DocumentType::TaxRegistration,
                upload(name, 64),
                applicant(),
            )
            .await
            .expect("upload");
    }

    let documents = harness
        .repository
        .documents(&application.id)
        .await
        .expect("read");
    assert_eq!(documents.len(), 1);
    assert_eq!(documents[0].mime_type.as_deref(), Some("image/png"));
    assert_eq!(harness.store.paths(), vec![documents[0].storage_path.clone()]);
}

#[tokio::test]
async fn short_rejection_reason_is_a_validation_error() {
    let harness = harness();
    let application = harness
        .service
        .create_application(applicant(), draft())
        .await
        .expect("application");

    match harness
        .service
        .reject_application(application.id, reviewer(), "no docs")
        .await
    {
        Err(ApplicationServiceError::Validation(_)) => {}
        other => panic!("expected validation error, got {other:?}"),
    }
    let stored = harness
        .repository
        .application(&application.id)
        .await
        .expect("read")
        .expect("application");
    assert_eq!(stored.status, ApplicationStatus::Pending);
}

#[test]
fn approval_rate_is_a_rounded_percentage() {
    assert_eq!(approval_rate(0, 0), 0.0);
    assert_eq!(approval_rate(10, 3), 30.0);
    assert_eq!(approval_rate(3, 1), 33.33);
}

#[tokio::test]
async fn listing_exports_as_csv() {
    let harness = harness();
    harness
        .service
        .create_application(applicant(), draft())
        .await
        .expect("application");
    let listing = harness.service.list_applications().await.expect("listing");

    let mut buffer = Vec::new();
    write_listing_csv(&mut buffer, &listing).expect("csv export");
    let text = String::from_utf8(buffer).expect("utf8");
    let mut lines = text.lines();
    assert!(lines
        .next()
        .expect("header")
        .starts_with("application_id,submitted_at,status"));
    let row = lines.next().expect("data row");
    assert!(row.contains("Morenada Central"));
    assert!(row.contains("lucia@example.org"));
}

#[tokio::test]
async fn http_flow_from_application_to_vendor_profile() {
    let harness = harness();
    let mut tokens = StaticTokenTable::default();
    tokens.insert("lucia", applicant());
    tokens.insert("desk", reviewer());
    let router = vendor_router(ApplicationApi::new(
        Arc::new(harness.service.clone()),
        Arc::new(tokens),
    ));

    let response = router
        .clone()
        .oneshot(
            Request::post("/vendor/apply")
                .header(header::AUTHORIZATION, "Bearer lucia")
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(serde_json::to_vec(&draft()).expect("json")))
                .expect("request"),
        )
        .await
        .expect("route executes");
    assert_eq!(response.status(), StatusCode::CREATED);
    let body = axum::body::to_bytes(response.into_body(), 4096)
        .await
        .expect("body");
    let created: serde_json::Value = serde_json::from_slice(&body).expect("json");
    let application_id = created["application_id"].as_str().expect("id").to_string();

    let response = router
        .clone()
        .oneshot(
            Request::post(format!("/vendor/admin/approve/{application_id}"))
                .header(header::AUTHORIZATION, "Bearer desk")
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(r#"{"commission_rate": 12.5}"#))
                .expect("request"),
        )
        .await
        .expect("route executes");
    assert_eq!(response.status(), StatusCode::OK);

    let response = router
        .oneshot(
            Request::get("/vendor/profile")
                .header(header::AUTHORIZATION, "Bearer lucia")
                .body(Body::empty())
                .expect("request"),
        )
        .await
        .expect("route executes");
    assert_eq!(response.status(), StatusCode::OK);
}
