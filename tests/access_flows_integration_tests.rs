use actix_web::dev::ServerHandle;
use actix_web::{web, App, HttpServer};
use chrono::{Duration, Utc};
use simbld_access::client::{AccessService, HttpAccessService};
use simbld_access::emergency::{EmergencyAccessController, EmergencyAccessRequest, EmergencyStep};
use simbld_access::mfa::{MfaController, MfaStep};
use simbld_access::mocks::{configure_routes, MockIdentityState, MockSettings};
use simbld_access::types::{AccessClientConfig, Endpoints, FlowError, NoticeLevel};
use std::sync::Arc;

const JUSTIFICATION: &str = "Patient arrived unconscious in the emergency department";

struct MockServer {
    base_url: String,
    state: web::Data<MockIdentityState>,
    handle: ServerHandle,
}

async fn start_mock_server(settings: MockSettings) -> MockServer {
    let state = web::Data::new(MockIdentityState::new(settings));
    let app_state = state.clone();
    let endpoints = Endpoints::default();

    let server = HttpServer::new(move || {
        let endpoints = endpoints.clone();
        App::new()
            .app_data(app_state.clone())
            .configure(move |cfg| configure_routes(cfg, &endpoints))
    })
    .workers(1)
    .bind(("127.0.0.1", 0))
    .unwrap();

    let address = server.addrs()[0];
    let server = server.run();
    let handle = server.handle();
    actix_web::rt::spawn(server);

    MockServer {
        base_url: format!("http://{address}"),
        state,
        handle,
    }
}

fn http_service(base_url: &str) -> Arc<dyn AccessService> {
    let mut config = AccessClientConfig::default();
    config.base_url = base_url.to_string();
    config.request_timeout_secs = 5;
    config.retry.initial_interval_ms = 10;
    Arc::new(HttpAccessService::new(&config).unwrap())
}

#[actix_web::test]
async fn test_integration_mfa_enrollment() {
    let server = start_mock_server(MockSettings::default()).await;
    let mfa = MfaController::new(http_service(&server.base_url));

    let status = mfa.load_status().await.unwrap();
    assert!(!status.enabled);

    mfa.begin_setup().await.unwrap();
    let session = mfa.snapshot().session.unwrap();
    assert!(session.qr_code_url.starts_with("otpauth://totp/"));
    assert_eq!(session.backup_codes.len(), 8);
    assert_eq!(mfa.step(), MfaStep::Qr);

    mfa.proceed_to_verify().unwrap();

    // Wrong code: structured refusal, still on the verify step
    assert_eq!(mfa.verify_code("000000").await, Err(FlowError::VerificationFailed));
    assert_eq!(mfa.step(), MfaStep::Verify);
    assert!(!server.state.mfa_enabled());

    mfa.verify_code("123456").await.unwrap();
    assert_eq!(mfa.step(), MfaStep::Backup);
    assert_eq!(mfa.backup_codes(), session.backup_codes);
    assert!(server.state.mfa_enabled());

    let export = mfa.export_backup_codes().unwrap();
    assert!(session.backup_codes.iter().all(|c| export.contents.contains(c.as_str())));

    mfa.close();
    let status = mfa.load_status().await.unwrap();
    assert!(status.enabled);
    assert_eq!(status.backup_codes_remaining, 8);

    server.handle.stop(true).await;
}

#[actix_web::test]
async fn test_integration_regenerate_then_disable() {
    let server = start_mock_server(MockSettings::default()).await;
    let mfa = MfaController::new(http_service(&server.base_url));

    mfa.begin_setup().await.unwrap();
    mfa.proceed_to_verify().unwrap();
    mfa.verify_code("123456").await.unwrap();
    let original = mfa.backup_codes();
    mfa.close();

    // A backup code is accepted as confirmation, and the whole set is replaced
    mfa.load_status().await.unwrap();
    mfa.open_regenerate().unwrap();
    let regenerated = mfa.regenerate_backup_codes(&original[0]).await.unwrap();
    assert_eq!(mfa.step(), MfaStep::BackupDisplay);
    assert_eq!(regenerated.len(), original.len());
    assert!(regenerated.iter().all(|c| !original.contains(c)));
    mfa.close();

    mfa.open_disable().unwrap();
    assert_eq!(mfa.disable(&original[1]).await, Err(FlowError::VerificationFailed));
    assert_eq!(mfa.step(), MfaStep::DisableConfirm);

    mfa.disable("123456").await.unwrap();
    assert_eq!(mfa.step(), MfaStep::Idle);
    assert!(!mfa.load_status().await.unwrap().enabled);

    // Nothing left to disable
    assert!(matches!(mfa.open_disable(), Err(FlowError::Validation(_))));

    server.handle.stop(true).await;
}

#[actix_web::test]
async fn test_integration_setup_refused_locally_when_enabled() {
    let server = start_mock_server(MockSettings::default()).await;
    let mfa = MfaController::new(http_service(&server.base_url));

    mfa.begin_setup().await.unwrap();
    mfa.proceed_to_verify().unwrap();
    mfa.verify_code("123456").await.unwrap();
    mfa.close();
    assert_eq!(server.state.setup_requests(), 1);

    assert!(mfa.load_status().await.unwrap().enabled);
    let err = mfa.begin_setup().await.unwrap_err();
    assert!(matches!(err, FlowError::Validation(_)));
    assert_eq!(mfa.step(), MfaStep::Idle);
    assert_eq!(server.state.setup_requests(), 1);

    let notice = mfa.notice().unwrap();
    assert_eq!(notice.level, NoticeLevel::Error);
    assert!(!notice.retryable);

    server.handle.stop(true).await;
}

#[actix_web::test]
async fn test_integration_emergency_access_granted() {
    let server = start_mock_server(MockSettings::default()).await;
    let emergency = EmergencyAccessController::new(http_service(&server.base_url), 42);

    let reasons = emergency.load_reasons().await.unwrap();
    assert!(reasons.iter().any(|r| r.value == "unconscious"));

    assert!(emergency.proceed().is_err());
    emergency.acknowledge().unwrap();
    emergency.proceed().unwrap();
    assert_eq!(emergency.step(), EmergencyStep::Form);

    emergency
        .submit_request(EmergencyAccessRequest {
            patient_id: 42,
            reason: "unconscious".to_string(),
            justification: JUSTIFICATION.to_string(),
        })
        .await
        .unwrap();

    assert_eq!(emergency.step(), EmergencyStep::Success);
    let now = Utc::now();
    let grant = emergency.grant().unwrap();
    assert!(grant.access_token.starts_with("eat_"));
    assert!(grant.remaining_at(now) > Duration::minutes(55));
    assert!(emergency.has_active_grant(now));
    assert_eq!(server.state.grants_issued(), 1);

    emergency.close();
    assert_eq!(emergency.step(), EmergencyStep::Warning);
    assert!(emergency.grant().is_none());

    server.handle.stop(true).await;
}

#[actix_web::test]
async fn test_integration_emergency_access_denied_verbatim() {
    let settings = MockSettings {
        restricted_patients: vec![7],
        ..MockSettings::default()
    };
    let server = start_mock_server(settings).await;
    let emergency = EmergencyAccessController::new(http_service(&server.base_url), 7);

    emergency.load_reasons().await.unwrap();
    emergency.acknowledge().unwrap();
    emergency.proceed().unwrap();
    emergency.select_reason("life-threatening").unwrap();
    emergency.set_justification(JUSTIFICATION).unwrap();
    assert!(emergency.can_submit());

    // 403 with a structured body: the server's message reaches the user unchanged
    assert_eq!(
        emergency.submit().await,
        Err(FlowError::Denied("insufficient privilege".to_string()))
    );
    assert_eq!(emergency.step(), EmergencyStep::Form);
    assert!(!emergency.notice().unwrap().retryable);
    assert_eq!(server.state.grants_issued(), 0);

    // Unknown reasons never leave the client
    emergency.select_reason("curiosity").unwrap();
    assert!(matches!(emergency.submit().await, Err(FlowError::Validation(_))));

    server.handle.stop(true).await;
}

#[actix_web::test]
async fn test_integration_unreachable_service() {
    let server = start_mock_server(MockSettings::default()).await;
    let base_url = server.base_url.clone();
    server.handle.stop(true).await;

    let emergency = EmergencyAccessController::new(http_service(&base_url), 42);
    let err = emergency.load_reasons().await.unwrap_err();

    assert!(matches!(err, FlowError::Transport { .. }));
    assert!(emergency.notice().unwrap().retryable);
}
