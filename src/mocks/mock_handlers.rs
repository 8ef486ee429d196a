//! Mock access/identity service handlers for development and integration tests.
//!
//! Keeps one in-memory account: MFA enrollment, backup codes and emergency grants.
//! Codes are checked against a configured value instead of a real TOTP computation.

use crate::emergency::dto::{
    EmergencyAccessGrant, EmergencyAccessRequest, EmergencyAccessResponse, EmergencyReason,
};
use crate::emergency::MIN_JUSTIFICATION_LENGTH;
use crate::flow::lock;
use crate::mfa::dto::{
    BackupCodesResponse, MfaCodeRequest, MfaConfirmation, MfaSetupPayload, MfaStatus,
};
use crate::types::Endpoints;
use actix_web::{web, HttpResponse};
use chrono::{Duration, Utc};
use rand::distributions::Alphanumeric;
use rand::Rng;
use serde_json::json;
use std::sync::Mutex;
use uuid::Uuid;

const BASE32_ALPHABET: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZ234567";
const CODE_ALPHABET: &[u8] = b"ABCDEFGHJKLMNPQRSTUVWXYZ23456789";
const SECRET_LENGTH: usize = 32;
const ISSUER: &str = "Simbld";

#[derive(Debug, Clone)]
pub struct MockSettings {
    /// Code accepted wherever an authenticator code is expected
    pub accepted_code: String,
    pub account_name: String,
    /// Patients for which emergency access is refused
    pub restricted_patients: Vec<i64>,
    pub grant_lifetime_minutes: i64,
    pub backup_code_count: usize,
}

impl Default for MockSettings {
    fn default() -> Self {
        Self {
            accepted_code: "123456".to_string(),
            account_name: "clinician@example.com".to_string(),
            restricted_patients: Vec::new(),
            grant_lifetime_minutes: 60,
            backup_code_count: 8,
        }
    }
}

#[derive(Debug, Default)]
struct MockAccount {
    enabled: bool,
    pending_secret: Option<String>,
    pending_codes: Vec<String>,
    backup_codes: Vec<String>,
    grants: Vec<EmergencyAccessGrant>,
    setup_requests: usize,
}

impl MockAccount {
    /// Accept the configured code, or consume an unused backup code
    fn check_code(&mut self, code: &str, accepted: &str) -> bool {
        if code == accepted {
            return true;
        }
        match self.backup_codes.iter().position(|c| c == code) {
            Some(index) => {
                self.backup_codes.remove(index);
                true
            },
            None => false,
        }
    }
}

pub struct MockIdentityState {
    settings: MockSettings,
    account: Mutex<MockAccount>,
}

impl MockIdentityState {
    pub fn new(settings: MockSettings) -> Self {
        Self {
            settings,
            account: Mutex::new(MockAccount::default()),
        }
    }

    pub fn grants_issued(&self) -> usize {
        lock(&self.account).grants.len()
    }

    pub fn setup_requests(&self) -> usize {
        lock(&self.account).setup_requests
    }

    pub fn mfa_enabled(&self) -> bool {
        lock(&self.account).enabled
    }
}

/// Register every mock route under the configured endpoint paths
pub fn configure_routes(cfg: &mut web::ServiceConfig, endpoints: &Endpoints) {
    cfg.route("/health", web::get().to(health_check))
        .route(&endpoints.mfa_status, web::get().to(mock_mfa_status))
        .route(&endpoints.mfa_setup_begin, web::post().to(mock_begin_setup))
        .route(&endpoints.mfa_verify_setup, web::post().to(mock_verify_setup))
        .route(&endpoints.mfa_disable, web::post().to(mock_disable))
        .route(&endpoints.mfa_regenerate_backup_codes, web::post().to(mock_regenerate))
        .route(&endpoints.emergency_reasons, web::get().to(mock_emergency_reasons))
        .route(&endpoints.emergency_request, web::post().to(mock_emergency_request));
}

pub fn emergency_reasons() -> Vec<EmergencyReason> {
    vec![
        EmergencyReason {
            value: "life-threatening".to_string(),
            label: "Life-threatening emergency".to_string(),
            description: "Immediate risk to the patient's life".to_string(),
        },
        EmergencyReason {
            value: "unconscious".to_string(),
            label: "Patient unconscious".to_string(),
            description: "Patient cannot give consent and no proxy is available".to_string(),
        },
        EmergencyReason {
            value: "urgent-treatment".to_string(),
            label: "Urgent treatment decision".to_string(),
            description: "Treatment cannot wait for normal authorization".to_string(),
        },
    ]
}

fn random_secret() -> String {
    let mut rng = rand::thread_rng();
    (0..SECRET_LENGTH)
        .map(|_| BASE32_ALPHABET[rng.gen_range(0..BASE32_ALPHABET.len())] as char)
        .collect()
}

/// Backup codes formatted as XXXX-XXXX
fn random_backup_codes(count: usize) -> Vec<String> {
    let mut rng = rand::thread_rng();
    (0..count)
        .map(|_| {
            (0..2)
                .map(|_| {
                    (0..4)
                        .map(|_| CODE_ALPHABET[rng.gen_range(0..CODE_ALPHABET.len())] as char)
                        .collect::<String>()
                })
                .collect::<Vec<_>>()
                .join("-")
        })
        .collect()
}

fn random_token() -> String {
    let token: String =
        rand::thread_rng().sample_iter(&Alphanumeric).take(40).map(char::from).collect();
    format!("eat_{token}")
}

fn rejected(error: &str) -> HttpResponse {
    HttpResponse::BadRequest().json(MfaConfirmation {
        success: false,
        error: Some(error.to_string()),
    })
}

async fn health_check() -> HttpResponse {
    HttpResponse::Ok().json(json!({
        "status": "healthy",
        "service": "Access Mock Server",
        "timestamp": Utc::now().to_rfc3339()
    }))
}

async fn mock_mfa_status(state: web::Data<MockIdentityState>) -> HttpResponse {
    let account = lock(&state.account);
    HttpResponse::Ok().json(MfaStatus {
        enabled: account.enabled,
        backup_codes_remaining: u32::try_from(account.backup_codes.len()).unwrap_or(u32::MAX),
        method: "totp".to_string(),
    })
}

async fn mock_begin_setup(state: web::Data<MockIdentityState>) -> HttpResponse {
    let mut account = lock(&state.account);
    account.setup_requests += 1;
    if account.enabled {
        return HttpResponse::Conflict().json(json!({
            "message": "Two-factor authentication is already enabled"
        }));
    }

    let secret = random_secret();
    let backup_codes = random_backup_codes(state.settings.backup_code_count);
    let qr_code_url = format!(
        "otpauth://totp/{ISSUER}:{}?secret={secret}&issuer={ISSUER}&digits=6&period=30",
        state.settings.account_name
    );

    account.pending_secret = Some(secret.clone());
    account.pending_codes = backup_codes.clone();
    log::info!("Mock MFA setup started");

    HttpResponse::Ok().json(MfaSetupPayload {
        secret,
        qr_code_url,
        backup_codes,
    })
}

async fn mock_verify_setup(
    state: web::Data<MockIdentityState>,
    payload: web::Json<MfaCodeRequest>,
) -> HttpResponse {
    let mut account = lock(&state.account);
    if account.pending_secret.is_none() {
        return rejected("No setup in progress");
    }
    if payload.code != state.settings.accepted_code {
        return rejected("Invalid code");
    }

    account.enabled = true;
    account.pending_secret = None;
    account.backup_codes = std::mem::take(&mut account.pending_codes);
    log::info!("Mock MFA enabled");

    HttpResponse::Ok().json(MfaConfirmation {
        success: true,
        error: None,
    })
}

async fn mock_disable(
    state: web::Data<MockIdentityState>,
    payload: web::Json<MfaCodeRequest>,
) -> HttpResponse {
    let mut account = lock(&state.account);
    if !account.enabled {
        return rejected("Two-factor authentication is not enabled");
    }
    if !account.check_code(&payload.code, &state.settings.accepted_code) {
        return rejected("Invalid code");
    }

    account.enabled = false;
    account.backup_codes.clear();
    log::info!("Mock MFA disabled");

    HttpResponse::Ok().json(MfaConfirmation {
        success: true,
        error: None,
    })
}

async fn mock_regenerate(
    state: web::Data<MockIdentityState>,
    payload: web::Json<MfaCodeRequest>,
) -> HttpResponse {
    let mut account = lock(&state.account);
    if !account.enabled || !account.check_code(&payload.code, &state.settings.accepted_code) {
        return HttpResponse::BadRequest().json(BackupCodesResponse {
            success: false,
            backup_codes: Vec::new(),
        });
    }

    // The previous set is replaced wholesale
    account.backup_codes = random_backup_codes(state.settings.backup_code_count);
    log::info!("Mock backup codes regenerated");

    HttpResponse::Ok().json(BackupCodesResponse {
        success: true,
        backup_codes: account.backup_codes.clone(),
    })
}

async fn mock_emergency_reasons() -> HttpResponse {
    HttpResponse::Ok().json(emergency_reasons())
}

async fn mock_emergency_request(
    state: web::Data<MockIdentityState>,
    payload: web::Json<EmergencyAccessRequest>,
) -> HttpResponse {
    let request = payload.into_inner();

    let denial = if !emergency_reasons().iter().any(|r| r.value == request.reason) {
        Some((HttpResponse::BadRequest(), "Unknown emergency access reason"))
    } else if request.justification.chars().count() < MIN_JUSTIFICATION_LENGTH {
        Some((HttpResponse::BadRequest(), "Justification is too short"))
    } else if state.settings.restricted_patients.contains(&request.patient_id) {
        Some((HttpResponse::Forbidden(), "insufficient privilege"))
    } else {
        None
    };

    if let Some((mut builder, error)) = denial {
        log::info!("Mock emergency access denied for patient {}: {error}", request.patient_id);
        return builder.json(EmergencyAccessResponse {
            success: false,
            grant: None,
            error: Some(error.to_string()),
        });
    }

    let grant = EmergencyAccessGrant {
        id: Uuid::new_v4().to_string(),
        expires_at: Utc::now() + Duration::minutes(state.settings.grant_lifetime_minutes),
        access_token: random_token(),
    };
    lock(&state.account).grants.push(grant.clone());
    log::info!("Mock emergency access grant {} for patient {}", grant.id, request.patient_id);

    HttpResponse::Ok().json(EmergencyAccessResponse {
        success: true,
        grant: Some(grant),
        error: None,
    })
}
