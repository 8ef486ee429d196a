//! Data Transfer Objects for Multi-Factor Authentication
//!
//! Request and response shapes exchanged with the access service MFA endpoints.

use serde::{Deserialize, Serialize};

/// MFA status of the authenticated user
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MfaStatus {
    pub enabled: bool,
    pub backup_codes_remaining: u32,
    #[serde(default)]
    pub method: String,
}

/// Response to a setup initialization request
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MfaSetupPayload {
    pub secret: String,
    pub qr_code_url: String,
    pub backup_codes: Vec<String>,
}

/// Body of every code-carrying MFA request
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MfaCodeRequest {
    pub code: String,
}

/// Response to setup verification and disable requests
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MfaConfirmation {
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Response to a backup code regeneration request
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BackupCodesResponse {
    pub success: bool,
    #[serde(default)]
    pub backup_codes: Vec<String>,
}
