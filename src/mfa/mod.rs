//! Multi-Factor Authentication workflow.
//!
//! Client side of TOTP enrollment and maintenance:
//! - enrollment (secret + QR display, code verification, backup code issuance)
//! - disabling MFA with a current code
//! - backup code regeneration and export

pub mod backup_codes;
pub mod controller;
pub mod dto;
pub mod totp;

pub use backup_codes::BackupCodeExport;
pub use controller::{MfaController, MfaSetupSession, MfaSnapshot, MfaStep};
pub use dto::MfaStatus;
