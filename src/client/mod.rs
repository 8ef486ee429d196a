//! Access/Identity service client.
//!
//! The controllers only talk to the service through the [`AccessService`] trait:
//! - [`HttpAccessService`] is the REST implementation used in production
//! - `crate::mocks::MockAccessService` scripts responses for tests

pub mod http;
pub mod retry;

pub use http::HttpAccessService;
pub use retry::RetryPolicy;

use crate::emergency::dto::{EmergencyAccessRequest, EmergencyAccessResponse, EmergencyReason};
use crate::mfa::dto::{BackupCodesResponse, MfaConfirmation, MfaSetupPayload, MfaStatus};
use crate::types::ServiceError;
use async_trait::async_trait;

/// Logical endpoints of the access/identity service
#[async_trait]
pub trait AccessService: Send + Sync {
    /// Current MFA status of the authenticated user
    async fn mfa_status(&self) -> Result<MfaStatus, ServiceError>;

    /// Start an enrollment: new secret, QR payload and backup codes
    async fn begin_mfa_setup(&self) -> Result<MfaSetupPayload, ServiceError>;

    /// Confirm an enrollment with the first authenticator code
    async fn verify_mfa_setup(&self, code: &str) -> Result<MfaConfirmation, ServiceError>;

    async fn disable_mfa(&self, code: &str) -> Result<MfaConfirmation, ServiceError>;

    /// Issue a new backup code set; the previous set stops working
    async fn regenerate_backup_codes(&self, code: &str)
        -> Result<BackupCodesResponse, ServiceError>;

    async fn emergency_reasons(&self) -> Result<Vec<EmergencyReason>, ServiceError>;

    async fn request_emergency_access(
        &self,
        request: &EmergencyAccessRequest,
    ) -> Result<EmergencyAccessResponse, ServiceError>;
}
