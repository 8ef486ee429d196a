//! MFA enrollment and maintenance workflow.
//!
//! Enrollment walks `Idle -> Qr -> Verify -> Backup`. Disabling MFA and regenerating backup
//! codes are separate sub-flows that start from `Idle`. Every step change is either a user
//! action or a server-confirmed response; nothing advances on a client-side guess.

use super::backup_codes::BackupCodeExport;
use super::dto::MfaStatus;
use super::totp::{manual_entry_key, validate_confirmation_code, validate_totp_code};
use crate::client::AccessService;
use crate::flow::{lock, InFlight};
use crate::types::{FlowError, Notice, RequestKind, ServiceError};
use chrono::Utc;
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MfaStep {
    /// No dialog open; whether MFA is on is told by the cached status.
    #[default]
    Idle,
    Qr,
    Verify,
    Backup,
    DisableConfirm,
    RegenerateConfirm,
    BackupDisplay,
}

impl fmt::Display for MfaStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            MfaStep::Idle => "idle",
            MfaStep::Qr => "qr",
            MfaStep::Verify => "verify",
            MfaStep::Backup => "backup",
            MfaStep::DisableConfirm => "disable-confirm",
            MfaStep::RegenerateConfirm => "regenerate-confirm",
            MfaStep::BackupDisplay => "backup-display",
        };
        f.write_str(name)
    }
}

/// Enrollment data held only while the setup dialog is open
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MfaSetupSession {
    pub secret: String,
    pub qr_code_url: String,
    pub backup_codes: Vec<String>,
}

impl MfaSetupSession {
    pub fn manual_entry_key(&self) -> String {
        manual_entry_key(&self.secret)
    }
}

/// Read-only view of the controller for rendering
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MfaSnapshot {
    pub step: MfaStep,
    pub session: Option<MfaSetupSession>,
    /// Backup codes currently on screen
    pub backup_codes: Vec<String>,
    pub status: Option<MfaStatus>,
    pub notice: Option<Notice>,
    pub pending: Vec<RequestKind>,
}

#[derive(Debug, Default)]
struct MfaState {
    step: MfaStep,
    session: Option<MfaSetupSession>,
    backup_codes: Vec<String>,
    status: Option<MfaStatus>,
    notice: Option<Notice>,
    dialog: InFlight,
    status_flight: InFlight,
}

impl MfaState {
    fn expect_step(&self, allowed: &[MfaStep], operation: &'static str) -> Result<(), FlowError> {
        if allowed.contains(&self.step) {
            Ok(())
        } else {
            Err(FlowError::InvalidStep {
                operation,
                step: self.step.to_string(),
            })
        }
    }

    fn enter(&mut self, step: MfaStep) {
        log::debug!("MFA step {} -> {}", self.step, step);
        self.step = step;
    }

    fn fail<T>(&mut self, err: FlowError) -> Result<T, FlowError> {
        if !matches!(err, FlowError::Busy(_) | FlowError::Discarded) {
            self.notice = Some(Notice::from(&err));
        }
        Err(err)
    }

    /// Refuse the sub-flows when MFA is known to be off
    fn require_enabled(&self) -> Result<(), FlowError> {
        match &self.status {
            Some(status) if !status.enabled => Err(FlowError::Validation(
                "Two-factor authentication is not enabled".to_string(),
            )),
            _ => Ok(()),
        }
    }

    /// Refuse a new enrollment when MFA is known to be on
    fn require_disabled(&self) -> Result<(), FlowError> {
        match &self.status {
            Some(status) if status.enabled => Err(FlowError::Validation(
                "Two-factor authentication is already enabled".to_string(),
            )),
            _ => Ok(()),
        }
    }

    fn invalidate_status(&mut self) {
        self.status = None;
        self.status_flight.reset();
    }

    fn reset_dialog(&mut self) {
        if self.step != MfaStep::Idle {
            log::debug!("MFA dialog reset from {}", self.step);
        }
        self.step = MfaStep::Idle;
        self.session = None;
        self.backup_codes.clear();
        self.notice = None;
        self.dialog.reset();
    }
}

pub struct MfaController {
    service: Arc<dyn AccessService>,
    state: Mutex<MfaState>,
}

impl MfaController {
    pub fn new(service: Arc<dyn AccessService>) -> Self {
        Self {
            service,
            state: Mutex::new(MfaState::default()),
        }
    }

    fn state(&self) -> MutexGuard<'_, MfaState> {
        lock(&self.state)
    }

    /// Run pre-dispatch checks, turning a rejection into a notice
    fn guard<T>(
        &self,
        check: impl FnOnce(&mut MfaState) -> Result<T, FlowError>,
    ) -> Result<T, FlowError> {
        let mut state = self.state();
        match check(&mut state) {
            Ok(value) => Ok(value),
            Err(err) => state.fail(err),
        }
    }

    pub fn snapshot(&self) -> MfaSnapshot {
        let state = self.state();
        let mut pending = state.dialog.pending();
        pending.extend(state.status_flight.pending());
        pending.sort();

        MfaSnapshot {
            step: state.step,
            session: state.session.clone(),
            backup_codes: state.backup_codes.clone(),
            status: state.status.clone(),
            notice: state.notice.clone(),
            pending,
        }
    }

    pub fn step(&self) -> MfaStep {
        self.state().step
    }

    pub fn backup_codes(&self) -> Vec<String> {
        self.state().backup_codes.clone()
    }

    pub fn status(&self) -> Option<MfaStatus> {
        self.state().status.clone()
    }

    pub fn notice(&self) -> Option<Notice> {
        self.state().notice.clone()
    }

    /// Whether a request of `kind` is in flight; the UI disables the matching action
    pub fn is_pending(&self, kind: RequestKind) -> bool {
        let state = self.state();
        state.dialog.is_pending(kind) || state.status_flight.is_pending(kind)
    }

    /// Fetch the MFA status into the cache
    pub async fn load_status(&self) -> Result<MfaStatus, FlowError> {
        let ticket = self.guard(|state| state.status_flight.begin(RequestKind::MfaStatus))?;

        let result = self.service.mfa_status().await;

        let mut state = self.state();
        if !state.status_flight.finish(ticket) {
            log::debug!("Discarding MFA status fetched before invalidation");
            return Err(FlowError::Discarded);
        }

        match result {
            Ok(status) => {
                state.status = Some(status.clone());
                Ok(status)
            },
            Err(e) => {
                log::warn!("Failed to load MFA status: {e}");
                state.fail(FlowError::transport(&e))
            },
        }
    }

    /// Drop the cached status; an in-flight status fetch will be discarded
    pub fn invalidate_status(&self) {
        self.state().invalidate_status();
    }

    /// Ask the server for a new secret, QR payload and backup codes
    pub async fn begin_setup(&self) -> Result<(), FlowError> {
        let ticket = self.guard(|state| {
            state.expect_step(&[MfaStep::Idle], "begin_setup")?;
            state.require_disabled()?;
            state.notice = None;
            state.dialog.begin(RequestKind::MfaSetup)
        })?;

        let result = self.service.begin_mfa_setup().await;

        let mut state = self.state();
        if !state.dialog.finish(ticket) {
            log::debug!("Discarding MFA setup payload for a closed dialog");
            return Err(FlowError::Discarded);
        }

        match result {
            Ok(payload) if !payload.secret.is_empty() && !payload.qr_code_url.is_empty() => {
                state.session = Some(MfaSetupSession {
                    secret: payload.secret,
                    qr_code_url: payload.qr_code_url,
                    backup_codes: payload.backup_codes,
                });
                state.enter(MfaStep::Qr);
                Ok(())
            },
            Ok(_) => {
                let err = ServiceError::Decode("setup payload without secret".to_string());
                log::warn!("MFA setup failed: {err}");
                state.fail(FlowError::transport(&err))
            },
            Err(e) => {
                log::warn!("MFA setup failed: {e}");
                state.fail(FlowError::transport(&e))
            },
        }
    }

    /// Move from the QR display to code entry
    pub fn proceed_to_verify(&self) -> Result<(), FlowError> {
        self.guard(|state| {
            state.expect_step(&[MfaStep::Qr], "proceed_to_verify")?;
            state.enter(MfaStep::Verify);
            Ok(())
        })
    }

    /// Submit the first authenticator code; only a server-confirmed success reaches `Backup`
    pub async fn verify_code(&self, code: &str) -> Result<(), FlowError> {
        let (ticket, code) = self.guard(|state| {
            state.expect_step(&[MfaStep::Verify], "verify_code")?;
            let code = validate_totp_code(code)?.to_string();
            Ok((state.dialog.begin(RequestKind::MfaVerify)?, code))
        })?;

        let result = self.service.verify_mfa_setup(&code).await;

        let mut state = self.state();
        if !state.dialog.finish(ticket) {
            log::debug!("Discarding MFA verification result for a closed dialog");
            return Err(FlowError::Discarded);
        }

        match result {
            Ok(confirmation) if confirmation.success => {
                state.backup_codes =
                    state.session.as_ref().map(|s| s.backup_codes.clone()).unwrap_or_default();
                state.enter(MfaStep::Backup);
                state.invalidate_status();
                state.notice = Some(Notice::success("Two-factor authentication is now enabled"));
                log::info!("MFA enrollment verified");
                Ok(())
            },
            Ok(_) => {
                log::info!("MFA setup code rejected");
                state.fail(FlowError::VerificationFailed)
            },
            Err(e) => {
                log::warn!("MFA verification request failed: {e}");
                state.fail(FlowError::transport(&e))
            },
        }
    }

    pub fn open_disable(&self) -> Result<(), FlowError> {
        self.guard(|state| {
            state.expect_step(&[MfaStep::Idle], "open_disable")?;
            state.require_enabled()?;
            state.notice = None;
            state.enter(MfaStep::DisableConfirm);
            Ok(())
        })
    }

    /// Turn MFA off with a current code
    pub async fn disable(&self, code: &str) -> Result<(), FlowError> {
        let (ticket, code) = self.guard(|state| {
            state.expect_step(&[MfaStep::DisableConfirm], "disable")?;
            let code = validate_confirmation_code(code)?.to_string();
            Ok((state.dialog.begin(RequestKind::MfaDisable)?, code))
        })?;

        let result = self.service.disable_mfa(&code).await;

        let mut state = self.state();
        if !state.dialog.finish(ticket) {
            log::debug!("Discarding MFA disable result for a closed dialog");
            return Err(FlowError::Discarded);
        }

        match result {
            Ok(confirmation) if confirmation.success => {
                state.reset_dialog();
                state.invalidate_status();
                state.notice = Some(Notice::success("Two-factor authentication has been disabled"));
                log::info!("MFA disabled");
                Ok(())
            },
            Ok(_) => {
                log::info!("MFA disable code rejected");
                state.fail(FlowError::VerificationFailed)
            },
            Err(e) => {
                log::warn!("MFA disable request failed: {e}");
                state.fail(FlowError::transport(&e))
            },
        }
    }

    pub fn open_regenerate(&self) -> Result<(), FlowError> {
        self.guard(|state| {
            state.expect_step(&[MfaStep::Idle], "open_regenerate")?;
            state.require_enabled()?;
            state.notice = None;
            state.enter(MfaStep::RegenerateConfirm);
            Ok(())
        })
    }

    /// Replace the backup code set. The previous set stops working server-side.
    pub async fn regenerate_backup_codes(&self, code: &str) -> Result<Vec<String>, FlowError> {
        let (ticket, code) = self.guard(|state| {
            state.expect_step(
                &[MfaStep::RegenerateConfirm, MfaStep::BackupDisplay],
                "regenerate_backup_codes",
            )?;
            let code = validate_confirmation_code(code)?.to_string();
            Ok((state.dialog.begin(RequestKind::MfaRegenerate)?, code))
        })?;

        let result = self.service.regenerate_backup_codes(&code).await;

        let mut state = self.state();
        if !state.dialog.finish(ticket) {
            log::debug!("Discarding regenerated backup codes for a closed dialog");
            return Err(FlowError::Discarded);
        }

        match result {
            Ok(response) if response.success && !response.backup_codes.is_empty() => {
                state.backup_codes = response.backup_codes;
                state.enter(MfaStep::BackupDisplay);
                state.invalidate_status();
                state.notice = Some(Notice::success(
                    "New backup codes generated. Previous codes no longer work.",
                ));
                log::info!("Backup codes regenerated");
                Ok(state.backup_codes.clone())
            },
            Ok(response) if response.success => {
                let err = ServiceError::Decode("regeneration returned no codes".to_string());
                log::warn!("Backup code regeneration failed: {err}");
                state.fail(FlowError::transport(&err))
            },
            Ok(_) => {
                log::info!("Backup code regeneration code rejected");
                state.fail(FlowError::VerificationFailed)
            },
            Err(e) => {
                log::warn!("Backup code regeneration request failed: {e}");
                state.fail(FlowError::transport(&e))
            },
        }
    }

    /// Serialize the codes on screen into a text artifact. No server interaction.
    pub fn export_backup_codes(&self) -> Result<BackupCodeExport, FlowError> {
        self.guard(|state| {
            state.expect_step(&[MfaStep::Backup, MfaStep::BackupDisplay], "export_backup_codes")?;
            if state.backup_codes.is_empty() {
                return Err(FlowError::NothingToExport);
            }
            Ok(BackupCodeExport::new(&state.backup_codes, Utc::now()))
        })
    }

    /// Close whichever dialog is open. Codes not exported are gone after this.
    pub fn close(&self) {
        self.state().reset_dialog();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mfa::dto::{BackupCodesResponse, MfaConfirmation, MfaSetupPayload};
    use crate::mocks::MockAccessService;
    use crate::types::{NoticeLevel, VERIFICATION_FAILED_MESSAGE};

    fn setup_payload() -> MfaSetupPayload {
        MfaSetupPayload {
            secret: "JBSWY3DPEHPK3PXP".to_string(),
            qr_code_url: "otpauth://totp/Simbld:alice?secret=JBSWY3DPEHPK3PXP&issuer=Simbld"
                .to_string(),
            backup_codes: vec!["111111".to_string(), "222222".to_string()],
        }
    }

    fn confirmed() -> MfaConfirmation {
        MfaConfirmation {
            success: true,
            error: None,
        }
    }

    fn rejected(error: Option<&str>) -> MfaConfirmation {
        MfaConfirmation {
            success: false,
            error: error.map(str::to_string),
        }
    }

    fn enabled_status() -> MfaStatus {
        MfaStatus {
            enabled: true,
            backup_codes_remaining: 8,
            method: "totp".to_string(),
        }
    }

    fn codes(values: &[&str]) -> BackupCodesResponse {
        BackupCodesResponse {
            success: true,
            backup_codes: values.iter().map(|c| c.to_string()).collect(),
        }
    }

    async fn controller_in_verify() -> (Arc<MockAccessService>, MfaController) {
        let mock = Arc::new(MockAccessService::new());
        mock.on_begin_setup(Ok(setup_payload()));
        let controller = MfaController::new(mock.clone());

        controller.begin_setup().await.unwrap();
        controller.proceed_to_verify().unwrap();
        (mock, controller)
    }

    #[tokio::test]
    async fn test_enrollment_end_to_end() {
        let mock = Arc::new(MockAccessService::new());
        mock.on_begin_setup(Ok(setup_payload())).on_verify(Ok(confirmed()));
        let controller = MfaController::new(mock.clone());

        controller.begin_setup().await.unwrap();
        assert_eq!(controller.step(), MfaStep::Qr);
        let session = controller.snapshot().session.unwrap();
        assert!(session.qr_code_url.starts_with("otpauth://"));
        assert_eq!(session.manual_entry_key(), "JBSW Y3DP EHPK 3PXP");

        controller.proceed_to_verify().unwrap();
        assert_eq!(controller.step(), MfaStep::Verify);

        controller.verify_code("123456").await.unwrap();
        assert_eq!(controller.step(), MfaStep::Backup);
        assert_eq!(controller.backup_codes(), vec!["111111", "222222"]);
        assert_eq!(controller.notice().unwrap().level, NoticeLevel::Success);
        assert_eq!(mock.codes_received(), vec!["123456"]);
    }

    #[tokio::test]
    async fn test_qr_cannot_skip_to_backup() {
        let mock = Arc::new(MockAccessService::new());
        mock.on_begin_setup(Ok(setup_payload()));
        let controller = MfaController::new(mock.clone());
        controller.begin_setup().await.unwrap();

        let err = controller.verify_code("123456").await.unwrap_err();
        assert!(matches!(err, FlowError::InvalidStep { .. }));
        assert!(matches!(controller.export_backup_codes(), Err(FlowError::InvalidStep { .. })));
        assert!(matches!(
            controller.regenerate_backup_codes("123456").await,
            Err(FlowError::InvalidStep { .. })
        ));
        assert_eq!(controller.step(), MfaStep::Qr);
        assert_eq!(mock.calls(RequestKind::MfaVerify), 0);
    }

    #[tokio::test]
    async fn test_malformed_code_never_reaches_server() {
        let (mock, controller) = controller_in_verify().await;

        for code in ["", "12345", "1234567", "abcdef"] {
            let err = controller.verify_code(code).await.unwrap_err();
            assert!(matches!(err, FlowError::Validation(_)), "accepted {code:?}");
        }

        assert_eq!(mock.calls(RequestKind::MfaVerify), 0);
        assert_eq!(controller.step(), MfaStep::Verify);
    }

    #[tokio::test]
    async fn test_rejected_code_uses_uniform_message() {
        let (mock, controller) = controller_in_verify().await;
        mock.on_verify(Ok(rejected(Some("code expired")))).on_verify(Ok(rejected(None)));

        for _ in 0..2 {
            let err = controller.verify_code("000000").await.unwrap_err();
            assert_eq!(err, FlowError::VerificationFailed);
            let notice = controller.notice().unwrap();
            assert_eq!(notice.message, VERIFICATION_FAILED_MESSAGE);
            assert!(!notice.retryable);
            assert_eq!(controller.step(), MfaStep::Verify);
        }
    }

    #[tokio::test]
    async fn test_transport_failure_keeps_verify_step() {
        let (mock, controller) = controller_in_verify().await;
        mock.on_verify(Err(ServiceError::Transport("timeout".into()))).on_verify(Ok(confirmed()));

        let err = controller.verify_code("123456").await.unwrap_err();
        assert!(err.is_retryable());
        assert!(controller.notice().unwrap().retryable);
        assert_eq!(controller.step(), MfaStep::Verify);

        controller.verify_code("123456").await.unwrap();
        assert_eq!(controller.step(), MfaStep::Backup);
    }

    #[tokio::test]
    async fn test_setup_failure_stays_idle() {
        let mock = Arc::new(MockAccessService::new());
        mock.on_begin_setup(Err(ServiceError::Status {
            status: 500,
            message: "oops".into(),
        }));
        let controller = MfaController::new(mock.clone());

        assert!(controller.begin_setup().await.unwrap_err().is_retryable());
        assert_eq!(controller.step(), MfaStep::Idle);
        assert!(controller.snapshot().session.is_none());
    }

    #[tokio::test]
    async fn test_regenerate_replaces_displayed_codes() {
        let mock = Arc::new(MockAccessService::new());
        mock.on_status(Ok(enabled_status()))
            .on_regenerate(Ok(codes(&["A1", "B2", "C3"])))
            .on_regenerate(Ok(codes(&["D4", "E5", "F6"])));
        let controller = MfaController::new(mock.clone());
        controller.load_status().await.unwrap();

        controller.open_regenerate().unwrap();
        controller.regenerate_backup_codes("123456").await.unwrap();
        assert_eq!(controller.backup_codes(), vec!["A1", "B2", "C3"]);
        assert_eq!(controller.step(), MfaStep::BackupDisplay);
        assert!(controller.status().is_none());

        controller.regenerate_backup_codes("654321").await.unwrap();
        assert_eq!(controller.backup_codes(), vec!["D4", "E5", "F6"]);
    }

    #[tokio::test]
    async fn test_rejected_regeneration_keeps_previous_codes() {
        let mock = Arc::new(MockAccessService::new());
        mock.on_regenerate(Ok(codes(&["A1", "B2"]))).on_regenerate(Ok(BackupCodesResponse {
            success: false,
            backup_codes: vec![],
        }));
        let controller = MfaController::new(mock.clone());

        controller.open_regenerate().unwrap();
        controller.regenerate_backup_codes("123456").await.unwrap();
        let err = controller.regenerate_backup_codes("999999").await.unwrap_err();

        assert_eq!(err, FlowError::VerificationFailed);
        assert_eq!(controller.backup_codes(), vec!["A1", "B2"]);
    }

    #[tokio::test]
    async fn test_disable_clears_state_and_status() {
        let mock = Arc::new(MockAccessService::new());
        mock.on_status(Ok(enabled_status())).on_disable(Ok(confirmed()));
        let controller = MfaController::new(mock.clone());
        controller.load_status().await.unwrap();

        controller.open_disable().unwrap();
        assert_eq!(controller.step(), MfaStep::DisableConfirm);

        controller.disable("123456").await.unwrap();
        let snapshot = controller.snapshot();
        assert_eq!(snapshot.step, MfaStep::Idle);
        assert!(snapshot.status.is_none());
        assert!(snapshot.backup_codes.is_empty());
        assert_eq!(snapshot.notice.unwrap().level, NoticeLevel::Success);
    }

    #[tokio::test]
    async fn test_disable_failure_stays_open() {
        let mock = Arc::new(MockAccessService::new());
        mock.on_disable(Ok(rejected(Some("locked"))));
        let controller = MfaController::new(mock.clone());

        controller.open_disable().unwrap();
        assert!(matches!(controller.disable("12345").await, Err(FlowError::Validation(_))));
        assert_eq!(mock.calls(RequestKind::MfaDisable), 0);

        assert_eq!(controller.disable("123456").await, Err(FlowError::VerificationFailed));
        assert_eq!(controller.step(), MfaStep::DisableConfirm);
    }

    #[tokio::test]
    async fn test_sub_flows_require_enabled_mfa() {
        let mock = Arc::new(MockAccessService::new());
        mock.on_status(Ok(MfaStatus {
            enabled: false,
            backup_codes_remaining: 0,
            method: String::new(),
        }));
        let controller = MfaController::new(mock.clone());
        controller.load_status().await.unwrap();

        assert!(matches!(controller.open_disable(), Err(FlowError::Validation(_))));
        assert!(matches!(controller.open_regenerate(), Err(FlowError::Validation(_))));
        assert_eq!(controller.step(), MfaStep::Idle);
    }

    #[tokio::test]
    async fn test_setup_requires_disabled_mfa() {
        let mock = Arc::new(MockAccessService::new());
        mock.on_status(Ok(enabled_status())).on_begin_setup(Ok(setup_payload()));
        let controller = MfaController::new(mock.clone());
        controller.load_status().await.unwrap();

        let err = controller.begin_setup().await.unwrap_err();
        assert_eq!(
            err,
            FlowError::Validation("Two-factor authentication is already enabled".to_string())
        );
        let notice = controller.notice().unwrap();
        assert_eq!(notice.level, NoticeLevel::Error);
        assert!(!notice.retryable);
        assert_eq!(controller.step(), MfaStep::Idle);
        assert_eq!(mock.calls(RequestKind::MfaSetup), 0);

        // Unknown status does not block the server from deciding
        controller.invalidate_status();
        controller.begin_setup().await.unwrap();
        assert_eq!(controller.step(), MfaStep::Qr);
    }

    #[tokio::test]
    async fn test_export_after_enrollment() {
        let (mock, controller) = controller_in_verify().await;
        mock.on_verify(Ok(confirmed()));
        controller.verify_code("123456").await.unwrap();

        let export = controller.export_backup_codes().unwrap();
        assert!(export.contents.contains("111111"));
        assert!(export.contents.contains("222222"));
        assert_eq!(controller.backup_codes(), vec!["111111", "222222"]);
        assert_eq!(mock.total_calls(), 2);

        controller.close();
        assert!(matches!(controller.export_backup_codes(), Err(FlowError::InvalidStep { .. })));
    }

    #[tokio::test]
    async fn test_close_resets_from_every_step() {
        let mock = Arc::new(MockAccessService::new());
        let controller = MfaController::new(mock.clone());
        let initial = controller.snapshot();

        // qr
        mock.on_begin_setup(Ok(setup_payload()));
        controller.begin_setup().await.unwrap();
        controller.close();
        assert_eq!(controller.snapshot(), initial);

        // verify, with a failure notice showing
        mock.on_begin_setup(Ok(setup_payload())).on_verify(Ok(rejected(None)));
        controller.begin_setup().await.unwrap();
        controller.proceed_to_verify().unwrap();
        let _ = controller.verify_code("000000").await;
        controller.close();
        assert_eq!(controller.snapshot(), initial);

        // backup
        mock.on_begin_setup(Ok(setup_payload())).on_verify(Ok(confirmed()));
        controller.begin_setup().await.unwrap();
        controller.proceed_to_verify().unwrap();
        controller.verify_code("123456").await.unwrap();
        controller.close();
        assert_eq!(controller.snapshot(), initial);

        // disable-confirm, regenerate-confirm, backup-display
        controller.open_disable().unwrap();
        controller.close();
        assert_eq!(controller.snapshot(), initial);

        mock.on_regenerate(Ok(codes(&["A1"])));
        controller.open_regenerate().unwrap();
        controller.close();
        assert_eq!(controller.snapshot(), initial);
        controller.open_regenerate().unwrap();
        controller.regenerate_backup_codes("123456").await.unwrap();
        controller.close();
        controller.close();
        assert_eq!(controller.snapshot(), initial);
    }

    #[tokio::test]
    async fn test_result_after_close_is_discarded() {
        let (mock, controller) = controller_in_verify().await;
        mock.on_verify(Ok(confirmed()));
        let gate = mock.hold_responses();

        let (result, _) = tokio::join!(controller.verify_code("123456"), async {
            controller.close();
            gate.notify_one();
        });

        assert_eq!(result, Err(FlowError::Discarded));
        let snapshot = controller.snapshot();
        assert_eq!(snapshot.step, MfaStep::Idle);
        assert!(snapshot.backup_codes.is_empty());
        assert!(snapshot.notice.is_none());
    }

    #[tokio::test]
    async fn test_duplicate_submission_is_rejected_while_pending() {
        let (mock, controller) = controller_in_verify().await;
        mock.on_verify(Ok(confirmed()));
        let gate = mock.hold_responses();

        let (first, second) = tokio::join!(controller.verify_code("123456"), async {
            assert!(controller.is_pending(RequestKind::MfaVerify));
            let second = controller.verify_code("123456").await;
            gate.notify_one();
            second
        });

        assert_eq!(first, Ok(()));
        assert_eq!(second, Err(FlowError::Busy(RequestKind::MfaVerify)));
        assert_eq!(mock.calls(RequestKind::MfaVerify), 1);
        assert!(!controller.is_pending(RequestKind::MfaVerify));
    }

    #[tokio::test]
    async fn test_status_fetch_before_invalidation_is_discarded() {
        let mock = Arc::new(MockAccessService::new());
        mock.on_status(Ok(enabled_status()));
        let controller = MfaController::new(mock.clone());
        let gate = mock.hold_responses();

        let (result, _) = tokio::join!(controller.load_status(), async {
            controller.invalidate_status();
            gate.notify_one();
        });

        assert_eq!(result, Err(FlowError::Discarded));
        assert!(controller.status().is_none());
    }
}
