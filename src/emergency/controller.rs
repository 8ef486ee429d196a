//! Emergency ("break-the-glass") access workflow.
//!
//! `Warning -> Form -> Success`. Entering the form requires the audit notice to be
//! acknowledged; submitting requires a listed reason and a justification of at least
//! [`MIN_JUSTIFICATION_LENGTH`] characters. Closing always starts the next open from scratch.

use super::dto::{EmergencyAccessGrant, EmergencyAccessRequest, EmergencyReason};
use crate::client::AccessService;
use crate::flow::{lock, InFlight};
use crate::types::{FlowError, Notice, RequestKind, ServiceError};
use chrono::{DateTime, Utc};
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard};

pub const MIN_JUSTIFICATION_LENGTH: usize = 20;

/// Shown when the server refuses without saying why
pub const DEFAULT_DENIAL_MESSAGE: &str = "Emergency access request was denied";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum EmergencyStep {
    #[default]
    Warning,
    Form,
    Success,
}

impl fmt::Display for EmergencyStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            EmergencyStep::Warning => "warning",
            EmergencyStep::Form => "form",
            EmergencyStep::Success => "success",
        };
        f.write_str(name)
    }
}

/// Check a request against the loaded reasons, before anything is sent
pub fn validate_request(
    request: &EmergencyAccessRequest,
    reasons: &[EmergencyReason],
) -> Result<(), FlowError> {
    if reasons.is_empty() {
        return Err(FlowError::Validation(
            "No emergency access reasons are available. Reload them and try again.".to_string(),
        ));
    }
    if request.reason.is_empty() {
        return Err(FlowError::Validation("Select a reason for emergency access".to_string()));
    }
    if !reasons.iter().any(|r| r.value == request.reason) {
        return Err(FlowError::Validation(
            "Select one of the listed emergency access reasons".to_string(),
        ));
    }
    if request.justification.chars().count() < MIN_JUSTIFICATION_LENGTH {
        return Err(FlowError::Validation(format!(
            "Justification must be at least {MIN_JUSTIFICATION_LENGTH} characters"
        )));
    }
    Ok(())
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EmergencySnapshot {
    pub patient_id: i64,
    pub step: EmergencyStep,
    pub acknowledged: bool,
    pub reasons: Vec<EmergencyReason>,
    pub reasons_loaded: bool,
    pub reason: String,
    pub justification: String,
    pub grant: Option<EmergencyAccessGrant>,
    pub notice: Option<Notice>,
    pub pending: Vec<RequestKind>,
}

#[derive(Debug, Default)]
struct EmergencyState {
    step: EmergencyStep,
    acknowledged: bool,
    reasons: Vec<EmergencyReason>,
    reasons_loaded: bool,
    reason: String,
    justification: String,
    grant: Option<EmergencyAccessGrant>,
    notice: Option<Notice>,
    flight: InFlight,
}

impl EmergencyState {
    fn expect_step(
        &self,
        allowed: &[EmergencyStep],
        operation: &'static str,
    ) -> Result<(), FlowError> {
        if allowed.contains(&self.step) {
            Ok(())
        } else {
            Err(FlowError::InvalidStep {
                operation,
                step: self.step.to_string(),
            })
        }
    }

    fn enter(&mut self, step: EmergencyStep) {
        log::debug!("Emergency access step {} -> {}", self.step, step);
        self.step = step;
    }

    fn fail<T>(&mut self, err: FlowError) -> Result<T, FlowError> {
        if !matches!(err, FlowError::Busy(_) | FlowError::Discarded) {
            self.notice = Some(Notice::from(&err));
        }
        Err(err)
    }

    fn require_acknowledged(&self) -> Result<(), FlowError> {
        if self.acknowledged {
            Ok(())
        } else {
            Err(FlowError::Validation(
                "Acknowledge the audit notice before continuing".to_string(),
            ))
        }
    }
}

pub struct EmergencyAccessController {
    service: Arc<dyn AccessService>,
    patient_id: i64,
    state: Mutex<EmergencyState>,
}

impl EmergencyAccessController {
    pub fn new(service: Arc<dyn AccessService>, patient_id: i64) -> Self {
        Self {
            service,
            patient_id,
            state: Mutex::new(EmergencyState::default()),
        }
    }

    fn state(&self) -> MutexGuard<'_, EmergencyState> {
        lock(&self.state)
    }

    fn guard<T>(
        &self,
        check: impl FnOnce(&mut EmergencyState) -> Result<T, FlowError>,
    ) -> Result<T, FlowError> {
        let mut state = self.state();
        match check(&mut state) {
            Ok(value) => Ok(value),
            Err(err) => state.fail(err),
        }
    }

    pub fn patient_id(&self) -> i64 {
        self.patient_id
    }

    pub fn snapshot(&self) -> EmergencySnapshot {
        let state = self.state();
        EmergencySnapshot {
            patient_id: self.patient_id,
            step: state.step,
            acknowledged: state.acknowledged,
            reasons: state.reasons.clone(),
            reasons_loaded: state.reasons_loaded,
            reason: state.reason.clone(),
            justification: state.justification.clone(),
            grant: state.grant.clone(),
            notice: state.notice.clone(),
            pending: state.flight.pending(),
        }
    }

    pub fn step(&self) -> EmergencyStep {
        self.state().step
    }

    pub fn grant(&self) -> Option<EmergencyAccessGrant> {
        self.state().grant.clone()
    }

    pub fn notice(&self) -> Option<Notice> {
        self.state().notice.clone()
    }

    pub fn is_pending(&self, kind: RequestKind) -> bool {
        self.state().flight.is_pending(kind)
    }

    /// Whether a grant is held and not yet past its server-issued expiry
    pub fn has_active_grant(&self, now: DateTime<Utc>) -> bool {
        self.state().grant.as_ref().is_some_and(|grant| !grant.is_expired_at(now))
    }

    /// Fetch the reason list. May be called again after a failure.
    pub async fn load_reasons(&self) -> Result<Vec<EmergencyReason>, FlowError> {
        let ticket = self.guard(|state| state.flight.begin(RequestKind::EmergencyReasons))?;

        let result = self.service.emergency_reasons().await;

        let mut state = self.state();
        if !state.flight.finish(ticket) {
            log::debug!("Discarding emergency reasons for a closed dialog");
            return Err(FlowError::Discarded);
        }

        match result {
            Ok(reasons) => {
                if reasons.is_empty() {
                    log::warn!("Access service returned no emergency access reasons");
                    state.notice = Some(Notice::info(
                        "No emergency access reasons are configured. Contact an administrator.",
                    ));
                }
                if !reasons.iter().any(|r| r.value == state.reason) {
                    state.reason.clear();
                }
                state.reasons = reasons.clone();
                state.reasons_loaded = true;
                Ok(reasons)
            },
            Err(e) => {
                log::warn!("Failed to load emergency access reasons: {e}");
                state.fail(FlowError::transport(&e))
            },
        }
    }

    pub fn set_acknowledged(&self, acknowledged: bool) -> Result<(), FlowError> {
        self.guard(|state| {
            state.expect_step(
                &[EmergencyStep::Warning, EmergencyStep::Form],
                "set_acknowledged",
            )?;
            state.acknowledged = acknowledged;
            Ok(())
        })
    }

    /// Tick the audit/compliance checkbox
    pub fn acknowledge(&self) -> Result<(), FlowError> {
        self.set_acknowledged(true)
    }

    /// Continue from the warning to the form; blocked until acknowledged
    pub fn proceed(&self) -> Result<(), FlowError> {
        self.guard(|state| {
            state.expect_step(&[EmergencyStep::Warning], "proceed")?;
            state.require_acknowledged()?;
            state.notice = None;
            state.enter(EmergencyStep::Form);
            Ok(())
        })
    }

    /// Return to the warning, keeping the acknowledgement and the form fields
    pub fn back(&self) -> Result<(), FlowError> {
        self.guard(|state| {
            state.expect_step(&[EmergencyStep::Form], "back")?;
            state.enter(EmergencyStep::Warning);
            Ok(())
        })
    }

    pub fn select_reason(&self, value: &str) -> Result<(), FlowError> {
        self.guard(|state| {
            state.expect_step(&[EmergencyStep::Form], "select_reason")?;
            state.reason = value.to_string();
            Ok(())
        })
    }

    pub fn set_justification(&self, text: &str) -> Result<(), FlowError> {
        self.guard(|state| {
            state.expect_step(&[EmergencyStep::Form], "set_justification")?;
            state.justification = text.to_string();
            Ok(())
        })
    }

    /// Whether the submit action should be enabled
    pub fn can_submit(&self) -> bool {
        let state = self.state();
        state.step == EmergencyStep::Form
            && state.acknowledged
            && !state.flight.is_pending(RequestKind::EmergencyRequest)
            && validate_request(&self.request_from(&state), &state.reasons).is_ok()
    }

    fn request_from(&self, state: &EmergencyState) -> EmergencyAccessRequest {
        EmergencyAccessRequest {
            patient_id: self.patient_id,
            reason: state.reason.clone(),
            justification: state.justification.clone(),
        }
    }

    /// Load `request` into the form and submit it
    pub async fn submit_request(&self, request: EmergencyAccessRequest) -> Result<(), FlowError> {
        self.guard(|state| {
            state.expect_step(&[EmergencyStep::Form], "submit_request")?;
            // The form must keep showing what is actually in flight
            if state.flight.is_pending(RequestKind::EmergencyRequest) {
                return Err(FlowError::Busy(RequestKind::EmergencyRequest));
            }
            if request.patient_id != self.patient_id {
                return Err(FlowError::Validation(format!(
                    "This dialog is for patient {}, not {}",
                    self.patient_id, request.patient_id
                )));
            }
            state.reason = request.reason;
            state.justification = request.justification;
            Ok(())
        })?;

        self.submit().await
    }

    /// Submit the current form
    pub async fn submit(&self) -> Result<(), FlowError> {
        let (ticket, request) = self.guard(|state| {
            state.expect_step(&[EmergencyStep::Form], "submit")?;
            state.require_acknowledged()?;
            let request = self.request_from(state);
            validate_request(&request, &state.reasons)?;
            Ok((state.flight.begin(RequestKind::EmergencyRequest)?, request))
        })?;

        log::info!(
            "Requesting emergency access to patient {} (reason: {})",
            request.patient_id,
            request.reason
        );
        let result = self.service.request_emergency_access(&request).await;

        let mut state = self.state();
        if !state.flight.finish(ticket) {
            log::debug!("Discarding emergency access response for a closed dialog");
            return Err(FlowError::Discarded);
        }

        match result {
            Ok(response) if response.success => match response.grant {
                Some(grant) => {
                    log::info!(
                        "Emergency access grant {} issued, expires at {}",
                        grant.id,
                        grant.expires_at
                    );
                    state.grant = Some(grant);
                    state.enter(EmergencyStep::Success);
                    state.notice = Some(Notice::success("Emergency access granted"));
                    Ok(())
                },
                None => {
                    let err = ServiceError::Decode("successful response without grant".to_string());
                    log::warn!("Emergency access request failed: {err}");
                    state.fail(FlowError::transport(&err))
                },
            },
            Ok(response) => {
                let message = response
                    .error
                    .filter(|m| !m.trim().is_empty())
                    .unwrap_or_else(|| DEFAULT_DENIAL_MESSAGE.to_string());
                log::info!("Emergency access denied: {message}");
                state.fail(FlowError::Denied(message))
            },
            Err(e) => {
                log::warn!("Emergency access request failed: {e}");
                state.fail(FlowError::transport(&e))
            },
        }
    }

    /// Reset every transient field; the next open starts at the warning
    pub fn close(&self) {
        let mut state = self.state();
        if state.step != EmergencyStep::Warning || state.acknowledged {
            log::debug!("Emergency access dialog reset from {}", state.step);
        }
        state.step = EmergencyStep::Warning;
        state.acknowledged = false;
        state.reason.clear();
        state.justification.clear();
        state.grant = None;
        state.notice = None;
        state.flight.reset();
    }
}
