//! Scripted in-memory access service for controller tests.
//!
//! Each endpoint replays a queue of canned results; an empty queue answers with a
//! transport error. Calls can be held until released to simulate slow responses.

use crate::client::AccessService;
use crate::emergency::dto::{EmergencyAccessRequest, EmergencyAccessResponse, EmergencyReason};
use crate::flow::lock;
use crate::mfa::dto::{BackupCodesResponse, MfaConfirmation, MfaSetupPayload, MfaStatus};
use crate::types::{RequestKind, ServiceError};
use async_trait::async_trait;
use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};
use tokio::sync::Notify;

type Script<T> = Mutex<VecDeque<Result<T, ServiceError>>>;

#[derive(Default)]
pub struct MockAccessService {
    status: Script<MfaStatus>,
    setup: Script<MfaSetupPayload>,
    verify: Script<MfaConfirmation>,
    disable: Script<MfaConfirmation>,
    regenerate: Script<BackupCodesResponse>,
    reasons: Script<Vec<EmergencyReason>>,
    emergency: Script<EmergencyAccessResponse>,
    calls: Mutex<HashMap<RequestKind, usize>>,
    codes_received: Mutex<Vec<String>>,
    emergency_requests: Mutex<Vec<EmergencyAccessRequest>>,
    gate: Mutex<Option<Arc<Notify>>>,
}

impl MockAccessService {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn on_status(&self, result: Result<MfaStatus, ServiceError>) -> &Self {
        lock(&self.status).push_back(result);
        self
    }

    pub fn on_begin_setup(&self, result: Result<MfaSetupPayload, ServiceError>) -> &Self {
        lock(&self.setup).push_back(result);
        self
    }

    pub fn on_verify(&self, result: Result<MfaConfirmation, ServiceError>) -> &Self {
        lock(&self.verify).push_back(result);
        self
    }

    pub fn on_disable(&self, result: Result<MfaConfirmation, ServiceError>) -> &Self {
        lock(&self.disable).push_back(result);
        self
    }

    pub fn on_regenerate(&self, result: Result<BackupCodesResponse, ServiceError>) -> &Self {
        lock(&self.regenerate).push_back(result);
        self
    }

    pub fn on_reasons(&self, result: Result<Vec<EmergencyReason>, ServiceError>) -> &Self {
        lock(&self.reasons).push_back(result);
        self
    }

    pub fn on_emergency_request(
        &self,
        result: Result<EmergencyAccessResponse, ServiceError>,
    ) -> &Self {
        lock(&self.emergency).push_back(result);
        self
    }

    /// Hold every following call until the returned handle is notified once per call
    pub fn hold_responses(&self) -> Arc<Notify> {
        let notify = Arc::new(Notify::new());
        *lock(&self.gate) = Some(notify.clone());
        notify
    }

    pub fn calls(&self, kind: RequestKind) -> usize {
        lock(&self.calls).get(&kind).copied().unwrap_or(0)
    }

    pub fn total_calls(&self) -> usize {
        lock(&self.calls).values().sum()
    }

    /// Codes sent to the verify, disable and regenerate endpoints, in order
    pub fn codes_received(&self) -> Vec<String> {
        lock(&self.codes_received).clone()
    }

    pub fn emergency_requests(&self) -> Vec<EmergencyAccessRequest> {
        lock(&self.emergency_requests).clone()
    }

    async fn answer<T>(&self, kind: RequestKind, script: &Script<T>) -> Result<T, ServiceError> {
        *lock(&self.calls).entry(kind).or_insert(0) += 1;

        let gate = lock(&self.gate).clone();
        if let Some(gate) = gate {
            gate.notified().await;
        }

        lock(script)
            .pop_front()
            .unwrap_or_else(|| Err(ServiceError::Transport(format!("no scripted {kind} response"))))
    }

    fn record_code(&self, code: &str) {
        lock(&self.codes_received).push(code.to_string());
    }
}

#[async_trait]
impl AccessService for MockAccessService {
    async fn mfa_status(&self) -> Result<MfaStatus, ServiceError> {
        self.answer(RequestKind::MfaStatus, &self.status).await
    }

    async fn begin_mfa_setup(&self) -> Result<MfaSetupPayload, ServiceError> {
        self.answer(RequestKind::MfaSetup, &self.setup).await
    }

    async fn verify_mfa_setup(&self, code: &str) -> Result<MfaConfirmation, ServiceError> {
        self.record_code(code);
        self.answer(RequestKind::MfaVerify, &self.verify).await
    }

    async fn disable_mfa(&self, code: &str) -> Result<MfaConfirmation, ServiceError> {
        self.record_code(code);
        self.answer(RequestKind::MfaDisable, &self.disable).await
    }

    async fn regenerate_backup_codes(
        &self,
        code: &str,
    ) -> Result<BackupCodesResponse, ServiceError> {
        self.record_code(code);
        self.answer(RequestKind::MfaRegenerate, &self.regenerate).await
    }

    async fn emergency_reasons(&self) -> Result<Vec<EmergencyReason>, ServiceError> {
        self.answer(RequestKind::EmergencyReasons, &self.reasons).await
    }

    async fn request_emergency_access(
        &self,
        request: &EmergencyAccessRequest,
    ) -> Result<EmergencyAccessResponse, ServiceError> {
        lock(&self.emergency_requests).push(request.clone());
        self.answer(RequestKind::EmergencyRequest, &self.emergency).await
    }
}
