//! REST implementation of the access service.

use super::retry::RetryPolicy;
use super::AccessService;
use crate::emergency::dto::{EmergencyAccessRequest, EmergencyAccessResponse, EmergencyReason};
use crate::mfa::dto::{
    BackupCodesResponse, MfaCodeRequest, MfaConfirmation, MfaSetupPayload, MfaStatus,
};
use crate::types::{AccessClientConfig, Endpoints, ServiceError};
use async_trait::async_trait;
use reqwest::{Client, RequestBuilder, Response};
use serde::de::DeserializeOwned;
use serde::Serialize;

/// Longest body excerpt carried in a `ServiceError::Status`
const MAX_ERROR_BODY: usize = 256;

pub struct HttpAccessService {
    client: Client,
    base_url: String,
    access_token: Option<String>,
    endpoints: Endpoints,
    retry: RetryPolicy,
}

impl HttpAccessService {
    pub fn new(config: &AccessClientConfig) -> Result<Self, ServiceError> {
        let client = Client::builder()
            .timeout(config.request_timeout())
            .build()
            .map_err(|e| ServiceError::Config(format!("Failed to build HTTP client: {e}")))?;

        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            access_token: config.access_token.clone(),
            endpoints: config.endpoints.clone(),
            retry: RetryPolicy::new(&config.retry),
        })
    }

    pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    fn authorize(&self, builder: RequestBuilder) -> RequestBuilder {
        match &self.access_token {
            Some(token) => builder.bearer_auth(token),
            None => builder,
        }
    }

    async fn get_json<T: DeserializeOwned>(&self, path: &str) -> Result<T, ServiceError> {
        let url = self.url(path);
        let url = url.as_str();

        self.retry
            .run(true, || async move {
                log::debug!("GET {url}");
                let response = self.authorize(self.client.get(url)).send().await.map_err(
                    |e| {
                        log::error!("Failed to send GET request to {url}: {e}");
                        classify(&e)
                    },
                )?;
                decode(response).await
            })
            .await
    }

    async fn post_json<B, T>(&self, path: &str, body: &B) -> Result<T, ServiceError>
    where
        B: Serialize + Sync + ?Sized,
        T: DeserializeOwned,
    {
        let url = self.url(path);
        let url = url.as_str();

        self.retry
            .run(false, || async move {
                log::debug!("POST {url}");
                let response = self
                    .authorize(self.client.post(url))
                    .json(body)
                    .send()
                    .await
                    .map_err(|e| {
                        log::error!("Failed to send POST request to {url}: {e}");
                        classify(&e)
                    })?;
                decode(response).await
            })
            .await
    }
}

fn classify(err: &reqwest::Error) -> ServiceError {
    if err.is_connect() {
        ServiceError::Connect(err.to_string())
    } else {
        ServiceError::Transport(err.to_string())
    }
}

/// Decode a response body.
///
/// A non-2xx response whose body still has the expected shape is returned as is, so that
/// structured refusals (`{ "success": false, "error": ... }`) reach the controllers.
async fn decode<T: DeserializeOwned>(response: Response) -> Result<T, ServiceError> {
    let status = response.status();
    let body = response.text().await.map_err(|e| ServiceError::Transport(e.to_string()))?;

    match serde_json::from_str::<T>(&body) {
        Ok(value) => Ok(value),
        Err(e) if status.is_success() => Err(ServiceError::Decode(e.to_string())),
        Err(_) => {
            log::warn!("Access service answered {status} without a structured body");
            Err(ServiceError::Status {
                status: status.as_u16(),
                message: body.chars().take(MAX_ERROR_BODY).collect(),
            })
        },
    }
}

#[async_trait]
impl AccessService for HttpAccessService {
    async fn mfa_status(&self) -> Result<MfaStatus, ServiceError> {
        self.get_json(&self.endpoints.mfa_status).await
    }

    async fn begin_mfa_setup(&self) -> Result<MfaSetupPayload, ServiceError> {
        self.post_json(&self.endpoints.mfa_setup_begin, &serde_json::json!({})).await
    }

    async fn verify_mfa_setup(&self, code: &str) -> Result<MfaConfirmation, ServiceError> {
        let body = MfaCodeRequest {
            code: code.to_string(),
        };
        self.post_json(&self.endpoints.mfa_verify_setup, &body).await
    }

    async fn disable_mfa(&self, code: &str) -> Result<MfaConfirmation, ServiceError> {
        let body = MfaCodeRequest {
            code: code.to_string(),
        };
        self.post_json(&self.endpoints.mfa_disable, &body).await
    }

    async fn regenerate_backup_codes(
        &self,
        code: &str,
    ) -> Result<BackupCodesResponse, ServiceError> {
        let body = MfaCodeRequest {
            code: code.to_string(),
        };
        self.post_json(&self.endpoints.mfa_regenerate_backup_codes, &body).await
    }

    async fn emergency_reasons(&self) -> Result<Vec<EmergencyReason>, ServiceError> {
        self.get_json(&self.endpoints.emergency_reasons).await
    }

    async fn request_emergency_access(
        &self,
        request: &EmergencyAccessRequest,
    ) -> Result<EmergencyAccessResponse, ServiceError> {
        self.post_json(&self.endpoints.emergency_request, request).await
    }
}
