//! Data Transfer Objects for emergency ("break-the-glass") access

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

/// Reference entry describing an acceptable emergency reason
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EmergencyReason {
    pub value: String,
    pub label: String,
    #[serde(default)]
    pub description: String,
}

/// Request submitted once the form is complete
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EmergencyAccessRequest {
    pub patient_id: i64,
    pub reason: String,
    pub justification: String,
}

/// Time-boxed grant issued by the server
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EmergencyAccessGrant {
    pub id: String,
    pub expires_at: DateTime<Utc>,
    pub access_token: String,
}

impl EmergencyAccessGrant {
    /// Expiry is enforced server-side; this only drives presentation.
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        now > self.expires_at
    }

    /// Time left before expiry, zero once expired
    pub fn remaining_at(&self, now: DateTime<Utc>) -> Duration {
        if self.is_expired_at(now) {
            Duration::zero()
        } else {
            self.expires_at - now
        }
    }
}

/// Server answer to an emergency access request
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EmergencyAccessResponse {
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub grant: Option<EmergencyAccessGrant>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}
