//! Simbld Access Client
//!
//! Client-side workflows for the Simbld access/identity service: TOTP multi-factor
//! enrollment with backup codes, and emergency ("break-the-glass") patient record access.
//! Both workflows are step machines driven against the [`client::AccessService`] trait.

pub mod client;
pub mod config;
pub mod emergency;
pub(crate) mod flow;
pub mod forms;
pub mod mfa;
pub mod mocks;
pub mod recent_patients;
pub mod types;

// Re-export commonly used types and functions
pub use client::{AccessService, HttpAccessService, RetryPolicy};
pub use config::load_config;
pub use emergency::{EmergencyAccessController, EmergencySnapshot, EmergencyStep};
pub use mfa::{MfaController, MfaSnapshot, MfaStep};
pub use recent_patients::RecentPatients;
pub use types::{AccessClientConfig, FlowError, Notice, NoticeLevel, ServiceError};

// Version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
pub const SERVICE_NAME: &str = "simbld-access";
