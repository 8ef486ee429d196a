//! Emergency ("break-the-glass") access.
//!
//! Temporary access to a patient record outside normal authorization, granted by the access
//! service after an acknowledged audit notice and a written justification.

pub mod controller;
pub mod dto;

pub use controller::{
    validate_request, EmergencyAccessController, EmergencySnapshot, EmergencyStep,
    DEFAULT_DENIAL_MESSAGE, MIN_JUSTIFICATION_LENGTH,
};
pub use dto::{EmergencyAccessGrant, EmergencyAccessRequest, EmergencyReason};
