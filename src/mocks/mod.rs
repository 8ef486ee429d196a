//! Test doubles for the access service.
//!
//! `MockAccessService` scripts responses in-process; `mock_handlers` serves a stateful fake
//! over HTTP for the mock server binary and integration tests.

pub mod mock_handlers;
pub mod mock_service;

pub use mock_handlers::{configure_routes, MockIdentityState, MockSettings};
pub use mock_service::MockAccessService;
