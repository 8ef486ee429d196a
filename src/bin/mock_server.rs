//! Mock access service for local development
//! Serves MFA and emergency access endpoints from in-memory state

use actix_cors::Cors;
use actix_web::{middleware::Logger, web, App, HttpServer};

use simbld_access::config::load_config;
use simbld_access::mocks::{configure_routes, MockIdentityState, MockSettings};
use simbld_access::types::StartupError;

/// Read mock behaviour overrides from the environment
fn mock_settings() -> Result<MockSettings, StartupError> {
    let mut settings = MockSettings::default();

    if let Ok(code) = std::env::var("MOCK_ACCEPTED_CODE") {
        settings.accepted_code = code;
    }
    if let Ok(minutes) = std::env::var("MOCK_GRANT_LIFETIME_MINUTES") {
        settings.grant_lifetime_minutes = minutes
            .parse()
            .map_err(|e| StartupError::Config(format!("MOCK_GRANT_LIFETIME_MINUTES: {e}")))?;
    }
    if let Ok(patients) = std::env::var("MOCK_RESTRICTED_PATIENTS") {
        settings.restricted_patients = patients
            .split(',')
            .map(str::trim)
            .filter(|p| !p.is_empty())
            .map(|p| {
                p.parse::<i64>()
                    .map_err(|e| StartupError::Config(format!("MOCK_RESTRICTED_PATIENTS: {e}")))
            })
            .collect::<Result<_, _>>()?;
    }

    Ok(settings)
}

#[actix_web::main]
async fn main() -> Result<(), StartupError> {
    dotenvy::dotenv().ok();
    env_logger::init();

    let config = load_config().map_err(|e| StartupError::Config(e.to_string()))?;
    let settings = mock_settings()?;
    let bind_address =
        std::env::var("MOCK_BIND_ADDRESS").unwrap_or_else(|_| "127.0.0.1:8081".to_string());

    log::info!("Mock access service listening on http://{bind_address}");
    for path in config.endpoints.all() {
        log::info!("  {path}");
    }
    log::info!("Accepted authenticator code: {}", settings.accepted_code);

    let state = web::Data::new(MockIdentityState::new(settings));
    let endpoints = config.endpoints;

    HttpServer::new(move || {
        let endpoints = endpoints.clone();
        App::new()
            .wrap(Logger::default())
            .wrap(Cors::permissive())
            .app_data(state.clone())
            .configure(move |cfg| configure_routes(cfg, &endpoints))
    })
    .bind(&bind_address)
    .map_err(|e| StartupError::ServerBind(format!("{bind_address}: {e}")))?
    .run()
    .await
    .map_err(|e| StartupError::ServerBind(e.to_string()))
}
