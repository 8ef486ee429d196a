use crate::types::{AccessClientConfig, ServiceError};
use config::builder::DefaultState;
use config::{Config, ConfigBuilder, Environment};

/// Load the client configuration from defaults, `.env` and `ACCESS_*` environment variables.
///
/// Nested keys use a double underscore, e.g. `ACCESS_RETRY__MAX_ATTEMPTS=5`.
pub fn load_config() -> Result<AccessClientConfig, ServiceError> {
    dotenvy::dotenv().ok();

    let builder = defaults()?.add_source(
        Environment::with_prefix("ACCESS").prefix_separator("_").separator("__").try_parsing(true),
    );

    finish(builder)
}

/// Defaults mirroring `AccessClientConfig::default()`
fn defaults() -> Result<ConfigBuilder<DefaultState>, ServiceError> {
    let base = AccessClientConfig::default();

    Config::builder()
        .set_default("base_url", base.base_url)
        .and_then(|b| b.set_default("request_timeout_secs", base.request_timeout_secs))
        .and_then(|b| b.set_default("recent_patients_capacity", base.recent_patients_capacity as u64))
        .and_then(|b| b.set_default("retry.max_attempts", u64::from(base.retry.max_attempts)))
        .and_then(|b| b.set_default("retry.initial_interval_ms", base.retry.initial_interval_ms))
        .and_then(|b| b.set_default("retry.multiplier", base.retry.multiplier))
        .and_then(|b| b.set_default("endpoints.mfa_status", base.endpoints.mfa_status))
        .and_then(|b| b.set_default("endpoints.mfa_setup_begin", base.endpoints.mfa_setup_begin))
        .and_then(|b| b.set_default("endpoints.mfa_verify_setup", base.endpoints.mfa_verify_setup))
        .and_then(|b| b.set_default("endpoints.mfa_disable", base.endpoints.mfa_disable))
        .and_then(|b| {
            b.set_default(
                "endpoints.mfa_regenerate_backup_codes",
                base.endpoints.mfa_regenerate_backup_codes,
            )
        })
        .and_then(|b| b.set_default("endpoints.emergency_reasons", base.endpoints.emergency_reasons))
        .and_then(|b| b.set_default("endpoints.emergency_request", base.endpoints.emergency_request))
        .map_err(|e| ServiceError::Config(e.to_string()))
}

fn finish(builder: ConfigBuilder<DefaultState>) -> Result<AccessClientConfig, ServiceError> {
    let config = builder
        .build()
        .and_then(|c| c.try_deserialize::<AccessClientConfig>())
        .map_err(|e| ServiceError::Config(e.to_string()))?;

    validate_config(&config)?;
    log::debug!("Access client configured for {}", config.base_url);

    Ok(config)
}

pub fn validate_config(config: &AccessClientConfig) -> Result<(), ServiceError> {
    // Check that the base URL is usable
    if config.base_url.is_empty() {
        return Err(ServiceError::Config("Base URL can't be empty".to_string()));
    }
    if !(config.base_url.starts_with("http://") || config.base_url.starts_with("https://")) {
        return Err(ServiceError::Config(format!(
            "Base URL must use http or https: {}",
            config.base_url
        )));
    }

    if let Some(path) = config.endpoints.all().into_iter().find(|p| !p.starts_with('/')) {
        return Err(ServiceError::Config(format!("Endpoint path must start with '/': {path}")));
    }

    if config.request_timeout_secs == 0 {
        return Err(ServiceError::Config("Request timeout must be at least 1 second".to_string()));
    }

    if config.retry.max_attempts == 0 {
        return Err(ServiceError::Config("Retry max_attempts must be at least 1".to_string()));
    }
    if !config.retry.multiplier.is_finite() || config.retry.multiplier < 1.0 {
        return Err(ServiceError::Config(format!(
            "Retry multiplier must be a finite number >= 1.0: {}",
            config.retry.multiplier
        )));
    }

    if config.recent_patients_capacity == 0 {
        return Err(ServiceError::Config(
            "Recent patients capacity must be at least 1".to_string(),
        ));
    }

    Ok(())
}
