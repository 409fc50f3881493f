use std::fs;
use tracing::{debug, error, info};

use crate::types::server_config::{AppConfig, ConfigError};

/// Length in bytes of the session-cookie key once base64-decoded.
pub const TOKEN_KEY_LEN: usize = 32;

pub fn load_config(path: &str) -> Result<AppConfig, ConfigError> {
    info!("Loading configuration from: {}", path);

    let contents = fs::read_to_string(path)?;
    debug!("Processing file: {}", path);

    if contents.trim().is_empty() {
        error!("Configuration file is empty");
        return Err(ConfigError::InvalidConfig("empty file".into()));
    }

    let config: AppConfig = toml::from_str(&contents)?;

    info!("Configuration loaded successfully");

    validate_config(&config)?;

    info!("Config validated");

    Ok(config)
}

pub fn validate_config(config: &AppConfig) -> Result<(), ConfigError> {
    if config.auth.token_lifetime_minutes == 0 {
        return Err(ConfigError::InvalidConfig(
            "token_lifetime_minutes must be greater than 0".into(),
        ));
    }

    if config.database.path.trim().is_empty() {
        return Err(ConfigError::InvalidConfig(
            "database.path cannot be empty".into(),
        ));
    }

    if config.database.max_connections == 0 {
        return Err(ConfigError::InvalidConfig(
            "database.max_connections must be greater than 0".into(),
        ));
    }

    // The key itself is decoded by the server; only its shape is checked here
    // so a bad file is rejected before anything binds.
    if let Some(secret) = config.auth.resolved_token_secret() {
        let looks_base64 = secret
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '+' | '/' | '='));
        // 32 bytes encode to 44 base64 characters with padding.
        if !looks_base64 || secret.trim_end_matches('=').len() != 43 {
            return Err(ConfigError::InvalidConfig(format!(
                "token_secret must be base64 of exactly {} bytes",
                TOKEN_KEY_LEN
            )));
        }
    }

    if let Some(pepper) = config.auth.resolved_password_pepper() {
        if pepper.len() < 8 {
            return Err(ConfigError::InvalidConfig(
                "password_pepper must be at least 8 characters long".into(),
            ));
        }
    }

    Ok(())
}
