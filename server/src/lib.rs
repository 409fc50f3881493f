pub mod database;
pub mod handlers;
pub mod security;

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use sqlx::SqlitePool;
use tracing::{info, warn};

use shared::types::AppConfig;

use crate::security::{CredentialHasher, SessionManager, SessionRegistry, TokenCodec};

/// Everything a request handler can reach. Cheap to clone.
#[derive(Clone, Debug)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    pub db: SqlitePool,
    pub sessions: SessionManager,
    pub hasher: CredentialHasher,
}

impl AppState {
    /// Open the database and build the security components from `config`.
    pub async fn build(config: AppConfig) -> Result<Self> {
        let db = database::open(&config.database)
            .await
            .with_context(|| format!("Failed to open database {}", config.database.path))?;

        Self::with_pool(config, db)
    }

    pub fn with_pool(config: AppConfig, db: SqlitePool) -> Result<Self> {
        let codec = match config.auth.resolved_token_secret() {
            Some(secret) => {
                TokenCodec::from_base64_key(&secret).context("Invalid token secret")?
            }
            None => {
                warn!("No token secret configured; using a random key for this run");
                TokenCodec::random()
            }
        };

        let pepper = config.auth.resolved_password_pepper().unwrap_or_else(|| {
            warn!("No password pepper configured; hashing without one");
            String::new()
        });

        let sessions = SessionManager::new(
            codec,
            SessionRegistry::new(),
            Duration::from_secs(config.auth.token_lifetime_secs()),
            config.auth.secure_cookies,
        );

        info!(
            "Sessions last {} minutes",
            config.auth.token_lifetime_minutes
        );

        Ok(Self {
            config: Arc::new(config),
            db,
            sessions,
            hasher: CredentialHasher::new(pepper),
        })
    }

    /// Forget all sessions and close the pool.
    pub async fn shutdown(&self) {
        self.sessions.registry().clear().await;
        self.db.close().await;
        info!("Sessions cleared and database closed");
    }
}
