//! Session issuance, validation with sliding refresh, and revocation.
//!
//! Lifecycle per identity:
//!
//! ```text
//! Anonymous --issue--> Active --validate (past half-life)--> Refreshed --> Active
//!                        |                                       |
//!                        +--- revoke / expiry / newer login -----+--> Anonymous
//! ```
//!
//! The sealed token names the identity and carries an opaque proof value. The
//! registry remembers the proof value of the one live session per identity, so
//! logging in elsewhere, logging out, or refreshing kills every older token.

use std::fmt;
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use anyhow::{Context, Result};
use hyper::header::{HeaderMap, HeaderValue};
use thiserror::Error;
use tracing::{debug, error, info};

use shared::types::{Role, SessionToken};

use crate::database::utils::get_timestamp;
use crate::handlers::http::utils::headers::{get_cookie, set_cookie};
use crate::security::session_registry::SessionRegistry;
use crate::security::token_codec::{CodecError, TokenCodec};

/// Cookie carrying the sealed session token.
pub const SESSION_COOKIE: &str = "jwt";

/// Source of "now" in Unix seconds.
pub trait Clock: Send + Sync + fmt::Debug {
    fn now(&self) -> i64;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> i64 {
        get_timestamp()
    }
}

/// Why a request was not authenticated. Only ever logged; clients see one
/// uniform rejection.
#[derive(Debug, Error)]
pub enum Rejection {
    #[error("no session cookie")]
    MissingCookie,

    #[error("session cookie did not decode: {0}")]
    Undecodable(#[from] CodecError),

    #[error("no live session for this identity")]
    UnknownSession,

    #[error("session was superseded")]
    Superseded,

    #[error("session expired")]
    Expired,
}

/// A freshly sealed session, ready to be sent as a cookie.
#[derive(Debug, Clone)]
pub struct IssuedSession {
    pub identity: i64,
    pub role: Role,
    pub expiry: i64,
    pub token: String,
    pub set_cookie: HeaderValue,
}

/// Outcome of a successful validation.
#[derive(Debug, Clone)]
pub struct Authenticated {
    pub identity: i64,
    pub role: Role,
    pub expiry: i64,
    /// Present when validation slid the session forward; the caller must
    /// send `set_cookie` with its response.
    pub refreshed: Option<IssuedSession>,
}

#[derive(Clone, Debug)]
pub struct SessionManager {
    codec: TokenCodec,
    registry: SessionRegistry,
    lifetime_secs: i64,
    secure_cookies: bool,
    clock: Arc<dyn Clock>,
}

impl SessionManager {
    pub fn new(
        codec: TokenCodec,
        registry: SessionRegistry,
        lifetime: Duration,
        secure_cookies: bool,
    ) -> Self {
        Self::with_clock(codec, registry, lifetime, secure_cookies, Arc::new(SystemClock))
    }

    pub fn with_clock(
        codec: TokenCodec,
        registry: SessionRegistry,
        lifetime: Duration,
        secure_cookies: bool,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            codec,
            registry,
            lifetime_secs: lifetime.as_secs() as i64,
            secure_cookies,
            clock,
        }
    }

    pub fn registry(&self) -> &SessionRegistry {
        &self.registry
    }

    /// Start a session, replacing any session `identity` already had.
    pub async fn issue(&self, identity: i64, role: Role) -> Result<IssuedSession> {
        let (payload, issued) = self.seal(identity, role)?;
        self.registry.install(identity, payload.opaque).await;

        info!("Session issued for user {} ({})", identity, role);
        Ok(issued)
    }

    /// Authenticate the request carrying `headers`.
    pub async fn validate(&self, headers: &HeaderMap) -> std::result::Result<Authenticated, Rejection> {
        let token = get_cookie(headers, SESSION_COOKIE).ok_or(Rejection::MissingCookie)?;
        self.validate_token(&token).await
    }

    pub async fn validate_token(&self, token: &str) -> std::result::Result<Authenticated, Rejection> {
        let payload = self.codec.decode(token)?;

        if !self.registry.matches(payload.identity, &payload.opaque).await {
            return Err(match self.registry.current(payload.identity).await {
                Some(_) => Rejection::Superseded,
                None => Rejection::UnknownSession,
            });
        }

        let now = self.clock.now();
        if payload.is_expired_at(now) {
            self.registry
                .remove_if(payload.identity, &payload.opaque)
                .await;
            return Err(Rejection::Expired);
        }

        if payload.remaining_at(now) >= self.lifetime_secs / 2 {
            return Ok(Authenticated {
                identity: payload.identity,
                role: payload.role,
                expiry: payload.expiry,
                refreshed: None,
            });
        }

        // Past half-life: reissue. A failure to seal leaves the current,
        // still valid token in place.
        let (fresh, issued) = match self.seal(payload.identity, payload.role) {
            Ok(sealed) => sealed,
            Err(e) => {
                error!("Session refresh for user {} failed: {:#}", payload.identity, e);
                return Ok(Authenticated {
                    identity: payload.identity,
                    role: payload.role,
                    expiry: payload.expiry,
                    refreshed: None,
                });
            }
        };

        if !self
            .registry
            .rotate(payload.identity, &payload.opaque, fresh.opaque)
            .await
        {
            // Logged out or logged in elsewhere while we were sealing.
            return Err(Rejection::Superseded);
        }

        debug!(
            "Session refreshed for user {}: expiry {} -> {}",
            payload.identity, payload.expiry, issued.expiry
        );

        Ok(Authenticated {
            identity: payload.identity,
            role: payload.role,
            expiry: issued.expiry,
            refreshed: Some(issued),
        })
    }

    /// End the session for `identity`; returns the cookie that clears it.
    pub async fn revoke(&self, identity: i64) -> Result<HeaderValue> {
        if self.registry.remove(identity).await {
            info!("Session revoked for user {}", identity);
        }
        set_cookie(
            SESSION_COOKIE,
            "",
            Some(UNIX_EPOCH),
            Some("/"),
            true,
            self.secure_cookies,
        )
    }

    fn seal(&self, identity: i64, role: Role) -> Result<(SessionToken, IssuedSession)> {
        let expiry = self.clock.now() + self.lifetime_secs;
        let payload = SessionToken {
            identity,
            role,
            expiry,
            opaque: uuid::Uuid::new_v4().simple().to_string(),
        };

        let token = self
            .codec
            .encode(&payload)
            .context("Failed to seal session token")?;

        let set_cookie = set_cookie(
            SESSION_COOKIE,
            &token,
            Some(unix_to_system_time(expiry)),
            Some("/"),
            true,
            self.secure_cookies,
        )?;

        Ok((
            payload,
            IssuedSession {
                identity,
                role,
                expiry,
                token,
                set_cookie,
            },
        ))
    }
}

fn unix_to_system_time(secs: i64) -> SystemTime {
    UNIX_EPOCH + Duration::from_secs(secs.max(0) as u64)
}
