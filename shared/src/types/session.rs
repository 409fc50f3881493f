use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Coarse-grained capability tag carried by every session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Moderator,
    Admin,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::User => "user",
            Self::Moderator => "moderator",
            Self::Admin => "admin",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnknownRole(pub String);

impl fmt::Display for UnknownRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "unknown role: {}", self.0)
    }
}

impl std::error::Error for UnknownRole {}

impl FromStr for Role {
    type Err = UnknownRole;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "user" => Ok(Self::User),
            "moderator" => Ok(Self::Moderator),
            "admin" => Ok(Self::Admin),
            other => Err(UnknownRole(other.to_string())),
        }
    }
}

/// Payload sealed inside the `jwt` cookie.
///
/// The cookie is *not* a JSON Web Token; the name is kept for front-end
/// compatibility. The payload is JSON, encrypted and authenticated with the
/// server's key, so clients can neither read nor forge it.
///
/// `opaque` is the revocation handle: the server keeps the current value per
/// identity in memory, and a token whose `opaque` no longer matches is dead
/// even before `expiry`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionToken {
    /// Numeric user ID (matches `users.userId`).
    pub identity: i64,

    pub role: Role,

    /// Unix timestamp (seconds) after which the token is rejected.
    pub expiry: i64,

    /// Random per-issuance proof value.
    pub opaque: String,
}

impl SessionToken {
    pub fn is_expired_at(&self, now: i64) -> bool {
        now >= self.expiry
    }

    pub fn remaining_at(&self, now: i64) -> i64 {
        self.expiry - now
    }
}
