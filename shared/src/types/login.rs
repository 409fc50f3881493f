use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Login wire types
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
pub struct LoginData {
    pub username: String,
    pub password: String,
}

/// Successful login response body. The token itself only travels in the
/// HTTP-only cookie.
#[derive(Debug, Serialize)]
pub struct LoginResponse {
    pub user_id: i64,
    pub role: String,
    pub expires_at: i64,
}

// ---------------------------------------------------------------------------
// Login errors
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoginError {
    UnknownUser,
    WrongPassword,
}

impl LoginError {
    pub fn to_code(&self) -> &'static str {
        match self {
            Self::UnknownUser => "USER_NOT_FOUND",
            Self::WrongPassword => "INVALID_CREDENTIALS",
        }
    }

    pub fn to_message(&self) -> &'static str {
        match self {
            Self::UnknownUser => "User not found",
            Self::WrongPassword => "Invalid username or password",
        }
    }
}
