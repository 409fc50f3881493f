use serde::Deserialize;
use thiserror::Error;

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("TOML parse error: {0}")]
    TomlParse(#[from] toml::de::Error),
}

// ---------------------------------------------------------------------------
// Config structs
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    #[serde(default = "default_bind")]
    pub bind: String,
    #[serde(default = "default_port")]
    pub port: u16,
    /// Origin echoed in `Access-Control-Allow-Origin` for the browser front-end.
    #[serde(default = "default_allowed_origin")]
    pub allowed_origin: String,
}

#[derive(Debug, Deserialize, Clone)]
pub struct AuthConfig {
    #[serde(default = "default_token_lifetime")]
    pub token_lifetime_minutes: u64,
    /// Base64 of the 32-byte key sealing session cookies.
    ///
    /// Prefer the `TOKEN_SECRET` environment variable. When neither is set the
    /// server generates a random key at startup, which is fine because sessions
    /// never outlive the process anyway.
    pub token_secret: Option<String>,
    /// Static pepper mixed into every password hash. `PASSWORD_PEPPER` wins.
    ///
    /// **Not hot-swappable:** changing it invalidates every stored password.
    pub password_pepper: Option<String>,
    /// Adds the `Secure` attribute to the session cookie.
    #[serde(default)]
    pub secure_cookies: bool,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DatabaseConfig {
    #[serde(default = "default_database_path")]
    pub path: String,
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
    #[serde(default = "default_acquire_timeout")]
    pub acquire_timeout_secs: u64,
    #[serde(default = "default_busy_timeout")]
    pub busy_timeout_secs: u64,
}

#[derive(Debug, Deserialize, Clone, Default)]
pub struct AppConfig {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub auth: AuthConfig,
    #[serde(default)]
    pub database: DatabaseConfig,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
            port: default_port(),
            allowed_origin: default_allowed_origin(),
        }
    }
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            token_lifetime_minutes: default_token_lifetime(),
            token_secret: None,
            password_pepper: None,
            secure_cookies: false,
        }
    }
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: default_database_path(),
            max_connections: default_max_connections(),
            acquire_timeout_secs: default_acquire_timeout(),
            busy_timeout_secs: default_busy_timeout(),
        }
    }
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

impl ServerConfig {
    /// Full bind address, e.g. `"127.0.0.1:8080"`.
    ///
    /// `PORT` in the environment overrides the configured port so the server
    /// can run on hosts that assign one.
    pub fn addr(&self) -> String {
        let port = std::env::var("PORT")
            .ok()
            .and_then(|p| p.parse::<u16>().ok())
            .unwrap_or(self.port);
        format!("{}:{}", self.bind, port)
    }
}

impl AuthConfig {
    /// Token lifetime in seconds. The cookie uses the same lifetime.
    pub fn token_lifetime_secs(&self) -> u64 {
        self.token_lifetime_minutes * 60
    }

    /// Resolve the token key, `TOKEN_SECRET` taking priority over the file.
    pub fn resolved_token_secret(&self) -> Option<String> {
        std::env::var("TOKEN_SECRET")
            .ok()
            .filter(|s| !s.is_empty())
            .or_else(|| self.token_secret.clone())
            .filter(|s| !s.is_empty())
    }

    /// Resolve the password pepper, `PASSWORD_PEPPER` taking priority.
    pub fn resolved_password_pepper(&self) -> Option<String> {
        std::env::var("PASSWORD_PEPPER")
            .ok()
            .filter(|s| !s.is_empty())
            .or_else(|| self.password_pepper.clone())
            .filter(|s| !s.is_empty())
    }
}

// ---------------------------------------------------------------------------
// Serde defaults
// ---------------------------------------------------------------------------

pub fn default_bind() -> String {
    "127.0.0.1".to_string()
}

pub fn default_port() -> u16 {
    8080
}

pub fn default_allowed_origin() -> String {
    "http://localhost:5000".to_string()
}

pub fn default_token_lifetime() -> u64 {
    60
}

pub fn default_database_path() -> String {
    "database.db".to_string()
}

pub fn default_max_connections() -> u32 {
    8
}

pub fn default_acquire_timeout() -> u64 {
    5
}

pub fn default_busy_timeout() -> u64 {
    5
}
