pub mod json_error;
pub mod login;
pub mod post;
pub mod register;
pub mod server_config;
pub mod session;

pub use self::json_error::ErrorResponse;
pub use self::login::{LoginData, LoginError, LoginResponse};
pub use self::post::{NewComment, NewPost, Reaction, ReactionData, UpdatePost};
pub use self::register::{RegistrationData, ValidationReport};
pub use self::server_config::{AppConfig, ConfigError};
pub use self::session::{Role, SessionToken, UnknownRole};
