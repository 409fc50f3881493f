pub mod password;
pub mod session;
pub mod session_registry;
pub mod token_codec;

pub use password::CredentialHasher;
pub use session::{Authenticated, IssuedSession, Rejection, SESSION_COOKIE, SessionManager};
pub use session_registry::SessionRegistry;
pub use token_codec::{CodecError, TokenCodec};
