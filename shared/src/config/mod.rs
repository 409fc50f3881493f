pub mod config;

pub use self::config::{TOKEN_KEY_LEN, load_config, validate_config};
