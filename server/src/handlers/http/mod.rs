pub mod auth;
pub mod posts;
pub mod routes;
pub mod utils;
