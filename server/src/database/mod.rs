pub mod categories;
pub mod create;
pub mod mapper;
pub mod posts;
pub mod users;
pub mod utils;

use std::time::Duration;

use sqlx::SqlitePool;
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions};
use tracing::info;

use shared::types::server_config::DatabaseConfig;

pub use mapper::{
    Descriptor, Executed, FromRecord, MapperError, Param, Record, Value, exec_all_with_guard,
    exec_with_guard, exists, query_many, query_one,
};

/// Open the connection pool described by `config`, creating the file if needed.
pub async fn connect(config: &DatabaseConfig) -> Result<SqlitePool, sqlx::Error> {
    let options = SqliteConnectOptions::new()
        .filename(&config.path)
        .create_if_missing(true)
        .foreign_keys(true)
        .journal_mode(SqliteJournalMode::Wal)
        .busy_timeout(Duration::from_secs(config.busy_timeout_secs));

    let pool = SqlitePoolOptions::new()
        .max_connections(config.max_connections)
        .acquire_timeout(Duration::from_secs(config.acquire_timeout_secs))
        .connect_with(options)
        .await?;

    info!(
        "Database pool open: {} (max {} connections)",
        config.path, config.max_connections
    );
    Ok(pool)
}

/// [`connect`] plus schema bootstrap.
pub async fn open(config: &DatabaseConfig) -> Result<SqlitePool, sqlx::Error> {
    let pool = connect(config).await?;
    create::create_tables(&pool).await?;
    Ok(pool)
}
