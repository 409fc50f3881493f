use sqlx::SqlitePool;
use tracing::{info, warn};

/// Current schema version.  Bump this whenever the schema changes and add a
/// corresponding migration arm in `run_migrations`.
const SCHEMA_VERSION: i64 = 1;

/// Initialize the database schema and run any pending migrations.
pub async fn create_tables(pool: &SqlitePool) -> Result<(), sqlx::Error> {
    create_schema(pool).await?;
    run_migrations(pool).await?;
    Ok(())
}

const SCHEMA: &[&str] = &[
    // role is one of 'user', 'moderator', 'admin'
    "CREATE TABLE IF NOT EXISTS users (
        userId     INTEGER  PRIMARY KEY AUTOINCREMENT,
        role       TEXT     NOT NULL DEFAULT 'user',
        registered DATETIME DEFAULT CURRENT_TIMESTAMP,
        username   TEXT     NOT NULL UNIQUE,
        email      TEXT     NOT NULL UNIQUE,
        password   TEXT     NOT NULL,
        fullname   TEXT     NOT NULL DEFAULT ''
    )",
    "CREATE TABLE IF NOT EXISTS categories (
        categoryId  INTEGER  PRIMARY KEY AUTOINCREMENT,
        created     DATETIME DEFAULT CURRENT_TIMESTAMP,
        name        TEXT     NOT NULL,
        description TEXT     NOT NULL
    )",
    // categories holds quoted ids, e.g. "1""2"
    "CREATE TABLE IF NOT EXISTS posts (
        postId     INTEGER  PRIMARY KEY AUTOINCREMENT,
        posted     DATETIME DEFAULT CURRENT_TIMESTAMP,
        userId     INTEGER  NOT NULL,
        title      TEXT     NOT NULL,
        text       TEXT     NOT NULL,
        categories TEXT     NOT NULL,
        status     INTEGER  NOT NULL DEFAULT 1,
        FOREIGN KEY (userId) REFERENCES users(userId)
    )",
    "CREATE TABLE IF NOT EXISTS reactions (
        reactionId INTEGER  PRIMARY KEY AUTOINCREMENT,
        reacted    DATETIME DEFAULT CURRENT_TIMESTAMP,
        postId     INTEGER  NOT NULL,
        userId     INTEGER  NOT NULL,
        reaction   TEXT     NOT NULL DEFAULT 'idle',
        UNIQUE (userId, postId, reaction),
        FOREIGN KEY (postId) REFERENCES posts(postId) ON DELETE CASCADE,
        FOREIGN KEY (userId) REFERENCES users(userId)
    )",
    "CREATE TABLE IF NOT EXISTS comments (
        commentId INTEGER  PRIMARY KEY AUTOINCREMENT,
        commented DATETIME DEFAULT CURRENT_TIMESTAMP,
        postId    INTEGER  NOT NULL,
        userId    INTEGER  NOT NULL,
        comment   TEXT     NOT NULL,
        FOREIGN KEY (postId) REFERENCES posts(postId) ON DELETE CASCADE,
        FOREIGN KEY (userId) REFERENCES users(userId)
    )",
    "CREATE TABLE IF NOT EXISTS comment_reactions (
        reactionId INTEGER  PRIMARY KEY AUTOINCREMENT,
        reacted    DATETIME DEFAULT CURRENT_TIMESTAMP,
        postId     INTEGER  NOT NULL,
        commentId  INTEGER  NOT NULL,
        userId     INTEGER  NOT NULL,
        reaction   TEXT     NOT NULL DEFAULT 'idle',
        UNIQUE (userId, commentId, reaction),
        FOREIGN KEY (commentId) REFERENCES comments(commentId) ON DELETE CASCADE
    )",
    // --- Indexes ------------------------------------------------------------
    "CREATE INDEX IF NOT EXISTS idx_posts_user_id     ON posts(userId)",
    "CREATE INDEX IF NOT EXISTS idx_posts_status      ON posts(status)",
    "CREATE INDEX IF NOT EXISTS idx_reactions_post_id ON reactions(postId)",
    "CREATE INDEX IF NOT EXISTS idx_comments_post_id  ON comments(postId)",
];

/// Create all tables for a brand-new database.
async fn create_schema(pool: &SqlitePool) -> Result<(), sqlx::Error> {
    let mut tx = pool.begin().await?;
    for statement in SCHEMA {
        sqlx::query(statement).execute(&mut *tx).await?;
    }
    tx.commit().await?;

    info!("Database schema ready");
    Ok(())
}

async fn schema_version(pool: &SqlitePool) -> Result<i64, sqlx::Error> {
    sqlx::query_scalar("PRAGMA user_version")
        .fetch_one(pool)
        .await
}

/// Bring an existing database up to `SCHEMA_VERSION`.
async fn run_migrations(pool: &SqlitePool) -> Result<(), sqlx::Error> {
    let version = schema_version(pool).await?;

    if version > SCHEMA_VERSION {
        warn!(
            "Database schema version {} is newer than this server ({})",
            version, SCHEMA_VERSION
        );
        return Ok(());
    }

    if version < 1 {
        info!("Migrating database schema to version 1: default categories");
        let mut tx = pool.begin().await?;
        for (name, description) in [
            ("golang", "This category is for gophers!"),
            ("js", "JavaScript is a mother of all web devs!"),
        ] {
            sqlx::query("INSERT INTO categories (name, description) VALUES (?1, ?2)")
                .bind(name)
                .bind(description)
                .execute(&mut *tx)
                .await?;
        }
        sqlx::query("PRAGMA user_version = 1")
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;
    }

    Ok(())
}
