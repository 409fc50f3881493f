use sqlx::SqlitePool;
use tracing::info;

use shared::types::Role;

use crate::database::mapper::{
    Descriptor, Executed, FromRecord, MapperError, Param, Record, exec_with_guard, query_one,
};

#[derive(Debug, Clone)]
pub struct NewUser {
    pub username: String,
    pub email: String,
    pub fullname: String,
    pub password_hash: String,
}

/// What login needs to know about a user. Never leaves the server.
#[derive(Debug, Clone)]
pub struct Credentials {
    pub user_id: i64,
    pub role: Role,
    pub password_hash: String,
}

impl Credentials {
    fn descriptor() -> Descriptor {
        Descriptor::new()
            .integer("userId")
            .text("role")
            .text("password")
    }
}

impl FromRecord for Credentials {
    fn from_record(mut record: Record) -> Result<Self, MapperError> {
        let role = record.take_string("role")?;
        Ok(Self {
            user_id: record.take_i64("userId")?,
            role: role.parse().map_err(|e| MapperError::Decode {
                field: "role".to_string(),
                reason: format!("{}", e),
            })?,
            password_hash: record.take_string("password")?,
        })
    }
}

/// Insert a user unless `abort` holds. Duplicate usernames or emails come
/// back as [`MapperError::Conflict`] naming the column.
pub async fn register_user(
    pool: &SqlitePool,
    new_user: &NewUser,
    abort: bool,
) -> Result<i64, MapperError> {
    let Executed { last_insert_id, .. } = exec_with_guard(
        pool,
        "INSERT INTO users (email, username, fullname, password) VALUES (?1, ?2, ?3, ?4)",
        &[
            Param::from(new_user.email.as_str()),
            Param::from(new_user.username.as_str()),
            Param::from(new_user.fullname.as_str()),
            Param::from(new_user.password_hash.as_str()),
        ],
        abort,
    )
    .await?;

    info!("New user registered: {} (ID: {})", new_user.username, last_insert_id);
    Ok(last_insert_id)
}

pub async fn find_credentials(
    pool: &SqlitePool,
    username: &str,
) -> Result<Option<Credentials>, MapperError> {
    query_one(
        pool,
        &Credentials::descriptor(),
        "SELECT userId, role, password FROM users WHERE username = ?1",
        &[Param::from(username)],
    )
    .await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::open;
    use shared::types::server_config::DatabaseConfig;

    fn bob() -> NewUser {
        NewUser {
            username: "bob".into(),
            email: "bob@example.com".into(),
            fullname: "Bob B".into(),
            password_hash: "$argon2id$stub".into(),
        }
    }

    async fn pool(dir: &tempfile::TempDir) -> SqlitePool {
        open(&DatabaseConfig {
            path: dir.path().join("users.db").to_string_lossy().into_owned(),
            ..DatabaseConfig::default()
        })
        .await
        .unwrap()
    }

    #[tokio::test]
    async fn registered_user_can_be_found() {
        let dir = tempfile::tempdir().unwrap();
        let pool = pool(&dir).await;

        let id = register_user(&pool, &bob(), false).await.unwrap();
        let creds = find_credentials(&pool, "bob").await.unwrap().unwrap();
        assert_eq!(creds.user_id, id);
        assert_eq!(creds.role, Role::User);
        assert_eq!(creds.password_hash, "$argon2id$stub");

        assert!(find_credentials(&pool, "nobody").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn duplicates_name_the_violated_column() {
        let dir = tempfile::tempdir().unwrap();
        let pool = pool(&dir).await;
        register_user(&pool, &bob(), false).await.unwrap();

        let same_email = NewUser {
            username: "robert".into(),
            ..bob()
        };
        let err = register_user(&pool, &same_email, false).await.unwrap_err();
        assert_eq!(err.conflict_target(), Some("users.email"));

        let same_name = NewUser {
            email: "other@example.com".into(),
            ..bob()
        };
        let err = register_user(&pool, &same_name, false).await.unwrap_err();
        assert_eq!(err.conflict_target(), Some("users.username"));
    }

    #[tokio::test]
    async fn aborted_registration_leaves_no_user() {
        let dir = tempfile::tempdir().unwrap();
        let pool = pool(&dir).await;

        let err = register_user(&pool, &bob(), true).await.unwrap_err();
        assert!(matches!(err, MapperError::Aborted));
        assert!(find_credentials(&pool, "bob").await.unwrap().is_none());
    }
}
