//! Access gate
//!
//! Verifies credentials against the users table and manages accounts.
//! Passwords are stored salted and hashed (see `imgq_common::password`).

use imgq_common::password::{generate_salt, hash_password, verify_password};
use imgq_common::time::{now, parse_storage, to_storage};
use imgq_common::uuid_utils::generate_id;
use imgq_common::{Error, Identity, Result, Role, User};
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqlitePool};
use tracing::{info, warn};

fn user_from_row(row: &SqliteRow) -> Result<User> {
    let role: String = row.try_get("role")?;
    let created_at: String = row.try_get("created_at")?;
    Ok(User {
        id: row.try_get("id")?,
        username: row.try_get("username")?,
        role: role.parse()?,
        created_at: parse_storage(&created_at, "users.created_at")?,
    })
}

/// Access gate service
#[derive(Clone)]
pub struct AccessGate {
    db: SqlitePool,
}

impl AccessGate {
    pub fn new(db: SqlitePool) -> Self {
        Self { db }
    }

    /// Verify a username/password pair
    ///
    /// Unknown user and wrong password are indistinguishable to the caller.
    pub async fn authenticate(&self, username: &str, password: &str) -> Result<Identity> {
        let row = sqlx::query(
            "SELECT id, username, role, password_hash, password_salt FROM users WHERE username = ?",
        )
        .bind(username)
        .fetch_optional(&self.db)
        .await?;

        let Some(row) = row else {
            warn!("Login attempt for unknown user '{}'", username);
            return Err(Error::Unauthenticated("Invalid credentials".to_string()));
        };

        let hash: String = row.try_get("password_hash")?;
        let salt: String = row.try_get("password_salt")?;
        if !verify_password(password, &salt, &hash) {
            warn!("Wrong password for user '{}'", username);
            return Err(Error::Unauthenticated("Invalid credentials".to_string()));
        }

        let role: String = row.try_get("role")?;
        Ok(Identity {
            user_id: row.try_get("id")?,
            username: row.try_get("username")?,
            role: role.parse()?,
        })
    }

    /// Create an account
    ///
    /// Fails with `Conflict` when the username is taken.
    pub async fn create_user(&self, username: &str, password: &str, role: Role) -> Result<User> {
        let username = username.trim();
        if username.is_empty() {
            return Err(Error::InvalidPayload("Username must not be empty".to_string()));
        }
        if password.is_empty() {
            return Err(Error::InvalidPayload("Password must not be empty".to_string()));
        }

        let salt = generate_salt();
        let user = User {
            id: generate_id(),
            username: username.to_string(),
            role,
            created_at: now(),
        };

        sqlx::query(
            r#"
            INSERT INTO users (id, username, password_hash, password_salt, role, created_at)
            VALUES (?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&user.id)
        .bind(&user.username)
        .bind(hash_password(password, &salt))
        .bind(&salt)
        .bind(role.as_str())
        .bind(to_storage(&user.created_at))
        .execute(&self.db)
        .await
        .map_err(|e| Error::from_write(e, &format!("User '{}'", username)))?;

        info!("Created {} account '{}'", role, user.username);
        Ok(user)
    }

    /// Look up an account by id
    pub async fn get_user(&self, user_id: &str) -> Result<User> {
        let row = sqlx::query("SELECT id, username, role, created_at FROM users WHERE id = ?")
            .bind(user_id)
            .fetch_optional(&self.db)
            .await?;
        match row {
            Some(row) => user_from_row(&row),
            None => Err(Error::NotFound(format!("User {}", user_id))),
        }
    }

    /// Every account, in creation order
    pub async fn list_users(&self) -> Result<Vec<User>> {
        let rows = sqlx::query(
            "SELECT id, username, role, created_at FROM users ORDER BY created_at, rowid",
        )
        .fetch_all(&self.db)
        .await?;
        rows.iter().map(user_from_row).collect()
    }
}
