//! # User Repository
//!
//! The household directory: named members plus one sentinel "Other" member
//! for receipts paid by someone outside the household.

use paragon_core::{User, OTHER_MEMBER_NAME};
use sqlx::SqlitePool;
use tracing::{debug, info};

use crate::error::{DbError, DbResult};

/// Repository for household members.
#[derive(Debug, Clone)]
pub struct UserRepository {
    pool: SqlitePool,
}

impl UserRepository {
    /// Creates a new UserRepository.
    pub fn new(pool: SqlitePool) -> Self {
        UserRepository { pool }
    }

    /// Lists members, named members first and the "Other" member last.
    pub async fn list_users(&self) -> DbResult<Vec<User>> {
        let users = sqlx::query_as::<_, User>(
            "SELECT user_id, name, is_other FROM users ORDER BY is_other, user_id",
        )
        .fetch_all(&self.pool)
        .await?;
        Ok(users)
    }

    /// Gets a member by ID.
    pub async fn get_by_id(&self, user_id: i64) -> DbResult<Option<User>> {
        let user = sqlx::query_as::<_, User>(
            "SELECT user_id, name, is_other FROM users WHERE user_id = ?1",
        )
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(user)
    }

    /// Adds a named household member.
    ///
    /// ## Errors
    /// * `UniqueViolation` - The name is taken
    /// * `ConstraintViolation` - The name is blank
    pub async fn add_user(&self, name: &str) -> DbResult<User> {
        let name = name.trim();
        debug!(name = %name, "Adding household member");

        let user = sqlx::query_as::<_, User>(
            "INSERT INTO users (name, is_other) VALUES (?1, 0) RETURNING user_id, name, is_other",
        )
        .bind(name)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| match DbError::from(e) {
            DbError::UniqueViolation { field, .. } => DbError::duplicate(field, name),
            other => other,
        })?;

        Ok(user)
    }

    /// Returns the "Other" member, creating it on first use.
    ///
    /// Safe to call on every start-up.
    pub async fn ensure_other_user(&self) -> DbResult<User> {
        let result = sqlx::query(
            r#"
            INSERT INTO users (name, is_other)
            SELECT ?1, 1
            WHERE NOT EXISTS (SELECT 1 FROM users WHERE is_other = 1)
            "#,
        )
        .bind(OTHER_MEMBER_NAME)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() > 0 {
            info!(name = OTHER_MEMBER_NAME, "Created sentinel member");
        }

        self.get_other()
            .await?
            .ok_or_else(|| DbError::not_found("User", OTHER_MEMBER_NAME))
    }

    /// Returns the "Other" member if it exists.
    pub async fn get_other(&self) -> DbResult<Option<User>> {
        let user = sqlx::query_as::<_, User>(
            "SELECT user_id, name, is_other FROM users WHERE is_other = 1",
        )
        .fetch_optional(&self.pool)
        .await?;
        Ok(user)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{Database, DbConfig};

    #[tokio::test]
    async fn test_other_member_listed_last() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let users = db.users();

        let other = users.ensure_other_user().await.unwrap();
        users.add_user("Ania").await.unwrap();
        users.add_user(" Tomek ").await.unwrap();

        let names: Vec<String> = users
            .list_users()
            .await
            .unwrap()
            .into_iter()
            .map(|u| u.name)
            .collect();
        assert_eq!(names, ["Ania", "Tomek", OTHER_MEMBER_NAME]);
        assert!(other.is_other);
    }

    #[tokio::test]
    async fn test_ensure_other_is_idempotent() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let first = db.users().ensure_other_user().await.unwrap();
        let second = db.users().ensure_other_user().await.unwrap();
        assert_eq!(first, second);
        assert_eq!(db.users().list_users().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_duplicate_and_blank_names_rejected() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        db.users().add_user("Ania").await.unwrap();

        assert!(matches!(
            db.users().add_user("Ania").await,
            Err(DbError::UniqueViolation { value, .. }) if value == "Ania"
        ));
        assert!(matches!(
            db.users().add_user("  ").await,
            Err(DbError::ConstraintViolation { .. })
        ));
    }

    #[tokio::test]
    async fn test_get_by_id() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let ania = db.users().add_user("Ania").await.unwrap();
        assert_eq!(db.users().get_by_id(ania.user_id).await.unwrap(), Some(ania));
        assert_eq!(db.users().get_by_id(42).await.unwrap(), None);
    }
}
