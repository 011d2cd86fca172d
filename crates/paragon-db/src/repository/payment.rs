//! # Payment Label Repository
//!
//! Maps free-text payment labels printed on receipts ("Karta VISA ****1234")
//! to household members, and keeps the list of labels to ignore.
//!
//! ```text
//!  label ──► ignored_payment_names? ──yes──► skip receipt
//!    │
//!    └──► user_payments ──found──► member
//!             │
//!             └── missing ──► unassigned (receipt keeps the literal label)
//! ```

use paragon_core::{UnassignedPayment, User};
use sqlx::SqlitePool;
use tracing::{debug, info};

use crate::error::{DbError, DbResult};

/// Repository for payment label mappings and the ignore list.
#[derive(Debug, Clone)]
pub struct PaymentRepository {
    pool: SqlitePool,
}

impl PaymentRepository {
    /// Creates a new PaymentRepository.
    pub fn new(pool: SqlitePool) -> Self {
        PaymentRepository { pool }
    }

    // =========================================================================
    // Mappings
    // =========================================================================

    /// Looks up the member a label belongs to. `None` is not an error.
    pub async fn find_user_for_payment(&self, payment_name: &str) -> DbResult<Option<User>> {
        let user = sqlx::query_as::<_, User>(
            r#"
            SELECT u.user_id, u.name, u.is_other
            FROM user_payments up
            JOIN users u ON u.user_id = up.user_id
            WHERE up.payment_name = ?1
            "#,
        )
        .bind(payment_name)
        .fetch_optional(&self.pool)
        .await?;
        Ok(user)
    }

    /// Records a label → member mapping if none exists yet.
    ///
    /// ## Returns
    /// The owner of the label after the call. When another writer mapped the
    /// label first, that existing owner is returned and nothing changes.
    ///
    /// ## Errors
    /// * `NotFound` - `user_id` does not exist
    pub async fn insert_user_payment(&self, payment_name: &str, user_id: i64) -> DbResult<i64> {
        debug!(payment_name = %payment_name, user_id, "Recording payment mapping");

        sqlx::query(
            r#"
            INSERT INTO user_payments (payment_name, user_id) VALUES (?1, ?2)
            ON CONFLICT (payment_name) DO NOTHING
            "#,
        )
        .bind(payment_name)
        .bind(user_id)
        .execute(&self.pool)
        .await
        .map_err(|e| match DbError::from(e) {
            DbError::ForeignKeyViolation { .. } => DbError::not_found("User", user_id.to_string()),
            other => other,
        })?;

        let owner: i64 =
            sqlx::query_scalar("SELECT user_id FROM user_payments WHERE payment_name = ?1")
                .bind(payment_name)
                .fetch_one(&self.pool)
                .await?;
        Ok(owner)
    }

    /// Assigns (or reassigns) a label and updates the `not_our_receipt` flag
    /// of every receipt carrying it.
    ///
    /// ## Returns
    /// Number of receipts whose flag was rewritten.
    pub async fn assign_payment(&self, payment_name: &str, user_id: i64) -> DbResult<u64> {
        let mut tx = self.pool.begin().await?;

        let is_other: Option<bool> =
            sqlx::query_scalar("SELECT is_other FROM users WHERE user_id = ?1")
                .bind(user_id)
                .fetch_optional(&mut *tx)
                .await?;
        let is_other = is_other.ok_or_else(|| DbError::not_found("User", user_id.to_string()))?;

        sqlx::query(
            r#"
            INSERT INTO user_payments (payment_name, user_id) VALUES (?1, ?2)
            ON CONFLICT (payment_name) DO UPDATE SET user_id = excluded.user_id
            "#,
        )
        .bind(payment_name)
        .bind(user_id)
        .execute(&mut *tx)
        .await?;

        let updated = sqlx::query(
            r#"
            UPDATE receipts SET
                not_our_receipt = ?2,
                updated_at = strftime('%Y-%m-%dT%H:%M:%fZ', 'now')
            WHERE payment_name = ?1
            "#,
        )
        .bind(payment_name)
        .bind(is_other)
        .execute(&mut *tx)
        .await?
        .rows_affected();

        tx.commit().await?;

        info!(payment_name = %payment_name, user_id, receipts = updated, "Payment label assigned");
        Ok(updated)
    }

    /// Labels on live receipts that have no mapping and are not ignored.
    pub async fn unassigned_payment_names(&self) -> DbResult<Vec<UnassignedPayment>> {
        let rows = sqlx::query_as::<_, UnassignedPayment>(
            r#"
            SELECT r.payment_name AS payment_name, COUNT(*) AS receipt_count
            FROM receipts r
            LEFT JOIN user_payments up ON up.payment_name = r.payment_name
            WHERE r.payment_name IS NOT NULL
              AND r.payment_name <> ''
              AND r.deleted_at IS NULL
              AND up.payment_name IS NULL
              AND r.payment_name NOT IN (SELECT payment_name FROM ignored_payment_names)
            GROUP BY r.payment_name
            ORDER BY r.payment_name
            "#,
        )
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    // =========================================================================
    // Ignore List
    // =========================================================================

    /// Returns true if receipts paid with this label are skipped.
    pub async fn is_ignored(&self, payment_name: &str) -> DbResult<bool> {
        let hit: Option<i64> =
            sqlx::query_scalar("SELECT 1 FROM ignored_payment_names WHERE payment_name = ?1")
                .bind(payment_name)
                .fetch_optional(&self.pool)
                .await?;
        Ok(hit.is_some())
    }

    /// Adds a label to the ignore list. Returns false if it was already there.
    pub async fn add_ignored(&self, payment_name: &str) -> DbResult<bool> {
        let result = sqlx::query(
            "INSERT INTO ignored_payment_names (payment_name) VALUES (?1) \
             ON CONFLICT (payment_name) DO NOTHING",
        )
        .bind(payment_name)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Removes a label from the ignore list. Returns false if it was absent.
    pub async fn remove_ignored(&self, payment_name: &str) -> DbResult<bool> {
        let result = sqlx::query("DELETE FROM ignored_payment_names WHERE payment_name = ?1")
            .bind(payment_name)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Lists ignored labels alphabetically.
    pub async fn list_ignored(&self) -> DbResult<Vec<String>> {
        let names: Vec<String> = sqlx::query_scalar(
            "SELECT payment_name FROM ignored_payment_names ORDER BY payment_name",
        )
        .fetch_all(&self.pool)
        .await?;
        Ok(names)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{Database, DbConfig};

    async fn db_with_members() -> (Database, User, User) {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let ania = db.users().add_user("Ania").await.unwrap();
        let other = db.users().ensure_other_user().await.unwrap();
        (db, ania, other)
    }

    async fn insert_receipt_with_label(db: &Database, number: &str, label: &str) {
        let store_id: i64 = sqlx::query_scalar(
            "INSERT INTO stores (store_name) VALUES ('S') \
             ON CONFLICT (store_name, store_address, postal_code) DO UPDATE SET store_city = '' \
             RETURNING store_id",
        )
        .fetch_one(db.pool())
        .await
        .unwrap();

        sqlx::query(
            "INSERT INTO receipts (store_id, receipt_number, date, time, payment_name) \
             VALUES (?1, ?2, '2024-05-01', '10:00:00', ?3)",
        )
        .bind(store_id)
        .bind(number)
        .bind(label)
        .execute(db.pool())
        .await
        .unwrap();
    }

    #[tokio::test]
    async fn test_mapping_lookup_and_idempotent_insert() {
        let (db, ania, other) = db_with_members().await;
        let payments = db.payments();

        assert_eq!(payments.find_user_for_payment("Karta").await.unwrap(), None);

        let owner = payments.insert_user_payment("Karta", ania.user_id).await.unwrap();
        assert_eq!(owner, ania.user_id);

        // A second writer loses and gets the existing owner back.
        let owner = payments.insert_user_payment("Karta", other.user_id).await.unwrap();
        assert_eq!(owner, ania.user_id);

        assert_eq!(payments.find_user_for_payment("Karta").await.unwrap(), Some(ania));
    }

    #[tokio::test]
    async fn test_mapping_to_unknown_user_is_not_found() {
        let (db, _, _) = db_with_members().await;
        assert!(matches!(
            db.payments().insert_user_payment("Karta", 999).await,
            Err(DbError::NotFound { .. })
        ));
        assert!(matches!(
            db.payments().assign_payment("Karta", 999).await,
            Err(DbError::NotFound { .. })
        ));
    }

    #[tokio::test]
    async fn test_ignore_list() {
        let (db, _, _) = db_with_members().await;
        let payments = db.payments();

        assert!(!payments.is_ignored("Bon").await.unwrap());
        assert!(payments.add_ignored("Bon").await.unwrap());
        assert!(!payments.add_ignored("Bon").await.unwrap());
        assert!(payments.is_ignored("Bon").await.unwrap());
        assert_eq!(payments.list_ignored().await.unwrap(), ["Bon"]);

        assert!(payments.remove_ignored("Bon").await.unwrap());
        assert!(!payments.remove_ignored("Bon").await.unwrap());
        assert!(!payments.is_ignored("Bon").await.unwrap());
    }

    #[tokio::test]
    async fn test_unassigned_list_and_assignment() {
        let (db, ania, other) = db_with_members().await;
        let payments = db.payments();

        insert_receipt_with_label(&db, "1", "Karta A").await;
        insert_receipt_with_label(&db, "2", "Karta A").await;
        insert_receipt_with_label(&db, "3", "Karta B").await;
        insert_receipt_with_label(&db, "4", "Bon").await;
        payments.add_ignored("Bon").await.unwrap();
        payments.insert_user_payment("Karta B", ania.user_id).await.unwrap();

        let unassigned = payments.unassigned_payment_names().await.unwrap();
        assert_eq!(
            unassigned,
            vec![UnassignedPayment {
                payment_name: "Karta A".into(),
                receipt_count: 2
            }]
        );

        let flagged = payments.assign_payment("Karta A", other.user_id).await.unwrap();
        assert_eq!(flagged, 2);
        assert!(payments.unassigned_payment_names().await.unwrap().is_empty());

        let not_ours: i64 =
            sqlx::query_scalar("SELECT COUNT(*) FROM receipts WHERE not_our_receipt = 1")
                .fetch_one(db.pool())
                .await
                .unwrap();
        assert_eq!(not_ours, 2);

        // Reassigning to a household member clears the flag again.
        payments.assign_payment("Karta A", ania.user_id).await.unwrap();
        let not_ours: i64 =
            sqlx::query_scalar("SELECT COUNT(*) FROM receipts WHERE not_our_receipt = 1")
                .fetch_one(db.pool())
                .await
                .unwrap();
        assert_eq!(not_ours, 0);
    }
}
