//! # Store Repository
//!
//! Stores are keyed by `(store_name, store_address, postal_code)`. The city is
//! the only mutable column and is refreshed on every upsert.
//!
//! ```text
//!  upsert("BIEDRONKA", "UL. PIĄTKOWSKA 78C", "60-649", city "POZNAŃ")
//!        │
//!        ├── new triple       → INSERT, new store_id
//!        └── existing triple  → UPDATE store_city, same store_id
//! ```

use paragon_core::{Store, StoreInfo};
use sqlx::{SqliteConnection, SqlitePool};
use tracing::debug;

use crate::error::DbResult;

const STORE_COLUMNS: &str = "store_id, store_name, store_city, store_address, postal_code, \
                             created_at, updated_at";

/// Repository for store rows.
#[derive(Debug, Clone)]
pub struct StoreRepository {
    pool: SqlitePool,
}

impl StoreRepository {
    /// Creates a new StoreRepository.
    pub fn new(pool: SqlitePool) -> Self {
        StoreRepository { pool }
    }

    /// Inserts or refreshes a store outside any receipt transaction.
    ///
    /// ## Returns
    /// The id of the (possibly pre-existing) store row.
    pub async fn upsert(&self, store: &StoreInfo) -> DbResult<i64> {
        let mut conn = self.pool.acquire().await?;
        upsert_store(&mut conn, store).await
    }

    /// Gets a store by ID.
    pub async fn get_by_id(&self, store_id: i64) -> DbResult<Option<Store>> {
        let sql = format!("SELECT {STORE_COLUMNS} FROM stores WHERE store_id = ?1");
        let store = sqlx::query_as::<_, Store>(&sql)
            .bind(store_id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(store)
    }

    /// Finds a store by its identity triple.
    pub async fn find(&self, name: &str, address: &str, postal_code: &str) -> DbResult<Option<Store>> {
        let sql = format!(
            "SELECT {STORE_COLUMNS} FROM stores \
             WHERE store_name = ?1 AND store_address = ?2 AND postal_code = ?3"
        );
        let store = sqlx::query_as::<_, Store>(&sql)
            .bind(name)
            .bind(address)
            .bind(postal_code)
            .fetch_optional(&self.pool)
            .await?;
        Ok(store)
    }

    /// Counts all stores.
    pub async fn count(&self) -> DbResult<i64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM stores")
            .fetch_one(&self.pool)
            .await?;
        Ok(count)
    }
}

/// Upserts a store on an existing connection or transaction.
///
/// Used by the receipt transaction so that a rollback also removes a store
/// that was created for the failed receipt.
pub(crate) async fn upsert_store(conn: &mut SqliteConnection, store: &StoreInfo) -> DbResult<i64> {
    debug!(
        name = %store.name,
        postal_code = %store.postal_code,
        "Upserting store"
    );

    let store_id: i64 = sqlx::query_scalar(
        r#"
        INSERT INTO stores (store_name, store_city, store_address, postal_code)
        VALUES (?1, ?2, ?3, ?4)
        ON CONFLICT (store_name, store_address, postal_code) DO UPDATE SET
            store_city = excluded.store_city,
            updated_at = strftime('%Y-%m-%dT%H:%M:%fZ', 'now')
        RETURNING store_id
        "#,
    )
    .bind(&store.name)
    .bind(&store.city)
    .bind(&store.address)
    .bind(&store.postal_code)
    .fetch_one(&mut *conn)
    .await?;

    Ok(store_id)
}
