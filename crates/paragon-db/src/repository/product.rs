//! # Product Repository
//!
//! Read access to product lines. Lines are only ever written by the receipt
//! transaction (see [`super::receipt`]).

use paragon_core::ReceiptProduct;
use sqlx::SqlitePool;
use tracing::debug;

use crate::error::DbResult;

/// Repository for product rows.
#[derive(Debug, Clone)]
pub struct ProductRepository {
    pool: SqlitePool,
}

impl ProductRepository {
    /// Creates a new ProductRepository.
    pub fn new(pool: SqlitePool) -> Self {
        ProductRepository { pool }
    }

    /// Lists a receipt's products in print order.
    ///
    /// The order matches the source document line for line, so callers can
    /// address a product by its position.
    pub async fn list_for_receipt(&self, receipt_id: i64) -> DbResult<Vec<ReceiptProduct>> {
        debug!(receipt_id, "Listing receipt products");

        let products = sqlx::query_as::<_, ReceiptProduct>(
            r#"
            SELECT
                product_id, receipt_id, line_no, product_name, quantity_milli, tax_type,
                unit_price_before_cents, total_price_before_cents,
                unit_discount_cents, total_discount_cents,
                unit_after_discount_cents, total_after_discount_cents
            FROM products
            WHERE receipt_id = ?1
            ORDER BY line_no
            "#,
        )
        .bind(receipt_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(products)
    }

    /// Counts all product rows.
    pub async fn count(&self) -> DbResult<i64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM products")
            .fetch_one(&self.pool)
            .await?;
        Ok(count)
    }
}

#[cfg(test)]
mod tests {
    use crate::{Database, DbConfig};

    #[tokio::test]
    async fn test_unknown_receipt_has_no_products() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        assert!(db.products().list_for_receipt(999).await.unwrap().is_empty());
        assert_eq!(db.products().count().await.unwrap(), 0);
    }
}
