//! # Receipt Repository
//!
//! Receipt reads and the all-or-nothing persistence transaction.
//!
//! ## Persistence Transaction
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  BEGIN                                                                  │
//! │    1. live receipt with same (date, time, final_price)? ──► Duplicate   │
//! │    2. upsert store (name, address, postal_code), refresh city          │
//! │    3. INSERT receipt ... ON CONFLICT DO NOTHING                         │
//! │         no row / UNIQUE violation ─────────────────────────► Duplicate │
//! │    4. INSERT products (multi-row VALUES, print order)                   │
//! │  COMMIT ─────────────────────────────────────────────────► Inserted    │
//! │                                                                         │
//! │  Any error: the transaction is dropped → ROLLBACK (store included)     │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Step 1 is deliberately looser than the uniqueness key in step 3: a
//! re-export of the same purchase with a different receipt number is still
//! caught. Step 3 is the real guard against two writers racing on the same
//! file.

use paragon_core::money::quantity_to_milli;
use paragon_core::{Money, ParsedProductLine, ParsedReceipt, ParsedReceiptHeader, Receipt};
use serde::Serialize;
use sqlx::{QueryBuilder, Sqlite, SqlitePool};
use tracing::{debug, info};

use crate::error::{DbError, DbResult};
use crate::repository::store::upsert_store;

const RECEIPT_COLUMNS: &str = "receipt_id, store_id, receipt_number, date, time, \
                               final_price_cents, total_discounts_cents, currency, payment_name, \
                               counted, settled, not_our_receipt, created_at, deleted_at";

/// Product rows per INSERT statement; 11 binds each stays under SQLite's
/// 999-variable limit.
const PRODUCT_ROWS_PER_STATEMENT: usize = 80;

// =============================================================================
// Types
// =============================================================================

/// Everything the transaction writes for one receipt.
#[derive(Debug, Clone, Copy)]
pub struct NewReceipt<'a> {
    pub header: &'a ParsedReceiptHeader,
    pub products: &'a [ParsedProductLine],
    /// Literal payment label stored on the receipt.
    pub payment_name: Option<&'a str>,
    /// The payer is the "Other" member.
    pub not_our_receipt: bool,
}

impl<'a> NewReceipt<'a> {
    /// Builds a record from a parsed receipt, taking the payment label from
    /// its header.
    pub fn from_parsed(parsed: &'a ParsedReceipt, not_our_receipt: bool) -> Self {
        NewReceipt {
            header: &parsed.header,
            products: &parsed.products,
            payment_name: parsed.header.payment_name.as_deref(),
            not_our_receipt,
        }
    }
}

/// Why a receipt was not written.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum DuplicateKind {
    /// A live receipt with the same date, time and final price exists.
    SameTotalAndTime { existing_receipt_id: i64 },
    /// The `(store, receipt number, date, time)` key is already taken.
    SameReceiptKey,
}

/// Result of [`ReceiptRepository::persist_receipt`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PersistOutcome {
    Inserted { receipt_id: i64, store_id: i64 },
    Duplicate(DuplicateKind),
}

/// A product line converted to its storage representation.
#[derive(Debug, Clone)]
struct ProductRow {
    line_no: i64,
    product_name: String,
    quantity_milli: i64,
    tax_type: String,
    unit_price_before_cents: i64,
    total_price_before_cents: i64,
    unit_discount_cents: i64,
    total_discount_cents: i64,
    unit_after_discount_cents: i64,
    total_after_discount_cents: i64,
}

impl ProductRow {
    fn from_line(line_no: usize, line: &ParsedProductLine) -> DbResult<Self> {
        Ok(ProductRow {
            line_no: line_no as i64,
            product_name: line.product_name.clone(),
            quantity_milli: quantity_to_milli(line.quantity)?,
            tax_type: line.tax_type.clone(),
            unit_price_before_cents: Money::from_decimal(line.unit_price_before)?.cents(),
            total_price_before_cents: Money::from_decimal(line.total_price_before)?.cents(),
            unit_discount_cents: Money::from_decimal(line.unit_discount)?.cents(),
            total_discount_cents: Money::from_decimal(line.total_discount)?.cents(),
            unit_after_discount_cents: Money::from_decimal(line.unit_after_discount)?.cents(),
            total_after_discount_cents: Money::from_decimal(line.total_after_discount)?.cents(),
        })
    }
}

// =============================================================================
// Repository
// =============================================================================

/// Repository for receipt rows.
#[derive(Debug, Clone)]
pub struct ReceiptRepository {
    pool: SqlitePool,
}

impl ReceiptRepository {
    /// Creates a new ReceiptRepository.
    pub fn new(pool: SqlitePool) -> Self {
        ReceiptRepository { pool }
    }

    /// Writes store, receipt and products in one transaction.
    ///
    /// ## Returns
    /// * `Ok(Inserted)` - Everything committed
    /// * `Ok(Duplicate)` - Nothing written; not an error
    /// * `Err(DbError)` - Nothing written; the transaction was rolled back
    ///
    /// ## Example
    /// ```rust,ignore
    /// match db.receipts().persist_receipt(&NewReceipt::from_parsed(&parsed, false)).await? {
    ///     PersistOutcome::Inserted { receipt_id, .. } => println!("stored {receipt_id}"),
    ///     PersistOutcome::Duplicate(kind) => println!("skipped {kind:?}"),
    /// }
    /// ```
    pub async fn persist_receipt(&self, receipt: &NewReceipt<'_>) -> DbResult<PersistOutcome> {
        let header = receipt.header;

        // Convert before BEGIN so a range error never opens a transaction.
        let final_price = Money::from_decimal(header.final_price)?;
        let total_discounts = Money::from_decimal(header.total_discounts)?;
        let rows = receipt
            .products
            .iter()
            .enumerate()
            .map(|(line_no, line)| ProductRow::from_line(line_no, line))
            .collect::<DbResult<Vec<_>>>()?;

        let mut tx = self.pool.begin().await?;

        // 1. Loose duplicate check
        let existing: Option<i64> = sqlx::query_scalar(
            r#"
            SELECT receipt_id FROM receipts
            WHERE date = ?1 AND time = ?2 AND final_price_cents = ?3
              AND deleted_at IS NULL
            LIMIT 1
            "#,
        )
        .bind(header.date)
        .bind(header.time)
        .bind(final_price.cents())
        .fetch_optional(&mut *tx)
        .await?;

        if let Some(existing_receipt_id) = existing {
            debug!(
                existing_receipt_id,
                date = %header.date,
                time = %header.time,
                final_price = %final_price,
                "Duplicate receipt (same date, time and total)"
            );
            tx.rollback().await?;
            return Ok(PersistOutcome::Duplicate(DuplicateKind::SameTotalAndTime {
                existing_receipt_id,
            }));
        }

        // 2. Store
        let store_id = upsert_store(&mut tx, &header.store).await?;

        // 3. Receipt
        let inserted = sqlx::query_scalar::<_, i64>(
            r#"
            INSERT INTO receipts (
                store_id, receipt_number, date, time,
                final_price_cents, total_discounts_cents, currency,
                payment_name, not_our_receipt
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
            ON CONFLICT (store_id, receipt_number, date, time) DO NOTHING
            RETURNING receipt_id
            "#,
        )
        .bind(store_id)
        .bind(&header.receipt_number)
        .bind(header.date)
        .bind(header.time)
        .bind(final_price.cents())
        .bind(total_discounts.cents())
        .bind(&header.currency)
        .bind(receipt.payment_name)
        .bind(receipt.not_our_receipt)
        .fetch_optional(&mut *tx)
        .await
        .map_err(DbError::from);

        let receipt_id = match inserted {
            Ok(Some(id)) => id,
            Ok(None) => {
                tx.rollback().await?;
                return Ok(PersistOutcome::Duplicate(DuplicateKind::SameReceiptKey));
            }
            Err(err) if err.is_unique_violation_on("receipts") => {
                tx.rollback().await?;
                return Ok(PersistOutcome::Duplicate(DuplicateKind::SameReceiptKey));
            }
            Err(err) => return Err(err),
        };

        // 4. Products
        for chunk in rows.chunks(PRODUCT_ROWS_PER_STATEMENT) {
            let mut builder: QueryBuilder<Sqlite> = QueryBuilder::new(
                "INSERT INTO products (\
                    receipt_id, line_no, product_name, quantity_milli, tax_type, \
                    unit_price_before_cents, total_price_before_cents, \
                    unit_discount_cents, total_discount_cents, \
                    unit_after_discount_cents, total_after_discount_cents) ",
            );
            builder.push_values(chunk, |mut b, row| {
                b.push_bind(receipt_id)
                    .push_bind(row.line_no)
                    .push_bind(row.product_name.as_str())
                    .push_bind(row.quantity_milli)
                    .push_bind(row.tax_type.as_str())
                    .push_bind(row.unit_price_before_cents)
                    .push_bind(row.total_price_before_cents)
                    .push_bind(row.unit_discount_cents)
                    .push_bind(row.total_discount_cents)
                    .push_bind(row.unit_after_discount_cents)
                    .push_bind(row.total_after_discount_cents);
            });
            builder.build().execute(&mut *tx).await?;
        }

        tx.commit().await?;

        info!(
            receipt_id,
            store_id,
            receipt_number = %header.receipt_number,
            products = rows.len(),
            "Receipt persisted"
        );

        Ok(PersistOutcome::Inserted {
            receipt_id,
            store_id,
        })
    }

    /// Gets a receipt by ID (soft-deleted rows included).
    pub async fn get_by_id(&self, receipt_id: i64) -> DbResult<Option<Receipt>> {
        let sql = format!("SELECT {RECEIPT_COLUMNS} FROM receipts WHERE receipt_id = ?1");
        let receipt = sqlx::query_as::<_, Receipt>(&sql)
            .bind(receipt_id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(receipt)
    }

    /// Counts live (not soft-deleted) receipts.
    pub async fn count(&self) -> DbResult<i64> {
        let count: i64 =
            sqlx::query_scalar("SELECT COUNT(*) FROM receipts WHERE deleted_at IS NULL")
                .fetch_one(&self.pool)
                .await?;
        Ok(count)
    }

    /// Soft-deletes a receipt. A deleted receipt no longer blocks a
    /// re-import through the duplicate check.
    pub async fn soft_delete(&self, receipt_id: i64) -> DbResult<()> {
        debug!(receipt_id, "Soft-deleting receipt");

        let result = sqlx::query(
            r#"
            UPDATE receipts SET
                deleted_at = strftime('%Y-%m-%dT%H:%M:%fZ', 'now'),
                updated_at = strftime('%Y-%m-%dT%H:%M:%fZ', 'now')
            WHERE receipt_id = ?1 AND deleted_at IS NULL
            "#,
        )
        .bind(receipt_id)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(DbError::not_found("Receipt", receipt_id.to_string()));
        }
        Ok(())
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
