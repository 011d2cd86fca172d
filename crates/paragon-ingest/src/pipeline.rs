//! # Ingestion Pipeline
//!
//! The two sanctioned entry points into receipt parsing, plus the inbox
//! batch driver built on top of them.
//!
//! ## Per-Receipt Flow
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  process_receipt_file(path)          process_receipt_data(&Value)       │
//! │       │ read bytes                        │                             │
//! │       └──────────────┬────────────────────┘                             │
//! │                      ▼                                                  │
//! │  ReceiptDocument ──► parse_receipt ──► warn! per ExtractionNote         │
//! │                      │                                                  │
//! │                      ▼                                                  │
//! │  validate_receipt ──► resolve_payer ──► Ignored / Declined ──► Skipped  │
//! │                      │                                                  │
//! │                      ▼                                                  │
//! │  persist_receipt ──► Inserted ──► Stored                                │
//! │                  └─► Duplicate ─► Skipped                               │
//! │                                                                         │
//! │  File entry point only: Stored/Skipped → parsed/, Err → rejected/      │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Files are processed one at a time, each in its own transaction. A failing
//! file never affects the ones after it.

use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use paragon_core::validation::validate_receipt;
use paragon_core::{parse_receipt, ReceiptDocument};
use paragon_db::{Database, DbConfig, DuplicateKind, NewReceipt, PersistOutcome};
use serde::Serialize;
use serde_json::Value;
use tracing::{debug, error, info, warn};

use crate::config::IngestConfig;
use crate::error::IngestResult;
use crate::files::{Disposition, FileLifecycle};
use crate::payer::{PayerPrompt, PayerResolution, PaymentResolver};

// =============================================================================
// Outcomes
// =============================================================================

/// Why a receipt was not stored. None of these are errors.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "reason", rename_all = "snake_case")]
pub enum SkipReason {
    /// The receipt is already in the database.
    Duplicate(DuplicateKind),
    /// Its payment label is on the ignore list.
    IgnoredPayment { payment_name: String },
    /// The operator declined to assign a payer.
    Declined,
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SkipReason::Duplicate(DuplicateKind::SameTotalAndTime {
                existing_receipt_id,
            }) => write!(f, "duplicate of receipt {}", existing_receipt_id),
            SkipReason::Duplicate(DuplicateKind::SameReceiptKey) => write!(f, "duplicate"),
            SkipReason::IgnoredPayment { payment_name } => {
                write!(f, "ignored payment '{}'", payment_name)
            }
            SkipReason::Declined => write!(f, "declined"),
        }
    }
}

/// Result of a successful pass through the pipeline.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum IngestOutcome {
    Stored {
        receipt_id: i64,
        store_id: i64,
        products: usize,
    },
    Skipped(SkipReason),
}

impl IngestOutcome {
    pub fn receipt_id(&self) -> Option<i64> {
        match self {
            IngestOutcome::Stored { receipt_id, .. } => Some(*receipt_id),
            IngestOutcome::Skipped(_) => None,
        }
    }

    pub fn is_duplicate(&self) -> bool {
        matches!(self, IngestOutcome::Skipped(SkipReason::Duplicate(_)))
    }
}

// =============================================================================
// Batch Reporting
// =============================================================================

/// What happened to one file, as shown to the operator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum FileStatus {
    Stored { receipt_id: i64, products: usize },
    Skipped(SkipReason),
    Failed { error: String },
}

impl From<&IngestResult<IngestOutcome>> for FileStatus {
    fn from(result: &IngestResult<IngestOutcome>) -> Self {
        match result {
            Ok(IngestOutcome::Stored {
                receipt_id,
                products,
                ..
            }) => FileStatus::Stored {
                receipt_id: *receipt_id,
                products: *products,
            },
            Ok(IngestOutcome::Skipped(reason)) => FileStatus::Skipped(reason.clone()),
            Err(e) => FileStatus::Failed {
                error: e.to_string(),
            },
        }
    }
}

impl fmt::Display for FileStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FileStatus::Stored { receipt_id, .. } => {
                write!(f, "processed successfully ({})", receipt_id)
            }
            FileStatus::Skipped(reason) => write!(f, "skipped ({})", reason),
            FileStatus::Failed { error } => write!(f, "error ({})", error),
        }
    }
}

/// One line of a batch report.
#[derive(Debug, Clone, Serialize)]
pub struct FileReport {
    pub file: String,
    #[serde(flatten)]
    pub status: FileStatus,
}

/// Tally of a batch run.
#[derive(Debug, Clone, Serialize)]
pub struct BatchSummary {
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub stored: usize,
    pub skipped: usize,
    pub failed: usize,
    pub files: Vec<FileReport>,
}

impl BatchSummary {
    pub fn new() -> Self {
        let now = Utc::now();
        BatchSummary {
            started_at: now,
            finished_at: now,
            stored: 0,
            skipped: 0,
            failed: 0,
            files: Vec::new(),
        }
    }

    /// Adds one file's result to the tally.
    pub fn record(&mut self, file: impl Into<String>, result: &IngestResult<IngestOutcome>) {
        let status = FileStatus::from(result);
        match status {
            FileStatus::Stored { .. } => self.stored += 1,
            FileStatus::Skipped(_) => self.skipped += 1,
            FileStatus::Failed { .. } => self.failed += 1,
        }
        self.files.push(FileReport {
            file: file.into(),
            status,
        });
    }

    /// Stamps the end time.
    pub fn finish(mut self) -> Self {
        self.finished_at = Utc::now();
        self
    }

    pub fn total(&self) -> usize {
        self.files.len()
    }
}

impl Default for BatchSummary {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for BatchSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} file(s): {} stored, {} skipped, {} failed",
            self.total(),
            self.stored,
            self.skipped,
            self.failed
        )
    }
}

// =============================================================================
// Ingestor
// =============================================================================

/// Entry point for everything that feeds receipts into the database.
///
/// ## Example
/// ```rust,ignore
/// let ingestor = Ingestor::open(&config).await?;
/// let summary = ingestor.process_inbox().await?;
/// println!("{}", summary);
/// ```
#[derive(Debug, Clone)]
pub struct Ingestor {
    db: Database,
    payer: PaymentResolver,
    files: FileLifecycle,
}

impl Ingestor {
    /// Creates a non-interactive ingestor.
    pub fn new(db: Database, files: FileLifecycle) -> Self {
        Ingestor {
            payer: PaymentResolver::new(db.clone()),
            db,
            files,
        }
    }

    /// Opens the configured database and makes sure the "Other" member
    /// exists.
    pub async fn open(config: &IngestConfig) -> IngestResult<Self> {
        let db = Database::new(
            DbConfig::new(&config.database.path).max_connections(config.database.max_connections),
        )
        .await?;
        db.users().ensure_other_user().await?;

        Ok(Self::new(db, FileLifecycle::from_settings(&config.folders)))
    }

    /// Switches to interactive payer resolution.
    pub fn with_prompt(mut self, prompt: Arc<dyn PayerPrompt>) -> Self {
        self.payer = PaymentResolver::interactive(self.db.clone(), prompt);
        self
    }

    /// Reads from a different inbox; destinations stay the same.
    pub fn with_inbox(mut self, inbox: impl Into<PathBuf>) -> Self {
        self.files = self.files.with_inbox(inbox);
        self
    }

    pub fn database(&self) -> &Database {
        &self.db
    }

    pub fn files(&self) -> &FileLifecycle {
        &self.files
    }

    // =========================================================================
    // Entry Points
    // =========================================================================

    /// Ingests one receipt file and routes it out of the inbox.
    ///
    /// ## Returns
    /// * `Ok(Stored)` / `Ok(Skipped)` - file moved to the processed folder
    /// * `Err(_)` - file moved to the rejected folder
    ///
    /// A failed move is logged and does not change the returned result.
    pub async fn process_receipt_file(&self, path: &Path) -> IngestResult<IngestOutcome> {
        let source = path.display().to_string();
        debug!(file = %source, "Processing receipt file");

        let result = match tokio::fs::read(path).await {
            Ok(bytes) => match ReceiptDocument::from_slice(&bytes) {
                Ok(doc) => self.ingest_document(&doc, &source).await,
                Err(e) => Err(e.into()),
            },
            Err(e) => Err(e.into()),
        };

        let disposition = match &result {
            Ok(_) => Disposition::Processed,
            Err(e) => {
                error!(file = %source, error = %e, "Receipt rejected");
                Disposition::Rejected
            }
        };
        if let Err(e) = self.files.route(path, disposition).await {
            error!(file = %source, error = %e, "Failed to route receipt file");
        }

        result
    }

    /// Ingests a receipt that is already in memory. No file is moved.
    pub async fn process_receipt_data(&self, data: &Value) -> IngestResult<IngestOutcome> {
        self.process_named(data, "<data>").await
    }

    /// Same as [`process_receipt_data`](Self::process_receipt_data) with a
    /// label for logs and prompts (an upload's file name).
    pub async fn process_named(&self, data: &Value, source: &str) -> IngestResult<IngestOutcome> {
        let doc = ReceiptDocument::from_value(data)?;
        self.ingest_document(&doc, source).await
    }

    /// Processes every pending file in the inbox, in name order.
    ///
    /// ## Errors
    /// Only if the inbox cannot be listed. Per-file failures are counted in
    /// the summary.
    pub async fn process_inbox(&self) -> IngestResult<BatchSummary> {
        self.process_inbox_with(|_| {}).await
    }

    /// Like [`process_inbox`](Self::process_inbox), calling `on_file` as
    /// soon as each file is done so the CLI can print progress.
    pub async fn process_inbox_with<F>(&self, mut on_file: F) -> IngestResult<BatchSummary>
    where
        F: FnMut(&FileReport),
    {
        let pending = self.files.pending().await?;
        info!(inbox = ?self.files.inbox(), count = pending.len(), "Starting batch");

        let mut summary = BatchSummary::new();
        for path in pending {
            let result = self.process_receipt_file(&path).await;
            let name = path
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_else(|| path.display().to_string());
            summary.record(name, &result);
            if let Some(report) = summary.files.last() {
                on_file(report);
            }
        }

        let summary = summary.finish();
        info!(
            stored = summary.stored,
            skipped = summary.skipped,
            failed = summary.failed,
            "Batch finished"
        );
        Ok(summary)
    }

    // =========================================================================
    // Pipeline
    // =========================================================================

    async fn ingest_document(
        &self,
        doc: &ReceiptDocument,
        source: &str,
    ) -> IngestResult<IngestOutcome> {
        let parsed = parse_receipt(doc);
        for note in &parsed.notes {
            warn!(source = %source, note = %note, "Recoverable receipt defect");
        }

        validate_receipt(&parsed)?;

        let resolution = self
            .payer
            .resolve_payer(parsed.header.payment_name.as_deref(), source)
            .await?;

        match &resolution {
            PayerResolution::Ignored { payment_name } => {
                info!(source = %source, payment_name = %payment_name, "Receipt skipped: ignored payment");
                return Ok(IngestOutcome::Skipped(SkipReason::IgnoredPayment {
                    payment_name: payment_name.clone(),
                }));
            }
            PayerResolution::Declined => {
                info!(source = %source, "Receipt skipped: declined");
                return Ok(IngestOutcome::Skipped(SkipReason::Declined));
            }
            PayerResolution::Member { .. } | PayerResolution::Unassigned { .. } => {}
        }

        let record = NewReceipt {
            header: &parsed.header,
            products: &parsed.products,
            payment_name: resolution.payment_name(),
            not_our_receipt: resolution.is_not_our_receipt(),
        };

        match self.db.receipts().persist_receipt(&record).await? {
            PersistOutcome::Inserted {
                receipt_id,
                store_id,
            } => {
                info!(
                    source = %source,
                    receipt_id,
                    store_id,
                    products = parsed.products.len(),
                    "Receipt stored"
                );
                Ok(IngestOutcome::Stored {
                    receipt_id,
                    store_id,
                    products: parsed.products.len(),
                })
            }
            PersistOutcome::Duplicate(kind) => {
                info!(source = %source, ?kind, "Receipt skipped: duplicate");
                Ok(IngestOutcome::Skipped(SkipReason::Duplicate(kind)))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::IngestError;
    use crate::payer::tests::ScriptedPrompt;
    use paragon_core::ParseError;
    use rust_decimal::Decimal;
    use serde_json::json;

    fn receipt(bill: &str, date: &str, total: i64, payment: &str) -> Value {
        json!({
            "header": [
                {"headerText": {"headerTextLines":
                    "<div class=\"align-center \">BIEDRONKA &quot;CODZIENNIE NISKIE CENY&quot; 7565</div>\
                     <div class=\"align-center \">60-649&nbsp;POZNAŃ UL. PIĄTKOWSKA 78C</div>"}},
                {"headerData": {"tin": "7791011327"}}
            ],
            "body": [
                {"sellLine": {"name": "Mleko 3.2% A", "price": 350, "quantity": "1"}},
                {"discountLine": {"value": 50, "vatId": "A", "base": 350}},
                {"sellLine": {"name": "Chleb B", "price": 599, "quantity": "1", "isStorno": true}},
                {"sellLine": {"name": "Bułka B", "price": 100, "quantity": "2", "total": 200}},
                {"payment": {"name": payment}},
                {"sumInCurrency": {"fiscalTotal": total, "currency": "PLN"}},
                {"discountSummary": {"discounts": 50}},
                {"fiscalFooter": {"billNumber": bill, "date": date}}
            ]
        })
    }

    async fn ingestor(root: &Path) -> Ingestor {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        db.users().add_user("Ania").await.unwrap();
        db.users().ensure_other_user().await.unwrap();
        Ingestor::new(
            db,
            FileLifecycle::new(
                root.join("to_check"),
                root.join("parsed"),
                root.join("rejected"),
            ),
        )
    }

    fn drop_file(ingestor: &Ingestor, name: &str, contents: &str) -> PathBuf {
        std::fs::create_dir_all(ingestor.files().inbox()).unwrap();
        let path = ingestor.files().inbox().join(name);
        std::fs::write(&path, contents).unwrap();
        path
    }

    #[tokio::test]
    async fn test_data_entry_point_stores_receipt() {
        let dir = tempfile::tempdir().unwrap();
        let ingestor = ingestor(dir.path()).await;

        let outcome = ingestor
            .process_receipt_data(&receipt("101", "2024-05-01T10:15:30Z", 500, "Karta VISA"))
            .await
            .unwrap();

        let IngestOutcome::Stored {
            receipt_id,
            products,
            ..
        } = outcome
        else {
            panic!("expected Stored, got {:?}", outcome);
        };
        assert_eq!(products, 2);

        let db = ingestor.database();
        let stored = db.receipts().get_by_id(receipt_id).await.unwrap().unwrap();
        assert_eq!(stored.receipt_number, "101");
        assert_eq!(stored.final_price_cents, 500);
        assert_eq!(stored.payment_name.as_deref(), Some("Karta VISA"));
        assert!(!stored.not_our_receipt);

        let lines = db.products().list_for_receipt(receipt_id).await.unwrap();
        assert_eq!(lines[0].product_name, "Mleko 3.2%");
        assert_eq!(lines[0].total_discount_cents, 50);
        assert_eq!(lines[0].total_after_discount_cents, 300);
        assert_eq!(lines[1].product_name, "Bułka");
        assert_eq!(lines[1].quantity(), Decimal::new(2000, 3));

        // The label shows up as unassigned until someone claims it.
        let unassigned = db.payments().unassigned_payment_names().await.unwrap();
        assert_eq!(unassigned.len(), 1);
        assert_eq!(unassigned[0].payment_name, "Karta VISA");
    }

    #[tokio::test]
    async fn test_reprocessing_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let ingestor = ingestor(dir.path()).await;
        let doc = receipt("101", "2024-05-01T10:15:30Z", 500, "Karta VISA");

        let first = ingestor.process_receipt_data(&doc).await.unwrap();
        let second = ingestor.process_receipt_data(&doc).await.unwrap();

        assert!(first.receipt_id().is_some());
        assert!(second.is_duplicate());
        assert_eq!(ingestor.database().receipts().count().await.unwrap(), 1);
        assert_eq!(ingestor.database().stores().count().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_ignored_payment_is_skipped() {
        let dir = tempfile::tempdir().unwrap();
        let ingestor = ingestor(dir.path()).await;
        ingestor.database().payments().add_ignored("Bon").await.unwrap();

        let outcome = ingestor
            .process_receipt_data(&receipt("7", "2024-05-01T10:00:00Z", 500, "Bon"))
            .await
            .unwrap();

        assert_eq!(
            outcome,
            IngestOutcome::Skipped(SkipReason::IgnoredPayment {
                payment_name: "Bon".into()
            })
        );
        assert_eq!(ingestor.database().receipts().count().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_interactive_other_member_flags_receipt() {
        let dir = tempfile::tempdir().unwrap();
        let ingestor = ingestor(dir.path()).await;
        let other = ingestor.database().users().get_other().await.unwrap().unwrap();
        let ingestor =
            ingestor.with_prompt(Arc::new(ScriptedPrompt::choosing(vec![Some(other.user_id)])));

        let outcome = ingestor
            .process_receipt_data(&receipt("8", "2024-05-02T09:00:00Z", 500, "Karta Gościa"))
            .await
            .unwrap();

        let receipt_id = outcome.receipt_id().unwrap();
        let stored = ingestor
            .database()
            .receipts()
            .get_by_id(receipt_id)
            .await
            .unwrap()
            .unwrap();
        assert!(stored.not_our_receipt);
    }

    #[tokio::test]
    async fn test_interactive_decline_writes_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let ingestor = ingestor(dir.path())
            .await
            .with_prompt(Arc::new(ScriptedPrompt::choosing(vec![None])));

        let outcome = ingestor
            .process_receipt_data(&receipt("9", "2024-05-02T09:00:00Z", 500, "Karta Q"))
            .await
            .unwrap();

        assert_eq!(outcome, IngestOutcome::Skipped(SkipReason::Declined));
        assert_eq!(ingestor.database().receipts().count().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_broken_data_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let ingestor = ingestor(dir.path()).await;

        let err = ingestor
            .process_receipt_data(&json!({"header": [], "body": []}))
            .await
            .unwrap_err();
        assert!(matches!(err, IngestError::Parse(ParseError::EmptyBody)));
        assert!(err.is_document_error());
    }

    #[tokio::test]
    async fn test_mistyped_fields_do_not_reject_receipt() {
        let dir = tempfile::tempdir().unwrap();
        let ingestor = ingestor(dir.path()).await;

        let mut doc = receipt("102", "2024-05-02T09:00:00Z", 700, "unused");
        doc["body"][2]["sellLine"]["isStorno"] = Value::Null;
        doc["body"][3]["sellLine"]["vatId"] = json!(1);
        doc["body"][4]["payment"]["name"] = json!(1234);

        let outcome = ingestor.process_receipt_data(&doc).await.unwrap();
        let IngestOutcome::Stored {
            receipt_id,
            products,
            ..
        } = outcome
        else {
            panic!("expected Stored, got {:?}", outcome);
        };
        // A null storno flag reads as "not cancelled".
        assert_eq!(products, 3);

        let stored = ingestor
            .database()
            .receipts()
            .get_by_id(receipt_id)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(stored.payment_name.as_deref(), Some("1234"));
    }

    #[tokio::test]
    async fn test_file_entry_point_routes_files() {
        let dir = tempfile::tempdir().unwrap();
        let ingestor = ingestor(dir.path()).await;
        let doc = receipt("101", "2024-05-01T10:15:30Z", 500, "Karta VISA").to_string();

        let good = drop_file(&ingestor, "a.json", &doc);
        let outcome = ingestor.process_receipt_file(&good).await.unwrap();
        assert!(outcome.receipt_id().is_some());
        assert!(dir.path().join("parsed").join("a.json").exists());
        assert!(!good.exists());

        // Duplicates also go to parsed/.
        let dup = drop_file(&ingestor, "b.json", &doc);
        assert!(ingestor.process_receipt_file(&dup).await.unwrap().is_duplicate());
        assert!(dir.path().join("parsed").join("b.json").exists());

        let bad = drop_file(&ingestor, "c.json", "{not json");
        assert!(ingestor.process_receipt_file(&bad).await.is_err());
        assert!(dir.path().join("rejected").join("c.json").exists());
    }

    #[tokio::test]
    async fn test_process_inbox_summary() {
        let dir = tempfile::tempdir().unwrap();
        let ingestor = ingestor(dir.path()).await;

        drop_file(
            &ingestor,
            "01.json",
            &receipt("1", "2024-05-01T10:00:00Z", 500, "Karta").to_string(),
        );
        drop_file(
            &ingestor,
            "02.json",
            &receipt("1", "2024-05-01T10:00:00Z", 500, "Karta").to_string(),
        );
        drop_file(&ingestor, "03.json", "[]");
        drop_file(
            &ingestor,
            "04.json",
            &receipt("2", "2024-05-03T12:00:00Z", 700, "Karta").to_string(),
        );

        let mut seen = Vec::new();
        let summary = ingestor
            .process_inbox_with(|report| seen.push(report.file.clone()))
            .await
            .unwrap();
        assert_eq!(seen, ["01.json", "02.json", "03.json", "04.json"]);

        assert_eq!((summary.stored, summary.skipped, summary.failed), (2, 1, 1));
        assert_eq!(summary.to_string(), "4 file(s): 2 stored, 1 skipped, 1 failed");
        let names: Vec<_> = summary.files.iter().map(|f| f.file.as_str()).collect();
        assert_eq!(names, ["01.json", "02.json", "03.json", "04.json"]);
        assert!(summary.files[0].status.to_string().starts_with("processed successfully ("));
        assert_eq!(summary.files[1].status.to_string(), "skipped (duplicate of receipt 1)");
        assert!(summary.files[2].status.to_string().starts_with("error ("));

        assert!(ingestor.files().pending().await.unwrap().is_empty());
    }

    #[test]
    fn test_file_status_json_shape() {
        let status = FileStatus::Skipped(SkipReason::Duplicate(DuplicateKind::SameReceiptKey));
        assert_eq!(
            serde_json::to_value(&status).unwrap(),
            json!({"status": "skipped", "reason": "duplicate", "kind": "same_receipt_key"})
        );

        let report = FileReport {
            file: "a.json".into(),
            status: FileStatus::Stored {
                receipt_id: 3,
                products: 2,
            },
        };
        assert_eq!(
            serde_json::to_value(&report).unwrap(),
            json!({"file": "a.json", "status": "stored", "receipt_id": 3, "products": 2})
        );
    }
}
