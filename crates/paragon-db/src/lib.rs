//! # paragon-db: Database Layer for Paragon
//!
//! SQLite storage for stores, receipts, products and the household
//! directory, accessed through sqlx.
//!
//! ## Architecture Position
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                        Paragon Data Flow                                │
//! │                                                                         │
//! │  Ingestor::process_receipt_file                                        │
//! │       │  ParsedReceipt (paragon-core)                                   │
//! │       ▼                                                                 │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │                     paragon-db (THIS CRATE)                     │   │
//! │  │                                                                 │   │
//! │  │   ┌───────────────┐    ┌────────────────┐    ┌──────────────┐  │   │
//! │  │   │   Database    │    │  Repositories  │    │  Migrations  │  │   │
//! │  │   │   (pool.rs)   │    │                │    │  (embedded)  │  │   │
//! │  │   │               │    │ ReceiptRepo ★  │    │              │  │   │
//! │  │   │ SqlitePool    │◄───│ StoreRepo      │    │ 001_initial_ │  │   │
//! │  │   │ WAL, FKs on   │    │ ProductRepo    │    │   schema.sql │  │   │
//! │  │   │               │    │ UserRepo       │    │              │  │   │
//! │  │   │               │    │ PaymentRepo    │    │              │  │   │
//! │  │   └───────────────┘    └────────────────┘    └──────────────┘  │   │
//! │  │                   ★ persist_receipt: one transaction            │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  SQLite file (data/paragon.db by default)                              │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Module Organization
//!
//! - [`pool`] - Connection pool creation and configuration
//! - [`migrations`] - Embedded database migrations
//! - [`error`] - Database error types
//! - [`repository`] - Repository implementations
//!
//! ## Usage
//!
//! ```rust,ignore
//! use paragon_db::{Database, DbConfig, NewReceipt};
//!
//! let db = Database::new(DbConfig::new("data/paragon.db")).await?;
//! let outcome = db
//!     .receipts()
//!     .persist_receipt(&NewReceipt::from_parsed(&parsed, false))
//!     .await?;
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod error;
pub mod migrations;
pub mod pool;
pub mod repository;

// =============================================================================
// Re-exports
// =============================================================================

pub use error::{DbError, DbResult};
pub use pool::{Database, DbConfig};

pub use repository::payment::PaymentRepository;
pub use repository::product::ProductRepository;
pub use repository::receipt::{DuplicateKind, NewReceipt, PersistOutcome, ReceiptRepository};
pub use repository::store::StoreRepository;
pub use repository::user::UserRepository;
