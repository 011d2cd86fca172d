//! # Repository Module
//!
//! Database repository implementations for Paragon.
//!
//! ## Repository Pattern
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  Ingestor / CLI / HTTP handler                                         │
//! │       │                                                                 │
//! │       │  db.receipts().persist_receipt(&new_receipt)                   │
//! │       ▼                                                                 │
//! │  ReceiptRepository ──► StoreRepository (upsert inside the transaction) │
//! │  ProductRepository     (reads; rows written by persist_receipt)        │
//! │  UserRepository        (household directory)                           │
//! │  PaymentRepository     (label → member, ignore list)                   │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  SQLite Database                                                       │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Available Repositories
//!
//! - [`StoreRepository`](store::StoreRepository) - Store upsert and lookup
//! - [`ReceiptRepository`](receipt::ReceiptRepository) - Persistence transaction, reads, soft delete
//! - [`ProductRepository`](product::ProductRepository) - Product lines per receipt
//! - [`UserRepository`](user::UserRepository) - Household members
//! - [`PaymentRepository`](payment::PaymentRepository) - Payment label mappings and ignore list

pub mod payment;
pub mod product;
pub mod receipt;
pub mod store;
pub mod user;
