//! # paragon-ingest: Ingestion Pipeline for Paragon
//!
//! Turns receipt exports into database rows. The CLI batch job and the HTTP
//! upload handler both go through [`Ingestor`]; nothing else calls the
//! parser directly.
//!
//! ## Architecture Overview
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                          Ingestor                                       │
//! │                                                                         │
//! │   process_inbox ──► process_receipt_file ──┐                            │
//! │                                            ├──► parse ► validate        │
//! │   HTTP upload  ──► process_named ──────────┘       │                    │
//! │                                                    ▼                    │
//! │                                   ┌──────────────────────────────┐      │
//! │                                   │ PaymentResolver  (payer.rs)  │      │
//! │                                   │ ignore list / mapping /      │      │
//! │                                   │ PayerPrompt                  │      │
//! │                                   └──────────────┬───────────────┘      │
//! │                                                  ▼                      │
//! │                                   ReceiptRepository::persist_receipt    │
//! │                                                  │                      │
//! │                                                  ▼                      │
//! │                                   FileLifecycle::route  (files.rs)      │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Module Organization
//! - [`config`] - TOML + environment configuration
//! - [`error`] - Ingest error types
//! - [`files`] - Inbox listing and file routing
//! - [`payer`] - Payment label → household member resolution
//! - [`pipeline`] - Entry points and batch driver
//!
//! ## Usage
//!
//! ```rust,ignore
//! use paragon_ingest::{IngestConfig, Ingestor};
//!
//! let config = IngestConfig::load_or_default(None);
//! let ingestor = Ingestor::open(&config).await?;
//!
//! let summary = ingestor.process_inbox().await?;
//! for report in &summary.files {
//!     println!("{}: {}", report.file, report.status);
//! }
//! println!("{}", summary);
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod config;
pub mod error;
pub mod files;
pub mod payer;
pub mod pipeline;

// =============================================================================
// Re-exports
// =============================================================================

pub use config::IngestConfig;
pub use error::{IngestError, IngestResult};
pub use files::{Disposition, FileLifecycle};
pub use payer::{PayerPrompt, PayerResolution, PaymentResolver};
pub use pipeline::{BatchSummary, FileReport, FileStatus, IngestOutcome, Ingestor, SkipReason};
