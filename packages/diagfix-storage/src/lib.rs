//! FixStore - persistence for the diagnostic resolution engine
//!
//! ## Core Principles
//!
//! 1. **Monotonic lifecycle**: a diagnostic's status only moves forward
//! 2. **Append-only history**: application logs and transaction audits are never rewritten
//! 3. **Port/adapter split**: the engine only sees the `FixStore` trait
//!
//! ## Usage
//!
//! ```rust,ignore
//! use diagfix_storage::{Diagnostic, FixStore, SqliteFixStore};
//!
//! let store = SqliteFixStore::new(".diagfix/state.db")?;
//!
//! let diagnostic = Diagnostic::new("TS2304", "Cannot find name 'Foo'.", "src/a.ts", 3, 14);
//! store.save_diagnostic(&diagnostic).await?;
//!
//! let pending = store.list_diagnostics(Some(DiagnosticStatus::Pending)).await?;
//! ```

pub mod domain;
pub mod error;
pub mod infrastructure;

pub use error::{ErrorKind, Result, StorageError};

pub use domain::{
    ApplicationLog, Diagnostic, DiagnosticCategory, DiagnosticStatus, FeedbackRating, Fix,
    FixEdit, FixStore, Pattern, Severity, TransactionAudit, TransactionOutcome,
};

pub use infrastructure::InMemoryFixStore;

#[cfg(feature = "sqlite")]
pub use infrastructure::SqliteFixStore;
