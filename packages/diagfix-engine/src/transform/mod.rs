//! Transactional source editing

mod edit;
mod transaction;
mod transformer;

pub use edit::{apply_in_memory, line_at, validate_edits, AppliedChange, LineMap, LineShift};
pub use transaction::{SavepointId, Transaction};
pub use transformer::CodeTransformer;
