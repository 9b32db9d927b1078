//! Import engine error types

use crate::types::ScopedErrors;
use thiserror::Error;

/// Result type for engine calls
pub type ImportResult<T> = std::result::Result<T, ImportError>;

/// Fatal outcomes of a save call
///
/// Secondary-write and locale problems are not errors: they are reported as
/// warnings on a successful [`crate::upsert::SaveOutcome`].
#[derive(Error, Debug)]
pub enum ImportError {
    /// The unit failed validation; nothing was written
    #[error("Validation failed: {0}")]
    Validation(ScopedErrors),

    /// The record body (or the identity lookup before it) could not be written
    #[error("Persistence failed: {0}")]
    Persistence(importer_common::Error),

    #[error("Store error: {0}")]
    Store(#[from] importer_common::Error),
}

impl ImportError {
    /// Scoped validation errors, when this is a rejection
    pub fn validation_errors(&self) -> Option<&ScopedErrors> {
        match self {
            ImportError::Validation(errors) => Some(errors),
            _ => None,
        }
    }
}
