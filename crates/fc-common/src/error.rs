//! Shared error taxonomy (§4.1, §7). Crate-specific errors (`StorageError`,
//! `ProviderError`, ...) wrap or convert into these where the failure kind
//! is one the whole pipeline needs to reason about (retry vs. skip vs.
//! surface to the operator).

use thiserror::Error;

#[derive(Error, Debug)]
pub enum DomainError {
    #[error("conflict: {0}")]
    Conflict(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("transient error: {0}")]
    Transient(String),
}

pub type Result<T> = std::result::Result<T, DomainError>;
