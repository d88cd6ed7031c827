use thiserror::Error;

use crate::types::ItemKindParseError;

/// Failures a catalog or collection operation can report to its caller.
/// A rejected duplicate add is not in here: it is a normal outcome.
#[derive(Debug, Error)]
pub enum MonetaError {
    #[error("{0}")]
    NotFound(String),
    #[error("{0}")]
    Forbidden(String),
    #[error("invalid item kind: {0:?}")]
    InvalidItemKind(String),
    #[error("{0}")]
    Validation(String),
    #[error("storage error: {0:#}")]
    Storage(#[from] anyhow::Error),
}

impl From<ItemKindParseError> for MonetaError {
    fn from(err: ItemKindParseError) -> Self {
        MonetaError::InvalidItemKind(err.0)
    }
}

pub type Result<T, E = MonetaError> = std::result::Result<T, E>;
