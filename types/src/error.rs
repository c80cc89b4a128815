use thiserror::Error;

/// Errors raised while constructing value types.
#[derive(Debug, Error)]
pub enum TypesError {
    #[error("invalid identifier: {0:?}")]
    InvalidIdentifier(String),

    #[error("empty operation payload")]
    EmptyPayload,
}
