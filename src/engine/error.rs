use ulid::Ulid;

use crate::model::TimeOfDayError;

/// Coarse classification the transport maps onto status codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    NotFound,
    Conflict,
    InvalidInput,
    StoreFailure,
}

#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error("{entity} not found: {id}")]
    NotFound { entity: &'static str, id: Ulid },
    #[error("conflict with reservation: {0}")]
    Conflict(Ulid),
    #[error("invalid input: {0}")]
    InvalidInput(String),
    #[error(transparent)]
    InvalidTime(#[from] TimeOfDayError),
    #[error("limit exceeded: {0}")]
    LimitExceeded(&'static str),
    #[error("store failure: {0}")]
    StoreFailure(String),
}

impl EngineError {
    pub fn not_found(entity: &'static str, id: Ulid) -> Self {
        EngineError::NotFound { entity, id }
    }

    pub fn invalid(msg: impl Into<String>) -> Self {
        EngineError::InvalidInput(msg.into())
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            EngineError::NotFound { .. } => ErrorKind::NotFound,
            EngineError::Conflict(_) => ErrorKind::Conflict,
            EngineError::InvalidInput(_)
            | EngineError::InvalidTime(_)
            | EngineError::LimitExceeded(_) => ErrorKind::InvalidInput,
            EngineError::StoreFailure(_) => ErrorKind::StoreFailure,
        }
    }
}
