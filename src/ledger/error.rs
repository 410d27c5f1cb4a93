use std::time::Duration;

use thiserror::Error;
use ulid::Ulid;

use crate::model::{Ms, RoomId};

#[derive(Debug, Error)]
pub enum LedgerError {
    #[error("invalid interval: start {start} is not before end {end}")]
    InvalidInterval { start: Ms, end: Ms },
    #[error("room not found: {0}")]
    RoomNotFound(RoomId),
    #[error("room already exists: {0}")]
    RoomExists(RoomId),
    #[error("conflict with booking: {0}")]
    Conflict(Ulid),
    #[error("limit exceeded: {0}")]
    LimitExceeded(&'static str),
    #[error("room lock not acquired within {0:?}")]
    LockTimeout(Duration),
    #[error("commit not started within {0:?}")]
    CommitTimeout(Duration),
    #[error("WAL error: {0}")]
    WalError(String),
}

impl LedgerError {
    /// Infrastructure failures a caller may retry with backoff.
    /// Conflicts are not transient and are never retryable.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            LedgerError::LockTimeout(_) | LedgerError::CommitTimeout(_) | LedgerError::WalError(_)
        )
    }
}
