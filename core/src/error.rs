use sled::transaction::{ConflictableTransactionError, ConflictableTransactionResult, TransactionError};
use thiserror::Error;

/// Failure reported by a Store or Index operation. Absence of a record is
/// never an error; lookups return `Ok(None)` or `Ok(false)` instead.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("storage error: {0}")]
    Storage(#[from] sled::Error),
    #[error("row encoding error: {0}")]
    Encoding(#[from] bincode::Error),
    #[error("corrupt record: {0}")]
    Corrupt(String),
}

pub type Result<T> = std::result::Result<T, StoreError>;

impl From<TransactionError<StoreError>> for StoreError {
    fn from(err: TransactionError<StoreError>) -> Self {
        match err {
            TransactionError::Abort(inner) => inner,
            TransactionError::Storage(inner) => StoreError::Storage(inner),
        }
    }
}

pub(crate) type TxResult<T> = ConflictableTransactionResult<T, StoreError>;

/// Abort the surrounding transaction; every staged write is discarded.
pub(crate) fn tx_abort(err: impl Into<StoreError>) -> ConflictableTransactionError<StoreError> {
    ConflictableTransactionError::Abort(err.into())
}
