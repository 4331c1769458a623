use std::time::Duration;

use thiserror::Error;

use crate::models::OrderStatus;

/// Failures coming from the storage boundary
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("Timed out after {0:?} waiting for a pooled connection")]
    PoolTimeout(Duration),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Errors surfaced by the order, table, menu and revenue operations
#[derive(Debug, Error)]
pub enum PosError {
    #[error("{entity} not found: {id}")]
    NotFound { entity: &'static str, id: i64 },

    #[error("Order not found: {0}")]
    OrderNotFound(i64),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Order {id} is already {status}")]
    AlreadyFinalized { id: i64, status: OrderStatus },

    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    #[error("Persistence error: {0}")]
    Persistence(#[from] StorageError),
}

impl PosError {
    pub fn not_found(entity: &'static str, id: i64) -> Self {
        PosError::NotFound { entity, id }
    }

    pub fn invalid(msg: impl Into<String>) -> Self {
        PosError::InvalidInput(msg.into())
    }

    pub fn is_persistence(&self) -> bool {
        matches!(self, PosError::Persistence(_))
    }
}

impl From<rusqlite::Error> for PosError {
    fn from(err: rusqlite::Error) -> Self {
        PosError::Persistence(StorageError::Sqlite(err))
    }
}

pub type PosResult<T> = Result<T, PosError>;
