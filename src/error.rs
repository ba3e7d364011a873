//! Service error type
//!
//! Every tool operation returns `ServiceResult`. The MCP layer decides how
//! each variant is surfaced to the client.

use thiserror::Error;

use crate::db::DbError;
use crate::external::{StorageError, UpstreamError};
use crate::nutrition::CalcError;

#[derive(Debug, Error)]
pub enum ServiceError {
    #[error("{0}")]
    InvalidInput(String),

    #[error("{entity} not found: {id}")]
    NotFound { entity: &'static str, id: String },

    #[error("Cannot compute targets: {0}")]
    Computation(#[from] CalcError),

    #[error(transparent)]
    Upstream(#[from] UpstreamError),

    #[error(transparent)]
    Storage(#[from] StorageError),

    #[error(transparent)]
    Database(#[from] DbError),
}

impl ServiceError {
    pub fn invalid(message: impl Into<String>) -> Self {
        ServiceError::InvalidInput(message.into())
    }

    pub fn not_found(entity: &'static str, id: impl ToString) -> Self {
        ServiceError::NotFound {
            entity,
            id: id.to_string(),
        }
    }
}

impl From<rusqlite::Error> for ServiceError {
    fn from(e: rusqlite::Error) -> Self {
        ServiceError::Database(DbError::Sqlite(e))
    }
}

pub type ServiceResult<T> = Result<T, ServiceError>;
