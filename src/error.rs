//! Domain error taxonomy shared by the scheduling, occupancy and ledger
//! modules. The HTTP layer maps each variant onto a status code.

use crate::db::DatabaseError;

#[derive(Debug, thiserror::Error)]
pub enum ServiceError {
    /// Missing or malformed caller input.
    #[error("{0}")]
    InvalidInput(String),

    /// A referenced record does not exist or is no longer active.
    #[error("{entity} not found: {id}")]
    NotFound { entity: &'static str, id: String },

    /// The write would break a uniqueness invariant.
    #[error("{0}")]
    Conflict(String),

    #[error(transparent)]
    Database(#[from] DatabaseError),
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

    /// Map a failed write, reporting a uniqueness violation as `Conflict`
    /// with `message`.
    pub fn from_write(err: DatabaseError, message: &str) -> Self {
        match err {
            DatabaseError::UniqueViolation(detail) => {
                tracing::warn!(%detail, "{message}");
                ServiceError::Conflict(message.to_string())
            }
            other => ServiceError::Database(other),
        }
    }
}

/// Parse a record identifier, reporting malformed input instead of a
/// storage failure.
pub fn parse_id(entity: &'static str, raw: &str) -> Result<uuid::Uuid, ServiceError> {
    uuid::Uuid::parse_str(raw.trim())
        .map_err(|_| ServiceError::InvalidInput(format!("Invalid {entity} id: {raw}")))
}
