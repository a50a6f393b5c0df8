//! API endpoint handlers.
//!
//! Each module corresponds to one resource. Handlers parse and validate
//! the wire shape, then hand a connection to the domain modules through
//! [`ApiContext::with_db`](crate::api::types::ApiContext::with_db).

pub mod appointments;
pub mod billing;
pub mod health;
pub mod rooms;

use std::str::FromStr;

use serde_json::Value;

use crate::error::ServiceError;

/// Treat empty or whitespace-only query values as absent.
pub(crate) fn present(raw: Option<String>) -> Option<String> {
    raw.filter(|v| !v.trim().is_empty())
}

/// Parse an enum-valued field, reporting unknown values as invalid input.
pub(crate) fn parse_enum<T: FromStr>(field: &str, raw: &str) -> Result<T, ServiceError> {
    raw.trim()
        .parse()
        .map_err(|_| ServiceError::invalid(format!("Invalid {field}: {raw:?}")))
}

/// Read a JSON field that clients send either as a string or a number
/// (room and bed numbers, invoice numbers).
pub(crate) fn text_field(field: &str, value: Option<Value>) -> Result<Option<String>, ServiceError> {
    match value {
        None | Some(Value::Null) => Ok(None),
        Some(Value::String(s)) => Ok(Some(s)),
        Some(Value::Number(n)) => Ok(Some(n.to_string())),
        Some(_) => Err(ServiceError::invalid(format!(
            "{field} must be a string or a number"
        ))),
    }
}
