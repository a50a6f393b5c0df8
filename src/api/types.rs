//! Shared types for the HTTP layer.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use rusqlite::Connection;
use serde::{Deserialize, Deserializer, Serialize};

use crate::api::error::ApiError;
use crate::core_state::CoreState;
use crate::error::ServiceError;
use crate::models::{Page, Pagination};

const RATE_WINDOW: Duration = Duration::from_secs(60);

// ═══════════════════════════════════════════════════════════
// API context: shared state for the router
// ═══════════════════════════════════════════════════════════

/// Shared context for all API routes and middleware.
#[derive(Clone)]
pub struct ApiContext {
    pub core: Arc<CoreState>,
    pub rate_limiter: Arc<Mutex<RateLimiter>>,
}

impl ApiContext {
    pub fn new(core: Arc<CoreState>) -> Self {
        let per_minute = core.config().rate_limit_per_minute;
        Self {
            core,
            rate_limiter: Arc::new(Mutex::new(RateLimiter::new(per_minute))),
        }
    }

    /// Run `work` against a fresh connection on the blocking pool.
    ///
    /// SQLite calls block, and a writer may wait on `busy_timeout`, so
    /// they stay off the async workers.
    pub async fn with_db<T, F>(&self, work: F) -> Result<T, ApiError>
    where
        T: Send + 'static,
        F: FnOnce(&Connection, &CoreState) -> Result<T, ServiceError> + Send + 'static,
    {
        let core = Arc::clone(&self.core);
        tokio::task::spawn_blocking(move || {
            let conn = core.open_db()?;
            work(&conn, &core).map_err(ApiError::from)
        })
        .await
        .map_err(|e| ApiError::Internal(format!("database task failed: {e}")))?
    }
}

// ═══════════════════════════════════════════════════════════
// Response envelope
// ═══════════════════════════════════════════════════════════

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct EnvelopeBody<T> {
    status_code: u16,
    message: &'static str,
    payload: T,
}

/// Success response: `{statusCode, message, payload}`.
pub struct Envelope<T> {
    pub status: StatusCode,
    pub message: &'static str,
    pub payload: T,
}

impl<T> Envelope<T> {
    pub fn ok(message: &'static str, payload: T) -> Self {
        Self {
            status: StatusCode::OK,
            message,
            payload,
        }
    }

    pub fn created(message: &'static str, payload: T) -> Self {
        Self {
            status: StatusCode::CREATED,
            message,
            payload,
        }
    }
}

impl<T: Serialize> IntoResponse for Envelope<T> {
    fn into_response(self) -> Response {
        let body = EnvelopeBody {
            status_code: self.status.as_u16(),
            message: self.message,
            payload: self.payload,
        };
        (self.status, Json(body)).into_response()
    }
}

/// Items of one page plus its pagination metadata.
pub fn page_parts<T>(page: Page<T>) -> (Vec<T>, Pagination) {
    let pagination = page.pagination();
    (page.items, pagination)
}

/// Deserialize a field that may be absent, `null`, or a value.
///
/// Use with `#[serde(default, deserialize_with = "double_option")]`:
/// absent → `None`, `null` → `Some(None)`, value → `Some(Some(v))`.
pub fn double_option<'de, D, T>(deserializer: D) -> Result<Option<Option<T>>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de>,
{
    Option::<T>::deserialize(deserializer).map(Some)
}

// ═══════════════════════════════════════════════════════════
// Rate limiter: per-client sliding window
// ═══════════════════════════════════════════════════════════

/// Per-client rate limiter over a one-minute sliding window.
/// A limit of 0 disables limiting.
pub struct RateLimiter {
    windows: HashMap<String, Vec<Instant>>,
    per_minute: u32,
}

impl RateLimiter {
    pub fn new(per_minute: u32) -> Self {
        Self {
            windows: HashMap::new(),
            per_minute,
        }
    }

    /// Check if a client is within its limit. Returns `Ok(())` or
    /// `Err(retry_after_secs)` if exceeded.
    pub fn check(&mut self, client: &str) -> Result<(), u64> {
        self.check_at(client, Instant::now())
    }

    fn check_at(&mut self, client: &str, now: Instant) -> Result<(), u64> {
        if self.per_minute == 0 {
            return Ok(());
        }
        // Idle clients would otherwise accumulate forever.
        if self.windows.len() > 1000 {
            self.windows
                .retain(|_, hits| hits.iter().any(|ts| now.duration_since(*ts) < RATE_WINDOW));
        }

        let hits = self.windows.entry(client.to_string()).or_default();
        hits.retain(|ts| now.duration_since(*ts) < RATE_WINDOW);

        if hits.len() >= self.per_minute as usize {
            let oldest = hits.first().copied().unwrap_or(now);
            let wait = RATE_WINDOW.saturating_sub(now.duration_since(oldest));
            return Err(wait.as_secs().max(1));
        }

        hits.push(now);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::to_bytes;

    #[test]
    fn rate_limiter_allows_under_limit() {
        let mut limiter = RateLimiter::new(20);
        assert!(limiter.check("10.0.0.1").is_ok());
        assert!(limiter.check("10.0.0.1").is_ok());
    }

    #[test]
    fn rate_limiter_rejects_over_per_minute() {
        let mut limiter = RateLimiter::new(2);
        let start = Instant::now();
        assert!(limiter.check_at("10.0.0.1", start).is_ok());
        assert!(limiter.check_at("10.0.0.1", start).is_ok());
        assert_eq!(limiter.check_at("10.0.0.1", start), Err(60));
    }

    #[test]
    fn rate_limiter_window_slides() {
        let mut limiter = RateLimiter::new(1);
        let start = Instant::now();
        assert!(limiter.check_at("10.0.0.1", start).is_ok());
        assert_eq!(
            limiter.check_at("10.0.0.1", start + Duration::from_secs(45)),
            Err(15)
        );
        assert!(limiter
            .check_at("10.0.0.1", start + Duration::from_secs(61))
            .is_ok());
    }

    #[test]
    fn rate_limiter_isolates_clients() {
        let mut limiter = RateLimiter::new(1);
        assert!(limiter.check("10.0.0.1").is_ok());
        assert!(limiter.check("10.0.0.2").is_ok());
        assert!(limiter.check("10.0.0.1").is_err());
    }

    #[test]
    fn zero_limit_disables_limiting() {
        let mut limiter = RateLimiter::new(0);
        for _ in 0..100 {
            assert!(limiter.check("10.0.0.1").is_ok());
        }
    }

    #[derive(Deserialize)]
    struct Patch {
        #[serde(default, deserialize_with = "double_option")]
        patient: Option<Option<String>>,
    }

    #[test]
    fn double_option_distinguishes_absent_null_and_value() {
        let absent: Patch = serde_json::from_str("{}").unwrap();
        let null: Patch = serde_json::from_str(r#"{"patient":null}"#).unwrap();
        let value: Patch = serde_json::from_str(r#"{"patient":"p1"}"#).unwrap();
        assert_eq!(absent.patient, None);
        assert_eq!(null.patient, Some(None));
        assert_eq!(value.patient, Some(Some("p1".to_string())));
    }

    #[tokio::test]
    async fn envelope_wraps_payload() {
        let response = Envelope::created("Room created successfully", serde_json::json!({"id": 1}))
            .into_response();
        assert_eq!(response.status(), StatusCode::CREATED);
        let body = to_bytes(response.into_body(), 4096).await.unwrap();
        let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(json["statusCode"], 201);
        assert_eq!(json["message"], "Room created successfully");
        assert_eq!(json["payload"]["id"], 1);
    }
}
