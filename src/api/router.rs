//! HTTP router.
//!
//! Returns a composable `Router` with every resource nested under `/api/`.
//!
//! Middleware stack (outermost → innermost):
//! 1. CORS → 2. Access log → 3. Rate limiter → Handler

use std::sync::Arc;

use axum::http::{header, HeaderValue, Method, StatusCode};
use axum::routing::{get, post, put};
use axum::Router;
use tower_http::cors::CorsLayer;

use crate::api::endpoints;
use crate::api::error::ErrorBody;
use crate::api::middleware;
use crate::api::types::ApiContext;
use crate::core_state::CoreState;

/// Build the API router.
///
/// Middleware uses `Extension<ApiContext>` (injected outside the
/// middleware layers). Endpoint handlers use `State<ApiContext>`.
pub fn api_router(core: Arc<CoreState>) -> Router {
    build_router(ApiContext::new(core))
}

pub fn build_router(ctx: ApiContext) -> Router {
    // NOTE: Path params use `:param` syntax (matchit 0.7 / axum 0.7).
    // Static segments (`/appointments/slots`, `/billing/create`) win over
    // the `:id` captures next to them.
    let api = Router::new()
        .route("/health", get(endpoints::health::check))
        .route(
            "/appointments",
            get(endpoints::appointments::list).post(endpoints::appointments::create),
        )
        .route("/appointments/slots", get(endpoints::appointments::slots))
        .route(
            "/appointments/:id",
            get(endpoints::appointments::detail)
                .put(endpoints::appointments::update)
                .delete(endpoints::appointments::remove),
        )
        .route(
            "/rooms",
            get(endpoints::rooms::list).post(endpoints::rooms::create),
        )
        .route(
            "/rooms/:id",
            get(endpoints::rooms::detail)
                .put(endpoints::rooms::update)
                .delete(endpoints::rooms::remove),
        )
        .route("/rooms/:id/assign", post(endpoints::rooms::assign))
        .route("/rooms/:id/discharge", post(endpoints::rooms::discharge))
        .route("/billing", get(endpoints::billing::list))
        .route("/billing/create", post(endpoints::billing::create))
        .route("/billing/edit/:id", put(endpoints::billing::edit))
        .route(
            "/billing/:id",
            get(endpoints::billing::detail).delete(endpoints::billing::remove),
        )
        .with_state(ctx.clone());

    let cors = cors_layer(&ctx.core.config().client_url);

    Router::new()
        .nest("/api", api)
        .fallback(route_not_found)
        // Middleware stack (innermost first, outermost last):
        .layer(axum::middleware::from_fn(middleware::rate::limit))
        .layer(axum::middleware::from_fn(middleware::audit::log_access))
        // Extension must sit outside the middleware that extracts ApiContext
        .layer(axum::Extension(ctx))
        .layer(cors)
}

fn cors_layer(client_url: &str) -> CorsLayer {
    let layer = CorsLayer::new()
        .allow_credentials(true)
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PUT,
            Method::DELETE,
            Method::OPTIONS,
        ])
        .allow_headers([header::CONTENT_TYPE, header::AUTHORIZATION]);

    match HeaderValue::from_str(client_url) {
        Ok(origin) => layer.allow_origin(origin),
        Err(e) => {
            tracing::warn!(client_url, error = %e, "invalid client URL, cross-origin requests disabled");
            layer
        }
    }
}

async fn route_not_found() -> (StatusCode, axum::Json<ErrorBody>) {
    (
        StatusCode::NOT_FOUND,
        axum::Json(ErrorBody {
            status_code: StatusCode::NOT_FOUND.as_u16(),
            message: "404 route not found".to_string(),
        }),
    )
}
