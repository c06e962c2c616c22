//! HTTP router and handlers
//!
//! | Route                      | Handler                |
//! |----------------------------|------------------------|
//! | `GET /auth/login`          | [`auth::login`]        |
//! | `GET /auth/callback`       | [`auth::callback`]     |
//! | `GET /auth/logout`         | [`auth::logout`]       |
//! | `GET /session`             | [`session::status`]    |
//! | `GET /api/getData`         | [`data::get_data`]     |
//! | `POST /api/perseus/messages` | [`messages::receive`] |

pub mod auth;
pub mod data;
pub mod messages;
pub mod session;

use std::sync::Arc;

use axum::{
    Json, Router,
    http::{StatusCode, header},
    response::{IntoResponse, Response},
    routing::{get, post},
};
use serde_json::json;
use tower_cookies::CookieManagerLayer;
use tower_http::{catch_panic::CatchPanicLayer, trace::TraceLayer};

use crate::state::AppState;

/// Create the router
pub fn create_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/health", get(health_handler))
        .route("/auth/login", get(auth::login))
        .route("/auth/callback", get(auth::callback))
        .route("/auth/logout", get(auth::logout))
        .route("/session", get(session::status))
        .route("/api/session", get(session::status))
        .route("/api/getData", get(data::get_data))
        .route("/api/perseus/messages", post(messages::receive))
        .route("/perseus/messages", post(messages::receive))
        .layer(CookieManagerLayer::new())
        .layer(CatchPanicLayer::new())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Health check
async fn health_handler() -> impl IntoResponse {
    Json(json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
    }))
}

/// 302 to `location`
pub(crate) fn found(location: &str) -> Response {
    (StatusCode::FOUND, [(header::LOCATION, location.to_string())]).into_response()
}
