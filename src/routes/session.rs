//! Session status

use axum::{Json, response::IntoResponse};
use serde_json::json;

use crate::session::Session;

/// GET /session - login flag only; tokens are never exposed
pub async fn status(session: Session) -> impl IntoResponse {
    Json(json!({ "isLoggedIn": session.is_logged_in }))
}
