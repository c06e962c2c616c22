//! Metering data proxy

use std::sync::Arc;

use axum::{
    Json,
    extract::{Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::Deserialize;
use serde_json::{Value, json};
use tracing::{error, info};

use crate::session::Session;
use crate::state::AppState;

/// Optional code for an inline exchange
#[derive(Debug, Default, Deserialize)]
pub struct DataParams {
    /// Authorization code
    pub code: Option<String>,
}

/// GET /api/getData
pub async fn get_data(
    State(state): State<Arc<AppState>>,
    Query(params): Query<DataParams>,
    mut session: Session,
) -> Response {
    let access_token = match session.access_token.clone() {
        Some(token) => token,
        None => {
            let Some(code) = params.code.filter(|c| !c.is_empty()) else {
                return (
                    StatusCode::UNAUTHORIZED,
                    Json(json!({ "error": "Missing access token or authorization code." })),
                )
                    .into_response();
            };

            let verifier = session.code_verifier.clone().unwrap_or_default();
            let token = match state.flow.exchange_code(&code, &verifier).await {
                Ok(token) => token,
                Err(e) => return failure("Token request failed", Some(e.details())),
            };

            session.access_token = Some(token.access_token.clone());
            session.is_logged_in = true;
            if let Err(e) = session.save() {
                return failure("Failed to save session", Some(e.to_string()));
            }
            info!("Access token obtained inline");
            token.access_token
        }
    };

    match state.resource.fetch_meter_readings(&access_token).await {
        Ok(body) => Json(body).into_response(),
        Err(e) => failure(&e.to_string(), e.details()),
    }
}

/// 500 `{error, details?}`
fn failure(message: &str, details: Option<String>) -> Response {
    error!(error = message, details = details.as_deref().unwrap_or_default(), "getData failed");
    let mut body = json!({ "error": message });
    if let (Some(details), Value::Object(map)) = (details, &mut body) {
        map.insert("details".to_string(), Value::String(details));
    }
    (StatusCode::INTERNAL_SERVER_ERROR, Json(body)).into_response()
}
