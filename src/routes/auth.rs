//! Login, callback and logout

use std::sync::Arc;

use axum::{
    extract::{Query, State},
    response::Response,
};
use serde::Deserialize;
use tracing::{info, warn};

use super::found;
use crate::error::{ApiError, Error};
use crate::session::Session;
use crate::state::AppState;

const LOGIN_ERROR: &str = "Authentication error";
const CALLBACK_ERROR: &str = "Authentication callback error";
const LOGOUT_ERROR: &str = "Logout error";

/// Query string on the redirect back from the authorization server
#[derive(Debug, Default, Deserialize)]
pub struct CallbackParams {
    /// Authorization code
    pub code: Option<String>,
    /// OAuth error code
    pub error: Option<String>,
    /// Human-readable error detail
    pub error_description: Option<String>,
}

/// GET /auth/login - push the authorization request and redirect to the IdP
pub async fn login(
    State(state): State<Arc<AppState>>,
    mut session: Session,
) -> Result<Response, ApiError> {
    let url = state
        .flow
        .initiate(&mut session)
        .await
        .map_err(ApiError::with(LOGIN_ERROR))?;

    info!(host = url.host_str().unwrap_or_default(), "Redirecting to authorization endpoint");
    Ok(found(url.as_str()))
}

/// GET /auth/callback - exchange the code and log the session in
pub async fn callback(
    State(state): State<Arc<AppState>>,
    Query(params): Query<CallbackParams>,
    mut session: Session,
) -> Result<Response, ApiError> {
    if let Some(error) = params.error {
        let message = match params.error_description {
            Some(description) => format!("{error}: {description}"),
            None => error,
        };
        return Err(ApiError::new(CALLBACK_ERROR, Error::BadRequest(message)));
    }

    let code = params.code.filter(|c| !c.is_empty()).ok_or_else(|| {
        ApiError::new(
            CALLBACK_ERROR,
            Error::BadRequest("No authorization code received".to_string()),
        )
    })?;

    let verifier = session.code_verifier.clone().ok_or_else(|| {
        ApiError::new(
            CALLBACK_ERROR,
            Error::Session("Code verifier not found in session".to_string()),
        )
    })?;

    let token = state
        .flow
        .exchange_code(&code, &verifier)
        .await
        .map_err(ApiError::with(CALLBACK_ERROR))?;

    session.access_token = Some(token.access_token);
    session.is_logged_in = true;
    session.code_verifier = None;
    session.save().map_err(ApiError::with(CALLBACK_ERROR))?;

    info!("Login complete");
    Ok(found(&state.client.post_login_route))
}

/// GET /auth/logout - clear the session, then redirect
pub async fn logout(
    State(state): State<Arc<AppState>>,
    mut session: Session,
) -> Result<Response, ApiError> {
    let had_token = session.logout().map_err(ApiError::with(LOGOUT_ERROR))?;
    let local = &state.client.post_logout_route;

    if !(state.idp_logout && had_token) {
        return Ok(found(local));
    }

    match state.flow.end_session_url().await {
        Ok(Some(url)) => {
            info!(host = url.host_str().unwrap_or_default(), "Redirecting to end-session endpoint");
            Ok(found(url.as_str()))
        }
        Ok(None) => Ok(found(local)),
        Err(e) => {
            warn!(error = %e, "End-session discovery failed, using local logout");
            Ok(found(local))
        }
    }
}
