//! IB1 message intake
//!
//! The load balancer verifies the sender's client certificate and forwards
//! it in [`CLIENT_CERT_HEADER`]; this handler only decodes it.

use axum::{
    Json,
    body::Bytes,
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
};
use serde_json::{Value, json};
use tracing::{info, warn};

use crate::tls::{CLIENT_CERT_HEADER, SenderIdentity};

/// Field every message must carry
pub const MESSAGE_FIELD: &str = "ib1:message";

/// POST /api/perseus/messages
pub async fn receive(headers: HeaderMap, body: Bytes) -> Response {
    let Some(header) = headers.get(CLIENT_CERT_HEADER) else {
        return reply(StatusCode::FORBIDDEN, json!({ "error": "No client certificate provided" }));
    };

    let sender = match header
        .to_str()
        .map_err(|e| crate::Error::Certificate(format!("Client certificate header is not valid text: {e}")))
        .and_then(SenderIdentity::from_header)
    {
        Ok(sender) => sender,
        Err(e) => {
            warn!(error = %e, "Rejected client certificate");
            return reply(
                StatusCode::FORBIDDEN,
                json!({ "error": "Invalid client certificate", "message": e.to_string() }),
            );
        }
    };

    let Ok(mut message) = serde_json::from_slice::<Value>(&body) else {
        return reply(StatusCode::BAD_REQUEST, json!({ "error": "Invalid JSON body" }));
    };

    let Some(fields) = message
        .as_object_mut()
        .filter(|fields| fields.get(MESSAGE_FIELD).is_some_and(is_truthy))
    else {
        return reply(
            StatusCode::BAD_REQUEST,
            json!({ "error": format!("Missing required field: {MESSAGE_FIELD}") }),
        );
    };

    fields.insert("sender".to_string(), json!(&sender));
    info!(
        application = %sender.application,
        member = %sender.member,
        message = %message,
        "Received IB1 message"
    );

    reply(StatusCode::OK, json!({ "status": "ok" }))
}

fn reply(status: StatusCode, body: Value) -> Response {
    (status, Json(body)).into_response()
}

/// JSON truthiness: everything except `null`, `false`, `0` and `""`
fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().is_some_and(|f| f != 0.0),
        Value::String(s) => !s.is_empty(),
        Value::Array(_) | Value::Object(_) => true,
    }
}
