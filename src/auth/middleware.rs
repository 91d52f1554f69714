//! Axum middleware that runs every HTTP request through the gateway.

use std::sync::Arc;

use axum::body::{Body, Bytes};
use axum::extract::{Request, State};
use axum::http::{Method, StatusCode};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use http_body_util::{BodyExt, LengthLimitError, Limited};
use serde_json::Value;

use crate::auth::gateway::{AuthDecision, AuthorizationGateway, InboundCall};

/// Largest protocol body buffered for classification.
pub const MAX_BODY_BYTES: usize = 4 * 1024 * 1024;

/// Use with `axum::middleware::from_fn_with_state`.
///
/// POSTs to the protocol endpoint are buffered so the classifier can read the
/// JSON-RPC method; the same bytes are handed on to the inner service.
pub async fn authorize_request(
    State(gateway): State<Arc<AuthorizationGateway>>,
    req: Request,
    next: Next,
) -> Response {
    if !gateway.is_enabled() {
        return next.run(req).await;
    }

    let (parts, body) = req.into_parts();
    let (body, rpc) =
        if parts.method == Method::POST && gateway.is_protocol_path(parts.uri.path()) {
            match buffer_body(body).await {
                Ok(bytes) => {
                    let rpc = serde_json::from_slice::<Value>(&bytes).ok();
                    (Body::from(bytes), rpc)
                }
                Err(response) => return response,
            }
        } else {
            (body, None)
        };

    let decision = gateway
        .authorize(&InboundCall {
            http_method: parts.method.as_str(),
            path: parts.uri.path(),
            headers: &parts.headers,
            body: rpc.as_ref(),
        })
        .await;
    if !decision.allowed {
        return decision.into_response();
    }

    next.run(Request::from_parts(parts, body)).await
}

async fn buffer_body(body: Body) -> Result<Bytes, Response> {
    match Limited::new(body, MAX_BODY_BYTES).collect().await {
        Ok(collected) => Ok(collected.to_bytes()),
        Err(e) if e.is::<LengthLimitError>() => {
            tracing::warn!(limit = MAX_BODY_BYTES, "request body over limit");
            Err(AuthDecision::deny(StatusCode::PAYLOAD_TOO_LARGE, "request body too large")
                .into_response())
        }
        Err(e) => {
            tracing::warn!(error = %e, "failed to buffer request body");
            Err(AuthDecision::deny(StatusCode::BAD_REQUEST, "unreadable request body")
                .into_response())
        }
    }
}
