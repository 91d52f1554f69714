//! Per-call allow/deny decisions for the HTTP transport.

use std::sync::Arc;

use axum::http::{header, HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use serde_json::Value;

use crate::auth::classifier;
use crate::auth::token::{TokenValidator, MISSING_AUTHORIZATION};
use crate::catalog::CatalogHandle;

/// Headers that may appear in deny diagnostics. Everything else is withheld.
const DIAGNOSTIC_HEADERS: &[&str] = &[
    "accept",
    "content-type",
    "user-agent",
    "mcp-session-id",
    "mcp-protocol-version",
    "x-request-id",
    "x-forwarded-for",
];

/// Result of authorizing one call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthDecision {
    pub allowed: bool,
    pub code: u16,
    pub message: String,
}

impl AuthDecision {
    pub fn allow() -> Self {
        Self {
            allowed: true,
            code: StatusCode::OK.as_u16(),
            message: String::new(),
        }
    }

    pub fn deny(code: StatusCode, message: impl Into<String>) -> Self {
        Self {
            allowed: false,
            code: code.as_u16(),
            message: message.into(),
        }
    }
}

impl IntoResponse for AuthDecision {
    fn into_response(self) -> Response {
        let status = StatusCode::from_u16(self.code).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        (status, self.message).into_response()
    }
}

/// What the gateway needs to know about an inbound call.
pub struct InboundCall<'a> {
    /// HTTP method, used only for diagnostics.
    pub http_method: &'a str,
    pub path: &'a str,
    pub headers: &'a HeaderMap,
    /// Parsed JSON-RPC body, when the call targets the protocol endpoint.
    pub body: Option<&'a Value>,
}

/// Composes the public-request classifier and the token validator.
///
/// Built once at startup with everything it needs; the enabled switch is
/// fixed for the gateway's lifetime.
pub struct AuthorizationGateway {
    enabled: bool,
    protocol_path: String,
    validator: Arc<dyn TokenValidator>,
    catalog: CatalogHandle,
}

impl AuthorizationGateway {
    pub fn new(
        enabled: bool,
        protocol_path: impl Into<String>,
        validator: Arc<dyn TokenValidator>,
        catalog: CatalogHandle,
    ) -> Self {
        let protocol_path = protocol_path.into();
        if enabled {
            tracing::info!(path = %protocol_path, "authorization gateway enabled");
        } else {
            tracing::warn!("authorization gateway disabled by configuration; all requests are allowed");
        }
        Self {
            enabled,
            protocol_path,
            validator,
            catalog,
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Whether `path` is the multiplexed protocol endpoint (trailing slash tolerated).
    pub fn is_protocol_path(&self, path: &str) -> bool {
        path == self.protocol_path || path.strip_suffix('/') == Some(self.protocol_path.as_str())
    }

    pub async fn authorize(&self, call: &InboundCall<'_>) -> AuthDecision {
        if !self.enabled {
            return AuthDecision::allow();
        }

        if self.is_protocol_path(call.path) {
            if let Some(body) = call.body {
                let catalog = self.catalog.read().await.clone();
                if classifier::is_public_body(body, &catalog) {
                    tracing::debug!(
                        methods = ?classifier::rpc_methods(body),
                        "public request, skipping token validation"
                    );
                    return AuthDecision::allow();
                }
            }
        }

        let Some(token) = extract_bearer_token(call.headers) else {
            return self.deny(call, StatusCode::BAD_REQUEST, MISSING_AUTHORIZATION);
        };

        let validation = self.validator.validate(token).await;
        if !validation.valid {
            return self.deny(call, StatusCode::UNAUTHORIZED, validation.reason());
        }

        AuthDecision::allow()
    }

    fn deny(&self, call: &InboundCall<'_>, code: StatusCode, message: &str) -> AuthDecision {
        let methods = call.body.map(classifier::rpc_methods).unwrap_or_default();
        tracing::warn!(
            http_method = %call.http_method,
            path = %call.path,
            rpc_methods = ?methods,
            headers = ?diagnostic_headers(call.headers),
            code = code.as_u16(),
            message = %message,
            "request denied"
        );
        AuthDecision::deny(code, message)
    }
}

/// Extract the bearer token from `Authorization`.
///
/// A missing header, a non-Bearer scheme and an empty token are all "missing".
pub fn extract_bearer_token(headers: &HeaderMap) -> Option<&str> {
    let value = headers.get(header::AUTHORIZATION)?.to_str().ok()?.trim();
    let (scheme, token) = value.split_once(' ')?;
    if !scheme.eq_ignore_ascii_case("bearer") {
        return None;
    }
    Some(token.trim()).filter(|t| !t.is_empty())
}

/// Allow-listed headers for diagnostics, in request order.
fn diagnostic_headers(headers: &HeaderMap) -> Vec<(&str, &str)> {
    headers
        .iter()
        .filter(|(name, _)| DIAGNOSTIC_HEADERS.contains(&name.as_str()))
        .map(|(name, value)| (name.as_str(), value.to_str().unwrap_or("<non-ascii>")))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::token::TokenValidation;
    use crate::catalog::{catalog_handle, Catalog};
    use async_trait::async_trait;
    use axum::http::HeaderValue;
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Accepts "good", rejects everything else with "token expired".
    #[derive(Default)]
    struct CountingValidator {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl TokenValidator for CountingValidator {
        async fn validate(&self, token: &str) -> TokenValidation {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if token == "good" {
                TokenValidation::valid()
            } else {
                TokenValidation::invalid("token expired")
            }
        }
    }

    fn gateway(enabled: bool) -> (AuthorizationGateway, Arc<CountingValidator>) {
        let catalog = Catalog::from_toml(
            r#"
            [[resources]]
            uri = "docs://open"
            name = "open"
            require_auth = false

            [[resources]]
            uri = "docs://locked"
            name = "locked"
            "#,
        )
        .unwrap();
        let validator = Arc::new(CountingValidator::default());
        let gateway =
            AuthorizationGateway::new(enabled, "/mcp", validator.clone(), catalog_handle(catalog));
        (gateway, validator)
    }

    fn headers(authorization: Option<&str>) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(header::CONTENT_TYPE, HeaderValue::from_static("application/json"));
        if let Some(value) = authorization {
            headers.insert(header::AUTHORIZATION, HeaderValue::from_str(value).unwrap());
        }
        headers
    }

    async fn authorize(
        gateway: &AuthorizationGateway,
        path: &str,
        authorization: Option<&str>,
        body: Option<Value>,
    ) -> AuthDecision {
        let headers = headers(authorization);
        let call = InboundCall {
            http_method: "POST",
            path,
            headers: &headers,
            body: body.as_ref(),
        };
        gateway.authorize(&call).await
    }

    #[tokio::test]
    async fn test_disabled_gateway_allows_everything() {
        let (gateway, validator) = gateway(false);
        let body = json!({"method": "tools/call"});
        assert!(authorize(&gateway, "/mcp", None, Some(body.clone())).await.allowed);
        assert!(authorize(&gateway, "/mcp", Some("Bearer bad"), Some(body)).await.allowed);
        assert!(authorize(&gateway, "/other", None, None).await.allowed);
        assert_eq!(validator.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_public_call_skips_validator() {
        let (gateway, validator) = gateway(true);
        let list = json!({"jsonrpc": "2.0", "id": 1, "method": "resources/list"});
        let read = json!({"jsonrpc": "2.0", "id": 2, "method": "resources/read", "params": {"uri": "docs://open"}});
        assert!(authorize(&gateway, "/mcp", None, Some(list)).await.allowed);
        assert!(authorize(&gateway, "/mcp", Some("Bearer bad"), Some(read)).await.allowed);
        assert_eq!(validator.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_public_body_on_other_path_is_not_exempt() {
        let (gateway, _) = gateway(true);
        let list = json!({"method": "resources/list"});
        let decision = authorize(&gateway, "/elsewhere", None, Some(list)).await;
        assert_eq!(decision, AuthDecision::deny(StatusCode::BAD_REQUEST, MISSING_AUTHORIZATION));
    }

    #[tokio::test]
    async fn test_missing_header_is_400() {
        let (gateway, validator) = gateway(true);
        let body = json!({"method": "tools/call"});
        for authorization in [None, Some("Bearer "), Some("Basic dXNlcjpwYXNz")] {
            let decision = authorize(&gateway, "/mcp", authorization, Some(body.clone())).await;
            assert!(!decision.allowed);
            assert_eq!(decision.code, 400);
            assert_eq!(decision.message, "missing authorization header");
        }
        assert_eq!(validator.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_invalid_token_is_401_with_reason() {
        let (gateway, _) = gateway(true);
        let body = json!({"method": "resources/read", "params": {"uri": "docs://locked"}});
        let decision = authorize(&gateway, "/mcp", Some("Bearer bad"), Some(body)).await;
        assert_eq!(decision.code, 401);
        assert_eq!(decision.message, "token expired");
    }

    #[tokio::test]
    async fn test_valid_token_allowed() {
        let (gateway, validator) = gateway(true);
        let body = json!({"method": "tools/call"});
        assert!(authorize(&gateway, "/mcp", Some("bearer good"), Some(body)).await.allowed);
        assert_eq!(validator.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_catalog_swap_is_seen_by_next_call() {
        let validator = Arc::new(CountingValidator::default());
        let handle = catalog_handle(Catalog::default());
        let gateway = AuthorizationGateway::new(true, "/mcp", validator, handle.clone());
        let body = json!({"method": "prompts/get", "params": {"name": "greet"}});

        assert!(!authorize(&gateway, "/mcp", None, Some(body.clone())).await.allowed);

        let updated = Catalog::from_toml("[[prompts]]\nname = \"greet\"\nrequire_auth = false\n").unwrap();
        *handle.write().await = Arc::new(updated);
        assert!(authorize(&gateway, "/mcp", None, Some(body)).await.allowed);
    }

    #[test]
    fn test_extract_bearer_token() {
        assert_eq!(extract_bearer_token(&headers(Some("Bearer abc"))), Some("abc"));
        assert_eq!(extract_bearer_token(&headers(Some("BEARER  abc "))), Some("abc"));
        assert_eq!(extract_bearer_token(&headers(Some("Bearer"))), None);
        assert_eq!(extract_bearer_token(&headers(Some("Token abc"))), None);
        assert_eq!(extract_bearer_token(&headers(None)), None);
    }

    #[test]
    fn test_diagnostic_headers_withhold_credentials() {
        let mut map = headers(Some("Bearer secret-token"));
        map.insert("cookie", HeaderValue::from_static("session=abc"));
        map.insert("x-request-id", HeaderValue::from_static("req-1"));
        let shown = diagnostic_headers(&map);
        assert!(shown.contains(&("content-type", "application/json")));
        assert!(shown.contains(&("x-request-id", "req-1")));
        assert!(shown.iter().all(|(name, value)| *name != "authorization"
            && *name != "cookie"
            && !value.contains("secret-token")));
    }

    #[test]
    fn test_protocol_path_matching() {
        let (gateway, _) = gateway(true);
        assert!(gateway.is_protocol_path("/mcp"));
        assert!(gateway.is_protocol_path("/mcp/"));
        assert!(!gateway.is_protocol_path("/mcpx"));
        assert!(!gateway.is_protocol_path("/"));
    }
}
