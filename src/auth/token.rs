//! Bearer token validation.
//!
//! The gateway only needs a yes/no and a reason. Structural and cryptographic
//! checks belong to the token-core service; [`RemoteTokenValidator`] asks it
//! over HTTP and [`StaticTokenValidator`] matches a configured token list.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::cache::TtlCache;
use crate::config::{resolve_env_ref, AuthConfig, ValidatorKind};
use crate::error::GatehouseError;

pub const MISSING_AUTHORIZATION: &str = "missing authorization header";
pub const INVALID_TOKEN: &str = "invalid token";
pub const VALIDATION_UNAVAILABLE: &str = "token validation unavailable";

/// Outcome of validating one token.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TokenValidation {
    pub valid: bool,
    pub error_reason: Option<String>,
}

impl TokenValidation {
    pub fn valid() -> Self {
        Self {
            valid: true,
            error_reason: None,
        }
    }

    pub fn invalid(reason: impl Into<String>) -> Self {
        Self {
            valid: false,
            error_reason: Some(reason.into()),
        }
    }

    /// Reason to show the caller; never empty for an invalid token.
    pub fn reason(&self) -> &str {
        self.error_reason
            .as_deref()
            .filter(|r| !r.is_empty())
            .unwrap_or(INVALID_TOKEN)
    }
}

#[async_trait]
pub trait TokenValidator: Send + Sync {
    /// Validate a raw bearer token (without the `Bearer ` prefix).
    ///
    /// Never fails: every problem, including an unreachable token service,
    /// comes back as an invalid result.
    async fn validate(&self, token: &str) -> TokenValidation;
}

/// Build the validator selected by `[auth]`.
pub fn build_token_validator(config: &AuthConfig) -> crate::Result<Arc<dyn TokenValidator>> {
    match config.validator {
        ValidatorKind::Remote => {
            let url = config.token_service_url.clone().ok_or_else(|| {
                GatehouseError::TokenValidator(
                    "remote validator requires 'token_service_url'".to_string(),
                )
            })?;
            let validator = RemoteTokenValidator::new(
                url,
                Duration::from_secs(config.request_timeout_secs),
                Duration::from_secs(config.cache_ttl_secs),
            )?;
            Ok(Arc::new(validator))
        }
        ValidatorKind::Static => {
            let tokens = config.tokens.iter().map(|t| resolve_env_ref(t)).collect();
            Ok(Arc::new(StaticTokenValidator::new(tokens)))
        }
    }
}

#[derive(Serialize)]
struct ValidateRequest<'a> {
    token: &'a str,
}

#[derive(Deserialize)]
struct ValidateResponse {
    valid: bool,
    #[serde(default)]
    reason: Option<String>,
}

/// Validates tokens by asking the token-core service.
///
/// `POST <url>` with `{"token": "..."}`, answered by
/// `{"valid": bool, "reason": "..."}`. A 401/403 answer is an invalid token;
/// anything else unexpected is "unavailable" and is not cached.
pub struct RemoteTokenValidator {
    client: reqwest::Client,
    endpoint: String,
    cache: Option<TtlCache<String, TokenValidation>>,
}

impl RemoteTokenValidator {
    /// `cache_ttl` of zero disables result caching.
    pub fn new(
        endpoint: String,
        request_timeout: Duration,
        cache_ttl: Duration,
    ) -> crate::Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(request_timeout)
            .build()
            .map_err(|e| GatehouseError::TokenValidator(e.to_string()))?;
        let cache = (!cache_ttl.is_zero()).then(|| TtlCache::new(cache_ttl));
        Ok(Self {
            client,
            endpoint,
            cache,
        })
    }

    async fn query(&self, token: &str) -> Result<TokenValidation, reqwest::Error> {
        let response = self
            .client
            .post(&self.endpoint)
            .json(&ValidateRequest { token })
            .send()
            .await?;

        let status = response.status();
        if status == reqwest::StatusCode::UNAUTHORIZED || status == reqwest::StatusCode::FORBIDDEN {
            let reason = response
                .json::<ValidateResponse>()
                .await
                .ok()
                .and_then(|body| body.reason)
                .unwrap_or_else(|| INVALID_TOKEN.to_string());
            return Ok(TokenValidation::invalid(reason));
        }

        let body: ValidateResponse = response.error_for_status()?.json().await?;
        if body.valid {
            Ok(TokenValidation::valid())
        } else {
            Ok(TokenValidation::invalid(
                body.reason.unwrap_or_else(|| INVALID_TOKEN.to_string()),
            ))
        }
    }
}

#[async_trait]
impl TokenValidator for RemoteTokenValidator {
    async fn validate(&self, token: &str) -> TokenValidation {
        if token.is_empty() {
            return TokenValidation::invalid(MISSING_AUTHORIZATION);
        }

        let result = match &self.cache {
            Some(cache) => {
                cache
                    .get_or_try_load(token.to_string(), move || self.query(token))
                    .await
            }
            None => self.query(token).await,
        };

        match result {
            Ok(validation) => validation,
            Err(e) => {
                tracing::error!(
                    endpoint = %self.endpoint,
                    error = %e,
                    "token service request failed"
                );
                TokenValidation::invalid(VALIDATION_UNAVAILABLE)
            }
        }
    }
}

/// Accepts a fixed set of tokens.
pub struct StaticTokenValidator {
    tokens: Vec<String>,
}

impl StaticTokenValidator {
    /// Empty entries (unset env vars) never match.
    pub fn new(tokens: Vec<String>) -> Self {
        let tokens: Vec<String> = tokens.into_iter().filter(|t| !t.is_empty()).collect();
        if tokens.is_empty() {
            tracing::warn!("static token validator has no usable tokens; every request will be rejected");
        }
        Self { tokens }
    }

    /// Rejects every token. For a disabled gateway, which never asks.
    pub fn deny_all() -> Self {
        Self { tokens: Vec::new() }
    }
}

#[async_trait]
impl TokenValidator for StaticTokenValidator {
    async fn validate(&self, token: &str) -> TokenValidation {
        if token.is_empty() {
            return TokenValidation::invalid(MISSING_AUTHORIZATION);
        }
        // Check every entry so timing does not reveal which one matched.
        let matched = self
            .tokens
            .iter()
            .fold(false, |acc, expected| acc | safe_equal(token, expected));
        if matched {
            TokenValidation::valid()
        } else {
            TokenValidation::invalid(INVALID_TOKEN)
        }
    }
}

/// Constant-time string comparison.
fn safe_equal(a: &str, b: &str) -> bool {
    if a.len() != b.len() {
        return false;
    }
    let diff = a
        .as_bytes()
        .iter()
        .zip(b.as_bytes())
        .fold(0u8, |acc, (x, y)| acc | (x ^ y));
    diff == 0
}
