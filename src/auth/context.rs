//! Per-request authentication context
//!
//! Holds the request and a slot for its verification outcome. The slot starts
//! empty and is filled the first time the token is read; every later read in
//! the same request returns the stored outcome, success or failure, without
//! extracting or verifying again.

use super::authenticator::TokenAuthenticator;
use super::{AuthError, AuthRequest, Claims, DecodedToken, SignOptions};
use crate::metrics;
use serde::Serialize;
use std::sync::OnceLock;
use tracing::{info, warn};

/// Request-scoped view of the authenticator
#[derive(Debug)]
pub struct RequestContext {
    authenticator: TokenAuthenticator,
    request: AuthRequest,
    outcome: OnceLock<Result<Claims, AuthError>>,
}

impl RequestContext {
    pub(crate) fn new(authenticator: TokenAuthenticator, request: AuthRequest) -> Self {
        Self {
            authenticator,
            request,
            outcome: OnceLock::new(),
        }
    }

    pub fn request(&self) -> &AuthRequest {
        &self.request
    }

    /// Name under which the verified claims are exposed
    pub fn property_name(&self) -> &str {
        self.authenticator.use_property()
    }

    /// Verified claims of this request, computed on first access
    pub fn token(&self) -> Result<&Claims, AuthError> {
        self.outcome
            .get_or_init(|| self.resolve())
            .as_ref()
            .map_err(Clone::clone)
    }

    /// Read a derived field by name
    ///
    /// Only the configured property name is known; any other name is `None`.
    pub fn property(&self, name: &str) -> Option<Result<&Claims, AuthError>> {
        (name == self.property_name()).then(|| self.token())
    }

    /// Whether the token has already been resolved for this request
    pub fn is_resolved(&self) -> bool {
        self.outcome.get().is_some()
    }

    pub fn sign_token<T>(&self, payload: &T, options: Option<&SignOptions>) -> Result<String, AuthError>
    where
        T: Serialize + ?Sized,
    {
        self.authenticator.sign_token(payload, options)
    }

    pub fn verify_token(&self, token: &str, options: Option<&SignOptions>) -> Result<Claims, AuthError> {
        self.authenticator.verify_token(token, options)
    }

    pub fn decode_token(&self, token: &str) -> Option<Claims> {
        self.authenticator.decode_token(token)
    }

    pub fn decode_complete(&self, token: &str) -> Option<DecodedToken> {
        self.authenticator.decode_complete(token)
    }

    fn resolve(&self) -> Result<Claims, AuthError> {
        let result = self
            .authenticator
            .extractor()
            .extract(&self.request)
            .and_then(|token| self.authenticator.verify_token(&token, None));

        match &result {
            Ok(claims) => {
                info!(
                    path = %self.request.path,
                    subject = claims.get("sub").and_then(|s| s.as_str()).unwrap_or("-"),
                    "request authenticated"
                );
                metrics::record_auth_attempt("success");
            }
            Err(e) => {
                warn!(path = %self.request.path, reason = e.kind(), "request rejected: {}", e);
                metrics::record_auth_attempt(e.kind());
            }
        }

        result
    }
}
