//! Token extraction
//!
//! Finds the raw token for a request. A custom getter, when configured, is
//! asked first; otherwise the `authorization` header must start with the
//! configured auth scheme.

use super::{AuthError, AuthRequest};
use crate::config::TokenSource;
use regex_lite::Regex;
use std::fmt;
use std::sync::Arc;

/// Custom token lookup run before the authorization header
pub type TokenGetter = Arc<dyn Fn(&AuthRequest) -> Option<String> + Send + Sync>;

/// Default auth scheme
pub const DEFAULT_AUTH_SCHEME: &str = "Bearer";

/// Extracts the raw token from a request
#[derive(Clone)]
pub struct TokenExtractor {
    scheme: String,
    scheme_pattern: Regex,
    getter: Option<TokenGetter>,
}

impl TokenExtractor {
    /// Create an extractor for the given auth scheme
    ///
    /// The scheme is matched literally and case-sensitively at the start of
    /// the header; regex metacharacters in it carry no special meaning.
    pub fn new(scheme: &str) -> Result<Self, AuthError> {
        if scheme.is_empty() {
            return Err(AuthError::Configuration(
                "auth scheme must not be empty".into(),
            ));
        }

        let pattern = format!("^{}", regex_lite::escape(scheme));
        let scheme_pattern = Regex::new(&pattern)
            .map_err(|e| AuthError::Configuration(format!("Invalid auth scheme: {}", e)))?;

        Ok(Self {
            scheme: scheme.to_string(),
            scheme_pattern,
            getter: None,
        })
    }

    /// Ask `getter` for a token before looking at the header
    #[must_use]
    pub fn with_getter(mut self, getter: TokenGetter) -> Self {
        self.getter = Some(getter);
        self
    }

    pub fn scheme(&self) -> &str {
        &self.scheme
    }

    pub fn has_getter(&self) -> bool {
        self.getter.is_some()
    }

    /// Extract the raw token
    ///
    /// - a non-empty token from the custom getter wins
    /// - no header (and nothing from the getter) is [`AuthError::MissingCredential`]
    /// - a header without the scheme prefix, or with nothing after it, is
    ///   [`AuthError::InvalidAuthorization`]
    pub fn extract(&self, request: &AuthRequest) -> Result<String, AuthError> {
        if let Some(getter) = &self.getter {
            if let Some(token) = getter(request).filter(|t| !t.is_empty()) {
                return Ok(token);
            }
        }

        let authorization = request
            .header("authorization")
            .ok_or(AuthError::MissingCredential)?;

        let token = match self.scheme_pattern.find(authorization) {
            Some(m) => authorization[m.end()..].trim(),
            None => return Err(AuthError::InvalidAuthorization),
        };

        if token.is_empty() {
            return Err(AuthError::InvalidAuthorization);
        }

        Ok(token.to_string())
    }
}

impl fmt::Debug for TokenExtractor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TokenExtractor")
            .field("scheme", &self.scheme)
            .field("getter", &self.getter.is_some())
            .finish()
    }
}

impl TokenSource {
    /// Turn a configured token source into a getter
    pub fn into_getter(self) -> TokenGetter {
        match self {
            TokenSource::Query { name } => Arc::new(move |req: &AuthRequest| req.query_param(&name)),
            TokenSource::Header { name } => {
                Arc::new(move |req: &AuthRequest| req.header(&name).map(|v| v.trim().to_string()))
            }
        }
    }
}
