//! Authentication module
//!
//! Bearer-token authentication backed by an ordered set of trusted keys.
//!
//! The pieces, in the order a request flows through them:
//!
//! - [`extract::TokenExtractor`] pulls the raw token from the request
//! - [`jwt::JwtKeyring`] verifies it against every key of the [`keys::KeyStore`]
//! - [`context::RequestContext`] memoizes the outcome for the rest of the request
//!
//! [`TokenAuthenticator`] ties them together and is the object a hosting
//! application builds once at startup.

use hyper::StatusCode;
use std::collections::HashMap;
use thiserror::Error;

pub mod authenticator;
pub mod context;
pub mod extract;
pub mod jwt;
pub mod keys;
pub mod options;

pub use authenticator::{AuthOptions, TokenAuthenticator};
pub use context::RequestContext;
pub use extract::{TokenExtractor, TokenGetter};
pub use jwt::{DecodedToken, JwtKeyring};
pub use keys::{Credential, KeyStore};
pub use options::{HeaderOptions, SignOptions};

/// Claim set carried by a token.
pub type Claims = serde_json::Map<String, serde_json::Value>;

/// Message used when neither the header nor a custom getter produced a token.
pub const MISSING_TOKEN_MESSAGE: &str = "No authorization token was found";

/// Message used when the header does not carry the expected scheme.
pub const INVALID_AUTHORIZATION_MESSAGE: &str = "Invalid authorization";

/// Authentication errors
#[derive(Error, Debug, Clone, PartialEq)]
pub enum AuthError {
    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("{}", MISSING_TOKEN_MESSAGE)]
    MissingCredential,

    #[error("{}", INVALID_AUTHORIZATION_MESSAGE)]
    InvalidAuthorization,

    #[error("{0}")]
    Verification(#[from] VerifyError),

    #[error("Signing failed: {0}")]
    Signing(String),
}

impl AuthError {
    /// HTTP status a hosting layer should abort the request with.
    ///
    /// Every per-request failure maps to 401; only setup and signing
    /// problems are server errors.
    pub fn status(&self) -> StatusCode {
        match self {
            AuthError::MissingCredential
            | AuthError::InvalidAuthorization
            | AuthError::Verification(_) => StatusCode::UNAUTHORIZED,
            AuthError::Configuration(_) | AuthError::Signing(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }

    /// Short label for metrics and logs.
    pub fn kind(&self) -> &'static str {
        match self {
            AuthError::Configuration(_) => "configuration",
            AuthError::MissingCredential => "missing",
            AuthError::InvalidAuthorization => "invalid_authorization",
            AuthError::Verification(_) => "verification_failed",
            AuthError::Signing(_) => "signing",
        }
    }
}

/// Why a token failed verification against a key.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum VerifyError {
    #[error("invalid signature")]
    InvalidSignature,

    #[error("jwt expired")]
    Expired,

    #[error("jwt not active")]
    NotYetValid,

    #[error("jwt audience invalid")]
    InvalidAudience,

    #[error("jwt issuer invalid")]
    InvalidIssuer,

    #[error("jwt subject invalid")]
    InvalidSubject,

    #[error("jwt id invalid")]
    InvalidJwtId,

    #[error("invalid algorithm")]
    InvalidAlgorithm,

    /// A time claim (`exp` or `nbf`) that is present but not a number
    #[error("invalid {0} value")]
    InvalidTimeClaim(&'static str),

    #[error("jwt malformed: {0}")]
    Malformed(String),
}

impl From<jsonwebtoken::errors::Error> for VerifyError {
    fn from(e: jsonwebtoken::errors::Error) -> Self {
        use jsonwebtoken::errors::ErrorKind;

        match e.kind() {
            ErrorKind::InvalidSignature => VerifyError::InvalidSignature,
            ErrorKind::ExpiredSignature => VerifyError::Expired,
            ErrorKind::ImmatureSignature => VerifyError::NotYetValid,
            ErrorKind::InvalidAudience => VerifyError::InvalidAudience,
            ErrorKind::InvalidIssuer => VerifyError::InvalidIssuer,
            ErrorKind::InvalidSubject => VerifyError::InvalidSubject,
            ErrorKind::InvalidAlgorithm | ErrorKind::MissingAlgorithm => {
                VerifyError::InvalidAlgorithm
            }
            ErrorKind::MissingRequiredClaim(claim) => match claim.as_str() {
                "aud" => VerifyError::InvalidAudience,
                "iss" => VerifyError::InvalidIssuer,
                "sub" => VerifyError::InvalidSubject,
                other => VerifyError::Malformed(format!("missing required claim: {}", other)),
            },
            _ => VerifyError::Malformed(e.to_string()),
        }
    }
}

/// Authentication request context
///
/// The part of an HTTP request the authenticator needs. Header names are
/// stored lowercased.
#[derive(Debug, Clone, Default)]
pub struct AuthRequest {
    pub headers: HashMap<String, String>,
    pub query: Option<String>,
    pub method: String,
    pub path: String,
}

impl AuthRequest {
    pub fn new(method: &str, path: &str) -> Self {
        Self {
            headers: HashMap::new(),
            query: None,
            method: method.to_string(),
            path: path.to_string(),
        }
    }

    #[must_use]
    pub fn with_header(mut self, name: &str, value: &str) -> Self {
        self.headers.insert(name.to_lowercase(), value.to_string());
        self
    }

    #[must_use]
    pub fn with_query(mut self, query: &str) -> Self {
        self.query = Some(query.to_string());
        self
    }

    /// Get a header value by name (case-insensitive)
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(&name.to_lowercase()).map(String::as_str)
    }

    /// Get a decoded query parameter value
    pub fn query_param(&self, name: &str) -> Option<String> {
        let query = self.query.as_deref()?;
        query.split('&').find_map(|pair| {
            let mut kv = pair.splitn(2, '=');
            let key = kv.next()?;
            if key != name {
                return None;
            }
            let value = kv.next().unwrap_or("");
            Some(
                percent_encoding::percent_decode_str(value)
                    .decode_utf8_lossy()
                    .into_owned(),
            )
        })
    }

    /// Build from a hyper request
    ///
    /// Header values that are not valid UTF-8 are kept with the invalid bytes
    /// replaced, so a garbled credential is rejected rather than treated as
    /// absent.
    pub fn from_http<B>(req: &hyper::Request<B>) -> Self {
        let headers = req
            .headers()
            .iter()
            .map(|(name, value)| {
                (
                    name.as_str().to_lowercase(),
                    String::from_utf8_lossy(value.as_bytes()).into_owned(),
                )
            })
            .collect();

        Self {
            headers,
            query: req.uri().query().map(|q| q.to_string()),
            method: req.method().to_string(),
            path: req.uri().path().to_string(),
        }
    }
}
