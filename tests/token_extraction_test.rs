//! Token Extraction Integration Tests
//!
//! Scheme matching, custom getters and the 401 messages a client sees.

use komainu::auth::{AuthError, AuthOptions, AuthRequest, KeyStore, TokenAuthenticator};
use serde_json::json;
use std::sync::Arc;

fn authenticator(options: AuthOptions) -> TokenAuthenticator {
    TokenAuthenticator::configure(KeyStore::from_secrets(["secretKeyxxx"]).unwrap(), options)
        .unwrap()
}

fn request(authorization: Option<&str>) -> AuthRequest {
    let request = AuthRequest::new("GET", "/");
    match authorization {
        Some(value) => request.with_header("Authorization", value),
        None => request,
    }
}

#[test]
fn test_missing_header_message() {
    let auth = authenticator(AuthOptions::default());
    let ctx = auth.context(request(None));

    let err = ctx.token().unwrap_err();
    assert_eq!(err, AuthError::MissingCredential);
    assert_eq!(err.status(), hyper::StatusCode::UNAUTHORIZED);
    assert_eq!(err.to_string(), "No authorization token was found");
}

#[test]
fn test_wrong_scheme_message() {
    let auth = authenticator(AuthOptions::default());
    let ctx = auth.context(request(Some("Basic abc")));

    let err = ctx.token().unwrap_err();
    assert_eq!(err, AuthError::InvalidAuthorization);
    assert_eq!(err.status(), hyper::StatusCode::UNAUTHORIZED);
    assert_eq!(err.to_string(), "Invalid authorization");
}

#[test]
fn test_custom_scheme() {
    let auth = authenticator(AuthOptions::default().with_auth_scheme("Basic"));
    let token = auth.sign_token(&json!({"name": "toa"}), None).unwrap();

    let ctx = auth.context(request(Some(&format!("Basic {}", token))));
    assert_eq!(ctx.token().unwrap()["name"], "toa");

    let ctx = auth.context(request(Some(&format!("Bearer {}", token))));
    assert_eq!(ctx.token().unwrap_err(), AuthError::InvalidAuthorization);
}

#[test]
fn test_getter_preferred_over_header() {
    let auth = authenticator(AuthOptions::default());
    let good = auth.sign_token(&json!({"from": "getter"}), None).unwrap();

    let auth = authenticator(
        AuthOptions::default()
            .with_token_getter(Arc::new(move |_req: &AuthRequest| Some(good.clone()))),
    );

    // The header carries garbage; the getter's token is used instead
    let ctx = auth.context(request(Some("Bearer garbage")));
    assert_eq!(ctx.token().unwrap()["from"], "getter");
}

#[test]
fn test_getter_without_token_falls_back_to_missing() {
    let auth = authenticator(
        AuthOptions::default().with_token_getter(Arc::new(|_req: &AuthRequest| None)),
    );

    let ctx = auth.context(request(None));
    assert_eq!(ctx.token().unwrap_err(), AuthError::MissingCredential);
}

#[test]
fn test_getter_reads_query_parameter() {
    let auth = authenticator(AuthOptions::default().with_token_getter(Arc::new(
        |req: &AuthRequest| req.query_param("access_token"),
    )));
    let token = auth.sign_token(&json!({"name": "toa"}), None).unwrap();

    let ctx = auth.context(
        AuthRequest::new("GET", "/").with_query(&format!("page=2&access_token={}", token)),
    );
    assert_eq!(ctx.token().unwrap()["name"], "toa");
}

#[test]
fn test_invalid_token_reports_verifier_message() {
    let auth = authenticator(AuthOptions::default());
    let ctx = auth.context(request(Some("Bearer abc.def.ghi")));

    let err = ctx.token().unwrap_err();
    assert!(matches!(err, AuthError::Verification(_)));
    assert_eq!(err.status(), hyper::StatusCode::UNAUTHORIZED);
    assert!(!err.to_string().is_empty());
}
