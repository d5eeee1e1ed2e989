//! Request routing
//!
//! # Endpoints
//!
//! * `GET /health` - Health check (returns "ok")
//! * `GET /metrics` - Prometheus text, when metrics are enabled
//! * `POST /auth` - Signs the JSON object in the body and returns the token
//! * anything else - Requires a valid token; returns the verified claims as
//!   `{"<use_property>": {...}}`

use super::AppState;
use crate::auth::{AuthError, AuthRequest};
use crate::metrics;
use bytes::Bytes;
use http_body_util::{BodyExt, Full, Limited};
use hyper::body::Body;
use hyper::header::{CONTENT_TYPE, WWW_AUTHENTICATE};
use hyper::{Method, Request, Response, StatusCode};
use serde_json::{Map, Value};
use std::convert::Infallible;
use std::sync::Arc;
use tracing::{debug, error, warn};

/// Largest accepted `/auth` body
const MAX_AUTH_BODY: usize = 64 * 1024;

/// Route a request
pub async fn handle_request<B>(
    req: Request<B>,
    state: Arc<AppState>,
) -> Result<Response<Full<Bytes>>, Infallible>
where
    B: Body,
    B::Error: std::error::Error + Send + Sync + 'static,
{
    let method = req.method().clone();
    let path = req.uri().path().to_string();

    debug!("Handling {} {}", method, path);

    let response = match (&method, path.as_str()) {
        (&Method::GET, "/health") => text(StatusCode::OK, "ok"),
        (&Method::GET, "/metrics") if state.metrics_enabled => metrics_handler(),
        (&Method::POST, "/auth") => sign_handler(req, &state).await,
        _ => protected_handler(&req, &state),
    };

    Ok(response)
}

fn metrics_handler() -> Response<Full<Bytes>> {
    match metrics::gather_text() {
        Ok((content_type, body)) => Response::builder()
            .status(StatusCode::OK)
            .header(CONTENT_TYPE, content_type)
            .body(Full::new(Bytes::from(body)))
            .unwrap_or_else(|_| internal_error()),
        Err(e) => {
            error!("Failed to encode metrics: {}", e);
            text(StatusCode::INTERNAL_SERVER_ERROR, "Failed to encode metrics")
        }
    }
}

/// Issue a token for the posted claims
async fn sign_handler<B>(req: Request<B>, state: &AppState) -> Response<Full<Bytes>>
where
    B: Body,
    B::Error: std::error::Error + Send + Sync + 'static,
{
    let body = match Limited::new(req.into_body(), MAX_AUTH_BODY).collect().await {
        Ok(collected) => collected.to_bytes(),
        Err(e) => {
            warn!("Failed to read /auth body: {}", e);
            return text(StatusCode::BAD_REQUEST, "Failed to read body");
        }
    };

    let payload: Value = match serde_json::from_slice(&body) {
        Ok(value @ Value::Object(_)) => value,
        Ok(_) => return text(StatusCode::BAD_REQUEST, "Body must be a JSON object"),
        Err(e) => return text(StatusCode::BAD_REQUEST, &format!("Invalid JSON: {}", e)),
    };

    match state.authenticator.sign_token(&payload, None) {
        Ok(token) => text(StatusCode::OK, &token),
        Err(e) => {
            error!("Failed to sign token: {}", e);
            text(e.status(), &e.to_string())
        }
    }
}

/// Resolve the request's token and echo the claims
fn protected_handler<B>(req: &Request<B>, state: &AppState) -> Response<Full<Bytes>> {
    let ctx = state.authenticator.context(AuthRequest::from_http(req));

    match ctx.token() {
        Ok(claims) => {
            let mut body = Map::new();
            body.insert(ctx.property_name().to_string(), Value::Object(claims.clone()));
            Response::builder()
                .status(StatusCode::OK)
                .header(CONTENT_TYPE, "application/json")
                .body(Full::new(Bytes::from(Value::Object(body).to_string())))
                .unwrap_or_else(|_| internal_error())
        }
        Err(e) => unauthorized(&e, state.authenticator.auth_scheme()),
    }
}

fn unauthorized(err: &AuthError, scheme: &str) -> Response<Full<Bytes>> {
    let challenge = match err {
        AuthError::MissingCredential => scheme.to_string(),
        AuthError::InvalidAuthorization => format!("{} error=\"invalid_request\"", scheme),
        _ => format!("{} error=\"invalid_token\"", scheme),
    };

    Response::builder()
        .status(err.status())
        .header(CONTENT_TYPE, "text/plain")
        .header(WWW_AUTHENTICATE, challenge)
        .body(Full::new(Bytes::from(err.to_string())))
        .unwrap_or_else(|_| internal_error())
}

fn text(status: StatusCode, body: &str) -> Response<Full<Bytes>> {
    Response::builder()
        .status(status)
        .header(CONTENT_TYPE, "text/plain")
        .body(Full::new(Bytes::from(body.to_string())))
        .unwrap_or_else(|_| internal_error())
}

fn internal_error() -> Response<Full<Bytes>> {
    let mut response = Response::new(Full::new(Bytes::from_static(b"Internal Server Error")));
    *response.status_mut() = StatusCode::INTERNAL_SERVER_ERROR;
    response
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::{AuthOptions, KeyStore, TokenAuthenticator};

    fn state() -> Arc<AppState> {
        let authenticator = TokenAuthenticator::configure(
            KeyStore::from_secrets(["secretKeyxxx"]).unwrap(),
            AuthOptions::default(),
        )
        .unwrap();
        Arc::new(AppState {
            authenticator,
            metrics_enabled: false,
        })
    }

    fn request(method: Method, uri: &str, auth: Option<&str>, body: &str) -> Request<Full<Bytes>> {
        let mut builder = Request::builder().method(method).uri(uri);
        if let Some(value) = auth {
            builder = builder.header("authorization", value);
        }
        builder.body(Full::new(Bytes::from(body.to_string()))).unwrap()
    }

    async fn body_text(response: Response<Full<Bytes>>) -> String {
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        String::from_utf8(bytes.to_vec()).unwrap()
    }

    #[tokio::test]
    async fn test_health() {
        let response = handle_request(request(Method::GET, "/health", None, ""), state())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(body_text(response).await, "ok");
    }

    #[tokio::test]
    async fn test_metrics_disabled_requires_token() {
        let response = handle_request(request(Method::GET, "/metrics", None, ""), state())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn test_missing_token_challenge() {
        let response = handle_request(request(Method::GET, "/", None, ""), state())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(response.headers()[WWW_AUTHENTICATE], "Bearer");
        assert_eq!(body_text(response).await, "No authorization token was found");
    }

    #[tokio::test]
    async fn test_sign_then_access() {
        let state = state();
        let response = handle_request(
            request(Method::POST, "/auth", None, r#"{"name":"toa","_id":1}"#),
            Arc::clone(&state),
        )
        .await
        .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let token = body_text(response).await;

        let response = handle_request(
            request(Method::GET, "/", Some(&format!("Bearer {}", token)), ""),
            state,
        )
        .await
        .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let body: Value = serde_json::from_str(&body_text(response).await).unwrap();
        assert_eq!(body["token"]["name"], "toa");
        assert_eq!(body["token"]["_id"], 1);
    }

    #[tokio::test]
    async fn test_sign_rejects_non_object() {
        let response = handle_request(request(Method::POST, "/auth", None, "[1,2]"), state())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_invalid_token_challenge() {
        let response = handle_request(
            request(Method::GET, "/", Some("Bearer not.a.token"), ""),
            state(),
        )
        .await
        .unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(
            response.headers()[WWW_AUTHENTICATE],
            "Bearer error=\"invalid_token\""
        );
    }
}
