//! Metrics module
//!
//! Prometheus counters for authentication outcomes, key rotation and signing.

use lazy_static::lazy_static;
use prometheus::{register_counter, register_counter_vec, Counter, CounterVec, Encoder, TextEncoder};

lazy_static! {
    // Auth metrics
    pub static ref AUTH_ATTEMPTS: CounterVec = register_counter_vec!(
        "komainu_auth_attempts_total",
        "Authentication attempts by outcome",
        &["outcome"]
    ).unwrap();

    // Rotation metrics
    pub static ref KEY_MATCHES: CounterVec = register_counter_vec!(
        "komainu_key_matches_total",
        "Verified tokens by position of the matching key",
        &["key_index"]  // 0 is the primary key
    ).unwrap();

    // Signing metrics
    pub static ref TOKENS_SIGNED: Counter = register_counter!(
        "komainu_tokens_signed_total",
        "Total tokens signed"
    ).unwrap();
}

/// Record an authentication attempt
///
/// `outcome` is `"success"` or the error kind of the rejection.
pub fn record_auth_attempt(outcome: &str) {
    AUTH_ATTEMPTS.with_label_values(&[outcome]).inc();
}

/// Record which key of the rotation set verified a token
pub fn record_key_match(index: usize) {
    KEY_MATCHES.with_label_values(&[&index.to_string()]).inc();
}

/// Record a signed token
pub fn record_token_signed() {
    TOKENS_SIGNED.inc();
}

/// Encode every registered metric in the Prometheus text format
///
/// Returns the content type and the encoded body.
pub fn gather_text() -> Result<(String, Vec<u8>), prometheus::Error> {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    let mut buffer = Vec::new();
    encoder.encode(&metric_families, &mut buffer)?;
    Ok((encoder.format_type().to_string(), buffer))
}
