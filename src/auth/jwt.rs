//! JWT signing and multi-key verification
//!
//! Supports the HMAC, RSA, RSA-PSS, ECDSA and EdDSA families provided by
//! `jsonwebtoken`. Verification walks the key store in order and stops at the
//! first key that accepts the token.

use super::keys::{KeyFamily, KeyStore};
use super::options::{check_time_claims, SignOptions};
use super::{AuthError, Claims, VerifyError};
use crate::metrics;
use base64::alphabet;
use base64::engine::general_purpose::GeneralPurpose;
use base64::engine::{DecodePaddingMode, GeneralPurposeConfig};
use base64::Engine;
use jsonwebtoken::Algorithm;
use serde::Serialize;
use serde_json::Value;
use tracing::debug;

/// base64url that accepts segments with or without padding
const SEGMENT_ENGINE: GeneralPurpose = GeneralPurpose::new(
    &alphabet::URL_SAFE,
    GeneralPurposeConfig::new()
        .with_encode_padding(false)
        .with_decode_padding_mode(DecodePaddingMode::Indifferent),
);

/// Token split into its parts without any verification
///
/// The header is kept as raw JSON so tokens with an algorithm this crate
/// cannot verify (`none`, or anything unknown) can still be inspected.
#[derive(Debug, Clone)]
pub struct DecodedToken {
    pub header: Claims,
    pub payload: Claims,
    pub signature: String,
}

impl DecodedToken {
    /// The `alg` header, when it names a supported algorithm
    pub fn algorithm(&self) -> Option<Algorithm> {
        self.header
            .get("alg")
            .and_then(|alg| serde_json::from_value(alg.clone()).ok())
    }

    /// The `kid` header
    pub fn key_id(&self) -> Option<&str> {
        self.header.get("kid").and_then(Value::as_str)
    }
}

/// Signs with the primary key and verifies against every trusted key
///
/// # Example
///
/// ```
/// use komainu::auth::{JwtKeyring, KeyStore, SignOptions};
/// use serde_json::json;
///
/// let current = JwtKeyring::new(KeyStore::from_secrets(["key-2025", "key-2024"]).unwrap());
/// let retired = JwtKeyring::new(KeyStore::from_secrets(["key-2024"]).unwrap());
///
/// // A token signed before the rotation still verifies
/// let options = SignOptions::default();
/// let token = retired.sign_token(&json!({"sub": "user123"}), &options).unwrap();
/// let claims = current.verify_token(&token, &options).unwrap();
/// assert_eq!(claims["sub"], "user123");
/// ```
#[derive(Debug, Clone)]
pub struct JwtKeyring {
    keys: KeyStore,
}

impl JwtKeyring {
    pub fn new(keys: KeyStore) -> Self {
        Self { keys }
    }

    pub fn keys(&self) -> &KeyStore {
        &self.keys
    }

    /// Sign a payload with the primary key
    ///
    /// The payload must serialize to a JSON object. Registered claims from
    /// `options` are added before signing.
    pub fn sign_token<T>(&self, payload: &T, options: &SignOptions) -> Result<String, AuthError>
    where
        T: Serialize + ?Sized,
    {
        options.validate()?;

        let primary = self.keys.primary();
        let algorithm = options.signing_algorithm(primary.family());
        if KeyFamily::of(algorithm) != primary.family() {
            return Err(AuthError::Configuration(format!(
                "algorithm {:?} cannot be used with a {:?} key",
                algorithm,
                primary.family()
            )));
        }

        let mut claims = match serde_json::to_value(payload) {
            Ok(Value::Object(map)) => map,
            Ok(_) => return Err(AuthError::Signing("payload must be a JSON object".into())),
            Err(e) => return Err(AuthError::Signing(e.to_string())),
        };
        options.apply_registered_claims(&mut claims, chrono::Utc::now().timestamp())?;

        let header = options.header(algorithm);
        let token = jsonwebtoken::encode(&header, &claims, primary.encoding_key())
            .map_err(|e| AuthError::Signing(e.to_string()))?;

        metrics::record_token_signed();
        Ok(token)
    }

    /// Verify a token against every trusted key, current key first
    ///
    /// Returns the claims from the first key that accepts the token. When all
    /// keys reject it, the error from the last key tried is returned.
    pub fn verify_token(&self, token: &str, options: &SignOptions) -> Result<Claims, AuthError> {
        options.validate()?;
        let mut last_error = None;

        for (index, key) in self.keys.keys().iter().enumerate() {
            let validation = options.validation(key.accepted_algorithms(options.algorithm));

            let result = jsonwebtoken::decode::<Claims>(token, key.decoding_key(), &validation)
                .map_err(VerifyError::from)
                .and_then(|data| {
                    check_time_claims(&data.claims)?;
                    options.check_jwtid(&data.claims)?;
                    Ok(data.claims)
                });

            match result {
                Ok(claims) => {
                    debug!(key_index = index, "token accepted");
                    metrics::record_key_match(index);
                    return Ok(claims);
                }
                Err(e) => {
                    debug!(key_index = index, error = %e, "key rejected token");
                    last_error = Some(e);
                }
            }
        }

        Err(AuthError::Verification(last_error.unwrap_or_else(|| {
            VerifyError::Malformed("no keys to verify with".into())
        })))
    }

    /// Read the payload without checking the signature
    ///
    /// Returns `None` when the token is not three segments with a JSON object
    /// header and payload. The header's `alg` is not checked.
    pub fn decode_token(&self, token: &str) -> Option<Claims> {
        decode_complete(token).map(|decoded| decoded.payload)
    }

    /// Read header, payload and signature without checking the signature
    pub fn decode_complete(&self, token: &str) -> Option<DecodedToken> {
        decode_complete(token)
    }
}

fn decode_complete(token: &str) -> Option<DecodedToken> {
    let mut segments = token.split('.');
    let (header, payload, signature) = (segments.next()?, segments.next()?, segments.next()?);
    if segments.next().is_some() {
        return None;
    }

    Some(DecodedToken {
        payload: decode_segment(payload)?,
        header: decode_segment(header)?,
        signature: signature.to_string(),
    })
}

fn decode_segment(segment: &str) -> Option<Claims> {
    let bytes = SEGMENT_ENGINE.decode(segment).ok()?;
    match serde_json::from_slice::<Value>(&bytes).ok()? {
        Value::Object(map) => Some(map),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn keyring(secrets: &[&str]) -> JwtKeyring {
        JwtKeyring::new(KeyStore::from_secrets(secrets.iter()).unwrap())
    }

    #[test]
    fn test_sign_and_verify() {
        let jwt = keyring(&["secretKeyxxx"]);
        let options = SignOptions::default().with_no_timestamp();

        let token = jwt
            .sign_token(&json!({"_id": 123, "name": "toa"}), &options)
            .unwrap();
        let claims = jwt.verify_token(&token, &options).unwrap();

        assert_eq!(Value::Object(claims), json!({"_id": 123, "name": "toa"}));
    }

    #[test]
    fn test_non_object_payload_rejected() {
        let jwt = keyring(&["secret"]);
        let result = jwt.sign_token(&json!("just a string"), &SignOptions::default());
        assert!(matches!(result, Err(AuthError::Signing(_))));
    }

    #[test]
    fn test_mismatched_algorithm_rejected() {
        let jwt = keyring(&["secret"]);
        let options = SignOptions::default().with_algorithm(Algorithm::RS256);
        let result = jwt.sign_token(&json!({}), &options);
        assert!(matches!(result, Err(AuthError::Configuration(_))));
    }

    #[test]
    fn test_last_error_reported() {
        let jwt = keyring(&["a", "b"]);
        let other = keyring(&["c"]);
        let token = other.sign_token(&json!({"x": 1}), &SignOptions::default()).unwrap();

        let result = jwt.verify_token(&token, &SignOptions::default());
        assert_eq!(
            result,
            Err(AuthError::Verification(VerifyError::InvalidSignature))
        );
    }

    #[test]
    fn test_decode_without_signature_check() {
        let signer = keyring(&["unknown"]);
        let token = signer
            .sign_token(&json!({"name": "toa"}), &SignOptions::default().with_no_timestamp())
            .unwrap();

        let jwt = keyring(&["other"]);
        let claims = jwt.decode_token(&token).unwrap();
        assert_eq!(claims["name"], json!("toa"));

        let decoded = jwt.decode_complete(&token).unwrap();
        assert_eq!(decoded.algorithm(), Some(Algorithm::HS256));
        assert_eq!(decoded.header["typ"], json!("JWT"));
        assert!(!decoded.signature.is_empty());
    }

    #[test]
    fn test_decode_unsigned_token() {
        let header = SEGMENT_ENGINE.encode(br#"{"alg":"none","typ":"JWT"}"#);
        let payload = SEGMENT_ENGINE.encode(br#"{"name":"toa","admin":true}"#);
        let token = format!("{}.{}.", header, payload);

        let jwt = keyring(&["secret"]);
        let decoded = jwt.decode_complete(&token).unwrap();
        assert_eq!(decoded.header["alg"], json!("none"));
        assert_eq!(decoded.algorithm(), None);
        assert_eq!(decoded.payload["name"], json!("toa"));
        assert!(decoded.signature.is_empty());

        // Inspectable, never trusted
        assert!(jwt.verify_token(&token, &SignOptions::default()).is_err());
    }

    #[test]
    fn test_decode_unknown_algorithm_header() {
        let header = SEGMENT_ENGINE.encode(br#"{"alg":"XS999","kid":"k1"}"#);
        let payload = SEGMENT_ENGINE.encode(br#"{"sub":"user123"}"#);
        let token = format!("{}.{}.c2ln", header, payload);

        let decoded = keyring(&["secret"]).decode_complete(&token).unwrap();
        assert_eq!(decoded.algorithm(), None);
        assert_eq!(decoded.key_id(), Some("k1"));
        assert_eq!(decoded.payload["sub"], json!("user123"));
    }

    #[test]
    fn test_string_expiry_rejected_on_verify() {
        let header = jsonwebtoken::Header::new(Algorithm::HS256);
        let key = jsonwebtoken::EncodingKey::from_secret(b"secret");
        let token = jsonwebtoken::encode(&header, &json!({"user": "toa", "exp": "1000"}), &key)
            .unwrap();

        let result = keyring(&["secret"]).verify_token(&token, &SignOptions::default());
        assert_eq!(
            result,
            Err(AuthError::Verification(VerifyError::InvalidTimeClaim("exp")))
        );
    }

    #[test]
    fn test_out_of_range_options_rejected() {
        let jwt = keyring(&["secret"]);
        let options = SignOptions::default().with_expires_in(u64::MAX);
        assert!(matches!(
            jwt.sign_token(&json!({}), &options),
            Err(AuthError::Configuration(_))
        ));

        let token = jwt.sign_token(&json!({}), &SignOptions::default()).unwrap();
        let options = SignOptions::default().with_leeway(u64::MAX);
        assert!(matches!(
            jwt.verify_token(&token, &options),
            Err(AuthError::Configuration(_))
        ));
    }

    #[test]
    fn test_decode_garbage_returns_none() {
        let jwt = keyring(&["secret"]);
        assert!(jwt.decode_token("not-a-token").is_none());
        assert!(jwt.decode_token("a.b.c.d").is_none());
        assert!(jwt.decode_token("").is_none());
    }

    #[test]
    fn test_jwtid_checked_on_verify() {
        let jwt = keyring(&["secret"]);
        let token = jwt
            .sign_token(&json!({}), &SignOptions::default().with_jwtid("one"))
            .unwrap();

        let result = jwt.verify_token(&token, &SignOptions::default().with_jwtid("two"));
        assert_eq!(
            result,
            Err(AuthError::Verification(VerifyError::InvalidJwtId))
        );
        assert!(jwt
            .verify_token(&token, &SignOptions::default().with_jwtid("one"))
            .is_ok());
    }
}
