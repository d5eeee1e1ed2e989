//! Sign and verify options
//!
//! One options value drives both directions: on sign it fills in the
//! registered claims (`iat`, `exp`, `nbf`, `aud`, `iss`, `sub`, `jti`) and the
//! token header; on verify the same fields become the checks a token must pass.

use super::keys::KeyFamily;
use super::{AuthError, Claims, VerifyError};
use jsonwebtoken::{Algorithm, Header, Validation};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Longest accepted `expires_in` / `not_before`, in seconds (about 1000 years)
pub const MAX_DURATION_SECS: u64 = 1000 * 366 * 24 * 60 * 60;

/// Longest accepted clock tolerance, in seconds (one day)
pub const MAX_LEEWAY_SECS: u64 = 24 * 60 * 60;

/// Extra header fields written into signed tokens
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct HeaderOptions {
    #[serde(default)]
    pub kid: Option<String>,
    #[serde(default)]
    pub typ: Option<String>,
    #[serde(default)]
    pub cty: Option<String>,
}

/// Options forwarded to sign and verify
///
/// # Example
///
/// ```
/// use komainu::auth::SignOptions;
///
/// let options = SignOptions::default()
///     .with_expires_in(3600)
///     .with_issuer("komainu")
///     .with_audience("api");
/// assert_eq!(options.effective_expires_in(), Some(3600));
/// ```
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SignOptions {
    /// Signing algorithm; defaults to the primary key's family default
    #[serde(default)]
    pub algorithm: Option<Algorithm>,

    /// Token lifetime in seconds, counted from `iat`
    #[serde(default)]
    pub expires_in: Option<u64>,

    /// Legacy lifetime in minutes; ignored when `expires_in` is set
    #[serde(default)]
    pub expires_in_minutes: Option<u64>,

    /// Seconds after `iat` before the token becomes valid
    #[serde(default)]
    pub not_before: Option<u64>,

    #[serde(default)]
    pub audience: Option<String>,

    #[serde(default)]
    pub issuer: Option<String>,

    #[serde(default)]
    pub subject: Option<String>,

    #[serde(default)]
    pub jwtid: Option<String>,

    /// Do not write `iat` into signed tokens
    #[serde(default)]
    pub no_timestamp: bool,

    /// Clock tolerance in seconds for `exp` and `nbf`
    #[serde(default)]
    pub leeway: u64,

    #[serde(default)]
    pub header: HeaderOptions,
}

impl SignOptions {
    #[must_use]
    pub fn with_algorithm(mut self, algorithm: Algorithm) -> Self {
        self.algorithm = Some(algorithm);
        self
    }

    #[must_use]
    pub fn with_expires_in(mut self, seconds: u64) -> Self {
        self.expires_in = Some(seconds);
        self
    }

    #[must_use]
    pub fn with_not_before(mut self, seconds: u64) -> Self {
        self.not_before = Some(seconds);
        self
    }

    #[must_use]
    pub fn with_audience(mut self, audience: &str) -> Self {
        self.audience = Some(audience.to_string());
        self
    }

    #[must_use]
    pub fn with_issuer(mut self, issuer: &str) -> Self {
        self.issuer = Some(issuer.to_string());
        self
    }

    #[must_use]
    pub fn with_subject(mut self, subject: &str) -> Self {
        self.subject = Some(subject.to_string());
        self
    }

    #[must_use]
    pub fn with_jwtid(mut self, jwtid: &str) -> Self {
        self.jwtid = Some(jwtid.to_string());
        self
    }

    #[must_use]
    pub fn with_no_timestamp(mut self) -> Self {
        self.no_timestamp = true;
        self
    }

    #[must_use]
    pub fn with_leeway(mut self, seconds: u64) -> Self {
        self.leeway = seconds;
        self
    }

    #[must_use]
    pub fn with_key_id(mut self, kid: &str) -> Self {
        self.header.kid = Some(kid.to_string());
        self
    }

    /// Lifetime in seconds, folding in the legacy minutes field
    pub fn effective_expires_in(&self) -> Option<u64> {
        self.expires_in
            .or_else(|| self.expires_in_minutes.map(|minutes| minutes.saturating_mul(60)))
    }

    /// Reject durations that cannot be added to a Unix timestamp
    ///
    /// ```
    /// use komainu::auth::SignOptions;
    ///
    /// assert!(SignOptions::default().with_expires_in(3600).validate().is_ok());
    /// assert!(SignOptions::default().with_expires_in(u64::MAX).validate().is_err());
    /// ```
    pub fn validate(&self) -> Result<(), AuthError> {
        let durations = [
            ("expires_in", self.expires_in),
            ("expires_in_minutes", self.expires_in_minutes.map(|m| m.saturating_mul(60))),
            ("not_before", self.not_before),
        ];
        for (name, seconds) in durations {
            if seconds.is_some_and(|s| s > MAX_DURATION_SECS) {
                return Err(AuthError::Configuration(format!(
                    "{} is out of range (at most {} seconds)",
                    name, MAX_DURATION_SECS
                )));
            }
        }

        if self.leeway > MAX_LEEWAY_SECS {
            return Err(AuthError::Configuration(format!(
                "leeway is out of range (at most {} seconds)",
                MAX_LEEWAY_SECS
            )));
        }

        Ok(())
    }

    /// Algorithm to sign with for a key of the given family
    pub fn signing_algorithm(&self, family: KeyFamily) -> Algorithm {
        self.algorithm
            .unwrap_or_else(|| family.default_algorithm())
    }

    /// Token header for signing
    pub fn header(&self, algorithm: Algorithm) -> Header {
        let mut header = Header::new(algorithm);
        if let Some(typ) = &self.header.typ {
            header.typ = Some(typ.clone());
        }
        header.kid = self.header.kid.clone();
        header.cty = self.header.cty.clone();
        header
    }

    /// Write the registered claims into a payload
    ///
    /// `iat` defaults to `now` unless the payload already carries one. Any
    /// other registered claim that is both configured here and already present
    /// in the payload is an error, as is a payload `iat`, `exp` or `nbf` that
    /// is not a number.
    pub fn apply_registered_claims(&self, payload: &mut Claims, now: i64) -> Result<(), AuthError> {
        for claim in ["iat", "exp", "nbf"] {
            if payload.get(claim).is_some_and(|value| !value.is_number()) {
                return Err(AuthError::Signing(format!(
                    "\"{}\" should be a number of seconds",
                    claim
                )));
            }
        }

        let timestamp = match payload.get("iat") {
            Some(iat) => iat
                .as_i64()
                .or_else(|| iat.as_f64().map(|secs| secs.floor() as i64))
                .unwrap_or(now),
            None => now,
        };

        if self.no_timestamp {
            payload.remove("iat");
        } else if !payload.contains_key("iat") {
            payload.insert("iat".into(), Value::from(timestamp));
        }

        if let Some(expires_in) = self.effective_expires_in() {
            reject_existing(payload, "exp", "expires_in")?;
            payload.insert("exp".into(), Value::from(offset(timestamp, expires_in, "exp")?));
        }

        if let Some(not_before) = self.not_before {
            reject_existing(payload, "nbf", "not_before")?;
            payload.insert("nbf".into(), Value::from(offset(timestamp, not_before, "nbf")?));
        }

        let string_claims = [
            ("aud", "audience", &self.audience),
            ("iss", "issuer", &self.issuer),
            ("sub", "subject", &self.subject),
            ("jti", "jwtid", &self.jwtid),
        ];
        for (claim, option, value) in string_claims {
            if let Some(value) = value {
                reject_existing(payload, claim, option)?;
                payload.insert(claim.into(), Value::String(value.clone()));
            }
        }

        Ok(())
    }

    /// Validation rules for verifying with the given algorithms
    ///
    /// No claim is required by default; a configured audience, issuer or
    /// subject makes the matching claim mandatory.
    pub fn validation(&self, algorithms: Vec<Algorithm>) -> Validation {
        let first = algorithms.first().copied().unwrap_or(Algorithm::HS256);
        let mut validation = Validation::new(first);
        validation.algorithms = algorithms;
        validation.leeway = self.leeway;
        validation.validate_exp = true;
        validation.validate_nbf = true;
        validation.required_spec_claims.clear();

        if let Some(audience) = &self.audience {
            validation.set_audience(&[audience]);
            validation.required_spec_claims.insert("aud".into());
        } else {
            // Only validate aud when explicitly set
            validation.validate_aud = false;
        }

        if let Some(issuer) = &self.issuer {
            validation.set_issuer(&[issuer]);
            validation.required_spec_claims.insert("iss".into());
        }

        if let Some(subject) = &self.subject {
            validation.sub = Some(subject.clone());
            validation.required_spec_claims.insert("sub".into());
        }

        validation
    }

    /// Check `jti`, which the signing primitive does not validate itself
    pub fn check_jwtid(&self, claims: &Claims) -> Result<(), VerifyError> {
        match &self.jwtid {
            Some(expected) => match claims.get("jti").and_then(Value::as_str) {
                Some(actual) if actual == expected => Ok(()),
                _ => Err(VerifyError::InvalidJwtId),
            },
            None => Ok(()),
        }
    }
}

/// Reject an `exp` or `nbf` that is present but not a JSON number
///
/// `jsonwebtoken` skips non-numeric time claims during validation.
pub fn check_time_claims(claims: &Claims) -> Result<(), VerifyError> {
    for claim in ["exp", "nbf"] {
        if claims.get(claim).is_some_and(|value| !value.is_number()) {
            return Err(VerifyError::InvalidTimeClaim(claim));
        }
    }
    Ok(())
}

fn offset(timestamp: i64, seconds: u64, claim: &str) -> Result<i64, AuthError> {
    i64::try_from(seconds)
        .ok()
        .and_then(|seconds| timestamp.checked_add(seconds))
        .ok_or_else(|| AuthError::Signing(format!("\"{}\" is out of range", claim)))
}

fn reject_existing(payload: &Claims, claim: &str, option: &str) -> Result<(), AuthError> {
    if payload.contains_key(claim) {
        return Err(AuthError::Signing(format!(
            "Bad \"{}\" option: the payload already has an \"{}\" property",
            option, claim
        )));
    }
    Ok(())
}
