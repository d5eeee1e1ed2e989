//! Trusted key material
//!
//! A [`KeyStore`] is the ordered list of credentials the authenticator trusts.
//! The first credential signs every new token; all of them are tried, in
//! order, when verifying. Rotating a key means putting the new one first and
//! keeping the retiring one behind it until its tokens have expired.

use super::AuthError;
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey};
use std::fmt;

/// Algorithm family a credential belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyFamily {
    Hmac,
    Rsa,
    Ec,
    Ed,
}

impl KeyFamily {
    /// Family an algorithm requires
    pub fn of(algorithm: Algorithm) -> Self {
        match algorithm {
            Algorithm::HS256 | Algorithm::HS384 | Algorithm::HS512 => KeyFamily::Hmac,
            Algorithm::RS256
            | Algorithm::RS384
            | Algorithm::RS512
            | Algorithm::PS256
            | Algorithm::PS384
            | Algorithm::PS512 => KeyFamily::Rsa,
            Algorithm::ES256 | Algorithm::ES384 => KeyFamily::Ec,
            Algorithm::EdDSA => KeyFamily::Ed,
        }
    }

    /// Algorithm used for signing when none is configured
    pub fn default_algorithm(self) -> Algorithm {
        match self {
            KeyFamily::Hmac => Algorithm::HS256,
            KeyFamily::Rsa => Algorithm::RS256,
            KeyFamily::Ec => Algorithm::ES256,
            KeyFamily::Ed => Algorithm::EdDSA,
        }
    }

    /// Every algorithm a key of this family can verify
    pub fn algorithms(self) -> Vec<Algorithm> {
        match self {
            KeyFamily::Hmac => vec![Algorithm::HS256, Algorithm::HS384, Algorithm::HS512],
            KeyFamily::Rsa => vec![
                Algorithm::RS256,
                Algorithm::RS384,
                Algorithm::RS512,
                Algorithm::PS256,
                Algorithm::PS384,
                Algorithm::PS512,
            ],
            KeyFamily::Ec => vec![Algorithm::ES256, Algorithm::ES384],
            KeyFamily::Ed => vec![Algorithm::EdDSA],
        }
    }
}

/// A single signing credential
///
/// Shared secrets sign and verify with the same bytes. Asymmetric credentials
/// carry both halves of the key pair.
#[derive(Clone)]
pub struct Credential {
    family: KeyFamily,
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
}

impl Credential {
    /// HMAC shared secret (HS256/HS384/HS512)
    pub fn secret(secret: impl AsRef<[u8]>) -> Result<Self, AuthError> {
        let secret = secret.as_ref();
        if secret.is_empty() {
            return Err(AuthError::Configuration(
                "secret must not be empty".into(),
            ));
        }

        Ok(Self {
            family: KeyFamily::Hmac,
            encoding_key: EncodingKey::from_secret(secret),
            decoding_key: DecodingKey::from_secret(secret),
        })
    }

    /// RSA key pair in PEM form (RS* and PS* algorithms)
    pub fn rsa_pem(private_key_pem: &str, public_key_pem: &str) -> Result<Self, AuthError> {
        let encoding_key = EncodingKey::from_rsa_pem(private_key_pem.as_bytes())
            .map_err(|e| AuthError::Configuration(format!("Invalid RSA private key: {}", e)))?;
        let decoding_key = DecodingKey::from_rsa_pem(public_key_pem.as_bytes())
            .map_err(|e| AuthError::Configuration(format!("Invalid RSA public key: {}", e)))?;

        Ok(Self {
            family: KeyFamily::Rsa,
            encoding_key,
            decoding_key,
        })
    }

    /// EC key pair in PEM form (ES256 with P-256, ES384 with P-384)
    pub fn ec_pem(private_key_pem: &str, public_key_pem: &str) -> Result<Self, AuthError> {
        let encoding_key = EncodingKey::from_ec_pem(private_key_pem.as_bytes())
            .map_err(|e| AuthError::Configuration(format!("Invalid EC private key: {}", e)))?;
        let decoding_key = DecodingKey::from_ec_pem(public_key_pem.as_bytes())
            .map_err(|e| AuthError::Configuration(format!("Invalid EC public key: {}", e)))?;

        Ok(Self {
            family: KeyFamily::Ec,
            encoding_key,
            decoding_key,
        })
    }

    /// Ed25519 key pair in PEM form (EdDSA)
    pub fn ed_pem(private_key_pem: &str, public_key_pem: &str) -> Result<Self, AuthError> {
        let encoding_key = EncodingKey::from_ed_pem(private_key_pem.as_bytes())
            .map_err(|e| AuthError::Configuration(format!("Invalid Ed25519 private key: {}", e)))?;
        let decoding_key = DecodingKey::from_ed_pem(public_key_pem.as_bytes())
            .map_err(|e| AuthError::Configuration(format!("Invalid Ed25519 public key: {}", e)))?;

        Ok(Self {
            family: KeyFamily::Ed,
            encoding_key,
            decoding_key,
        })
    }

    pub fn family(&self) -> KeyFamily {
        self.family
    }

    pub(crate) fn encoding_key(&self) -> &EncodingKey {
        &self.encoding_key
    }

    pub(crate) fn decoding_key(&self) -> &DecodingKey {
        &self.decoding_key
    }

    /// Algorithms accepted when verifying with this credential
    ///
    /// A configured algorithm of the same family pins verification to it.
    /// Otherwise the whole family is accepted, so a retiring key of another
    /// family keeps verifying the tokens it signed.
    pub fn accepted_algorithms(&self, configured: Option<Algorithm>) -> Vec<Algorithm> {
        match configured {
            Some(alg) if KeyFamily::of(alg) == self.family => vec![alg],
            _ => self.family.algorithms(),
        }
    }
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // Do not print key material
        f.debug_struct("Credential")
            .field("family", &self.family)
            .finish_non_exhaustive()
    }
}

/// Ordered, non-empty set of trusted credentials
#[derive(Debug, Clone)]
pub struct KeyStore {
    keys: Vec<Credential>,
}

impl KeyStore {
    /// Create a key store; the first credential becomes the signing key
    pub fn new(keys: Vec<Credential>) -> Result<Self, AuthError> {
        if keys.is_empty() {
            return Err(AuthError::Configuration(
                "At least one signing key must be configured".into(),
            ));
        }

        Ok(Self { keys })
    }

    /// Key store holding exactly one credential
    pub fn single(credential: Credential) -> Self {
        Self {
            keys: vec![credential],
        }
    }

    /// Key store of HMAC secrets, in rotation order
    pub fn from_secrets<I, S>(secrets: I) -> Result<Self, AuthError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<[u8]>,
    {
        let keys = secrets
            .into_iter()
            .map(Credential::secret)
            .collect::<Result<Vec<_>, _>>()?;
        Self::new(keys)
    }

    /// The current signing credential
    pub fn primary(&self) -> &Credential {
        &self.keys[0]
    }

    /// All trusted credentials, current first
    pub fn keys(&self) -> &[Credential] {
        &self.keys
    }

    pub fn len(&self) -> usize {
        self.keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }
}
