//! Application-wide token authenticator
//!
//! Built once at startup from a [`KeyStore`] and [`AuthOptions`], then shared
//! by every request handler. Cloning is cheap; all clones share the same
//! immutable state.

use super::context::RequestContext;
use super::extract::{TokenExtractor, TokenGetter, DEFAULT_AUTH_SCHEME};
use super::jwt::{DecodedToken, JwtKeyring};
use super::keys::{Credential, KeyFamily, KeyStore};
use super::options::SignOptions;
use super::{AuthError, AuthRequest, Claims};
use crate::config::{AuthConfig, KeyConfig};
use serde::Serialize;
use std::fmt;
use std::sync::Arc;
use tracing::info;

/// Default name of the derived request field
pub const DEFAULT_USE_PROPERTY: &str = "token";

/// Authenticator options
#[derive(Clone)]
pub struct AuthOptions {
    /// Name of the derived request field. Default: "token"
    pub use_property: String,

    /// Expected authorization scheme. Default: "Bearer"
    pub auth_scheme: String,

    /// Custom token lookup, asked before the authorization header
    pub get_token: Option<TokenGetter>,

    /// Defaults for sign and verify
    pub sign_options: SignOptions,
}

impl Default for AuthOptions {
    fn default() -> Self {
        Self {
            use_property: DEFAULT_USE_PROPERTY.to_string(),
            auth_scheme: DEFAULT_AUTH_SCHEME.to_string(),
            get_token: None,
            sign_options: SignOptions::default(),
        }
    }
}

impl AuthOptions {
    #[must_use]
    pub fn with_use_property(mut self, name: &str) -> Self {
        self.use_property = name.to_string();
        self
    }

    #[must_use]
    pub fn with_auth_scheme(mut self, scheme: &str) -> Self {
        self.auth_scheme = scheme.to_string();
        self
    }

    #[must_use]
    pub fn with_token_getter(mut self, getter: TokenGetter) -> Self {
        self.get_token = Some(getter);
        self
    }

    #[must_use]
    pub fn with_sign_options(mut self, options: SignOptions) -> Self {
        self.sign_options = options;
        self
    }
}

impl fmt::Debug for AuthOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AuthOptions")
            .field("use_property", &self.use_property)
            .field("auth_scheme", &self.auth_scheme)
            .field("get_token", &self.get_token.is_some())
            .field("sign_options", &self.sign_options)
            .finish()
    }
}

#[derive(Debug)]
struct Inner {
    jwt: JwtKeyring,
    extractor: TokenExtractor,
    use_property: String,
    sign_options: SignOptions,
}

/// Token authenticator
///
/// # Example
///
/// ```
/// use komainu::auth::{AuthOptions, AuthRequest, KeyStore, TokenAuthenticator};
/// use serde_json::json;
///
/// let auth = TokenAuthenticator::configure(
///     KeyStore::from_secrets(["secretKeyxxx"]).unwrap(),
///     AuthOptions::default(),
/// )
/// .unwrap();
///
/// let token = auth.sign_token(&json!({"_id": 123, "name": "toa"}), None).unwrap();
/// let ctx = auth.context(
///     AuthRequest::new("GET", "/").with_header("authorization", &format!("Bearer {}", token)),
/// );
/// assert_eq!(ctx.token().unwrap()["name"], "toa");
/// ```
#[derive(Debug, Clone)]
pub struct TokenAuthenticator {
    inner: Arc<Inner>,
}

impl TokenAuthenticator {
    /// Build an authenticator
    ///
    /// Fails with [`AuthError::Configuration`] when the options are unusable:
    /// empty property name or scheme, a signing algorithm the primary key
    /// cannot produce, or a lifetime or leeway out of range.
    pub fn configure(keys: KeyStore, options: AuthOptions) -> Result<Self, AuthError> {
        if options.use_property.trim().is_empty() {
            return Err(AuthError::Configuration(
                "use_property must not be empty".into(),
            ));
        }

        options.sign_options.validate()?;

        if let Some(algorithm) = options.sign_options.algorithm {
            if KeyFamily::of(algorithm) != keys.primary().family() {
                return Err(AuthError::Configuration(format!(
                    "algorithm {:?} cannot be used with the primary {:?} key",
                    algorithm,
                    keys.primary().family()
                )));
            }
        }

        let mut extractor = TokenExtractor::new(&options.auth_scheme)?;
        if let Some(getter) = options.get_token {
            extractor = extractor.with_getter(getter);
        }

        info!(
            keys = keys.len(),
            scheme = %extractor.scheme(),
            property = %options.use_property,
            custom_getter = extractor.has_getter(),
            "token authenticator configured"
        );

        Ok(Self {
            inner: Arc::new(Inner {
                jwt: JwtKeyring::new(keys),
                extractor,
                use_property: options.use_property,
                sign_options: options.sign_options,
            }),
        })
    }

    /// Build an authenticator from the `auth` section of the configuration
    pub fn from_config(config: &AuthConfig) -> Result<Self, AuthError> {
        let keys = config
            .keys
            .iter()
            .map(credential_from_config)
            .collect::<Result<Vec<_>, _>>()?;

        let mut options = AuthOptions::default()
            .with_use_property(&config.use_property)
            .with_auth_scheme(&config.auth_scheme)
            .with_sign_options(config.sign.clone());
        if let Some(source) = &config.token_source {
            options = options.with_token_getter(source.clone().into_getter());
        }

        Self::configure(KeyStore::new(keys)?, options)
    }

    /// Request-scoped context whose token is resolved lazily
    pub fn context(&self, request: AuthRequest) -> RequestContext {
        RequestContext::new(self.clone(), request)
    }

    /// Sign with the primary key; `None` uses the configured options
    pub fn sign_token<T>(&self, payload: &T, options: Option<&SignOptions>) -> Result<String, AuthError>
    where
        T: Serialize + ?Sized,
    {
        self.inner
            .jwt
            .sign_token(payload, options.unwrap_or(&self.inner.sign_options))
    }

    /// Verify against every trusted key; `None` uses the configured options
    pub fn verify_token(&self, token: &str, options: Option<&SignOptions>) -> Result<Claims, AuthError> {
        self.inner
            .jwt
            .verify_token(token, options.unwrap_or(&self.inner.sign_options))
    }

    /// Read the claims without verifying the signature
    pub fn decode_token(&self, token: &str) -> Option<Claims> {
        self.inner.jwt.decode_token(token)
    }

    /// Read header, claims and signature without verifying
    pub fn decode_complete(&self, token: &str) -> Option<DecodedToken> {
        self.inner.jwt.decode_complete(token)
    }

    pub fn extractor(&self) -> &TokenExtractor {
        &self.inner.extractor
    }

    pub fn use_property(&self) -> &str {
        &self.inner.use_property
    }

    pub fn auth_scheme(&self) -> &str {
        self.inner.extractor.scheme()
    }

    pub fn sign_options(&self) -> &SignOptions {
        &self.inner.sign_options
    }

    pub fn keys(&self) -> &KeyStore {
        self.inner.jwt.keys()
    }
}

fn credential_from_config(key: &KeyConfig) -> Result<Credential, AuthError> {
    match key {
        KeyConfig::Secret { secret } => Credential::secret(secret),
        KeyConfig::Rsa {
            private_key_pem,
            public_key_pem,
        } => Credential::rsa_pem(private_key_pem, public_key_pem),
        KeyConfig::Ec {
            private_key_pem,
            public_key_pem,
        } => Credential::ec_pem(private_key_pem, public_key_pem),
        KeyConfig::Ed {
            private_key_pem,
            public_key_pem,
        } => Credential::ed_pem(private_key_pem, public_key_pem),
    }
}
