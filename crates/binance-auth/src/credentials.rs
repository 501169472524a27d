//! API credentials for Binance Futures
//!
//! # Security
//!
//! The secret key is stored using the `secrecy` crate which:
//! - Zeroizes memory on drop (prevents memory scanning)
//! - Prevents accidental logging via Debug impl
//! - Provides explicit access via `expose_secret()`

use binance_types::{BinanceError, BinanceResult};
use secrecy::{ExposeSecret, SecretString};

/// API credentials
///
/// Every REST call sends the API key; only signed calls need the secret.
/// Credentials are immutable: to change them, build a new value and
/// replace the whole object, so readers never see a half-updated pair.
pub struct Credentials {
    /// API key (public)
    api_key: String,
    /// Secret key (zeroized on drop)
    secret_key: Option<SecretString>,
}

impl Credentials {
    /// Create credentials with both keys
    ///
    /// # Errors
    /// Returns [`BinanceError::Credential`] if the API key is empty; a
    /// secret without a key cannot authenticate anything. Use
    /// [`Credentials::none`] for public endpoints.
    pub fn new(api_key: impl Into<String>, secret_key: impl Into<String>) -> BinanceResult<Self> {
        let api_key = api_key.into();
        let secret_key = secret_key.into();
        if api_key.is_empty() {
            let reason = if secret_key.is_empty() {
                "API key and secret key are both empty"
            } else {
                "secret key supplied without an API key"
            };
            return Err(BinanceError::Credential(reason.to_string()));
        }

        Ok(Self {
            api_key,
            secret_key: (!secret_key.is_empty()).then(|| SecretString::from(secret_key)),
        })
    }

    /// Create credentials for unsigned calls only
    pub fn api_key_only(api_key: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            secret_key: None,
        }
    }

    /// Fully unset credentials (public endpoints only)
    pub fn none() -> Self {
        Self::api_key_only(String::new())
    }

    /// Create credentials from environment variables
    ///
    /// Reads `BINANCE_API_KEY` and `BINANCE_SECRET_KEY` from the environment.
    pub fn from_env() -> BinanceResult<Self> {
        let api_key = std::env::var("BINANCE_API_KEY")
            .map_err(|_| BinanceError::Credential("BINANCE_API_KEY not set".to_string()))?;
        let secret_key = std::env::var("BINANCE_SECRET_KEY")
            .map_err(|_| BinanceError::Credential("BINANCE_SECRET_KEY not set".to_string()))?;

        Self::new(api_key, secret_key)
    }

    /// Get the API key (empty when unset)
    pub fn api_key(&self) -> &str {
        &self.api_key
    }

    /// Check if an API key is configured
    pub fn has_api_key(&self) -> bool {
        !self.api_key.is_empty()
    }

    /// Check if signed calls are possible
    pub fn can_sign(&self) -> bool {
        self.secret_key.is_some()
    }

    /// Controlled access to the secret key bytes
    pub(crate) fn secret(&self) -> Option<&[u8]> {
        self.secret_key.as_ref().map(|s| s.expose_secret().as_bytes())
    }
}

impl Default for Credentials {
    fn default() -> Self {
        Self::none()
    }
}

impl Clone for Credentials {
    /// Clone credentials (creates a new secret with the same content)
    fn clone(&self) -> Self {
        Self {
            api_key: self.api_key.clone(),
            secret_key: self
                .secret_key
                .as_ref()
                .map(|s| SecretString::from(s.expose_secret().to_string())),
        }
    }
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field(
                "api_key",
                &format!("{}...", self.api_key.chars().take(8).collect::<String>()),
            )
            .field(
                "secret_key",
                &self.secret_key.as_ref().map(|_| "[REDACTED]"),
            )
            .finish()
    }
}
