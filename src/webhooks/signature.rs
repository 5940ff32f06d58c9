//! HMAC-SHA256 webhook signatures.
//!
//! The signed message is `{timestamp}.{body}` when the provider sends a
//! timestamp header, else the raw body. Signatures are hex, optionally with
//! a `sha256=` prefix.

use async_trait::async_trait;
use chrono::Utc;
use hmac::{Hmac, Mac};
use secrecy::{ExposeSecret, SecretString};
use sha2::Sha256;
use subtle::ConstantTimeEq;

use crate::error::{ErrorCode, GatewayResult, IntegrationError};
use crate::integration::{get_header, Credentials, Headers, WebhookSettings};
use crate::provider::WebhookValidator;

type HmacSha256 = Hmac<Sha256>;

/// Hex HMAC-SHA256 of `body`, bound to `timestamp` when one is given.
pub fn compute_signature(secret: &[u8], timestamp: Option<&str>, body: &[u8]) -> String {
    let mut mac = <HmacSha256 as Mac>::new_from_slice(secret).expect("HMAC can take key of any size");
    if let Some(ts) = timestamp {
        mac.update(ts.as_bytes());
        mac.update(b".");
    }
    mac.update(body);
    hex::encode(mac.finalize().into_bytes())
}

/// Constant-time check of a provided signature.
pub fn verify_signature(provided: &str, secret: &[u8], timestamp: Option<&str>, body: &[u8]) -> bool {
    let provided = provided.trim();
    let provided = provided.strip_prefix("sha256=").unwrap_or(provided);
    let computed = compute_signature(secret, timestamp, body);
    provided.to_ascii_lowercase().as_bytes().ct_eq(computed.as_bytes()).into()
}

/// Validates webhooks signed with a shared secret.
pub struct HmacSignatureValidator {
    provider: String,
    secret: SecretString,
    settings: WebhookSettings,
}

impl std::fmt::Debug for HmacSignatureValidator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HmacSignatureValidator")
            .field("provider", &self.provider)
            .field("secret", &self.secret)
            .field("settings", &self.settings)
            .finish()
    }
}

impl HmacSignatureValidator {
    pub fn new(provider: impl Into<String>, secret: SecretString, settings: WebhookSettings) -> Self {
        Self {
            provider: provider.into(),
            secret,
            settings,
        }
    }

    /// Take the shared secret from `credentials.extra[settings.secret_key]`.
    pub fn from_credentials(
        provider: &str,
        credentials: &Credentials,
        settings: &WebhookSettings,
    ) -> GatewayResult<Self> {
        let secret = credentials
            .extra(&settings.secret_key)
            .filter(|s| !s.expose_secret().is_empty())
            .cloned()
            .ok_or_else(|| {
                IntegrationError::new(
                    ErrorCode::Configuration,
                    provider,
                    format!("webhook secret '{}' is not configured", settings.secret_key),
                )
            })?;
        Ok(Self::new(provider, secret, settings.clone()))
    }

    fn reject(&self, message: &str) -> IntegrationError {
        IntegrationError::new(ErrorCode::InvalidSignature, self.provider.as_str(), message)
    }

    /// Check the signing timestamp against the tolerance window.
    fn check_timestamp(&self, raw: &str) -> GatewayResult<()> {
        let signed_at: i64 = raw
            .trim()
            .parse()
            .map_err(|_| self.reject("malformed signature timestamp"))?;
        let skew = Utc::now().timestamp().abs_diff(signed_at);
        if skew > self.settings.tolerance_secs {
            return Err(self.reject("signature timestamp outside tolerance"));
        }
        Ok(())
    }
}

#[async_trait]
impl WebhookValidator for HmacSignatureValidator {
    async fn validate_webhook(&self, headers: &Headers, body: &[u8]) -> GatewayResult<()> {
        let signature = get_header(headers, &self.settings.signature_header)
            .ok_or_else(|| self.reject("missing signature header"))?;

        let timestamp = match &self.settings.timestamp_header {
            Some(name) => {
                let raw = get_header(headers, name).ok_or_else(|| self.reject("missing timestamp header"))?;
                self.check_timestamp(raw)?;
                Some(raw.trim())
            }
            None => None,
        };

        if verify_signature(signature, self.secret.expose_secret().as_bytes(), timestamp, body) {
            Ok(())
        } else {
            Err(self.reject("signature mismatch"))
        }
    }

    fn signature(&self, headers: &Headers) -> Option<String> {
        get_header(headers, &self.settings.signature_header).map(str::to_string)
    }
}
