//! Provider credentials.
//!
//! Secret values are `secrecy::SecretString`: zeroized on drop, redacted in
//! `Debug`, and only readable through `ExposeSecret`. `Credentials` never
//! implements `Serialize`.

use std::collections::HashMap;
use std::fmt;

pub use secrecy::{ExposeSecret, SecretString};

const REDACTED: &str = "[REDACTED]";

fn secret(value: impl Into<String>) -> SecretString {
    SecretString::new(value.into())
}

/// Credentials for one integration.
#[derive(Clone, Default)]
pub struct Credentials {
    pub api_key: Option<SecretString>,
    pub api_secret: Option<SecretString>,
    pub access_token: Option<SecretString>,
    pub refresh_token: Option<SecretString>,
    /// Provider-specific secrets (e.g. a webhook signing secret).
    pub extra: HashMap<String, SecretString>,
}

impl Credentials {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_api_key(mut self, value: impl Into<String>) -> Self {
        self.api_key = Some(secret(value));
        self
    }

    pub fn with_api_secret(mut self, value: impl Into<String>) -> Self {
        self.api_secret = Some(secret(value));
        self
    }

    pub fn with_access_token(mut self, value: impl Into<String>) -> Self {
        self.access_token = Some(secret(value));
        self
    }

    pub fn with_refresh_token(mut self, value: impl Into<String>) -> Self {
        self.refresh_token = Some(secret(value));
        self
    }

    pub fn with_extra(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.extra.insert(key.into(), secret(value));
        self
    }

    pub fn extra(&self, key: &str) -> Option<&SecretString> {
        self.extra.get(key)
    }

    pub fn is_empty(&self) -> bool {
        self.secrets().next().is_none()
    }

    /// Every non-empty secret value.
    fn secrets(&self) -> impl Iterator<Item = &str> {
        [&self.api_key, &self.api_secret, &self.access_token, &self.refresh_token]
            .into_iter()
            .flatten()
            .chain(self.extra.values())
            .map(|s| s.expose_secret().as_str())
            .filter(|s| !s.is_empty())
    }

    /// Replace every occurrence of a secret value in `text`.
    pub fn redact(&self, text: &str) -> String {
        let mut secrets: Vec<&str> = self.secrets().collect();
        // Longest first so a secret containing another is removed whole.
        secrets.sort_by_key(|s| std::cmp::Reverse(s.len()));

        let mut out = text.to_string();
        for secret in secrets {
            if out.contains(secret) {
                out = out.replace(secret, REDACTED);
            }
        }
        out
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mask = |v: &Option<SecretString>| v.as_ref().map(|_| REDACTED);
        let mut extra_keys: Vec<&String> = self.extra.keys().collect();
        extra_keys.sort();
        f.debug_struct("Credentials")
            .field("api_key", &mask(&self.api_key))
            .field("api_secret", &mask(&self.api_secret))
            .field("access_token", &mask(&self.access_token))
            .field("refresh_token", &mask(&self.refresh_token))
            .field("extra_keys", &extra_keys)
            .finish()
    }
}
