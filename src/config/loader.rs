//! Configuration loading from disk and the environment.

use std::fs;
use std::path::Path;

use thiserror::Error;

use crate::config::schema::{CredentialsConfig, GatewayConfig};
use crate::config::validation::{validate_config, ValidationError};
use crate::integration::{Credentials, SecretString};

/// Error type for configuration loading.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Parse error: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Validation failed: {}", join_errors(.0))]
    Validation(Vec<ValidationError>),

    /// A credential environment variable is unset or empty.
    #[error("Missing secret: environment variable {0} is not set")]
    MissingSecret(String),
}

fn join_errors(errors: &[ValidationError]) -> String {
    errors.iter().map(ToString::to_string).collect::<Vec<_>>().join(", ")
}

/// Parse and validate configuration from TOML text.
pub fn parse_config(content: &str) -> Result<GatewayConfig, ConfigError> {
    let config: GatewayConfig = toml::from_str(content)?;
    validate_config(&config).map_err(ConfigError::Validation)?;
    Ok(config)
}

/// Load and validate configuration from a TOML file.
pub fn load_config(path: &Path) -> Result<GatewayConfig, ConfigError> {
    let content = fs::read_to_string(path)?;
    parse_config(&content)
}

/// Build credentials from the environment variables named in `config`.
pub fn resolve_credentials(config: &CredentialsConfig) -> Result<Credentials, ConfigError> {
    resolve_credentials_with(config, |name| std::env::var(name).ok())
}

/// Like `resolve_credentials`, reading variables through `lookup`.
pub fn resolve_credentials_with<F>(config: &CredentialsConfig, lookup: F) -> Result<Credentials, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    let read = |var: &Option<String>| -> Result<Option<SecretString>, ConfigError> {
        match var {
            None => Ok(None),
            Some(name) => match lookup(name) {
                Some(value) if !value.is_empty() => Ok(Some(SecretString::new(value))),
                _ => Err(ConfigError::MissingSecret(name.clone())),
            },
        }
    };

    let mut credentials = Credentials {
        api_key: read(&config.api_key_env)?,
        api_secret: read(&config.api_secret_env)?,
        access_token: read(&config.access_token_env)?,
        refresh_token: read(&config.refresh_token_env)?,
        ..Credentials::default()
    };
    for (key, var) in &config.extra_env {
        if let Some(secret) = read(&Some(var.clone()))? {
            credentials.extra.insert(key.clone(), secret);
        }
    }
    Ok(credentials)
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;
    use crate::integration::ExposeSecret;

    #[test]
    fn test_parse_error_is_reported() {
        let err = parse_config("listener = 5").unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));
    }

    #[test]
    fn test_validation_errors_are_collected() {
        let err = parse_config(
            r#"
            [health_check]
            interval_secs = 0

            [events]
            capacity = 0
            "#,
        )
        .unwrap_err();

        match err {
            ConfigError::Validation(errors) => assert_eq!(errors.len(), 2),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_load_missing_file() {
        let err = load_config(Path::new("does-not-exist.toml")).unwrap_err();
        assert!(matches!(err, ConfigError::Io(_)));
    }

    #[test]
    fn test_resolve_credentials() {
        let env: HashMap<&str, &str> = [("SHOP_TOKEN", "tok_abc"), ("SHOP_HOOK", "whsec_1")].into();
        let config = CredentialsConfig {
            access_token_env: Some("SHOP_TOKEN".into()),
            extra_env: [("webhook_secret".to_string(), "SHOP_HOOK".to_string())].into(),
            ..CredentialsConfig::default()
        };

        let creds = resolve_credentials_with(&config, |k| env.get(k).map(|v| v.to_string())).unwrap();
        assert_eq!(creds.access_token.as_ref().unwrap().expose_secret(), "tok_abc");
        assert_eq!(creds.extra("webhook_secret").unwrap().expose_secret(), "whsec_1");
        assert!(creds.api_key.is_none());
    }

    #[test]
    fn test_missing_secret_names_variable_only() {
        let config = CredentialsConfig {
            api_key_env: Some("NOT_SET_ANYWHERE".into()),
            ..CredentialsConfig::default()
        };
        let err = resolve_credentials_with(&config, |_| None).unwrap_err();
        assert_eq!(
            err.to_string(),
            "Missing secret: environment variable NOT_SET_ANYWHERE is not set"
        );
    }
}
