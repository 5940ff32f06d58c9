//! Generic HTTP/JSON provider.
//!
//! Talks to any REST-style API rooted at `settings.base_url`. Authenticates
//! with the integration's access token (Bearer) or API key header, maps HTTP
//! status codes onto `ErrorCode`s and tracks the quota the provider reports
//! in `x-ratelimit-*` headers.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use parking_lot::Mutex;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue, AUTHORIZATION};
use reqwest::{Client, Method, StatusCode};
use tokio::time::Instant;
use url::Url;

use crate::error::{ErrorCode, GatewayResult, IntegrationError};
use crate::integration::{
    Credentials, ExposeSecret, Headers, IntegrationRequest, IntegrationResponse, ProviderSettings, RateLimitInfo,
};
use crate::provider::{ProviderAdapter, ProviderFactory, WebhookBinding};
use crate::webhooks::{AcknowledgingHandler, HmacSignatureValidator};

pub const PROVIDER_NAME: &str = "http";

const DEFAULT_HEALTH_PATH: &str = "/health";
const DEFAULT_API_KEY_HEADER: &str = "x-api-key";
/// Longest slice of a provider error body copied into an error message.
const ERROR_BODY_LIMIT: usize = 256;

/// Outbound adapter for HTTP/JSON providers.
pub struct HttpProvider {
    client: Option<Client>,
    base_url: Option<Url>,
    health_path: String,
    default_timeout: Option<Duration>,
    capabilities: Vec<String>,
    last_rate_limit: Mutex<Option<RateLimitInfo>>,
    closed: AtomicBool,
}

impl std::fmt::Debug for HttpProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpProvider")
            .field("base_url", &self.base_url.as_ref().map(Url::as_str))
            .field("initialized", &self.client.is_some())
            .field("closed", &self.closed.load(Ordering::Relaxed))
            .finish()
    }
}

impl Default for HttpProvider {
    fn default() -> Self {
        Self::new()
    }
}

impl HttpProvider {
    pub fn new() -> Self {
        Self {
            client: None,
            base_url: None,
            health_path: DEFAULT_HEALTH_PATH.to_string(),
            default_timeout: None,
            capabilities: Vec::new(),
            last_rate_limit: Mutex::new(None),
            closed: AtomicBool::new(false),
        }
    }

    fn configuration_error(message: impl Into<String>) -> IntegrationError {
        IntegrationError::new(ErrorCode::Configuration, PROVIDER_NAME, message)
    }

    /// Default headers carrying the integration's credentials, marked
    /// sensitive so reqwest never prints them.
    fn auth_headers(credentials: &Credentials, settings: &ProviderSettings) -> GatewayResult<HeaderMap> {
        let mut headers = HeaderMap::new();
        if let Some(token) = &credentials.access_token {
            let mut value = HeaderValue::from_str(&format!("Bearer {}", token.expose_secret()))
                .map_err(|_| Self::configuration_error("access token is not a valid header value"))?;
            value.set_sensitive(true);
            headers.insert(AUTHORIZATION, value);
        } else if let Some(key) = &credentials.api_key {
            let header_name = settings
                .extra
                .get("api_key_header")
                .and_then(|v| v.as_str())
                .unwrap_or(DEFAULT_API_KEY_HEADER);
            let name = HeaderName::from_bytes(header_name.as_bytes())
                .map_err(|_| Self::configuration_error(format!("invalid api_key_header '{header_name}'")))?;
            let mut value = HeaderValue::from_str(key.expose_secret())
                .map_err(|_| Self::configuration_error("api key is not a valid header value"))?;
            value.set_sensitive(true);
            headers.insert(name, value);
        }
        Ok(headers)
    }

    fn ready(&self) -> GatewayResult<(&Client, &Url)> {
        if self.closed.load(Ordering::Acquire) {
            return Err(IntegrationError::new(
                ErrorCode::ServiceUnavailable,
                PROVIDER_NAME,
                "adapter has been closed",
            ));
        }
        match (&self.client, &self.base_url) {
            (Some(client), Some(base)) => Ok((client, base)),
            _ => Err(Self::configuration_error("adapter is not initialized")),
        }
    }

    fn resolve(base: &Url, endpoint: &str) -> GatewayResult<Url> {
        let path = endpoint.trim_start_matches('/');
        let mut base = base.clone();
        if !base.path().ends_with('/') {
            let with_slash = format!("{}/", base.path());
            base.set_path(&with_slash);
        }
        base.join(path)
            .map_err(|e| Self::configuration_error(format!("invalid endpoint '{endpoint}': {e}")))
    }

    /// Map a non-2xx status onto the gateway's error codes.
    fn status_error(status: StatusCode, body: &[u8]) -> IntegrationError {
        let snippet = String::from_utf8_lossy(&body[..body.len().min(ERROR_BODY_LIMIT)]).into_owned();
        let message = if snippet.trim().is_empty() {
            format!("HTTP {status}")
        } else {
            format!("HTTP {status}: {}", snippet.trim())
        };

        let err = match status {
            StatusCode::TOO_MANY_REQUESTS => IntegrationError::new(ErrorCode::RateLimit, PROVIDER_NAME, message),
            StatusCode::SERVICE_UNAVAILABLE => {
                IntegrationError::new(ErrorCode::ServiceUnavailable, PROVIDER_NAME, message)
            }
            StatusCode::GATEWAY_TIMEOUT | StatusCode::REQUEST_TIMEOUT => {
                IntegrationError::new(ErrorCode::Timeout, PROVIDER_NAME, message)
            }
            StatusCode::NOT_FOUND => IntegrationError::not_found(PROVIDER_NAME, message),
            StatusCode::UNAUTHORIZED => IntegrationError::provider_error(PROVIDER_NAME, "unauthorized", message),
            StatusCode::FORBIDDEN => IntegrationError::provider_error(PROVIDER_NAME, "forbidden", message),
            s if s.is_server_error() => IntegrationError::new(ErrorCode::TemporaryFailure, PROVIDER_NAME, message),
            s => IntegrationError::provider_error(PROVIDER_NAME, s.as_u16().to_string(), message),
        };
        err.with_status(status.as_u16())
    }

    /// Map a transport failure. The URL is dropped: query strings may carry
    /// provider keys.
    fn transport_error(err: reqwest::Error) -> IntegrationError {
        let (timeout, connect) = (err.is_timeout(), err.is_connect());
        let detail = err.without_url();
        if timeout {
            IntegrationError::new(ErrorCode::Timeout, PROVIDER_NAME, format!("request timed out: {detail}"))
        } else if connect {
            IntegrationError::new(
                ErrorCode::ServiceUnavailable,
                PROVIDER_NAME,
                format!("connection failed: {detail}"),
            )
        } else {
            IntegrationError::new(
                ErrorCode::TemporaryFailure,
                PROVIDER_NAME,
                format!("transport error: {detail}"),
            )
        }
    }

    fn collect_headers(headers: &HeaderMap) -> Headers {
        headers
            .iter()
            .filter_map(|(name, value)| {
                value
                    .to_str()
                    .ok()
                    .map(|v| (name.as_str().to_string(), v.to_string()))
            })
            .collect()
    }
}

#[async_trait]
impl ProviderAdapter for HttpProvider {
    fn provider(&self) -> &str {
        PROVIDER_NAME
    }

    async fn initialize(&mut self, credentials: &Credentials, settings: &ProviderSettings) -> GatewayResult<()> {
        let raw = settings
            .base_url
            .as_deref()
            .ok_or_else(|| Self::configuration_error("settings.base_url is required"))?;
        let base_url =
            Url::parse(raw).map_err(|e| Self::configuration_error(format!("invalid base_url '{raw}': {e}")))?;

        let client = Client::builder()
            .default_headers(Self::auth_headers(credentials, settings)?)
            .user_agent(concat!("integration-gateway/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| Self::configuration_error(format!("failed to build HTTP client: {e}")))?;

        self.client = Some(client);
        self.base_url = Some(base_url);
        self.default_timeout = settings.timeout_ms.map(Duration::from_millis);
        self.health_path = settings
            .health_path
            .clone()
            .unwrap_or_else(|| DEFAULT_HEALTH_PATH.to_string());
        self.capabilities = settings.capabilities.clone();
        self.closed.store(false, Ordering::Release);

        tracing::debug!(base_url = %raw, "HTTP provider initialized");
        Ok(())
    }

    async fn call(&self, request: &IntegrationRequest) -> GatewayResult<IntegrationResponse> {
        let (client, base) = self.ready()?;
        let url = Self::resolve(base, &request.endpoint)?;
        let method = Method::from_bytes(request.method.to_ascii_uppercase().as_bytes())
            .map_err(|_| Self::configuration_error(format!("invalid method '{}'", request.method)))?;

        let timeout = match self.default_timeout {
            Some(default) if request.timeout == IntegrationRequest::DEFAULT_TIMEOUT => default,
            _ => request.timeout,
        };

        let mut builder = client
            .request(method, url)
            .timeout(timeout)
            .header("x-request-id", request.request_id.to_string());
        for (name, value) in &request.headers {
            builder = builder.header(name.as_str(), value.as_str());
        }
        if !request.body.is_empty() {
            builder = builder.body(request.body.clone());
        }

        let started = Instant::now();
        let response = builder.send().await.map_err(Self::transport_error)?;
        let status = response.status();
        let headers = Self::collect_headers(response.headers());
        let body = response.bytes().await.map_err(Self::transport_error)?;

        if let Some(info) = RateLimitInfo::from_headers(&headers, Utc::now()) {
            *self.last_rate_limit.lock() = Some(info);
        }

        if !status.is_success() {
            tracing::debug!(status = status.as_u16(), "Provider returned error status");
            return Err(Self::status_error(status, &body));
        }

        let mut out = IntegrationResponse::new(status.as_u16(), body);
        out.request_id = request.request_id;
        out.headers = headers;
        out.duration = started.elapsed();
        Ok(out)
    }

    async fn health_check(&self) -> GatewayResult<()> {
        let (client, base) = self.ready()?;
        let url = Self::resolve(base, &self.health_path)?;
        let mut builder = client.get(url);
        if let Some(timeout) = self.default_timeout {
            builder = builder.timeout(timeout);
        }
        let response = builder.send().await.map_err(Self::transport_error)?;
        let status = response.status();
        if status.is_success() {
            Ok(())
        } else {
            let body = response.bytes().await.unwrap_or_default();
            Err(Self::status_error(status, &body))
        }
    }

    fn capabilities(&self) -> Vec<String> {
        self.capabilities.clone()
    }

    fn rate_limit(&self) -> Option<RateLimitInfo> {
        self.last_rate_limit.lock().clone()
    }

    async fn close(&self) -> GatewayResult<()> {
        self.closed.store(true, Ordering::Release);
        Ok(())
    }
}

/// Factory for `HttpProvider`. Integrations with `settings.webhook` get an
/// HMAC validator and an acknowledging handler; downstream work happens on
/// the event bus.
#[derive(Debug, Default, Clone, Copy)]
pub struct HttpProviderFactory;

impl ProviderFactory for HttpProviderFactory {
    fn provider(&self) -> &str {
        PROVIDER_NAME
    }

    fn create_adapter(&self) -> Box<dyn ProviderAdapter> {
        Box::new(HttpProvider::new())
    }

    fn webhook_binding(
        &self,
        credentials: &Credentials,
        settings: &ProviderSettings,
    ) -> GatewayResult<Option<WebhookBinding>> {
        let Some(webhook) = &settings.webhook else {
            return Ok(None);
        };
        let validator = HmacSignatureValidator::from_credentials(PROVIDER_NAME, credentials, webhook)?;
        Ok(Some(WebhookBinding {
            validator: Arc::new(validator),
            handler: Arc::new(AcknowledgingHandler::new(PROVIDER_NAME)),
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resolve_keeps_base_path() {
        let base = Url::parse("https://api.acme.test/v2").unwrap();
        assert_eq!(
            HttpProvider::resolve(&base, "/orders/1").unwrap().as_str(),
            "https://api.acme.test/v2/orders/1"
        );
        assert_eq!(
            HttpProvider::resolve(&base, "orders?page=2").unwrap().as_str(),
            "https://api.acme.test/v2/orders?page=2"
        );
    }

    #[test]
    fn test_status_mapping() {
        let code = |s: u16| HttpProvider::status_error(StatusCode::from_u16(s).unwrap(), b"").code;
        assert_eq!(code(429), ErrorCode::RateLimit);
        assert_eq!(code(503), ErrorCode::ServiceUnavailable);
        assert_eq!(code(504), ErrorCode::Timeout);
        assert_eq!(code(500), ErrorCode::TemporaryFailure);
        assert_eq!(code(502), ErrorCode::TemporaryFailure);
        assert_eq!(code(404), ErrorCode::NotFound);
        assert_eq!(code(422), ErrorCode::ProviderError);

        let err = HttpProvider::status_error(StatusCode::UNPROCESSABLE_ENTITY, b"{\"error\":\"bad sku\"}");
        assert_eq!(err.provider_code.as_deref(), Some("422"));
        assert_eq!(err.status_code, Some(422));
        assert!(err.message.contains("bad sku"));
    }

    #[tokio::test]
    async fn test_uninitialized_adapter_rejects_calls() {
        let adapter = HttpProvider::new();
        let err = adapter.call(&IntegrationRequest::new("GET", "/x")).await.unwrap_err();
        assert_eq!(err.code, ErrorCode::Configuration);
    }

    #[tokio::test]
    async fn test_initialize_requires_base_url() {
        let mut adapter = HttpProvider::new();
        let err = adapter
            .initialize(&Credentials::new(), &ProviderSettings::default())
            .await
            .unwrap_err();
        assert_eq!(err.code, ErrorCode::Configuration);
    }

    #[test]
    fn test_auth_header_is_sensitive() {
        let creds = Credentials::new().with_access_token("tok_live_123");
        let headers = HttpProvider::auth_headers(&creds, &ProviderSettings::default()).unwrap();
        let value = headers.get(AUTHORIZATION).unwrap();
        assert!(value.is_sensitive());
        assert_eq!(format!("{value:?}"), "Sensitive");
    }

    #[test]
    fn test_webhook_binding_requires_secret() {
        let settings = ProviderSettings {
            webhook: Some(Default::default()),
            ..ProviderSettings::default()
        };
        let err = HttpProviderFactory
            .webhook_binding(&Credentials::new(), &settings)
            .unwrap_err();
        assert_eq!(err.code, ErrorCode::Configuration);

        let creds = Credentials::new().with_extra("webhook_secret", "whsec_1");
        assert!(HttpProviderFactory.webhook_binding(&creds, &settings).unwrap().is_some());
        assert!(HttpProviderFactory
            .webhook_binding(&creds, &ProviderSettings::default())
            .unwrap()
            .is_none());
    }
}
