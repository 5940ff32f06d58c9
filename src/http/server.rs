//! HTTP server setup and configuration.
//!
//! # Responsibilities
//! - Create the Axum router (webhook ingress, liveness, admin API)
//! - Wire up middleware (request id, tracing, body limit, timeout)
//! - Serve on a listener until the shutdown broadcast fires

use std::sync::Arc;
use std::time::Duration;

use axum::{
    routing::{get, post},
    Json, Router,
};
use serde_json::{json, Value};
use tokio::net::TcpListener;
use tokio::sync::broadcast;
use tower_http::{
    limit::RequestBodyLimitLayer,
    request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer},
    timeout::TimeoutLayer,
    trace::TraceLayer,
};

use crate::admin;
use crate::config::{GatewayConfig, ListenerConfig};
use crate::gateway::Gateway;
use crate::http::webhooks::receive_webhook;
use crate::integration::SecretString;

/// Application state injected into handlers.
#[derive(Clone)]
pub struct AppState {
    pub gateway: Arc<Gateway>,
    pub admin_key: Arc<SecretString>,
}

/// Ingress server for webhooks and the admin API.
pub struct HttpServer {
    router: Router,
    config: ListenerConfig,
}

impl HttpServer {
    pub fn new(gateway: Arc<Gateway>, config: &GatewayConfig) -> Self {
        let state = AppState {
            gateway,
            admin_key: Arc::new(SecretString::new(config.admin.api_key.clone())),
        };
        let router = build_router(config, state);
        Self {
            router,
            config: config.listener.clone(),
        }
    }

    /// The fully layered router, for serving or in-process testing.
    pub fn router(&self) -> Router {
        self.router.clone()
    }

    pub fn config(&self) -> &ListenerConfig {
        &self.config
    }

    /// Serve until `shutdown` fires, then drain in-flight requests.
    pub async fn run(self, listener: TcpListener, mut shutdown: broadcast::Receiver<()>) -> Result<(), std::io::Error> {
        let addr = listener.local_addr()?;
        tracing::info!(address = %addr, "HTTP server starting");

        axum::serve(listener, self.router)
            .with_graceful_shutdown(async move {
                let _ = shutdown.recv().await;
                tracing::info!("HTTP server draining connections");
            })
            .await?;

        tracing::info!("HTTP server stopped");
        Ok(())
    }
}

/// Build the Axum router with all middleware layers.
#[allow(deprecated)]
pub fn build_router(config: &GatewayConfig, state: AppState) -> Router {
    let mut router = Router::new()
        .route("/health", get(liveness))
        .route("/webhooks/{integration_id}", post(receive_webhook));

    if config.admin.enabled {
        router = router.merge(admin::router(state.clone()));
    } else {
        tracing::info!("Admin API disabled");
    }

    router
        .with_state(state)
        .layer(RequestBodyLimitLayer::new(config.listener.max_body_bytes))
        .layer(TimeoutLayer::new(Duration::from_secs(config.listener.request_timeout_secs)))
        .layer(PropagateRequestIdLayer::x_request_id())
        .layer(TraceLayer::new_for_http())
        .layer(SetRequestIdLayer::x_request_id(MakeRequestUuid))
}

async fn liveness() -> Json<Value> {
    Json(json!({ "status": "ok" }))
}
