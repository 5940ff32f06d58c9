//! Webhook ingress handler.
//!
//! Hands raw headers and the unparsed body to the dispatcher; all
//! validation happens there.

use axum::{
    body::Bytes,
    extract::{Path, State},
    http::HeaderMap,
    Json,
};

use crate::http::request::{request_id, to_headers};
use crate::http::response::ApiError;
use crate::http::server::AppState;
use crate::webhooks::WebhookReceipt;

pub async fn receive_webhook(
    State(state): State<AppState>,
    Path(integration_id): Path<String>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<WebhookReceipt>, ApiError> {
    tracing::debug!(
        request_id = %request_id(&headers),
        integration_id = %integration_id,
        body_bytes = body.len(),
        "Webhook received"
    );

    let receipt = state
        .gateway
        .handle_webhook(&integration_id, &to_headers(&headers), &body)
        .await?;
    Ok(Json(receipt))
}
