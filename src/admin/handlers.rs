use std::collections::BTreeMap;

use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use serde::Serialize;

use crate::http::response::ApiError;
use crate::http::server::AppState;
use crate::integration::{Integration, IntegrationStatus, IntegrationType, RateLimitInfo};
use crate::resilience::{CircuitSnapshot, CircuitState};

#[derive(Serialize)]
pub struct SystemStatus {
    pub version: &'static str,
    pub status: &'static str,
    pub integrations: usize,
    pub by_status: BTreeMap<&'static str, usize>,
    pub event_subscribers: usize,
}

#[derive(Serialize)]
pub struct IntegrationSummary {
    pub id: String,
    pub name: String,
    pub provider: String,
    #[serde(rename = "type")]
    pub integration_type: IntegrationType,
    pub status: IntegrationStatus,
    pub circuit: CircuitState,
}

#[derive(Serialize)]
pub struct IntegrationDetail {
    pub integration: Integration,
    pub circuit: CircuitSnapshot,
    pub rate_limit: RateLimitInfo,
}

pub async fn get_status(State(state): State<AppState>) -> Json<SystemStatus> {
    let integrations = state.gateway.registry().list();
    let mut by_status = BTreeMap::new();
    for integration in &integrations {
        *by_status.entry(integration.status.as_str()).or_insert(0) += 1;
    }

    Json(SystemStatus {
        version: env!("CARGO_PKG_VERSION"),
        status: "operational",
        integrations: integrations.len(),
        by_status,
        event_subscribers: state.gateway.events().subscriber_count(),
    })
}

pub async fn list_integrations(State(state): State<AppState>) -> Json<Vec<IntegrationSummary>> {
    let registry = state.gateway.registry();
    let summaries = registry
        .list()
        .into_iter()
        .map(|integration| {
            let circuit = registry
                .circuit(&integration.id)
                .map(|snapshot| snapshot.state)
                .unwrap_or(CircuitState::Closed);
            IntegrationSummary {
                id: integration.id,
                name: integration.name,
                provider: integration.provider,
                integration_type: integration.integration_type,
                status: integration.status,
                circuit,
            }
        })
        .collect();
    Json(summaries)
}

pub async fn get_integration(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<IntegrationDetail>, ApiError> {
    let registry = state.gateway.registry();
    Ok(Json(IntegrationDetail {
        integration: registry.get(&id)?,
        circuit: registry.circuit(&id)?,
        rate_limit: registry.rate_limit(&id)?,
    }))
}

pub async fn reset_circuit(State(state): State<AppState>, Path(id): Path<String>) -> Result<StatusCode, ApiError> {
    state.gateway.registry().reset_circuit(&id)?;
    Ok(StatusCode::NO_CONTENT)
}
