pub mod auth;
pub mod handlers;

use axum::{
    middleware,
    routing::{get, post},
    Router,
};

use self::auth::admin_auth_middleware;
use self::handlers::*;
use crate::http::server::AppState;

/// Admin routes, all behind bearer-token auth.
pub fn router(state: AppState) -> Router<AppState> {
    Router::new()
        .route("/admin/status", get(get_status))
        .route("/admin/integrations", get(list_integrations))
        .route("/admin/integrations/{id}", get(get_integration))
        .route("/admin/integrations/{id}/circuit/reset", post(reset_circuit))
        .route_layer(middleware::from_fn_with_state(state, admin_auth_middleware))
}
