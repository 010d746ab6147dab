//! Liveness endpoint reporting per-client supervisor state.

use std::collections::HashMap;
use std::sync::Arc;

use axum::{Json, Router, extract::State, routing::get};
use serde::Serialize;

use crate::state::ApiState;

/// Health document returned by `/healthz`.
#[derive(Debug, Serialize)]
pub struct Health {
    /// Always `ok`; the process answered.
    pub status: &'static str,
    /// Supervisor state per configured client.
    pub clients: HashMap<String, String>,
    /// Whether any category path warning is active.
    pub has_category_path_warnings: bool,
}

/// Attach the health endpoint to the primary router.
pub fn mount(router: Router<Arc<ApiState>>) -> Router<Arc<ApiState>> {
    router.route("/healthz", get(health))
}

async fn health(State(state): State<Arc<ApiState>>) -> Json<Health> {
    let clients = state
        .managers
        .iter()
        .map(|manager| {
            (
                manager.kind().as_str().to_string(),
                manager.state().as_str().to_string(),
            )
        })
        .collect();
    Json(Health {
        status: "ok",
        clients,
        has_category_path_warnings: state.categories.has_path_warnings().await,
    })
}
