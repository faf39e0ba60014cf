use crate::state::AppState;
use axum::{extract::State, Json};
use serde_json::{json, Value};
use std::collections::BTreeMap;

pub async fn root() -> Json<Value> {
    Json(json!({ "message": "Market data gateway running" }))
}

pub async fn metrics(State(state): State<AppState>) -> Json<BTreeMap<String, u64>> {
    Json(state.metrics.export())
}
