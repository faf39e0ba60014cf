use crate::error::AppError;
use crate::state::AppState;
use axum::{
    extract::{Path, State},
    Json,
};
use types::position::Position;
use types::risk::RiskMetrics;

pub async fn get_positions(State(state): State<AppState>) -> Json<Vec<Position>> {
    Json(state.portfolio().positions.clone())
}

pub async fn get_position(
    State(state): State<AppState>,
    Path(instrument): Path<String>,
) -> Result<Json<Position>, AppError> {
    state
        .portfolio()
        .position(&instrument)
        .cloned()
        .map(Json)
        .ok_or_else(|| AppError::NotFound(format!("No position for {instrument}")))
}

pub async fn get_risk(State(state): State<AppState>) -> Json<RiskMetrics> {
    Json(state.portfolio().risk_metrics)
}
