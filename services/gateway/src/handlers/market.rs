use crate::error::AppError;
use crate::state::AppState;
use axum::{
    extract::{Path, State},
    Json,
};
use market_data::decoder::DecodedSegment;
use market_data::segment::is_valid_instrument;
use types::market::{MarketDepth, PublicTrade};

/// Decode the instrument's segment right now. Read-only; the engine is not
/// touched.
pub async fn get_depth(
    State(state): State<AppState>,
    Path(instrument): Path<String>,
) -> Result<Json<MarketDepth>, AppError> {
    let segment = read_segment(&state, &instrument).await?;
    Ok(Json(segment.depth.to_market_depth(&instrument)))
}

pub async fn get_trades(
    State(state): State<AppState>,
    Path(instrument): Path<String>,
) -> Result<Json<Vec<PublicTrade>>, AppError> {
    let segment = read_segment(&state, &instrument).await?;
    Ok(Json(
        segment
            .trades
            .iter()
            .map(|t| t.to_public(&instrument))
            .collect(),
    ))
}

/// Map and decode off the async workers; the open and page-in block.
async fn read_segment(state: &AppState, instrument: &str) -> Result<DecodedSegment, AppError> {
    check_instrument(instrument)?;
    let locator = state.locator.clone();
    let instrument = instrument.to_string();
    let segment = tokio::task::spawn_blocking(move || locator.read(&instrument))
        .await
        .map_err(|e| AppError::InternalError(e.into()))??;
    Ok(segment)
}

fn check_instrument(instrument: &str) -> Result<(), AppError> {
    if is_valid_instrument(instrument) {
        Ok(())
    } else {
        Err(AppError::BadRequest(format!("Invalid instrument: {instrument}")))
    }
}
