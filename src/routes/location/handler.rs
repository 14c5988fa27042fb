use axum::extract::{Json, Path, State};

use crate::{AppState, error::AppError, services, utils::is_valid_coordinate};

use super::model::{RawSampleRequest, RawSampleResponse, SubmitLocationRequest, SubmitLocationResponse};

#[axum::debug_handler]
pub async fn submit(
    State(state): State<AppState>,
    Path(name): Path<String>,
    Json(req): Json<SubmitLocationRequest>,
) -> Result<Json<SubmitLocationResponse>, AppError> {
    let submission = req
        .into_submission()
        .ok_or_else(|| AppError::Validation("Name and location are required".into()))?;

    let ingested = services::submit_location(state.store.as_ref(), &name, submission).await?;

    Ok(Json(SubmitLocationResponse {
        success: true,
        user: ingested.user,
        location: ingested.location,
    }))
}

/// 最低保证的上报通道：不落库，只记录
#[axum::debug_handler]
pub async fn raw_sample(Json(req): Json<RawSampleRequest>) -> Result<Json<RawSampleResponse>, AppError> {
    if !is_valid_coordinate(req.latitude, req.longitude) {
        return Err(AppError::Validation(
            "Latitude must be within [-90, 90] and longitude within [-180, 180]".into(),
        ));
    }

    tracing::info!(
        latitude = req.latitude,
        longitude = req.longitude,
        accuracy = ?req.accuracy,
        readings_count = ?req.readings_count,
        method = ?req.method,
        location_name = ?req.location_name,
        timestamp = ?req.timestamp,
        "Location sample received"
    );

    Ok(Json(RawSampleResponse {
        success: true,
        message: "Location received".to_string(),
    }))
}
