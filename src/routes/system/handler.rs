use axum::extract::{Json, Query, State};
use chrono::Utc;

use crate::{AppState, error::AppError, utils::is_valid_coordinate};

use super::model::{GeocodeQuery, GeocodeResponse, HealthResponse, StatsResponse};

fn parse_coordinate(raw: Option<&str>) -> Option<f64> {
    raw.map(str::trim)
        .filter(|v| !v.is_empty())
        .and_then(|v| v.parse::<f64>().ok())
}

#[axum::debug_handler]
pub async fn geocode(
    State(state): State<AppState>,
    Query(query): Query<GeocodeQuery>,
) -> Result<Json<GeocodeResponse>, AppError> {
    let (lat, lng) = match (
        parse_coordinate(query.lat.as_deref()),
        parse_coordinate(query.lng.as_deref()),
    ) {
        (Some(lat), Some(lng)) if is_valid_coordinate(lat, lng) => (lat, lng),
        _ => {
            return Err(AppError::Validation(
                "Valid latitude and longitude are required".into(),
            ));
        }
    };

    let display_name = state.geocoder.reverse(lat, lng).await?;
    Ok(Json(GeocodeResponse { display_name }))
}

#[axum::debug_handler]
pub async fn stats(State(state): State<AppState>) -> Result<Json<StatsResponse>, AppError> {
    let active_users = state.store.count_active_users().await?;
    Ok(Json(StatsResponse {
        active_users,
        timestamp: Utc::now(),
    }))
}

/// 存储出错时仍然返回 200，只是不带用户数
#[axum::debug_handler]
pub async fn health(State(state): State<AppState>) -> Json<HealthResponse> {
    match state.store.count_active_users().await {
        Ok(count) => Json(HealthResponse {
            message: "Location tracker server is running".to_string(),
            timestamp: Utc::now(),
            active_users: Some(count),
        }),
        Err(e) => {
            tracing::error!("Health check could not count users: {}", e);
            Json(HealthResponse {
                message: "Location tracker server is running (storage unavailable)".to_string(),
                timestamp: Utc::now(),
                active_users: None,
            })
        }
    }
}
