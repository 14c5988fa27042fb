use std::sync::Arc;

use async_trait::async_trait;
use redis::AsyncCommands;
use serde::Deserialize;

use crate::error::AppError;

/// 反向地理编码失败时使用的占位名称
pub const PLACEHOLDER_LOCATION_NAME: &str = "Location name unavailable";

const GEOCODE_KEY_PREFIX: &str = "geocode:";

/// 坐标 -> 地点名称。实现可以失败，调用方决定如何降级。
#[async_trait]
pub trait ReverseGeocoder: Send + Sync {
    async fn reverse(&self, latitude: f64, longitude: f64) -> Result<String, AppError>;
}

/// 缓存键按4位小数（约11米）取整，相邻的样本共用一次查询
pub fn geocode_key(latitude: f64, longitude: f64) -> String {
    format!("{}{:.4}:{:.4}", GEOCODE_KEY_PREFIX, latitude, longitude)
}

#[derive(Debug, Deserialize)]
struct NominatimReverse {
    display_name: Option<String>,
}

/// Nominatim 兼容的反向地理编码，结果缓存在 Redis
pub struct NominatimGeocoder {
    http: reqwest::Client,
    base_url: String,
    redis: Arc<redis::Client>,
    cache_secs: u64,
}

impl NominatimGeocoder {
    pub fn new(
        http: reqwest::Client,
        base_url: impl Into<String>,
        redis: Arc<redis::Client>,
        cache_secs: u64,
    ) -> Self {
        Self {
            http,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            redis,
            cache_secs,
        }
    }

    async fn cached(&self, key: &str) -> Result<Option<String>, redis::RedisError> {
        let mut conn = self.redis.get_multiplexed_async_connection().await?;
        conn.get(key).await
    }

    async fn store(&self, key: &str, name: &str) -> Result<(), redis::RedisError> {
        let mut conn = self.redis.get_multiplexed_async_connection().await?;
        conn.set_ex(key, name, self.cache_secs).await
    }

    async fn fetch(&self, latitude: f64, longitude: f64) -> Result<String, AppError> {
        let url = format!("{}/reverse", self.base_url);
        tracing::debug!("Fetching location name from {} ({}, {})", url, latitude, longitude);

        let response = self
            .http
            .get(&url)
            .query(&[
                ("format", "json".to_string()),
                ("lat", latitude.to_string()),
                ("lon", longitude.to_string()),
                ("zoom", "18".to_string()),
                ("addressdetails", "1".to_string()),
            ])
            .send()
            .await
            .and_then(|r| r.error_for_status())
            .map_err(|e| AppError::Upstream(format!("reverse geocoding failed: {}", e)))?;

        let body: NominatimReverse = response
            .json()
            .await
            .map_err(|e| AppError::Upstream(format!("invalid geocoding response: {}", e)))?;

        body.display_name
            .filter(|name| !name.trim().is_empty())
            .ok_or_else(|| AppError::Upstream("geocoding response has no display name".into()))
    }
}

#[async_trait]
impl ReverseGeocoder for NominatimGeocoder {
    async fn reverse(&self, latitude: f64, longitude: f64) -> Result<String, AppError> {
        let key = geocode_key(latitude, longitude);

        // 缓存不可用时直接查询上游
        match self.cached(&key).await {
            Ok(Some(name)) => {
                tracing::debug!("Geocode cache hit for {}", key);
                return Ok(name);
            }
            Ok(None) => {}
            Err(e) => tracing::warn!("Geocode cache read failed: {}", e),
        }

        let name = self.fetch(latitude, longitude).await?;
        tracing::info!("Location name received: {}", name);

        if let Err(e) = self.store(&key, &name).await {
            tracing::warn!("Geocode cache write failed: {}", e);
        }

        Ok(name)
    }
}

/// 尽力而为：失败时返回占位名称，从不向上传播错误
pub async fn resolve_or_placeholder(
    geocoder: &dyn ReverseGeocoder,
    latitude: f64,
    longitude: f64,
) -> String {
    match geocoder.reverse(latitude, longitude).await {
        Ok(name) => name,
        Err(e) => {
            tracing::warn!("Reverse geocoding failed, using placeholder: {}", e);
            PLACEHOLDER_LOCATION_NAME.to_string()
        }
    }
}
