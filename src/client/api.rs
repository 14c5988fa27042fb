use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use reqwest::{Response, Url};
use serde::Deserialize;
use serde_json::json;

use super::{ClientError, Sample, SampleSender};
use crate::error::AppError;
use crate::geocode::ReverseGeocoder;
use crate::utils::canonical;

#[derive(Debug, Deserialize)]
struct ErrorBody {
    error_message: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GeocodeBody {
    display_name: String,
}

/// 服务端 HTTP API 客户端
#[derive(Debug, Clone)]
pub struct ApiClient {
    http: reqwest::Client,
    base: Url,
}

impl ApiClient {
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self, ClientError> {
        let base = Url::parse(base_url).map_err(|e| ClientError::InvalidUrl(e.to_string()))?;
        if base.cannot_be_a_base() {
            return Err(ClientError::InvalidUrl(base_url.to_string()));
        }

        let http = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent(concat!("geotrack-client/", env!("CARGO_PKG_VERSION")))
            .build()?;

        Ok(Self { http, base })
    }

    /// 路径段会被单独转义，用户名里的空格和斜杠不会破坏路径
    fn endpoint(&self, segments: &[&str]) -> Result<Url, ClientError> {
        let mut url = self.base.clone();
        url.path_segments_mut()
            .map_err(|_| ClientError::InvalidUrl(self.base.to_string()))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    async fn check(response: Response) -> Result<Response, ClientError> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let message = response
            .json::<ErrorBody>()
            .await
            .ok()
            .and_then(|b| b.error_message)
            .unwrap_or_else(|| status.to_string());

        Err(ClientError::Rejected {
            status: status.as_u16(),
            message,
        })
    }

    /// 注册用户。同名活跃用户已存在时返回 `Ok(false)`。
    pub async fn register(&self, name: &str) -> Result<bool, ClientError> {
        let response = self
            .http
            .post(self.endpoint(&["users"])?)
            .json(&json!({
                "name": name,
                "lastUpdated": canonical(&Utc::now()),
            }))
            .send()
            .await?;

        match Self::check(response).await {
            Ok(_) => Ok(true),
            Err(ClientError::Rejected { status: 409, .. }) => Ok(false),
            Err(e) => Err(e),
        }
    }
}

#[async_trait]
impl SampleSender for ApiClient {
    async fn send(&self, sample: &Sample) -> Result<(), ClientError> {
        let url = self.endpoint(&["users", &sample.user_name, "location"])?;
        let response = self
            .http
            .post(url)
            .json(&json!({
                "location": {
                    "latitude": sample.latitude,
                    "longitude": sample.longitude,
                    "accuracy": sample.accuracy,
                    "locationName": sample.location_name,
                    "timestamp": canonical(&sample.recorded_at),
                },
                "lastUpdated": canonical(&Utc::now()),
                "sampleId": sample.sample_id,
            }))
            .send()
            .await?;

        Self::check(response).await?;
        tracing::debug!("Sample {} delivered", sample.sample_id);
        Ok(())
    }
}

/// 通过服务端的 `/geocode` 代理解析地点名称
#[async_trait]
impl ReverseGeocoder for ApiClient {
    async fn reverse(&self, latitude: f64, longitude: f64) -> Result<String, AppError> {
        let mut url = self
            .endpoint(&["geocode"])
            .map_err(|e| AppError::Upstream(e.to_string()))?;
        url.query_pairs_mut()
            .append_pair("lat", &latitude.to_string())
            .append_pair("lng", &longitude.to_string());

        let response = self
            .http
            .get(url)
            .send()
            .await
            .map_err(|e| AppError::Upstream(e.to_string()))?;
        let body: GeocodeBody = Self::check(response)
            .await
            .map_err(|e| AppError::Upstream(e.to_string()))?
            .json()
            .await
            .map_err(|e| AppError::Upstream(e.to_string()))?;

        Ok(body.display_name)
    }
}
