use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::FromRow;
use uuid::Uuid;

use crate::utils::serialize_instant;

/// 位置记录实体，对应数据库中的 locations 表（只追加）
#[derive(Debug, Clone, PartialEq, Serialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct LocationRecord {
    pub id: i64,
    /// 关联 users.name
    pub user_name: String,
    /// 客户端生成的幂等键，重放同一样本不会产生重复记录
    pub sample_id: Option<Uuid>,
    pub latitude: f64,
    pub longitude: f64,
    /// 精度（米）
    pub accuracy: Option<f64>,
    /// 反向地理编码得到的地点名称
    pub location_name: Option<String>,
    /// 客户端采集时间（已规范化）
    #[serde(serialize_with = "serialize_instant")]
    pub recorded_at: DateTime<Utc>,
    /// 服务端接收时间
    #[serde(serialize_with = "serialize_instant")]
    pub created_at: DateTime<Utc>,
}

/// 待写入的位置样本
#[derive(Debug, Clone)]
pub struct NewLocation {
    pub user_name: String,
    pub sample_id: Option<Uuid>,
    pub latitude: f64,
    pub longitude: f64,
    pub accuracy: Option<f64>,
    pub location_name: Option<String>,
    pub recorded_at: DateTime<Utc>,
}

impl LocationRecord {
    /// 当前位置 = recorded_at 最大的样本；时间相同时取后写入的一条。
    /// 与到达顺序无关，乱序到达的旧样本不会覆盖新位置。
    pub fn latest<'a, I>(samples: I) -> Option<&'a LocationRecord>
    where
        I: IntoIterator<Item = &'a LocationRecord>,
    {
        samples
            .into_iter()
            .max_by(|a, b| a.recorded_at.cmp(&b.recorded_at).then(a.id.cmp(&b.id)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn sample(id: i64, recorded_secs: i64) -> LocationRecord {
        LocationRecord {
            id,
            user_name: "Bob".into(),
            sample_id: None,
            latitude: 1.0,
            longitude: 2.0,
            accuracy: None,
            location_name: None,
            recorded_at: Utc.timestamp_opt(recorded_secs, 0).unwrap(),
            created_at: Utc::now(),
        }
    }

    #[test]
    fn latest_ignores_arrival_order() {
        let samples = vec![sample(1, 200), sample(2, 100)];
        assert_eq!(LocationRecord::latest(&samples).map(|s| s.id), Some(1));
    }

    #[test]
    fn latest_breaks_ties_by_insertion() {
        let samples = vec![sample(1, 100), sample(2, 100)];
        assert_eq!(LocationRecord::latest(&samples).map(|s| s.id), Some(2));
    }

    #[test]
    fn latest_of_nothing_is_none() {
        assert!(LocationRecord::latest(&Vec::<LocationRecord>::new()).is_none());
    }
}
