use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::postgres::PgPoolOptions;
use sqlx::{Executor, FromRow, PgPool};
use uuid::Uuid;

use super::{LocationStore, StoreError};
use crate::database::models::location::{LocationRecord, NewLocation};
use crate::database::models::user::{
    NewUser, TrackingAction, TrackingChange, UserRecord, UserWithLocation,
};

/// Postgres 存储实现
#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

// users LEFT JOIN 最新位置 的扁平行
#[derive(Debug, FromRow)]
struct UserLocationRow {
    id: String,
    name: String,
    is_active: bool,
    is_tracking: bool,
    created_at: DateTime<Utc>,
    last_updated: DateTime<Utc>,
    admin_tracking_started: Option<DateTime<Utc>>,
    admin_tracking_started_by: Option<String>,
    admin_tracking_stopped: Option<DateTime<Utc>>,
    admin_tracking_stopped_by: Option<String>,
    location_id: Option<i64>,
    sample_id: Option<Uuid>,
    latitude: Option<f64>,
    longitude: Option<f64>,
    accuracy: Option<f64>,
    location_name: Option<String>,
    recorded_at: Option<DateTime<Utc>>,
    location_created_at: Option<DateTime<Utc>>,
}

impl From<UserLocationRow> for UserWithLocation {
    fn from(row: UserLocationRow) -> Self {
        let latest = match (
            row.location_id,
            row.latitude,
            row.longitude,
            row.recorded_at,
            row.location_created_at,
        ) {
            (Some(id), Some(latitude), Some(longitude), Some(recorded_at), Some(created_at)) => {
                Some(LocationRecord {
                    id,
                    user_name: row.name.clone(),
                    sample_id: row.sample_id,
                    latitude,
                    longitude,
                    accuracy: row.accuracy,
                    location_name: row.location_name,
                    recorded_at,
                    created_at,
                })
            }
            _ => None,
        };

        UserWithLocation {
            user: UserRecord {
                id: row.id,
                name: row.name,
                is_active: row.is_active,
                is_tracking: row.is_tracking,
                created_at: row.created_at,
                last_updated: row.last_updated,
                admin_tracking_started: row.admin_tracking_started,
                admin_tracking_started_by: row.admin_tracking_started_by,
                admin_tracking_stopped: row.admin_tracking_stopped,
                admin_tracking_stopped_by: row.admin_tracking_stopped_by,
            },
            latest,
        }
    }
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn connect(database_url: &str) -> Result<Self, StoreError> {
        let pool = PgPoolOptions::new()
            .max_connections(10)
            .after_connect(|conn, _meta| {
                Box::pin(async move {
                    conn.execute("SET application_name = 'geotrack_backend';")
                        .await?;
                    Ok(())
                })
            })
            .connect(database_url)
            .await?;

        Ok(Self { pool })
    }

    pub async fn migrate(&self) -> Result<(), StoreError> {
        sqlx::migrate!("./migrations").run(&self.pool).await?;
        Ok(())
    }

    async fn fetch_with_latest(
        &self,
        name: Option<&str>,
    ) -> Result<Vec<UserWithLocation>, StoreError> {
        let rows = sqlx::query_as::<_, UserLocationRow>(
            r#"
            SELECT
                u.id, u.name, u.is_active, u.is_tracking, u.created_at, u.last_updated,
                u.admin_tracking_started, u.admin_tracking_started_by,
                u.admin_tracking_stopped, u.admin_tracking_stopped_by,
                l.id AS location_id,
                l.sample_id,
                l.latitude,
                l.longitude,
                l.accuracy,
                l.location_name,
                l.recorded_at,
                l.created_at AS location_created_at
            FROM users u
            LEFT JOIN LATERAL (
                SELECT id, sample_id, latitude, longitude, accuracy, location_name,
                       recorded_at, created_at
                FROM locations
                WHERE user_name = u.name
                ORDER BY recorded_at DESC, id DESC
                LIMIT 1
            ) l ON TRUE
            WHERE u.is_active
              AND ($1::text IS NULL OR u.name = $1)
            ORDER BY u.last_updated DESC
            "#,
        )
        .bind(name)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(UserWithLocation::from).collect())
    }
}

fn unique_violation(err: sqlx::Error, message: &str) -> StoreError {
    match &err {
        sqlx::Error::Database(db_err) if db_err.is_unique_violation() => {
            StoreError::Conflict(message.to_string())
        }
        _ => StoreError::Database(err),
    }
}

#[async_trait]
impl LocationStore for PgStore {
    async fn insert_user(&self, user: NewUser) -> Result<UserRecord, StoreError> {
        // 部分唯一索引 users_active_name_key 保证同名活跃用户最多一个
        let inserted = sqlx::query_as::<_, UserRecord>(
            r#"
            INSERT INTO users (id, name, is_active, is_tracking, last_updated, created_at)
            VALUES ($1, $2, TRUE, FALSE, $3, NOW())
            ON CONFLICT (name) WHERE is_active DO NOTHING
            RETURNING id, name, is_active, is_tracking, created_at, last_updated,
                      admin_tracking_started, admin_tracking_started_by,
                      admin_tracking_stopped, admin_tracking_stopped_by
            "#,
        )
        .bind(&user.id)
        .bind(&user.name)
        .bind(user.last_updated)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| unique_violation(e, "User with this id already exists"))?;

        inserted.ok_or_else(|| StoreError::Conflict("User with this name already exists".into()))
    }

    async fn find_active_user(&self, name: &str) -> Result<Option<UserRecord>, StoreError> {
        let user = sqlx::query_as::<_, UserRecord>(
            r#"
            SELECT id, name, is_active, is_tracking, created_at, last_updated,
                   admin_tracking_started, admin_tracking_started_by,
                   admin_tracking_stopped, admin_tracking_stopped_by
            FROM users
            WHERE name = $1 AND is_active
            "#,
        )
        .bind(name)
        .fetch_optional(&self.pool)
        .await?;

        Ok(user)
    }

    async fn touch_user(
        &self,
        name: &str,
        last_updated: DateTime<Utc>,
    ) -> Result<Option<UserRecord>, StoreError> {
        let user = sqlx::query_as::<_, UserRecord>(
            r#"
            UPDATE users
            SET last_updated = $2
            WHERE name = $1 AND is_active
            RETURNING id, name, is_active, is_tracking, created_at, last_updated,
                      admin_tracking_started, admin_tracking_started_by,
                      admin_tracking_stopped, admin_tracking_stopped_by
            "#,
        )
        .bind(name)
        .bind(last_updated)
        .fetch_optional(&self.pool)
        .await?;

        Ok(user)
    }

    async fn insert_location(&self, location: NewLocation) -> Result<LocationRecord, StoreError> {
        let inserted = sqlx::query_as::<_, LocationRecord>(
            r#"
            INSERT INTO locations
                (user_name, sample_id, latitude, longitude, accuracy, location_name, recorded_at, created_at)
            VALUES
                ($1, $2, $3, $4, $5, $6, $7, NOW())
            ON CONFLICT (user_name, sample_id) DO NOTHING
            RETURNING id, user_name, sample_id, latitude, longitude, accuracy, location_name,
                      recorded_at, created_at
            "#,
        )
        .bind(&location.user_name)
        .bind(location.sample_id)
        .bind(location.latitude)
        .bind(location.longitude)
        .bind(location.accuracy)
        .bind(&location.location_name)
        .bind(location.recorded_at)
        .fetch_optional(&self.pool)
        .await?;

        if let Some(record) = inserted {
            return Ok(record);
        }

        // 冲突只可能来自 sample_id 重放，返回第一次写入的记录
        tracing::debug!(
            "Duplicate sample {:?} for {}, returning stored row",
            location.sample_id,
            location.user_name
        );
        let existing = sqlx::query_as::<_, LocationRecord>(
            r#"
            SELECT id, user_name, sample_id, latitude, longitude, accuracy, location_name,
                   recorded_at, created_at
            FROM locations
            WHERE user_name = $1 AND sample_id = $2
            "#,
        )
        .bind(&location.user_name)
        .bind(location.sample_id)
        .fetch_one(&self.pool)
        .await?;

        Ok(existing)
    }

    async fn count_locations(&self, user_name: &str) -> Result<i64, StoreError> {
        let count = sqlx::query_scalar::<_, i64>(
            "SELECT COUNT(*) FROM locations WHERE user_name = $1",
        )
        .bind(user_name)
        .fetch_one(&self.pool)
        .await?;

        Ok(count)
    }

    async fn deactivate_user(&self, name: &str) -> Result<bool, StoreError> {
        let result = sqlx::query(
            r#"
            UPDATE users
            SET is_active = FALSE, is_tracking = FALSE
            WHERE name = $1 AND is_active
            "#,
        )
        .bind(name)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn deactivate_all(&self) -> Result<u64, StoreError> {
        let result = sqlx::query(
            r#"
            UPDATE users
            SET is_active = FALSE, is_tracking = FALSE
            WHERE is_active
            "#,
        )
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected())
    }

    async fn set_tracking(
        &self,
        name: &str,
        change: &TrackingChange,
    ) -> Result<Option<UserRecord>, StoreError> {
        let sql = match change.action {
            TrackingAction::Start => {
                r#"
                UPDATE users
                SET is_tracking = TRUE,
                    admin_tracking_started = $2,
                    admin_tracking_started_by = $3,
                    last_updated = $2
                WHERE name = $1 AND is_active
                RETURNING id, name, is_active, is_tracking, created_at, last_updated,
                          admin_tracking_started, admin_tracking_started_by,
                          admin_tracking_stopped, admin_tracking_stopped_by
                "#
            }
            TrackingAction::Stop => {
                r#"
                UPDATE users
                SET is_tracking = FALSE,
                    admin_tracking_stopped = $2,
                    admin_tracking_stopped_by = $3,
                    last_updated = $2
                WHERE name = $1 AND is_active
                RETURNING id, name, is_active, is_tracking, created_at, last_updated,
                          admin_tracking_started, admin_tracking_started_by,
                          admin_tracking_stopped, admin_tracking_stopped_by
                "#
            }
        };

        let user = sqlx::query_as::<_, UserRecord>(sql)
            .bind(name)
            .bind(change.at)
            .bind(&change.actor)
            .fetch_optional(&self.pool)
            .await?;

        Ok(user)
    }

    async fn set_tracking_all(&self, change: &TrackingChange) -> Result<Vec<String>, StoreError> {
        let sql = match change.action {
            TrackingAction::Start => {
                r#"
                UPDATE users
                SET is_tracking = TRUE,
                    admin_tracking_started = $1,
                    admin_tracking_started_by = $2,
                    last_updated = $1
                WHERE is_active
                RETURNING name
                "#
            }
            TrackingAction::Stop => {
                r#"
                UPDATE users
                SET is_tracking = FALSE,
                    admin_tracking_stopped = $1,
                    admin_tracking_stopped_by = $2,
                    last_updated = $1
                WHERE is_active
                RETURNING name
                "#
            }
        };

        let names = sqlx::query_scalar::<_, String>(sql)
            .bind(change.at)
            .bind(&change.actor)
            .fetch_all(&self.pool)
            .await?;

        Ok(names)
    }

    async fn active_users(&self) -> Result<Vec<UserRecord>, StoreError> {
        let users = sqlx::query_as::<_, UserRecord>(
            r#"
            SELECT id, name, is_active, is_tracking, created_at, last_updated,
                   admin_tracking_started, admin_tracking_started_by,
                   admin_tracking_stopped, admin_tracking_stopped_by
            FROM users
            WHERE is_active
            ORDER BY last_updated DESC
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(users)
    }

    async fn count_active_users(&self) -> Result<i64, StoreError> {
        let count = sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM users WHERE is_active")
            .fetch_one(&self.pool)
            .await?;

        Ok(count)
    }

    async fn active_users_with_latest(&self) -> Result<Vec<UserWithLocation>, StoreError> {
        self.fetch_with_latest(None).await
    }

    async fn active_user_with_latest(
        &self,
        name: &str,
    ) -> Result<Option<UserWithLocation>, StoreError> {
        Ok(self.fetch_with_latest(Some(name)).await?.into_iter().next())
    }
}
