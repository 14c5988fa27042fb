use bcrypt::{DEFAULT_COST, hash, verify};
use chrono::{DateTime, Duration, NaiveDate, NaiveDateTime, SecondsFormat, TimeZone, Utc};
use jsonwebtoken::{DecodingKey, EncodingKey, Header, Validation, decode, encode};
use serde::{Deserialize, Serialize, Serializer};

use crate::config::Config;

pub const ADMIN_ROLE: &str = "admin";

pub fn hash_password(password: &str) -> Result<String, bcrypt::BcryptError> {
    hash(password.as_bytes(), DEFAULT_COST)
}

pub fn verify_password(password: &str, hash: &str) -> Result<bool, bcrypt::BcryptError> {
    verify(password.as_bytes(), hash)
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    pub sub: String,  // 管理员用户名
    pub role: String, // 角色
    pub exp: i64,     // 过期时间
    pub iat: i64,     // 签发时间
}

pub fn generate_token(
    username: &str,
    config: &Config,
) -> Result<(String, i64), jsonwebtoken::errors::Error> {
    let now = Utc::now();
    let expiration = (now + Duration::seconds(config.jwt_expiration().as_secs() as i64)).timestamp();

    let claims = Claims {
        sub: username.to_string(),
        role: ADMIN_ROLE.to_string(),
        exp: expiration,
        iat: now.timestamp(),
    };

    let token = encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(config.jwt_secret.as_bytes()),
    )?;

    tracing::debug!("Generated admin token for: {}", username);
    Ok((token, expiration))
}

pub fn verify_token(token: &str, secret: &str) -> Result<Claims, jsonwebtoken::errors::Error> {
    let token_data = decode::<Claims>(
        token,
        &DecodingKey::from_secret(secret.as_bytes()),
        &Validation::default(),
    )?;

    Ok(token_data.claims)
}

// 纬度 [-90, 90]，经度 [-180, 180]，越界直接拒绝，不做截断
pub fn is_valid_coordinate(latitude: f64, longitude: f64) -> bool {
    latitude.is_finite()
        && longitude.is_finite()
        && (-90.0..=90.0).contains(&latitude)
        && (-180.0..=180.0).contains(&longitude)
}

const NAIVE_FORMATS: &[&str] = &["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f"];

/// 解析客户端传来的时间字符串，无法识别时返回 `None`。
///
/// 带时区的 RFC 3339 / RFC 2822、无时区的 ISO 日期时间（按 UTC 处理）、
/// 纯日期以及毫秒级 Unix 时间戳都可以识别。
pub fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    let raw = raw.trim();
    if raw.is_empty() {
        return None;
    }

    if let Ok(ts) = DateTime::parse_from_rfc3339(raw) {
        return Some(ts.with_timezone(&Utc));
    }
    if let Ok(ts) = DateTime::parse_from_rfc2822(raw) {
        return Some(ts.with_timezone(&Utc));
    }
    for format in NAIVE_FORMATS {
        if let Ok(naive) = NaiveDateTime::parse_from_str(raw, format) {
            return Some(Utc.from_utc_datetime(&naive));
        }
    }
    if let Ok(date) = NaiveDate::parse_from_str(raw, "%Y-%m-%d") {
        return date.and_hms_opt(0, 0, 0).map(|naive| Utc.from_utc_datetime(&naive));
    }
    if raw.len() >= 10 && raw.bytes().all(|b| b.is_ascii_digit()) {
        return raw
            .parse::<i64>()
            .ok()
            .and_then(|millis| Utc.timestamp_millis_opt(millis).single());
    }

    None
}

/// 时间戳规范化：能解析就用解析结果，否则使用当前时间。永远不会失败。
///
/// 结果截断到毫秒，保证 `canonical(normalize(canonical(t))) == canonical(t)`。
pub fn normalize_timestamp(input: Option<&str>) -> DateTime<Utc> {
    let parsed = input.and_then(|raw| {
        let parsed = parse_timestamp(raw);
        if parsed.is_none() {
            tracing::debug!("Unparseable timestamp {:?}, falling back to now", raw);
        }
        parsed
    });

    truncate_to_millis(parsed.unwrap_or_else(Utc::now))
}

pub fn truncate_to_millis(ts: DateTime<Utc>) -> DateTime<Utc> {
    Utc.timestamp_millis_opt(ts.timestamp_millis())
        .single()
        .unwrap_or(ts)
}

pub fn canonical(ts: &DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Millis, true)
}

pub fn serialize_instant<S: Serializer>(ts: &DateTime<Utc>, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_str(&canonical(ts))
}

pub fn serialize_opt_instant<S: Serializer>(
    ts: &Option<DateTime<Utc>>,
    serializer: S,
) -> Result<S::Ok, S::Error> {
    match ts {
        Some(ts) => serializer.serialize_str(&canonical(ts)),
        None => serializer.serialize_none(),
    }
}

pub mod error_codes {
    pub const VALIDATION_ERROR: i32 = 1000;
    pub const USER_EXISTS: i32 = 1001;
    pub const AUTH_FAILED: i32 = 1002;
    pub const PERMISSION_DENIED: i32 = 1003;
    pub const NOT_FOUND: i32 = 1004;
    pub const RATE_LIMIT: i32 = 1005;
    pub const INTERNAL_ERROR: i32 = 5000;
    pub const UPSTREAM_ERROR: i32 = 5002;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalize_keeps_valid_rfc3339_in_utc() {
        let ts = normalize_timestamp(Some("2024-05-01T12:30:00+02:00"));
        assert_eq!(canonical(&ts), "2024-05-01T10:30:00.000Z");
    }

    #[test]
    fn normalize_is_idempotent_on_canonical_input() {
        let input = "2023-11-14T22:13:20.123Z";
        let once = canonical(&normalize_timestamp(Some(input)));
        assert_eq!(once, input);
        let twice = canonical(&normalize_timestamp(Some(&once)));
        assert_eq!(twice, input);
    }

    #[test]
    fn normalize_accepts_common_client_formats() {
        let expected = "2024-05-01T10:00:00.000Z";
        for raw in [
            "2024-05-01T10:00:00Z",
            "2024-05-01T10:00:00",
            "2024-05-01 10:00:00",
            "Wed, 01 May 2024 10:00:00 GMT",
            "1714557600000",
        ] {
            assert_eq!(canonical(&normalize_timestamp(Some(raw))), expected, "{raw}");
        }
        assert_eq!(
            canonical(&normalize_timestamp(Some("2024-05-01"))),
            "2024-05-01T00:00:00.000Z"
        );
    }

    #[test]
    fn normalize_falls_back_to_now() {
        for raw in [None, Some(""), Some("   "), Some("bad-date"), Some("2024-13-45"), Some("42")] {
            let before = truncate_to_millis(Utc::now());
            let ts = normalize_timestamp(raw);
            let after = Utc::now();
            assert!(ts >= before && ts <= after, "{raw:?} -> {ts}");
            assert!(parse_timestamp(&canonical(&ts)).is_some());
        }
    }

    #[test]
    fn coordinate_ranges_are_inclusive() {
        assert!(is_valid_coordinate(90.0, 180.0));
        assert!(is_valid_coordinate(-90.0, -180.0));
        assert!(is_valid_coordinate(40.7128, -74.0060));
        assert!(!is_valid_coordinate(90.0001, 0.0));
        assert!(!is_valid_coordinate(0.0, -180.5));
        assert!(!is_valid_coordinate(f64::NAN, 0.0));
        assert!(!is_valid_coordinate(0.0, f64::INFINITY));
    }

    #[test]
    fn password_hash_verifies() {
        let hash = hash_password("1122").unwrap();
        assert!(verify_password("1122", &hash).unwrap());
        assert!(!verify_password("1123", &hash).unwrap());
        assert!(verify_password("1122", "not-a-hash").is_err());
    }

    #[test]
    fn token_roundtrip_carries_admin_role() {
        let config = Config::for_tests();
        let (token, exp) = generate_token("admin", &config).expect("sign");
        let claims = verify_token(&token, &config.jwt_secret).expect("verify");
        assert_eq!(claims.sub, "admin");
        assert_eq!(claims.role, ADMIN_ROLE);
        assert_eq!(claims.exp, exp);
        assert!(verify_token(&token, "other-secret").is_err());
    }
}
