use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;
use std::time::Duration;

use geotrack::{
    AppState, build_app,
    config::Config,
    database::{
        LocationStore,
        operations::{MemoryStore, PgStore},
    },
    geocode::NominatimGeocoder,
    middleware::{JwtAdminVerifier, RateLimiter, rate_limit},
    utils::hash_password,
};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() {
    // 初始化日志
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "info".into()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();

    // 加载配置
    let mut config =
        Config::from_env().expect("Failed to load configuration (JWT_SECRET is required)");

    #[cfg(debug_assertions)]
    tracing::info!("Running in debug mode with CORS enabled");

    #[cfg(not(debug_assertions))]
    tracing::info!("Running in production mode with CORS disabled");

    // 存储：配置了数据库就用 Postgres，否则退回内存存储
    let store: Arc<dyn LocationStore> = match config.database_url.as_deref() {
        Some(url) => {
            let store = PgStore::connect(url)
                .await
                .expect("Failed to connect to Postgres");
            store.migrate().await.expect("Failed to run migrations");
            tracing::info!("Connected to Postgres, migrations applied");
            Arc::new(store)
        }
        None => {
            tracing::warn!("DATABASE_URL not set, using in-memory store (data is lost on restart)");
            Arc::new(MemoryStore::new())
        }
    };

    // 只给了明文密码时在启动时哈希
    if config.admin_password_hash.is_none() {
        match std::env::var("ADMIN_PASSWORD") {
            Ok(plain) if !plain.is_empty() => {
                tracing::warn!("Using plain ADMIN_PASSWORD, prefer ADMIN_PASSWORD_HASH");
                config.admin_password_hash =
                    Some(hash_password(&plain).expect("Failed to hash ADMIN_PASSWORD"));
            }
            _ => tracing::warn!("ADMIN_PASSWORD_HASH not set, admin login is disabled"),
        }
    }

    // 设置 Redis 客户端
    let redis = Arc::new(
        redis::Client::open(config.redis_url.clone()).expect("Failed to create Redis client"),
    );

    // 反向地理编码
    let http = reqwest::Client::builder()
        .timeout(Duration::from_secs(10))
        .user_agent(concat!("geotrack/", env!("CARGO_PKG_VERSION")))
        .build()
        .expect("Failed to build HTTP client");
    let geocoder = NominatimGeocoder::new(
        http,
        config.geocode_url.clone(),
        redis.clone(),
        config.geocode_cache_secs,
    );

    // 设置应用状态
    let state = AppState {
        store,
        config: config.clone(),
        redis: redis.clone(),
        geocoder: Arc::new(geocoder),
        admin: Arc::new(JwtAdminVerifier::new(config.jwt_secret.clone())),
    };

    // 设置限流器
    let rate_limiter = Arc::new(RateLimiter::new(redis, config.clone()));

    let app = build_app(state).layer(axum::middleware::from_fn_with_state(
        rate_limiter,
        rate_limit,
    ));

    // 启动服务器
    let addr = SocketAddr::new(
        config.server_host.parse().unwrap_or_else(|_| {
            tracing::warn!("Invalid server_host, falling back to dual-stack default");
            IpAddr::V6(std::net::Ipv6Addr::UNSPECIFIED)
        }),
        config.server_port,
    );
    tracing::info!("Server listening on {}", addr);
    axum::serve(
        tokio::net::TcpListener::bind(&addr)
            .await
            .expect("Failed to bind"),
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .await
    .expect("Failed to start server");
}
